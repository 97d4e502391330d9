//! File discovery and loading for config documents.
//!
//! Each [`SearchPath`] resolves to one or more directories, listed lowest
//! priority first. `Ancestors` expands inline, shallowest directory first,
//! so a file closer to the working directory wins. Every directory is then
//! checked for `{dir}/{file_name}`: [`SearchMode::Merge`] keeps every file
//! found, [`SearchMode::FirstMatch`] keeps only the highest-priority one.
//!
//! Missing files are skipped during discovery; other I/O errors are
//! propagated. Explicitly named files must exist.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::document::Document;
use crate::error::LayerfigError;
use crate::types::{Boundary, Format, SearchMode, SearchPath};

/// Resolve a single-directory [`SearchPath`] to a concrete path.
///
/// `app_name` is used by `SearchPath::Platform` to construct the platform-specific
/// config directory (e.g. `~/.config/{app_name}/` on Linux). Returns an empty
/// list when the directory cannot be determined (no home directory, say).
fn search_dirs(sp: &SearchPath, app_name: &str, start: Option<&Path>) -> Vec<PathBuf> {
    match sp {
        SearchPath::Platform => directories::ProjectDirs::from("", "", app_name)
            .map(|proj| proj.config_dir().to_path_buf())
            .into_iter()
            .collect(),
        SearchPath::Home(subdir) => directories::UserDirs::new()
            .map(|user| user.home_dir().join(subdir))
            .into_iter()
            .collect(),
        SearchPath::Cwd => std::env::current_dir().ok().into_iter().collect(),
        SearchPath::Path(p) => vec![p.clone()],
        SearchPath::Ancestors(boundary) => match start {
            Some(start) => expand_ancestors_from(start, boundary),
            None => match std::env::current_dir() {
                Ok(cwd) => expand_ancestors_from(&cwd, boundary),
                Err(_) => Vec::new(),
            },
        },
    }
}

/// Walk from `start` toward the filesystem root, shallowest directory first.
///
/// With [`Boundary::Marker`] the walk stops (inclusive) at the first
/// directory containing an entry named by the marker, or at the root if
/// there is none.
pub fn expand_ancestors_from(start: &Path, boundary: &Boundary) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut current = Some(start);

    while let Some(dir) = current {
        dirs.push(dir.to_path_buf());
        if let Boundary::Marker(name) = boundary
            && dir.join(name).exists()
        {
            break;
        }
        current = dir.parent();
    }

    dirs.reverse();
    dirs
}

/// Expand all search paths into a flat, priority-ascending list of
/// directories. `start` replaces the working directory for `Ancestors`.
pub fn expand_search_paths(
    search_paths: &[SearchPath],
    app_name: &str,
    start: Option<&Path>,
) -> Vec<PathBuf> {
    search_paths
        .iter()
        .flat_map(|sp| search_dirs(sp, app_name, start))
        .collect()
}

/// Discover `file_name` across `search_paths` and load what is found.
pub fn discover(
    search_paths: &[SearchPath],
    file_name: &str,
    app_name: &str,
    mode: SearchMode,
) -> Result<Vec<Document>, LayerfigError> {
    let dirs = expand_search_paths(search_paths, app_name, None);
    match mode {
        SearchMode::Merge => load_all(&dirs, file_name),
        SearchMode::FirstMatch => load_first_match(&dirs, file_name),
    }
}

/// Every file found, in priority order.
fn load_all(dirs: &[PathBuf], file_name: &str) -> Result<Vec<Document>, LayerfigError> {
    let mut documents = Vec::new();
    for dir in dirs {
        if let Some(document) = try_read(&dir.join(file_name))? {
            documents.push(document);
        }
    }
    Ok(documents)
}

/// The highest-priority file found, searching from the end of the list.
fn load_first_match(dirs: &[PathBuf], file_name: &str) -> Result<Vec<Document>, LayerfigError> {
    for dir in dirs.iter().rev() {
        if let Some(document) = try_read(&dir.join(file_name))? {
            return Ok(vec![document]);
        }
    }
    Ok(vec![])
}

/// Read a file the caller named explicitly. It must exist.
pub fn read_document(path: &Path) -> Result<Document, LayerfigError> {
    let content = std::fs::read(path).map_err(|source| LayerfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(Document::new(
        path.display().to_string(),
        content,
        Format::from_path(path),
    ))
}

fn try_read(path: &Path) -> Result<Option<Document>, LayerfigError> {
    match read_document(path) {
        Ok(document) => Ok(Some(document)),
        Err(LayerfigError::IoError { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            trace!(path = %path.display(), "no config file");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn paths(dirs: &[&TempDir]) -> Vec<SearchPath> {
        dirs.iter()
            .map(|d| SearchPath::Path(d.path().to_path_buf()))
            .collect()
    }

    fn text(document: &Document) -> &str {
        std::str::from_utf8(&document.content).unwrap()
    }

    #[test]
    fn no_files_exist() {
        let dir = TempDir::new().unwrap();
        let docs = discover(&paths(&[&dir]), "app.yaml", "test", SearchMode::Merge).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn merge_returns_all_in_priority_order() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        let dir3 = TempDir::new().unwrap();
        fs::write(dir1.path().join("app.yaml"), "host: a\n").unwrap();
        fs::write(dir3.path().join("app.yaml"), "port: 1000\n").unwrap();

        let docs = discover(&paths(&[&dir1, &dir2, &dir3]), "app.yaml", "test", SearchMode::Merge)
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(text(&docs[0]).contains("host"));
        assert!(text(&docs[1]).contains("port"));
        assert_eq!(docs[1].format, Format::Yaml);
    }

    #[test]
    fn first_match_returns_highest_priority() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        fs::write(dir1.path().join("app.toml"), "host = \"low\"\n").unwrap();
        fs::write(dir2.path().join("app.toml"), "host = \"high\"\n").unwrap();

        let docs = discover(&paths(&[&dir1, &dir2]), "app.toml", "test", SearchMode::FirstMatch)
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(text(&docs[0]).contains("high"));
        assert_eq!(docs[0].format, Format::Toml);
    }

    #[test]
    fn first_match_falls_back_to_lower_priority() {
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();
        fs::write(dir1.path().join("app.toml"), "host = \"fallback\"\n").unwrap();

        let docs = discover(&paths(&[&dir1, &dir2]), "app.toml", "test", SearchMode::FirstMatch)
            .unwrap();
        assert!(text(&docs[0]).contains("fallback"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_returns_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("app.yaml");
        fs::write(&file_path, "port: 1\n").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits, so only check when the read really fails.
        if fs::read(&file_path).is_err() {
            let result = discover(&paths(&[&dir]), "app.yaml", "test", SearchMode::Merge);
            assert!(matches!(result, Err(LayerfigError::IoError { .. })));
        }

        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = read_document(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, LayerfigError::IoError { .. }));
    }

    #[test]
    fn explicit_file_origin_is_its_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();
        let document = read_document(&path).unwrap();
        assert_eq!(document.origin, path.display().to_string());
        assert_eq!(document.format, Format::Json);
    }

    // --- Ancestors ---

    #[test]
    fn ancestors_marker_stops_at_marker() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        fs::create_dir(dir.path().join("a").join(".git")).unwrap();

        let dirs = expand_ancestors_from(&deep, &Boundary::Marker(".git"));
        assert_eq!(
            dirs,
            vec![
                dir.path().join("a"),
                dir.path().join("a").join("b"),
                deep.clone(),
            ]
        );
    }

    #[test]
    fn ancestors_missing_marker_walks_to_root() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("x").join("y");
        fs::create_dir_all(&deep).unwrap();

        let dirs = expand_ancestors_from(&deep, &Boundary::Marker(".nonexistent"));
        assert!(dirs.contains(&dir.path().to_path_buf()));
        assert_eq!(dirs.last(), Some(&deep));
        for pair in dirs.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }
    }

    #[test]
    fn search_paths_mix_single_and_ancestors() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a").join("b");
        fs::create_dir_all(&deep).unwrap();
        fs::create_dir(dir.path().join("a").join(".marker")).unwrap();
        let explicit = TempDir::new().unwrap();

        let search = vec![
            SearchPath::Path(explicit.path().to_path_buf()),
            SearchPath::Ancestors(Boundary::Marker(".marker")),
        ];
        let dirs = expand_search_paths(&search, "test", Some(&deep));
        assert_eq!(
            dirs,
            vec![explicit.path().to_path_buf(), dir.path().join("a"), deep.clone()]
        );
    }

    #[test]
    fn ancestors_first_match_finds_nearest() {
        let root = TempDir::new().unwrap();
        let mid = root.path().join("mid");
        let deep = mid.join("deep");
        fs::create_dir_all(&deep).unwrap();
        fs::write(mid.join("app.yaml"), "host: mid\n").unwrap();
        fs::write(root.path().join("app.yaml"), "host: root\n").unwrap();

        let dirs = vec![root.path().to_path_buf(), mid.clone(), deep.clone()];
        let docs = load_first_match(&dirs, "app.yaml").unwrap();
        assert!(text(&docs[0]).contains("mid"));

        let docs = load_all(&dirs, "app.yaml").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(text(&docs[0]).contains("root"));
    }
}
