use std::path::{Path, PathBuf};

/// Where to search for config files.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPath {
    /// Platform config directory (XDG on Linux, ~/Library/Application Support on macOS).
    Platform,
    /// A subdirectory under the user's home directory, e.g. `Home(".myapp")`.
    Home(&'static str),
    /// Current working directory.
    Cwd,
    /// An explicit absolute path.
    Path(PathBuf),
    /// The working directory and its parents up to `boundary`, shallowest
    /// first, so files closer to the working directory win.
    Ancestors(Boundary),
}

/// Where an [`Ancestors`](SearchPath::Ancestors) walk stops.
#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    /// Walk up to the filesystem root.
    Root,
    /// Stop (inclusive) at the first directory containing this name.
    Marker(&'static str),
}

/// How discovered files are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Every found file is loaded; later (higher priority) files win per key.
    #[default]
    Merge,
    /// Only the highest-priority file found is loaded.
    FirstMatch,
}

/// Document syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Guess the format from a file extension. Unknown extensions are YAML,
    /// which also reads plain JSON.
    pub fn from_path(path: &Path) -> Format {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Format::Json,
            Some("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }
}
