use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::backend::EnvResolver;
use crate::document::Document;
use crate::env::Environment;
use crate::error::{LayerfigError, ValidationError};
use crate::file;
use crate::record::Record;
use crate::resolve::{self, ResolveInput};
use crate::resolver::{CancelToken, Context, Resolver, Resolvers};
use crate::types::{Format, SearchMode, SearchPath};

type Validator<C> = Box<dyn Fn(&C) -> Result<(), Vec<ValidationError>>>;

/// Entry point for building a layerfig load.
pub struct Layerfig;

impl Layerfig {
    pub fn builder<C: Record>() -> LayerfigBuilder<C> {
        LayerfigBuilder::new()
    }
}

/// Builder for configuring and running one load.
///
/// Document layers come from three places, lowest priority first:
///
/// - **Discovery**: [`search_paths()`](Self::search_paths) and
///   [`search_mode()`](Self::search_mode), active once an
///   [`app_name()`](Self::app_name) or [`file_name()`](Self::file_name) is set.
/// - **Explicit files**: [`file()`](Self::file), in call order.
/// - **In-memory documents**: [`document()`](Self::document), in call order.
///
/// Overrides from [`set_override()`](Self::set_override) sit above every
/// document; `env` tags sit above the overrides.
pub struct LayerfigBuilder<C> {
    app_name: Option<String>,
    file_name: Option<String>,
    search_paths: Option<Vec<SearchPath>>,
    search_mode: SearchMode,
    files: Vec<PathBuf>,
    documents: Vec<Document>,
    env_prefix: Option<String>,
    env_enabled: bool,
    env_vars: Option<Vec<(String, String)>>,
    resolvers: Option<Resolvers>,
    extra_resolvers: Vec<(String, Arc<dyn Resolver>)>,
    deadline: Option<Duration>,
    cancel_token: Option<CancelToken>,
    strict: bool,
    template_documents: bool,
    overrides: Vec<(String, Value)>,
    validator: Option<Validator<C>>,
    _phantom: PhantomData<C>,
}

impl<C: Record> LayerfigBuilder<C> {
    fn new() -> Self {
        Self {
            app_name: None,
            file_name: None,
            search_paths: None,
            search_mode: SearchMode::default(),
            files: Vec::new(),
            documents: Vec::new(),
            env_prefix: None,
            env_enabled: true,
            env_vars: None,
            resolvers: None,
            extra_resolvers: Vec::new(),
            deadline: None,
            cancel_token: None,
            strict: true,
            template_documents: false,
            overrides: Vec::new(),
            validator: None,
            _phantom: PhantomData,
        }
    }

    /// Set the application name. This enables discovery with defaults:
    /// - `file_name` → `"{app_name}.yaml"`
    /// - `search_paths` → `[SearchPath::Platform]`
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Override the discovered file name (default: `"{app_name}.yaml"`).
    /// The extension picks the format.
    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Replace the default search paths entirely.
    ///
    /// Paths are listed in **priority-ascending** order: the last entry has the
    /// highest priority. See [`SearchPath`] for the available variants.
    pub fn search_paths(mut self, paths: Vec<SearchPath>) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// Append a search path without replacing the defaults.
    /// If no paths have been set yet, starts from the default `[Platform]`.
    pub fn add_search_path(mut self, path: SearchPath) -> Self {
        self.search_paths
            .get_or_insert_with(|| vec![SearchPath::Platform])
            .push(path);
        self
    }

    /// Set the search mode (default: [`SearchMode::Merge`]).
    ///
    /// - [`Merge`](SearchMode::Merge): all found files are deep-merged,
    ///   later (higher-priority) files overriding earlier ones.
    /// - [`FirstMatch`](SearchMode::FirstMatch): only the single highest-priority
    ///   file found is used.
    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    /// Add an in-memory document. `origin` names it in error messages.
    pub fn document(mut self, origin: &str, content: impl Into<Vec<u8>>, format: Format) -> Self {
        self.documents.push(Document::new(origin, content, format));
        self
    }

    /// Add a file that must exist. The extension picks the format.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    /// Prefix for `env` attribute names and `${env:..}` lookups. With
    /// `"MYAPP"`, `env = "PORT"` reads `MYAPP_PORT`.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Disable environment lookups entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Read variables from `vars` instead of the process environment.
    ///
    /// Unless a registry is supplied with [`resolvers()`](Self::resolvers),
    /// `env://` references read the same variables.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Register a backend for `scheme` on top of the registry in use.
    pub fn resolver(mut self, scheme: &str, resolver: impl Resolver + 'static) -> Self {
        self.extra_resolvers
            .push((scheme.to_string(), Arc::new(resolver)));
        self
    }

    /// Use `resolvers` instead of [`Resolvers::with_defaults`].
    pub fn resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    /// Bound the whole load. Fields applied before the deadline keep their values.
    pub fn deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Enable or disable strict mode (default: `true`).
    /// In strict mode, unknown keys in documents and overrides produce errors.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Expand `${env:..}` and `${ref:..}` in raw documents before parsing
    /// (default: `false`).
    pub fn template_documents(mut self, enabled: bool) -> Self {
        self.template_documents = enabled;
        self
    }

    /// Set a dotted key above every document. Later calls win.
    pub fn set_override(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Run `validator` on the populated record. Its errors become
    /// [`LayerfigError::Validation`].
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&C) -> Result<(), Vec<ValidationError>> + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// The file name discovery looks for, or `None` when discovery is off.
    fn effective_file_name(&self) -> Option<String> {
        if let Some(name) = &self.file_name {
            return Some(name.clone());
        }
        self.app_name.as_ref().map(|app| format!("{app}.yaml"))
    }

    fn effective_search_paths(&self) -> Vec<SearchPath> {
        if let Some(paths) = &self.search_paths {
            return paths.clone();
        }
        vec![SearchPath::Platform]
    }

    /// The env prefix in use (None if env disabled or unprefixed).
    fn effective_env_prefix(&self) -> Option<&str> {
        if !self.env_enabled {
            return None;
        }
        self.env_prefix.as_deref()
    }

    fn effective_environment(&self) -> Environment {
        if !self.env_enabled {
            return Environment::empty();
        }
        let prefix = self.effective_env_prefix();
        match &self.env_vars {
            Some(vars) => Environment::from_vars(prefix, vars.iter().cloned()),
            None => Environment::from_process(prefix),
        }
    }

    fn effective_resolvers(&self) -> Resolvers {
        let mut resolvers = match &self.resolvers {
            Some(shared) => shared.clone(),
            None => {
                let mut defaults = Resolvers::with_defaults();
                if !self.env_enabled {
                    defaults.register(
                        "env",
                        EnvResolver::from_vars(Vec::<(String, String)>::new()),
                    );
                } else if let Some(vars) = &self.env_vars {
                    defaults.register("env", EnvResolver::from_vars(vars.iter().cloned()));
                }
                defaults
            }
        };
        for (scheme, resolver) in &self.extra_resolvers {
            resolvers.register_shared(scheme, resolver.clone());
        }
        resolvers
    }

    fn effective_context(&self) -> Context {
        let mut context = Context::new();
        if let Some(timeout) = self.deadline {
            context = context.with_timeout(timeout);
        }
        if let Some(token) = &self.cancel_token {
            context = context.with_cancel_token(token.clone());
        }
        context
    }

    /// Discovered files first, then explicit files, then in-memory documents.
    fn collect_documents(&mut self) -> Result<Vec<Document>, LayerfigError> {
        let mut documents = Vec::new();

        match self.effective_file_name() {
            Some(file_name) => {
                let app_name = self.app_name.as_deref().unwrap_or_default();
                let search_paths = self.effective_search_paths();
                if app_name.is_empty() && search_paths.contains(&SearchPath::Platform) {
                    return Err(LayerfigError::AppNameRequired);
                }
                documents.extend(file::discover(
                    &search_paths,
                    &file_name,
                    app_name,
                    self.search_mode,
                )?);
            }
            None if self.search_paths.is_some() => return Err(LayerfigError::AppNameRequired),
            None => {}
        }

        for path in &self.files {
            documents.push(file::read_document(path)?);
        }
        documents.append(&mut self.documents);
        Ok(documents)
    }

    /// Build the `ResolveInput` from current builder state.
    fn build_input(&mut self) -> Result<ResolveInput, LayerfigError> {
        let documents = self.collect_documents()?;
        debug!(documents = documents.len(), "collected documents");
        Ok(ResolveInput {
            documents,
            env: self.effective_environment(),
            overrides: std::mem::take(&mut self.overrides),
            strict: self.strict,
            template_documents: self.template_documents,
        })
    }

    fn validate(&self, record: &C) -> Result<(), LayerfigError> {
        match &self.validator {
            Some(validator) => validator(record).map_err(LayerfigError::Validation),
            None => Ok(()),
        }
    }

    /// Load and resolve the record through all layers.
    pub fn load(mut self) -> Result<C, LayerfigError>
    where
        C: DeserializeOwned + Default,
    {
        let resolvers = self.effective_resolvers();
        let context = self.effective_context();
        let input = self.build_input()?;
        let record = resolve::resolve(input, &resolvers, &context)?;
        self.validate(&record)?;
        Ok(record)
    }

    /// Run env, references, defaults and derived values on a record the
    /// caller already holds. Documents and overrides are not consulted.
    pub fn populate(self, record: &mut C) -> Result<(), LayerfigError> {
        let env = self.effective_environment();
        let resolvers = self.effective_resolvers();
        let context = self.effective_context();
        resolve::walk(
            record,
            &env,
            &resolvers,
            &context,
            C::descriptor().type_name,
        )?;
        self.validate(record)
    }
}
