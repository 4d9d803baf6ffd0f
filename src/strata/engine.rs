//! Engine facade
//!
//!     An [Engine] ties roots, a syntax and the render settings together and hands out one
//!     loader per output format, created the first time the format is used. A caching
//!     engine uses [CachedFileLoader]s, a plain one reads and compiles on every call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use super::config::EngineConfig;
use super::conversion;
use super::error::Result;
use super::escape::{self, EscapeFn};
use super::loader::{CachedFileLoader, FileLoader, Loader, Source, DEFAULT_EXTENSION};
use super::runtime::{Context, Locals, MissingVariablePolicy, Target};
use super::syntax::Syntax;
use super::template::Template;

pub const DEFAULT_FORMAT: &str = "html";

/// Name given to templates rendered straight from a string.
const STRING_TEMPLATE: &str = "(string)";

pub struct Engine {
    roots: Vec<PathBuf>,
    syntax: Arc<Syntax>,
    extension: String,
    default_format: String,
    caching: bool,
    escape: Arc<EscapeFn>,
    missing: MissingVariablePolicy,
    loaders: Mutex<HashMap<String, Arc<dyn Loader>>>,
}

impl Engine {
    pub fn new<I, P>(roots: I, syntax: Arc<Syntax>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Engine {
            roots: roots.into_iter().map(Into::into).collect(),
            syntax,
            extension: DEFAULT_EXTENSION.to_string(),
            default_format: DEFAULT_FORMAT.to_string(),
            caching: false,
            escape: Arc::new(escape::identity),
            missing: MissingVariablePolicy::default(),
            loaders: Mutex::new(HashMap::new()),
        }
    }

    /// An engine that keeps compiled templates between renders.
    pub fn caching<I, P>(roots: I, syntax: Arc<Syntax>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut engine = Engine::new(roots, syntax);
        engine.caching = true;
        engine
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut engine = Engine::new(config.roots.iter().cloned(), config.syntax.syntax())
            .with_extension(config.extension.clone())
            .with_missing_variables(config.missing_variables());
        engine.escape = config.escape.function();
        engine.caching = config.cache;
        engine.default_format = config.default_format.clone();
        engine
    }

    pub fn with_escape<F>(mut self, escape: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.escape = Arc::new(escape);
        self
    }

    pub fn with_missing_variables(mut self, policy: MissingVariablePolicy) -> Self {
        self.missing = policy;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self.loaders_mut().clear();
        self
    }

    pub fn set_default_format(&mut self, format: impl Into<String>) {
        self.default_format = format.into();
    }

    pub fn default_format(&self) -> &str {
        &self.default_format
    }

    pub fn syntax(&self) -> &Arc<Syntax> {
        &self.syntax
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_caching(&self) -> bool {
        self.caching
    }

    fn loaders_mut(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Loader>>> {
        self.loaders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The loader for `format`, created on first use.
    pub fn loader(&self, format: &str) -> Arc<dyn Loader> {
        let mut loaders = self.loaders_mut();
        loaders
            .entry(format.to_string())
            .or_insert_with(|| {
                tracing::debug!(format, caching = self.caching, "creating loader");
                let files = FileLoader::new(self.roots.iter().cloned(), format, self.syntax.clone())
                    .with_extension(self.extension.clone());
                let loader: Arc<dyn Loader> = if self.caching {
                    Arc::new(CachedFileLoader::new(files))
                } else {
                    Arc::new(files)
                };
                loader
            })
            .clone()
    }

    pub fn template(&self, name: &str, format: &str) -> Result<Arc<Template>> {
        self.loader(format).template(name)
    }

    fn render_template(
        &self,
        template: &Template,
        loader: &dyn Loader,
        target: &dyn Target,
        locals: Locals,
    ) -> Result<String> {
        let mut ctx = Context::new(loader, target)
            .with_locals(locals)
            .with_escape(&*self.escape)
            .with_missing_variables(self.missing);
        template.render(&mut ctx)
    }

    /// Render `name` in the default format.
    pub fn render(&self, name: &str, target: &dyn Target, locals: Locals) -> Result<String> {
        self.render_format(name, &self.default_format, target, locals)
    }

    pub fn render_format(
        &self,
        name: &str,
        format: &str,
        target: &dyn Target,
        locals: Locals,
    ) -> Result<String> {
        let loader = self.loader(format);
        let template = loader.template(name)?;
        self.render_template(&template, &*loader, target, locals)
    }

    /// Render template text directly. Includes and `extends` resolve against the roots
    /// in the default format.
    pub fn render_string(&self, text: &str, target: &dyn Target, locals: Locals) -> Result<String> {
        let loader = self.loader(&self.default_format);
        let template = Template::compile(&Source::inline(STRING_TEMPLATE, text), &*loader)?;
        self.render_template(&template, &*loader, target, locals)
    }

    /// The source of `name` (default format) rewritten in another syntax.
    pub fn convert(&self, name: &str, to: &Syntax) -> Result<String> {
        let source = self.loader(&self.default_format).source(name)?;
        conversion::convert_source(&source.text, &source.origin, &self.syntax, to)
    }

    pub fn convert_string(&self, text: &str, to: &Syntax) -> Result<String> {
        conversion::convert_source(text, &Arc::from(STRING_TEMPLATE), &self.syntax, to)
    }

    /// Whether `root` holds a template file for `name` in `format`.
    pub fn template_exists(&self, root: impl AsRef<Path>, name: &str, format: &str) -> bool {
        root.as_ref()
            .join(format!("{}.{}.{}", name, format, self.extension))
            .is_file()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("roots", &self.roots)
            .field("extension", &self.extension)
            .field("default_format", &self.default_format)
            .field("caching", &self.caching)
            .field("missing", &self.missing)
            .finish_non_exhaustive()
    }
}

/// Convenience for renders that only need a JSON target.
pub fn render_json(engine: &Engine, name: &str, data: &Value) -> Result<String> {
    engine.render(name, data, Locals::new())
}
