//! Template loaders
//!
//!     A [Loader] turns template names into sources and compiled templates. Parents named
//!     by `extends` are read through [Loader::source]; includes go through
//!     [Loader::template] so caching loaders can serve them compiled.
//!
//!     File names are built as `{name}.{format}.{extension}`, e.g. `layouts/base.html.tpl`,
//!     and tried against each root directory in order. Absolute names skip the roots.
//!
//!     [CachedFileLoader] keeps compiled templates keyed by name and recompiles a template
//!     when the modification time of its file, or of any parent it extends, moves forward.
//!     Per-name locks make concurrent first loads of one template compile it once. Failed
//!     loads leave nothing behind in the cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use super::error::{Error, Result};
use super::syntax::Syntax;
use super::template::Template;

pub const DEFAULT_EXTENSION: &str = "tpl";

/// Template text and where it came from.
#[derive(Debug, Clone)]
pub struct Source {
    /// The name it was requested by
    pub name: String,
    /// Label used in positions and errors, the file path for files
    pub origin: Arc<str>,
    pub text: String,
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
}

impl Source {
    /// A source that lives only in memory.
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Source {
            origin: Arc::from(name.as_str()),
            name,
            text: text.into(),
            path: None,
            modified: None,
        }
    }
}

/// A parent file a compiled template was built from, as it was when read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
}

impl Dependency {
    /// Whether the file on disk is newer than what was read. Missing files count as unchanged.
    pub fn is_stale(&self) -> bool {
        self.path
            .as_deref()
            .map_or(false, |path| is_stale(modified(path), self.modified))
    }
}

impl From<&Source> for Dependency {
    fn from(source: &Source) -> Self {
        Dependency {
            name: source.name.clone(),
            path: source.path.clone(),
            modified: source.modified,
        }
    }
}

pub trait Loader: Send + Sync {
    /// The syntax every template from this loader is written in.
    fn syntax(&self) -> &Syntax;

    fn source(&self, name: &str) -> Result<Source>;

    fn template(&self, name: &str) -> Result<Arc<Template>>;
}

/// Reads templates of one format from a list of root directories.
#[derive(Debug, Clone)]
pub struct FileLoader {
    roots: Vec<PathBuf>,
    format: String,
    extension: String,
    syntax: Arc<Syntax>,
}

impl FileLoader {
    pub fn new<I, P>(roots: I, format: impl Into<String>, syntax: Arc<Syntax>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        FileLoader {
            roots: roots.into_iter().map(Into::into).collect(),
            format: format.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            syntax,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name(&self, name: &str) -> String {
        format!("{}.{}.{}", name, self.format, self.extension)
    }

    /// The first existing file for `name`, if any.
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        let file_name = self.file_name(name);
        let direct = Path::new(&file_name);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    fn not_found(&self, name: &str) -> Error {
        Error::UnknownTemplate {
            roots: self.roots.clone(),
            name: name.to_string(),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

impl Loader for FileLoader {
    fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    fn source(&self, name: &str) -> Result<Source> {
        let path = self.path(name).ok_or_else(|| self.not_found(name))?;
        let text = fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(template = name, path = %path.display(), "read template");
        Ok(Source {
            name: name.to_string(),
            origin: Arc::from(path.to_string_lossy().as_ref()),
            text,
            modified: modified(&path),
            path: Some(path),
        })
    }

    fn template(&self, name: &str) -> Result<Arc<Template>> {
        let source = self.source(name)?;
        Ok(Arc::new(Template::compile(&source, self)?))
    }
}

struct CacheEntry {
    template: Arc<Template>,
    modified: Option<SystemTime>,
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// A [FileLoader] that keeps compiled templates and recompiles them when they change.
pub struct CachedFileLoader {
    files: FileLoader,
    cache: Mutex<HashMap<String, Slot>>,
}

impl CachedFileLoader {
    pub fn new(files: FileLoader) -> Self {
        CachedFileLoader {
            files,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn files(&self) -> &FileLoader {
        &self.files
    }

    fn slot(&self, name: &str) -> Slot {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.entry(name.to_string()).or_default().clone()
    }

    /// Forget an empty slot, unless another caller has already replaced it.
    fn release(&self, name: &str, slot: &Slot) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.get(name).map_or(false, |held| Arc::ptr_eq(held, slot)) {
            cache.remove(name);
        }
    }

    /// Drop the compiled template for `name`.
    pub fn invalidate(&self, name: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.remove(name);
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether a compiled template for `name` is currently held.
    pub fn is_cached(&self, name: &str) -> bool {
        let slot = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        slot.map_or(false, |slot| {
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })
    }
}

fn is_stale(current: Option<SystemTime>, cached: Option<SystemTime>) -> bool {
    match (current, cached) {
        (Some(current), Some(cached)) => current > cached,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

impl Loader for CachedFileLoader {
    fn syntax(&self) -> &Syntax {
        self.files.syntax()
    }

    fn source(&self, name: &str) -> Result<Source> {
        self.files.source(name)
    }

    fn template(&self, name: &str) -> Result<Arc<Template>> {
        let slot = self.slot(name);
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = entry.as_ref() {
            match self.files.path(name) {
                None => {
                    tracing::debug!(template = name, "source is gone, serving cached template");
                    return Ok(cached.template.clone());
                }
                Some(path) if is_stale(modified(&path), cached.modified) => {
                    tracing::debug!(template = name, path = %path.display(), "template changed, recompiling");
                }
                Some(_) => match cached.template.parents().iter().find(|dep| dep.is_stale()) {
                    Some(parent) => {
                        tracing::debug!(template = name, parent = %parent.name, "parent template changed, recompiling");
                    }
                    None => {
                        tracing::trace!(template = name, "template cache hit");
                        return Ok(cached.template.clone());
                    }
                },
            }
        }

        let compiled = self.files.source(name).and_then(|source| {
            let template = Template::compile(&source, self)?;
            Ok((Arc::new(template), source.modified))
        });
        match compiled {
            Ok((template, modified)) => {
                *entry = Some(CacheEntry {
                    template: template.clone(),
                    modified,
                });
                Ok(template)
            }
            Err(err) => {
                if entry.is_none() {
                    drop(entry);
                    self.release(name, &slot);
                }
                Err(err)
            }
        }
    }
}

/// Templates held in memory, mostly for tests and string rendering.
pub struct MemoryLoader {
    syntax: Arc<Syntax>,
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new(syntax: Arc<Syntax>) -> Self {
        MemoryLoader {
            syntax,
            sources: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(name.into(), text.into());
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }
}

impl Loader for MemoryLoader {
    fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    fn source(&self, name: &str) -> Result<Source> {
        self.sources
            .get(name)
            .map(|text| Source::inline(name, text.as_str()))
            .ok_or_else(|| Error::UnknownTemplate {
                roots: Vec::new(),
                name: name.to_string(),
            })
    }

    fn template(&self, name: &str) -> Result<Arc<Template>> {
        let source = self.source(name)?;
        Ok(Arc::new(Template::compile(&source, self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, text: &str) -> PathBuf {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn bump_mtime(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        let current = file.metadata().unwrap().modified().unwrap();
        file.set_modified(current + by).unwrap();
    }

    #[test]
    fn test_roots_are_searched_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write(second.path(), "page.html.tpl", "second");
        write(second.path(), "shared.html.tpl", "second shared");
        write(first.path(), "shared.html.tpl", "first shared");

        let loader = FileLoader::new(
            [first.path(), second.path()],
            "html",
            Syntax::first_pass(),
        );
        assert_eq!(loader.source("page").unwrap().text, "second");
        assert_eq!(loader.source("shared").unwrap().text, "first shared");
    }

    #[test]
    fn test_absolute_names_skip_roots() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "abs.rss.tpl", "absolute");
        let name = dir.path().join("abs");
        let loader = FileLoader::new(Vec::<PathBuf>::new(), "rss", Syntax::first_pass());
        let source = loader.source(name.to_str().unwrap()).unwrap();
        assert_eq!(source.text, "absolute");
    }

    #[test]
    fn test_unknown_template_lists_roots() {
        let dir = TempDir::new().unwrap();
        let loader = FileLoader::new([dir.path()], "html", Syntax::first_pass());
        match loader.source("missing").unwrap_err() {
            Error::UnknownTemplate { roots, name } => {
                assert_eq!(roots, vec![dir.path().to_path_buf()]);
                assert_eq!(name, "missing");
            }
            other => panic!("expected unknown template, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_extension() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "mail.txt.tmpl", "hello");
        let loader =
            FileLoader::new([dir.path()], "txt", Syntax::first_pass()).with_extension("tmpl");
        assert_eq!(loader.source("mail").unwrap().text, "hello");
    }

    #[test]
    fn test_cache_reuses_until_file_changes() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "page.html.tpl", "one");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));

        let first = loader.template("page").unwrap();
        let again = loader.template("page").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(loader.is_cached("page"));

        fs::write(&path, "two").unwrap();
        bump_mtime(&path, Duration::from_secs(5));
        let changed = loader.template("page").unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(changed.program().literal_text(), "two");
    }

    #[test]
    fn test_cache_recompiles_when_a_parent_changes() {
        let dir = TempDir::new().unwrap();
        let base = write(
            dir.path(),
            "base.html.tpl",
            "<h1>%{ block title }old%{ endblock }</h1>",
        );
        write(dir.path(), "page.html.tpl", "%{ extends 'base' }");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));

        let first = loader.template("page").unwrap();
        assert_eq!(first.parents().len(), 1);
        assert!(Arc::ptr_eq(&first, &loader.template("page").unwrap()));

        fs::write(&base, "<h2>%{ block title }new%{ endblock }</h2>").unwrap();
        bump_mtime(&base, Duration::from_secs(5));
        let changed = loader.template("page").unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(changed.program().literal_text(), "<h2>new</h2>");
        assert!(Arc::ptr_eq(&changed, &loader.template("page").unwrap()));
    }

    #[test]
    fn test_concurrent_cold_loads_share_one_template() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "page.html.tpl", "%{ for n in ns }${ n }%{ end }");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));

        let loaded: Vec<Arc<Template>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| loader.template("page").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(loaded.iter().all(|t| Arc::ptr_eq(t, &loaded[0])));
        assert!(Arc::ptr_eq(&loaded[0], &loader.template("page").unwrap()));
    }

    #[test]
    fn test_failed_lookups_leave_no_slots() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.html.tpl", "${ broken {");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));
        for name in ["missing", "broken", "also/missing"] {
            assert!(loader.template(name).is_err());
        }
        assert!(loader.cache.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cache_serves_deleted_template() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "page.html.tpl", "kept");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));
        let first = loader.template("page").unwrap();
        fs::remove_file(&path).unwrap();
        let served = loader.template("page").unwrap();
        assert!(Arc::ptr_eq(&first, &served));

        loader.invalidate("page");
        assert!(matches!(
            loader.template("page"),
            Err(Error::UnknownTemplate { .. })
        ));
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "page.html.tpl", "${ broken {");
        let loader = CachedFileLoader::new(FileLoader::new(
            [dir.path()],
            "html",
            Syntax::first_pass(),
        ));
        assert!(loader.template("page").is_err());
        assert!(!loader.is_cached("page"));
        fs::write(&path, "fixed").unwrap();
        assert!(loader.template("page").is_ok());
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new(Syntax::first_pass()).with("a", "${ 1 + 1 }");
        assert_eq!(loader.source("a").unwrap().origin.as_ref(), "a");
        assert!(matches!(
            loader.source("b"),
            Err(Error::UnknownTemplate { .. })
        ));
    }
}
