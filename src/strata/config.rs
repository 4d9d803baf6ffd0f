//! Engine configuration
//!
//! `defaults/strata.default.toml` is embedded into the crate so documented defaults and
//! runtime behavior stay in sync. User files and command-line overrides are layered on
//! top through [ConfigLoader] before deserializing into [EngineConfig].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;

use super::escape::{self, EscapeFn};
use super::runtime::MissingVariablePolicy;
use super::syntax::Syntax;

const DEFAULT_TOML: &str = include_str!("../../defaults/strata.default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub roots: Vec<PathBuf>,
    pub default_format: String,
    pub extension: String,
    pub syntax: SyntaxName,
    pub cache: bool,
    pub escape: EscapeMode,
    pub strict_variables: bool,
}

impl EngineConfig {
    pub fn missing_variables(&self) -> MissingVariablePolicy {
        if self.strict_variables {
            MissingVariablePolicy::Strict
        } else {
            MissingVariablePolicy::Empty
        }
    }
}

/// The built-in tag syntaxes, by configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyntaxName {
    FirstPass,
    SecondPass,
}

impl SyntaxName {
    pub fn syntax(self) -> Arc<Syntax> {
        match self {
            SyntaxName::FirstPass => Syntax::first_pass(),
            SyntaxName::SecondPass => Syntax::second_pass(),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "first-pass" => Some(SyntaxName::FirstPass),
            "second-pass" => Some(SyntaxName::SecondPass),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyntaxName::FirstPass => "first-pass",
            SyntaxName::SecondPass => "second-pass",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscapeMode {
    None,
    Html,
}

impl EscapeMode {
    pub fn function(self) -> Arc<EscapeFn> {
        match self {
            EscapeMode::None => Arc::new(escape::identity),
            EscapeMode::Html => Arc::new(escape::html),
        }
    }
}

/// Collects engine settings, layering TOML files and CLI flags over `strata.default.toml`.
///
/// Later layers win key by key: a file that sets only `cache` keeps the default roots
/// and syntax, and a `--syntax` flag beats any file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    builder: ConfigBuilder<DefaultState>,
}

impl ConfigLoader {
    /// Settings as shipped: `roots = ["."]`, first-pass syntax, HTML escaping, no cache.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Read a TOML file named explicitly, e.g. by `--config`. Fails at [build](Self::build) if absent.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Read a TOML file that may not exist; an absent file adds no settings.
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Pin one key, e.g. `roots` from repeated `--root` flags, above every file.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge the layers and check the result against [EngineConfig]; unknown syntax or
    /// escape names fail here.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<EngineConfig, ConfigError> {
    ConfigLoader::new().build()
}
