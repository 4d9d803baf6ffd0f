//! # strata
//!
//! A layered text-templating engine.
//!
//! Templates are compiled once into a flat, line-mapped program and rendered many times
//! against a data context. Templates can extend each other: a child fills the block slots
//! declared by its ultimate ancestor.
//!
//! The pipeline is laid out in [strata](crate::strata):
//! syntax → lexing → parsing → building → compiling → runtime.

pub mod strata;

pub use strata::config::{EngineConfig, SyntaxName};
pub use strata::engine::Engine;
pub use strata::error::{Error, Position, Result};
pub use strata::loader::{CachedFileLoader, Dependency, FileLoader, Loader, MemoryLoader, Source};
pub use strata::runtime::{locals_from_json, Context, Locals, MissingVariablePolicy, Target};
pub use strata::syntax::{Syntax, TagKind};
pub use strata::template::Template;
