//! Main module for strata library functionality

pub mod building;
pub mod compiling;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod escape;
pub mod lexing;
pub mod loader;
pub mod parsing;
pub mod runtime;
pub mod script;
pub mod syntax;
pub mod template;
