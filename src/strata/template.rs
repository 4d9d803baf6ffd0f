//! Compiled templates

use std::sync::Arc;

use super::building::BlockBuilder;
use super::compiling::{compile, Located};
use super::conversion;
use super::error::Result;
use super::lexing::{tokenize, Token};
use super::loader::{Dependency, Loader, Source};
use super::parsing::classify;
use super::runtime::machine::execute;
use super::runtime::{Context, Program};
use super::syntax::Syntax;

/// A template compiled down to a program, ready to render any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    origin: Arc<str>,
    tokens: Vec<Token>,
    parents: Vec<Dependency>,
    program: Program,
}

impl Template {
    /// Run the whole pipeline on a source: lex, classify, resolve inheritance through
    /// `loader`, compile and link.
    pub fn compile(source: &Source, loader: &dyn Loader) -> Result<Template> {
        let tokens = tokenize(&source.text, loader.syntax(), &source.origin)?;
        let (instructions, parents) = {
            let set = BlockBuilder::new(loader, source.origin.clone(), vec![source.name.clone()])
                .build(classify(tokens.clone()))?;
            (compile(&set)?, set.dependencies())
        };
        let program = Program::link(source.origin.clone(), instructions)?;
        tracing::debug!(
            template = %source.name,
            origin = %source.origin,
            instructions = program.instructions().len(),
            "compiled template"
        );
        Ok(Template {
            name: source.name.clone(),
            origin: source.origin.clone(),
            tokens,
            parents,
            program,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &Arc<str> {
        &self.origin
    }

    /// The template's own tokens, before inheritance was resolved.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Parent files this template was built on, nearest first.
    pub fn parents(&self) -> &[Dependency] {
        &self.parents
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn instructions(&self) -> &[Located] {
        self.program.instructions()
    }

    /// Render into the context and return the output. The context's buffer is left empty.
    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String> {
        let result = execute(&self.program, ctx);
        let output = ctx.take_output();
        result.map(|()| output)
    }

    /// This template's own source rewritten in another syntax.
    pub fn convert(&self, to: &Syntax) -> Result<String> {
        conversion::convert(&self.tokens, to, &self.origin)
    }
}
