//! Render contexts
//!
//!     A [Context] is the environment one template renders in: a target object whose
//!     members are visible as variables, a set of locals, the output buffer, the escape
//!     function and the loader used for includes. Includes render in a derived context
//!     that copies the locals, so assignments inside an included template never leak back.

use serde::Deserialize;
use serde_json::Value;

use crate::strata::error::Result;
use crate::strata::escape::{self, EscapeFn};
use crate::strata::loader::Loader;
use crate::strata::script::{Scope, ScriptError};

pub type Locals = serde_json::Map<String, Value>;

/// The object a template renders against. Its members resolve as variables after locals.
pub trait Target {
    fn member(&self, name: &str) -> Option<Value>;
}

impl Target for () {
    fn member(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Target for Value {
    fn member(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Target for Locals {
    fn member(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Locals from a JSON value. Anything but an object yields no locals.
pub fn locals_from_json(value: Value) -> Locals {
    match value {
        Value::Object(map) => map,
        _ => Locals::new(),
    }
}

/// What happens when a template reads a variable nobody defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingVariablePolicy {
    /// Resolve to nil, which renders as nothing
    #[default]
    Empty,
    /// Fail the render with a missing variable error
    Strict,
}

pub struct Context<'a> {
    target: &'a dyn Target,
    locals: Locals,
    buffer: String,
    escape: &'a EscapeFn,
    loader: &'a dyn Loader,
    missing: MissingVariablePolicy,
    parent: Option<&'a Context<'a>>,
}

impl<'a> Context<'a> {
    pub fn new(loader: &'a dyn Loader, target: &'a dyn Target) -> Self {
        Context {
            target,
            locals: Locals::new(),
            buffer: String::new(),
            escape: &escape::identity,
            loader,
            missing: MissingVariablePolicy::default(),
            parent: None,
        }
    }

    pub fn with_locals(mut self, locals: Locals) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_escape(mut self, escape: &'a EscapeFn) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_missing_variables(mut self, policy: MissingVariablePolicy) -> Self {
        self.missing = policy;
        self
    }

    pub fn loader(&self) -> &'a dyn Loader {
        self.loader
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.locals.insert(name.into(), value)
    }

    pub fn remove_local(&mut self, name: &str) -> Option<Value> {
        self.locals.remove(name)
    }

    /// How many includes deep this context is.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent;
        while let Some(context) = current {
            depth += 1;
            current = context.parent;
        }
        depth
    }

    pub fn output(&self) -> &str {
        &self.buffer
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// A context for an included template: same target, escape and loader, a copy of
    /// the locals with `extra` layered on top, and an empty buffer.
    pub fn derive(&self, extra: Locals) -> Context<'_> {
        let mut locals = self.locals.clone();
        locals.extend(extra);
        Context {
            target: self.target,
            locals,
            buffer: String::new(),
            escape: self.escape,
            loader: self.loader,
            missing: self.missing,
            parent: Some(self),
        }
    }

    /// Render `name` through the loader in a derived context and append its output.
    pub fn include(&mut self, name: &str, extra: Locals) -> Result<()> {
        let template = self.loader.template(name)?;
        tracing::debug!(template = name, depth = self.depth() + 1, "including template");
        let output = {
            let mut child = self.derive(extra);
            template.render(&mut child)?
        };
        self.buffer.push_str(&output);
        Ok(())
    }
}

impl Target for Context<'_> {
    fn member(&self, name: &str) -> Option<Value> {
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.target.member(name))
    }
}

impl Scope for Context<'_> {
    fn lookup(&self, name: &str) -> std::result::Result<Value, ScriptError> {
        match self.member(name) {
            Some(value) => Ok(value),
            None => match self.missing {
                MissingVariablePolicy::Empty => Ok(Value::Null),
                MissingVariablePolicy::Strict => Err(ScriptError::Missing(name.to_string())),
            },
        }
    }

    fn escape(&self, text: &str) -> String {
        (self.escape)(text)
    }
}
