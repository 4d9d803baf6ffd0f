//! Program execution

use serde_json::Value;

use super::context::{Context, Locals};
use super::program::{OpKind, Program};
use crate::strata::error::{Error, Result};
use crate::strata::script::{evaluate, is_truthy, render_value, Scope, ScriptError};

/// Nested includes deeper than this fail instead of recursing forever.
pub const MAX_INCLUDE_DEPTH: usize = 64;

struct LoopFrame {
    vars: Vec<String>,
    items: std::vec::IntoIter<Vec<Value>>,
    /// Loop variables' values from before the loop, restored when it ends
    saved: Vec<(String, Option<Value>)>,
}

/// What each pass of a loop binds, one value per loop variable.
fn iteration_items(value: Value, arity: usize) -> std::result::Result<Vec<Vec<Value>>, ScriptError> {
    let pair = arity == 2;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                if pair {
                    vec![Value::from(i), item]
                } else {
                    vec![item]
                }
            })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, item)| {
                if pair {
                    vec![Value::String(key), item]
                } else {
                    vec![Value::String(key)]
                }
            })
            .collect()),
        other => Err(ScriptError::Eval(format!(
            "cannot loop over {}",
            match other {
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                _ => "a boolean",
            }
        ))),
    }
}

fn bind(ctx: &mut Context<'_>, vars: &[String], values: Vec<Value>) {
    for (name, value) in vars.iter().zip(values) {
        ctx.set_local(name.clone(), value);
    }
}

/// Run a program, writing its output to the context's buffer.
pub(crate) fn execute(program: &Program, ctx: &mut Context<'_>) -> Result<()> {
    let ops = program.ops();
    let mut frames: Vec<LoopFrame> = Vec::new();
    let mut pc = 0;

    while let Some(op) = ops.get(pc) {
        pc += 1;
        let fail = |e: ScriptError| program.fail(op, e);

        match &op.kind {
            OpKind::Literal(text) => ctx.write(text),
            OpKind::Emit { expr, escape } => {
                let text = render_value(&evaluate(expr, &*ctx).map_err(fail)?);
                if *escape {
                    let escaped = ctx.escape(&text);
                    ctx.write(&escaped);
                } else {
                    ctx.write(&text);
                }
            }
            OpKind::Assign { name, value } => {
                let value = evaluate(value, &*ctx).map_err(fail)?;
                ctx.set_local(name.clone(), value);
            }
            OpKind::Eval(expr) => {
                evaluate(expr, &*ctx).map_err(fail)?;
            }
            OpKind::Include { name, locals } => {
                let name = render_value(&evaluate(name, &*ctx).map_err(fail)?);
                let mut extra = Locals::new();
                for (key, expr) in locals {
                    extra.insert(key.clone(), evaluate(expr, &*ctx).map_err(fail)?);
                }
                if ctx.depth() >= MAX_INCLUDE_DEPTH {
                    return Err(Error::Runtime {
                        position: program.position(op),
                        message: format!(
                            "include of '{}' exceeds the maximum depth of {}",
                            name, MAX_INCLUDE_DEPTH
                        ),
                    });
                }
                ctx.include(&name, extra)?;
            }
            OpKind::JumpUnless { condition, target } => {
                if !is_truthy(&evaluate(condition, &*ctx).map_err(fail)?) {
                    pc = *target;
                }
            }
            OpKind::Jump(target) => pc = *target,
            OpKind::LoopStart {
                vars,
                iterable,
                exit,
            } => {
                let value = evaluate(iterable, &*ctx).map_err(fail)?;
                let mut items = iteration_items(value, vars.len())
                    .map_err(fail)?
                    .into_iter();
                let Some(first) = items.next() else {
                    pc = *exit;
                    continue;
                };
                let saved = vars
                    .iter()
                    .map(|name| (name.clone(), ctx.local(name).cloned()))
                    .collect();
                bind(ctx, vars, first);
                frames.push(LoopFrame {
                    vars: vars.clone(),
                    items,
                    saved,
                });
            }
            OpKind::LoopNext { body } => {
                let Some(frame) = frames.last_mut() else {
                    return Err(program.fail(op, ScriptError::Eval("loop end without a loop".to_string())));
                };
                match frame.items.next() {
                    Some(values) => {
                        bind(ctx, &frame.vars, values);
                        pc = *body;
                    }
                    None => {
                        if let Some(frame) = frames.pop() {
                            for (name, value) in frame.saved {
                                match value {
                                    Some(value) => ctx.set_local(name, value),
                                    None => ctx.remove_local(&name),
                                };
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
