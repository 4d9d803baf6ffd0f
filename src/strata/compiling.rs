//! Program compiler
//!
//!     Flattens a resolved [BlockSet] into one ordered instruction list. The slots are
//!     visited in the block order of the chain's root; each block's nodes are visited in
//!     source order:
//!
//!         Text               → EmitLiteral (leading blank run removed after a strip marker)
//!         Expression         → EmitExpression { escape: false }
//!         EscapedExpression  → EmitExpression { escape: true }
//!         Statement          → ExecStatement
//!         Comment            → EmitBlankLines (one per line break the comment spanned)
//!         blocksuper         → the parent block's instructions, spliced in place
//!
//!     EmitBlankLines produces no output. It keeps the program's line accounting equal to
//!     the source's, and every instruction carries the [Position] it was compiled from, so
//!     a failure while rendering is reported against the original template line.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::building::{Block, BlockSet, Item};
use super::error::{Position, Result};
use super::parsing::NodeKind;

static LEADING_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\s*?[\r\n]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    EmitLiteral { text: String },
    EmitExpression { code: String, escape: bool },
    ExecStatement { code: String },
    EmitBlankLines { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
    pub instruction: Instruction,
    pub position: Position,
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

fn push(out: &mut Vec<Located>, origin: &Arc<str>, line: usize, instruction: Instruction) {
    out.push(Located {
        instruction,
        position: Position::new(origin.clone(), line),
    });
}

/// Remove the leading blank-line run, up to and including the first line break run.
/// Returns the remaining text and how many line breaks were removed.
pub fn strip_leading_blank_run(text: &str) -> (&str, usize) {
    match LEADING_BLANK_RUN.find(text) {
        Some(found) => (&text[found.end()..], count_lines(found.as_str())),
        None => (text, 0),
    }
}

/// Compile a single block, with any resolved super calls spliced in.
pub fn compile_block(block: &Block) -> Vec<Located> {
    let mut out = Vec::new();
    let origin = &block.origin;
    for item in &block.items {
        let node = match item {
            Item::Super { instructions, .. } => {
                out.extend(instructions.iter().cloned());
                continue;
            }
            Item::Node(node) => node,
        };
        match &node.kind {
            NodeKind::Text {
                content,
                strip_leading,
            } => {
                let (text, stripped) = if *strip_leading {
                    strip_leading_blank_run(content)
                } else {
                    (content.as_str(), 0)
                };
                if !text.is_empty() {
                    let instruction = Instruction::EmitLiteral {
                        text: text.to_string(),
                    };
                    push(&mut out, origin, node.line + stripped, instruction);
                }
            }
            NodeKind::Expression(code) => {
                let instruction = Instruction::EmitExpression {
                    code: code.clone(),
                    escape: false,
                };
                push(&mut out, origin, node.line, instruction);
            }
            NodeKind::EscapedExpression(code) => {
                let instruction = Instruction::EmitExpression {
                    code: code.clone(),
                    escape: true,
                };
                push(&mut out, origin, node.line, instruction);
            }
            NodeKind::Statement(code) => {
                let instruction = Instruction::ExecStatement { code: code.clone() };
                push(&mut out, origin, node.line, instruction);
            }
            NodeKind::Comment(body) => {
                let instruction = Instruction::EmitBlankLines {
                    count: count_lines(body),
                };
                push(&mut out, origin, node.line, instruction);
            }
            // Directives are consumed while building and never reach a block
            NodeKind::Extends(_)
            | NodeKind::BlockStart(_)
            | NodeKind::BlockEnd
            | NodeKind::BlockSuper => {}
        }
    }
    out
}

/// Compile a resolved block set into its flat instruction list.
pub fn compile(set: &BlockSet<'_>) -> Result<Vec<Located>> {
    let order = set.block_order()?;

    if set.is_extended() {
        for block in set.named_blocks() {
            if !order.contains(&block.name) {
                tracing::warn!(
                    origin = %block.origin,
                    block = %block.name,
                    "block has no slot in the root template and will never render"
                );
            }
        }
    }

    let mut out = Vec::new();
    for name in order {
        if let Some(block) = set.block(name)? {
            out.extend(compile_block(block));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strata::building::BlockBuilder;
    use crate::strata::lexing::tokenize;
    use crate::strata::loader::{Loader, MemoryLoader};
    use crate::strata::parsing::classify;
    use crate::strata::syntax::Syntax;

    fn compile_source(text: &str) -> Vec<Instruction> {
        let loader = MemoryLoader::new(Syntax::first_pass());
        let origin: Arc<str> = Arc::from("inline");
        let tokens = tokenize(text, loader.syntax(), &origin).unwrap();
        let set = BlockBuilder::new(&loader, origin, vec!["inline".to_string()])
            .build(classify(tokens))
            .unwrap();
        compile(&set)
            .unwrap()
            .into_iter()
            .map(|located| located.instruction)
            .collect()
    }

    #[test]
    fn test_node_kinds_map_to_instructions() {
        let instructions = compile_source("a${ x }$${ y }%{ z = 1 }!{ c }");
        assert_eq!(
            instructions,
            vec![
                Instruction::EmitLiteral {
                    text: "a".to_string()
                },
                Instruction::EmitExpression {
                    code: " x ".to_string(),
                    escape: false
                },
                Instruction::EmitExpression {
                    code: " y ".to_string(),
                    escape: true
                },
                Instruction::ExecStatement {
                    code: " z = 1 ".to_string()
                },
                Instruction::EmitBlankLines { count: 0 },
            ]
        );
    }

    #[test]
    fn test_comment_keeps_line_count() {
        let instructions = compile_source("a!{ one\ntwo\nthree }b");
        assert_eq!(instructions[1], Instruction::EmitBlankLines { count: 2 });
    }

    #[test]
    fn test_positions_follow_source_lines() {
        let loader = MemoryLoader::new(Syntax::first_pass());
        let origin: Arc<str> = Arc::from("lines");
        let tokens = tokenize("one\n!{ a\nb }\n${ x }", loader.syntax(), &origin).unwrap();
        let set = BlockBuilder::new(&loader, origin, vec!["lines".to_string()])
            .build(classify(tokens))
            .unwrap();
        let program = compile(&set).unwrap();
        let last = program.last().unwrap();
        assert_eq!(
            last.instruction,
            Instruction::EmitExpression {
                code: " x ".to_string(),
                escape: false
            }
        );
        assert_eq!(last.position.line, 4);
    }

    #[test]
    fn test_strip_marker_removes_leading_blank_run_only() {
        let instructions = compile_source("%{ x = 1 -}\n\nkept\n\nalso kept");
        assert_eq!(
            instructions[1],
            Instruction::EmitLiteral {
                text: "kept\n\nalso kept".to_string()
            }
        );
    }

    #[test]
    fn test_strip_leading_blank_run() {
        assert_eq!(strip_leading_blank_run("  \n  x"), ("  x", 1));
        assert_eq!(strip_leading_blank_run("\n\nx\n"), ("x\n", 2));
        assert_eq!(strip_leading_blank_run("x\n"), ("x\n", 0));
    }
}
