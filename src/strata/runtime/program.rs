//! Linking instructions into an executable program
//!
//!     Each instruction's code is parsed once, up front, and control statements are
//!     resolved into jumps:
//!
//!         if c        JumpUnless(c → next branch)
//!         elsif c     Jump(→ end)  JumpUnless(c → next branch)
//!         else        Jump(→ end)
//!         for x in e  LoopStart(→ after LoopNext)
//!         end         LoopNext(→ loop body) for loops, nothing for conditionals
//!
//!     Every op remembers the instruction it came from, and through it the template
//!     line, so failures while executing point at the source.

use std::sync::Arc;

use crate::strata::compiling::{Instruction, Located};
use crate::strata::error::{Error, Position, Result};
use crate::strata::script::{parse_expression, parse_statement, Expr, ScriptError, Statement};

/// Jump target placeholder, patched once the target is known.
const UNRESOLVED: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OpKind {
    Literal(String),
    Emit {
        expr: Expr,
        escape: bool,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Include {
        name: Expr,
        locals: Vec<(String, Expr)>,
    },
    Eval(Expr),
    JumpUnless {
        condition: Expr,
        target: usize,
    },
    Jump(usize),
    LoopStart {
        vars: Vec<String>,
        iterable: Expr,
        exit: usize,
    },
    LoopNext {
        body: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Op {
    pub kind: OpKind,
    /// Index of the instruction this op was linked from
    pub at: usize,
}

/// Open control structures while linking.
enum Open {
    Conditional {
        pending: Option<usize>,
        exits: Vec<usize>,
        seen_else: bool,
        at: usize,
    },
    Loop {
        start: usize,
        at: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Program {
    origin: Arc<str>,
    instructions: Vec<Located>,
    ops: Vec<Op>,
}

fn patch(ops: &mut [Op], index: usize, to: usize) {
    match &mut ops[index].kind {
        OpKind::JumpUnless { target, .. } | OpKind::Jump(target) => *target = to,
        OpKind::LoopStart { exit, .. } => *exit = to,
        _ => {}
    }
}

impl Program {
    /// Parse and link a compiled instruction list.
    pub fn link(origin: Arc<str>, instructions: Vec<Located>) -> Result<Program> {
        let mut ops: Vec<Op> = Vec::new();
        let mut open: Vec<Open> = Vec::new();

        for (at, located) in instructions.iter().enumerate() {
            let invalid = |message: String| Error::Compilation {
                origin: located.position.origin.clone(),
                line: located.position.line,
                message,
            };
            let parse_failed = |e: ScriptError| invalid(e.to_string());

            let kind = match &located.instruction {
                Instruction::EmitLiteral { text } => OpKind::Literal(text.clone()),
                Instruction::EmitExpression { code, escape } => OpKind::Emit {
                    expr: parse_expression(code).map_err(parse_failed)?,
                    escape: *escape,
                },
                Instruction::EmitBlankLines { .. } => continue,
                Instruction::ExecStatement { code } => {
                    match parse_statement(code).map_err(parse_failed)? {
                        Statement::Empty => continue,
                        Statement::Expr(expr) => OpKind::Eval(expr),
                        Statement::Assign { name, value } => OpKind::Assign { name, value },
                        Statement::Include { name, locals } => OpKind::Include { name, locals },
                        Statement::If(condition) => {
                            open.push(Open::Conditional {
                                pending: Some(ops.len()),
                                exits: Vec::new(),
                                seen_else: false,
                                at,
                            });
                            OpKind::JumpUnless {
                                condition,
                                target: UNRESOLVED,
                            }
                        }
                        Statement::ElseIf(condition) => {
                            let Some(Open::Conditional {
                                pending,
                                exits,
                                seen_else: false,
                                ..
                            }) = open.last_mut()
                            else {
                                return Err(invalid("elsif without a matching if".to_string()));
                            };
                            exits.push(ops.len());
                            ops.push(Op {
                                kind: OpKind::Jump(UNRESOLVED),
                                at,
                            });
                            let next = ops.len();
                            if let Some(index) = pending.take() {
                                patch(&mut ops, index, next);
                            }
                            *pending = Some(next);
                            OpKind::JumpUnless {
                                condition,
                                target: UNRESOLVED,
                            }
                        }
                        Statement::Else => {
                            let Some(Open::Conditional {
                                pending,
                                exits,
                                seen_else,
                                ..
                            }) = open.last_mut()
                            else {
                                return Err(invalid("else without a matching if".to_string()));
                            };
                            if *seen_else {
                                return Err(invalid("if has more than one else".to_string()));
                            }
                            *seen_else = true;
                            exits.push(ops.len());
                            ops.push(Op {
                                kind: OpKind::Jump(UNRESOLVED),
                                at,
                            });
                            let next = ops.len();
                            if let Some(index) = pending.take() {
                                patch(&mut ops, index, next);
                            }
                            continue;
                        }
                        Statement::For { vars, iterable } => {
                            open.push(Open::Loop {
                                start: ops.len(),
                                at,
                            });
                            OpKind::LoopStart {
                                vars,
                                iterable,
                                exit: UNRESOLVED,
                            }
                        }
                        Statement::End => match open.pop() {
                            Some(Open::Conditional { pending, exits, .. }) => {
                                let end = ops.len();
                                for index in pending.into_iter().chain(exits) {
                                    patch(&mut ops, index, end);
                                }
                                continue;
                            }
                            Some(Open::Loop { start, .. }) => {
                                ops.push(Op {
                                    kind: OpKind::LoopNext { body: start + 1 },
                                    at,
                                });
                                let end = ops.len();
                                patch(&mut ops, start, end);
                                continue;
                            }
                            None => return Err(invalid("end without an open if or for".to_string())),
                        },
                    }
                }
            };
            ops.push(Op { kind, at });
        }

        if let Some(unclosed) = open.last() {
            let (at, what) = match unclosed {
                Open::Conditional { at, .. } => (*at, "if"),
                Open::Loop { at, .. } => (*at, "for"),
            };
            let position = &instructions[at].position;
            return Err(Error::Compilation {
                origin: position.origin.clone(),
                line: position.line,
                message: format!("{} is never closed with end", what),
            });
        }

        tracing::trace!(origin = %origin, ops = ops.len(), "linked program");
        Ok(Program {
            origin,
            instructions,
            ops,
        })
    }

    pub fn origin(&self) -> &Arc<str> {
        &self.origin
    }

    /// The compiled instructions, one per source construct, with their positions.
    pub fn instructions(&self) -> &[Located] {
        &self.instructions
    }

    pub(crate) fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub(crate) fn position(&self, op: &Op) -> Position {
        self.instructions[op.at].position.clone()
    }

    /// Attach the op's template position to a script failure.
    pub(crate) fn fail(&self, op: &Op, error: ScriptError) -> Error {
        let position = self.position(op);
        match error {
            ScriptError::Missing(name) => Error::MissingVariable { name, position },
            other => Error::Runtime {
                position,
                message: other.to_string(),
            },
        }
    }

    /// Concatenation of every literal in the program, ignoring control flow.
    pub fn literal_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match &op.kind {
                OpKind::Literal(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(line: usize, instruction: Instruction) -> Located {
        Located {
            instruction,
            position: Position::new("prog", line),
        }
    }

    fn statement(line: usize, code: &str) -> Located {
        located(
            line,
            Instruction::ExecStatement {
                code: code.to_string(),
            },
        )
    }

    fn literal(line: usize, text: &str) -> Located {
        located(
            line,
            Instruction::EmitLiteral {
                text: text.to_string(),
            },
        )
    }

    fn lit(text: &str) -> OpKind {
        OpKind::Literal(text.to_string())
    }

    fn kinds(program: &Program) -> Vec<OpKind> {
        program.ops().iter().map(|op| op.kind.clone()).collect()
    }

    #[test]
    fn test_if_elsif_else_jumps() {
        let program = Program::link(
            Arc::from("prog"),
            vec![
                statement(1, "if a"),
                literal(2, "A"),
                statement(3, "elsif b"),
                literal(4, "B"),
                statement(5, "else"),
                literal(6, "C"),
                statement(7, "end"),
            ],
        )
        .unwrap();
        let var = |name: &str| Expr::Variable(name.to_string());
        assert_eq!(
            kinds(&program),
            vec![
                OpKind::JumpUnless {
                    condition: var("a"),
                    target: 3
                },
                lit("A"),
                OpKind::Jump(7),
                OpKind::JumpUnless {
                    condition: var("b"),
                    target: 6
                },
                lit("B"),
                OpKind::Jump(7),
                lit("C"),
            ]
        );
    }

    #[test]
    fn test_loop_jumps() {
        let program = Program::link(
            Arc::from("prog"),
            vec![
                statement(1, "for x in xs"),
                literal(1, "x"),
                statement(1, "end"),
                literal(2, "after"),
            ],
        )
        .unwrap();
        let ops = kinds(&program);
        assert!(matches!(ops[0], OpKind::LoopStart { exit: 3, .. }));
        assert_eq!(ops[2], OpKind::LoopNext { body: 1 });
        assert_eq!(ops[3], lit("after"));
    }

    #[test]
    fn test_blank_lines_and_empty_statements_produce_no_ops() {
        let program = Program::link(
            Arc::from("prog"),
            vec![
                located(1, Instruction::EmitBlankLines { count: 3 }),
                statement(4, "  "),
                literal(4, "x"),
            ],
        )
        .unwrap();
        assert_eq!(kinds(&program), vec![lit("x")]);
        assert_eq!(program.instructions().len(), 3);
    }

    #[test]
    fn test_unbalanced_structures_fail_at_their_line() {
        let unclosed = Program::link(
            Arc::from("prog"),
            vec![literal(1, "a"), statement(2, "if a"), literal(3, "b")],
        )
        .unwrap_err();
        assert!(matches!(unclosed, Error::Compilation { line: 2, .. }));

        let stray = Program::link(Arc::from("prog"), vec![statement(5, "end")]).unwrap_err();
        assert!(matches!(stray, Error::Compilation { line: 5, .. }));

        let double_else = Program::link(
            Arc::from("prog"),
            vec![
                statement(1, "if a"),
                statement(2, "else"),
                statement(3, "else"),
                statement(4, "end"),
            ],
        )
        .unwrap_err();
        assert!(matches!(double_else, Error::Compilation { line: 3, .. }));

        let stray_else = Program::link(
            Arc::from("prog"),
            vec![statement(1, "for x in xs"), statement(2, "else")],
        )
        .unwrap_err();
        assert!(matches!(stray_else, Error::Compilation { line: 2, .. }));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = Program::link(
            Arc::from("prog"),
            vec![
                literal(1, "a"),
                located(
                    7,
                    Instruction::EmitExpression {
                        code: "1 +".to_string(),
                        escape: false,
                    },
                ),
            ],
        )
        .unwrap_err();
        match err {
            Error::Compilation { line, message, .. } => {
                assert_eq!(line, 7);
                assert!(message.contains("syntax error"), "{}", message);
            }
            other => panic!("expected compilation error, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_text() {
        let program = Program::link(
            Arc::from("prog"),
            vec![literal(1, "a"), statement(1, "x = 1"), literal(1, "b")],
        )
        .unwrap();
        assert_eq!(program.literal_text(), "ab");
    }
}
