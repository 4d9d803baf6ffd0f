//! Node classification
//!
//!     Turns tokens into nodes. Statement tokens are matched, whole and trimmed, against
//!     the inheritance directives in priority order:
//!
//!         extends "name"            → Extends(name)        (single or double quotes)
//!         block name | block :name  → BlockStart(name)
//!         endblock [[:]name]        → BlockEnd             (name is not checked)
//!         blocksuper | block_super  → BlockSuper
//!
//!     Any other statement stays opaque and is handed to the script layer later on.
//!     Text nodes remember whether the tag before them carried the strip marker.

use once_cell::sync::Lazy;
use regex::Regex;

use super::lexing::{Token, TokenKind};

static EXTENDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\A\s*extends\s+["']([^"']+)["']\s*\z"#).unwrap());
static BLOCK_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\s*block\s+:?([a-zA-Z_][a-zA-Z0-9_]*)\s*\z").unwrap());
static BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\s*endblock(?:\s+:?[a-zA-Z_][a-zA-Z0-9_]*)?\s*\z").unwrap());
static BLOCK_SUPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\s*block_?super\s*\z").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text { content: String, strip_leading: bool },
    Expression(String),
    EscapedExpression(String),
    Statement(String),
    Comment(String),
    Extends(String),
    BlockStart(String),
    BlockEnd,
    BlockSuper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: usize,
}

/// Classify a statement body.
pub fn classify_statement(body: &str) -> NodeKind {
    if let Some(captures) = EXTENDS.captures(body) {
        return NodeKind::Extends(captures[1].to_string());
    }
    if let Some(captures) = BLOCK_START.captures(body) {
        return NodeKind::BlockStart(captures[1].to_string());
    }
    if BLOCK_END.is_match(body) {
        return NodeKind::BlockEnd;
    }
    if BLOCK_SUPER.is_match(body) {
        return NodeKind::BlockSuper;
    }
    NodeKind::Statement(body.to_string())
}

pub fn classify(tokens: Vec<Token>) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(tokens.len());
    let mut strip_next = false;
    for token in tokens {
        let kind = match token.kind {
            TokenKind::Text => NodeKind::Text {
                content: token.body,
                strip_leading: strip_next,
            },
            TokenKind::Expression => NodeKind::Expression(token.body),
            TokenKind::EscapedExpression => NodeKind::EscapedExpression(token.body),
            TokenKind::Comment => NodeKind::Comment(token.body),
            TokenKind::Statement => classify_statement(&token.body),
        };
        strip_next = token.kind != TokenKind::Text && token.strip_whitespace;
        nodes.push(Node {
            kind,
            line: token.line,
        });
    }
    nodes
}
