//! Lexer
//!
//!     Scans template text into an ordered token stream in a single forward pass.
//!
//!     1. Find the next unescaped opening delimiter. Text before it is a literal span;
//!        escaped delimiters inside it are unescaped and a Text token is emitted if the
//!        span is non-empty.
//!     2. Starting from the opener's brace depth, scan brace by brace until the depth
//!        returns to zero. Nested braces are part of the body, so `${ a: {1,2} }` is a
//!        single expression tag. Running out of input first is a lex failure.
//!     3. The closing delimiter (fixed length) is cut from the tail of the body.
//!     4. A trailing strip marker (`-`) is removed and recorded on the token: the literal
//!        span that follows the tag loses its leading blank-line run.
//!
//!     Delimiter sequences the syntax does not know never match and stay literal text.
//!     Each token records the 1-based line on which it starts.

use std::sync::Arc;

use serde::Serialize;

use super::error::{Error, Result};
use super::syntax::{Syntax, TagKind};

/// Placed right before a closing delimiter, strips the whitespace after the tag.
pub const STRIP_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Text,
    Comment,
    Expression,
    EscapedExpression,
    Statement,
}

impl From<TagKind> for TokenKind {
    fn from(kind: TagKind) -> Self {
        match kind {
            TagKind::Comment => TokenKind::Comment,
            TagKind::Expression => TokenKind::Expression,
            TagKind::EscapedExpression => TokenKind::EscapedExpression,
            TagKind::Statement => TokenKind::Statement,
        }
    }
}

impl TokenKind {
    /// The tag kind for everything except literal text
    pub fn tag_kind(self) -> Option<TagKind> {
        match self {
            TokenKind::Text => None,
            TokenKind::Comment => Some(TagKind::Comment),
            TokenKind::Expression => Some(TagKind::Expression),
            TokenKind::EscapedExpression => Some(TagKind::EscapedExpression),
            TokenKind::Statement => Some(TagKind::Statement),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub body: String,
    pub strip_whitespace: bool,
    pub line: usize,
}

impl Token {
    pub fn text(body: impl Into<String>, line: usize) -> Self {
        Token {
            kind: TokenKind::Text,
            body: body.into(),
            strip_whitespace: false,
            line,
        }
    }

    pub fn tag(kind: TagKind, body: impl Into<String>, strip_whitespace: bool, line: usize) -> Self {
        Token {
            kind: kind.into(),
            body: body.into(),
            strip_whitespace,
            line,
        }
    }
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Tokenize template text. `origin` only labels lex errors.
pub fn tokenize(text: &str, syntax: &Syntax, origin: &Arc<str>) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    let mut line = 1;

    while let Some(found) = syntax.find_tag(text, cursor) {
        let literal = &text[cursor..found.start];
        if !literal.is_empty() {
            tokens.push(Token::text(syntax.unescape(literal), line));
            line += count_lines(literal);
        }

        let tag_line = line;
        let bytes = text.as_bytes();
        let mut depth = found.tag.depth;
        let mut pos = found.end;
        while depth > 0 {
            match bytes.get(pos) {
                Some(b'{') => depth += 1,
                Some(b'}') => depth -= 1,
                Some(_) => {}
                None => {
                    return Err(Error::Lex {
                        origin: origin.clone(),
                        line: tag_line,
                        message: format!(
                            "unterminated {:?} tag: braces never balance",
                            found.tag.kind
                        ),
                    })
                }
            }
            pos += 1;
        }

        let scanned = &text[found.end..pos];
        line += count_lines(&text[found.start..pos]);

        let mut body_end = scanned.len().saturating_sub(found.tag.close_len);
        while !scanned.is_char_boundary(body_end) {
            body_end -= 1;
        }
        let mut body = &scanned[..body_end];
        let mut strip_whitespace = false;
        if let Some(stripped) = body.strip_suffix(STRIP_MARKER) {
            body = stripped;
            strip_whitespace = true;
        }

        tokens.push(Token::tag(found.tag.kind, body, strip_whitespace, tag_line));
        cursor = pos;
    }

    if cursor < text.len() {
        tokens.push(Token::text(syntax.unescape(&text[cursor..]), line));
    }

    tracing::trace!(origin = %origin, count = tokens.len(), "tokenized template");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Arc<str> {
        Arc::from("test")
    }

    fn lex_first(text: &str) -> Vec<Token> {
        tokenize(text, &Syntax::first_pass(), &origin()).expect("lex failed")
    }

    fn lex_second(text: &str) -> Vec<Token> {
        tokenize(text, &Syntax::second_pass(), &origin()).expect("lex failed")
    }

    #[test]
    fn test_nested_braces_stay_in_one_token() {
        let tokens = lex_first("${ a: {1,2} }");
        assert_eq!(
            tokens,
            vec![Token::tag(TagKind::Expression, " a: {1,2} ", false, 1)]
        );
    }

    #[test]
    fn test_mixed_stream() {
        let tokens = lex_first("Hi ${ name }!%{ x = 1 }$${ code }!{ note }");
        assert_eq!(
            tokens,
            vec![
                Token::text("Hi ", 1),
                Token::tag(TagKind::Expression, " name ", false, 1),
                Token::text("!", 1),
                Token::tag(TagKind::Statement, " x = 1 ", false, 1),
                Token::tag(TagKind::EscapedExpression, " code ", false, 1),
                Token::tag(TagKind::Comment, " note ", false, 1),
            ]
        );
    }

    #[test]
    fn test_second_pass_delimiters() {
        let tokens = lex_second("{{{ raw }}} {{ safe }} {% if x %}");
        assert_eq!(
            tokens,
            vec![
                Token::tag(TagKind::Expression, " raw ", false, 1),
                Token::text(" ", 1),
                Token::tag(TagKind::EscapedExpression, " safe ", false, 1),
                Token::text(" ", 1),
                Token::tag(TagKind::Statement, " if x ", false, 1),
            ]
        );
    }

    #[test]
    fn test_strip_marker_sets_flag() {
        let tokens = lex_first("%{ for i in items -}\nbody");
        assert_eq!(
            tokens,
            vec![
                Token::tag(TagKind::Statement, " for i in items ", true, 1),
                Token::text("\nbody", 1),
            ]
        );
    }

    #[test]
    fn test_second_pass_strip_marker() {
        let tokens = lex_second("{% end -%}");
        assert_eq!(
            tokens,
            vec![Token::tag(TagKind::Statement, " end ", true, 1)]
        );
    }

    #[test]
    fn test_escaped_delimiter_is_literal() {
        let tokens = lex_first(r"cost: \${ 5 } and ${ x }");
        assert_eq!(
            tokens,
            vec![
                Token::text("cost: ${ 5 } and ", 1),
                Token::tag(TagKind::Expression, " x ", false, 1),
            ]
        );
    }

    #[test]
    fn test_empty_tag_body() {
        let tokens = lex_first("a${}b");
        assert_eq!(
            tokens,
            vec![
                Token::text("a", 1),
                Token::tag(TagKind::Expression, "", false, 1),
                Token::text("b", 1),
            ]
        );
    }

    #[test]
    fn test_unknown_delimiters_pass_through() {
        let tokens = lex_first("{{ not a tag }} and #{ neither }");
        assert_eq!(
            tokens,
            vec![Token::text("{{ not a tag }} and #{ neither }", 1)]
        );
    }

    #[test]
    fn test_unterminated_tag_fails() {
        let err = tokenize("line\n${ open {", &Syntax::first_pass(), &origin()).unwrap_err();
        match err {
            Error::Lex { line, .. } => assert_eq!(line, 2),
            other => panic!("expected lex error, got {:?}", other),
        }
    }

    #[test]
    fn test_lines_follow_source() {
        let tokens = lex_first("a\nb ${ x }\n!{ one\ntwo }\n%{ y }");
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        // "a\nb ", ${x}, "\n", comment, "\n", %{y}
        assert_eq!(lines, vec![1, 2, 2, 3, 4, 5]);
    }
}
