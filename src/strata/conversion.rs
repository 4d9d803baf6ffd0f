//! Syntax conversion
//!
//! Rewrites a token stream in a different tag syntax. Tag bodies and strip markers are
//! kept as they are; literal text has any opener of the target syntax escaped so it stays
//! literal after conversion.
//!
//! Some streams have no faithful rendition in the target syntax: text ending in `{` runs
//! into a `{{{` opener, a body ending in `-` turns into a strip marker. The output is lexed
//! again and compared with the input, and a conversion that would read back differently
//! fails instead of changing what the template means.

use std::sync::Arc;

use super::error::{Error, Result};
use super::lexing::{tokenize, Token, TokenKind, STRIP_MARKER};
use super::syntax::Syntax;

fn emit(tokens: &[Token], to: &Syntax) -> String {
    let mut out = String::new();
    for token in tokens {
        let Some(kind) = token.kind.tag_kind() else {
            debug_assert_eq!(token.kind, TokenKind::Text);
            out.push_str(&to.escape_openers(&token.body));
            continue;
        };
        let delimiters = to.delimiters(kind);
        out.push_str(&delimiters.open);
        out.push_str(&token.body);
        if token.strip_whitespace {
            out.push(STRIP_MARKER);
        }
        out.push_str(&delimiters.close);
    }
    out
}

fn same_token(a: &Token, b: &Token) -> bool {
    a.kind == b.kind && a.body == b.body && a.strip_whitespace == b.strip_whitespace
}

fn describe(token: Option<&Token>) -> String {
    match token {
        Some(token) => format!("{:?} {:?}", token.kind, token.body),
        None => "nothing".to_string(),
    }
}

/// Check that `output` lexes back into `tokens` under `to`.
fn verify(tokens: &[Token], output: &str, to: &Syntax, origin: &Arc<str>) -> Result<()> {
    let relexed = match tokenize(output, to, origin) {
        Ok(relexed) => relexed,
        Err(Error::Lex { line, message, .. }) => {
            return Err(Error::Conversion {
                origin: origin.clone(),
                line,
                message,
            })
        }
        Err(other) => return Err(other),
    };
    let count = tokens.len().max(relexed.len());
    for i in 0..count {
        let (expected, found) = (tokens.get(i), relexed.get(i));
        let matches = match (expected, found) {
            (Some(a), Some(b)) => same_token(a, b),
            _ => false,
        };
        if !matches {
            let line = expected.or(found).map_or(1, |token| token.line);
            return Err(Error::Conversion {
                origin: origin.clone(),
                line,
                message: format!(
                    "{} would read back as {}",
                    describe(expected),
                    describe(found)
                ),
            });
        }
    }
    Ok(())
}

/// Re-emit `tokens` with the delimiters of `to`. `origin` only labels errors.
pub fn convert(tokens: &[Token], to: &Syntax, origin: &Arc<str>) -> Result<String> {
    let output = emit(tokens, to);
    verify(tokens, &output, to, origin)?;
    Ok(output)
}

/// Tokenize `text` in one syntax and rewrite it in another.
pub fn convert_source(text: &str, origin: &Arc<str>, from: &Syntax, to: &Syntax) -> Result<String> {
    let tokens = tokenize(text, from, origin)?;
    convert(&tokens, to, origin)
}
