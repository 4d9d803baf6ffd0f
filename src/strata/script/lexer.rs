//! Script tokenizer

use std::ops::Range;

use logos::Logos;

use super::ScriptError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum ScriptToken {
    #[token("if")]
    If,
    #[token("elsif")]
    #[token("elif")]
    Elsif,
    #[token("else")]
    Else,
    #[token("end")]
    #[token("endif")]
    #[token("endfor")]
    End,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("include")]
    Include,

    #[token("and")]
    #[token("&&")]
    And,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("not")]
    #[token("!")]
    Not,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    #[token("null")]
    Nil,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r"'([^'\\]|\\.)*'", unquote)]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Strip the quotes and resolve backslash escapes.
fn unquote(lex: &mut logos::Lexer<ScriptToken>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Tokenize a piece of script code into tokens with their byte spans.
pub fn lex(code: &str) -> Result<Vec<(ScriptToken, Range<usize>)>, ScriptError> {
    let mut tokens = Vec::new();
    for (result, span) in ScriptToken::lexer(code).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(ScriptError::Parse(format!(
                    "unexpected '{}' at offset {}",
                    &code[span.clone()],
                    span.start
                )))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(code: &str) -> Vec<ScriptToken> {
        lex(code).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keywords_and_aliases() {
        assert_eq!(
            kinds("if a and not b || c"),
            vec![
                ScriptToken::If,
                ScriptToken::Ident("a".to_string()),
                ScriptToken::And,
                ScriptToken::Not,
                ScriptToken::Ident("b".to_string()),
                ScriptToken::Or,
                ScriptToken::Ident("c".to_string()),
            ]
        );
        assert_eq!(kinds("endif"), vec![ScriptToken::End]);
        assert_eq!(kinds("endfor"), vec![ScriptToken::End]);
    }

    #[test]
    fn test_identifiers_that_start_with_keywords() {
        assert_eq!(
            kinds("index ending formal"),
            vec![
                ScriptToken::Ident("index".to_string()),
                ScriptToken::Ident("ending".to_string()),
                ScriptToken::Ident("formal".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 4.5 -3"),
            vec![
                ScriptToken::Int(42),
                ScriptToken::Float(4.5),
                ScriptToken::Minus,
                ScriptToken::Int(3),
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            kinds(r#""a \"b\"\n" 'it\'s'"#),
            vec![
                ScriptToken::Str("a \"b\"\n".to_string()),
                ScriptToken::Str("it's".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_character() {
        let err = lex("a @ b").unwrap_err();
        assert_eq!(err, ScriptError::Parse("unexpected '@' at offset 2".to_string()));
    }
}
