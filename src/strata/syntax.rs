//! Tag syntaxes
//!
//!     A [Syntax] maps each of the four tag kinds to an opening and a closing delimiter.
//!     From that mapping it derives everything the lexer needs:
//!         - a pattern matching the earliest opening delimiter (escaped occurrences are
//!           skipped by checking for a preceding backslash),
//!         - a pattern matching escaped occurrences, used to unescape literal text,
//!         - a map from opening delimiter to the tag kind, the initial brace depth (the
//!           number of `{` in the opener) and the byte length of the closer.
//!
//!     Openers may overlap: `$${` contains `${`, and `{{{` starts with `{{`. Alternatives
//!     are ordered longest-first so that a match at a given position is always the most
//!     specific opener there.
//!
//!     Two reference syntaxes ship with the crate:
//!
//!         first pass:   !{ comment }  ${ expr }     $${ escaped }  %{ statement }
//!         second pass:  !{ comment }  {{{ expr }}}  {{ escaped }}  {% statement %}

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// The four kinds of tag a template can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Comment,
    Expression,
    EscapedExpression,
    Statement,
}

impl TagKind {
    pub const ALL: [TagKind; 4] = [
        TagKind::Comment,
        TagKind::Expression,
        TagKind::EscapedExpression,
        TagKind::Statement,
    ];

    fn index(self) -> usize {
        match self {
            TagKind::Comment => 0,
            TagKind::Expression => 1,
            TagKind::EscapedExpression => 2,
            TagKind::Statement => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

/// What the lexer needs to know once it has seen an opening delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTag {
    pub kind: TagKind,
    /// Brace depth at the start of the tag body: the number of `{` in the opener
    pub depth: usize,
    /// Byte length of the closing delimiter
    pub close_len: usize,
}

/// An unescaped opening delimiter found in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    pub start: usize,
    pub end: usize,
    pub tag: OpenTag,
}

#[derive(Debug)]
pub struct Syntax {
    delimiters: [Delimiters; 4],
    start_pattern: Regex,
    escaped_pattern: Regex,
    token_map: HashMap<String, OpenTag>,
}

static FIRST_PASS: Lazy<Arc<Syntax>> = Lazy::new(|| {
    Arc::new(
        Syntax::new([
            (TagKind::Comment, "!{", "}"),
            (TagKind::Expression, "${", "}"),
            (TagKind::EscapedExpression, "$${", "}"),
            (TagKind::Statement, "%{", "}"),
        ])
        .expect("first pass syntax is valid"),
    )
});

static SECOND_PASS: Lazy<Arc<Syntax>> = Lazy::new(|| {
    Arc::new(
        Syntax::new([
            (TagKind::Comment, "!{", "}"),
            (TagKind::Expression, "{{{", "}}}"),
            (TagKind::EscapedExpression, "{{", "}}"),
            (TagKind::Statement, "{%", "%}"),
        ])
        .expect("second pass syntax is valid"),
    )
});

impl Syntax {
    /// Build a syntax from one `(kind, open, close)` definition per tag kind.
    ///
    /// Every kind must be defined exactly once, delimiters must be non-empty and no two
    /// kinds may share an opener.
    pub fn new(definitions: [(TagKind, &str, &str); 4]) -> Result<Self> {
        let mut slots: [Option<Delimiters>; 4] = [None, None, None, None];
        for (kind, open, close) in definitions {
            if open.is_empty() || close.is_empty() {
                return Err(Error::InvalidSyntax(format!(
                    "empty delimiter for {:?}",
                    kind
                )));
            }
            let slot = &mut slots[kind.index()];
            if slot.is_some() {
                return Err(Error::InvalidSyntax(format!("{:?} defined twice", kind)));
            }
            *slot = Some(Delimiters {
                open: open.to_string(),
                close: close.to_string(),
            });
        }

        let [comment, expression, escaped, statement] = slots;
        let delimiters = match (comment, expression, escaped, statement) {
            (Some(a), Some(b), Some(c), Some(d)) => [a, b, c, d],
            _ => return Err(Error::InvalidSyntax("missing tag kind".to_string())),
        };

        let mut token_map = HashMap::new();
        for kind in TagKind::ALL {
            let delims = &delimiters[kind.index()];
            let tag = OpenTag {
                kind,
                depth: delims.open.matches('{').count(),
                close_len: delims.close.len(),
            };
            if token_map.insert(delims.open.clone(), tag).is_some() {
                return Err(Error::InvalidSyntax(format!(
                    "opener '{}' used by more than one tag kind",
                    delims.open
                )));
            }
        }

        let mut openers: Vec<&str> = delimiters.iter().map(|d| d.open.as_str()).collect();
        openers.sort_by(|a, b| b.len().cmp(&a.len()));
        let alternation = openers
            .iter()
            .map(|open| regex::escape(open))
            .collect::<Vec<_>>()
            .join("|");

        let start_pattern = Regex::new(&format!("(?:{})", alternation))
            .map_err(|e| Error::InvalidSyntax(e.to_string()))?;
        let escaped_pattern = Regex::new(&format!(r"\\({})", alternation))
            .map_err(|e| Error::InvalidSyntax(e.to_string()))?;

        Ok(Syntax {
            delimiters,
            start_pattern,
            escaped_pattern,
            token_map,
        })
    }

    /// `!{ }`, `${ }`, `$${ }`, `%{ }`
    pub fn first_pass() -> Arc<Syntax> {
        FIRST_PASS.clone()
    }

    /// `!{ }`, `{{{ }}}`, `{{ }}`, `{% %}`
    pub fn second_pass() -> Arc<Syntax> {
        SECOND_PASS.clone()
    }

    pub fn delimiters(&self, kind: TagKind) -> &Delimiters {
        &self.delimiters[kind.index()]
    }

    pub fn open_tag(&self, opener: &str) -> Option<OpenTag> {
        self.token_map.get(opener).copied()
    }

    /// Find the earliest unescaped opening delimiter at or after byte offset `from`.
    pub fn find_tag(&self, text: &str, from: usize) -> Option<TagMatch> {
        let mut cursor = from;
        while cursor <= text.len() {
            let found = self.start_pattern.find_at(text, cursor)?;
            if found.start() > 0 && text.as_bytes()[found.start() - 1] == b'\\' {
                // Escaped: the whole opener is literal, including any shorter opener inside it
                cursor = found.end();
                continue;
            }
            let tag = self.open_tag(found.as_str())?;
            return Some(TagMatch {
                start: found.start(),
                end: found.end(),
                tag,
            });
        }
        None
    }

    /// True iff the text contains any unescaped opening delimiter.
    pub fn is_dynamic(&self, text: &str) -> bool {
        self.find_tag(text, 0).is_some()
    }

    /// Drop the backslash in front of escaped openers.
    pub fn unescape(&self, text: &str) -> String {
        self.escaped_pattern.replace_all(text, "$1").into_owned()
    }

    /// Put a backslash in front of every opener so the text stays literal.
    ///
    /// Openers that already follow a backslash get one too: that backslash is literal
    /// text, and [Syntax::unescape] only ever drops the one directly before the opener.
    pub fn escape_openers(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for found in self.start_pattern.find_iter(text) {
            out.push_str(&text[cursor..found.start()]);
            out.push('\\');
            out.push_str(found.as_str());
            cursor = found.end();
        }
        out.push_str(&text[cursor..]);
        out
    }
}
