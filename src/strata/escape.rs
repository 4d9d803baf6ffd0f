//! Output escaping for escaped-expression tags

/// Applied to the rendered text of escaped expressions and the `escape()` builtin.
pub type EscapeFn = dyn Fn(&str) -> String + Send + Sync;

/// Leaves text unchanged.
pub fn identity(text: &str) -> String {
    text.to_string()
}

/// HTML entity escaping for text and attribute values.
pub fn html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
