//! Escaping for free-text embedded in pattern-matching filter expressions.
//!
//! Terms `include` patterns use regular-expression syntax, so user input must
//! have every operator character neutralised before it is spliced in.
//!
//! | Input       | Output        |
//! |-------------|---------------|
//! | `"web"`     | `"web"`       |
//! | `"a.b"`     | `"a\.b"`      |
//! | `"(x)"`     | `"\(x\)"`     |
//! | `None`      | `""`          |

/// Characters with operator meaning in include patterns.
pub const RESERVED_CHARS: &[char] = &[
    '.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '<', '>', '~',
];

#[inline]
pub fn is_reserved(ch: char) -> bool {
    RESERVED_CHARS.contains(&ch)
}

/// Escape user input for use inside an include pattern.
///
/// Each reserved character gets a single backslash prefix; everything else passes
/// through. A missing query escapes to the empty string. Applying this twice
/// escapes the backslashes added by the first pass.
///
/// # Examples
///
/// ```
/// use list_control::escape::escape_query;
///
/// assert_eq!(escape_query(Some("web-01")), "web-01");
/// assert_eq!(escape_query(Some("a.b")), "a\\.b");
/// assert_eq!(escape_query(Some("user@host")), "user\\@host");
/// assert_eq!(escape_query(None), "");
/// ```
pub fn escape_query(query: Option<&str>) -> String {
    let query = query.unwrap_or_default();
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if is_reserved(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Recover the literal text of a pattern produced by [`escape_query`].
///
/// Returns `None` when the pattern contains an unescaped operator, i.e. when it
/// is not plain escaped text.
pub fn unescape_query(pattern: &str) -> Option<String> {
    let mut literal = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => literal.push(chars.next()?),
            c if is_reserved(c) => return None,
            c => literal.push(c),
        }
    }
    Some(literal)
}
