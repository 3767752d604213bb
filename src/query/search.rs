//! Free-text term handling for full-text index lookups.

/// Characters with meaning in Lucene query syntax.
const LUCENE_SPECIAL: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
    '/',
];

/// Escapes Lucene operators inside a single token.
pub fn escape_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if LUCENE_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Turns a caller's search term into a prefix-matching Lucene pattern.
///
/// Each whitespace-separated token is escaped and suffixed with `*`; tokens
/// are joined with `AND`. Returns `None` for blank terms.
pub fn fulltext_pattern(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(|token| format!("{}*", escape_token(token)))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" AND "))
    }
}
