//! Identifier sanitizer
//!
//! The only approved way to put a caller-supplied table, column, index or
//! routine name into SQL text. Values never go through here; they are bound
//! as parameters.

use crate::error::GateError;

/// MySQL's limit for table, column and routine names
pub const MAX_IDENTIFIER_LEN: usize = 64;

const QUOTE_CHARS: [char; 3] = ['`', '"', '\''];

/// Validate a name against `^[A-Za-z_][A-Za-z0-9_]*$`
///
/// One pair of matching surrounding quotes (backticks, double or single
/// quotes) is stripped first, so `` `users` `` is accepted as `users`.
/// Quote characters anywhere else make the name invalid.
pub fn sanitize(identifier: &str) -> Result<String, GateError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(GateError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    let unquoted = strip_surrounding_quotes(trimmed);
    if !is_valid(unquoted) {
        return Err(GateError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(unquoted.to_string())
}

/// Sanitize and wrap in backticks
pub fn quote(identifier: &str) -> Result<String, GateError> {
    Ok(format!("`{}`", sanitize(identifier)?))
}

/// Quote a list of names, failing on the first invalid one
pub fn quote_all<S: AsRef<str>>(identifiers: &[S]) -> Result<Vec<String>, GateError> {
    identifiers.iter().map(|i| quote(i.as_ref())).collect()
}

pub fn is_valid(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    identifier.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_surrounding_quotes(s: &str) -> &str {
    for q in QUOTE_CHARS {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
