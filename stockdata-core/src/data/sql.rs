//! Identifier checks for names interpolated into SQL.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SQL identifier '{0}' (use letters, digits and underscores)")]
pub struct InvalidIdentifier(pub String);

/// Accept `[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters.
pub fn validate_identifier(name: &str) -> Result<&str, InvalidIdentifier> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_head && valid_tail && name.len() <= 64 {
        Ok(name)
    } else {
        Err(InvalidIdentifier(name.to_string()))
    }
}

/// Double-quote an identifier for SQLite.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
