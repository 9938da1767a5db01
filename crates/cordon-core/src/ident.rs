//! Identifier validation
//!
//! Local binding names, export names, and compartment global-lexical names
//! must all be valid identifiers of the guest language.

use thiserror::Error;

/// Error raised for a name that is not a valid identifier
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{0}' is not a valid identifier")]
pub struct IdentError(pub String);

/// Check whether a name is a valid identifier
///
/// Identifiers start with a letter, `_`, or `$`, followed by letters,
/// digits, `_`, or `$`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Validate a name, returning it on success
pub fn ensure_identifier(name: &str) -> Result<&str, IdentError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(IdentError(name.to_string()))
    }
}
