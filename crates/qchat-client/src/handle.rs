//! Username normalization and validation.

use crate::ChatError;

pub const MIN_HANDLE_LEN: usize = 3;
pub const MAX_HANDLE_LEN: usize = 20;

/// Strip a leading `@`, drop all whitespace and lowercase.
pub fn normalize_handle(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('@')
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Handles are 3 to 20 characters of `[a-z0-9_]`.
pub fn validate_handle(handle: &str) -> Result<(), ChatError> {
    let len = handle.chars().count();
    if !(MIN_HANDLE_LEN..=MAX_HANDLE_LEN).contains(&len) {
        return Err(ChatError::InvalidHandle(format!(
            "must be {MIN_HANDLE_LEN}-{MAX_HANDLE_LEN} characters"
        )));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ChatError::InvalidHandle(
            "only lowercase letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

/// Normalize then validate.
pub fn parse_handle(raw: &str) -> Result<String, ChatError> {
    let handle = normalize_handle(raw);
    validate_handle(&handle)?;
    Ok(handle)
}
