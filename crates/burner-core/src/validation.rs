//! Input validation
//!
//! Display names and outgoing message text are checked here, before any
//! network activity. Lengths count characters, not bytes.

use serde::Serialize;

use crate::error::ValidationError;

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 20;
pub const MAX_MESSAGE_CHARS: usize = 500;

/// A validated display name (2-20 characters after trimming)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let chars = trimmed.chars().count();

        if chars == 0 {
            return Err(ValidationError::EmptyName);
        }
        if chars < MIN_NAME_CHARS {
            return Err(ValidationError::NameTooShort);
        }
        if chars > MAX_NAME_CHARS {
            return Err(ValidationError::NameTooLong);
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate outgoing chat text, returning the trimmed text to send
///
/// Over-long input is rejected whole; it is never truncated.
pub fn message_text(raw: &str) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong);
    }
    Ok(trimmed)
}
