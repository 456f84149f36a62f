//! Room identifiers
//!
//! Rooms are addressed by an opaque, caller-supplied string. New rooms get a
//! short id taken from the first segment of a UUID v4, e.g. "9f3c2a1b".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier of a chat room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Accept a caller-supplied room id, trimmed
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyRoomId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh short room id
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().to_string();
        let short = uuid.split('-').next().unwrap_or(&uuid).to_string();
        Self(short)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
