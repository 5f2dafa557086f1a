use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// The kind of mutation a record describes.
///
/// Wire codes are 4/5/6 rather than 1/2/3: the audited application shares
/// its log table with the host framework's own admin entries, and the
/// offset keeps the two families of records distinguishable. The codes are
/// part of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ActionKind {
    Addition,
    Change,
    Deletion,
}

impl ActionKind {
    pub fn code(&self) -> u8 {
        match self {
            ActionKind::Addition => 4,
            ActionKind::Change => 5,
            ActionKind::Deletion => 6,
        }
    }
}

impl From<ActionKind> for u8 {
    fn from(kind: ActionKind) -> u8 {
        kind.code()
    }
}

impl TryFrom<u8> for ActionKind {
    type Error = StorageError;

    fn try_from(code: u8) -> Result<Self, StorageError> {
        match code {
            4 => Ok(ActionKind::Addition),
            5 => Ok(ActionKind::Change),
            6 => Ok(ActionKind::Deletion),
            _ => Err(StorageError::InvalidActionCode { code }),
        }
    }
}

/// A log record as handed to [`crate::AuditStore::append`]. The store
/// assigns the id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditRecord {
    /// Identifier of the actor responsible for the mutation.
    pub actor_id: String,
    /// Type-registry id of the mutated entity; `None` for representations
    /// without a registry.
    pub type_id: Option<i64>,
    /// Primary key of the mutated entity; `None` for representations
    /// lacking one.
    pub entity_pk: Option<String>,
    /// Human-readable representation of the entity at mutation time.
    pub display: String,
    pub action: ActionKind,
    /// Serialized JSON payload: `{"changes": ..., "summary"?: ...,
    /// "api_object"?: ...}`. Opaque to the store.
    pub payload: String,
}

/// A durable audit record as stored. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned identifier, strictly increasing per backend.
    pub id: i64,
    pub actor_id: String,
    pub type_id: Option<i64>,
    pub entity_pk: Option<String>,
    pub display: String,
    pub action: ActionKind,
    /// ISO 8601 / RFC 3339 timestamp string, stamped at append time.
    pub recorded_at: String,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes_round_trip() {
        for kind in [ActionKind::Addition, ActionKind::Change, ActionKind::Deletion] {
            assert_eq!(ActionKind::try_from(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn action_codes_are_offset_from_admin_flags() {
        assert_eq!(ActionKind::Addition.code(), 4);
        assert_eq!(ActionKind::Change.code(), 5);
        assert_eq!(ActionKind::Deletion.code(), 6);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(ActionKind::try_from(1).is_err());
        assert!(ActionKind::try_from(0).is_err());
    }

    #[test]
    fn action_serializes_as_wire_code() {
        let json = serde_json::to_string(&ActionKind::Change).unwrap();
        assert_eq!(json, "5");
        let back: ActionKind = serde_json::from_str("6").unwrap();
        assert_eq!(back, ActionKind::Deletion);
    }
}
