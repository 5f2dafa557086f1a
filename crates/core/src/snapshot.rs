//! Canonical snapshots of entity state.

use std::collections::BTreeMap;

use serde_json::Value;

/// The normalizer's output: a canonical, comparable capture of an entity
/// at one instant.
///
/// `Absent` is distinct from a present snapshot with no fields -- it means
/// "no entity existed", the creation precursor or post-deletion state, so
/// the differ can tell "no prior state" from "prior state with all-default
/// fields".
///
/// Invariant: two snapshots of the same entity taken without an intervening
/// mutation are structurally equal.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Absent,
    Present(BTreeMap<String, Value>),
}

impl Snapshot {
    pub fn is_absent(&self) -> bool {
        matches!(self, Snapshot::Absent)
    }

    /// The canonical field mapping, or `None` when absent.
    pub fn fields(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Snapshot::Absent => None,
            Snapshot::Present(fields) => Some(fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_not_an_empty_mapping() {
        let empty = Snapshot::Present(BTreeMap::new());
        assert_ne!(Snapshot::Absent, empty);
        assert!(Snapshot::Absent.is_absent());
        assert!(!empty.is_absent());
    }
}
