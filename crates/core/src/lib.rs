//! Trail audit core -- canonical entity snapshots and field-level diffs.
//!
//! This crate is the pure, synchronous half of the audit pipeline: it turns
//! a live entity instance into a canonical, comparable field mapping
//! (normalization) and computes the structured difference between two such
//! mappings (diffing). Nothing here touches a store or a clock; timestamps
//! are formatted from values the entity already carries.
//!
//! Correlation of before/after captures and durable record writing live in
//! `trail-engine` and `trail-storage`.

pub mod diff;
pub mod entity;
pub mod error;
pub mod normalize;
pub mod snapshot;

pub use diff::{diff, Diff, FieldChange};
pub use entity::{Entity, FieldValue, RepresentationKind};
pub use error::NormalizeError;
pub use normalize::{normalize, registry_id};
pub use snapshot::Snapshot;
