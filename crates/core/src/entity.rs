//! The entity model presented to the audit pipeline.
//!
//! An [`Entity`] is the pipeline's view of one persisted object at one
//! instant: a storage-representation tag, a type identifier, an optional
//! primary key, and the field mapping to canonicalize. The pipeline never
//! mutates an entity's fields; the only value it writes back is the
//! correlation token attached by the tracker.

use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;

use crate::error::NormalizeError;

/// The closed set of storage representations the pipeline understands.
///
/// Dispatch over this tag is total inside the crate; unrecognized tags are
/// rejected at the [`RepresentationKind::parse`] boundary where untyped
/// input enters the typed world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepresentationKind {
    /// Relational-row-backed: flat scalar fields plus multi-valued
    /// relation fields holding related identifiers.
    Relational,
    /// Document-backed: nested field mappings, canonicalized recursively.
    Document,
}

impl RepresentationKind {
    /// Parse a representation tag from an untyped source.
    pub fn parse(kind: &str) -> Result<Self, NormalizeError> {
        match kind {
            "relational" => Ok(RepresentationKind::Relational),
            "document" => Ok(RepresentationKind::Document),
            other => Err(NormalizeError::UnsupportedRepresentation {
                kind: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepresentationKind::Relational => "relational",
            RepresentationKind::Document => "document",
        }
    }
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field value as handed to the normalizer.
///
/// `Relation` holds the identifiers of a multi-valued relation field;
/// element order is insignificant and is discarded during normalization.
/// `Timestamp` values are canonicalized to RFC 3339 strings.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(OffsetDateTime),
    Relation(Vec<String>),
    Document(BTreeMap<String, FieldValue>),
    List(Vec<FieldValue>),
}

/// A live entity instance presented for auditing.
///
/// `fields` maps field name to value; names starting with `_` denote
/// internal bookkeeping and are dropped during normalization. `type_id` is
/// the type-registry identifier, present only for representations that
/// have a registry. `pk` is absent for instances not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: RepresentationKind,
    /// Type identifier, e.g. `"measure"`; the monitored-type predicate
    /// operates on this.
    pub entity_type: String,
    /// Registry id for the type, when the representation has a registry.
    pub type_id: Option<i64>,
    /// Primary-key value; `None` means the instance is not yet persisted.
    pub pk: Option<String>,
    /// Human-readable representation, stored verbatim on log records.
    pub display: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Aggregate key: entities sharing a key are logged at most once per
    /// context flush.
    pub aggregate: Option<String>,
    /// Free-form summary embedded verbatim in the record payload.
    pub summary: Option<serde_json::Value>,
    /// Name of a custom view to resolve and embed as `api_object`.
    pub history_view: Option<String>,
    /// Correlation token attached by the tracker on first capture.
    pub token: Option<String>,
}

impl Entity {
    /// Create an entity with the given representation, type and fields.
    /// Optional parts default to absent.
    pub fn new(
        kind: RepresentationKind,
        entity_type: impl Into<String>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Entity {
            kind,
            entity_type: entity_type.into(),
            type_id: None,
            pk: None,
            display: String::new(),
            fields,
            aggregate: None,
            summary: None,
            history_view: None,
            token: None,
        }
    }

    pub fn with_type_id(mut self, type_id: i64) -> Self {
        self.type_id = Some(type_id);
        self
    }

    pub fn with_pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn with_aggregate(mut self, key: impl Into<String>) -> Self {
        self.aggregate = Some(key.into());
        self
    }

    pub fn with_summary(mut self, summary: serde_json::Value) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_history_view(mut self, view: impl Into<String>) -> Self {
        self.history_view = Some(view.into());
        self
    }
}
