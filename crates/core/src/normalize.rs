//! Canonicalization of entity instances into comparable snapshots.
//!
//! Each storage representation has its own canonical form. Both forms drop
//! fields whose name carries the leading `_` bookkeeping marker and render
//! timestamps as RFC 3339 strings; they differ in how collection-valued
//! fields are treated:
//!
//! - relational entities flatten multi-valued relation fields into sorted
//!   identifier lists, so reordering related objects never produces a
//!   spurious diff;
//! - document entities are canonicalized recursively, and list fields with
//!   more than one element are rejected rather than guessed at.
//!
//! Normalization never mutates its input.

use std::collections::BTreeMap;

use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

use crate::entity::{Entity, FieldValue, RepresentationKind};
use crate::error::NormalizeError;
use crate::snapshot::Snapshot;

/// Per-representation canonicalization capability.
///
/// One implementation per [`RepresentationKind`]; [`normalize`] and
/// [`registry_id`] dispatch over the closed tag.
trait Canonicalize {
    fn canonical_fields(&self, entity: &Entity) -> Result<BTreeMap<String, Value>, NormalizeError>;

    fn registry_id(&self, entity: &Entity) -> Option<i64>;
}

/// Canonicalize an entity, or the explicit absence of one, into a
/// [`Snapshot`].
///
/// `None` yields [`Snapshot::Absent`], never an empty mapping.
pub fn normalize(entity: Option<&Entity>) -> Result<Snapshot, NormalizeError> {
    let Some(entity) = entity else {
        return Ok(Snapshot::Absent);
    };
    let fields = match entity.kind {
        RepresentationKind::Relational => RelationalForm.canonical_fields(entity)?,
        RepresentationKind::Document => DocumentForm.canonical_fields(entity)?,
    };
    Ok(Snapshot::Present(fields))
}

/// The type-registry identifier to store on a log record, when the
/// entity's representation has a registry.
pub fn registry_id(entity: &Entity) -> Option<i64> {
    match entity.kind {
        RepresentationKind::Relational => RelationalForm.registry_id(entity),
        RepresentationKind::Document => DocumentForm.registry_id(entity),
    }
}

/// Leading marker for internal/private bookkeeping fields.
const BOOKKEEPING_MARKER: char = '_';

fn is_bookkeeping(name: &str) -> bool {
    name.starts_with(BOOKKEEPING_MARKER)
}

/// Render a timestamp as an RFC 3339 UTC string, second precision.
fn timestamp_string(t: &OffsetDateTime) -> String {
    let t = t.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        t.year(),
        t.month() as u8,
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// Sorted copy of a relation's identifiers. Order carries no meaning, so
/// the canonical form fixes one.
fn relation_value(ids: &[String]) -> Value {
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    Value::Array(sorted.into_iter().map(|id| Value::String(id.clone())).collect())
}

fn number_value(x: f64) -> Value {
    // JSON has no NaN/inf; fall back to null like any lossy float slot.
    serde_json::Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

// ── Relational form ──────────────────────────────────────────────────────

struct RelationalForm;

impl Canonicalize for RelationalForm {
    fn canonical_fields(&self, entity: &Entity) -> Result<BTreeMap<String, Value>, NormalizeError> {
        let mut out = BTreeMap::new();
        for (name, value) in &entity.fields {
            if is_bookkeeping(name) {
                continue;
            }
            out.insert(name.clone(), relational_value(value));
        }
        Ok(out)
    }

    fn registry_id(&self, entity: &Entity) -> Option<i64> {
        entity.type_id
    }
}

fn relational_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Int(i) => Value::Number((*i).into()),
        FieldValue::Float(x) => number_value(*x),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Timestamp(t) => Value::String(timestamp_string(t)),
        FieldValue::Relation(ids) => relation_value(ids),
        FieldValue::Document(fields) => {
            let mut out = serde_json::Map::new();
            for (name, value) in fields {
                if is_bookkeeping(name) {
                    continue;
                }
                out.insert(name.clone(), relational_value(value));
            }
            Value::Object(out)
        }
        FieldValue::List(items) => {
            Value::Array(items.iter().map(relational_value).collect())
        }
    }
}

// ── Document form ────────────────────────────────────────────────────────

struct DocumentForm;

impl Canonicalize for DocumentForm {
    fn canonical_fields(&self, entity: &Entity) -> Result<BTreeMap<String, Value>, NormalizeError> {
        let mut out = BTreeMap::new();
        for (name, value) in &entity.fields {
            if is_bookkeeping(name) {
                continue;
            }
            out.insert(name.clone(), document_value(name, value)?);
        }
        Ok(out)
    }

    /// Document representations have no type registry.
    fn registry_id(&self, _entity: &Entity) -> Option<i64> {
        None
    }
}

fn document_value(field: &str, value: &FieldValue) -> Result<Value, NormalizeError> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Bool(b) => Ok(Value::Bool(*b)),
        FieldValue::Int(i) => Ok(Value::Number((*i).into())),
        FieldValue::Float(x) => Ok(number_value(*x)),
        FieldValue::Text(s) => Ok(Value::String(s.clone())),
        FieldValue::Timestamp(t) => Ok(Value::String(timestamp_string(t))),
        FieldValue::Relation(ids) => Ok(relation_value(ids)),
        FieldValue::Document(fields) => {
            let mut out = serde_json::Map::new();
            for (name, value) in fields {
                if is_bookkeeping(name) {
                    continue;
                }
                out.insert(name.clone(), document_value(name, value)?);
            }
            Ok(Value::Object(out))
        }
        // No agreed encoding for multi-element lists on documents; fail
        // fast so the caller knows the field was not captured.
        FieldValue::List(items) if items.len() > 1 => {
            Err(NormalizeError::NotImplementedFieldKind {
                field: field.to_string(),
            })
        }
        FieldValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(document_value(field, item)?);
            }
            Ok(Value::Array(out))
        }
    }
}
