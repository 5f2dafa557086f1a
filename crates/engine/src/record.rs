//! Log record assembly.
//!
//! [`build_record`] turns a paired capture into the durable record shape:
//! the field diff plus optional enrichment, serialized into the payload
//! the History reader later reconstructs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use trail_core::{diff, registry_id, Diff, Entity, Snapshot};
use trail_storage::{ActionKind, NewAuditRecord};

use crate::providers::{ActorResolver, ViewResolver};

/// The record payload as persisted: `{"changes": ...}` with optional
/// `summary` and `api_object` keys.
///
/// This shape is part of the storage contract; it must round-trip through
/// the History reader unchanged. Serialization is deterministic: `changes`
/// iterates sorted, and key order is fixed by field order here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub changes: Diff,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub api_object: Option<Value>,
}

impl ChangePayload {
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Build the durable record for one paired capture, or `None` when there
/// is nothing worth writing.
///
/// A `Change` whose field diff is empty is suppressed; additions and
/// deletions are always recorded, because the existence change itself is
/// the fact worth keeping even when no field differs.
///
/// Actor resolution falls back to the resolver's deterministic default.
/// Custom-view resolution is best-effort: a resolver failure drops the
/// `api_object` enrichment and is reported, never fatal.
pub fn build_record(
    before: &Snapshot,
    after: &Snapshot,
    entity: &Entity,
    action: ActionKind,
    actors: &dyn ActorResolver,
    views: Option<&dyn ViewResolver>,
) -> Result<Option<NewAuditRecord>, serde_json::Error> {
    let changes = diff(before, after);
    if changes.is_empty() && action == ActionKind::Change {
        return Ok(None);
    }

    let actor_id = actors
        .current_actor_id()
        .unwrap_or_else(|| actors.fallback_actor_id());

    let api_object = match (&entity.history_view, views) {
        (Some(view), Some(resolver)) => match resolver.render(view, entity) {
            Ok(rendering) => Some(json!({ "data": rendering, "success": true })),
            Err(message) => {
                tracing::warn!(
                    entity_type = %entity.entity_type,
                    view = %view,
                    error = %message,
                    "custom view resolution failed; omitting api_object"
                );
                None
            }
        },
        _ => None,
    };

    let payload = ChangePayload {
        changes,
        summary: entity.summary.clone(),
        api_object,
    };

    Ok(Some(NewAuditRecord {
        actor_id,
        type_id: registry_id(entity),
        entity_pk: entity.pk.clone(),
        display: entity.display.clone(),
        action,
        payload: payload.to_json_string()?,
    }))
}
