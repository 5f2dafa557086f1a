//! Read-side reconstruction of stored audit records.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use trail_core::{registry_id, Entity};
use trail_storage::{ActionKind, AuditRecord, AuditStore, StorageError};

use crate::record::ChangePayload;

const ALL_KINDS: [ActionKind; 3] = [
    ActionKind::Addition,
    ActionKind::Change,
    ActionKind::Deletion,
];

/// Errors surfaced by history reads.
#[derive(Debug)]
pub enum HistoryError {
    /// The record id does not resolve to a stored record.
    RecordNotFound { record_id: i64 },
    /// A stored payload did not parse back into the payload shape.
    MalformedPayload { record_id: i64, message: String },
    /// The underlying store failed.
    Store(StorageError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::RecordNotFound { record_id } => {
                write!(f, "audit record not found: {}", record_id)
            }
            HistoryError::MalformedPayload { record_id, message } => {
                write!(f, "malformed payload on record {}: {}", record_id, message)
            }
            HistoryError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<StorageError> for HistoryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::RecordNotFound { record_id } => {
                HistoryError::RecordNotFound { record_id }
            }
            other => HistoryError::Store(other),
        }
    }
}

/// Created/modified summary for one entity: the latest Addition and the
/// latest Change, each side optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimpleHistory {
    pub created_at: Option<String>,
    pub created_by: Option<String>,
    pub modified_at: Option<String>,
    pub modified_by: Option<String>,
}

/// One stored record reshaped for rendering: action label, actor,
/// timestamp, record id, and the payload flattened alongside.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub record_id: i64,
    pub action: String,
    pub actor: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: ChangePayload,
}

/// Reader over an [`AuditStore`].
pub struct History {
    store: Arc<dyn AuditStore>,
}

impl History {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        History { store }
    }

    /// Latest Addition and latest Change for the entity. An entity without
    /// a primary key has no queryable history; all sides come back empty.
    pub async fn simple_history(&self, entity: &Entity) -> Result<SimpleHistory, HistoryError> {
        let Some(pk) = entity.pk.as_deref() else {
            return Ok(SimpleHistory::default());
        };
        let type_id = registry_id(entity);

        let additions = self
            .store
            .query(type_id, pk, &[ActionKind::Addition])
            .await?;
        let changes = self.store.query(type_id, pk, &[ActionKind::Change]).await?;

        // Ascending id order doubles as chronological order; the latest
        // record is the last one.
        let created = additions.last();
        let modified = changes.last();

        Ok(SimpleHistory {
            created_at: created.map(|r| r.recorded_at.clone()),
            created_by: created.map(|r| r.actor_id.clone()),
            modified_at: modified.map(|r| r.recorded_at.clone()),
            modified_by: modified.map(|r| r.actor_id.clone()),
        })
    }

    /// Every Addition/Change/Deletion record for the entity, oldest first.
    pub async fn full_history(&self, entity: &Entity) -> Result<Vec<RecordView>, HistoryError> {
        let Some(pk) = entity.pk.as_deref() else {
            return Ok(Vec::new());
        };
        let records = self
            .store
            .query(registry_id(entity), pk, &ALL_KINDS)
            .await?;
        records.iter().map(record_view).collect()
    }

    /// Single-record lookup for callers holding a stored record reference.
    pub async fn history_by_record_id(&self, record_id: i64) -> Result<RecordView, HistoryError> {
        let record = self.store.get(record_id).await?;
        record_view(&record)
    }

    /// The stored custom-view payload of one record, when it has one.
    pub async fn api_object_view(
        &self,
        record_id: i64,
    ) -> Result<Option<serde_json::Value>, HistoryError> {
        let view = self.history_by_record_id(record_id).await?;
        Ok(view.payload.api_object)
    }
}

fn action_label(action: ActionKind) -> &'static str {
    match action {
        ActionKind::Addition => "Created",
        ActionKind::Change => "Changed",
        ActionKind::Deletion => "Deleted",
    }
}

fn record_view(record: &AuditRecord) -> Result<RecordView, HistoryError> {
    let payload: ChangePayload =
        serde_json::from_str(&record.payload).map_err(|e| HistoryError::MalformedPayload {
            record_id: record.id,
            message: e.to_string(),
        })?;
    Ok(RecordView {
        record_id: record.id,
        action: action_label(record.action).to_string(),
        actor: record.actor_id.clone(),
        timestamp: record.recorded_at.clone(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use trail_core::RepresentationKind;
    use trail_storage::{MemoryStore, NewAuditRecord};

    fn measure_entity() -> Entity {
        Entity::new(
            RepresentationKind::Relational,
            "measure",
            BTreeMap::new(),
        )
        .with_type_id(7)
        .with_pk("1")
    }

    fn record(action: ActionKind, actor: &str, payload: &str) -> NewAuditRecord {
        NewAuditRecord {
            actor_id: actor.to_string(),
            type_id: Some(7),
            entity_pk: Some("1".to_string()),
            display: "measure 1".to_string(),
            action,
            payload: payload.to_string(),
        }
    }

    async fn seeded() -> (History, MemoryStore) {
        let store = MemoryStore::new();
        store
            .append(record(
                ActionKind::Addition,
                "7",
                r#"{"changes":{"name":{"old":null,"new":"x"}}}"#,
            ))
            .await
            .unwrap();
        store
            .append(record(
                ActionKind::Change,
                "9",
                r#"{"changes":{"name":{"old":"x","new":"y"}},"summary":"renamed"}"#,
            ))
            .await
            .unwrap();
        (History::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn simple_history_reports_both_sides() {
        let (history, _store) = seeded().await;
        let simple = history.simple_history(&measure_entity()).await.unwrap();
        assert_eq!(simple.created_by.as_deref(), Some("7"));
        assert!(simple.created_at.is_some());
        assert_eq!(simple.modified_by.as_deref(), Some("9"));
        assert!(simple.modified_at.is_some());
    }

    #[tokio::test]
    async fn simple_history_sides_are_independent() {
        let store = MemoryStore::new();
        store
            .append(record(ActionKind::Addition, "7", r#"{"changes":{}}"#))
            .await
            .unwrap();
        let history = History::new(Arc::new(store));
        let simple = history.simple_history(&measure_entity()).await.unwrap();
        assert!(simple.created_at.is_some());
        assert!(simple.modified_at.is_none());
        assert!(simple.modified_by.is_none());
    }

    #[tokio::test]
    async fn simple_history_without_pk_is_empty() {
        let (history, _store) = seeded().await;
        let mut entity = measure_entity();
        entity.pk = None;
        let simple = history.simple_history(&entity).await.unwrap();
        assert_eq!(simple, SimpleHistory::default());
    }

    #[tokio::test]
    async fn full_history_reshapes_records_oldest_first() {
        let (history, _store) = seeded().await;
        let views = history.full_history(&measure_entity()).await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].action, "Created");
        assert_eq!(views[1].action, "Changed");
        assert_eq!(views[1].actor, "9");
        assert_eq!(views[1].payload.summary, Some(json!("renamed")));
        let change = views[1].payload.changes.get("name").unwrap();
        assert_eq!(change.old, json!("x"));
        assert_eq!(change.new, json!("y"));
    }

    #[tokio::test]
    async fn record_view_serializes_with_flattened_payload() {
        let (history, _store) = seeded().await;
        let views = history.full_history(&measure_entity()).await.unwrap();
        let value = serde_json::to_value(&views[1]).unwrap();
        assert_eq!(value["action"], json!("Changed"));
        assert_eq!(value["summary"], json!("renamed"));
        assert_eq!(value["changes"]["name"]["new"], json!("y"));
        // Absent optional keys stay absent rather than null.
        assert!(value.get("api_object").is_none());
    }

    #[tokio::test]
    async fn history_by_record_id_resolves() {
        let (history, store) = seeded().await;
        let all = store
            .query(Some(7), "1", &ALL_KINDS)
            .await
            .unwrap();
        let view = history.history_by_record_id(all[0].id).await.unwrap();
        assert_eq!(view.record_id, all[0].id);
        assert_eq!(view.action, "Created");
    }

    #[tokio::test]
    async fn unknown_record_id_is_not_found() {
        let (history, _store) = seeded().await;
        let err = history.history_by_record_id(999).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::RecordNotFound { record_id: 999 }
        ));
    }

    #[tokio::test]
    async fn malformed_payload_is_surfaced() {
        let store = MemoryStore::new();
        let id = store
            .append(record(ActionKind::Change, "7", "not json"))
            .await
            .unwrap();
        let history = History::new(Arc::new(store));
        let err = history.history_by_record_id(id).await.unwrap_err();
        assert!(matches!(err, HistoryError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn api_object_view_round_trips() {
        let store = MemoryStore::new();
        let with_view = record(
            ActionKind::Change,
            "7",
            r#"{"changes":{},"api_object":{"data":{"name":"y"},"success":true}}"#,
        );
        let id = store.append(with_view).await.unwrap();
        let plain = record(ActionKind::Change, "7", r#"{"changes":{}}"#);
        let plain_id = store.append(plain).await.unwrap();

        let history = History::new(Arc::new(store));
        let api_object = history.api_object_view(id).await.unwrap();
        assert_eq!(
            api_object,
            Some(json!({"data": {"name": "y"}, "success": true}))
        );
        assert_eq!(history.api_object_view(plain_id).await.unwrap(), None);
    }
}
