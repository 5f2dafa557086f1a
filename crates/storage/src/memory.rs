//! In-memory reference backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{ActionKind, AuditRecord, NewAuditRecord};
use crate::traits::AuditStore;

/// An in-memory `AuditStore`.
///
/// The reference backend for tests and for embedding the pipeline without
/// a database. Records live in insertion order behind a mutex; clones
/// share the same underlying store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<AuditRecord>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, record: NewAuditRecord) -> Result<i64, StorageError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(AuditRecord {
            id,
            actor_id: record.actor_id,
            type_id: record.type_id,
            entity_pk: record.entity_pk,
            display: record.display,
            action: record.action,
            recorded_at: now_iso8601(),
            payload: record.payload,
        });
        Ok(id)
    }

    async fn query(
        &self,
        type_id: Option<i64>,
        entity_pk: &str,
        kinds: &[ActionKind],
    ) -> Result<Vec<AuditRecord>, StorageError> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(inner
            .records
            .iter()
            .filter(|r| {
                r.type_id == type_id
                    && r.entity_pk.as_deref() == Some(entity_pk)
                    && kinds.contains(&r.action)
            })
            .cloned()
            .collect())
    }

    async fn get(&self, record_id: i64) -> Result<AuditRecord, StorageError> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        inner
            .records
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or(StorageError::RecordNotFound { record_id })
    }
}

/// Generate a simple ISO 8601 timestamp for `recorded_at`.
fn now_iso8601() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(pk: &str, action: ActionKind) -> NewAuditRecord {
        NewAuditRecord {
            actor_id: "1".to_string(),
            type_id: Some(7),
            entity_pk: Some(pk.to_string()),
            display: format!("entity {pk}"),
            action,
            payload: r#"{"changes":{}}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let first = store.append(make_record("1", ActionKind::Addition)).await.unwrap();
        let second = store.append(make_record("1", ActionKind::Change)).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn query_filters_by_kind_and_pk() {
        let store = MemoryStore::new();
        store.append(make_record("1", ActionKind::Addition)).await.unwrap();
        store.append(make_record("1", ActionKind::Change)).await.unwrap();
        store.append(make_record("2", ActionKind::Addition)).await.unwrap();

        let additions = store
            .query(Some(7), "1", &[ActionKind::Addition])
            .await
            .unwrap();
        assert_eq!(additions.len(), 1);
        assert_eq!(additions[0].action, ActionKind::Addition);

        let all = store
            .query(
                Some(7),
                "1",
                &[ActionKind::Addition, ActionKind::Change, ActionKind::Deletion],
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn get_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(42).await.unwrap_err();
        assert!(matches!(err, StorageError::RecordNotFound { record_id: 42 }));
    }
}
