//! The change tracker: pairing of before/after mutation notifications and
//! the end-of-context flush.
//!
//! Per entity instance per context the tracker walks
//! `Unseen -> Before-Captured -> After-Captured -> Flushed`. A before
//! notification attaches a correlation token to the instance and captures
//! prior persisted state; the matching after notification (matched by the
//! token carried on the instance, never re-derived) re-reads the persisted
//! state for the true after-snapshot. Flush consumes the context, so
//! teardown happens on every exit path by construction -- an aborted
//! operation simply drops its context and nothing leaks into the next one.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use trail_core::{normalize, Entity, Snapshot};
use trail_storage::{ActionKind, AuditStore};

use crate::context::{CorrelationRecord, OperationContext, Phase};
use crate::providers::{
    ActorResolver, EntitySource, TypeMonitor, ViewResolver, AUDIT_RECORD_TYPE,
};
use crate::record::build_record;

/// Outcome counts for one context flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records appended to the store.
    pub written: usize,
    /// Captures that produced nothing: unpaired befores, no-op changes,
    /// suppressed aggregate siblings.
    pub skipped: usize,
    /// Captures that failed to serialize or append; reported on the
    /// diagnostic channel.
    pub failed: usize,
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flush: {} written, {} skipped, {} failed",
            self.written, self.skipped, self.failed
        )
    }
}

/// Drives snapshot capture and record writing for monitored entities.
///
/// One tracker serves any number of operation contexts; all mutable state
/// lives in the [`OperationContext`] values callers thread through the
/// notification handlers.
pub struct ChangeTracker {
    store: Arc<dyn AuditStore>,
    source: Arc<dyn EntitySource>,
    monitor: Arc<dyn TypeMonitor>,
    actors: Arc<dyn ActorResolver>,
    views: Option<Arc<dyn ViewResolver>>,
}

impl ChangeTracker {
    pub fn new(
        store: Arc<dyn AuditStore>,
        source: Arc<dyn EntitySource>,
        monitor: Arc<dyn TypeMonitor>,
        actors: Arc<dyn ActorResolver>,
    ) -> Self {
        ChangeTracker {
            store,
            source,
            monitor,
            actors,
            views: None,
        }
    }

    /// Attach a custom-view resolver for entities that opt into richer
    /// payloads.
    pub fn with_views(mut self, views: Arc<dyn ViewResolver>) -> Self {
        self.views = Some(views);
        self
    }

    /// Warn about wirings that silently disable auditing.
    ///
    /// `candidate_types` are the entity types the embedder expects to be
    /// tracked; if the predicate monitors none of them, every notification
    /// will be skipped and no record ever written.
    pub fn check_wiring(&self, candidate_types: &[&str]) {
        if !candidate_types
            .iter()
            .any(|t| self.monitor.is_monitored(t))
        {
            tracing::warn!(
                "no candidate entity type is monitored; auditing is effectively disabled"
            );
        }
        if self.monitor.is_monitored(AUDIT_RECORD_TYPE) {
            tracing::warn!(
                "the audit record type itself is monitored; appends would trigger further appends"
            );
        }
    }

    // ── Notification handlers ────────────────────────────────────────────

    /// Before-save notification. Captures prior persisted state and
    /// attaches a correlation token to the instance.
    pub fn on_before_save(
        &self,
        ctx: &mut OperationContext,
        entity: &mut Entity,
        bulk_load: bool,
    ) {
        if self.skip(entity, bulk_load) {
            return;
        }
        let token = self.ensure_token(ctx, entity);
        if let Some(record) = ctx.get_mut(&token) {
            // Repeat mutation of the same instance: the before-snapshot
            // stays fixed at first capture.
            record.phases.push(Phase::BeforeSave);
            return;
        }

        let persisted = entity
            .pk
            .as_deref()
            .and_then(|pk| self.source.load(&entity.entity_type, pk));
        let before = match normalize(persisted.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    entity_type = %entity.entity_type,
                    pk = entity.pk.as_deref().unwrap_or("-"),
                    error = %e,
                    "before-snapshot capture failed; this mutation will not be logged"
                );
                return;
            }
        };
        ctx.push(CorrelationRecord {
            token,
            entity: entity.clone(),
            before,
            after: None,
            phases: vec![Phase::BeforeSave],
        });
    }

    /// After-save notification, matched by the token on the instance. The
    /// persisted state is re-read for the true after-snapshot because the
    /// persistence step may normalize values.
    pub fn on_after_save(&self, ctx: &mut OperationContext, entity: &Entity, bulk_load: bool) {
        if self.skip(entity, bulk_load) {
            return;
        }
        let Some(token) = entity.token.clone() else {
            tracing::debug!(
                entity_type = %entity.entity_type,
                "after-save without a correlation token; ignoring"
            );
            return;
        };

        let persisted = entity
            .pk
            .as_deref()
            .and_then(|pk| self.source.load(&entity.entity_type, pk));
        let subject = persisted.as_ref().unwrap_or(entity);
        let after = normalize(Some(subject));

        let Some(record) = ctx.get_mut(&token) else {
            tracing::debug!(
                entity_type = %entity.entity_type,
                "after-save with no matching before capture; ignoring"
            );
            return;
        };
        record.phases.push(Phase::AfterSave);
        record.entity = entity.clone();
        match after {
            // Last-writer-wins across repeated saves of the instance.
            Ok(snapshot) => record.after = Some(snapshot),
            Err(e) => {
                record.after = None;
                tracing::warn!(
                    entity_type = %entity.entity_type,
                    pk = entity.pk.as_deref().unwrap_or("-"),
                    error = %e,
                    "after-snapshot capture failed; this mutation will not be logged"
                );
            }
        }
    }

    /// Before-delete notification. Captures the state about to be removed.
    pub fn on_before_delete(
        &self,
        ctx: &mut OperationContext,
        entity: &mut Entity,
        bulk_load: bool,
    ) {
        if self.skip(entity, bulk_load) {
            return;
        }
        let token = self.ensure_token(ctx, entity);
        if let Some(record) = ctx.get_mut(&token) {
            record.phases.push(Phase::BeforeDelete);
            return;
        }

        // Prefer the persisted row; fall back to the in-memory instance,
        // which still holds the state being deleted.
        let persisted = entity
            .pk
            .as_deref()
            .and_then(|pk| self.source.load(&entity.entity_type, pk));
        let subject = persisted.as_ref().unwrap_or(entity);
        let before = match normalize(Some(subject)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    entity_type = %entity.entity_type,
                    pk = entity.pk.as_deref().unwrap_or("-"),
                    error = %e,
                    "delete-snapshot capture failed; this deletion will not be logged"
                );
                return;
            }
        };
        ctx.push(CorrelationRecord {
            token,
            entity: entity.clone(),
            before,
            after: None,
            phases: vec![Phase::BeforeDelete],
        });
    }

    /// After-delete notification. The after state of a deletion is the
    /// explicit absence of the entity.
    pub fn on_after_delete(&self, ctx: &mut OperationContext, entity: &Entity, bulk_load: bool) {
        if self.skip(entity, bulk_load) {
            return;
        }
        let Some(token) = entity.token.clone() else {
            tracing::debug!(
                entity_type = %entity.entity_type,
                "after-delete without a correlation token; ignoring"
            );
            return;
        };
        let Some(record) = ctx.get_mut(&token) else {
            tracing::debug!(
                entity_type = %entity.entity_type,
                "after-delete with no matching before capture; ignoring"
            );
            return;
        };
        record.phases.push(Phase::AfterDelete);
        record.entity = entity.clone();
        record.after = Some(Snapshot::Absent);
    }

    /// End-of-context flush: build and append one record per paired
    /// capture, then discard all correlation state.
    ///
    /// Consuming the context is the teardown guarantee -- there is no
    /// store to clear and nothing to leak into a reused execution unit.
    /// Failures are counted and reported per entity; one entity's failure
    /// never disturbs the others.
    pub async fn flush(&self, ctx: OperationContext) -> FlushReport {
        let mut report = FlushReport::default();
        let mut logged_aggregates: BTreeSet<String> = BTreeSet::new();

        for record in ctx.into_records() {
            let Some(after) = record.after else {
                // Before without after: the operation never completed for
                // this instance.
                report.skipped += 1;
                continue;
            };

            let action = if record.phases.contains(&Phase::AfterDelete) {
                ActionKind::Deletion
            } else if record.before.is_absent() {
                ActionKind::Addition
            } else {
                ActionKind::Change
            };

            if let Some(key) = &record.entity.aggregate {
                if logged_aggregates.contains(key) {
                    tracing::debug!(
                        entity_type = %record.entity.entity_type,
                        aggregate = %key,
                        "aggregate already logged this flush; skipping sibling"
                    );
                    report.skipped += 1;
                    continue;
                }
            }

            let built = match build_record(
                &record.before,
                &after,
                &record.entity,
                action,
                self.actors.as_ref(),
                self.views.as_deref(),
            ) {
                Ok(Some(new_record)) => new_record,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        entity_type = %record.entity.entity_type,
                        error = %e,
                        "payload serialization failed; record dropped"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match self.store.append(built).await {
                Ok(_id) => {
                    report.written += 1;
                    if let Some(key) = &record.entity.aggregate {
                        logged_aggregates.insert(key.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        entity_type = %record.entity.entity_type,
                        error = %e,
                        "audit append failed; record dropped"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn skip(&self, entity: &Entity, bulk_load: bool) -> bool {
        if bulk_load {
            // Fixture/bulk loads are not user edits.
            tracing::debug!(entity_type = %entity.entity_type, "bulk load; not tracking");
            return true;
        }
        if !self.monitor.is_monitored(&entity.entity_type) {
            tracing::debug!(entity_type = %entity.entity_type, "type not monitored");
            return true;
        }
        false
    }

    /// The token carried by the instance, or a freshly issued one.
    ///
    /// Tokens are unique per instance per context: a digest of type, pk
    /// and the per-context sequence.
    fn ensure_token(&self, ctx: &mut OperationContext, entity: &mut Entity) -> String {
        if let Some(token) = &entity.token {
            return token.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(entity.entity_type.as_bytes());
        hasher.update([0u8]);
        if let Some(pk) = &entity.pk {
            hasher.update(pk.as_bytes());
        }
        hasher.update(ctx.next_seq().to_be_bytes());
        let digest = hasher.finalize();
        let token: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        entity.token = Some(token.clone());
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MonitorSet, StaticActor};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use trail_core::{FieldValue, RepresentationKind};
    use trail_storage::MemoryStore;

    /// Entity source backed by a shared map of persisted rows.
    #[derive(Default)]
    struct TableSource {
        rows: Mutex<BTreeMap<(String, String), Entity>>,
    }

    impl TableSource {
        fn put(&self, entity: &Entity) {
            let pk = entity.pk.clone().expect("persisted rows have a pk");
            self.rows
                .lock()
                .unwrap()
                .insert((entity.entity_type.clone(), pk), entity.clone());
        }
    }

    impl EntitySource for TableSource {
        fn load(&self, entity_type: &str, pk: &str) -> Option<Entity> {
            self.rows
                .lock()
                .unwrap()
                .get(&(entity_type.to_string(), pk.to_string()))
                .cloned()
        }
    }

    fn measure(name: &str) -> Entity {
        Entity::new(
            RepresentationKind::Relational,
            "measure",
            BTreeMap::from([("name".to_string(), FieldValue::Text(name.to_string()))]),
        )
        .with_type_id(7)
        .with_display(format!("measure {name}"))
    }

    fn tracker(store: MemoryStore, source: Arc<TableSource>) -> ChangeTracker {
        ChangeTracker::new(
            Arc::new(store),
            source,
            Arc::new(MonitorSet::new(["measure"])),
            Arc::new(StaticActor::known("7")),
        )
    }

    #[tokio::test]
    async fn unpaired_before_yields_no_record() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source);

        let mut ctx = OperationContext::new();
        let mut entity = measure("x");
        tracker.on_before_save(&mut ctx, &mut entity, false);
        assert_eq!(ctx.len(), 1);

        let report = tracker.flush(ctx).await;
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn bulk_load_notifications_are_ignored() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source);

        let mut ctx = OperationContext::new();
        let mut entity = measure("x");
        tracker.on_before_save(&mut ctx, &mut entity, true);
        assert!(ctx.is_empty());
        assert!(entity.token.is_none());
    }

    #[tokio::test]
    async fn unmonitored_types_are_ignored() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source);

        let mut ctx = OperationContext::new();
        let mut entity = measure("x");
        entity.entity_type = "session".to_string();
        tracker.on_before_save(&mut ctx, &mut entity, false);
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn token_is_attached_once_and_reused() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source);

        let mut ctx = OperationContext::new();
        let mut entity = measure("x");
        tracker.on_before_save(&mut ctx, &mut entity, false);
        let token = entity.token.clone().expect("token attached");

        tracker.on_before_save(&mut ctx, &mut entity, false);
        assert_eq!(entity.token.as_ref(), Some(&token));
        // Still a single correlation record for the instance.
        assert_eq!(ctx.len(), 1);
    }

    #[tokio::test]
    async fn paired_capture_writes_exactly_one_record() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source.clone());

        let mut ctx = OperationContext::new();
        let mut entity = measure("x");
        tracker.on_before_save(&mut ctx, &mut entity, false);

        // Simulate persistence.
        entity.pk = Some("1".to_string());
        source.put(&entity);
        tracker.on_after_save(&mut ctx, &entity, false);

        let report = tracker.flush(ctx).await;
        assert_eq!(report.written, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn tokens_differ_between_contexts_and_instances() {
        let store = MemoryStore::new();
        let source = Arc::new(TableSource::default());
        let tracker = tracker(store.clone(), source);

        let mut ctx_a = OperationContext::new();
        let mut first = measure("x");
        let mut second = measure("y");
        tracker.on_before_save(&mut ctx_a, &mut first, false);
        tracker.on_before_save(&mut ctx_a, &mut second, false);
        assert_ne!(first.token, second.token);

        let mut ctx_b = OperationContext::new();
        let mut again = measure("x");
        tracker.on_before_save(&mut ctx_b, &mut again, false);
        // Same type, same (absent) pk, fresh context: the instance still
        // gets its own token value within its context.
        assert!(again.token.is_some());
    }
}
