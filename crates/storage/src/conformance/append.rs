use std::future::Future;
use std::sync::Arc;

use super::{make_record, TestResult};
use crate::record::{ActionKind, NewAuditRecord};
use crate::AuditStore;

/// Number of concurrent tasks to spawn in the concurrency test.
const N: usize = 10;

pub(super) async fn run_append_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "append",
        "append_assigns_increasing_ids",
        append_assigns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "append_stamps_recorded_at",
        append_stamps_recorded_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "append_preserves_fields",
        append_preserves_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "payload_is_opaque_to_the_store",
        payload_is_opaque_to_the_store(factory).await,
    ));
    results.push(TestResult::from_result(
        "append",
        "concurrent_appends_all_land",
        concurrent_appends_all_land(factory).await,
    ));

    results
}

/// Ids must be strictly increasing so ascending id order doubles as
/// chronological order.
async fn append_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut last = 0;
    for i in 0..5 {
        let id = store
            .append(make_record("1", ActionKind::Change))
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
        if id <= last {
            return Err(format!("id {id} not greater than previous {last}"));
        }
        last = id;
    }
    Ok(())
}

async fn append_stamps_recorded_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let id = store
        .append(make_record("1", ActionKind::Addition))
        .await
        .map_err(|e| format!("append: {e}"))?;
    let record = store.get(id).await.map_err(|e| format!("get: {e}"))?;
    if record.recorded_at.is_empty() {
        return Err("recorded_at is empty".to_string());
    }
    // ISO 8601 shape: date, 'T' separator, trailing zone designator.
    if !record.recorded_at.contains('T') || !record.recorded_at.ends_with('Z') {
        return Err(format!("recorded_at not ISO 8601: {}", record.recorded_at));
    }
    Ok(())
}

async fn append_preserves_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let new = make_record("42", ActionKind::Deletion);
    let id = store
        .append(new.clone())
        .await
        .map_err(|e| format!("append: {e}"))?;
    let record = store.get(id).await.map_err(|e| format!("get: {e}"))?;

    if record.actor_id != new.actor_id {
        return Err(format!("actor_id mismatch: {}", record.actor_id));
    }
    if record.type_id != new.type_id {
        return Err(format!("type_id mismatch: {:?}", record.type_id));
    }
    if record.entity_pk != new.entity_pk {
        return Err(format!("entity_pk mismatch: {:?}", record.entity_pk));
    }
    if record.display != new.display {
        return Err(format!("display mismatch: {}", record.display));
    }
    if record.action != new.action {
        return Err(format!("action mismatch: {:?}", record.action));
    }
    if record.payload != new.payload {
        return Err(format!("payload mismatch: {}", record.payload));
    }
    Ok(())
}

/// The payload column is a serialized string the store must not interpret
/// or canonicalize; byte fidelity is what makes reader round-trips exact.
async fn payload_is_opaque_to_the_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let payload = r#"{"changes":{"geom":{"old":null,"new":{"type":"Point","coordinates":[5.1,52.0]}}},"summary":"moved"}"#;
    let mut new = make_record("1", ActionKind::Change);
    new.payload = payload.to_string();
    let id = store.append(new).await.map_err(|e| format!("append: {e}"))?;
    let record = store.get(id).await.map_err(|e| format!("get: {e}"))?;
    if record.payload != payload {
        return Err(format!("payload altered: {}", record.payload));
    }
    Ok(())
}

/// N tasks append concurrently; every append must land exactly once with a
/// distinct id.
async fn concurrent_appends_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let record = NewAuditRecord {
                actor_id: format!("actor-{i}"),
                type_id: Some(7),
                entity_pk: Some("1".to_string()),
                display: "entity 1".to_string(),
                action: ActionKind::Change,
                payload: r#"{"changes":{}}"#.to_string(),
            };
            s.append(record).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("join: {e}"))?
            .map_err(|e| format!("append: {e}"))?;
        ids.push(id);
    }

    ids.sort_unstable();
    ids.dedup();
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }

    let all = store
        .query(
            Some(7),
            "1",
            &[ActionKind::Addition, ActionKind::Change, ActionKind::Deletion],
        )
        .await
        .map_err(|e| format!("query: {e}"))?;
    if all.len() != N {
        return Err(format!("expected {N} records, found {}", all.len()));
    }
    Ok(())
}
