use std::future::Future;

use super::{make_record, TestResult};
use crate::record::ActionKind;
use crate::{AuditStore, StorageError};

const ALL_KINDS: [ActionKind; 3] = [
    ActionKind::Addition,
    ActionKind::Change,
    ActionKind::Deletion,
];

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "query_filters_by_action_kind",
        query_filters_by_action_kind(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "query_filters_by_entity_pk",
        query_filters_by_entity_pk(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "query_filters_by_type_id",
        query_filters_by_type_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "query_returns_ascending_id_order",
        query_returns_ascending_id_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "query_unknown_entity_is_empty",
        query_unknown_entity_is_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "pk_less_records_never_match",
        pk_less_records_never_match(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "get_unknown_id_is_record_not_found",
        get_unknown_id_is_record_not_found(factory).await,
    ));

    results
}

async fn query_filters_by_action_kind<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .append(make_record("1", ActionKind::Addition))
        .await
        .map_err(|e| format!("append: {e}"))?;
    store
        .append(make_record("1", ActionKind::Change))
        .await
        .map_err(|e| format!("append: {e}"))?;
    store
        .append(make_record("1", ActionKind::Deletion))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let changes = store
        .query(Some(7), "1", &[ActionKind::Change])
        .await
        .map_err(|e| format!("query: {e}"))?;
    if changes.len() != 1 || changes[0].action != ActionKind::Change {
        return Err(format!("expected one Change record, got {changes:?}"));
    }

    let ends = store
        .query(Some(7), "1", &[ActionKind::Addition, ActionKind::Deletion])
        .await
        .map_err(|e| format!("query: {e}"))?;
    if ends.len() != 2 {
        return Err(format!("expected two records, got {}", ends.len()));
    }
    Ok(())
}

async fn query_filters_by_entity_pk<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .append(make_record("1", ActionKind::Change))
        .await
        .map_err(|e| format!("append: {e}"))?;
    store
        .append(make_record("2", ActionKind::Change))
        .await
        .map_err(|e| format!("append: {e}"))?;

    let records = store
        .query(Some(7), "2", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    if records.len() != 1 || records[0].entity_pk.as_deref() != Some("2") {
        return Err(format!("expected only pk 2, got {records:?}"));
    }
    Ok(())
}

async fn query_filters_by_type_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut relational = make_record("1", ActionKind::Change);
    relational.type_id = Some(7);
    let mut document = make_record("1", ActionKind::Change);
    document.type_id = None;
    store
        .append(relational)
        .await
        .map_err(|e| format!("append: {e}"))?;
    store
        .append(document)
        .await
        .map_err(|e| format!("append: {e}"))?;

    let typed = store
        .query(Some(7), "1", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    if typed.len() != 1 || typed[0].type_id != Some(7) {
        return Err(format!("expected one typed record, got {typed:?}"));
    }

    let untyped = store
        .query(None, "1", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    if untyped.len() != 1 || untyped[0].type_id.is_some() {
        return Err(format!("expected one untyped record, got {untyped:?}"));
    }
    Ok(())
}

async fn query_returns_ascending_id_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for _ in 0..5 {
        store
            .append(make_record("1", ActionKind::Change))
            .await
            .map_err(|e| format!("append: {e}"))?;
    }
    let records = store
        .query(Some(7), "1", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    let sorted = records.windows(2).all(|w| w[0].id < w[1].id);
    if !sorted {
        return Err("records not in ascending id order".to_string());
    }
    Ok(())
}

async fn query_unknown_entity_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .append(make_record("1", ActionKind::Change))
        .await
        .map_err(|e| format!("append: {e}"))?;
    let records = store
        .query(Some(7), "nonexistent", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    if !records.is_empty() {
        return Err(format!("expected no records, got {}", records.len()));
    }
    Ok(())
}

/// Records appended without a primary key are reachable by `get` but can
/// never match an entity query.
async fn pk_less_records_never_match<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut record = make_record("1", ActionKind::Deletion);
    record.entity_pk = None;
    let id = store
        .append(record)
        .await
        .map_err(|e| format!("append: {e}"))?;

    store.get(id).await.map_err(|e| format!("get: {e}"))?;

    let records = store
        .query(Some(7), "1", &ALL_KINDS)
        .await
        .map_err(|e| format!("query: {e}"))?;
    if !records.is_empty() {
        return Err("pk-less record matched an entity query".to_string());
    }
    Ok(())
}

async fn get_unknown_id_is_record_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AuditStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.get(999).await {
        Err(StorageError::RecordNotFound { record_id: 999 }) => Ok(()),
        Err(other) => Err(format!("wrong error variant: {other}")),
        Ok(_) => Err("expected RecordNotFound, got a record".to_string()),
    }
}
