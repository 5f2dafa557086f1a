use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{ActionKind, AuditRecord, NewAuditRecord};

/// The storage trait for trail audit backends.
///
/// An `AuditStore` implementation provides durable, append-only storage
/// for audit records. The pipeline only ever appends and reads; records
/// are never updated or deleted once written.
///
/// ## Append Semantics
///
/// `append` assigns the record id and the `recorded_at` timestamp and
/// returns the id. Ids are strictly increasing within one backend, so
/// ascending id order is also chronological order. Atomicity of a single
/// append is the backend's responsibility; the pipeline performs no
/// cross-record transactions.
///
/// ## Concurrency
///
/// Appends from independent operation contexts may race; the backend must
/// serialize id assignment so that every append lands exactly once. No
/// other coordination is required of callers.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a single store can
/// be shared across execution units.
#[async_trait]
pub trait AuditStore: Send + Sync + 'static {
    /// Append a record, returning the store-assigned id.
    async fn append(&self, record: NewAuditRecord) -> Result<i64, StorageError>;

    /// All records for one entity, filtered by action kind, in ascending
    /// id order.
    ///
    /// A record matches when its `type_id` equals `type_id`, its
    /// `entity_pk` equals `entity_pk`, and its action is one of `kinds`.
    /// Records appended without a primary key never match a query.
    async fn query(
        &self,
        type_id: Option<i64>,
        entity_pk: &str,
        kinds: &[ActionKind],
    ) -> Result<Vec<AuditRecord>, StorageError>;

    /// Read a single record by id.
    ///
    /// Returns `Err(StorageError::RecordNotFound)` if no record has the id.
    async fn get(&self, record_id: i64) -> Result<AuditRecord, StorageError>;
}
