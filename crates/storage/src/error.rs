/// All errors that can be returned by an AuditStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No audit record exists with the given id.
    #[error("audit record not found: {record_id}")]
    RecordNotFound { record_id: i64 },

    /// A wire action code outside the known set was read back.
    #[error("invalid action code: {code}")]
    InvalidActionCode { code: u8 },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
