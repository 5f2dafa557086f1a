//! Trail change-correlation engine -- pairs before/after captures around
//! entity mutations and turns them into durable audit records.
//!
//! The engine sits between the host application's mutation notifications
//! and an [`trail_storage::AuditStore`]. One [`OperationContext`] spans one
//! logical unit of work (one inbound request or equivalent); the
//! [`ChangeTracker`] captures snapshots as notifications arrive and, at
//! the end-of-context flush, builds and appends one record per observed
//! mutation. The [`History`] reader reconstructs stored records into
//! rendering-friendly shapes.
//!
//! The pipeline is best-effort relative to the primary mutation: capture
//! or write failures are reported on the diagnostic channel and never
//! propagate into the operation being audited.

pub mod context;
pub mod history;
pub mod providers;
pub mod record;
pub mod tracker;

pub use context::{CorrelationRecord, OperationContext, Phase};
pub use history::{History, HistoryError, RecordView, SimpleHistory};
pub use providers::{
    ActorResolver, EntitySource, MonitorSet, StaticActor, TypeMonitor, ViewResolver,
    AUDIT_RECORD_TYPE,
};
pub use record::{build_record, ChangePayload};
pub use tracker::{ChangeTracker, FlushReport};
