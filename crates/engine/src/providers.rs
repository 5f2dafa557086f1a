//! Collaborator interfaces at the engine's boundary.
//!
//! The engine never reaches into the host application directly; everything
//! it needs from the surrounding system comes through these traits. Shipped
//! implementations cover the common embedding cases; real deployments
//! substitute their own.

use std::collections::BTreeSet;

use trail_core::Entity;

/// Read access to persisted entity state.
///
/// The tracker re-reads persisted state twice per mutation: once on the
/// before notification to capture prior state, and once on the after
/// notification because the persistence step may normalize values the
/// in-memory instance still holds raw. The call may block on I/O; that is
/// expected and not subject to a timeout here.
pub trait EntitySource: Send + Sync {
    /// Load the persisted counterpart of an entity, or `None` when no
    /// persisted row exists. Read failures are treated as absence: the
    /// audit pipeline is best-effort relative to the primary mutation.
    fn load(&self, entity_type: &str, pk: &str) -> Option<Entity>;
}

/// Point-in-time oracle deciding which entity types are tracked.
pub trait TypeMonitor: Send + Sync {
    fn is_monitored(&self, entity_type: &str) -> bool;
}

/// Type identifier of the audit record itself. Always excluded from
/// monitoring so an append can never trigger another append.
pub const AUDIT_RECORD_TYPE: &str = "trail.audit_record";

/// A `TypeMonitor` backed by an explicit allow set and an explicit
/// exclusion set.
///
/// The exclusion set wins over the allow set and always contains
/// [`AUDIT_RECORD_TYPE`]; recursion prevention is declared configuration
/// here, not a special case buried in the tracker.
#[derive(Debug, Clone)]
pub struct MonitorSet {
    monitored: BTreeSet<String>,
    excluded: BTreeSet<String>,
}

impl MonitorSet {
    pub fn new<I, T>(monitored: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut excluded = BTreeSet::new();
        excluded.insert(AUDIT_RECORD_TYPE.to_string());
        MonitorSet {
            monitored: monitored.into_iter().map(Into::into).collect(),
            excluded,
        }
    }

    /// Add a type to the exclusion set.
    pub fn exclude(mut self, entity_type: impl Into<String>) -> Self {
        self.excluded.insert(entity_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.monitored.is_empty()
    }
}

impl TypeMonitor for MonitorSet {
    fn is_monitored(&self, entity_type: &str) -> bool {
        !self.excluded.contains(entity_type) && self.monitored.contains(entity_type)
    }
}

/// Resolution of the actor responsible for the current operation.
///
/// `fallback_actor_id` must be deterministic for a given deployment; it is
/// what ends up on records written outside any user session (the original
/// system fell back to "first superuser found", an order-dependent policy
/// worth overriding). Implementations should report fallback use on their
/// own diagnostic channel; the engine applies the fallback silently and
/// never blocks the mutation on it.
pub trait ActorResolver: Send + Sync {
    /// Identifier of the current actor, when one is determinable.
    fn current_actor_id(&self) -> Option<String>;

    /// Deterministic default used when no actor is determinable.
    fn fallback_actor_id(&self) -> String;
}

/// Fixed actor resolution, for tests and embeddings without a session
/// layer.
#[derive(Debug, Clone)]
pub struct StaticActor {
    current: Option<String>,
    fallback: String,
}

impl StaticActor {
    /// An actor that is always known.
    pub fn known(id: impl Into<String>) -> Self {
        let id = id.into();
        StaticActor {
            current: Some(id.clone()),
            fallback: id,
        }
    }

    /// No current actor; every record gets the fallback id.
    pub fn anonymous(fallback: impl Into<String>) -> Self {
        StaticActor {
            current: None,
            fallback: fallback.into(),
        }
    }
}

impl ActorResolver for StaticActor {
    fn current_actor_id(&self) -> Option<String> {
        self.current.clone()
    }

    fn fallback_actor_id(&self) -> String {
        self.fallback.clone()
    }
}

/// Resolution of named custom views for entities that opt into richer
/// payloads.
///
/// The engine only knows "call the named resolver, embed whatever mapping
/// it returns"; rendering is entirely the collaborator's business.
pub trait ViewResolver: Send + Sync {
    fn render(&self, view: &str, entity: &Entity) -> Result<serde_json::Value, String>;
}
