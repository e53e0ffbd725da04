//! # Staging
//!
//! Staged edits for cluster autoscaling resources.
//!
//! Edits to HPAs and node pools are collected locally, reviewed as field
//! diffs, then applied to a remote API in a controlled order. A pending
//! change set can be saved as a named session and loaded again later.
//!
//! ## Core Concepts
//!
//! - **Ledger**: Insertion-ordered store of staged resources and their apply states
//! - **ChangeSet**: Field-level diff between a baseline and the live values
//! - **Orchestrator**: Applies pending entries, isolating independent items and
//!   sequencing ordered node-pool groups
//! - **Session**: Persisted form of a pending change set
//!
//! ## Example
//!
//! ```ignore
//! use staging::{
//!     AutoConfirm, ApplyOptions, HpaEdit, HpaId, HpaValues, Ledger, NoProgress,
//!     Orchestrator, StagedHpa,
//! };
//!
//! let mut ledger = Ledger::new();
//! let hpa = StagedHpa::new(
//!     HpaId::new("aks-prd", "payments", "api"),
//!     HpaValues { min_replicas: Some(2), max_replicas: 6, ..Default::default() },
//! );
//! let id = hpa.id.clone().into();
//! ledger.upsert(hpa);
//! ledger.update(&id, vec![HpaEdit::MaxReplicas(12).into()])?;
//!
//! let pending = ledger.pending();
//! let mut orchestrator = Orchestrator::new(api, ApplyOptions::default());
//! let summary = orchestrator.execute(&mut ledger, &pending, &mut NoProgress, &mut AutoConfirm)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`ResourceApi`]: Issues apply calls against the cluster management API
//! - [`SessionStore`]: Lists, reads and writes persisted sessions
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! The crate has no dependency on a particular transport or terminal.

pub mod api;
pub mod context;
pub mod diff;
pub mod edit;
pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod types;
pub mod validate;

// Re-export main types at crate root
pub use api::{MemorySessionStore, ResourceApi, SessionStore};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{ChangeSet, Field, FieldChange, FieldValue};
pub use edit::{Edit, HpaEdit, NodePoolEdit};
pub use ledger::{ChangeCount, Ledger};
pub use orchestrator::{ApplyOptions, ApplySummary, Orchestrator, OrchestratorError};
pub use session::{
    CodecError, HpaChange, LoadedSession, NodePoolChange, SequenceStatus, Session, SessionEdit,
    SessionInfo, SessionMetadata, SessionSummary, from_session, to_session,
};
pub use types::{
    ApplyState, ApplyStatus, GroupApplyResponse, GroupError, GroupItemResult, HpaId, HpaValues,
    LedgerEntry, NodePoolId, NodePoolOperation, NodePoolTarget, NodePoolValues, ParseIdError,
    ResourceId, ResourceKind, StagedHpa, StagedNodePool, StagedResource,
};
pub use validate::ValidationError;
