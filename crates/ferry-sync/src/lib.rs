//! Entity synchronization engine for Ferry.
//!
//! Normalizes both tools' payloads into one canonical model, links source
//! entities to their target counterparts, and drives dependency-ordered
//! transfers through the throttled batch executor.
//!
//! ## Features
//!
//! - **Model**: canonical records tagged by entity group
//! - **Transform**: per-tool payload normalization and create bodies
//! - **Store**: per-tool normalized stores mutated only through commands
//! - **Linker**: natural-key and explicit-pair identity linking
//! - **Orchestrator**: fetch, link, transfer and delete pipelines with phase tracking

mod error;
pub mod events;
pub mod linker;
pub mod model;
pub mod orchestrator;
pub mod phase;
pub mod retarget;
pub mod selection;
pub mod store;
pub mod transform;

pub use error::{SchemaViolation, SyncError};
pub use events::{EventBus, Notification, NotificationLevel, SyncEvent};
pub use linker::LinkPair;
pub use model::{EntityFields, EntityRecord};
pub use orchestrator::{
    GroupReport, Orchestrator, OrchestratorBuilder, RunReport, Snapshot, WorkspaceFailure,
    WorkspacePair,
};
pub use phase::{GroupPhase, PhaseTable};
pub use selection::{EntityFilter, RecordCounts};
pub use store::{EntityStore, StoreCommand, StoreState, ToolStore};
