//! Error types for the sync engine.

use ferry_api::{ApiError, EntityGroup, FetchError, Tool};
use thiserror::Error;

/// A payload missing a field the canonical model requires.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {tool} {group} payload: {reason}")]
pub struct SchemaViolation {
    pub tool: Tool,
    pub group: EntityGroup,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(tool: Tool, group: EntityGroup, reason: impl Into<String>) -> Self {
        Self {
            tool,
            group,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream payload missing a required field; the item is skipped.
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    /// A required foreign key has no counterpart in the target tool yet.
    #[error("{group} {id} references {referenced} {reference_id}, which is not linked")]
    UnresolvedReference {
        group: EntityGroup,
        id: String,
        referenced: EntityGroup,
        reference_id: String,
    },

    /// A collection fetch failed for one workspace.
    #[error("fetching {tool} {group} for workspace {workspace_id} failed: {source}")]
    Fetch {
        tool: Tool,
        group: EntityGroup,
        workspace_id: String,
        #[source]
        source: FetchError,
    },

    /// A batch write stopped on a non-permission failure.
    #[error(
        "{group} batch for workspace {workspace_id} aborted at item {failed_index} \
         after {completed} succeeded: {source}"
    )]
    BatchAbort {
        group: EntityGroup,
        workspace_id: String,
        failed_index: usize,
        completed: usize,
        #[source]
        source: ApiError,
    },

    /// Creating the target workspace failed.
    #[error("creating workspace {name:?} in the target tool failed: {source}")]
    WorkspaceCreate {
        name: String,
        #[source]
        source: ApiError,
    },

    /// A phase change the state machine does not allow.
    #[error("{group} cannot move from {from} to {to}")]
    InvalidTransition {
        group: EntityGroup,
        from: String,
        to: String,
    },

    /// No entity with this id in the store.
    #[error("no {tool} {group} with id {id}")]
    UnknownEntity {
        tool: Tool,
        group: EntityGroup,
        id: String,
    },

    /// Entities were fetched from the source tool only.
    #[error("target entities were not fetched; fetch both tools before transferring")]
    TargetNotFetched,

    /// Cancellation was requested at a group boundary.
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the failure is confined to a single item.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            SyncError::SchemaViolation(_) | SyncError::UnresolvedReference { .. }
        )
    }
}
