//! Per workspace, per group pipeline phases.

use std::collections::BTreeMap;
use std::fmt;

use ferry_api::EntityGroup;
use serde::Serialize;

use crate::SyncError;

/// Where one workspace-group pair is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum GroupPhase {
    #[default]
    Idle,
    Fetching,
    Linking,
    /// Linked, with entities waiting for the user to confirm the transfer.
    ReadyForReview,
    /// Confirmed, or nothing left to transfer.
    ReadyForTransfer,
    Transferring,
    Done,
    /// A fetch or transfer failed. Retrying re-enters `during`.
    Error {
        during: Box<GroupPhase>,
        message: String,
    },
}

impl GroupPhase {
    pub fn name(&self) -> &'static str {
        match self {
            GroupPhase::Idle => "idle",
            GroupPhase::Fetching => "fetching",
            GroupPhase::Linking => "linking",
            GroupPhase::ReadyForReview => "ready for review",
            GroupPhase::ReadyForTransfer => "ready for transfer",
            GroupPhase::Transferring => "transferring",
            GroupPhase::Done => "done",
            GroupPhase::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GroupPhase::Error { .. })
    }

    /// Whether the state machine allows `self → next`.
    pub fn can_transition(&self, next: &GroupPhase) -> bool {
        use GroupPhase::*;
        match (self, next) {
            (Idle | Done | ReadyForReview | ReadyForTransfer, Fetching) => true,
            (Fetching, Linking) => true,
            (Linking, ReadyForReview | ReadyForTransfer) => true,
            (ReadyForReview, ReadyForTransfer) => true,
            (ReadyForTransfer, Transferring | Done) => true,
            (Transferring, Done) => true,
            (Done, ReadyForTransfer) => true,
            (Fetching | Transferring, Error { during, .. }) => **during == *self,
            (Error { during, .. }, next) => **during == *next,
            _ => false,
        }
    }

    /// Move to `next`, or explain why not.
    pub fn transition(&self, group: EntityGroup, next: GroupPhase) -> Result<GroupPhase, SyncError> {
        if self.can_transition(&next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidTransition {
                group,
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// The failure state for the current phase.
    pub fn failed(&self, message: impl Into<String>) -> GroupPhase {
        GroupPhase::Error {
            during: Box::new(self.clone()),
            message: message.into(),
        }
    }
}

impl fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupPhase::Error { during, message } => {
                write!(f, "error while {}: {}", during.name(), message)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Phases keyed by (source workspace id, group).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTable {
    phases: BTreeMap<(String, EntityGroup), GroupPhase>,
}

impl PhaseTable {
    pub fn get(&self, workspace_id: &str, group: EntityGroup) -> GroupPhase {
        self.phases
            .get(&(workspace_id.to_string(), group))
            .cloned()
            .unwrap_or_default()
    }

    /// Apply a checked transition.
    pub fn advance(
        &mut self,
        workspace_id: &str,
        group: EntityGroup,
        next: GroupPhase,
    ) -> Result<GroupPhase, SyncError> {
        let current = self.get(workspace_id, group);
        let next = current.transition(group, next)?;
        self.phases
            .insert((workspace_id.to_string(), group), next.clone());
        Ok(next)
    }

    /// Put every group of a workspace back to idle.
    pub fn reset_workspace(&mut self, workspace_id: &str) {
        self.phases.retain(|(ws, _), _| ws != workspace_id);
    }

    /// Phases of one workspace in dependency order.
    pub fn for_workspace(&self, workspace_id: &str) -> Vec<(EntityGroup, GroupPhase)> {
        EntityGroup::TRANSFER_ORDER
            .iter()
            .map(|group| (*group, self.get(workspace_id, *group)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EntityGroup, &GroupPhase)> {
        self.phases
            .iter()
            .map(|((ws, group), phase)| (ws.as_str(), *group, phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(GroupPhase::Idle, GroupPhase::Fetching, true ; "idle starts fetching")]
    #[test_case(GroupPhase::Fetching, GroupPhase::Linking, true ; "fetch then link")]
    #[test_case(GroupPhase::Linking, GroupPhase::ReadyForReview, true ; "link to review")]
    #[test_case(GroupPhase::ReadyForTransfer, GroupPhase::Done, true ; "empty group skips transfer")]
    #[test_case(GroupPhase::Idle, GroupPhase::Transferring, false ; "cannot transfer unfetched")]
    #[test_case(GroupPhase::ReadyForReview, GroupPhase::Transferring, false ; "review must be confirmed")]
    #[test_case(GroupPhase::Linking, GroupPhase::Linking.failed("x"), false ; "linking cannot fail")]
    #[test_case(GroupPhase::Transferring, GroupPhase::Fetching.failed("x"), false ; "error records the failing phase")]
    fn test_transitions(from: GroupPhase, to: GroupPhase, allowed: bool) {
        assert_eq!(from.can_transition(&to), allowed);
    }

    #[test]
    fn test_retry_returns_to_failed_phase() {
        let failed = GroupPhase::Transferring.failed("boom");
        assert!(failed.can_transition(&GroupPhase::Transferring));
        assert!(!failed.can_transition(&GroupPhase::Fetching));
        assert_eq!(failed.to_string(), "error while transferring: boom");
    }

    #[test]
    fn test_table_rejects_invalid_transition() {
        let mut table = PhaseTable::default();
        table.advance("7", EntityGroup::Tags, GroupPhase::Fetching).unwrap();

        let err = table
            .advance("7", EntityGroup::Tags, GroupPhase::Done)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));
        assert_eq!(table.get("7", EntityGroup::Tags), GroupPhase::Fetching);
        assert_eq!(table.get("8", EntityGroup::Tags), GroupPhase::Idle);
    }
}
