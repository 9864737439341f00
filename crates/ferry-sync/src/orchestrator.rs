//! Migration orchestrator.
//!
//! Drives the pipeline for every selected workspace:
//! 1. Fetch workspaces from both tools and link them by name
//! 2. Fetch each entity group in dependency order and link by natural key
//! 3. Transfer included, unlinked entities and link the created records
//!
//! Group N+1 never starts before group N has finished for every workspace.
//! The orchestrator owns the only writable store; readers see snapshots
//! published after each change.

use std::collections::HashSet;
use std::sync::Arc;

use ferry_api::{AbortSignal, EntityGroup, FetchError, ItemProgress, Tool, ToolApi, run_batch};
use futures_util::future::{join, join_all};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::events::{EventBus, Notification, SyncEvent};
use crate::linker::{self, LinkPair};
use crate::phase::{GroupPhase, PhaseTable};
use crate::retarget::retarget;
use crate::selection::{self, EntityFilter, RecordCounts};
use crate::store::{StoreCommand, StoreState, reduce};
use crate::transform;
use crate::{EntityRecord, SyncError};

/// Committed state as seen by readers.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub stores: StoreState,
    pub phases: PhaseTable,
}

/// A selected source workspace and its target counterpart, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePair {
    pub source_id: String,
    pub target_id: Option<String>,
    pub name: String,
}

/// Outcome of one group in one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub workspace_id: String,
    pub group: EntityGroup,
    pub completed: usize,
    pub skipped: usize,
}

/// A workspace whose pipeline stopped.
#[derive(Debug)]
pub struct WorkspaceFailure {
    pub workspace_id: String,
    /// `None` when the workspace itself could not be prepared.
    pub group: Option<EntityGroup>,
    pub error: SyncError,
}

/// Summary of one fetch, transfer or delete run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
    pub failures: Vec<WorkspaceFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Items completed across every group.
    pub fn completed(&self) -> usize {
        self.groups.iter().map(|g| g.completed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.groups.iter().map(|g| g.skipped).sum()
    }
}

/// Result of writing one group for one workspace.
#[derive(Debug, Default)]
struct WriteOutcome {
    /// Newly created target records.
    created: Vec<EntityRecord>,
    links: Vec<LinkPair>,
    /// Source ids removed from the source tool.
    removed: Vec<String>,
    completed: usize,
    skipped: usize,
    error: Option<SyncError>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    source: Arc<dyn ToolApi>,
    target: Arc<dyn ToolApi>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OrchestratorBuilder {
    pub fn new(source: Arc<dyn ToolApi>, target: Arc<dyn ToolApi>) -> Self {
        Self {
            source,
            target,
            cancel: None,
        }
    }

    /// Stop at the next group boundary once this turns `true`.
    pub fn cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Orchestrator {
        let cancel = self.cancel.unwrap_or_else(|| watch::channel(false).1);
        let (snapshots, _) = watch::channel(Arc::new(Snapshot::default()));
        Orchestrator {
            source: self.source,
            target: self.target,
            state: StoreState::default(),
            phases: PhaseTable::default(),
            events: EventBus::new(),
            snapshots,
            cancel,
            target_fetched: true,
        }
    }
}

/// Owns both stores and sequences every remote operation.
pub struct Orchestrator {
    source: Arc<dyn ToolApi>,
    target: Arc<dyn ToolApi>,
    state: StoreState,
    phases: PhaseTable,
    events: EventBus,
    snapshots: watch::Sender<Arc<Snapshot>>,
    cancel: watch::Receiver<bool>,
    /// False after a source-only fetch; transfers need target links.
    target_fetched: bool,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn ToolApi>, target: Arc<dyn ToolApi>) -> Self {
        OrchestratorBuilder::new(source, target).build()
    }

    pub fn builder(source: Arc<dyn ToolApi>, target: Arc<dyn ToolApi>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(source, target)
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Progress, skip and notification events from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SyncEvent> {
        self.events.prune();
        self.events.subscribe()
    }

    /// Committed snapshots, updated after every change.
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    pub fn view(&self, filter: &EntityFilter) -> Vec<&EntityRecord> {
        selection::entities_for_view(&self.state, filter)
    }

    /// Counts for one source workspace and group.
    pub fn record_counts(&self, workspace_id: &str, group: EntityGroup) -> RecordCounts {
        selection::record_counts(&self.state.source, group, workspace_id)
    }

    /// Source workspaces currently selected, with their target links.
    pub fn selected_workspaces(&self) -> Vec<WorkspacePair> {
        self.state
            .source
            .group(EntityGroup::Workspaces)
            .iter()
            .filter(|w| w.is_included)
            .map(|w| WorkspacePair {
                source_id: w.id.clone(),
                target_id: w.linked_id.clone(),
                name: w.natural_key().unwrap_or_default().to_string(),
            })
            .collect()
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Apply a store command and publish the result.
    pub fn dispatch(&mut self, command: StoreCommand) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, command);
        self.publish();
    }

    pub fn toggle_included(
        &mut self,
        tool: Tool,
        group: EntityGroup,
        id: &str,
    ) -> Result<(), SyncError> {
        self.ensure_exists(tool, group, id)?;
        self.dispatch(StoreCommand::ToggleIncluded {
            tool,
            group,
            id: id.to_string(),
        });
        Ok(())
    }

    pub fn set_included(
        &mut self,
        tool: Tool,
        group: EntityGroup,
        id: &str,
        included: bool,
    ) -> Result<(), SyncError> {
        self.ensure_exists(tool, group, id)?;
        self.dispatch(StoreCommand::SetIncluded {
            tool,
            group,
            id: id.to_string(),
            included,
        });
        Ok(())
    }

    /// "Select all" / "select none" over the visible set.
    pub fn set_included_for_view(&mut self, filter: EntityFilter, included: bool) {
        self.dispatch(StoreCommand::SetIncludedForView { filter, included });
    }

    fn ensure_exists(&self, tool: Tool, group: EntityGroup, id: &str) -> Result<(), SyncError> {
        if self.state.tool(tool).group(group).contains(id) {
            Ok(())
        } else {
            Err(SyncError::UnknownEntity {
                tool,
                group,
                id: id.to_string(),
            })
        }
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Confirm a reviewed group for transfer.
    pub fn approve(&mut self, workspace_id: &str, group: EntityGroup) -> Result<(), SyncError> {
        self.set_phase(workspace_id, group, GroupPhase::ReadyForTransfer)
    }

    /// Confirm every reviewed group of every selected workspace.
    pub fn approve_all(&mut self) -> Result<(), SyncError> {
        for pair in self.selected_workspaces() {
            for group in EntityGroup::TRANSFER_ORDER {
                if self.phases.get(&pair.source_id, group) == GroupPhase::ReadyForReview {
                    self.approve(&pair.source_id, group)?;
                }
            }
        }
        Ok(())
    }

    /// Move a failed group back to the phase that failed.
    pub fn retry(&mut self, workspace_id: &str, group: EntityGroup) -> Result<GroupPhase, SyncError> {
        let GroupPhase::Error { during, .. } = self.phases.get(workspace_id, group) else {
            return Err(SyncError::InvalidTransition {
                group,
                from: self.phases.get(workspace_id, group).to_string(),
                to: "retry".to_string(),
            });
        };
        self.set_phase(workspace_id, group, *during.clone())?;
        Ok(*during)
    }

    fn set_phase(
        &mut self,
        workspace_id: &str,
        group: EntityGroup,
        next: GroupPhase,
    ) -> Result<(), SyncError> {
        let phase = self.phases.advance(workspace_id, group, next)?;
        debug!(workspace_id, %group, %phase, "phase changed");
        self.events.emit(SyncEvent::PhaseChanged {
            workspace_id: workspace_id.to_string(),
            group,
            phase,
        });
        self.publish();
        Ok(())
    }

    /// Record a failure that halts a workspace: error phase where the state
    /// machine allows one, and exactly one notification.
    fn fail(
        &mut self,
        report: &mut RunReport,
        workspace_id: &str,
        group: Option<EntityGroup>,
        error: SyncError,
    ) {
        warn!(workspace_id, group = ?group, error = %error, "workspace halted");
        if let Some(group) = group {
            let current = self.phases.get(workspace_id, group);
            let failed = current.failed(error.to_string());
            if current.can_transition(&failed) {
                // Checked above, cannot fail.
                let _ = self.set_phase(workspace_id, group, failed);
            }
        }
        self.events.notify(Notification::error(error.to_string()));
        report.failures.push(WorkspaceFailure {
            workspace_id: workspace_id.to_string(),
            group,
            error,
        });
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if *self.cancel.borrow() {
            info!("cancellation requested, stopping at group boundary");
            self.events
                .notify(Notification::info("Run cancelled; completed groups were kept"));
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(Snapshot {
            stores: self.state.clone(),
            phases: self.phases.clone(),
        }));
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Fetch both tools' workspaces and link them by name.
    ///
    /// Selection survives a refetch; new source workspaces start unselected.
    #[instrument(skip(self))]
    pub async fn fetch_workspaces(&mut self) -> Result<(), SyncError> {
        let (source, target) = join(
            self.source.fetch_collection(EntityGroup::Workspaces, ""),
            self.target.fetch_collection(EntityGroup::Workspaces, ""),
        )
        .await;

        let source = match source {
            Ok(items) => items,
            Err(e) => return Err(self.fetch_failed(Tool::Source, EntityGroup::Workspaces, "", e)),
        };
        let target = match target {
            Ok(items) => items,
            Err(e) => return Err(self.fetch_failed(Tool::Target, EntityGroup::Workspaces, "", e)),
        };

        for (tool, items) in [(Tool::Source, source), (Tool::Target, target)] {
            let mut records = self.normalize_items(tool, EntityGroup::Workspaces, &items, None, "");
            let existing = self.state.tool(tool).group(EntityGroup::Workspaces);
            for record in &mut records {
                if let Some(previous) = existing.get(&record.id) {
                    record.is_included = previous.is_included;
                }
            }
            let workspace_ids: Vec<String> = existing
                .ids()
                .iter()
                .cloned()
                .chain(records.iter().map(|r| r.id.clone()))
                .collect();
            self.dispatch(StoreCommand::ReplaceGroup {
                tool,
                group: EntityGroup::Workspaces,
                workspace_ids,
                records,
            });
        }

        let pairs = linker::match_workspaces(
            self.state.source.group(EntityGroup::Workspaces),
            self.state.target.group(EntityGroup::Workspaces),
        );
        info!(
            source = self.state.source.group(EntityGroup::Workspaces).len(),
            target = self.state.target.group(EntityGroup::Workspaces).len(),
            linked = pairs.len(),
            "workspaces fetched"
        );
        self.dispatch(StoreCommand::Link {
            group: EntityGroup::Workspaces,
            pairs,
        });
        Ok(())
    }

    /// Select or deselect a source workspace by id or exact name.
    pub fn select_workspace(&mut self, id_or_name: &str, included: bool) -> Result<(), SyncError> {
        let id = self
            .state
            .source
            .group(EntityGroup::Workspaces)
            .iter()
            .find(|w| w.id == id_or_name || w.natural_key() == Some(id_or_name))
            .map(|w| w.id.clone())
            .ok_or_else(|| SyncError::UnknownEntity {
                tool: Tool::Source,
                group: EntityGroup::Workspaces,
                id: id_or_name.to_string(),
            })?;
        self.set_included(Tool::Source, EntityGroup::Workspaces, &id, included)
    }

    /// Fetch every entity group for the selected workspaces, in dependency
    /// order, and link each group by natural key.
    ///
    /// Starts the pipeline over: previously fetched entities and phases of
    /// the selected workspaces are discarded.
    #[instrument(skip(self))]
    pub async fn fetch_entities(&mut self) -> Result<RunReport, SyncError> {
        self.fetch_groups(true).await
    }

    /// Like [`fetch_entities`](Self::fetch_entities), but leaves the target
    /// tool alone: nothing is fetched from it and nothing is linked. Enough
    /// to prepare a [`delete`](Self::delete), not a transfer.
    #[instrument(skip(self))]
    pub async fn fetch_source_entities(&mut self) -> Result<RunReport, SyncError> {
        self.fetch_groups(false).await
    }

    async fn fetch_groups(&mut self, with_target: bool) -> Result<RunReport, SyncError> {
        let mut report = RunReport::default();
        let mut selected = self.selected_workspaces();
        if !with_target {
            for pair in &mut selected {
                pair.target_id = None;
            }
        }
        if selected.is_empty() {
            self.events
                .notify(Notification::info("No workspaces selected; nothing to fetch"));
            return Ok(report);
        }

        for pair in &selected {
            self.phases.reset_workspace(&pair.source_id);
        }
        self.dispatch(StoreCommand::ResetTool { tool: Tool::Source });
        self.dispatch(StoreCommand::ResetTool { tool: Tool::Target });
        self.target_fetched = with_target;

        let mut halted: HashSet<String> = HashSet::new();

        for group in EntityGroup::TRANSFER_ORDER {
            self.check_cancelled()?;

            let active: Vec<WorkspacePair> = selected
                .iter()
                .filter(|p| !halted.contains(&p.source_id))
                .cloned()
                .collect();
            if active.is_empty() {
                break;
            }

            for pair in &active {
                self.set_phase(&pair.source_id, group, GroupPhase::Fetching)?;
            }

            let results = join_all(active.iter().map(|pair| self.fetch_pair(group, pair))).await;

            for (pair, result) in active.iter().zip(results) {
                match result {
                    Ok((source_items, target_items)) => {
                        let linked = self.commit_fetch(group, pair, source_items, target_items)?;
                        report.groups.push(GroupReport {
                            workspace_id: pair.source_id.clone(),
                            group,
                            completed: linked,
                            skipped: 0,
                        });
                    }
                    Err(error) => {
                        halted.insert(pair.source_id.clone());
                        self.fail(&mut report, &pair.source_id, Some(group), error);
                    }
                }
            }
        }

        info!(
            workspaces = selected.len(),
            with_target,
            failed = report.failures.len(),
            "fetch complete"
        );
        Ok(report)
    }

    async fn fetch_pair(
        &self,
        group: EntityGroup,
        pair: &WorkspacePair,
    ) -> Result<(Vec<Value>, Vec<Value>), SyncError> {
        let target = async {
            match &pair.target_id {
                Some(target_id) => self
                    .target
                    .fetch_collection(group, target_id)
                    .await
                    .map_err(|source| SyncError::Fetch {
                        tool: Tool::Target,
                        group,
                        workspace_id: target_id.clone(),
                        source,
                    }),
                None => Ok(Vec::new()),
            }
        };
        let (source, target) = join(self.fetch_source(group, &pair.source_id), target).await;
        Ok((source?, target?))
    }

    async fn fetch_source(
        &self,
        group: EntityGroup,
        workspace_id: &str,
    ) -> Result<Vec<Value>, SyncError> {
        let fetch_error = |source: FetchError| SyncError::Fetch {
            tool: Tool::Source,
            group,
            workspace_id: workspace_id.to_string(),
            source,
        };

        let mut items = self
            .source
            .fetch_collection(group, workspace_id)
            .await
            .map_err(fetch_error)?;

        if group != EntityGroup::Projects || self.source.project_members_embedded() {
            return Ok(items);
        }

        let project_ids: Vec<String> = items.iter().filter_map(transform::payload_id).collect();
        let api = &self.source;
        let members = run_batch(
            project_ids,
            api.max_in_flight(),
            |project_id, _| async move {
                api.fetch_project_members(workspace_id, &project_id).await
            },
            |_| {},
        )
        .await
        .map_err(|abort| fetch_error(abort.failure.cause))?;

        for skipped in &members.skipped {
            debug!(workspace_id, index = skipped.index, "project members not visible");
        }
        // Indices line up with `items` only for payloads that had an id.
        let mut with_ids: Vec<&mut Value> = items
            .iter_mut()
            .filter(|item| transform::payload_id(item).is_some())
            .collect();
        for completed in members.completed {
            if let Some(project) = with_ids.get_mut(completed.index) {
                transform::attach_project_members(Tool::Source, project, &completed.value);
            }
        }
        Ok(items)
    }

    /// Normalize, store and link one fetched group. Returns the number of
    /// links made.
    fn commit_fetch(
        &mut self,
        group: EntityGroup,
        pair: &WorkspacePair,
        source_items: Vec<Value>,
        target_items: Vec<Value>,
    ) -> Result<usize, SyncError> {
        let source_records = self.normalize_items(
            Tool::Source,
            group,
            &source_items,
            Some(pair.source_id.as_str()),
            &pair.source_id,
        );
        self.dispatch(StoreCommand::ReplaceGroup {
            tool: Tool::Source,
            group,
            workspace_ids: vec![pair.source_id.clone()],
            records: source_records,
        });

        if let Some(target_id) = &pair.target_id {
            let target_records = self.normalize_items(
                Tool::Target,
                group,
                &target_items,
                Some(target_id.as_str()),
                &pair.source_id,
            );
            self.dispatch(StoreCommand::ReplaceGroup {
                tool: Tool::Target,
                group,
                workspace_ids: vec![target_id.clone()],
                records: target_records,
            });
        }

        self.set_phase(&pair.source_id, group, GroupPhase::Linking)?;

        let pairs = match &pair.target_id {
            Some(target_id) => linker::match_by_natural_key(
                self.state.source.group(group),
                self.state.target.group(group),
                &pair.source_id,
                target_id,
            ),
            None => Vec::new(),
        };
        let linked = pairs.len();
        self.dispatch(StoreCommand::Link { group, pairs });

        let pending = self.record_counts(&pair.source_id, group).included_record_count;
        debug!(workspace_id = %pair.source_id, %group, linked, pending, "group linked");
        let next = if pending > 0 {
            GroupPhase::ReadyForReview
        } else {
            GroupPhase::ReadyForTransfer
        };
        self.set_phase(&pair.source_id, group, next)?;
        Ok(linked)
    }

    fn normalize_items(
        &self,
        tool: Tool,
        group: EntityGroup,
        items: &[Value],
        workspace_hint: Option<&str>,
        report_workspace: &str,
    ) -> Vec<EntityRecord> {
        items
            .iter()
            .filter_map(|item| match transform::normalize(tool, group, item, workspace_hint) {
                Ok(record) => Some(record),
                Err(violation) => {
                    warn!(error = %violation, "skipping malformed payload");
                    self.events.emit(SyncEvent::ItemSkipped {
                        workspace_id: report_workspace.to_string(),
                        group,
                        id: transform::payload_id(item).unwrap_or_default(),
                        reason: violation.to_string(),
                    });
                    None
                }
            })
            .collect()
    }

    fn fetch_failed(
        &self,
        tool: Tool,
        group: EntityGroup,
        workspace_id: &str,
        source: FetchError,
    ) -> SyncError {
        let error = SyncError::Fetch {
            tool,
            group,
            workspace_id: workspace_id.to_string(),
            source,
        };
        self.events.notify(Notification::error(error.to_string()));
        error
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Create every included, unlinked source entity of the selected
    /// workspaces in the target tool, group by group.
    ///
    /// A failure halts only the workspace it happened in; links made before
    /// it are kept, so a later run resumes at the failed group.
    #[instrument(skip(self))]
    pub async fn transfer(&mut self) -> Result<RunReport, SyncError> {
        if !self.target_fetched {
            return Err(SyncError::TargetNotFetched);
        }
        let mut report = RunReport::default();
        let mut active = Vec::new();

        for pair in self.selected_workspaces() {
            if pair.target_id.is_some() {
                active.push(pair);
                continue;
            }
            match self.create_target_workspace(&pair).await {
                Ok(target_id) => active.push(WorkspacePair {
                    target_id: Some(target_id),
                    ..pair
                }),
                Err(error) => self.fail(&mut report, &pair.source_id, None, error),
            }
        }

        let mut halted: HashSet<String> = HashSet::new();
        for group in EntityGroup::TRANSFER_ORDER {
            self.check_cancelled()?;

            let running: Vec<WorkspacePair> = active
                .iter()
                .filter(|p| !halted.contains(&p.source_id))
                .cloned()
                .collect();
            let mut jobs = Vec::new();
            for pair in &running {
                let pending: Vec<EntityRecord> = self
                    .state
                    .source
                    .group(group)
                    .in_workspace(&pair.source_id)
                    .filter(|r| r.needs_transfer())
                    .cloned()
                    .collect();
                match self.begin_write(&mut report, pair, group, pending.len()) {
                    Ok(true) => jobs.push((pair.clone(), pending)),
                    Ok(false) => {}
                    Err(error) => {
                        halted.insert(pair.source_id.clone());
                        self.fail(&mut report, &pair.source_id, Some(group), error);
                    }
                }
            }

            let outcomes = join_all(
                jobs.iter()
                    .map(|(pair, pending)| self.transfer_group(group, pair, pending)),
            )
            .await;

            for ((pair, _), outcome) in jobs.iter().zip(outcomes) {
                if !self.finish_write(&mut report, pair, group, outcome) {
                    halted.insert(pair.source_id.clone());
                }
            }
        }

        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failures.len(),
            "transfer complete"
        );
        Ok(report)
    }

    async fn create_target_workspace(&mut self, pair: &WorkspacePair) -> Result<String, SyncError> {
        let Some(source) = self.state.source.get(EntityGroup::Workspaces, &pair.source_id) else {
            return Err(SyncError::UnknownEntity {
                tool: Tool::Source,
                group: EntityGroup::Workspaces,
                id: pair.source_id.clone(),
            });
        };
        let body = transform::denormalize(Tool::Target, source);

        let created = self
            .target
            .create(EntityGroup::Workspaces, "", &body, &AbortSignal::never())
            .await
            .map_err(|source| SyncError::WorkspaceCreate {
                name: pair.name.clone(),
                source,
            })?;
        let record = transform::normalize(Tool::Target, EntityGroup::Workspaces, &created, None)?;
        let target_id = record.id.clone();

        self.dispatch(StoreCommand::Upsert {
            tool: Tool::Target,
            group: EntityGroup::Workspaces,
            records: vec![record],
        });
        self.dispatch(StoreCommand::Link {
            group: EntityGroup::Workspaces,
            pairs: vec![LinkPair::new(pair.source_id.clone(), target_id.clone())],
        });
        info!(name = %pair.name, %target_id, "created target workspace");
        self.events.notify(Notification::info(format!(
            "Created workspace \"{}\" in the target tool",
            pair.name
        )));
        Ok(target_id)
    }

    /// Move a group into `Transferring`, or straight to `Done` when there is
    /// nothing to write. Returns whether a batch should run.
    fn begin_write(
        &mut self,
        report: &mut RunReport,
        pair: &WorkspacePair,
        group: EntityGroup,
        pending: usize,
    ) -> Result<bool, SyncError> {
        let phase = self.phases.get(&pair.source_id, group);

        if pending == 0 {
            match phase {
                GroupPhase::Done => {}
                GroupPhase::ReadyForTransfer | GroupPhase::Transferring => {
                    self.set_phase(&pair.source_id, group, GroupPhase::Done)?;
                }
                // Everything was deselected after the fetch; nothing left to review.
                GroupPhase::ReadyForReview | GroupPhase::Linking => {
                    self.set_phase(&pair.source_id, group, GroupPhase::ReadyForTransfer)?;
                    self.set_phase(&pair.source_id, group, GroupPhase::Done)?;
                }
                _ => {
                    self.set_phase(&pair.source_id, group, GroupPhase::Transferring)?;
                    self.set_phase(&pair.source_id, group, GroupPhase::Done)?;
                }
            }
            self.events.notify(Notification::info(format!(
                "{}: nothing to do for workspace \"{}\"",
                group.label(),
                pair.name
            )));
            report.groups.push(GroupReport {
                workspace_id: pair.source_id.clone(),
                group,
                completed: 0,
                skipped: 0,
            });
            return Ok(false);
        }

        match phase {
            GroupPhase::Transferring => {}
            GroupPhase::Done => {
                self.set_phase(&pair.source_id, group, GroupPhase::ReadyForTransfer)?;
                self.set_phase(&pair.source_id, group, GroupPhase::Transferring)?;
            }
            _ => self.set_phase(&pair.source_id, group, GroupPhase::Transferring)?,
        }
        Ok(true)
    }

    /// Commit a write outcome. Returns `false` if the workspace must halt.
    fn finish_write(
        &mut self,
        report: &mut RunReport,
        pair: &WorkspacePair,
        group: EntityGroup,
        outcome: WriteOutcome,
    ) -> bool {
        if !outcome.created.is_empty() {
            self.dispatch(StoreCommand::Upsert {
                tool: Tool::Target,
                group,
                records: outcome.created,
            });
        }
        if !outcome.links.is_empty() {
            self.dispatch(StoreCommand::Link {
                group,
                pairs: outcome.links,
            });
        }
        if !outcome.removed.is_empty() {
            self.dispatch(StoreCommand::Remove {
                tool: Tool::Source,
                group,
                ids: outcome.removed,
            });
        }

        report.groups.push(GroupReport {
            workspace_id: pair.source_id.clone(),
            group,
            completed: outcome.completed,
            skipped: outcome.skipped,
        });

        match outcome.error {
            Some(error) => {
                self.fail(report, &pair.source_id, Some(group), error);
                false
            }
            None => {
                // Checked transition from Transferring, which begin_write entered.
                let _ = self.set_phase(&pair.source_id, group, GroupPhase::Done);
                let mut message = format!(
                    "{}: {} completed for workspace \"{}\"",
                    group.label(),
                    outcome.completed,
                    pair.name
                );
                if outcome.skipped > 0 {
                    message.push_str(&format!(", {} skipped", outcome.skipped));
                }
                self.events.notify(Notification::info(message));
                true
            }
        }
    }

    async fn transfer_group(
        &self,
        group: EntityGroup,
        pair: &WorkspacePair,
        pending: &[EntityRecord],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        let target_workspace = pair.target_id.as_deref().unwrap_or_default();

        let mut source_ids = Vec::new();
        let mut bodies = Vec::new();
        for record in pending {
            match retarget(record, &self.state.source, target_workspace) {
                Ok(retargeted) => {
                    source_ids.push(record.id.clone());
                    bodies.push(transform::denormalize(Tool::Target, &retargeted));
                }
                Err(error) => {
                    warn!(id = %record.id, error = %error, "skipping entity with unresolved reference");
                    self.skip_item(pair, group, &record.id, error.to_string());
                    outcome.skipped += 1;
                }
            }
        }

        let total = bodies.len();
        let mut completed = 0;
        let api = &self.target;
        let result = run_batch(
            bodies,
            api.max_in_flight(),
            |body, signal| async move {
                api.create(group, target_workspace, &body, &signal).await
            },
            |progress| match progress {
                ItemProgress::Completed { .. } => {
                    completed += 1;
                    self.events.emit(SyncEvent::ItemCompleted {
                        workspace_id: pair.source_id.clone(),
                        group,
                        completed,
                        total,
                    });
                }
                ItemProgress::Skipped { index } => {
                    self.skip_item(pair, group, &source_ids[index], "permission denied".into());
                }
            },
        )
        .await;

        let created = match result {
            Ok(batch) => {
                outcome.skipped += batch.skipped.len();
                batch.completed
            }
            Err(abort) => {
                outcome.skipped += abort.skipped.len();
                outcome.error = Some(SyncError::BatchAbort {
                    group,
                    workspace_id: pair.source_id.clone(),
                    failed_index: abort.failure.index,
                    completed: abort.completed.len(),
                    source: abort.failure.cause,
                });
                abort.completed
            }
        };

        for item in created {
            let source_id = &source_ids[item.index];
            match transform::normalize(Tool::Target, group, &item.value, Some(target_workspace)) {
                Ok(mut record) => {
                    record.linked_id = Some(source_id.clone());
                    outcome
                        .links
                        .push(LinkPair::new(source_id.clone(), record.id.clone()));
                    outcome.created.push(record);
                    outcome.completed += 1;
                }
                Err(violation) => {
                    warn!(id = %source_id, error = %violation, "created entity could not be read back");
                    self.skip_item(pair, group, source_id, violation.to_string());
                    outcome.skipped += 1;
                }
            }
        }
        outcome
    }

    fn skip_item(&self, pair: &WorkspacePair, group: EntityGroup, id: &str, reason: String) {
        self.events.emit(SyncEvent::ItemSkipped {
            workspace_id: pair.source_id.clone(),
            group,
            id: id.to_string(),
            reason,
        });
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete included source entities of the selected workspaces from the
    /// source tool, in reverse dependency order. An empty `groups` means all.
    #[instrument(skip(self))]
    pub async fn delete(&mut self, groups: &[EntityGroup]) -> Result<RunReport, SyncError> {
        let mut report = RunReport::default();
        let selected = self.selected_workspaces();
        let mut halted: HashSet<String> = HashSet::new();

        let order = EntityGroup::TRANSFER_ORDER
            .iter()
            .rev()
            .copied()
            .filter(|g| groups.is_empty() || groups.contains(g));

        for group in order {
            self.check_cancelled()?;

            let running: Vec<WorkspacePair> = selected
                .iter()
                .filter(|p| !halted.contains(&p.source_id))
                .cloned()
                .collect();
            let mut jobs = Vec::new();
            for pair in &running {
                let doomed: Vec<String> = self
                    .state
                    .source
                    .group(group)
                    .in_workspace(&pair.source_id)
                    .filter(|r| r.is_included)
                    .map(|r| r.id.clone())
                    .collect();
                match self.begin_write(&mut report, pair, group, doomed.len()) {
                    Ok(true) => jobs.push((pair.clone(), doomed)),
                    Ok(false) => {}
                    Err(error) => {
                        halted.insert(pair.source_id.clone());
                        self.fail(&mut report, &pair.source_id, Some(group), error);
                    }
                }
            }

            let outcomes = join_all(
                jobs.iter()
                    .map(|(pair, doomed)| self.delete_group(group, pair, doomed)),
            )
            .await;

            for ((pair, _), outcome) in jobs.iter().zip(outcomes) {
                if !self.finish_write(&mut report, pair, group, outcome) {
                    halted.insert(pair.source_id.clone());
                }
            }
        }

        info!(
            deleted = report.completed(),
            skipped = report.skipped(),
            failed = report.failures.len(),
            "delete complete"
        );
        Ok(report)
    }

    async fn delete_group(
        &self,
        group: EntityGroup,
        pair: &WorkspacePair,
        ids: &[String],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        let total = ids.len();
        let mut completed = 0;
        let api = &self.source;
        let workspace_id = pair.source_id.as_str();

        let result = run_batch(
            ids.to_vec(),
            api.max_in_flight(),
            |id, signal| async move {
                api.delete(group, workspace_id, &id, &signal).await
            },
            |progress| match progress {
                ItemProgress::Completed { .. } => {
                    completed += 1;
                    self.events.emit(SyncEvent::ItemCompleted {
                        workspace_id: workspace_id.to_string(),
                        group,
                        completed,
                        total,
                    });
                }
                ItemProgress::Skipped { index } => {
                    self.skip_item(pair, group, &ids[index], "permission denied".into());
                }
            },
        )
        .await;

        let deleted = match result {
            Ok(batch) => {
                outcome.skipped = batch.skipped.len();
                batch.completed
            }
            Err(abort) => {
                outcome.skipped = abort.skipped.len();
                outcome.error = Some(SyncError::BatchAbort {
                    group,
                    workspace_id: pair.source_id.clone(),
                    failed_index: abort.failure.index,
                    completed: abort.completed.len(),
                    source: abort.failure.cause,
                });
                abort.completed
            }
        };

        outcome.completed = deleted.len();
        outcome.removed = deleted.into_iter().map(|c| ids[c.index].clone()).collect();
        outcome
    }
}
