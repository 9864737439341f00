//! Normalized per-tool entity stores.
//!
//! Stores are plain values. The orchestrator owns the only writable copy and
//! changes it through [`reduce`]; readers get cloned snapshots.

use std::collections::{HashMap, HashSet};

use ferry_api::{EntityGroup, Tool};
use serde::Serialize;

use crate::linker::LinkPair;
use crate::selection::{self, EntityFilter};
use crate::EntityRecord;

const GROUP_COUNT: usize = 8;

/// Records of one entity group, keyed by id, in fetch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStore {
    by_id: HashMap<String, EntityRecord>,
    id_values: Vec<String>,
}

impl EntityStore {
    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.by_id.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut EntityRecord> {
        self.by_id.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.id_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_values.is_empty()
    }

    /// Ids in fetch order.
    pub fn ids(&self) -> &[String] {
        &self.id_values
    }

    /// Records in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.id_values.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Records of one workspace, in fetch order.
    pub fn in_workspace<'a>(&'a self, workspace_id: &'a str) -> impl Iterator<Item = &'a EntityRecord> {
        self.iter().filter(move |r| r.workspace_id == workspace_id)
    }

    /// Insert or replace. A replaced record keeps its position.
    pub fn insert(&mut self, record: EntityRecord) {
        if !self.by_id.contains_key(&record.id) {
            self.id_values.push(record.id.clone());
        }
        self.by_id.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<EntityRecord> {
        let removed = self.by_id.remove(id)?;
        self.id_values.retain(|existing| existing != id);
        Some(removed)
    }

    /// Drop every record matching `predicate`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&EntityRecord) -> bool) -> Vec<EntityRecord> {
        let doomed: Vec<String> = self
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.id.clone())
            .collect();
        doomed.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut EntityRecord> {
        self.by_id.values_mut()
    }
}

/// Every group's store for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStore {
    groups: [EntityStore; GROUP_COUNT],
}

impl ToolStore {
    pub fn group(&self, group: EntityGroup) -> &EntityStore {
        &self.groups[group as usize]
    }

    pub(crate) fn group_mut(&mut self, group: EntityGroup) -> &mut EntityStore {
        &mut self.groups[group as usize]
    }

    pub fn get(&self, group: EntityGroup, id: &str) -> Option<&EntityRecord> {
        self.group(group).get(id)
    }

    /// Id of the counterpart of `id`, if linked.
    pub fn linked_id(&self, group: EntityGroup, id: &str) -> Option<&str> {
        self.get(group, id)?.linked_id.as_deref()
    }
}

/// Both tools' stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreState {
    pub source: ToolStore,
    pub target: ToolStore,
}

impl StoreState {
    pub fn tool(&self, tool: Tool) -> &ToolStore {
        match tool {
            Tool::Source => &self.source,
            Tool::Target => &self.target,
        }
    }

    pub(crate) fn tool_mut(&mut self, tool: Tool) -> &mut ToolStore {
        match tool {
            Tool::Source => &mut self.source,
            Tool::Target => &mut self.target,
        }
    }
}

/// The only ways a store changes.
#[derive(Debug, Clone)]
pub enum StoreCommand {
    /// Replace a group's records for the given workspaces with fresh ones.
    ReplaceGroup {
        tool: Tool,
        group: EntityGroup,
        workspace_ids: Vec<String>,
        records: Vec<EntityRecord>,
    },
    /// Add or replace individual records, e.g. just-created entities.
    Upsert {
        tool: Tool,
        group: EntityGroup,
        records: Vec<EntityRecord>,
    },
    /// Empty every group except workspaces.
    ResetTool { tool: Tool },
    /// Flip one entity's inclusion flag.
    ToggleIncluded {
        tool: Tool,
        group: EntityGroup,
        id: String,
    },
    /// Set the flag on one entity.
    SetIncluded {
        tool: Tool,
        group: EntityGroup,
        id: String,
        included: bool,
    },
    /// Set the flag on every entity visible through a filter, and only those.
    SetIncludedForView { filter: EntityFilter, included: bool },
    /// Record source ↔ target correspondences.
    Link { group: EntityGroup, pairs: Vec<LinkPair> },
    /// Forget deleted entities.
    Remove {
        tool: Tool,
        group: EntityGroup,
        ids: Vec<String>,
    },
}

/// Apply one command and return the new state.
///
/// Commands naming unknown ids leave the state unchanged. Entry counts are
/// recomputed whenever records are added or removed.
pub fn reduce(mut state: StoreState, command: StoreCommand) -> StoreState {
    let mut recount = None;

    match command {
        StoreCommand::ReplaceGroup {
            tool,
            group,
            workspace_ids,
            records,
        } => {
            let scope: HashSet<&str> = workspace_ids.iter().map(String::as_str).collect();
            let store = state.tool_mut(tool).group_mut(group);
            store.remove_where(|r| scope.contains(r.workspace_id.as_str()));
            for mut record in records.into_iter().filter(|r| r.member_of() == group) {
                // Shared with a workspace outside the scope: that one keeps it.
                if let Some(existing) = store.get(&record.id) {
                    record.workspace_id = existing.workspace_id.clone();
                    record.linked_id = existing.linked_id.clone();
                    record.is_included = existing.is_included;
                }
                store.insert(record);
            }
            recount = Some(tool);
        }
        StoreCommand::Upsert {
            tool,
            group,
            records,
        } => {
            let store = state.tool_mut(tool).group_mut(group);
            for record in records.into_iter().filter(|r| r.member_of() == group) {
                store.insert(record);
            }
            recount = Some(tool);
        }
        StoreCommand::ResetTool { tool } => {
            let store = state.tool_mut(tool);
            for group in EntityGroup::TRANSFER_ORDER {
                *store.group_mut(group) = EntityStore::default();
            }
            recount = Some(tool);
        }
        StoreCommand::ToggleIncluded { tool, group, id } => {
            if let Some(record) = state.tool_mut(tool).group_mut(group).get_mut(&id) {
                record.is_included = !record.is_included;
            }
        }
        StoreCommand::SetIncluded {
            tool,
            group,
            id,
            included,
        } => {
            if let Some(record) = state.tool_mut(tool).group_mut(group).get_mut(&id) {
                record.is_included = included;
            }
        }
        StoreCommand::SetIncludedForView { filter, included } => {
            let visible: Vec<String> = selection::entities_for_view(&state, &filter)
                .into_iter()
                .map(|r| r.id.clone())
                .collect();
            let store = state.tool_mut(filter.tool).group_mut(filter.group);
            for id in visible {
                if let Some(record) = store.get_mut(&id) {
                    record.is_included = included;
                }
            }
        }
        StoreCommand::Link { group, pairs } => {
            let StoreState { source, target } = &mut state;
            crate::linker::apply_links(source.group_mut(group), target.group_mut(group), &pairs);
        }
        StoreCommand::Remove { tool, group, ids } => {
            let (store, other) = match tool {
                Tool::Source => (&mut state.source, &mut state.target),
                Tool::Target => (&mut state.target, &mut state.source),
            };
            for id in &ids {
                let Some(removed) = store.group_mut(group).remove(id) else {
                    continue;
                };
                if let Some(linked) = removed.linked_id.as_deref() {
                    if let Some(counterpart) = other.group_mut(group).get_mut(linked) {
                        if counterpart.linked_id.as_deref() == Some(id.as_str()) {
                            counterpart.linked_id = None;
                        }
                    }
                }
            }
            recount = Some(tool);
        }
    }

    if let Some(tool) = recount {
        selection::recompute_entry_counts(state.tool_mut(tool));
    }
    state
}
