//! Filtered views, derived entry counts and record counts.

use std::collections::HashMap;

use ferry_api::{EntityGroup, Tool};
use serde::Serialize;

use crate::store::{StoreState, ToolStore};
use crate::{EntityFields, EntityRecord};

/// What a table of entities is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    pub tool: Tool,
    pub group: EntityGroup,
    pub workspace_id: Option<String>,
    pub included: Option<bool>,
    /// Time entries only.
    pub year: Option<i32>,
}

impl EntityFilter {
    pub fn new(tool: Tool, group: EntityGroup) -> Self {
        Self {
            tool,
            group,
            workspace_id: None,
            included: None,
            year: None,
        }
    }

    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn included(mut self, included: bool) -> Self {
        self.included = Some(included);
        self
    }

    pub fn in_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        if record.member_of() != self.group {
            return false;
        }
        if let Some(workspace_id) = &self.workspace_id {
            if &record.workspace_id != workspace_id {
                return false;
            }
        }
        if let Some(included) = self.included {
            if record.is_included != included {
                return false;
            }
        }
        match (self.year, record.year()) {
            (Some(wanted), Some(year)) => wanted == year,
            _ => true,
        }
    }
}

/// Records visible through `filter`, sorted by natural key then id.
pub fn entities_for_view<'a>(state: &'a StoreState, filter: &EntityFilter) -> Vec<&'a EntityRecord> {
    let mut records: Vec<&EntityRecord> = state
        .tool(filter.tool)
        .group(filter.group)
        .iter()
        .filter(|r| filter.matches(r))
        .collect();
    records.sort_by(|a, b| {
        a.natural_key()
            .cmp(&b.natural_key())
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

/// Per group, per workspace totals.
///
/// "Included" counts only records that still need transferring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    pub included_record_count: usize,
    pub total_record_count: usize,
    pub included_entry_count: u64,
    pub total_entry_count: u64,
}

pub fn record_counts(store: &ToolStore, group: EntityGroup, workspace_id: &str) -> RecordCounts {
    let mut counts = RecordCounts::default();
    for record in store.group(group).in_workspace(workspace_id) {
        counts.total_record_count += 1;
        counts.total_entry_count += record.entry_count;
        if record.needs_transfer() {
            counts.included_record_count += 1;
            counts.included_entry_count += record.entry_count;
        }
    }
    counts
}

/// Recount every entity's time entries from scratch.
///
/// An entry counts toward its project and that project's client, its task,
/// each of its tags, its user and every user group containing that user,
/// and its workspace.
pub(crate) fn recompute_entry_counts(store: &mut ToolStore) {
    let mut counts: HashMap<(EntityGroup, String), u64> = HashMap::new();

    let project_clients: HashMap<&str, &str> = store
        .group(EntityGroup::Projects)
        .iter()
        .filter_map(|r| match &r.fields {
            EntityFields::Projects {
                client_id: Some(client_id),
                ..
            } => Some((r.id.as_str(), client_id.as_str())),
            _ => None,
        })
        .collect();

    let mut groups_of_user: HashMap<&str, Vec<&str>> = HashMap::new();
    for group in store.group(EntityGroup::UserGroups).iter() {
        if let EntityFields::UserGroups { user_ids, .. } = &group.fields {
            for user_id in user_ids {
                groups_of_user.entry(user_id).or_default().push(&group.id);
            }
        }
    }

    let mut bump = |group: EntityGroup, id: &str| {
        *counts.entry((group, id.to_string())).or_default() += 1;
    };

    for entry in store.group(EntityGroup::TimeEntries).iter() {
        let EntityFields::TimeEntries {
            project_id,
            task_id,
            user_id,
            tag_ids,
            ..
        } = &entry.fields
        else {
            continue;
        };

        bump(EntityGroup::Workspaces, &entry.workspace_id);
        if let Some(project_id) = project_id {
            bump(EntityGroup::Projects, project_id);
            if let Some(client_id) = project_clients.get(project_id.as_str()) {
                bump(EntityGroup::Clients, client_id);
            }
        }
        if let Some(task_id) = task_id {
            bump(EntityGroup::Tasks, task_id);
        }
        for tag_id in tag_ids {
            bump(EntityGroup::Tags, tag_id);
        }
        if let Some(user_id) = user_id {
            bump(EntityGroup::Users, user_id);
            for group_id in groups_of_user.get(user_id.as_str()).into_iter().flatten() {
                bump(EntityGroup::UserGroups, group_id);
            }
        }
    }

    for group in [
        EntityGroup::Workspaces,
        EntityGroup::Clients,
        EntityGroup::Projects,
        EntityGroup::Tags,
        EntityGroup::Tasks,
        EntityGroup::UserGroups,
        EntityGroup::Users,
    ] {
        for record in store.group_mut(group).records_mut() {
            record.entry_count = counts
                .get(&(group, record.id.clone()))
                .copied()
                .unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::{StoreCommand, reduce};

    fn entry(id: &str, project: Option<&str>, user: Option<&str>, tags: &[&str], year: i32) -> EntityRecord {
        let start = Utc.with_ymd_and_hms(year, 6, 1, 9, 0, 0).unwrap();
        EntityRecord::new(
            id,
            "w",
            EntityFields::TimeEntries {
                description: String::new(),
                start,
                end: start,
                year,
                is_billable: false,
                project_id: project.map(String::from),
                task_id: None,
                user_id: user.map(String::from),
                tag_ids: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            },
        )
    }

    fn upsert(state: StoreState, records: Vec<EntityRecord>) -> StoreState {
        let group = records[0].member_of();
        reduce(
            state,
            StoreCommand::Upsert {
                tool: Tool::Source,
                group,
                records,
            },
        )
    }

    fn seeded() -> StoreState {
        let mut state = StoreState::default();
        state = upsert(
            state,
            vec![EntityRecord::new(
                "w",
                "w",
                EntityFields::Workspaces {
                    name: "Acme".into(),
                    user_ids: vec![],
                },
            )],
        );
        state = upsert(state, vec![EntityRecord::new("c1", "w", EntityFields::Clients { name: "Big".into() })]);
        state = upsert(
            state,
            vec![EntityRecord::new(
                "p1",
                "w",
                EntityFields::Projects {
                    name: "Apollo".into(),
                    client_id: Some("c1".into()),
                    is_billable: false,
                    is_public: true,
                    is_active: true,
                    color: None,
                    user_ids: vec![],
                },
            )],
        );
        state = upsert(
            state,
            vec![
                EntityRecord::new("t1", "w", EntityFields::Tags { name: "b".into() }),
                EntityRecord::new("t2", "w", EntityFields::Tags { name: "a".into() }),
            ],
        );
        state = upsert(
            state,
            vec![EntityRecord::new(
                "g1",
                "w",
                EntityFields::UserGroups {
                    name: "Devs".into(),
                    user_ids: vec!["u1".into()],
                },
            )],
        );
        state = upsert(
            state,
            vec![EntityRecord::new(
                "u1",
                "w",
                EntityFields::Users {
                    name: "Ada".into(),
                    email: None,
                    is_active: true,
                },
            )],
        );
        upsert(
            state,
            vec![
                entry("e1", Some("p1"), Some("u1"), &["t1"], 2020),
                entry("e2", Some("p1"), None, &["t1", "t2"], 2021),
                entry("e3", None, Some("u1"), &[], 2021),
            ],
        )
    }

    #[test]
    fn test_entry_counts() {
        let state = seeded();
        let count = |group, id| state.source.get(group, id).unwrap().entry_count;

        assert_eq!(count(EntityGroup::Workspaces, "w"), 3);
        assert_eq!(count(EntityGroup::Projects, "p1"), 2);
        assert_eq!(count(EntityGroup::Clients, "c1"), 2);
        assert_eq!(count(EntityGroup::Tags, "t1"), 2);
        assert_eq!(count(EntityGroup::Tags, "t2"), 1);
        assert_eq!(count(EntityGroup::Users, "u1"), 2);
        assert_eq!(count(EntityGroup::UserGroups, "g1"), 2);
    }

    #[test]
    fn test_entry_counts_follow_removal() {
        let state = reduce(
            seeded(),
            StoreCommand::Remove {
                tool: Tool::Source,
                group: EntityGroup::TimeEntries,
                ids: vec!["e1".into()],
            },
        );
        assert_eq!(state.source.get(EntityGroup::Projects, "p1").unwrap().entry_count, 1);
        assert_eq!(state.source.get(EntityGroup::UserGroups, "g1").unwrap().entry_count, 1);
    }

    #[test]
    fn test_view_sorted_by_name() {
        let state = seeded();
        let view = entities_for_view(&state, &EntityFilter::new(Tool::Source, EntityGroup::Tags));
        let ids: Vec<_> = view.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn test_view_filters_by_year() {
        let state = seeded();
        let filter = EntityFilter::new(Tool::Source, EntityGroup::TimeEntries).in_year(2021);
        let ids: Vec<_> = entities_for_view(&state, &filter).iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["e2", "e3"]);
    }

    #[test]
    fn test_bulk_toggle_only_touches_visible_set() {
        let state = seeded();
        let filter = EntityFilter::new(Tool::Source, EntityGroup::TimeEntries).in_year(2021);
        let state = reduce(
            state,
            StoreCommand::SetIncludedForView {
                filter,
                included: false,
            },
        );

        let included = |id| state.source.get(EntityGroup::TimeEntries, id).unwrap().is_included;
        assert!(included("e1"));
        assert!(!included("e2"));
        assert!(!included("e3"));
    }

    #[test]
    fn test_record_counts_only_count_untransferred() {
        let mut state = seeded();
        state = reduce(
            state,
            StoreCommand::Upsert {
                tool: Tool::Target,
                group: EntityGroup::Tags,
                records: vec![EntityRecord::new("T", "tw", EntityFields::Tags { name: "b".into() })],
            },
        );
        state = reduce(
            state,
            StoreCommand::Link {
                group: EntityGroup::Tags,
                pairs: vec![crate::LinkPair::new("t1", "T")],
            },
        );

        let counts = record_counts(&state.source, EntityGroup::Tags, "w");
        assert_eq!(
            counts,
            RecordCounts {
                included_record_count: 1,
                total_record_count: 2,
                included_entry_count: 1,
                total_entry_count: 3,
            }
        );
    }
}
