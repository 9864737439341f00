//! Canonical entity model shared by both tools.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ferry_api::EntityGroup;
use serde::{Deserialize, Serialize};

/// One normalized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Unique within (tool, entity group).
    pub id: String,
    /// Owning workspace; a workspace's own id for workspaces.
    pub workspace_id: String,
    /// Id of the counterpart in the other tool.
    pub linked_id: Option<String>,
    pub is_included: bool,
    /// Time entries attributable to this entity. Derived, never fetched.
    pub entry_count: u64,
    #[serde(flatten)]
    pub fields: EntityFields,
}

/// Group-specific fields, tagged by the group they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "memberOf", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EntityFields {
    Workspaces {
        name: String,
        user_ids: Vec<String>,
    },
    Clients {
        name: String,
    },
    Projects {
        name: String,
        client_id: Option<String>,
        is_billable: bool,
        is_public: bool,
        is_active: bool,
        color: Option<String>,
        user_ids: Vec<String>,
    },
    Tags {
        name: String,
    },
    Tasks {
        name: String,
        project_id: String,
        assignee_ids: Vec<String>,
        is_active: bool,
        estimate_seconds: Option<u64>,
    },
    UserGroups {
        name: String,
        user_ids: Vec<String>,
    },
    Users {
        name: String,
        email: Option<String>,
        is_active: bool,
    },
    TimeEntries {
        description: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        year: i32,
        is_billable: bool,
        project_id: Option<String>,
        task_id: Option<String>,
        user_id: Option<String>,
        tag_ids: BTreeSet<String>,
    },
}

impl EntityFields {
    pub fn member_of(&self) -> EntityGroup {
        match self {
            EntityFields::Workspaces { .. } => EntityGroup::Workspaces,
            EntityFields::Clients { .. } => EntityGroup::Clients,
            EntityFields::Projects { .. } => EntityGroup::Projects,
            EntityFields::Tags { .. } => EntityGroup::Tags,
            EntityFields::Tasks { .. } => EntityGroup::Tasks,
            EntityFields::UserGroups { .. } => EntityGroup::UserGroups,
            EntityFields::Users { .. } => EntityGroup::Users,
            EntityFields::TimeEntries { .. } => EntityGroup::TimeEntries,
        }
    }

    /// The field matched across tools; time entries have none.
    pub fn natural_key(&self) -> Option<&str> {
        match self {
            EntityFields::Workspaces { name, .. }
            | EntityFields::Clients { name }
            | EntityFields::Projects { name, .. }
            | EntityFields::Tags { name }
            | EntityFields::Tasks { name, .. }
            | EntityFields::UserGroups { name, .. }
            | EntityFields::Users { name, .. } => Some(name),
            EntityFields::TimeEntries { .. } => None,
        }
    }
}

impl EntityRecord {
    /// A freshly normalized record: unlinked, with no derived counts.
    ///
    /// Workspaces start excluded until the user selects them.
    pub fn new(id: impl Into<String>, workspace_id: impl Into<String>, fields: EntityFields) -> Self {
        let is_included = !matches!(fields, EntityFields::Workspaces { .. });
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            linked_id: None,
            is_included,
            entry_count: 0,
            fields,
        }
    }

    pub fn member_of(&self) -> EntityGroup {
        self.fields.member_of()
    }

    pub fn natural_key(&self) -> Option<&str> {
        self.fields.natural_key()
    }

    /// Included and not yet present in the other tool.
    pub fn needs_transfer(&self) -> bool {
        self.is_included && self.linked_id.is_none()
    }

    /// Year of a time entry's start.
    pub fn year(&self) -> Option<i32> {
        match &self.fields {
            EntityFields::TimeEntries { year, .. } => Some(*year),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_record_defaults() {
        let tag = EntityRecord::new("1", "7", EntityFields::Tags { name: "x".into() });
        assert!(tag.is_included);
        assert!(tag.needs_transfer());
        assert_eq!(tag.member_of(), EntityGroup::Tags);
        assert_eq!(tag.natural_key(), Some("x"));

        let workspace = EntityRecord::new(
            "7",
            "7",
            EntityFields::Workspaces {
                name: "Acme".into(),
                user_ids: vec![],
            },
        );
        assert!(!workspace.is_included);
    }

    #[test]
    fn test_time_entry_has_no_natural_key() {
        let start = Utc.with_ymd_and_hms(2021, 3, 1, 9, 0, 0).unwrap();
        let entry = EntityRecord::new(
            "42",
            "7",
            EntityFields::TimeEntries {
                description: "standup".into(),
                start,
                end: start,
                year: 2021,
                is_billable: false,
                project_id: None,
                task_id: None,
                user_id: None,
                tag_ids: BTreeSet::new(),
            },
        );
        assert_eq!(entry.natural_key(), None);
        assert_eq!(entry.year(), Some(2021));
    }

    #[test]
    fn test_serialized_shape_carries_member_of() {
        let client = EntityRecord::new("1", "7", EntityFields::Clients { name: "Big Co".into() });
        let value = serde_json::to_value(&client).unwrap();
        assert_eq!(value["memberOf"], "clients");
        assert_eq!(value["workspaceId"], "7");
        assert_eq!(value["isIncluded"], true);
    }
}
