//! Rewrite a source record's foreign keys into target ids.

use ferry_api::EntityGroup;

use crate::store::ToolStore;
use crate::{EntityFields, EntityRecord, SyncError};

/// Copy of `record` placed in `target_workspace` with every reference
/// resolved through the source store's links.
///
/// Optional references that are not linked are dropped. A task whose
/// project is not linked cannot be created and fails with
/// [`SyncError::UnresolvedReference`].
pub fn retarget(
    record: &EntityRecord,
    source: &ToolStore,
    target_workspace: &str,
) -> Result<EntityRecord, SyncError> {
    let resolve = |group: EntityGroup, id: &str| source.linked_id(group, id).map(String::from);
    let resolve_all = |group: EntityGroup, ids: &[String]| -> Vec<String> {
        ids.iter().filter_map(|id| resolve(group, id)).collect()
    };

    let fields = match &record.fields {
        EntityFields::Projects {
            name,
            client_id,
            is_billable,
            is_public,
            is_active,
            color,
            user_ids,
        } => EntityFields::Projects {
            name: name.clone(),
            client_id: client_id
                .as_deref()
                .and_then(|id| resolve(EntityGroup::Clients, id)),
            is_billable: *is_billable,
            is_public: *is_public,
            is_active: *is_active,
            color: color.clone(),
            user_ids: resolve_all(EntityGroup::Users, user_ids),
        },
        EntityFields::Tasks {
            name,
            project_id,
            assignee_ids,
            is_active,
            estimate_seconds,
        } => {
            let project_id = resolve(EntityGroup::Projects, project_id).ok_or_else(|| {
                SyncError::UnresolvedReference {
                    group: EntityGroup::Tasks,
                    id: record.id.clone(),
                    referenced: EntityGroup::Projects,
                    reference_id: project_id.clone(),
                }
            })?;
            EntityFields::Tasks {
                name: name.clone(),
                project_id,
                assignee_ids: resolve_all(EntityGroup::Users, assignee_ids),
                is_active: *is_active,
                estimate_seconds: *estimate_seconds,
            }
        }
        EntityFields::UserGroups { name, user_ids } => EntityFields::UserGroups {
            name: name.clone(),
            user_ids: resolve_all(EntityGroup::Users, user_ids),
        },
        EntityFields::TimeEntries {
            description,
            start,
            end,
            year,
            is_billable,
            project_id,
            task_id,
            user_id,
            tag_ids,
        } => EntityFields::TimeEntries {
            description: description.clone(),
            start: *start,
            end: *end,
            year: *year,
            is_billable: *is_billable,
            project_id: project_id
                .as_deref()
                .and_then(|id| resolve(EntityGroup::Projects, id)),
            task_id: task_id
                .as_deref()
                .and_then(|id| resolve(EntityGroup::Tasks, id)),
            user_id: user_id
                .as_deref()
                .and_then(|id| resolve(EntityGroup::Users, id)),
            tag_ids: tag_ids
                .iter()
                .filter_map(|id| resolve(EntityGroup::Tags, id))
                .collect(),
        },
        other => other.clone(),
    };

    Ok(EntityRecord {
        id: record.id.clone(),
        workspace_id: target_workspace.to_string(),
        linked_id: None,
        is_included: record.is_included,
        entry_count: record.entry_count,
        fields,
    })
}
