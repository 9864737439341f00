//! Target tool payloads: camelCase fields, string ids, nested memberships
//! and time intervals.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Utc};
use ferry_api::EntityGroup;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{
    WireId, ids, iso_duration_to_seconds, opt_id, parse, seconds_to_iso_duration, timestamp,
    workspace_of,
};
use crate::{EntityFields, EntityRecord};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Membership {
    user_id: WireId,
}

fn member_ids(memberships: Option<Vec<Membership>>) -> Vec<String> {
    memberships
        .unwrap_or_default()
        .into_iter()
        .map(|m| m.user_id.into_string())
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Workspace {
    id: WireId,
    name: String,
    #[serde(default)]
    memberships: Option<Vec<Membership>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Named {
    id: WireId,
    #[serde(default)]
    workspace_id: Option<WireId>,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    id: WireId,
    #[serde(default)]
    workspace_id: Option<WireId>,
    name: String,
    #[serde(default)]
    client_id: Option<WireId>,
    #[serde(default)]
    billable: Option<bool>,
    #[serde(default)]
    public: Option<bool>,
    #[serde(default)]
    archived: Option<bool>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    memberships: Option<Vec<Membership>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    id: WireId,
    #[serde(default)]
    workspace_id: Option<WireId>,
    project_id: WireId,
    name: String,
    #[serde(default)]
    assignee_ids: Option<Vec<WireId>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    estimate: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserGroup {
    id: WireId,
    #[serde(default)]
    workspace_id: Option<WireId>,
    name: String,
    #[serde(default)]
    user_ids: Option<Vec<WireId>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: WireId,
    #[serde(default)]
    active_workspace: Option<WireId>,
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct TimeInterval {
    start: DateTime<Utc>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeEntry {
    id: WireId,
    #[serde(default)]
    workspace_id: Option<WireId>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    project_id: Option<WireId>,
    #[serde(default)]
    task_id: Option<WireId>,
    #[serde(default)]
    user_id: Option<WireId>,
    #[serde(default)]
    billable: Option<bool>,
    #[serde(default)]
    tag_ids: Option<Vec<WireId>>,
    time_interval: TimeInterval,
}

pub(super) fn normalize(
    group: EntityGroup,
    payload: &Value,
    hint: Option<&str>,
) -> Result<EntityRecord, String> {
    let record = match group {
        EntityGroup::Workspaces => {
            let w: Workspace = parse(payload)?;
            let id = w.id.into_string();
            EntityRecord::new(
                id.clone(),
                id,
                EntityFields::Workspaces {
                    name: w.name,
                    user_ids: member_ids(w.memberships),
                },
            )
        }
        EntityGroup::Clients | EntityGroup::Tags => {
            let n: Named = parse(payload)?;
            let fields = if group == EntityGroup::Clients {
                EntityFields::Clients { name: n.name }
            } else {
                EntityFields::Tags { name: n.name }
            };
            EntityRecord::new(n.id.into_string(), workspace_of(n.workspace_id, hint)?, fields)
        }
        EntityGroup::Projects => {
            let p: Project = parse(payload)?;
            EntityRecord::new(
                p.id.into_string(),
                workspace_of(p.workspace_id, hint)?,
                EntityFields::Projects {
                    name: p.name,
                    client_id: opt_id(p.client_id),
                    is_billable: p.billable.unwrap_or(false),
                    is_public: p.public.unwrap_or(false),
                    is_active: !p.archived.unwrap_or(false),
                    color: p.color,
                    user_ids: member_ids(p.memberships),
                },
            )
        }
        EntityGroup::Tasks => {
            let t: Task = parse(payload)?;
            EntityRecord::new(
                t.id.into_string(),
                workspace_of(t.workspace_id, hint)?,
                EntityFields::Tasks {
                    name: t.name,
                    project_id: t.project_id.into_string(),
                    assignee_ids: ids(t.assignee_ids),
                    is_active: t.status.as_deref() != Some("DONE"),
                    estimate_seconds: t
                        .estimate
                        .as_deref()
                        .and_then(iso_duration_to_seconds)
                        .filter(|s| *s > 0),
                },
            )
        }
        EntityGroup::UserGroups => {
            let g: UserGroup = parse(payload)?;
            EntityRecord::new(
                g.id.into_string(),
                workspace_of(g.workspace_id, hint)?,
                EntityFields::UserGroups {
                    name: g.name,
                    user_ids: ids(g.user_ids),
                },
            )
        }
        EntityGroup::Users => {
            let u: User = parse(payload)?;
            // Users belong to many workspaces; the one fetched under wins.
            let workspace_id = match hint {
                Some(hint) => hint.to_string(),
                None => workspace_of(u.active_workspace, None)?,
            };
            EntityRecord::new(
                u.id.into_string(),
                workspace_id,
                EntityFields::Users {
                    name: u.name,
                    email: u.email,
                    is_active: u.status.as_deref().is_none_or(|s| s == "ACTIVE"),
                },
            )
        }
        EntityGroup::TimeEntries => {
            let e: TimeEntry = parse(payload)?;
            let start = e.time_interval.start;
            EntityRecord::new(
                e.id.into_string(),
                workspace_of(e.workspace_id, hint)?,
                EntityFields::TimeEntries {
                    description: e.description.unwrap_or_default(),
                    start,
                    end: e.time_interval.end.unwrap_or(start),
                    year: start.year(),
                    is_billable: e.billable.unwrap_or(false),
                    project_id: opt_id(e.project_id),
                    task_id: opt_id(e.task_id),
                    user_id: opt_id(e.user_id),
                    tag_ids: ids(e.tag_ids).into_iter().collect::<BTreeSet<_>>(),
                },
            )
        }
    };
    Ok(record)
}

fn insert_opt(body: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        body.insert(key.to_string(), Value::from(value.as_str()));
    }
}

fn memberships(user_ids: &[String]) -> Value {
    Value::Array(
        user_ids
            .iter()
            .map(|id| json!({ "userId": id }))
            .collect(),
    )
}

pub(super) fn denormalize(record: &EntityRecord) -> Value {
    match &record.fields {
        EntityFields::Workspaces { name, .. } => json!({ "name": name }),
        EntityFields::Clients { name } | EntityFields::Tags { name } => json!({ "name": name }),
        EntityFields::Projects {
            name,
            client_id,
            is_billable,
            is_public,
            is_active,
            color,
            user_ids,
        } => {
            let mut body = json!({
                "name": name,
                "billable": is_billable,
                "public": is_public,
                "archived": !is_active,
                "memberships": memberships(user_ids),
            });
            if let Value::Object(map) = &mut body {
                insert_opt(map, "clientId", client_id.as_ref());
                insert_opt(map, "color", color.as_ref());
            }
            body
        }
        EntityFields::Tasks {
            name,
            project_id,
            assignee_ids,
            is_active,
            estimate_seconds,
        } => {
            let mut body = json!({
                "name": name,
                "projectId": project_id,
                "assigneeIds": assignee_ids,
                "status": if *is_active { "ACTIVE" } else { "DONE" },
            });
            if let (Value::Object(map), Some(secs)) = (&mut body, estimate_seconds) {
                map.insert("estimate".into(), Value::from(seconds_to_iso_duration(*secs)));
            }
            body
        }
        EntityFields::UserGroups { name, user_ids } => {
            json!({ "name": name, "userIds": user_ids })
        }
        EntityFields::Users { name, email, .. } => json!({ "name": name, "email": email }),
        EntityFields::TimeEntries {
            description,
            start,
            end,
            is_billable,
            project_id,
            task_id,
            user_id,
            tag_ids,
            ..
        } => {
            let mut body = json!({
                "description": description,
                "billable": is_billable,
                "tagIds": tag_ids,
                "timeInterval": {
                    "start": timestamp(start, true),
                    "end": timestamp(end, true),
                },
            });
            if let Value::Object(map) = &mut body {
                insert_opt(map, "projectId", project_id.as_ref());
                insert_opt(map, "taskId", task_id.as_ref());
                insert_opt(map, "userId", user_id.as_ref());
            }
            body
        }
    }
}
