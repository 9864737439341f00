//! Source tool payloads: snake_case fields, numeric ids, `wid` workspace keys.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use ferry_api::EntityGroup;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{WireId, ids, opt_id, parse, timestamp, workspace_of};
use crate::{EntityFields, EntityRecord};

#[derive(Deserialize)]
struct Workspace {
    id: WireId,
    name: String,
    #[serde(default)]
    user_ids: Option<Vec<WireId>>,
}

#[derive(Deserialize)]
struct Named {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    name: String,
}

#[derive(Deserialize)]
struct Project {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    #[serde(default)]
    cid: Option<WireId>,
    name: String,
    #[serde(default)]
    billable: Option<bool>,
    #[serde(default)]
    is_private: Option<bool>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    user_ids: Option<Vec<WireId>>,
}

#[derive(Deserialize)]
struct Task {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    pid: WireId,
    name: String,
    #[serde(default)]
    uid: Option<WireId>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    estimated_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct Group {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    name: String,
    #[serde(default)]
    user_ids: Option<Vec<WireId>>,
}

#[derive(Deserialize)]
struct User {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    #[serde(default)]
    fullname: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    active: Option<bool>,
}

#[derive(Deserialize)]
struct TimeEntry {
    id: WireId,
    #[serde(default)]
    wid: Option<WireId>,
    #[serde(default)]
    pid: Option<WireId>,
    #[serde(default)]
    tid: Option<WireId>,
    #[serde(default)]
    uid: Option<WireId>,
    #[serde(default)]
    description: Option<String>,
    start: DateTime<Utc>,
    #[serde(default)]
    stop: Option<DateTime<Utc>>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    billable: Option<bool>,
    #[serde(default)]
    tag_ids: Option<Vec<WireId>>,
}

/// Project members as returned by the project users endpoint.
#[derive(Deserialize)]
pub(crate) struct ProjectMember {
    uid: WireId,
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
                    user_ids: ids(w.user_ids),
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
            EntityRecord::new(n.id.into_string(), workspace_of(n.wid, hint)?, fields)
        }
        EntityGroup::Projects => {
            let p: Project = parse(payload)?;
            EntityRecord::new(
                p.id.into_string(),
                workspace_of(p.wid, hint)?,
                EntityFields::Projects {
                    name: p.name,
                    client_id: opt_id(p.cid),
                    is_billable: p.billable.unwrap_or(false),
                    is_public: !p.is_private.unwrap_or(true),
                    is_active: p.active.unwrap_or(true),
                    color: p.color,
                    user_ids: ids(p.user_ids),
                },
            )
        }
        EntityGroup::Tasks => {
            let t: Task = parse(payload)?;
            EntityRecord::new(
                t.id.into_string(),
                workspace_of(t.wid, hint)?,
                EntityFields::Tasks {
                    name: t.name,
                    project_id: t.pid.into_string(),
                    assignee_ids: opt_id(t.uid).into_iter().collect(),
                    is_active: t.active.unwrap_or(true),
                    estimate_seconds: t.estimated_seconds.filter(|s| *s > 0),
                },
            )
        }
        EntityGroup::UserGroups => {
            let g: Group = parse(payload)?;
            EntityRecord::new(
                g.id.into_string(),
                workspace_of(g.wid, hint)?,
                EntityFields::UserGroups {
                    name: g.name,
                    user_ids: ids(g.user_ids),
                },
            )
        }
        EntityGroup::Users => {
            let u: User = parse(payload)?;
            let name = u
                .fullname
                .or(u.name)
                .ok_or_else(|| "missing field `fullname`".to_string())?;
            EntityRecord::new(
                u.id.into_string(),
                workspace_of(u.wid, hint)?,
                EntityFields::Users {
                    name,
                    email: u.email,
                    is_active: u.active.unwrap_or(true),
                },
            )
        }
        EntityGroup::TimeEntries => {
            let e: TimeEntry = parse(payload)?;
            let end = match (e.stop, e.duration) {
                (Some(stop), _) => stop,
                (None, Some(secs)) if secs > 0 => TimeDelta::try_seconds(secs)
                    .and_then(|d| e.start.checked_add_signed(d))
                    .unwrap_or(e.start),
                _ => e.start,
            };
            EntityRecord::new(
                e.id.into_string(),
                workspace_of(e.wid, hint)?,
                EntityFields::TimeEntries {
                    description: e.description.unwrap_or_default(),
                    start: e.start,
                    end,
                    year: e.start.year(),
                    is_billable: e.billable.unwrap_or(false),
                    project_id: opt_id(e.pid),
                    task_id: opt_id(e.tid),
                    user_id: opt_id(e.uid),
                    tag_ids: ids(e.tag_ids).into_iter().collect::<BTreeSet<_>>(),
                },
            )
        }
    };
    Ok(record)
}

/// Member user ids from a project users response.
pub(crate) fn project_member_ids(members: &[Value]) -> Vec<String> {
    members
        .iter()
        .filter_map(|m| parse::<ProjectMember>(m).ok())
        .map(|m| m.uid.into_string())
        .collect()
}

/// Numeric ids go back out as numbers.
fn wire_id(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}

fn wire_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(ids.into_iter().map(|id| wire_id(id)).collect())
}

fn insert_opt(body: &mut Map<String, Value>, key: &str, id: Option<&String>) {
    if let Some(id) = id {
        body.insert(key.to_string(), wire_id(id));
    }
}

pub(super) fn denormalize(record: &EntityRecord) -> Value {
    let wid = wire_id(&record.workspace_id);
    match &record.fields {
        EntityFields::Workspaces { name, .. } => json!({ "name": name }),
        EntityFields::Clients { name } | EntityFields::Tags { name } => {
            json!({ "name": name, "wid": wid })
        }
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
                "wid": wid,
                "billable": is_billable,
                "is_private": !is_public,
                "active": is_active,
            });
            if let Value::Object(map) = &mut body {
                insert_opt(map, "cid", client_id.as_ref());
                if let Some(color) = color {
                    map.insert("color".into(), Value::from(color.as_str()));
                }
                if !user_ids.is_empty() {
                    map.insert("user_ids".into(), wire_ids(user_ids));
                }
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
                "wid": wid,
                "pid": wire_id(project_id),
                "active": is_active,
            });
            if let Value::Object(map) = &mut body {
                insert_opt(map, "uid", assignee_ids.first());
                if let Some(secs) = estimate_seconds {
                    map.insert("estimated_seconds".into(), Value::from(*secs));
                }
            }
            body
        }
        EntityFields::UserGroups { name, .. } => json!({ "name": name, "wid": wid }),
        EntityFields::Users { name, email, .. } => {
            json!({ "fullname": name, "email": email, "wid": wid })
        }
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
                "wid": wid,
                "start": timestamp(start, false),
                "stop": timestamp(end, false),
                "duration": (*end - *start).num_seconds().max(0),
                "billable": is_billable,
                "tag_ids": wire_ids(tag_ids),
                "created_with": "ferry",
            });
            if let Value::Object(map) = &mut body {
                insert_opt(map, "pid", project_id.as_ref());
                insert_opt(map, "tid", task_id.as_ref());
                insert_opt(map, "uid", user_id.as_ref());
            }
            body
        }
    }
}
