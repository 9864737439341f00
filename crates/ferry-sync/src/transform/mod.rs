//! Conversion between tool payloads and canonical records.
//!
//! Each tool has its own private wire structs. Missing optional fields fall
//! back to empty or default values; a missing id, name or workspace reference
//! is a [`SchemaViolation`].

mod source;
mod target;

use chrono::{DateTime, SecondsFormat, Utc};
use ferry_api::{EntityGroup, Tool};
use serde::Deserialize;
use serde_json::Value;

use crate::{EntityRecord, SchemaViolation};

/// Normalize one raw payload.
///
/// `workspace_hint` is the workspace the payload was fetched under, used
/// when the payload does not name its own.
pub fn normalize(
    tool: Tool,
    group: EntityGroup,
    payload: &Value,
    workspace_hint: Option<&str>,
) -> Result<EntityRecord, SchemaViolation> {
    match tool {
        Tool::Source => source::normalize(group, payload, workspace_hint),
        Tool::Target => target::normalize(group, payload, workspace_hint),
    }
    .map_err(|reason| SchemaViolation::new(tool, group, reason))
}

/// Build the create request body for a record.
pub fn denormalize(tool: Tool, record: &EntityRecord) -> Value {
    match tool {
        Tool::Source => source::denormalize(record),
        Tool::Target => target::denormalize(record),
    }
}

/// Attach separately fetched project members to a project payload.
///
/// Only the source tool serves members on their own endpoint; target
/// payloads embed them and are left untouched.
pub fn attach_project_members(tool: Tool, project: &mut Value, members: &[Value]) {
    if tool != Tool::Source {
        return;
    }
    let member_ids: Vec<Value> = source::project_member_ids(members)
        .into_iter()
        .map(Value::from)
        .collect();
    if let Value::Object(map) = project {
        map.insert("user_ids".to_string(), Value::Array(member_ids));
    }
}

/// Id of a raw payload, if it has one.
pub fn payload_id(payload: &Value) -> Option<String> {
    WireId::deserialize(payload.get("id")?).ok().map(WireId::into_string)
}

/// Ids arrive as numbers from one tool and strings from the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

fn opt_id(id: Option<WireId>) -> Option<String> {
    id.map(WireId::into_string).filter(|s| !s.is_empty())
}

fn ids(ids: Option<Vec<WireId>>) -> Vec<String> {
    ids.unwrap_or_default()
        .into_iter()
        .map(WireId::into_string)
        .collect()
}

fn parse<'de, T: Deserialize<'de>>(payload: &'de Value) -> Result<T, String> {
    T::deserialize(payload).map_err(|e| e.to_string())
}

fn workspace_of(own: Option<WireId>, hint: Option<&str>) -> Result<String, String> {
    opt_id(own)
        .or_else(|| hint.map(String::from))
        .ok_or_else(|| "missing workspace reference".to_string())
}

fn timestamp(at: &DateTime<Utc>, use_z: bool) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, use_z)
}

/// `5400` → `PT1H30M`.
pub(crate) fn seconds_to_iso_duration(total: u64) -> String {
    if total == 0 {
        return "PT0S".to_string();
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}S", seconds));
    }
    out
}

/// Parse the day/time subset of ISO 8601 durations (`P1DT2H`, `PT45M`).
pub(crate) fn iso_duration_to_seconds(text: &str) -> Option<u64> {
    let rest = text.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let mut total = 0u64;
    let mut number = String::new();
    for (part, is_time) in [(date_part, false), (time_part, true)] {
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let value: u64 = number.parse().ok()?;
            number.clear();
            let unit = match (c, is_time) {
                ('D', false) => 86_400,
                ('W', false) => 604_800,
                ('H', true) => 3_600,
                ('M', true) => 60,
                ('S', true) => 1,
                _ => return None,
            };
            total = value.checked_mul(unit)?.checked_add(total)?;
        }
        if !number.is_empty() {
            return None;
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "PT0S")]
    #[test_case(45 * 60, "PT45M")]
    #[test_case(2 * 3600, "PT2H")]
    #[test_case(5400, "PT1H30M")]
    #[test_case(3661, "PT1H1M1S")]
    fn test_iso_duration(seconds: u64, text: &str) {
        assert_eq!(seconds_to_iso_duration(seconds), text);
        assert_eq!(iso_duration_to_seconds(text), Some(seconds));
    }

    #[test]
    fn test_iso_duration_with_days() {
        assert_eq!(iso_duration_to_seconds("P1DT1H"), Some(90_000));
        assert_eq!(iso_duration_to_seconds("PT"), Some(0));
        assert_eq!(iso_duration_to_seconds("1H"), None);
        assert_eq!(iso_duration_to_seconds("PT5"), None);
        assert_eq!(iso_duration_to_seconds("PT5X"), None);
    }

    #[test]
    fn test_iso_duration_overflow_is_rejected() {
        assert_eq!(iso_duration_to_seconds("P999999999999999D"), None);
        assert_eq!(iso_duration_to_seconds("P99999999999999999999D"), None);
    }
}
