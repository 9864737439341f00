//! Identity linking between source and target entities.
//!
//! Names are matched exactly and case-sensitively. Each name links at most
//! one pair: the first unlinked source and the first unlinked target in
//! fetch order. Further entities sharing that name, on either side, stay
//! unlinked.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::store::EntityStore;

/// One source ↔ target correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPair {
    pub source_id: String,
    pub target_id: String,
}

impl LinkPair {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

/// Pair source and target entities of one group by natural key.
///
/// Only entities of `source_workspace` and `target_workspace` take part, and
/// only those not already linked. Groups without a natural key produce no
/// pairs.
pub fn match_by_natural_key(
    source: &EntityStore,
    target: &EntityStore,
    source_workspace: &str,
    target_workspace: &str,
) -> Vec<LinkPair> {
    let candidates = target.in_workspace(target_workspace);
    match_records(source.in_workspace(source_workspace), candidates)
}

/// Pair workspaces by name across both tools' entire workspace lists.
pub fn match_workspaces(source: &EntityStore, target: &EntityStore) -> Vec<LinkPair> {
    match_records(source.iter(), target.iter())
}

fn match_records<'a>(
    source: impl Iterator<Item = &'a crate::EntityRecord>,
    target: impl Iterator<Item = &'a crate::EntityRecord>,
) -> Vec<LinkPair> {
    // Name → first unlinked target in fetch order.
    let mut by_key: HashMap<&str, &str> = HashMap::new();
    for record in target.filter(|r| r.linked_id.is_none()) {
        if let Some(key) = record.natural_key() {
            by_key.entry(key).or_insert(&record.id);
        }
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut pairs = Vec::new();
    for record in source.filter(|r| r.linked_id.is_none()) {
        let Some(key) = record.natural_key() else {
            continue;
        };
        let Some(target_id) = by_key.remove(key) else {
            if claimed.contains(key) {
                debug!(name = key, source_id = %record.id, "duplicate name left unlinked");
            }
            continue;
        };
        claimed.insert(key);
        pairs.push(LinkPair::new(record.id.clone(), target_id));
    }
    pairs
}

/// Write pairs into both stores.
///
/// Explicit pairs are authoritative: a previous link on either side is
/// cleared on its counterpart before the new one is recorded. Pairs naming
/// an id missing from either store are ignored.
pub fn apply_links(source: &mut EntityStore, target: &mut EntityStore, pairs: &[LinkPair]) {
    let mut seen_targets = HashSet::new();

    for pair in pairs {
        if !source.contains(&pair.source_id) || !target.contains(&pair.target_id) {
            continue;
        }
        if !seen_targets.insert(pair.target_id.as_str()) {
            continue;
        }

        unlink(source, target, &pair.source_id);
        unlink(target, source, &pair.target_id);

        if let Some(record) = source.get_mut(&pair.source_id) {
            record.linked_id = Some(pair.target_id.clone());
        }
        if let Some(record) = target.get_mut(&pair.target_id) {
            record.linked_id = Some(pair.source_id.clone());
        }
    }
}

fn unlink(store: &mut EntityStore, other: &mut EntityStore, id: &str) {
    let Some(previous) = store.get_mut(id).and_then(|r| r.linked_id.take()) else {
        return;
    };
    if let Some(counterpart) = other.get_mut(&previous) {
        if counterpart.linked_id.as_deref() == Some(id) {
            counterpart.linked_id = None;
        }
    }
}

/// Link two stores by natural key and return them.
pub fn link_by_natural_key(
    mut source: EntityStore,
    mut target: EntityStore,
    source_workspace: &str,
    target_workspace: &str,
) -> (EntityStore, EntityStore) {
    let pairs = match_by_natural_key(&source, &target, source_workspace, target_workspace);
    apply_links(&mut source, &mut target, &pairs);
    (source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityFields, EntityRecord};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn client(id: &str, workspace: &str, name: &str) -> EntityRecord {
        EntityRecord::new(id, workspace, EntityFields::Clients { name: name.into() })
    }

    fn workspace(id: &str, name: &str) -> EntityRecord {
        EntityRecord::new(
            id,
            id,
            EntityFields::Workspaces {
                name: name.into(),
                user_ids: vec![],
            },
        )
    }

    #[test]
    fn test_only_matching_names_link() {
        let source = EntityStore::from_records([client("A", "s", "x"), client("B", "s", "y")]);
        let target = EntityStore::from_records([client("C", "t", "x"), client("D", "t", "z")]);

        let (source, target) = link_by_natural_key(source, target, "s", "t");

        assert_eq!(source.get("A").unwrap().linked_id.as_deref(), Some("C"));
        assert_eq!(target.get("C").unwrap().linked_id.as_deref(), Some("A"));
        assert_eq!(source.get("B").unwrap().linked_id, None);
        assert_eq!(target.get("D").unwrap().linked_id, None);
    }

    #[test]
    fn test_first_encountered_target_wins() {
        let source = EntityStore::from_records([client("A", "s", "x")]);
        let target = EntityStore::from_records([client("C1", "t", "x"), client("C2", "t", "x")]);

        let pairs = match_by_natural_key(&source, &target, "s", "t");
        assert_eq!(pairs, vec![LinkPair::new("A", "C1")]);
    }

    #[test]
    fn test_duplicate_names_link_once() {
        let source = EntityStore::from_records([client("A", "s", "x"), client("B", "s", "x")]);
        let target = EntityStore::from_records([client("C1", "t", "x"), client("C2", "t", "x")]);

        let (source, target) = link_by_natural_key(source, target, "s", "t");

        assert_eq!(source.get("A").unwrap().linked_id.as_deref(), Some("C1"));
        assert_eq!(source.get("B").unwrap().linked_id, None);
        assert_eq!(target.get("C2").unwrap().linked_id, None);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let source = EntityStore::from_records([client("A", "s", "Acme")]);
        let target = EntityStore::from_records([client("C", "t", "acme")]);
        assert!(match_by_natural_key(&source, &target, "s", "t").is_empty());
    }

    #[test]
    fn test_matching_is_scoped_to_workspace_pair() {
        let source = EntityStore::from_records([client("A", "s1", "x")]);
        let target = EntityStore::from_records([client("C", "t2", "x"), client("D", "t1", "x")]);

        let pairs = match_by_natural_key(&source, &target, "s1", "t1");
        assert_eq!(pairs, vec![LinkPair::new("A", "D")]);
    }

    #[test]
    fn test_workspaces_link_across_entire_set() {
        let source = EntityStore::from_records([workspace("1", "Acme"), workspace("2", "Side")]);
        let target = EntityStore::from_records([workspace("w9", "Side"), workspace("w8", "Other")]);

        assert_eq!(
            match_workspaces(&source, &target),
            vec![LinkPair::new("2", "w9")]
        );
    }

    #[test]
    fn test_time_entries_never_match_by_name() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let entry = |id: &str, ws: &str| {
            EntityRecord::new(
                id,
                ws,
                EntityFields::TimeEntries {
                    description: "same".into(),
                    start,
                    end: start,
                    year: 2020,
                    is_billable: false,
                    project_id: None,
                    task_id: None,
                    user_id: None,
                    tag_ids: Default::default(),
                },
            )
        };
        let source = EntityStore::from_records([entry("1", "s")]);
        let target = EntityStore::from_records([entry("a", "t")]);
        assert!(match_by_natural_key(&source, &target, "s", "t").is_empty());
    }

    #[test]
    fn test_explicit_pair_replaces_previous_link() {
        let mut source = EntityStore::from_records([client("A", "s", "x")]);
        let mut target = EntityStore::from_records([client("C", "t", "x"), client("E", "t", "x2")]);

        apply_links(&mut source, &mut target, &[LinkPair::new("A", "C")]);
        apply_links(&mut source, &mut target, &[LinkPair::new("A", "E")]);

        assert_eq!(source.get("A").unwrap().linked_id.as_deref(), Some("E"));
        assert_eq!(target.get("E").unwrap().linked_id.as_deref(), Some("A"));
        assert_eq!(target.get("C").unwrap().linked_id, None);
    }

    proptest! {
        #[test]
        fn links_are_mutual_and_injective(
            source_names in prop::collection::vec(0u8..5, 0..10),
            target_names in prop::collection::vec(0u8..5, 0..10),
        ) {
            let source = EntityStore::from_records(source_names.iter().enumerate()
                .map(|(i, n)| client(&format!("s{i}"), "s", &format!("n{n}"))));
            let target = EntityStore::from_records(target_names.iter().enumerate()
                .map(|(i, n)| client(&format!("t{i}"), "t", &format!("n{n}"))));

            let (source, target) = link_by_natural_key(source, target, "s", "t");

            let mut claimed = HashSet::new();
            for record in source.iter() {
                if let Some(linked) = &record.linked_id {
                    prop_assert!(claimed.insert(linked.clone()));
                    let counterpart = target.get(linked).unwrap();
                    prop_assert_eq!(counterpart.linked_id.as_deref(), Some(record.id.as_str()));
                    prop_assert_eq!(counterpart.natural_key(), record.natural_key());
                }
            }
        }
    }
}
