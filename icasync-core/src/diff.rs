//! Keyed snapshot diffing.
//!
//! Computes added/removed/changed entries between two keyed collections of
//! the same resource. Diffs are transient: produced and consumed within one
//! coordinator cycle to drive change-notification events.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// Diff Types
// ============================================================================

/// The kind of change one diff entry describes.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    /// The key exists only in the new snapshot.
    Added,
    /// The key exists only in the old snapshot.
    Removed,
    /// The key exists in both snapshots with different values.
    Changed,
}

/// One computed difference between two snapshots.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diff {
    /// Kind of change.
    pub op: DiffOp,
    /// The key the change applies to.
    pub key: String,
    /// For `Changed`: the property names whose values differ.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_props: Option<Vec<String>>,
    /// Old value, absent for `Added`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    /// New value, absent for `Removed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

// ============================================================================
// Diff Engine
// ============================================================================

/// Computes the diffs between two keyed snapshots.
///
/// Output order is deterministic: ascending by key, removed entries after
/// the keys still present.
pub fn get_diffs(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> Vec<Diff> {
    let mut diffs = Vec::new();

    for (key, new_value) in new {
        match old.get(key) {
            None => diffs.push(Diff {
                op: DiffOp::Added,
                key: key.clone(),
                changed_props: None,
                old: None,
                new: Some(new_value.clone()),
            }),
            Some(old_value) if old_value != new_value => diffs.push(Diff {
                op: DiffOp::Changed,
                key: key.clone(),
                changed_props: Some(changed_props(old_value, new_value)),
                old: Some(old_value.clone()),
                new: Some(new_value.clone()),
            }),
            Some(_) => {}
        }
    }

    for (key, old_value) in old {
        if !new.contains_key(key) {
            diffs.push(Diff {
                op: DiffOp::Removed,
                key: key.clone(),
                changed_props: None,
                old: Some(old_value.clone()),
                new: None,
            });
        }
    }

    diffs
}

/// Property names whose values differ between two objects.
///
/// Non-object values yield a single synthetic `value` property.
fn changed_props(old: &Value, new: &Value) -> Vec<String> {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        return vec!["value".to_string()];
    };

    let mut props: Vec<String> = Vec::new();
    for (key, new_value) in new_map {
        if old_map.get(key) != Some(new_value) {
            props.push(key.clone());
        }
    }
    for key in old_map.keys() {
        if !new_map.contains_key(key) {
            props.push(key.clone());
        }
    }
    props.sort();
    props.dedup();
    props
}

/// Builds a keyed snapshot from a slice of records.
///
/// Records without a key are skipped; the caller decides whether that is
/// acceptable for the resource in question.
pub fn keyed<T, F>(items: &[T], key_of: F) -> BTreeMap<String, Value>
where
    T: Serialize,
    F: Fn(&T) -> Option<String>,
{
    items
        .iter()
        .filter_map(|item| {
            let key = key_of(item)?;
            let value = serde_json::to_value(item).ok()?;
            Some((key, value))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_self_diff_is_empty() {
        let snap = snapshot(&[
            ("1", json!({"name": "A"})),
            ("2", json!({"name": "B", "qty": 3})),
        ]);
        assert!(get_diffs(&snap, &snap).is_empty());
        assert!(get_diffs(&BTreeMap::new(), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_added_removed_exact() {
        let old = snapshot(&[("1", json!({"name": "A"})), ("2", json!({"name": "B"}))]);
        let new = snapshot(&[("1", json!({"name": "A"})), ("3", json!({"name": "C"}))]);

        let diffs = get_diffs(&old, &new);
        assert_eq!(diffs.len(), 2);

        let added: Vec<_> = diffs.iter().filter(|d| d.op == DiffOp::Added).collect();
        let removed: Vec<_> = diffs.iter().filter(|d| d.op == DiffOp::Removed).collect();
        let changed: Vec<_> = diffs.iter().filter(|d| d.op == DiffOp::Changed).collect();

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].key, "3");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key, "2");
        assert!(changed.is_empty());
    }

    #[test]
    fn test_changed_props_lists_differing_fields() {
        let old = snapshot(&[("1", json!({"name": "A", "qty": 1, "unit": "st"}))]);
        let new = snapshot(&[("1", json!({"name": "A", "qty": 2}))]);

        let diffs = get_diffs(&old, &new);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].op, DiffOp::Changed);
        assert_eq!(
            diffs[0].changed_props.as_deref(),
            Some(&["qty".to_string(), "unit".to_string()][..])
        );
        assert!(diffs[0].old.is_some());
        assert!(diffs[0].new.is_some());
    }

    #[test]
    fn test_scalar_change_uses_synthetic_prop() {
        let old = snapshot(&[("1", json!(1))]);
        let new = snapshot(&[("1", json!(2))]);

        let diffs = get_diffs(&old, &new);
        assert_eq!(diffs[0].changed_props.as_deref(), Some(&["value".to_string()][..]));
    }

    #[test]
    fn test_keyed_skips_entries_without_key() {
        #[derive(Serialize)]
        struct Row {
            id: Option<i64>,
            name: &'static str,
        }
        let rows = [
            Row {
                id: Some(1),
                name: "a",
            },
            Row {
                id: None,
                name: "b",
            },
        ];
        let map = keyed(&rows, |r| r.id.map(|id| id.to_string()));
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("1"));
    }
}
