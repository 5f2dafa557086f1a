//! Field-level diffs between canonical snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::Snapshot;

/// One field's change: the canonical value on each side, `null` standing
/// in for an absent side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// The set of changed fields between two snapshots.
///
/// Keys iterate in sorted order, so the serialized form is byte-stable for
/// identical inputs. An empty diff means "no change" and, by policy, no
/// log record is written for it on a plain change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff(pub BTreeMap<String, FieldChange>);

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    pub fn to_value(&self) -> Value {
        // Object keys come out sorted because the map is ordered.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Compute the field-level difference between two snapshots.
///
/// - both absent: empty (defensive; must not fail);
/// - one side absent: every field of the present side appears, with `null`
///   standing in for the absent side;
/// - both present: exactly the keys whose canonical values differ, using
///   deep structural equality.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Diff {
    match (before.fields(), after.fields()) {
        (None, None) => Diff::default(),
        (Some(b), None) => one_sided(b, Side::Before),
        (None, Some(a)) => one_sided(a, Side::After),
        (Some(b), Some(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            let mut out = BTreeMap::new();
            for key in keys {
                let old = b.get(key).cloned().unwrap_or(Value::Null);
                let new = a.get(key).cloned().unwrap_or(Value::Null);
                if old != new {
                    out.insert(key.clone(), FieldChange { old, new });
                }
            }
            Diff(out)
        }
    }
}

enum Side {
    Before,
    After,
}

fn one_sided(fields: &BTreeMap<String, Value>, side: Side) -> Diff {
    let out = fields
        .iter()
        .map(|(key, value)| {
            let change = match side {
                Side::Before => FieldChange {
                    old: value.clone(),
                    new: Value::Null,
                },
                Side::After => FieldChange {
                    old: Value::Null,
                    new: value.clone(),
                },
            };
            (key.clone(), change)
        })
        .collect();
    Diff(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(pairs: &[(&str, Value)]) -> Snapshot {
        Snapshot::Present(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let s = snap(&[("name", json!("x")), ("count", json!(3))]);
        assert!(diff(&s, &s).is_empty());
    }

    #[test]
    fn both_absent_diff_empty() {
        assert!(diff(&Snapshot::Absent, &Snapshot::Absent).is_empty());
    }

    #[test]
    fn creation_captures_every_field_with_null_old() {
        let s = snap(&[("name", json!("x")), ("count", json!(3))]);
        let d = diff(&Snapshot::Absent, &s);
        assert_eq!(d.len(), 2);
        assert_eq!(
            d.get("name").unwrap(),
            &FieldChange {
                old: json!(null),
                new: json!("x")
            }
        );
        assert_eq!(
            d.get("count").unwrap(),
            &FieldChange {
                old: json!(null),
                new: json!(3)
            }
        );
    }

    #[test]
    fn deletion_captures_every_field_with_null_new() {
        let s = snap(&[("name", json!("x"))]);
        let d = diff(&s, &Snapshot::Absent);
        assert_eq!(d.len(), 1);
        assert_eq!(
            d.get("name").unwrap(),
            &FieldChange {
                old: json!("x"),
                new: json!(null)
            }
        );
    }

    #[test]
    fn only_changed_keys_appear() {
        let before = snap(&[("name", json!("x")), ("count", json!(3))]);
        let after = snap(&[("name", json!("y")), ("count", json!(3))]);
        let d = diff(&before, &after);
        assert_eq!(d.len(), 1);
        assert_eq!(
            d.get("name").unwrap(),
            &FieldChange {
                old: json!("x"),
                new: json!("y")
            }
        );
    }

    #[test]
    fn key_only_on_one_side_diffs_against_null() {
        let before = snap(&[("name", json!("x"))]);
        let after = snap(&[("name", json!("x")), ("tag", json!("new"))]);
        let d = diff(&before, &after);
        assert_eq!(d.len(), 1);
        assert_eq!(
            d.get("tag").unwrap(),
            &FieldChange {
                old: json!(null),
                new: json!("new")
            }
        );
    }

    #[test]
    fn deep_values_compare_structurally() {
        let before = snap(&[("config", json!({"a": 1, "b": [1, 2]}))]);
        let same = snap(&[("config", json!({"b": [1, 2], "a": 1}))]);
        assert!(diff(&before, &same).is_empty());

        let changed = snap(&[("config", json!({"a": 1, "b": [2, 1]}))]);
        assert_eq!(diff(&before, &changed).len(), 1);
    }

    #[test]
    fn serialized_form_is_deterministic() {
        let before = snap(&[("b", json!(1)), ("a", json!(1)), ("c", json!(1))]);
        let after = snap(&[("b", json!(2)), ("a", json!(2)), ("c", json!(2))]);
        let first = serde_json::to_string(&diff(&before, &after)).unwrap();
        let second = serde_json::to_string(&diff(&before, &after)).unwrap();
        assert_eq!(first, second);
        // Keys appear in sorted order.
        assert!(first.find("\"a\"").unwrap() < first.find("\"b\"").unwrap());
        assert!(first.find("\"b\"").unwrap() < first.find("\"c\"").unwrap());
    }

    #[test]
    fn diff_round_trips_through_json() {
        let before = snap(&[("name", json!("x"))]);
        let after = snap(&[("name", json!("y"))]);
        let d = diff(&before, &after);
        let text = serde_json::to_string(&d).unwrap();
        let back: Diff = serde_json::from_str(&text).unwrap();
        assert_eq!(back, d);
    }
}
