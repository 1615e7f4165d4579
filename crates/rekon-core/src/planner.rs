// ── Partial-update planner ──
//
// Decides, per field, whether an outgoing wire object carries the field,
// carries an explicit clear, or leaves it out entirely. The device only
// touches keys present in the object, so leaving a key out means "keep
// whatever you have".

use serde::Serialize;
use strum::Display;

use crate::context::SortOrder;
use crate::path::FieldPath;
use crate::schema::{DescriptorSet, FieldDescriptor, FieldKind};
use crate::table::canonical_rows;
use crate::value::{StateTree, StateValue};

/// Outcome of planning one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Decision {
    /// Write the current value.
    Emit,
    /// Write an explicit empty value (`[]` or `null`).
    EmitClear,
    /// Do not write the key.
    Omit,
}

/// Whether the outgoing object patches the device object or replaces a
/// whole collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    /// Top-level fields of an update: unchanged values are left out.
    Patch,
    /// Fields of table rows: the array replaces the whole table, so every
    /// set field must be written.
    Replace,
}

/// Plan the field at `path` from the desired and prior trees.
///
/// Uses plain equality to detect unchanged values; [`plan_field`] is the
/// descriptor-aware variant used by the expander.
pub fn plan(path: &FieldPath, state: &StateTree, prior: &StateTree) -> Decision {
    let current = state.get_path(path);
    let previous = prior.get_path(path);
    decide(current, previous, PlanScope::Patch, || current == previous)
}

/// Plan one field, comparing sets canonically and rows field by field.
pub fn plan_field(
    descriptor: &FieldDescriptor,
    current: &StateValue,
    prior: &StateValue,
    scope: PlanScope,
    sort: SortOrder,
) -> Decision {
    decide(current, prior, scope, || {
        equivalent(descriptor, current, prior, sort)
    })
}

/// Emit anything set, clear anything the prior had (an explicit `[]`
/// included), omit the rest.
fn decide(
    current: &StateValue,
    prior: &StateValue,
    scope: PlanScope,
    unchanged: impl FnOnce() -> bool,
) -> Decision {
    if !current.is_absent() {
        if scope == PlanScope::Patch && unchanged() {
            Decision::Omit
        } else {
            Decision::Emit
        }
    } else if !prior.is_absent() {
        Decision::EmitClear
    } else {
        Decision::Omit
    }
}

/// Semantic equality: set rows compare regardless of order, row fields
/// compare through their descriptors.
pub fn equivalent(
    descriptor: &FieldDescriptor,
    a: &StateValue,
    b: &StateValue,
    sort: SortOrder,
) -> bool {
    if !descriptor.is_table() {
        return a == b;
    }
    let (Some(ra), Some(rb)) = (a.rows(), b.rows()) else {
        return a == b;
    };
    if ra.len() != rb.len() {
        return false;
    }
    let key = descriptor.key_field.as_deref().unwrap_or_default();
    let pairs: Vec<(&StateTree, &StateTree)> = if descriptor.kind == FieldKind::SetOfObject {
        canonical_rows(ra, key, sort)
            .into_iter()
            .zip(canonical_rows(rb, key, sort))
            .collect()
    } else {
        ra.iter().zip(rb).collect()
    };
    pairs
        .into_iter()
        .all(|(x, y)| rows_equivalent(&descriptor.fields, x, y, sort))
}

fn rows_equivalent(fields: &DescriptorSet, a: &StateTree, b: &StateTree, sort: SortOrder) -> bool {
    a.len() == b.len()
        && fields
            .iter()
            .all(|d| equivalent(d, a.get(&d.name), b.get(&d.name), sort))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;
    use crate::value::Scalar;

    fn members() -> FieldDescriptor {
        FieldDescriptor::table(
            "members",
            FieldKind::SetOfObject,
            "name",
            vec![FieldDescriptor::scalar("name", ScalarType::String)],
        )
    }

    fn set(names: &[&str]) -> StateValue {
        StateValue::Set(
            names
                .iter()
                .map(|n| StateTree::new().with("name", Scalar::from(*n)))
                .collect(),
        )
    }

    #[test]
    fn decision_table() {
        let p: FieldPath = "comments".parse().unwrap();
        let empty = StateTree::new();
        let set_a = StateTree::new().with("comments", Scalar::from("a"));
        let set_b = StateTree::new().with("comments", Scalar::from("b"));

        assert_eq!(plan(&p, &set_b, &set_a), Decision::Emit);
        assert_eq!(plan(&p, &set_a, &empty), Decision::Emit);
        assert_eq!(plan(&p, &empty, &set_a), Decision::EmitClear);
        assert_eq!(plan(&p, &empty, &empty), Decision::Omit);
    }

    #[test]
    fn unchanged_value_is_omitted_in_patch_scope_only() {
        let v = StateValue::Scalar(Scalar::Int(5));
        let d = FieldDescriptor::scalar("n", ScalarType::Integer);
        assert_eq!(plan_field(&d, &v, &v, PlanScope::Patch, SortOrder::default()), Decision::Omit);
        assert_eq!(plan_field(&d, &v, &v, PlanScope::Replace, SortOrder::default()), Decision::Emit);
    }

    #[test]
    fn set_equivalence_ignores_order() {
        let d = members();
        assert!(equivalent(&d, &set(&["b", "a"]), &set(&["a", "b"]), SortOrder::default()));
        assert!(!equivalent(&d, &set(&["a"]), &set(&["a", "b"]), SortOrder::default()));
        assert_eq!(
            plan_field(&d, &set(&["b", "a"]), &set(&["a", "b"]), PlanScope::Patch, SortOrder::default()),
            Decision::Omit
        );
    }

    #[test]
    fn list_equivalence_respects_order() {
        let d = FieldDescriptor {
            kind: FieldKind::ListOfObject,
            ..members()
        };
        let ab = StateValue::List(set_rows(&["a", "b"]));
        let ba = StateValue::List(set_rows(&["b", "a"]));
        assert!(!equivalent(&d, &ab, &ba, SortOrder::default()));
    }

    #[test]
    fn explicit_empty_prior_is_cleared() {
        let d = members();
        assert_eq!(
            plan_field(&d, &StateValue::Absent, &set(&[]), PlanScope::Patch, SortOrder::default()),
            Decision::EmitClear
        );
        let p: FieldPath = "ports".parse().unwrap();
        let prior = StateTree::new().with("ports", StateValue::Scalars(Vec::new()));
        assert_eq!(plan(&p, &StateTree::new(), &prior), Decision::EmitClear);
        assert_eq!(plan(&p, &StateTree::new(), &StateTree::new()), Decision::Omit);
    }

    fn set_rows(names: &[&str]) -> Vec<StateTree> {
        match set(names) {
            StateValue::Set(rows) => rows,
            _ => unreachable!(),
        }
    }
}
