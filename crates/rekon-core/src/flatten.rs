// ── Tree flattener (wire → state) ──

use rekon_api::WireObject;
use serde_json::Value;
use tracing::trace;

use crate::coerce;
use crate::context::{ReconcileContext, SortOrder};
use crate::error::CoreError;
use crate::path::FieldPath;
use crate::schema::{DescriptorSet, FieldDescriptor, ResourceSchema};
use crate::table::{self, TableRow, find_row, reconcile_table};
use crate::value::{StateTree, StateValue};

/// Build a state tree from a wire object.
///
/// Every wire key must be declared. A top-level table is only imported
/// when the prior state already had rows for it, unless `ctx.import_all`
/// is set; nested tables are always imported.
pub fn flatten(
    wire: &WireObject,
    descriptors: &DescriptorSet,
    ctx: &ReconcileContext<'_>,
) -> Result<StateTree, CoreError> {
    Flattener::new(ctx, &[]).tree(wire, descriptors, ctx.prior, true, &FieldPath::root())
}

/// [`flatten`] for a resource, tolerating its ignored wire keys.
pub fn flatten_resource(
    wire: &WireObject,
    resource: &ResourceSchema,
    ctx: &ReconcileContext<'_>,
) -> Result<StateTree, CoreError> {
    Flattener::new(ctx, &resource.ignore).tree(wire, &resource.fields, ctx.prior, true, &FieldPath::root())
}

struct Flattener<'a> {
    ignore: &'a [String],
    import_all: bool,
    sort: SortOrder,
}

impl<'a> Flattener<'a> {
    fn new(ctx: &ReconcileContext<'_>, ignore: &'a [String]) -> Self {
        Self {
            ignore,
            import_all: ctx.import_all,
            sort: ctx.sort_order,
        }
    }

    /// `prior` is the matching prior object or row; `top_level` gates
    /// table import.
    fn tree(
        &self,
        wire: &WireObject,
        fields: &DescriptorSet,
        prior: &StateTree,
        top_level: bool,
        path: &FieldPath,
    ) -> Result<StateTree, CoreError> {
        if let Some(unknown) = wire
            .keys()
            .find(|k| fields.by_wire(k).is_none() && !self.ignore.contains(*k))
        {
            return Err(CoreError::UnknownField {
                path: path.key(unknown),
            });
        }

        let mut tree = StateTree::new();
        for descriptor in fields.iter() {
            let raw = match wire.get(&descriptor.wire_name) {
                None | Some(Value::Null) => continue,
                Some(raw) => raw,
            };
            let field_path = path.key(&descriptor.name);
            let value = if descriptor.is_table() {
                let prior_value = prior.get(&descriptor.name);
                if top_level && !self.import_all && !prior_value.has_content() {
                    trace!(field = %field_path, "table not in prior state, skipped");
                    continue;
                }
                self.table(raw, descriptor, prior_value, &field_path)?
            } else {
                coerce::decode_value(raw, descriptor, &field_path)?
            };
            tree.insert(descriptor.name.clone(), value);
        }
        Ok(tree)
    }

    fn table(
        &self,
        raw: &Value,
        descriptor: &FieldDescriptor,
        prior_value: &StateValue,
        path: &FieldPath,
    ) -> Result<StateValue, CoreError> {
        let rows = self.rows(raw, descriptor, prior_value.rows().unwrap_or_default(), path)?;
        trace!(
            field = %path,
            rows = rows.len(),
            existing = rows.iter().filter(|r| r.tf_exists).count(),
            "table reconciled"
        );
        Ok(table::into_state(rows, descriptor.kind))
    }

    /// Flatten each wire row against the prior row with the same key, then
    /// reconcile the table.
    fn rows(
        &self,
        raw: &Value,
        descriptor: &FieldDescriptor,
        prior_rows: &[StateTree],
        path: &FieldPath,
    ) -> Result<Vec<TableRow>, CoreError> {
        let no_prior = StateTree::new();
        let fresh = coerce::expect_rows(raw, descriptor, path)?
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let row_path = path.index(idx);
                let matched = matched_row(row, descriptor, prior_rows, &row_path)?.unwrap_or(&no_prior);
                self.tree(row, &descriptor.fields, matched, false, &row_path)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key = descriptor.key_field.as_deref().unwrap_or_default();
        Ok(reconcile_table(prior_rows, fresh, key, descriptor.kind, self.sort))
    }
}

/// The prior row whose key equals the decoded key of wire `row`.
fn matched_row<'p>(
    row: &WireObject,
    descriptor: &FieldDescriptor,
    prior_rows: &'p [StateTree],
    path: &FieldPath,
) -> Result<Option<&'p StateTree>, CoreError> {
    let key_descriptor = match descriptor.key_field.as_deref().and_then(|k| descriptor.fields.get(k)) {
        Some(d) if !prior_rows.is_empty() => d,
        _ => return Ok(None),
    };
    let key = match row.get(&key_descriptor.wire_name) {
        None | Some(Value::Null) => return Ok(None),
        Some(raw) => coerce::decode_value(raw, key_descriptor, &path.key(&key_descriptor.name))?,
    };
    Ok(key
        .as_scalar()
        .and_then(|k| find_row(prior_rows, &key_descriptor.name, k)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, ScalarType};
    use crate::value::Scalar;
    use crate::version::ApiVersion;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn descriptors() -> DescriptorSet {
        DescriptorSet::new(vec![
            FieldDescriptor::scalar("policyid", ScalarType::Integer),
            FieldDescriptor::scalar("name", ScalarType::String),
            FieldDescriptor::table(
                "srcintf",
                FieldKind::SetOfObject,
                "name",
                vec![FieldDescriptor::scalar("name", ScalarType::String)],
            ),
            FieldDescriptor::table(
                "hops",
                FieldKind::ListOfObject,
                "seq",
                vec![
                    FieldDescriptor::scalar("seq", ScalarType::Integer),
                    FieldDescriptor::table(
                        "tags",
                        FieldKind::SetOfObject,
                        "tag",
                        vec![FieldDescriptor::scalar("tag", ScalarType::String)],
                    ),
                ],
            ),
        ])
        .unwrap()
    }

    fn wire(v: Value) -> WireObject {
        v.as_object().unwrap().clone()
    }

    fn tag(name: &str) -> StateTree {
        StateTree::new().with("tag", Scalar::from(name))
    }

    fn names(tree: &StateTree, field: &str) -> Vec<String> {
        tree.get(field)
            .rows()
            .unwrap()
            .iter()
            .map(|r| r.get("name").as_scalar().unwrap().to_string())
            .collect()
    }

    #[test]
    fn scalars_flatten_and_missing_stay_absent() {
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior);
        let tree = flatten(&wire(json!({ "policyid": 4, "name": null })), &descriptors(), &ctx).unwrap();
        assert_eq!(tree.get("policyid"), &StateValue::Scalar(Scalar::Int(4)));
        assert!(tree.get("name").is_absent());
    }

    #[test]
    fn table_skipped_without_prior_unless_import_all() {
        let prior = StateTree::new();
        let obj = wire(json!({ "srcintf": [{ "name": "b" }, { "name": "a" }] }));

        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior);
        assert!(flatten(&obj, &descriptors(), &ctx).unwrap().get("srcintf").is_absent());

        let ctx = ctx.with_import_all(true);
        let tree = flatten(&obj, &descriptors(), &ctx).unwrap();
        assert_eq!(names(&tree, "srcintf"), ["a", "b"]);
    }

    #[test]
    fn table_imported_when_prior_has_rows() {
        let prior = StateTree::new().with(
            "srcintf",
            StateValue::Set(vec![StateTree::new().with("name", Scalar::from("x"))]),
        );
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior);
        let obj = wire(json!({ "srcintf": [{ "name": "z" }, { "name": "y" }] }));
        let tree = flatten(&obj, &descriptors(), &ctx).unwrap();
        assert_eq!(names(&tree, "srcintf"), ["y", "z"]);
    }

    #[test]
    fn nested_tables_always_flattened() {
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior).with_import_all(true);
        let obj = wire(json!({ "hops": [{ "seq": 2, "tags": [{ "tag": "q" }, { "tag": "p" }] }] }));
        let tree = flatten(&obj, &descriptors(), &ctx).unwrap();
        let hop = &tree.get("hops").rows().unwrap()[0];
        let tags: Vec<_> = hop
            .get("tags")
            .rows()
            .unwrap()
            .iter()
            .map(|r| r.get("tag").as_scalar().unwrap().to_string())
            .collect();
        assert_eq!(tags, ["p", "q"]);
    }

    #[test]
    fn nested_rows_reconcile_against_matched_parent_row() {
        let prior = StateTree::new().with(
            "hops",
            StateValue::List(vec![
                StateTree::new()
                    .with("seq", Scalar::Int(1))
                    .with("tags", StateValue::Set(vec![tag("a")])),
                StateTree::new()
                    .with("seq", Scalar::Int(2))
                    .with("tags", StateValue::Set(vec![tag("p")])),
            ]),
        );
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior);
        let flattener = Flattener::new(&ctx, &[]);
        let descriptors = descriptors();
        let hops = descriptors.get("hops").unwrap();
        let raw = json!([{ "seq": 2, "tags": [{ "tag": "q" }, { "tag": "p" }] }, { "seq": 3 }]);
        let prior_rows = prior.get("hops").rows().unwrap();

        let first = raw[0].as_object().unwrap();
        let path = FieldPath::root().key("hops").index(0);
        let matched = matched_row(first, hops, prior_rows, &path).unwrap();
        assert_eq!(matched, Some(&prior_rows[1]));

        let tags = hops.fields.get("tags").unwrap();
        let nested = flattener
            .rows(&first["tags"], tags, matched.unwrap().get("tags").rows().unwrap(), &path.key("tags"))
            .unwrap();
        let exists: Vec<bool> = nested.iter().map(|r| r.tf_exists).collect();
        assert_eq!(exists, [true, false]);

        let rows = flattener
            .rows(&raw, hops, prior_rows, &FieldPath::root().key("hops"))
            .unwrap();
        assert!(rows[0].tf_exists);
        assert!(!rows[1].tf_exists);
        let tags_of_first: Vec<_> = rows[0]
            .fields
            .get("tags")
            .rows()
            .unwrap()
            .iter()
            .map(|r| r.get("tag").as_scalar().unwrap().to_string())
            .collect();
        assert_eq!(tags_of_first, ["p", "q"]);
    }

    #[test]
    fn unknown_wire_key_is_rejected_at_any_depth() {
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior).with_import_all(true);

        let err = flatten(&wire(json!({ "colour": "red" })), &descriptors(), &ctx).unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "colour");

        let obj = wire(json!({ "hops": [{ "seq": 1, "extra": true }] }));
        let err = flatten(&obj, &descriptors(), &ctx).unwrap_err();
        assert!(matches!(err, CoreError::UnknownField { .. }));
        assert_eq!(err.path().unwrap().to_string(), "hops[0].extra");
    }

    #[test]
    fn ignored_keys_are_tolerated_for_resources() {
        let resource = ResourceSchema::new("policy", "firewall/policy", "policyid", descriptors())
            .unwrap()
            .with_ignored(["q_origin_key"]);
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior).with_import_all(true);
        let obj = wire(json!({
            "policyid": 1,
            "q_origin_key": 1,
            "srcintf": [{ "name": "a", "q_origin_key": "a" }]
        }));
        let tree = flatten_resource(&obj, &resource, &ctx).unwrap();
        assert_eq!(names(&tree, "srcintf"), ["a"]);
    }

    #[test]
    fn empty_wire_array_is_empty_table() {
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior).with_import_all(true);
        let tree = flatten(&wire(json!({ "srcintf": [] })), &descriptors(), &ctx).unwrap();
        assert_eq!(tree.get("srcintf"), &StateValue::Set(Vec::new()));
    }

    #[test]
    fn table_given_scalar_is_coercion_error() {
        let prior = StateTree::new();
        let ctx = ReconcileContext::new(ApiVersion::new([7, 0]), &prior).with_import_all(true);
        let err = flatten(&wire(json!({ "srcintf": "port1" })), &descriptors(), &ctx).unwrap_err();
        assert!(matches!(err, CoreError::Coercion { .. }));
    }
}
