// ── Tree expander (state → wire) ──
//
// Produces the wire object for a create or update. Each top-level field
// goes through the planner in patch scope; table rows are reconciled
// against the prior rows and expanded in replace scope, because the wire
// array replaces the device's whole collection.

use std::borrow::Cow;

use rekon_api::WireObject;
use serde_json::Value;
use tracing::debug;

use crate::coerce;
use crate::context::ReconcileContext;
use crate::error::CoreError;
use crate::path::FieldPath;
use crate::planner::{Decision, PlanScope, plan_field};
use crate::schema::{DescriptorSet, FieldDescriptor, FieldKind};
use crate::table::{find_row, reconcile_table};
use crate::value::{StateTree, StateValue};

/// A wire object together with the decision taken for every field.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub wire: WireObject,
    pub decisions: Vec<(FieldPath, Decision)>,
}

impl Expansion {
    /// Decision recorded for `path`, if the field was planned.
    pub fn decision(&self, path: &FieldPath) -> Option<Decision> {
        self.decisions
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, d)| *d)
    }
}

/// Build the wire object for `state` against `ctx.prior`.
pub fn expand(
    state: &StateTree,
    descriptors: &DescriptorSet,
    ctx: &ReconcileContext<'_>,
) -> Result<WireObject, CoreError> {
    expand_detailed(state, descriptors, ctx).map(|e| e.wire)
}

/// [`expand`], also reporting each planning decision.
pub fn expand_detailed(
    state: &StateTree,
    descriptors: &DescriptorSet,
    ctx: &ReconcileContext<'_>,
) -> Result<Expansion, CoreError> {
    let mut expander = Expander {
        ctx,
        decisions: Vec::new(),
    };
    let wire = expander.tree(
        state,
        descriptors,
        ctx.prior,
        &FieldPath::root(),
        PlanScope::Patch,
        !ctx.prior.is_empty(),
    )?;
    debug!(
        fields = wire.len(),
        version = %ctx.api_version,
        "expanded state"
    );
    Ok(Expansion {
        wire,
        decisions: expander.decisions,
    })
}

struct Expander<'c, 'p> {
    ctx: &'c ReconcileContext<'p>,
    decisions: Vec<(FieldPath, Decision)>,
}

impl Expander<'_, '_> {
    /// `existing` is true when `prior` describes an object the device
    /// already has; only then may required fields reuse prior values.
    fn tree(
        &mut self,
        state: &StateTree,
        fields: &DescriptorSet,
        prior: &StateTree,
        path: &FieldPath,
        scope: PlanScope,
        existing: bool,
    ) -> Result<WireObject, CoreError> {
        if let Some(unknown) = state.keys().find(|k| fields.get(k).is_none()) {
            return Err(CoreError::UnknownField {
                path: path.key(unknown),
            });
        }

        let mut out = WireObject::new();
        for descriptor in fields.iter() {
            let field_path = path.key(&descriptor.name);
            let stored = prior.get(&descriptor.name);
            let previous = if existing {
                default_if_absent(descriptor, stored)
            } else {
                Cow::Borrowed(stored)
            };
            let current = resolve_required(
                descriptor,
                state.get(&descriptor.name),
                &previous,
                existing,
                &field_path,
            )?;

            let decision = plan_field(descriptor, &current, &previous, scope, self.ctx.sort_order);
            self.decisions.push((field_path.clone(), decision));

            match decision {
                Decision::Emit => {
                    let value = if descriptor.is_table() {
                        self.table(descriptor, &current, &previous, &field_path)?
                    } else {
                        coerce::encode_value(&current, descriptor, &self.ctx.api_version, &field_path)?
                    };
                    out.insert(descriptor.wire_name.clone(), value);
                }
                Decision::EmitClear => {
                    let cleared = match descriptor.kind {
                        FieldKind::Scalar => Value::Null,
                        _ => Value::Array(Vec::new()),
                    };
                    out.insert(descriptor.wire_name.clone(), cleared);
                }
                Decision::Omit => {}
            }
        }
        Ok(out)
    }

    fn table(
        &mut self,
        descriptor: &FieldDescriptor,
        current: &StateValue,
        previous: &StateValue,
        path: &FieldPath,
    ) -> Result<Value, CoreError> {
        let desired = coerce::state_rows(current, descriptor, path)?;
        let prior_rows = previous.rows().unwrap_or_default();
        let key = descriptor.key_field.as_deref().unwrap_or_default();
        let rows = reconcile_table(
            prior_rows,
            desired.to_vec(),
            key,
            descriptor.kind,
            self.ctx.sort_order,
        );

        let no_prior = StateTree::new();
        let mut out = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let prior_row = row
                .key
                .as_ref()
                .filter(|_| row.tf_exists)
                .and_then(|k| find_row(prior_rows, key, k))
                .unwrap_or(&no_prior);
            let obj = self.tree(
                &row.fields,
                &descriptor.fields,
                prior_row,
                &path.index(idx),
                PlanScope::Replace,
                row.tf_exists,
            )?;
            out.push(Value::Object(obj));
        }
        Ok(Value::Array(out))
    }
}

/// An existing object that never reported a required field holds its default.
fn default_if_absent<'v>(descriptor: &FieldDescriptor, value: &'v StateValue) -> Cow<'v, StateValue> {
    match &descriptor.default {
        Some(default) if descriptor.required && value.is_absent() => {
            Cow::Owned(StateValue::Scalar(default.clone()))
        }
        _ => Cow::Borrowed(value),
    }
}

/// Fill an absent required field from its default, then the prior value.
fn resolve_required(
    descriptor: &FieldDescriptor,
    current: &StateValue,
    previous: &StateValue,
    existing: bool,
    path: &FieldPath,
) -> Result<StateValue, CoreError> {
    if !current.is_absent() || !descriptor.required {
        return Ok(current.clone());
    }
    if let Some(default) = &descriptor.default {
        return Ok(StateValue::Scalar(default.clone()));
    }
    if existing && !previous.is_absent() {
        return Ok(previous.clone());
    }
    Err(CoreError::Expand {
        path: path.clone(),
        reason: "required field has no value, default or prior value".into(),
    })
}
