//! Offline conversions: flatten, expand, and plan.
//!
//! These never touch a device, so the API version must be given with
//! `--api-version` or pinned in the profile.

use rekon_core::{
    ApiVersion, Decision, EngineOptions, ReconcileContext, ResourceSchema, Schema, StateTree,
    WireObject,
};
use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use super::{render_object, util};
use crate::cli::{EngineArgs, ExpandArgs, FlattenArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Everything an offline command needs, resolved once.
struct Offline {
    schema: Schema,
    options: EngineOptions,
    version: ApiVersion,
}

impl Offline {
    fn load(args: &EngineArgs, global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = config::load(global)?;
        let schema = config::load_schema(global, &cfg)?;
        let options = config::engine_options(args, global, &cfg)?;
        let version = config::offline_version(&options)?;
        debug!(%version, resource = %args.resource, "offline reconcile");
        Ok(Self {
            schema,
            options,
            version,
        })
    }

    fn resource(&self, name: &str) -> Result<&ResourceSchema, CliError> {
        Ok(self.schema.resource(name)?)
    }

    fn context<'p>(&self, prior: &'p StateTree) -> ReconcileContext<'p> {
        ReconcileContext::new(self.version.clone(), prior)
            .with_import_all(self.options.import_all)
            .with_sort_order(self.options.sort_order)
    }
}

// ── flatten ──────────────────────────────────────────────────────────

pub fn flatten(args: &FlattenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let offline = Offline::load(&args.engine, global)?;
    let resource = offline.resource(&args.engine.resource)?;

    let wire = util::read_json_object(&args.wire)?;
    let prior = util::read_prior(args.prior.as_deref(), &resource.fields)?;
    let state = rekon_core::flatten_resource(&wire, resource, &offline.context(&prior))?;

    let out = render_object(global, &state.to_json())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── expand ───────────────────────────────────────────────────────────

pub fn expand(args: &ExpandArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let offline = Offline::load(&args.engine, global)?;
    let resource = offline.resource(&args.engine.resource)?;

    let state = util::read_state(&args.state, &resource.fields)?;
    let prior = util::read_prior(args.prior.as_deref(), &resource.fields)?;
    let wire = rekon_core::expand(&state, &resource.fields, &offline.context(&prior))?;

    let out = render_object(global, &wire)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── plan ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PlanEntry {
    path: String,
    decision: Decision,
}

#[derive(Serialize)]
struct PlanReport {
    decisions: Vec<PlanEntry>,
    wire: WireObject,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Field")]
    path: String,
    #[tabled(rename = "Decision")]
    decision: String,
}

pub fn plan(args: &ExpandArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let offline = Offline::load(&args.engine, global)?;
    let resource = offline.resource(&args.engine.resource)?;

    let state = util::read_state(&args.state, &resource.fields)?;
    let prior = util::read_prior(args.prior.as_deref(), &resource.fields)?;
    let expansion =
        rekon_core::expand_detailed(&state, &resource.fields, &offline.context(&prior))?;

    let report = PlanReport {
        decisions: expansion
            .decisions
            .iter()
            .map(|(path, decision)| PlanEntry {
                path: path.to_string(),
                decision: *decision,
            })
            .collect(),
        wire: expansion.wire,
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            let rows: Vec<PlanRow> = r
                .decisions
                .iter()
                .map(|e| PlanRow {
                    path: e.path.clone(),
                    decision: output::paint_decision(e.decision, color),
                })
                .collect();
            format!("{}\n{}", output::render_table(&rows), summary(r))
        },
        |r| {
            r.decisions
                .iter()
                .filter(|e| e.decision != Decision::Omit)
                .map(|e| format!("{}\t{}", e.decision, e.path))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn summary(report: &PlanReport) -> String {
    let count = |d: Decision| report.decisions.iter().filter(|e| e.decision == d).count();
    let (emit, clear) = (count(Decision::Emit), count(Decision::EmitClear));
    if emit + clear == 0 {
        "No changes.".into()
    } else {
        format!("{emit} to send, {clear} to clear")
    }
}
