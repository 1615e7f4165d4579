//! Device-bound commands: read, apply, delete.

use std::sync::Arc;

use rekon_api::DeviceClient;
use rekon_core::{
    ApplyOutcome, EngineOptions, ReadOutcome, Reconciler, ResourceData, StateTree, WireObject,
};
use serde::Serialize;
use tracing::info;

use super::{object_table, render_object, util};
use crate::cli::{ApplyArgs, DeleteArgs, GlobalOpts, ReadArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// A reconciler bound to the active profile's device.
struct Session {
    engine: Reconciler<DeviceClient>,
    scope: Option<String>,
}

impl Session {
    fn connect(
        global: &GlobalOpts,
        options: impl FnOnce(&rekon_config::Config) -> Result<EngineOptions, CliError>,
    ) -> Result<Self, CliError> {
        let cfg = config::load(global)?;
        let schema = config::load_schema(global, &cfg)?;
        let engine_options = options(&cfg)?;
        let settings = config::device_settings(global, &cfg, engine_options)?;
        info!(url = %settings.url, scope = ?settings.scope, "connecting");

        let client = DeviceClient::new(settings.url, &settings.api_key, &settings.transport)?;
        Ok(Self {
            engine: Reconciler::new(client, Arc::new(schema), settings.engine),
            scope: settings.scope,
        })
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn fields(&self, resource: &str) -> Result<&rekon_core::DescriptorSet, CliError> {
        Ok(&self.engine.schema().resource(resource)?.fields)
    }
}

fn gone(resource: &str, id: &str) -> CliError {
    CliError::NotFound {
        resource: resource.into(),
        id: id.into(),
    }
}

// ── read ─────────────────────────────────────────────────────────────

pub async fn read(args: &ReadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::connect(global, |cfg| {
        config::engine_options(&args.engine, global, cfg)
    })?;
    let resource = &args.engine.resource;
    let prior = util::read_prior(args.prior.as_deref(), session.fields(resource)?)?;

    match session
        .engine
        .read(resource, &args.id, &prior, session.scope())
        .await?
    {
        ReadOutcome::Found(state) => {
            let out = render_object(global, &state.to_json())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ReadOutcome::Gone => Err(gone(resource, &args.id)),
    }
}

// ── apply ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApplyReport {
    id: String,
    sent: Option<WireObject>,
    state: Option<StateTree>,
}

impl From<ApplyOutcome> for ApplyReport {
    fn from(outcome: ApplyOutcome) -> Self {
        Self {
            id: outcome.id,
            sent: outcome.sent,
            state: match outcome.state {
                ReadOutcome::Found(state) => Some(state),
                ReadOutcome::Gone => None,
            },
        }
    }
}

pub async fn apply(args: &ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::connect(global, |cfg| {
        config::engine_options(&args.engine, global, cfg)
    })?;
    let resource = &args.engine.resource;
    let fields = session.fields(resource)?;
    let desired = util::read_state(&args.state, fields)?;

    let outcome = match &args.id {
        None => session.engine.create(resource, &desired, session.scope()).await?,
        Some(id) => match &args.prior {
            Some(path) => {
                let data = ResourceData::new(desired, util::read_state(path, fields)?);
                session
                    .engine
                    .update(resource, id, &data, session.scope())
                    .await?
            }
            None => session
                .engine
                .update_from_device(resource, id, &desired, session.scope())
                .await
                .map_err(|e| if e.is_not_found() { gone(resource, id) } else { e.into() })?,
        },
    };

    let report = ApplyReport::from(outcome);
    if let (Some(path), Some(state)) = (&args.save, &report.state) {
        util::write_state(path, state)?;
    }

    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            let sent = r
                .sent
                .as_ref()
                .map_or_else(|| "no changes sent".to_owned(), |w| format!("{} field(s) sent", w.len()));
            match &r.state {
                Some(state) => format!("{resource} '{}': {sent}\n{}", r.id, object_table(&state.to_json())),
                None => format!("{resource} '{}': {sent}, object gone after write", r.id),
            }
        },
        |r| r.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── delete ───────────────────────────────────────────────────────────

pub async fn delete(args: &DeleteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    util::confirm(&format!("delete {} '{}'", args.resource, args.id), global.yes)?;
    let session = Session::connect(global, |cfg| config::profile_engine_options(global, cfg))?;
    session
        .engine
        .delete(&args.resource, &args.id, session.scope())
        .await?;
    if !global.quiet {
        eprintln!("Deleted {} '{}'", args.resource, args.id);
    }
    Ok(())
}
