//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod offline;
pub mod remote;
pub mod schema_cmd;
pub mod util;

use serde_json::{Map, Value};
use tabled::Tabled;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Dispatch every command except `config` and `completions`.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Flatten(args) => offline::flatten(&args, global),
        Command::Expand(args) => offline::expand(&args, global),
        Command::Plan(args) => offline::plan(&args, global),
        Command::Read(args) => remote::read(&args, global).await,
        Command::Apply(args) => remote::apply(&args, global).await,
        Command::Delete(args) => remote::delete(&args, global).await,
        Command::Schema(args) => schema_cmd::handle(&args, global),
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled before dispatch".into(),
        }),
    }
}

// ── Object rendering shared by state and wire output ─────────────────

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Table: one row per key. Plain: `key=value` lines.
pub(crate) fn render_object(global: &GlobalOpts, obj: &Map<String, Value>) -> Result<String, CliError> {
    output::render_single(
        &global.output,
        obj,
        object_table,
        |o| {
            o.iter()
                .map(|(k, v)| format!("{k}={}", output::cell(v)))
                .collect::<Vec<_>>()
                .join("\n")
        },
    )
}

/// One table row per key.
pub(crate) fn object_table(obj: &Map<String, Value>) -> String {
    let rows: Vec<EntryRow> = obj
        .iter()
        .map(|(k, v)| EntryRow {
            field: k.clone(),
            value: output::cell(v),
        })
        .collect();
    output::render_table(&rows)
}
