//! Shared helpers for command handlers.

use std::io::Read;
use std::path::Path;

use rekon_core::{DescriptorSet, StateTree, WireObject};
use serde_json::Value;

use crate::error::CliError;

/// Read a JSON object from a file, or stdin when `path` is `-`.
pub fn read_json_object(path: &Path) -> Result<WireObject, CliError> {
    let (origin, contents) = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        ("stdin".to_owned(), buf)
    } else {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::File {
            path: path.to_path_buf(),
            source,
        })?;
        (path.display().to_string(), text)
    };

    match serde_json::from_str(&contents) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(other) => Err(CliError::Validation {
            field: origin,
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
        Err(source) => Err(CliError::Json { origin, source }),
    }
}

/// Read a state file against the resource descriptors.
pub fn read_state(path: &Path, fields: &DescriptorSet) -> Result<StateTree, CliError> {
    let obj = read_json_object(path)?;
    Ok(StateTree::from_json(&obj, fields)?)
}

/// Read an optional prior-state file; no file means an empty prior.
pub fn read_prior(path: Option<&Path>, fields: &DescriptorSet) -> Result<StateTree, CliError> {
    path.map_or_else(|| Ok(StateTree::new()), |p| read_state(p, fields))
}

/// Write a state tree as pretty JSON.
pub fn write_state(path: &Path, state: &StateTree) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(state).map_err(|e| CliError::Render(e.to_string()))?;
    std::fs::write(path, text + "\n").map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Destructive operations need `--yes`; there is no interactive prompt.
pub fn confirm(action: &str, yes_flag: bool) -> Result<(), CliError> {
    if yes_flag {
        Ok(())
    } else {
        Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
