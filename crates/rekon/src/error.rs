//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use rekon_config::ConfigError;
use rekon_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const SCHEMA: i32 = 5;
    pub const RECONCILE: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the device")]
    #[diagnostic(
        code(rekon::connection_failed),
        help(
            "Check that the device is reachable and the profile URL is right.\n\
             Self-signed certificates need --insecure (-k) or ca_cert in the profile."
        )
    )]
    ConnectionFailed {
        #[source]
        source: rekon_api::Error,
    },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(rekon::timeout),
        help("Increase the timeout with --timeout or check device responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(rekon::auth_failed),
        help("Verify the API key and that its admin profile may write this resource.")
    )]
    AuthFailed { message: String },

    #[error("No API key configured for profile '{profile}'")]
    #[diagnostic(
        code(rekon::no_credentials),
        help(
            "Store one with: rekon config init --device-url <URL> --key <KEY> --keyring\n\
             Or set the REKON_API_KEY environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Device API ───────────────────────────────────────────────────
    #[error("{resource} '{id}' not found on the device")]
    #[diagnostic(code(rekon::not_found))]
    NotFound { resource: String, id: String },

    #[error("Device rejected the request: {message}")]
    #[diagnostic(code(rekon::api_error))]
    Api { message: String },

    // ── Schema & reconciliation ──────────────────────────────────────
    #[error("Unknown resource '{name}'")]
    #[diagnostic(
        code(rekon::unknown_resource),
        help("Run: rekon schema list to see the resources in the loaded schema")
    )]
    UnknownResource { name: String },

    #[error("No schema configured")]
    #[diagnostic(
        code(rekon::no_schema),
        help("Pass --schema <FILE>, set REKON_SCHEMA, or add `schema` to the profile.")
    )]
    NoSchema,

    #[error("{message}")]
    #[diagnostic(code(rekon::schema))]
    Schema { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(rekon::reconcile),
        help("Run: rekon schema show <resource> to see the declared field types")
    )]
    Reconcile { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rekon::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(rekon::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: rekon config init --name {name} --device-url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device profile configured")]
    #[diagnostic(
        code(rekon::no_config),
        help(
            "Create one with: rekon config init --device-url <URL>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' already exists")]
    #[diagnostic(code(rekon::profile_exists), help("Pass --force to replace it."))]
    ProfileExists { name: String },

    #[error(transparent)]
    #[diagnostic(code(rekon::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(rekon::confirmation_required),
        help("Use --yes (-y) to confirm.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error("Cannot access {}", path.display())]
    #[diagnostic(code(rekon::io))]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {origin}: {source}")]
    #[diagnostic(code(rekon::json), help("Check the file contents and try again."))]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot render output: {0}")]
    #[diagnostic(code(rekon::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::UnknownResource { .. } | Self::NoSchema | Self::Schema { .. } => {
                exit_code::SCHEMA
            }
            Self::Reconcile { .. } => exit_code::RECONCILE,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::ProfileExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<rekon_api::Error> for CliError {
    fn from(err: rekon_api::Error) -> Self {
        match err {
            rekon_api::Error::Authentication { message } => Self::AuthFailed { message },
            rekon_api::Error::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            rekon_api::Error::NotFound { path } => Self::NotFound {
                resource: "object".into(),
                id: path,
            },
            rekon_api::Error::InvalidUrl(e) => Self::Validation {
                field: "url".into(),
                reason: e.to_string(),
            },
            e @ (rekon_api::Error::Transport(_) | rekon_api::Error::Tls(_)) => {
                Self::ConnectionFailed { source: e }
            }
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport(e) => e.into(),
            CoreError::UnknownResource { name } => Self::UnknownResource { name },
            CoreError::Io { path, source } => Self::File { path, source },
            CoreError::InvalidVersion { raw, reason } => Self::Validation {
                field: "api-version".into(),
                reason: format!("'{raw}': {reason}"),
            },
            e @ CoreError::Schema { .. } => Self::Schema {
                message: e.to_string(),
            },
            e => Self::Reconcile {
                message: e.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
