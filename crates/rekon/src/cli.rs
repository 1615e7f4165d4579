//! Clap derive structures for the `rekon` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only clap types are used here so the build script can include this file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rekon -- reconcile desired state with device configuration objects
#[derive(Debug, Parser)]
#[command(
    name = "rekon",
    version,
    about = "Reconcile desired-state files with device configuration APIs",
    long_about = "Converts between desired-state trees and device wire objects.\n\n\
        Offline commands (flatten, expand, plan) work on files and a schema.\n\
        Online commands (read, apply, delete) talk to the device in the active profile.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "REKON_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "REKON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Device base URL (overrides profile)
    #[arg(long, short = 'u', env = "REKON_URL", global = true)]
    pub url: Option<String>,

    /// Administrative scope sent with every request
    #[arg(long, env = "REKON_SCOPE", global = true)]
    pub scope: Option<String>,

    /// Device API key
    #[arg(long, env = "REKON_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Schema document (YAML or JSON)
    #[arg(long, short = 's', env = "REKON_SCHEMA", global = true)]
    pub schema: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "REKON_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation for destructive operations
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "REKON_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "REKON_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrderArg {
    /// Plain string / numeric order
    Lexicographic,
    /// Digit runs compare numerically (port2 < port10)
    Natural,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a wire object file into a state tree
    Flatten(FlattenArgs),

    /// Convert a state file into the wire object a write would send
    Expand(ExpandArgs),

    /// Show the per-field decisions for a state file against a prior state
    Plan(ExpandArgs),

    /// Read an object from the device as a state tree
    Read(ReadArgs),

    /// Create or update an object on the device from a state file
    Apply(ApplyArgs),

    /// Delete an object from the device
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Inspect the loaded schema
    Schema(SchemaArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared engine arguments ──────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Resource name from the schema
    #[arg(long, short = 'r')]
    pub resource: String,

    /// Device API version (overrides the profile pin and the device probe)
    #[arg(long)]
    pub api_version: Option<String>,

    /// Import top-level tables even if the prior state never set them
    #[arg(long)]
    pub import_all: bool,

    /// Ordering of set-of-object rows
    #[arg(long)]
    pub sort_order: Option<SortOrderArg>,
}

// ── Offline commands ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FlattenArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Wire object JSON file ("-" for stdin)
    #[arg(long, short = 'w')]
    pub wire: PathBuf,

    /// Prior state JSON file
    #[arg(long)]
    pub prior: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExpandArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Desired state JSON file ("-" for stdin)
    #[arg(long, short = 'f')]
    pub state: PathBuf,

    /// Prior state JSON file
    #[arg(long)]
    pub prior: Option<PathBuf>,
}

// ── Online commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Object identifier on the device
    pub id: String,

    /// Prior state JSON file (controls which tables are imported)
    #[arg(long)]
    pub prior: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Desired state JSON file ("-" for stdin)
    #[arg(long, short = 'f')]
    pub state: PathBuf,

    /// Update this object instead of creating one
    #[arg(long)]
    pub id: Option<String>,

    /// Prior state JSON file (defaults to the object's current values for
    /// the fields the state mentions)
    #[arg(long, requires = "id")]
    pub prior: Option<PathBuf>,

    /// Write the resulting state to this file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Resource name from the schema
    #[arg(long, short = 'r')]
    pub resource: String,

    /// Object identifier on the device
    pub id: String,
}

// ── Schema ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// List resources
    #[command(alias = "ls")]
    List,

    /// Show the field descriptors of a resource
    Show {
        /// Resource name
        resource: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the resolved configuration (secrets redacted)
    Show,

    /// List profiles
    Profiles,

    /// Create or replace a profile
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Device base URL
    #[arg(long = "device-url")]
    pub device_url: String,

    /// Administrative scope
    #[arg(long = "device-scope")]
    pub device_scope: Option<String>,

    /// API key to store
    #[arg(long = "key")]
    pub key: Option<String>,

    /// Store the API key in the system keyring instead of the file
    #[arg(long, requires = "key")]
    pub keyring: bool,

    /// Environment variable holding the API key
    #[arg(long)]
    pub key_env: Option<String>,

    /// Pin the device API version
    #[arg(long = "pin-version")]
    pub pin_version: Option<String>,

    /// Schema document for this profile
    #[arg(long = "profile-schema")]
    pub profile_schema: Option<PathBuf>,

    /// Make this the default profile
    #[arg(long)]
    pub set_default: bool,

    /// Replace an existing profile of the same name
    #[arg(long)]
    pub force: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
