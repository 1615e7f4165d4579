//! CLI configuration: thin layer over `rekon_config`.
//!
//! Resolves the config file, active profile, schema path, and engine
//! options, letting `GlobalOpts` flags override profile values.

use std::path::PathBuf;
use std::time::Duration;

use rekon_api::TlsMode;
use rekon_config::{Config, ConfigError, DeviceSettings, Profile};
use rekon_core::{ApiVersion, EngineOptions, Schema, SortOrder};
use secrecy::SecretString;

use crate::cli::{EngineArgs, GlobalOpts, SortOrderArg};
use crate::error::CliError;

/// Config file honoured by this invocation.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(rekon_config::config_path)
}

/// Load the config file; a missing file yields the defaults.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(rekon_config::load_config(&config_file(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// The active profile, if the config has one.
///
/// Naming a profile explicitly that does not exist is an error; a missing
/// default profile is not.
pub fn active_profile<'c>(
    global: &GlobalOpts,
    config: &'c Config,
) -> Result<Option<(String, &'c Profile)>, CliError> {
    match config.profile(global.profile.as_deref()) {
        Ok((name, profile)) => Ok(Some((name.to_owned(), profile))),
        Err(ConfigError::UnknownProfile { name }) if global.profile.is_some() => {
            Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(config),
            })
        }
        Err(ConfigError::UnknownProfile { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

// ── Schema ───────────────────────────────────────────────────────────

/// Load the schema: `--schema`, then the profile, then `[defaults]`.
pub fn load_schema(global: &GlobalOpts, config: &Config) -> Result<Schema, CliError> {
    let from_profile = active_profile(global, config)?.and_then(|(_, p)| p.schema.clone());
    let path = global
        .schema
        .clone()
        .or(from_profile)
        .or_else(|| config.defaults.schema.clone())
        .ok_or(CliError::NoSchema)?;
    Ok(Schema::load(&path)?)
}

// ── Engine options ───────────────────────────────────────────────────

/// Engine options of the active profile, or the defaults without one.
pub fn profile_engine_options(
    global: &GlobalOpts,
    config: &Config,
) -> Result<EngineOptions, CliError> {
    match active_profile(global, config)? {
        Some((_, profile)) => Ok(rekon_config::engine_options(profile)?),
        None => Ok(EngineOptions::default()),
    }
}

/// Profile engine options overlaid with per-command flags.
pub fn engine_options(
    args: &EngineArgs,
    global: &GlobalOpts,
    config: &Config,
) -> Result<EngineOptions, CliError> {
    let mut options = profile_engine_options(global, config)?;
    if let Some(raw) = &args.api_version {
        options.pinned_version = Some(ApiVersion::parse(raw)?);
    }
    if args.import_all {
        options.import_all = true;
    }
    if let Some(order) = args.sort_order {
        options.sort_order = sort_order(order);
    }
    Ok(options)
}

/// API version for commands that never reach a device.
pub fn offline_version(options: &EngineOptions) -> Result<ApiVersion, CliError> {
    options
        .pinned_version
        .clone()
        .ok_or_else(|| CliError::Validation {
            field: "api-version".into(),
            reason: "offline commands need --api-version or a profile api_version".into(),
        })
}

fn sort_order(arg: SortOrderArg) -> SortOrder {
    match arg {
        SortOrderArg::Lexicographic => SortOrder::Lexicographic,
        SortOrderArg::Natural => SortOrder::Natural,
    }
}

// ── Device settings ──────────────────────────────────────────────────

/// Settings for talking to the device, with flag overrides applied.
///
/// Without a profile, `--url` and `--api-key` alone are enough.
pub fn device_settings(
    global: &GlobalOpts,
    config: &Config,
    engine: EngineOptions,
) -> Result<DeviceSettings, CliError> {
    let (name, profile) = match active_profile(global, config)? {
        Some((name, profile)) => (name, overlay(profile, global)),
        None => {
            let url = global.url.clone().ok_or_else(|| CliError::NoConfig {
                path: config_file(global).display().to_string(),
            })?;
            let profile = Profile {
                url,
                scope: global.scope.clone(),
                api_key: global.api_key.clone(),
                ..Profile::default()
            };
            (active_profile_name(global, config), profile)
        }
    };

    let mut settings = rekon_config::profile_to_device_settings(&profile, &name, &config.defaults)?;
    if let Some(key) = &global.api_key {
        settings.api_key = SecretString::from(key.clone());
    }
    settings.engine = engine;
    if global.insecure {
        settings.transport.tls = TlsMode::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        settings.transport.timeout = Duration::from_secs(secs);
    }
    Ok(settings)
}

/// A copy of the profile with the URL, scope and key flags applied.
fn overlay(profile: &Profile, global: &GlobalOpts) -> Profile {
    Profile {
        url: global.url.clone().unwrap_or_else(|| profile.url.clone()),
        scope: global.scope.clone().or_else(|| profile.scope.clone()),
        api_key: global.api_key.clone().or_else(|| profile.api_key.clone()),
        api_key_env: profile.api_key_env.clone(),
        api_version: profile.api_version.clone(),
        import_all: profile.import_all,
        sort_order: profile.sort_order,
        schema: profile.schema.clone(),
        ca_cert: profile.ca_cert.clone(),
        insecure: profile.insecure,
        timeout: profile.timeout,
    }
}
