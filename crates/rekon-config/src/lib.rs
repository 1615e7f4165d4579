//! Configuration for the rekon CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation into the settings the transport and engine need. The CLI
//! layers its flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use rekon_api::{TlsMode, TransportConfig};
use rekon_core::{ApiVersion, EngineOptions, SortOrder};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const KEYRING_SERVICE: &str = "rekon";
const ENV_PREFIX: &str = "REKON_";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("cannot encode config as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot load config: {0}")]
    Load(Box<figment::Error>),

    #[error("cannot write config: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

// ── File model ──────────────────────────────────────────────────────

/// The whole config file. Profiles are kept sorted so saved files diff
/// cleanly.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

/// Values a profile inherits when it does not set them.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub insecure: bool,
    pub timeout: u64,
    /// Schema document used when a profile does not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            schema: None,
        }
    }
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Device base URL, e.g. `https://10.0.0.1`.
    pub url: String,

    /// Administrative scope passed as `?scope=` (e.g. a VDOM name).
    pub scope: Option<String>,

    /// Plaintext API key; the keyring or `api_key_env` is preferred.
    pub api_key: Option<String>,

    /// Name of an environment variable holding the API key.
    pub api_key_env: Option<String>,

    /// Assume this API version instead of asking the device.
    pub api_version: Option<String>,

    /// Import top-level tables the prior state never referenced.
    #[serde(default)]
    pub import_all: bool,

    #[serde(default)]
    pub sort_order: SortOrder,

    pub schema: Option<PathBuf>,

    /// PEM bundle to trust instead of the system roots.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,

    pub timeout: Option<u64>,
}

/// Everything needed to talk to one device.
#[derive(Debug)]
pub struct DeviceSettings {
    pub url: Url,
    pub api_key: SecretString,
    pub scope: Option<String>,
    pub transport: TransportConfig,
    pub engine: EngineOptions,
    pub schema: Option<PathBuf>,
}

// ── Load / save ─────────────────────────────────────────────────────

/// Platform config file, e.g. `~/.config/rekon/config.toml` on Linux.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "rekon", "rekon").map_or_else(
        || PathBuf::from("rekon.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Load `path` over the built-in defaults. A missing file is not an
/// error. Environment variables such as `REKON_DEFAULTS__TIMEOUT=10`
/// override file values.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(ConfigError::from)
}

/// Write `cfg` as TOML, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    debug!(path = %path.display(), profiles = cfg.profiles.len(), "saved config");
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> keyring::Result<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

/// Resolve an API key: profile env var, then keyring, then plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    profile
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .or_else(|| keyring_entry(profile_name).ok()?.get_password().ok())
        .or_else(|| profile.api_key.clone())
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Store an API key in the system keyring for `profile_name`.
pub fn store_api_key(profile_name: &str, api_key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.set_password(api_key))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Profile translation ─────────────────────────────────────────────

/// Engine options from a profile (no credentials needed).
pub fn engine_options(profile: &Profile) -> Result<EngineOptions, ConfigError> {
    let pinned_version = profile
        .api_version
        .as_deref()
        .map(ApiVersion::parse)
        .transpose()
        .map_err(|e| ConfigError::Validation {
            field: "api_version".into(),
            reason: e.to_string(),
        })?;
    Ok(EngineOptions {
        import_all: profile.import_all,
        sort_order: profile.sort_order,
        pinned_version,
    })
}

/// Build `DeviceSettings` from a profile. No CLI flag overrides.
pub fn profile_to_device_settings(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceSettings, ConfigError> {
    let url = Url::parse(&profile.url).map_err(|e| ConfigError::Validation {
        field: "url".into(),
        reason: format!("'{}': {e}", profile.url),
    })?;

    let tls = match (profile.insecure.unwrap_or(defaults.insecure), &profile.ca_cert) {
        (true, _) => TlsMode::DangerAcceptInvalid,
        (false, Some(ca)) => TlsMode::CustomCa(ca.clone()),
        (false, None) => TlsMode::System,
    };

    Ok(DeviceSettings {
        url,
        api_key: resolve_api_key(profile, profile_name)?,
        scope: profile.scope.clone(),
        transport: TransportConfig {
            tls,
            timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        },
        engine: engine_options(profile)?,
        schema: profile.schema.clone().or_else(|| defaults.schema.clone()),
    })
}
