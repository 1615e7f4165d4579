//! Config command handlers. Never touch a device.

use rekon_config::{Config, Profile};
use rekon_core::ApiVersion;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_file(global).display());
            Ok(())
        }
        ConfigCommand::Show => show(global),
        ConfigCommand::Profiles => profiles(global),
        ConfigCommand::Init(init_args) => init(init_args, global),
    }
}

// ── show ─────────────────────────────────────────────────────────────

fn show(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(REDACTED.into());
        }
    }

    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))?
        }
        _ => output::render_single(&global.output, &cfg, |_| String::new(), |_| String::new())?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── profiles ─────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Tabled)]
struct ProfileSummary {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "API version")]
    api_version: String,
    #[tabled(rename = "Default")]
    default: bool,
}

fn profiles(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut rows: Vec<ProfileSummary> = cfg
        .profiles
        .iter()
        .map(|(name, p)| ProfileSummary {
            name: name.clone(),
            url: p.url.clone(),
            scope: p.scope.clone().unwrap_or_default(),
            api_version: p.api_version.clone().unwrap_or_else(|| "probe".into()),
            default: cfg.default_profile.as_deref() == Some(name.as_str()),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let out = output::render_list(
        &global.output,
        &rows,
        ProfileSummary::clone,
        |r| r.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── init ─────────────────────────────────────────────────────────────

fn init(args: InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);
    let mut cfg = config::load(global)?;

    if cfg.profiles.contains_key(&args.name) && !args.force {
        return Err(CliError::ProfileExists { name: args.name });
    }
    url::Url::parse(&args.device_url).map_err(|e| CliError::Validation {
        field: "device-url".into(),
        reason: e.to_string(),
    })?;
    if let Some(raw) = &args.pin_version {
        ApiVersion::parse(raw)?;
    }

    let api_key = match (args.key, args.keyring) {
        (Some(key), true) => {
            rekon_config::store_api_key(&args.name, &key)?;
            None
        }
        (key, _) => key,
    };

    let profile = Profile {
        url: args.device_url,
        scope: args.device_scope,
        api_key,
        api_key_env: args.key_env,
        api_version: args.pin_version,
        schema: args.profile_schema,
        ..Profile::default()
    };
    cfg.profiles.insert(args.name.clone(), profile);
    if args.set_default || !has_default(&cfg) {
        cfg.default_profile = Some(args.name.clone());
    }

    rekon_config::save_config(&cfg, &path)?;
    if !global.quiet {
        eprintln!("Saved profile '{}' to {}", args.name, path.display());
    }
    Ok(())
}

fn has_default(cfg: &Config) -> bool {
    cfg.default_profile
        .as_ref()
        .is_some_and(|name| cfg.profiles.contains_key(name))
}
