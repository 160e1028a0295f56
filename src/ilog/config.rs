use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

include!(concat!(env!("OUT_DIR"), "/ilog_env_allowlist.rs"));

const ENV_PREFIX: &str = "ILOG_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub parallel: usize,
    pub all: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            parallel: 4,
            all: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IlogConfig {
    pub import: ImportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialIlogConfig {
    import: Option<ImportConfig>,
    logging: Option<LoggingConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &IlogConfig) -> Result<()> {
    if cfg.import.parallel == 0 {
        return Err(anyhow!("invalid import parallelism: must be >= 1"));
    }
    if cfg.logging.filter.trim().is_empty() {
        return Err(anyhow!("invalid log filter: cannot be empty"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("ILOG_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let base = dirs::config_dir()?;
    Some(base.join("irclogtools").join("config.toml"))
}

fn merge_toml(base: &mut IlogConfig, raw: &str) -> Result<()> {
    let parsed: PartialIlogConfig = toml::from_str(raw)?;
    if let Some(import) = parsed.import {
        base.import = import;
    }
    if let Some(logging) = parsed.logging {
        base.logging = logging;
    }
    Ok(())
}

fn merge_file_config(base: &mut IlogConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))
}

/// `ILOG_*` variables set in the environment that nothing reads.
pub fn unknown_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = keys
        .into_iter()
        .filter(|key| key.starts_with(ENV_PREFIX))
        .filter(|key| !GENERATED_ILOG_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}

pub fn load_config() -> Result<IlogConfig> {
    let mut cfg = IlogConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.import.parallel = env_or_usize("ILOG_IMPORT_PARALLEL", cfg.import.parallel);
    cfg.import.all = env_or_bool("ILOG_IMPORT_ALL", cfg.import.all);
    cfg.logging.filter = env_or_string("ILOG_LOG", &cfg.logging.filter);

    validate(&cfg)?;
    Ok(cfg)
}

pub fn warn_unknown_env_vars() {
    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        warn!(key = %key, "ignoring unknown ILOG environment variable");
    }
}
