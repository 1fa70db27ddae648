use anyhow::{Context, Result};
use eigenface_core::RegistryConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// CLI configuration: an optional TOML file, overridden by `EIGENFACE_*`
/// environment variables, overridden in turn by command-line flags.
pub struct Config {
    pub registry: RegistryConfig,
}

impl Config {
    /// Load from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut registry = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                parse_toml(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => RegistryConfig::default(),
        };
        apply_env(&mut registry, |key| std::env::var(key).ok());
        Ok(Self { registry })
    }
}

/// Parse a registry configuration; absent keys keep their defaults.
pub fn parse_toml(text: &str) -> Result<RegistryConfig> {
    Ok(toml::from_str(text)?)
}

/// Apply `EIGENFACE_*` overrides. Unparsable values are logged and ignored.
pub fn apply_env(config: &mut RegistryConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env_parse(&lookup, "EIGENFACE_GROUP_SIZE") {
        config.group_size = v;
    }
    if let Some(v) = env_parse(&lookup, "EIGENFACE_COMPONENTS") {
        config.components = Some(v);
    }
    if let Some(v) = env_parse(&lookup, "EIGENFACE_THRESHOLD") {
        config.threshold = Some(v);
    }
    if let Some(v) = env_parse(&lookup, "EIGENFACE_METRIC") {
        config.metric = v;
    }
    if let Some(v) = lookup("EIGENFACE_CACHE_DIR") {
        config.cache_dir = Some(PathBuf::from(v));
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
