//! YAML configuration loading.
//!
//! The config document carries a `monitor_config` block with global settings
//! and a `monitor_targets` list. Malformed target entries are skipped with an
//! error log; they never stop the process from starting.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::target::{resolve_endpoint, ProbeKind, Target};

/// Configuration errors, all fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid duration in '{field}': {reason}")]
    Duration { field: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    monitor_config: RawMonitorConfig,
    #[serde(default)]
    monitor_targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawMonitorConfig {
    api_timeout: String,
    api_probe_interval: String,
    current_env: String,
    #[serde(default)]
    default_region: String,
    metrics_port: u16,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default)]
    name: String,
    url: String,
    #[serde(default)]
    protocol: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: String,
}

/// Parsed configuration consumed by the rest of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_timeout: Duration,
    pub probe_interval: Duration,
    pub environment: String,
    pub metrics_port: u16,
    pub targets: Vec<Target>,
}

/// Parse a YAML config document.
pub fn parse(text: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;

    let api_timeout = parse_duration("api_timeout", &raw.monitor_config.api_timeout)?;
    let probe_interval =
        parse_duration("api_probe_interval", &raw.monitor_config.api_probe_interval)?;

    let default_region = raw.monitor_config.default_region;
    let mut seen_names = HashSet::new();
    let mut targets = Vec::with_capacity(raw.monitor_targets.len());

    for (i, entry) in raw.monitor_targets.into_iter().enumerate() {
        let name = if !entry.name.is_empty() {
            entry.name.clone()
        } else if !entry.description.is_empty() {
            entry.description.clone()
        } else {
            format!("target_yaml_{}", i + 1)
        };

        // The name keys the metric series; a duplicate would silently
        // overwrite another target's gauges.
        if !seen_names.insert(name.clone()) {
            tracing::error!("Duplicate target name '{}'. Skipping this target.", name);
            continue;
        }

        let protocol = if entry.protocol.is_empty() {
            "https".to_string()
        } else {
            entry.protocol.to_ascii_lowercase()
        };

        let (url, kind) = match protocol.as_str() {
            "tls" => {
                // Validated now so a bad host string fails at load time, not
                // on every probe cycle.
                if let Err(e) = resolve_endpoint(&entry.url) {
                    tracing::error!("{}. Skipping target '{}'.", e, name);
                    continue;
                }
                (entry.url, ProbeKind::TlsCertificate)
            }
            "http" | "https" => {
                let full_url = if entry.url.starts_with("http://")
                    || entry.url.starts_with("https://")
                {
                    entry.url
                } else {
                    format!("{}://{}", protocol, entry.url)
                };
                match Url::parse(&full_url) {
                    Ok(parsed) if parsed.host_str().is_some() => {}
                    _ => {
                        tracing::error!(
                            "Invalid URL '{}' for target '{}'. Skipping this target.",
                            full_url,
                            name
                        );
                        continue;
                    }
                }
                let kind = if entry.method.eq_ignore_ascii_case("post") {
                    ProbeKind::HttpPost {
                        headers: entry.headers,
                        body: entry.body,
                    }
                } else {
                    ProbeKind::HttpGet
                };
                (full_url, kind)
            }
            other => {
                tracing::error!(
                    "Unknown protocol '{}' for target '{}'. Skipping this target.",
                    other,
                    name
                );
                continue;
            }
        };

        let region = if entry.region.is_empty() {
            default_region.clone()
        } else {
            entry.region
        };

        targets.push(Target {
            name,
            url,
            kind,
            region,
        });
    }

    Ok(Config {
        api_timeout,
        probe_interval,
        environment: raw.monitor_config.current_env,
        metrics_port: raw.monitor_config.metrics_port,
        targets,
    })
}

/// Load and parse the config file at `path`.
///
/// A path without an extension gets `.yaml` appended.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let path = if path.extension().is_none() {
        path.with_extension("yaml")
    } else {
        path.to_path_buf()
    };

    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    parse(&text)
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Duration {
        field: field.to_string(),
        reason: e.to_string(),
    })
}
