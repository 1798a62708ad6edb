//! YAML configuration for a download run.
//!
//! The file is read once at start-up and parsed as YAML. `${VAR}` /
//! `${VAR|default}` references inside string values are then resolved against
//! the environment, so comments never need a variable and substituted text is
//! never parsed as YAML. The result is validated before any network activity.
//! Components receive the parts they need at construction.

use regex::{Captures, Regex};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;
use crate::http::compose_base_url;
use crate::rooms::{Horizontal, Vertical};

pub const MAX_CONCURRENCY_LIMIT: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default)]
    pub api_prefix: String,
    #[serde(default = "default_true")]
    pub api_secure: bool,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub api_username: Option<String>,
    #[serde(default)]
    pub api_password: Option<String>,

    pub map_shard: String,
    pub map_description: String,
    #[serde(default)]
    pub map_size_x: Option<[u32; 2]>,
    #[serde(default)]
    pub map_size_y: Option<[u32; 2]>,
    #[serde(default = "default_map_dx")]
    pub map_dx: Vec<Horizontal>,
    #[serde(default = "default_map_dy")]
    pub map_dy: Vec<Vertical>,
    #[serde(default = "default_room_status")]
    pub room_status: String,

    #[serde(default)]
    pub progress_bar: bool,
    #[serde(default)]
    pub save_results_filename: Option<PathBuf>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,
}

fn default_api_host() -> String {
    "screeps.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_map_dx() -> Vec<Horizontal> {
    vec![Horizontal::W, Horizontal::E]
}

fn default_map_dy() -> Vec<Vertical> {
    vec![Vertical::N, Vertical::S]
}

fn default_room_status() -> String {
    "normal".to_string()
}

fn default_max_concurrency() -> usize {
    8
}

fn default_dispatch_interval_ms() -> u64 {
    1_000
}

fn default_request_pause_ms() -> u64 {
    300
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn trim_to_option(value: Option<&String>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_reference_pattern() -> &'static Regex {
    static ENV_REFERENCE: OnceLock<Regex> = OnceLock::new();
    ENV_REFERENCE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?:\|([^}]*))?\}")
            .expect("env reference pattern is a valid regex")
    })
}

/// Replaces `${NAME}` and `${NAME|default}` with values from `lookup`.
pub fn interpolate_env(
    text: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut missing: Option<String> = None;
    let replaced = env_reference_pattern().replace_all(text, |captures: &Captures| {
        let name = &captures[1];
        match (lookup(name), captures.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnv(name)),
        None => Ok(replaced.into_owned()),
    }
}

/// Resolves references in every string scalar of a parsed document. Mapping
/// keys and non-string scalars are left alone.
pub fn interpolate_yaml(
    value: Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Value, ConfigError> {
    Ok(match value {
        Value::String(text) => Value::String(interpolate_env(&text, lookup)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| interpolate_yaml(item, lookup))
                .collect::<Result<_, _>>()?,
        ),
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(key, item)| Ok((key, interpolate_yaml(item, lookup)?)))
                .collect::<Result<_, ConfigError>>()?,
        ),
        Value::Tagged(mut tagged) => {
            tagged.value = interpolate_yaml(tagged.value, lookup)?;
            Value::Tagged(tagged)
        }
        other => other,
    })
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_str_with(text, &|name: &str| std::env::var(name).ok())
    }

    fn from_yaml_str_with(
        text: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let document: Value = serde_yaml::from_str(text)?;
        let config: Config = serde_yaml::from_value(interpolate_yaml(document, lookup)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_host.trim().is_empty() {
            return Err(ConfigError::invalid("api_host", "must not be empty"));
        }
        if self.map_shard.trim().is_empty() {
            return Err(ConfigError::invalid("map_shard", "must not be empty"));
        }
        if self.map_description.trim().is_empty() {
            return Err(ConfigError::invalid("map_description", "must not be empty"));
        }

        match (self.map_size_x, self.map_size_y) {
            (Some([min_x, max_x]), Some([min_y, max_y])) => {
                if min_x > max_x {
                    return Err(ConfigError::invalid(
                        "map_size_x",
                        format!("min {} is greater than max {}", min_x, max_x),
                    ));
                }
                if min_y > max_y {
                    return Err(ConfigError::invalid(
                        "map_size_y",
                        format!("min {} is greater than max {}", min_y, max_y),
                    ));
                }
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(ConfigError::invalid("map_size_y", "required when map_size_x is set"))
            }
            (None, Some(_)) => {
                return Err(ConfigError::invalid("map_size_x", "required when map_size_y is set"))
            }
        }

        if self.map_dx.is_empty() {
            return Err(ConfigError::invalid("map_dx", "must list at least one of W, E"));
        }
        if self.map_dy.is_empty() {
            return Err(ConfigError::invalid("map_dy", "must list at least one of N, S"));
        }
        if self.map_dx.iter().collect::<HashSet<_>>().len() != self.map_dx.len() {
            return Err(ConfigError::invalid("map_dx", "contains duplicates"));
        }
        if self.map_dy.iter().collect::<HashSet<_>>().len() != self.map_dy.len() {
            return Err(ConfigError::invalid("map_dy", "contains duplicates"));
        }

        if self.room_status.trim().is_empty() {
            return Err(ConfigError::invalid("room_status", "must not be empty"));
        }

        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            return Err(ConfigError::invalid(
                "max_concurrency",
                format!("must be between 1 and {}", MAX_CONCURRENCY_LIMIT),
            ));
        }

        let has_password = trim_to_option(self.api_password.as_ref()).is_some();
        let has_username = trim_to_option(self.api_username.as_ref()).is_some();
        if has_password && !has_username {
            return Err(ConfigError::invalid("api_username", "required when api_password is set"));
        }

        Ok(())
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: compose_base_url(&self.api_host, &self.api_prefix, self.api_secure),
            token: trim_to_option(self.api_token.as_ref()),
            username: trim_to_option(self.api_username.as_ref()),
            password: trim_to_option(self.api_password.as_ref()),
        }
    }

    /// Direction pairs as the cartesian product of `map_dx` and `map_dy`.
    pub fn directions(&self) -> Vec<(Horizontal, Vertical)> {
        self.map_dx
            .iter()
            .flat_map(|&dx| self.map_dy.iter().map(move |&dy| (dx, dy)))
            .collect()
    }

    /// Half-open coordinate ranges from the inclusive `map_size_*` bounds, or
    /// `None` when the world size should be queried instead.
    pub fn coordinate_ranges(&self) -> Option<(Range<u32>, Range<u32>)> {
        let [min_x, max_x] = self.map_size_x?;
        let [min_y, max_y] = self.map_size_y?;
        Some((min_x..max_x.saturating_add(1), min_y..max_y.saturating_add(1)))
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn request_pause(&self) -> Duration {
        Duration::from_millis(self.request_pause_ms)
    }

    pub fn log_redacted(&self) {
        let settings = self.api_settings();
        info!(
            server = %settings.base_url,
            shard = %self.map_shard,
            token = if settings.token.is_some() { "[set]" } else { "[unset]" },
            username = settings.username.as_deref().unwrap_or("-"),
            max_concurrency = self.max_concurrency,
            dispatch_interval_ms = self.dispatch_interval_ms,
            "Loaded config"
        );
    }
}
