use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TICKLER_CONFIG_PATH";

pub const DEFAULT_ALARM_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SUMMARY_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_LOG_FILTER: &str = "tickler=warn";

#[derive(Debug, Clone)]
pub struct Palette {
    pub accent: &'static str,
    pub muted: &'static str,
    pub reset: &'static str,
}

impl Palette {
    /// Highlight used for overdue due dates.
    pub fn accentize(&self, text: &str) -> String {
        if self.accent.is_empty() {
            text.to_string()
        } else {
            format!("{}{}{}", self.accent, text, self.reset)
        }
    }

    /// Dimmed style used for completed tasks.
    pub fn mutedize(&self, text: &str) -> String {
        if self.muted.is_empty() {
            text.to_string()
        } else {
            format!("{}{}{}", self.muted, text, self.reset)
        }
    }
}

pub fn palette_for_theme(theme: Option<&str>) -> Palette {
    match theme.and_then(canonical_theme_name).as_deref() {
        Some("noir") => Palette {
            accent: "\x1b[38;5;203m",
            muted: "\x1b[38;5;244m",
            reset: "\x1b[0m",
        },
        Some("solarized") => Palette {
            accent: "\x1b[38;5;160m",
            muted: "\x1b[38;5;246m",
            reset: "\x1b[0m",
        },
        _ => Palette {
            accent: "",
            muted: "",
            reset: "",
        },
    }
}

/// Lowercases and collapses separators, so `Dark-Mode` and `dark_mode` agree.
pub fn canonical_key(raw: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn canonical_theme_name(raw: &str) -> Option<String> {
    let Some(name) = canonical_key(raw) else {
        return Some("default".into());
    };

    match name.as_str() {
        "vanilla" | "light" => Some("default".to_string()),
        "dark" | "dark_mode" | "darkmode" => Some("noir".to_string()),
        _ => Some(name),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub alarm_interval_secs: Option<u64>,
    #[serde(default)]
    pub summary_interval_secs: Option<u64>,
    #[serde(default)]
    pub alarm_dedup: Option<bool>,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Config {
    pub fn alarm_interval(&self) -> Duration {
        interval_or(self.alarm_interval_secs, DEFAULT_ALARM_INTERVAL_SECS)
    }

    pub fn summary_interval(&self) -> Duration {
        interval_or(self.summary_interval_secs, DEFAULT_SUMMARY_INTERVAL_SECS)
    }

    pub fn alarm_dedup(&self) -> bool {
        self.alarm_dedup.unwrap_or(true)
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter
            .as_deref()
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn palette(&self) -> Palette {
        palette_for_theme(self.theme.as_deref())
    }
}

fn interval_or(value: Option<u64>, default_secs: u64) -> Duration {
    Duration::from_secs(value.filter(|secs| *secs > 0).unwrap_or(default_secs))
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub theme: Option<String>,
    pub alarm_interval_secs: Option<u64>,
    pub summary_interval_secs: Option<u64>,
    pub alarm_dedup: Option<bool>,
    pub log_filter: Option<String>,
}

impl ConfigOverrides {
    /// Records one `key=value` pair; keys are canonicalised first.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        let field = canonical_key(key)
            .ok_or_else(|| AppError::invalid_input("override key cannot be empty"))?;
        let value = value.trim();

        match field.as_str() {
            "theme" => self.theme = Some(value.to_string()),
            "alarm_interval_secs" => self.alarm_interval_secs = Some(parse_seconds(&field, value)?),
            "summary_interval_secs" => {
                self.summary_interval_secs = Some(parse_seconds(&field, value)?)
            }
            "alarm_dedup" => self.alarm_dedup = Some(parse_flag(&field, value)?),
            "log_filter" => self.log_filter = Some(value.to_string()),
            other => {
                return Err(AppError::invalid_input(format!(
                    "unknown config field '{other}'"
                )));
            }
        }
        Ok(())
    }
}

fn parse_seconds(field: &str, value: &str) -> Result<u64, AppError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(AppError::invalid_input(format!(
            "{field} must be a positive number of seconds"
        ))),
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(AppError::invalid_input(format!(
            "{field} must be true or false"
        ))),
    }
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("tickler")
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tickler")
            .join(CONFIG_FILE_NAME))
    }
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let mut config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    config.theme = config.theme.and_then(|name| canonical_theme_name(&name));
    Ok(config)
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(theme) = overrides.theme.as_deref() {
        merged.theme = canonical_theme_name(theme);
    }
    if overrides.alarm_interval_secs.is_some() {
        merged.alarm_interval_secs = overrides.alarm_interval_secs;
    }
    if overrides.summary_interval_secs.is_some() {
        merged.summary_interval_secs = overrides.summary_interval_secs;
    }
    if overrides.alarm_dedup.is_some() {
        merged.alarm_dedup = overrides.alarm_dedup;
    }
    if overrides.log_filter.is_some() {
        merged.log_filter = overrides.log_filter.clone();
    }
    merged
}
