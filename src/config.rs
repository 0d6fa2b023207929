//! Bot configuration
//!
//! Settings are read once at startup from an optional YAML file, then selected
//! keys can be overridden from the environment. The result is immutable and is
//! handed to the components that need it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_PATH_VAR: &str = "RULES_WARDEN_CONFIG";
/// Config file used when `RULES_WARDEN_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "config/bot_config.yaml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Thresholds driving the rule engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Minutes after posting before the author is warned
    pub minutes_to_warn: u32,
    /// Minutes after posting before the submission is removed
    pub minutes_to_remove: u32,
    /// Distinct commenters that keep a submission the author ignored
    pub min_unique_commenters_to_keep: usize,
    /// Older submissions are left alone
    pub oldest_submission_age_to_process: u32,
    /// Newest submissions fetched per scan
    pub max_submissions_to_process: usize,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            minutes_to_warn: 5,
            minutes_to_remove: 60,
            min_unique_commenters_to_keep: 10,
            oldest_submission_age_to_process: 90,
            max_submissions_to_process: 25,
        }
    }
}

/// Which already-handled submissions are excluded from rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityPolicy {
    /// Skip submissions a moderator already approved
    pub skip_approved: bool,
    /// Skip distinguished submissions
    pub skip_distinguished: bool,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            skip_approved: true,
            skip_distinguished: true,
        }
    }
}

/// Locations of the message templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePaths {
    pub warning: PathBuf,
    pub removal: PathBuf,
}

impl Default for TemplatePaths {
    fn default() -> Self {
        Self {
            warning: PathBuf::from("templates/warning.txt"),
            removal: PathBuf::from("templates/removal.txt"),
        }
    }
}

/// Process-wide bot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Community to scan
    pub subreddit: String,
    /// Log decisions without writing anything
    pub dry_run: bool,
    /// Lock warning comments so nobody can reply to them
    pub lock_warning: bool,
    /// Submissions acted on concurrently
    pub max_concurrent_actions: usize,
    /// Account name of the platform's automated moderator
    pub automoderator_name: String,
    pub rules: RuleConfig,
    pub eligibility: EligibilityPolicy,
    pub templates: TemplatePaths,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            subreddit: "synthesizers".to_string(),
            dry_run: false,
            lock_warning: true,
            max_concurrent_actions: 4,
            automoderator_name: "AutoModerator".to_string(),
            rules: RuleConfig::default(),
            eligibility: EligibilityPolicy::default(),
            templates: TemplatePaths::default(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl BotConfig {
    /// Load the configuration file named by the environment and apply overrides
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// an override has an invalid value
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load_file(&path).await?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate();
        Ok(config)
    }

    /// Read a YAML config file; a missing file yields the defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML
    pub async fn load_file(path: &str) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                info!("Loaded configuration from {path}");
                Self::from_yaml(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration file at {path}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse a configuration from YAML text
    ///
    /// # Errors
    /// Returns an error if the text is not valid YAML for this structure
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override settings from variables such as `subreddit_name` and `dry_run`
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if a present variable cannot be parsed
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(subreddit) = lookup("subreddit_name").filter(|s| !s.trim().is_empty()) {
            self.subreddit = subreddit.trim().to_string();
        }
        if let Some(value) = lookup("dry_run") {
            self.dry_run = parse_flag("dry_run", &value)?;
        }
        if let Some(value) = lookup("minutes_to_warn") {
            self.rules.minutes_to_warn = parse_value("minutes_to_warn", &value)?;
        }
        if let Some(value) = lookup("minutes_to_remove") {
            self.rules.minutes_to_remove = parse_value("minutes_to_remove", &value)?;
        }
        if let Some(value) = lookup("min_unique_commenters_to_keep") {
            self.rules.min_unique_commenters_to_keep =
                parse_value("min_unique_commenters_to_keep", &value)?;
        }
        if let Some(value) = lookup("oldest_submission_age_to_process") {
            self.rules.oldest_submission_age_to_process =
                parse_value("oldest_submission_age_to_process", &value)?;
        }
        if let Some(value) = lookup("max_submissions_to_process") {
            self.rules.max_submissions_to_process =
                parse_value("max_submissions_to_process", &value)?;
        }
        if let Some(value) = lookup("max_concurrent_actions") {
            self.max_concurrent_actions = parse_value("max_concurrent_actions", &value)?;
        }
        Ok(())
    }

    /// Report suspicious combinations and fix values that cannot work
    pub fn validate(&mut self) {
        if self.rules.minutes_to_warn >= self.rules.minutes_to_remove {
            warn!(
                minutes_to_warn = self.rules.minutes_to_warn,
                minutes_to_remove = self.rules.minutes_to_remove,
                "minutes_to_warn is not below minutes_to_remove; submissions will be removed without a warning"
            );
        }
        if self.max_concurrent_actions == 0 {
            warn!("max_concurrent_actions is 0, using 1");
            self.max_concurrent_actions = 1;
        }
    }
}
