//! Process-wide settings.
//!
//! Read once at startup from flags or environment and never changed
//! afterwards. Interval parsing happens here so a bad value stops the
//! process instead of failing every rule.

use std::path::PathBuf;
use std::time::Duration;

use alertmanager_config::{FsDocumentFile, HttpReloadNotifier, MergeSettings, PromDuration};
use clap::Args;
use url::Url;

use crate::error::{OperatorError, Result};

/// Default daemon address.
pub const DEFAULT_ALERTMANAGER_HOST: &str = "http://localhost:9093";
/// Default configuration file name.
pub const DEFAULT_CONFIG_NAME: &str = "alertmanager.yml";
/// Default group interval for managed routes.
pub const DEFAULT_GROUP_INTERVAL: &str = "5m";
/// Default repeat interval for managed routes.
pub const DEFAULT_REPEAT_INTERVAL: &str = "1d";
/// Default reload request timeout in seconds.
pub const DEFAULT_RELOAD_TIMEOUT_SECS: u64 = 5;

/// Settings shared by every reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct OperatorSettings {
    /// Base URL of the Alertmanager daemon.
    #[arg(long, env = "ALERTMANAGER_HOST", default_value = DEFAULT_ALERTMANAGER_HOST)]
    pub alertmanager_host: String,

    /// Directory holding the Alertmanager configuration file.
    #[arg(long, env = "ALERTMANAGER_CONFIG_PATH", default_value = "/etc/alertmanager")]
    pub config_dir: PathBuf,

    /// Configuration file name inside the config directory.
    #[arg(long, env = "ALERTMANAGER_CONFIG_NAME", default_value = DEFAULT_CONFIG_NAME)]
    pub config_name: String,

    /// Group interval applied to managed routes.
    #[arg(long, env = "ALERTMANAGER_GROUP_INTERVAL", default_value = DEFAULT_GROUP_INTERVAL)]
    pub group_interval: String,

    /// Repeat interval applied to managed routes.
    #[arg(long, env = "ALERTMANAGER_REPEAT_INTERVAL", default_value = DEFAULT_REPEAT_INTERVAL)]
    pub repeat_interval: String,

    /// Webhook sink attached to every managed receiver.
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: String,

    /// Timeout for the reload request, in seconds.
    #[arg(long, env = "ALERTMANAGER_RELOAD_TIMEOUT_SECS", default_value_t = DEFAULT_RELOAD_TIMEOUT_SECS)]
    pub reload_timeout_secs: u64,
}

impl OperatorSettings {
    /// Creates settings with defaults for everything but the config
    /// directory and the webhook sink.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>, webhook_url: impl Into<String>) -> Self {
        Self {
            alertmanager_host: DEFAULT_ALERTMANAGER_HOST.to_string(),
            config_dir: config_dir.into(),
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            group_interval: DEFAULT_GROUP_INTERVAL.to_string(),
            repeat_interval: DEFAULT_REPEAT_INTERVAL.to_string(),
            webhook_url: webhook_url.into(),
            reload_timeout_secs: DEFAULT_RELOAD_TIMEOUT_SECS,
        }
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::Settings` on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        check_http_url("alertmanager host", &self.alertmanager_host)?;
        check_http_url("webhook URL", &self.webhook_url)?;

        if self.config_name.trim().is_empty() {
            return Err(settings_error("config file name cannot be empty"));
        }

        if self.reload_timeout_secs == 0 {
            return Err(settings_error("reload timeout must be greater than 0"));
        }

        self.merge_settings().map(|_| ())
    }

    /// Parses the values the merge engine needs.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::Settings` if an interval does not parse.
    pub fn merge_settings(&self) -> Result<MergeSettings> {
        Ok(MergeSettings {
            group_interval: parse_interval("group interval", &self.group_interval)?,
            repeat_interval: parse_interval("repeat interval", &self.repeat_interval)?,
            webhook_url: self.webhook_url.clone(),
        })
    }

    /// Timeout for the reload request.
    #[must_use]
    pub const fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    /// The configuration file handle.
    #[must_use]
    pub fn document_file(&self) -> FsDocumentFile {
        FsDocumentFile::new(&self.config_dir, &self.config_name)
    }

    /// Builds the HTTP reload notifier.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::Settings` if the host is invalid.
    pub fn reload_notifier(&self) -> Result<HttpReloadNotifier> {
        HttpReloadNotifier::new(&self.alertmanager_host, self.reload_timeout())
            .map_err(|e| settings_error(e.to_string()))
    }
}

fn settings_error(reason: impl Into<String>) -> OperatorError {
    OperatorError::Settings {
        reason: reason.into(),
    }
}

fn check_http_url(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(settings_error(format!("{what} cannot be empty")));
    }

    let url = Url::parse(value).map_err(|e| settings_error(format!("{what} '{value}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(settings_error(format!(
            "{what} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn parse_interval(what: &str, value: &str) -> Result<PromDuration> {
    value
        .parse()
        .map_err(|e| settings_error(format!("{what}: {e}")))
}
