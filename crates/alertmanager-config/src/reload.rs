//! Best-effort reload signal to the running daemon.
//!
//! A reload is a single `POST <host>/-/reload` with an empty body. Any
//! failure is logged and swallowed: the daemon may pick the new file up on
//! its own, and a failed signal must never fail the write that preceded it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ConfigError, Result};

/// Path of the daemon's reload endpoint.
pub const RELOAD_PATH: &str = "/-/reload";

/// Something that can ask the daemon to re-read its configuration.
pub trait ReloadNotifier: Send + Sync {
    /// Sends one reload signal. Never fails; errors are logged.
    fn notify(&self) -> impl Future<Output = ()> + Send;
}

impl<T: ReloadNotifier> ReloadNotifier for Arc<T> {
    fn notify(&self) -> impl Future<Output = ()> + Send {
        (**self).notify()
    }
}

/// Reload notifier that POSTs to the daemon's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpReloadNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpReloadNotifier {
    /// Creates a notifier for the daemon at `host` with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Reload` if `host` is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}{RELOAD_PATH}", host.trim_end_matches('/')))
            .map_err(|e| ConfigError::Reload {
                reason: format!("invalid daemon host '{host}': {e}"),
            })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Reload {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, endpoint })
    }

    /// Returns the full reload URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one reload request and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Reload` on connection failure, timeout or a non-2xx status.
    pub async fn try_reload(&self) -> Result<StatusCode> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| ConfigError::Reload {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Reload {
                reason: format!("daemon answered {status}"),
            });
        }
        Ok(status)
    }
}

impl ReloadNotifier for HttpReloadNotifier {
    async fn notify(&self) {
        match self.try_reload().await {
            Ok(status) => info!(endpoint = %self.endpoint, %status, "reloaded alertmanager"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "alertmanager reload failed"),
        }
    }
}

/// Notifier that does nothing. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReloadNotifier;

impl ReloadNotifier for NoopReloadNotifier {
    async fn notify(&self) {
        debug!("reload skipped");
    }
}
