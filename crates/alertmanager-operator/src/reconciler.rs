//! The control loop for `AlertmanagerRule` resources.
//!
//! Each change event for a rule leads to one call to
//! [`Reconciler::reconcile`]. The reconciler:
//!
//! 1. Fetches the rule. A rule that is gone needs nothing.
//! 2. If deletion is requested, removes the rule's addresses (and, once
//!    the receiver is empty, its receiver and route) from the document,
//!    then drops the finalizer so the store can erase the rule. On failure
//!    the finalizer stays so the fragment is never orphaned.
//! 3. Otherwise makes sure the finalizer is present, merges the rule into
//!    the document and records `Successful` or `Failed` in the status.
//!
//! Load → merge → save is a read-modify-write of one shared file, so it
//! runs under a single lock. Failed attempts are not retried here; the next
//! delivered event tries again.

use alertmanager_config::{
    ConfigDocument, ConfigStore, MergeSettings, ReloadNotifier, RouteRule, delete_route,
    delete_rule, upsert_rule,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::client::RuleClient;
use crate::error::Result;
use crate::rule::{AlertmanagerRule, RuleStatus};

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The rule is merged into the configuration.
    Applied,
    /// The rule's fragment was removed and its finalizer dropped.
    Removed,
    /// The attempt failed; the status carries this retry count.
    Failed {
        /// Retry counter after this attempt.
        retry_times: u32,
    },
    /// The rule no longer exists, or is being deleted without our finalizer.
    Gone,
}

/// Drives rules into the configuration document.
#[derive(Debug)]
pub struct Reconciler<C, N> {
    client: C,
    store: ConfigStore<N>,
    settings: MergeSettings,
    document_lock: Mutex<()>,
}

impl<C: RuleClient, N: ReloadNotifier> Reconciler<C, N> {
    /// Creates a reconciler.
    pub fn new(client: C, store: ConfigStore<N>, settings: MergeSettings) -> Self {
        Self {
            client,
            store,
            settings,
            document_lock: Mutex::new(()),
        }
    }

    /// Returns the resource client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Returns the configuration store.
    pub const fn store(&self) -> &ConfigStore<N> {
        &self.store
    }

    /// Reconciles the rule called `name`.
    ///
    /// Config errors never surface here; they become a `Failed` status.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::Client` if the resource cannot be fetched or
    /// its finalizers cannot be written.
    #[instrument(skip(self, name), fields(rule = %name))]
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        let Some(rule) = self.client.get(name).await? else {
            debug!("rule no longer exists");
            return Ok(ReconcileOutcome::Gone);
        };

        if rule.is_deleting() {
            if !rule.has_finalizer() {
                debug!("rule is being deleted without our finalizer");
                return Ok(ReconcileOutcome::Gone);
            }
            return self.finalize(rule).await;
        }

        self.apply(rule).await
    }

    /// Merges `rule` into the current document without writing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is invalid or the document cannot be loaded.
    pub async fn render(&self, rule: &AlertmanagerRule) -> Result<ConfigDocument> {
        let route_rule = rule.to_route_rule()?;
        let _guard = self.document_lock.lock().await;
        let doc = self.store.load()?;
        Ok(upsert_rule(doc, &route_rule, &self.settings))
    }

    async fn apply(&self, mut rule: AlertmanagerRule) -> Result<ReconcileOutcome> {
        if rule.add_finalizer() {
            rule = self.client.update(&rule).await?;
            debug!("added finalizer");
        }

        let result = match rule.to_route_rule() {
            Ok(route_rule) => self.upsert(&route_rule).await,
            Err(e) => Err(e),
        };

        let status = match &result {
            Ok(()) => {
                info!("rule applied");
                RuleStatus::succeeded(rule.status.as_ref())
            }
            Err(e) => {
                let status = RuleStatus::failed(rule.status.as_ref());
                error!(error = %e, retry_times = status.retry_times, "failed to apply rule");
                status
            }
        };

        rule.status = Some(status);
        self.record_status(&rule).await;

        Ok(match result {
            Ok(()) => ReconcileOutcome::Applied,
            Err(_) => ReconcileOutcome::Failed {
                retry_times: status.retry_times,
            },
        })
    }

    async fn finalize(&self, mut rule: AlertmanagerRule) -> Result<ReconcileOutcome> {
        if let Err(e) = self.remove(rule.name(), rule.email_addresses()).await {
            let status = RuleStatus::failed(rule.status.as_ref());
            error!(
                error = %e,
                retry_times = status.retry_times,
                "failed to remove rule from config, keeping finalizer"
            );
            rule.status = Some(status);
            self.record_status(&rule).await;
            return Ok(ReconcileOutcome::Failed {
                retry_times: status.retry_times,
            });
        }

        rule.remove_finalizer();
        self.client.update(&rule).await?;
        info!("rule removed, finalizer released");
        Ok(ReconcileOutcome::Removed)
    }

    async fn upsert(&self, rule: &RouteRule) -> Result<()> {
        let _guard = self.document_lock.lock().await;

        let doc = self.store.load()?;
        let doc = upsert_rule(doc, rule, &self.settings);
        debug!(config = %doc, "merged config");
        self.store.save(&doc).await?;
        Ok(())
    }

    async fn remove(&self, name: &str, addresses: &[String]) -> Result<()> {
        let _guard = self.document_lock.lock().await;

        let doc = self.store.load()?;
        let (mut doc, outcome) = delete_rule(doc, name, addresses, false);

        if outcome.route_also_removed() {
            let (next, removed) = delete_route(doc, name);
            if !removed {
                warn!("receiver removed but no route was keyed by it");
            }
            doc = next;
        }

        if !outcome.changed() {
            debug!(?outcome, "nothing to remove from config");
            return Ok(());
        }

        self.store.save(&doc).await?;
        Ok(())
    }

    /// Best effort: a lost status write only leaves a stale status behind.
    async fn record_status(&self, rule: &AlertmanagerRule) {
        if let Err(e) = self.client.update_status(rule).await {
            warn!(error = %e, "failed to update rule status");
        }
    }
}
