//! Access to rule resources.
//!
//! [`RuleClient`] is the seam to whatever stores the resources. The
//! reconciler only needs to fetch a rule, write back its metadata
//! (finalizers) and write its status subresource.
//!
//! [`InMemoryRuleClient`] models a resource store: deleting a rule that
//! still carries finalizers only marks it, and the rule is erased once the
//! last finalizer is removed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{OperatorError, Result};
use crate::rule::AlertmanagerRule;

/// Fetches and updates rule resources.
pub trait RuleClient: Send + Sync {
    /// Fetches a rule by name. `None` once it has been erased.
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<AlertmanagerRule>>> + Send;

    /// Writes metadata and spec. The status is left untouched.
    ///
    /// Returns the stored object as seen after the write.
    fn update(
        &self,
        rule: &AlertmanagerRule,
    ) -> impl Future<Output = Result<AlertmanagerRule>> + Send;

    /// Writes only the status subresource.
    fn update_status(&self, rule: &AlertmanagerRule) -> impl Future<Output = Result<()>> + Send;
}

impl<T: RuleClient> RuleClient for Arc<T> {
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<AlertmanagerRule>>> + Send {
        (**self).get(name)
    }

    fn update(
        &self,
        rule: &AlertmanagerRule,
    ) -> impl Future<Output = Result<AlertmanagerRule>> + Send {
        (**self).update(rule)
    }

    fn update_status(&self, rule: &AlertmanagerRule) -> impl Future<Output = Result<()>> + Send {
        (**self).update_status(rule)
    }
}

fn not_found(name: &str) -> OperatorError {
    OperatorError::Client {
        reason: format!("rule {name} not found"),
    }
}

/// In-process rule store.
#[derive(Debug, Default)]
pub struct InMemoryRuleClient {
    rules: RwLock<HashMap<String, AlertmanagerRule>>,
}

impl InMemoryRuleClient {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a rule or replaces its spec, as an external actor would.
    ///
    /// Metadata and status of an existing rule are kept.
    pub fn apply(&self, rule: AlertmanagerRule) {
        let mut rules = self.rules.write();
        let name = rule.name().to_string();

        if let Some(existing) = rules.get_mut(&name) {
            existing.spec = rule.spec;
            debug!(rule = %name, "updated rule spec");
        } else {
            rules.insert(name.clone(), rule);
            info!(rule = %name, "created rule");
        }
    }

    /// Requests deletion.
    ///
    /// A rule with finalizers is only marked; one without is erased at once.
    /// Returns false if the rule does not exist.
    pub fn delete(&self, name: &str) -> bool {
        let mut rules = self.rules.write();

        let Some(rule) = rules.get_mut(name) else {
            return false;
        };

        if rule.metadata.finalizers.is_empty() {
            rules.remove(name);
            info!(rule = %name, "erased rule");
        } else if rule.metadata.deletion_timestamp.is_none() {
            rule.metadata.deletion_timestamp = Some(Utc::now());
            info!(rule = %name, "marked rule for deletion");
        }
        true
    }

    /// Returns a copy of the stored rule.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<AlertmanagerRule> {
        self.rules.read().get(name).cloned()
    }

    /// Returns the number of stored rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns true if no rules are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl RuleClient for InMemoryRuleClient {
    async fn get(&self, name: &str) -> Result<Option<AlertmanagerRule>> {
        Ok(self.snapshot(name))
    }

    async fn update(&self, rule: &AlertmanagerRule) -> Result<AlertmanagerRule> {
        let mut rules = self.rules.write();
        let name = rule.name();

        let stored = rules.get_mut(name).ok_or_else(|| not_found(name))?;
        stored.metadata.finalizers.clone_from(&rule.metadata.finalizers);
        stored.spec.clone_from(&rule.spec);
        let updated = stored.clone();

        if updated.is_deleting() && updated.metadata.finalizers.is_empty() {
            rules.remove(name);
            info!(rule = %name, "last finalizer removed, erased rule");
        }

        Ok(updated)
    }

    async fn update_status(&self, rule: &AlertmanagerRule) -> Result<()> {
        let mut rules = self.rules.write();
        let name = rule.name();

        let stored = rules.get_mut(name).ok_or_else(|| not_found(name))?;
        stored.status = rule.status;
        Ok(())
    }
}
