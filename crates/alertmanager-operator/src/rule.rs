//! The `AlertmanagerRule` resource.
//!
//! A rule names one route and one receiver. The resource's status records
//! the outcome of the last reconciliation and a capped retry counter; its
//! metadata carries the deletion marker and finalizers owned by the
//! resource store.

use std::collections::BTreeMap;
use std::fmt;

use alertmanager_config::{PromDuration, RouteRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, Result};

/// API group and version of the resource.
pub const API_VERSION: &str = "alertmanager.monitoring.io/v1";

/// Resource kind.
pub const KIND: &str = "AlertmanagerRule";

/// Finalizer that keeps a rule around until its config fragment is removed.
pub const FINALIZER: &str = "alertmanager.monitoring.io/finalizer";

/// Upper bound for [`RuleStatus::retry_times`].
pub const MAX_RETRY_TIMES: u32 = 100;

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

/// Identity and lifecycle metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Unique rule name.
    pub name: String,
    /// Finalizers blocking erasure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Set once deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Route part of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRoute {
    /// Labels an alert must carry.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    /// Labels to group by.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Optional group interval override, e.g. `10m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<String>,
}

/// Receiver part of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReceiver {
    /// Informational; the receiver is always keyed by the rule name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email recipients.
    #[serde(default)]
    pub email_targets: Vec<String>,
    /// Ignored: every managed receiver posts to the operator-wide webhook sink.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhook_targets: Vec<String>,
}

/// Desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertmanagerRuleSpec {
    /// Routing.
    #[serde(default)]
    pub route: RuleRoute,
    /// Notification targets.
    #[serde(default)]
    pub receiver: RuleReceiver,
}

/// Outcome of the last reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileStatus {
    /// The configuration reflects the rule.
    Successful,
    /// The last attempt failed; see the retry counter.
    Failed,
}

impl ReconcileStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "Successful",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ReconcileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observed state written back onto the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatus {
    /// Outcome of the last attempt.
    pub status: ReconcileStatus,
    /// Consecutive-failure counter, capped at [`MAX_RETRY_TIMES`].
    #[serde(default)]
    pub retry_times: u32,
}

impl RuleStatus {
    /// Status after a successful attempt. The retry counter is carried over.
    #[must_use]
    pub fn succeeded(previous: Option<&Self>) -> Self {
        Self {
            status: ReconcileStatus::Successful,
            retry_times: previous.map_or(0, |p| p.retry_times),
        }
    }

    /// Status after a failed attempt. The retry counter grows by one up to the cap.
    #[must_use]
    pub fn failed(previous: Option<&Self>) -> Self {
        let retry_times = previous
            .map_or(0, |p| p.retry_times)
            .saturating_add(1)
            .min(MAX_RETRY_TIMES);
        Self {
            status: ReconcileStatus::Failed,
            retry_times,
        }
    }
}

/// An `AlertmanagerRule` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerRule {
    /// Always [`API_VERSION`].
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Always [`KIND`].
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Identity and lifecycle metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: AlertmanagerRuleSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RuleStatus>,
}

impl AlertmanagerRule {
    /// Creates a rule with the given name and spec.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: AlertmanagerRuleSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec,
            status: None,
        }
    }

    /// Decodes a rule from a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::Manifest` if the YAML does not describe a rule.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let rule: Self = serde_yaml::from_str(text)?;
        if rule.kind != KIND {
            return Err(OperatorError::Manifest {
                reason: format!("expected kind {KIND}, got {}", rule.kind),
            });
        }
        Ok(rule)
    }

    /// The rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether deletion has been requested.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether [`FINALIZER`] is present.
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.metadata.finalizers.iter().any(|f| f == FINALIZER)
    }

    /// Adds [`FINALIZER`] if missing. Returns true if it was added.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.metadata.finalizers.push(FINALIZER.to_string());
        true
    }

    /// Removes [`FINALIZER`]. Returns true if it was present.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != FINALIZER);
        before != self.metadata.finalizers.len()
    }

    /// The email addresses this rule configures.
    #[must_use]
    pub fn email_addresses(&self) -> &[String] {
        &self.spec.receiver.email_targets
    }

    /// Converts the desired state into the merge engine's input.
    ///
    /// # Errors
    ///
    /// Returns `OperatorError::InvalidRule` if the name or an address is
    /// empty, or the group interval override does not parse.
    pub fn to_route_rule(&self) -> Result<RouteRule> {
        let invalid = |reason: String| OperatorError::InvalidRule {
            name: self.metadata.name.clone(),
            reason,
        };

        if self.metadata.name.trim().is_empty() {
            return Err(invalid("name cannot be empty".to_string()));
        }

        if self.spec.receiver.email_targets.iter().any(|e| e.trim().is_empty()) {
            return Err(invalid("email address cannot be empty".to_string()));
        }

        let group_interval = self
            .spec
            .route
            .group_interval
            .as_deref()
            .map(str::parse::<PromDuration>)
            .transpose()
            .map_err(|e| invalid(format!("group interval: {e}")))?;

        Ok(RouteRule {
            name: self.metadata.name.clone(),
            match_labels: self.spec.route.match_labels.clone(),
            group_by: self.spec.route.group_by.clone(),
            group_interval,
            emails: self.spec.receiver.email_targets.clone(),
        })
    }
}
