//! Operator that keeps an Alertmanager configuration file in sync with
//! `AlertmanagerRule` resources.
//!
//! Each rule describes one route (match labels, grouping) and one receiver
//! (email recipients). The [`Reconciler`] merges rules into the shared
//! configuration document one at a time, writes it atomically, asks the
//! daemon to reload and reports the outcome on the rule's status.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alertmanager_config::ConfigStore;
//! use alertmanager_operator::{
//!     AlertmanagerRule, InMemoryRuleClient, OperatorSettings, Reconciler,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = OperatorSettings::new("/etc/alertmanager", "http://sink.example.com/alerts");
//! settings.validate()?;
//!
//! let client = Arc::new(InMemoryRuleClient::new());
//! let store = ConfigStore::new(settings.document_file(), settings.reload_notifier()?);
//! let reconciler = Reconciler::new(Arc::clone(&client), store, settings.merge_settings()?);
//!
//! client.apply(AlertmanagerRule::from_yaml(&std::fs::read_to_string("rule.yaml")?)?);
//! let outcome = reconciler.reconcile("r1").await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod error;
pub mod reconciler;
pub mod rule;
pub mod settings;

// Re-export main types at crate root
pub use client::{InMemoryRuleClient, RuleClient};
pub use error::{OperatorError, Result};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use rule::{
    AlertmanagerRule, AlertmanagerRuleSpec, FINALIZER, MAX_RETRY_TIMES, ObjectMeta,
    ReconcileStatus, RuleReceiver, RuleRoute, RuleStatus,
};
pub use settings::OperatorSettings;
