//! Alertmanager configuration synthesis for rule-driven routing.
//!
//! `alertmanager-config` owns the configuration file of a running
//! Alertmanager and lets callers merge one routing rule at a time into it.
//!
//! # Features
//!
//! - **Document model**: parse and deterministically serialize the
//!   configuration file, keeping unmanaged sections intact
//! - **Merge engine**: pure, idempotent upsert and delete of a rule's
//!   receiver and route
//! - **Atomic store**: write-then-rename persistence that never leaves a
//!   half-written file behind
//! - **Reload**: best-effort `POST /-/reload` after every successful write
//!
//! # Example
//!
//! ```rust
//! use alertmanager_config::{
//!     ConfigDocument, MergeSettings, Route, RouteRule, delete_route, delete_rule, upsert_rule,
//! };
//!
//! let settings = MergeSettings {
//!     group_interval: "5m".parse().unwrap(),
//!     repeat_interval: "1d".parse().unwrap(),
//!     webhook_url: "http://sink.example.com/alerts".to_string(),
//! };
//!
//! let doc = ConfigDocument::with_root(Route::to_receiver("default"));
//! let rule = RouteRule::new("r1")
//!     .with_match("team", "x")
//!     .with_group_by("team")
//!     .with_email("a@x.com");
//!
//! let doc = upsert_rule(doc, &rule, &settings);
//! assert_eq!(doc.receivers.len(), 1);
//!
//! let (doc, outcome) = delete_rule(doc, "r1", &rule.emails, false);
//! assert!(outcome.route_also_removed());
//! let (doc, _) = delete_route(doc, "r1");
//! assert!(doc.route.routes.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod document;
pub mod duration;
pub mod error;
pub mod merge;
pub mod reload;
pub mod store;

// Re-export main types at crate root
pub use document::{
    ConfigDocument, EMAIL_HTML_TEMPLATE, EMAIL_SUBJECT_TEMPLATE, EmailTarget, Receiver, Route,
    WebhookTarget,
};
pub use duration::PromDuration;
pub use error::{ConfigError, Result};
pub use merge::{DeleteOutcome, MergeSettings, RouteRule, delete_route, delete_rule, upsert_rule};
pub use reload::{HttpReloadNotifier, NoopReloadNotifier, RELOAD_PATH, ReloadNotifier};
pub use store::{ConfigStore, DocumentFile, FsDocumentFile};
