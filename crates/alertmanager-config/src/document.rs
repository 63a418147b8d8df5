//! In-memory model of an Alertmanager configuration file.
//!
//! Only the parts this operator manages are modelled in detail: the root
//! route with its child routes, and receivers with email and webhook
//! targets. Everything else (`global`, `inhibit_rules`, other receiver
//! kinds, unknown keys) is carried through as opaque YAML so a managed file
//! keeps its hand-written sections.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::duration::PromDuration;
use crate::error::{ConfigError, Result};

/// Subject header applied to every managed email target.
pub const EMAIL_SUBJECT_TEMPLATE: &str = r#"{{ template "email.custom.subject" . }}"#;

/// HTML body applied to every managed email target.
pub const EMAIL_HTML_TEMPLATE: &str = r#"{{ template "email.custom.html" . }}"#;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// The full configuration document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigDocument {
    /// Global settings, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<Value>,
    /// The root route. Managed routes are its direct children.
    pub route: Route,
    /// Inhibition rules, passed through untouched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inhibit_rules: Vec<Value>,
    /// All receivers. Names are unique.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<Receiver>,
    /// Notification template file paths.
    pub templates: Vec<String>,
    /// Top-level sections this operator does not manage (`time_intervals`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    #[serde(skip)]
    original: Option<String>,
}

/// Wire shape used while parsing, so a missing root route can be told apart.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    global: Option<Value>,
    #[serde(default)]
    route: Option<Route>,
    #[serde(default)]
    inhibit_rules: Vec<Value>,
    #[serde(default)]
    receivers: Vec<Receiver>,
    #[serde(default)]
    templates: Vec<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl ConfigDocument {
    /// Creates a document with the given root route and nothing else.
    #[must_use]
    pub fn with_root(route: Route) -> Self {
        Self {
            route,
            ..Self::default()
        }
    }

    /// Parses a document from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedConfig` if the bytes are not valid
    /// YAML, the root route is missing, or the root route sets `continue`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ConfigError::malformed(format!("config is not valid UTF-8: {e}")))?;

        let raw: RawDocument = serde_yaml::from_str(text)?;

        // Checked here rather than via serde: an empty file deserializes
        // without ever reaching the route field.
        let route = raw
            .route
            .ok_or_else(|| ConfigError::malformed("no route provided in config"))?;

        if route.continue_matching {
            return Err(ConfigError::malformed("cannot have continue in root route"));
        }

        Ok(Self {
            global: raw.global,
            route,
            inhibit_rules: raw.inhibit_rules,
            receivers: raw.receivers,
            templates: raw.templates,
            extra: raw.extra,
            original: Some(text.to_string()),
        })
    }

    /// Serializes the document after checking its invariants.
    ///
    /// Output is deterministic: serializing an unmodified document twice
    /// yields identical bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedConfig` if [`validate`](Self::validate) fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let text = serde_yaml::to_string(self)?;
        Ok(text.into_bytes())
    }

    /// Checks the document invariants.
    ///
    /// - the root route does not set `continue`
    /// - receiver names are unique
    /// - every route below the root that names a receiver names an existing one
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MalformedConfig` describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.route.continue_matching {
            return Err(ConfigError::malformed("cannot have continue in root route"));
        }

        let mut names = HashSet::with_capacity(self.receivers.len());
        for receiver in &self.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(ConfigError::malformed(format!(
                    "notification config name {:?} is not unique",
                    receiver.name
                )));
            }
        }

        let mut stack: Vec<&Route> = self.route.routes.iter().collect();
        while let Some(route) = stack.pop() {
            if let Some(name) = route.receiver.as_deref() {
                if !names.contains(name) {
                    return Err(ConfigError::malformed(format!(
                        "undefined receiver {name:?} used in route"
                    )));
                }
            }
            stack.extend(route.routes.iter());
        }

        Ok(())
    }

    /// The text this document was parsed from, if any.
    #[must_use]
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Looks up a receiver by name.
    #[must_use]
    pub fn receiver(&self, name: &str) -> Option<&Receiver> {
        self.receivers.iter().find(|r| r.name == name)
    }

    /// Looks up a direct child of the root route by its receiver key.
    #[must_use]
    pub fn child_route(&self, receiver: &str) -> Option<&Route> {
        self.route
            .routes
            .iter()
            .find(|r| r.receiver.as_deref() == Some(receiver))
    }
}

// Equality ignores the retained source text.
impl PartialEq for ConfigDocument {
    fn eq(&self, other: &Self) -> bool {
        self.global == other.global
            && self.route == other.route
            && self.inhibit_rules == other.inhibit_rules
            && self.receivers == other.receivers
            && self.templates == other.templates
            && self.extra == other.extra
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_yaml::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "<error creating config string: {e}>"),
        }
    }
}

/// A node in the routing tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Receiver for alerts matched by this route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Labels to group alerts by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    /// Whether matching continues to sibling routes.
    #[serde(default, rename = "continue", skip_serializing_if = "is_false")]
    pub continue_matching: bool,
    /// Exact label matches.
    #[serde(default, rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    /// Regex label matches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_re: BTreeMap<String, String>,
    /// Matcher expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<String>,
    /// Wait before sending the first notification for a new group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<PromDuration>,
    /// Wait before notifying about new alerts in an existing group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<PromDuration>,
    /// Wait before re-sending a notification that was already sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<PromDuration>,
    /// Child routes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Unmodelled keys (`mute_time_intervals`, `active_time_intervals`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Route {
    /// Creates a route pointing at the given receiver.
    #[must_use]
    pub fn to_receiver(receiver: impl Into<String>) -> Self {
        Self {
            receiver: Some(receiver.into()),
            ..Self::default()
        }
    }
}

/// A named bundle of notification targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    /// Unique receiver name.
    pub name: String,
    /// Email targets, unique by recipient.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_configs: Vec<EmailTarget>,
    /// Webhook targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhook_configs: Vec<WebhookTarget>,
    /// Receiver kinds this operator does not manage (`slack_configs`, ...).
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Receiver {
    /// Creates an empty receiver.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the recipient addresses of all email targets, in order.
    pub fn email_addresses(&self) -> impl Iterator<Item = &str> {
        self.email_configs.iter().map(|e| e.to.as_str())
    }
}

/// An email notification target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTarget {
    /// Recipient address. Identity of the target within a receiver.
    pub to: String,
    /// Whether to notify about resolved alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_resolved: Option<bool>,
    /// Extra mail headers; managed targets set `Subject`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// HTML body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Plain text body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Unmodelled keys (`from`, `smarthost`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EmailTarget {
    /// Creates a target for `to` using the fixed subject and body templates.
    #[must_use]
    pub fn templated(to: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Subject".to_string(), EMAIL_SUBJECT_TEMPLATE.to_string());

        Self {
            to: to.into(),
            headers,
            html: Some(EMAIL_HTML_TEMPLATE.to_string()),
            ..Self::default()
        }
    }
}

/// A webhook notification target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// Endpoint receiving the alert payload. Unset when the target reads
    /// its URL from `url_file`, which is kept in `extra`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether to notify about resolved alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_resolved: Option<bool>,
    /// Maximum alerts per payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alerts: Option<u64>,
    /// Unmodelled keys (`http_config`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WebhookTarget {
    /// Creates a webhook target for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}
