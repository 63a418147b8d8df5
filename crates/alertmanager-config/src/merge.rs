//! Merging a single rule into a configuration document.
//!
//! Every function here is pure: it takes a document by value and returns
//! the updated document. A rule owns exactly one receiver and one child
//! route of the root, both keyed by the rule name. Applying the same rule
//! twice yields the same document.

use std::collections::BTreeMap;

use tracing::debug;

use crate::document::{ConfigDocument, EmailTarget, Receiver, Route, WebhookTarget};
use crate::duration::PromDuration;

/// Process-wide values used when building receivers and routes.
///
/// Parsed once at startup; merging never reads ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSettings {
    /// Default group interval for managed routes.
    pub group_interval: PromDuration,
    /// Repeat interval for managed routes.
    pub repeat_interval: PromDuration,
    /// Operator-wide webhook sink attached to every managed receiver.
    pub webhook_url: String,
}

/// The desired state of one rule, as seen by the merge engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRule {
    /// Rule name; key for both the receiver and the route.
    pub name: String,
    /// Labels an alert must carry to take this route.
    pub match_labels: BTreeMap<String, String>,
    /// Labels to group by.
    pub group_by: Vec<String>,
    /// Overrides [`MergeSettings::group_interval`] for this rule.
    pub group_interval: Option<PromDuration>,
    /// Email recipients.
    pub emails: Vec<String>,
}

impl RouteRule {
    /// Creates a rule with the given name and no targets.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a match label.
    #[must_use]
    pub fn with_match(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Adds a group-by label.
    #[must_use]
    pub fn with_group_by(mut self, label: impl Into<String>) -> Self {
        self.group_by.push(label.into());
        self
    }

    /// Adds an email recipient.
    #[must_use]
    pub fn with_email(mut self, address: impl Into<String>) -> Self {
        self.emails.push(address.into());
        self
    }

    /// Sets the group interval override.
    #[must_use]
    pub const fn with_group_interval(mut self, interval: PromDuration) -> Self {
        self.group_interval = Some(interval);
        self
    }
}

/// What [`delete_rule`] did to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// No receiver with that name exists; the document is unchanged.
    ReceiverMissing,
    /// The receiver exists but none of its addresses matched; the document is unchanged.
    NothingRemoved,
    /// Some email targets were removed; the receiver remains.
    Pruned,
    /// The receiver was removed. The caller must remove the route too.
    ReceiverRemoved,
}

impl DeleteOutcome {
    /// Whether the caller must also remove the rule's route.
    #[must_use]
    pub const fn route_also_removed(&self) -> bool {
        matches!(self, Self::ReceiverRemoved)
    }

    /// Whether the document was modified.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Pruned | Self::ReceiverRemoved)
    }
}

/// Adds or updates the receiver and route for `rule`.
///
/// Existing email targets of the receiver are kept and the rule's
/// addresses are unioned in, de-duplicated by address. The webhook list is
/// replaced by the single operator-wide sink. The route is rebuilt from the
/// rule and replaces any route with the same receiver key.
#[must_use]
pub fn upsert_rule(
    mut doc: ConfigDocument,
    rule: &RouteRule,
    settings: &MergeSettings,
) -> ConfigDocument {
    let index = doc.receivers.iter().position(|r| r.name == rule.name);

    let (mut emails, other) = match index {
        Some(i) => {
            let existing = &doc.receivers[i];
            (existing.email_configs.clone(), existing.other.clone())
        }
        None => (Vec::new(), BTreeMap::new()),
    };
    emails.extend(rule.emails.iter().map(EmailTarget::templated));

    let receiver = Receiver {
        name: rule.name.clone(),
        email_configs: dedup_by_address(emails),
        webhook_configs: vec![WebhookTarget::new(settings.webhook_url.clone())],
        other,
    };

    match index {
        Some(i) => doc.receivers[i] = receiver,
        None => doc.receivers.push(receiver),
    }

    let route = Route {
        receiver: Some(rule.name.clone()),
        group_by: rule.group_by.clone(),
        match_labels: rule.match_labels.clone(),
        group_interval: Some(rule.group_interval.unwrap_or(settings.group_interval)),
        repeat_interval: Some(settings.repeat_interval),
        ..Route::default()
    };
    upsert_route(&mut doc.route.routes, route);

    doc
}

/// Removes email targets (or the whole receiver) belonging to `name`.
///
/// With `remove_all`, the receiver is dropped outright. Otherwise only
/// targets whose address is in `addresses` are removed, and the receiver is
/// dropped once no email target remains. When the outcome is
/// [`DeleteOutcome::ReceiverRemoved`] the caller must follow up with
/// [`delete_route`].
#[must_use]
pub fn delete_rule(
    mut doc: ConfigDocument,
    name: &str,
    addresses: &[String],
    remove_all: bool,
) -> (ConfigDocument, DeleteOutcome) {
    let Some(index) = doc.receivers.iter().position(|r| r.name == name) else {
        debug!(receiver = %name, "receiver not present, nothing to delete");
        return (doc, DeleteOutcome::ReceiverMissing);
    };

    if remove_all {
        doc.receivers.remove(index);
        return (doc, DeleteOutcome::ReceiverRemoved);
    }

    let receiver = &mut doc.receivers[index];
    let before = receiver.email_configs.len();
    receiver
        .email_configs
        .retain(|e| !addresses.iter().any(|a| *a == e.to));
    let removed = before - receiver.email_configs.len();

    if receiver.email_configs.is_empty() {
        doc.receivers.remove(index);
        (doc, DeleteOutcome::ReceiverRemoved)
    } else if removed == 0 {
        debug!(receiver = %name, "no matching addresses, nothing to delete");
        (doc, DeleteOutcome::NothingRemoved)
    } else {
        (doc, DeleteOutcome::Pruned)
    }
}

/// Removes the child route keyed by `receiver`.
///
/// Returns the document and whether a route was removed.
#[must_use]
pub fn delete_route(mut doc: ConfigDocument, receiver: &str) -> (ConfigDocument, bool) {
    let index = doc
        .route
        .routes
        .iter()
        .position(|r| r.receiver.as_deref() == Some(receiver));

    match index {
        Some(i) => {
            doc.route.routes.remove(i);
            (doc, true)
        }
        None => (doc, false),
    }
}

/// Unmodelled keys of a replaced route (time intervals, ...) are carried over.
fn upsert_route(routes: &mut Vec<Route>, route: Route) {
    match routes.iter_mut().find(|r| r.receiver == route.receiver) {
        Some(slot) => {
            let extra = std::mem::take(&mut slot.extra);
            *slot = Route { extra, ..route };
        }
        None => routes.push(route),
    }
}

/// Keeps the first position of each address and the last entry written for it.
fn dedup_by_address(targets: Vec<EmailTarget>) -> Vec<EmailTarget> {
    let mut out: Vec<EmailTarget> = Vec::with_capacity(targets.len());
    for target in targets {
        match out.iter_mut().find(|e| e.to == target.to) {
            Some(slot) => *slot = target,
            None => out.push(target),
        }
    }
    out
}
