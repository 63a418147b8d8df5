//! Reconciliation against a real config file on disk.
//!
//! These tests verify:
//! 1. Applying a rule adds the finalizer and merges receiver and route
//! 2. Write failures mark the rule Failed and leave the file untouched
//! 3. Deletion removes the fragment before releasing the finalizer
//! 4. Every successful write triggers exactly one reload
//! 5. Concurrent reconciliations never lose each other's changes
//! 6. Reload requests reach the daemon and their failures are swallowed

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alertmanager_config::{
    ConfigDocument, ConfigStore, DocumentFile, FsDocumentFile, HttpReloadNotifier, PromDuration,
    ReloadNotifier,
};
use alertmanager_operator::{
    AlertmanagerRule, AlertmanagerRuleSpec, InMemoryRuleClient, MAX_RETRY_TIMES, OperatorError,
    OperatorSettings, ReconcileOutcome, ReconcileStatus, Reconciler, RuleClient,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const SEED: &str = r"global:
  resolve_timeout: 5m
route:
  receiver: default
  group_by: [alertname]
receivers:
  - name: default
    webhook_configs:
      - url: http://default.example.com/hook
";

const SINK: &str = "http://sink.example.com/alerts";

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Default, Clone)]
struct CountingNotifier {
    calls: Arc<AtomicUsize>,
}

impl CountingNotifier {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReloadNotifier for CountingNotifier {
    async fn notify(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A filesystem document whose writes can be made to fail.
#[derive(Debug)]
struct FlakyFile {
    inner: FsDocumentFile,
    fail_writes: Arc<AtomicBool>,
}

impl DocumentFile for FlakyFile {
    fn location(&self) -> &Path {
        self.inner.location()
    }

    fn read(&self) -> io::Result<Vec<u8>> {
        self.inner.read()
    }

    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        self.inner.write_atomic(bytes)
    }
}

/// A client whose status writes always fail.
#[derive(Debug, Default)]
struct StatusRejectingClient {
    inner: InMemoryRuleClient,
}

impl RuleClient for StatusRejectingClient {
    async fn get(&self, name: &str) -> alertmanager_operator::Result<Option<AlertmanagerRule>> {
        self.inner.get(name).await
    }

    async fn update(&self, rule: &AlertmanagerRule) -> alertmanager_operator::Result<AlertmanagerRule> {
        self.inner.update(rule).await
    }

    async fn update_status(&self, _rule: &AlertmanagerRule) -> alertmanager_operator::Result<()> {
        Err(OperatorError::Client {
            reason: "status subresource unavailable".to_string(),
        })
    }
}

struct Harness<C> {
    _dir: TempDir,
    path: PathBuf,
    client: C,
    notifier: CountingNotifier,
    fail_writes: Arc<AtomicBool>,
    reconciler: Reconciler<C, CountingNotifier>,
}

impl<C: RuleClient + Clone> Harness<C> {
    fn new(client: C) -> Self {
        let dir = TempDir::new().unwrap();
        let settings = OperatorSettings::new(dir.path(), SINK);
        let path = dir.path().join(&settings.config_name);
        fs::write(&path, SEED).unwrap();

        let fail_writes = Arc::new(AtomicBool::new(false));
        let file = FlakyFile {
            inner: settings.document_file(),
            fail_writes: Arc::clone(&fail_writes),
        };
        let notifier = CountingNotifier::default();
        let store = ConfigStore::new(file, notifier.clone());
        let reconciler = Reconciler::new(client.clone(), store, settings.merge_settings().unwrap());

        Self {
            _dir: dir,
            path,
            client,
            notifier,
            fail_writes,
            reconciler,
        }
    }

    fn on_disk(&self) -> ConfigDocument {
        ConfigDocument::parse(&fs::read(&self.path).unwrap()).unwrap()
    }

    fn raw(&self) -> Vec<u8> {
        fs::read(&self.path).unwrap()
    }

    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn harness() -> Harness<Arc<InMemoryRuleClient>> {
    Harness::new(Arc::new(InMemoryRuleClient::new()))
}

fn rule(name: &str, emails: &[&str]) -> AlertmanagerRule {
    let mut spec = AlertmanagerRuleSpec::default();
    spec.route
        .match_labels
        .insert("team".to_string(), name.to_string());
    spec.route.group_by = vec!["team".to_string()];
    spec.receiver.email_targets = emails.iter().map(ToString::to_string).collect();
    AlertmanagerRule::new(name, spec)
}

// ============================================================================
// Apply
// ============================================================================

#[tokio::test]
async fn test_apply_merges_rule_and_adds_finalizer() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));

    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let stored = h.client.snapshot("r1").unwrap();
    assert!(stored.has_finalizer());
    let status = stored.status.unwrap();
    assert_eq!(status.status, ReconcileStatus::Successful);
    assert_eq!(status.retry_times, 0);

    let doc = h.on_disk();
    let receiver = doc.receiver("r1").unwrap();
    assert_eq!(receiver.email_addresses().collect::<Vec<_>>(), ["a@x.com"]);
    assert_eq!(receiver.webhook_configs.len(), 1);
    assert_eq!(receiver.webhook_configs[0].url.as_deref(), Some(SINK));

    let route = doc.child_route("r1").unwrap();
    assert_eq!(route.match_labels.get("team").map(String::as_str), Some("r1"));
    assert_eq!(route.group_interval, Some(PromDuration::from_secs(300)));
    assert_eq!(route.repeat_interval, Some(PromDuration::from_secs(86_400)));

    // Unmanaged parts survive.
    assert!(doc.receiver("default").is_some());
    assert!(doc.global.is_some());
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn test_reapply_unions_emails() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();

    h.client.apply(rule("r1", &["a@x.com", "b@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();

    let doc = h.on_disk();
    let emails: Vec<_> = doc.receiver("r1").unwrap().email_addresses().collect();
    assert_eq!(emails, ["a@x.com", "b@x.com"]);
    assert_eq!(doc.route.routes.len(), 1);
    assert_eq!(h.notifier.calls(), 2);
}

#[tokio::test]
async fn test_group_interval_override() {
    let h = harness();
    let mut r = rule("r1", &["a@x.com"]);
    r.spec.route.group_interval = Some("10m".to_string());
    h.client.apply(r);

    h.reconciler.reconcile("r1").await.unwrap();

    let doc = h.on_disk();
    assert_eq!(
        doc.child_route("r1").unwrap().group_interval,
        Some(PromDuration::from_secs(600))
    );
}

#[tokio::test]
async fn test_save_failure_marks_failed_and_keeps_file() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();
    let before = h.raw();

    h.fail_writes(true);
    h.client.apply(rule("r1", &["a@x.com", "b@x.com"]));
    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Failed { retry_times: 1 });
    let status = h.client.snapshot("r1").unwrap().status.unwrap();
    assert_eq!(status.status, ReconcileStatus::Failed);
    assert_eq!(status.retry_times, 1);
    assert_eq!(h.raw(), before);
    assert_eq!(h.notifier.calls(), 1);
}

#[tokio::test]
async fn test_retry_counter_survives_success_and_caps() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));
    h.fail_writes(true);

    for _ in 0..MAX_RETRY_TIMES + 5 {
        h.reconciler.reconcile("r1").await.unwrap();
    }
    let status = h.client.snapshot("r1").unwrap().status.unwrap();
    assert_eq!(status.retry_times, MAX_RETRY_TIMES);

    h.fail_writes(false);
    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let status = h.client.snapshot("r1").unwrap().status.unwrap();
    assert_eq!(status.status, ReconcileStatus::Successful);
    assert_eq!(status.retry_times, MAX_RETRY_TIMES);
}

#[tokio::test]
async fn test_invalid_rule_fails_without_writing() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com", " "]));
    let before = h.raw();

    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Failed { retry_times: 1 });
    assert_eq!(h.raw(), before);
    assert_eq!(h.notifier.calls(), 0);
    // The finalizer is still added so a later fix can be cleaned up.
    assert!(h.client.snapshot("r1").unwrap().has_finalizer());
}

#[tokio::test]
async fn test_missing_config_file_fails_rule() {
    let h = harness();
    fs::remove_file(&h.path).unwrap();
    h.client.apply(rule("r1", &["a@x.com"]));

    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Failed { retry_times: 1 });
    assert!(!h.path.exists());
}

#[tokio::test]
async fn test_status_write_failure_is_tolerated() {
    let h = Harness::new(Arc::new(StatusRejectingClient::default()));
    h.client.inner.apply(rule("r1", &["a@x.com"]));

    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Applied);
    assert!(h.on_disk().receiver("r1").is_some());
    assert!(h.client.inner.snapshot("r1").unwrap().status.is_none());
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_removes_fragment_then_erases_rule() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com", "b@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();

    assert!(h.client.delete("r1"));
    assert!(h.client.snapshot("r1").unwrap().is_deleting());

    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Removed);
    assert!(h.client.snapshot("r1").is_none());

    let doc = h.on_disk();
    assert!(doc.receiver("r1").is_none());
    assert!(doc.child_route("r1").is_none());
    assert!(doc.receiver("default").is_some());
    assert_eq!(h.notifier.calls(), 2);

    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Gone);
}

#[tokio::test]
async fn test_delete_failure_keeps_finalizer() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();
    h.client.delete("r1");
    let before = h.raw();

    h.fail_writes(true);
    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Failed { retry_times: 1 });
    let stored = h.client.snapshot("r1").unwrap();
    assert!(stored.is_deleting());
    assert!(stored.has_finalizer());
    assert_eq!(stored.status.unwrap().status, ReconcileStatus::Failed);
    assert_eq!(h.raw(), before);

    h.fail_writes(false);
    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Removed);
    assert!(h.client.snapshot("r1").is_none());
    assert!(h.on_disk().receiver("r1").is_none());
}

#[tokio::test]
async fn test_delete_only_removes_own_addresses() {
    let h = harness();
    h.client.apply(rule("r1", &["a@x.com"]));
    h.reconciler.reconcile("r1").await.unwrap();

    // Someone added an address to the managed receiver by hand.
    let mut doc = h.on_disk();
    let receiver = doc.receivers.iter_mut().find(|r| r.name == "r1").unwrap();
    receiver
        .email_configs
        .push(alertmanager_config::EmailTarget::templated("ops@x.com"));
    fs::write(&h.path, doc.serialize().unwrap()).unwrap();

    h.client.delete("r1");
    let outcome = h.reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Removed);

    let doc = h.on_disk();
    let emails: Vec<_> = doc.receiver("r1").unwrap().email_addresses().collect();
    assert_eq!(emails, ["ops@x.com"]);
    assert!(doc.child_route("r1").is_some());
}

#[tokio::test]
async fn test_delete_with_nothing_to_remove_skips_write() {
    let h = harness();
    let mut r = rule("r1", &["a@x.com"]);
    r.add_finalizer();
    h.client.apply(r);
    h.client.delete("r1");
    let before = h.raw();

    let outcome = h.reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Removed);
    assert_eq!(h.raw(), before);
    assert_eq!(h.notifier.calls(), 0);
    assert!(h.client.snapshot("r1").is_none());
}

#[tokio::test]
async fn test_unknown_rule_is_gone() {
    let h = harness();
    let outcome = h.reconciler.reconcile("nope").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Gone);
    assert_eq!(h.notifier.calls(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciles_keep_every_rule() {
    let h = harness();
    let names: Vec<String> = (0..16).map(|i| format!("rule-{i}")).collect();
    for name in &names {
        let email = format!("{name}@x.com");
        h.client.apply(rule(name, &[email.as_str()]));
    }

    let reconciler = Arc::new(h.reconciler);
    let mut handles = Vec::new();
    for name in names.clone() {
        let reconciler = Arc::clone(&reconciler);
        handles.push(tokio::spawn(async move {
            reconciler.reconcile(&name).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), ReconcileOutcome::Applied);
    }

    let doc = ConfigDocument::parse(&fs::read(&h.path).unwrap()).unwrap();
    for name in &names {
        assert!(doc.receiver(name).is_some(), "missing receiver {name}");
        assert!(doc.child_route(name).is_some(), "missing route {name}");
    }
    assert_eq!(doc.receivers.len(), names.len() + 1);
    assert_eq!(h.notifier.calls(), names.len());
}

// ============================================================================
// Render
// ============================================================================

#[tokio::test]
async fn test_render_does_not_write() {
    let h = harness();
    let before = h.raw();

    let doc = h
        .reconciler
        .render(&rule("r1", &["a@x.com"]))
        .await
        .unwrap();

    assert!(doc.receiver("r1").is_some());
    assert_eq!(h.raw(), before);
    assert_eq!(h.notifier.calls(), 0);
}

// ============================================================================
// Reload over HTTP
// ============================================================================

fn http_reconciler(
    host: &str,
) -> (TempDir, Arc<InMemoryRuleClient>, Reconciler<Arc<InMemoryRuleClient>, HttpReloadNotifier>) {
    let dir = TempDir::new().unwrap();
    let mut settings = OperatorSettings::new(dir.path(), SINK);
    settings.alertmanager_host = host.to_string();
    settings.reload_timeout_secs = 2;
    fs::write(dir.path().join(&settings.config_name), SEED).unwrap();

    let client = Arc::new(InMemoryRuleClient::new());
    let store = ConfigStore::new(settings.document_file(), settings.reload_notifier().unwrap());
    let reconciler = Reconciler::new(Arc::clone(&client), store, settings.merge_settings().unwrap());
    (dir, client, reconciler)
}

#[tokio::test]
async fn test_apply_posts_reload() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });

    let (_dir, client, reconciler) = http_reconciler(&format!("http://{addr}"));
    client.apply(rule("r1", &["a@x.com"]));
    let outcome = reconciler.reconcile("r1").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /-/reload HTTP/1.1"), "{request}");
}

#[tokio::test]
async fn test_unreachable_daemon_does_not_fail_rule() {
    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let (dir, client, reconciler) = http_reconciler(&format!("http://{addr}"));
    client.apply(rule("r1", &["a@x.com"]));
    let outcome = reconciler.reconcile("r1").await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Applied);
    let status = client.snapshot("r1").unwrap().status.unwrap();
    assert_eq!(status.status, ReconcileStatus::Successful);
    let doc = ConfigDocument::parse(&fs::read(dir.path().join("alertmanager.yml")).unwrap()).unwrap();
    assert!(doc.receiver("r1").is_some());
}
