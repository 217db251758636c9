//! Integration tests for bulksend
//!
//! These tests verify end-to-end behavior of a dispatch run: resume after
//! interruption, opt-out enforcement, and failure isolation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::TempDir;

use bulksend::dispatch::{DispatchEngine, ShutdownKind, ShutdownSignal, shutdown_channel};
use bulksend::domain::DeliveryStatus;
use bulksend::ledger::{LoadOptions, StatusLedger};
use bulksend::optout::OptOutRegistry;
use bulksend::phone::CountryRules;
use bulksend::store::{JsonlStore, RecordStore};
use bulksend::template::MessageTemplate;
use bulksend::transport::{MessagingClient, TransportError};
use bulksend::window::SendWindow;

/// Transport double: everyone is registered, sends are recorded, and
/// selected numbers fail
#[derive(Default)]
struct FakeGateway {
    failing: HashSet<String>,
    sends: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MessagingClient for FakeGateway {
    async fn check_registered(&self, _canonical_id: &str) -> Result<bool, TransportError> {
        Ok(true)
    }

    async fn send_message(&self, canonical_id: &str, _text: &str) -> Result<(), TransportError> {
        if self.failing.contains(canonical_id) {
            return Err(TransportError::Api {
                status: 500,
                message: "delivery failed".into(),
            });
        }
        self.sends.lock().unwrap().push(canonical_id.to_string());
        Ok(())
    }
}

struct Workspace {
    temp: TempDir,
    source: PathBuf,
}

impl Workspace {
    fn new(lines: &[&str]) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source = temp.path().join("contacts.jsonl");
        std::fs::write(&source, lines.join("\n")).unwrap();
        Self { temp, source }
    }

    fn optout_path(&self) -> PathBuf {
        self.temp.path().join("optout.txt")
    }

    fn progress_path(&self) -> PathBuf {
        self.temp.path().join("progress.json")
    }

    fn engine(&self, client: Arc<dyn MessagingClient>, signal: ShutdownSignal) -> (DispatchEngine, Vec<bulksend::Contact>) {
        let rules = CountryRules::default();
        let optout = OptOutRegistry::load(self.optout_path(), &rules).unwrap();
        let store = JsonlStore::open(&self.source).unwrap();
        let mut ledger = StatusLedger::new(Box::new(store));
        let contacts = ledger.load_contacts(&rules, &optout, LoadOptions::default());
        let progress = bulksend::ProgressTracker::for_source(self.progress_path(), &self.source);

        let engine = DispatchEngine::new(
            client,
            ledger,
            progress,
            SendWindow {
                start_minute: 0,
                end_minute: 24 * 60,
                utc_offset_minutes: 0,
            },
            MessageTemplate::new("Hola {{name}}, su numero es {{phone}}").unwrap(),
            signal,
        )
        .with_validation_delay(Duration::ZERO);
        (engine, contacts)
    }
}

const FIVE_CONTACTS: [&str; 5] = [
    r#"{"phone": "0412-555-0001", "name": "Ana"}"#,
    r#"{"phone": "0412-555-0002", "name": "Luis"}"#,
    r#"{"phone": "0412-555-0003", "name": "Maria"}"#,
    r#"{"phone": "0412-555-0004", "name": "Jose"}"#,
    r#"{"phone": "0412-555-0005", "name": "Carmen"}"#,
];

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_left_off() {
    let workspace = Workspace::new(&FIVE_CONTACTS);

    // First run: a termination signal arrives mid inter-message delay
    let client = Arc::new(FakeGateway::default());
    let (handle, signal) = shutdown_channel();
    let (engine, contacts) = workspace.engine(client.clone() as Arc<dyn MessagingClient>, signal);
    let engine = engine.with_message_delay(Duration::from_secs(30));

    let run = tokio::spawn(engine.run(contacts));
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.trigger(ShutdownKind::Terminate);

    let summary = run.await.unwrap();
    assert_eq!(summary.interrupted, Some(ShutdownKind::Terminate));
    assert!(summary.sent >= 1 && summary.sent < 5, "sent {} of 5", summary.sent);
    let first_run_sends = client.sends.lock().unwrap().len();

    // Second run with a fresh engine: only the remainder is attempted
    let client2 = Arc::new(FakeGateway::default());
    let (_handle, signal) = shutdown_channel();
    let (engine, contacts) = workspace.engine(client2.clone() as Arc<dyn MessagingClient>, signal);
    let engine = engine.with_message_delay(Duration::ZERO);

    let summary = engine.run(contacts).await;
    assert_eq!(summary.interrupted, None);
    assert_eq!(summary.skipped, first_run_sends);
    assert_eq!(summary.sent, 5 - first_run_sends);
    assert_eq!(first_run_sends + client2.sends.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_failure_isolation_and_error_summary() {
    let workspace = Workspace::new(&[
        r#"{"phone": "0412-555-0001", "name": "Ana"}"#,
        r#"{"phone": "0412-555-0002", "name": "Luis"}"#,
        r#"{"phone": "0412-555-0003", "name": "Maria"}"#,
    ]);

    let client = Arc::new(FakeGateway {
        failing: HashSet::from(["584125550002@c.us".to_string()]),
        ..Default::default()
    });
    let (_handle, signal) = shutdown_channel();
    let (engine, contacts) = workspace.engine(client.clone() as Arc<dyn MessagingClient>, signal);
    let engine = engine.with_message_delay(Duration::ZERO);

    let summary = engine.run(contacts).await;
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.completed_with_errors());

    // The failed row keeps its error text; sent rows say so
    let store = JsonlStore::open(&workspace.source).unwrap();
    let message = store.rows()[1]
        .fields
        .get("status_message")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert!(message.contains("send failed"), "unexpected message: {message}");
    assert_eq!(store.rows()[0].status(), Some(DeliveryStatus::Registered));
}

#[tokio::test]
async fn test_opted_out_numbers_are_never_dispatched() {
    let workspace = Workspace::new(&[
        r#"{"phone": "0412-555-0001", "name": "Ana"}"#,
        r#"{"phone": "0412-555-0002", "name": "Luis"}"#,
    ]);

    let rules = CountryRules::default();
    let mut registry = OptOutRegistry::load(workspace.optout_path(), &rules).unwrap();
    registry.apply_updates(&["0412-555-0002".to_string()], &rules).unwrap();

    let client = Arc::new(FakeGateway::default());
    let (_handle, signal) = shutdown_channel();
    let (engine, contacts) = workspace.engine(client.clone() as Arc<dyn MessagingClient>, signal);
    assert_eq!(contacts.len(), 1);

    let summary = engine.with_message_delay(Duration::ZERO).run(contacts).await;
    assert_eq!(summary.sent, 1);

    let sends = client.sends.lock().unwrap();
    assert_eq!(sends.as_slice(), ["584125550001@c.us"]);

    // The opted-out row was annotated as OPT_OUT
    let store = JsonlStore::open(&workspace.source).unwrap();
    assert_eq!(store.rows()[1].status(), Some(DeliveryStatus::OptOut));
}

#[tokio::test]
async fn test_second_run_skips_previously_failed_rows() {
    let workspace = Workspace::new(&[
        r#"{"phone": "0412-555-0001", "name": "Ana", "status": "NOT_REGISTERED"}"#,
        r#"{"phone": "0412-555-0002", "name": "Luis"}"#,
    ]);

    let client = Arc::new(FakeGateway::default());
    let (_handle, signal) = shutdown_channel();
    let (engine, contacts) = workspace.engine(client.clone() as Arc<dyn MessagingClient>, signal);

    // Row 1 is excluded at load time: permanent failures are not retried
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].row_id, 2);

    let summary = engine.with_message_delay(Duration::ZERO).run(contacts).await;
    assert_eq!(summary.sent, 1);
}
