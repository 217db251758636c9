//! Dispatch engine
//!
//! Validation phase checks registration through the transport; dispatch
//! phase waits for the sending window and delivers the rendered template,
//! one contact at a time. The transport rate-limits by account, so there is
//! no parallel dispatch. Ledgers are flushed at every phase boundary and
//! when a shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::{Contact, DeliveryStatus};
use crate::ledger::StatusLedger;
use crate::progress::ProgressTracker;
use crate::template::MessageTemplate;
use crate::transport::MessagingClient;
use crate::window::SendWindow;

use super::shutdown::{ShutdownKind, ShutdownSignal};

/// Terminal state for one contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Sent,
    SendFailed,
    NotRegistered,
    Skipped,
}

/// End-of-run accounting
#[derive(Debug, Default, Clone)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub not_registered: usize,
    /// Already completed in a prior run
    pub skipped: usize,
    /// Validation calls that failed; rows left pending for a future run
    pub pending_validation: usize,
    pub interrupted: Option<ShutdownKind>,
}

impl DispatchSummary {
    pub fn completed_with_errors(&self) -> bool {
        self.failed > 0
    }
}

pub struct DispatchEngine {
    client: Arc<dyn MessagingClient>,
    ledger: StatusLedger,
    progress: ProgressTracker,
    window: SendWindow,
    template: MessageTemplate,
    message_delay: Duration,
    validation_delay: Duration,
    shutdown: ShutdownSignal,
}

impl DispatchEngine {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        ledger: StatusLedger,
        progress: ProgressTracker,
        window: SendWindow,
        template: MessageTemplate,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            client,
            ledger,
            progress,
            window,
            template,
            message_delay: Duration::from_millis(5000),
            validation_delay: Duration::from_millis(1500),
            shutdown,
        }
    }

    /// Set the delay applied between consecutive sends
    pub fn with_message_delay(mut self, delay: Duration) -> Self {
        self.message_delay = delay;
        self
    }

    /// Set the delay applied after each registration lookup
    pub fn with_validation_delay(mut self, delay: Duration) -> Self {
        self.validation_delay = delay;
        self
    }

    /// Run both phases over the loaded contacts
    ///
    /// A single contact's transport failure never aborts the batch; it is
    /// annotated and counted. Persistence failures are logged and the run
    /// continues, accepting potential re-sends on the next run.
    pub async fn run(mut self, contacts: Vec<Contact>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let ready = self.validate(contacts, &mut summary).await;
        self.flush_ledger();

        if summary.interrupted.is_none() {
            self.dispatch(ready, &mut summary).await;
        }
        self.flush_ledger();

        if let Some(kind) = summary.interrupted {
            warn!(signal = %kind, "run interrupted, ledgers flushed");
        }
        summary
    }

    /// Validation phase: query registration for contacts that need it
    async fn validate(&mut self, contacts: Vec<Contact>, summary: &mut DispatchSummary) -> Vec<Contact> {
        let mut ready = Vec::with_capacity(contacts.len());

        for contact in contacts {
            if let Some(kind) = self.shutdown.requested() {
                summary.interrupted = Some(kind);
                break;
            }

            if !contact.needs_validation {
                debug!(row = contact.row_id, number = %contact.display, "trusting prior REGISTERED status");
                ready.push(contact);
                continue;
            }

            match self.client.check_registered(&contact.canonical_id).await {
                Ok(true) => {
                    debug!(row = contact.row_id, number = %contact.display, "number is registered");
                    self.ledger
                        .queue_status(contact.row_id, DeliveryStatus::Registered, "validated");
                    ready.push(contact.validated());
                }
                Ok(false) => {
                    info!(row = contact.row_id, number = %contact.display, "number is not registered, dropping");
                    self.ledger.queue_status(
                        contact.row_id,
                        DeliveryStatus::NotRegistered,
                        "number is not registered on the platform",
                    );
                    summary.not_registered += 1;
                }
                Err(e) => {
                    warn!(
                        row = contact.row_id,
                        number = %contact.display,
                        error = %e,
                        "validation call failed, leaving row pending"
                    );
                    summary.pending_validation += 1;
                }
            }

            // Throttle lookups; not applied when a prior status was trusted
            if let Some(kind) = self.pause(self.validation_delay).await {
                summary.interrupted = Some(kind);
                break;
            }
        }

        ready
    }

    /// Dispatch phase: window-gate, render, send, record
    async fn dispatch(&mut self, contacts: Vec<Contact>, summary: &mut DispatchSummary) {
        let pending: Vec<Contact> = contacts
            .into_iter()
            .filter(|c| {
                if self.progress.has_row(c.row_id) {
                    info!(row = c.row_id, number = %c.display, "already sent in a previous run, skipping");
                    summary.skipped += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        let total = pending.len();
        info!(total, "starting dispatch");

        for (index, contact) in pending.into_iter().enumerate() {
            if let Some(kind) = self.shutdown.requested() {
                summary.interrupted = Some(kind);
                break;
            }

            if let Some(kind) = self.wait_for_window().await {
                summary.interrupted = Some(kind);
                break;
            }

            match self.send_one(&contact).await {
                ContactOutcome::Sent => summary.sent += 1,
                ContactOutcome::SendFailed => summary.failed += 1,
                // Validation already counted these
                ContactOutcome::NotRegistered | ContactOutcome::Skipped => {}
            }

            // Inter-message delay, skipped after the final contact
            if index + 1 < total {
                if let Some(kind) = self.pause(self.message_delay).await {
                    summary.interrupted = Some(kind);
                    break;
                }
            }
        }
    }

    async fn send_one(&mut self, contact: &Contact) -> ContactOutcome {
        let text = match self.template.render(contact) {
            Ok(text) => text,
            Err(e) => {
                error!(row = contact.row_id, number = %contact.display, error = %e, "template rendering failed");
                self.ledger.queue_status(
                    contact.row_id,
                    DeliveryStatus::Registered,
                    format!("send failed: {e}"),
                );
                return ContactOutcome::SendFailed;
            }
        };

        match self.client.send_message(&contact.canonical_id, &text).await {
            Ok(()) => {
                info!(row = contact.row_id, name = %contact.name, number = %contact.display, "message sent");
                if let Err(e) = self.progress.mark_completed(contact.row_id) {
                    error!(row = contact.row_id, error = %e, "failed to persist progress");
                }
                self.ledger
                    .queue_status(contact.row_id, DeliveryStatus::Registered, "message sent");
                ContactOutcome::Sent
            }
            Err(e) => {
                error!(row = contact.row_id, number = %contact.display, error = %e, "send failed");
                self.ledger.queue_status(
                    contact.row_id,
                    DeliveryStatus::Registered,
                    format!("send failed: {e}"),
                );
                ContactOutcome::SendFailed
            }
        }
    }

    /// Sleep until the sending window opens, rechecking after every wait
    async fn wait_for_window(&mut self) -> Option<ShutdownKind> {
        loop {
            let now = Utc::now();
            if self.window.is_within(now) {
                return None;
            }
            let wait = self.window.wait_until_open(now);
            info!(wait_minutes = wait.as_secs() / 60, "outside sending window, waiting");
            if let Some(kind) = self.pause(wait).await {
                return Some(kind);
            }
        }
    }

    /// Cooperative sleep: returns early when a shutdown is requested
    async fn pause(&mut self, duration: Duration) -> Option<ShutdownKind> {
        if let Some(kind) = self.shutdown.requested() {
            return Some(kind);
        }
        if duration.is_zero() {
            return None;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.shutdown.requested(),
            kind = self.shutdown.wait() => Some(kind),
        }
    }

    fn flush_ledger(&mut self) {
        if let Err(e) = self.ledger.flush() {
            error!(error = %e, "failed to persist status annotations");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::shutdown::shutdown_channel;
    use crate::ledger::{LoadOptions, StatusLedger};
    use crate::optout::OptOutRegistry;
    use crate::phone::CountryRules;
    use crate::store::{JsonlStore, RecordStore};
    use crate::transport::TransportError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted transport double recording every call
    #[derive(Default)]
    struct ScriptedClient {
        unregistered: HashSet<String>,
        failing_sends: HashSet<String>,
        check_errors: HashSet<String>,
        checks: Mutex<Vec<String>>,
        sends: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MessagingClient for ScriptedClient {
        async fn check_registered(&self, canonical_id: &str) -> Result<bool, TransportError> {
            self.checks.lock().unwrap().push(canonical_id.to_string());
            if self.check_errors.contains(canonical_id) {
                return Err(TransportError::Api {
                    status: 503,
                    message: "gateway unavailable".into(),
                });
            }
            Ok(!self.unregistered.contains(canonical_id))
        }

        async fn send_message(&self, canonical_id: &str, _text: &str) -> Result<(), TransportError> {
            if self.failing_sends.contains(canonical_id) {
                return Err(TransportError::Api {
                    status: 500,
                    message: "delivery failed".into(),
                });
            }
            self.sends.lock().unwrap().push(canonical_id.to_string());
            Ok(())
        }
    }

    fn all_day_window() -> SendWindow {
        SendWindow {
            start_minute: 0,
            end_minute: 24 * 60,
            utc_offset_minutes: 0,
        }
    }

    struct Fixture {
        temp: TempDir,
        source: std::path::PathBuf,
    }

    impl Fixture {
        fn new(lines: &[&str]) -> Self {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("contacts.jsonl");
            std::fs::write(&source, lines.join("\n")).unwrap();
            Self { temp, source }
        }

        fn ledger_and_contacts(&self) -> (StatusLedger, Vec<Contact>) {
            let rules = CountryRules::default();
            let optout = OptOutRegistry::load(self.temp.path().join("optout.txt"), &rules).unwrap();
            let store = JsonlStore::open(&self.source).unwrap();
            let mut ledger = StatusLedger::new(Box::new(store));
            let contacts = ledger.load_contacts(&rules, &optout, LoadOptions::default());
            (ledger, contacts)
        }

        fn progress(&self) -> ProgressTracker {
            ProgressTracker::for_source(self.temp.path().join("progress.json"), &self.source)
        }

        fn engine(&self, client: Arc<ScriptedClient>, ledger: StatusLedger) -> DispatchEngine {
            let (_handle, signal) = shutdown_channel();
            DispatchEngine::new(
                client,
                ledger,
                self.progress(),
                all_day_window(),
                MessageTemplate::new("Hola {{name}}").unwrap(),
                signal,
            )
            .with_message_delay(Duration::ZERO)
            .with_validation_delay(Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_send_failure_does_not_abort_batch() {
        let fixture = Fixture::new(&[
            r#"{"phone": "0412-123-4567", "name": "Ana"}"#,
            r#"{"phone": "0414-555-0001", "name": "Luis"}"#,
            r#"{"phone": "0416-555-0002", "name": "Mar"}"#,
        ]);
        let (ledger, contacts) = fixture.ledger_and_contacts();
        assert_eq!(contacts.len(), 3);

        let client = Arc::new(ScriptedClient {
            failing_sends: HashSet::from(["584145550001@c.us".to_string()]),
            ..Default::default()
        });
        let summary = fixture.engine(Arc::clone(&client), ledger).run(contacts).await;

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.completed_with_errors());
        // The third contact was still attempted
        let sends = client.sends.lock().unwrap();
        assert!(sends.contains(&"584165550002@c.us".to_string()));
    }

    #[tokio::test]
    async fn test_unregistered_contact_is_dropped_and_annotated() {
        let fixture = Fixture::new(&[
            r#"{"phone": "0412-123-4567", "name": "Ana"}"#,
            r#"{"phone": "0414-555-0001", "name": "Luis"}"#,
        ]);
        let (ledger, contacts) = fixture.ledger_and_contacts();

        let client = Arc::new(ScriptedClient {
            unregistered: HashSet::from(["584145550001@c.us".to_string()]),
            ..Default::default()
        });
        let summary = fixture.engine(Arc::clone(&client), ledger).run(contacts).await;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.not_registered, 1);

        let store = JsonlStore::open(&fixture.source).unwrap();
        assert_eq!(store.rows()[1].status(), Some(DeliveryStatus::NotRegistered));
        assert_eq!(store.rows()[0].status(), Some(DeliveryStatus::Registered));
    }

    #[tokio::test]
    async fn test_validation_error_leaves_row_pending() {
        let fixture = Fixture::new(&[r#"{"phone": "0412-123-4567", "name": "Ana"}"#]);
        let (ledger, contacts) = fixture.ledger_and_contacts();

        let client = Arc::new(ScriptedClient {
            check_errors: HashSet::from(["584121234567@c.us".to_string()]),
            ..Default::default()
        });
        let summary = fixture.engine(Arc::clone(&client), ledger).run(contacts).await;

        assert_eq!(summary.sent, 0);
        assert_eq!(summary.pending_validation, 1);

        // No status written: the row stays pending for a future run
        let store = JsonlStore::open(&fixture.source).unwrap();
        assert_eq!(store.rows()[0].status(), None);
    }

    #[tokio::test]
    async fn test_completed_rows_are_skipped() {
        let fixture = Fixture::new(&[
            r#"{"phone": "0412-123-4567", "name": "Ana"}"#,
            r#"{"phone": "0414-555-0001", "name": "Luis"}"#,
        ]);
        let (ledger, contacts) = fixture.ledger_and_contacts();

        fixture.progress().mark_completed(1).unwrap();

        let client = Arc::new(ScriptedClient::default());
        let summary = fixture.engine(Arc::clone(&client), ledger).run(contacts).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.sent, 1);
        let sends = client.sends.lock().unwrap();
        assert_eq!(sends.as_slice(), ["584145550001@c.us"]);
    }

    #[tokio::test]
    async fn test_trusted_registered_skips_lookup() {
        let fixture = Fixture::new(&[r#"{"phone": "0412-123-4567", "name": "Ana", "status": "REGISTERED"}"#]);
        let (ledger, contacts) = fixture.ledger_and_contacts();
        assert!(!contacts[0].needs_validation);

        let client = Arc::new(ScriptedClient::default());
        let summary = fixture.engine(Arc::clone(&client), ledger).run(contacts).await;

        assert_eq!(summary.sent, 1);
        assert!(client.checks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pre_triggered_shutdown_stops_before_any_send() {
        let fixture = Fixture::new(&[r#"{"phone": "0412-123-4567", "name": "Ana"}"#]);
        let (ledger, contacts) = fixture.ledger_and_contacts();

        let (handle, signal) = shutdown_channel();
        handle.trigger(ShutdownKind::Terminate);

        let client = Arc::new(ScriptedClient::default());
        let engine = DispatchEngine::new(
            Arc::clone(&client) as Arc<dyn MessagingClient>,
            ledger,
            fixture.progress(),
            all_day_window(),
            MessageTemplate::new("Hola {{name}}").unwrap(),
            signal,
        )
        .with_message_delay(Duration::ZERO)
        .with_validation_delay(Duration::ZERO);

        let summary = engine.run(contacts).await;
        assert_eq!(summary.interrupted, Some(ShutdownKind::Terminate));
        assert_eq!(summary.sent, 0);
        assert!(client.sends.lock().unwrap().is_empty());
    }
}
