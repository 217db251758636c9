//! Status ledger
//!
//! Owns the record store, decides per row whether a contact enters the
//! dispatch set, and buffers status write-backs so a row touched several
//! times in one run costs a single write on flush.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::{Contact, DeliveryStatus, StatusRecord};
use crate::optout::OptOutRegistry;
use crate::phone::{CountryRules, normalize};
use crate::store::{RecordStore, StoreError};

/// Why a row was excluded from the dispatch set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Prior INVALID_NUMBER / NOT_REGISTERED status, not retried
    PriorFailure(DeliveryStatus),
    /// Prior OPT_OUT status or registry hit; never overridden
    OptedOut,
    /// Phone value failed normalization
    Rejected(String),
}

/// Load-time policy knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Revalidate contacts already marked REGISTERED
    pub force_revalidate: bool,
    /// Together with `force_revalidate`, retry rows previously marked
    /// INVALID_NUMBER or NOT_REGISTERED
    pub retry_failed: bool,
}

impl LoadOptions {
    fn retries_failures(&self) -> bool {
        self.force_revalidate && self.retry_failed
    }
}

pub struct StatusLedger {
    store: Box<dyn RecordStore>,
    /// Buffered annotations, last write wins per row
    pending: BTreeMap<u32, StatusRecord>,
}

impl StatusLedger {
    pub fn new(store: Box<dyn RecordStore>) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    pub fn source_path(&self) -> &Path {
        self.store.path()
    }

    /// Build the dispatch set from the source
    ///
    /// Rejected and opted-out rows get their status queued here; rows skipped
    /// for a prior status are left untouched.
    pub fn load_contacts(
        &mut self,
        rules: &CountryRules,
        optout: &OptOutRegistry,
        opts: LoadOptions,
    ) -> Vec<Contact> {
        let rows: Vec<(u32, Option<String>, Option<String>, Option<DeliveryStatus>)> = self
            .store
            .rows()
            .iter()
            .map(|r| (r.id, r.phone(), r.name(), r.status()))
            .collect();

        let total = rows.len();
        let mut contacts = Vec::new();

        for (row_id, raw_phone, raw_name, prior) in rows {
            match self.evaluate_row(row_id, raw_phone, raw_name, prior, rules, optout, opts) {
                Ok(contact) => contacts.push(contact),
                Err(reason) => {
                    debug!(row = row_id, ?reason, "row excluded from dispatch set");
                }
            }
        }

        info!(total, accepted = contacts.len(), "contact source evaluated");
        contacts
    }

    /// Decision order per row, first match wins:
    /// prior permanent failure, prior opt-out, normalization, registry hit.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_row(
        &mut self,
        row_id: u32,
        raw_phone: Option<String>,
        raw_name: Option<String>,
        prior: Option<DeliveryStatus>,
        rules: &CountryRules,
        optout: &OptOutRegistry,
        opts: LoadOptions,
    ) -> Result<Contact, SkipReason> {
        if let Some(status) = prior {
            if status.is_permanent_failure() && !opts.retries_failures() {
                debug!(row = row_id, %status, "skipping previously failed row");
                return Err(SkipReason::PriorFailure(status));
            }
            if status == DeliveryStatus::OptOut {
                debug!(row = row_id, "skipping opted-out row");
                return Err(SkipReason::OptedOut);
            }
        }

        let raw = raw_phone.unwrap_or_default();
        let normalized = match normalize(&raw, rules) {
            Ok(n) => n,
            Err(reason) => {
                warn!(row = row_id, phone = %raw, %reason, "invalid phone number");
                self.queue_status(row_id, DeliveryStatus::InvalidNumber, reason.to_string());
                return Err(SkipReason::Rejected(reason.to_string()));
            }
        };

        if optout.contains(&normalized.display) {
            info!(row = row_id, number = %normalized.display, "number is opted out");
            self.queue_status(row_id, DeliveryStatus::OptOut, "number is in the opt-out registry");
            return Err(SkipReason::OptedOut);
        }

        let name = raw_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| normalized.display.clone());

        Ok(Contact {
            row_id,
            canonical_id: normalized.canonical_id,
            display: normalized.display,
            name,
            needs_validation: !(prior == Some(DeliveryStatus::Registered) && !opts.force_revalidate),
        })
    }

    /// Buffer a status annotation for a row; last write wins
    pub fn queue_status(&mut self, row_id: u32, status: DeliveryStatus, message: impl Into<String>) {
        self.pending.insert(row_id, StatusRecord::now(status, message));
    }

    /// Number of annotations waiting to be written
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Materialize buffered annotations into the store and persist it
    ///
    /// Idempotent: a flush with nothing pending performs no write. On error
    /// the buffer is kept so the caller can retry.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            debug!("flush: nothing pending");
            return Ok(());
        }

        for (row_id, record) in &self.pending {
            self.store.annotate(*row_id, record)?;
        }
        self.store.persist()?;

        info!(updates = self.pending.len(), "flushed status annotations");
        self.pending.clear();
        Ok(())
    }
}
