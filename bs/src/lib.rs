//! Bulksend - resumable bulk message dispatcher
//!
//! Drives templated message delivery to a roster of phone contacts through
//! an external messaging gateway, tolerating interruption and respecting a
//! daily sending window.
//!
//! # Core Concepts
//!
//! - **Strict Normalization**: numbers are whitelisted before the transport
//!   is ever contacted
//! - **State in Files**: per-row status lives in the contact source, resume
//!   progress in a shared ledger keyed by absolute source path
//! - **At-Least-Once**: a confirmed send is never repeated on resume; only
//!   the in-flight one can be
//! - **Sequential Dispatch**: one contact at a time, throttled, because the
//!   platform rate-limits by account
//!
//! # Modules
//!
//! - [`phone`] - Phone normalization and validation
//! - [`ledger`] - Per-row status decisions and buffered write-back
//! - [`progress`] - Resumable progress ledger
//! - [`optout`] - Permanent deny-list of canonical numbers
//! - [`window`] - Daily sending-window gate
//! - [`dispatch`] - The two-phase dispatch engine
//! - [`transport`] - Messaging gateway clients
//! - [`store`] - Contact source abstraction

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod ledger;
pub mod optout;
pub mod phone;
pub mod progress;
pub mod store;
pub mod template;
pub mod transport;
pub mod window;

// Re-export commonly used types
pub use config::{Config, TransportConfig};
pub use dispatch::{
    ContactOutcome, DispatchEngine, DispatchSummary, ShutdownHandle, ShutdownKind, ShutdownSignal, shutdown_channel,
};
pub use domain::{Contact, DeliveryStatus, StatusRecord};
pub use ledger::{LoadOptions, SkipReason, StatusLedger};
pub use optout::OptOutRegistry;
pub use phone::{CountryRules, Normalized, RejectReason, normalize};
pub use progress::ProgressTracker;
pub use store::{JsonlStore, RecordRow, RecordStore, StoreError};
pub use template::{DEFAULT_TEMPLATE, MessageTemplate};
pub use transport::{HttpGatewayClient, MessagingClient, NullClient, TransportError, create_client};
pub use window::SendWindow;
