//! Dispatch loop
//!
//! Composes transport, status ledger, progress tracker, sending window, and
//! template into the two-phase batch run.

mod engine;
mod shutdown;

pub use engine::{ContactOutcome, DispatchEngine, DispatchSummary};
pub use shutdown::{ShutdownHandle, ShutdownKind, ShutdownSignal, shutdown_channel};
