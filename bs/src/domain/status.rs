//! Per-row delivery status model
//!
//! Each contact row carries at most one three-field annotation (status,
//! message, timestamp); writing a new one replaces the prior triple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal classification of a contact as of its last check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "INVALID_NUMBER")]
    InvalidNumber,
    #[serde(rename = "NOT_REGISTERED")]
    NotRegistered,
    #[serde(rename = "REGISTERED")]
    Registered,
    #[serde(rename = "OPT_OUT")]
    OptOut,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::InvalidNumber => "INVALID_NUMBER",
            DeliveryStatus::NotRegistered => "NOT_REGISTERED",
            DeliveryStatus::Registered => "REGISTERED",
            DeliveryStatus::OptOut => "OPT_OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INVALID_NUMBER" => Some(DeliveryStatus::InvalidNumber),
            "NOT_REGISTERED" => Some(DeliveryStatus::NotRegistered),
            "REGISTERED" => Some(DeliveryStatus::Registered),
            "OPT_OUT" => Some(DeliveryStatus::OptOut),
            _ => None,
        }
    }

    /// Permanent failures are not retried on ordinary runs
    pub fn is_permanent_failure(&self) -> bool {
        matches!(self, DeliveryStatus::InvalidNumber | DeliveryStatus::NotRegistered)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The annotation written back to a contact row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: DeliveryStatus,
    /// Human explanation of the last decision
    pub message: String,
    /// Time of last update, ISO-8601
    pub timestamp: DateTime<Utc>,
}

impl StatusRecord {
    pub fn now(status: DeliveryStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
