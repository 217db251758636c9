//! Phone normalization and validation
//!
//! Pure functions: a raw phone value either maps to a canonical recipient
//! identifier or is rejected with a reason. Strict prefix whitelisting
//! rejects landlines and malformed numbers before the transport is ever
//! contacted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix that turns a canonical digit string into a platform-addressable id
pub const CANONICAL_SUFFIX: &str = "@c.us";

/// Why a raw phone value was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("no digits in input")]
    Empty,

    #[error("prefix '{0}' is not a valid mobile prefix")]
    BadPrefix(String),

    #[error("local number has {0} digits, expected {1}")]
    BadLength(usize, usize),
}

/// Country-specific normalization ruleset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryRules {
    /// International country code, digits only
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Whitelisted mobile prefixes of the local subscriber number
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,

    /// Expected length of the local subscriber number
    #[serde(default = "default_local_len")]
    pub local_len: usize,
}

fn default_country_code() -> String {
    "58".to_string()
}

fn default_prefixes() -> Vec<String> {
    ["412", "414", "416", "424", "426"].map(String::from).to_vec()
}

fn default_local_len() -> usize {
    10
}

impl Default for CountryRules {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            prefixes: default_prefixes(),
            local_len: default_local_len(),
        }
    }
}

/// A successfully normalized phone number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Platform-addressable recipient identifier (`<digits>@c.us`)
    pub canonical_id: String,
    /// Canonical digit string without the platform suffix
    pub display: String,
}

/// Normalize a raw phone value into a canonical number
///
/// Strips everything that is not a digit, drops the `00` international
/// marker and leading zeros, strips the country code when already present,
/// then validates the local number against the ruleset's prefix whitelist
/// and expected length. Deterministic and total: never panics.
pub fn normalize(raw: &str, rules: &CountryRules) -> Result<Normalized, RejectReason> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(RejectReason::Empty);
    }

    let digits = digits.strip_prefix("00").unwrap_or(&digits);
    let digits = digits.trim_start_matches('0');

    // Digits without the country code are treated as already local
    let local = digits.strip_prefix(rules.country_code.as_str()).unwrap_or(digits);

    if !rules.prefixes.iter().any(|p| local.starts_with(p.as_str())) {
        let seen: String = local.chars().take(3).collect();
        return Err(RejectReason::BadPrefix(seen));
    }

    if local.len() != rules.local_len {
        return Err(RejectReason::BadLength(local.len(), rules.local_len));
    }

    let display = format!("{}{}", rules.country_code, local);
    Ok(Normalized {
        canonical_id: format!("{display}{CANONICAL_SUFFIX}"),
        display,
    })
}
