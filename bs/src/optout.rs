//! Opt-out registry
//!
//! A permanent deny-list of canonical numbers. The on-disk file is
//! newline-delimited, sorted, and always normalized; loading a file that
//! drifted from that invariant rewrites it in place.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::phone::{CountryRules, normalize};

pub struct OptOutRegistry {
    path: PathBuf,
    numbers: BTreeSet<String>,
}

impl OptOutRegistry {
    /// Load the registry, normalizing every entry
    ///
    /// Entries that fail normalization are dropped with a warning. Any drift
    /// between the file and the normalized set (malformed entries,
    /// duplicates, un-normalized digits) triggers a rewrite so the file
    /// matches the in-memory invariant again.
    pub fn load(path: impl Into<PathBuf>, rules: &CountryRules) -> Result<Self> {
        let path = path.into();
        let mut numbers = BTreeSet::new();
        let mut rewrite_needed = false;

        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read opt-out file {}", path.display()))?;

            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match normalize(line, rules) {
                    Ok(n) => {
                        if n.display != line || !numbers.insert(n.display.clone()) {
                            rewrite_needed = true;
                        }
                    }
                    Err(e) => {
                        warn!(entry = line, reason = %e, "dropping malformed opt-out entry");
                        rewrite_needed = true;
                    }
                }
            }
        }

        let registry = Self { path, numbers };
        if rewrite_needed {
            registry.persist()?;
            info!(
                path = %registry.path.display(),
                entries = registry.numbers.len(),
                "rewrote opt-out file with normalized entries"
            );
        }
        debug!(entries = registry.numbers.len(), "opt-out registry loaded");
        Ok(registry)
    }

    /// Whether a canonical display number is opted out
    pub fn contains(&self, display: &str) -> bool {
        self.numbers.contains(display)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// All entries in sorted order
    pub fn numbers(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().map(String::as_str)
    }

    /// Normalize and add entries, persisting only when the set actually grew
    ///
    /// Never removes entries; malformed candidates are skipped with a
    /// warning. Returns whether anything was added.
    pub fn apply_updates(&mut self, entries: &[String], rules: &CountryRules) -> Result<bool> {
        let mut added = 0usize;

        for raw in entries {
            match normalize(raw, rules) {
                Ok(n) => {
                    if self.numbers.insert(n.display.clone()) {
                        info!(number = %n.display, "added opt-out entry");
                        added += 1;
                    } else {
                        debug!(number = %n.display, "opt-out entry already present");
                    }
                }
                Err(e) => warn!(entry = %raw, reason = %e, "skipping malformed opt-out candidate"),
            }
        }

        if added > 0 {
            self.persist()?;
        }
        Ok(added > 0)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        // Sorted, trailing newline iff non-empty: keeps the file diff-stable
        let mut out = self.numbers.iter().cloned().collect::<Vec<_>>().join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        fs::write(&self.path, out)
            .with_context(|| format!("Failed to write opt-out file {}", self.path.display()))
    }
}
