//! Contact derived per source row
//!
//! Contacts are rebuilt from the source on every load and never mutated in
//! place; passing validation produces a new value.

/// A dispatchable contact derived from one source row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// 1-based position of the originating row in the source
    pub row_id: u32,
    /// Platform-addressable recipient identifier
    pub canonical_id: String,
    /// Canonical digit string without the platform suffix
    pub display: String,
    /// Trimmed display name, falling back to the display number
    pub name: String,
    /// False only when a prior REGISTERED status is trusted
    pub needs_validation: bool,
}

impl Contact {
    /// Copy of this contact with validation satisfied
    pub fn validated(&self) -> Self {
        Self {
            needs_validation: false,
            ..self.clone()
        }
    }
}
