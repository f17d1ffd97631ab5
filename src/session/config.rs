//! Session configuration.
//!
//! # Configuration Presets
//!
//! - [`SessionConfig::debug()`] - validates shadow state at shutdown and interns strings
//! - [`SessionConfig::release()`] - no shutdown validation, no string pool
//!
//! # Example
//!
//! ```rust
//! use dotprobe::session::SessionConfig;
//!
//! let config = SessionConfig::release()
//!     .with_track_context_tokens(true)
//!     .with_initial_slot_capacity(8);
//! assert!(!config.validate_on_shutdown);
//! ```

use crate::memory::DEFAULT_SLOT_CAPACITY;

/// Knobs of a [`Session`](crate::session::Session).
///
/// # Default Configuration
///
/// The default matches [`debug()`](Self::debug): shadow state is validated at shutdown,
/// coverage nodes carry context token 0, and strings are interned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Whether shutdown checks that every shadow stack and operand memory is empty.
    ///
    /// A failed check means the instrumentation lost a call/return pair.
    pub validate_on_shutdown: bool,

    /// Number of slots a fresh slot store reserves.
    pub initial_slot_capacity: usize,

    /// Whether coverage nodes carry a per-context token.
    ///
    /// When off every node carries context 0, so the same location reached from two
    /// threads is one node.
    pub track_context_tokens: bool,

    /// Whether strings handed to the instrumenter are interned in the string pool.
    pub intern_strings: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::debug()
    }
}

impl SessionConfig {
    /// Configuration for development runs of the instrumentation.
    #[must_use]
    pub fn debug() -> Self {
        SessionConfig {
            validate_on_shutdown: true,
            initial_slot_capacity: DEFAULT_SLOT_CAPACITY,
            track_context_tokens: false,
            intern_strings: true,
        }
    }

    /// Configuration for production runs.
    #[must_use]
    pub fn release() -> Self {
        SessionConfig {
            validate_on_shutdown: false,
            initial_slot_capacity: DEFAULT_SLOT_CAPACITY,
            track_context_tokens: false,
            intern_strings: false,
        }
    }

    /// Sets whether shutdown validates shadow state.
    #[must_use]
    pub fn with_validate_on_shutdown(mut self, validate: bool) -> Self {
        self.validate_on_shutdown = validate;
        self
    }

    /// Sets the initial slot count of new slot stores. Zero is raised to one.
    #[must_use]
    pub fn with_initial_slot_capacity(mut self, capacity: usize) -> Self {
        self.initial_slot_capacity = capacity.max(1);
        self
    }

    /// Sets whether coverage nodes carry per-context tokens.
    #[must_use]
    pub fn with_track_context_tokens(mut self, track: bool) -> Self {
        self.track_context_tokens = track;
        self
    }

    /// Sets whether the string pool is active.
    #[must_use]
    pub fn with_intern_strings(mut self, intern: bool) -> Self {
        self.intern_strings = intern;
        self
    }
}
