//! Ordered event keys.
//!
//! Keys are ULIDs from a monotonic generator: a 48-bit millisecond prefix
//! followed by randomness that is incremented, not redrawn, within the same
//! millisecond. Their text form sorts the same way they were generated.

use std::fmt;
use std::sync::Mutex;

use binocular_common::error::{BinocularError, Result};
use ulid::{Generator, Ulid};

/// Key of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey(Ulid);

impl EventKey {
    /// Parses a key from its stored text form.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not a valid ULID.
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| BinocularError::Store {
                message: format!("invalid event key '{s}': {e}"),
            })
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe source of strictly increasing keys.
pub struct KeyGenerator {
    inner: Mutex<Generator>,
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator").finish_non_exhaustive()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    /// Creates a generator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Returns a key greater than every key this generator returned before.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned or the per-millisecond
    /// randomness space is exhausted.
    pub fn next_key(&self) -> Result<EventKey> {
        let mut generator = self.inner.lock().map_err(|_| BinocularError::Store {
            message: "key generator lock poisoned".into(),
        })?;
        generator
            .generate()
            .map(EventKey)
            .map_err(|e| BinocularError::Store {
                message: format!("key generation failed: {e}"),
            })
    }
}
