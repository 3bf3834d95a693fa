//! Cross-invocation mutual exclusion
//!
//! Hotkey bindings can start several `avolt` processes at once. Volume
//! mutations run inside [`ConcurrencyGuard::with_guard`] so that the
//! read-modify-write sequences of different processes never interleave.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("failed to open guard '{name}': {source}")]
    Open { name: String, source: io::Error },

    #[error("failed to acquire guard '{name}': {source}")]
    Acquire { name: String, source: io::Error },

    #[error("failed to release guard '{name}': {source}")]
    Release { name: String, source: io::Error },
}

pub type Result<T> = std::result::Result<T, GuardError>;

/// Named mutual exclusion token shared by every process using the same name
pub trait ConcurrencyGuard {
    fn name(&self) -> &str;

    /// Run `body` while holding the token
    ///
    /// Blocks until the token is available. The token is released on every
    /// exit path of `body`, including unwinding. Once `body` has run its
    /// result is returned; a failure to give the token back is only logged.
    fn with_guard<T>(&self, body: impl FnOnce() -> T) -> Result<T>;
}

/// Guard that never blocks, used when exclusion is disabled in configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct Unguarded;

impl ConcurrencyGuard for Unguarded {
    fn name(&self) -> &str {
        "unguarded"
    }

    fn with_guard<T>(&self, body: impl FnOnce() -> T) -> Result<T> {
        Ok(body())
    }
}
