//! Cross-crate integration scenarios for avolt
//!
//! Everything here runs against the in-memory mixer, so no sound card is
//! needed. The semaphore scenarios use real POSIX named semaphores with
//! per-process names.

#[cfg(test)]
mod engine_scenarios;
#[cfg(test)]
mod semaphore_exclusion;
