//! Platform adapters for avolt
//!
//! - [`mixer::AlsaMixer`]: ALSA simple mixer elements as a
//!   [`MixerBackend`](avolt_core::domain::MixerBackend)
//! - [`guard::NamedSemaphore`]: POSIX named semaphore as a
//!   [`ConcurrencyGuard`](avolt_core::domain::ConcurrencyGuard)

pub mod guard;
pub mod mixer;

pub use guard::NamedSemaphore;
pub use mixer::AlsaMixer;
