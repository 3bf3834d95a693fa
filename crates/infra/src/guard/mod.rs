//! Cross-process guard implementations

pub mod semaphore;

pub use semaphore::NamedSemaphore;
