//! Mixer backend implementations using ALSA
//!
//! ALSA exposes "simple elements" (Master, PCM, Headphone, ...) through its
//! mixer API. [`AlsaMixer`] keeps the mixer handle open for the lifetime of
//! one invocation and looks elements up by name on every call.

pub mod alsa_backend;

pub use alsa_backend::AlsaMixer;
