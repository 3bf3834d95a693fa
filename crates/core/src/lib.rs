//! Volume representation and change engine for avolt
//!
//! The crate is split the same way the command line tool thinks about a
//! volume change: pure range arithmetic, volume representations read and
//! written through a [`domain::mixer::MixerBackend`], sound profile
//! selection, a cross-process guard, and the engine that ties them together
//! for one invocation.

pub mod domain;
