//! Domain entities and business rules

pub mod config;
pub mod curve;
pub mod engine;
pub mod guard;
pub mod mixer;
pub mod profile;
pub mod range;
pub mod volume;

// Re-export specific items; every module has its own `Result` alias
pub use config::{AvoltConfig, ConfigError, ConfigManager, ProfileConfig};
pub use engine::{
    Confirm, Decline, EngineError, ExecutionOutcome, ExitStatus, VolumeChange, VolumeChangeEngine,
    VolumeRequest,
};
pub use guard::{ConcurrencyGuard, GuardError, Unguarded};
pub use mixer::memory::{MemoryElement, MemoryMixer, MixerWrite};
pub use mixer::{BackendError, Channel, ElementId, ElementInfo, MixerBackend, RoundDirection};
pub use profile::{
    find_profile, resolve_profiles, ProfileError, ProfileSelector, SoundProfile, ToggleGroup,
};
pub use range::{map_range, Range, RangeError};
pub use volume::{VolumeAccessor, VolumeError, VolumeRepresentation};
