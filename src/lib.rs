//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`bridge-traits`, `core-runtime`, `core-playback`). Host applications
//! can depend on `audioplayer-workspace` and enable the documented features
//! without wiring each crate individually.

#[cfg(feature = "session")]
pub use bridge_traits;
#[cfg(any(feature = "session", feature = "audio-context"))]
pub use core_playback;
#[cfg(feature = "session")]
pub use core_runtime;
