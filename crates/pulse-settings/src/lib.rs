//! # pulse-settings
//!
//! Layered configuration for the pulse server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`PulseSettings::default()`])
//! 2. **User file**: `~/.pulse/settings.json`, or the path given on the
//!    command line (deep-merged over defaults)
//! 3. **Environment variables**: `PULSE_*` overrides (highest priority)
//!
//! There is no global instance; the binary loads settings once and passes
//! them down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
