//! # vigil-settings
//!
//! Client configuration with layered sources.
//!
//! Loading flow:
//! 1. Start with compiled [`VigilSettings::default()`]
//! 2. If `~/.vigil/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

#![deny(unsafe_code)]

mod errors;
mod loader;
mod types;

pub use errors::SettingsError;
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{ConnectionSettings, PlanSettings, ServerSettings, TelemetrySettings, VigilSettings};
