//! # loom-settings
//!
//! Layered configuration for the Loom memory subsystem.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LoomSettings::default()`]
//! 2. **User file**: `~/.loom/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LOOM_*` overrides (highest priority)
//!
//! There is no global instance. Load once at startup and pass the derived
//! config structs into the components that need them.
//!
//! ```no_run
//! let settings = loom_settings::load_settings()?;
//! println!("working memory: {}", settings.memory.hybrid.working_memory_size);
//! # Ok::<(), loom_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
