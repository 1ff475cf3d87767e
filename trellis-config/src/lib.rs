//! Settings for the Trellis endpoint engine.
//!
//! Settings are layered: built-in defaults, an optional TOML file, a `.env`
//! file, then `TRELLIS_*` environment variables.
//!
//! # Examples
//!
//! ```
//! use trellis_config::{Environment, Settings};
//!
//! let settings = Settings::builder()
//!     .vars([("TRELLIS_ENV", "production"), ("TRELLIS_SPELL_CHECK", "false")])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(settings.environment, Environment::Production);
//! assert!(!settings.response_validation_enabled());
//! assert!(!settings.spell_check);
//! ```
//!
//! Tests can force response validation for the current thread:
//!
//! ```
//! use trellis_config::{response_validation_enabled, response_validation_override};
//!
//! let _guard = response_validation_override(false);
//! assert!(!response_validation_enabled());
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::ConfigLoader;
pub use settings::{
    Environment, OverrideGuard, Settings, SettingsBuilder, response_validation_enabled,
    response_validation_override,
};
