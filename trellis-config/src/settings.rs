// Process-wide settings

use crate::{ConfigError, ConfigLoader, EnvLoader, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

static GLOBAL: OnceCell<Settings> = OnceCell::new();

thread_local! {
    static RESPONSE_VALIDATION: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidValue {
                key: "env".to_string(),
                value: other.to_string(),
                message: "expected development, test or production".to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Settings read by the endpoint engine.
///
/// `validate_responses` left unset means "validate everywhere except
/// production".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: Environment,
    pub validate_responses: Option<bool>,
    /// Defer dispatcher rebuilds to an explicit rebuild.
    pub bulk_compile: bool,
    /// Suggest spellings for mistyped keys in validation errors.
    pub spell_check: bool,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            validate_responses: None,
            bulk_compile: false,
            spell_check: true,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Defaults overlaid with `.env` and `TRELLIS_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::builder().dotenv(true).build()
    }

    /// Installed settings, or [`Settings::from_env`] on first use.
    ///
    /// Malformed variables fall back to defaults with a warning.
    pub fn global() -> &'static Settings {
        GLOBAL.get_or_init(|| {
            Self::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "invalid trellis settings, using defaults");
                Settings::default()
            })
        })
    }

    /// Install settings for the process. Fails if settings were already
    /// installed or read.
    pub fn install_global(self) -> std::result::Result<(), Settings> {
        GLOBAL.set(self)
    }

    pub fn response_validation_enabled(&self) -> bool {
        self.validate_responses
            .unwrap_or(self.environment != Environment::Production)
    }

    /// Overlay prefix-stripped variables (`env`, `validate_responses`, ...).
    pub fn apply_vars(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for (key, value) in vars {
            match key.as_str() {
                "env" | "environment" => self.environment = value.parse()?,
                "validate_responses" => self.validate_responses = Some(parse_bool(key, value)?),
                "bulk_compile" => self.bulk_compile = parse_bool(key, value)?,
                "spell_check" => self.spell_check = parse_bool(key, value)?,
                "log_level" => self.log_level = value.trim().to_lowercase(),
                "log_format" => self.log_format = value.trim().to_lowercase(),
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
            message: "expected a boolean".to_string(),
        }),
    }
}

/// Layers settings sources: defaults, TOML file, `.env`, environment.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    file: Option<std::path::PathBuf>,
    dotenv: bool,
    prefix: Option<String>,
    vars: Option<HashMap<String, String>>,
}

impl SettingsBuilder {
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load `.env` into the process environment before reading variables.
    pub fn dotenv(mut self, enabled: bool) -> Self {
        self.dotenv = enabled;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Use these raw variables instead of the process environment.
    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn build(self) -> Result<Settings> {
        let mut settings = match &self.file {
            Some(path) => ConfigLoader::load_file(path)?,
            None => Settings::default(),
        };

        if self.dotenv {
            // a missing .env is fine
            let _ = dotenvy::dotenv();
        }

        let loader = match self.prefix {
            Some(prefix) => EnvLoader::new(prefix),
            None => EnvLoader::default(),
        };
        let vars = match self.vars {
            Some(vars) => loader.collect(vars),
            None => loader.load(),
        };
        settings.apply_vars(&vars)?;
        Ok(settings)
    }
}

/// Restores the previous response-validation override when dropped.
#[must_use = "the override ends when the guard is dropped"]
pub struct OverrideGuard {
    previous: Option<bool>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        RESPONSE_VALIDATION.with(|cell| cell.set(self.previous));
    }
}

/// Force response validation on or off for the current thread.
pub fn response_validation_override(enabled: bool) -> OverrideGuard {
    let previous = RESPONSE_VALIDATION.with(|cell| cell.replace(Some(enabled)));
    OverrideGuard { previous }
}

/// Whether responses should be validated right now.
pub fn response_validation_enabled() -> bool {
    RESPONSE_VALIDATION
        .with(Cell::get)
        .unwrap_or_else(|| Settings::global().response_validation_enabled())
}
