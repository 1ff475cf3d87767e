// Configuration file loading

use crate::{ConfigError, Result, Settings};
use std::fs;
use std::path::Path;

/// Loads [`Settings`] from TOML
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_file(path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse TOML; missing keys take their defaults.
    pub fn parse(content: &str) -> Result<Settings> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;

    #[test]
    fn test_parse_partial_toml() {
        let settings = ConfigLoader::parse(
            r#"
            environment = "production"
            spell_check = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.environment, Environment::Production);
        assert!(!settings.spell_check);
        assert_eq!(settings.log_level, "info");
        assert!(!settings.response_validation_enabled());
    }

    #[test]
    fn test_parse_rejects_unknown_environment() {
        assert!(ConfigLoader::parse(r#"environment = "staging-ish""#).is_err());
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let err = ConfigLoader::load_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
