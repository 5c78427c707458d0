use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Configuration source information for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
}

/// Tuning knobs for through relationship resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThroughConfig {
    /// Maximum recursion depth of a single path resolution
    pub max_path_depth: usize,
    /// Fall back to plural/singular relation names when an exact lookup fails
    pub normalize_names: bool,
    /// Primary key used for models registered without an explicit one
    pub default_primary_key: String,
}

impl Default for ThroughConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 64,
            normalize_names: true,
            default_primary_key: "id".to_string(),
        }
    }
}

impl ThroughConfig {
    /// Load configuration from environment variables, using defaults for unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_path_depth = get_env_or_default(
            "ELIF_THROUGH_MAX_DEPTH",
            &defaults.max_path_depth.to_string(),
        );
        let max_path_depth = max_path_depth
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "max_path_depth".to_string(),
                value: max_path_depth,
                expected: "positive integer".to_string(),
            })?;

        let normalize_names = get_env_or_default("ELIF_THROUGH_NORMALIZE_NAMES", "true");
        let normalize_names = parse_bool("normalize_names", &normalize_names)?;

        let default_primary_key =
            get_env_or_default("ELIF_THROUGH_PRIMARY_KEY", &defaults.default_primary_key);

        let config = Self {
            max_path_depth,
            normalize_names,
            default_primary_key,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_depth == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_path_depth".to_string(),
                reason: "Maximum path depth must be greater than 0".to_string(),
            });
        }

        if self.default_primary_key.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "default_primary_key".to_string(),
                reason: "Default primary key cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Report where each setting was read from
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        for (field, var) in [
            ("max_path_depth", "ELIF_THROUGH_MAX_DEPTH"),
            ("normalize_names", "ELIF_THROUGH_NORMALIZE_NAMES"),
            ("default_primary_key", "ELIF_THROUGH_PRIMARY_KEY"),
        ] {
            let source = if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(field.to_string())
            };
            sources.insert(field.to_string(), source);
        }
        sources
    }

    pub fn with_max_path_depth(mut self, max_path_depth: usize) -> Self {
        self.max_path_depth = max_path_depth;
        self
    }

    pub fn with_normalize_names(mut self, normalize_names: bool) -> Self {
        self.normalize_names = normalize_names;
        self
    }

    pub fn with_default_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.default_primary_key = primary_key.into();
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_test_env() {
        env::remove_var("ELIF_THROUGH_MAX_DEPTH");
        env::remove_var("ELIF_THROUGH_NORMALIZE_NAMES");
        env::remove_var("ELIF_THROUGH_PRIMARY_KEY");
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clean_test_env();

        let config = ThroughConfig::from_env().unwrap();
        assert_eq!(config, ThroughConfig::default());
        assert_eq!(config.max_path_depth, 64);
        assert!(config.normalize_names);
        assert_eq!(config.default_primary_key, "id");

        let sources = config.config_sources();
        assert_eq!(
            sources.get("max_path_depth"),
            Some(&ConfigSource::Default("max_path_depth".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clean_test_env();
        env::set_var("ELIF_THROUGH_MAX_DEPTH", "12");
        env::set_var("ELIF_THROUGH_NORMALIZE_NAMES", "off");
        env::set_var("ELIF_THROUGH_PRIMARY_KEY", "uuid");

        let config = ThroughConfig::from_env().unwrap();
        assert_eq!(config.max_path_depth, 12);
        assert!(!config.normalize_names);
        assert_eq!(config.default_primary_key, "uuid");
        assert_eq!(
            config.config_sources().get("default_primary_key"),
            Some(&ConfigSource::EnvVar("ELIF_THROUGH_PRIMARY_KEY".to_string()))
        );

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        clean_test_env();

        env::set_var("ELIF_THROUGH_MAX_DEPTH", "deep");
        assert!(matches!(
            ThroughConfig::from_env(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "max_path_depth"
        ));

        env::set_var("ELIF_THROUGH_MAX_DEPTH", "0");
        assert!(matches!(
            ThroughConfig::from_env(),
            Err(ConfigError::ValidationFailed { ref field, .. }) if field == "max_path_depth"
        ));
        env::remove_var("ELIF_THROUGH_MAX_DEPTH");

        env::set_var("ELIF_THROUGH_NORMALIZE_NAMES", "maybe");
        assert!(matches!(
            ThroughConfig::from_env(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "normalize_names"
        ));

        clean_test_env();
    }

    #[test]
    fn test_config_builder_validation() {
        let config = ThroughConfig::default().with_default_primary_key("  ");
        assert!(config.validate().is_err());

        let config = ThroughConfig::default()
            .with_max_path_depth(8)
            .with_normalize_names(false)
            .with_default_primary_key("uuid");
        assert!(config.validate().is_ok());
        assert_eq!(config.max_path_depth, 8);
    }
}
