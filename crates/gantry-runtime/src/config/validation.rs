//! Configuration validation utilities.

use gantry_core::is_valid_app_name;

use super::error::{ConfigError, ConfigResult};
use super::schema::{GantryConfig, LogOutput, LoggingConfig, SupervisorConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &GantryConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_supervisor_config(&config.supervisor)?;
    validate_apps(config)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter target: {target:?}"
        )));
    }

    Ok(())
}

/// Validates supervisor settings.
fn validate_supervisor_config(supervisor: &SupervisorConfig) -> ConfigResult<()> {
    if supervisor.reload_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Reload timeout must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates app names.
fn validate_apps(config: &GantryConfig) -> ConfigResult<()> {
    if let Some(name) = config.apps.keys().find(|name| !is_valid_app_name(name)) {
        return Err(ConfigError::validation(format!(
            "Invalid app name {name:?}: names must be non-empty and contain no '.'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use serde_json::json;

    #[test]
    fn test_validate_empty_config() {
        let config = GantryConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_reload_timeout() {
        let mut config = GantryConfig::default();
        config.supervisor.reload_timeout_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = GantryConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("gantry.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_filter_targets() {
        let mut config = GantryConfig::default();
        config.logging.filters.insert(" ".into(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_app_names() {
        let mut config = GantryConfig::default();
        config.apps.insert("echo".into(), json!({}));
        assert!(validate_config(&config).is_ok());

        config.apps.insert("echo.v2".into(), json!({}));
        assert!(validate_config(&config).is_err());
    }
}
