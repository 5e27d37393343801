//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, MatrixConfig, MxbotConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MxbotConfig) -> ConfigResult<()> {
    validate_matrix_config(&config.matrix)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates homeserver and account settings.
fn validate_matrix_config(matrix: &MatrixConfig) -> ConfigResult<()> {
    if matrix.homeserver.trim().is_empty() {
        return Err(ConfigError::missing_field("matrix.homeserver"));
    }
    validate_url(&matrix.homeserver_url())?;

    if matrix.credentials().is_none() {
        return Err(ConfigError::validation(
            "Either matrix.access_token or matrix.user_id with matrix.password must be set",
        ));
    }

    if matrix.sync_timeout_ms == 0 {
        return Err(ConfigError::validation("Sync timeout must be greater than 0"));
    }

    if matrix.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Request timeout must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates a homeserver URL.
fn validate_url(url: &str) -> ConfigResult<()> {
    let valid_schemes = ["http://", "https://"];

    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {:?}", valid_schemes),
        ));
    }

    if url.len() <= url.find("://").map_or(0, |i| i + 3) {
        return Err(ConfigError::invalid_url(url, "URL has no host"));
    }

    Ok(())
}
