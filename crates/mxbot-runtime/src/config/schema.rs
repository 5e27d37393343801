//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use mxbot_core::Credentials;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MxbotConfig {
    /// Homeserver connection and account settings.
    #[serde(default)]
    pub matrix: MatrixConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Matrix
// =============================================================================

/// Homeserver connection and account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Homeserver base URL. `https://` is assumed when no scheme is given.
    #[serde(default)]
    pub homeserver: String,

    /// Pre-issued access token. Takes precedence over password login.
    #[serde(default)]
    pub access_token: Option<String>,

    /// User id or localpart for password login.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Device display name registered on password login.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Long-poll timeout of each sync request in milliseconds.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Timeout of ordinary API requests in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause after a failed sync before polling again, in milliseconds.
    #[serde(default = "default_sync_error_delay_ms")]
    pub sync_error_delay_ms: u64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            homeserver: String::new(),
            access_token: None,
            user_id: None,
            password: None,
            device_name: default_device_name(),
            sync_timeout_ms: default_sync_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            sync_error_delay_ms: default_sync_error_delay_ms(),
        }
    }
}

impl MatrixConfig {
    /// The homeserver URL with a scheme and without a trailing slash.
    pub fn homeserver_url(&self) -> String {
        let homeserver = self.homeserver.trim().trim_end_matches('/');
        if homeserver.contains("://") {
            homeserver.to_string()
        } else {
            format!("https://{homeserver}")
        }
    }

    /// Login credentials, preferring the access token.
    pub fn credentials(&self) -> Option<Credentials> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Some(Credentials::AccessToken(token.to_string()));
        }
        match (self.user_id.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials::Password {
                    user: user.to_string(),
                    password: password.to_string(),
                    device_name: self.device_name.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_error_delay(&self) -> Duration {
        Duration::from_millis(self.sync_error_delay_ms)
    }
}

fn default_device_name() -> String {
    "mxbot".to_string()
}

fn default_sync_timeout_ms() -> u64 {
    30000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_sync_error_delay_ms() -> u64 {
    5000
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `mxbot_client = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_defaults() {
        let config = MatrixConfig::default();
        assert_eq!(config.device_name, "mxbot");
        assert_eq!(config.sync_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.sync_error_delay(), Duration::from_secs(5));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn homeserver_gets_a_scheme() {
        let mut config = MatrixConfig {
            homeserver: "matrix.example.org/".into(),
            ..Default::default()
        };
        assert_eq!(config.homeserver_url(), "https://matrix.example.org");

        config.homeserver = "http://localhost:8008".into();
        assert_eq!(config.homeserver_url(), "http://localhost:8008");
    }

    #[test]
    fn access_token_wins_over_password() {
        let config = MatrixConfig {
            access_token: Some("syt_token".into()),
            user_id: Some("@bot:example.org".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.credentials(),
            Some(Credentials::AccessToken(token)) if token == "syt_token"
        ));
    }

    #[test]
    fn password_credentials_carry_the_device_name() {
        let config = MatrixConfig {
            user_id: Some("bot".into()),
            password: Some("hunter2".into()),
            device_name: "ops-bot".into(),
            ..Default::default()
        };
        match config.credentials() {
            Some(Credentials::Password {
                user, device_name, ..
            }) => {
                assert_eq!(user, "bot");
                assert_eq!(device_name, "ops-bot");
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn yaml_config_deserializes() {
        let config: MxbotConfig = serde_yaml::from_str(
            r#"
matrix:
  homeserver: matrix.example.org
  access_token: syt_token
  sync_timeout_ms: 10000
logging:
  level: debug
  format: pretty
  filters:
    mxbot_client: trace
"#,
        )
        .unwrap();
        assert_eq!(config.matrix.sync_timeout_ms, 10000);
        assert_eq!(config.matrix.request_timeout_secs, 60);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.filters["mxbot_client"], LogLevel::Trace);
    }

    #[test]
    fn toml_config_deserializes() {
        let config: MxbotConfig = toml::from_str(
            r#"
[matrix]
homeserver = "https://matrix.example.org"
user_id = "@bot:example.org"
password = "hunter2"

[logging]
output = "stderr"
"#,
        )
        .unwrap();
        assert_eq!(config.logging.output, LogOutput::Stderr);
        assert!(matches!(
            config.matrix.credentials(),
            Some(Credentials::Password { .. })
        ));
    }
}
