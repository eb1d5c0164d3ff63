//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Gmail REST endpoint for the authenticated user.
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Full messages fetched and committed per storage transaction.
    pub batch_size: usize,
    /// Upper bound on message references listed in one run.
    pub max_results: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_results: 500,
        }
    }
}

/// Retry settings for provider calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub rules_file: PathBuf,
    pub log_file: PathBuf,
    pub api_base: String,
    pub access_token: SecretString,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    /// Unprocessed messages read per processing pass.
    pub process_batch_size: usize,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// `GMAIL_ACCESS_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".into()))?;

        let rules_file =
            std::env::var("MAIL_TRIAGE_RULES_FILE").unwrap_or_else(|_| "./rules.json".to_string());
        let api_base =
            std::env::var("GMAIL_API_BASE").unwrap_or_else(|_| DEFAULT_GMAIL_API_BASE.to_string());

        let defaults = FetchConfig::default();
        let fetch = FetchConfig {
            batch_size: env_number("MAIL_TRIAGE_FETCH_BATCH_SIZE", defaults.batch_size)?,
            max_results: env_number("MAIL_TRIAGE_MAX_RESULTS", defaults.max_results)?,
        };

        let retry = RetryConfig {
            base_delay: Duration::from_millis(env_number("MAIL_TRIAGE_RETRY_BASE_MS", 1000)?),
            ..RetryConfig::default()
        };

        let process_batch_size = env_number("MAIL_TRIAGE_PROCESS_BATCH_SIZE", 500)?;

        Ok(Self {
            db_path: Self::db_path_from_env(),
            rules_file: PathBuf::from(rules_file),
            log_file: Self::log_file_from_env(),
            api_base,
            access_token: SecretString::from(access_token),
            fetch,
            retry,
            process_batch_size,
        })
    }

    /// Database location; needed before the rest of the config for `--init-db`.
    pub fn db_path_from_env() -> PathBuf {
        std::env::var("MAIL_TRIAGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/mail-triage.db"))
    }

    /// Log file location; logging is set up before config is validated.
    pub fn log_file_from_env() -> PathBuf {
        std::env::var("MAIL_TRIAGE_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("app.log"))
    }

    /// Check that the files the run depends on are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rules_file.exists() {
            return Err(ConfigError::RulesFileMissing(
                self.rules_file.display().to_string(),
            ));
        }
        if self.fetch.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_TRIAGE_FETCH_BATCH_SIZE".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Read a numeric env var, falling back to `default` when unset.
fn env_number<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
