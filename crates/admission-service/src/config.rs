//! Admission service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default minimum interval between admission attempts for one meeting.
pub const DEFAULT_ADMISSION_MIN_INTERVAL_MS: u64 = 5_000;

/// Default age after which rate limiter entries are purged.
pub const DEFAULT_RATE_LIMIT_HORIZON_SECONDS: u64 = 60;

/// Default maximum ticket age before the sweep reclaims it (4 hours).
///
/// Covers the longest expected meeting; see DESIGN.md for the rationale.
pub const DEFAULT_TICKET_MAX_AGE_SECONDS: u64 = 14_400;

/// Default age after which an unconfirmed (`in_progress`) ticket is
/// reclaimed. Raised automatically when the attach budget is longer.
pub const DEFAULT_IN_PROGRESS_MAX_AGE_SECONDS: u64 = 300;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 120;

/// Default per-attempt timeout for the agent attach operation.
pub const DEFAULT_ATTACH_TIMEOUT_SECONDS: u64 = 30;

/// Default number of attach attempts on transient failures.
pub const DEFAULT_ATTACH_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for `ATTACH_MAX_ATTEMPTS`.
pub const MAX_ATTACH_ATTEMPTS: u32 = 10;

/// Base delay between attach attempts; attempt `n` waits `n * backoff`.
pub const ATTACH_RETRY_BACKOFF_MS: u64 = 500;

/// Allowance for the store round trips around an attach (grant, confirm/abort).
pub const ATTACH_BUDGET_SLACK_SECONDS: u64 = 10;

/// Default agent connector base URL.
pub const DEFAULT_AGENT_CONNECTOR_URL: &str = "http://localhost:8090";

/// Agent used when a webhook payload does not name one.
pub const DEFAULT_AGENT_ID: &str = "default-agent";

/// Minimum webhook secret length in bytes.
pub const MIN_WEBHOOK_SECRET_LENGTH: usize = 16;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "admission";

/// Admission service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Database URL and webhook secret are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Unique identifier for this service instance.
    /// Recorded as `issued_by` on every ticket this instance creates.
    pub instance_id: String,

    /// Minimum interval between allowed attempts for the same meeting, in
    /// milliseconds. Zero disables throttling.
    pub admission_min_interval_ms: u64,

    /// Age after which rate limiter entries are purged.
    pub rate_limit_horizon_seconds: u64,

    /// Tickets older than this are reclaimed by the sweep, regardless of state.
    /// Always longer than the attach budget.
    pub ticket_max_age_seconds: u64,

    /// `in_progress` tickets older than this are reclaimed by the sweep.
    /// Always longer than the attach budget and at most `ticket_max_age_seconds`.
    pub in_progress_max_age_seconds: u64,

    /// Interval of the in-process sweeper.
    pub sweep_interval_seconds: u64,

    /// Whether the in-process sweeper runs. `/internal/sweep` is always available.
    pub sweep_enabled: bool,

    /// Per-attempt timeout for the agent attach operation.
    pub attach_timeout_seconds: u64,

    /// Attach attempts on transient failures (1 = no retry).
    pub attach_max_attempts: u32,

    /// Base URL of the agent connector.
    pub agent_connector_url: String,

    /// Agent used when a webhook payload does not name one.
    pub default_agent_id: String,

    /// HMAC-SHA256 secret for webhook signatures. `None` only when
    /// verification was explicitly disabled with `WEBHOOK_VERIFY=false`.
    pub webhook_secret: Option<SecretString>,

    /// Maximum database pool connections.
    pub db_max_connections: u32,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("instance_id", &self.instance_id)
            .field("admission_min_interval_ms", &self.admission_min_interval_ms)
            .field(
                "rate_limit_horizon_seconds",
                &self.rate_limit_horizon_seconds,
            )
            .field("ticket_max_age_seconds", &self.ticket_max_age_seconds)
            .field(
                "in_progress_max_age_seconds",
                &self.in_progress_max_age_seconds,
            )
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field("sweep_enabled", &self.sweep_enabled)
            .field("attach_timeout_seconds", &self.attach_timeout_seconds)
            .field("attach_max_attempts", &self.attach_max_attempts)
            .field("agent_connector_url", &self.agent_connector_url)
            .field("default_agent_id", &self.default_agent_id)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid ticket expiry configuration: {0}")]
    InvalidTicketExpiry(String),

    #[error("Invalid attach configuration: {0}")]
    InvalidAttach(String),

    #[error("Invalid webhook secret: {0}")]
    InvalidWebhookSecret(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Worst-case seconds from an admission grant to its confirm or abort:
/// every attempt timing out, every backoff slept, plus store round trips.
pub fn attach_budget_seconds(attach_timeout_seconds: u64, attach_max_attempts: u32) -> u64 {
    let attempts = u64::from(attach_max_attempts.max(1));
    let backoff_ms = ATTACH_RETRY_BACKOFF_MS * attempts * (attempts - 1) / 2;
    attempts * attach_timeout_seconds + backoff_ms.div_ceil(1000) + ATTACH_BUDGET_SLACK_SECONDS
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        // Rate limiter: zero interval is allowed and disables throttling
        let admission_min_interval_ms = parse_u64(
            vars,
            "ADMISSION_MIN_INTERVAL_MS",
            DEFAULT_ADMISSION_MIN_INTERVAL_MS,
        )
        .map_err(ConfigError::InvalidRateLimit)?;

        let rate_limit_horizon_seconds = parse_u64(
            vars,
            "RATE_LIMIT_HORIZON_SECONDS",
            DEFAULT_RATE_LIMIT_HORIZON_SECONDS,
        )
        .map_err(ConfigError::InvalidRateLimit)?;

        if rate_limit_horizon_seconds == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "RATE_LIMIT_HORIZON_SECONDS must be greater than 0".to_string(),
            ));
        }

        if rate_limit_horizon_seconds.saturating_mul(1000) < admission_min_interval_ms {
            return Err(ConfigError::InvalidRateLimit(format!(
                "RATE_LIMIT_HORIZON_SECONDS ({}s) must not be shorter than ADMISSION_MIN_INTERVAL_MS ({}ms)",
                rate_limit_horizon_seconds, admission_min_interval_ms
            )));
        }

        let ticket_max_age_seconds = parse_u64(
            vars,
            "TICKET_MAX_AGE_SECONDS",
            DEFAULT_TICKET_MAX_AGE_SECONDS,
        )
        .map_err(ConfigError::InvalidTicketExpiry)?;

        if ticket_max_age_seconds == 0 {
            return Err(ConfigError::InvalidTicketExpiry(
                "TICKET_MAX_AGE_SECONDS must be greater than 0".to_string(),
            ));
        }

        let sweep_interval_seconds = parse_u64(
            vars,
            "SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )
        .map_err(ConfigError::InvalidTicketExpiry)?;

        if sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidTicketExpiry(
                "SWEEP_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let sweep_enabled = match vars.get("SWEEP_ENABLED") {
            Some(value) => value.parse::<bool>().map_err(|e| ConfigError::InvalidValue {
                name: "SWEEP_ENABLED".to_string(),
                reason: format!("must be 'true' or 'false', got '{}': {}", value, e),
            })?,
            None => true,
        };

        let attach_timeout_seconds = parse_u64(
            vars,
            "ATTACH_TIMEOUT_SECONDS",
            DEFAULT_ATTACH_TIMEOUT_SECONDS,
        )
        .map_err(ConfigError::InvalidAttach)?;

        if attach_timeout_seconds == 0 {
            return Err(ConfigError::InvalidAttach(
                "ATTACH_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let attach_max_attempts = if let Some(value_str) = vars.get("ATTACH_MAX_ATTEMPTS") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidAttach(format!(
                    "ATTACH_MAX_ATTEMPTS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_ATTACH_ATTEMPTS {
                return Err(ConfigError::InvalidAttach(format!(
                    "ATTACH_MAX_ATTEMPTS must be between 1 and {}, got {}",
                    MAX_ATTACH_ATTEMPTS, value
                )));
            }

            value
        } else {
            DEFAULT_ATTACH_MAX_ATTEMPTS
        };

        let agent_connector_url = vars
            .get("AGENT_CONNECTOR_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AGENT_CONNECTOR_URL.to_string());

        let default_agent_id = vars
            .get("DEFAULT_AGENT_ID")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());

        // A sweep shorter than the attach budget would delete a ticket whose
        // attach is still running and let a second caller in.
        let attach_budget = attach_budget_seconds(attach_timeout_seconds, attach_max_attempts);

        if ticket_max_age_seconds <= attach_budget {
            return Err(ConfigError::InvalidTicketExpiry(format!(
                "TICKET_MAX_AGE_SECONDS ({}s) must exceed the worst-case attach time ({}s)",
                ticket_max_age_seconds, attach_budget
            )));
        }

        let in_progress_max_age_seconds = match vars.get("TICKET_IN_PROGRESS_MAX_AGE_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidTicketExpiry(format!(
                        "TICKET_IN_PROGRESS_MAX_AGE_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value <= attach_budget || value > ticket_max_age_seconds {
                    return Err(ConfigError::InvalidTicketExpiry(format!(
                        "TICKET_IN_PROGRESS_MAX_AGE_SECONDS must be greater than the worst-case attach time ({}s) and at most TICKET_MAX_AGE_SECONDS ({}s), got {}",
                        attach_budget, ticket_max_age_seconds, value
                    )));
                }

                value
            }
            None => DEFAULT_IN_PROGRESS_MAX_AGE_SECONDS
                .max(attach_budget + 1)
                .min(ticket_max_age_seconds),
        };

        let webhook_verify = match vars.get("WEBHOOK_VERIFY") {
            Some(value) => value.parse::<bool>().map_err(|e| ConfigError::InvalidValue {
                name: "WEBHOOK_VERIFY".to_string(),
                reason: format!("must be 'true' or 'false', got '{}': {}", value, e),
            })?,
            None => true,
        };

        // A configured secret is always enforced; running without one must be
        // an explicit choice.
        let webhook_secret = match vars.get("WEBHOOK_SECRET") {
            Some(secret) if secret.len() < MIN_WEBHOOK_SECRET_LENGTH => {
                return Err(ConfigError::InvalidWebhookSecret(format!(
                    "WEBHOOK_SECRET must be at least {} bytes, got {}",
                    MIN_WEBHOOK_SECRET_LENGTH,
                    secret.len()
                )));
            }
            Some(secret) => Some(SecretString::from(secret.clone())),
            None if webhook_verify => {
                return Err(ConfigError::InvalidWebhookSecret(
                    "WEBHOOK_SECRET is required unless WEBHOOK_VERIFY=false".to_string(),
                ));
            }
            None => None,
        };

        let db_max_connections = if let Some(value_str) = vars.get("DB_MAX_CONNECTIONS") {
            let value: u32 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
                name: "DB_MAX_CONNECTIONS".to_string(),
                reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "DB_MAX_CONNECTIONS".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }

            value
        } else {
            DEFAULT_DB_MAX_CONNECTIONS
        };

        // Generate instance ID
        let instance_id = vars.get("INSTANCE_ID").cloned().unwrap_or_else(|| {
            // Generate a unique ID based on hostname and UUID suffix
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            // Use first 8 chars of UUID for uniqueness
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!(
                "{}-{}-{}",
                DEFAULT_INSTANCE_ID_PREFIX, hostname, short_suffix
            )
        });

        Ok(Config {
            database_url,
            bind_address,
            instance_id,
            admission_min_interval_ms,
            rate_limit_horizon_seconds,
            ticket_max_age_seconds,
            in_progress_max_age_seconds,
            sweep_interval_seconds,
            sweep_enabled,
            attach_timeout_seconds,
            attach_max_attempts,
            agent_connector_url,
            default_agent_id,
            webhook_secret,
            db_max_connections,
        })
    }

    pub fn admission_min_interval(&self) -> Duration {
        Duration::from_millis(self.admission_min_interval_ms)
    }

    pub fn rate_limit_horizon(&self) -> Duration {
        Duration::from_secs(self.rate_limit_horizon_seconds)
    }

    pub fn ticket_max_age(&self) -> Duration {
        Duration::from_secs(self.ticket_max_age_seconds)
    }

    pub fn in_progress_max_age(&self) -> Duration {
        Duration::from_secs(self.in_progress_max_age_seconds)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_seconds)
    }

    /// Worst-case time from an admission grant to its confirm or abort.
    pub fn attach_budget(&self) -> Duration {
        Duration::from_secs(attach_budget_seconds(
            self.attach_timeout_seconds,
            self.attach_max_attempts,
        ))
    }

    /// Webhook secret bytes, if verification is enabled.
    pub fn webhook_secret_bytes(&self) -> Option<&[u8]> {
        self.webhook_secret
            .as_ref()
            .map(|secret| secret.expose_secret().as_bytes())
    }
}

/// Parse an optional non-negative integer variable.
fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, String> {
    match vars.get(name) {
        Some(value_str) => value_str.parse().map_err(|e| {
            format!(
                "{} must be a valid positive integer, got '{}': {}",
                name, value_str, e
            )
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123";

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/admission_test".to_string(),
            ),
            ("WEBHOOK_SECRET".to_string(), SECRET.to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = base_vars();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/admission_test");
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.admission_min_interval_ms,
            DEFAULT_ADMISSION_MIN_INTERVAL_MS
        );
        assert_eq!(
            config.rate_limit_horizon_seconds,
            DEFAULT_RATE_LIMIT_HORIZON_SECONDS
        );
        assert_eq!(config.ticket_max_age_seconds, DEFAULT_TICKET_MAX_AGE_SECONDS);
        assert_eq!(
            config.in_progress_max_age_seconds,
            DEFAULT_IN_PROGRESS_MAX_AGE_SECONDS
        );
        assert_eq!(config.sweep_interval_seconds, DEFAULT_SWEEP_INTERVAL_SECONDS);
        assert!(config.sweep_enabled);
        assert_eq!(config.attach_timeout_seconds, DEFAULT_ATTACH_TIMEOUT_SECONDS);
        assert_eq!(config.attach_max_attempts, DEFAULT_ATTACH_MAX_ATTEMPTS);
        assert_eq!(config.agent_connector_url, DEFAULT_AGENT_CONNECTOR_URL);
        assert_eq!(config.default_agent_id, DEFAULT_AGENT_ID);
        assert_eq!(config.webhook_secret_bytes(), Some(SECRET.as_bytes()));
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        // Instance ID should be auto-generated
        assert!(config.instance_id.starts_with("admission-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("INSTANCE_ID".to_string(), "admission-test-01".to_string());
        vars.insert("ADMISSION_MIN_INTERVAL_MS".to_string(), "2500".to_string());
        vars.insert("RATE_LIMIT_HORIZON_SECONDS".to_string(), "30".to_string());
        vars.insert("TICKET_MAX_AGE_SECONDS".to_string(), "600".to_string());
        vars.insert(
            "TICKET_IN_PROGRESS_MAX_AGE_SECONDS".to_string(),
            "120".to_string(),
        );
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "60".to_string());
        vars.insert("SWEEP_ENABLED".to_string(), "false".to_string());
        vars.insert("ATTACH_TIMEOUT_SECONDS".to_string(), "10".to_string());
        vars.insert("ATTACH_MAX_ATTEMPTS".to_string(), "5".to_string());
        vars.insert(
            "AGENT_CONNECTOR_URL".to_string(),
            "https://connector.internal".to_string(),
        );
        vars.insert("DEFAULT_AGENT_ID".to_string(), "agent-7".to_string());
        vars.insert(
            "WEBHOOK_SECRET".to_string(),
            "fedcba9876543210fedcba".to_string(),
        );
        vars.insert("DB_MAX_CONNECTIONS".to_string(), "5".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.instance_id, "admission-test-01");
        assert_eq!(config.admission_min_interval(), Duration::from_millis(2500));
        assert_eq!(config.rate_limit_horizon(), Duration::from_secs(30));
        assert_eq!(config.ticket_max_age(), Duration::from_secs(600));
        assert_eq!(config.in_progress_max_age(), Duration::from_secs(120));
        assert_eq!(config.sweep_interval_seconds, 60);
        assert!(!config.sweep_enabled);
        assert_eq!(config.attach_timeout(), Duration::from_secs(10));
        assert_eq!(config.attach_max_attempts, 5);
        assert_eq!(config.agent_connector_url, "https://connector.internal");
        assert_eq!(config.default_agent_id, "agent-7");
        assert_eq!(
            config.webhook_secret_bytes(),
            Some("fedcba9876543210fedcba".as_bytes())
        );
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let vars = HashMap::new();

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_min_interval_zero_disables_throttle() {
        let mut vars = base_vars();
        vars.insert("ADMISSION_MIN_INTERVAL_MS".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.admission_min_interval(), Duration::ZERO);
    }

    #[test]
    fn test_min_interval_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("ADMISSION_MIN_INTERVAL_MS".to_string(), "soon".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRateLimit(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_horizon_shorter_than_interval_rejected() {
        let mut vars = base_vars();
        vars.insert("ADMISSION_MIN_INTERVAL_MS".to_string(), "10000".to_string());
        vars.insert("RATE_LIMIT_HORIZON_SECONDS".to_string(), "5".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRateLimit(msg)) if msg.contains("must not be shorter"))
        );
    }

    #[test]
    fn test_horizon_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ADMISSION_MIN_INTERVAL_MS".to_string(), "0".to_string());
        vars.insert("RATE_LIMIT_HORIZON_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidRateLimit(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_ticket_max_age_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("TICKET_MAX_AGE_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTicketExpiry(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_sweep_interval_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidTicketExpiry(_))));
    }

    #[test]
    fn test_sweep_enabled_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("SWEEP_ENABLED".to_string(), "yes please".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "SWEEP_ENABLED")
        );
    }

    #[test]
    fn test_attach_max_attempts_bounds() {
        let mut vars = base_vars();
        vars.insert("ATTACH_MAX_ATTEMPTS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAttach(_))
        ));

        vars.insert("ATTACH_MAX_ATTEMPTS".to_string(), "11".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidAttach(_))
        ));

        vars.insert("ATTACH_MAX_ATTEMPTS".to_string(), "10".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.attach_max_attempts, 10);
    }

    #[test]
    fn test_attach_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ATTACH_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidAttach(_))));
    }

    #[test]
    fn test_webhook_secret_too_short_rejected() {
        let mut vars = base_vars();
        vars.insert("WEBHOOK_SECRET".to_string(), "short".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidWebhookSecret(msg)) if msg.contains("at least 16 bytes"))
        );
    }

    #[test]
    fn test_webhook_secret_required_unless_verification_disabled() {
        let mut vars = base_vars();
        vars.remove("WEBHOOK_SECRET");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidWebhookSecret(msg)) if msg.contains("WEBHOOK_VERIFY=false"))
        );

        vars.insert("WEBHOOK_VERIFY".to_string(), "false".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert!(config.webhook_secret_bytes().is_none());
    }

    #[test]
    fn test_configured_secret_is_enforced_even_with_verify_false() {
        let mut vars = base_vars();
        vars.insert("WEBHOOK_VERIFY".to_string(), "false".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.webhook_secret_bytes(), Some(SECRET.as_bytes()));
    }

    #[test]
    fn test_webhook_verify_rejects_garbage() {
        let mut vars = base_vars();
        vars.insert("WEBHOOK_VERIFY".to_string(), "maybe".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "WEBHOOK_VERIFY")
        );
    }

    #[test]
    fn test_attach_budget_counts_timeouts_backoff_and_slack() {
        // 3 x 30s attempts, 0.5s + 1s backoff rounded up, 10s slack
        assert_eq!(attach_budget_seconds(30, 3), 90 + 2 + 10);
        assert_eq!(attach_budget_seconds(2, 1), 2 + ATTACH_BUDGET_SLACK_SECONDS);
        // 10 attempts back off for 0.5 * (1 + ... + 9) = 22.5s
        assert_eq!(attach_budget_seconds(1, 10), 10 + 23 + 10);
    }

    #[test]
    fn test_ticket_max_age_must_exceed_attach_budget() {
        let mut vars = base_vars();
        vars.insert("TICKET_MAX_AGE_SECONDS".to_string(), "1".to_string());
        vars.insert("ATTACH_TIMEOUT_SECONDS".to_string(), "30".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTicketExpiry(msg)) if msg.contains("worst-case attach time"))
        );

        // Exactly the budget still lets the sweep race a running attach
        let budget = attach_budget_seconds(30, DEFAULT_ATTACH_MAX_ATTEMPTS);
        vars.insert("TICKET_MAX_AGE_SECONDS".to_string(), budget.to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidTicketExpiry(_))
        ));

        vars.insert("TICKET_MAX_AGE_SECONDS".to_string(), (budget + 1).to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert!(config.ticket_max_age() > config.attach_budget());
        assert!(config.in_progress_max_age() > config.attach_budget());
        assert!(config.in_progress_max_age() <= config.ticket_max_age());
    }

    #[test]
    fn test_in_progress_max_age_bounds() {
        let mut vars = base_vars();
        vars.insert("ATTACH_TIMEOUT_SECONDS".to_string(), "30".to_string());

        vars.insert(
            "TICKET_IN_PROGRESS_MAX_AGE_SECONDS".to_string(),
            "60".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidTicketExpiry(_))
        ));

        vars.insert(
            "TICKET_IN_PROGRESS_MAX_AGE_SECONDS".to_string(),
            (DEFAULT_TICKET_MAX_AGE_SECONDS + 1).to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidTicketExpiry(_))
        ));

        vars.insert(
            "TICKET_IN_PROGRESS_MAX_AGE_SECONDS".to_string(),
            "600".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.in_progress_max_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_in_progress_default_grows_with_attach_budget() {
        let mut vars = base_vars();
        vars.insert("ATTACH_TIMEOUT_SECONDS".to_string(), "120".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert!(config.attach_budget() > Duration::from_secs(DEFAULT_IN_PROGRESS_MAX_AGE_SECONDS));
        assert!(config.in_progress_max_age() > config.attach_budget());
    }

    #[test]
    fn test_db_max_connections_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("DB_MAX_CONNECTIONS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "DB_MAX_CONNECTIONS")
        );
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert(
            "WEBHOOK_SECRET".to_string(),
            "super-secret-webhook-key".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("admission_test"));
        assert!(!debug_output.contains("super-secret-webhook-key"));
    }
}
