//! Configuration for lucy-chat.
//!
//! Everything is env-driven with local-development defaults. `./.env` and
//! `~/.lucy-chat/.env` are loaded first (see `bootstrap`), so the effective
//! priority is: explicit env vars > `./.env` > `~/.lucy-chat/.env` > default.
//!
//! The timeout and delay constants drifted between iterations of the
//! original flow; they are all knobs here so one implementation covers every
//! variant.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::chain::PaymentSettings;
use crate::error::ConfigError;
use crate::storage::default_store_path;

/// Default recipient for the registration transfer (devnet).
pub const DEFAULT_TX_RECIPIENT: &str = "73yff1Z1Q2UQo9S5cNmPEuUATRvsgiJiQJo3kCVDrhhK";

/// Default registration transfer amount, in SOL.
pub const DEFAULT_TX_AMOUNT_SOL: &str = "0.001";

/// Main configuration for the runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub chat: ChatConfig,
    pub deploy: DeployConfig,
    pub payment: PaymentConfig,
    pub workflow: WorkflowConfig,
    pub storage: StorageConfig,
}

/// Chat backend connection.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the agent API.
    pub base_url: String,
    /// Agent id; doubles as the conversation id. A fresh id is minted per
    /// session when unset.
    pub agent_id: Uuid,
}

/// Deploy backend connection.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub endpoint: String,
    /// Bound on waiting for the deploy backend before reporting the
    /// deployment as initiated.
    pub timeout: Duration,
}

/// Registration transfer parameters.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub rpc_url: String,
    pub recipient: String,
    pub amount_sol: Decimal,
    /// Connected wallet account, if any.
    pub wallet_public_key: Option<String>,
    /// Signing bridge endpoint, if any. Both must be set for the wallet to
    /// count as connected.
    pub wallet_bridge_url: Option<String>,
    /// Delay before swapping the processing placeholder for the slow-path
    /// message.
    pub fallback_after: Duration,
    /// Hard ceiling on waiting for transaction submission.
    pub submit_timeout: Duration,
}

/// Cross-cutting workflow timing.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Delay between a result message and its follow-up prompt.
    pub followup_delay: Duration,
}

/// Durable key-value store location.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_id = match optional_env("LUCY_AGENT_ID") {
            Some(raw) => Uuid::parse_str(&raw).map_err(|e| ConfigError::InvalidValue {
                key: "LUCY_AGENT_ID".to_string(),
                message: e.to_string(),
            })?,
            None => Uuid::new_v4(),
        };

        let chat = ChatConfig {
            base_url: http_url("LUCY_AGENT_URL", "http://localhost:3000")?,
            agent_id,
        };

        let deploy = DeployConfig {
            endpoint: http_url("LUCY_DEPLOY_URL", "http://127.0.0.1:8080/deploy")?,
            timeout: duration_secs("LUCY_DEPLOY_TIMEOUT_SECS", 15)?,
        };

        let payment = PaymentConfig {
            rpc_url: http_url("LUCY_RPC_URL", "https://api.devnet.solana.com")?,
            recipient: env_or("LUCY_TX_RECIPIENT", DEFAULT_TX_RECIPIENT),
            amount_sol: decimal("LUCY_TX_AMOUNT_SOL", DEFAULT_TX_AMOUNT_SOL)?,
            wallet_public_key: optional_env("LUCY_WALLET_PUBKEY"),
            wallet_bridge_url: optional_env("LUCY_WALLET_BRIDGE_URL")
                .map(|raw| validate_http_url("LUCY_WALLET_BRIDGE_URL", &raw))
                .transpose()?,
            fallback_after: duration_secs("LUCY_TX_FALLBACK_SECS", 5)?,
            submit_timeout: duration_secs("LUCY_TX_TIMEOUT_SECS", 30)?,
        };

        let workflow = WorkflowConfig {
            followup_delay: duration_ms("LUCY_FOLLOWUP_DELAY_MS", 2_000)?,
        };

        let storage = StorageConfig {
            path: optional_env("LUCY_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_path),
        };

        Ok(Self {
            chat,
            deploy,
            payment,
            workflow,
            storage,
        })
    }

    /// Transfer settings for the payment orchestrator.
    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings {
            recipient: self.payment.recipient.clone(),
            amount_sol: self.payment.amount_sol,
            fallback_after: self.payment.fallback_after,
            submit_timeout: self.payment.submit_timeout,
            followup_delay: self.workflow.followup_delay,
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn validate_http_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(value.to_string()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http(s) URL, got scheme '{other}'"),
        }),
    }
}

fn http_url(key: &str, default: &str) -> Result<String, ConfigError> {
    validate_http_url(key, &env_or(key, default))
}

fn duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    parse_duration(key, default, Duration::from_secs)
}

fn duration_ms(key: &str, default: u64) -> Result<Duration, ConfigError> {
    parse_duration(key, default, Duration::from_millis)
}

fn parse_duration(
    key: &str,
    default: u64,
    build: fn(u64) -> Duration,
) -> Result<Duration, ConfigError> {
    let value = match optional_env(key) {
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?,
        None => default,
    };
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(build(value))
}

fn decimal(key: &str, default: &str) -> Result<Decimal, ConfigError> {
    let raw = env_or(key, default);
    let value = Decimal::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if value <= Decimal::ZERO {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
