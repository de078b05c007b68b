//! Error types for lucy-chat.

use std::time::Duration;

/// Top-level error type for the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chat backend error: {0}")]
    Chat(#[from] ChatError),

    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat backend errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Request to chat backend failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from chat backend: {0}")]
    InvalidResponse(String),
}

/// Contract deployment errors.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Request to deploy backend failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deploy backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed deploy response: {0}")]
    MalformedResponse(String),

    #[error("No contract source available to deploy")]
    MissingPayload,
}

/// Payment/transfer errors.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("Transaction submission timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Durable key-value storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, Error>;
