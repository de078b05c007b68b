//! Wallet signing capability and chain RPC surface.
//!
//! Cryptography never happens in-process. [`WalletSigner`] is the injected
//! capability that holds the key and produces a signature; [`ChainRpc`] is
//! the thin metadata surface the transfer needs (fresh blockhash, and the
//! background confirmation check). Production wiring uses a JSON-RPC node
//! plus an HTTP wallet bridge; tests script both.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::PaymentError;

/// An unsigned transfer of lamports between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub lamports: u64,
    pub recent_blockhash: String,
}

/// Injected signing capability.
///
/// `public_key` returning `None` means no account is connected; callers must
/// treat that the same as having no signer at all.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn public_key(&self) -> Option<String>;

    async fn send_transaction(
        &self,
        transfer: &TransferRequest,
        rpc: &dyn ChainRpc,
    ) -> Result<String, PaymentError>;
}

/// Chain metadata operations consumed by the transfer flow.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<String, PaymentError>;

    /// Whether the signature has reached confirmed (or finalized) status.
    async fn confirm_transaction(&self, signature: &str) -> Result<bool, PaymentError>;
}

/// JSON-RPC client for a Solana-style node.
pub struct JsonRpcChain {
    client: Client,
    url: String,
}

impl JsonRpcChain {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: url.into(),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, PaymentError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rpc(format!("{method} returned {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Rpc(format!("{method} returned invalid JSON: {e}")))?;
        if let Some(error) = body.get("error") {
            return Err(PaymentError::Rpc(format!("{method} failed: {error}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PaymentError::Rpc(format!("{method} returned no result")))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChain {
    async fn latest_blockhash(&self) -> Result<String, PaymentError> {
        let result = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{ "commitment": "confirmed" }]),
            )
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| PaymentError::Rpc("getLatestBlockhash returned no blockhash".to_string()))
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<bool, PaymentError> {
        let result = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        let status = result
            .pointer("/value/0/confirmationStatus")
            .and_then(|v| v.as_str());
        Ok(matches!(status, Some("confirmed") | Some("finalized")))
    }
}

/// Wallet capability reached over HTTP.
///
/// The bridge holds the key material; this side only forwards the unsigned
/// transfer and reads back `{ "signature": ... }`.
pub struct HttpWalletBridge {
    client: Client,
    endpoint: String,
    public_key: String,
}

impl HttpWalletBridge {
    pub fn new(endpoint: impl Into<String>, public_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl WalletSigner for HttpWalletBridge {
    fn public_key(&self) -> Option<String> {
        Some(self.public_key.clone())
    }

    async fn send_transaction(
        &self,
        transfer: &TransferRequest,
        _rpc: &dyn ChainRpc,
    ) -> Result<String, PaymentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(transfer)
            .send()
            .await
            .map_err(|e| PaymentError::Submission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Submission(format!(
                "wallet bridge returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Submission(format!("invalid bridge response: {e}")))?;
        body.get("signature")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| PaymentError::Submission("wallet bridge returned no signature".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_serializes_for_the_bridge() {
        let transfer = TransferRequest {
            from: "9aE4pcEnqrRf63gAAhDDAKH9DHHkFkqLDUSDM3tZsBSM".to_string(),
            to: "73yff1Z1Q2UQo9S5cNmPEuUATRvsgiJiQJo3kCVDrhhK".to_string(),
            lamports: 1_000_000,
            recent_blockhash: "FwRYtTPRk5N4wUeP87rTw9kQVSwigB6kbikGzzeCMrW5".to_string(),
        };
        let value = serde_json::to_value(&transfer).unwrap();
        assert_eq!(value["lamports"], 1_000_000);
        assert_eq!(value["to"], "73yff1Z1Q2UQo9S5cNmPEuUATRvsgiJiQJo3kCVDrhhK");
    }

    #[test]
    fn bridge_always_reports_its_key() {
        let bridge = HttpWalletBridge::new(
            "http://localhost:9400/sign",
            "9aE4pcEnqrRf63gAAhDDAKH9DHHkFkqLDUSDM3tZsBSM",
        );
        assert_eq!(
            bridge.public_key().as_deref(),
            Some("9aE4pcEnqrRf63gAAhDDAKH9DHHkFkqLDUSDM3tZsBSM")
        );
    }
}
