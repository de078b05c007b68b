//! Registration transfer orchestration.
//!
//! Confirming management registration submits a small fixed transfer through
//! the injected wallet capability. The transcript gets a processing
//! placeholder keyed by a timestamp marker, a slow-path fallback message
//! after a few seconds, and a success/failure replacement once the
//! submission settles. Successful transfers also persist a deployed-contract
//! record recovered from the transcript's deployment message.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chain::records::ContractRegistry;
use crate::chain::wallet::{ChainRpc, TransferRequest, WalletSigner};
use crate::error::PaymentError;
use crate::storage::KvStore;
use crate::transcript::{Message, TranscriptStore};

/// Processing placeholder; located by exact text plus the marker timestamp.
pub const PROCESSING_TRANSACTION: &str = "Processing transaction...";

/// Slow-path replacement when the submission outlives the fallback timer.
pub const TRANSACTION_INITIATED: &str =
    "Transaction initiated. This process may take a moment to complete...";

/// Failure wording reserved for the missing-wallet case.
pub const WALLET_NOT_CONNECTED: &str =
    "Transaction failed: Wallet not connected. Please connect your wallet to complete this action.";

const RETRY_PROMPT: &str =
    "Phase 4: There was an issue with the transaction. Would you like to try again? (Yes or No)";

const WALLET_RETRY_PROMPT: &str = "Phase 4: Please connect your wallet and respond with 'Yes' to try again. Would you like to proceed once your wallet is connected?";

const CLOSING_CONFIRMATION: &str = "Phase 4: Thank you for confirming. The smart contract has been registered for management. You can view it in the Contracts page. Is there anything else you need assistance with?";

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Identifies one payment attempt's processing placeholder and its transient
/// storage entry. Scoped to a single attempt.
#[derive(Debug, Clone, Copy)]
pub struct TransactionMarker {
    created_at: DateTime<Utc>,
}

impl TransactionMarker {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn storage_key(&self) -> String {
        format!("transaction-{}", self.created_at.timestamp_millis())
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.text == PROCESSING_TRANSACTION && message.created_at == self.created_at
    }
}

impl Default for TransactionMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer parameters and timing knobs.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub recipient: String,
    pub amount_sol: Decimal,
    /// After this long with the placeholder still present, swap in the
    /// slow-path message.
    pub fallback_after: Duration,
    /// Hard ceiling on waiting for the submission.
    pub submit_timeout: Duration,
    /// Delay before the closing / retry prompt.
    pub followup_delay: Duration,
}

fn lamports(amount_sol: Decimal) -> Result<u64, PaymentError> {
    let lamports = amount_sol * Decimal::from(LAMPORTS_PER_SOL);
    if lamports <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(amount_sol.to_string()));
    }
    lamports
        .trunc()
        .to_u64()
        .ok_or_else(|| PaymentError::InvalidAmount(amount_sol.to_string()))
}

/// Most recent deployed address mentioned in the transcript, or "Unknown".
fn deployed_address_from(messages: &[Message]) -> String {
    let re = match Regex::new(r"Address: ([A-Za-z0-9]{32,})") {
        Ok(re) => re,
        Err(_) => return "Unknown".to_string(),
    };
    messages
        .iter()
        .rev()
        .filter(|m| m.text.contains("Contract deployed successfully") && m.text.contains("Address:"))
        .find_map(|m| {
            re.captures(&m.text)
                .and_then(|c| c.get(1))
                .map(|g| g.as_str().to_string())
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Drives one registration transfer against the transcript.
pub struct PaymentOrchestrator {
    transcript: TranscriptStore,
    rpc: Arc<dyn ChainRpc>,
    wallet: Option<Arc<dyn WalletSigner>>,
    registry: ContractRegistry,
    storage: Arc<dyn KvStore>,
    settings: PaymentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        transcript: TranscriptStore,
        rpc: Arc<dyn ChainRpc>,
        wallet: Option<Arc<dyn WalletSigner>>,
        registry: ContractRegistry,
        storage: Arc<dyn KvStore>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            transcript,
            rpc,
            wallet,
            registry,
            storage,
            settings,
        }
    }

    /// Run one payment attempt. The transcript is fully reconciled on every
    /// path before this returns; the result is for callers that also want
    /// the signature or cause.
    pub async fn run(&self, conversation: Uuid) -> Result<String, PaymentError> {
        let marker = TransactionMarker::new();
        self.transcript
            .append(
                conversation,
                vec![
                    Message::system(PROCESSING_TRANSACTION)
                        .with_created_at(marker.created_at())
                        .with_source("System"),
                ],
            )
            .await;
        if let Err(e) = self.storage.set(&marker.storage_key(), "processing") {
            tracing::warn!(error = %e, "Failed to store transaction state");
        }

        let fallback = self.spawn_fallback(conversation, marker);

        let connected = self
            .wallet
            .as_ref()
            .and_then(|w| w.public_key().map(|pk| (Arc::clone(w), pk)));
        let (signer, public_key) = match connected {
            Some(pair) => pair,
            None => {
                fallback.abort();
                tracing::error!("Wallet not connected; transfer not submitted");
                self.replace_marker(
                    conversation,
                    marker,
                    Message::system(WALLET_NOT_CONNECTED).with_source("Transaction"),
                )
                .await;
                self.clear_marker(marker);
                self.followup(conversation, WALLET_RETRY_PROMPT).await;
                return Err(PaymentError::WalletNotConnected);
            }
        };

        let submission = self.submit(signer.as_ref(), public_key);
        let result = match tokio::time::timeout(self.settings.submit_timeout, submission).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::Timeout(self.settings.submit_timeout)),
        };

        match result {
            Ok(signature) => {
                fallback.abort();
                tracing::info!(signature = %signature, "Transfer submitted");

                let messages = self.transcript.read(conversation).await;
                let address = deployed_address_from(&messages);
                if let Some(record) = self.registry.record_deployment(&address, &signature) {
                    tracing::info!(id = %record.id, address = %record.address, "Contract saved to registry");
                }

                self.replace_marker(
                    conversation,
                    marker,
                    Message::system(format!(
                        "Transaction completed successfully! Your contract has been registered for management. Transaction signature: {signature}"
                    ))
                    .with_source("Transaction"),
                )
                .await;
                self.clear_marker(marker);
                self.spawn_background_confirmation(&signature);
                self.followup(conversation, CLOSING_CONFIRMATION).await;
                Ok(signature)
            }
            Err(e) => {
                fallback.abort();
                tracing::error!(error = %e, "Transfer failed");
                self.replace_marker(
                    conversation,
                    marker,
                    Message::system(format!("Transaction failed: {e}")).with_source("Transaction"),
                )
                .await;
                self.clear_marker(marker);
                self.followup(conversation, RETRY_PROMPT).await;
                Err(e)
            }
        }
    }

    /// Build and submit the transfer with a freshly fetched blockhash.
    async fn submit(
        &self,
        signer: &dyn WalletSigner,
        public_key: String,
    ) -> Result<String, PaymentError> {
        let recent_blockhash = self.rpc.latest_blockhash().await?;
        let transfer = TransferRequest {
            from: public_key,
            to: self.settings.recipient.clone(),
            lamports: lamports(self.settings.amount_sol)?,
            recent_blockhash,
        };
        signer.send_transaction(&transfer, self.rpc.as_ref()).await
    }

    fn spawn_fallback(&self, conversation: Uuid, marker: TransactionMarker) -> JoinHandle<()> {
        let transcript = self.transcript.clone();
        let delay = self.settings.fallback_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            transcript
                .update(conversation, move |messages| {
                    if !messages.iter().any(|m| marker.matches(m)) {
                        return messages;
                    }
                    messages
                        .into_iter()
                        .filter(|m| !marker.matches(m))
                        .chain(std::iter::once(
                            Message::system(TRANSACTION_INITIATED).with_source("Transaction"),
                        ))
                        .collect()
                })
                .await;
        })
    }

    async fn replace_marker(
        &self,
        conversation: Uuid,
        marker: TransactionMarker,
        replacement: Message,
    ) {
        self.transcript
            .update(conversation, move |messages| {
                messages
                    .into_iter()
                    .filter(|m| !marker.matches(m))
                    .chain(std::iter::once(replacement))
                    .collect()
            })
            .await;
    }

    async fn followup(&self, conversation: Uuid, text: &'static str) {
        tokio::time::sleep(self.settings.followup_delay).await;
        self.transcript
            .append(conversation, vec![Message::system(text).with_source("System")])
            .await;
    }

    fn clear_marker(&self, marker: TransactionMarker) {
        if let Err(e) = self.storage.remove(&marker.storage_key()) {
            tracing::warn!(error = %e, "Failed to clear transaction state");
        }
    }

    /// Confirmation keeps running after the signature is returned; the
    /// outcome is logged, never shown in the transcript.
    fn spawn_background_confirmation(&self, signature: &str) {
        let rpc = Arc::clone(&self.rpc);
        let signature = signature.to_string();
        tokio::spawn(async move {
            match rpc.confirm_transaction(&signature).await {
                Ok(confirmed) => {
                    tracing::info!(signature = %signature, confirmed, "Transfer confirmation finished");
                }
                Err(e) => {
                    tracing::warn!(signature = %signature, error = %e, "Transfer confirmation failed");
                }
            }
        });
    }
}
