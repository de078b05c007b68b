//! End-to-end tests for the conversation workflow.
//!
//! Drives the full send pipeline against scripted collaborators: the agent
//! produces a contract, the user asks to deploy, the deployment settles, the
//! user confirms registration, and the transfer lands a persisted record.
//! Timing runs on the paused tokio clock. Unrelated concurrent tasks may
//! interleave, so assertions check relative order and presence, not absolute
//! positions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use uuid::Uuid;

use lucy_chat::backend::{AgentReply, AttachmentUpload, ChatBackend};
use lucy_chat::chain::deploy::{DEPLOYMENT_IN_PROGRESS, DeployResponse, DeployService};
use lucy_chat::chain::payment::{PROCESSING_TRANSACTION, WALLET_NOT_CONNECTED};
use lucy_chat::chain::{
    ContractRegistry, DEPLOYED_CONTRACTS_KEY, DeploymentOrchestrator, PaymentOrchestrator,
    PaymentSettings, TransferRequest, WalletSigner,
};
use lucy_chat::chain::wallet::ChainRpc;
use lucy_chat::error::{ChatError, DeployError, PaymentError};
use lucy_chat::storage::{KvStore, MemoryStore};
use lucy_chat::transcript::TranscriptStore;
use lucy_chat::workflow::SendPipeline;

const ADDRESS: &str = "CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb";
const CONTRACT_REPLY: &str = "Phase 3: Here is your contract\nrust\nfn main() {}\nend contract";

/// Replies with the scripted text for each successive turn.
struct TurnBackend {
    turns: std::sync::Mutex<Vec<Vec<&'static str>>>,
}

impl TurnBackend {
    fn new(turns: Vec<Vec<&'static str>>) -> Arc<Self> {
        Arc::new(Self {
            turns: std::sync::Mutex::new(turns),
        })
    }
}

#[async_trait]
impl ChatBackend for TurnBackend {
    async fn send_message(
        &self,
        _conversation: Uuid,
        _text: &str,
        _attachment: Option<&AttachmentUpload>,
    ) -> Result<Vec<AgentReply>, ChatError> {
        let mut turns = self
            .turns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if turns.is_empty() {
            return Ok(vec![AgentReply::text("Anything else?")]);
        }
        Ok(turns.remove(0).into_iter().map(AgentReply::text).collect())
    }
}

struct CountingDeploy {
    calls: AtomicUsize,
}

impl CountingDeploy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DeployService for CountingDeploy {
    async fn deploy(&self, _contract_code: &str) -> Result<DeployResponse, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeployResponse {
            contract_address: Some(ADDRESS.to_string()),
            ..Default::default()
        })
    }

    async fn health(&self) -> Result<(), DeployError> {
        Ok(())
    }
}

struct StaticRpc;

#[async_trait]
impl ChainRpc for StaticRpc {
    async fn latest_blockhash(&self) -> Result<String, PaymentError> {
        Ok("FwRYtTPRk5N4wUeP87rTw9kQVSwigB6kbikGzzeCMrW5".to_string())
    }

    async fn confirm_transaction(&self, _signature: &str) -> Result<bool, PaymentError> {
        Ok(true)
    }
}

struct GoodWallet {
    calls: AtomicUsize,
}

impl GoodWallet {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WalletSigner for GoodWallet {
    fn public_key(&self) -> Option<String> {
        Some("9aE4pcEnqrRf63gAAhDDAKH9DHHkFkqLDUSDM3tZsBSM".to_string())
    }

    async fn send_transaction(
        &self,
        _transfer: &TransferRequest,
        _rpc: &dyn ChainRpc,
    ) -> Result<String, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("3TestSignature".repeat(5))
    }
}

fn build_pipeline(
    backend: Arc<dyn ChatBackend>,
    deploy: Arc<dyn DeployService>,
    wallet: Option<Arc<dyn WalletSigner>>,
) -> (Arc<SendPipeline>, TranscriptStore, Arc<MemoryStore>) {
    let transcript = TranscriptStore::new();
    let storage = Arc::new(MemoryStore::new());
    let deployment = Arc::new(DeploymentOrchestrator::new(
        transcript.clone(),
        deploy,
        Duration::from_secs(15),
        Duration::from_secs(2),
    ));
    let payment = Arc::new(PaymentOrchestrator::new(
        transcript.clone(),
        Arc::new(StaticRpc),
        wallet,
        ContractRegistry::new(storage.clone()),
        storage.clone(),
        PaymentSettings {
            recipient: "73yff1Z1Q2UQo9S5cNmPEuUATRvsgiJiQJo3kCVDrhhK".to_string(),
            amount_sol: dec!(0.001),
            fallback_after: Duration::from_secs(5),
            submit_timeout: Duration::from_secs(30),
            followup_delay: Duration::from_secs(2),
        },
    ));
    let pipeline = Arc::new(SendPipeline::new(
        transcript.clone(),
        backend,
        deployment,
        payment,
    ));
    (pipeline, transcript, storage)
}

/// Poll until `pred` holds for the transcript. The paused clock advances
/// through the polling sleeps, so pending timers fire along the way.
async fn wait_for<F>(transcript: &TranscriptStore, conversation: Uuid, pred: F)
where
    F: Fn(&[lucy_chat::transcript::Message]) -> bool,
{
    loop {
        let messages = transcript.read(conversation).await;
        if pred(&messages) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn full_cycle_deploys_confirms_and_registers() {
    let backend = TurnBackend::new(vec![
        vec![CONTRACT_REPLY],
        vec!["Starting the deployment for you."],
        vec!["Thank you for confirming."],
    ]);
    let deploy = CountingDeploy::new();
    let wallet = GoodWallet::new();
    let (pipeline, transcript, storage) =
        build_pipeline(backend, deploy.clone(), Some(wallet.clone()));
    let conversation = Uuid::new_v4();

    // Turn 1: the agent hands over a contract.
    pipeline
        .send(conversation, "write a counter contract", None)
        .await
        .unwrap();
    assert_eq!(deploy.calls.load(Ordering::SeqCst), 0);

    // Turn 2: the user asks to deploy it.
    pipeline.send(conversation, "Deploy it", None).await.unwrap();

    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.text.contains("Contract deployed successfully") && m.text.contains(ADDRESS))
    })
    .await;
    assert_eq!(deploy.calls.load(Ordering::SeqCst), 1);

    // The registration prompt follows the result message.
    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.text.contains("Would you like to proceed with management registration?"))
    })
    .await;

    // Turn 3: the user confirms; the transfer runs and registers the contract.
    pipeline.send(conversation, "yes", None).await.unwrap();

    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.text.contains("Transaction completed successfully!"))
    })
    .await;
    assert_eq!(wallet.calls.load(Ordering::SeqCst), 1);

    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.text.contains("You can view it in the Contracts page"))
    })
    .await;

    // The record carries the address recovered from the deployment message.
    let raw = storage.get(DEPLOYED_CONTRACTS_KEY).unwrap().unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["address"], ADDRESS);
    assert_eq!(records[0]["id"], "contract-4");
    assert_eq!(records[0]["status"], "Active");

    // No placeholders survive anywhere in the flow.
    let messages = transcript.read(conversation).await;
    assert!(messages.iter().all(|m| !m.is_loading));
    assert!(messages.iter().all(|m| m.text != DEPLOYMENT_IN_PROGRESS));
    assert!(messages.iter().all(|m| m.text != PROCESSING_TRANSACTION));
}

#[tokio::test(start_paused = true)]
async fn unconnected_wallet_blocks_the_transfer() {
    let backend = TurnBackend::new(vec![
        vec!["Phase 4: Would you like to proceed with management registration? Yes or No"],
        vec!["Understood."],
    ]);
    let (pipeline, transcript, storage) =
        build_pipeline(backend, CountingDeploy::new(), None);
    let conversation = Uuid::new_v4();

    pipeline.send(conversation, "register it", None).await.unwrap();
    pipeline.send(conversation, "sure", None).await.unwrap();

    wait_for(&transcript, conversation, |messages| {
        messages.iter().any(|m| m.text == WALLET_NOT_CONNECTED)
    })
    .await;
    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.text.contains("Please connect your wallet and respond with 'Yes'"))
    })
    .await;

    assert_eq!(storage.get(DEPLOYED_CONTRACTS_KEY).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn stored_contract_survives_a_full_cycle() {
    // Nothing resets the stored payload or the phase; a second "deploy"
    // reuses the same source.
    let backend = TurnBackend::new(vec![
        vec![CONTRACT_REPLY],
        vec!["Deploying now."],
        vec!["Deploying again."],
    ]);
    let deploy = CountingDeploy::new();
    let (pipeline, transcript, _storage) = build_pipeline(backend, deploy.clone(), None);
    let conversation = Uuid::new_v4();

    pipeline.send(conversation, "make a contract", None).await.unwrap();
    pipeline.send(conversation, "deploy", None).await.unwrap();
    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .filter(|m| m.text.contains("Contract deployed successfully"))
            .count()
            == 1
    })
    .await;

    pipeline.send(conversation, "deploy once more", None).await.unwrap();
    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .filter(|m| m.text.contains("Contract deployed successfully"))
            .count()
            == 2
    })
    .await;

    assert_eq!(deploy.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn transcript_length_matches_replies_under_concurrent_activity() {
    let backend = TurnBackend::new(vec![
        vec![CONTRACT_REPLY],
        vec!["On it.", "Give me a second."],
    ]);
    let (pipeline, transcript, _storage) =
        build_pipeline(backend, CountingDeploy::new(), None);
    let conversation = Uuid::new_v4();

    let first = pipeline.send(conversation, "hello", None).await.unwrap();
    // 1 user + 1 reply.
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|m| !m.is_loading));

    // This turn triggers a deployment whose messages land concurrently with
    // the reply reconciliation; the user/reply accounting still holds.
    pipeline.send(conversation, "deploy", None).await.unwrap();
    wait_for(&transcript, conversation, |messages| {
        messages
            .iter()
            .any(|m| m.source.as_deref() == Some("Deployment"))
    })
    .await;

    let messages = transcript.read(conversation).await;
    assert!(messages.iter().all(|m| !m.is_loading));
    let users = messages
        .iter()
        .filter(|m| m.sender == lucy_chat::transcript::Sender::User)
        .count();
    assert_eq!(users, 2);
    let replies = messages
        .iter()
        .filter(|m| m.source.is_none() && m.sender == lucy_chat::transcript::Sender::System)
        .count();
    assert_eq!(replies, 3);
}
