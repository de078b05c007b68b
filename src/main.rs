use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lucy_chat::backend::HttpChatBackend;
use lucy_chat::chain::{
    ContractRegistry, DeploymentOrchestrator, HttpDeployService, HttpWalletBridge, JsonRpcChain,
    PaymentOrchestrator, WalletSigner,
};
use lucy_chat::channels::ReplChannel;
use lucy_chat::cli::doctor;
use lucy_chat::config::Config;
use lucy_chat::storage::{FileStore, KvStore, MemoryStore};
use lucy_chat::transcript::TranscriptStore;
use lucy_chat::workflow::SendPipeline;
use lucy_chat::{bootstrap, Error};

#[derive(Parser)]
#[command(name = "lucy-chat", version, about = "Chat with Lucy and manage contract deployments")]
struct Cli {
    /// Send a single message and exit.
    #[arg(short, long)]
    message: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default).
    Chat,
    /// List registered contract deployments.
    Contracts,
    /// Check connectivity to the chat backend, deploy backend, RPC node,
    /// storage, and wallet.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    bootstrap::load_lucy_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lucy_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(Error::from)?;

    match cli.command {
        Some(Command::Doctor) => {
            let healthy = doctor::run(&config).await;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Contracts) => {
            let registry = ContractRegistry::new(open_storage(&config));
            let contracts = registry.list();
            if contracts.is_empty() {
                println!("No contracts registered yet.");
                return Ok(());
            }
            for contract in contracts {
                println!(
                    "{}  {}  {}  {}  {}  {}  {} interactions",
                    contract.id,
                    contract.name,
                    contract.address,
                    contract.network,
                    contract.deploy_date,
                    contract.status,
                    contract.interactions
                );
                println!("    signature: {}", contract.tx_signature);
            }
            Ok(())
        }
        Some(Command::Chat) | None => run_chat(config, cli.message).await,
    }
}

fn open_storage(config: &Config) -> Arc<dyn KvStore> {
    match FileStore::open(&config.storage.path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config.storage.path.display(),
                "Storage unavailable; falling back to in-memory state for this session"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run_chat(config: Config, single_message: Option<String>) -> anyhow::Result<()> {
    let storage = open_storage(&config);
    let registry = ContractRegistry::new(Arc::clone(&storage));
    let transcript = TranscriptStore::new();

    let wallet: Option<Arc<dyn WalletSigner>> = match (
        &config.payment.wallet_public_key,
        &config.payment.wallet_bridge_url,
    ) {
        (Some(public_key), Some(bridge_url)) => Some(Arc::new(HttpWalletBridge::new(
            bridge_url.clone(),
            public_key.clone(),
        ))),
        _ => {
            tracing::warn!(
                "Wallet not configured; registration transfers will fail until LUCY_WALLET_PUBKEY and LUCY_WALLET_BRIDGE_URL are set"
            );
            None
        }
    };

    let deployment = Arc::new(DeploymentOrchestrator::new(
        transcript.clone(),
        Arc::new(HttpDeployService::new(config.deploy.endpoint.clone())),
        config.deploy.timeout,
        config.workflow.followup_delay,
    ));
    let payment = Arc::new(PaymentOrchestrator::new(
        transcript.clone(),
        Arc::new(JsonRpcChain::new(config.payment.rpc_url.clone())),
        wallet,
        registry.clone(),
        Arc::clone(&storage),
        config.payment_settings(),
    ));
    let pipeline = Arc::new(SendPipeline::new(
        transcript,
        Arc::new(HttpChatBackend::new(config.chat.base_url.clone())),
        deployment,
        payment,
    ));

    let conversation = config.chat.agent_id;
    tracing::info!(%conversation, "Starting chat session");

    let channel = match single_message {
        Some(message) => ReplChannel::with_message(message),
        None => ReplChannel::new(),
    };
    channel.run(pipeline, registry, conversation).await
}
