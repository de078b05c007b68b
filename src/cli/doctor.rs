//! Preflight checks for the local setup.
//!
//! Probes every collaborator the chat flow depends on and prints one line
//! per check. Failures are reported, not fatal; the command exists to tell
//! the operator what will and won't work before they start a conversation.

use std::time::Duration;

use crate::chain::deploy::{DeployService, HttpDeployService};
use crate::chain::wallet::{ChainRpc, JsonRpcChain};
use crate::config::Config;
use crate::storage::{FileStore, KvStore};

fn report(name: &str, result: Result<String, String>) -> bool {
    match result {
        Ok(detail) => {
            println!("  ok    {name}: {detail}");
            true
        }
        Err(detail) => {
            println!("  FAIL  {name}: {detail}");
            false
        }
    }
}

async fn check_chat_backend(config: &Config) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;
    let url = format!("{}/agents", config.chat.base_url.trim_end_matches('/'));
    let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(format!("reachable at {}", config.chat.base_url))
    } else {
        Err(format!("{url} returned {}", response.status()))
    }
}

async fn check_deploy_backend(config: &Config) -> Result<String, String> {
    let service = HttpDeployService::new(config.deploy.endpoint.clone());
    service
        .health()
        .await
        .map(|_| format!("healthy at {}", config.deploy.endpoint))
        .map_err(|e| e.to_string())
}

async fn check_rpc(config: &Config) -> Result<String, String> {
    let rpc = JsonRpcChain::new(config.payment.rpc_url.clone());
    rpc.latest_blockhash()
        .await
        .map(|blockhash| format!("blockhash {blockhash}"))
        .map_err(|e| e.to_string())
}

fn check_storage(config: &Config) -> Result<String, String> {
    let store = FileStore::open(&config.storage.path).map_err(|e| e.to_string())?;
    store
        .set("doctor-probe", "ok")
        .and_then(|_| store.remove("doctor-probe"))
        .map_err(|e| e.to_string())?;
    Ok(format!("writable at {}", config.storage.path.display()))
}

fn check_wallet(config: &Config) -> Result<String, String> {
    match (
        &config.payment.wallet_public_key,
        &config.payment.wallet_bridge_url,
    ) {
        (Some(key), Some(_)) => Ok(format!("connected as {key}")),
        _ => Err(
            "not configured (set LUCY_WALLET_PUBKEY and LUCY_WALLET_BRIDGE_URL); registration transfers will fail"
                .to_string(),
        ),
    }
}

/// Run all checks and return whether everything passed.
pub async fn run(config: &Config) -> bool {
    println!("lucy-chat doctor");

    let mut healthy = true;
    healthy &= report("chat backend", check_chat_backend(config).await);
    healthy &= report("deploy backend", check_deploy_backend(config).await);
    healthy &= report("chain rpc", check_rpc(config).await);
    healthy &= report("storage", check_storage(config));
    healthy &= report("wallet", check_wallet(config));

    if healthy {
        println!("All checks passed.");
    } else {
        println!("Some checks failed; see above.");
    }
    healthy
}
