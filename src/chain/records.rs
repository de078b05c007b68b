//! Deployed-contract records.
//!
//! An append-only list in the durable store, written only when a
//! registration transfer succeeds. The JSON shape (camelCase keys) is shared
//! with the contracts view, which seeds three showcase entries of its own;
//! record ids continue the sequence after those.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::storage::KvStore;

/// Fixed storage key for the contract list.
pub const DEPLOYED_CONTRACTS_KEY: &str = "lucyDeployedContracts";

/// Number of seeded showcase contracts the id sequence starts after.
const SEEDED_CONTRACTS: usize = 3;

/// One registered deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContractRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub network: String,
    pub deploy_date: String,
    pub status: String,
    pub interactions: u32,
    pub tx_signature: String,
}

/// Best-effort registry over the durable store. Failures are logged and
/// swallowed; losing a record must never fail the chat flow.
#[derive(Clone)]
pub struct ContractRegistry {
    store: Arc<dyn KvStore>,
}

impl ContractRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// All persisted records, oldest first. Unreadable state reads as empty.
    pub fn list(&self) -> Vec<DeployedContractRecord> {
        let raw = match self.store.get(DEPLOYED_CONTRACTS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read deployed contracts");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Deployed contract list is unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Append a record for a freshly registered deployment.
    ///
    /// Returns the record on success, `None` when persisting failed.
    pub fn record_deployment(
        &self,
        address: &str,
        tx_signature: &str,
    ) -> Option<DeployedContractRecord> {
        let mut records = self.list();
        let record = DeployedContractRecord {
            id: format!("contract-{}", records.len() + SEEDED_CONTRACTS + 1),
            name: format!("Contract{}", records.len() + 1),
            address: address.to_string(),
            network: "Solana Devnet".to_string(),
            deploy_date: Utc::now().format("%Y-%m-%d").to_string(),
            status: "Active".to_string(),
            interactions: 0,
            tx_signature: tx_signature.to_string(),
        };
        records.push(record.clone());

        let raw = match serde_json::to_string(&records) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode deployed contracts");
                return None;
            }
        };
        if let Err(e) = self.store.set(DEPLOYED_CONTRACTS_KEY, &raw) {
            tracing::warn!(error = %e, "Failed to save deployed contract");
            return None;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn ids_continue_after_the_seeded_contracts() {
        let registry = ContractRegistry::new(Arc::new(MemoryStore::new()));

        let first = registry.record_deployment("addr1", "sig1").unwrap();
        assert_eq!(first.id, "contract-4");
        assert_eq!(first.name, "Contract1");

        let second = registry.record_deployment("addr2", "sig2").unwrap();
        assert_eq!(second.id, "contract-5");
        assert_eq!(second.name, "Contract2");

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], first);
        assert_eq!(listed[1], second);
    }

    #[test]
    fn record_defaults() {
        let registry = ContractRegistry::new(Arc::new(MemoryStore::new()));
        let record = registry.record_deployment("addr", "sig").unwrap();

        assert_eq!(record.network, "Solana Devnet");
        assert_eq!(record.status, "Active");
        assert_eq!(record.interactions, 0);
        assert_eq!(record.tx_signature, "sig");
        // YYYY-MM-DD
        assert_eq!(record.deploy_date.len(), 10);
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let store = Arc::new(MemoryStore::new());
        let registry = ContractRegistry::new(store.clone());
        registry.record_deployment("addr", "sig").unwrap();

        let raw = store.get(DEPLOYED_CONTRACTS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"txSignature\""));
        assert!(raw.contains("\"deployDate\""));
    }

    #[test]
    fn corrupt_list_reads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(DEPLOYED_CONTRACTS_KEY, "not json").unwrap();
        let registry = ContractRegistry::new(store);
        assert!(registry.list().is_empty());
    }
}
