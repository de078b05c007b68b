//! External chain operations.
//!
//! Two side effects leave the process from here: contract deployment against
//! the deploy backend, and the registration transfer submitted through an
//! injected wallet capability. Each orchestrator owns its own progress and
//! result messages in the transcript and never lets an external failure
//! escape past its boundary.

pub mod deploy;
pub mod payment;
pub mod records;
pub mod wallet;

pub use deploy::{DeployService, DeploymentOrchestrator, DeploymentOutcome, HttpDeployService};
pub use payment::{PaymentOrchestrator, PaymentSettings, TransactionMarker};
pub use records::{ContractRegistry, DEPLOYED_CONTRACTS_KEY, DeployedContractRecord};
pub use wallet::{ChainRpc, HttpWalletBridge, JsonRpcChain, TransferRequest, WalletSigner};
