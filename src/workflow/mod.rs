//! Conversation-driven workflow control.
//!
//! Agent replies move a conversation through phases: the agent produces a
//! contract (phase 3 language), the user asks to deploy it, the deployment
//! settles, and the agent asks for a management-registration confirmation
//! (phase 4 language) that triggers an on-chain payment. The classifier and
//! trigger detector are pure; the pipeline owns the state and dispatches the
//! side-effecting orchestrators.

mod classifier;
mod pipeline;
mod trigger;

pub use classifier::{ClassifierSignal, classify, extract_contract_block};
pub use pipeline::SendPipeline;
pub use trigger::{TriggerAction, detect_triggers};

/// Marker for a conversation waiting on the user's registration confirmation.
///
/// The original flow numbered its phases; only this one is ever acted on, so
/// it is the only variant. Nothing resets it once set: a completed
/// transaction leaves the conversation in this phase (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingConfirmation,
}

/// Per-conversation workflow state.
///
/// `last_contract_payload` survives deployment; it is only dropped with the
/// session. A later "deploy" message reuses the stored source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub last_contract_payload: Option<String>,
    pub phase: Option<Phase>,
}

impl WorkflowState {
    /// Fold a classifier signal into the state.
    pub fn apply(&mut self, signal: &ClassifierSignal) {
        if let Some(payload) = &signal.contract_payload {
            tracing::info!("Storing contract source for future deployment");
            self.last_contract_payload = Some(payload.clone());
        }
        if signal.awaiting_confirmation {
            tracing::info!("Conversation is awaiting management-registration confirmation");
            self.phase = Some(Phase::AwaitingConfirmation);
        }
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.phase == Some(Phase::AwaitingConfirmation)
    }
}
