//! Trigger detection on user messages.
//!
//! Purely textual: a "deploy" request only fires when a contract payload is
//! already stored, and an affirmative only fires while the conversation is
//! awaiting the registration confirmation. Both can fire in the same turn.

use crate::workflow::WorkflowState;

/// Side-effecting action requested by a user message.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    RequestDeploy { payload: String },
    RequestConfirmYes,
}

const AFFIRMATIVE_EXACT: &[&str] = &["y", "yeah", "yep", "sure"];

fn is_affirmative(lowered: &str) -> bool {
    lowered.contains("yes") || AFFIRMATIVE_EXACT.contains(&lowered)
}

/// Detect the actions a just-sent user message requests.
pub fn detect_triggers(user_text: &str, state: &WorkflowState) -> Vec<TriggerAction> {
    let lowered = user_text.to_lowercase();
    let mut actions = Vec::new();

    if lowered.starts_with("deploy") {
        if let Some(payload) = &state.last_contract_payload {
            actions.push(TriggerAction::RequestDeploy {
                payload: payload.clone(),
            });
        }
    }

    if is_affirmative(&lowered) && state.awaiting_confirmation() {
        actions.push(TriggerAction::RequestConfirmYes);
    }

    actions
}
