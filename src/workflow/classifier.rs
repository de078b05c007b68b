//! Phase classification of agent replies.
//!
//! The agent signals workflow progress in free text. Two patterns matter:
//! a "Phase 3:" reply carrying a contract source block, and "Phase 4" /
//! deployment-completion language asking for a registration confirmation.
//! Both rules are evaluated independently on the same reply.

/// What a single agent reply says about the workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierSignal {
    /// Contract source extracted from a "Phase 3:" reply, if any.
    pub contract_payload: Option<String>,
    /// The reply asked for the management-registration confirmation.
    pub awaiting_confirmation: bool,
}

/// First two whitespace-delimited tokens, joined with a single space.
fn first_two_tokens(text: &str) -> String {
    text.split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract a contract source block.
///
/// Grammar: a line containing `rust`, a newline, the body, then the marker
/// `end contract`. Returns the trimmed body, or `None` when either marker is
/// missing or the body is blank. Never panics on marker-shaped text that
/// carries no block.
pub fn extract_contract_block(text: &str) -> Option<String> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_end = offset + line.len();
        if line.contains("rust") {
            let rest = &text[line_end..];
            let stop = rest.find("end contract")?;
            let body = rest[..stop].trim();
            if body.is_empty() {
                return None;
            }
            return Some(body.to_string());
        }
        offset = line_end;
    }
    None
}

/// Classify one agent reply.
pub fn classify(reply: &str) -> ClassifierSignal {
    let head = first_two_tokens(reply);

    let contract_payload = if head == "Phase 3:"
        && reply.contains("rust")
        && reply.contains("end contract")
    {
        extract_contract_block(reply)
    } else {
        None
    };

    let awaiting_confirmation = head == "Phase 4:"
        || reply.contains("has been successfully deployed")
        || (reply.contains("Would you like to proceed with management registration?")
            && reply.contains("Yes or No"));

    ClassifierSignal {
        contract_payload,
        awaiting_confirmation,
    }
}
