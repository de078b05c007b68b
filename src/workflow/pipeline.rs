//! The send pipeline.
//!
//! One `send` call covers a full user turn: optimistic user + loading
//! messages, the backend round trip, phase classification of the reply,
//! trigger detection on the user text, and reconciliation of the loading
//! placeholder with the real replies. Triggered orchestrators are spawned
//! detached; they mutate the transcript on their own schedule and must not
//! delay the reply.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{AgentReply, AttachmentUpload, ChatBackend};
use crate::chain::{DeploymentOrchestrator, PaymentOrchestrator};
use crate::error::Error;
use crate::transcript::{Attachment, Message, Sender, TranscriptStore};
use crate::workflow::{TriggerAction, WorkflowState, classify, detect_triggers};

/// Per-conversation workflow controller shared by all turns.
pub struct SendPipeline {
    transcript: TranscriptStore,
    backend: Arc<dyn ChatBackend>,
    deployment: Arc<DeploymentOrchestrator>,
    payment: Arc<PaymentOrchestrator>,
    states: Mutex<HashMap<Uuid, Arc<Mutex<WorkflowState>>>>,
}

impl SendPipeline {
    pub fn new(
        transcript: TranscriptStore,
        backend: Arc<dyn ChatBackend>,
        deployment: Arc<DeploymentOrchestrator>,
        payment: Arc<PaymentOrchestrator>,
    ) -> Self {
        Self {
            transcript,
            backend,
            deployment,
            payment,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    /// Workflow state handle for a conversation, created on first use.
    pub async fn state(&self, conversation: Uuid) -> Arc<Mutex<WorkflowState>> {
        let mut states = self.states.lock().await;
        Arc::clone(
            states
                .entry(conversation)
                .or_insert_with(|| Arc::new(Mutex::new(WorkflowState::default()))),
        )
    }

    /// Send one user message and return the reconciled transcript.
    ///
    /// On backend failure the optimistic user message stays in the
    /// transcript and the loading placeholder is left for the caller to
    /// reconcile; the error carries the human-readable cause.
    pub async fn send(
        &self,
        conversation: Uuid,
        text: &str,
        attachment: Option<AttachmentUpload>,
    ) -> Result<Vec<Message>, Error> {
        let mut user_message = Message::user(text);
        if let Some(upload) = &attachment {
            user_message = user_message.with_attachment(Attachment {
                url: upload.file_name.clone(),
                content_type: upload.content_type.clone(),
                title: upload.file_name.clone(),
            });
        }
        self.transcript
            .append(conversation, vec![user_message, Message::loading(text)])
            .await;

        let replies = match self
            .backend
            .send_message(conversation, text, attachment.as_ref())
            .await
        {
            Ok(replies) => replies,
            Err(e) => {
                tracing::error!(error = %e, "Unable to send message");
                return Err(e.into());
            }
        };

        let state = self.state(conversation).await;
        if let Some(first) = replies.first() {
            let signal = classify(&first.text);
            state.lock().await.apply(&signal);
        } else {
            tracing::warn!("Chat backend returned no replies");
        }

        let triggers = {
            let guard = state.lock().await;
            detect_triggers(text, &guard)
        };
        for action in triggers {
            self.dispatch(conversation, action, Arc::clone(&state));
        }

        self.reconcile(conversation, replies).await;
        Ok(self.transcript.read(conversation).await)
    }

    /// Start the orchestrator for a detected trigger. Fire-and-forget: each
    /// orchestrator reports through the transcript.
    fn dispatch(&self, conversation: Uuid, action: TriggerAction, state: Arc<Mutex<WorkflowState>>) {
        match action {
            TriggerAction::RequestDeploy { payload } => {
                tracing::info!("Deploy request detected; starting deployment");
                let deployment = Arc::clone(&self.deployment);
                tokio::spawn(async move {
                    deployment.run(conversation, &payload, state).await;
                });
            }
            TriggerAction::RequestConfirmYes => {
                tracing::info!("Registration confirmed; starting transfer");
                let payment = Arc::clone(&self.payment);
                tokio::spawn(async move {
                    // Failures are already reflected in the transcript.
                    let _ = payment.run(conversation).await;
                });
            }
        }
    }

    /// Swap loading placeholders for the real replies, restamped so they
    /// sort after everything that landed while the request was in flight.
    async fn reconcile(&self, conversation: Uuid, replies: Vec<AgentReply>) {
        let now = Utc::now();
        let incoming: Vec<Message> = replies
            .into_iter()
            .map(|reply| {
                if let Some(action) = &reply.action {
                    tracing::debug!(action = %action, "Agent reply carried an action tag");
                }
                Message {
                    text: reply.text,
                    sender: Sender::System,
                    created_at: now,
                    is_loading: false,
                    source: reply.source,
                    attachments: Vec::new(),
                }
            })
            .collect();

        self.transcript
            .update(conversation, move |messages| {
                messages
                    .into_iter()
                    .filter(|m| !m.is_loading)
                    .chain(incoming)
                    .collect()
            })
            .await;
    }
}
