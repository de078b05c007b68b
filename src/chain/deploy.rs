//! Contract deployment client and orchestration.
//!
//! The deploy backend is a black box: source code in, address out. Response
//! shapes drifted across backend versions, so parsing tolerates both the
//! bare `{ "contract_address": ... }` form and the
//! `{ "success": ..., "contract_address": ..., "error": ... }` form, and
//! falls back to scanning a malformed body for an address-shaped token
//! before giving up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DeployError;
use crate::transcript::{Message, TranscriptStore};
use crate::workflow::{Phase, WorkflowState};

/// Progress placeholder; replaced (matched by exact text) once the
/// deployment settles.
pub const DEPLOYMENT_IN_PROGRESS: &str = "Deployment in progress...";

/// Follow-up prompt appended after a successful deployment.
pub const REGISTRATION_PROMPT: &str = "Phase 4: The contract has been successfully deployed. The deployed smart contract can be registered on the Lucy web for ongoing management. Would you like to proceed with management registration? (Yes or No)";

/// Result of one deployment attempt as reported to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    pub success: bool,
    pub message: String,
    pub address: Option<String>,
}

/// Deploy backend response body. Every field is optional; older backends
/// omit `success` and newer ones omit `status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The deploy backend surface.
#[async_trait]
pub trait DeployService: Send + Sync {
    async fn deploy(&self, contract_code: &str) -> Result<DeployResponse, DeployError>;
    async fn health(&self) -> Result<(), DeployError>;
}

/// HTTP client for the deploy backend.
pub struct HttpDeployService {
    client: Client,
    endpoint: String,
}

impl HttpDeployService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// `/health` on the same host as the deploy endpoint.
    fn health_url(&self) -> Result<String, DeployError> {
        let mut parsed = url::Url::parse(&self.endpoint)
            .map_err(|e| DeployError::MalformedResponse(format!("invalid endpoint: {e}")))?;
        parsed.set_path("/health");
        Ok(parsed.to_string())
    }
}

#[async_trait]
impl DeployService for HttpDeployService {
    async fn deploy(&self, contract_code: &str) -> Result<DeployResponse, DeployError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "contract_code": contract_code }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DeployError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_deploy_body(&body)
    }

    async fn health(&self) -> Result<(), DeployError> {
        let url = self.health_url()?;
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Base58-shaped token of plausible address length.
fn find_address_token(text: &str) -> Option<String> {
    let re = Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").ok()?;
    re.find(text).map(|m| m.as_str().to_string())
}

/// Parse a 2xx deploy body, scavenging an address from malformed payloads.
fn parse_deploy_body(body: &str) -> Result<DeployResponse, DeployError> {
    match serde_json::from_str::<DeployResponse>(body) {
        Ok(parsed) => Ok(parsed),
        Err(_) => match find_address_token(body) {
            Some(address) => Ok(DeployResponse {
                success: Some(true),
                contract_address: Some(address),
                status: None,
                error: None,
            }),
            None => {
                let preview: String = body.chars().take(200).collect();
                Err(DeployError::MalformedResponse(preview))
            }
        },
    }
}

fn outcome_from_response(response: DeployResponse) -> DeploymentOutcome {
    if response.success == Some(false) || response.error.is_some() {
        let reason = response
            .error
            .unwrap_or_else(|| "deploy backend reported failure".to_string());
        return DeploymentOutcome {
            success: false,
            message: format!("Deployment failed: {reason}"),
            address: None,
        };
    }

    match response.contract_address {
        Some(address) => DeploymentOutcome {
            success: true,
            message: format!("Contract deployed successfully! Address: {address}"),
            address: Some(address),
        },
        None => DeploymentOutcome {
            success: true,
            message: "Contract deployment initiated. The network has not returned an address yet; it will appear once the deployment is confirmed.".to_string(),
            address: None,
        },
    }
}

/// Drives one deployment attempt against the transcript.
pub struct DeploymentOrchestrator {
    transcript: TranscriptStore,
    service: Arc<dyn DeployService>,
    deploy_timeout: Duration,
    followup_delay: Duration,
}

impl DeploymentOrchestrator {
    pub fn new(
        transcript: TranscriptStore,
        service: Arc<dyn DeployService>,
        deploy_timeout: Duration,
        followup_delay: Duration,
    ) -> Self {
        Self {
            transcript,
            service,
            deploy_timeout,
            followup_delay,
        }
    }

    /// Run a deployment: progress message, bounded backend call, result
    /// message, and on success the phase advance plus the delayed
    /// registration prompt.
    pub async fn run(
        &self,
        conversation: Uuid,
        payload: &str,
        state: Arc<Mutex<WorkflowState>>,
    ) -> DeploymentOutcome {
        self.transcript
            .append(
                conversation,
                vec![Message::system(DEPLOYMENT_IN_PROGRESS).with_source("System")],
            )
            .await;

        if payload.trim().is_empty() {
            let outcome = DeploymentOutcome {
                success: false,
                message: format!("Deployment failed: {}", DeployError::MissingPayload),
                address: None,
            };
            tracing::error!("Deployment requested without contract source");
            self.settle(conversation, &outcome).await;
            return outcome;
        }

        tracing::info!(bytes = payload.len(), "Submitting contract for deployment");
        let outcome = match tokio::time::timeout(self.deploy_timeout, self.service.deploy(payload))
            .await
        {
            Ok(Ok(response)) => outcome_from_response(response),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Contract deployment failed");
                DeploymentOutcome {
                    success: false,
                    message: format!("Deployment failed: {e}"),
                    address: None,
                }
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.deploy_timeout.as_secs(),
                    "Deploy backend did not respond in time; reporting as initiated"
                );
                DeploymentOutcome {
                    success: true,
                    message: "Contract deployment initiated. The network is taking longer than expected to respond; the deployment continues in the background.".to_string(),
                    address: None,
                }
            }
        };

        self.settle(conversation, &outcome).await;

        if outcome.success {
            state.lock().await.phase = Some(Phase::AwaitingConfirmation);
            // Let the result message render before re-prompting.
            tokio::time::sleep(self.followup_delay).await;
            self.transcript
                .append(
                    conversation,
                    vec![Message::system(REGISTRATION_PROMPT).with_source("System")],
                )
                .await;
        }

        outcome
    }

    /// Replace the progress placeholder with the result message.
    async fn settle(&self, conversation: Uuid, outcome: &DeploymentOutcome) {
        let result = Message::system(outcome.message.clone()).with_source("Deployment");
        self.transcript
            .update(conversation, move |messages| {
                messages
                    .into_iter()
                    .filter(|m| m.text != DEPLOYMENT_IN_PROGRESS)
                    .chain(std::iter::once(result))
                    .collect()
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;

    struct ScriptedDeploy {
        result: Box<dyn Fn() -> Result<DeployResponse, DeployError> + Send + Sync>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedDeploy {
        fn ok(address: &str) -> Self {
            let address = address.to_string();
            Self {
                result: Box::new(move || {
                    Ok(DeployResponse {
                        contract_address: Some(address.clone()),
                        status: Some("success".to_string()),
                        ..Default::default()
                    })
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(reason: &str) -> Self {
            let reason = reason.to_string();
            Self {
                result: Box::new(move || {
                    Err(DeployError::Status {
                        status: 500,
                        body: reason.clone(),
                    })
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            let mut scripted = Self::ok("CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb");
            scripted.delay = delay;
            scripted
        }
    }

    #[async_trait]
    impl DeployService for ScriptedDeploy {
        async fn deploy(&self, _contract_code: &str) -> Result<DeployResponse, DeployError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.result)()
        }

        async fn health(&self) -> Result<(), DeployError> {
            Ok(())
        }
    }

    fn orchestrator(service: Arc<ScriptedDeploy>) -> (DeploymentOrchestrator, TranscriptStore) {
        let transcript = TranscriptStore::new();
        let orchestrator = DeploymentOrchestrator::new(
            transcript.clone(),
            service,
            Duration::from_secs(15),
            Duration::from_secs(2),
        );
        (orchestrator, transcript)
    }

    #[tokio::test(start_paused = true)]
    async fn progress_message_is_replaced_not_duplicated() {
        let service = Arc::new(ScriptedDeploy::ok("CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb"));
        let (orchestrator, transcript) = orchestrator(service.clone());
        let conversation = Uuid::new_v4();
        let state = Arc::new(Mutex::new(WorkflowState::default()));

        let outcome = orchestrator.run(conversation, "fn main() {}", state).await;

        assert!(outcome.success);
        let messages = transcript.read(conversation).await;
        assert!(messages.iter().all(|m| m.text != DEPLOYMENT_IN_PROGRESS));
        let results: Vec<_> = messages
            .iter()
            .filter(|m| m.source.as_deref() == Some("Deployment"))
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("Contract deployed successfully"));
        assert!(results[0].text.contains("Address: CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_advances_phase_and_prompts_after_delay() {
        let service = Arc::new(ScriptedDeploy::ok("CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb"));
        let (orchestrator, transcript) = orchestrator(service);
        let conversation = Uuid::new_v4();
        let state = Arc::new(Mutex::new(WorkflowState::default()));

        let run_state = Arc::clone(&state);
        let handle =
            tokio::spawn(async move { orchestrator.run(conversation, "fn main() {}", run_state).await });

        // Wait for the result message to land, then measure the prompt delay.
        let result_seen_at = loop {
            let messages = transcript.read(conversation).await;
            if messages
                .iter()
                .any(|m| m.source.as_deref() == Some("Deployment"))
            {
                break Instant::now();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        loop {
            let messages = transcript.read(conversation).await;
            if messages.iter().any(|m| m.text == REGISTRATION_PROMPT) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(result_seen_at.elapsed() >= Duration::from_millis(1900));

        handle.await.unwrap();
        assert!(state.lock().await.awaiting_confirmation());

        // The prompt is ordered after the result message.
        let messages = transcript.read(conversation).await;
        let result_idx = messages
            .iter()
            .position(|m| m.source.as_deref() == Some("Deployment"))
            .unwrap();
        let prompt_idx = messages
            .iter()
            .position(|m| m.text == REGISTRATION_PROMPT)
            .unwrap();
        assert!(prompt_idx > result_idx);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_phase_and_skips_prompt() {
        let service = Arc::new(ScriptedDeploy::failing("boom"));
        let (orchestrator, transcript) = orchestrator(service);
        let conversation = Uuid::new_v4();
        let state = Arc::new(Mutex::new(WorkflowState::default()));

        let outcome = orchestrator
            .run(conversation, "fn main() {}", Arc::clone(&state))
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Deployment failed:"));
        assert!(!state.lock().await.awaiting_confirmation());

        // Even well past the follow-up delay no prompt appears.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let messages = transcript.read(conversation).await;
        assert!(messages.iter().all(|m| m.text != REGISTRATION_PROMPT));
        assert!(messages.iter().all(|m| m.text != DEPLOYMENT_IN_PROGRESS));
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_backend_reports_provisional_success() {
        let service = Arc::new(ScriptedDeploy::slow(Duration::from_secs(120)));
        let (orchestrator, _transcript) = orchestrator(service.clone());
        let conversation = Uuid::new_v4();
        let state = Arc::new(Mutex::new(WorkflowState::default()));

        let outcome = orchestrator
            .run(conversation, "fn main() {}", Arc::clone(&state))
            .await;

        assert!(outcome.success);
        assert!(outcome.message.contains("Contract deployment initiated"));
        assert_eq!(outcome.address, None);
        assert!(state.lock().await.awaiting_confirmation());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_payload_fails_without_calling_backend() {
        let service = Arc::new(ScriptedDeploy::ok("CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb"));
        let (orchestrator, transcript) = orchestrator(service.clone());
        let conversation = Uuid::new_v4();
        let state = Arc::new(Mutex::new(WorkflowState::default()));

        let outcome = orchestrator.run(conversation, "   ", Arc::clone(&state)).await;

        assert!(!outcome.success);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(!state.lock().await.awaiting_confirmation());
        let messages = transcript.read(conversation).await;
        assert!(messages.iter().any(|m| m.text.starts_with("Deployment failed:")));
    }

    #[test]
    fn parse_accepts_both_response_variants() {
        let bare = parse_deploy_body(r#"{"contract_address":"abc","status":"success"}"#).unwrap();
        assert_eq!(bare.contract_address.as_deref(), Some("abc"));

        let tagged =
            parse_deploy_body(r#"{"success":false,"error":"compilation failed"}"#).unwrap();
        assert_eq!(tagged.success, Some(false));
        assert_eq!(tagged.error.as_deref(), Some("compilation failed"));
    }

    #[test]
    fn parse_scavenges_address_from_malformed_body() {
        let body = "deployed at CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb (raw log output)";
        let parsed = parse_deploy_body(body).unwrap();
        assert_eq!(
            parsed.contract_address.as_deref(),
            Some("CgaTAMXGKEWPVWuSqFfWKhFJpZ7TxU2YpwvDMZVt8Zhb")
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_deploy_body("not json, no address"),
            Err(DeployError::MalformedResponse(_))
        ));
    }

    #[test]
    fn error_field_wins_over_address() {
        let outcome = outcome_from_response(DeployResponse {
            contract_address: Some("abc".to_string()),
            error: Some("out of funds".to_string()),
            ..Default::default()
        });
        assert!(!outcome.success);
        assert!(outcome.message.contains("out of funds"));
    }
}
