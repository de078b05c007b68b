//! Chat backend client.
//!
//! The agent lives behind an HTTP API: `POST <base>/<agent_id>/message`
//! returns a list of replies. Attachments go up as multipart, plain text as
//! JSON. The pipeline only depends on the [`ChatBackend`] trait so tests can
//! swap in a scripted backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ChatError;

/// One reply element from the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            action: None,
        }
    }
}

/// A file the user attached to their message.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Something that answers user messages with agent replies.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(
        &self,
        conversation: Uuid,
        text: &str,
        attachment: Option<&AttachmentUpload>,
    ) -> Result<Vec<AgentReply>, ChatError>;
}

/// HTTP client for the agent backend.
pub struct HttpChatBackend {
    client: Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn message_url(&self, conversation: Uuid) -> String {
        format!("{}/{}/message", self.base_url, conversation)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_message(
        &self,
        conversation: Uuid,
        text: &str,
        attachment: Option<&AttachmentUpload>,
    ) -> Result<Vec<AgentReply>, ChatError> {
        let url = self.message_url(conversation);

        let request = match attachment {
            Some(upload) => {
                let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.content_type)
                    .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .text("text", text.to_string())
                    .text("user", "user")
                    .part("file", part);
                self.client.post(&url).multipart(form)
            }
            None => self.client.post(&url).json(&serde_json::json!({
                "text": text,
                "user": "user",
            })),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let replies: Vec<AgentReply> = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        Ok(replies)
    }
}
