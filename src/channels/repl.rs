//! Interactive terminal channel.
//!
//! Uses rustyline for line editing and history, and termimad for rendering
//! agent markdown inline. A printer task follows transcript notifications so
//! messages injected by the deployment and payment orchestrators appear as
//! they land, not only at turn boundaries.
//!
//! ## Commands
//!
//! - `/help` - Show available commands
//! - `/contracts` - List registered contract deployments
//! - `/attach <path> <message>` - Send a message with a file attached
//! - `/quit` or `/exit` - Leave the chat

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use termimad::MadSkin;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

use crate::backend::AttachmentUpload;
use crate::bootstrap::lucy_home;
use crate::chain::ContractRegistry;
use crate::transcript::{Message, Sender, TranscriptStore};
use crate::workflow::SendPipeline;

const HELP: &str = "\
/help                    Show this help
/contracts               List registered contract deployments
/attach <path> <message> Send a message with a file attached
/quit                    Leave the chat (also /exit)
";

/// How long single-message mode waits for a quiet transcript before exiting,
/// so triggered deployments and transfers get to report.
const DRAIN_IDLE: Duration = Duration::from_secs(3);

fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.code_block.left_margin = 2;
    skin
}

/// Terminal chat channel.
pub struct ReplChannel {
    /// Optional single message to send (for the `-m` flag).
    single_message: Option<String>,
}

impl ReplChannel {
    pub fn new() -> Self {
        Self {
            single_message: None,
        }
    }

    /// A channel that sends one message, waits for the flow to settle, and
    /// exits.
    pub fn with_message(message: String) -> Self {
        Self {
            single_message: Some(message),
        }
    }

    pub async fn run(
        &self,
        pipeline: Arc<SendPipeline>,
        registry: ContractRegistry,
        conversation: Uuid,
    ) -> anyhow::Result<()> {
        let transcript = pipeline.transcript().clone();

        if let Some(message) = self.single_message.clone() {
            return self.run_single(pipeline, transcript, conversation, message).await;
        }

        let printer = spawn_printer(transcript, conversation);

        let history_path = lucy_home().join("history.txt");
        let mut editor = DefaultEditor::new()?;
        let _ = editor.load_history(&history_path);

        println!("Connected. Type a message, /help for commands.");
        loop {
            let (returned, readline) = tokio::task::spawn_blocking(move || {
                let result = editor.readline("you> ");
                (editor, result)
            })
            .await?;
            editor = returned;

            match readline {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(&line);
                    match line.as_str() {
                        "/quit" | "/exit" => break,
                        "/help" => print!("{HELP}"),
                        "/contracts" => print_contracts(&registry),
                        _ if line.starts_with("/attach") => {
                            match parse_attach(&line) {
                                Some((path, message)) => {
                                    send_with_attachment(&pipeline, conversation, path, message)
                                        .await;
                                }
                                None => eprintln!("Usage: /attach <path> <message>"),
                            }
                        }
                        _ => {
                            if let Err(e) = pipeline.send(conversation, &line, None).await {
                                eprintln!("Unable to send message: {e}");
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("Input error: {e}");
                    break;
                }
            }
        }

        if let Some(parent) = history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = editor.save_history(&history_path);
        printer.abort();
        Ok(())
    }

    /// Send one message, render everything that arrives until the
    /// transcript goes quiet, then exit.
    async fn run_single(
        &self,
        pipeline: Arc<SendPipeline>,
        transcript: TranscriptStore,
        conversation: Uuid,
        message: String,
    ) -> anyhow::Result<()> {
        let mut changes = BroadcastStream::new(transcript.subscribe());
        let skin = make_skin();
        let mut seen = HashSet::new();

        if let Err(e) = pipeline.send(conversation, &message, None).await {
            eprintln!("Unable to send message: {e}");
            return Ok(());
        }
        print_new(&skin, &transcript.read(conversation).await, &mut seen);

        loop {
            match tokio::time::timeout(DRAIN_IDLE, changes.next()).await {
                Ok(Some(Ok(changed))) if changed == conversation => {
                    print_new(&skin, &transcript.read(conversation).await, &mut seen);
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => {
                    print_new(&skin, &transcript.read(conversation).await, &mut seen);
                }
                Ok(None) | Err(_) => break,
            }
        }
        Ok(())
    }
}

impl Default for ReplChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render messages not printed before. User messages are marked seen but not
/// echoed; the terminal already shows what was typed.
fn print_new(skin: &MadSkin, messages: &[Message], seen: &mut HashSet<String>) {
    for message in messages {
        if !seen.insert(message.key()) {
            continue;
        }
        if message.sender == Sender::User || message.is_loading {
            continue;
        }
        match &message.source {
            Some(source) => println!("[{source}]"),
            None => println!("[Lucy]"),
        }
        skin.print_text(&message.text);
        println!();
    }
}

fn spawn_printer(transcript: TranscriptStore, conversation: Uuid) -> JoinHandle<()> {
    let mut changes = BroadcastStream::new(transcript.subscribe());
    tokio::spawn(async move {
        let skin = make_skin();
        let mut seen = HashSet::new();
        print_new(&skin, &transcript.read(conversation).await, &mut seen);
        while let Some(event) = changes.next().await {
            match event {
                Ok(changed) if changed == conversation => {
                    print_new(&skin, &transcript.read(conversation).await, &mut seen);
                }
                Ok(_) => {}
                // Missed notifications are fine; the next read catches up.
                Err(BroadcastStreamRecvError::Lagged(_)) => {
                    print_new(&skin, &transcript.read(conversation).await, &mut seen);
                }
            }
        }
    })
}

/// Split `/attach <path> <message>` into its parts.
fn parse_attach(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("/attach")?.trim_start();
    let (path, message) = rest.split_once(char::is_whitespace)?;
    let message = message.trim();
    if path.is_empty() || message.is_empty() {
        return None;
    }
    Some((path, message))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("md") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

async fn send_with_attachment(
    pipeline: &SendPipeline,
    conversation: Uuid,
    path: &str,
    message: &str,
) {
    let path = Path::new(path);
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Unable to read {}: {e}", path.display());
            return;
        }
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment")
        .to_string();
    let upload = AttachmentUpload {
        content_type: content_type_for(path).to_string(),
        file_name,
        bytes,
    };
    if let Err(e) = pipeline.send(conversation, message, Some(upload)).await {
        eprintln!("Unable to send message: {e}");
    }
}

fn print_contracts(registry: &ContractRegistry) {
    let contracts = registry.list();
    if contracts.is_empty() {
        println!("No contracts registered yet.");
        return;
    }
    for contract in contracts {
        println!(
            "{}  {}  {}  {}  {}  {} interactions",
            contract.id,
            contract.name,
            contract.address,
            contract.network,
            contract.deploy_date,
            contract.interactions
        );
        println!("    signature: {}", contract.tx_signature);
    }
}
