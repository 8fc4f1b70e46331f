//! Streaming one exchange to the terminal, shared by `say` and `chat`.

use std::error::Error;
use std::io::{self, Write};

use crate::core::app::AppContext;
use crate::core::chat_stream::{ChatEvent, ExchangeOutcome};
use crate::core::message::{MemoryItem, RouterDecision};
use crate::utils::logging::TranscriptLog;

pub async fn run_say(
    ctx: &AppContext,
    prompt: Vec<String>,
    session: Option<String>,
    transcript: &TranscriptLog,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: air4 say <prompt>");
        std::process::exit(1);
    }

    let session = ctx.ensure_session(session.as_deref())?;
    match stream_exchange(ctx, &session.id, &prompt, transcript).await? {
        ExchangeOutcome::Committed => Ok(()),
        ExchangeOutcome::Failed(_) => std::process::exit(1),
    }
}

/// Send `text` into `session_id`, printing reply chunks to stdout as they
/// arrive. Routing and context notes go to stderr. A committed exchange is
/// appended to the transcript.
pub async fn stream_exchange(
    ctx: &AppContext,
    session_id: &str,
    text: &str,
    transcript: &TranscriptLog,
) -> Result<ExchangeOutcome, Box<dyn Error>> {
    let mut stream = ctx.chat().send(session_id, text)?;

    let mut full_response = String::new();
    let mut stdout = io::stdout();
    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Decision(decision) => eprintln!("{}", describe_decision(&decision)),
            ChatEvent::Context(items) => eprintln!("{}", describe_context(&items)),
            ChatEvent::Chunk(content) => {
                full_response.push_str(&content);
                print!("{content}");
                stdout.flush()?;
            }
            ChatEvent::Finished(outcome) => {
                println!();
                match &outcome {
                    ExchangeOutcome::Committed => {
                        let name = ctx.preferences().get().display_name().to_string();
                        if let Err(err) = transcript.log_exchange(&name, text, &full_response) {
                            eprintln!("⚠️  Transcript not written: {err}");
                        }
                    }
                    ExchangeOutcome::Failed(reason) => eprintln!("❌ Error: {reason}"),
                }
                return Ok(outcome);
            }
        }
    }

    println!();
    Ok(ExchangeOutcome::Failed("cancelled".to_string()))
}

pub fn describe_decision(decision: &RouterDecision) -> String {
    format!(
        "[{} · {} · {:.0}%]",
        decision.domain.as_str(),
        decision.model,
        decision.confidence * 100.0
    )
}

pub fn describe_context(items: &[MemoryItem]) -> String {
    match items.len() {
        1 => "[1 context item attached]".to_string(),
        count => format!("[{count} context items attached]"),
    }
}
