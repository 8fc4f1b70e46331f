//! Line-oriented chat: every input line is one exchange.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::exchange::stream_exchange;
use crate::cli::sessions::print_grouped_sessions;
use crate::core::app::AppContext;
use crate::utils::logging::{dump_transcript, TranscriptLog};

#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput<'a> {
    Message(&'a str),
    NewSession(Option<&'a str>),
    ListSessions,
    /// `/log` with or without a file name.
    Log(Option<&'a str>),
    /// `/dump <file>`: write the whole session as a transcript.
    Dump(Option<&'a str>),
    Quit,
    Unknown(&'a str),
    Empty,
}

pub fn parse_line(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplInput::Message(line);
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (command, None),
    };
    match name {
        "new" => ReplInput::NewSession(rest),
        "sessions" => ReplInput::ListSessions,
        "log" => ReplInput::Log(rest),
        "dump" => ReplInput::Dump(rest),
        "quit" | "exit" => ReplInput::Quit,
        _ => ReplInput::Unknown(name),
    }
}

pub async fn run_chat(
    ctx: &AppContext,
    session: Option<String>,
    transcript: &mut TranscriptLog,
) -> Result<(), Box<dyn Error>> {
    let mut current = ctx.ensure_session(session.as_deref())?;
    println!("💬 {} ({})", current.title, short_id(&current.id));
    println!("Type /quit to leave, /new to start another session.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_line(&line) {
            ReplInput::Empty => {}
            ReplInput::Quit => break,
            ReplInput::NewSession(title) => {
                current = ctx.create_session(title);
                println!("✨ {} ({})", current.title, short_id(&current.id));
            }
            ReplInput::ListSessions => print_grouped_sessions(ctx),
            ReplInput::Log(Some(path)) => match transcript.set_log_file(path.to_string()) {
                Ok(message) => println!("{message}"),
                Err(err) => eprintln!("❌ Error: {err}"),
            },
            ReplInput::Log(None) => match transcript.toggle("Transcript paused") {
                Ok(message) => println!("{message}"),
                Err(err) => eprintln!("❌ Error: {err}"),
            },
            ReplInput::Dump(Some(path)) => {
                let messages = ctx
                    .sessions()
                    .get(&current.id)
                    .map(|session| session.messages)
                    .unwrap_or_default();
                let name = ctx.preferences().get().display_name().to_string();
                match dump_transcript(&messages, &name, Path::new(path)) {
                    Ok(()) => println!("Session written to: {path}"),
                    Err(err) => eprintln!("❌ Error: {err}"),
                }
            }
            ReplInput::Dump(None) => eprintln!("Usage: /dump <filename>"),
            ReplInput::Unknown(name) => {
                eprintln!("Unknown command: /{name} (try /new, /sessions, /log, /dump, /quit)")
            }
            ReplInput::Message(text) => {
                if let Err(err) = stream_exchange(ctx, &current.id, text, transcript).await {
                    eprintln!("❌ Error: {err}");
                }
            }
        }
    }

    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
