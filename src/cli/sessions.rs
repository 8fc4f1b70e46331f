use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::cli::SessionCommands;
use crate::core::app::AppContext;
use crate::core::sessions::{group_sessions, SessionGroup};

pub fn run_sessions(ctx: &AppContext, command: SessionCommands) -> Result<(), Box<dyn Error>> {
    match command {
        SessionCommands::List => print_grouped_sessions(ctx),
        SessionCommands::New { title } => {
            let session = ctx.create_session(title.as_deref());
            println!("✅ Created session {} ({})", session.title, session.id);
        }
        SessionCommands::Rename { id, title } => {
            let title = title.join(" ");
            if !ctx.sessions().rename(&id, &title) {
                return Err(format!("Session not found: {id}").into());
            }
            println!("✅ Renamed {id} to: {title}");
        }
        SessionCommands::Delete { id } => {
            if !ctx.sessions().delete(&id) {
                return Err(format!("Session not found: {id}").into());
            }
            println!("✅ Deleted session {id}");
        }
        SessionCommands::ClearAll => {
            let fresh = ctx.delete_all_sessions();
            println!("✅ All sessions deleted; started {} ({})", fresh.title, fresh.id);
        }
        SessionCommands::Duplicate { id } => {
            let copy = ctx
                .sessions()
                .duplicate(&id)
                .ok_or_else(|| format!("Session not found: {id}"))?;
            println!("✅ Created {} ({})", copy.title, copy.id);
        }
        SessionCommands::Export { id, dir } => {
            let path = export_session(ctx, &id, dir.as_deref().unwrap_or(Path::new(".")))?;
            println!("✅ Exported to {}", path.display());
        }
    }
    Ok(())
}

pub fn export_file_name(id: &str) -> String {
    format!("air4_session_{id}.json")
}

/// Write one session as pretty JSON into `dir`.
pub fn export_session(ctx: &AppContext, id: &str, dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = ctx
        .sessions()
        .export(id)
        .ok_or_else(|| format!("Session not found: {id}"))??;
    let path = dir.join(export_file_name(id));
    fs::write(&path, json)?;
    Ok(path)
}

pub fn print_grouped_sessions(ctx: &AppContext) {
    let groups = group_sessions(&ctx.sessions().list(), &Local::now());
    for line in format_groups(&groups) {
        println!("{line}");
    }
}

pub fn format_groups(groups: &[SessionGroup]) -> Vec<String> {
    if groups.is_empty() {
        return vec!["No sessions.".to_string()];
    }
    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("{}:", group.bucket.label()));
        for session in &group.sessions {
            let preview = match session.last_message.trim() {
                "" => String::new(),
                text => format!(" · {text}"),
            };
            lines.push(format!("  {}  {}{}", session.id, session.title, preview));
        }
    }
    lines
}
