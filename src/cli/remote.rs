use std::error::Error;

use chrono::DateTime;

use crate::api::RemoteSession;
use crate::cli::RemoteCommands;
use crate::core::app::AppContext;

pub async fn run_remote(ctx: &AppContext, command: RemoteCommands) -> Result<(), Box<dyn Error>> {
    match command {
        RemoteCommands::Sessions => {
            let sessions = ctx.remote_sessions().await?;
            if sessions.is_empty() {
                println!("The backend holds no sessions.");
            }
            for session in &sessions {
                println!("{}", format_remote(session));
            }
        }
        RemoteCommands::Clear { id } => {
            ctx.clear_remote_session(&id).await?;
            println!("✅ Cleared backend history for {id}");
        }
    }
    Ok(())
}

pub fn format_remote(session: &RemoteSession) -> String {
    let updated = session
        .updated_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|at| format!("  (updated {})", at.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    format!("{}  {}{}", session.id, session.title, updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_line_includes_update_time_when_known() {
        let mut session = RemoteSession {
            id: "s1".to_string(),
            title: "Budget".to_string(),
            updated_at: Some(0),
        };
        assert_eq!(
            format_remote(&session),
            "s1  Budget  (updated 1970-01-01 00:00 UTC)"
        );
        session.updated_at = None;
        assert_eq!(format_remote(&session), "s1  Budget");
    }
}
