use std::error::Error;

use crate::core::app::AppContext;
use crate::core::connectivity::SystemStatus;

pub async fn run_status(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    let status = ctx.status().await;
    for line in format_status(&status, ctx.config().base_url()) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status(status: &SystemStatus, base_url: &str) -> Vec<String> {
    let state = if status.is_offline {
        "🔴 offline"
    } else {
        "🟢 online"
    };
    vec![
        format!("Backend:  {base_url} ({state})"),
        format!("Model:    {}", status.model_name),
        format!("Storage:  {}", status.storage),
        format!("Ingest:   {} queued", status.ingest_queue_len),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_status_is_flagged() {
        let status = SystemStatus {
            model_name: "Demo / Offline".to_string(),
            storage: "Offline Mode".to_string(),
            ingest_queue_len: 0,
            is_offline: true,
        };
        let lines = format_status(&status, "http://127.0.0.1:8000");
        assert_eq!(lines[0], "Backend:  http://127.0.0.1:8000 (🔴 offline)");
        assert_eq!(lines[1], "Model:    Demo / Offline");
    }
}
