use std::error::Error;

use crate::api::IngestQueueEntry;
use crate::cli::IngestCommands;
use crate::core::app::AppContext;

pub async fn run_ingest(ctx: &AppContext, command: IngestCommands) -> Result<(), Box<dyn Error>> {
    match command {
        IngestCommands::File { path, tag } => {
            if !ctx.upload_file(&path, tag.as_deref()).await? {
                return Err(format!("Upload of {} was not accepted", path.display()).into());
            }
            println!(
                "✅ Uploaded {} (chunking: {})",
                path.display(),
                ctx.preferences().get().ingest_mode
            );
        }
        IngestCommands::Queue => {
            let queue = ctx.ingest_queue().await;
            if queue.is_empty() {
                println!("Ingest queue is empty.");
            }
            for entry in &queue {
                println!("{}", format_entry(entry));
            }
        }
    }
    Ok(())
}

pub fn format_entry(entry: &IngestQueueEntry) -> String {
    format!("{:>3}%  {:<12} {}", entry.progress, entry.status, entry.file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_line_aligns_progress_and_status() {
        let entry = IngestQueueEntry {
            id: "d1".to_string(),
            file: "notes.pdf".to_string(),
            status: "processing".to_string(),
            progress: 50,
        };
        assert_eq!(format_entry(&entry), " 50%  processing   notes.pdf");
    }
}
