use std::error::Error;

use crate::cli::MemoryCommands;
use crate::core::app::AppContext;
use crate::core::message::MemoryItem;

pub async fn run_memory(ctx: &AppContext, command: MemoryCommands) -> Result<(), Box<dyn Error>> {
    match command {
        MemoryCommands::Search { query, k } => {
            let items = ctx.search_memories(&query.join(" "), k).await;
            if items.is_empty() {
                println!("No memories found.");
            }
            for item in &items {
                println!("{}", format_item(item));
            }
        }
        MemoryCommands::Add { text } => {
            if !ctx.add_memory(&text.join(" "), None).await {
                return Err("The backend did not store the memory".into());
            }
            println!("✅ Memory stored");
        }
    }
    Ok(())
}

pub fn format_item(item: &MemoryItem) -> String {
    let score = item
        .relevance_score
        .map(|score| format!(" ({score:.2})"))
        .unwrap_or_default();
    let namespace = serde_json::to_value(item.namespace)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default();
    format!("[{namespace}]{score} {}", item.content)
}
