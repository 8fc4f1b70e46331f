//! `air4 set` / `air4 get`: the persisted preferences record.

use std::error::Error;

use crate::core::app::AppContext;
use crate::core::preferences::Preferences;

pub fn run_set(ctx: &AppContext, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    ctx.preferences().update(|preferences| {
        preferences.set_field(key, value)?;
        preferences.setup_complete = true;
        Ok(())
    })?;
    let shown = ctx.preferences().get().get_field(key).unwrap_or_default();
    println!("✅ Set {key} to: {shown}");
    Ok(())
}

pub fn run_get(ctx: &AppContext, key: Option<&str>) -> Result<(), Box<dyn Error>> {
    let preferences = ctx.preferences().get();
    match key {
        Some(key) => {
            let value = preferences.get_field(key).ok_or_else(|| {
                format!(
                    "Unknown preference: {key} (expected one of: {})",
                    Preferences::KEYS.join(", ")
                )
            })?;
            println!("{value}");
        }
        None => {
            println!("Preferences:");
            for line in format_preferences(&preferences) {
                println!("  {line}");
            }
            println!();
            ctx.config().print_all();
        }
    }
    Ok(())
}

pub fn format_preferences(preferences: &Preferences) -> Vec<String> {
    Preferences::KEYS
        .iter()
        .map(|key| {
            let value = preferences
                .get_field(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "(unset)".to_string());
            format!("{key}: {value}")
        })
        .collect()
}
