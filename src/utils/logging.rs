//! Plain-text transcript of chat exchanges (`--log <file>`).

use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub struct TranscriptLog {
    file_path: Option<String>,
    is_active: bool,
}

impl TranscriptLog {
    /// A log writing to `log_file`, active immediately when a path is given.
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut log = TranscriptLog {
            file_path: None,
            is_active: false,
        };
        if let Some(path) = log_file {
            log.set_log_file(path)?;
        }
        Ok(log)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    /// Pause or resume. A pause leaves a `## <note>` marker in the file.
    pub fn toggle(&mut self, pause_note: &str) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                if self.is_active {
                    self.log_note(pause_note)?;
                    self.is_active = false;
                    Ok(format!("Logging paused (file: {path})"))
                } else {
                    self.is_active = true;
                    Ok(format!("Logging resumed to: {path}"))
                }
            }
            None => Err("No log file specified. Use /log <filename> to enable logging first.".into()),
        }
    }

    /// Append one exchange: the user line prefixed with their display name,
    /// then the reply as-is.
    pub fn log_exchange(
        &self,
        user_display_name: &str,
        user_text: &str,
        reply: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.log_block(&format!("{user_display_name}: {user_text}"))?;
        if !reply.is_empty() {
            self.log_block(reply)?;
        }
        Ok(())
    }

    pub fn log_note(&self, note: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.log_block(&format!("## {note}"))
    }

    fn log_block(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        // Blank line between blocks.
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn status_string(&self) -> String {
        let file_name = |path: &str| {
            Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }
}

/// Write a whole conversation to `path` in transcript format, replacing the
/// file atomically. System notices are written as `## ` lines.
pub fn dump_transcript(
    messages: &[Message],
    user_display_name: &str,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(parent)?;

    for message in messages {
        let block = match message.role {
            Role::User => format!("{}: {}", user_display_name, message.content),
            Role::Assistant if !message.content.is_empty() => message.content.clone(),
            Role::System => format!("## {}", message.content),
            Role::Assistant => continue,
        };
        for line in block.lines() {
            writeln!(temp_file, "{line}")?;
        }
        writeln!(temp_file)?;
    }

    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path)?;
    Ok(())
}

fn test_file_access(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()?;
    Ok(())
}
