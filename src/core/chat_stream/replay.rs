use std::time::Duration;

/// How a reply that is already complete gets fed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPacing {
    /// Characters per chunk, at least 1.
    pub chunk_size: usize,
    pub delay: Duration,
}

impl ReplayPacing {
    pub fn new(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    /// No delay between chunks.
    pub fn immediate(chunk_size: usize) -> Self {
        Self::new(chunk_size, Duration::ZERO)
    }
}

/// Split `text` into chunks of `chunk_size` characters. Chunks never split a
/// character; the last chunk may be shorter.
pub fn replay_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
