//! Accumulation buffer for reasoning fragments.
//!
//! Thinking deltas are a byte-stream of a natural-language monologue, not
//! discrete log lines: fragments concatenate into one buffer and a boundary
//! event commits the whole trimmed buffer as a single thinking block.

#[derive(Debug, Default)]
pub struct ThinkingAccumulator {
    buffer: String,
}

impl ThinkingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Uncommitted fragment buffer.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Take the trimmed buffer as one committed block; None when the buffer
    /// holds nothing but whitespace. The buffer is cleared either way.
    pub fn commit(&mut self) -> Option<String> {
        let block = self.buffer.trim().to_string();
        self.buffer.clear();
        if block.is_empty() {
            None
        } else {
            Some(block)
        }
    }
}
