//! Incremental frame decoding for the backend event stream.
//!
//! Frames are delimited by a blank line; payload lines carry the `data:`
//! prefix. Chunk boundaries from the transport are never visible to the
//! caller: partial frames and split multi-byte characters are carried over
//! until completed by a later chunk.

/// Payload lines start with this prefix; everything else in a frame
/// (`event:`, `id:`, `retry:`, comments) is skipped.
const DATA_PREFIX: &str = "data:";

/// Frame delimiter after newline normalization.
const FRAME_DELIMITER: &str = "\n\n";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Undecoded UTF-8 tail from the previous chunk.
    carry: Vec<u8>,
    /// Decoded text still waiting for a frame boundary.
    buf: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns the payloads of every frame this
    /// chunk completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find(FRAME_DELIMITER) {
            let frame: String = self.buf.drain(..pos + FRAME_DELIMITER.len()).collect();
            if let Some(payload) = extract_payload(&frame) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush the pending buffer at stream end as a best-effort final frame.
    pub fn finish(&mut self) -> Option<String> {
        if !self.carry.is_empty() {
            let tail = std::mem::take(&mut self.carry);
            let text = String::from_utf8_lossy(&tail).replace('\r', "");
            self.buf.push_str(&text);
        }
        let rest = std::mem::take(&mut self.buf);
        extract_payload(&rest)
    }

    /// Streaming UTF-8 decode: hold back an incomplete trailing sequence,
    /// decode the rest lossily, normalize CRLF to LF.
    fn decode(&mut self, chunk: &[u8]) {
        self.carry.extend_from_slice(chunk);
        let keep = incomplete_suffix_len(&self.carry);
        let split = self.carry.len() - keep;
        let tail = self.carry.split_off(split);
        let ready = std::mem::replace(&mut self.carry, tail);
        if !ready.is_empty() {
            let text = String::from_utf8_lossy(&ready);
            // Stripping every CR (rather than only "\r\n") keeps the result
            // independent of where chunk boundaries fall.
            if text.contains('\r') {
                self.buf.push_str(&text.replace('\r', ""));
            } else {
                self.buf.push_str(&text);
            }
        }
    }
}

/// Length of an incomplete UTF-8 sequence at the end of `bytes`, 0 if the
/// buffer ends on a character boundary (or ends with garbage that lossy
/// decoding should replace).
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            // Continuation byte, keep scanning for the lead byte.
            continue;
        }
        let need = if byte >= 0xF0 {
            4
        } else if byte >= 0xE0 {
            3
        } else if byte >= 0xC0 {
            2
        } else {
            1
        };
        return if need > back { back } else { 0 };
    }
    0
}

/// Join the `data:` lines of one frame; None when the frame carries no
/// payload lines at all.
fn extract_payload(frame: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
