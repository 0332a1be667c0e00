// src/io/serial/framer.rs
//
// Newline framing for the serial text stream.
// Chunks arrive with no structure (a read can end mid-number or carry several
// lines); the framer buffers them and hands back complete, trimmed lines.

/// Line terminator. A preceding `\r` is removed by trimming.
pub const LINE_TERMINATOR: char = '\n';

/// Stateful line framer for one connection.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
    /// Drop input up to and including the next terminator
    skip_to_newline: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        LineFramer {
            buffer: String::new(),
            skip_to_newline: false,
        }
    }

    /// Feed decoded text into the framer.
    /// Returns every line completed by this chunk, in order. Lines are trimmed
    /// and empty lines are dropped.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        if chunk.is_empty() {
            return lines;
        }

        let chunk = if self.skip_to_newline {
            match chunk.find(LINE_TERMINATOR) {
                Some(end) => {
                    self.skip_to_newline = false;
                    &chunk[end + LINE_TERMINATOR.len_utf8()..]
                }
                None => return lines,
            }
        } else {
            chunk
        };

        self.buffer.push_str(chunk);

        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].find(LINE_TERMINATOR) {
            let end = consumed + offset;
            let line = self.buffer[consumed..end].trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            consumed = end + LINE_TERMINATOR.len_utf8();
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }

        lines
    }

    /// Characters waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.chars().count()
    }

    /// Whether input is being dropped until the next terminator
    pub fn is_discarding(&self) -> bool {
        self.skip_to_newline
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.skip_to_newline = false;
    }

    /// Drop the partial line along with the rest of it still to come: input is
    /// ignored up to and including the next terminator.
    pub fn discard_partial(&mut self) {
        self.buffer.clear();
        self.skip_to_newline = true;
    }

    /// Take the unterminated remainder, trimmed. `None` if nothing is left.
    /// Call when the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}
