// src/io/serial/decoder.rs
//
// Incremental UTF-8 decoding for serial reads.
// A multi-byte character can straddle two reads, so the tail of an incomplete
// sequence is held back until the next chunk completes it. Invalid bytes are
// replaced with U+FFFD.

/// Stateful UTF-8 decoder for one connection.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Utf8StreamDecoder {
            pending: Vec::new(),
        }
    }

    /// Decode a chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// End of stream: anything still pending can never complete.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&pending).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"25.5,26.0\r\n"), "25.5,26.0\r\n");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "21.0°C,22.5°C\n";
        let bytes = text.as_bytes();

        for i in 0..=bytes.len() {
            let mut decoder = Utf8StreamDecoder::new();
            let mut out = decoder.decode(&bytes[..i]);
            out.push_str(&decoder.decode(&bytes[i..]));
            assert_eq!(out, text, "split at {}", i);
            assert!(decoder.finish().is_none());
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let text = "€,°,✓";
        let mut decoder = Utf8StreamDecoder::new();
        let out: String = text.as_bytes().iter().map(|b| decoder.decode(&[*b])).collect();
        assert_eq!(out, text);
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"1,\xFF,2"), "1,\u{FFFD},2");
    }

    #[test]
    fn test_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8StreamDecoder::new();
        // First two bytes of a three-byte character
        assert_eq!(decoder.decode(&[b'a', 0xE2, 0x82]), "a");
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.finish(), Some("\u{FFFD}".to_string()));
        assert_eq!(decoder.pending_len(), 0);
    }
}
