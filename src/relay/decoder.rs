// decoder.rs - Incremental Chunk Decoding
// Turns arbitrary byte chunks from a streaming HTTP body into complete JSON lines.
// Multi-byte characters and lines may be split anywhere across chunk boundaries.

/// Stateful UTF-8 decoder that holds back an incomplete trailing sequence until the
/// next chunk arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(bytes);

        let mut out = String::with_capacity(buffer.len());
        let mut rest = buffer.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes
                            self.partial = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end-of-stream. A dangling partial sequence decodes to U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.partial.is_empty() {
            String::new()
        } else {
            self.partial.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Byte chunks in, newline-delimited lines out
#[derive(Debug, Default)]
pub struct LineDecoder {
    utf8: Utf8Decoder,
    pending: String,
}

impl LineDecoder {
    /// Decode a chunk and return every line it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(bytes);
        self.pending.push_str(&text);
        self.take_lines()
    }

    /// Remaining text at end-of-stream, including an unterminated last line
    pub fn finish(&mut self) -> Vec<String> {
        let tail = self.utf8.finish();
        self.pending.push_str(&tail);
        let mut lines = self.take_lines();
        let last = std::mem::take(&mut self.pending);
        if !last.trim().is_empty() {
            lines.push(last.trim_end_matches('\r').to_string());
        }
        lines
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_split_across_chunks() {
        let bytes = "héllo 🌍".as_bytes();
        let mut decoder = Utf8Decoder::default();
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "héllo 🌍");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_dangling_sequence_at_end() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&[0x61, 0xE2, 0x82]), "a");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut lines = LineDecoder::default();
        assert!(lines.feed(br#"{"response":"#).is_empty());
        assert_eq!(lines.feed(b"\"a\"}\n{\"resp"), vec![r#"{"response":"a"}"#]);
        assert_eq!(
            lines.feed(b"onse\":\"b\"}\r\n\n{\"response\":\"c\"}\n"),
            vec![r#"{"response":"b"}"#, r#"{"response":"c"}"#]
        );
        assert!(lines.finish().is_empty());
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut lines = LineDecoder::default();
        assert!(lines.feed(br#"{"done":true}"#).is_empty());
        assert_eq!(lines.finish(), vec![r#"{"done":true}"#]);
    }
}
