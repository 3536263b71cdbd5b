//! Incremental text decoding and line splitting
//!
//! Bytes arrive in arbitrary chunks, so both multi-byte characters and `\r\n`
//! pairs may be split across chunk boundaries.

use encoding_rs::{CoderResult, Decoder, Encoding};

/// Decodes a byte stream into lines terminated by `\n`, `\r` or `\r\n`
pub(crate) struct LineDecoder {
    decoder: Decoder,
    line: String,
    pending_cr: bool,
}

impl LineDecoder {
    pub(crate) fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_with_bom_removal(),
            line: String::new(),
            pending_cr: false,
        }
    }

    /// Feed a chunk, returning every line completed by it
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = decode(&mut self.decoder, bytes, false);
        let mut lines = Vec::new();
        self.split(&text, &mut lines);
        lines
    }

    /// Flush the decoder at end of stream; an unterminated tail becomes the last line
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let text = decode(&mut self.decoder, &[], true);
        let mut lines = Vec::new();
        self.split(&text, &mut lines);
        if !self.line.is_empty() {
            lines.push(std::mem::take(&mut self.line));
        }
        lines
    }

    fn split(&mut self, text: &str, lines: &mut Vec<String>) {
        for ch in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                // The line was already emitted at the '\r'.
                if ch == '\n' {
                    continue;
                }
            }
            match ch {
                '\r' => {
                    lines.push(std::mem::take(&mut self.line));
                    self.pending_cr = true;
                }
                '\n' => lines.push(std::mem::take(&mut self.line)),
                c => self.line.push(c),
            }
        }
    }
}

/// Decode a complete byte buffer with the given encoding
pub(crate) fn decode_all(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let mut decoder = encoding.new_decoder_with_bom_removal();
    decode(&mut decoder, bytes, true)
}

fn decode(decoder: &mut Decoder, mut bytes: &[u8], last: bool) -> String {
    let mut text = String::new();
    loop {
        let needed = decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len().saturating_mul(3))
            .max(16);
        text.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(bytes, &mut text, last);
        bytes = &bytes[read..];
        if let CoderResult::InputEmpty = result {
            return text;
        }
    }
}
