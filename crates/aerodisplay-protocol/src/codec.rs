//! Line codec for the controller link.
//!
//! Every message is a single JSON object followed by `\n`. This module
//! provides encoding and decoding of single lines and a [`LineFramer`] that
//! splits a raw byte stream into complete lines.

use crate::messages::{Command, InboundFrame};
use serde_json::Value;
use thiserror::Error;

/// Line delimiter on the wire.
pub const LINE_DELIMITER: u8 = b'\n';

/// Longest line accepted before the framer gives up on it.
pub const MAX_LINE_LEN: usize = 1024;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The line parsed but was not a JSON object.
    #[error("Expected a JSON object")]
    NotAnObject,

    /// No delimiter within the maximum line length.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Encode a command as one delimited line.
pub fn encode_command(cmd: &Command) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(cmd)?;
    line.push(LINE_DELIMITER as char);
    Ok(line)
}

/// Decode a single line (without delimiter) into a frame.
pub fn decode_frame(line: &str) -> Result<InboundFrame, CodecError> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(map) => Ok(InboundFrame::new(map)),
        _ => Err(CodecError::NotAnObject),
    }
}

/// Splits a byte stream into trimmed, non-empty lines.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Feed bytes and collect every line they complete.
    ///
    /// Incomplete trailing data is kept for the next call. Oversized lines
    /// are reported once as [`CodecError::LineTooLong`] and skipped up to
    /// their delimiter.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, CodecError>> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == LINE_DELIMITER {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let text = String::from_utf8_lossy(&self.buf);
                    let text = text.trim();
                    if !text.is_empty() {
                        lines.push(Ok(text.to_string()));
                    }
                }
                self.buf.clear();
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buf.len() >= self.max_len {
                self.buf.clear();
                self.discarding = true;
                lines.push(Err(CodecError::LineTooLong(self.max_len)));
                continue;
            }

            self.buf.push(byte);
        }

        lines
    }

    /// Bytes waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_lines(results: Vec<Result<String, CodecError>>) -> Vec<String> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_encode_command() {
        let line = encode_command(&Command::get_status()).unwrap();
        assert_eq!(line, "{\"cmd\":\"get_status\"}\n");
    }

    #[test]
    fn test_decode_frame() {
        let frame = decode_frame(r#"{"status":"ok"}"#).unwrap();
        assert!(frame.is_status());

        assert!(matches!(decode_frame("{\"temp\":"), Err(CodecError::Json(_))));
        assert!(matches!(decode_frame("[1,2,3]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode_frame("42"), Err(CodecError::NotAnObject)));
    }

    #[test]
    fn test_framer_splits_lines() {
        let mut framer = LineFramer::default();
        let lines = ok_lines(framer.push(b"{\"a\":1}\n{\"b\":2}\r\n\n  \n"));
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_keeps_partial_line() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"{\"temp\":2").is_empty());
        assert_eq!(framer.pending(), 9);

        let lines = ok_lines(framer.push(b"2.5}\n{\"hum"));
        assert_eq!(lines, vec!["{\"temp\":22.5}"]);
        assert_eq!(framer.pending(), 5);
    }

    #[test]
    fn test_framer_discards_oversized_line() {
        let mut framer = LineFramer::new(8);
        let results = framer.push(b"0123456789abcdef\n{\"x\":1}\n");

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(CodecError::LineTooLong(8))));
        assert_eq!(results[1].as_ref().unwrap(), "{\"x\":1}");
    }
}
