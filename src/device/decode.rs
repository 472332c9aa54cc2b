//! micro:bit token decoder
//!
//! Wire format: ASCII tokens separated by newlines or other whitespace,
//! case-insensitive. A token still pending when a read times out is
//! flushed as-is, since some firmware builds omit the trailing newline.

use crate::types::DecodedToken;

/// Longest token kept while waiting for a delimiter
const MAX_PENDING: usize = 64;

/// Incremental splitter over the raw byte stream
#[derive(Debug, Default)]
pub struct TokenDecoder {
    pending: Vec<u8>,
}

impl TokenDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every token completed by a delimiter
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodedToken> {
        let mut tokens = Vec::new();
        for &b in bytes {
            if b.is_ascii_whitespace() {
                if let Some(token) = self.take() {
                    tokens.push(token);
                }
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_PENDING {
                    tokens.extend(self.take());
                }
            }
        }
        tokens
    }

    /// Emit whatever is pending (called on an idle read)
    pub fn flush(&mut self) -> Option<DecodedToken> {
        self.take()
    }

    fn take(&mut self) -> Option<DecodedToken> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(DecodedToken::decode(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn test_single_line() {
        let mut decoder = TokenDecoder::new();
        assert_eq!(decoder.push(b"RED\n"), vec![DecodedToken::Color(Color::Red)]);
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_unknown_token() {
        let mut decoder = TokenDecoder::new();
        assert_eq!(
            decoder.push(b"PURPLE\n"),
            vec![DecodedToken::Unrecognized("PURPLE".to_string())]
        );
    }

    #[test]
    fn test_split_across_reads() {
        let mut decoder = TokenDecoder::new();
        assert!(decoder.push(b"gr").is_empty());
        assert_eq!(decoder.push(b"een\r\nblue "), vec![
            DecodedToken::Color(Color::Green),
            DecodedToken::Color(Color::Blue),
        ]);
    }

    #[test]
    fn test_flush_on_idle() {
        let mut decoder = TokenDecoder::new();
        assert!(decoder.push(b"yellow").is_empty());
        assert_eq!(decoder.flush(), Some(DecodedToken::Color(Color::Yellow)));
        assert_eq!(decoder.flush(), None);
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        let mut decoder = TokenDecoder::new();
        assert!(decoder.push(b"\r\n\n  \t").is_empty());
    }

    #[test]
    fn test_runaway_token_is_cut() {
        let mut decoder = TokenDecoder::new();
        let noise = vec![b'x'; MAX_PENDING + 3];
        let tokens = decoder.push(&noise);
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0], DecodedToken::Unrecognized(_)));
    }
}
