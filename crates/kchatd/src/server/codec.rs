//! Newline framing for client input.
//!
//! Clients are plain TCP tools, so input is not guaranteed to be UTF-8.
//! Lines are split on `\n` with a length cap, a trailing `\r` is dropped,
//! and invalid byte sequences decode to U+FFFD instead of failing.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

/// Line delimiter on the wire
const DELIMITER: u8 = b'\n';

/// Decoder yielding one `String` per client line.
#[derive(Debug, Clone)]
pub struct ChatLineCodec {
    inner: AnyDelimiterCodec,
}

impl ChatLineCodec {
    /// Creates a codec rejecting lines longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                vec![DELIMITER],
                Vec::new(),
                max_length,
            ),
        }
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }
}

/// Strips an optional `\r` and decodes lossily.
fn into_line(chunk: Bytes) -> String {
    let bytes = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for ChatLineCodec {
    type Item = String;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode(src)?.map(into_line))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode_eof(src)?.map(into_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ChatLineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_splits_on_newline() {
        let mut codec = ChatLineCodec::new(64);
        assert_eq!(decode_all(&mut codec, b"alice\nhello\n"), ["alice", "hello"]);
    }

    #[test]
    fn test_strips_carriage_return() {
        let mut codec = ChatLineCodec::new(64);
        assert_eq!(decode_all(&mut codec, b"alice\r\n\r\n"), ["alice", ""]);
    }

    #[test]
    fn test_partial_line_waits_for_delimiter() {
        let mut codec = ChatLineCodec::new(64);
        let mut buf = BytesMut::from(&b"hel"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"lo\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = ChatLineCodec::new(64);
        assert_eq!(decode_all(&mut codec, b"caf\xe9\n"), ["caf\u{fffd}"]);
    }

    #[test]
    fn test_unterminated_line_at_eof() {
        let mut codec = ChatLineCodec::new(64);
        let mut buf = BytesMut::from(&b"bye"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("bye"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let mut codec = ChatLineCodec::new(4);
        assert_eq!(decode_all(&mut codec, b"abcd\n"), ["abcd"]);
    }

    #[test]
    fn test_line_over_limit_rejected() {
        let mut codec = ChatLineCodec::new(4);
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)
        ));
        assert_eq!(codec.max_length(), 4);
    }
}
