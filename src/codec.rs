use bytes::{Buf, BytesMut};
use encoding_rs::{CoderResult, Encoding};
use std::io;
use tokio_util::codec::{Decoder, LinesCodecError};

/// Transcodes an upload into UTF-8 chunks. UTF-8 input goes through it too,
/// so a byte order mark is dropped and malformed sequences become U+FFFD.
pub struct CharsetDecoder {
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl CharsetDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    fn drain(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3 + 16);
        let mut out = vec![0u8; capacity];

        let (result, read, written, _replaced) = self.decoder.decode_to_utf8(src, &mut out, last);
        debug_assert!(matches!(result, CoderResult::InputEmpty));
        src.advance(read);

        if written == 0 {
            return None;
        }
        out.truncate(written);
        Some(BytesMut::from(&out[..]))
    }
}

impl Decoder for CharsetDecoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() || self.finished {
            return Ok(None);
        }
        // A trailing partial sequence stays buffered inside the decoder.
        Ok(self.drain(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // encoding_rs decoders must not be fed again once flushed
        if self.finished {
            buf.clear();
            return Ok(None);
        }
        self.finished = true;
        let out = self.drain(buf, true);
        buf.clear();
        Ok(out)
    }
}

/// Splits decoded text into lines ending in `\n`, `\r\n` or a lone `\r`.
///
/// Bytes that are not UTF-8 become U+FFFD. A line longer than `max_length`
/// (terminator excluded) fails with `MaxLineLengthExceeded`.
#[derive(Debug, Default)]
pub struct LineDecoder {
    // resume point for the terminator scan
    next_index: usize,
    max_length: Option<usize>,
}

impl LineDecoder {
    pub fn new(max_length: Option<usize>) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    fn check_length(&self, len: usize) -> Result<(), LinesCodecError> {
        match self.max_length {
            Some(max) if len > max => Err(LinesCodecError::MaxLineLengthExceeded),
            _ => Ok(()),
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut, content: usize, consumed: usize) -> String {
        self.next_index = 0;
        let raw = buf.split_to(consumed);
        String::from_utf8_lossy(&raw[..content]).into_owned()
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.next_index.min(buf.len());
        let Some(offset) = buf[start..].iter().position(|b| *b == b'\n' || *b == b'\r') else {
            self.check_length(buf.len())?;
            self.next_index = buf.len();
            return Ok(None);
        };

        let end = start + offset;
        self.check_length(end)?;
        let consumed = match (buf[end], buf.get(end + 1)) {
            (b'\r', Some(b'\n')) => end + 2,
            // a `\r` at the buffer edge may be the first half of `\r\n`
            (b'\r', None) => {
                self.next_index = end;
                return Ok(None);
            }
            _ => end + 1,
        };
        Ok(Some(self.take_line(buf, end, consumed)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            self.next_index = 0;
            return Ok(None);
        }
        // last line: unterminated, or ending in a lone `\r`
        let consumed = buf.len();
        let content = if buf[consumed - 1] == b'\r' {
            consumed - 1
        } else {
            consumed
        };
        Ok(Some(self.take_line(buf, content, consumed)))
    }
}
