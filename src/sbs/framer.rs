//! CRLF line framing for the BaseStation feed.
//!
//! dump1090 and friends terminate every SBS line with `\r\n`. The framer splits
//! a growing byte buffer on that delimiter, strips a stray trailing `\r`, and at
//! end of stream hands back whatever unterminated fragment is left.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

const DELIMITER: &[u8] = b"\r\n";

/// Outcome of scanning a buffer for the next line
#[derive(Debug, PartialEq, Eq)]
pub enum FrameScan<'a> {
    /// No complete line yet, read more bytes
    NeedMore,
    /// A line was found; consume `advance` bytes from the buffer
    Frame { advance: usize, line: &'a [u8] },
    /// End of stream and nothing left to emit
    Done,
}

/// Scan `data` for the next CRLF-terminated line.
///
/// At end of stream a final line without a delimiter is returned as-is (minus a
/// trailing `\r`) instead of waiting for more input.
pub fn scan_crlf(data: &[u8], at_eof: bool) -> FrameScan<'_> {
    scan_crlf_from(data, 0, at_eof)
}

/// Like [`scan_crlf`], but the delimiter search starts at byte `from`.
///
/// Bytes before `from` must already be known not to hold a complete `\r\n`.
pub fn scan_crlf_from(data: &[u8], from: usize, at_eof: bool) -> FrameScan<'_> {
    if at_eof && data.is_empty() {
        return FrameScan::Done;
    }

    let from = from.min(data.len());
    if let Some(i) = data[from..]
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
    {
        let i = from + i;
        return FrameScan::Frame {
            advance: i + DELIMITER.len(),
            line: drop_cr(&data[..i]),
        };
    }

    if at_eof {
        return FrameScan::Frame {
            advance: data.len(),
            line: drop_cr(data),
        };
    }

    FrameScan::NeedMore
}

fn drop_cr(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(b'\r') => &data[..data.len() - 1],
        _ => data,
    }
}

/// Codec that turns a byte stream into raw SBS frames.
///
/// Wrap a connection in `FramedRead::new(stream, CrlfFramer::default())` to get
/// a lazy stream of frames that ends when the socket closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrlfFramer {
    // Where the next delimiter search starts; bytes before it hold no `\r\n`
    next_index: usize,
}

impl CrlfFramer {
    fn take_frame(&mut self, buf: &mut BytesMut, at_eof: bool) -> Option<Bytes> {
        // Back up one byte so a `\r` left at the end of the last read still pairs
        // with a `\n` that arrives next
        let from = self.next_index.saturating_sub(DELIMITER.len() - 1);

        let (advance, line_len) = match scan_crlf_from(&buf[..], from, at_eof) {
            FrameScan::Frame { advance, line } => (advance, line.len()),
            FrameScan::NeedMore => {
                self.next_index = buf.len();
                return None;
            }
            FrameScan::Done => return None,
        };

        self.next_index = 0;
        let mut consumed = buf.split_to(advance);
        consumed.truncate(line_len);
        Some(consumed.freeze())
    }
}

impl Decoder for CrlfFramer {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        Ok(self.take_frame(buf, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        Ok(self.take_frame(buf, true))
    }
}
