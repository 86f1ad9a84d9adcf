//! Message framing.

use crate::error::{CrosscheckError, Result};
use std::io::{ErrorKind, Read};

const MAGIC: &[u8; 4] = b"GRIB";
const TRAILER: &[u8; 4] = b"7777";

/// Longest message accepted. Edition 2 declares a 64-bit length, but real
/// messages stay well below 4 GiB.
const MAX_MESSAGE_LEN: u64 = u32::MAX as u64;

/// One complete GRIB message, exactly as stored in the stream.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Byte offset of the `GRIB` magic in the stream.
    pub offset: u64,
    /// GRIB edition number.
    pub edition: u8,
    /// Whole message including section 0 and the `7777` trailer.
    pub bytes: Vec<u8>,
}

/// Iterator over the messages of a byte stream.
///
/// Bytes between messages are skipped. A truncated or unterminated message
/// yields one error and ends the sequence.
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
    position: u64,
    finished: bool,
}

impl<R: Read> MessageReader<R> {
    /// Wrap a reader. Buffering is the caller's choice.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            finished: false,
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Advance to just past the next `GRIB` magic. Returns its offset.
    fn seek_magic(&mut self) -> Result<Option<u64>> {
        let mut window = [0u8; 4];
        let mut filled = 0usize;
        while let Some(byte) = self.read_byte()? {
            if filled < 4 {
                window[filled] = byte;
                filled += 1;
            } else {
                window.rotate_left(1);
                window[3] = byte;
            }
            if filled == 4 && &window == MAGIC {
                return Ok(Some(self.position - 4));
            }
        }
        Ok(None)
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                CrosscheckError::decode(offset, "truncated message")
            } else {
                e.into()
            }
        })?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn next_message(&mut self) -> Result<Option<RawMessage>> {
        let Some(offset) = self.seek_magic()? else {
            return Ok(None);
        };

        // Octets 5-8 hold the edition 1 length or the edition 2 discipline.
        let mut head = [0u8; 4];
        self.read_exact_or_truncated(&mut head, offset)?;
        let edition = head[3];

        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&head);

        let total_len = match edition {
            1 => (u64::from(head[0]) << 16) | (u64::from(head[1]) << 8) | u64::from(head[2]),
            2 => {
                let mut len = [0u8; 8];
                self.read_exact_or_truncated(&mut len, offset)?;
                bytes.extend_from_slice(&len);
                u64::from_be_bytes(len)
            }
            other => {
                return Err(CrosscheckError::decode(
                    offset,
                    format!("unsupported edition {}", other),
                ))
            }
        };

        if total_len < bytes.len() as u64 + TRAILER.len() as u64 || total_len > MAX_MESSAGE_LEN {
            return Err(CrosscheckError::decode(
                offset,
                format!("implausible message length {}", total_len),
            ));
        }

        // Grow the buffer as bytes arrive, so a corrupt length costs no more
        // memory than the stream actually holds.
        let remaining = total_len - bytes.len() as u64;
        let read = (&mut self.inner).take(remaining).read_to_end(&mut bytes)? as u64;
        self.position += read;
        if read < remaining {
            return Err(CrosscheckError::decode(offset, "truncated message"));
        }

        if !bytes.ends_with(TRAILER) {
            return Err(CrosscheckError::decode(offset, "missing 7777 trailer"));
        }

        Ok(Some(RawMessage {
            offset,
            edition,
            bytes,
        }))
    }
}

impl<R: Read> Iterator for MessageReader<R> {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
