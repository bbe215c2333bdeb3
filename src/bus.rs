//! Tagged-message bus connecting drivers to the log sinks.
//!
//! Every message carries a four-character code naming its origin (`GYRO`,
//! `ACCO`, ...). The bus encodes messages into an internal buffer and hands the
//! whole batch to each sink when the buffer fills, on an explicit flush, and on
//! drop. With a zero-sized buffer every message goes straight through.
//!
//! Record layout: 4-byte tag, 4-byte little-endian payload length, payload.
use std::{cell::RefCell, io, rc::Rc};

use log::error;

use crate::sink::Sink;

pub type FourCc = [u8; 4];

pub const RECORD_HEADER_LEN: usize = 8;

/// Tag the framework uses for its own messages.
pub const LOGS: FourCc = *b"LOGS";

/// Shared handle drivers publish through.
pub type SharedBus = Rc<RefCell<Bus>>;

/// Derives a four-character code from a token: the first four bytes,
/// upper-cased, padded with `_`.
pub fn fourcc(token: &str) -> FourCc {
    let mut tag = [b'_'; 4];
    for (slot, byte) in tag.iter_mut().zip(token.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    tag
}

pub fn encode_record(tag: FourCc, payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Iterates the records of an encoded batch. Stops at the first truncated
/// record.
pub struct Records<'a> {
    buf: &'a [u8],
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = (FourCc, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < RECORD_HEADER_LEN {
            return None;
        }
        let (header, rest) = self.buf.split_at(RECORD_HEADER_LEN);
        let tag: FourCc = header[..4].try_into().ok()?;
        let len = u32::from_le_bytes(header[4..].try_into().ok()?) as usize;
        if rest.len() < len {
            return None;
        }
        let (payload, rest) = rest.split_at(len);
        self.buf = rest;
        Some((tag, payload))
    }
}

pub struct Bus {
    buffer: Vec<u8>,
    bufsize: usize,
    sinks: Vec<Sink>,
}

impl Bus {
    pub fn new(bufsize: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bufsize),
            bufsize,
            sinks: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedBus {
        Rc::new(RefCell::new(self))
    }

    pub fn add_sink(&mut self, sink: Sink) {
        self.sinks.push(sink)
    }

    /// Bytes waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // hand the batch to every sink before reporting the first failure
        let mut result = Ok(());
        for sink in &mut self.sinks {
            if let Err(e) = sink.write(&self.buffer) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.buffer.clear();
        result
    }

    pub fn publish(&mut self, tag: FourCc, payload: &[u8]) -> io::Result<()> {
        encode_record(tag, payload, &mut self.buffer);
        if self.buffer.len() >= self.bufsize {
            self.flush()?;
        }
        Ok(())
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("failed to flush message bus: {}", e);
        }
    }
}
