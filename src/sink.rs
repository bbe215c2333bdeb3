//! Destinations for tagged-message batches.
//!
//! Sinks receive encoded batches from the [`Bus`](crate::bus::Bus). The disk
//! sink appends them verbatim; the screen sink decodes each record and emits a
//! short summary through the logger.
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use log::{error, info};

use crate::{bus::Records, utils::hex_preview};

const SCREEN_PREVIEW_BYTES: usize = 16;

pub struct DiskSink {
    file: File,
}

impl DiskSink {
    pub fn new<T>(path: T) -> io::Result<Self>
    where
        T: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .inspect_err(|e| error!("failed to open message log {:?}: {}", path.as_ref(), e))?;

        Ok(Self { file })
    }

    fn write(&mut self, batch: &[u8]) -> io::Result<()> {
        self.file.write_all(batch)?;
        self.file.flush()
    }
}

pub enum Sink {
    Disk(DiskSink),
    Screen,
}

impl Sink {
    pub fn write(&mut self, batch: &[u8]) -> io::Result<()> {
        match self {
            Self::Disk(x) => x.write(batch),
            Self::Screen => {
                for (tag, payload) in Records::new(batch) {
                    info!(
                        target: "fcf::screen",
                        "[{}] {} bytes: {}",
                        String::from_utf8_lossy(&tag),
                        payload.len(),
                        hex_preview(payload, SCREEN_PREVIEW_BYTES)
                    );
                }
                Ok(())
            }
        }
    }
}
