//! An owned descriptor with a co-located read buffer.
//!
//! Drivers keep one of these per descriptor they register: the descriptor is
//! closed when the `BufFd` drops, so a driver deregisters the handle first and
//! drops it second. Reads never block; `EAGAIN` reads as zero bytes because the
//! poller will report the descriptor again once more data arrives.
use nix::errno::Errno;

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

pub const DEFAULT_BUFSIZE: usize = 1024;

#[derive(Debug)]
pub struct BufFd {
    fd: OwnedFd,
    buffer: Box<[u8]>,
    curr_len: usize,
}

impl BufFd {
    pub fn new(fd: OwnedFd, bufsize: usize) -> Self {
        Self {
            fd,
            buffer: vec![0; bufsize.max(1)].into_boxed_slice(),
            curr_len: 0,
        }
    }

    pub fn as_fd(&self) -> BorrowedFd {
        self.fd.as_fd()
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.curr_len
    }

    pub fn is_empty(&self) -> bool {
        self.curr_len == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.curr_len]
    }

    /// Reads what is available. `Ok(None)` means end of stream.
    pub fn read(&mut self) -> Result<Option<usize>, Errno> {
        match nix::unistd::read(self.fd.as_raw_fd(), &mut self.buffer) {
            Ok(0) => {
                self.curr_len = 0;
                Ok(None)
            }
            Ok(n) => {
                self.curr_len = n;
                Ok(Some(n))
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => {
                self.curr_len = 0;
                Ok(Some(0))
            }
            Err(e) => Err(e),
        }
    }
}
