use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use std::os::fd::{BorrowedFd, RawFd};

use super::AsPoller;
use crate::source::Interest;

/// `poll(2)` backend. Stateless: the descriptor array is rebuilt from the
/// table snapshot on every pass, so there is nothing to keep in sync when
/// sources come and go.
#[derive(Debug, Default)]
pub struct PollPoller;

impl PollPoller {
    pub fn new() -> Self {
        Self
    }
}

impl AsPoller for PollPoller {
    fn wait(
        &mut self,
        interests: &[(RawFd, Interest)],
        timeout: PollTimeout,
    ) -> Result<Vec<PollFlags>, Errno> {
        let mut fds: Vec<PollFd> = interests
            .iter()
            .map(|&(fd, interest)| {
                // drivers keep a descriptor open for as long as it is registered
                let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
                PollFd::new(borrowed, interest)
            })
            .collect();

        poll(&mut fds, timeout)?;

        Ok(fds
            .iter()
            .map(|pfd| pfd.revents().unwrap_or(PollFlags::empty()))
            .collect())
    }
}
