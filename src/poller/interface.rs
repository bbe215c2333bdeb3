//! Abstraction over the kernel's readiness-polling primitive.
//!
//! The dispatch loop never talks to the kernel directly; it hands the poller
//! the exact `(handle, interest)` array for one pass and gets back the
//! readiness flags for each entry, position for position. Keeping this behind
//! a trait lets the loop be driven by a scripted poller under test, with
//! arbitrary handles and injected failures.
use std::os::fd::RawFd;

use nix::{
    errno::Errno,
    poll::{PollFlags, PollTimeout},
};

use crate::source::Interest;

pub trait AsPoller {
    /// Blocks until at least one entry is ready or `timeout` elapses.
    ///
    /// The returned vector has one entry per element of `interests`, in the
    /// same order; all entries are empty on timeout.
    fn wait(
        &mut self,
        interests: &[(RawFd, Interest)],
        timeout: PollTimeout,
    ) -> Result<Vec<PollFlags>, Errno>;
}
