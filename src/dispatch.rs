//! The single-threaded block-then-dispatch loop.
//!
//! Each pass takes a snapshot of the registry's sources, blocks in the poller,
//! and invokes the callback of every source reported ready, in snapshot
//! order. Callbacks receive the registry by `&mut` and are free to add or drop
//! sources, including whole groups. Because group removal compacts the table
//! from the end, positions taken before a callback ran cannot be trusted after
//! it returns. The loop therefore records `(handle, serial, flags)` for every
//! ready entry before the first callback and looks each one up again right
//! before dispatching it: an entry whose handle is gone, or now belongs to a
//! newer registration, is skipped instead of being misdelivered.
use std::{os::fd::RawFd, rc::Rc};

use log::{debug, error, info, trace, warn};
use nix::{
    errno::Errno,
    poll::{PollFlags, PollTimeout},
};

use crate::{
    error::DispatchError,
    poller::AsPoller,
    registry::Registry,
    shutdown::StopToken,
    source::{Interest, ANOMALY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Blocked,
    Decoding,
    Dispatching,
    Stopped,
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing became ready before the timeout.
    TimedOut,
    /// The wait was interrupted by a signal and will be retried.
    Interrupted,
    /// Number of callbacks invoked.
    Dispatched(usize),
}

#[derive(Debug, Clone, Copy)]
struct Ready {
    handle: RawFd,
    serial: u64,
    flags: PollFlags,
}

pub struct Dispatcher<P> {
    poller: P,
    timeout: PollTimeout,
    stop: StopToken,
    state: LoopState,
}

impl<P> Dispatcher<P>
where
    P: AsPoller,
{
    pub fn new(poller: P, timeout: PollTimeout, stop: StopToken) -> Self {
        Self {
            poller,
            timeout,
            stop,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    /// Runs passes until a stop is requested or the poller fails.
    pub fn run(&mut self, registry: &mut Registry) -> Result<(), DispatchError> {
        loop {
            self.run_pass(registry)?;
            if self.stop.is_stop_requested() {
                info!("stop requested, leaving dispatch loop");
                self.state = LoopState::Stopped;
                return Ok(());
            }
        }
    }

    /// Runs exactly one block-then-dispatch pass.
    pub fn run_pass(&mut self, registry: &mut Registry) -> Result<PassOutcome, DispatchError> {
        if self.state == LoopState::Stopped {
            return Err(DispatchError::Stopped);
        }

        self.state = LoopState::Blocked;
        registry.table_mut().clear_readiness();
        let snapshot = registry.table().snapshot_for_poll();
        let revents = match self.poller.wait(&snapshot, self.timeout) {
            Ok(revents) => revents,
            Err(Errno::EINTR) => {
                debug!("poll interrupted by a signal, retrying");
                self.state = LoopState::Idle;
                return Ok(PassOutcome::Interrupted);
            }
            Err(errno) => {
                let category = errno_category(errno);
                error!(
                    "poll failed ({}): errno={} {}",
                    category,
                    errno as i32,
                    errno.desc()
                );
                self.state = LoopState::Stopped;
                return Err(DispatchError::Poll { errno, category });
            }
        };

        self.state = LoopState::Decoding;
        let ready = decode(registry, &snapshot, &revents);
        if ready.is_empty() {
            debug!("poll timed out after {:?}", self.timeout);
            self.state = LoopState::Idle;
            return Ok(PassOutcome::TimedOut);
        }

        self.state = LoopState::Dispatching;
        let mut invoked = 0;
        for entry in ready {
            if dispatch_one(registry, entry) {
                invoked += 1;
            }
        }

        self.state = LoopState::Idle;
        Ok(PassOutcome::Dispatched(invoked))
    }
}

/// Records the poll results on the table and collects the ready entries.
///
/// Runs before any callback, while snapshot positions and table positions
/// still coincide.
fn decode(
    registry: &mut Registry,
    snapshot: &[(RawFd, Interest)],
    revents: &[PollFlags],
) -> Vec<Ready> {
    let mut ready = Vec::new();
    for (position, (&(handle, _), &flags)) in snapshot.iter().zip(revents).enumerate() {
        if flags.is_empty() {
            continue;
        }
        let table = registry.table_mut();
        if table.set_readiness(position, flags).is_err() {
            continue;
        }
        if let Ok(src) = table.get(position) {
            ready.push(Ready {
                handle,
                serial: src.serial(),
                flags,
            });
        }
    }
    ready
}

/// Returns true when the entry's callback was invoked.
fn dispatch_one(registry: &mut Registry, entry: Ready) -> bool {
    let (callback, token) = match registry
        .table()
        .position_of(entry.handle)
        .and_then(|loc| registry.source(loc).ok())
    {
        Some(src) if src.serial() == entry.serial => {
            (Rc::clone(src.callback()), src.token().clone())
        }
        _ => {
            trace!(
                "handle {} left the table during this pass, skipping",
                entry.handle
            );
            return false;
        }
    };

    let anomaly = entry.flags.intersects(ANOMALY);
    if anomaly {
        warn!(
            "{}: {} on handle {}, deregistering",
            token,
            describe_anomaly(entry.flags),
            entry.handle
        );
        registry.deregister_source(entry.handle);
    }

    let Ok(mut cb) = callback.try_borrow_mut() else {
        warn!(
            "{}: callback for handle {} is already running",
            token, entry.handle
        );
        return false;
    };
    if anomaly {
        cb.on_hangup(entry.handle, entry.flags, registry);
        return false;
    }

    trace!("{}: handle {} ready ({:?})", token, entry.handle, entry.flags);
    cb.on_ready(entry.handle, entry.flags, registry);
    true
}

fn describe_anomaly(flags: PollFlags) -> &'static str {
    if flags.contains(PollFlags::POLLNVAL) {
        "invalid request, descriptor not open"
    } else if flags.contains(PollFlags::POLLERR) {
        "error condition"
    } else {
        "hang up"
    }
}

/// Names the failure classes `poll(2)` documents.
pub fn errno_category(errno: Errno) -> &'static str {
    match errno {
        Errno::EFAULT => "EFAULT: descriptor array outside the address space",
        Errno::EINTR => "EINTR: interrupted by a signal",
        Errno::EINVAL => "EINVAL: descriptor count exceeds RLIMIT_NOFILE or bad timeout",
        Errno::ENOMEM => "ENOMEM: no space to allocate descriptor tables",
        _ => "unexpected error",
    }
}
