//! One registered waitable handle plus the metadata the dispatch loop needs.
//!
//! Sources are grouped by a [`Token`]: every descriptor a driver hands to the
//! core carries the driver's token so that the whole group can be dropped in
//! one call when the device resets. The callback is held behind an `Rc` so the
//! dispatch loop can clone it out of the table before invoking it, which
//! leaves the callback free to mutate the table through the [`Registry`].
use std::{borrow::Borrow, cell::RefCell, fmt, os::fd::RawFd, rc::Rc};

use nix::poll::PollFlags;

use crate::registry::Registry;

/// Readiness conditions a source waits for.
pub type Interest = PollFlags;

/// Readable or priority-readable, the interest every sensor descriptor uses.
pub const READABLE: Interest = PollFlags::POLLIN.union(PollFlags::POLLPRI);

/// Conditions the kernel reports whether asked for or not.
pub const ANOMALY: PollFlags = PollFlags::POLLHUP
    .union(PollFlags::POLLERR)
    .union(PollFlags::POLLNVAL);

/// Group label shared by every source a single driver registered.
///
/// Comparison is an exact, case-sensitive match on the ASCII text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}

impl Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handler invoked when a registered source becomes ready.
///
/// `readiness` carries the flags the kernel reported for `handle`. The handler
/// may register or deregister sources, including its own, through `registry`.
pub trait Callback {
    fn on_ready(&mut self, handle: RawFd, readiness: PollFlags, registry: &mut Registry);

    /// Called once `handle` has been dropped from the table because the
    /// kernel reported a hang-up, an error or an invalid descriptor. The
    /// owner still holds the descriptor and decides whether to close it or
    /// reopen the device.
    fn on_hangup(&mut self, _handle: RawFd, _readiness: PollFlags, _registry: &mut Registry) {}
}

impl<F> Callback for F
where
    F: FnMut(RawFd, PollFlags, &mut Registry),
{
    fn on_ready(&mut self, handle: RawFd, readiness: PollFlags, registry: &mut Registry) {
        self(handle, readiness, registry)
    }
}

/// Shared reference to a callback, as stored in the source table.
pub type CallbackRef = Rc<RefCell<dyn Callback>>;

/// Wraps a callback into the shared form the registry stores.
pub fn callback<C>(cb: C) -> CallbackRef
where
    C: Callback + 'static,
{
    Rc::new(RefCell::new(cb))
}

pub struct Source {
    handle: RawFd,
    interest: Interest,
    token: Token,
    callback: CallbackRef,
    serial: u64,
    last_result: PollFlags,
}

impl Source {
    pub(crate) fn new(
        handle: RawFd,
        interest: Interest,
        token: Token,
        callback: CallbackRef,
        serial: u64,
    ) -> Self {
        Self {
            handle,
            interest,
            token,
            callback,
            serial,
            last_result: PollFlags::empty(),
        }
    }

    pub fn handle(&self) -> RawFd {
        self.handle
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn callback(&self) -> &CallbackRef {
        &self.callback
    }

    /// Registration number, unique for the lifetime of the owning table.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Flags reported by the most recent poll; empty between passes.
    pub fn last_result(&self) -> PollFlags {
        self.last_result
    }

    pub(crate) fn set_last_result(&mut self, flags: PollFlags) {
        self.last_result = flags;
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("handle", &self.handle)
            .field("interest", &self.interest)
            .field("token", &self.token)
            .field("serial", &self.serial)
            .field("last_result", &self.last_result)
            .finish_non_exhaustive()
    }
}
