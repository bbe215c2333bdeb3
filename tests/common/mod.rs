//! Helpers for driving the dispatch loop without real descriptors.

#![allow(unused)]

use std::{cell::RefCell, collections::VecDeque, os::fd::RawFd, rc::Rc};

use fcf::{
    poller::AsPoller,
    registry::Registry,
    source::{callback, CallbackRef, Interest},
};
use nix::{
    errno::Errno,
    poll::{PollFlags, PollTimeout},
};

/// One scripted poll result: the handles to report and their flags, or an
/// error.
pub type Step = Result<Vec<(RawFd, PollFlags)>, Errno>;

/// Replays a fixed script of poll results. Once the script runs out every
/// wait reports a timeout.
#[derive(Default)]
pub struct ScriptedPoller {
    script: VecDeque<Step>,
    pub waits: Vec<Vec<RawFd>>,
}

impl ScriptedPoller {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            waits: Vec::new(),
        }
    }
}

impl AsPoller for ScriptedPoller {
    fn wait(
        &mut self,
        interests: &[(RawFd, Interest)],
        _timeout: PollTimeout,
    ) -> Result<Vec<PollFlags>, Errno> {
        self.waits.push(interests.iter().map(|&(fd, _)| fd).collect());
        let ready = self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(interests
            .iter()
            .map(|&(fd, _)| {
                ready
                    .iter()
                    .find(|&&(ready_fd, _)| ready_fd == fd)
                    .map(|&(_, flags)| flags)
                    .unwrap_or(PollFlags::empty())
            })
            .collect())
    }
}

/// Shared log of `(token, handle)` invocations, in call order.
pub type Calls = Rc<RefCell<Vec<(String, RawFd)>>>;

pub fn calls() -> Calls {
    Rc::new(RefCell::new(Vec::new()))
}

/// A callback that only records that it ran.
pub fn recorder(name: &str, log: &Calls) -> CallbackRef {
    let name = name.to_string();
    let log = Rc::clone(log);
    callback(move |fd: RawFd, _: PollFlags, _: &mut Registry| {
        log.borrow_mut().push((name.clone(), fd));
    })
}

pub fn readable(fd: RawFd) -> (RawFd, PollFlags) {
    (fd, PollFlags::POLLIN)
}
