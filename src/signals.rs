//! Signals delivered as readiness on a signalfd.
//!
//! The handled signals are blocked for the thread so they are never delivered
//! asynchronously; they surface as an ordinary readable source and are handled
//! between callbacks like any other event. `SIGINT` and `SIGTERM` request a
//! stop. `SIGUSR1` dumps the source table to the log and onto the bus under
//! the `LOGS` tag; `SIGUSR2` flushes the message bus.
use std::os::fd::{AsRawFd, RawFd};

use log::{error, info, warn};
use nix::{
    poll::PollFlags,
    sys::{
        signal::{SigSet, Signal},
        signalfd::SignalFd,
    },
};

use crate::{
    bus::{SharedBus, LOGS},
    error::DriverError,
    registry::Registry,
    shutdown::StopToken,
    source::{Token, READABLE},
    utils::set_fd_nonblocking,
};

pub const SIGNAL_TOKEN: &str = "SIGS";

const HANDLED: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

pub struct SignalSource {
    token: Token,
    signal_fd: SignalFd,
    stop: StopToken,
    bus: SharedBus,
}

impl SignalSource {
    /// Blocks the handled signals for the calling thread and opens the
    /// signalfd that reports them.
    pub fn new(stop: StopToken, bus: SharedBus) -> Result<Self, DriverError> {
        let mut mask = SigSet::empty();
        for sig in HANDLED {
            mask.add(sig);
        }
        mask.thread_block()?;

        let signal_fd = SignalFd::new(&mask)?;
        set_fd_nonblocking(&signal_fd)?;

        Ok(Self {
            token: Token::new(SIGNAL_TOKEN),
            signal_fd,
            stop,
            bus,
        })
    }

    pub fn handle(&self) -> RawFd {
        self.signal_fd.as_raw_fd()
    }

    pub fn start(&mut self, registry: &mut Registry) -> Result<(), DriverError> {
        registry.register_bound(&self.token, self.handle(), READABLE)?;
        Ok(())
    }

    fn handle_signal(&mut self, signal: Signal, registry: &Registry) {
        match signal {
            Signal::SIGINT | Signal::SIGTERM => {
                info!("received {}, stopping after this pass", signal);
                self.stop.request_stop();
            }
            Signal::SIGUSR1 => {
                let dump = registry.describe();
                info!("{}", dump);
                if let Err(e) = self.bus.borrow_mut().publish(LOGS, dump.as_bytes()) {
                    warn!("failed to log source table: {}", e);
                }
            }
            Signal::SIGUSR2 => {
                if let Err(e) = self.bus.borrow_mut().flush() {
                    warn!("failed to flush message bus: {}", e);
                }
            }
            other => warn!("ignoring unexpected {}", other),
        }
    }

    pub fn on_ready(&mut self, _handle: RawFd, _readiness: PollFlags, registry: &mut Registry) {
        loop {
            match self.signal_fd.read_signal() {
                Ok(Some(info)) => match Signal::try_from(info.ssi_signo as i32) {
                    Ok(sig) => self.handle_signal(sig, registry),
                    Err(e) => warn!("unrecognized signal {}: {}", info.ssi_signo, e),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to read signalfd: {}", e);
                    break;
                }
            }
        }
    }

    /// Losing the signalfd requests a stop.
    pub fn on_hangup(&mut self, handle: RawFd, _registry: &mut Registry) {
        error!("signalfd {} failed, requesting stop", handle);
        self.stop.request_stop();
    }
}
