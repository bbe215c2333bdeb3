//! Path-backed devices that become readable when data arrives: the GPS
//! receiver's tty, a mouse's event node.
//!
//! A read error is treated as a device reset. The driver drops its whole group,
//! closes the descriptor, reopens the path and registers again, all from
//! inside its own callback.
use std::{
    fs::File,
    os::fd::{OwnedFd, RawFd},
    path::PathBuf,
};

use log::{error, info, warn};
use nix::poll::PollFlags;

use crate::{
    buffd::BufFd,
    bus::{fourcc, FourCc, SharedBus},
    error::DriverError,
    registry::Registry,
    source::{Token, READABLE},
    utils::set_fd_nonblocking,
};

pub struct SerialDevice {
    token: Token,
    tag: FourCc,
    path: PathBuf,
    bufsize: usize,
    port: Option<BufFd>,
    bus: SharedBus,
}

impl SerialDevice {
    pub fn new(
        token: impl Into<Token>,
        path: impl Into<PathBuf>,
        bufsize: usize,
        bus: SharedBus,
    ) -> Self {
        let token = token.into();
        Self {
            tag: fourcc(token.as_str()),
            token,
            path: path.into(),
            bufsize,
            port: None,
            bus,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn handle(&self) -> Option<RawFd> {
        self.port.as_ref().map(BufFd::as_raw_fd)
    }

    /// Opens the device path and registers it under this driver's token.
    pub fn start(&mut self, registry: &mut Registry) -> Result<(), DriverError> {
        info!("{}: opening {:?}", self.token, self.path);
        let file = File::open(&self.path)?;
        set_fd_nonblocking(&file)?;
        let port = BufFd::new(OwnedFd::from(file), self.bufsize);
        registry.register_bound(&self.token, port.as_raw_fd(), READABLE)?;
        self.port = Some(port);
        Ok(())
    }

    fn reset(&mut self, registry: &mut Registry) {
        registry.deregister_group(self.token.as_str());
        self.port = None;
        if let Err(e) = self.start(registry) {
            error!("{}: could not reopen {:?}: {}", self.token, self.path, e);
        }
    }

    pub fn on_ready(&mut self, handle: RawFd, _readiness: PollFlags, registry: &mut Registry) {
        let Some(port) = self.port.as_mut().filter(|port| port.as_raw_fd() == handle) else {
            warn!("{}: readiness for unknown handle {}", self.token, handle);
            return;
        };
        match port.read() {
            Ok(Some(0)) => {}
            Ok(Some(_)) => {
                if let Err(e) = self.bus.borrow_mut().publish(self.tag, port.data()) {
                    error!("{}: failed to log message: {}", self.token, e);
                }
            }
            Ok(None) => {
                warn!("{}: end of stream, resetting device", self.token);
                self.reset(registry);
            }
            Err(e) => {
                warn!("{}: read failed ({}), resetting device", self.token, e);
                self.reset(registry);
            }
        }
    }

    /// The port was dropped from the table after a hang-up; reopen it.
    pub fn on_hangup(&mut self, handle: RawFd, registry: &mut Registry) {
        if self.handle() != Some(handle) {
            return;
        }
        warn!("{}: device hung up, resetting", self.token);
        self.reset(registry);
    }
}
