//! The closed set of drivers the framework knows how to wire.
//!
//! Each driver implements its own readiness handling; [`Driver`] collects them
//! so the token→callback map can hold any of them behind one
//! [`Callback`](crate::source::Callback) implementation.
mod serial;
mod socket;

pub use serial::SerialDevice;
pub use socket::VirtualDevice;

use std::{cell::RefCell, os::fd::RawFd, rc::Rc};

use nix::poll::PollFlags;

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::signals::SignalSource;
use crate::{
    bus::SharedBus,
    conf::{DeviceConf, DeviceKind},
    error::DriverError,
    registry::Registry,
    source::Callback,
};

pub enum Driver {
    Serial(SerialDevice),
    Virtual(VirtualDevice),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Signals(SignalSource),
}

impl Driver {
    pub fn from_conf(conf: &DeviceConf, bus: SharedBus) -> Self {
        match &conf.kind {
            DeviceKind::Serial { path } => Self::Serial(SerialDevice::new(
                conf.token.as_str(),
                path.clone(),
                conf.read_bufsize,
                bus,
            )),
            DeviceKind::Socket { port } => Self::Virtual(VirtualDevice::new(
                conf.token.as_str(),
                *port,
                conf.read_bufsize,
                bus,
            )),
        }
    }

    pub fn shared(self) -> Rc<RefCell<Driver>> {
        Rc::new(RefCell::new(self))
    }

    /// Opens the driver's device and registers its descriptors. The driver's
    /// callback must already be bound to its token.
    pub fn start(&mut self, registry: &mut Registry) -> Result<(), DriverError> {
        match self {
            Self::Serial(x) => x.start(registry),
            Self::Virtual(x) => x.start(registry),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Signals(x) => x.start(registry),
        }
    }
}

impl Callback for Driver {
    fn on_ready(&mut self, handle: RawFd, readiness: PollFlags, registry: &mut Registry) {
        match self {
            Self::Serial(x) => x.on_ready(handle, readiness, registry),
            Self::Virtual(x) => x.on_ready(handle, readiness, registry),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Signals(x) => x.on_ready(handle, readiness, registry),
        }
    }

    fn on_hangup(&mut self, handle: RawFd, _readiness: PollFlags, registry: &mut Registry) {
        match self {
            Self::Serial(x) => x.on_hangup(handle, registry),
            Self::Virtual(x) => x.on_hangup(handle, registry),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Self::Signals(x) => x.on_hangup(handle, registry),
        }
    }
}
