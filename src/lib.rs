//! Event-dispatch core of the flight-control framework.
//!
//! Drivers register descriptors with the [`Registry`](registry::Registry)
//! under a group token; the [`Dispatcher`](dispatch::Dispatcher) polls them and
//! calls back into the driver when one becomes ready. Everything runs on one
//! thread.
pub mod buffd;
pub mod bus;
pub mod conf;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod poller;
pub mod registry;
pub mod shutdown;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod signals;
pub mod sink;
pub mod source;
pub mod table;
pub mod utils;
