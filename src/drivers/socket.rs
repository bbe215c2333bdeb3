//! Virtual sensors: a TCP listener on localhost that a simulator connects to.
//!
//! The listener and every accepted connection share the driver's token, so a
//! single group removal takes all of them down. Connections come and go on
//! their own: an accepted stream is registered from inside the listener's
//! callback, and a stream the peer closed is dropped individually.
use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, SocketAddr, TcpListener},
    os::fd::{AsRawFd, OwnedFd, RawFd},
};

use log::{error, info, warn};
use nix::poll::PollFlags;

use crate::{
    buffd::BufFd,
    bus::{fourcc, FourCc, SharedBus},
    error::DriverError,
    registry::Registry,
    source::{Token, READABLE},
};

pub struct VirtualDevice {
    token: Token,
    tag: FourCc,
    port: u16,
    bufsize: usize,
    listener: Option<TcpListener>,
    connections: HashMap<RawFd, BufFd>,
    bus: SharedBus,
}

impl VirtualDevice {
    pub fn new(token: impl Into<Token>, port: u16, bufsize: usize, bus: SharedBus) -> Self {
        let token = token.into();
        Self {
            tag: fourcc(token.as_str()),
            token,
            port,
            bufsize,
            listener: None,
            connections: HashMap::new(),
            bus,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Binds the listener and registers it under this driver's token.
    pub fn start(&mut self, registry: &mut Registry) -> Result<(), DriverError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port))?;
        listener.set_nonblocking(true)?;
        registry.register_bound(&self.token, listener.as_raw_fd(), READABLE)?;
        info!(
            "{}: waiting for connections on {}",
            self.token,
            listener.local_addr()?
        );
        self.listener = Some(listener);
        Ok(())
    }

    fn accept_pending(&mut self, registry: &mut Registry) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("{}: dropping {}: {}", self.token, peer, e);
                        continue;
                    }
                    let conn = BufFd::new(OwnedFd::from(stream), self.bufsize);
                    match registry.register_bound(&self.token, conn.as_raw_fd(), READABLE) {
                        Ok(_) => {
                            info!("{}: connection from {}", self.token, peer);
                            self.connections.insert(conn.as_raw_fd(), conn);
                        }
                        Err(e) => warn!("{}: refusing {}: {}", self.token, peer, e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("{}: accept failed: {}", self.token, e);
                    break;
                }
            }
        }
    }

    fn close(&mut self, handle: RawFd, registry: &mut Registry) {
        registry.deregister_source(handle);
        self.connections.remove(&handle);
    }

    /// Releases whatever descriptor the table just dropped. A failed listener
    /// takes its open connections with it.
    pub fn on_hangup(&mut self, handle: RawFd, registry: &mut Registry) {
        if self.listener.as_ref().map(|l| l.as_raw_fd()) == Some(handle) {
            error!("{}: listener failed, closing the group", self.token);
            registry.deregister_group(self.token.as_str());
            self.connections.clear();
            self.listener = None;
        } else if self.connections.remove(&handle).is_some() {
            info!("{}: connection on handle {} closed", self.token, handle);
        }
    }

    pub fn on_ready(&mut self, handle: RawFd, _readiness: PollFlags, registry: &mut Registry) {
        if self.listener.as_ref().map(|l| l.as_raw_fd()) == Some(handle) {
            self.accept_pending(registry);
            return;
        }
        let Some(conn) = self.connections.get_mut(&handle) else {
            warn!("{}: readiness for unknown handle {}", self.token, handle);
            return;
        };
        match conn.read() {
            Ok(Some(0)) => {}
            Ok(Some(_)) => {
                if let Err(e) = self.bus.borrow_mut().publish(self.tag, conn.data()) {
                    error!("{}: failed to log message: {}", self.token, e);
                }
            }
            Ok(None) => {
                info!("{}: peer closed handle {}", self.token, handle);
                self.close(handle, registry);
            }
            Err(e) => {
                warn!("{}: read on handle {} failed: {}", self.token, handle, e);
                self.close(handle, registry);
            }
        }
    }
}
