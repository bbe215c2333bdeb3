//! Driver-facing registration over the source table.
//!
//! The registry is the one context object the whole framework shares: drivers
//! add and drop their descriptors through it, and the dispatch loop hands it
//! to every callback by `&mut`, which is what allows a callback to drop its
//! own group mid-pass. It also holds the static token→callback map that the
//! interface generator produces at startup.
use std::{collections::HashMap, fmt::Write, os::fd::RawFd, rc::Rc};

use log::{info, warn};

use crate::{
    error::{RegistryError, TableError},
    source::{CallbackRef, Interest, Source, Token},
    table::{SourceTable, DEFAULT_CAPACITY},
};

pub struct Registry {
    table: SourceTable,
    callbacks: HashMap<Token, CallbackRef>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SourceTable::with_capacity(capacity),
            callbacks: HashMap::new(),
        }
    }

    /// Binds `token` to `callback` in the static map, replacing any previous
    /// binding.
    pub fn bind_callback(
        &mut self,
        token: impl Into<Token>,
        callback: CallbackRef,
    ) -> Option<CallbackRef> {
        self.callbacks.insert(token.into(), callback)
    }

    pub fn resolve_callback(&self, token_name: &str) -> Result<CallbackRef, RegistryError> {
        match self.callbacks.get(token_name) {
            Some(cb) => Ok(Rc::clone(cb)),
            None => {
                warn!(
                    "no callback bound to token `{}`; check the interface description",
                    token_name
                );
                Err(RegistryError::NotFound(token_name.to_string()))
            }
        }
    }

    pub fn register_source(
        &mut self,
        token: impl Into<Token>,
        handle: RawFd,
        interest: Interest,
        callback: CallbackRef,
    ) -> Result<usize, RegistryError> {
        let token = token.into();
        if handle < 0 {
            return Err(RegistryError::InvalidHandle(handle));
        }
        if self.table.contains_handle(handle) {
            warn!("{}: handle {} is already registered", token, handle);
            return Err(RegistryError::DuplicateHandle(handle));
        }
        let label = token.clone();
        let position = self
            .table
            .add(handle, interest, token, callback)
            .inspect_err(|e| warn!("{}: cannot register handle {}: {}", label, handle, e))?;
        info!(
            "added {} handle {} at position {}; {} sources registered",
            label,
            handle,
            position,
            self.table.len()
        );
        Ok(position)
    }

    /// Registers `handle` with the callback bound to `token` in the static map.
    pub fn register_bound(
        &mut self,
        token: impl Into<Token>,
        handle: RawFd,
        interest: Interest,
    ) -> Result<usize, RegistryError> {
        let token = token.into();
        let callback = self.resolve_callback(token.as_str())?;
        self.register_source(token, handle, interest, callback)
    }

    /// Drops every source in `token`'s group. Zero means nothing was
    /// registered under it.
    pub fn deregister_group(&mut self, token: &str) -> usize {
        let removed = self.table.remove_by_token(token);
        if removed > 0 {
            info!(
                "removed {} sources of group {}; {} sources registered",
                removed,
                token,
                self.table.len()
            );
        }
        removed
    }

    pub fn deregister_source(&mut self, handle: RawFd) -> bool {
        match self.table.remove_handle(handle) {
            Some(src) => {
                info!(
                    "removed {} handle {}; {} sources registered",
                    src.token(),
                    handle,
                    self.table.len()
                );
                true
            }
            None => false,
        }
    }

    pub fn source(&self, position: usize) -> Result<&Source, TableError> {
        self.table.get(position)
    }

    pub fn table(&self) -> &SourceTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut SourceTable {
        &mut self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// One line per registered source, in poll order.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "{} of {} sources registered",
            self.table.len(),
            self.table.capacity()
        );
        for (position, src) in self.table.iter().enumerate() {
            let _ = write!(
                out,
                "\n  [{}] {} handle={} interest={:?}",
                position,
                src.token(),
                src.handle(),
                src.interest()
            );
        }
        out
    }
}
