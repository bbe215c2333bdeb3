//! Positional storage for registered sources.
//!
//! The table is a dense vector: it never holds gaps, and its order is the
//! order handed to `poll(2)`. Removal fills a hole by moving the last live
//! source into it, which is O(1) per removed source but relocates that last
//! source. Positions are therefore only meaningful until the next `add` or
//! removal; callers that must survive a removal keep the handle instead.
use std::os::fd::RawFd;

use nix::poll::PollFlags;

use crate::{
    error::TableError,
    source::{CallbackRef, Interest, Source, Token},
};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct SourceTable {
    sources: Vec<Source>,
    capacity: usize,
    next_serial: u64,
}

impl<'a> IntoIterator for &'a SourceTable {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;
    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SourceTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
            capacity,
            next_serial: 0,
        }
    }

    /// Appends a source and returns its position.
    pub fn add(
        &mut self,
        handle: RawFd,
        interest: Interest,
        token: Token,
        callback: CallbackRef,
    ) -> Result<usize, TableError> {
        if self.sources.len() >= self.capacity {
            return Err(TableError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.sources.push(Source::new(handle, interest, token, callback, serial));
        Ok(self.sources.len() - 1)
    }

    /// Removes every source carrying `token` and returns how many went away.
    pub fn remove_by_token(&mut self, token: &str) -> usize {
        let mut removed = 0;
        let mut idx = 0;
        while idx < self.sources.len() {
            if self.sources[idx].token().as_str() == token {
                // the last slot moves into `idx`, so it is examined next
                self.sources.swap_remove(idx);
                removed += 1;
            } else {
                idx += 1;
            }
        }
        removed
    }

    pub fn remove_handle(&mut self, handle: RawFd) -> Option<Source> {
        self.position_of(handle).map(|loc| self.sources.swap_remove(loc))
    }

    pub fn get(&self, position: usize) -> Result<&Source, TableError> {
        self.sources.get(position).ok_or(TableError::OutOfRange {
            position,
            len: self.sources.len(),
        })
    }

    pub fn position_of(&self, handle: RawFd) -> Option<usize> {
        self.sources.iter().position(|src| src.handle() == handle)
    }

    pub fn contains_handle(&self, handle: RawFd) -> bool {
        self.position_of(handle).is_some()
    }

    /// The `(handle, interest)` pairs for one poll, in table order.
    pub fn snapshot_for_poll(&self) -> Vec<(RawFd, Interest)> {
        self.sources
            .iter()
            .map(|src| (src.handle(), src.interest()))
            .collect()
    }

    pub fn clear_readiness(&mut self) {
        for src in &mut self.sources {
            src.set_last_result(PollFlags::empty());
        }
    }

    pub fn set_readiness(&mut self, position: usize, flags: PollFlags) -> Result<(), TableError> {
        let len = self.sources.len();
        match self.sources.get_mut(position) {
            Some(src) => {
                src.set_last_result(flags);
                Ok(())
            }
            None => Err(TableError::OutOfRange { position, len }),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
