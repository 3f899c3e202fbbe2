//! Scoped error trapping.
//!
//! An [`ErrorTrap`] hands out [`TrapGuard`]s that collect non-fatal errors raised
//! while a region of work runs. The trap itself only tracks how many regions are
//! engaged, so whoever owns it (typically a test fixture) can verify that every
//! region was released.

use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

#[derive(Clone, Debug, Default)]
pub struct ErrorTrap {
    active: Arc<AtomicUsize>,
}

impl ErrorTrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage a new trapping region
    pub fn start(&self) -> TrapGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        TrapGuard {
            active: Arc::clone(&self.active),
            errors: Vec::new(),
            released: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.active_regions() > 0
    }

    pub fn active_regions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Forcibly disengage every open region, returning how many were open
    pub fn release_all(&self) -> usize {
        self.active.swap(0, Ordering::SeqCst)
    }
}

/// An engaged trapping region. Released by [`TrapGuard::stop`] or on drop.
#[derive(Debug)]
pub struct TrapGuard {
    active: Arc<AtomicUsize>,
    errors: Vec<Error>,
    released: bool,
}

impl TrapGuard {
    pub fn record(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Keep the success value, trapping the error otherwise
    pub fn capture<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.record(error);
                None
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Release the region and surface the first trapped error
    pub fn stop(mut self) -> Result<()> {
        self.release();
        let mut errors = std::mem::take(&mut self.errors).into_iter();
        match errors.next() {
            Some(first) => {
                let dropped = errors.count();
                if dropped > 0 {
                    warn!("{} additional trapped error(s) discarded", dropped);
                }
                Err(first)
            }
            None => Ok(()),
        }
    }

    /// Release the region and hand back everything that was trapped
    pub fn stop_collecting(mut self) -> Vec<Error> {
        self.release();
        std::mem::take(&mut self.errors)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // release_all may already have reset the counter
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

impl Drop for TrapGuard {
    fn drop(&mut self) {
        if !self.errors.is_empty() {
            warn!("trap guard dropped with {} unreported error(s)", self.errors.len());
        }
        self.release();
    }
}
