//! Host memory ledger and host-allocated strings.
//!
//! # Invariants
//! - Every successful `allocate` is matched by exactly one `release`,
//!   performed by the `HostString` drop.
//! - A failed allocation leaves the ledger untouched.

use crate::host::{HostError, HostResult};
use log::trace;
use std::cell::Cell;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::rc::Rc;

/// Allocation accounting for one host instance.
#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    limit_bytes: Option<usize>,
    live_allocations: Cell<usize>,
    live_bytes: Cell<usize>,
    total_allocations: Cell<usize>,
    total_releases: Cell<usize>,
}

/// Snapshot of ledger counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub live_allocations: usize,
    pub live_bytes: usize,
    pub total_allocations: usize,
    pub total_releases: usize,
}

impl MemoryStats {
    /// Returns whether every allocation has been released.
    pub fn is_balanced(&self) -> bool {
        self.live_allocations == 0 && self.total_allocations == self.total_releases
    }
}

impl MemoryLedger {
    pub(crate) fn new(limit_bytes: Option<usize>) -> Self {
        Self {
            limit_bytes,
            ..Self::default()
        }
    }

    fn allocate(&self, bytes: usize) -> HostResult<()> {
        let in_use = self.live_bytes.get();
        if let Some(limit) = self.limit_bytes {
            if in_use.saturating_add(bytes) > limit {
                return Err(HostError::OutOfMemory {
                    requested: bytes,
                    limit,
                    in_use,
                });
            }
        }
        self.live_bytes.set(in_use + bytes);
        self.live_allocations.set(self.live_allocations.get() + 1);
        self.total_allocations.set(self.total_allocations.get() + 1);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        self.live_bytes.set(self.live_bytes.get().saturating_sub(bytes));
        self.live_allocations
            .set(self.live_allocations.get().saturating_sub(1));
        self.total_releases.set(self.total_releases.get() + 1);
    }

    pub(crate) fn stats(&self) -> MemoryStats {
        MemoryStats {
            live_allocations: self.live_allocations.get(),
            live_bytes: self.live_bytes.get(),
            total_allocations: self.total_allocations.get(),
            total_releases: self.total_releases.get(),
        }
    }
}

/// Immutable string copy charged to a host's memory ledger.
///
/// The charge is returned when the value is dropped.
pub struct HostString {
    value: Box<str>,
    ledger: Rc<MemoryLedger>,
}

impl HostString {
    pub(crate) fn duplicate(ledger: &Rc<MemoryLedger>, source: &str) -> HostResult<Self> {
        ledger.allocate(source.len())?;
        trace!(
            "event=host_alloc module=host status=ok bytes={}",
            source.len()
        );
        Ok(Self {
            value: source.into(),
            ledger: Rc::clone(ledger),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Deref for HostString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.value
    }
}

impl Display for HostString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl Debug for HostString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&*self.value, f)
    }
}

impl Drop for HostString {
    fn drop(&mut self) {
        self.ledger.release(self.value.len());
        trace!(
            "event=host_release module=host status=ok bytes={}",
            self.value.len()
        );
    }
}
