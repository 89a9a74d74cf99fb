//! External port allocation.
//!
//! A monotonic counter over `(lower, upper]` that wraps back to `lower + 1`
//! after handing out `upper`. There is no free-list and no collision check:
//! once the counter wraps, a port still held by a live service can be handed
//! out again, and the cluster's service create call rejects it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::store::PortStore;

/// Bounds of the external port range. Allocations fall in `(lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    lower: u16,
    upper: u16,
}

impl PortRange {
    pub fn new(lower: u16, upper: u16) -> StateResult<Self> {
        if lower >= upper {
            return Err(StateError::InvalidRange { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> u16 {
        self.lower
    }

    pub fn upper(&self) -> u16 {
        self.upper
    }

    /// First port handed out from a fresh (or reset) counter.
    pub fn first(&self) -> u16 {
        self.lower + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        port > self.lower && port <= self.upper
    }

    /// The port after `current`, wrapping to [`first`](Self::first).
    pub fn successor(&self, current: u16) -> u16 {
        if current < self.upper {
            current + 1
        } else {
            self.first()
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            lower: 30000,
            upper: 32767,
        }
    }
}

/// Hands out external ports and persists the next candidate after each one.
pub struct PortAllocator {
    range: PortRange,
    next: Mutex<u16>,
    store: Arc<dyn PortStore>,
}

impl PortAllocator {
    /// Read the persisted counter. Absent, unparsable, or out-of-range values
    /// start over at `lower + 1`.
    pub fn open(range: PortRange, store: Arc<dyn PortStore>) -> StateResult<Self> {
        let next = match store.load()? {
            None => {
                debug!(port = range.first(), "no persisted port counter, starting fresh");
                range.first()
            }
            Some(line) => match line.parse::<u16>() {
                Ok(port) if range.contains(port) => port,
                Ok(port) => {
                    warn!(
                        port,
                        lower = range.lower(),
                        upper = range.upper(),
                        "persisted port outside range, resetting counter"
                    );
                    range.first()
                }
                Err(_) => {
                    warn!(%line, "persisted port counter unreadable, resetting counter");
                    range.first()
                }
            },
        };
        info!(next, "port allocator ready");
        Ok(Self {
            range,
            next: Mutex::new(next),
            store,
        })
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// The port the next [`allocate`](Self::allocate) call will return.
    pub fn current_port(&self) -> StateResult<u16> {
        Ok(*self.lock()?)
    }

    /// Return the current port and advance the counter.
    ///
    /// The advanced value is persisted before the in-memory counter moves,
    /// so a failed write hands out nothing and leaves the counter where it
    /// was.
    pub fn allocate(&self) -> StateResult<u16> {
        let mut next = self.lock()?;
        let port = *next;
        self.advance(&mut next)?;
        Ok(port)
    }

    /// Advance past `port` once a service actually holds it.
    ///
    /// Callers reserve with [`current_port`](Self::current_port), create the
    /// service, and commit only on success. Committing a port the counter
    /// has already moved past changes nothing.
    pub fn commit(&self, port: u16) -> StateResult<()> {
        let mut next = self.lock()?;
        if *next != port {
            debug!(port, next = *next, "port already committed");
            return Ok(());
        }
        self.advance(&mut next)
    }

    fn lock(&self) -> StateResult<MutexGuard<'_, u16>> {
        self.next
            .lock()
            .map_err(|e| StateError::Unavailable(e.to_string()))
    }

    fn advance(&self, next: &mut u16) -> StateResult<()> {
        let port = *next;
        let advanced = self.range.successor(port);
        self.store.save(advanced)?;
        *next = advanced;
        debug!(port, next = advanced, "port allocated");
        Ok(())
    }
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("range", &self.range)
            .field("next", &self.current_port().ok())
            .finish()
    }
}
