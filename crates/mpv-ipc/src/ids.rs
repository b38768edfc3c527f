//! Request and observer id allocation.
//!
//! mpv reads `request_id` and observer ids as signed 64-bit integers and
//! treats 0 as "no id". The allocator hands out strictly increasing ids in
//! `(floor, ceiling]` and wraps back to `floor + 1` after the ceiling. Ids
//! still in use when the counter laps (more than `ceiling - floor` live
//! requests or observers) would collide; that limit is accepted.

use std::sync::atomic::{AtomicI64, Ordering};

use mpv_config::{Config, DEFAULT_ID_CEILING, DEFAULT_ID_FLOOR};

use crate::error::ClientError;

/// Bounds for allocated ids: exclusive `floor`, inclusive `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    floor: i64,
    ceiling: i64,
}

impl IdRange {
    /// Validates and builds a range.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidIdRange`] when `floor` is negative (the
    /// range could then yield 0) or when `ceiling` does not exceed `floor`.
    pub fn new(floor: i64, ceiling: i64) -> Result<Self, ClientError> {
        if floor < 0 || ceiling <= floor {
            return Err(ClientError::InvalidIdRange { floor, ceiling });
        }
        Ok(Self { floor, ceiling })
    }

    /// Reads the bounds from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidIdRange`] for unusable bounds.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let (floor, ceiling) = config.id_bounds();
        Self::new(floor, ceiling)
    }

    /// Exclusive lower bound.
    #[must_use]
    pub const fn floor(&self) -> i64 {
        self.floor
    }

    /// Inclusive upper bound.
    #[must_use]
    pub const fn ceiling(&self) -> i64 {
        self.ceiling
    }

    const fn successor(&self, current: i64) -> i64 {
        if current >= self.ceiling || current < self.floor {
            self.floor + 1
        } else {
            current + 1
        }
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            floor: DEFAULT_ID_FLOOR,
            ceiling: DEFAULT_ID_CEILING,
        }
    }
}

/// Thread-safe generator of request and observer ids.
#[derive(Debug)]
pub struct IdAllocator {
    range: IdRange,
    current: AtomicI64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is `range.floor() + 1`.
    #[must_use]
    pub const fn new(range: IdRange) -> Self {
        Self {
            range,
            current: AtomicI64::new(range.floor),
        }
    }

    /// Returns the next id, wrapping to `floor + 1` after `ceiling`.
    pub fn next_id(&self) -> i64 {
        let range = self.range;
        let update = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(range.successor(current))
            });
        let (Ok(previous) | Err(previous)) = update;
        range.successor(previous)
    }

    /// The bounds this allocator draws from.
    #[must_use]
    pub const fn range(&self) -> IdRange {
        self.range
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(IdRange::default())
    }
}
