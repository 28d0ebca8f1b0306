//! Global cycle clock shared by every accounting engine.
//!
//! A cycle is a fixed window of block heights. Engines never store "the
//! current cycle" eagerly: each mutating entry point calls
//! [`CycleClock::try_advance`] first, and whichever transaction crosses a
//! boundary performs the close-out bookkeeping for every cycle it skipped.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CYCLE_LENGTH;
use crate::error::DmcError;
use crate::types::{BlockHeight, CycleIndex};

/// `(now − origin) / length`, saturating to 0 before the origin.
pub fn current_cycle_index(origin: BlockHeight, length: u64, now: BlockHeight) -> CycleIndex {
    if length == 0 || now < origin {
        return 0;
    }
    (now - origin) / length
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockConfig {
    /// Block height at which cycle 0 starts.
    pub origin_block: BlockHeight,
    /// Blocks per cycle. Must be non-zero.
    pub cycle_length: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { origin_block: 0, cycle_length: DEFAULT_CYCLE_LENGTH }
    }
}

/// Result of a boundary crossing: cycles `from..to` are now closed and `to`
/// is the open cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleAdvance {
    pub from: CycleIndex,
    pub to: CycleIndex,
}

impl CycleAdvance {
    pub fn closed(&self) -> std::ops::Range<CycleIndex> {
        self.from..self.to
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleClock {
    origin_block: BlockHeight,
    cycle_length: u64,
    last_processed: CycleIndex,
}

impl CycleClock {
    pub fn new(config: &ClockConfig) -> Result<Self, DmcError> {
        if config.cycle_length == 0 {
            return Err(DmcError::InvalidConfig("cycle_length must be non-zero".into()));
        }
        Ok(Self {
            origin_block: config.origin_block,
            cycle_length: config.cycle_length,
            last_processed: 0,
        })
    }

    /// Start the clock with `last_processed` already at the cycle containing
    /// `now` (used when an engine activates mid-chain).
    pub fn starting_at(config: &ClockConfig, now: BlockHeight) -> Result<Self, DmcError> {
        let mut clock = Self::new(config)?;
        clock.last_processed = clock.index_at(now);
        Ok(clock)
    }

    /// Cycle containing block `now`, regardless of what has been processed.
    pub fn index_at(&self, now: BlockHeight) -> CycleIndex {
        current_cycle_index(self.origin_block, self.cycle_length, now)
    }

    /// The cycle the engine currently treats as open.
    pub fn current(&self) -> CycleIndex {
        self.last_processed
    }

    pub fn cycle_length(&self) -> u64 {
        self.cycle_length
    }

    /// First block of `cycle`.
    pub fn cycle_start(&self, cycle: CycleIndex) -> BlockHeight {
        self.origin_block + cycle * self.cycle_length
    }

    /// Move the pointer to the cycle containing `now`. Returns the crossed
    /// range, or `None` when still inside the stored cycle. Calling twice at
    /// the same height is a no-op.
    pub fn try_advance(&mut self, now: BlockHeight) -> Option<CycleAdvance> {
        let index = self.index_at(now);
        if index <= self.last_processed {
            return None;
        }
        let advance = CycleAdvance { from: self.last_processed, to: index };
        self.last_processed = index;
        Some(advance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(origin: u64, len: u64) -> CycleClock {
        CycleClock::new(&ClockConfig { origin_block: origin, cycle_length: len }).unwrap()
    }

    #[test]
    fn index_is_pure() {
        assert_eq!(current_cycle_index(0, 1000, 999), 0);
        assert_eq!(current_cycle_index(0, 1000, 1000), 1);
        assert_eq!(current_cycle_index(500, 1000, 100), 0);
        assert_eq!(current_cycle_index(500, 1000, 2500), 2);
    }

    #[test]
    fn zero_length_rejected() {
        let err = CycleClock::new(&ClockConfig { origin_block: 0, cycle_length: 0 }).unwrap_err();
        assert!(matches!(err, DmcError::InvalidConfig(_)));
    }

    #[test]
    fn advance_reports_skipped_cycles_once() {
        let mut c = clock(0, 10);
        assert_eq!(c.try_advance(5), None);
        let adv = c.try_advance(35).unwrap();
        assert_eq!(adv, CycleAdvance { from: 0, to: 3 });
        assert_eq!(adv.closed().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(c.try_advance(35), None);
        assert_eq!(c.try_advance(39), None);
        assert_eq!(c.current(), 3);
    }

    #[test]
    fn never_moves_backwards() {
        let mut c = clock(0, 10);
        c.try_advance(50);
        assert_eq!(c.try_advance(12), None);
        assert_eq!(c.current(), 5);
    }

    #[test]
    fn starting_at_skips_history() {
        let c = CycleClock::starting_at(&ClockConfig { origin_block: 0, cycle_length: 10 }, 47).unwrap();
        assert_eq!(c.current(), 4);
        assert_eq!(c.cycle_start(4), 40);
    }
}
