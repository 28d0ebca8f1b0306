use serde::{Deserialize, Serialize};

use dmc_core::constants::RATE_PRECISION;
use dmc_core::error::DmcError;
use dmc_core::types::{Balance, CycleIndex};

/// Quota and rate of the open exchange cycle.
///
/// `rate` is GWT per DMC scaled by [`RATE_PRECISION`]. `adjust_divisor`
/// grows by one for every cycle that ended with unclaimed quota and shrinks
/// by one (never below 1) for every cycle that was fully consumed; the
/// stored remainder is released in slices of `stored / adjust_divisor`.
///
/// A fully consumed cycle resets the rate to the initial rate. Leftover
/// quota recomputes it as `initial × base_release / quota`, floored at the
/// minimum rate; with the default floor at the initial rate every cycle
/// trades at 210 GWT per DMC.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeCycleState {
    pub cycle_index: CycleIndex,
    pub stored_remainder: Balance,
    pub current_quota: Balance,
    pub consumed: Balance,
    pub rate: u128,
    pub adjust_divisor: u128,
    pub base_release: Balance,
}

impl ExchangeCycleState {
    /// State of the first production cycle.
    pub fn genesis(cycle_index: CycleIndex, base_release: Balance, initial_rate: u128) -> Self {
        Self {
            cycle_index,
            stored_remainder: 0,
            current_quota: base_release,
            consumed: 0,
            rate: initial_rate * RATE_PRECISION,
            adjust_divisor: 0,
            base_release,
        }
    }

    pub fn remaining_quota(&self) -> Balance {
        self.current_quota.saturating_sub(self.consumed)
    }

    /// Close the open cycle and open `cycle_index + 1`.
    pub fn roll_over(&mut self, initial_rate: u128, min_rate: u128) {
        let leftover = self.remaining_quota();
        self.adjust_divisor = if leftover > 0 {
            self.adjust_divisor + 1
        } else {
            self.adjust_divisor.saturating_sub(1).max(1)
        };
        self.stored_remainder += leftover;
        let release = self.stored_remainder / self.adjust_divisor;
        self.stored_remainder -= release;
        self.current_quota = self.base_release + release;
        self.rate = if leftover == 0 {
            initial_rate * RATE_PRECISION
        } else {
            let scaled = initial_rate * RATE_PRECISION * self.base_release / self.current_quota;
            scaled.max(min_rate * RATE_PRECISION)
        };
        self.consumed = 0;
        self.cycle_index += 1;
    }

    /// GWT needed for `dmc` at the current rate.
    pub fn gwt_for(&self, dmc: Balance) -> Result<Balance, DmcError> {
        dmc.checked_mul(self.rate)
            .map(|v| v / RATE_PRECISION)
            .ok_or(DmcError::Overflow)
    }

    /// DMC bought by `gwt` at the current rate, floored.
    pub fn dmc_for(&self, gwt: Balance) -> Result<Balance, DmcError> {
        gwt.checked_mul(RATE_PRECISION)
            .map(|v| v / self.rate)
            .ok_or(DmcError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmc_core::constants::{BASE_RELEASE_DMC, INITIAL_EXCHANGE_RATE, MIN_EXCHANGE_RATE};

    fn genesis() -> ExchangeCycleState {
        ExchangeCycleState::genesis(0, BASE_RELEASE_DMC, INITIAL_EXCHANGE_RATE)
    }

    fn roll(s: &mut ExchangeCycleState) {
        s.roll_over(INITIAL_EXCHANGE_RATE, MIN_EXCHANGE_RATE);
    }

    #[test]
    fn reference_quota_sequence() {
        let mut s = genesis();
        roll(&mut s);
        assert_eq!((s.current_quota, s.stored_remainder), (420, 0));

        s.consumed = 320;
        roll(&mut s);
        assert_eq!((s.current_quota, s.stored_remainder), (260, 50));

        s.consumed = 160;
        roll(&mut s);
        assert_eq!((s.current_quota, s.stored_remainder), (260, 100));

        s.consumed = 260;
        roll(&mut s);
        assert_eq!((s.current_quota, s.stored_remainder), (260, 50));
        assert_eq!(s.rate, 210_000);
        assert_eq!(s.cycle_index, 4);
    }

    #[test]
    fn idle_cycles_keep_the_launch_rate() {
        let mut s = genesis();
        roll(&mut s);
        assert_eq!((s.current_quota, s.rate), (420, 210_000));
        roll(&mut s);
        roll(&mut s);
        assert_eq!(s.rate, 210_000);
    }

    #[test]
    fn lower_floor_lets_leftover_cheapen_dmc() {
        let mut s = genesis();
        s.consumed = 110;
        s.roll_over(INITIAL_EXCHANGE_RATE, 105);
        // quota 210 + 100 = 310, rate 210 × 210 / 310
        assert_eq!(s.current_quota, 310);
        assert_eq!(s.rate, 210_000 * 210 / 310);

        // the default floor holds the launch rate
        roll(&mut s);
        assert_eq!(s.rate, MIN_EXCHANGE_RATE * RATE_PRECISION);

        s.roll_over(INITIAL_EXCHANGE_RATE, 105);
        assert!(s.rate < 210_000 && s.rate >= 105_000);
    }

    #[test]
    fn conversions_use_fixed_point() {
        let mut s = genesis();
        s.rate = 169_615;
        assert_eq!(s.gwt_for(160_000), Ok(27_138_400));
        assert_eq!(s.dmc_for(27_138_400), Ok(160_000));
    }

    #[test]
    fn oversized_conversions_overflow_cleanly() {
        let s = genesis();
        assert_eq!(s.gwt_for(u128::MAX / 100), Err(DmcError::Overflow));
        assert_eq!(s.dmc_for(u128::MAX / 100), Err(DmcError::Overflow));
    }
}
