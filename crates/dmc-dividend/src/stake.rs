use serde::{Deserialize, Serialize};

use dmc_core::types::{Balance, CycleIndex};

/// Stake value over cycles, stored sparsely.
///
/// Each entry `(cycle, amount)` holds from `cycle` until the next entry;
/// entries are strictly ascending by cycle. The value carried into cycle `c`
/// is [`start_of`](Self::start_of)`(c)`. Withdrawing more than was added
/// during the open cycle also lowers that start value, so it always reads the
/// stake held through the whole cycle. Only the open cycle and its
/// predecessor are ever written.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeHistory {
    entries: Vec<(CycleIndex, Balance)>,
}

impl StakeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(CycleIndex, Balance)] {
        &self.entries
    }

    /// Most recent entry with index `<= cycle`, 0 if none.
    pub fn at(&self, cycle: CycleIndex) -> Balance {
        let pos = self.entries.partition_point(|(c, _)| *c <= cycle);
        if pos == 0 {
            0
        } else {
            self.entries[pos - 1].1
        }
    }

    /// Value in the newest cycle.
    pub fn latest(&self) -> Balance {
        self.entries.last().map(|(_, a)| *a).unwrap_or(0)
    }

    /// Value carried into `cycle`.
    pub fn start_of(&self, cycle: CycleIndex) -> Balance {
        match cycle {
            0 => 0,
            c => self.at(c - 1),
        }
    }

    /// Overwrite the value for `cycle`, which must not precede the newest entry.
    pub fn set(&mut self, cycle: CycleIndex, amount: Balance) {
        match self.entries.last_mut() {
            Some((last, value)) if *last == cycle => *value = amount,
            Some((last, _)) => {
                debug_assert!(*last < cycle, "stake history is append-only");
                self.entries.push((cycle, amount));
            }
            None => self.entries.push((cycle, amount)),
        }
    }

    pub fn add(&mut self, cycle: CycleIndex, amount: Balance) {
        let next = self.latest() + amount;
        self.set(cycle, next);
    }

    /// Lower the value for `cycle`. Callers check `amount <= latest()` first.
    pub fn sub(&mut self, cycle: CycleIndex, amount: Balance) {
        let next = self.latest().saturating_sub(amount);
        self.set(cycle, next);
    }

    /// Withdraw `amount` during the open `cycle`. Stake added in `cycle` goes
    /// first; the rest comes out of the value carried in. Returns that rest.
    pub fn remove(&mut self, cycle: CycleIndex, amount: Balance) -> Balance {
        let fresh = self.latest().saturating_sub(self.start_of(cycle));
        let excess = amount.saturating_sub(fresh);
        self.sub(cycle, amount);
        self.cut_start(cycle, excess);
        excess
    }

    /// Lower the value carried into `cycle` by `amount`.
    pub fn cut_start(&mut self, cycle: CycleIndex, amount: Balance) {
        if cycle == 0 || amount == 0 {
            return;
        }
        let prev = cycle - 1;
        let value = self.at(prev).saturating_sub(amount);
        match self.entries.binary_search_by_key(&prev, |(c, _)| *c) {
            Ok(pos) => self.entries[pos].1 = value,
            Err(pos) => self.entries.insert(pos, (prev, value)),
        }
    }
}
