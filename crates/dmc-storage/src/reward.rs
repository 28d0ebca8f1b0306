use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use dmc_core::constants::{
    CYCLE_POOL_DISTRIBUTED_PERCENT, OWNER_REWARD_PERCENT, PERCENT, SPONSOR_REWARD_PERCENT,
    SUPPLIERS_REWARD_PERCENT,
};
use dmc_core::error::DmcError;
use dmc_core::math::mul_div;
use dmc_core::types::{Address, Balance, ContentHash};

use crate::board::SortedScoreBoard;

/// A board entry frozen at cycle close.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub score: u128,
    pub sponsor: Address,
    pub suppliers: Vec<Address>,
}

/// Board and pool of one closed cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub pool: Balance,
    pub total_score: u128,
    pub entries: BTreeMap<ContentHash, SnapshotEntry>,
    pub claimed: BTreeSet<ContentHash>,
}

impl CycleSnapshot {
    pub fn capture<F>(board: &SortedScoreBoard, pool: Balance, mut lookup: F) -> Self
    where
        F: FnMut(&ContentHash) -> Option<(Address, Vec<Address>)>,
    {
        let mut entries = BTreeMap::new();
        for (hash, score) in board.entries() {
            if let Some((sponsor, suppliers)) = lookup(hash) {
                entries.insert(*hash, SnapshotEntry { score: *score, sponsor, suppliers });
            }
        }
        Self {
            pool,
            total_score: entries.values().map(|e| e.score).sum(),
            entries,
            claimed: BTreeSet::new(),
        }
    }

    /// The record's part of the distributed pool, proportional to its score.
    pub fn share_of(&self, hash: &ContentHash) -> Result<Balance, DmcError> {
        match self.entries.get(hash) {
            Some(e) if self.total_score > 0 => {
                let distributed = mul_div(self.pool, CYCLE_POOL_DISTRIBUTED_PERCENT, PERCENT)?;
                mul_div(distributed, e.score, self.total_score)
            }
            _ => Ok(0),
        }
    }
}

/// One record's cycle reward broken down by role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardSplit {
    pub owner: Balance,
    pub sponsor: Balance,
    /// Paid to each supplier in the snapshot.
    pub per_supplier: Balance,
}

/// `share × percent / PERCENT`, floored, without forming the full product.
fn percent_of(share: Balance, percent: u128) -> Balance {
    share / PERCENT * percent + share % PERCENT * percent / PERCENT
}

impl RewardSplit {
    pub fn new(share: Balance, suppliers: usize) -> Self {
        let supplier_part = percent_of(share, SUPPLIERS_REWARD_PERCENT);
        Self {
            owner: percent_of(share, OWNER_REWARD_PERCENT),
            sponsor: percent_of(share, SPONSOR_REWARD_PERCENT),
            per_supplier: if suppliers == 0 { 0 } else { supplier_part / suppliers as u128 },
        }
    }

    pub fn total(&self, suppliers: usize) -> Balance {
        self.owner + self.sponsor + self.per_supplier * suppliers as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_never_exceeds_share() {
        for share in [0u128, 1, 99, 1_000, 123_456_789] {
            for n in 0..=5 {
                let split = RewardSplit::new(share, n);
                assert!(split.total(n) <= share);
            }
        }
        let split = RewardSplit::new(1_000, 3);
        assert_eq!((split.owner, split.sponsor, split.per_supplier), (200, 500, 100));
    }

    #[test]
    fn split_of_the_largest_share_does_not_wrap() {
        let split = RewardSplit::new(u128::MAX, 2);
        assert_eq!(split.owner, u128::MAX / 5);
        assert!(split.total(2) <= u128::MAX);
    }

    #[test]
    fn shares_follow_scores() {
        let mut board = SortedScoreBoard::new(4);
        let (a, b) = (ContentHash([1; 32]), ContentHash([2; 32]));
        board.add_score(a, 30);
        board.add_score(b, 10);
        let snap = CycleSnapshot::capture(&board, 1_000, |_| Some((Address::ZERO, vec![])));
        assert_eq!(snap.total_score, 40);
        assert_eq!(snap.share_of(&a), Ok(600));
        assert_eq!(snap.share_of(&b), Ok(200));
        assert_eq!(snap.share_of(&ContentHash([3; 32])), Ok(0));
    }
}
