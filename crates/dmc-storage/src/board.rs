use serde::{Deserialize, Serialize};

use dmc_core::error::DmcError;
use dmc_core::types::ContentHash;

/// Fixed-capacity list of `(hash, score)` in descending score order.
///
/// Only the top `max_len` entries are kept. Among equal scores the entry
/// inserted first ranks higher.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortedScoreBoard {
    max_len: usize,
    entries: Vec<(ContentHash, u128)>,
}

impl SortedScoreBoard {
    pub fn new(max_len: usize) -> Self {
        Self { max_len, entries: Vec::with_capacity(max_len) }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(ContentHash, u128)] {
        &self.entries
    }

    pub fn contains(&self, id: &ContentHash) -> bool {
        self.entries.iter().any(|(h, _)| h == id)
    }

    pub fn score_of(&self, id: &ContentHash) -> Option<u128> {
        self.entries.iter().find(|(h, _)| h == id).map(|(_, s)| *s)
    }

    pub fn total_score(&self) -> u128 {
        self.entries.iter().map(|(_, s)| *s).sum()
    }

    /// Insert or move `id` to the position for `score`. Returns `false` when
    /// the entry did not make it onto the board.
    pub fn add_score(&mut self, id: ContentHash, score: u128) -> bool {
        if let Some(pos) = self.entries.iter().position(|(h, _)| *h == id) {
            self.entries.remove(pos);
        }
        let at = self.entries.partition_point(|(_, s)| *s >= score);
        if at >= self.max_len {
            return false;
        }
        self.entries.insert(at, (id, score));
        self.entries.truncate(self.max_len);
        debug_assert!(self.entries.windows(2).all(|w| w[0].1 >= w[1].1));
        true
    }

    /// Raise the capacity. Shrinking (or keeping) it is rejected.
    pub fn set_max_len(&mut self, max_len: usize) -> Result<(), DmcError> {
        if max_len <= self.max_len {
            return Err(DmcError::CapacityCannotShrink);
        }
        self.max_len = max_len;
        Ok(())
    }

    /// 1-based position of `id`.
    pub fn get_ranking(&self, id: &ContentHash) -> Result<usize, DmcError> {
        self.entries
            .iter()
            .position(|(h, _)| h == id)
            .map(|p| p + 1)
            .ok_or(DmcError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    const DATA: [(&str, u128); 17] = [
        ("39c767e230f1cc4d8fa7baa4ef8c39bc2e4add8680d09bfe086e1efdaa0d6437", 290),
        ("96aa737f656f90a2f6f90a293b404f2a44529add34f863a18bf51d47bbaec589", 332),
        ("de0f510c9a18f7f15d24f9364e93d1e07a98d5a845fc6f230643a9da89b79ac4", 100),
        ("02663478495af95f645416a042fedb2d7237b41c50f6fc5471d7a1235e558f52", 785),
        ("7008a25999df0f489a692c3f3c4ccb4aaa45c6867ca2fb417b8b9930ab619dfd", 471),
        ("a8889b6afd0e4de49140777bf0b8da7910e5361e463c9f990b36d0770b3f8eae", 474),
        ("79218525b0548862f03172bc3c88ad7988b47aab05e1c54febab059e4d33efd4", 88),
        ("742797a513cef1dfd466b3decd632284fccc6e1cfcb07d78ad33406a642cb408", 244),
        ("d0b648691c90f1d35c814664b32dad56e442eeb58f8d93aafb2cd9f0d346d89e", 679),
        ("aa1dc0f0587b2a302e0cd6136026b56ff418f77a9803b87b6e16f28f216193fe", 78),
        ("d3fff898a835a8c4702885d65e1ce5394648b26b6b6d044eef0ea998f41b428d", 226),
        ("b217112856caa6e5c1dbce3414e4ecb3b4380231208d07601635127bd44ce213", 251),
        ("2df33298245c73618a534a77babfdb6aba2cbe447a96cb1e57e53a4af570d86a", 83),
        ("257d8456e82b21525dd866ab75dd0fb86b9b2f2e1cec0df6295cd486374fbea3", 691),
        ("974319f60fafd6cdbf5dcb6e0b58f64df96e43c4d02198d5393e2e3e5549a531", 782),
        ("2568f5563305e91f72b8e7b340178834d1aa9aac63b52dfa13e687a4f5f51646", 840),
        ("79e0685a902fe9e705e19acbd80ae3910381dacded27f7a24556566df1335c21", 910),
    ];

    fn h(s: &str) -> ContentHash {
        ContentHash::from_hex(s).unwrap()
    }

    #[test]
    fn capacity_only_grows() {
        let mut board = SortedScoreBoard::new(0);
        board.set_max_len(8).unwrap();
        assert_eq!(board.set_max_len(4), Err(DmcError::CapacityCannotShrink));
        assert_eq!(board.set_max_len(8), Err(DmcError::CapacityCannotShrink));
        board.set_max_len(16).unwrap();
        assert_eq!(board.max_len(), 16);
    }

    #[test]
    fn keeps_top_entries_in_order() {
        let mut board = SortedScoreBoard::new(16);
        board.add_score(h(DATA[0].0), DATA[0].1);
        assert_eq!(board.len(), 1);
        assert_eq!(board.get_ranking(&h(DATA[0].0)), Ok(1));

        for (hash, score) in DATA {
            board.add_score(h(hash), score);
        }
        assert_eq!(board.len(), 16);

        let mut sorted = DATA.to_vec();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        for (i, (hash, _)) in sorted.iter().take(16).enumerate() {
            assert_eq!(board.get_ranking(&h(hash)), Ok(i + 1));
        }
        // the lowest score (78) fell off
        assert_eq!(board.get_ranking(&h(sorted[16].0)), Err(DmcError::NotFound));

        // 244 → 254 overtakes 251
        let moved = "742797a513cef1dfd466b3decd632284fccc6e1cfcb07d78ad33406a642cb408";
        board.add_score(h(moved), 254);
        assert_eq!(board.len(), 16);
        assert_eq!(board.get_ranking(&h(moved)), Ok(11));
        assert_eq!(
            board.get_ranking(&h("b217112856caa6e5c1dbce3414e4ecb3b4380231208d07601635127bd44ce213")),
            Ok(12)
        );
    }

    #[test]
    fn ties_keep_earlier_entry_ahead() {
        let mut board = SortedScoreBoard::new(3);
        let (a, b, c) = (ContentHash([1; 32]), ContentHash([2; 32]), ContentHash([3; 32]));
        board.add_score(a, 10);
        board.add_score(b, 10);
        assert_eq!(board.get_ranking(&a), Ok(1));
        assert_eq!(board.get_ranking(&b), Ok(2));
        board.add_score(c, 20);
        board.add_score(ContentHash([4; 32]), 10);
        assert_eq!(board.len(), 3);
        assert!(!board.contains(&ContentHash([4; 32])));
    }

    #[test]
    fn random_inserts_match_sorted_reference() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let mut board = SortedScoreBoard::new(10);
        let mut reference: Vec<(ContentHash, u128)> = Vec::new();
        for _ in 0..300 {
            let id = ContentHash([rng.gen_range(1..40u8); 32]);
            let score = rng.gen_range(0..1_000u128);
            board.add_score(id, score);
            reference.retain(|(h, _)| *h != id);
            reference.push((id, score));
        }
        // every id on the board carries its latest score
        for (id, score) in board.entries() {
            assert!(reference.contains(&(*id, *score)));
        }
        assert!(board.entries().windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(board.len(), 10);
    }
}
