//! Winner selection

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Participants who may win: entry order kept, banned and rigged users removed
#[must_use]
pub fn eligible(participants: &[u64], banned: &HashSet<u64>, rigged: &HashSet<u64>) -> Vec<u64> {
    participants
        .iter()
        .copied()
        .filter(|id| !banned.contains(id) && !rigged.contains(id))
        .collect()
}

/// Draw up to `count` distinct winners uniformly from `pool`
pub fn draw_winners<R: Rng + ?Sized>(mut pool: Vec<u64>, count: usize, rng: &mut R) -> Vec<u64> {
    let take = count.min(pool.len());
    let (chosen, _) = pool.partial_shuffle(rng, take);
    chosen.to_vec()
}
