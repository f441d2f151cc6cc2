// src/resolver/frontier.rs

//! Depth-monotonic combination frontier
//!
//! The resolver enumerates candidate index vectors in order of increasing
//! total depth (the sum of chosen indices). Each depth level enumerates
//! exactly the index vectors whose components sum to that level, so every
//! distinct combination is produced once and more-preferred combinations
//! always come first.

/// Iterates bounded compositions: vectors `c` with `0 <= c[i] <= bounds[i]`
/// and `sum(c) == total`, in ascending lexicographic order.
pub(crate) struct Compositions {
    bounds: Vec<usize>,
    state: Option<Vec<usize>>,
}

impl Compositions {
    pub fn new(bounds: Vec<usize>, total: usize) -> Self {
        let mut first = vec![0; bounds.len()];
        let state = if pack_right(&mut first, &bounds, 0, total) {
            Some(first)
        } else {
            None
        };
        Compositions { bounds, state }
    }
}

/// Distribute `amount` over positions `start..` packing toward the right, so
/// the prefix stays lexicographically minimal. Returns false when the
/// remaining capacity cannot absorb `amount`.
fn pack_right(c: &mut [usize], bounds: &[usize], start: usize, mut amount: usize) -> bool {
    for slot in c[start..].iter_mut() {
        *slot = 0;
    }
    let mut i = bounds.len();
    while i > start && amount > 0 {
        i -= 1;
        let take = amount.min(bounds[i]);
        c[i] = take;
        amount -= take;
    }
    amount == 0
}

impl Iterator for Compositions {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.state.take()?;
        self.state = successor(&current, &self.bounds);
        Some(current)
    }
}

/// Next composition after `c` in lexicographic order: find the rightmost
/// position that can absorb one unit from its suffix, then re-pack the rest
/// of that suffix minimally.
fn successor(c: &[usize], bounds: &[usize]) -> Option<Vec<usize>> {
    let k = c.len();
    if k == 0 {
        return None;
    }
    let mut suffix = c[k - 1];
    for i in (0..k.saturating_sub(1)).rev() {
        if suffix > 0 && c[i] < bounds[i] {
            let mut next = c.to_vec();
            next[i] += 1;
            if pack_right(&mut next, bounds, i + 1, suffix - 1) {
                return Some(next);
            }
        }
        suffix += c[i];
    }
    None
}

/// Yields every index vector over the slot bounds, grouped by non-decreasing
/// total depth. `bounds[i]` is the maximum index for slot `i` (slot length
/// minus one).
pub(crate) struct DepthFrontier {
    bounds: Vec<usize>,
    max_total: usize,
    depth: usize,
    inner: Compositions,
}

impl DepthFrontier {
    pub fn new(bounds: Vec<usize>) -> Self {
        let max_total = bounds.iter().sum();
        let inner = Compositions::new(bounds.clone(), 0);
        DepthFrontier {
            bounds,
            max_total,
            depth: 0,
            inner,
        }
    }
}

impl Iterator for DepthFrontier {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        loop {
            if let Some(combo) = self.inner.next() {
                return Some(combo);
            }
            if self.depth >= self.max_total {
                return None;
            }
            self.depth += 1;
            self.inner = Compositions::new(self.bounds.clone(), self.depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_compositions_fixed_sum() {
        let combos: Vec<_> = Compositions::new(vec![2, 1, 3], 3).collect();
        for c in &combos {
            assert_eq!(c.iter().sum::<usize>(), 3);
            assert!(c[0] <= 2 && c[1] <= 1 && c[2] <= 3);
        }
        // Lexicographic ascending, no duplicates.
        let mut sorted = combos.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, combos);
    }

    #[test]
    fn test_compositions_infeasible_total() {
        assert_eq!(Compositions::new(vec![1, 1], 5).count(), 0);
    }

    #[test]
    fn test_empty_bounds_single_empty_combo() {
        let combos: Vec<_> = DepthFrontier::new(vec![]).collect();
        assert_eq!(combos, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_frontier_visits_every_combination_once() {
        let bounds = vec![2, 1, 3];
        let combos: Vec<_> = DepthFrontier::new(bounds.clone()).collect();

        let expected: usize = bounds.iter().map(|b| b + 1).product();
        assert_eq!(combos.len(), expected);

        let unique: HashSet<_> = combos.iter().cloned().collect();
        assert_eq!(unique.len(), expected);
    }

    #[test]
    fn test_frontier_depth_monotonic() {
        let combos: Vec<_> = DepthFrontier::new(vec![3, 2, 2]).collect();
        let depths: Vec<usize> = combos.iter().map(|c| c.iter().sum()).collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(depths[0], 0);
    }

    #[test]
    fn test_single_slot() {
        let combos: Vec<_> = DepthFrontier::new(vec![2]).collect();
        assert_eq!(combos, vec![vec![0], vec![1], vec![2]]);
    }
}
