//! The binomial-tree topology the collectives run on.
//!
//! The tree is always shaped as if rank 0 were the root: the parent of `k`
//! is `k` with its lowest set bit cleared, and the children of `k` are
//! `k + 1, k + 2, k + 4, …` up to (not including) that bit. For sixteen
//! ranks:
//!
//! ```text
//! 0 ─┬─ 1
//!    ├─ 2 ── 3
//!    ├─ 4 ─┬─ 5
//!    │     └─ 6 ── 7
//!    └─ 8 ─┬─ 9
//!          ├─ 10 ── 11
//!          └─ 12 ─┬─ 13
//!                 └─ 14 ── 15
//! ```
//!
//! When an operation's semantic root `r` is not 0, ranks 0 and `r` simply
//! trade places; the shape never changes.

/// Largest power of two dividing `k`, with 0 for the root.
fn lowest_pow2(k: i32) -> i32 {
    k & k.wrapping_neg()
}

/// Parent of `k` in the tree rooted at 0.
pub(crate) fn parent(k: i32) -> Option<i32> {
    if k == 0 {
        None
    } else {
        Some(k - lowest_pow2(k))
    }
}

/// Children of `k` among ranks `0..w`, in ascending order.
pub(crate) fn children(k: i32, w: i32) -> Vec<i32> {
    let limit = if k == 0 { w } else { lowest_pow2(k) };
    let mut out = Vec::new();
    let mut step = 1;
    while step < limit && k + step < w {
        out.push(k + step);
        step <<= 1;
    }
    out
}

/// The 0 <-> root involution. Applying it to every rank moves the semantic
/// root into position 0 while leaving everyone else where they are.
pub(crate) fn swap_root(rank: i32, root: i32) -> i32 {
    if rank == root {
        0
    } else if rank == 0 {
        root
    } else {
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_children_agree() {
        for w in 1..=16 {
            for k in 0..w {
                for child in children(k, w) {
                    assert_eq!(parent(child), Some(k), "w={} k={} child={}", w, k, child);
                }
                if let Some(p) = parent(k) {
                    assert!(children(p, w).contains(&k), "w={} k={} parent={}", w, k, p);
                }
            }
        }
    }

    #[test]
    fn every_rank_hangs_off_the_root() {
        for w in 1..=16 {
            let mut seen = vec![false; w as usize];
            let mut frontier = vec![0];
            while let Some(k) = frontier.pop() {
                assert!(!seen[k as usize], "rank {} reached twice in w={}", k, w);
                seen[k as usize] = true;
                frontier.extend(children(k, w));
            }
            assert!(seen.into_iter().all(|s| s), "w={} not fully covered", w);
        }
    }

    #[test]
    fn children_come_out_ascending() {
        assert_eq!(children(0, 16), [1, 2, 4, 8]);
        assert_eq!(children(4, 16), [5, 6]);
        assert_eq!(children(4, 6), [5]);
        assert_eq!(children(8, 16), [9, 10, 12]);
        assert!(children(7, 16).is_empty());
        assert!(children(0, 1).is_empty());
    }

    #[test]
    fn root_swap_is_an_involution() {
        for w in 1..=16 {
            for root in 0..w {
                for rank in 0..w {
                    assert_eq!(swap_root(swap_root(rank, root), root), rank);
                }
                assert_eq!(swap_root(root, root), 0);
                assert_eq!(swap_root(0, root), root);
            }
        }
    }
}
