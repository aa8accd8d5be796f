//! Set operations over FxHashSet
//!
//! The matcher, cloning engine and function assigner all shuffle
//! context-id sets between nodes and edges; these helpers keep that
//! code readable.

use rustc_hash::FxHashSet;
use std::hash::Hash;

/// Remove every element of `other` from `set`
pub fn set_subtract<T: Eq + Hash + Copy>(set: &mut FxHashSet<T>, other: &FxHashSet<T>) {
    if other.len() < set.len() {
        for item in other {
            set.remove(item);
        }
    } else {
        set.retain(|item| !other.contains(item));
    }
}

/// Keep only elements of `set` also present in `other`
pub fn set_intersect<T: Eq + Hash + Copy>(set: &mut FxHashSet<T>, other: &FxHashSet<T>) {
    set.retain(|item| other.contains(item));
}

/// New set holding the elements common to both inputs
pub fn set_intersection<T: Eq + Hash + Copy>(
    a: &FxHashSet<T>,
    b: &FxHashSet<T>,
) -> FxHashSet<T> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().copied().filter(|item| large.contains(item)).collect()
}

/// Remove every element of `to_remove` from `set`, returning the
/// elements actually removed and the elements of `to_remove` that were
/// not present.
pub fn set_subtract_split<T: Eq + Hash + Copy>(
    set: &mut FxHashSet<T>,
    to_remove: &FxHashSet<T>,
) -> (FxHashSet<T>, FxHashSet<T>) {
    let mut removed = FxHashSet::default();
    let mut missed = FxHashSet::default();
    for item in to_remove {
        if set.remove(item) {
            removed.insert(*item);
        } else {
            missed.insert(*item);
        }
    }
    (removed, missed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u32]) -> FxHashSet<u32> {
        items.iter().copied().collect()
    }

    #[test]
    fn test_subtract() {
        let mut a = set(&[1, 2, 3, 4]);
        set_subtract(&mut a, &set(&[2, 4, 9]));
        assert_eq!(a, set(&[1, 3]));
    }

    #[test]
    fn test_intersect_in_place() {
        let mut a = set(&[1, 2, 3]);
        set_intersect(&mut a, &set(&[2, 3, 5]));
        assert_eq!(a, set(&[2, 3]));
    }

    #[test]
    fn test_intersection() {
        assert_eq!(set_intersection(&set(&[1, 2]), &set(&[2, 7])), set(&[2]));
        assert!(set_intersection(&set(&[1]), &set(&[3])).is_empty());
    }

    #[test]
    fn test_subtract_split() {
        let mut a = set(&[1, 2, 3]);
        let (removed, missed) = set_subtract_split(&mut a, &set(&[2, 3, 8]));
        assert_eq!(a, set(&[1]));
        assert_eq!(removed, set(&[2, 3]));
        assert_eq!(missed, set(&[8]));
    }
}
