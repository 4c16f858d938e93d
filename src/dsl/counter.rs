//! Multisets of components, keyed by structural identity.

use std::collections::HashMap;

use super::Kind;

/// The identity of a component: its kind and structural hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub kind: Kind,
    pub hash: u64,
}

/// A bag of components. Counts are always positive; subtracting drops entries that reach zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentCounter {
    counts: HashMap<Fingerprint, usize>,
}

impl ComponentCounter {
    pub fn new() -> ComponentCounter {
        ComponentCounter::default()
    }

    pub fn single(fp: Fingerprint) -> ComponentCounter {
        let mut c = ComponentCounter::new();
        c.insert(fp, 1);
        c
    }

    pub fn insert(&mut self, fp: Fingerprint, n: usize) {
        if n > 0 {
            *self.counts.entry(fp).or_insert(0) += n;
        }
    }

    pub fn get(&self, fp: &Fingerprint) -> usize {
        self.counts.get(fp).copied().unwrap_or(0)
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.counts.contains_key(fp)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &usize)> {
        self.counts.iter()
    }

    /// Multiset sum, in place.
    pub fn add(&mut self, other: &ComponentCounter) {
        for (fp, n) in other.iter() {
            self.insert(*fp, *n);
        }
    }

    pub fn plus(&self, other: &ComponentCounter) -> ComponentCounter {
        let mut c = self.clone();
        c.add(other);
        c
    }

    /// Multiset difference; counts never go below zero.
    pub fn minus(&self, other: &ComponentCounter) -> ComponentCounter {
        let mut c = ComponentCounter::new();
        for (fp, n) in self.iter() {
            let left = n.saturating_sub(other.get(fp));
            c.insert(*fp, left);
        }
        c
    }

    /// Multiset union: the larger count of each element.
    pub fn union(&self, other: &ComponentCounter) -> ComponentCounter {
        let mut c = self.clone();
        for (fp, n) in other.iter() {
            let e = c.counts.entry(*fp).or_insert(0);
            *e = (*e).max(*n);
        }
        c
    }
}

impl FromIterator<Fingerprint> for ComponentCounter {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        let mut c = ComponentCounter::new();
        for fp in iter {
            c.insert(fp, 1);
        }
        c
    }
}

#[cfg(test)]
fn fp(hash: u64) -> Fingerprint {
    Fingerprint {
        kind: Kind::ColChain,
        hash,
    }
}

#[test]
fn test_counter_arithmetic() {
    let a: ComponentCounter = vec![fp(1), fp(1), fp(2)].into_iter().collect();
    let b: ComponentCounter = vec![fp(1), fp(3)].into_iter().collect();

    let sum = a.plus(&b);
    assert_eq!(sum.get(&fp(1)), 3);
    assert_eq!(sum.get(&fp(3)), 1);

    let diff = a.minus(&b);
    assert_eq!(diff.get(&fp(1)), 1);
    assert_eq!(diff.get(&fp(2)), 1);
    assert!(!diff.contains(&fp(3)));

    let diff = b.minus(&a);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.get(&fp(3)), 1);

    let union = a.union(&b);
    assert_eq!(union.get(&fp(1)), 2);
    assert_eq!(union.get(&fp(2)), 1);
    assert_eq!(union.get(&fp(3)), 1);
}

#[test]
fn test_counter_minus_drops_zeroes() {
    let a: ComponentCounter = vec![fp(1)].into_iter().collect();
    assert!(a.minus(&a).is_empty());
    assert_eq!(a.minus(&a), ComponentCounter::new());
}
