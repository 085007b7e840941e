//! Growable bit set used by the dataflow analyses.

/// Fixed-length set of small integers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn contains(&self, i: usize) -> bool {
        i < self.len && self.words[i / 64] & (1 << (i % 64)) != 0
    }

    pub fn insert(&mut self, i: usize) {
        if i < self.len {
            self.words[i / 64] |= 1 << (i % 64);
        }
    }

    pub fn remove(&mut self, i: usize) {
        if i < self.len {
            self.words[i / 64] &= !(1 << (i % 64));
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// `self |= other`. Returns whether `self` changed.
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (a, &b) in self.words.iter_mut().zip(&other.words) {
            let new = *a | b;
            changed |= new != *a;
            *a = new;
        }
        changed
    }

    /// `self |= a & !b`. Returns whether `self` changed.
    pub fn union_with_difference(&mut self, a: &BitSet, b: &BitSet) -> bool {
        let mut changed = false;
        for ((dst, &x), &y) in self.words.iter_mut().zip(&a.words).zip(&b.words) {
            let new = *dst | (x & !y);
            changed |= new != *dst;
            *dst = new;
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(wi * 64 + bit)
            })
        })
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let mut a = BitSet::new(130);
        a.insert(3);
        a.insert(129);
        a.insert(500);
        assert!(a.contains(129));
        assert!(!a.contains(500));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 129]);

        let mut b = BitSet::new(130);
        b.insert(3);
        let mut c = BitSet::new(130);
        assert!(c.union_with_difference(&a, &b));
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![129]);
        assert!(!c.union_with(&BitSet::new(130)));
        c.remove(129);
        assert!(c.is_empty());
    }
}
