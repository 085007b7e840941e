//! Sets of physical register units.
//!
//! The coloring step asks one question over and over: given the units the
//! already-colored neighbours of a node occupy, where is the first run of
//! free units large enough for it? [`RegUnitSet`] answers it with a few
//! word operations.

/// Largest register file the set can describe.
pub const MAX_UNITS: usize = 256;

const WORDS: usize = MAX_UNITS / 64;

/// Bit set over physical register units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegUnitSet {
    words: [u64; WORDS],
}

impl RegUnitSet {
    /// Create an empty set.
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// The units `0..count`.
    pub fn first_n(count: u32) -> Self {
        let mut set = Self::new();
        set.insert_range(0, count);
        set
    }

    pub fn contains(&self, unit: u32) -> bool {
        let unit = unit as usize;
        unit < MAX_UNITS && self.words[unit / 64] & (1u64 << (unit % 64)) != 0
    }

    pub fn insert(&mut self, unit: u32) {
        let unit = unit as usize;
        if unit < MAX_UNITS {
            self.words[unit / 64] |= 1u64 << (unit % 64);
        }
    }

    /// Insert `len` units starting at `start`.
    pub fn insert_range(&mut self, start: u32, len: u32) {
        for unit in start..start.saturating_add(len) {
            self.insert(unit);
        }
    }

    pub fn remove(&mut self, unit: u32) {
        let unit = unit as usize;
        if unit < MAX_UNITS {
            self.words[unit / 64] &= !(1u64 << (unit % 64));
        }
    }

    /// Remove every unit of `other`.
    pub fn subtract(&mut self, other: &RegUnitSet) {
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
    }

    pub fn union_with(&mut self, other: &RegUnitSet) {
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_UNITS as u32).filter(move |&u| self.contains(u))
    }

    /// Lowest unit `u` with `u..u + size` all in the set.
    pub fn find_first_fit(&self, size: u32) -> Option<u32> {
        if size == 0 {
            return None;
        }
        let mut run = 0;
        for unit in 0..MAX_UNITS as u32 {
            if self.contains(unit) {
                run += 1;
                if run == size {
                    return Some(unit + 1 - size);
                }
            } else {
                run = 0;
            }
        }
        None
    }
}
