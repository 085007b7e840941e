//! Virtual register table.

use crate::core::error::{malformed, CompileResult};

/// Sizes (in register units) of every virtual register, with the cumulative
/// offsets used to index per-unit analysis data.
#[derive(Debug, Clone, Default)]
pub struct VirtualGrfTable {
    sizes: Vec<u32>,
    offsets: Vec<u32>,
    total: u32,
    frozen: bool,
}

impl VirtualGrfTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a register of `size` units and return its number.
    pub fn allocate(&mut self, size: u32) -> CompileResult<u32> {
        if self.frozen {
            return Err(malformed("virtual register allocated after assignment"));
        }
        if size == 0 {
            return Err(malformed("virtual register of size zero"));
        }
        let total = self
            .total
            .checked_add(size)
            .ok_or_else(|| malformed(format!("virtual register of size {size} overflows the register table")))?;
        let nr = self.sizes.len() as u32;
        self.sizes.push(size);
        self.offsets.push(self.total);
        self.total = total;
        Ok(nr)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn size(&self, nr: u32) -> u32 {
        self.sizes.get(nr as usize).copied().unwrap_or(0)
    }

    /// First unit of `nr` in the flattened unit space.
    pub fn offset(&self, nr: u32) -> u32 {
        self.offsets.get(nr as usize).copied().unwrap_or(self.total)
    }

    /// Total number of units over all registers.
    pub fn total_units(&self) -> u32 {
        self.total
    }

    pub fn contains(&self, nr: u32) -> bool {
        (nr as usize) < self.sizes.len()
    }

    /// Shrink a register in place. Only used by register splitting, which
    /// remaps the tail units to fresh registers.
    pub fn shrink(&mut self, nr: u32, size: u32) -> CompileResult<()> {
        if self.frozen || !self.contains(nr) || size == 0 || size > self.size(nr) {
            return Err(malformed(format!("cannot shrink vgrf{nr} to {size}")));
        }
        self.sizes[nr as usize] = size;
        self.recompute_offsets();
        Ok(())
    }

    fn recompute_offsets(&mut self) {
        let mut total = 0;
        for (size, offset) in self.sizes.iter().zip(self.offsets.iter_mut()) {
            *offset = total;
            total += size;
        }
        self.total = total;
    }

    /// Forbid further growth. Called once physical registers are assigned.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.sizes.iter().enumerate().map(|(nr, &size)| (nr as u32, size))
    }
}
