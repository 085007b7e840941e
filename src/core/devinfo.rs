//! Hardware capability description.
//!
//! Every component receives the same immutable [`DeviceInfo`] and asks it
//! about capabilities instead of comparing generation numbers.

/// Capabilities of the target device that the back end cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human readable name used in diagnostics.
    pub name: &'static str,
    /// Number of general registers in the register file.
    pub grf_count: u32,
    /// Whether a separate message register file exists.
    pub has_mrf: bool,
    /// Number of message registers (or reserved GRFs standing in for them).
    pub mrf_count: u32,
    /// First GRF used to stand in for message registers when `has_mrf` is false.
    pub mrf_hack_start: u32,
    /// First message register used by scratch messages.
    pub first_spill_mrf: u32,
    /// 64-bit float arithmetic is available.
    pub supports_fp64: bool,
    /// 64-bit instructions may run with an execution size of 8.
    pub fp64_simd4x2: bool,
    /// The three-source LRP instruction exists.
    pub has_lrp: bool,
    /// Math instructions accept immediate operands.
    pub math_supports_imm: bool,
    /// Math instructions run in align16 mode (swizzles, writemasks and
    /// source modifiers are honoured).
    pub math_align16: bool,
    /// Three-source instructions accept immediates.
    pub three_src_imm: bool,
    /// Largest scratch area a program may use, in bytes.
    pub max_scratch_bytes: u32,
}

impl DeviceInfo {
    /// Sandy Bridge class device: real MRFs, align1 math.
    pub const fn gen6() -> Self {
        Self {
            name: "gen6",
            grf_count: 128,
            has_mrf: true,
            mrf_count: 24,
            mrf_hack_start: 128,
            first_spill_mrf: 21,
            supports_fp64: false,
            fp64_simd4x2: false,
            has_lrp: true,
            math_supports_imm: false,
            math_align16: false,
            three_src_imm: false,
            max_scratch_bytes: 12 * 1024,
        }
    }

    /// Ivy Bridge class device: MRFs live at the top of the GRF.
    pub const fn gen7() -> Self {
        Self {
            name: "gen7",
            grf_count: 128,
            has_mrf: false,
            mrf_count: 16,
            mrf_hack_start: 112,
            first_spill_mrf: 13,
            supports_fp64: true,
            fp64_simd4x2: false,
            has_lrp: true,
            math_supports_imm: false,
            math_align16: true,
            three_src_imm: false,
            max_scratch_bytes: 2 * 1024 * 1024,
        }
    }

    /// Broadwell class device.
    pub const fn gen8() -> Self {
        Self {
            name: "gen8",
            grf_count: 128,
            has_mrf: false,
            mrf_count: 16,
            mrf_hack_start: 112,
            first_spill_mrf: 13,
            supports_fp64: true,
            fp64_simd4x2: true,
            has_lrp: true,
            math_supports_imm: true,
            math_align16: true,
            three_src_imm: false,
            max_scratch_bytes: 2 * 1024 * 1024,
        }
    }

    /// Look up a preset by generation number.
    pub fn for_generation(gen: u32) -> Option<Self> {
        match gen {
            6 => Some(Self::gen6()),
            7 => Some(Self::gen7()),
            8 => Some(Self::gen8()),
            _ => None,
        }
    }

    /// Override the size of the register file.
    pub fn with_grf_count(mut self, grf_count: u32) -> Self {
        self.grf_count = grf_count;
        if !self.has_mrf {
            self.mrf_hack_start = grf_count.saturating_sub(self.mrf_count);
        }
        self
    }

    /// Number of GRF units the allocator may hand out, payload included.
    pub fn allocatable_grf_count(&self) -> u32 {
        if self.has_mrf {
            self.grf_count
        } else {
            self.grf_count.min(self.mrf_hack_start)
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::gen7()
    }
}
