//! Front-end handoff: the instruction stream plus its declarations.

use super::instruction::Instruction;
use super::vgrf::VirtualGrfTable;

/// A uniform array: `len` consecutive vec4 push-constant slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformArray {
    pub start: u32,
    pub len: u32,
}

impl UniformArray {
    pub fn contains(&self, slot: u32) -> bool {
        slot >= self.start && slot < self.start + self.len
    }

    /// The declared array holding `slot`, or the run from `slot` to the
    /// last uniform when none is declared.
    pub fn containing(arrays: &[UniformArray], nr_uniforms: u32, slot: u32) -> UniformArray {
        arrays.iter().copied().find(|a| a.contains(slot)).unwrap_or(UniformArray {
            start: slot,
            len: nr_uniforms.saturating_sub(slot).max(1),
        })
    }
}

/// An instruction stream over virtual registers, as emitted by a front end.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub alloc: VirtualGrfTable,
    pub instructions: Vec<Instruction>,
    /// Vec4 attribute slots supplied in the payload.
    pub nr_attributes: u32,
    /// Vec4 push-constant slots.
    pub nr_uniforms: u32,
    pub uniform_arrays: Vec<UniformArray>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Array a uniform slot belongs to. A slot outside any declared array
    /// starts an array running to the last uniform.
    pub fn uniform_array_of(&self, slot: u32) -> UniformArray {
        UniformArray::containing(&self.uniform_arrays, self.nr_uniforms, slot)
    }
}
