// Lowering stages that sit around the optimization loop. The hardware check rejects
// constructs the device cannot express before any work is done; indirect lowering moves
// reladdr-accessed arrays to scratch memory or the pull-constant buffer; SIMD-width
// lowering splits 64-bit operations the device cannot run in SIMD4x2; payload setup binds
// inputs to their fixed registers and rebases message registers; validation checks the
// encoder boundary once allocation is done.

//! Lowering passes and the encoder-boundary check.

pub mod hw_support;
pub mod indirect;
pub mod payload;
pub mod simd_width;
pub mod validate;

use crate::core::DeviceInfo;
use crate::ir::{Dst, Instruction, Opcode, Src};

/// A scratch or constant message with a one-register header at the
/// device's spill MRF.
pub(crate) fn message(devinfo: &DeviceInfo, opcode: Opcode, dst: Dst, srcs: &[Src], mlen: u32) -> Instruction {
    let mut inst = Instruction::new(opcode, dst, srcs);
    inst.mlen = mlen;
    inst.header_size = 1;
    inst.base_mrf = Some(devinfo.first_spill_mrf);
    inst
}
