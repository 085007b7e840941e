//! Swizzle reduction.
//!
//! Rewrites source swizzles so that lanes the instruction never computes
//! repeat a lane it does. Equal operands then compare equal in CSE and copy
//! propagation, and liveness never sees reads of unused channels.

use crate::core::error::CompileResult;
use crate::ir::{Opcode, RegFile, Swizzle};
use crate::shader::Shader;

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let mut progress = false;
    for inst in shader.cfg.instructions_mut() {
        if inst.dst.is_null() || inst.dst.file == RegFile::Fixed || inst.opcode.is_send() {
            continue;
        }
        if inst.dst.ty.is_64bit() {
            continue;
        }
        let swizzle = match inst.opcode {
            // DPH reads three channels of src0 but all four of src1.
            Opcode::Dp4 | Opcode::Dph | Opcode::Broadcast => Swizzle::for_size(4),
            Opcode::Dp3 => Swizzle::for_size(3),
            Opcode::Dp2 => Swizzle::for_size(2),
            _ => Swizzle::for_mask(inst.dst.writemask),
        };
        let num_srcs = inst.num_srcs();
        for src in &mut inst.src[..num_srcs] {
            if !matches!(src.file, RegFile::Vgrf | RegFile::Attr | RegFile::Uniform) {
                continue;
            }
            let reduced = swizzle.compose(src.swizzle);
            if reduced != src.swizzle {
                log::trace!("reduce swizzle {} -> {}", src.swizzle, reduced);
                src.swizzle = reduced;
                progress = true;
            }
        }
    }
    Ok(progress)
}
