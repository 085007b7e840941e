//! Peephole algebraic simplification against literal constants.

use crate::core::error::CompileResult;
use crate::ir::{CondMod, Instruction, Opcode, RegType, Src};
use crate::shader::Shader;

/// Turn `inst` into a `mov` of its first source.
fn into_mov(inst: &mut Instruction) {
    inst.opcode = Opcode::Mov;
    inst.src[1] = Src::unused();
    inst.src[2] = Src::unused();
}

fn simplify(inst: &mut Instruction) -> bool {
    match inst.opcode {
        Opcode::Mov => {
            // A saturated float immediate is clamped at compile time.
            if !inst.saturate || inst.dst.ty != RegType::F {
                return false;
            }
            let Some(v) = inst.src[0].imm_as_f32() else {
                return false;
            };
            let clamped = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
            inst.src[0] = Src::imm_f(clamped);
            inst.saturate = false;
            true
        }
        Opcode::Add | Opcode::Or => {
            if !inst.src[1].is_zero() {
                return false;
            }
            into_mov(inst);
            true
        }
        Opcode::Mul => {
            let factor = &inst.src[1];
            if !factor.is_imm() {
                return false;
            }
            if factor.is_zero() {
                let ty = inst.src[0].ty;
                into_mov(inst);
                inst.src[0] = Src::imm_bits(0, if ty == RegType::VF { RegType::F } else { ty });
                true
            } else if factor.is_one() {
                into_mov(inst);
                true
            } else if factor.is_negative_one() {
                into_mov(inst);
                inst.src[0].negate = !inst.src[0].negate;
                true
            } else {
                false
            }
        }
        Opcode::Cmp => {
            // -|x| >= 0 holds exactly when x == 0.
            let src0 = &inst.src[0];
            if inst.cmod == CondMod::Ge && src0.abs && src0.negate && inst.src[1].is_zero() {
                inst.src[0].abs = false;
                inst.src[0].negate = false;
                inst.cmod = CondMod::Z;
                return true;
            }
            false
        }
        Opcode::Broadcast => {
            if inst.src[0].is_uniform() || inst.src[1].is_zero() {
                into_mov(inst);
                inst.force_writemask_all = true;
                return true;
            }
            false
        }
        _ => false,
    }
}

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let mut progress = false;
    for inst in shader.cfg.instructions_mut() {
        let before = inst.opcode;
        if simplify(inst) {
            log::trace!("algebraic: simplified {before} to {}", inst.opcode);
            progress = true;
        }
    }
    if progress {
        shader.invalidate_live();
    }
    Ok(progress)
}
