//! Conditional-modifier fusion.
//!
//! A test of a value against zero (`cmp.<cond> null, x, 0`, `mov.nz null, x`
//! or `and.nz null, x, 1`) is folded into the instruction that produced `x`:
//! the producer gains the conditional modifier and the test disappears.

use crate::core::error::CompileResult;
use crate::ir::{CondMod, Instruction, Opcode, RegFile, RegType, WriteMask};
use crate::shader::Shader;

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let live = shader.live();
    let mut progress = false;

    for (b, block) in shader.cfg.blocks.iter_mut().enumerate() {
        let flag_liveout = live.blocks[b].flag_liveout;
        let mut idx = block.instructions.len();
        while idx > 0 {
            idx -= 1;
            if !is_zero_test(&block.instructions[idx]) {
                continue;
            }
            if fuse(&mut block.instructions, idx, flag_liveout) {
                log::trace!("cmod: fused test at block {b} index {idx}");
                block.instructions.remove(idx);
                progress = true;
            }
        }
    }

    if progress {
        shader.invalidate_live();
    }
    Ok(progress)
}

fn is_zero_test(inst: &Instruction) -> bool {
    if inst.is_predicated() || !inst.dst.is_null() || inst.cmod == CondMod::None {
        return false;
    }
    let src0 = &inst.src[0];
    if src0.file != RegFile::Vgrf || src0.reladdr.is_some() || src0.abs {
        return false;
    }
    match inst.opcode {
        Opcode::Cmp => inst.src[1].is_zero(),
        Opcode::Mov => inst.cmod == CondMod::Nz,
        Opcode::And => inst.cmod == CondMod::Nz && inst.src[1].is_one() && !src0.negate,
        _ => false,
    }
}

/// Flag lanes still read after `idx`.
fn flag_live_after(insts: &[Instruction], idx: usize, liveout: WriteMask) -> WriteMask {
    let mut live = liveout;
    for inst in insts[idx + 1..].iter().rev() {
        if inst.is_unconditional_write() {
            live = live.without(inst.flag_lanes_written());
        }
        live = live.union(inst.flag_lanes_read());
    }
    live
}

/// Whether the producer's flag result lines up with the lanes the test
/// writes, leaving no other live flag lane disturbed.
fn lanes_compatible(producer: &Instruction, test: &Instruction, flag_live: WriteMask) -> bool {
    let swizzle = test.src[0].swizzle;
    for c in test.dst.writemask.lanes() {
        if swizzle.get(c) != c || !producer.dst.writemask.contains(c) {
            return false;
        }
    }
    producer.dst.writemask.without(test.dst.writemask).intersect(flag_live).is_empty()
}

/// Try to move the test at `idx` onto its producer. Returns whether the
/// test became redundant.
fn fuse(insts: &mut [Instruction], idx: usize, flag_liveout: WriteMask) -> bool {
    let test = insts[idx].clone();
    let src0 = &test.src[0];
    let read = src0.region(test.size_read(0));
    let mut read_flag = false;

    for j in (0..idx).rev() {
        let scan = &insts[j];
        if !scan.dst.region(scan.size_written).overlaps(&read) {
            if scan.writes_flag() {
                return false;
            }
            read_flag |= scan.reads_flag();
            continue;
        }

        if scan.is_predicated() && scan.opcode != Opcode::Sel
            || scan.dst.offset != src0.offset
            || scan.exec_size != test.exec_size
            || scan.group != test.group
            || scan.dst.ty.size() != src0.ty.size()
        {
            return false;
        }
        let flag_live = flag_live_after(insts, idx, flag_liveout);
        if !lanes_compatible(scan, &test, flag_live) {
            return false;
        }

        // An integer CMP result is all ones or zero; its flag already holds
        // the `.nz` answer.
        if test.cmod == CondMod::Nz
            && matches!(src0.ty, RegType::D | RegType::UD)
            && scan.opcode == Opcode::Cmp
        {
            return true;
        }
        if test.opcode == Opcode::And {
            return false;
        }
        if scan.dst.ty.is_float() != src0.ty.is_float() || scan.saturate {
            return false;
        }
        if test.cmod == CondMod::Nz && !src0.negate && scan.cmod == CondMod::Nz {
            return true;
        }
        // A CMP computes its flag from the operands, not from its result.
        if scan.opcode == Opcode::Cmp {
            return false;
        }

        let cond = if src0.negate { test.cmod.swapped() } else { test.cmod };
        if !matches!(cond, CondMod::Z | CondMod::Nz) && scan.dst.ty != src0.ty {
            return false;
        }
        if scan.can_do_cmod() && (!read_flag && scan.cmod == CondMod::None || scan.cmod == cond) {
            insts[j].cmod = cond;
            return true;
        }
        return false;
    }
    false
}
