//! SIMD-width lowering.
//!
//! Devices that cannot run 64-bit instructions in SIMD4x2 get every such
//! instruction split into two SIMD4 halves, one per thread. Each half reads
//! and writes the part of its operands that belongs to its thread. When a
//! source overlaps the destination with a different lane size, the first
//! half could overwrite data the second half still reads, so the halves
//! write a temporary that is copied out afterwards.

use crate::core::error::CompileResult;
use crate::ir::{CondMod, Dst, Instruction, Opcode, RegFile, REG_SIZE};
use crate::shader::Shader;

fn needs_split(inst: &Instruction) -> bool {
    inst.exec_size == 8
        && !inst.opcode.is_control_flow()
        && (inst.dst.ty.is_64bit() || inst.srcs().any(|s| s.ty.is_64bit() && !s.is_imm()))
}

/// Bytes one SIMD4 half of an operand of lane size `size` occupies.
fn half_size(size: u32) -> u32 {
    size * 4
}

fn half(inst: &Instruction, h: u32) -> Instruction {
    let mut half = inst.clone();
    half.exec_size = 4;
    half.group = (4 * h) as u8;
    if !half.dst.is_null() {
        half.dst.offset += h * half_size(half.dst.ty.size());
        half.size_written = inst.size_written / 2;
    }
    for i in 0..half.num_srcs() {
        let src = &mut half.src[i];
        if !matches!(src.file, RegFile::Unused | RegFile::Imm | RegFile::Uniform) {
            src.offset += h * half_size(src.ty.size());
        }
    }
    half
}

fn split(shader: &mut Shader, inst: Instruction, out: &mut Vec<Instruction>) -> CompileResult<()> {
    let hazard = !inst.dst.is_null()
        && (0..inst.num_srcs()).any(|i| {
            let src = &inst.src[i];
            !src.is_imm() && src.ty.size() != inst.dst.ty.size() && inst.src_overlaps_dst(i)
        });
    if !hazard {
        out.push(half(&inst, 0));
        out.push(half(&inst, 1));
        return Ok(());
    }

    let tmp = shader.alloc.allocate(inst.regs_written())?;
    let mut redirected = inst.clone();
    redirected.dst = Dst {
        file: RegFile::Vgrf,
        nr: tmp,
        offset: inst.dst.offset % REG_SIZE,
        reladdr: None,
        ..inst.dst.clone()
    };
    out.push(half(&redirected, 0));
    out.push(half(&redirected, 1));

    let mut copy = Instruction::mov(inst.dst.clone(), (&redirected.dst).into());
    copy.predicate = inst.predicate;
    copy.predicate_inverse = inst.predicate_inverse;
    copy.force_writemask_all = inst.force_writemask_all;
    copy.size_written = inst.size_written;
    copy.cmod = CondMod::None;
    out.push(half(&copy, 0));
    out.push(half(&copy, 1));
    Ok(())
}

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    if shader.devinfo.fp64_simd4x2 {
        return Ok(false);
    }
    let mut progress = false;
    for b in 0..shader.cfg.blocks.len() {
        if !shader.cfg.blocks[b].instructions.iter().any(needs_split) {
            continue;
        }
        let insts = std::mem::take(&mut shader.cfg.blocks[b].instructions);
        let mut out = Vec::with_capacity(insts.len() + 2);
        for inst in insts {
            if needs_split(&inst) {
                log::trace!("simd width: splitting `{}` into two SIMD4 halves", inst.opcode);
                split(shader, inst, &mut out)?;
                progress = true;
            } else {
                out.push(inst);
            }
        }
        shader.cfg.blocks[b].instructions = out;
    }
    if progress {
        shader.invalidate_live();
    }
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceInfo;
    use crate::ir::{Program, RegType, Src};

    fn shader(devinfo: DeviceInfo, insts: Vec<Instruction>) -> Shader {
        let mut program = Program::new();
        program.alloc.allocate(2).unwrap();
        program.alloc.allocate(2).unwrap();
        program.alloc.allocate(1).unwrap();
        program.instructions = insts;
        Shader::new(devinfo, program).unwrap()
    }

    #[test]
    fn double_add_splits_into_halves() {
        let add = Instruction::new(
            Opcode::Add,
            Dst::vgrf(0, RegType::DF),
            &[Src::vgrf(1, RegType::DF), Src::vgrf(1, RegType::DF)],
        );
        let mut s = shader(DeviceInfo::gen7(), vec![add]);
        assert!(run(&mut s).unwrap());
        let insts = s.instructions();
        assert_eq!(insts.len(), 2);
        for (h, inst) in insts.iter().enumerate() {
            assert_eq!(inst.exec_size, 4);
            assert_eq!(inst.group as usize, 4 * h);
            assert_eq!(inst.dst.offset as usize, 32 * h);
            assert_eq!(inst.src[1].offset as usize, 32 * h);
            assert_eq!(inst.size_written, 32);
        }
        assert!(!run(&mut s).unwrap());
    }

    #[test]
    fn conversion_in_place_goes_through_temporary() {
        // Widening vgrf2's floats into vgrf2 would clobber the second
        // thread's input, so the halves write a temporary.
        let mut program = Program::new();
        program.alloc.allocate(2).unwrap();
        program.instructions = vec![Instruction::mov(Dst::vgrf(0, RegType::DF), Src::vgrf(0, RegType::F))];
        let mut s = Shader::new(DeviceInfo::gen7(), program).unwrap();
        assert!(run(&mut s).unwrap());
        let insts = s.instructions();
        assert_eq!(insts.len(), 4);
        assert_eq!(insts[0].dst.nr, 1);
        assert_eq!(insts[1].src[0].offset, 16);
        assert_eq!(insts[3].dst.nr, 0);
        assert_eq!(insts[3].dst.offset, 32);
        assert_eq!(insts[3].src[0].nr, 1);
    }

    #[test]
    fn capable_device_is_left_alone() {
        let mov = Instruction::new(Opcode::Mov, Dst::vgrf(0, RegType::DF), &[Src::vgrf(1, RegType::DF)]);
        let mut s = shader(DeviceInfo::gen8(), vec![mov]);
        assert!(!run(&mut s).unwrap());
    }
}
