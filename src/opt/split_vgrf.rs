//! Splitting of multi-unit virtual registers.
//!
//! A register whose every access touches a single unit is split into one
//! single-unit register per unit. The allocator can then place the pieces
//! independently and liveness tracks them separately.

use crate::core::error::CompileResult;
use crate::ir::{RegFile, REG_SIZE};
use crate::shader::Shader;

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let count = shader.alloc.len();
    let mut split: Vec<bool> = (0..count as u32).map(|nr| shader.alloc.size(nr) > 1).collect();

    for (_, inst) in shader.cfg.instructions() {
        if inst.dst.file == RegFile::Vgrf && (inst.regs_written() > 1 || inst.dst.reladdr.is_some()) {
            split[inst.dst.nr as usize] = false;
        }
        for i in 0..inst.num_srcs() {
            let src = &inst.src[i];
            if src.file == RegFile::Vgrf && (inst.regs_read(i) > 1 || src.reladdr.is_some()) {
                split[src.nr as usize] = false;
            }
            let mut chain = src.reladdr.as_deref();
            while let Some(r) = chain {
                if r.file == RegFile::Vgrf {
                    split[r.nr as usize] = false;
                }
                chain = r.reladdr.as_deref();
            }
        }
        let mut chain = inst.dst.reladdr.as_deref();
        while let Some(r) = chain {
            if r.file == RegFile::Vgrf {
                split[r.nr as usize] = false;
            }
            chain = r.reladdr.as_deref();
        }
    }

    if !split.iter().any(|&s| s) {
        return Ok(false);
    }

    // Unit `u > 0` of a split register `nr` becomes `first_new[nr] + u - 1`.
    let mut first_new = vec![0u32; count];
    for nr in 0..count as u32 {
        if !split[nr as usize] {
            continue;
        }
        let size = shader.alloc.size(nr);
        first_new[nr as usize] = shader.alloc.allocate(1)?;
        for _ in 2..size {
            shader.alloc.allocate(1)?;
        }
        shader.alloc.shrink(nr, 1)?;
        log::debug!("split vgrf{nr} into {size} registers");
    }

    for inst in shader.cfg.instructions_mut() {
        if inst.dst.file == RegFile::Vgrf && split[inst.dst.nr as usize] && inst.dst.offset >= REG_SIZE {
            inst.dst.nr = first_new[inst.dst.nr as usize] + inst.dst.offset / REG_SIZE - 1;
            inst.dst.offset %= REG_SIZE;
        }
        for src in inst.src.iter_mut() {
            if src.file == RegFile::Vgrf && split[src.nr as usize] && src.offset >= REG_SIZE {
                src.nr = first_new[src.nr as usize] + src.offset / REG_SIZE - 1;
                src.offset %= REG_SIZE;
            }
        }
    }

    shader.invalidate_live();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceInfo;
    use crate::ir::{Dst, Instruction, Opcode, Program, RegType, Src};

    fn at(nr: u32, unit: u32) -> (Dst, Src) {
        let mut dst = Dst::vgrf(nr, RegType::F);
        dst.offset = unit * REG_SIZE;
        let mut src = Src::vgrf(nr, RegType::F);
        src.offset = unit * REG_SIZE;
        (dst, src)
    }

    #[test]
    fn per_unit_accesses_split() {
        let mut program = Program::new();
        program.alloc.allocate(3).unwrap();
        program.alloc.allocate(2).unwrap();
        program.nr_attributes = 1;
        let attr = Src::reg(RegFile::Attr, 0, RegType::F);
        for unit in 0..3 {
            program.instructions.push(Instruction::mov(at(0, unit).0, attr.clone()));
        }
        program.instructions.push(Instruction::new(
            Opcode::Add,
            at(0, 2).0,
            &[at(0, 1).1, at(0, 0).1],
        ));
        // vgrf1 is written as one 64-bit value and must stay whole.
        program.instructions.push(Instruction::new(
            Opcode::Mov,
            Dst::vgrf(1, RegType::DF),
            &[Src::imm_f(0.0)],
        ));
        let mut shader = Shader::new(DeviceInfo::gen7(), program).unwrap();

        assert!(run(&mut shader).unwrap());
        assert_eq!(shader.alloc.len(), 4);
        assert_eq!(shader.alloc.size(0), 1);
        assert_eq!(shader.alloc.size(1), 2);
        let insts = shader.instructions();
        assert_eq!((insts[1].dst.nr, insts[1].dst.offset), (2, 0));
        assert_eq!((insts[2].dst.nr, insts[2].dst.offset), (3, 0));
        assert_eq!(insts[3].src[0].nr, 2);
        assert_eq!(insts[3].src[1].nr, 0);
        assert!(!run(&mut shader).unwrap());
    }
}
