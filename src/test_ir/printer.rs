//! Text form of operands, instructions and programs.
//!
//! Everything printed here parses back with [`super::parse_program`].

use std::fmt::{self, Write as _};

use crate::ir::{Dst, Instruction, OpKind, Opcode, Predicate, Program, RegFile, RegType, Src, Swizzle, WriteMask};

fn write_imm(f: &mut fmt::Formatter<'_>, src: &Src) -> fmt::Result {
    match src.ty {
        RegType::F => write!(f, "{:?}f", f32::from_bits(src.imm)),
        RegType::D => write!(f, "{}d", src.imm as i32),
        RegType::UD => write!(f, "{}u", src.imm),
        RegType::W => write!(f, "{}w", src.imm as u16 as i16),
        RegType::UW => write!(f, "{}uw", src.imm as u16),
        RegType::VF => {
            let [x, y, z, w] = src.imm.to_le_bytes().map(crate::ir::vf_to_f32);
            write!(f, "vf[{x:?}, {y:?}, {z:?}, {w:?}]")
        }
        RegType::DF => write!(f, "{}df", src.imm),
    }
}

fn write_reg(f: &mut fmt::Formatter<'_>, file: RegFile, nr: u32, reladdr: Option<&Src>, offset: u32) -> fmt::Result {
    match file {
        RegFile::Null => f.write_str("null")?,
        RegFile::Unused => f.write_str("_")?,
        _ => write!(f, "{}{nr}", file.prefix())?,
    }
    if let Some(reladdr) = reladdr {
        write!(f, "[{reladdr}]")?;
    }
    if offset != 0 {
        write!(f, "+{offset}")?;
    }
    Ok(())
}

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Immediates print with their modifiers folded in when possible.
        let folded;
        let src = if self.is_imm() {
            folded = self.fold_imm_modifiers().unwrap_or_else(|| self.clone());
            &folded
        } else {
            self
        };
        if src.negate {
            f.write_char('-')?;
        }
        if src.abs {
            f.write_char('|')?;
        }
        if src.is_imm() {
            write_imm(f, src)?;
        } else {
            write_reg(f, src.file, src.nr, src.reladdr.as_deref(), src.offset)?;
        }
        if src.swizzle != Swizzle::XYZW {
            write!(f, ".{}", src.swizzle)?;
        }
        if src.abs {
            f.write_char('|')?;
        }
        if !src.is_imm() {
            write!(f, ":{}", src.ty)?;
        }
        Ok(())
    }
}

impl fmt::Display for Dst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_reg(f, self.file, self.nr, self.reladdr.as_deref(), self.offset)?;
        if self.writemask != WriteMask::XYZW {
            write!(f, ".{}", self.writemask)?;
        }
        write!(f, ":{}", self.ty)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicate != Predicate::None {
            let sign = if self.predicate_inverse { '-' } else { '+' };
            write!(f, "({sign}f0{}) ", self.predicate.suffix())?;
        }
        f.write_str(self.opcode.name())?;
        if !self.cmod.name().is_empty() {
            write!(f, ".{}", self.cmod.name())?;
        }
        if self.saturate {
            f.write_str(".sat")?;
        }

        if self.opcode.kind() != OpKind::ControlFlow && self.opcode.kind() != OpKind::Nop {
            write!(f, " {}", self.dst)?;
            for src in self.srcs() {
                write!(f, ", {src}")?;
            }
        }

        let default = Instruction::new(self.opcode, self.dst.clone(), &[]);
        if self.exec_size != 8 {
            write!(f, " exec={}", self.exec_size)?;
        }
        if self.group != 0 {
            write!(f, " group={}", self.group)?;
        }
        if self.mlen != 0 {
            write!(f, " mlen={}", self.mlen)?;
        }
        if let Some(base) = self.base_mrf {
            write!(f, " base_mrf={base}")?;
        }
        if self.header_size != 0 {
            write!(f, " header={}", self.header_size)?;
        }
        if self.offset != 0 {
            write!(f, " offset={}", self.offset)?;
        }
        if self.size_written != default.size_written {
            write!(f, " size={}", self.size_written)?;
        }
        if self.force_writemask_all {
            f.write_str(" nomask")?;
        }
        if self.writes_accumulator {
            f.write_str(" acc")?;
        }
        if self.no_dd_check {
            f.write_str(" nodd_check")?;
        }
        if self.no_dd_clear {
            f.write_str(" nodd_clear")?;
        }
        Ok(())
    }
}

/// Print instructions, one per line, indented by control-flow depth.
pub fn print_instructions(insts: &[Instruction]) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for inst in insts {
        if matches!(inst.opcode, Opcode::Else | Opcode::Endif | Opcode::While) {
            depth = depth.saturating_sub(1);
        }
        let _ = writeln!(out, "{}{inst}", "  ".repeat(depth));
        if matches!(inst.opcode, Opcode::If | Opcode::Else | Opcode::Do) {
            depth += 1;
        }
    }
    out
}

/// Print a whole program: declarations followed by the instructions.
pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    if program.nr_attributes != 0 {
        let _ = writeln!(out, ".attributes {}", program.nr_attributes);
    }
    if program.nr_uniforms != 0 {
        let _ = writeln!(out, ".uniforms {}", program.nr_uniforms);
    }
    for array in &program.uniform_arrays {
        let _ = writeln!(out, ".uniform_array {} {}", array.start, array.len);
    }
    for (nr, size) in program.alloc.iter() {
        if size != 1 {
            let _ = writeln!(out, ".decl vgrf{nr} size={size}");
        }
    }
    out.push_str(&print_instructions(&program.instructions));
    out
}
