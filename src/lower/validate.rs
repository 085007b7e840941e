//! Encoder-boundary validation.
//!
//! The allocated program is handed to an encoder that knows nothing about
//! virtual registers. Anything that slips through here is an internal
//! defect, so every violation is reported as malformed IR with the ip and
//! opcode of the offending instruction.

use crate::core::error::{malformed, CompileError, CompileResult};
use crate::core::DeviceInfo;
use crate::ir::{Dst, Instruction, Opcode, RegFile, Src, REG_SIZE};

fn err(ip: usize, inst: &Instruction, what: impl std::fmt::Display) -> CompileError {
    malformed(format!("ip {ip}: `{}` {what}", inst.opcode))
}

fn check_physical(devinfo: &DeviceInfo, file: RegFile, nr: u32, end_byte: u32) -> Result<(), String> {
    match file {
        RegFile::Fixed if nr * REG_SIZE + end_byte > devinfo.grf_count * REG_SIZE => {
            Err(format!("reaches past g{}", devinfo.grf_count - 1))
        }
        RegFile::Mrf if !devinfo.has_mrf => Err(format!("names m{nr} on a device without MRFs")),
        RegFile::Mrf if nr >= devinfo.mrf_count => Err(format!("names m{nr} past the MRF file")),
        RegFile::Vgrf | RegFile::Attr | RegFile::Uniform => {
            Err(format!("still names a virtual {:?} register", file))
        }
        _ => Ok(()),
    }
}

fn check_dst(devinfo: &DeviceInfo, ip: usize, inst: &Instruction, dst: &Dst) -> CompileResult<()> {
    if dst.reladdr.is_some() {
        return Err(err(ip, inst, "writes through an unresolved indirect address"));
    }
    if dst.file == RegFile::Imm {
        return Err(err(ip, inst, "writes an immediate"));
    }
    if !dst.is_null() && dst.writemask.is_empty() {
        return Err(err(ip, inst, "has an empty writemask"));
    }
    check_physical(devinfo, dst.file, dst.nr, dst.offset + inst.size_written).map_err(|e| err(ip, inst, e))
}

fn check_src(devinfo: &DeviceInfo, ip: usize, inst: &Instruction, i: usize, src: &Src) -> CompileResult<()> {
    if src.reladdr.is_some() {
        return Err(err(ip, inst, format!("reads source {i} through an unresolved indirect address")));
    }
    if src.is_unused() {
        return Err(err(ip, inst, format!("is missing source {i}")));
    }
    check_physical(devinfo, src.file, src.nr, src.offset + inst.size_read(i))
        .map_err(|e| err(ip, inst, format!("source {i} {e}")))
}

/// Check the finished instruction list against what the encoder accepts.
pub fn run(devinfo: &DeviceInfo, insts: &[Instruction]) -> CompileResult<()> {
    // Open IF (with whether its ELSE was seen) and DO constructs.
    let mut stack: Vec<(Opcode, bool)> = Vec::new();

    for (ip, inst) in insts.iter().enumerate() {
        if !matches!((inst.exec_size, inst.group), (8, 0) | (4, 0) | (4, 4)) {
            return Err(err(ip, inst, format!("has execution size {} at group {}", inst.exec_size, inst.group)));
        }
        match inst.opcode {
            Opcode::Nop => return Err(err(ip, inst, "survived to the encoder")),
            Opcode::If | Opcode::Do => stack.push((inst.opcode, false)),
            Opcode::Else => match stack.last_mut() {
                Some((Opcode::If, seen_else @ false)) => *seen_else = true,
                _ => return Err(err(ip, inst, "does not close an IF")),
            },
            Opcode::Endif => {
                if !matches!(stack.pop(), Some((Opcode::If, _))) {
                    return Err(err(ip, inst, "does not close an IF"));
                }
            }
            Opcode::While => {
                if !matches!(stack.pop(), Some((Opcode::Do, _))) {
                    return Err(err(ip, inst, "does not close a DO"));
                }
            }
            Opcode::Break | Opcode::Continue => {
                if !stack.iter().any(|(op, _)| *op == Opcode::Do) {
                    return Err(err(ip, inst, "outside of a loop"));
                }
            }
            _ => {}
        }
        if inst.opcode.is_send() && inst.mlen == 0 {
            return Err(err(ip, inst, "carries no message length"));
        }
        if inst.opcode.is_control_flow() {
            continue;
        }
        check_dst(devinfo, ip, inst, &inst.dst)?;
        for (i, src) in inst.srcs().enumerate() {
            check_src(devinfo, ip, inst, i, src)?;
        }
    }

    if let Some((op, _)) = stack.last() {
        return Err(malformed(format!("unterminated `{op}` at the end of the program")));
    }
    Ok(())
}
