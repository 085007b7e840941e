//! Up-front rejection of input the device cannot express.
//!
//! Runs before anything else so that an unsupported construct is reported
//! before any register allocation is attempted. Inputs that are simply
//! inconsistent (unknown registers, bad execution sizes) are malformed IR.

use crate::core::error::{malformed, unsupported, CompileResult};
use crate::ir::{Dst, Instruction, OpKind, Opcode, RegFile, Src};
use crate::shader::Shader;

fn check_src(shader: &Shader, inst: &Instruction, src: &Src, ip: usize) -> CompileResult<()> {
    let dev = &shader.devinfo;
    let op = inst.opcode;
    // Chains are owned, so this walk is finite.
    let mut cur = Some(src);
    while let Some(s) = cur {
        if s.ty.is_64bit() && !dev.supports_fp64 {
            return Err(unsupported(format!("64-bit operand of `{op}`"), dev.name));
        }
        match s.file {
            RegFile::Imm if s.reladdr.is_some() => {
                return Err(malformed(format!("ip {ip}: immediate with an indirect address")));
            }
            RegFile::Vgrf => {
                if !shader.alloc.contains(s.nr) {
                    return Err(malformed(format!("ip {ip}: undeclared vgrf{}", s.nr)));
                }
                if s.reladdr.is_none() && s.unit() >= shader.alloc.size(s.nr) {
                    return Err(malformed(format!("ip {ip}: read past the end of vgrf{}", s.nr)));
                }
            }
            RegFile::Attr => {
                if s.reladdr.is_some() {
                    return Err(unsupported("indirect attribute access", dev.name));
                }
                if s.nr >= shader.nr_attributes {
                    return Err(malformed(format!("ip {ip}: undeclared attr{}", s.nr)));
                }
            }
            RegFile::Uniform => {
                if s.nr >= shader.nr_uniforms {
                    return Err(malformed(format!("ip {ip}: undeclared uniform u{}", s.nr)));
                }
            }
            RegFile::Fixed | RegFile::Mrf if s.reladdr.is_some() => {
                return Err(unsupported("indirect access to a physical register", dev.name));
            }
            RegFile::Mrf if s.nr >= dev.mrf_count => {
                return Err(unsupported(format!("message register m{}", s.nr), dev.name));
            }
            _ => {}
        }
        cur = s.reladdr.as_deref();
    }
    Ok(())
}

fn check_dst(shader: &Shader, inst: &Instruction, dst: &Dst, ip: usize) -> CompileResult<()> {
    let dev = &shader.devinfo;
    if dst.ty.is_64bit() && !dev.supports_fp64 {
        return Err(unsupported(format!("64-bit destination of `{}`", inst.opcode), dev.name));
    }
    match dst.file {
        RegFile::Vgrf => {
            if !shader.alloc.contains(dst.nr) {
                return Err(malformed(format!("ip {ip}: undeclared vgrf{}", dst.nr)));
            }
            if dst.reladdr.is_none() && dst.unit() >= shader.alloc.size(dst.nr) {
                return Err(malformed(format!("ip {ip}: write past the end of vgrf{}", dst.nr)));
            }
        }
        RegFile::Imm | RegFile::Attr | RegFile::Uniform => {
            return Err(malformed(format!("ip {ip}: `{}` writes a read-only register file", inst.opcode)));
        }
        RegFile::Mrf if dst.nr >= dev.mrf_count => {
            return Err(unsupported(format!("message register m{}", dst.nr), dev.name));
        }
        _ => {}
    }
    if dst.reladdr.is_some() && dst.file != RegFile::Vgrf {
        return Err(unsupported("indirect write to a physical register", dev.name));
    }
    if let Some(reladdr) = &dst.reladdr {
        check_src(shader, inst, reladdr, ip)?;
    }
    Ok(())
}

/// Reject every instruction the device cannot execute.
pub fn run(shader: &Shader) -> CompileResult<()> {
    let dev = &shader.devinfo;
    for (ip, (_, inst)) in shader.cfg.instructions().enumerate() {
        let op = inst.opcode;
        if !matches!((inst.exec_size, inst.group), (8, 0) | (4, 0) | (4, 4)) {
            return Err(malformed(format!(
                "ip {ip}: invalid execution size {} at group {}",
                inst.exec_size, inst.group
            )));
        }
        if op == Opcode::Lrp && !dev.has_lrp {
            return Err(unsupported("lrp", dev.name));
        }
        let has_imm = inst.srcs().any(Src::is_imm);
        if op.kind() == OpKind::Math && has_imm && !dev.math_supports_imm {
            return Err(unsupported(format!("immediate operand of `{op}`"), dev.name));
        }
        if inst.is_3src() && has_imm && !dev.three_src_imm {
            return Err(unsupported(format!("immediate operand of `{op}`"), dev.name));
        }
        if op.is_send() && inst.mlen == 0 {
            return Err(malformed(format!("ip {ip}: `{op}` without a message length")));
        }
        check_dst(shader, inst, &inst.dst, ip)?;
        for src in inst.srcs() {
            check_src(shader, inst, src, ip)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CompileError;
    use crate::core::DeviceInfo;
    use crate::ir::{Program, RegType};

    fn shader(devinfo: DeviceInfo, inst: Instruction) -> Shader {
        let mut program = Program::new();
        program.alloc.allocate(2).unwrap();
        program.nr_attributes = 1;
        program.instructions = vec![inst];
        Shader::new(devinfo, program).unwrap()
    }

    #[test]
    fn double_precision_needs_device_support() {
        let inst = Instruction::new(Opcode::Mov, Dst::vgrf(0, RegType::DF), &[Src::vgrf(0, RegType::DF)]);
        assert!(run(&shader(DeviceInfo::gen7(), inst.clone())).is_ok());
        let err = run(&shader(DeviceInfo::gen6(), inst)).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { device: "gen6", .. }));
    }

    #[test]
    fn math_immediates_follow_device() {
        let attr = Src::reg(RegFile::Attr, 0, RegType::F);
        let pow = Instruction::new(Opcode::Pow, Dst::vgrf(0, RegType::F), &[attr, Src::imm_f(2.0)]);
        assert!(run(&shader(DeviceInfo::gen7(), pow.clone())).is_err());
        assert!(run(&shader(DeviceInfo::gen8(), pow)).is_ok());
    }

    #[test]
    fn unknown_registers_are_malformed() {
        let inst = Instruction::mov(Dst::vgrf(7, RegType::F), Src::imm_f(1.0));
        let err = run(&shader(DeviceInfo::gen7(), inst)).unwrap_err();
        assert!(matches!(err, CompileError::MalformedIr { .. }));

        let attr = Instruction::mov(Dst::vgrf(0, RegType::F), Src::reg(RegFile::Attr, 3, RegType::F));
        assert!(run(&shader(DeviceInfo::gen7(), attr)).is_err());
    }
}
