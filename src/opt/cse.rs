// Local common-subexpression elimination. Each block keeps a list of available expressions,
// each remembering the instruction that first computed it. When an identical expression shows
// up again, the first instruction is redirected into a fresh temporary (once), a copy back
// to its original destination is placed right after it, and the repeat is replaced by a copy
// from the temporary. An entry dies when one of its operands is overwritten, when the flag
// register is rewritten by a different producer, or once liveness shows its operands are
// never read again.

use crate::analysis::{var_index, LiveVariables, VARS_PER_UNIT};
use crate::core::error::CompileResult;
use crate::ir::{Dst, Instruction, Opcode, RegFile, RegType, Src, VirtualGrfTable};
use crate::shader::Shader;

struct AvailableExpr {
    /// Index of the generating instruction in the block being rebuilt.
    generator: usize,
    /// Temporary holding the generator's result, once it was needed.
    tmp: Option<u32>,
}

fn is_expression(inst: &Instruction) -> bool {
    inst.opcode.info().expression
        || inst.opcode == Opcode::Mov && inst.src[0].is_imm() && inst.src[0].ty == RegType::VF
}

fn is_candidate(inst: &Instruction) -> bool {
    is_expression(inst)
        && !inst.is_predicated()
        && inst.mlen == 0
        && (inst.dst.is_null() || inst.dst.file != RegFile::Fixed)
        && inst.dst.reladdr.is_none()
        && inst.srcs().all(|s| s.reladdr.is_none())
}

fn operands_match(a: &Instruction, b: &Instruction) -> bool {
    let (xs, ys) = (&a.src, &b.src);
    match a.opcode {
        Opcode::Mad => xs[0] == ys[0] && (xs[1] == ys[1] && xs[2] == ys[2] || xs[1] == ys[2] && xs[2] == ys[1]),
        op if op.is_commutative() => xs[0] == ys[0] && xs[1] == ys[1] || xs[0] == ys[1] && xs[1] == ys[0],
        _ => a.srcs().eq(b.srcs()),
    }
}

fn instructions_match(a: &Instruction, b: &Instruction) -> bool {
    a.opcode == b.opcode
        && a.dst.ty == b.dst.ty
        && a.dst.writemask == b.dst.writemask
        && a.force_writemask_all == b.force_writemask_all
        && a.size_written == b.size_written
        && a.exec_size == b.exec_size
        && a.group == b.group
        && a.saturate == b.saturate
        && a.predicate == b.predicate
        && a.predicate_inverse == b.predicate_inverse
        && a.cmod == b.cmod
        && operands_match(a, b)
}

fn copy_from(template: &Instruction, dst: Dst, tmp: u32) -> Instruction {
    let ty = dst.ty;
    let mut mov = Instruction::mov(dst, Src::vgrf(tmp, ty));
    mov.exec_size = template.exec_size;
    mov.group = template.group;
    mov.force_writemask_all = template.force_writemask_all;
    mov.size_written = template.size_written;
    mov
}

/// Drop entries invalidated by `inst`, executed at `ip`.
fn kill_entries(
    aeb: &mut Vec<AvailableExpr>,
    out: &[Instruction],
    inst: &Instruction,
    ip: usize,
    live: &LiveVariables,
    alloc: &VirtualGrfTable,
) {
    aeb.retain(|entry| {
        let generator = &out[entry.generator];
        if inst.writes_flag()
            && (generator.reads_flag() || generator.writes_flag() && !instructions_match(inst, generator))
        {
            return false;
        }
        for src in generator.srcs() {
            if !inst.dst.is_null() && inst.dst.file == src.file && inst.dst.nr == src.nr {
                return false;
            }
            if src.file == RegFile::Vgrf && alloc.contains(src.nr) {
                let v = var_index(alloc, src.nr, src.unit(), 0, 0);
                if live.var_range_end(v, VARS_PER_UNIT) < ip {
                    return false;
                }
            }
        }
        true
    });
}

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let live = shader.live();
    let mut progress = false;

    for b in 0..shader.cfg.blocks.len() {
        let start_ip = shader.cfg.blocks[b].start_ip;
        let insts = std::mem::take(&mut shader.cfg.blocks[b].instructions);
        let mut out: Vec<Instruction> = Vec::with_capacity(insts.len());
        let mut aeb: Vec<AvailableExpr> = Vec::new();

        for (k, inst) in insts.into_iter().enumerate() {
            let ip = start_ip + k;
            let mut emitted_copy = None;

            if is_candidate(&inst) {
                let found = aeb.iter().position(|entry| {
                    let generator = &out[entry.generator];
                    !(generator.dst.is_null() && !inst.dst.is_null()) && instructions_match(&inst, generator)
                });

                if let Some(e) = found {
                    progress = true;
                    let generator = aeb[e].generator;
                    if aeb[e].tmp.is_none() && !out[generator].dst.is_null() {
                        let tmp = shader.alloc.allocate(out[generator].regs_written().max(1))?;
                        let original = out[generator].dst.clone();
                        let copy = copy_from(&out[generator], original.clone(), tmp);
                        out[generator].dst = Dst {
                            file: RegFile::Vgrf,
                            nr: tmp,
                            offset: 0,
                            reladdr: None,
                            ..original
                        };
                        out.insert(generator + 1, copy);
                        for entry in aeb.iter_mut().filter(|entry| entry.generator > generator) {
                            entry.generator += 1;
                        }
                        aeb[e].tmp = Some(tmp);
                        log::trace!("cse: {} now computes into vgrf{tmp}", out[generator].opcode);
                    }
                    if let (Some(tmp), false) = (aeb[e].tmp, inst.dst.is_null()) {
                        out.push(copy_from(&inst, inst.dst.clone(), tmp));
                        emitted_copy = Some(out.len() - 1);
                    }
                } else {
                    let next = out.len();
                    out.push(inst);
                    aeb.push(AvailableExpr {
                        generator: next,
                        tmp: None,
                    });
                    let current = out[next].clone();
                    kill_entries(&mut aeb, &out, &current, ip, &live, &shader.alloc);
                    continue;
                }
            } else {
                out.push(inst);
                emitted_copy = Some(out.len() - 1);
            }

            if let Some(i) = emitted_copy {
                let current = out[i].clone();
                kill_entries(&mut aeb, &out, &current, ip, &live, &shader.alloc);
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
    use crate::ir::{CondMod, Program};

    fn shader(insts: Vec<Instruction>, vgrfs: u32) -> Shader {
        let mut program = Program::new();
        for _ in 0..vgrfs {
            program.alloc.allocate(1).unwrap();
        }
        program.nr_attributes = 2;
        program.instructions = insts;
        Shader::new(DeviceInfo::gen7(), program).unwrap()
    }

    fn attr(nr: u32) -> Src {
        Src::reg(RegFile::Attr, nr, RegType::F)
    }

    fn out(mrf: u32, nr: u32) -> Instruction {
        Instruction::mov(Dst::reg(RegFile::Mrf, mrf, RegType::F), Src::vgrf(nr, RegType::F))
    }

    #[test]
    fn commutative_operands_match() {
        let mut s = shader(
            vec![
                Instruction::new(Opcode::Add, Dst::vgrf(0, RegType::F), &[attr(0), attr(1)]),
                Instruction::new(Opcode::Add, Dst::vgrf(1, RegType::F), &[attr(1), attr(0)]),
                out(1, 0),
                out(2, 1),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        let insts = s.instructions();
        let adds: Vec<_> = insts.iter().filter(|i| i.opcode == Opcode::Add).collect();
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].dst.nr, 2);
        assert_eq!(insts[1], Instruction::mov(Dst::vgrf(0, RegType::F), Src::vgrf(2, RegType::F)));
        assert_eq!(insts[2], Instruction::mov(Dst::vgrf(1, RegType::F), Src::vgrf(2, RegType::F)));
        assert_eq!(s.alloc.len(), 3);
    }

    #[test]
    fn clobbered_operand_invalidates() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(2, RegType::F), attr(0)),
                Instruction::new(Opcode::Mul, Dst::vgrf(0, RegType::F), &[Src::vgrf(2, RegType::F), attr(1)]),
                Instruction::mov(Dst::vgrf(2, RegType::F), attr(1)),
                Instruction::new(Opcode::Mul, Dst::vgrf(1, RegType::F), &[Src::vgrf(2, RegType::F), attr(1)]),
                out(1, 0),
                out(2, 1),
            ],
            3,
        );
        assert!(!run(&mut s).unwrap());
        assert_eq!(s.num_instructions(), 6);
    }

    #[test]
    fn different_flag_producer_invalidates() {
        let cmp = |nr, cmod| {
            Instruction::new(Opcode::Cmp, Dst::vgrf(nr, RegType::F), &[attr(0), attr(1)]).with_cmod(cmod)
        };
        let mut s = shader(vec![cmp(0, CondMod::L), cmp(2, CondMod::G), cmp(1, CondMod::L), out(1, 0), out(2, 1), out(3, 2)], 3);
        assert!(!run(&mut s).unwrap());
    }
}
