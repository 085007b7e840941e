// Dead-code elimination walks every block backwards starting from the block's live-out
// sets and tracks which lanes of each virtual register and of the flag register are still
// needed. A destination writemask is narrowed to the lanes read later; an instruction that
// still writes live flag lanes keeps them but loses its register destination; anything left
// with nothing live becomes a no-op and is removed. Instructions with side effects and
// writes to non-virtual files are never touched.

//! Dead-code elimination.

use crate::analysis::liveness::{visit_dst_vars, visit_reladdr_vars, visit_reg_vars, visit_src_vars};
use crate::core::error::CompileResult;
use crate::ir::{Dst, RegFile, WriteMask, NUM_LANES};
use crate::shader::Shader;

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let live_vars = shader.live();
    let devinfo = shader.devinfo.clone();
    let alloc = &shader.alloc;
    let mut progress = false;

    for (b, block) in shader.cfg.blocks.iter_mut().enumerate() {
        let mut live = live_vars.blocks[b].liveout.clone();
        let mut flag_live = live_vars.blocks[b].flag_liveout;

        for idx in (0..block.instructions.len()).rev() {
            let inst = &mut block.instructions[idx];
            let writes_vgrf = inst.dst.file == RegFile::Vgrf && inst.dst.reladdr.is_none();

            if writes_vgrf && !inst.has_side_effects() || inst.dst.is_null() && inst.writes_flag() {
                let mut result_live = WriteMask::NONE;
                if writes_vgrf {
                    for c in 0..NUM_LANES {
                        let mut lane_live = false;
                        visit_reg_vars(
                            alloc,
                            inst.dst.nr,
                            inst.dst.offset,
                            inst.size_written,
                            WriteMask::lane(c),
                            &mut |v| lane_live |= live.contains(v),
                        );
                        if lane_live {
                            result_live = result_live.union(WriteMask::lane(c));
                        }
                    }
                } else {
                    result_live = flag_live;
                }
                if !inst.can_do_writemask(&devinfo) && !result_live.is_empty() {
                    result_live = WriteMask::XYZW;
                }

                if inst.writes_flag() {
                    let flag_mask = inst.dst.writemask.intersect(flag_live);
                    let dest_mask = inst.dst.writemask.intersect(result_live);
                    let writemask = flag_mask.union(dest_mask);
                    if inst.dst.writemask != writemask {
                        inst.dst.writemask = writemask;
                        progress = true;
                    }
                    if writes_vgrf && dest_mask.is_empty() {
                        log::trace!("dce: dropping dead result of {}", inst.opcode);
                        inst.dst = Dst::null(inst.dst.ty).with_writemask(flag_mask);
                        progress = true;
                    }
                } else {
                    let writemask = inst.dst.writemask.intersect(result_live);
                    if writemask != inst.dst.writemask {
                        progress = true;
                        if writemask.is_empty() {
                            if inst.writes_accumulator {
                                inst.dst = Dst::null(inst.dst.ty);
                            } else {
                                log::trace!("dce: removing dead {}", inst.opcode);
                                inst.make_nop();
                            }
                        } else {
                            inst.dst.writemask = writemask;
                        }
                    }
                }
            }

            if inst.dst.is_null() && inst.writes_flag() && inst.dst.writemask.intersect(flag_live).is_empty() {
                log::trace!("dce: removing dead flag write by {}", inst.opcode);
                inst.make_nop();
                progress = true;
            }

            if inst.is_nop() {
                block.instructions.remove(idx);
                progress = true;
                continue;
            }

            let mut written = Vec::new();
            if visit_dst_vars(alloc, inst, |v| written.push(v)) {
                for v in written {
                    live.remove(v);
                }
            }
            if inst.writes_flag() && !inst.is_predicated() {
                flag_live = flag_live.without(inst.flag_lanes_written());
            }

            for i in 0..inst.num_srcs() {
                visit_src_vars(alloc, inst, i, |v| live.insert(v));
            }
            if let Some(reladdr) = &inst.dst.reladdr {
                visit_reladdr_vars(alloc, reladdr, &mut |v| live.insert(v));
            }
            flag_live = flag_live.union(inst.flag_lanes_read());
        }
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
    use crate::ir::{CondMod, Instruction, Opcode, Predicate, Program, RegType, Src};

    fn shader(insts: Vec<Instruction>, vgrfs: u32) -> Shader {
        let mut program = Program::new();
        for _ in 0..vgrfs {
            program.alloc.allocate(1).unwrap();
        }
        program.instructions = insts;
        Shader::new(DeviceInfo::default(), program).unwrap()
    }

    fn out(src: Src) -> Instruction {
        Instruction::mov(Dst::reg(RegFile::Mrf, 1, RegType::F), src)
    }

    #[test]
    fn narrows_writemask_to_read_lanes() {
        let mut s = shader(
            vec![
                Instruction::new(Opcode::Add, Dst::vgrf(0, RegType::F), &[Src::imm_f(1.0), Src::imm_f(2.0)]),
                out(Src::vgrf(0, RegType::F).with_swizzle(crate::ir::Swizzle::YYYY)),
            ],
            1,
        );
        assert!(run(&mut s).unwrap());
        assert_eq!(s.cfg.blocks[0].instructions[0].dst.writemask, WriteMask::Y);
        assert!(!run(&mut s).unwrap());
    }

    #[test]
    fn keeps_live_flag_drops_dead_result() {
        let mut s = shader(
            vec![
                Instruction::new(Opcode::Cmp, Dst::vgrf(0, RegType::F), &[Src::imm_f(1.0), Src::imm_f(2.0)])
                    .with_cmod(CondMod::Ge),
                Instruction::mov(Dst::reg(RegFile::Mrf, 1, RegType::F), Src::imm_f(0.0))
                    .with_predicate(Predicate::Normal),
            ],
            1,
        );
        assert!(run(&mut s).unwrap());
        let cmp = &s.cfg.blocks[0].instructions[0];
        assert!(cmp.dst.is_null());
        assert_eq!(cmp.dst.writemask, WriteMask::XYZW);
        assert_eq!(cmp.cmod, CondMod::Ge);
    }

    #[test]
    fn removes_dead_chain_in_one_run() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), Src::imm_f(1.0)),
                Instruction::new(Opcode::Mul, Dst::vgrf(1, RegType::F), &[Src::vgrf(0, RegType::F), Src::imm_f(2.0)]),
                Instruction::bare(Opcode::UrbWrite),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        assert_eq!(s.num_instructions(), 1);
    }
}
