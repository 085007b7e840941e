//! Spill costs and the rewrite of a spilled register to scratch memory.

use crate::core::error::CompileResult;
use crate::core::DeviceInfo;
use crate::ir::{Dst, Instruction, Opcode, RegFile, Src, REG_SIZE};
use crate::lower::message;
use crate::shader::Shader;

/// A scratch message built after payload setup, so its message base is
/// already on the emulated MRFs when the device has none.
fn spill_message(devinfo: &DeviceInfo, opcode: Opcode, dst: Dst, srcs: &[Src], mlen: u32) -> Instruction {
    let mut inst = message(devinfo, opcode, dst, srcs, mlen);
    if !devinfo.has_mrf {
        inst.base_mrf = inst.base_mrf.map(|base| base + devinfo.mrf_hack_start);
    }
    inst
}

/// Per-VGRF spill cost, `None` for registers that must not be spilled.
///
/// Every read and write costs one unit, scaled by ten per enclosing loop.
pub fn spill_costs(shader: &Shader) -> Vec<Option<f32>> {
    let mut costs: Vec<Option<f32>> = vec![Some(0.0); shader.alloc.len()];
    for (nr, size) in shader.alloc.iter() {
        if size > 2 {
            costs[nr as usize] = None;
        }
    }

    for block in &shader.cfg.blocks {
        let scale = 10f32.powi(block.loop_depth as i32);
        for inst in &block.instructions {
            let scratch = inst.opcode.is_scratch();
            for i in 0..inst.num_srcs() {
                let src = &inst.src[i];
                if src.file != RegFile::Vgrf {
                    continue;
                }
                let Some(cost) = costs.get_mut(src.nr as usize) else {
                    continue;
                };
                if src.reladdr.is_some() || src.offset >= REG_SIZE || scratch {
                    *cost = None;
                } else if let Some(c) = cost {
                    *c += scale;
                }
            }
            let dst = &inst.dst;
            if dst.file != RegFile::Vgrf {
                continue;
            }
            let Some(cost) = costs.get_mut(dst.nr as usize) else {
                continue;
            };
            let partial_64bit = dst.ty.is_64bit()
                && (!dst.writemask.is_full() || inst.size_written < shader.alloc.size(dst.nr) * REG_SIZE);
            if dst.reladdr.is_some() || dst.offset >= REG_SIZE || scratch || partial_64bit {
                *cost = None;
            } else if let Some(c) = cost {
                *c += scale;
            }
        }
    }
    costs
}

/// Rewrite every access of `spill_reg` to go through scratch memory.
/// Reads load into a fresh temporary; consecutive reading instructions in
/// a block share one load. Writes go to a fresh temporary that is stored
/// right after. The caller checks that the scratch space fits the device.
pub fn spill_reg(shader: &mut Shader, spill_reg: u32) -> CompileResult<()> {
    let size = shader.alloc.size(spill_reg);
    let offset = shader.reserve_scratch(size);
    let devinfo = shader.devinfo.clone();
    let mut loads = 0;
    let mut stores = 0;

    for b in 0..shader.cfg.blocks.len() {
        let insts = std::mem::take(&mut shader.cfg.blocks[b].instructions);
        let mut out = Vec::with_capacity(insts.len() + 4);
        // Temporary holding the last load, while consecutive instructions
        // keep reading the spilled register.
        let mut cached: Option<u32> = None;

        for mut inst in insts {
            let reads = (0..inst.num_srcs()).any(|i| inst.src[i].file == RegFile::Vgrf && inst.src[i].nr == spill_reg);
            if !reads {
                cached = None;
            }
            for i in 0..inst.num_srcs() {
                let src = &inst.src[i];
                if src.file != RegFile::Vgrf || src.nr != spill_reg {
                    continue;
                }
                let ty = src.ty;
                let tmp = match cached {
                    Some(tmp) => tmp,
                    None => {
                        let tmp = shader.alloc.allocate(size)?;
                        let mut read = spill_message(&devinfo, Opcode::ScratchRead, Dst::vgrf(tmp, ty), &[Src::imm_ud(0)], 1);
                        read.offset = offset;
                        read.size_written = size * REG_SIZE;
                        out.push(read);
                        loads += 1;
                        cached = Some(tmp);
                        tmp
                    }
                };
                inst.src[i].nr = tmp;
            }

            if inst.dst.file == RegFile::Vgrf && inst.dst.nr == spill_reg {
                let tmp = shader.alloc.allocate(size)?;
                let ty = inst.dst.ty;
                let writemask = inst.dst.writemask;
                inst.dst.nr = tmp;
                let mut value = Src::vgrf(tmp, ty);
                value.offset = inst.dst.offset;
                let mut write = spill_message(
                    &devinfo,
                    Opcode::ScratchWrite,
                    Dst::null(ty).with_writemask(writemask),
                    &[value, Src::imm_ud(0)],
                    1 + size,
                );
                write.offset = offset + inst.dst.offset;
                write.predicate = inst.predicate;
                write.predicate_inverse = inst.predicate_inverse;
                write.exec_size = inst.exec_size;
                write.group = inst.group;
                out.push(inst);
                out.push(write);
                stores += 1;
                // The new value lives in scratch now; the old load is stale.
                cached = None;
                continue;
            }
            out.push(inst);
        }
        shader.cfg.blocks[b].instructions = out;
    }

    log::debug!("spilled vgrf{spill_reg} to scratch byte {offset}: {loads} load(s), {stores} store(s)");
    shader.invalidate_live();
    Ok(())
}
