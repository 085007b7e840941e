// Indirect-access lowering. Any VGRF that is ever addressed through a reladdr is moved to
// scratch memory as a whole, and every uniform array addressed that way is moved to the
// pull-constant buffer. Each access to such storage becomes a message: reads load into a
// fresh single-unit temporary before the instruction, writes go to a temporary that is
// stored after it. An address chain is unrolled into an explicit list and resolved from the
// innermost level outwards, so a level's own address is already a plain register by the
// time the level itself is loaded.

//! Lowering of reladdr accesses to scratch and pull-constant messages.

use super::message;
use crate::core::error::{malformed, unsupported, CompileResult};
use crate::core::DeviceInfo;
use crate::ir::{Dst, Instruction, Opcode, RegFile, RegType, Src, VirtualGrfTable, REG_SIZE};
use crate::shader::Shader;

/// Longest address chain accepted. Deeper chains can only come from a
/// broken front end.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Bytes of one uniform slot in the pull-constant buffer.
const SLOT_SIZE: u32 = 16;

struct Lowering<'a> {
    devinfo: &'a DeviceInfo,
    alloc: &'a mut VirtualGrfTable,
    /// Scratch byte offset of every VGRF moved to scratch.
    scratch_loc: Vec<Option<u32>>,
    /// Pull-buffer byte offset of every uniform slot moved out of the push
    /// constants.
    pull_loc: Vec<Option<u32>>,
}

impl Lowering<'_> {
    fn is_lowered(&self, src: &Src) -> bool {
        match src.file {
            RegFile::Vgrf => self.scratch_loc.get(src.nr as usize).is_some_and(Option::is_some),
            RegFile::Uniform => self.pull_loc.get(uniform_slot(src) as usize).is_some_and(Option::is_some),
            _ => false,
        }
    }

    /// Byte address `reladdr << shift` in a fresh register.
    fn scaled_address(&mut self, reladdr: Src, shift: u32, before: &mut Vec<Instruction>) -> CompileResult<Src> {
        let ty = if reladdr.ty == RegType::UD { RegType::UD } else { RegType::D };
        let nr = self.alloc.allocate(1)?;
        before.push(Instruction::new(Opcode::Shl, Dst::vgrf(nr, ty), &[reladdr, Src::imm_ud(shift)]));
        Ok(Src::vgrf(nr, ty))
    }

    /// Load a lowered operand into a temporary. `src.reladdr` must already
    /// be a plain register.
    fn load(&mut self, src: Src, before: &mut Vec<Instruction>) -> CompileResult<Src> {
        let Src {
            file,
            nr,
            ty,
            swizzle,
            negate,
            abs,
            reladdr,
            ..
        } = src.clone();
        if ty.is_64bit() {
            return Err(unsupported("64-bit access to an indirectly addressed array", self.devinfo.name));
        }
        let tmp = self.alloc.allocate(1)?;
        let inst = match file {
            RegFile::Uniform => {
                let base = self.pull_loc[uniform_slot(&src) as usize].unwrap_or_default();
                let offset = match reladdr {
                    None => Src::imm_ud(base),
                    Some(r) => {
                        let scaled = self.scaled_address(*r, SLOT_SIZE.trailing_zeros(), before)?;
                        let sum = self.alloc.allocate(1)?;
                        before.push(Instruction::new(
                            Opcode::Add,
                            Dst::vgrf(sum, scaled.ty),
                            &[scaled.clone(), Src::imm_bits(base, scaled.ty)],
                        ));
                        Src::vgrf(sum, scaled.ty)
                    }
                };
                message(self.devinfo, Opcode::PullConstantLoad, Dst::vgrf(tmp, ty), &[offset], 1)
            }
            _ => {
                let base = self.scratch_loc[nr as usize].unwrap_or_default();
                let index = match reladdr {
                    None => Src::imm_ud(0),
                    Some(r) => self.scaled_address(*r, REG_SIZE.trailing_zeros(), before)?,
                };
                let mut read = message(self.devinfo, Opcode::ScratchRead, Dst::vgrf(tmp, ty), &[index], 1);
                read.offset = base + src.unit() * REG_SIZE;
                read
            }
        };
        log::trace!("indirect: {file:?} {nr} loaded through `{}` into vgrf{tmp}", inst.opcode);
        before.push(inst);
        Ok(Src {
            swizzle,
            negate,
            abs,
            ..Src::vgrf(tmp, ty)
        })
    }

    /// Resolve an operand and its address chain, innermost level first.
    fn resolve(&mut self, src: Src, before: &mut Vec<Instruction>) -> CompileResult<Src> {
        let mut chain = Vec::new();
        let mut cur = Some(src);
        while let Some(mut level) = cur {
            if chain.len() == MAX_CHAIN_DEPTH {
                return Err(malformed(format!("address chain deeper than {MAX_CHAIN_DEPTH} levels")));
            }
            cur = level.reladdr.take().map(|r| *r);
            chain.push(level);
        }

        let mut resolved: Option<Src> = None;
        while let Some(mut level) = chain.pop() {
            level.reladdr = resolved.take().map(Box::new);
            resolved = Some(if self.is_lowered(&level) {
                self.load(level, before)?
            } else {
                level
            });
        }
        resolved.ok_or_else(|| malformed("empty address chain"))
    }

    fn lower(&mut self, mut inst: Instruction, out: &mut Vec<Instruction>) -> CompileResult<()> {
        let mut before = Vec::new();
        for i in 0..inst.num_srcs() {
            if inst.src[i].is_unused() || inst.src[i].is_imm() {
                continue;
            }
            if self.is_lowered(&inst.src[i]) && inst.regs_read(i) > 1 {
                return Err(unsupported(
                    format!("multi-register read of an indirectly addressed array by `{}`", inst.opcode),
                    self.devinfo.name,
                ));
            }
            let src = std::mem::take(&mut inst.src[i]);
            inst.src[i] = self.resolve(src, &mut before)?;
        }

        if let Some(r) = inst.dst.reladdr.take() {
            inst.dst.reladdr = Some(Box::new(self.resolve(*r, &mut before)?));
        }

        let mut after = None;
        if inst.dst.file == RegFile::Vgrf && self.scratch_loc.get(inst.dst.nr as usize).is_some_and(Option::is_some) {
            if inst.regs_written() > 1 || inst.dst.ty.is_64bit() {
                return Err(unsupported(
                    format!("multi-register write to an indirectly addressed array by `{}`", inst.opcode),
                    self.devinfo.name,
                ));
            }
            let base = self.scratch_loc[inst.dst.nr as usize].unwrap_or_default();
            let index = match inst.dst.reladdr.take() {
                None => Src::imm_ud(0),
                Some(r) => self.scaled_address(*r, REG_SIZE.trailing_zeros(), &mut before)?,
            };
            let tmp = self.alloc.allocate(1)?;
            let ty = inst.dst.ty;
            let writemask = inst.dst.writemask;
            let offset = base + inst.dst.unit() * REG_SIZE;
            inst.dst = Dst::vgrf(tmp, ty).with_writemask(writemask);

            let mut write = message(
                self.devinfo,
                Opcode::ScratchWrite,
                Dst::null(ty).with_writemask(writemask),
                &[Src::vgrf(tmp, ty), index],
                2,
            );
            write.offset = offset;
            write.predicate = inst.predicate;
            write.predicate_inverse = inst.predicate_inverse;
            after = Some(write);
        }

        out.append(&mut before);
        out.push(inst);
        out.extend(after);
        Ok(())
    }
}

fn uniform_slot(src: &Src) -> u32 {
    src.nr + src.offset / SLOT_SIZE
}

/// Mark the storage behind every indirectly addressed level of `src`.
fn mark(shader: &Shader, src: &Src, scratch: &mut [bool], pulled: &mut [bool]) {
    let mut cur = Some(src);
    while let Some(s) = cur {
        if s.reladdr.is_some() {
            match s.file {
                RegFile::Vgrf if (s.nr as usize) < scratch.len() => scratch[s.nr as usize] = true,
                RegFile::Uniform => {
                    let array = shader.uniform_array_of(uniform_slot(s));
                    for slot in array.start..(array.start + array.len).min(pulled.len() as u32) {
                        pulled[slot as usize] = true;
                    }
                }
                _ => {}
            }
        }
        cur = s.reladdr.as_deref();
    }
}

/// Move every indirectly addressed array out of the register file.
pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let mut scratch = vec![false; shader.alloc.len()];
    let mut pulled = vec![false; shader.nr_uniforms as usize];
    for (_, inst) in shader.cfg.instructions() {
        for src in inst.srcs() {
            mark(shader, src, &mut scratch, &mut pulled);
        }
        if let Some(reladdr) = &inst.dst.reladdr {
            mark(shader, reladdr, &mut scratch, &mut pulled);
        }
        if inst.dst.reladdr.is_some() && inst.dst.file == RegFile::Vgrf {
            scratch[inst.dst.nr as usize] = true;
        }
    }
    if !scratch.contains(&true) && !pulled.contains(&true) {
        return Ok(false);
    }

    let mut scratch_loc = vec![None; scratch.len()];
    for (nr, _) in scratch.iter().enumerate().filter(|(_, s)| **s) {
        let offset = shader.reserve_scratch(shader.alloc.size(nr as u32));
        scratch_loc[nr] = Some(offset);
        log::debug!("vgrf{nr} moved to scratch at byte {offset}");
    }
    if shader.scratch_bytes > shader.devinfo.max_scratch_bytes {
        return Err(unsupported(
            format!("{} bytes of scratch memory", shader.scratch_bytes),
            shader.devinfo.name,
        ));
    }

    let mut pull_loc = vec![None; pulled.len()];
    for (slot, _) in pulled.iter().enumerate().filter(|(_, p)| **p) {
        pull_loc[slot] = Some(shader.pull_constant_bytes);
        shader.pull_constant_bytes += SLOT_SIZE;
        shader.push_constant_loc[slot] = None;
    }
    if pulled.contains(&true) {
        log::debug!("{} uniform slot(s) moved to the pull-constant buffer", pulled.iter().filter(|&&p| p).count());
    }

    let devinfo = shader.devinfo.clone();
    let mut lowering = Lowering {
        devinfo: &devinfo,
        alloc: &mut shader.alloc,
        scratch_loc,
        pull_loc,
    };
    for block in shader.cfg.blocks.iter_mut() {
        let insts = std::mem::take(&mut block.instructions);
        let mut out = Vec::with_capacity(insts.len());
        for inst in insts {
            lowering.lower(inst, &mut out)?;
        }
        block.instructions = out;
    }

    shader.invalidate_live();
    Ok(true)
}
