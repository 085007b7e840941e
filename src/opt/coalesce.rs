// Register coalescing. A plain `mov dst, tmp` whose source dies at the move is removed by
// walking backwards to the instructions that wrote `tmp` and retargeting them at `dst`,
// permuting their lanes by the move's swizzle. The walk stops as soon as every lane the move
// reads has an unconditional writer; anything in between that reads `tmp`, reads or writes
// the same lanes of `dst`, or cannot take the new swizzle and writemask aborts the rewrite.

//! Register coalescing.

use crate::analysis::{var_index, VARS_PER_UNIT};
use crate::core::error::CompileResult;
use crate::core::DeviceInfo;
use crate::ir::{CondMod, Instruction, Opcode, RegFile};
use crate::shader::Shader;

fn is_coalescable_mov(inst: &Instruction) -> bool {
    let src = &inst.src[0];
    inst.opcode == Opcode::Mov
        && matches!(inst.dst.file, RegFile::Vgrf | RegFile::Mrf)
        && inst.dst.reladdr.is_none()
        && !inst.is_predicated()
        && inst.cmod == CondMod::None
        && src.file == RegFile::Vgrf
        && inst.dst.ty == src.ty
        && !src.has_source_mods()
        && src.reladdr.is_none()
}

/// A `mov` that copies every written lane onto itself.
fn is_nop_mov(inst: &Instruction) -> bool {
    let src = &inst.src[0];
    inst.dst.file == src.file
        && inst.dst.nr == src.nr
        && inst.dst.offset == src.offset
        && !inst.saturate
        && inst.dst.writemask.lanes().all(|c| src.swizzle.get(c) == c)
}

/// Index of the earliest instruction the move at `idx` can be folded into,
/// if every instruction between them allows it.
fn find_writers(devinfo: &DeviceInfo, insts: &[Instruction], idx: usize) -> Option<usize> {
    let inst = &insts[idx];
    let src = &inst.src[0];
    let to_mrf = inst.dst.file == RegFile::Mrf;
    let src_region = src.region(inst.size_read(0));
    let dst_region = inst.dst.region(inst.size_written);
    let chans_needed = src.swizzle.apply_inv_to_mask(inst.dst.writemask);
    let mut chans_remaining = chans_needed;

    for j in (0..idx).rev() {
        let scan = &insts[j];

        if src_region.overlaps(&scan.dst.region(scan.size_written)) {
            if to_mrf && (scan.mlen > 0 || scan.opcode.is_send()) {
                return None;
            }
            if to_mrf && devinfo.has_mrf && scan.opcode.is_math() {
                return None;
            }
            if inst.saturate
                && inst.dst.ty != scan.dst.ty
                && !(scan.opcode == Opcode::Mov && scan.dst.ty == scan.src[0].ty)
            {
                return None;
            }
            if scan.dst.ty.size() != src.ty.size() || scan.dst.reladdr.is_some() {
                return None;
            }
            if !scan.can_reswizzle(devinfo, inst.dst.writemask, src.swizzle, chans_needed) {
                return None;
            }
            if scan.size_written / scan.dst.ty.size().max(1) > 8 || scan.dst.offset != src.offset {
                return None;
            }
            // The writer will read its sources after writing `dst`.
            let reads_dst = (0..scan.num_srcs())
                .any(|i| dst_region.overlaps(&scan.src[i].region(scan.size_read(i))));
            if reads_dst && (!scan.opcode.dst_src_alias_safe() || scan.has_source_destination_hazard()) {
                return None;
            }
            if !scan.is_predicated() {
                chans_remaining = chans_remaining.without(scan.dst.writemask);
            }
            if chans_remaining.is_empty() {
                return Some(j);
            }
        }

        if (0..scan.num_srcs()).any(|i| src_region.overlaps(&scan.src[i].region(scan.size_read(i)))) {
            return None;
        }
        if dst_region.overlaps(&scan.dst.region(scan.size_written))
            && !inst.dst.writemask.intersect(scan.dst.writemask).is_empty()
        {
            return None;
        }
        if let (true, Some(start)) = (to_mrf && scan.mlen > 0, scan.base_mrf) {
            if (start..start + scan.mlen).contains(&inst.dst.nr) {
                return None;
            }
        } else if (0..scan.num_srcs()).any(|i| dst_region.overlaps(&scan.src[i].region(scan.size_read(i)))) {
            return None;
        }
    }
    None
}

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let live = shader.live();
    let devinfo = shader.devinfo.clone();
    let alloc = &shader.alloc;
    let mut progress = false;

    for block in shader.cfg.blocks.iter_mut() {
        let start_ip = block.start_ip;
        let mut removed = 0;
        let mut idx = 0;
        while idx < block.instructions.len() {
            let ip = start_ip + idx + removed;
            let inst = &block.instructions[idx];
            if !is_coalescable_mov(inst) {
                idx += 1;
                continue;
            }
            if is_nop_mov(inst) {
                log::trace!("coalesce: removing no-op mov at ip {ip}");
                block.instructions.remove(idx);
                removed += 1;
                progress = true;
                continue;
            }

            // Someone else still reads the temporary.
            let src = &inst.src[0];
            let v = var_index(alloc, src.nr, src.unit(), 0, 0);
            if live.var_range_end(v, VARS_PER_UNIT) > ip {
                idx += 1;
                continue;
            }

            let Some(first) = find_writers(&devinfo, &block.instructions, idx) else {
                idx += 1;
                continue;
            };

            let mov = block.instructions.remove(idx);
            removed += 1;
            let src = &mov.src[0];
            for scan in &mut block.instructions[first..idx] {
                if scan.dst.file != RegFile::Vgrf || scan.dst.nr != src.nr || scan.dst.offset != src.offset {
                    continue;
                }
                scan.reswizzle(mov.dst.writemask, src.swizzle);
                scan.dst.file = mov.dst.file;
                scan.dst.nr = mov.dst.nr;
                scan.dst.offset = mov.dst.offset;
                if mov.saturate && mov.dst.ty != scan.dst.ty {
                    scan.dst.ty = mov.dst.ty;
                    scan.src[0].ty = src.ty;
                }
                scan.saturate |= mov.saturate;
            }
            log::trace!("coalesce: folded mov at ip {ip} into {} writer(s)", idx - first);
            progress = true;
        }
    }

    if progress {
        shader.invalidate_live();
    }
    Ok(progress)
}
