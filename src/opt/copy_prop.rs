// Copy and constant propagation. Walking the program in order, the pass remembers for
// every lane of every virtual register unit the operand it was last copied from by an
// unpredicated MOV. A later read whose lanes all come from the same origin is rewritten to
// read the origin directly, or, when every lane holds a constant, to an immediate in a
// source slot the instruction can encode. The table is reset at every instruction that is
// not dominated by its predecessor (DO, WHILE, ELSE, ENDIF) and entries are dropped when
// either side of the copy is overwritten.

//! Copy and constant propagation.

use hashbrown::HashMap;

use crate::core::error::CompileResult;
use crate::core::DeviceInfo;
use crate::ir::{
    f32_to_vf, vf_to_f32, CondMod, Instruction, Opcode, RegFile, RegType, Src, Swizzle, WriteMask, NUM_LANES,
    REG_SIZE,
};
use crate::shader::Shader;

/// What each lane of one register unit was last copied from.
#[derive(Debug, Clone, Default)]
struct CopyEntry {
    value: [Option<Src>; NUM_LANES],
    saturate: WriteMask,
}

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let devinfo = shader.devinfo.clone();
    let alloc = &shader.alloc;
    let mut entries: HashMap<u32, CopyEntry> = HashMap::new();
    let mut progress = false;

    for inst in shader.cfg.instructions_mut() {
        if matches!(inst.opcode, Opcode::Do | Opcode::While | Opcode::Else | Opcode::Endif) {
            entries.clear();
            continue;
        }

        for arg in (0..inst.num_srcs()).rev() {
            let src = &inst.src[arg];
            if src.file != RegFile::Vgrf || src.reladdr.is_some() {
                continue;
            }
            if inst.size_read(arg) != REG_SIZE || src.offset % REG_SIZE != 0 {
                continue;
            }
            let unit = alloc.offset(src.nr) + src.unit();
            let Some(entry) = entries.get(&unit) else {
                continue;
            };
            let readmask = inst.lanes_read(arg);
            if readmask.is_empty() || !entry.saturate.intersect(readmask).is_empty() {
                continue;
            }
            if try_constant_propagate(&devinfo, inst, arg, entry, readmask)
                || try_copy_propagate(&devinfo, inst, arg, entry, readmask)
            {
                log::trace!("copy propagation into {} src{arg}", inst.opcode);
                progress = true;
            }
        }

        if inst.dst.file != RegFile::Vgrf {
            continue;
        }
        if inst.dst.reladdr.is_some() {
            entries.clear();
            continue;
        }
        let first_unit = alloc.offset(inst.dst.nr) + inst.dst.unit();
        let direct = is_direct_copy(inst);
        for u in 0..inst.regs_written().max(1) {
            let entry = entries.entry(first_unit + u).or_default();
            entry.saturate = entry.saturate.without(inst.dst.writemask);
            for c in inst.dst.writemask.lanes() {
                entry.value[c] = if direct && u == 0 {
                    Some(inst.src[0].clone())
                } else {
                    None
                };
                if direct && u == 0 && inst.saturate {
                    entry.saturate = entry.saturate.union(WriteMask::lane(c));
                }
            }
        }
        // Copies whose origin was just overwritten are stale.
        let dst_region = inst.dst.region(inst.size_written.max(REG_SIZE));
        for entry in entries.values_mut() {
            for c in 0..NUM_LANES {
                let stale = entry.value[c].as_ref().is_some_and(|v| {
                    v.file == RegFile::Vgrf
                        && v.region(REG_SIZE).overlaps(&dst_region)
                        && (inst.dst.offset != v.offset || inst.dst.writemask.contains(v.swizzle.get(c)))
                });
                if stale {
                    entry.value[c] = None;
                    entry.saturate = entry.saturate.without(WriteMask::lane(c));
                }
            }
        }
    }

    if progress {
        shader.invalidate_live();
    }
    Ok(progress)
}

fn is_direct_copy(inst: &Instruction) -> bool {
    inst.opcode == Opcode::Mov
        && !inst.is_predicated()
        && inst.dst.file == RegFile::Vgrf
        && inst.dst.offset % REG_SIZE == 0
        && inst.dst.reladdr.is_none()
        && inst.src[0].reladdr.is_none()
        && (inst.dst.ty == inst.src[0].ty || inst.dst.ty == RegType::F && inst.src[0].ty == RegType::VF)
        && inst.size_written <= REG_SIZE
}

/// Constant held by channel `c` of an immediate copy origin.
fn lane_constant(imm: &Src, c: usize) -> (u32, RegType) {
    if imm.ty == RegType::VF {
        (vf_to_f32(imm.imm.to_le_bytes()[c]).to_bits(), RegType::F)
    } else {
        (imm.imm, imm.ty)
    }
}

/// The single operand every lane in `readmask` was copied from, expressed
/// in the channel space of the copied register. Differing float constants
/// combine into a vector-float immediate.
fn get_copy_value(entry: &CopyEntry, readmask: WriteMask) -> Option<Src> {
    let mut swz = [0u8; NUM_LANES];
    let mut value: Option<Src> = None;
    let mut constants: [Option<(u32, RegType)>; NUM_LANES] = [None; NUM_LANES];

    for c in readmask.lanes() {
        let mut src = entry.value[c].clone()?;
        if src.is_imm() {
            constants[c] = Some(lane_constant(&src, c));
            continue;
        }
        swz[c] = src.swizzle.get(c) as u8;
        src.swizzle = Swizzle::XYZW;
        match &value {
            None => value = Some(src),
            Some(v) if *v == src => {}
            Some(_) => return None,
        }
    }

    let read: Vec<(u32, RegType)> = readmask.lanes().filter_map(|c| constants[c]).collect();
    if !read.is_empty() {
        if value.is_some() || read.len() != readmask.count() as usize {
            return None;
        }
        let (bits, ty) = read[0];
        if read.iter().all(|&k| k == (bits, ty)) {
            return Some(Src::imm_bits(bits, ty));
        }
        if read.iter().any(|&(_, ty)| ty != RegType::F) {
            return None;
        }
        let fill = readmask.lanes().next().unwrap_or(0);
        let mut bytes = [0u8; NUM_LANES];
        for (c, byte) in bytes.iter_mut().enumerate() {
            let lane = if readmask.contains(c) { c } else { fill };
            let (bits, _) = constants[lane]?;
            *byte = f32_to_vf(f32::from_bits(bits))?;
        }
        return Some(Src::imm_vf(bytes));
    }

    let value = value?;
    let composed = Swizzle::for_mask(readmask).compose(Swizzle::from_lanes(swz));
    Some(value.with_swizzle(composed))
}

fn try_constant_propagate(
    devinfo: &DeviceInfo,
    inst: &mut Instruction,
    arg: usize,
    entry: &CopyEntry,
    readmask: WriteMask,
) -> bool {
    let Some(mut value) = get_copy_value(entry, readmask) else {
        return false;
    };
    if !value.is_imm() {
        return false;
    }
    let src = &inst.src[arg];
    if value.ty.is_64bit() || src.ty.is_64bit() {
        return false;
    }
    if value.ty == RegType::VF {
        if src.ty != RegType::F || inst.opcode != Opcode::Mov {
            return false;
        }
        let bytes = value.imm.to_le_bytes();
        let mut permuted = [0u8; NUM_LANES];
        for (l, slot) in permuted.iter_mut().enumerate() {
            *slot = bytes[src.swizzle.get(l)];
        }
        value.imm = u32::from_le_bytes(permuted);
    } else {
        value.ty = src.ty;
    }
    value.abs = src.abs;
    value.negate = src.negate;
    let Some(value) = value.fold_imm_modifiers() else {
        return false;
    };

    match inst.opcode {
        Opcode::Mov | Opcode::Broadcast => {
            inst.src[arg] = value;
            true
        }
        op if op.is_math() => {
            if devinfo.math_supports_imm && arg == 1 {
                inst.src[arg] = value;
                return true;
            }
            false
        }
        Opcode::Dp2 | Opcode::Dp3 | Opcode::Dp4 | Opcode::Dph | Opcode::Shl | Opcode::Shr | Opcode::Asr => {
            if arg == 1 {
                inst.src[arg] = value;
                return true;
            }
            false
        }
        Opcode::Mul | Opcode::Add | Opcode::Or | Opcode::And | Opcode::Xor => {
            if arg == 1 {
                inst.src[1] = value;
                return true;
            }
            if inst.src[1].is_imm() {
                return false;
            }
            // 32-bit integer multiplies are asymmetric.
            if inst.opcode == Opcode::Mul && matches!(inst.src[1].ty, RegType::D | RegType::UD) {
                return false;
            }
            inst.src[0] = std::mem::replace(&mut inst.src[1], value);
            true
        }
        Opcode::Cmp => {
            if arg == 1 {
                inst.src[1] = value;
                return true;
            }
            if inst.src[1].is_imm() || inst.cmod == CondMod::None {
                return false;
            }
            inst.src[0] = std::mem::replace(&mut inst.src[1], value);
            inst.cmod = inst.cmod.swapped();
            true
        }
        Opcode::Sel => {
            if arg == 1 {
                inst.src[1] = value;
                return true;
            }
            if inst.src[1].is_imm() {
                return false;
            }
            inst.src[0] = std::mem::replace(&mut inst.src[1], value);
            if inst.cmod == CondMod::None {
                inst.predicate_inverse = !inst.predicate_inverse;
            }
            true
        }
        op if op.is_3src() && devinfo.three_src_imm => {
            inst.src[arg] = value;
            true
        }
        _ => false,
    }
}

fn try_copy_propagate(
    devinfo: &DeviceInfo,
    inst: &mut Instruction,
    arg: usize,
    entry: &CopyEntry,
    readmask: WriteMask,
) -> bool {
    let Some(mut value) = get_copy_value(entry, readmask) else {
        return false;
    };
    if !matches!(value.file, RegFile::Uniform | RegFile::Vgrf | RegFile::Attr) {
        return false;
    }
    let src = &inst.src[arg];
    if inst.size_written > REG_SIZE && value.is_uniform() {
        return false;
    }
    if inst.exec_size == 4 && value.file == RegFile::Uniform && value.ty.size() == 4 {
        return false;
    }
    if value.ty.size() != src.ty.size() || value.offset % REG_SIZE != 0 {
        return false;
    }
    let has_source_mods = value.has_source_mods();
    if has_source_mods && (!inst.can_do_source_mods(devinfo) || value.ty != src.ty) {
        return false;
    }
    if inst.opcode.is_send() {
        return false;
    }
    if (value.file == RegFile::Uniform || !value.swizzle.is_identity())
        && inst.opcode.is_math()
        && !devinfo.math_align16
    {
        return false;
    }
    let composed = src.swizzle.compose(value.swizzle);
    let single_value = composed.lanes().iter().all(|&c| c == composed.get(0) as u8);
    if inst.is_3src() && matches!(value.file, RegFile::Uniform | RegFile::Attr) && !single_value {
        return false;
    }
    if value.negate && value.ty == RegType::UD {
        return false;
    }

    if src.abs {
        value.negate = false;
        value.abs = true;
    }
    if src.negate {
        value.negate = !value.negate;
    }
    value.swizzle = composed;
    value.ty = src.ty;
    if value == *src {
        return false;
    }
    inst.src[arg] = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Dst, Program};

    fn shader(insts: Vec<Instruction>, vgrfs: u32) -> Shader {
        let mut program = Program::new();
        for _ in 0..vgrfs {
            program.alloc.allocate(1).unwrap();
        }
        program.nr_attributes = 2;
        program.instructions = insts;
        Shader::new(DeviceInfo::gen7(), program).unwrap()
    }

    fn f(nr: u32) -> Src {
        Src::vgrf(nr, RegType::F)
    }

    fn attr(nr: u32) -> Src {
        Src::reg(RegFile::Attr, nr, RegType::F)
    }

    fn inst(s: &Shader, i: usize) -> Instruction {
        s.instructions()[i].clone()
    }

    #[test]
    fn propagates_swizzled_copy() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), attr(1).with_swizzle(Swizzle::new(3, 2, 1, 0))),
                Instruction::new(Opcode::Add, Dst::vgrf(1, RegType::F), &[f(0).with_swizzle(Swizzle::XXXX), f(0)]),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        let add = inst(&s, 1);
        assert_eq!(add.src[0], attr(1).with_swizzle(Swizzle::WWWW));
        assert_eq!(add.src[1], attr(1).with_swizzle(Swizzle::new(3, 2, 1, 0)));
        assert!(!run(&mut s).unwrap());
    }

    #[test]
    fn constant_moves_to_second_slot() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), Src::imm_f(2.0)),
                Instruction::new(Opcode::Add, Dst::vgrf(1, RegType::F), &[f(0), attr(0)]),
                Instruction::new(Opcode::Cmp, Dst::null(RegType::F), &[f(0), attr(0)]).with_cmod(CondMod::L),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        let add = inst(&s, 1);
        assert_eq!(add.src[0], attr(0));
        assert_eq!(add.src[1].imm_as_f32(), Some(2.0));
        let cmp = inst(&s, 2);
        assert_eq!(cmp.src[0], attr(0));
        assert_eq!(cmp.cmod, CondMod::G);
    }

    #[test]
    fn negated_constant_is_folded() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), Src::imm_f(2.0)),
                Instruction::mov(Dst::vgrf(1, RegType::F), f(0).negated()),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        let mov = inst(&s, 1);
        assert_eq!(mov.src[0].imm_as_f32(), Some(-2.0));
        assert!(!mov.src[0].negate);
    }

    #[test]
    fn differing_float_lanes_become_vector_float() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F).with_writemask(WriteMask::XY), Src::imm_f(1.0)),
                Instruction::mov(Dst::vgrf(0, RegType::F).with_writemask(WriteMask::new(0b1100)), Src::imm_f(0.5)),
                Instruction::mov(Dst::vgrf(1, RegType::F), f(0)),
            ],
            2,
        );
        assert!(run(&mut s).unwrap());
        let mov = inst(&s, 2);
        assert_eq!(mov.src[0].ty, RegType::VF);
        let lanes = mov.src[0].imm.to_le_bytes().map(vf_to_f32);
        assert_eq!(lanes, [1.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn no_constant_into_math_or_three_source() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), Src::imm_f(2.0)),
                Instruction::new(Opcode::Pow, Dst::vgrf(1, RegType::F), &[attr(0), f(0)]),
                Instruction::new(Opcode::Mad, Dst::vgrf(1, RegType::F), &[attr(0), attr(1), f(0)]),
            ],
            2,
        );
        assert!(!run(&mut s).unwrap());

        let mut gen8 = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), Src::imm_f(2.0)),
                Instruction::new(Opcode::Pow, Dst::vgrf(1, RegType::F), &[attr(0), f(0)]),
            ],
            2,
        );
        gen8.devinfo = DeviceInfo::gen8();
        assert!(run(&mut gen8).unwrap());
    }

    #[test]
    fn overwritten_origin_blocks_propagation() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), f(2)),
                Instruction::mov(Dst::vgrf(2, RegType::F), attr(0)),
                Instruction::mov(Dst::vgrf(1, RegType::F), f(0)),
            ],
            3,
        );
        run(&mut s).unwrap();
        assert_eq!(inst(&s, 2).src[0], f(0));
    }

    #[test]
    fn control_flow_join_resets_table() {
        let mut s = shader(
            vec![
                Instruction::mov(Dst::vgrf(0, RegType::F), attr(0)),
                Instruction::bare(Opcode::If).with_predicate(crate::ir::Predicate::Normal),
                Instruction::mov(Dst::vgrf(0, RegType::F), attr(1)),
                Instruction::bare(Opcode::Endif),
                Instruction::mov(Dst::vgrf(1, RegType::F), f(0)),
            ],
            2,
        );
        assert!(!run(&mut s).unwrap());
    }
}
