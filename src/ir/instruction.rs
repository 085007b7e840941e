//! A single vec4 instruction and the queries passes ask of it.

use super::opcode::{CondMod, OpKind, Opcode, Predicate};
use super::operand::{Dst, RegFile, Src};
use super::types::{RegType, Swizzle, WriteMask, NUM_LANES};
use super::REG_SIZE;
use crate::core::DeviceInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dst: Dst,
    pub src: [Src; 3],
    pub predicate: Predicate,
    pub predicate_inverse: bool,
    pub cmod: CondMod,
    /// Channels executed: 8 for SIMD4x2, 4 for a single vec4 half.
    pub exec_size: u8,
    /// First channel of the execution group (0 or 4).
    pub group: u8,
    pub saturate: bool,
    pub force_writemask_all: bool,
    pub no_dd_check: bool,
    pub no_dd_clear: bool,
    pub writes_accumulator: bool,
    /// Message length in registers (send instructions only).
    pub mlen: u32,
    /// First MRF of the message payload, when the payload lives in MRFs.
    pub base_mrf: Option<u32>,
    pub header_size: u32,
    /// Scratch or constant-buffer byte offset carried by the message.
    pub offset: u32,
    /// Bytes written to the destination.
    pub size_written: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, dst: Dst, srcs: &[Src]) -> Self {
        let mut src = [Src::unused(), Src::unused(), Src::unused()];
        for (slot, s) in src.iter_mut().zip(srcs) {
            *slot = s.clone();
        }
        let size_written = if dst.is_null() {
            0
        } else {
            dst.ty.size().max(4) * 8
        };
        Instruction {
            opcode,
            dst,
            src,
            predicate: Predicate::None,
            predicate_inverse: false,
            cmod: CondMod::None,
            exec_size: 8,
            group: 0,
            saturate: false,
            force_writemask_all: false,
            no_dd_check: false,
            no_dd_clear: false,
            writes_accumulator: false,
            mlen: 0,
            base_mrf: None,
            header_size: 0,
            offset: 0,
            size_written,
        }
    }

    /// A control-flow pseudo-op or other instruction without operands.
    pub fn bare(opcode: Opcode) -> Self {
        Instruction::new(opcode, Dst::null(RegType::UD), &[])
    }

    pub fn mov(dst: Dst, src: Src) -> Self {
        Instruction::new(Opcode::Mov, dst, &[src])
    }

    pub fn with_cmod(mut self, cmod: CondMod) -> Self {
        self.cmod = cmod;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn num_srcs(&self) -> usize {
        self.opcode.num_srcs()
    }

    pub fn srcs(&self) -> impl Iterator<Item = &Src> {
        self.src[..self.num_srcs()].iter()
    }

    pub fn is_nop(&self) -> bool {
        self.opcode == Opcode::Nop
    }

    pub fn is_3src(&self) -> bool {
        self.opcode.is_3src()
    }

    pub fn is_predicated(&self) -> bool {
        self.predicate != Predicate::None
    }

    /// Turn the instruction into a no-op in place.
    pub fn make_nop(&mut self) {
        *self = Instruction::bare(Opcode::Nop);
    }

    /// Number of register units touched by the destination.
    pub fn regs_written(&self) -> u32 {
        let start = self.dst.offset % REG_SIZE;
        (start + self.size_written).div_ceil(REG_SIZE)
    }

    /// Bytes read through source `i`.
    pub fn size_read(&self, i: usize) -> u32 {
        let src = &self.src[i];
        if src.is_unused() {
            return 0;
        }
        // A scratch write carries its header and value separately; the value
        // is one register.
        if i == 0 && self.opcode.is_send() && self.mlen > 0 && self.opcode != Opcode::ScratchWrite {
            return self.mlen * REG_SIZE;
        }
        match src.file {
            RegFile::Imm | RegFile::Uniform => src.ty.size() * NUM_LANES as u32,
            _ => src.ty.size() * u32::from(self.exec_size),
        }
    }

    /// Register units read through source `i`.
    pub fn regs_read(&self, i: usize) -> u32 {
        let src = &self.src[i];
        if src.is_unused() || src.is_imm() {
            return 0;
        }
        let start = src.offset % REG_SIZE;
        (start + self.size_read(i)).div_ceil(REG_SIZE)
    }

    /// Lanes the instruction executes. A null destination keeps a writemask
    /// so that the flag lanes it writes stay explicit.
    fn lanes_computed(&self) -> WriteMask {
        self.dst.writemask
    }

    /// Channels of source `i` the instruction actually reads.
    pub fn lanes_read(&self, i: usize) -> WriteMask {
        let src = &self.src[i];
        if src.is_unused() || src.is_imm() {
            return WriteMask::NONE;
        }
        if self.opcode.is_send() || self.opcode == Opcode::Broadcast {
            return WriteMask::XYZW;
        }
        let lanes = match self.opcode {
            Opcode::Dp4 => WriteMask::XYZW,
            Opcode::Dph if i == 0 => WriteMask::XYZ,
            Opcode::Dph => WriteMask::XYZW,
            Opcode::Dp3 => WriteMask::XYZ,
            Opcode::Dp2 => WriteMask::XY,
            _ => self.lanes_computed(),
        };
        src.swizzle.apply_inv_to_mask(lanes)
    }

    pub fn reads_flag(&self) -> bool {
        self.is_predicated()
    }

    pub fn writes_flag(&self) -> bool {
        self.cmod != CondMod::None && self.opcode != Opcode::Sel
    }

    /// Flag bits read, one per lane.
    pub fn flag_lanes_read(&self) -> WriteMask {
        match self.predicate {
            Predicate::None => WriteMask::NONE,
            Predicate::Normal => self.lanes_computed(),
            Predicate::Any4h | Predicate::All4h => WriteMask::XYZW,
        }
    }

    /// Flag bits written, one per lane.
    pub fn flag_lanes_written(&self) -> WriteMask {
        if self.writes_flag() {
            self.lanes_computed()
        } else {
            WriteMask::NONE
        }
    }

    pub fn can_do_source_mods(&self, devinfo: &DeviceInfo) -> bool {
        match self.opcode.kind() {
            OpKind::Alu => {
                !self.dst.ty.is_64bit()
                    && !matches!(
                        self.opcode,
                        Opcode::Broadcast | Opcode::Shr | Opcode::Shl | Opcode::Asr
                    )
            }
            OpKind::Math => devinfo.math_align16,
            _ => false,
        }
    }

    pub fn can_do_cmod(&self) -> bool {
        self.opcode.kind() == OpKind::Alu
            && !matches!(self.opcode, Opcode::Sel | Opcode::Broadcast)
            && !self.dst.ty.is_64bit()
    }

    /// Whether the destination writemask can be changed without changing
    /// the meaning of the instruction.
    pub fn can_do_writemask(&self, devinfo: &DeviceInfo) -> bool {
        match self.opcode.kind() {
            OpKind::Alu => true,
            OpKind::Math => devinfo.math_align16,
            _ => false,
        }
    }

    /// Whether the result may be permuted by `swizzle` and narrowed to
    /// `dst_writemask`. `swizzle_mask` holds the result lanes the consumer
    /// still needs.
    pub fn can_reswizzle(
        &self,
        devinfo: &DeviceInfo,
        dst_writemask: WriteMask,
        swizzle: Swizzle,
        swizzle_mask: WriteMask,
    ) -> bool {
        if self.opcode.is_math() && !devinfo.math_align16 && !swizzle.is_identity() {
            return false;
        }
        // The flag lanes written follow the writemask.
        if self.writes_flag() {
            return false;
        }
        if !self.can_do_writemask(devinfo) && !dst_writemask.is_full() {
            return false;
        }
        if !swizzle_mask.covers(self.dst.writemask) {
            return false;
        }
        !self.opcode.is_send() && self.mlen == 0 && !self.dst.ty.is_64bit()
    }

    /// Rewrite the instruction so that lane `c` of the new result holds lane
    /// `swizzle[c]` of the old one, writing only lanes in `dst_writemask`.
    pub fn reswizzle(&mut self, dst_writemask: WriteMask, swizzle: Swizzle) {
        // A dot product writes the same scalar to every lane.
        if !self.opcode.is_dot_product() {
            for i in 0..self.num_srcs() {
                let src = &mut self.src[i];
                if src.is_unused() {
                    continue;
                }
                if src.is_imm() {
                    if src.ty == RegType::VF {
                        let lanes = src.imm.to_le_bytes();
                        let mut permuted = [0u8; NUM_LANES];
                        for (c, slot) in permuted.iter_mut().enumerate() {
                            *slot = lanes[swizzle.get(c)];
                        }
                        src.imm = u32::from_le_bytes(permuted);
                    }
                    continue;
                }
                src.swizzle = swizzle.compose(src.swizzle);
            }
        }
        self.dst.writemask = dst_writemask.intersect(swizzle.apply_to_mask(self.dst.writemask));
    }

    pub fn has_side_effects(&self) -> bool {
        self.opcode.info().side_effects
    }

    /// Whether writing the destination could clobber a source before every
    /// channel of that source has been read. A compressed instruction runs
    /// as two halves, so the first half may overwrite the second's source.
    pub fn has_source_destination_hazard(&self) -> bool {
        self.opcode.is_send() || self.size_written > REG_SIZE
    }

    /// Whether source `i` reads any byte of the destination region.
    pub fn src_overlaps_dst(&self, i: usize) -> bool {
        let s = &self.src[i];
        let regs = self.regs_written().max(1) * REG_SIZE;
        s.region(self.regs_read(i).max(1) * REG_SIZE)
            .overlaps(&self.dst.region(regs))
    }

    /// Whether the written lanes are overwritten for every invocation.
    /// Predicated writes, including predicated `sel`, keep the old value in
    /// some channels.
    pub fn is_unconditional_write(&self) -> bool {
        !self.is_predicated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(wm: WriteMask) -> Instruction {
        Instruction::new(
            Opcode::Add,
            Dst::vgrf(1, RegType::F).with_writemask(wm),
            &[Src::vgrf(2, RegType::F), Src::imm_f(1.0)],
        )
    }

    #[test]
    fn lanes_read_follow_writemask_and_swizzle() {
        let mut inst = add(WriteMask::XY);
        inst.src[0].swizzle = Swizzle::new(2, 3, 0, 0);
        assert_eq!(inst.lanes_read(0), WriteMask::new(0b1100));
        assert_eq!(inst.lanes_read(1), WriteMask::NONE);

        let dp3 = Instruction::new(
            Opcode::Dp3,
            Dst::vgrf(1, RegType::F).with_writemask(WriteMask::X),
            &[Src::vgrf(2, RegType::F), Src::vgrf(3, RegType::F)],
        );
        assert_eq!(dp3.lanes_read(0), WriteMask::XYZ);
    }

    #[test]
    fn flag_lanes_of_null_destinations() {
        let cmp = Instruction::new(
            Opcode::Cmp,
            Dst::null(RegType::F),
            &[Src::vgrf(1, RegType::F), Src::imm_f(0.0)],
        )
        .with_cmod(CondMod::Ge);
        assert!(cmp.writes_flag());
        assert_eq!(cmp.flag_lanes_written(), WriteMask::XYZW);

        let sel = Instruction::new(Opcode::Sel, Dst::vgrf(0, RegType::F), &[Src::imm_f(0.0), Src::imm_f(1.0)])
            .with_predicate(Predicate::Normal);
        assert!(sel.reads_flag());
        assert!(!sel.writes_flag());
    }

    #[test]
    fn register_footprint() {
        let inst = add(WriteMask::XYZW);
        assert_eq!(inst.regs_written(), 1);
        assert_eq!(inst.regs_read(0), 1);
        assert_eq!(inst.regs_read(1), 0);

        let mut df = Instruction::new(Opcode::Mov, Dst::vgrf(4, RegType::DF), &[Src::vgrf(5, RegType::DF)]);
        df.exec_size = 8;
        assert_eq!(df.regs_written(), 2);
        assert_eq!(df.regs_read(0), 2);
    }

    #[test]
    fn reswizzle_composes_source_swizzles() {
        let dev = DeviceInfo::default();
        let mut inst = add(WriteMask::XYZW);
        inst.src[0].swizzle = Swizzle::new(3, 2, 1, 0);
        assert!(inst.can_reswizzle(&dev, WriteMask::XY, Swizzle::new(1, 1, 2, 2), WriteMask::XYZW));
        inst.reswizzle(WriteMask::XY, Swizzle::new(1, 1, 2, 2));
        assert_eq!(inst.src[0].swizzle, Swizzle::new(2, 2, 1, 1));
        assert_eq!(inst.dst.writemask, WriteMask::XY);

        let mut narrow = add(WriteMask::X);
        assert!(!narrow.can_reswizzle(&dev, WriteMask::XYZW, Swizzle::XYZW, WriteMask::Y));
        narrow.src[1] = Src::imm_vf([0x30, 0x40, 0x50, 0x60]);
        narrow.reswizzle(WriteMask::Y, Swizzle::XXXX);
        assert_eq!(narrow.src[1].imm.to_le_bytes(), [0x30; 4]);
        assert_eq!(narrow.dst.writemask, WriteMask::Y);
    }
}
