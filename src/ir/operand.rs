//! Operand model.
//!
//! Sources and destinations are plain values. A pass that rewrites a source
//! replaces it wholesale, keeping the logical value it reads the same.
//! Immediates are built only through the `imm_*` constructors, so they never
//! carry an indirect-addressing reference.

use super::types::{RegType, Swizzle, WriteMask};
use super::REG_SIZE;

/// Register file an operand lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegFile {
    /// Absent source slot.
    Unused,
    /// Virtual general register.
    Vgrf,
    /// Physical general register.
    Fixed,
    /// Message register.
    Mrf,
    /// Immediate constant.
    Imm,
    /// Null sink.
    Null,
    /// Vertex attribute supplied in the payload.
    Attr,
    /// Push-constant uniform supplied in the payload.
    Uniform,
}

impl RegFile {
    pub const fn prefix(self) -> &'static str {
        match self {
            RegFile::Unused => "",
            RegFile::Vgrf => "vgrf",
            RegFile::Fixed => "g",
            RegFile::Mrf => "m",
            RegFile::Imm => "",
            RegFile::Null => "null",
            RegFile::Attr => "attr",
            RegFile::Uniform => "u",
        }
    }
}

/// Read-side operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Src {
    pub file: RegFile,
    pub nr: u32,
    /// Byte offset from the start of the register.
    pub offset: u32,
    pub ty: RegType,
    pub swizzle: Swizzle,
    pub negate: bool,
    pub abs: bool,
    /// Raw immediate bits (for `RegFile::Imm` only).
    pub imm: u32,
    /// Dynamic register index, in register units, added to `nr`.
    pub reladdr: Option<Box<Src>>,
}

impl Src {
    /// Empty source slot.
    pub const fn unused() -> Self {
        Src {
            file: RegFile::Unused,
            nr: 0,
            offset: 0,
            ty: RegType::F,
            swizzle: Swizzle::XYZW,
            negate: false,
            abs: false,
            imm: 0,
            reladdr: None,
        }
    }

    pub fn reg(file: RegFile, nr: u32, ty: RegType) -> Self {
        Src {
            file,
            nr,
            ty,
            ..Src::unused()
        }
    }

    pub fn vgrf(nr: u32, ty: RegType) -> Self {
        Src::reg(RegFile::Vgrf, nr, ty)
    }

    pub fn imm_f(v: f32) -> Self {
        Src::imm_bits(v.to_bits(), RegType::F)
    }

    pub fn imm_d(v: i32) -> Self {
        Src::imm_bits(v as u32, RegType::D)
    }

    pub fn imm_ud(v: u32) -> Self {
        Src::imm_bits(v, RegType::UD)
    }

    /// Vector-float immediate from four packed 8-bit restricted floats.
    pub fn imm_vf(lanes: [u8; 4]) -> Self {
        Src::imm_bits(u32::from_le_bytes(lanes), RegType::VF)
    }

    pub fn imm_bits(bits: u32, ty: RegType) -> Self {
        Src {
            file: RegFile::Imm,
            ty,
            imm: bits,
            ..Src::unused()
        }
    }

    pub fn with_swizzle(mut self, swizzle: Swizzle) -> Self {
        self.swizzle = swizzle;
        self
    }

    pub fn with_type(mut self, ty: RegType) -> Self {
        self.ty = ty;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn is_unused(&self) -> bool {
        self.file == RegFile::Unused
    }

    pub fn is_imm(&self) -> bool {
        self.file == RegFile::Imm
    }

    pub fn is_vgrf(&self) -> bool {
        self.file == RegFile::Vgrf
    }

    pub fn has_source_mods(&self) -> bool {
        self.negate || self.abs
    }

    /// Immediate value as f32, with source modifiers applied.
    pub fn imm_as_f32(&self) -> Option<f32> {
        if self.file != RegFile::Imm || self.ty != RegType::F {
            return None;
        }
        let mut v = f32::from_bits(self.imm);
        if self.abs {
            v = v.abs();
        }
        if self.negate {
            v = -v;
        }
        Some(v)
    }

    /// Immediate value as i64, with source modifiers applied.
    pub fn imm_as_int(&self) -> Option<i64> {
        if self.file != RegFile::Imm {
            return None;
        }
        let mut v = match self.ty {
            RegType::D => self.imm as i32 as i64,
            RegType::UD => self.imm as i64,
            RegType::W => self.imm as i16 as i64,
            RegType::UW => self.imm as u16 as i64,
            _ => return None,
        };
        if self.abs {
            v = v.abs();
        }
        if self.negate {
            v = -v;
        }
        Some(v)
    }

    pub fn is_zero(&self) -> bool {
        if let Some(f) = self.imm_as_f32() {
            return f == 0.0;
        }
        if self.is_imm() && self.ty == RegType::VF {
            return self.imm & 0x7f7f_7f7f == 0;
        }
        self.imm_as_int() == Some(0)
    }

    pub fn is_one(&self) -> bool {
        if let Some(f) = self.imm_as_f32() {
            return f == 1.0;
        }
        self.imm_as_int() == Some(1)
    }

    pub fn is_negative_one(&self) -> bool {
        if let Some(f) = self.imm_as_f32() {
            return f == -1.0;
        }
        self.ty == RegType::D && self.imm_as_int() == Some(-1)
    }

    /// Whether every lane of the source reads the same value for every
    /// invocation.
    pub fn is_uniform(&self) -> bool {
        let file_uniform = matches!(self.file, RegFile::Imm | RegFile::Uniform | RegFile::Null);
        file_uniform && self.reladdr.as_deref().map_or(true, Src::is_uniform)
    }

    /// Fold the source modifiers into an immediate. Returns `None` when the
    /// result cannot be represented in the immediate's type.
    pub fn fold_imm_modifiers(&self) -> Option<Src> {
        if !self.is_imm() || !self.has_source_mods() {
            return Some(self.clone());
        }
        let folded = match self.ty {
            RegType::F => Src::imm_f(self.imm_as_f32()?),
            RegType::D => Src::imm_d(i32::try_from(self.imm_as_int()?).ok()?),
            RegType::UD if !self.negate => Src::imm_ud(self.imm),
            RegType::VF => {
                let mut lanes = self.imm.to_le_bytes();
                for l in lanes.iter_mut() {
                    if self.abs {
                        *l &= 0x7f;
                    }
                    if self.negate {
                        *l ^= 0x80;
                    }
                }
                Src::imm_vf(lanes)
            }
            _ => return None,
        };
        Some(folded.with_swizzle(self.swizzle))
    }

    /// Register unit (relative to `nr`) of the first byte read.
    pub fn unit(&self) -> u32 {
        self.offset / REG_SIZE
    }
}

impl Default for Src {
    fn default() -> Self {
        Src::unused()
    }
}

impl From<&Dst> for Src {
    fn from(dst: &Dst) -> Self {
        Src {
            file: dst.file,
            nr: dst.nr,
            offset: dst.offset,
            ty: dst.ty,
            swizzle: Swizzle::for_mask(dst.writemask),
            reladdr: dst.reladdr.clone(),
            ..Src::unused()
        }
    }
}

/// Write-side operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dst {
    pub file: RegFile,
    pub nr: u32,
    pub offset: u32,
    pub ty: RegType,
    pub writemask: WriteMask,
    pub reladdr: Option<Box<Src>>,
}

impl Dst {
    pub fn reg(file: RegFile, nr: u32, ty: RegType) -> Self {
        Dst {
            file,
            nr,
            offset: 0,
            ty,
            writemask: WriteMask::XYZW,
            reladdr: None,
        }
    }

    pub fn vgrf(nr: u32, ty: RegType) -> Self {
        Dst::reg(RegFile::Vgrf, nr, ty)
    }

    pub fn null(ty: RegType) -> Self {
        Dst::reg(RegFile::Null, 0, ty)
    }

    pub fn with_writemask(mut self, writemask: WriteMask) -> Self {
        self.writemask = writemask;
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self.file, RegFile::Null | RegFile::Unused)
    }

    pub fn is_vgrf(&self) -> bool {
        self.file == RegFile::Vgrf
    }

    pub fn unit(&self) -> u32 {
        self.offset / REG_SIZE
    }
}

impl From<&Src> for Dst {
    fn from(src: &Src) -> Self {
        Dst {
            file: src.file,
            nr: src.nr,
            offset: src.offset,
            ty: src.ty,
            writemask: src.swizzle.mask(),
            reladdr: src.reladdr.clone(),
        }
    }
}

/// A byte range of one register file, used for overlap queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub file: RegFile,
    pub nr: u32,
    pub offset: u32,
    pub size: u32,
}

impl Region {
    pub fn overlaps(&self, other: &Region) -> bool {
        if self.file != other.file || self.size == 0 || other.size == 0 {
            return false;
        }
        match self.file {
            RegFile::Vgrf | RegFile::Attr | RegFile::Uniform => {
                self.nr == other.nr
                    && self.offset < other.offset + other.size
                    && other.offset < self.offset + self.size
            }
            RegFile::Fixed | RegFile::Mrf => {
                let a = self.nr * REG_SIZE + self.offset;
                let b = other.nr * REG_SIZE + other.offset;
                a < b + other.size && b < a + self.size
            }
            _ => false,
        }
    }
}

impl Src {
    pub fn region(&self, size: u32) -> Region {
        Region {
            file: self.file,
            nr: self.nr,
            offset: self.offset,
            size,
        }
    }
}

impl Dst {
    pub fn region(&self, size: u32) -> Region {
        Region {
            file: self.file,
            nr: self.nr,
            offset: self.offset,
            size,
        }
    }
}

/// Convert an f32 to an 8-bit restricted float, if exactly representable.
pub fn f32_to_vf(f: f32) -> Option<u8> {
    let bits = f.to_bits();
    let sign = (bits >> 31) as u8;
    if f == 0.0 {
        return Some(sign << 7);
    }
    let exponent = ((bits >> 23) & 0xff) as i32 - (127 - 3);
    let mantissa = (bits >> 19) & 0xf;
    if bits & 0x7ffff != 0 || !(0..=7).contains(&exponent) {
        return None;
    }
    let vf = (sign << 7) | ((exponent as u8) << 4) | mantissa as u8;
    // 0.125 would collide with the encoding of zero.
    if vf & 0x7f == 0 {
        return None;
    }
    Some(vf)
}

/// Expand an 8-bit restricted float.
pub fn vf_to_f32(vf: u8) -> f32 {
    if vf & 0x7f == 0 {
        return f32::from_bits((vf as u32) << 24);
    }
    let sign = (vf >> 7) as u32;
    let exponent = (((vf & 0x70) >> 4) as u32) + (127 - 3);
    let mantissa = ((vf & 0xf) as u32) << 19;
    f32::from_bits((sign << 31) | (exponent << 23) | mantissa)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_float_conversion() {
        for v in [1.0f32, -1.0, 0.5, 2.0, 15.5, 0.25, 0.0, -0.0] {
            let vf = f32_to_vf(v).unwrap();
            assert_eq!(vf_to_f32(vf).to_bits(), v.to_bits(), "{v}");
        }
        assert_eq!(f32_to_vf(0.125), None);
        assert_eq!(f32_to_vf(0.1), None);
        assert_eq!(f32_to_vf(100.0), None);
    }

    #[test]
    fn immediate_predicates() {
        assert!(Src::imm_f(0.0).is_zero());
        assert!(Src::imm_f(-0.0).is_zero());
        assert!(Src::imm_f(1.0).is_one());
        assert!(Src::imm_f(1.0).negated().is_negative_one());
        assert!(Src::imm_d(-1).is_negative_one());
        assert!(!Src::imm_ud(u32::MAX).is_negative_one());
        assert!(!Src::vgrf(0, RegType::F).is_zero());
    }

    #[test]
    fn folding_modifiers_into_immediates() {
        let folded = Src::imm_f(2.0).negated().fold_imm_modifiers().unwrap();
        assert_eq!(folded.imm_as_f32(), Some(-2.0));
        assert!(!folded.negate);

        let mut abs = Src::imm_d(-5);
        abs.abs = true;
        assert_eq!(abs.fold_imm_modifiers().unwrap().imm_as_int(), Some(5));

        assert!(Src::imm_ud(3).negated().fold_imm_modifiers().is_none());
    }

    #[test]
    fn overlap_respects_offsets() {
        use RegFile::*;
        let r = |file, nr, offset, size| Region { file, nr, offset, size };
        assert!(r(Vgrf, 1, 0, 32).overlaps(&r(Vgrf, 1, 16, 16)));
        assert!(!r(Vgrf, 1, 0, 32).overlaps(&r(Vgrf, 1, 32, 32)));
        assert!(!r(Vgrf, 1, 0, 32).overlaps(&r(Vgrf, 2, 0, 32)));
        assert!(r(Fixed, 2, 0, 64).overlaps(&r(Fixed, 3, 0, 32)));
        assert!(!r(Imm, 0, 0, 4).overlaps(&r(Imm, 0, 0, 4)));
    }
}
