//! Register value types and the per-lane selectors (swizzle, writemask).

use std::fmt;

/// Number of logical lanes in a vec4 operation.
pub const NUM_LANES: usize = 4;

/// Value type of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegType {
    F,
    D,
    UD,
    W,
    UW,
    DF,
    /// Packed vector-float immediate (four 8-bit restricted floats).
    VF,
}

impl RegType {
    /// Size of one lane in bytes.
    pub const fn size(self) -> u32 {
        match self {
            RegType::F | RegType::D | RegType::UD | RegType::VF => 4,
            RegType::W | RegType::UW => 2,
            RegType::DF => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, RegType::F | RegType::DF | RegType::VF)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, RegType::F | RegType::DF | RegType::VF | RegType::D | RegType::W)
    }

    pub const fn is_64bit(self) -> bool {
        matches!(self, RegType::DF)
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            RegType::F => "f",
            RegType::D => "d",
            RegType::UD => "ud",
            RegType::W => "w",
            RegType::UW => "uw",
            RegType::DF => "df",
            RegType::VF => "vf",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "f" => Some(RegType::F),
            "d" => Some(RegType::D),
            "ud" => Some(RegType::UD),
            "w" => Some(RegType::W),
            "uw" => Some(RegType::UW),
            "df" => Some(RegType::DF),
            "vf" => Some(RegType::VF),
            _ => None,
        }
    }
}

impl fmt::Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

const LANE_NAMES: [char; NUM_LANES] = ['x', 'y', 'z', 'w'];

/// Set of lanes written by a destination. Never holds bits above lane w.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteMask(u8);

impl WriteMask {
    pub const NONE: WriteMask = WriteMask(0);
    pub const X: WriteMask = WriteMask(0x1);
    pub const Y: WriteMask = WriteMask(0x2);
    pub const Z: WriteMask = WriteMask(0x4);
    pub const W: WriteMask = WriteMask(0x8);
    pub const XY: WriteMask = WriteMask(0x3);
    pub const XYZ: WriteMask = WriteMask(0x7);
    pub const XYZW: WriteMask = WriteMask(0xf);

    pub const fn new(bits: u8) -> Self {
        WriteMask(bits & 0xf)
    }

    pub const fn lane(lane: usize) -> Self {
        WriteMask(1 << (lane & 3))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, lane: usize) -> bool {
        lane < NUM_LANES && self.0 & (1 << lane) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_full(self) -> bool {
        self.0 == 0xf
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub const fn union(self, other: WriteMask) -> Self {
        WriteMask(self.0 | other.0)
    }

    pub const fn intersect(self, other: WriteMask) -> Self {
        WriteMask(self.0 & other.0)
    }

    pub const fn without(self, other: WriteMask) -> Self {
        WriteMask(self.0 & !other.0)
    }

    /// Whether every lane of `other` is also in `self`.
    pub const fn covers(self, other: WriteMask) -> bool {
        other.0 & !self.0 == 0
    }

    /// Iterate the lanes in the mask in ascending order.
    pub fn lanes(self) -> impl Iterator<Item = usize> {
        (0..NUM_LANES).filter(move |&c| self.contains(c))
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut bits = 0u8;
        let mut last: Option<usize> = None;
        for ch in s.chars() {
            let lane = LANE_NAMES.iter().position(|&n| n == ch)?;
            if last.is_some_and(|l| lane <= l) {
                return None;
            }
            last = Some(lane);
            bits |= 1 << lane;
        }
        if bits == 0 {
            return None;
        }
        Some(WriteMask(bits))
    }
}

impl fmt::Debug for WriteMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteMask({self})")
    }
}

impl fmt::Display for WriteMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for c in self.lanes() {
            write!(f, "{}", LANE_NAMES[c])?;
        }
        Ok(())
    }
}

/// Read-side lane selector: lane `c` of the result reads channel `get(c)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(u8);

impl Swizzle {
    pub const XYZW: Swizzle = Swizzle::new(0, 1, 2, 3);
    pub const XXXX: Swizzle = Swizzle::new(0, 0, 0, 0);
    pub const YYYY: Swizzle = Swizzle::new(1, 1, 1, 1);
    pub const ZZZZ: Swizzle = Swizzle::new(2, 2, 2, 2);
    pub const WWWW: Swizzle = Swizzle::new(3, 3, 3, 3);

    pub const fn new(x: u8, y: u8, z: u8, w: u8) -> Self {
        Swizzle((x & 3) | ((y & 3) << 2) | ((z & 3) << 4) | ((w & 3) << 6))
    }

    pub const fn from_lanes(l: [u8; NUM_LANES]) -> Self {
        Swizzle::new(l[0], l[1], l[2], l[3])
    }

    /// Replicate a single channel to every lane.
    pub const fn splat(channel: u8) -> Self {
        Swizzle::new(channel, channel, channel, channel)
    }

    /// Channel read by lane `lane`.
    pub const fn get(self, lane: usize) -> usize {
        ((self.0 >> (2 * (lane & 3))) & 3) as usize
    }

    pub const fn lanes(self) -> [u8; NUM_LANES] {
        [
            self.get(0) as u8,
            self.get(1) as u8,
            self.get(2) as u8,
            self.get(3) as u8,
        ]
    }

    pub const fn is_identity(self) -> bool {
        self.0 == Swizzle::XYZW.0
    }

    /// Apply `self` first and `inner` second: lane `c` reads `inner[self[c]]`.
    pub const fn compose(self, inner: Swizzle) -> Swizzle {
        Swizzle::new(
            inner.get(self.get(0)) as u8,
            inner.get(self.get(1)) as u8,
            inner.get(self.get(2)) as u8,
            inner.get(self.get(3)) as u8,
        )
    }

    /// Swizzle reading only the lanes in `mask`; other lanes repeat the
    /// closest preceding enabled lane (or the first enabled one).
    pub fn for_mask(mask: WriteMask) -> Swizzle {
        let mut last = mask.lanes().next().unwrap_or(0) as u8;
        let mut l = [0u8; NUM_LANES];
        for (c, slot) in l.iter_mut().enumerate() {
            if mask.contains(c) {
                last = c as u8;
            }
            *slot = last;
        }
        Swizzle::from_lanes(l)
    }

    /// Swizzle reading the first `n` channels, repeating the last one.
    pub fn for_size(n: usize) -> Swizzle {
        let n = n.clamp(1, NUM_LANES);
        let mut l = [0u8; NUM_LANES];
        for (c, slot) in l.iter_mut().enumerate() {
            *slot = c.min(n - 1) as u8;
        }
        Swizzle::from_lanes(l)
    }

    /// Channels referenced by the swizzle.
    pub fn mask(self) -> WriteMask {
        let mut bits = 0u8;
        for c in 0..NUM_LANES {
            bits |= 1 << self.get(c);
        }
        WriteMask::new(bits)
    }

    /// Lanes `c` whose selected channel `self[c]` is in `mask`.
    pub fn apply_to_mask(self, mask: WriteMask) -> WriteMask {
        let mut bits = 0u8;
        for c in 0..NUM_LANES {
            if mask.contains(self.get(c)) {
                bits |= 1 << c;
            }
        }
        WriteMask::new(bits)
    }

    /// Channels read by the lanes in `mask`.
    pub fn apply_inv_to_mask(self, mask: WriteMask) -> WriteMask {
        let mut bits = 0u8;
        for c in mask.lanes() {
            bits |= 1 << self.get(c);
        }
        WriteMask::new(bits)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let chans: Vec<u8> = s
            .chars()
            .map(|ch| LANE_NAMES.iter().position(|&n| n == ch).map(|c| c as u8))
            .collect::<Option<_>>()?;
        match chans.as_slice() {
            [c] => Some(Swizzle::splat(*c)),
            [x, y, z, w] => Some(Swizzle::new(*x, *y, *z, *w)),
            _ => None,
        }
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Swizzle::XYZW
    }
}

impl fmt::Debug for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Swizzle({self})")
    }
}

impl fmt::Display for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in 0..NUM_LANES {
            write!(f, "{}", LANE_NAMES[self.get(c)])?;
        }
        Ok(())
    }
}
