// This module computes channel-granular liveness for virtual registers and the flag
// register. Each register unit of a VGRF is split into eight variables: two 16-byte
// halves (one per SIMD4x2 thread) times four lanes. Per block it collects `use` (read
// before any unconditional write in the block) and `def` (unconditionally written before
// any read), then runs the backward fixed point liveout = union of successor livein,
// livein = use | (liveout & !def). Every variable finally gets a [start, end] ip range,
// widened by each block it is live into or out of. Predicated writes, 64-bit writes and
// writes through a relative address never enter `def`.

//! Live-variable analysis.

use super::bitset::BitSet;
use super::cfg::Cfg;
use crate::ir::{Instruction, RegFile, Src, VirtualGrfTable, WriteMask, NUM_LANES, REG_SIZE};

/// Variables per register unit: two halves of four lanes.
pub const VARS_PER_UNIT: usize = 8;

const HALF_SIZE: u32 = REG_SIZE / 2;

/// Per-block dataflow sets.
#[derive(Debug, Clone)]
pub struct BlockLiveness {
    pub def: BitSet,
    pub use_: BitSet,
    pub livein: BitSet,
    pub liveout: BitSet,
    pub flag_def: WriteMask,
    pub flag_use: WriteMask,
    pub flag_livein: WriteMask,
    pub flag_liveout: WriteMask,
}

impl BlockLiveness {
    fn new(num_vars: usize) -> Self {
        Self {
            def: BitSet::new(num_vars),
            use_: BitSet::new(num_vars),
            livein: BitSet::new(num_vars),
            liveout: BitSet::new(num_vars),
            flag_def: WriteMask::NONE,
            flag_use: WriteMask::NONE,
            flag_livein: WriteMask::NONE,
            flag_liveout: WriteMask::NONE,
        }
    }
}

/// Result of the analysis for one CFG state.
#[derive(Debug, Clone)]
pub struct LiveVariables {
    num_vars: usize,
    pub blocks: Vec<BlockLiveness>,
    /// First ip each variable is live at, `usize::MAX` when never live.
    start: Vec<usize>,
    /// Last ip each variable is live at.
    end: Vec<usize>,
    vgrf_start: Vec<usize>,
    vgrf_end: Vec<usize>,
}

/// Variable index of lane `lane` in half `half` of unit `unit` of `nr`.
pub fn var_index(alloc: &VirtualGrfTable, nr: u32, unit: u32, half: u32, lane: usize) -> usize {
    VARS_PER_UNIT * (alloc.offset(nr) + unit) as usize + NUM_LANES * half as usize + lane
}

/// Call `f` with every variable source `i` of `inst` may read, including
/// variables read through relative addresses.
pub fn visit_src_vars(alloc: &VirtualGrfTable, inst: &Instruction, i: usize, mut f: impl FnMut(usize)) {
    let src = &inst.src[i];
    if let Some(reladdr) = &src.reladdr {
        visit_reladdr_vars(alloc, reladdr, &mut f);
    }
    if src.file != RegFile::Vgrf || !alloc.contains(src.nr) {
        return;
    }
    if src.reladdr.is_some() {
        visit_whole_vgrf(alloc, src.nr, &mut f);
        return;
    }
    let lanes = if src.ty.is_64bit() {
        WriteMask::XYZW
    } else {
        inst.lanes_read(i)
    };
    visit_reg_vars(alloc, src.nr, src.offset, inst.size_read(i), lanes, &mut f);
}

/// Call `f` with every variable the destination of `inst` writes. Returns
/// whether the write may count as a definition.
pub fn visit_dst_vars(alloc: &VirtualGrfTable, inst: &Instruction, mut f: impl FnMut(usize)) -> bool {
    let dst = &inst.dst;
    if dst.file != RegFile::Vgrf || !alloc.contains(dst.nr) {
        return false;
    }
    if dst.reladdr.is_some() {
        visit_whole_vgrf(alloc, dst.nr, &mut f);
        return false;
    }
    visit_reg_vars(alloc, dst.nr, dst.offset, inst.size_written, dst.writemask, &mut f);
    inst.is_unconditional_write() && !dst.ty.is_64bit()
}

/// Variables read by the relative-address chain of an operand.
pub fn visit_reladdr_vars(alloc: &VirtualGrfTable, reladdr: &Src, f: &mut impl FnMut(usize)) {
    // Chains are owned and therefore finite; walk them iteratively.
    let mut cur = Some(reladdr);
    while let Some(src) = cur {
        if src.file == RegFile::Vgrf && alloc.contains(src.nr) {
            if src.reladdr.is_some() {
                visit_whole_vgrf(alloc, src.nr, f);
            } else {
                let lanes = src.swizzle.mask();
                visit_reg_vars(alloc, src.nr, src.offset, REG_SIZE, lanes, f);
            }
        }
        cur = src.reladdr.as_deref();
    }
}

fn visit_whole_vgrf(alloc: &VirtualGrfTable, nr: u32, f: &mut impl FnMut(usize)) {
    let first = var_index(alloc, nr, 0, 0, 0);
    for v in first..first + VARS_PER_UNIT * alloc.size(nr) as usize {
        f(v);
    }
}

/// Call `f` with the variables of `lanes` in `size` bytes of `nr` starting
/// at byte `offset`.
pub fn visit_reg_vars(
    alloc: &VirtualGrfTable,
    nr: u32,
    offset: u32,
    size: u32,
    lanes: WriteMask,
    f: &mut impl FnMut(usize),
) {
    let first_half = offset / HALF_SIZE;
    let last_half = (offset + size.max(1)).div_ceil(HALF_SIZE).min(2 * alloc.size(nr));
    for h in first_half..last_half {
        for lane in lanes.lanes() {
            f(var_index(alloc, nr, h / 2, h % 2, lane));
        }
    }
}

impl LiveVariables {
    pub fn compute(cfg: &Cfg, alloc: &VirtualGrfTable) -> Self {
        let num_vars = VARS_PER_UNIT * alloc.total_units() as usize;
        let mut live = LiveVariables {
            num_vars,
            blocks: vec![BlockLiveness::new(num_vars); cfg.blocks.len()],
            start: vec![usize::MAX; num_vars],
            end: vec![0; num_vars],
            vgrf_start: vec![usize::MAX; alloc.len()],
            vgrf_end: vec![0; alloc.len()],
        };
        live.setup_def_use(cfg, alloc);
        live.compute_live_variables(cfg);
        live.compute_start_end(cfg, alloc);
        live
    }

    fn setup_def_use(&mut self, cfg: &Cfg, alloc: &VirtualGrfTable) {
        for (b, block) in cfg.blocks.iter().enumerate() {
            let bd = &mut self.blocks[b];
            for inst in &block.instructions {
                for i in 0..inst.num_srcs() {
                    visit_src_vars(alloc, inst, i, |v| {
                        if !bd.def.contains(v) {
                            bd.use_.insert(v);
                        }
                    });
                }
                if let Some(reladdr) = &inst.dst.reladdr {
                    visit_reladdr_vars(alloc, reladdr, &mut |v| {
                        if !bd.def.contains(v) {
                            bd.use_.insert(v);
                        }
                    });
                }
                bd.flag_use = bd.flag_use.union(inst.flag_lanes_read().without(bd.flag_def));

                let mut written = Vec::new();
                let defines = visit_dst_vars(alloc, inst, |v| written.push(v));
                if defines {
                    for v in written {
                        if !bd.use_.contains(v) {
                            bd.def.insert(v);
                        }
                    }
                }
                if inst.writes_flag() && inst.is_unconditional_write() {
                    bd.flag_def = bd.flag_def.union(inst.flag_lanes_written().without(bd.flag_use));
                }
            }
        }
    }

    fn compute_live_variables(&mut self, cfg: &Cfg) {
        let mut changed = true;
        while changed {
            changed = false;
            for b in (0..cfg.blocks.len()).rev() {
                for &s in &cfg.blocks[b].succs {
                    if s == b {
                        let livein = self.blocks[b].livein.clone();
                        changed |= self.blocks[b].liveout.union_with(&livein);
                        let flags = self.blocks[b].flag_livein;
                        let bd = &mut self.blocks[b];
                        changed |= !bd.flag_liveout.covers(flags);
                        bd.flag_liveout = bd.flag_liveout.union(flags);
                        continue;
                    }
                    let (bd, child) = pair_mut(&mut self.blocks, b, s);
                    changed |= bd.liveout.union_with(&child.livein);
                    changed |= !bd.flag_liveout.covers(child.flag_livein);
                    bd.flag_liveout = bd.flag_liveout.union(child.flag_livein);
                }
                let bd = &mut self.blocks[b];
                changed |= bd.livein.union_with(&bd.use_);
                let (livein, liveout, def) = (&mut bd.livein, &bd.liveout, &bd.def);
                changed |= livein.union_with_difference(liveout, def);
                let flags = bd.flag_use.union(bd.flag_liveout.without(bd.flag_def));
                changed |= !bd.flag_livein.covers(flags);
                bd.flag_livein = bd.flag_livein.union(flags);
            }
        }
    }

    fn compute_start_end(&mut self, cfg: &Cfg, alloc: &VirtualGrfTable) {
        for block in &cfg.blocks {
            for (k, inst) in block.instructions.iter().enumerate() {
                let ip = block.start_ip + k;
                let (start, end) = (&mut self.start, &mut self.end);
                let mut mark = |v: usize| {
                    start[v] = start[v].min(ip);
                    end[v] = end[v].max(ip);
                };
                for i in 0..inst.num_srcs() {
                    visit_src_vars(alloc, inst, i, &mut mark);
                }
                if let Some(reladdr) = &inst.dst.reladdr {
                    visit_reladdr_vars(alloc, reladdr, &mut mark);
                }
                visit_dst_vars(alloc, inst, &mut mark);
            }
        }

        for (b, block) in cfg.blocks.iter().enumerate() {
            let Some(last_ip) = block.last_ip() else {
                continue;
            };
            let bd = &self.blocks[b];
            for v in bd.livein.iter() {
                self.start[v] = self.start[v].min(block.start_ip);
                self.end[v] = self.end[v].max(block.start_ip);
            }
            for v in bd.liveout.iter() {
                self.start[v] = self.start[v].min(last_ip);
                self.end[v] = self.end[v].max(last_ip);
            }
        }

        for (nr, size) in alloc.iter() {
            let first = var_index(alloc, nr, 0, 0, 0);
            for v in first..first + VARS_PER_UNIT * size as usize {
                if self.start[v] == usize::MAX {
                    continue;
                }
                let n = nr as usize;
                self.vgrf_start[n] = self.vgrf_start[n].min(self.start[v]);
                self.vgrf_end[n] = self.vgrf_end[n].max(self.end[v]);
            }
        }
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// `[start, end]` ip range of a variable, if it is ever live.
    pub fn var_range(&self, v: usize) -> Option<(usize, usize)> {
        let start = *self.start.get(v)?;
        (start != usize::MAX).then(|| (start, self.end[v]))
    }

    /// Last ip any of the `n` variables starting at `v` is live at.
    pub fn var_range_end(&self, v: usize, n: usize) -> usize {
        (v..(v + n).min(self.num_vars))
            .filter(|&x| self.start[x] != usize::MAX)
            .map(|x| self.end[x])
            .max()
            .unwrap_or(0)
    }

    /// `[start, end]` ip range of a virtual register, if it is ever live.
    pub fn vgrf_range(&self, nr: u32) -> Option<(usize, usize)> {
        let n = nr as usize;
        let start = *self.vgrf_start.get(n)?;
        (start != usize::MAX).then(|| (start, self.vgrf_end[n]))
    }

    /// Whether the live ranges of two virtual registers overlap.
    pub fn vgrfs_interfere(&self, a: u32, b: u32) -> bool {
        match (self.vgrf_range(a), self.vgrf_range(b)) {
            (Some((sa, ea)), Some((sb, eb))) => !(ea <= sb || eb <= sa),
            _ => false,
        }
    }
}

/// Mutable references to two distinct elements.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &T) {
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &lo[b])
    }
}
