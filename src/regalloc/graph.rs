// The interference-graph solver. Nodes belong to register classes sized in register
// units; a class of size `s` over `n` allocatable units has `n - s + 1` placements. Two
// nodes joined by an edge must get disjoint unit ranges. Pre-colored nodes (the payload)
// keep their unit. Coloring is optimistic: simplification removes a node when the weighted
// conflicts of its remaining neighbours leave it a free placement, and when none qualifies
// it removes the cheapest node anyway and hopes for the best. Selection then pops nodes
// and gives each the lowest free run of units. A failed selection makes `solve` return
// `None`; the caller then asks for the best spill candidate. Adjacency lives in the
// caller's bumpalo arena, which is reset between allocation attempts. Edges are also kept in
// a bit matrix so that duplicate checks stay constant time.

//! Graph coloring over register-unit classes.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use super::register_file::RegUnitSet;

/// A register class: nodes needing `size` consecutive units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegClass {
    pub size: u32,
    /// Number of distinct placements in the register file.
    pub placements: u32,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    class: usize,
    precolor: Option<u32>,
    spill_cost: f32,
    spillable: bool,
}

/// Interference graph with arena-allocated adjacency.
pub struct InterferenceGraph<'arena> {
    num_units: u32,
    classes: Vec<RegClass>,
    nodes: BumpVec<'arena, Node>,
    adjacency: BumpVec<'arena, BumpVec<'arena, u32>>,
    /// One bit row per node, grown as edges to higher nodes arrive.
    matrix: BumpVec<'arena, BumpVec<'arena, u64>>,
    arena: &'arena Bump,
}

impl<'arena> InterferenceGraph<'arena> {
    /// An empty graph over `num_units` allocatable units.
    pub fn new(arena: &'arena Bump, num_units: u32) -> Self {
        Self {
            num_units,
            classes: Vec::new(),
            nodes: BumpVec::new_in(arena),
            adjacency: BumpVec::new_in(arena),
            matrix: BumpVec::new_in(arena),
            arena,
        }
    }

    /// The class for nodes of `size` units, created on first use.
    pub fn class_for_size(&mut self, size: u32) -> usize {
        if let Some(c) = self.classes.iter().position(|c| c.size == size) {
            return c;
        }
        self.classes.push(RegClass {
            size,
            placements: (self.num_units + 1).saturating_sub(size),
        });
        self.classes.len() - 1
    }

    pub fn class(&self, class: usize) -> RegClass {
        self.classes[class]
    }

    /// Add a node of class `class`. Nodes start spillable with cost zero.
    pub fn add_node(&mut self, class: usize) -> u32 {
        self.nodes.push(Node {
            class,
            precolor: None,
            spill_cost: 0.0,
            spillable: true,
        });
        self.adjacency.push(BumpVec::new_in(self.arena));
        self.matrix.push(BumpVec::new_in(self.arena));
        (self.nodes.len() - 1) as u32
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Fix node `n` at `unit`. Pre-colored nodes are never spilled.
    pub fn set_precolor(&mut self, n: u32, unit: u32) {
        let node = &mut self.nodes[n as usize];
        node.precolor = Some(unit);
        node.spillable = false;
    }

    pub fn set_spill_cost(&mut self, n: u32, cost: f32) {
        self.nodes[n as usize].spill_cost = cost;
    }

    pub fn set_unspillable(&mut self, n: u32) {
        self.nodes[n as usize].spillable = false;
    }

    pub fn interferes(&self, a: u32, b: u32) -> bool {
        let b = b as usize;
        self.matrix[a as usize]
            .get(b / 64)
            .is_some_and(|word| word & (1u64 << (b % 64)) != 0)
    }

    fn set_bit(&mut self, a: u32, b: u32) {
        let row = &mut self.matrix[a as usize];
        let b = b as usize;
        if row.len() <= b / 64 {
            row.resize(b / 64 + 1, 0);
        }
        row[b / 64] |= 1u64 << (b % 64);
    }

    pub fn add_edge(&mut self, a: u32, b: u32) {
        if a == b || self.interferes(a, b) {
            return;
        }
        self.set_bit(a, b);
        self.set_bit(b, a);
        self.adjacency[a as usize].push(b);
        self.adjacency[b as usize].push(a);
    }

    pub fn neighbours(&self, n: u32) -> &[u32] {
        &self.adjacency[n as usize]
    }

    /// Placements of class `of` a single node of class `by` can block.
    fn conflict_weight(&self, of: usize, by: usize) -> u32 {
        let of = self.classes[of];
        (of.size + self.classes[by].size - 1).min(of.placements)
    }

    /// Summed conflict weight of every neighbour of `n`.
    fn node_weight(&self, n: u32) -> u32 {
        let class = self.nodes[n as usize].class;
        self.neighbours(n)
            .iter()
            .map(|&m| self.conflict_weight(class, self.nodes[m as usize].class))
            .sum()
    }

    /// Color the graph. Returns the first unit of every node, or `None` if
    /// some node could not be colored.
    pub fn solve(&self) -> Option<Vec<u32>> {
        let n = self.nodes.len();
        // Pre-colored nodes never enter the stack but keep weighing on
        // their neighbours.
        let mut removed: Vec<bool> = self.nodes.iter().map(|node| node.precolor.is_some()).collect();
        let mut weight: Vec<u32> = (0..n as u32).map(|i| self.node_weight(i)).collect();
        let mut remaining = removed.iter().filter(|&&r| !r).count();
        let mut stack = Vec::with_capacity(remaining);

        while remaining > 0 {
            // Trivially colorable nodes first, lowest index wins.
            let pick = (0..n)
                .find(|&i| !removed[i] && weight[i] < self.classes[self.nodes[i].class].placements)
                .or_else(|| {
                    // Optimistic push of the cheapest node per unit of conflict.
                    (0..n).filter(|&i| !removed[i]).min_by(|&a, &b| {
                        let ka = self.nodes[a].spill_cost / (weight[a].max(1) as f32);
                        let kb = self.nodes[b].spill_cost / (weight[b].max(1) as f32);
                        ka.total_cmp(&kb)
                    })
                })?;
            removed[pick] = true;
            remaining -= 1;
            stack.push(pick as u32);
            let class = self.nodes[pick].class;
            for &m in self.neighbours(pick as u32) {
                let m = m as usize;
                if !removed[m] {
                    weight[m] -= self.conflict_weight(self.nodes[m].class, class);
                }
            }
        }

        let mut assignment: Vec<Option<u32>> = self.nodes.iter().map(|node| node.precolor).collect();
        let all = RegUnitSet::first_n(self.num_units);
        while let Some(node) = stack.pop() {
            let mut free = all;
            for &m in self.neighbours(node) {
                if let Some(unit) = assignment[m as usize] {
                    let size = self.classes[self.nodes[m as usize].class].size;
                    for u in unit..unit + size {
                        free.remove(u);
                    }
                }
            }
            let size = self.classes[self.nodes[node as usize].class].size;
            let unit = free.find_first_fit(size)?;
            assignment[node as usize] = Some(unit);
        }
        assignment.into_iter().collect()
    }

    /// The spillable node whose removal frees the most conflict weight per
    /// unit of spill cost. Ties go to the lowest node index.
    pub fn best_spill_node(&self) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.spillable || node.spill_cost <= 0.0 {
                continue;
            }
            let placements = self.classes[node.class].placements.max(1) as f32;
            let benefit: f32 = self
                .neighbours(i as u32)
                .iter()
                .map(|&m| self.conflict_weight(self.nodes[m as usize].class, node.class) as f32 / placements)
                .sum();
            let ratio = benefit / node.spill_cost;
            if best.map_or(true, |(_, r)| ratio > r) {
                best = Some((i as u32, ratio));
            }
        }
        best.map(|(n, _)| n)
    }
}
