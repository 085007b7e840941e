// Register allocation with spill and retry. Every attempt builds an interference graph in
// the session arena: one node per VGRF sized to its unit count, one pre-colored node per
// payload register and per physical register the program names directly, edges between
// VGRFs whose live ranges overlap and between the destination and sources of instructions
// that must not share registers. If coloring fails, the best spill candidate is rewritten
// through scratch memory, the optimization loop runs again and the next attempt starts
// from a fresh arena. Scratch temporaries are never spill candidates, so the loop runs at
// most once per spillable register before it either colors the graph or runs out of
// candidates or scratch space.

//! Graph-coloring register allocation.

pub mod graph;
pub mod register_file;
pub mod spill;

use crate::core::error::{CompileError, CompileResult};
use crate::core::CompilationSession;
use crate::ir::{RegFile, REG_SIZE};
use crate::opt;
use crate::shader::Shader;

use graph::InterferenceGraph;
use register_file::RegUnitSet;

/// Result of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Physical register of the first unit of every VGRF.
    pub hw_reg: Vec<u32>,
    /// Registers used, payload included.
    pub grf_used: u32,
}

enum Attempt {
    Colored(Vec<u32>),
    Spill(u32),
    Stuck,
}

/// Largest number of VGRF units live at one instruction. A register whose
/// range ends where another begins does not count at that ip, the same rule
/// interference uses.
pub fn max_live_units(shader: &mut Shader) -> u32 {
    let live = shader.live();
    let mut delta = vec![0i64; shader.num_instructions() + 2];
    for (nr, size) in shader.alloc.iter() {
        if let Some((start, end)) = live.vgrf_range(nr) {
            delta[start] += i64::from(size);
            delta[end.max(start + 1)] -= i64::from(size);
        }
    }
    let mut current = 0i64;
    let mut max = 0i64;
    for d in delta {
        current += d;
        max = max.max(current);
    }
    max as u32
}

/// Physical registers at or above the payload that the program names
/// directly. No VGRF may be placed on them.
pub fn reserved_units(shader: &Shader) -> RegUnitSet {
    let mut reserved = RegUnitSet::new();
    for (_, inst) in shader.cfg.instructions() {
        if inst.dst.file == RegFile::Fixed {
            let first = inst.dst.nr + inst.dst.offset / REG_SIZE;
            reserved.insert_range(first, inst.regs_written().max(1));
        }
        for i in 0..inst.num_srcs() {
            let src = &inst.src[i];
            if src.file == RegFile::Fixed {
                reserved.insert_range(src.nr + src.offset / REG_SIZE, inst.regs_read(i).max(1));
            }
        }
    }
    for unit in 0..shader.first_non_payload_grf {
        reserved.remove(unit);
    }
    reserved
}

fn attempt(shader: &mut Shader, session: &CompilationSession) -> Attempt {
    let live = shader.live();
    let costs = spill::spill_costs(shader);
    let num_units = shader.devinfo.allocatable_grf_count();
    let mut g = InterferenceGraph::new(session.arena(), num_units);

    let count = shader.alloc.len() as u32;
    for (nr, size) in shader.alloc.iter() {
        let class = g.class_for_size(size);
        let node = g.add_node(class);
        debug_assert_eq!(node, nr);
        match costs[nr as usize] {
            Some(cost) => g.set_spill_cost(node, cost),
            None => g.set_unspillable(node),
        }
    }
    let single = g.class_for_size(1);
    let reserved = reserved_units(shader);
    let fixed = (0..shader.first_non_payload_grf).chain(reserved.iter().filter(|&u| u < num_units));
    for unit in fixed {
        let node = g.add_node(single);
        g.set_precolor(node, unit);
        for nr in 0..count {
            g.add_edge(node, nr);
        }
    }

    for a in 0..count {
        for b in 0..a {
            if live.vgrfs_interfere(a, b) {
                g.add_edge(a, b);
            }
        }
    }
    for (_, inst) in shader.cfg.instructions() {
        if inst.dst.file != RegFile::Vgrf || !inst.has_source_destination_hazard() {
            continue;
        }
        for src in inst.srcs() {
            if src.file == RegFile::Vgrf && src.nr != inst.dst.nr {
                g.add_edge(inst.dst.nr, src.nr);
            }
        }
    }

    match g.solve() {
        Some(units) => Attempt::Colored(units),
        None => g.best_spill_node().map_or(Attempt::Stuck, Attempt::Spill),
    }
}

/// Rewrite every VGRF operand to the physical register it was given.
fn assign(shader: &mut Shader, hw_reg: &[u32]) {
    for inst in shader.cfg.instructions_mut() {
        let dst = &mut inst.dst;
        if dst.file == RegFile::Vgrf {
            dst.file = RegFile::Fixed;
            dst.nr = hw_reg[dst.nr as usize] + dst.offset / REG_SIZE;
            dst.offset %= REG_SIZE;
        }
        for src in inst.src.iter_mut() {
            if src.file == RegFile::Vgrf {
                src.file = RegFile::Fixed;
                src.nr = hw_reg[src.nr as usize] + src.offset / REG_SIZE;
                src.offset %= REG_SIZE;
            }
        }
    }
}

/// Highest physical register touched by the program, plus one.
fn registers_used(shader: &Shader) -> u32 {
    let mut used = shader.first_non_payload_grf;
    for (_, inst) in shader.cfg.instructions() {
        if inst.dst.file == RegFile::Fixed {
            used = used.max(inst.dst.nr + inst.regs_written().max(1));
        }
        for i in 0..inst.num_srcs() {
            if inst.src[i].file == RegFile::Fixed {
                used = used.max(inst.src[i].nr + inst.regs_read(i).max(1));
            }
        }
    }
    used
}

/// Allocate physical registers, spilling and re-optimizing until the graph
/// colors. With `optimize` false the program is not re-optimized between
/// attempts.
pub fn allocate(shader: &mut Shader, session: &mut CompilationSession, optimize: bool) -> CompileResult<Allocation> {
    let mut spill_iterations = 0;
    loop {
        session.record_allocation_attempt();
        let outcome = attempt(shader, session);
        session.reset_arena();

        match outcome {
            Attempt::Colored(units) => {
                let hw_reg: Vec<u32> = units[..shader.alloc.len()].to_vec();
                assign(shader, &hw_reg);
                shader.alloc.freeze();
                shader.invalidate_live();
                let grf_used = registers_used(shader);
                log::info!(
                    "allocated {} vgrf(s) into {grf_used} register(s) after {spill_iterations} spill(s)",
                    hw_reg.len()
                );
                return Ok(Allocation { hw_reg, grf_used });
            }
            Attempt::Spill(nr) => {
                let bytes = shader.alloc.size(nr) * REG_SIZE;
                if shader.scratch_bytes + bytes > shader.devinfo.max_scratch_bytes {
                    log::debug!("vgrf{nr} does not fit in the remaining scratch memory");
                    return Err(out_of_registers(shader, spill_iterations));
                }
                log::debug!("allocation attempt failed, spilling vgrf{nr}");
                spill::spill_reg(shader, nr)?;
                session.record_spill(nr);
                spill_iterations += 1;
                if optimize {
                    opt::optimize(shader, session)?;
                }
            }
            Attempt::Stuck => return Err(out_of_registers(shader, spill_iterations)),
        }
    }
}

fn out_of_registers(shader: &mut Shader, spill_iterations: u32) -> CompileError {
    let live_values = max_live_units(shader);
    let num_units = shader.devinfo.allocatable_grf_count();
    let reserved = reserved_units(shader).iter().filter(|&u| u < num_units).count() as u32;
    let available = num_units
        .saturating_sub(shader.first_non_payload_grf)
        .saturating_sub(reserved);
    CompileError::OutOfRegisters {
        live_values,
        available,
        spill_iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceInfo;
    use crate::ir::{Dst, Instruction, Opcode, Program, RegType, Src};

    fn attr() -> Src {
        Src::reg(RegFile::Attr, 0, RegType::F)
    }

    /// `n` values all live at the final instruction.
    fn pressure(n: u32) -> Program {
        let mut program = Program::new();
        program.nr_attributes = 1;
        for i in 0..n {
            program.alloc.allocate(1).unwrap();
            program
                .instructions
                .push(Instruction::new(Opcode::Mul, Dst::vgrf(i, RegType::F), &[attr(), Src::imm_f(i as f32 + 2.0)]));
        }
        let sum = program.alloc.allocate(1).unwrap();
        program
            .instructions
            .push(Instruction::new(Opcode::Add, Dst::vgrf(sum, RegType::F), &[Src::vgrf(0, RegType::F), Src::vgrf(1, RegType::F)]));
        for i in 2..n {
            program.instructions.push(Instruction::new(
                Opcode::Add,
                Dst::vgrf(sum, RegType::F),
                &[Src::vgrf(sum, RegType::F), Src::vgrf(i, RegType::F)],
            ));
        }
        program
            .instructions
            .push(Instruction::mov(Dst::reg(RegFile::Mrf, 1, RegType::F), Src::vgrf(sum, RegType::F)));
        program
    }

    fn prepared(devinfo: DeviceInfo, program: Program) -> Shader {
        let mut shader = Shader::new(devinfo, program).unwrap();
        crate::lower::payload::run(&mut shader).unwrap();
        shader
    }

    #[test]
    fn interfering_values_get_disjoint_registers() {
        let mut shader = prepared(DeviceInfo::gen6(), pressure(4));
        let live = shader.live();
        let mut session = CompilationSession::new();
        let alloc = allocate(&mut shader, &mut session, true).unwrap();
        for a in 0..alloc.hw_reg.len() as u32 {
            for b in 0..a {
                if live.vgrfs_interfere(a, b) {
                    assert_ne!(alloc.hw_reg[a as usize], alloc.hw_reg[b as usize], "vgrf{a} vs vgrf{b}");
                }
            }
            assert!(alloc.hw_reg[a as usize] >= shader.first_non_payload_grf);
        }
        assert_eq!(session.stats().spill_iterations, 0);
        assert!(shader.alloc.is_frozen());
        assert!(shader.instructions().iter().all(|i| i.dst.file != RegFile::Vgrf));
    }

    #[test]
    fn unspillable_pressure_is_fatal() {
        // Two payload registers leave two units; three-unit values cannot
        // be spilled.
        let mut program = Program::new();
        program.nr_attributes = 1;
        let big = program.alloc.allocate(3).unwrap();
        let mut dst = Dst::vgrf(big, RegType::F);
        dst.offset = 2 * REG_SIZE;
        program.instructions = vec![
            Instruction::mov(dst, attr()),
            Instruction::mov(Dst::reg(RegFile::Mrf, 1, RegType::F), {
                let mut s = Src::vgrf(big, RegType::F);
                s.offset = 2 * REG_SIZE;
                s
            }),
        ];
        let mut shader = prepared(DeviceInfo::gen6().with_grf_count(4), program);
        let mut session = CompilationSession::new();
        let err = allocate(&mut shader, &mut session, true).unwrap_err();
        assert!(matches!(err, CompileError::OutOfRegisters { available: 2, spill_iterations: 0, .. }), "{err}");
    }

    #[test]
    fn exhausted_scratch_is_out_of_registers() {
        // Four free units for five products: a spill is needed but no
        // scratch space exists.
        let mut devinfo = DeviceInfo::gen6().with_grf_count(6);
        devinfo.max_scratch_bytes = 0;
        let mut shader = prepared(devinfo, pressure(5));
        let mut session = CompilationSession::new();
        let err = allocate(&mut shader, &mut session, true).unwrap_err();
        assert!(
            matches!(err, CompileError::OutOfRegisters { available: 4, spill_iterations: 0, .. }),
            "{err}"
        );
        assert_eq!(shader.scratch_bytes, 0);
    }

    #[test]
    fn named_registers_are_reserved() {
        let mut program = pressure(2);
        program
            .instructions
            .insert(0, Instruction::mov(Dst::reg(RegFile::Fixed, 3, RegType::F), attr()));
        let shader = prepared(DeviceInfo::gen6(), program);
        let reserved = reserved_units(&shader);
        // The attribute read lives in the payload and is not reserved here.
        assert_eq!(reserved.iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn max_live_counts_units() {
        let mut shader = Shader::new(DeviceInfo::gen7(), pressure(5)).unwrap();
        // All five products are live when the first add runs.
        assert_eq!(max_live_units(&mut shader), 5);
    }
}
