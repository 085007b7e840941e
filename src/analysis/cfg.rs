// This module partitions the linear instruction stream into basic blocks and links them
// with successor and predecessor edges. Block leaders are the first instruction, every
// instruction following IF, ELSE, BREAK, CONTINUE or WHILE, and every ENDIF and DO.
// Blocks own their instructions; the instruction pointer (ip) of each instruction is the
// position it would have in the flattened program and is recomputed by `renumber` after
// any pass removes or inserts instructions. Control-flow edits are handled by flattening
// and rebuilding the graph.

//! Control-flow graph construction.

use crate::core::error::{malformed, CompileResult};
use crate::ir::{Instruction, Opcode};

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
    /// Ip of the first instruction.
    pub start_ip: usize,
    /// One past the ip of the last instruction.
    pub end_ip: usize,
    pub succs: Vec<usize>,
    pub preds: Vec<usize>,
    /// Number of enclosing DO/WHILE loops.
    pub loop_depth: u32,
}

impl BasicBlock {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Ip of the last instruction, if the block has any.
    pub fn last_ip(&self) -> Option<usize> {
        (self.end_ip > self.start_ip).then(|| self.end_ip - 1)
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Drop every instruction turned into a no-op.
    pub fn remove_nops(&mut self) -> usize {
        let before = self.instructions.len();
        self.instructions.retain(|inst| !inst.is_nop());
        before - self.instructions.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    /// Block index of every ip.
    ip_block: Vec<usize>,
}

/// Matching control-flow partners of one IF or loop.
#[derive(Debug, Default, Clone, Copy)]
struct Partners {
    else_ip: Option<usize>,
    end_ip: usize,
    do_ip: usize,
}

impl Cfg {
    /// Build the graph for `insts`.
    pub fn build(insts: Vec<Instruction>) -> CompileResult<Cfg> {
        let partners = match_structure(&insts)?;
        let len = insts.len();

        let mut leader = vec![false; len + 1];
        leader[0] = true;
        for (ip, inst) in insts.iter().enumerate() {
            match inst.opcode {
                Opcode::If | Opcode::Else | Opcode::Break | Opcode::Continue | Opcode::While => {
                    leader[ip + 1] = true
                }
                Opcode::Endif | Opcode::Do => leader[ip] = true,
                _ => {}
            }
        }
        // A trailing leader only yields a block when something jumps past
        // the end of the program.
        let trailing = len > 0 && leader[len];

        let mut block_start: Vec<usize> = (0..len).filter(|&ip| leader[ip]).collect();
        if trailing || len == 0 {
            block_start.push(len);
        }
        let mut ip_block = vec![0usize; len + 1];
        let mut blocks: Vec<BasicBlock> = Vec::with_capacity(block_start.len());
        let mut iter = insts.into_iter();
        for (b, &start) in block_start.iter().enumerate() {
            let end = block_start.get(b + 1).copied().unwrap_or(len);
            for slot in &mut ip_block[start..end] {
                *slot = b;
            }
            let instructions: Vec<Instruction> = iter.by_ref().take(end - start).collect();
            blocks.push(BasicBlock {
                instructions,
                start_ip: start,
                end_ip: end,
                ..BasicBlock::default()
            });
        }
        ip_block[len] = blocks.len() - 1;

        let block_at = |ip: usize| ip_block[ip.min(len)];
        let mut depth = 0u32;
        for b in 0..blocks.len() {
            let mut succs = Vec::new();
            let opens_loop = matches!(blocks[b].instructions.first(), Some(i) if i.opcode == Opcode::Do);
            blocks[b].loop_depth = depth + u32::from(opens_loop);
            let Some(last) = blocks[b].instructions.last() else {
                continue;
            };
            let last_ip = blocks[b].end_ip - 1;
            let fallthrough = b + 1 < blocks.len();
            match last.opcode {
                Opcode::If => {
                    let p = partners[last_ip];
                    succs.push(block_at(last_ip + 1));
                    succs.push(match p.else_ip {
                        Some(e) => block_at(e + 1),
                        None => block_at(p.end_ip),
                    });
                }
                Opcode::Else => succs.push(block_at(partners[last_ip].end_ip)),
                Opcode::Break | Opcode::Continue | Opcode::While => {
                    let p = partners[last_ip];
                    let target = match last.opcode {
                        Opcode::Break => block_at(p.end_ip + 1),
                        _ => block_at(p.do_ip),
                    };
                    succs.push(target);
                    if last.is_predicated() && fallthrough {
                        succs.push(b + 1);
                    }
                }
                _ if fallthrough => succs.push(b + 1),
                _ => {}
            }
            succs.dedup();
            blocks[b].succs = succs;

            for inst in &blocks[b].instructions {
                match inst.opcode {
                    Opcode::Do => depth += 1,
                    Opcode::While => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
        for b in 0..blocks.len() {
            for s in blocks[b].succs.clone() {
                if !blocks[s].preds.contains(&b) {
                    blocks[s].preds.push(b);
                }
            }
        }

        let mut cfg = Cfg { blocks, ip_block };
        cfg.renumber();
        log::trace!("built cfg with {} blocks", cfg.blocks.len());
        Ok(cfg)
    }

    /// Recompute ip ranges and the ip to block index after edits.
    pub fn renumber(&mut self) {
        let mut ip = 0;
        self.ip_block.clear();
        for (b, block) in self.blocks.iter_mut().enumerate() {
            block.start_ip = ip;
            ip += block.instructions.len();
            block.end_ip = ip;
            self.ip_block.extend(std::iter::repeat(b).take(block.instructions.len()));
        }
    }

    pub fn num_instructions(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block holding instruction `ip`.
    pub fn block_of(&self, ip: usize) -> Option<usize> {
        self.ip_block.get(ip).copied()
    }

    /// Every instruction in program order, with its block index.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.instructions.iter().map(move |inst| (b, inst)))
    }

    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut())
    }

    /// Remove no-ops from every block. Returns whether any were removed.
    pub fn remove_nops(&mut self) -> bool {
        let removed: usize = self.blocks.iter_mut().map(BasicBlock::remove_nops).sum();
        if removed > 0 {
            self.renumber();
        }
        removed > 0
    }

    /// Linear instruction list, consuming the graph.
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.blocks.into_iter().flat_map(|b| b.instructions).collect()
    }

    /// Linear copy of the instruction list.
    pub fn to_instructions(&self) -> Vec<Instruction> {
        self.instructions().map(|(_, inst)| inst.clone()).collect()
    }
}

/// Pair every IF with its ELSE/ENDIF and every loop op with its DO/WHILE.
fn match_structure(insts: &[Instruction]) -> CompileResult<Vec<Partners>> {
    enum Open {
        If(usize),
        Loop(usize),
    }
    let mut partners = vec![Partners::default(); insts.len()];
    let mut stack: Vec<Open> = Vec::new();
    // Break/continue ips waiting for the innermost WHILE.
    let mut loop_jumps: Vec<Vec<usize>> = Vec::new();
    // Else ips waiting for their ENDIF.
    let mut pending_else: Vec<Option<usize>> = Vec::new();

    for (ip, inst) in insts.iter().enumerate() {
        match inst.opcode {
            Opcode::If => {
                stack.push(Open::If(ip));
                pending_else.push(None);
            }
            Opcode::Else => {
                let Some(Open::If(if_ip)) = stack.last() else {
                    return Err(malformed(format!("ip {ip}: else without matching if")));
                };
                let if_ip = *if_ip;
                let slot = pending_else.last_mut().ok_or_else(|| malformed("unbalanced if"))?;
                if slot.is_some() {
                    return Err(malformed(format!("ip {ip}: second else for if at ip {if_ip}")));
                }
                *slot = Some(ip);
                partners[if_ip].else_ip = Some(ip);
            }
            Opcode::Endif => {
                let Some(Open::If(if_ip)) = stack.pop() else {
                    return Err(malformed(format!("ip {ip}: endif without matching if")));
                };
                partners[if_ip].end_ip = ip;
                if let Some(Some(else_ip)) = pending_else.pop() {
                    partners[else_ip].end_ip = ip;
                }
            }
            Opcode::Do => {
                stack.push(Open::Loop(ip));
                loop_jumps.push(Vec::new());
            }
            Opcode::Break | Opcode::Continue => {
                if !stack.iter().any(|o| matches!(o, Open::Loop(_))) {
                    return Err(malformed(format!("ip {ip}: {} outside of a loop", inst.opcode)));
                }
                if let Some(jumps) = loop_jumps.last_mut() {
                    jumps.push(ip);
                }
            }
            Opcode::While => {
                let Some(Open::Loop(do_ip)) = stack.pop() else {
                    return Err(malformed(format!("ip {ip}: while without matching do")));
                };
                partners[ip] = Partners { else_ip: None, end_ip: ip, do_ip };
                for j in loop_jumps.pop().unwrap_or_default() {
                    partners[j] = Partners { else_ip: None, end_ip: ip, do_ip };
                }
                partners[do_ip].end_ip = ip;
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        let (what, ip) = match open {
            Open::If(ip) => ("if", *ip),
            Open::Loop(ip) => ("do", *ip),
        };
        return Err(malformed(format!("ip {ip}: unterminated {what}")));
    }
    Ok(partners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Dst, Predicate, RegType, Src};

    fn alu(n: u32) -> Instruction {
        Instruction::mov(Dst::vgrf(n, RegType::F), Src::imm_f(n as f32))
    }

    fn cf(op: Opcode) -> Instruction {
        Instruction::bare(op)
    }

    fn pred(op: Opcode) -> Instruction {
        Instruction::bare(op).with_predicate(Predicate::Normal)
    }

    #[test]
    fn if_else_endif_edges() {
        let cfg = Cfg::build(vec![
            alu(0),
            pred(Opcode::If),
            alu(1),
            cf(Opcode::Else),
            alu(2),
            cf(Opcode::Endif),
            alu(3),
        ])
        .unwrap();
        assert_eq!(cfg.num_blocks(), 4);
        assert_eq!(cfg.blocks[0].succs, vec![1, 2]);
        assert_eq!(cfg.blocks[1].succs, vec![3]);
        assert_eq!(cfg.blocks[2].succs, vec![3]);
        assert_eq!(cfg.blocks[3].preds, vec![1, 2]);
        assert_eq!(cfg.block_of(5), Some(3));
    }

    #[test]
    fn if_without_else_reaches_endif() {
        let cfg = Cfg::build(vec![pred(Opcode::If), alu(1), cf(Opcode::Endif)]).unwrap();
        assert_eq!(cfg.blocks[0].succs, vec![1, 2]);
        assert_eq!(cfg.blocks[1].succs, vec![2]);
    }

    #[test]
    fn loop_with_break_and_continue() {
        let cfg = Cfg::build(vec![
            alu(0),
            cf(Opcode::Do),
            alu(1),
            pred(Opcode::Break),
            alu(2),
            pred(Opcode::Continue),
            alu(3),
            pred(Opcode::While),
            alu(4),
        ])
        .unwrap();
        // b0: mov | b1: do mov break | b2: mov continue | b3: mov while | b4: mov
        assert_eq!(cfg.num_blocks(), 5);
        assert_eq!(cfg.blocks[0].succs, vec![1]);
        assert_eq!(cfg.blocks[1].succs, vec![4, 2]);
        assert_eq!(cfg.blocks[2].succs, vec![1, 3]);
        assert_eq!(cfg.blocks[3].succs, vec![1, 4]);
        assert_eq!(cfg.blocks[0].loop_depth, 0);
        assert_eq!(cfg.blocks[1].loop_depth, 1);
        assert_eq!(cfg.blocks[3].loop_depth, 1);
        assert_eq!(cfg.blocks[4].loop_depth, 0);
    }

    #[test]
    fn mismatched_structure_is_rejected() {
        assert!(Cfg::build(vec![cf(Opcode::Endif)]).is_err());
        assert!(Cfg::build(vec![pred(Opcode::If), alu(0)]).is_err());
        assert!(Cfg::build(vec![cf(Opcode::Break)]).is_err());
        assert!(Cfg::build(vec![cf(Opcode::Do), cf(Opcode::Endif)]).is_err());
    }

    #[test]
    fn renumber_after_removal() {
        let mut cfg = Cfg::build(vec![alu(0), alu(1), pred(Opcode::If), alu(2), cf(Opcode::Endif)]).unwrap();
        cfg.blocks[0].instructions[1].make_nop();
        assert!(cfg.remove_nops());
        assert_eq!(cfg.blocks[1].start_ip, 2);
        assert_eq!(cfg.num_instructions(), 4);
    }
}
