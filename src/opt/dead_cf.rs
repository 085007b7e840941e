//! Dead control-flow elimination.
//!
//! Removes empty `if`/`endif` pairs, drops an `else` directly followed by
//! its `endif`, and turns an `if` directly followed by `else` into an
//! inverted `if`. The CFG is rebuilt afterwards.

use crate::core::error::CompileResult;
use crate::ir::{Instruction, Opcode};
use crate::shader::Shader;

pub fn run(shader: &mut Shader) -> CompileResult<bool> {
    let insts = shader.cfg.to_instructions();
    let mut out: Vec<Instruction> = Vec::with_capacity(insts.len());
    let mut progress = false;

    for inst in insts {
        let prev = out.last().map(|i| i.opcode);
        match (prev, inst.opcode) {
            (Some(Opcode::Else), Opcode::Endif) => {
                out.pop();
                out.push(inst);
                progress = true;
            }
            (Some(Opcode::If), Opcode::Endif) => {
                out.pop();
                progress = true;
            }
            (Some(Opcode::If), Opcode::Else) => {
                if let Some(if_inst) = out.last_mut() {
                    if_inst.predicate_inverse = !if_inst.predicate_inverse;
                }
                progress = true;
            }
            _ => out.push(inst),
        }
    }

    if progress {
        log::debug!("dead control flow: {} -> {} instructions", shader.num_instructions(), out.len());
        shader.cfg = crate::analysis::Cfg::build(out)?;
        shader.invalidate_live();
    }
    Ok(progress)
}
