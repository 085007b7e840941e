// The optimization pipeline. Each pass is a plain function over the shader that reports
// whether it changed anything and invalidates the analyses it disturbed. The driver runs the
// passes in a fixed order and repeats the whole round until one makes no progress, or until
// the round cap is hit, which is logged and otherwise harmless: every round leaves the program
// in a valid state.

//! Optimization passes and the fixed-point driver.

pub mod algebraic;
pub mod cmod;
pub mod coalesce;
pub mod copy_prop;
pub mod cse;
pub mod dce;
pub mod dead_cf;
pub mod reduce_swizzle;
pub mod split_vgrf;

use crate::core::error::CompileResult;
use crate::core::CompilationSession;
use crate::shader::Shader;

/// A pass: returns whether it made progress.
pub type Pass = fn(&mut Shader) -> CompileResult<bool>;

/// Pipeline passes in the order they run within a round.
pub const PASSES: &[(&str, Pass)] = &[
    ("reduce_swizzle", reduce_swizzle::run),
    ("dead_code_eliminate", dce::run),
    ("dead_control_flow", dead_cf::run),
    ("copy_propagation", copy_prop::run),
    ("cmod_propagation", cmod::run),
    ("cse", cse::run),
    ("algebraic", algebraic::run),
    ("register_coalesce", coalesce::run),
];

/// Upper bound on rounds of the pipeline per invocation.
pub const MAX_ROUNDS: u32 = 64;

/// Run every pass until a full round makes no progress. Returns the number
/// of rounds run.
pub fn optimize(shader: &mut Shader, session: &mut CompilationSession) -> CompileResult<u32> {
    let mut rounds = 0;
    loop {
        rounds += 1;
        session.record_opt_round();
        let mut progress = false;
        for (name, pass) in PASSES {
            if pass(shader)? {
                log::debug!("round {rounds}: {name} made progress ({} instructions)", shader.num_instructions());
                progress = true;
            }
        }
        if !progress {
            break;
        }
        if rounds >= MAX_ROUNDS {
            log::warn!("optimization loop stopped after {MAX_ROUNDS} rounds without reaching a fixed point");
            break;
        }
    }
    Ok(rounds)
}
