// The top-level driver. A Vec4Compiler owns one compilation session and runs a program
// through the whole back end: CFG construction, hardware checks, indirect-access
// lowering, register splitting, the optimization loop, SIMD-width lowering, payload
// setup, register allocation and the final encoder-boundary validation. Passes never
// decide what is fatal; the first error any stage returns ends the compilation and is
// handed to the caller unchanged.

//! Compilation driver.

use crate::core::error::CompileResult;
use crate::core::{CompilationSession, DeviceInfo, SessionStats};
use crate::ir::{Instruction, Program};
use crate::lower::{hw_support, indirect, payload, simd_width, validate};
use crate::opt::{self, dce, split_vgrf};
use crate::regalloc;
use crate::shader::Shader;

/// Knobs for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run the optimization loop, before allocation and between spills.
    pub optimize: bool,
    /// Split multi-unit registers that are only accessed one unit at a time.
    pub split_registers: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            split_registers: true,
        }
    }
}

/// A program ready for the encoder.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Final instructions, every operand physical.
    pub instructions: Vec<Instruction>,
    /// Registers used, payload included.
    pub grf_used: u32,
    /// Scratch memory in bytes.
    pub scratch_bytes: u32,
    /// Pull-constant buffer in bytes.
    pub pull_constant_bytes: u32,
    pub first_non_payload_grf: u32,
    pub stats: SessionStats,
}

/// Compiles programs for one device.
pub struct Vec4Compiler {
    devinfo: DeviceInfo,
    options: CompileOptions,
    session: CompilationSession,
}

impl Vec4Compiler {
    pub fn new(devinfo: DeviceInfo) -> Self {
        Self::with_options(devinfo, CompileOptions::default())
    }

    pub fn with_options(devinfo: DeviceInfo, options: CompileOptions) -> Self {
        Self {
            devinfo,
            options,
            session: CompilationSession::new(),
        }
    }

    pub fn devinfo(&self) -> &DeviceInfo {
        &self.devinfo
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Statistics of the last compilation.
    pub fn stats(&self) -> &SessionStats {
        self.session.stats()
    }

    /// Run everything up to and including the optimization loop, and return
    /// the shader in that state.
    pub fn optimize(&mut self, program: Program) -> CompileResult<Shader> {
        self.session = CompilationSession::new();
        self.session.stats_mut().instructions_in = program.instructions.len();

        let mut shader = Shader::new(self.devinfo.clone(), program)?;
        hw_support::run(&shader)?;

        if indirect::run(&mut shader)? {
            log::debug!(
                "indirect accesses lowered: {} scratch byte(s), {} pull constant byte(s)",
                shader.scratch_bytes,
                shader.pull_constant_bytes
            );
        }
        if self.options.split_registers && split_vgrf::run(&mut shader)? {
            log::debug!("split multi-unit registers, {} vgrf(s) now", shader.alloc.len());
        }
        if self.options.optimize {
            let rounds = opt::optimize(&mut shader, &mut self.session)?;
            log::debug!("optimization reached a fixed point after {rounds} round(s)");
        }
        Ok(shader)
    }

    /// Compile a program all the way to encoder-ready instructions.
    pub fn compile(&mut self, program: Program) -> CompileResult<CompiledProgram> {
        let mut shader = self.optimize(program)?;

        if simd_width::run(&mut shader)? {
            dce::run(&mut shader)?;
        }
        let layout = payload::run(&mut shader)?;
        let alloc = regalloc::allocate(&mut shader, &mut self.session, self.options.optimize)?;

        let instructions = shader.instructions();
        validate::run(&self.devinfo, &instructions)?;

        let stats = self.session.stats_mut();
        stats.instructions_out = instructions.len();
        stats.scratch_bytes = shader.scratch_bytes;
        stats.grf_used = alloc.grf_used;
        let stats = stats.clone();

        log::info!(
            "compiled for {}: {} -> {} instruction(s), {} register(s), {} spill(s), {} scratch byte(s)",
            self.devinfo.name,
            stats.instructions_in,
            stats.instructions_out,
            stats.grf_used,
            stats.spill_iterations,
            stats.scratch_bytes
        );

        Ok(CompiledProgram {
            instructions,
            grf_used: alloc.grf_used,
            scratch_bytes: shader.scratch_bytes,
            pull_constant_bytes: shader.pull_constant_bytes,
            first_non_payload_grf: layout.first_non_payload_grf,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompileError;
    use crate::ir::{Dst, Opcode, RegFile, RegType, Src};

    fn program() -> Program {
        let mut program = Program::new();
        program.nr_attributes = 2;
        program.alloc.allocate(1).unwrap();
        program.alloc.allocate(1).unwrap();
        let a = |nr| Src::reg(RegFile::Attr, nr, RegType::F);
        program.instructions = vec![
            Instruction::new(Opcode::Mul, Dst::vgrf(0, RegType::F), &[a(0), a(1)]),
            Instruction::mov(Dst::vgrf(1, RegType::F), Src::vgrf(0, RegType::F)),
            Instruction::mov(Dst::reg(RegFile::Mrf, 1, RegType::F), Src::vgrf(1, RegType::F)),
            {
                let mut urb = Instruction::new(Opcode::UrbWrite, Dst::null(RegType::UD), &[Src::reg(RegFile::Mrf, 0, RegType::UD)]);
                urb.mlen = 2;
                urb.base_mrf = Some(0);
                urb
            },
        ];
        program
    }

    #[test]
    fn compiles_to_physical_registers() {
        let mut compiler = Vec4Compiler::new(DeviceInfo::gen6());
        let out = compiler.compile(program()).unwrap();
        // r0 plus two attributes.
        assert_eq!(out.first_non_payload_grf, 3);
        assert!(out.grf_used >= 3);
        assert_eq!(out.stats.instructions_in, 4);
        assert_eq!(out.stats.instructions_out, out.instructions.len());
        assert!(out.instructions.len() < 4);
        assert!(out.stats.opt_rounds >= 1);
        assert_eq!(out.stats.spill_iterations, 0);
    }

    #[test]
    fn disabled_optimization_keeps_copies() {
        let options = CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        };
        let mut compiler = Vec4Compiler::with_options(DeviceInfo::gen7(), options);
        let out = compiler.compile(program()).unwrap();
        assert_eq!(out.instructions.len(), 4);
        assert_eq!(out.stats.opt_rounds, 0);
    }

    #[test]
    fn unsupported_constructs_stop_before_allocation() {
        let mut program = program();
        program.instructions[0].src[1] = Src::imm_f(2.0);
        program.instructions[0].opcode = Opcode::Pow;
        let mut compiler = Vec4Compiler::new(DeviceInfo::gen6());
        let err = compiler.compile(program).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { device: "gen6", .. }), "{err}");
        assert_eq!(compiler.stats().allocation_attempts, 0);
    }
}
