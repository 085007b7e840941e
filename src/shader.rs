//! Per-compilation shader state shared by every pass.

use std::sync::Arc;

use crate::analysis::{Cfg, LiveVariables};
use crate::core::error::CompileResult;
use crate::core::DeviceInfo;
use crate::ir::program::UniformArray;
use crate::ir::{Instruction, Program, VirtualGrfTable};

/// The program being compiled, its CFG and cached analyses.
pub struct Shader {
    pub devinfo: DeviceInfo,
    pub alloc: VirtualGrfTable,
    pub cfg: Cfg,
    pub nr_attributes: u32,
    pub nr_uniforms: u32,
    pub uniform_arrays: Vec<UniformArray>,
    /// Push-constant slot of every uniform, `None` once moved to the pull
    /// constant buffer.
    pub push_constant_loc: Vec<Option<u32>>,
    /// Bytes of the pull-constant buffer in use.
    pub pull_constant_bytes: u32,
    /// Bytes of scratch memory in use.
    pub scratch_bytes: u32,
    /// First GRF not occupied by the thread payload.
    pub first_non_payload_grf: u32,
    live: Option<Arc<LiveVariables>>,
}

impl Shader {
    pub fn new(devinfo: DeviceInfo, program: Program) -> CompileResult<Self> {
        let Program {
            alloc,
            instructions,
            nr_attributes,
            nr_uniforms,
            uniform_arrays,
        } = program;
        let cfg = Cfg::build(instructions)?;
        Ok(Shader {
            devinfo,
            alloc,
            cfg,
            nr_attributes,
            nr_uniforms,
            uniform_arrays,
            push_constant_loc: (0..nr_uniforms).map(Some).collect(),
            pull_constant_bytes: 0,
            scratch_bytes: 0,
            first_non_payload_grf: 0,
            live: None,
        })
    }

    /// Liveness for the current instructions, computed on demand.
    pub fn live(&mut self) -> Arc<LiveVariables> {
        if let Some(live) = &self.live {
            return Arc::clone(live);
        }
        self.cfg.renumber();
        let live = Arc::new(LiveVariables::compute(&self.cfg, &self.alloc));
        self.live = Some(Arc::clone(&live));
        live
    }

    /// Drop cached analyses after instructions changed.
    pub fn invalidate_live(&mut self) {
        self.live = None;
        self.cfg.renumber();
    }

    /// Flatten and rebuild the CFG after control-flow edits.
    pub fn rebuild_cfg(&mut self) -> CompileResult<()> {
        let insts = std::mem::take(&mut self.cfg).into_instructions();
        self.cfg = Cfg::build(insts)?;
        self.live = None;
        Ok(())
    }

    /// Uniform array a push-constant slot belongs to.
    pub fn uniform_array_of(&self, slot: u32) -> UniformArray {
        UniformArray::containing(&self.uniform_arrays, self.nr_uniforms, slot)
    }

    /// Allocate a fresh virtual register of `size` units.
    pub fn vgrf(&mut self, size: u32) -> CompileResult<u32> {
        self.alloc.allocate(size)
    }

    pub fn num_instructions(&self) -> usize {
        self.cfg.num_instructions()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.cfg.to_instructions()
    }

    /// Reserve `units` register units of scratch memory. Returns the byte
    /// offset of the reservation.
    pub fn reserve_scratch(&mut self, units: u32) -> u32 {
        let offset = self.scratch_bytes;
        self.scratch_bytes += units * crate::ir::REG_SIZE;
        offset
    }

    /// Current state as a front-end program, for printing.
    pub fn to_program(&self) -> Program {
        Program {
            alloc: self.alloc.clone(),
            instructions: self.instructions(),
            nr_attributes: self.nr_attributes,
            nr_uniforms: self.nr_uniforms,
            uniform_arrays: self.uniform_arrays.clone(),
        }
    }
}
