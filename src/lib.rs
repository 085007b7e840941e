//! vec4c - the instruction-level back end of a vec4 (SIMD4x2) shader compiler.
//!
//! A front end hands over a stream of 4-lane vector instructions over
//! virtual registers. The back end builds the control-flow graph, computes
//! channel-granular liveness, optimizes to a fixed point, lowers inputs and
//! SIMD width, and allocates physical registers by graph coloring with
//! spill-and-retry. The result is ready for an external encoder.
//!
//! # Primary Usage
//!
//! ```
//! use vec4c::compiler::Vec4Compiler;
//! use vec4c::core::DeviceInfo;
//! use vec4c::test_ir::parse_program;
//!
//! let program = parse_program(
//!     "mul vgrf0:f, attr0:f, 2.0f
//!      mov m1:f, vgrf0:f
//!      urb_write null:ud, m0:ud mlen=2 base_mrf=0",
//! )
//! .unwrap();
//! let compiled = Vec4Compiler::new(DeviceInfo::gen6()).compile(program).unwrap();
//! assert!(compiled.grf_used >= compiled.first_non_payload_grf);
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - Operands, instructions, opcodes and the virtual register table
//! - [`analysis`] - CFG and live-variable analysis
//! - [`opt`] - Optimization passes and the fixed-point driver
//! - [`lower`] - Hardware checks, indirect access, SIMD width, payload, validation
//! - [`regalloc`] - Graph-coloring register allocation with spilling
//! - [`compiler`] - The end-to-end driver
//! - [`test_ir`] - Text form of programs, used by tests and the command line

pub mod analysis;
pub mod compiler;
pub mod core;
pub mod ir;
pub mod lower;
pub mod opt;
pub mod regalloc;
pub mod shader;
pub mod test_ir;

pub use crate::compiler::{CompileOptions, CompiledProgram, Vec4Compiler};
pub use crate::core::{CompilationSession, CompileError, CompileResult, DeviceInfo, SessionStats};
pub use crate::shader::Shader;
