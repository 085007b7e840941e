//! Virtual vec4 IR: operands, instructions and the register table.
//!
//! Instructions operate on four logical lanes. A register unit holds two
//! vec4 halves of 32-bit data, one per SIMD4x2 thread.

pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod program;
pub mod types;
pub mod vgrf;

/// Size of one register unit in bytes.
pub const REG_SIZE: u32 = 32;

pub use instruction::Instruction;
pub use opcode::{CondMod, OpInfo, OpKind, Opcode, Predicate};
pub use operand::{f32_to_vf, vf_to_f32, Dst, RegFile, Region, Src};
pub use program::Program;
pub use types::{RegType, Swizzle, WriteMask, NUM_LANES};
pub use vgrf::VirtualGrfTable;
