//! Text IR: a line-oriented assembly form of the instruction stream.
//!
//! Used by tests and the `vec4c` command line driver. The format is
//! designed to be:
//! - Human-readable and writable
//! - Exactly what [`print_program`] emits, so programs round-trip
//! - Close to the operand model, one instruction per line
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! .attributes 2            ; optional, inferred from attrN uses
//! .uniforms 4              ; optional, inferred from uN uses
//! .uniform_array 0 4       ; uniforms 0..4 form one indexable array
//! .decl vgrf0 size=2       ; registers are one unit unless declared
//! mul vgrf1:f, attr0:f, 2.0f
//! cmp.ge null:f, vgrf1:f, 0.0f
//! (+f0) sel vgrf2:f, vgrf1.xxxx:f, -|vgrf3|:f
//! mov vgrf0+32.xy:f, u1[vgrf4.xxxx:d]:f
//! urb_write null:ud, m0:ud mlen=2 base_mrf=0
//! ```
//!
//! Registers are `vgrfN`, `gN` (physical), `mN`, `attrN`, `uN` and `null`,
//! followed by an optional `[reladdr]`, a `+byte_offset`, a writemask or
//! swizzle and a `:type`. Immediates carry their type as a suffix (`f`, `d`,
//! `u`, `w`, `uw`) or are written `vf[a, b, c, d]`. Trailing `key=value`
//! attributes set exec size, group, message fields and bytes written.

pub mod check;
pub mod parser;
pub mod printer;

pub use check::{render, CheckDirective, RunOptions, TestRunner, TestSpec};
pub use parser::{parse_instruction, parse_program, ParseError};
pub use printer::{print_instructions, print_program};
