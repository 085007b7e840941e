//! Program analyses: control-flow graph and live variables.

pub mod bitset;
pub mod cfg;
pub mod liveness;

pub use bitset::BitSet;
pub use cfg::{BasicBlock, Cfg};
pub use liveness::{var_index, visit_dst_vars, visit_reg_vars, visit_src_vars, LiveVariables, VARS_PER_UNIT};
