// This module holds the infrastructure every stage of the back end shares: the error
// taxonomy, the immutable device capability description threaded through each pass, and
// the per-compilation session with its allocator arena and statistics.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - Out-of-registers, malformed IR and unsupported constructs
//!
//! ## Device description (`devinfo`)
//! - Capability flags and register file sizes, with per-generation presets
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`
//! - Compilation statistics

pub mod devinfo;
pub mod error;
pub mod session;

pub use devinfo::DeviceInfo;
pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats};
