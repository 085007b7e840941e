// This module provides the per-compilation session: the bumpalo arena that backs the
// interference graph of each allocation attempt, and the statistics gathered while the
// pipeline runs (optimization rounds, spill iterations, spilled registers, instruction
// counts, scratch usage and the final register count). One session belongs to exactly
// one compilation; nothing in it is shared between threads.

//! Arena-based compilation session management.

use bumpalo::Bump;
use std::fmt;

/// State owned by a single compilation.
pub struct CompilationSession {
    /// Arena used for allocator scratch data, reset between attempts.
    arena: Bump,
    /// Session statistics for debugging and tuning.
    stats: SessionStats,
}

impl CompilationSession {
    pub fn new() -> Self {
        Self {
            arena: Bump::new(),
            stats: SessionStats::default(),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &Bump {
        &self.arena
    }

    /// Drop everything allocated in the arena so far.
    pub fn reset_arena(&mut self) {
        self.arena.reset();
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    pub fn into_stats(self) -> SessionStats {
        self.stats
    }

    /// Record one round of the optimization loop.
    pub fn record_opt_round(&mut self) {
        self.stats.opt_rounds += 1;
    }

    /// Record a spill of the given virtual register.
    pub fn record_spill(&mut self, vgrf: u32) {
        self.stats.spill_iterations += 1;
        self.stats.spilled_vgrfs.push(vgrf);
    }

    /// Record an allocation attempt.
    pub fn record_allocation_attempt(&mut self) {
        self.stats.allocation_attempts += 1;
    }
}

impl Default for CompilationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Compilation statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Instructions received from the front end.
    pub instructions_in: usize,
    /// Instructions handed to the encoder.
    pub instructions_out: usize,
    /// Total rounds of the optimization loop, across all retries.
    pub opt_rounds: u32,
    /// Number of graph colorings attempted.
    pub allocation_attempts: u32,
    /// Number of spill-and-retry iterations.
    pub spill_iterations: u32,
    /// Virtual registers that were spilled, in order.
    pub spilled_vgrfs: Vec<u32>,
    /// Scratch memory used, in bytes.
    pub scratch_bytes: u32,
    /// Physical registers used, payload included.
    pub grf_used: u32,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "instructions: {} -> {}", self.instructions_in, self.instructions_out)?;
        writeln!(f, "optimization rounds: {}", self.opt_rounds)?;
        writeln!(
            f,
            "allocation attempts: {} ({} spills)",
            self.allocation_attempts, self.spill_iterations
        )?;
        if !self.spilled_vgrfs.is_empty() {
            writeln!(f, "spilled: {:?}", self.spilled_vgrfs)?;
        }
        writeln!(f, "scratch: {} bytes", self.scratch_bytes)?;
        write!(f, "registers: {}", self.grf_used)
    }
}
