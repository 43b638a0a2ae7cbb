//! Compilation of dialogue move logs into designs
//!
//! - `compiler`: the forward pass from moves to acts and the batched writes
//! - `scope`: topic/argument partitioning and scope metadata
//! - `lock`: per-dialogue FIFO lock serializing recompiles

pub mod compiler;
pub mod lock;
pub mod scope;

pub use compiler::{CompileOutcome, CompiledScope, Compiler, SkippedAct};
pub use lock::{CompileGuard, CompileLock};
pub use scope::{partition_moves, scope_metadata, ScopePartition};
