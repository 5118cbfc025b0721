//! Compile errors.
//!
//! `compile` aborts on the first error and returns it; no partial graph is
//! ever produced. Declaration errors are recorded while the builder
//! accumulates (builder operations stay side-effect-free) and surface at
//! compile time.

use thiserror::Error;
use vermeil_rhi::{ResourceState, RhiError};

#[derive(Clone, Debug, Error)]
pub enum CompileError {
    /// Unknown handle, attachment over capacity, conflicting external
    /// registration, mismatched attachment dimensions and friends.
    #[error("declaration error: {0}")]
    Declaration(String),

    /// Conflicting accesses discovered while walking the pass list.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Device memory exhaustion or no suitable memory type.
    #[error("allocation error: {0}")]
    Allocation(#[from] RhiError),

    /// Incomplete shader-stage sets, reflection mismatches, unsupported
    /// state combinations.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// A state pair missing from the transition table. Planner bugs crash
    /// in debug builds; this surfaces the pair when reported lazily.
    #[error("state transition error: no path from {old:?} to {new:?}")]
    Transition {
        old: ResourceState,
        new: ResourceState,
    },
}
