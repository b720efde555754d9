/*! Whole-program, context-sensitive pointer analysis.
 *
 * The engine runs a semi-sparse abstract interpretation over the IR of `tessera-ir`: SSA-level
 * points-to facts propagate along def-use edges, heap facts propagate along a reduced
 * control-flow graph, and indirect calls are resolved on the fly, growing a context-sensitive
 * call graph until a fixpoint is reached. External library calls are modeled by the effect
 * tables of `tessera-annot`.
 *
 * All interned state (contexts, memory objects, points-to sets, pointers) is owned by one
 * analysis run; nothing is process-global, so independent runs are isolated.
 */

pub mod callgraph;
pub mod context;
pub mod engine;
pub mod memory;
pub mod pointer;
pub mod program;
pub mod pts;
pub mod query;

pub use callgraph::CallGraph;
pub use context::{ContextId, ContextTable};
pub use memory::{AllocSite, MemoryManager, ObjId};
pub use pointer::{PointerManager, PtrId, ValueRef};
pub use program::{FunctionContext, ProgramPoint, SemiSparseProgram};
pub use pts::{Env, PtsSetId, PtsSetPool, Store};
pub use query::{AliasResult, PointerAnalysis};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("module has no entry function `{0}`")]
    MissingEntry(String),
    #[error("no pointer effect summary for external function `{0}`")]
    MissingSummary(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// How call-string contexts grow at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Classical k-CFA: pushing beyond depth k is a no-op.
    KLimit(u32),
    /// Push only at call sites in the context table's watch set. The watch
    /// set is populated by an external precision-tracking driver.
    Adaptive,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub context_mode: ContextMode,
    /// Name of the program entry function, used when the module does not
    /// designate one.
    pub entry: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_mode: ContextMode::KLimit(1),
            entry: "main".into(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_k_limit(k: u32) -> Self {
        Self {
            context_mode: ContextMode::KLimit(k),
            ..Self::default()
        }
    }
}
