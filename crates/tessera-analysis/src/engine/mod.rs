/*! The worklist-driven fixpoint engine.
 *
 * One [`Solver`] owns every piece of mutable analysis state: the interning pools, the Env, the
 * per-program-point Memo, the call graph and the two-level worklist. Evaluation of a single node
 * is split across the submodules: initial-state seeding in [`globals`], the per-node-kind
 * transfer functions in [`transfer`], and call-boundary store pruning in [`prune`].
 */

pub(crate) mod eval;
mod globals;
pub mod memo;
mod prune;
mod transfer;
mod worklist;

pub use memo::Memo;

use crate::callgraph::CallGraph;
use crate::context::{ContextId, ContextTable};
use crate::memory::MemoryManager;
use crate::pointer::{PointerManager, PtrId, ValueRef};
use crate::program::builder::build_program;
use crate::program::cfg::NodeId;
use crate::program::{FunctionContext, ProgramPoint, SemiSparseProgram};
use crate::pts::{Env, PtsSetPool};
use crate::{AnalysisConfig, AnalysisError, ContextMode, Result};
use eval::EvalResult;
use tessera_ir::{FuncId, Module, Value};
use tracing::debug;
use worklist::TwoLevelWorkList;

/// One analysis run. All interned state lives here; dropping the solver (or
/// the [`crate::PointerAnalysis`] it becomes) frees the whole run.
pub(crate) struct Solver<'a> {
    pub(crate) module: &'a Module,
    pub(crate) table: &'a tessera_annot::EffectTable,
    pub(crate) config: &'a AnalysisConfig,
    pub(crate) program: SemiSparseProgram,
    pub(crate) ctxs: ContextTable,
    pub(crate) ptrs: PointerManager,
    pub(crate) mem: MemoryManager,
    pub(crate) pool: PtsSetPool,
    pub(crate) env: Env,
    pub(crate) memo: Memo,
    pub(crate) callgraph: CallGraph,
    worklist: TwoLevelWorkList,
}

impl<'a> Solver<'a> {
    pub fn new(
        module: &'a Module,
        table: &'a tessera_annot::EffectTable,
        config: &'a AnalysisConfig,
    ) -> Result<Self> {
        let entry = module
            .entry
            .or_else(|| module.function_by_name(&config.entry))
            .filter(|&f| !module.function(f).is_declaration())
            .ok_or_else(|| AnalysisError::MissingEntry(config.entry.clone()))?;

        Ok(Self {
            module,
            table,
            config,
            program: build_program(module, entry),
            ctxs: ContextTable::new(),
            ptrs: PointerManager::new(),
            mem: MemoryManager::new(module.layout),
            pool: PtsSetPool::new(),
            env: Env::new(),
            memo: Memo::new(),
            callgraph: CallGraph::new(),
            worklist: TwoLevelWorkList::new(),
        })
    }

    /// Run to a fixpoint. Terminates because Env, Store and call graph all
    /// grow monotonically inside finite lattices.
    pub fn run(&mut self) -> Result<()> {
        self.seed_initial_state();

        let mut evaluated = 0usize;
        while let Some((fc, node)) = self.worklist.dequeue() {
            let result = self.eval(ProgramPoint::new(fc.ctx, node))?;
            self.propagate(result);
            evaluated += 1;
        }

        debug!(
            evaluated,
            pointers = self.ptrs.len(),
            objects = self.mem.object_count(),
            sets = self.pool.pool_size(),
            contexts = self.ctxs.len(),
            call_edges = self.callgraph.edge_count(),
            "pointer analysis reached fixpoint"
        );
        Ok(())
    }

    /// Feed one node's successors back into the worklist. Top-level
    /// successors are enqueued unconditionally; memory-level successors only
    /// when their memoized store actually grows.
    fn propagate(&mut self, result: EvalResult) {
        let (stores, succs) = result.into_parts();
        for (pp, store) in succs {
            match store {
                None => self.enqueue(pp),
                Some(index) => {
                    if self.memo.update(&mut self.pool, pp, &stores[index]) {
                        self.enqueue(pp);
                    }
                }
            }
        }
    }

    pub(crate) fn enqueue(&mut self, pp: ProgramPoint) {
        let node = self.program.node(pp.node);
        let fc = FunctionContext::new(pp.ctx, node.func);
        self.worklist.enqueue(fc, pp.node, node.priority());
    }

    pub(crate) fn push_context(&mut self, ctx: ContextId, site: NodeId) -> ContextId {
        match self.config.context_mode {
            ContextMode::KLimit(k) => self.ctxs.push_k_limited(ctx, site, k),
            ContextMode::Adaptive => self.ctxs.push_adaptive(ctx, site),
        }
    }

    /// The pointer for `value` as an operand of `func` in `ctx`, if one has
    /// been interned. A missing pointer means the defining node has not been
    /// evaluated yet.
    pub(crate) fn ptr_of(&self, ctx: ContextId, func: FuncId, value: Value) -> Option<PtrId> {
        ValueRef::from_value(func, value).and_then(|v| self.ptrs.get(ctx, v))
    }

    /// Freeze the finished run into its queryable result.
    pub(crate) fn into_analysis(self) -> crate::PointerAnalysis {
        crate::PointerAnalysis::from_parts(
            self.program,
            self.ctxs,
            self.ptrs,
            self.mem,
            self.pool,
            self.env,
            self.memo,
            self.callgraph,
        )
    }
}
