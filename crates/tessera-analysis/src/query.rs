//! The read-only result of one analysis run, and the queries clients build
//! on: points-to lookups, alias classification and resolved call targets.

use crate::callgraph::CallGraph;
use crate::context::{ContextId, ContextTable};
use crate::engine::{Memo, Solver};
use crate::memory::{MemoryManager, ObjId};
use crate::pointer::{PointerManager, PtrId, ValueRef};
use crate::program::{ProgramPoint, SemiSparseProgram};
use crate::pts::{Env, PtsSetId, PtsSetPool, Store};
use crate::{AnalysisConfig, Result};
use tessera_annot::EffectTable;
use tessera_ir::{FuncId, Module};

/// Three-valued answer of an alias query. `MustAlias` is only reported for
/// two pointers pinned to the same single non-summary location; everything
/// between that and provable disjointness is `MayAlias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
    MustAlias,
}

/// A finished whole-program pointer analysis. Owns every table the run
/// produced; clients query it read-only.
#[derive(Debug)]
pub struct PointerAnalysis {
    program: SemiSparseProgram,
    ctxs: ContextTable,
    ptrs: PointerManager,
    mem: MemoryManager,
    pool: PtsSetPool,
    env: Env,
    memo: Memo,
    callgraph: CallGraph,
}

impl PointerAnalysis {
    /// Analyze `module` to a fixpoint against the external effects in
    /// `table`.
    pub fn run(module: &Module, table: &EffectTable, config: AnalysisConfig) -> Result<Self> {
        let mut solver = Solver::new(module, table, &config)?;
        solver.run()?;
        Ok(solver.into_analysis())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        program: SemiSparseProgram,
        ctxs: ContextTable,
        ptrs: PointerManager,
        mem: MemoryManager,
        pool: PtsSetPool,
        env: Env,
        memo: Memo,
        callgraph: CallGraph,
    ) -> Self {
        Self {
            program,
            ctxs,
            ptrs,
            mem,
            pool,
            env,
            memo,
            callgraph,
        }
    }

    pub fn program(&self) -> &SemiSparseProgram {
        &self.program
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.ctxs
    }

    pub fn pointers(&self) -> &PointerManager {
        &self.ptrs
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.mem
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.callgraph
    }

    /// The members of an interned points-to set, sorted.
    pub fn set(&self, set: PtsSetId) -> &[ObjId] {
        self.pool.objects(set)
    }

    /// The abstract heap state known to reach `pp`, if any state reached it
    /// at all.
    pub fn store_at(&self, pp: ProgramPoint) -> Option<&Store> {
        self.memo.lookup(pp)
    }

    /// Points-to set of one value in one calling context.
    pub fn pts_of(&self, ctx: ContextId, value: ValueRef) -> &[ObjId] {
        match self.ptrs.get(ctx, value) {
            Some(ptr) => self.pts_of_ptr(ptr),
            None => &[],
        }
    }

    pub fn pts_of_ptr(&self, ptr: PtrId) -> &[ObjId] {
        self.pool.objects(self.env.lookup(ptr))
    }

    /// Points-to set of a value joined over every context it was analyzed
    /// in. Sorted and deduplicated.
    pub fn pts_of_value(&self, value: ValueRef) -> Vec<ObjId> {
        let mut objs: Vec<ObjId> = self
            .ptrs
            .pointers_with_value(value)
            .iter()
            .flat_map(|&ptr| self.pts_of_ptr(ptr).iter().copied())
            .collect();
        objs.sort_unstable();
        objs.dedup();
        objs
    }

    /// The functions a call site was resolved to, joined over callee
    /// contexts.
    pub fn call_targets(&self, call_site: ProgramPoint) -> Vec<FuncId> {
        let mut funcs: Vec<FuncId> = self
            .callgraph
            .callees(call_site)
            .iter()
            .map(|fc| fc.func)
            .collect();
        funcs.sort_unstable();
        funcs.dedup();
        funcs
    }

    pub fn alias_ptrs(&self, p0: PtrId, p1: PtrId) -> AliasResult {
        self.classify(self.pts_of_ptr(p0), self.pts_of_ptr(p1))
    }

    /// Alias relation of two values, joined over all contexts.
    pub fn alias(&self, v0: ValueRef, v1: ValueRef) -> AliasResult {
        self.classify(&self.pts_of_value(v0), &self.pts_of_value(v1))
    }

    fn classify(&self, a: &[ObjId], b: &[ObjId]) -> AliasResult {
        if a.is_empty() || b.is_empty() {
            return AliasResult::NoAlias;
        }
        if a.contains(&ObjId::UNIVERSAL) || b.contains(&ObjId::UNIVERSAL) {
            return AliasResult::MayAlias;
        }

        let common: Vec<ObjId> = a.iter().copied().filter(|obj| b.contains(obj)).collect();
        let [first, rest @ ..] = common.as_slice() else {
            return AliasResult::NoAlias;
        };
        // Two null pointers do not alias: there is no memory to share.
        if first.is_null() && rest.is_empty() {
            return AliasResult::NoAlias;
        }
        if a.len() == 1 && b.len() == 1 && a == b && !first.is_null() && !self.mem.is_summary(*first)
        {
            return AliasResult::MustAlias;
        }
        AliasResult::MayAlias
    }
}
