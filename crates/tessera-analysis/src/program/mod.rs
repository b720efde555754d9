pub mod builder;
pub mod cfg;

pub use cfg::{Cfg, CfgNode, CopyKind, NodeId, NodeKind};

use crate::context::ContextId;
use cfg::NodeArena;
use indexmap::IndexMap;
use tessera_ir::FuncId;

/// One CFG node in one calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramPoint {
    pub ctx: ContextId,
    pub node: NodeId,
}

impl ProgramPoint {
    pub fn new(ctx: ContextId, node: NodeId) -> Self {
        Self { ctx, node }
    }
}

impl std::fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.ctx, self.node)
    }
}

/// One function in one calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionContext {
    pub ctx: ContextId,
    pub func: FuncId,
}

impl FunctionContext {
    pub fn new(ctx: ContextId, func: FuncId) -> Self {
        Self { ctx, func }
    }
}

/// The analyzed program: per-function pointer CFGs over one node arena,
/// with control-flow and def-use edges, plus the address-taken function
/// list used by indirect-call resolution.
#[derive(Debug)]
pub struct SemiSparseProgram {
    arena: NodeArena,
    cfgs: IndexMap<FuncId, Cfg>,
    addr_taken: Vec<FuncId>,
    entry_func: FuncId,
}

impl SemiSparseProgram {
    pub(crate) fn new(entry_func: FuncId) -> Self {
        Self {
            arena: NodeArena::default(),
            cfgs: IndexMap::new(),
            addr_taken: Vec::new(),
            entry_func,
        }
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        self.arena.node(id)
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CfgNode)> {
        (0..self.arena.len() as u32).map(move |i| (NodeId(i), self.arena.node(NodeId(i))))
    }

    pub fn cfg(&self, func: FuncId) -> Option<&Cfg> {
        self.cfgs.get(&func)
    }

    pub fn cfgs(&self) -> impl Iterator<Item = &Cfg> {
        self.cfgs.values()
    }

    pub fn entry_func(&self) -> FuncId {
        self.entry_func
    }

    pub fn entry_cfg(&self) -> &Cfg {
        self.cfgs
            .get(&self.entry_func)
            .expect("entry function has a CFG")
    }

    pub fn addr_taken_funcs(&self) -> &[FuncId] {
        &self.addr_taken
    }

    pub(crate) fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    pub(crate) fn insert_cfg(&mut self, cfg: Cfg) {
        self.cfgs.insert(cfg.func, cfg);
    }

    pub(crate) fn set_addr_taken(&mut self, funcs: Vec<FuncId>) {
        self.addr_taken = funcs;
    }
}
