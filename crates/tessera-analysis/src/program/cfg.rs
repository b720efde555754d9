use tessera_ir::{FuncId, Type, Value, ValueId};

/// Index of a node in the program-wide CFG arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Payload of a Copy node: either a plain merge of operands (phi/select) or
/// pointer arithmetic against one operand.
#[derive(Debug, Clone)]
pub enum CopyKind {
    Merge(Vec<Value>),
    Offset { src: Value, offset: u64, array: bool },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Entry,
    Alloc {
        dest: ValueId,
        allocated: Type,
    },
    Copy {
        dest: ValueId,
        kind: CopyKind,
    },
    Load {
        dest: ValueId,
        src: Value,
    },
    Store {
        dest: Value,
        src: Value,
    },
    Call {
        dest: Option<ValueId>,
        callee: Value,
        /// Every call argument, canonicalized, in call order. Effect
        /// annotations address these positionally.
        args: Vec<Value>,
        /// The pointer-typed subset, in call order. Bound to callee
        /// parameters and used for arity matching and store pruning.
        ptr_args: Vec<Value>,
    },
    Return {
        value: Option<Value>,
    },
}

#[derive(Debug)]
pub struct CfgNode {
    pub func: FuncId,
    pub kind: NodeKind,
    priority: u32,
    preds: Vec<NodeId>,
    succs: Vec<NodeId>,
    defs: Vec<NodeId>,
    uses: Vec<NodeId>,
}

impl CfgNode {
    pub(crate) fn new(func: FuncId, kind: NodeKind) -> Self {
        Self {
            func,
            kind,
            priority: 0,
            preds: Vec::new(),
            succs: Vec::new(),
            defs: Vec::new(),
            uses: Vec::new(),
        }
    }

    /// Worklist priority: post-order number, so that dequeuing the largest
    /// first visits nodes in reverse postorder.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    pub fn preds(&self) -> &[NodeId] {
        &self.preds
    }

    pub fn succs(&self) -> &[NodeId] {
        &self.succs
    }

    /// Nodes whose top-level value this node uses.
    pub fn defs(&self) -> &[NodeId] {
        &self.defs
    }

    /// Nodes using this node's top-level value (def-use successors).
    pub fn uses(&self) -> &[NodeId] {
        &self.uses
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, NodeKind::Entry)
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call { .. })
    }

    /// Nodes that read or write only the Env. Detached from the
    /// control-flow chain once def-use edges exist.
    pub fn is_top_level(&self) -> bool {
        matches!(self.kind, NodeKind::Alloc { .. } | NodeKind::Copy { .. })
    }

    fn insert(list: &mut Vec<NodeId>, node: NodeId) {
        if !list.contains(&node) {
            list.push(node);
        }
    }

    fn remove(list: &mut Vec<NodeId>, node: NodeId) {
        list.retain(|&n| n != node);
    }
}

/// Per-function view into the node arena.
#[derive(Debug)]
pub struct Cfg {
    pub func: FuncId,
    pub entry: NodeId,
    pub nodes: Vec<NodeId>,
    pub has_return: bool,
}

#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: Vec<CfgNode>,
}

impl NodeArena {
    pub fn add(&mut self, func: FuncId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode::new(func, kind));
        id
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CfgNode {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        CfgNode::insert(&mut self.node_mut(from).succs, to);
        CfgNode::insert(&mut self.node_mut(to).preds, from);
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        CfgNode::remove(&mut self.node_mut(from).succs, to);
        CfgNode::remove(&mut self.node_mut(to).preds, from);
    }

    pub fn add_def_use_edge(&mut self, def: NodeId, use_node: NodeId) {
        CfgNode::insert(&mut self.node_mut(def).uses, use_node);
        CfgNode::insert(&mut self.node_mut(use_node).defs, def);
    }

    /// Unlink a node from the control-flow chain, wiring its predecessors
    /// to its successors. Def-use edges are untouched.
    pub fn detach(&mut self, node: NodeId) {
        let preds = self.node(node).preds.clone();
        let succs = self.node(node).succs.clone();
        for &p in &preds {
            for &s in &succs {
                if p != node && s != node {
                    self.add_edge(p, s);
                }
            }
        }
        for p in preds {
            self.remove_edge(p, node);
        }
        for s in succs {
            self.remove_edge(node, s);
        }
    }
}
