use crate::program::cfg::NodeId;
use std::collections::{HashMap, HashSet};

/// A calling context: an interned call string, most recent call site first.
/// Equal call strings always intern to the same id, so id equality is value
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    pub const GLOBAL: ContextId = ContextId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

#[derive(Debug)]
struct ContextEntry {
    site: Option<NodeId>,
    pred: ContextId,
    depth: u32,
}

/// Arena of call-string contexts. Contexts form a tree rooted at the global
/// (empty) context and live for the whole analysis run.
#[derive(Debug)]
pub struct ContextTable {
    entries: Vec<ContextEntry>,
    interned: HashMap<(ContextId, NodeId), ContextId>,
    tracked: HashSet<(ContextId, NodeId)>,
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTable {
    pub fn new() -> Self {
        Self {
            entries: vec![ContextEntry {
                site: None,
                pred: ContextId::GLOBAL,
                depth: 0,
            }],
            interned: HashMap::new(),
            tracked: HashSet::new(),
        }
    }

    pub fn global(&self) -> ContextId {
        ContextId::GLOBAL
    }

    /// Append one call site, unbounded.
    pub fn push(&mut self, ctx: ContextId, site: NodeId) -> ContextId {
        if let Some(&existing) = self.interned.get(&(ctx, site)) {
            return existing;
        }
        let id = ContextId(self.entries.len() as u32);
        self.entries.push(ContextEntry {
            site: Some(site),
            pred: ctx,
            depth: self.depth(ctx) + 1,
        });
        self.interned.insert((ctx, site), id);
        id
    }

    /// k-limited push: once a context has reached depth k, further pushes
    /// collapse into it.
    pub fn push_k_limited(&mut self, ctx: ContextId, site: NodeId, k: u32) -> ContextId {
        if self.depth(ctx) >= k {
            ctx
        } else {
            self.push(ctx, site)
        }
    }

    /// Adaptive push: only call sites in the watch set gain precision; all
    /// others keep the caller's context.
    pub fn push_adaptive(&mut self, ctx: ContextId, site: NodeId) -> ContextId {
        if self.tracked.contains(&(ctx, site)) {
            self.push(ctx, site)
        } else {
            ctx
        }
    }

    pub fn track_call_site(&mut self, ctx: ContextId, site: NodeId) {
        self.tracked.insert((ctx, site));
    }

    pub fn pop(&self, ctx: ContextId) -> ContextId {
        let entry = &self.entries[ctx.index()];
        assert!(entry.site.is_some(), "popping the global context");
        entry.pred
    }

    pub fn depth(&self, ctx: ContextId) -> u32 {
        self.entries[ctx.index()].depth
    }

    pub fn call_site(&self, ctx: ContextId) -> Option<NodeId> {
        self.entries[ctx.index()].site
    }

    pub fn is_global(&self, ctx: ContextId) -> bool {
        ctx == ContextId::GLOBAL
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contexts(&self) -> impl Iterator<Item = ContextId> {
        (0..self.entries.len() as u32).map(ContextId)
    }
}
