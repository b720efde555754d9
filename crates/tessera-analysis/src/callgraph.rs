use crate::program::{FunctionContext, ProgramPoint};
use std::collections::HashMap;

/// The interprocedural call graph, accreted as indirect calls resolve.
/// Monotone: edges are only ever added.
#[derive(Debug, Default)]
pub struct CallGraph {
    callees: HashMap<ProgramPoint, Vec<FunctionContext>>,
    callers: HashMap<FunctionContext, Vec<ProgramPoint>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the edge is new.
    pub fn insert_edge(&mut self, call_site: ProgramPoint, callee: FunctionContext) -> bool {
        let callees = self.callees.entry(call_site).or_default();
        if callees.contains(&callee) {
            return false;
        }
        callees.push(callee);
        self.callers.entry(callee).or_default().push(call_site);
        true
    }

    pub fn callees(&self, call_site: ProgramPoint) -> &[FunctionContext] {
        self.callees
            .get(&call_site)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn callers(&self, callee: FunctionContext) -> &[ProgramPoint] {
        self.callers
            .get(&callee)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.callees.values().map(Vec::len).sum()
    }
}
