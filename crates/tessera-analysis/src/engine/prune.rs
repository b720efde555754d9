//! Call-boundary store pruning.
//!
//! A callee can only observe memory reachable from its arguments or from
//! globally-visible objects. Restricting the store handed across the call
//! boundary to that subset bounds per-call store size independent of total
//! heap size, which is what keeps the memo affordable on deep call chains.

use crate::context::ContextId;
use crate::engine::Solver;
use crate::memory::ObjId;
use crate::pts::Store;
use std::collections::HashSet;
use tessera_ir::{FuncId, Value};

impl Solver<'_> {
    /// The sub-store of `store` reachable from the call's pointer arguments
    /// plus every globally-accessible object already present.
    pub(crate) fn prune_store(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        ptr_args: &[Value],
        store: &Store,
    ) -> Store {
        let mut roots: Vec<ObjId> = Vec::new();
        for &arg in ptr_args {
            if let Some(ptr) = self.ptr_of(ctx, func, arg) {
                roots.extend(self.pool.objects(self.env.lookup(ptr)));
            }
        }
        for (obj, _) in store.iter() {
            if self.mem.is_globally_accessible(obj) {
                roots.push(obj);
            }
        }

        let reachable = self.reachable_closure(roots, store);
        let mut pruned = store.clone();
        pruned.retain_keys(|obj| reachable.contains(&obj));
        pruned
    }

    /// Close a root set over sibling pointer fields and store targets.
    fn reachable_closure(&mut self, roots: Vec<ObjId>, store: &Store) -> HashSet<ObjId> {
        let mut reachable = HashSet::new();
        let mut worklist = roots;
        while let Some(obj) = worklist.pop() {
            if !reachable.insert(obj) {
                continue;
            }
            for sibling in self.mem.reachable_pointer_objects(obj, false) {
                if !reachable.contains(&sibling) {
                    worklist.push(sibling);
                }
            }
            for &target in self.pool.objects(store.lookup(obj)) {
                if !reachable.contains(&target) {
                    worklist.push(target);
                }
            }
        }
        reachable
    }
}
