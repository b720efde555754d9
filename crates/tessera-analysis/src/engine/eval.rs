use crate::program::ProgramPoint;
use crate::pts::Store;

/// Outcome of one transfer-function helper. Distinguishes "an operand is
/// not available yet" (re-enqueued later through def-use edges) from "ran
/// but produced nothing new".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvalStatus {
    NotReady,
    NoChange,
    Changed,
}

impl EvalStatus {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            EvalStatus::Changed
        } else {
            EvalStatus::NoChange
        }
    }

    pub fn is_changed(self) -> bool {
        matches!(self, EvalStatus::Changed)
    }
}

/// Index of a store owned by an [`EvalResult`].
pub(crate) type StoreRef = usize;

/// Successor program points produced by evaluating one node: top-level
/// successors carry no store, memory-level successors carry one of the
/// result's stores.
#[derive(Debug, Default)]
pub(crate) struct EvalResult {
    stores: Vec<Store>,
    succs: Vec<(ProgramPoint, Option<StoreRef>)>,
}

impl EvalResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_store(&mut self, store: Store) -> StoreRef {
        self.stores.push(store);
        self.stores.len() - 1
    }

    pub fn store_mut(&mut self, store: StoreRef) -> &mut Store {
        &mut self.stores[store]
    }

    pub fn add_top_level(&mut self, pp: ProgramPoint) {
        self.succs.push((pp, None));
    }

    pub fn add_mem_level(&mut self, pp: ProgramPoint, store: StoreRef) {
        self.succs.push((pp, Some(store)));
    }

    pub fn into_parts(self) -> (Vec<Store>, Vec<(ProgramPoint, Option<StoreRef>)>) {
        (self.stores, self.succs)
    }
}
