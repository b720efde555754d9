use crate::program::ProgramPoint;
use crate::pts::{PtsSetPool, Store};
use std::collections::HashMap;

/// The abstract heap state known to reach each (context, node). Updated by
/// weak merge only, so entries grow monotonically toward the fixpoint.
#[derive(Debug, Default)]
pub struct Memo {
    in_state: HashMap<ProgramPoint, Store>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, pp: ProgramPoint) -> Option<&Store> {
        self.in_state.get(&pp)
    }

    /// Merge `store` into the state reaching `pp`. Returns true if anything
    /// changed.
    pub fn update(&mut self, pool: &mut PtsSetPool, pp: ProgramPoint, store: &Store) -> bool {
        match self.in_state.get_mut(&pp) {
            Some(existing) => existing.merge_with(pool, store),
            None => {
                self.in_state.insert(pp, store.clone());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.in_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_state.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;
    use crate::memory::ObjId;
    use crate::program::cfg::NodeId;

    #[test]
    fn updates_merge_monotonically() {
        let mut pool = PtsSetPool::new();
        let mut memo = Memo::new();
        let pp = ProgramPoint::new(ContextId::GLOBAL, NodeId(0));

        let a = ObjId::from_index(2);
        let b = ObjId::from_index(3);

        let mut s1 = Store::new();
        s1.insert(&mut pool, a, a);
        assert!(memo.update(&mut pool, pp, &s1));
        assert!(!memo.update(&mut pool, pp, &s1));

        let mut s2 = Store::new();
        s2.insert(&mut pool, a, b);
        assert!(memo.update(&mut pool, pp, &s2));

        let merged = memo.lookup(pp).unwrap().lookup(a);
        assert_eq!(pool.len(merged), 2);
    }
}
