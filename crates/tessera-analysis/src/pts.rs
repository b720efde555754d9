use crate::memory::ObjId;
use crate::pointer::PtrId;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::hash::Hash;

/// A hash-consed points-to set. Id equality is set equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtsSetId(u32);

impl PtsSetId {
    pub const EMPTY: PtsSetId = PtsSetId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical table of every points-to set constructed during one run.
/// Sets are stored as sorted object slices; any set containing the universal
/// location collapses to the singleton universal set.
#[derive(Debug)]
pub struct PtsSetPool {
    sets: IndexSet<Box<[ObjId]>>,
}

impl Default for PtsSetPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PtsSetPool {
    pub fn new() -> Self {
        let mut sets = IndexSet::new();
        sets.insert(Vec::new().into_boxed_slice());
        Self { sets }
    }

    pub fn objects(&self, set: PtsSetId) -> &[ObjId] {
        self.sets.get_index(set.index()).expect("interned set")
    }

    pub fn len(&self, set: PtsSetId) -> usize {
        self.objects(set).len()
    }

    pub fn is_empty_set(&self, set: PtsSetId) -> bool {
        set == PtsSetId::EMPTY
    }

    pub fn contains(&self, set: PtsSetId, obj: ObjId) -> bool {
        self.objects(set).binary_search(&obj).is_ok()
    }

    pub fn is_superset(&self, a: PtsSetId, b: PtsSetId) -> bool {
        if a == b {
            return true;
        }
        let objs = self.objects(a);
        self.objects(b).iter().all(|o| objs.binary_search(o).is_ok())
    }

    pub fn intersection(&self, a: PtsSetId, b: PtsSetId) -> Vec<ObjId> {
        let objs = self.objects(a);
        self.objects(b)
            .iter()
            .copied()
            .filter(|o| objs.binary_search(o).is_ok())
            .collect()
    }

    pub fn singleton(&mut self, obj: ObjId) -> PtsSetId {
        self.canonicalize(vec![obj])
    }

    pub fn insert(&mut self, set: PtsSetId, obj: ObjId) -> PtsSetId {
        if self.contains(set, obj) {
            return set;
        }
        let mut objs = self.objects(set).to_vec();
        objs.push(obj);
        self.canonicalize(objs)
    }

    pub fn merge(&mut self, a: PtsSetId, b: PtsSetId) -> PtsSetId {
        if a == b || b == PtsSetId::EMPTY {
            return a;
        }
        if a == PtsSetId::EMPTY {
            return b;
        }
        let mut objs = self.objects(a).to_vec();
        objs.extend_from_slice(self.objects(b));
        self.canonicalize(objs)
    }

    /// Flatten many sets at once. Cheaper than pairwise merging for call
    /// nodes with many argument sets.
    pub fn merge_all(&mut self, sets: &[PtsSetId]) -> PtsSetId {
        match sets {
            [] => PtsSetId::EMPTY,
            [only] => *only,
            _ => {
                let mut objs = Vec::with_capacity(sets.iter().map(|s| self.len(*s)).sum());
                for set in sets {
                    objs.extend_from_slice(self.objects(*set));
                }
                self.canonicalize(objs)
            }
        }
    }

    fn canonicalize(&mut self, mut objs: Vec<ObjId>) -> PtsSetId {
        if objs.contains(&ObjId::UNIVERSAL) {
            objs = vec![ObjId::UNIVERSAL];
        } else {
            objs.sort_unstable();
            objs.dedup();
        }
        let (index, _) = self.sets.insert_full(objs.into_boxed_slice());
        PtsSetId(index as u32)
    }

    pub fn pool_size(&self) -> usize {
        self.sets.len()
    }
}

/// Map from keys to canonical points-to sets, with the strong/weak update
/// distinction of the abstract semantics. Used for both the top-level Env
/// (pointer keys) and the Store (location keys).
#[derive(Debug, Clone, Default)]
pub struct PtsMap<K> {
    map: HashMap<K, PtsSetId>,
}

pub type Env = PtsMap<PtrId>;
pub type Store = PtsMap<ObjId>;

impl<K: Eq + Hash + Copy> PtsMap<K> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn lookup(&self, key: K) -> PtsSetId {
        self.map.get(&key).copied().unwrap_or(PtsSetId::EMPTY)
    }

    pub fn contains(&self, key: K) -> bool {
        self.lookup(key) != PtsSetId::EMPTY
    }

    pub fn insert(&mut self, pool: &mut PtsSetPool, key: K, obj: ObjId) -> bool {
        let old = self.lookup(key);
        let new = pool.insert(old, obj);
        if new == old && self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, new);
        true
    }

    /// Join `set` into the existing binding. Monotone.
    pub fn weak_update(&mut self, pool: &mut PtsSetPool, key: K, set: PtsSetId) -> bool {
        let old = self.lookup(key);
        let new = pool.merge(old, set);
        if new == old && self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, new);
        true
    }

    /// Replace the existing binding outright.
    pub fn strong_update(&mut self, key: K, set: PtsSetId) -> bool {
        match self.map.insert(key, set) {
            Some(old) => old != set,
            None => true,
        }
    }

    pub fn merge_with(&mut self, pool: &mut PtsSetPool, other: &Self) -> bool {
        let mut changed = false;
        for (&key, &set) in &other.map {
            changed |= self.weak_update(pool, key, set);
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, PtsSetId)> + '_ {
        self.map.iter().map(|(&k, &s)| (k, s))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn retain_keys(&mut self, mut keep: impl FnMut(K) -> bool) {
        self.map.retain(|&k, _| keep(k));
    }
}
