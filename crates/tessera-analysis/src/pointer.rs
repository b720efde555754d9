use crate::context::ContextId;
use indexmap::IndexSet;
use std::collections::HashMap;
use tessera_ir::{Constant, FuncId, GlobalId, Value, ValueId};

/// Program-wide identity of an IR value, after operand canonicalization.
/// `NullConst` and `UndefConst` stand for the statically-known null and
/// unknown pointer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueRef {
    Local { func: FuncId, value: ValueId },
    Global(GlobalId),
    Function(FuncId),
    NullConst,
    UndefConst,
}

impl ValueRef {
    /// Identity of `value` as an operand of `func`. Integer constants carry
    /// no pointer identity.
    pub fn from_value(func: FuncId, value: Value) -> Option<ValueRef> {
        match value {
            Value::Local(v) => Some(ValueRef::Local { func, value: v }),
            Value::Global(g) => Some(ValueRef::Global(g)),
            Value::Function(f) => Some(ValueRef::Function(f)),
            Value::Const(Constant::Null) => Some(ValueRef::NullConst),
            Value::Const(Constant::Undef) => Some(ValueRef::UndefConst),
            Value::Const(Constant::Int(_)) => None,
        }
    }
}

/// One SSA pointer occurrence in one calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PtrId(u32);

impl PtrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PtrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ptr{}", self.0)
    }
}

/// Interns (context, value) pairs. Values with no calling context of their
/// own (globals, functions, constants) are forced into the global context so
/// each has exactly one pointer.
#[derive(Debug)]
pub struct PointerManager {
    ptrs: IndexSet<(ContextId, ValueRef)>,
    by_value: HashMap<ValueRef, Vec<PtrId>>,
}

impl Default for PointerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerManager {
    pub fn new() -> Self {
        let mut manager = Self {
            ptrs: IndexSet::new(),
            by_value: HashMap::new(),
        };
        let universal = manager.get_or_create(ContextId::GLOBAL, ValueRef::UndefConst);
        let null = manager.get_or_create(ContextId::GLOBAL, ValueRef::NullConst);
        debug_assert_eq!(universal, Self::universal_pointer());
        debug_assert_eq!(null, Self::null_pointer());
        manager
    }

    pub fn universal_pointer() -> PtrId {
        PtrId(0)
    }

    pub fn null_pointer() -> PtrId {
        PtrId(1)
    }

    fn canonical_key(ctx: ContextId, value: ValueRef) -> (ContextId, ValueRef) {
        match value {
            ValueRef::Local { .. } => (ctx, value),
            _ => (ContextId::GLOBAL, value),
        }
    }

    pub fn get(&self, ctx: ContextId, value: ValueRef) -> Option<PtrId> {
        let key = Self::canonical_key(ctx, value);
        self.ptrs.get_index_of(&key).map(|i| PtrId(i as u32))
    }

    pub fn get_or_create(&mut self, ctx: ContextId, value: ValueRef) -> PtrId {
        let key = Self::canonical_key(ctx, value);
        let (index, inserted) = self.ptrs.insert_full(key);
        let id = PtrId(index as u32);
        if inserted {
            self.by_value.entry(key.1).or_default().push(id);
        }
        id
    }

    pub fn context_of(&self, ptr: PtrId) -> ContextId {
        self.ptrs.get_index(ptr.index()).expect("interned pointer").0
    }

    pub fn value_of(&self, ptr: PtrId) -> ValueRef {
        self.ptrs.get_index(ptr.index()).expect("interned pointer").1
    }

    /// All pointers sharing one value, across contexts.
    pub fn pointers_with_value(&self, value: ValueRef) -> &[PtrId] {
        self.by_value.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }
}
