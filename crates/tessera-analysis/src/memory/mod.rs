pub mod layout;
pub mod manager;

pub use layout::{ArrayTriple, LayoutCache, LayoutId, TypeLayout};
pub use manager::MemoryManager;

use crate::context::ContextId;
use crate::pointer::ValueRef;
use tessera_ir::{FuncId, GlobalId};

/// An abstract memory location: an offset into an allocation, interned so
/// that structurally equal locations share one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u32);

impl ObjId {
    /// The location that may alias anything. Absorbing element of points-to
    /// sets.
    pub const UNIVERSAL: ObjId = ObjId(0);
    /// The location of the null pointer. Never written through.
    pub const NULL: ObjId = ObjId(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> ObjId {
        ObjId(index as u32)
    }

    pub fn is_universal(self) -> bool {
        self == Self::UNIVERSAL
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    pub fn is_special(self) -> bool {
        self.is_universal() || self.is_null()
    }
}

impl std::fmt::Display for ObjId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ObjId::UNIVERSAL => write!(f, "obj:universal"),
            ObjId::NULL => write!(f, "obj:null"),
            _ => write!(f, "obj{}", self.0),
        }
    }
}

/// Identity of an allocation. Stack and heap sites are context-qualified, so
/// the same instruction reached under different call strings yields
/// different abstract allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocSite {
    Null,
    Universal,
    Global(GlobalId),
    Function(FuncId),
    Stack(ContextId, ValueRef),
    Heap(ContextId, ValueRef),
}

impl AllocSite {
    pub fn is_stack(&self) -> bool {
        matches!(self, AllocSite::Stack(..))
    }

    pub fn is_heap(&self) -> bool {
        matches!(self, AllocSite::Heap(..))
    }

    pub fn context(&self) -> ContextId {
        match self {
            AllocSite::Stack(ctx, _) | AllocSite::Heap(ctx, _) => *ctx,
            _ => ContextId::GLOBAL,
        }
    }
}
