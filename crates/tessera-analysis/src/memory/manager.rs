use crate::context::ContextId;
use crate::memory::layout::{LayoutCache, LayoutId};
use crate::memory::{AllocSite, ObjId};
use crate::pointer::ValueRef;
use std::collections::HashMap;
use tessera_ir::{DataLayout, FuncId, GlobalId, Type};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BlockId(u32);

#[derive(Debug)]
struct MemBlock {
    site: AllocSite,
    layout: LayoutId,
}

#[derive(Debug, Clone, Copy)]
struct ObjectData {
    block: BlockId,
    offset: u64,
    summary: bool,
}

/// Owns every abstract allocation and location of one analysis run.
/// Allocation is memoized by site; locations are interned by
/// (allocation, offset).
#[derive(Debug)]
pub struct MemoryManager {
    layouts: LayoutCache,
    data_layout: DataLayout,
    blocks: Vec<MemBlock>,
    alloc_map: HashMap<AllocSite, BlockId>,
    objects: Vec<ObjectData>,
    obj_map: HashMap<(BlockId, u64), ObjId>,
    argv_obj: Option<ObjId>,
    envp_obj: Option<ObjId>,
}

impl MemoryManager {
    pub fn new(data_layout: DataLayout) -> Self {
        let mut manager = Self {
            layouts: LayoutCache::new(),
            data_layout,
            blocks: Vec::new(),
            alloc_map: HashMap::new(),
            objects: Vec::new(),
            obj_map: HashMap::new(),
            argv_obj: None,
            envp_obj: None,
        };

        // Block/object 0 is the universal location (a byte array that may
        // point anywhere), block/object 1 the null location (zero-sized).
        let byte_array = manager.layouts.byte_array();
        let universal_block = manager.block_for(AllocSite::Universal, byte_array);
        let universal = manager.object_at(universal_block, 0, true);
        debug_assert_eq!(universal, ObjId::UNIVERSAL);

        let empty = manager.layouts.function();
        let null_block = manager.block_for(AllocSite::Null, empty);
        let null = manager.object_at(null_block, 0, false);
        debug_assert_eq!(null, ObjId::NULL);

        manager
    }

    pub fn pointer_size(&self) -> u64 {
        self.data_layout.pointer_size
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.data_layout
    }

    fn block_for(&mut self, site: AllocSite, layout: LayoutId) -> BlockId {
        if let Some(&block) = self.alloc_map.get(&site) {
            debug_assert_eq!(self.blocks[block.0 as usize].layout, layout);
            return block;
        }
        let block = BlockId(self.blocks.len() as u32);
        self.blocks.push(MemBlock { site, layout });
        self.alloc_map.insert(site, block);
        block
    }

    fn object_at(&mut self, block: BlockId, offset: u64, summary: bool) -> ObjId {
        if let Some(&obj) = self.obj_map.get(&(block, offset)) {
            debug_assert_eq!(self.objects[obj.index()].summary, summary);
            return obj;
        }
        let obj = ObjId::from_index(self.objects.len());
        self.objects.push(ObjectData {
            block,
            offset,
            summary,
        });
        self.obj_map.insert((block, offset), obj);
        obj
    }

    fn starts_with_summary(&self, layout: LayoutId) -> bool {
        self.layouts.get(layout).offset_into(0).1
    }

    pub fn allocate_global(&mut self, global: GlobalId, ty: &Type) -> ObjId {
        let layout = self.layouts.of_type(ty, &self.data_layout);
        let block = self.block_for(AllocSite::Global(global), layout);
        let summary = self.starts_with_summary(layout);
        self.object_at(block, 0, summary)
    }

    pub fn allocate_function(&mut self, func: FuncId) -> ObjId {
        let layout = self.layouts.function();
        let block = self.block_for(AllocSite::Function(func), layout);
        self.object_at(block, 0, false)
    }

    pub fn allocate_stack(&mut self, ctx: ContextId, value: ValueRef, ty: &Type) -> ObjId {
        let layout = self.layouts.of_type(ty, &self.data_layout);
        let block = self.block_for(AllocSite::Stack(ctx, value), layout);
        let summary = self.starts_with_summary(layout);
        self.object_at(block, 0, summary)
    }

    /// Heap allocation of statically unknown shape. Always a summary object;
    /// a known byte size bounds the object, otherwise it is unbounded.
    pub fn allocate_heap(&mut self, ctx: ContextId, value: ValueRef, size: Option<u64>) -> ObjId {
        let layout = match size {
            Some(n) => self.layouts.sized_summary(n),
            None => self.layouts.byte_array(),
        };
        let block = self.block_for(AllocSite::Heap(ctx, value), layout);
        self.object_at(block, 0, true)
    }

    pub fn allocate_argv(&mut self, value: ValueRef) -> ObjId {
        let layout = self.layouts.byte_array();
        let block = self.block_for(AllocSite::Stack(ContextId::GLOBAL, value), layout);
        let obj = self.object_at(block, 0, true);
        self.argv_obj = Some(obj);
        obj
    }

    pub fn allocate_envp(&mut self, value: ValueRef) -> ObjId {
        let layout = self.layouts.byte_array();
        let block = self.block_for(AllocSite::Stack(ContextId::GLOBAL, value), layout);
        let obj = self.object_at(block, 0, true);
        self.envp_obj = Some(obj);
        obj
    }

    pub fn argv_object(&self) -> Option<ObjId> {
        self.argv_obj
    }

    pub fn envp_object(&self) -> Option<ObjId> {
        self.envp_obj
    }

    fn offset_block(&mut self, block: BlockId, offset: u64) -> ObjId {
        let data = &self.blocks[block.0 as usize];
        if matches!(data.site, AllocSite::Universal | AllocSite::Null) {
            return ObjId::UNIVERSAL;
        }

        let layout = self.layouts.get(data.layout);
        let (adjusted, hit_array) = layout.offset_into(offset);
        let size = layout.size;
        let summary = hit_array || data.site.is_heap();

        if adjusted >= size {
            warn!(
                offset,
                size, "pointer arithmetic past the end of an object, widening to universal"
            );
            return ObjId::UNIVERSAL;
        }

        self.object_at(block, adjusted, summary)
    }

    /// Offset a location within its allocation. Out-of-bounds results widen
    /// to the universal location rather than failing.
    pub fn offset_object(&mut self, obj: ObjId, offset: u64) -> ObjId {
        if offset == 0 {
            return obj;
        }
        let data = self.objects[obj.index()];
        self.offset_block(data.block, data.offset + offset)
    }

    /// Sibling locations of `obj`'s allocation that may hold pointers, at
    /// offsets past `obj`'s own. Materialized on demand.
    pub fn reachable_pointer_objects(&mut self, obj: ObjId, include_self: bool) -> Vec<ObjId> {
        let mut result = Vec::new();
        if include_self {
            result.push(obj);
        }
        if obj.is_special() {
            return result;
        }

        let data = self.objects[obj.index()];
        let layout = self.blocks[data.block.0 as usize].layout;
        let offsets: Vec<u64> = self
            .layouts
            .get(layout)
            .pointers
            .iter()
            .copied()
            .filter(|&off| off > data.offset)
            .collect();
        for off in offsets {
            result.push(self.offset_block(data.block, off));
        }
        result
    }

    pub fn is_summary(&self, obj: ObjId) -> bool {
        self.objects[obj.index()].summary
    }

    pub fn offset_of(&self, obj: ObjId) -> u64 {
        self.objects[obj.index()].offset
    }

    pub fn site_of(&self, obj: ObjId) -> AllocSite {
        let data = self.objects[obj.index()];
        self.blocks[data.block.0 as usize].site
    }

    pub fn object_size(&self, obj: ObjId) -> u64 {
        let data = self.objects[obj.index()];
        let layout = self.blocks[data.block.0 as usize].layout;
        self.layouts.get(layout).size
    }

    pub fn is_global_object(&self, obj: ObjId) -> bool {
        matches!(self.site_of(obj), AllocSite::Global(_))
    }

    pub fn is_function_object(&self, obj: ObjId) -> bool {
        matches!(self.site_of(obj), AllocSite::Function(_))
    }

    pub fn is_stack_object(&self, obj: ObjId) -> bool {
        self.site_of(obj).is_stack()
    }

    pub fn is_heap_object(&self, obj: ObjId) -> bool {
        self.site_of(obj).is_heap()
    }

    /// Objects visible across call boundaries regardless of argument
    /// reachability: everything that is not stack- or heap-allocated.
    pub fn is_globally_accessible(&self, obj: ObjId) -> bool {
        !(self.is_stack_object(obj) || self.is_heap_object(obj))
    }

    pub fn function_of(&self, obj: ObjId) -> Option<FuncId> {
        match self.site_of(obj) {
            AllocSite::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::ValueId;

    fn local(func: u32, value: u32) -> ValueRef {
        ValueRef::Local {
            func: FuncId(func),
            value: ValueId(value),
        }
    }

    fn ptr_ty() -> Type {
        Type::Int(8).pointer_to()
    }

    #[test]
    fn allocation_is_memoized_by_site() {
        let mut mem = MemoryManager::new(DataLayout::default());
        let a = mem.allocate_stack(ContextId::GLOBAL, local(0, 1), &Type::Int(32));
        let b = mem.allocate_stack(ContextId::GLOBAL, local(0, 1), &Type::Int(32));
        let c = mem.allocate_stack(ContextId::GLOBAL, local(0, 2), &Type::Int(32));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn offsets_fold_and_widen() {
        let mut mem = MemoryManager::new(DataLayout::default());
        let arr = mem.allocate_stack(ContextId::GLOBAL, local(0, 1), &ptr_ty().array_of(4));
        assert!(mem.is_summary(arr));

        // Stride multiples fold back onto the representative location.
        assert_eq!(mem.offset_object(arr, 8), arr);
        assert_eq!(mem.offset_object(arr, 24), arr);

        // Offsetting past the object yields the universal location.
        assert_eq!(mem.offset_object(arr, 32), ObjId::UNIVERSAL);
    }

    #[test]
    fn field_offsets_stay_distinct() {
        let mut mem = MemoryManager::new(DataLayout::default());
        let st = Type::Struct(vec![ptr_ty(), ptr_ty()]);
        let base = mem.allocate_stack(ContextId::GLOBAL, local(0, 1), &st);
        assert!(!mem.is_summary(base));

        let second = mem.offset_object(base, 8);
        assert_ne!(second, base);
        assert_eq!(mem.offset_of(second), 8);
        assert_eq!(mem.offset_object(base, 8), second);
    }

    #[test]
    fn heap_objects_are_summaries() {
        let mut mem = MemoryManager::new(DataLayout::default());
        let heap = mem.allocate_heap(ContextId::GLOBAL, local(0, 3), None);
        assert!(mem.is_summary(heap));
        assert!(mem.is_heap_object(heap));
        // Every offset collapses onto the single summary cell.
        assert_eq!(mem.offset_object(heap, 1234), heap);

        let sized = mem.allocate_heap(ContextId::GLOBAL, local(0, 4), Some(16));
        assert_eq!(mem.offset_object(sized, 8), sized);
        assert_eq!(mem.offset_object(sized, 16), ObjId::UNIVERSAL);
    }

    #[test]
    fn special_objects_absorb_offsets() {
        let mut mem = MemoryManager::new(DataLayout::default());
        assert_eq!(mem.offset_object(ObjId::UNIVERSAL, 8), ObjId::UNIVERSAL);
        assert_eq!(mem.offset_object(ObjId::NULL, 8), ObjId::UNIVERSAL);
    }

    #[test]
    fn reachable_pointer_objects_walk_the_layout() {
        let mut mem = MemoryManager::new(DataLayout::default());
        let st = Type::Struct(vec![Type::Int(64), ptr_ty(), ptr_ty()]);
        let base = mem.allocate_stack(ContextId::GLOBAL, local(0, 1), &st);

        let reachable = mem.reachable_pointer_objects(base, true);
        assert_eq!(reachable.len(), 3);
        assert_eq!(reachable[0], base);
        assert_eq!(mem.offset_of(reachable[1]), 8);
        assert_eq!(mem.offset_of(reachable[2]), 16);

        let from_mid = mem.reachable_pointer_objects(reachable[1], false);
        assert_eq!(from_mid.len(), 1);
        assert_eq!(mem.offset_of(from_mid[0]), 16);
    }
}
