use indexmap::IndexSet;
use tessera_ir::{DataLayout, Type};

/// One folded array region: byte range [start, end) analyzed as repetitions
/// of a `stride`-byte element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayTriple {
    pub start: u64,
    pub end: u64,
    pub stride: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(u32);

impl LayoutId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The memory-model view of a type: its byte size, which ranges are folded
/// arrays, and at which offsets pointers may live. Hash-consed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    pub size: u64,
    pub arrays: Vec<ArrayTriple>,
    pub pointers: Vec<u64>,
}

impl TypeLayout {
    /// Fold `offset` into the representative offset of the innermost
    /// enclosing array region. The flag reports whether any region was hit.
    pub fn offset_into(&self, mut offset: u64) -> (u64, bool) {
        let mut hit_array = false;
        for triple in &self.arrays {
            if triple.start > offset {
                break;
            }
            if offset < triple.end {
                hit_array = true;
                offset = triple.start + (offset - triple.start) % triple.stride;
            }
        }
        (offset, hit_array)
    }
}

#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: IndexSet<TypeLayout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LayoutId) -> &TypeLayout {
        self.layouts.get_index(id.index()).expect("interned layout")
    }

    pub fn intern(&mut self, layout: TypeLayout) -> LayoutId {
        let (index, _) = self.layouts.insert_full(layout);
        LayoutId(index as u32)
    }

    /// The layout of an IR type. Arrays of more than one element fold into a
    /// single representative region, which bounds the number of distinct
    /// locations independent of static array length.
    pub fn of_type(&mut self, ty: &Type, dl: &DataLayout) -> LayoutId {
        let layout = self.build(ty, dl);
        self.intern(layout)
    }

    /// The most conservative layout: an unbounded byte array that may hold a
    /// pointer anywhere. Used for allocations of statically-unknown shape.
    pub fn byte_array(&mut self) -> LayoutId {
        self.sized_summary(u64::MAX)
    }

    /// A fully folded object of `size` bytes: every offset collapses into
    /// one summary location.
    pub fn sized_summary(&mut self, size: u64) -> LayoutId {
        self.intern(TypeLayout {
            size,
            arrays: vec![ArrayTriple {
                start: 0,
                end: size,
                stride: 1,
            }],
            pointers: vec![0],
        })
    }

    /// Function objects occupy no addressable bytes.
    pub fn function(&mut self) -> LayoutId {
        self.intern(TypeLayout {
            size: 0,
            arrays: Vec::new(),
            pointers: Vec::new(),
        })
    }

    fn build(&mut self, ty: &Type, dl: &DataLayout) -> TypeLayout {
        match ty {
            Type::Pointer(_) => TypeLayout {
                size: dl.pointer_size,
                arrays: Vec::new(),
                pointers: vec![0],
            },
            Type::Void | Type::Int(_) | Type::Float(_) | Type::Function(_) => TypeLayout {
                size: dl.type_size(ty),
                arrays: Vec::new(),
                pointers: Vec::new(),
            },
            Type::Opaque => TypeLayout {
                size: u64::MAX,
                arrays: vec![ArrayTriple {
                    start: 0,
                    end: u64::MAX,
                    stride: 1,
                }],
                pointers: vec![0],
            },
            Type::Struct(fields) => {
                let mut arrays = Vec::new();
                let mut pointers = Vec::new();
                let mut offset = 0u64;
                for field in fields {
                    let sub = self.build(field, dl);
                    arrays.extend(sub.arrays.iter().map(|t| ArrayTriple {
                        start: t.start + offset,
                        end: t.end + offset,
                        stride: t.stride,
                    }));
                    pointers.extend(sub.pointers.iter().map(|p| p + offset));
                    offset += dl.type_size(field);
                }
                TypeLayout {
                    size: offset,
                    arrays,
                    pointers,
                }
            }
            Type::Array(elem, len) => {
                let sub = self.build(elem, dl);
                if *len <= 1 {
                    return sub;
                }
                let elem_size = dl.type_size(elem);
                let size = elem_size * len;
                // The whole array folds onto its first element; the
                // element's own regions stay where they are.
                let mut arrays = vec![ArrayTriple {
                    start: 0,
                    end: size,
                    stride: elem_size,
                }];
                arrays.extend(sub.arrays);
                arrays.dedup();
                TypeLayout {
                    size,
                    arrays,
                    pointers: sub.pointers,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr() -> Type {
        Type::Int(8).pointer_to()
    }

    #[test]
    fn scalar_layouts() {
        let mut cache = LayoutCache::new();
        let dl = DataLayout::default();

        let int_layout = cache.of_type(&Type::Int(32), &dl);
        assert_eq!(cache.get(int_layout).size, 4);
        assert!(cache.get(int_layout).arrays.is_empty());
        assert!(cache.get(int_layout).pointers.is_empty());

        let ptr_layout = cache.of_type(&ptr(), &dl);
        assert_eq!(cache.get(ptr_layout).size, 8);
        assert_eq!(cache.get(ptr_layout).pointers, vec![0]);
    }

    #[test]
    fn layouts_are_interned() {
        let mut cache = LayoutCache::new();
        let dl = DataLayout::default();
        let a = cache.of_type(&Type::Int(32).array_of(8), &dl);
        let b = cache.of_type(&Type::Int(32).array_of(8), &dl);
        assert_eq!(a, b);
    }

    #[test]
    fn array_folds_to_representative_offsets() {
        let mut cache = LayoutCache::new();
        let dl = DataLayout::default();

        let id = cache.of_type(&ptr().array_of(10), &dl);
        let layout = cache.get(id);
        assert_eq!(layout.size, 80);
        assert_eq!(
            layout.arrays,
            vec![ArrayTriple {
                start: 0,
                end: 80,
                stride: 8
            }]
        );

        // Any multiple of the stride wraps back onto the representative.
        assert_eq!(layout.offset_into(0), (0, true));
        assert_eq!(layout.offset_into(24), (0, true));
        assert_eq!(layout.offset_into(76), (4, true));
    }

    #[test]
    fn struct_with_array_member() {
        let mut cache = LayoutCache::new();
        let dl = DataLayout::default();

        // { i64, [4 x i8*], i8* }
        let st = Type::Struct(vec![Type::Int(64), ptr().array_of(4), ptr()]);
        let id = cache.of_type(&st, &dl);
        let layout = cache.get(id);

        assert_eq!(layout.size, 8 + 32 + 8);
        assert_eq!(
            layout.arrays,
            vec![ArrayTriple {
                start: 8,
                end: 40,
                stride: 8
            }]
        );
        assert_eq!(layout.pointers, vec![8, 40]);

        // Offsets inside the folded member wrap; offsets outside pass through.
        assert_eq!(layout.offset_into(16), (8, true));
        assert_eq!(layout.offset_into(40), (40, false));
        assert_eq!(layout.offset_into(0), (0, false));
    }

    #[test]
    fn single_element_array_is_not_folded() {
        let mut cache = LayoutCache::new();
        let dl = DataLayout::default();
        let id = cache.of_type(&ptr().array_of(1), &dl);
        assert!(cache.get(id).arrays.is_empty());
    }
}
