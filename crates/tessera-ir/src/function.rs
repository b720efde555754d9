use crate::block::{BasicBlock, BlockId};
use crate::types::{FunctionType, Type};
use crate::values::ValueId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ty: FunctionType,
    pub body: Option<FunctionBody>,
}

impl Function {
    /// A declaration without a body. External to the module under analysis.
    pub fn declaration(name: impl Into<String>, ty: FunctionType) -> Self {
        Self {
            name: name.into(),
            ty,
            body: None,
        }
    }

    pub fn defined(name: impl Into<String>, ty: FunctionType) -> Self {
        let body = FunctionBody::new(&ty.params);
        Self {
            name: name.into(),
            ty,
            body: Some(body),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }

    pub fn is_vararg(&self) -> bool {
        self.ty.is_vararg
    }

    pub fn param_count(&self) -> usize {
        self.ty.params.len()
    }

    pub fn pointer_param_count(&self) -> usize {
        self.ty.params.iter().filter(|p| p.is_pointer()).count()
    }

    pub fn returns_pointer(&self) -> bool {
        self.ty.ret.is_pointer()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionBody {
    pub entry_block: BlockId,
    pub blocks: IndexMap<BlockId, BasicBlock>,
    value_types: Vec<Type>,
    param_count: usize,
    next_block_id: u32,
}

impl FunctionBody {
    pub fn new(param_types: &[Type]) -> Self {
        let entry_block = BlockId(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry_block, BasicBlock::new(entry_block));

        Self {
            entry_block,
            blocks,
            value_types: param_types.to_vec(),
            param_count: param_types.len(),
            next_block_id: 1,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.value_types.len() as u32);
        self.value_types.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> &Type {
        &self.value_types[value.0 as usize]
    }

    pub fn is_pointer_value(&self, value: ValueId) -> bool {
        self.value_type(value).is_pointer()
    }

    pub fn value_count(&self) -> usize {
        self.value_types.len()
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn param(&self, index: usize) -> ValueId {
        assert!(index < self.param_count, "parameter index out of range");
        ValueId(index as u32)
    }

    pub fn params(&self) -> impl Iterator<Item = ValueId> {
        (0..self.param_count as u32).map(ValueId)
    }
}
