use crate::function::Function;
use crate::types::{DataLayout, Type};
use crate::values::{FuncId, GlobalId, Value, ValueId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub initializer: Option<Initializer>,
}

/// Constant initializer forms. `OffsetOf` is the result of a constant
/// GEP-style address computation over another global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    Zero,
    Undef,
    Int(i64),
    GlobalRef(GlobalId),
    FunctionRef(FuncId),
    OffsetOf { base: GlobalId, offset: u64 },
    Struct(Vec<Initializer>),
    Array(Vec<Initializer>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub layout: DataLayout,
    pub globals: IndexMap<GlobalId, GlobalVariable>,
    pub functions: IndexMap<FuncId, Function>,
    pub entry: Option<FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: DataLayout::default(),
            globals: IndexMap::new(),
            functions: IndexMap::new(),
            entry: None,
        }
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[&id]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[&id]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| *id)
    }

    pub fn local_type(&self, func: FuncId, value: ValueId) -> &Type {
        self.function(func)
            .body
            .as_ref()
            .expect("local value in a function without a body")
            .value_type(value)
    }

    /// Whether a value is pointer-typed in the given function. Globals and
    /// functions are address constants; `Null`/`Undef` only appear where a
    /// pointer is expected.
    pub fn is_pointer_value(&self, func: FuncId, value: Value) -> bool {
        match value {
            Value::Local(v) => self.local_type(func, v).is_pointer(),
            Value::Global(_) | Value::Function(_) => true,
            Value::Const(crate::values::Constant::Null)
            | Value::Const(crate::values::Constant::Undef) => true,
            Value::Const(crate::values::Constant::Int(_)) => false,
        }
    }
}
