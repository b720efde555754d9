use serde::{Deserialize, Serialize};

/// SSA value id, local to one function. Parameters occupy the first ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

impl std::fmt::Display for FuncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Undef,
    Int(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Local(ValueId),
    Global(GlobalId),
    Function(FuncId),
    Const(Constant),
}

impl Value {
    pub fn as_local(&self) -> Option<ValueId> {
        match self {
            Value::Local(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::Const(Constant::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Const(Constant::Null))
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Const(Constant::Undef))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Local(v) => write!(f, "{}", v),
            Value::Global(g) => write!(f, "{}", g),
            Value::Function(func) => write!(f, "{}", func),
            Value::Const(Constant::Null) => write!(f, "null"),
            Value::Const(Constant::Undef) => write!(f, "undef"),
            Value::Const(Constant::Int(n)) => write!(f, "{}", n),
        }
    }
}
