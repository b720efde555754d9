use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Int(u16),
    Float(u16),
    Pointer(Box<Type>),
    Array(Box<Type>, u64),
    Struct(Vec<Type>),
    Function(Box<FunctionType>),
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_vararg: bool,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret,
            is_vararg: false,
        }
    }

    pub fn vararg(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret,
            is_vararg: true,
        }
    }
}

impl Type {
    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn array_of(self, len: u64) -> Type {
        Type::Array(Box::new(self), len)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Float(bits) => write!(f, "f{}", bits),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(elem, len) => write!(f, "[{} x {}]", len, elem),
            Type::Struct(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            Type::Function(fty) => {
                write!(f, "fn(")?;
                for (i, p) in fty.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if fty.is_vararg {
                    write!(f, ", ...")?;
                }
                write!(f, ") -> {}", fty.ret)
            }
            Type::Opaque => write!(f, "opaque"),
        }
    }
}

/// Byte-size model for the target. Struct fields are laid out packed, in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    pub pointer_size: u64,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_size: 8 }
    }
}

impl DataLayout {
    pub fn new(pointer_size: u64) -> Self {
        Self { pointer_size }
    }

    pub fn type_size(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void | Type::Opaque => 0,
            Type::Int(bits) | Type::Float(bits) => (*bits as u64 + 7) / 8,
            Type::Pointer(_) => self.pointer_size,
            Type::Array(elem, len) => self.type_size(elem) * len,
            Type::Struct(fields) => fields.iter().map(|f| self.type_size(f)).sum(),
            Type::Function(_) => 0,
        }
    }

    pub fn field_offset(&self, fields: &[Type], index: usize) -> u64 {
        fields[..index].iter().map(|f| self.type_size(f)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes() {
        let dl = DataLayout::default();
        assert_eq!(dl.type_size(&Type::Int(32)), 4);
        assert_eq!(dl.type_size(&Type::Int(1)), 1);
        assert_eq!(dl.type_size(&Type::Int(8).pointer_to()), 8);
    }

    #[test]
    fn aggregate_sizes() {
        let dl = DataLayout::default();
        let st = Type::Struct(vec![Type::Int(32), Type::Int(8).pointer_to()]);
        assert_eq!(dl.type_size(&st), 12);
        assert_eq!(dl.field_offset(&[Type::Int(32), Type::Int(8).pointer_to()], 1), 4);
        assert_eq!(dl.type_size(&Type::Int(32).array_of(10)), 40);
    }
}
