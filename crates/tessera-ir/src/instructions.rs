use crate::block::BlockId;
use crate::types::Type;
use crate::values::{Value, ValueId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Bitcast,
    IntToPtr,
    PtrToInt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    And,
    Or,
    Xor,
}

/// Pointer offset computed by a `Gep`. A statically known byte offset, or an
/// element stride when the index is not a compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GepOffset {
    Const(i64),
    Array { stride: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Instruction {
    Alloca {
        result: ValueId,
        allocated: Type,
    },
    Phi {
        result: ValueId,
        incoming: Vec<Value>,
    },
    Select {
        result: ValueId,
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Cast {
        result: ValueId,
        kind: CastKind,
        operand: Value,
    },
    Gep {
        result: ValueId,
        base: Value,
        offset: GepOffset,
    },
    Binary {
        result: ValueId,
        op: BinaryOp,
        left: Value,
        right: Value,
    },
    Load {
        result: ValueId,
        addr: Value,
    },
    Store {
        addr: Value,
        value: Value,
    },
    Call {
        result: Option<ValueId>,
        callee: Value,
        args: Vec<Value>,
    },
}

impl Instruction {
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Instruction::Alloca { result, .. }
            | Instruction::Phi { result, .. }
            | Instruction::Select { result, .. }
            | Instruction::Cast { result, .. }
            | Instruction::Gep { result, .. }
            | Instruction::Binary { result, .. }
            | Instruction::Load { result, .. } => Some(*result),
            Instruction::Store { .. } => None,
            Instruction::Call { result, .. } => *result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        condition: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<Value>),
    Unreachable,
    Invalid,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Unreachable | Terminator::Invalid => vec![],
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Terminator::Return(_))
    }
}
