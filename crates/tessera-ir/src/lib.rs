/*! SSA intermediate representation for whole-program pointer analysis.
 *
 * Alias reasoning needs a representation where allocations, pointer copies, loads, stores and
 * calls are explicit and typed. This crate provides the module/function/block/instruction types
 * and a builder for constructing modules programmatically.
 */

pub mod block;
pub mod builder;
pub mod function;
pub mod instructions;
pub mod module;
pub mod types;
pub mod values;

pub use block::{BasicBlock, BlockId};
pub use builder::{FunctionBuilder, ModuleBuilder};
pub use function::{Function, FunctionBody};
pub use instructions::{BinaryOp, CastKind, GepOffset, Instruction, Terminator};
pub use module::{GlobalVariable, Initializer, Module};
pub use types::{DataLayout, FunctionType, Type};
pub use values::{Constant, FuncId, GlobalId, Value, ValueId};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("Block {0} is already terminated")]
    AlreadyTerminated(BlockId),
    #[error("Block {0} does not exist")]
    NoSuchBlock(BlockId),
}

pub type Result<T> = std::result::Result<T, IrError>;
