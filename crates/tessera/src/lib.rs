/*! Unified interface for whole-program pointer analysis.
 *
 * Single import for everything you need: building IR modules, loading external effect
 * annotations, and running the analysis to query points-to sets, aliases and the resolved call
 * graph.
 */

pub use tessera_analysis as analysis;
pub use tessera_annot as annot;
pub use tessera_ir as ir;

pub use tessera_ir::{
    builder::{FunctionBuilder, ModuleBuilder},
    instructions::{BinaryOp, CastKind, GepOffset, Instruction, Terminator},
    module::{GlobalVariable, Initializer, Module},
    types::{DataLayout, FunctionType, Type},
    values::{Constant, FuncId, GlobalId, Value, ValueId},
};

pub use tessera_annot::{Effect, EffectTable, TableError};

pub use tessera_analysis::{
    AliasResult, AnalysisConfig, AnalysisError, ContextId, ContextMode, PointerAnalysis, ValueRef,
};
