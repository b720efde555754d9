use crate::block::BlockId;
use crate::function::Function;
use crate::instructions::{BinaryOp, CastKind, GepOffset, Instruction, Terminator};
use crate::module::{GlobalVariable, Initializer, Module};
use crate::types::{DataLayout, FunctionType, Type};
use crate::values::{FuncId, GlobalId, Value};
use crate::{IrError, Result};

/// Programmatic construction of modules. The only frontend in this workspace;
/// test fixtures and embedders build IR through it.
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
        }
    }

    pub fn set_layout(&mut self, layout: DataLayout) -> &mut Self {
        self.module.layout = layout;
        self
    }

    pub fn global(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        initializer: Option<Initializer>,
    ) -> GlobalId {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.insert(
            id,
            GlobalVariable {
                name: name.into(),
                ty,
                initializer,
            },
        );
        id
    }

    pub fn declare_function(&mut self, name: impl Into<String>, ty: FunctionType) -> FuncId {
        let id = FuncId(self.module.functions.len() as u32);
        self.module
            .functions
            .insert(id, Function::declaration(name, ty));
        id
    }

    pub fn function(&mut self, name: impl Into<String>, ty: FunctionType) -> FunctionBuilder<'_> {
        let id = FuncId(self.module.functions.len() as u32);
        self.module.functions.insert(id, Function::defined(name, ty));
        let entry = self.module.functions[&id]
            .body
            .as_ref()
            .expect("defined function has a body")
            .entry_block;
        FunctionBuilder {
            module: &mut self.module,
            id,
            current: entry,
        }
    }

    pub fn set_entry(&mut self, func: FuncId) {
        self.module.entry = Some(func);
    }

    pub fn build(self) -> Module {
        self.module
    }
}

pub struct FunctionBuilder<'a> {
    module: &'a mut Module,
    id: FuncId,
    current: BlockId,
}

impl FunctionBuilder<'_> {
    pub fn id(&self) -> FuncId {
        self.id
    }

    pub fn param(&self, index: usize) -> Value {
        Value::Local(self.body().param(index))
    }

    pub fn create_block(&mut self) -> BlockId {
        self.body_mut().create_block()
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn alloca(&mut self, allocated: Type) -> Value {
        let result = self.body_mut().new_value(allocated.clone().pointer_to());
        self.push(Instruction::Alloca { result, allocated });
        Value::Local(result)
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<Value>) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Phi { result, incoming });
        Value::Local(result)
    }

    pub fn select(&mut self, ty: Type, cond: Value, on_true: Value, on_false: Value) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Select {
            result,
            cond,
            on_true,
            on_false,
        });
        Value::Local(result)
    }

    pub fn cast(&mut self, kind: CastKind, operand: Value, ty: Type) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Cast {
            result,
            kind,
            operand,
        });
        Value::Local(result)
    }

    pub fn gep(&mut self, base: Value, offset: GepOffset, ty: Type) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Gep {
            result,
            base,
            offset,
        });
        Value::Local(result)
    }

    pub fn binary(&mut self, op: BinaryOp, left: Value, right: Value, ty: Type) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Binary {
            result,
            op,
            left,
            right,
        });
        Value::Local(result)
    }

    pub fn load(&mut self, ty: Type, addr: Value) -> Value {
        let result = self.body_mut().new_value(ty);
        self.push(Instruction::Load { result, addr });
        Value::Local(result)
    }

    pub fn store(&mut self, addr: Value, value: Value) {
        self.push(Instruction::Store { addr, value });
    }

    pub fn call(&mut self, callee: Value, args: Vec<Value>, result_ty: Option<Type>) -> Option<Value> {
        let result = result_ty.map(|ty| self.body_mut().new_value(ty));
        self.push(Instruction::Call {
            result,
            callee,
            args,
        });
        result.map(Value::Local)
    }

    pub fn jump(&mut self, target: BlockId) -> Result<()> {
        self.terminate(Terminator::Jump(target))
    }

    pub fn branch(&mut self, condition: Value, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.terminate(Terminator::Branch {
            condition,
            then_block,
            else_block,
        })
    }

    pub fn ret(&mut self, value: Option<Value>) -> Result<()> {
        self.terminate(Terminator::Return(value))
    }

    pub fn unreachable(&mut self) -> Result<()> {
        self.terminate(Terminator::Unreachable)
    }

    pub fn finish(self) -> FuncId {
        self.id
    }

    fn body(&self) -> &crate::function::FunctionBody {
        self.module.functions[&self.id]
            .body
            .as_ref()
            .expect("builder targets a defined function")
    }

    fn body_mut(&mut self) -> &mut crate::function::FunctionBody {
        self.module
            .functions
            .get_mut(&self.id)
            .unwrap()
            .body
            .as_mut()
            .expect("builder targets a defined function")
    }

    fn push(&mut self, inst: Instruction) {
        let block = self.current;
        self.body_mut()
            .block_mut(block)
            .expect("current block exists")
            .add_instruction(inst);
    }

    fn terminate(&mut self, term: Terminator) -> Result<()> {
        let block = self.current;
        let bb = self
            .body_mut()
            .block_mut(block)
            .ok_or(IrError::NoSuchBlock(block))?;
        if bb.is_terminated() {
            return Err(IrError::AlreadyTerminated(block));
        }
        bb.set_terminator(term);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Constant;

    #[test]
    fn build_identity_function() {
        let mut builder = ModuleBuilder::new("test");
        let ptr = Type::Int(32).pointer_to();
        let mut f = builder.function("id", FunctionType::new(vec![ptr.clone()], ptr));
        let p = f.param(0);
        f.ret(Some(p)).unwrap();
        let id = f.finish();

        let module = builder.build();
        let func = module.function(id);
        assert_eq!(func.name, "id");
        assert_eq!(func.pointer_param_count(), 1);
        assert!(func.returns_pointer());
        assert!(!func.is_declaration());
    }

    #[test]
    fn double_terminator_is_rejected() {
        let mut builder = ModuleBuilder::new("test");
        let mut f = builder.function("f", FunctionType::new(vec![], Type::Void));
        f.ret(None).unwrap();
        assert!(f.ret(None).is_err());
    }

    #[test]
    fn alloca_result_is_pointer() {
        let mut builder = ModuleBuilder::new("test");
        let mut f = builder.function("f", FunctionType::new(vec![], Type::Void));
        let slot = f.alloca(Type::Int(64));
        f.store(slot, Value::Const(Constant::Null));
        f.ret(None).unwrap();
        let id = f.finish();

        let module = builder.build();
        let local = slot.as_local().unwrap();
        assert!(module.local_type(id, local).is_pointer());
    }
}
