use crate::program::cfg::{Cfg, CopyKind, NodeId, NodeKind};
use crate::program::SemiSparseProgram;
use std::collections::{HashMap, HashSet};
use tessera_ir::{
    BlockId, CastKind, Constant, FuncId, FunctionBody, GepOffset, Instruction, Module, Terminator,
    Value, ValueId,
};
use tracing::{debug, warn};

/// Build the semi-sparse program for `module`: one pointer CFG per defined
/// function, reduced to pointer-relevant nodes, with def-use edges and
/// reverse-postorder priorities.
pub(crate) fn build_program(module: &Module, entry: FuncId) -> SemiSparseProgram {
    let mut program = SemiSparseProgram::new(entry);
    program.set_addr_taken(collect_addr_taken(module));

    for (&func, function) in &module.functions {
        if let Some(body) = &function.body {
            let cfg = FunctionTranslator::new(module, func, body, &mut program).translate();
            program.insert_cfg(cfg);
        }
    }

    debug!(
        functions = program.cfgs().count(),
        nodes = program.node_count(),
        "built semi-sparse program"
    );
    program
}

fn instruction_operands(inst: &Instruction) -> Vec<Value> {
    match inst {
        Instruction::Alloca { .. } => vec![],
        Instruction::Phi { incoming, .. } => incoming.clone(),
        Instruction::Select {
            cond,
            on_true,
            on_false,
            ..
        } => vec![*cond, *on_true, *on_false],
        Instruction::Cast { operand, .. } => vec![*operand],
        Instruction::Gep { base, .. } => vec![*base],
        Instruction::Binary { left, right, .. } => vec![*left, *right],
        Instruction::Load { addr, .. } => vec![*addr],
        Instruction::Store { addr, value } => vec![*addr, *value],
        Instruction::Call { callee, args, .. } => {
            // The callee of a direct call is not an escape; arguments are.
            let mut ops = args.clone();
            if callee.as_local().is_some() {
                ops.push(*callee);
            }
            ops
        }
    }
}

/// Functions whose address escapes into data: referenced by a global
/// initializer or used as an operand outside direct-callee position. These
/// are the candidate targets when an indirect call resolves to the
/// universal object.
fn collect_addr_taken(module: &Module) -> Vec<FuncId> {
    let mut taken = HashSet::new();

    fn walk_init(init: &tessera_ir::Initializer, taken: &mut HashSet<FuncId>) {
        match init {
            tessera_ir::Initializer::FunctionRef(f) => {
                taken.insert(*f);
            }
            tessera_ir::Initializer::Struct(subs) | tessera_ir::Initializer::Array(subs) => {
                for sub in subs {
                    walk_init(sub, taken);
                }
            }
            _ => {}
        }
    }

    for global in module.globals.values() {
        if let Some(init) = &global.initializer {
            walk_init(init, &mut taken);
        }
    }

    for function in module.functions.values() {
        let Some(body) = &function.body else { continue };
        for block in body.blocks.values() {
            for inst in &block.instructions {
                for op in instruction_operands(inst) {
                    if let Value::Function(f) = op {
                        taken.insert(f);
                    }
                }
            }
            match &block.terminator {
                Terminator::Return(Some(Value::Function(f))) => {
                    taken.insert(*f);
                }
                Terminator::Branch {
                    condition: Value::Function(f),
                    ..
                } => {
                    taken.insert(*f);
                }
                _ => {}
            }
        }
    }

    let mut list: Vec<FuncId> = taken.into_iter().collect();
    list.sort_unstable();
    list
}

struct FunctionTranslator<'m, 'p> {
    module: &'m Module,
    func: FuncId,
    body: &'m FunctionBody,
    program: &'p mut SemiSparseProgram,
    /// Cast-stripping map: a value aliased to the value it copies verbatim.
    canonical: HashMap<ValueId, Value>,
    /// IntToPtr round-trips that reconstruct into pointer arithmetic.
    pending_offset: HashMap<ValueId, (Value, u64)>,
    inst_defs: HashMap<ValueId, (BlockId, usize)>,
    def_node: HashMap<ValueId, NodeId>,
    block_span: HashMap<BlockId, (NodeId, NodeId)>,
    entry_node: NodeId,
    node_ids: Vec<NodeId>,
    has_return: bool,
}

impl<'m, 'p> FunctionTranslator<'m, 'p> {
    fn new(
        module: &'m Module,
        func: FuncId,
        body: &'m FunctionBody,
        program: &'p mut SemiSparseProgram,
    ) -> Self {
        let entry_node = program.arena_mut().add(func, NodeKind::Entry);
        Self {
            module,
            func,
            body,
            program,
            canonical: HashMap::new(),
            pending_offset: HashMap::new(),
            inst_defs: HashMap::new(),
            def_node: HashMap::new(),
            block_span: HashMap::new(),
            entry_node,
            node_ids: vec![entry_node],
            has_return: false,
        }
    }

    fn translate(mut self) -> Cfg {
        self.build_canonical_map();
        self.translate_blocks();
        self.connect_blocks();
        self.construct_def_use_edges();
        self.assign_priorities();
        self.detach_top_level_nodes();

        Cfg {
            func: self.func,
            entry: self.entry_node,
            nodes: self.node_ids,
            has_return: self.has_return,
        }
    }

    fn is_pointer_valued(&self, value: Value) -> bool {
        self.module.is_pointer_value(self.func, value)
    }

    fn resolve(&self, value: Value) -> Value {
        let mut current = value;
        let mut seen = 0usize;
        while let Value::Local(id) = current {
            match self.canonical.get(&id) {
                Some(&next) => current = next,
                None => break,
            }
            seen += 1;
            if seen > self.body.value_count() {
                break;
            }
        }
        current
    }

    /// Detect `inttoptr(ptrtoint p [+ c])` and recover the underlying
    /// pointer and byte offset.
    fn reconstruct_round_trip(&self, operand: Value) -> Option<(Value, u64)> {
        let resolved = self.resolve(operand);
        if self.is_pointer_valued(resolved) {
            return Some((resolved, 0));
        }
        let Value::Local(v) = resolved else {
            return None;
        };
        let &(block, index) = self.inst_defs.get(&v)?;
        let inst = &self.body.block(block)?.instructions[index];
        let Instruction::Binary {
            op: tessera_ir::BinaryOp::Add,
            left,
            right,
            ..
        } = inst
        else {
            return None;
        };

        let (l, r) = (self.resolve(*left), self.resolve(*right));
        if self.is_pointer_valued(l) {
            if let Some(c) = r.as_const_int() {
                if c >= 0 {
                    return Some((l, c as u64));
                }
            }
        }
        if self.is_pointer_valued(r) {
            if let Some(c) = l.as_const_int() {
                if c >= 0 {
                    return Some((r, c as u64));
                }
            }
        }
        None
    }

    fn build_canonical_map(&mut self) {
        let body = self.body;
        for (&block_id, block) in &body.blocks {
            for (index, inst) in block.instructions.iter().enumerate() {
                if let Some(result) = inst.result() {
                    self.inst_defs.insert(result, (block_id, index));
                }
                if let Instruction::Cast {
                    result,
                    kind: CastKind::Bitcast | CastKind::PtrToInt,
                    operand,
                } = inst
                {
                    self.canonical.insert(*result, *operand);
                }
            }
        }

        // IntToPtr casts either reconstruct into a copy/offset of the
        // original pointer or degrade to the universal value.
        for block in body.blocks.values() {
            for inst in &block.instructions {
                let Instruction::Cast {
                    result,
                    kind: CastKind::IntToPtr,
                    operand,
                } = inst
                else {
                    continue;
                };
                match self.reconstruct_round_trip(*operand) {
                    Some((base, 0)) => {
                        self.canonical.insert(*result, base);
                    }
                    Some((base, offset)) => {
                        self.pending_offset.insert(*result, (base, offset));
                    }
                    None => {}
                }
            }
        }
    }

    fn canon(&self, value: Value) -> Value {
        self.resolve(value)
    }

    fn add_node(&mut self, kind: NodeKind, result: Option<ValueId>) -> NodeId {
        let id = self.program.arena_mut().add(self.func, kind);
        self.node_ids.push(id);
        if let Some(result) = result {
            self.def_node.insert(result, id);
        }
        id
    }

    fn translate_instruction(&mut self, inst: &Instruction) -> Option<NodeId> {
        match inst {
            Instruction::Alloca { result, allocated } => Some(self.add_node(
                NodeKind::Alloc {
                    dest: *result,
                    allocated: allocated.clone(),
                },
                Some(*result),
            )),
            Instruction::Phi { result, incoming } => {
                if !self.body.is_pointer_value(*result) {
                    return None;
                }
                let mut srcs = Vec::new();
                for &op in incoming {
                    let op = self.canon(op);
                    if op.is_undef() || srcs.contains(&op) {
                        continue;
                    }
                    srcs.push(op);
                }
                if srcs.is_empty() {
                    srcs.push(Value::Const(Constant::Undef));
                }
                Some(self.add_node(
                    NodeKind::Copy {
                        dest: *result,
                        kind: CopyKind::Merge(srcs),
                    },
                    Some(*result),
                ))
            }
            Instruction::Select {
                result,
                on_true,
                on_false,
                ..
            } => {
                if !self.body.is_pointer_value(*result) {
                    return None;
                }
                let mut srcs = vec![self.canon(*on_true)];
                let alt = self.canon(*on_false);
                if !srcs.contains(&alt) {
                    srcs.push(alt);
                }
                Some(self.add_node(
                    NodeKind::Copy {
                        dest: *result,
                        kind: CopyKind::Merge(srcs),
                    },
                    Some(*result),
                ))
            }
            Instruction::Cast { result, kind, .. } => {
                if *kind != CastKind::IntToPtr || self.canonical.contains_key(result) {
                    return None;
                }
                let kind = match self.pending_offset.get(result) {
                    Some(&(base, offset)) => CopyKind::Offset {
                        src: base,
                        offset,
                        array: false,
                    },
                    None => CopyKind::Merge(vec![Value::Const(Constant::Undef)]),
                };
                Some(self.add_node(
                    NodeKind::Copy {
                        dest: *result,
                        kind,
                    },
                    Some(*result),
                ))
            }
            Instruction::Gep {
                result,
                base,
                offset,
            } => {
                let src = self.canon(*base);
                let kind = match offset {
                    GepOffset::Const(c) if *c < 0 => {
                        warn!(
                            offset = *c,
                            "negative constant pointer offset, widening to universal"
                        );
                        CopyKind::Merge(vec![Value::Const(Constant::Undef)])
                    }
                    GepOffset::Const(c) => CopyKind::Offset {
                        src,
                        offset: *c as u64,
                        array: false,
                    },
                    GepOffset::Array { stride } => CopyKind::Offset {
                        src,
                        offset: *stride,
                        array: true,
                    },
                };
                Some(self.add_node(
                    NodeKind::Copy {
                        dest: *result,
                        kind,
                    },
                    Some(*result),
                ))
            }
            Instruction::Binary { .. } => None,
            Instruction::Load { result, addr } => {
                if !self.body.is_pointer_value(*result) {
                    return None;
                }
                let src = self.canon(*addr);
                Some(self.add_node(
                    NodeKind::Load {
                        dest: *result,
                        src,
                    },
                    Some(*result),
                ))
            }
            Instruction::Store { addr, value } => {
                if !self.is_pointer_valued(*value) {
                    return None;
                }
                let dest = self.canon(*addr);
                let src = self.canon(*value);
                Some(self.add_node(NodeKind::Store { dest, src }, None))
            }
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                let callee = self.canon(*callee);
                let args: Vec<Value> = args.iter().map(|&a| self.canon(a)).collect();
                let ptr_args: Vec<Value> = args
                    .iter()
                    .copied()
                    .filter(|&a| self.is_pointer_valued(a))
                    .collect();
                let dest = (*result).filter(|r| self.body.is_pointer_value(*r));
                Some(self.add_node(
                    NodeKind::Call {
                        dest,
                        callee,
                        args,
                        ptr_args,
                    },
                    *result,
                ))
            }
        }
    }

    fn translate_blocks(&mut self) {
        let body = self.body;
        for (&block_id, block) in &body.blocks {
            let mut start: Option<NodeId> = None;
            let mut end: Option<NodeId> = None;

            for inst in &block.instructions {
                let Some(node) = self.translate_instruction(inst) else {
                    continue;
                };
                if start.is_none() {
                    start = Some(node);
                }
                if let Some(prev) = end {
                    self.program.arena_mut().add_edge(prev, node);
                }
                end = Some(node);
            }

            if let Terminator::Return(value) = &block.terminator {
                let value = value
                    .map(|v| self.canon(v))
                    .filter(|&v| self.is_pointer_valued(v));
                let node = self.add_node(NodeKind::Return { value }, None);
                self.has_return = true;
                if start.is_none() {
                    start = Some(node);
                }
                if let Some(prev) = end {
                    self.program.arena_mut().add_edge(prev, node);
                }
                end = Some(node);
            }

            if let (Some(s), Some(e)) = (start, end) {
                self.block_span.insert(block_id, (s, e));
            }
        }
    }

    /// Entry nodes of the region reached through `block`, looking through
    /// blocks that contain no pointer-relevant instructions (including
    /// cycles of them).
    fn block_entry_nodes(&self, block: BlockId) -> Vec<NodeId> {
        if let Some(&(start, _)) = self.block_span.get(&block) {
            return vec![start];
        }

        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut worklist = vec![block];
        visited.insert(block);

        while let Some(current) = worklist.pop() {
            let successors = self
                .body
                .block(current)
                .map(|b| b.successors())
                .unwrap_or_default();
            for succ in successors {
                if let Some(&(start, _)) = self.block_span.get(&succ) {
                    if !found.contains(&start) {
                        found.push(start);
                    }
                } else if visited.insert(succ) {
                    worklist.push(succ);
                }
            }
        }
        found
    }

    fn connect_blocks(&mut self) {
        let spans: Vec<(BlockId, NodeId)> = self
            .block_span
            .iter()
            .map(|(&b, &(_, end))| (b, end))
            .collect();

        for (block_id, end) in spans {
            let successors = self
                .body
                .block(block_id)
                .map(|b| b.successors())
                .unwrap_or_default();
            for succ in successors {
                for target in self.block_entry_nodes(succ) {
                    self.program.arena_mut().add_edge(end, target);
                }
            }
        }

        let entry_targets = if let Some(&(start, _)) = self.block_span.get(&self.body.entry_block) {
            vec![start]
        } else {
            self.block_entry_nodes(self.body.entry_block)
        };
        for target in entry_targets {
            self.program.arena_mut().add_edge(self.entry_node, target);
        }
    }

    fn def_use_operands(&self, node: NodeId) -> Vec<Value> {
        match &self.program.node(node).kind {
            NodeKind::Entry => vec![],
            NodeKind::Alloc { .. } => vec![],
            NodeKind::Copy { kind, .. } => match kind {
                CopyKind::Merge(srcs) => srcs.clone(),
                CopyKind::Offset { src, .. } => vec![*src],
            },
            NodeKind::Load { src, .. } => vec![*src],
            NodeKind::Store { dest, src } => vec![*src, *dest],
            NodeKind::Call {
                callee, ptr_args, ..
            } => {
                let mut ops = vec![*callee];
                ops.extend_from_slice(ptr_args);
                ops
            }
            NodeKind::Return { value } => value.iter().copied().collect(),
        }
    }

    fn construct_def_use_edges(&mut self) {
        for i in 0..self.node_ids.len() {
            let node = self.node_ids[i];
            if self.program.node(node).is_entry() {
                continue;
            }

            if matches!(self.program.node(node).kind, NodeKind::Alloc { .. }) {
                self.program
                    .arena_mut()
                    .add_def_use_edge(self.entry_node, node);
                continue;
            }

            for op in self.def_use_operands(node) {
                if !self.is_pointer_valued(op) {
                    continue;
                }
                let def = match op {
                    Value::Local(v) => self.def_node.get(&v).copied().unwrap_or(self.entry_node),
                    _ => self.entry_node,
                };
                self.program.arena_mut().add_def_use_edge(def, node);
            }
        }
    }

    /// Post-order numbering from the entry; the worklist pops the highest
    /// number first, which yields reverse-postorder evaluation.
    fn assign_priorities(&mut self) {
        let mut order = 0u32;
        let mut visited = HashSet::new();
        let mut stack = vec![(self.entry_node, 0usize)];
        visited.insert(self.entry_node);

        while let Some(&(node, next)) = stack.last() {
            let succ = self.program.node(node).succs().get(next).copied();
            match succ {
                Some(succ) => {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    if visited.insert(succ) {
                        stack.push((succ, 0));
                    }
                }
                None => {
                    order += 1;
                    self.program.arena_mut().node_mut(node).set_priority(order);
                    stack.pop();
                }
            }
        }
    }

    fn detach_top_level_nodes(&mut self) {
        for i in 0..self.node_ids.len() {
            let node = self.node_ids[i];
            if self.program.node(node).is_top_level() {
                self.program.arena_mut().detach(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::cfg::NodeKind;
    use tessera_ir::{BinaryOp, FunctionType, ModuleBuilder, Type};

    fn ptr() -> Type {
        Type::Int(8).pointer_to()
    }

    fn node_kinds(program: &SemiSparseProgram) -> Vec<&'static str> {
        program
            .nodes()
            .map(|(_, n)| match n.kind {
                NodeKind::Entry => "entry",
                NodeKind::Alloc { .. } => "alloc",
                NodeKind::Copy { .. } => "copy",
                NodeKind::Load { .. } => "load",
                NodeKind::Store { .. } => "store",
                NodeKind::Call { .. } => "call",
                NodeKind::Return { .. } => "return",
            })
            .collect()
    }

    #[test]
    fn irrelevant_instructions_are_elided() {
        let mut builder = ModuleBuilder::new("m");
        let mut f = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
        let a = f.binary(
            BinaryOp::Add,
            Value::Const(Constant::Int(1)),
            Value::Const(Constant::Int(2)),
            Type::Int(32),
        );
        let slot = f.alloca(Type::Int(32));
        // An integer store is not pointer-relevant.
        f.store(slot, a);
        f.ret(Some(a)).unwrap();
        let id = f.finish();
        builder.set_entry(id);
        let module = builder.build();

        let program = build_program(&module, id);
        assert_eq!(node_kinds(&program), vec!["entry", "alloc", "return"]);
    }

    #[test]
    fn control_flow_routes_around_empty_blocks() {
        let mut builder = ModuleBuilder::new("m");
        let mut f = builder.function("main", FunctionType::new(vec![], Type::Void));
        let empty1 = f.create_block();
        let empty2 = f.create_block();
        let tail = f.create_block();

        let slot = f.alloca(ptr());
        f.branch(Value::Const(Constant::Int(1)), empty1, empty2)
            .unwrap();
        f.switch_to(empty1);
        f.jump(tail).unwrap();
        f.switch_to(empty2);
        f.jump(tail).unwrap();
        f.switch_to(tail);
        f.store(slot, Value::Const(Constant::Null));
        f.ret(None).unwrap();
        let id = f.finish();
        builder.set_entry(id);
        let module = builder.build();

        let program = build_program(&module, id);
        let store = program
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Store { .. }))
            .map(|(id, _)| id)
            .unwrap();
        let entry = program.entry_cfg().entry;

        // The alloc was detached, so the entry connects straight to the
        // store through both empty blocks.
        assert!(program.node(entry).succs().contains(&store));
        assert_eq!(program.node(store).preds(), &[entry]);
    }

    #[test]
    fn def_use_edges_connect_producer_to_consumer() {
        let mut builder = ModuleBuilder::new("m");
        let mut f = builder.function("main", FunctionType::new(vec![], Type::Void));
        let slot = f.alloca(ptr());
        let loaded = f.load(ptr(), slot);
        f.store(slot, loaded);
        f.ret(None).unwrap();
        let id = f.finish();
        builder.set_entry(id);
        let module = builder.build();

        let program = build_program(&module, id);
        let alloc = program
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Alloc { .. }))
            .map(|(id, _)| id)
            .unwrap();
        let load = program
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Load { .. }))
            .map(|(id, _)| id)
            .unwrap();
        let store = program
            .nodes()
            .find(|(_, n)| matches!(n.kind, NodeKind::Store { .. }))
            .map(|(id, _)| id)
            .unwrap();

        assert!(program.node(alloc).uses().contains(&load));
        assert!(program.node(alloc).uses().contains(&store));
        assert!(program.node(load).uses().contains(&store));
    }

    #[test]
    fn casts_are_canonicalized_through() {
        let mut builder = ModuleBuilder::new("m");
        let mut f = builder.function("main", FunctionType::new(vec![], Type::Void));
        let slot = f.alloca(Type::Int(64));
        let as_int = f.cast(CastKind::PtrToInt, slot, Type::Int(64));
        let bumped = f.binary(
            BinaryOp::Add,
            as_int,
            Value::Const(Constant::Int(8)),
            Type::Int(64),
        );
        let back = f.cast(CastKind::IntToPtr, bumped, ptr());
        f.store(back, Value::Const(Constant::Null));
        f.ret(None).unwrap();
        let id = f.finish();
        builder.set_entry(id);
        let module = builder.build();

        let program = build_program(&module, id);
        // The round trip reconstructs as pointer arithmetic on the alloca.
        let offset = program.nodes().find_map(|(_, n)| match &n.kind {
            NodeKind::Copy {
                kind: CopyKind::Offset { src, offset, .. },
                ..
            } => Some((*src, *offset)),
            _ => None,
        });
        assert_eq!(offset, Some((slot, 8)));
    }

    #[test]
    fn priorities_follow_reverse_postorder() {
        let mut builder = ModuleBuilder::new("m");
        let mut f = builder.function("main", FunctionType::new(vec![], Type::Void));
        let slot = f.alloca(ptr());
        f.store(slot, Value::Const(Constant::Null));
        let l = f.load(ptr(), slot);
        f.store(slot, l);
        f.ret(None).unwrap();
        let id = f.finish();
        builder.set_entry(id);
        let module = builder.build();

        let program = build_program(&module, id);
        let entry = program.entry_cfg().entry;
        let mut current = entry;
        let mut last_priority = u32::MAX;
        loop {
            let node = program.node(current);
            assert!(node.priority() < last_priority || current == entry);
            last_priority = node.priority();
            match node.succs().first() {
                Some(&next) => current = next,
                None => break,
            }
        }
    }

    #[test]
    fn address_taken_functions_are_collected() {
        let mut builder = ModuleBuilder::new("m");
        let callee_ty = FunctionType::new(vec![ptr()], ptr());

        let mut target = builder.function("target", callee_ty.clone());
        let p = target.param(0);
        target.ret(Some(p)).unwrap();
        let target_id = target.finish();

        let fp_ty = Type::Function(Box::new(callee_ty)).pointer_to();
        builder.global(
            "fp",
            fp_ty,
            Some(tessera_ir::Initializer::FunctionRef(target_id)),
        );

        let mut main = builder.function("main", FunctionType::new(vec![], Type::Void));
        main.ret(None).unwrap();
        let main_id = main.finish();
        builder.set_entry(main_id);
        let module = builder.build();

        let program = build_program(&module, main_id);
        assert_eq!(program.addr_taken_funcs(), &[target_id]);
    }
}
