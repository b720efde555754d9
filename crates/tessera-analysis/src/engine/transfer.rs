//! Per-node-kind transfer functions and call resolution.
//!
//! Each evaluation reports an explicit three-way status: `NotReady` when an
//! operand has no points-to fact yet (the def-use edges re-enqueue the node
//! once the fact appears), `NoChange`, or `Changed`. Successor program points
//! are collected into an [`EvalResult`]; the solver decides what to enqueue.

use crate::context::ContextId;
use crate::engine::eval::{EvalResult, EvalStatus, StoreRef};
use crate::engine::Solver;
use crate::memory::{MemoryManager, ObjId};
use crate::pointer::{PtrId, ValueRef};
use crate::program::cfg::{CopyKind, NodeKind};
use crate::program::{FunctionContext, ProgramPoint};
use crate::pts::{PtsSetId, Store};
use crate::{AnalysisError, Result};
use tessera_annot::{AccessMode, DestSpec, Effect, SourceSpec};
use tessera_ir::{FuncId, Type, Value, ValueId};
use tracing::{trace, warn};

impl Solver<'_> {
    pub(crate) fn eval(&mut self, pp: ProgramPoint) -> Result<EvalResult> {
        trace!(%pp, "evaluating");
        let mut result = EvalResult::new();
        let kind = self.program.node(pp.node).kind.clone();
        match kind {
            NodeKind::Entry => self.eval_entry(pp, &mut result),
            NodeKind::Alloc { dest, allocated } => {
                if self.eval_alloc(pp, dest, &allocated) {
                    self.add_top_level_succs(pp, &mut result);
                }
            }
            NodeKind::Copy { dest, kind } => {
                if self.eval_copy(pp, dest, &kind).is_changed() {
                    self.add_top_level_succs(pp, &mut result);
                }
            }
            NodeKind::Load { dest, src } => self.eval_load(pp, dest, src, &mut result),
            NodeKind::Store { dest, src } => self.eval_store(pp, dest, src, &mut result),
            NodeKind::Call {
                dest,
                callee,
                args,
                ptr_args,
            } => self.eval_call(pp, dest, callee, &args, &ptr_args, &mut result)?,
            NodeKind::Return { value } => self.eval_return(pp, value, &mut result),
        }
        Ok(result)
    }

    fn add_top_level_succs(&self, pp: ProgramPoint, result: &mut EvalResult) {
        for &succ in self.program.node(pp.node).uses() {
            result.add_top_level(ProgramPoint::new(pp.ctx, succ));
        }
    }

    fn add_mem_level_succs(&self, pp: ProgramPoint, result: &mut EvalResult, store: StoreRef) {
        for &succ in self.program.node(pp.node).succs() {
            result.add_mem_level(ProgramPoint::new(pp.ctx, succ), store);
        }
    }

    /// Entry forwards the incoming store unchanged. Store pruning happens at
    /// the call site, not here.
    fn eval_entry(&mut self, pp: ProgramPoint, result: &mut EvalResult) {
        let Some(store) = self.memo.lookup(pp).cloned() else {
            return;
        };
        let store = result.new_store(store);
        self.add_top_level_succs(pp, result);
        self.add_mem_level_succs(pp, result, store);
    }

    fn eval_alloc(&mut self, pp: ProgramPoint, dest: ValueId, allocated: &Type) -> bool {
        let func = self.program.node(pp.node).func;
        let value = ValueRef::Local { func, value: dest };
        let ptr = self.ptrs.get_or_create(pp.ctx, value);
        let obj = self.mem.allocate_stack(pp.ctx, value, allocated);
        let set = self.pool.singleton(obj);
        self.env.strong_update(ptr, set)
    }

    fn eval_copy(&mut self, pp: ProgramPoint, dest: ValueId, kind: &CopyKind) -> EvalStatus {
        let func = self.program.node(pp.node).func;
        match kind {
            CopyKind::Merge(srcs) => self.eval_copy_merge(pp.ctx, func, dest, srcs),
            CopyKind::Offset { src, offset, array } => {
                self.eval_copy_offset(pp.ctx, func, dest, *src, *offset, *array)
            }
        }
    }

    fn eval_copy_merge(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        dest: ValueId,
        srcs: &[Value],
    ) -> EvalStatus {
        let mut src_sets = Vec::with_capacity(srcs.len());
        for &src in srcs {
            // A phi operand may be defined below the phi itself; skip it
            // rather than stalling, or mutually dependent phis never start.
            let Some(ptr) = self.ptr_of(ctx, func, src) else {
                continue;
            };
            let set = self.env.lookup(ptr);
            if set == PtsSetId::EMPTY {
                return EvalStatus::NotReady;
            }
            src_sets.push(set);
        }

        let merged = self.pool.merge_all(&src_sets);
        let dest_ptr = self
            .ptrs
            .get_or_create(ctx, ValueRef::Local { func, value: dest });
        EvalStatus::from_changed(self.env.strong_update(dest_ptr, merged))
    }

    fn eval_copy_offset(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        dest: ValueId,
        src: Value,
        offset: u64,
        array: bool,
    ) -> EvalStatus {
        let Some(src_ptr) = self.ptr_of(ctx, func, src) else {
            return EvalStatus::NotReady;
        };
        let src_set = self.env.lookup(src_ptr);
        if src_set == PtsSetId::EMPTY {
            return EvalStatus::NotReady;
        }

        let src_objs = self.pool.objects(src_set).to_vec();
        let mut result = PtsSetId::EMPTY;
        let mut found = false;
        for obj in src_objs {
            if obj.is_null() {
                continue;
            }
            found = true;
            if obj.is_universal() {
                result = self.pool.insert(result, obj);
                continue;
            }
            for target in offset_targets(&mut self.mem, obj, offset, array) {
                result = self.pool.insert(result, target);
            }
        }
        // Arithmetic on nothing but null: the outcome is unmodelable.
        if !found {
            result = self.pool.singleton(ObjId::UNIVERSAL);
        }

        let dest_ptr = self
            .ptrs
            .get_or_create(ctx, ValueRef::Local { func, value: dest });
        EvalStatus::from_changed(self.env.strong_update(dest_ptr, result))
    }

    /// Union of store entries over every object `ptr` may point at.
    /// Short-circuits to the universal set when the universal object shows up.
    fn load_through(&mut self, ptr: PtrId, store: &Store) -> PtsSetId {
        let src_set = self.env.lookup(ptr);
        if src_set == PtsSetId::EMPTY {
            return PtsSetId::EMPTY;
        }
        let objs = self.pool.objects(src_set).to_vec();
        if objs.contains(&ObjId::UNIVERSAL) {
            return self.pool.singleton(ObjId::UNIVERSAL);
        }
        let sets: Vec<PtsSetId> = objs
            .into_iter()
            .map(|obj| store.lookup(obj))
            .filter(|&set| set != PtsSetId::EMPTY)
            .collect();
        self.pool.merge_all(&sets)
    }

    fn eval_load(&mut self, pp: ProgramPoint, dest: ValueId, src: Value, result: &mut EvalResult) {
        let Some(store) = self.memo.lookup(pp).cloned() else {
            return;
        };
        let func = self.program.node(pp.node).func;
        let Some(src_ptr) = self.ptr_of(pp.ctx, func, src) else {
            return;
        };

        let loaded = if self.env.lookup(src_ptr) == PtsSetId::EMPTY {
            // Loading through a pointer with no targets: nothing to anchor
            // the lookup on, so the result may be anything.
            self.pool.singleton(ObjId::UNIVERSAL)
        } else {
            self.load_through(src_ptr, &store)
        };

        let dest_ptr = self
            .ptrs
            .get_or_create(pp.ctx, ValueRef::Local { func, value: dest });
        if self.env.strong_update(dest_ptr, loaded) {
            self.add_top_level_succs(pp, result);
        }
        // The load's own output never gates downstream heap propagation.
        let store = result.new_store(store);
        self.add_mem_level_succs(pp, result, store);
    }

    fn eval_store(&mut self, pp: ProgramPoint, dest: Value, src: Value, result: &mut EvalResult) {
        let Some(store) = self.memo.lookup(pp).cloned() else {
            return;
        };
        let func = self.program.node(pp.node).func;
        let (Some(dest_ptr), Some(src_ptr)) = (
            self.ptr_of(pp.ctx, func, dest),
            self.ptr_of(pp.ctx, func, src),
        ) else {
            return;
        };
        let src_set = self.env.lookup(src_ptr);
        let dest_set = self.env.lookup(dest_ptr);
        if src_set == PtsSetId::EMPTY || dest_set == PtsSetId::EMPTY {
            return;
        }

        let mut store = store;
        self.update_store_through(dest_set, src_set, &mut store);
        let store = result.new_store(store);
        self.add_mem_level_succs(pp, result, store);
    }

    /// Strong update when the destination is one precisely-known location;
    /// weak update of every candidate otherwise. The universal and null
    /// sentinels are never written through.
    fn update_store_through(&mut self, dest_set: PtsSetId, src_set: PtsSetId, store: &mut Store) {
        let dest_objs = self.pool.objects(dest_set).to_vec();
        if dest_objs.len() == 1 && !dest_objs[0].is_special() && !self.mem.is_summary(dest_objs[0])
        {
            store.strong_update(dest_objs[0], src_set);
        } else {
            for obj in dest_objs {
                if !obj.is_special() {
                    store.weak_update(&mut self.pool, obj, src_set);
                }
            }
        }
    }

    fn eval_call(
        &mut self,
        pp: ProgramPoint,
        dest: Option<ValueId>,
        callee: Value,
        args: &[Value],
        ptr_args: &[Value],
        result: &mut EvalResult,
    ) -> Result<()> {
        let Some(store) = self.memo.lookup(pp).cloned() else {
            return Ok(());
        };
        let func = self.program.node(pp.node).func;
        let store = result.new_store(store);

        let callees = self.resolve_call_targets(pp.ctx, func, callee, ptr_args, dest);
        if callees.is_empty() {
            // Function pointer not ready yet, or pointing nowhere useful.
            return Ok(());
        }

        let mut resumes = false;
        for target in callees {
            let new_ctx = self.push_context(pp.ctx, pp.node);
            let callee_fc = FunctionContext::new(new_ctx, target);
            let graph_changed = self.callgraph.insert_edge(pp, callee_fc);

            if self.module.function(target).is_declaration() {
                let exits = self.eval_external_call(pp, func, target, dest, args, result, store)?;
                if !exits {
                    resumes = true;
                }
            } else {
                self.eval_internal_call(pp, func, ptr_args, callee_fc, graph_changed, result, store);
                if self.program.cfg(target).is_some_and(|cfg| cfg.has_return) {
                    resumes = true;
                }
            }
        }

        // Heap facts flow around the call with the caller's store; the
        // callee's effects arrive separately through its Return node.
        if resumes {
            self.add_mem_level_succs(pp, result, store);
        }
        Ok(())
    }

    fn resolve_call_targets(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        callee: Value,
        ptr_args: &[Value],
        dest: Option<ValueId>,
    ) -> Vec<FuncId> {
        let Some(fun_ptr) = self.ptr_of(ctx, func, callee) else {
            return Vec::new();
        };
        let fun_set = self.env.lookup(fun_ptr);
        if fun_set == PtsSetId::EMPTY {
            return Vec::new();
        }

        let objs = self.pool.objects(fun_set);
        if objs.contains(&ObjId::UNIVERSAL) {
            // The target set carries no information. Guess candidates by
            // arity among address-taken functions; a heuristic with no
            // completeness guarantee.
            warn!(
                %callee,
                "indirect call through the universal pointer, guessing targets by arity"
            );
            let module = self.module;
            self.program
                .addr_taken_funcs()
                .iter()
                .copied()
                .filter(|&f| {
                    let function = module.function(f);
                    let args_match = function.is_vararg()
                        || function.pointer_param_count() == ptr_args.len();
                    let ret_match = function.returns_pointer() == dest.is_some();
                    args_match && ret_match
                })
                .collect()
        } else {
            objs.iter()
                .filter_map(|&obj| self.mem.function_of(obj))
                .collect()
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_internal_call(
        &mut self,
        pp: ProgramPoint,
        func: FuncId,
        ptr_args: &[Value],
        callee_fc: FunctionContext,
        graph_changed: bool,
        result: &mut EvalResult,
        caller_store: StoreRef,
    ) {
        let entry = self
            .program
            .cfg(callee_fc.func)
            .expect("internal callee has a CFG")
            .entry;

        let (bound, env_changed) = self.bind_call_arguments(pp.ctx, func, ptr_args, callee_fc);
        if !bound && !graph_changed {
            return;
        }

        let entry_pp = ProgramPoint::new(callee_fc.ctx, entry);
        if env_changed || graph_changed {
            result.add_top_level(entry_pp);
        }
        let pruned = self.prune_store(pp.ctx, func, ptr_args, result.store_mut(caller_store));
        let pruned = result.new_store(pruned);
        result.add_mem_level(entry_pp, pruned);
    }

    /// Bind the caller's pointer-argument sets to the callee's pointer
    /// parameters, positionally, skipping non-pointer parameters. Returns
    /// (all arguments were ready, any parameter set grew).
    fn bind_call_arguments(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        ptr_args: &[Value],
        callee_fc: FunctionContext,
    ) -> (bool, bool) {
        let callee = self.module.function(callee_fc.func);
        let num_params = callee.pointer_param_count();

        let mut arg_sets = Vec::with_capacity(num_params);
        for &arg in ptr_args.iter().take(num_params) {
            let Some(ptr) = self.ptr_of(ctx, func, arg) else {
                return (false, false);
            };
            let set = self.env.lookup(ptr);
            if set == PtsSetId::EMPTY {
                return (false, false);
            }
            arg_sets.push(set);
        }
        if arg_sets.len() < num_params {
            return (false, false);
        }

        let mut changed = false;
        let mut sets = arg_sets.into_iter();
        for (index, param_ty) in callee.ty.params.iter().enumerate() {
            if !param_ty.is_pointer() {
                continue;
            }
            let Some(set) = sets.next() else {
                break;
            };
            let param = ValueRef::Local {
                func: callee_fc.func,
                value: ValueId(index as u32),
            };
            let param_ptr = self.ptrs.get_or_create(callee_fc.ctx, param);
            changed |= self.env.weak_update(&mut self.pool, param_ptr, set);
        }
        (true, changed)
    }

    fn eval_return(&mut self, pp: ProgramPoint, value: Option<Value>, result: &mut EvalResult) {
        let Some(store) = self.memo.lookup(pp).cloned() else {
            return;
        };
        let func = self.program.node(pp.node).func;
        if func == self.program.entry_func() {
            trace!("reached program end");
            return;
        }
        let store = result.new_store(store);

        let callers = self
            .callgraph
            .callers(FunctionContext::new(pp.ctx, func))
            .to_vec();
        for ret_site in callers {
            self.eval_return_to(pp.ctx, func, value, ret_site, result, store);
        }
    }

    fn eval_return_to(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        value: Option<Value>,
        ret_site: ProgramPoint,
        result: &mut EvalResult,
        store: StoreRef,
    ) {
        let caller_node = self.program.node(ret_site.node);
        let caller_func = caller_node.func;
        let NodeKind::Call { dest, .. } = &caller_node.kind else {
            unreachable!("call graph edges originate at call nodes");
        };
        let dest = *dest;

        let env_changed = match (value, dest) {
            (_, None) => false,
            (None, Some(dest)) => {
                // A non-pointer return reaching a pointer destination can
                // only come out of the arity-guessing fallback; pin the
                // destination to null rather than leaving it undefined.
                let dest_ptr = self.ptrs.get_or_create(
                    ret_site.ctx,
                    ValueRef::Local {
                        func: caller_func,
                        value: dest,
                    },
                );
                let null = self.pool.singleton(ObjId::NULL);
                self.env.weak_update(&mut self.pool, dest_ptr, null)
            }
            (Some(value), Some(dest)) => {
                let Some(ret_ptr) = self.ptr_of(ctx, func, value) else {
                    return;
                };
                let ret_set = self.env.lookup(ret_ptr);
                if ret_set == PtsSetId::EMPTY {
                    return;
                }
                let dest_ptr = self.ptrs.get_or_create(
                    ret_site.ctx,
                    ValueRef::Local {
                        func: caller_func,
                        value: dest,
                    },
                );
                self.env.weak_update(&mut self.pool, dest_ptr, ret_set)
            }
        };

        if env_changed {
            self.add_top_level_succs(ret_site, result);
        }
        self.add_mem_level_succs(ret_site, result, store);
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_external_call(
        &mut self,
        pp: ProgramPoint,
        func: FuncId,
        target: FuncId,
        dest: Option<ValueId>,
        args: &[Value],
        result: &mut EvalResult,
        store: StoreRef,
    ) -> Result<bool> {
        let name = &self.module.function(target).name;
        let Some(summary) = self.table.lookup(name) else {
            return Err(AnalysisError::MissingSummary(name.clone()));
        };

        for effect in summary.iter() {
            match *effect {
                Effect::Alloc { size_arg } => {
                    if self.eval_external_alloc(pp.ctx, func, dest, args, size_arg) {
                        self.add_top_level_succs(pp, result);
                    }
                }
                Effect::Copy {
                    dest: copy_dest,
                    source,
                } => {
                    let changed =
                        self.eval_external_copy(pp, func, dest, args, copy_dest, source, result, store);
                    if changed {
                        self.add_top_level_succs(pp, result);
                    }
                }
                Effect::Exit => return Ok(true),
            }
        }
        Ok(false)
    }

    /// A malloc-style effect: a fresh heap object at the call site, bounded
    /// by a constant size argument when the annotation names one.
    fn eval_external_alloc(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        dest: Option<ValueId>,
        args: &[Value],
        size_arg: Option<u8>,
    ) -> bool {
        let Some(dest) = dest else {
            // Result unused; the allocation can never be reached.
            return false;
        };
        let size = size_arg
            .and_then(|index| args.get(index as usize))
            .and_then(|value| value.as_const_int())
            .filter(|&n| n >= 0)
            .map(|n| n as u64);

        let value = ValueRef::Local { func, value: dest };
        let ptr = self.ptrs.get_or_create(ctx, value);
        let obj = self.mem.allocate_heap(ctx, value, size);
        let set = self.pool.singleton(obj);
        self.env.strong_update(ptr, set)
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_external_copy(
        &mut self,
        pp: ProgramPoint,
        func: FuncId,
        call_dest: Option<ValueId>,
        args: &[Value],
        dest: DestSpec,
        source: SourceSpec,
        result: &mut EvalResult,
        store: StoreRef,
    ) -> bool {
        // A reachable-memory source is a memcpy; it pairs with an argument
        // destination and copies field-by-field.
        if let SourceSpec::Arg(src_index, AccessMode::Reachable) = source {
            let DestSpec::Arg(dest_index) = dest else {
                warn!("reachable-memory copy into a return value, ignoring");
                return false;
            };
            self.eval_memcpy(pp.ctx, func, args, dest_index, src_index, result, store);
            return false;
        }

        let src_set = match source {
            SourceSpec::Arg(index, AccessMode::Value) => {
                let Some(ptr) = self.arg_pointer(pp.ctx, func, args, index) else {
                    return false;
                };
                self.env.lookup(ptr)
            }
            SourceSpec::Arg(index, AccessMode::Deref) => {
                let Some(ptr) = self.arg_pointer(pp.ctx, func, args, index) else {
                    return false;
                };
                let snapshot = result.store_mut(store).clone();
                self.load_through(ptr, &snapshot)
            }
            SourceSpec::Arg(_, AccessMode::Reachable) => unreachable!("handled above"),
            SourceSpec::Null => self.pool.singleton(ObjId::NULL),
            // Unmodeled static storage degrades to the universal location.
            SourceSpec::Universal | SourceSpec::Static => self.pool.singleton(ObjId::UNIVERSAL),
        };
        if src_set == PtsSetId::EMPTY {
            return false;
        }

        match dest {
            DestSpec::Return => {
                let Some(dest) = call_dest else {
                    // Result unused, nothing to define.
                    return false;
                };
                let dest_ptr = self
                    .ptrs
                    .get_or_create(pp.ctx, ValueRef::Local { func, value: dest });
                self.env.weak_update(&mut self.pool, dest_ptr, src_set)
            }
            DestSpec::Arg(index) => {
                let Some(dest_ptr) = self.arg_pointer(pp.ctx, func, args, index) else {
                    return false;
                };
                let dest_set = self.env.lookup(dest_ptr);
                if dest_set == PtsSetId::EMPTY {
                    return false;
                }
                self.update_store_through(dest_set, src_set, result.store_mut(store));
                false
            }
        }
    }

    /// Pairwise copy of all memory reachable from one argument into another,
    /// preserving relative field offsets.
    #[allow(clippy::too_many_arguments)]
    fn eval_memcpy(
        &mut self,
        ctx: ContextId,
        func: FuncId,
        args: &[Value],
        dest_index: u8,
        src_index: u8,
        result: &mut EvalResult,
        store: StoreRef,
    ) {
        let (Some(dest_ptr), Some(src_ptr)) = (
            self.arg_pointer(ctx, func, args, dest_index),
            self.arg_pointer(ctx, func, args, src_index),
        ) else {
            return;
        };
        let dest_set = self.env.lookup(dest_ptr);
        let src_set = self.env.lookup(src_ptr);
        if dest_set == PtsSetId::EMPTY || src_set == PtsSetId::EMPTY {
            return;
        }

        let store = result.store_mut(store);
        let dest_objs = self.pool.objects(dest_set).to_vec();
        for src_obj in self.pool.objects(src_set).to_vec() {
            let src_objs = self.mem.reachable_pointer_objects(src_obj, true);
            let start = self.mem.offset_of(src_obj);
            for &dest_obj in &dest_objs {
                for &reachable in &src_objs {
                    let set = store.lookup(reachable);
                    if set == PtsSetId::EMPTY {
                        continue;
                    }
                    let delta = self.mem.offset_of(reachable) - start;
                    let target = self.mem.offset_object(dest_obj, delta);
                    if target.is_special() {
                        break;
                    }
                    store.weak_update(&mut self.pool, target, set);
                }
            }
        }
    }

    /// The interned pointer for call argument `index`, addressed by the full
    /// (annotation-visible) argument list.
    fn arg_pointer(&self, ctx: ContextId, func: FuncId, args: &[Value], index: u8) -> Option<PtrId> {
        let index = usize::from(index);
        let Some(&arg) = args.get(index) else {
            warn!(
                index,
                "effect annotation names an argument the call does not pass"
            );
            return None;
        };
        self.ptr_of(ctx, func, arg)
    }
}

/// All locations denoted by `obj + offset`. A statically-unknown array index
/// enumerates every stride multiple still inside the object; folding makes
/// the enumeration terminate as soon as a location repeats.
fn offset_targets(mem: &mut MemoryManager, obj: ObjId, offset: u64, array: bool) -> Vec<ObjId> {
    let mut out = Vec::new();
    if array && offset != 0 {
        let span = mem.object_size(obj).saturating_sub(mem.offset_of(obj));
        let mut step = 0u64;
        while step < span {
            let target = mem.offset_object(obj, step);
            if out.contains(&target) {
                break;
            }
            let widened = target.is_universal();
            out.push(target);
            if widened {
                break;
            }
            step += offset;
        }
    } else {
        out.push(mem.offset_object(obj, offset));
    }
    out
}
