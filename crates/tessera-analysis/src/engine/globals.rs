//! Initial-state construction: globals, functions, constant initializers and
//! the entry function's argv/envp parameters.

use crate::engine::Solver;
use crate::memory::ObjId;
use crate::pointer::{PointerManager, ValueRef};
use crate::program::ProgramPoint;
use crate::pts::Store;
use tessera_ir::{GlobalId, Initializer, Type};
use tracing::debug;

impl Solver<'_> {
    /// Seed Env and Store from module-level state, then enqueue the entry
    /// function. Must run before the fixpoint loop.
    pub(crate) fn seed_initial_state(&mut self) {
        let module = self.module;
        let mut store = Store::new();

        // The universal pointer may point anywhere, including at memory that
        // points back at it; the null pointer points at the null object.
        let universal = PointerManager::universal_pointer();
        self.env.insert(&mut self.pool, universal, ObjId::UNIVERSAL);
        store.insert(&mut self.pool, ObjId::UNIVERSAL, ObjId::UNIVERSAL);
        let null = PointerManager::null_pointer();
        self.env.insert(&mut self.pool, null, ObjId::NULL);

        // Register every global and function before touching initializers:
        // an initializer may refer to a global defined below it.
        let global_ctx = self.ctxs.global();
        for (&id, var) in &module.globals {
            let ptr = self.ptrs.get_or_create(global_ctx, ValueRef::Global(id));
            let obj = self.mem.allocate_global(id, &var.ty);
            self.env.insert(&mut self.pool, ptr, obj);
        }
        for &id in module.functions.keys() {
            let ptr = self.ptrs.get_or_create(global_ctx, ValueRef::Function(id));
            let obj = self.mem.allocate_function(id);
            self.env.insert(&mut self.pool, ptr, obj);
        }

        for (&id, var) in &module.globals {
            let obj = self.global_object(id);
            match &var.initializer {
                Some(init) => {
                    walk_initializer(self, obj, &var.ty, init, &mut store);
                }
                None => {
                    // No initializer means the definition lives outside the
                    // module (e.g. stdin); it may point anywhere.
                    let top = self.pool.singleton(ObjId::UNIVERSAL);
                    store.strong_update(obj, top);
                }
            }
        }

        self.seed_entry_arguments(&mut store);

        let entry_node = self.program.entry_cfg().entry;
        let entry_pp = ProgramPoint::new(global_ctx, entry_node);
        self.memo.update(&mut self.pool, entry_pp, &store);
        self.enqueue(entry_pp);

        debug!(
            globals = self.module.globals.len(),
            functions = self.module.functions.len(),
            "seeded initial points-to state"
        );
    }

    /// The memory object a global's pointer is bound to. Always a singleton
    /// after registration.
    pub(crate) fn global_object(&self, id: GlobalId) -> ObjId {
        let ptr = self
            .ptrs
            .get(self.ctxs.global(), ValueRef::Global(id))
            .expect("global registered before initializer walk");
        let set = self.env.lookup(ptr);
        let objs = self.pool.objects(set);
        assert_eq!(objs.len(), 1, "global pointer is a singleton");
        objs[0]
    }

    fn function_object(&self, id: tessera_ir::FuncId) -> ObjId {
        let ptr = self
            .ptrs
            .get(self.ctxs.global(), ValueRef::Function(id))
            .expect("function registered before initializer walk");
        let set = self.env.lookup(ptr);
        self.pool.objects(set)[0]
    }

    /// A C-style entry function receives argv (and possibly envp) from the
    /// runtime. Both are modeled as self-pointing summary objects, so that
    /// `argv`, `*argv` and `**argv` are all defined.
    fn seed_entry_arguments(&mut self, store: &mut Store) {
        let entry = self.program.entry_func();
        let Some(body) = &self.module.function(entry).body else {
            return;
        };
        let param_count = body.param_count();
        let global_ctx = self.ctxs.global();

        if param_count > 1 {
            let argv = ValueRef::Local {
                func: entry,
                value: body.param(1),
            };
            let ptr = self.ptrs.get_or_create(global_ctx, argv);
            let obj = self.mem.allocate_argv(argv);
            self.env.insert(&mut self.pool, ptr, obj);
            store.insert(&mut self.pool, obj, obj);
        }
        if param_count > 2 {
            let envp = ValueRef::Local {
                func: entry,
                value: body.param(2),
            };
            let ptr = self.ptrs.get_or_create(global_ctx, envp);
            let obj = self.mem.allocate_envp(envp);
            self.env.insert(&mut self.pool, ptr, obj);
            store.insert(&mut self.pool, obj, obj);
        }
    }
}

/// Populate `store` for one initializer of content type `ty` landing at
/// `obj`. Structs are walked field-sensitively; arrays collapse every
/// element onto the folded representative.
fn walk_initializer(
    solver: &mut Solver<'_>,
    obj: ObjId,
    ty: &Type,
    init: &Initializer,
    store: &mut Store,
) {
    match ty {
        Type::Struct(fields) => {
            let layout = solver.module.layout;
            match init {
                Initializer::Struct(subs) => {
                    for (index, (field, sub)) in fields.iter().zip(subs).enumerate() {
                        let offset = layout.field_offset(fields, index);
                        let field_obj = solver.mem.offset_object(obj, offset);
                        walk_initializer(solver, field_obj, field, sub, store);
                    }
                }
                Initializer::Zero | Initializer::Undef => {
                    for (index, field) in fields.iter().enumerate() {
                        let offset = layout.field_offset(fields, index);
                        let field_obj = solver.mem.offset_object(obj, offset);
                        walk_initializer(solver, field_obj, field, init, store);
                    }
                }
                _ => {}
            }
        }
        Type::Array(elem, _) => match init {
            Initializer::Array(subs) => {
                for sub in subs {
                    walk_initializer(solver, obj, elem, sub, store);
                }
            }
            Initializer::Zero | Initializer::Undef => {
                walk_initializer(solver, obj, elem, init, store);
            }
            _ => {}
        },
        Type::Pointer(_) => walk_pointer_initializer(solver, obj, init, store),
        // Non-pointer scalars carry no points-to facts.
        _ => {}
    }
}

fn walk_pointer_initializer(
    solver: &mut Solver<'_>,
    obj: ObjId,
    init: &Initializer,
    store: &mut Store,
) {
    match init {
        Initializer::Zero => {
            store.insert(&mut solver.pool, obj, ObjId::NULL);
        }
        Initializer::Undef | Initializer::Int(_) => {
            // An integer constant in a pointer slot is an address the
            // analysis cannot model.
            let top = solver.pool.singleton(ObjId::UNIVERSAL);
            store.strong_update(obj, top);
        }
        Initializer::GlobalRef(target) => {
            let tgt = solver.global_object(*target);
            store.insert(&mut solver.pool, obj, tgt);
        }
        Initializer::FunctionRef(target) => {
            let tgt = solver.function_object(*target);
            store.insert(&mut solver.pool, obj, tgt);
        }
        Initializer::OffsetOf { base, offset } => {
            let base_obj = solver.global_object(*base);
            let tgt = solver.mem.offset_object(base_obj, *offset);
            store.insert(&mut solver.pool, obj, tgt);
        }
        Initializer::Struct(_) | Initializer::Array(_) => {}
    }
}
