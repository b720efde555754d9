//! End-to-end fixpoint tests over small builder-constructed programs.

use pretty_assertions::assert_eq;
use tessera_analysis::program::NodeKind;
use tessera_analysis::{
    AliasResult, AnalysisConfig, ContextId, ObjId, PointerAnalysis, ProgramPoint, ValueRef,
};
use tessera_annot::EffectTable;
use tessera_ir::{Constant, FuncId, FunctionType, GepOffset, Initializer, Module, ModuleBuilder, Type, Value};

fn ptr() -> Type {
    Type::Int(8).pointer_to()
}

fn run(module: &Module) -> PointerAnalysis {
    PointerAnalysis::run(module, &EffectTable::with_defaults(), AnalysisConfig::default()).unwrap()
}

fn local(func: FuncId, value: Value) -> ValueRef {
    ValueRef::Local {
        func,
        value: value.as_local().expect("local value"),
    }
}

#[test]
fn global_initializers_seed_env_and_store() {
    let mut builder = ModuleBuilder::new("m");
    let h = builder.global("h", Type::Int(32), Some(Initializer::Int(0)));
    let g = builder.global("g", Type::Int(32).pointer_to(), Some(Initializer::GlobalRef(h)));

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let loaded = main.load(Type::Int(32).pointer_to(), Value::Global(g));
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let g_set = analysis.pts_of(ContextId::GLOBAL, ValueRef::Global(g));
    let h_set = analysis.pts_of(ContextId::GLOBAL, ValueRef::Global(h));
    assert_eq!(g_set.len(), 1);
    assert_eq!(h_set.len(), 1);

    let entry = analysis.program().entry_cfg().entry;
    let store = analysis
        .store_at(ProgramPoint::new(ContextId::GLOBAL, entry))
        .unwrap();
    assert_eq!(analysis.set(store.lookup(g_set[0])), h_set);

    // Loading through @g observes the seeded store.
    assert_eq!(analysis.pts_of(ContextId::GLOBAL, local(main_id, loaded)), h_set);
}

#[test]
fn uninitialized_globals_point_anywhere() {
    let mut builder = ModuleBuilder::new("m");
    let stdin = builder.global("stdin", ptr(), None);

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let loaded = main.load(ptr(), Value::Global(stdin));
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    assert_eq!(
        analysis.pts_of(ContextId::GLOBAL, local(main_id, loaded)),
        &[ObjId::UNIVERSAL]
    );
}

#[test]
fn stores_through_a_singleton_are_strong() {
    let mut builder = ModuleBuilder::new("m");
    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let slot = main.alloca(ptr());
    let first = main.alloca(Type::Int(8));
    let second = main.alloca(Type::Int(8));
    main.store(slot, first);
    main.store(slot, second);
    let observed = main.load(ptr(), slot);
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let second_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, second));
    // The second store overwrites the first.
    assert_eq!(
        analysis.pts_of(ContextId::GLOBAL, local(main_id, observed)),
        second_set
    );
}

#[test]
fn stores_through_a_multi_target_set_are_weak() {
    let mut builder = ModuleBuilder::new("m");
    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let slot_a = main.alloca(ptr());
    let slot_b = main.alloca(ptr());
    let either = main.select(
        ptr().pointer_to(),
        Value::Const(Constant::Int(1)),
        slot_a,
        slot_b,
    );
    let first = main.alloca(Type::Int(8));
    let second = main.alloca(Type::Int(8));
    main.store(either, first);
    main.store(either, second);
    let observed = main.load(ptr(), slot_a);
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let first_obj = analysis.pts_of(ContextId::GLOBAL, local(main_id, first))[0];
    let second_obj = analysis.pts_of(ContextId::GLOBAL, local(main_id, second))[0];
    // Imprecise destination: both writes survive in both slots.
    let observed_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, observed));
    assert!(observed_set.contains(&first_obj));
    assert!(observed_set.contains(&second_obj));
}

#[test]
fn array_indexing_folds_and_out_of_bounds_widens() {
    let mut builder = ModuleBuilder::new("m");
    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let arr = main.alloca(ptr().array_of(4));
    let elem = main.gep(arr, GepOffset::Array { stride: 8 }, ptr().pointer_to());
    let oob = main.gep(arr, GepOffset::Const(64), ptr().pointer_to());
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let arr_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, arr));
    // Every stride multiple folds back onto the representative element.
    assert_eq!(analysis.pts_of(ContextId::GLOBAL, local(main_id, elem)), arr_set);
    assert_eq!(
        analysis.pts_of(ContextId::GLOBAL, local(main_id, oob)),
        &[ObjId::UNIVERSAL]
    );
}

#[test]
fn allocation_sites_distinguish_contexts() {
    let mut builder = ModuleBuilder::new("m");
    let mut make = builder.function("make", FunctionType::new(vec![], ptr()));
    let fresh = make.alloca(Type::Int(8));
    make.ret(Some(fresh)).unwrap();
    let make_id = make.finish();

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let a = main
        .call(Value::Function(make_id), vec![], Some(ptr()))
        .unwrap();
    let b = main
        .call(Value::Function(make_id), vec![], Some(ptr()))
        .unwrap();
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    // k = 1: each call site is its own context, so the same alloca yields
    // two distinct abstract objects.
    let analysis = run(&module);
    let a_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, a)).to_vec();
    let b_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, b)).to_vec();
    assert_eq!(a_set.len(), 1);
    assert_eq!(b_set.len(), 1);
    assert_ne!(a_set, b_set);
    assert!(analysis.memory().is_stack_object(a_set[0]));

    // The per-value union sees both allocations.
    assert_eq!(analysis.pts_of_value(local(make_id, fresh)).len(), 2);

    // k = 0 collapses both call sites into the global context, and the two
    // results share one memoized allocation.
    let insensitive = PointerAnalysis::run(
        &module,
        &EffectTable::with_defaults(),
        AnalysisConfig::with_k_limit(0),
    )
    .unwrap();
    assert_eq!(
        insensitive.pts_of(ContextId::GLOBAL, local(main_id, a)),
        insensitive.pts_of(ContextId::GLOBAL, local(main_id, b))
    );
}

#[test]
fn return_values_flow_to_call_destinations() {
    let mut builder = ModuleBuilder::new("m");
    let mut id = builder.function("id", FunctionType::new(vec![ptr()], ptr()));
    let p = id.param(0);
    id.ret(Some(p)).unwrap();
    let id_func = id.finish();

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let x = main.alloca(Type::Int(8));
    let y = main
        .call(Value::Function(id_func), vec![x], Some(ptr()))
        .unwrap();
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    assert_eq!(
        analysis.pts_of(ContextId::GLOBAL, local(main_id, x)),
        analysis.pts_of(ContextId::GLOBAL, local(main_id, y))
    );
    assert_eq!(
        analysis.alias(local(main_id, x), local(main_id, y)),
        AliasResult::MustAlias
    );
}

#[test]
fn recursion_terminates_under_k_limiting() {
    let mut builder = ModuleBuilder::new("m");
    let fty = FunctionType::new(vec![ptr(), Type::Int(32)], ptr());
    let mut rec = builder.function("rec", fty);
    let rec_id = rec.id();
    let p = rec.param(0);
    let n = rec.param(1);
    let again = rec.create_block();
    let done = rec.create_block();
    rec.branch(n, again, done).unwrap();
    rec.switch_to(again);
    let deeper = rec
        .call(Value::Function(rec_id), vec![p, n], Some(ptr()))
        .unwrap();
    rec.ret(Some(deeper)).unwrap();
    rec.switch_to(done);
    rec.ret(Some(p)).unwrap();
    rec.finish();

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let x = main.alloca(Type::Int(8));
    let r = main
        .call(
            Value::Function(rec_id),
            vec![x, Value::Const(Constant::Int(0))],
            Some(ptr()),
        )
        .unwrap();
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = PointerAnalysis::run(
        &module,
        &EffectTable::with_defaults(),
        AnalysisConfig::with_k_limit(2),
    )
    .unwrap();

    assert_eq!(
        analysis.pts_of(ContextId::GLOBAL, local(main_id, r)),
        analysis.pts_of(ContextId::GLOBAL, local(main_id, x))
    );
    // One context per call-string prefix up to depth 2, nothing runaway.
    assert!(analysis.contexts().len() <= 4);
}

#[test]
fn call_boundaries_prune_unreachable_stores() {
    let mut builder = ModuleBuilder::new("m");
    let mut sink = builder.function("sink", FunctionType::new(vec![ptr().pointer_to()], Type::Void));
    let q = sink.param(0);
    let _ = sink.load(ptr(), q);
    sink.ret(None).unwrap();
    let sink_id = sink.finish();

    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let private = main.alloca(ptr());
    let secret = main.alloca(Type::Int(8));
    main.store(private, secret);
    let shared = main.alloca(ptr());
    let _ = main.call(Value::Function(sink_id), vec![shared], None);
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let call_site = analysis
        .program()
        .nodes()
        .find(|(_, node)| node.func == main_id && matches!(node.kind, NodeKind::Call { .. }))
        .map(|(id, _)| id)
        .unwrap();
    let callees = analysis
        .call_graph()
        .callees(ProgramPoint::new(ContextId::GLOBAL, call_site));
    assert_eq!(callees.len(), 1);

    // The callee's incoming store no longer mentions the caller's private
    // slot, which is unreachable from the argument.
    let entry = analysis.program().cfg(sink_id).unwrap().entry;
    let callee_store = analysis
        .store_at(ProgramPoint::new(callees[0].ctx, entry))
        .unwrap();
    let private_obj = analysis.pts_of(ContextId::GLOBAL, local(main_id, private))[0];
    assert!(!callee_store.contains(private_obj));
}

#[test]
fn entry_argv_is_seeded() {
    let mut builder = ModuleBuilder::new("m");
    let argv_ty = ptr().pointer_to();
    let mut main = builder.function(
        "main",
        FunctionType::new(vec![Type::Int(32), argv_ty.clone()], Type::Int(32)),
    );
    let argv = main.param(1);
    let first = main.load(ptr(), argv);
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let argv_set = analysis.pts_of(ContextId::GLOBAL, local(main_id, argv));
    assert_eq!(argv_set.len(), 1);
    assert!(analysis.memory().is_summary(argv_set[0]));
    // argv points at itself, so *argv is defined too.
    assert_eq!(analysis.pts_of(ContextId::GLOBAL, local(main_id, first)), argv_set);
}

#[test]
fn alias_queries_classify() {
    let mut builder = ModuleBuilder::new("m");
    let anywhere = builder.global("anywhere", ptr(), None);
    let mut main = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let x = main.alloca(Type::Int(8));
    let y = main.alloca(Type::Int(8));
    let copy_of_x = main.phi(ptr(), vec![x]);
    let either = main.select(ptr(), Value::Const(Constant::Int(1)), x, y);
    let unknown = main.load(ptr(), Value::Global(anywhere));
    main.ret(Some(Value::Const(Constant::Int(0)))).unwrap();
    let main_id = main.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = run(&module);
    let v = |value| local(main_id, value);
    assert_eq!(analysis.alias(v(x), v(y)), AliasResult::NoAlias);
    assert_eq!(analysis.alias(v(x), v(copy_of_x)), AliasResult::MustAlias);
    assert_eq!(analysis.alias(v(x), v(either)), AliasResult::MayAlias);
    assert_eq!(analysis.alias(v(y), v(either)), AliasResult::MayAlias);
    assert_eq!(analysis.alias(v(x), v(unknown)), AliasResult::MayAlias);
}
