//! Build a small program with the IR builder, run the pointer analysis and
//! print what the interesting values may point at.
//!
//! The program under analysis, in C-like pseudocode:
//!
//! ```c
//! char* id(char* p) { return p; }
//! int main(void) {
//!     char* buf = malloc(16);
//!     char** slot = alloca(char*);
//!     *slot = id(buf);
//!     char* out = *slot;
//! }
//! ```

use anyhow::Result;
use tessera::{
    AnalysisConfig, ContextId, EffectTable, FunctionType, ModuleBuilder, PointerAnalysis, Type,
    Value, ValueRef,
};

fn main() -> Result<()> {
    let char_ptr = Type::Int(8).pointer_to();

    let mut builder = ModuleBuilder::new("example");
    let malloc = builder.declare_function(
        "malloc",
        FunctionType::new(vec![Type::Int(64)], char_ptr.clone()),
    );

    let mut id = builder.function(
        "id",
        FunctionType::new(vec![char_ptr.clone()], char_ptr.clone()),
    );
    let p = id.param(0);
    id.ret(Some(p))?;
    let id_func = id.finish();

    let mut main_fn = builder.function("main", FunctionType::new(vec![], Type::Int(32)));
    let buf = main_fn
        .call(
            Value::Function(malloc),
            vec![Value::Const(tessera::Constant::Int(16))],
            Some(char_ptr.clone()),
        )
        .expect("malloc returns a value");
    let slot = main_fn.alloca(char_ptr.clone());
    let copied = main_fn
        .call(Value::Function(id_func), vec![buf], Some(char_ptr.clone()))
        .expect("id returns a value");
    main_fn.store(slot, copied);
    let out = main_fn.load(char_ptr, slot);
    main_fn.ret(Some(Value::Const(tessera::Constant::Int(0))))?;
    let main_id = main_fn.finish();
    builder.set_entry(main_id);
    let module = builder.build();

    let analysis = PointerAnalysis::run(&module, &EffectTable::with_defaults(), AnalysisConfig::default())?;

    for (label, value) in [("buf", buf), ("slot", slot), ("out", out)] {
        let value = ValueRef::Local {
            func: main_id,
            value: value.as_local().expect("local value"),
        };
        let objects = analysis.pts_of(ContextId::GLOBAL, value);
        println!("{label:>5} points to {objects:?}");
    }

    println!(
        "buf and out alias: {:?}",
        analysis.alias(
            ValueRef::Local {
                func: main_id,
                value: buf.as_local().expect("local value"),
            },
            ValueRef::Local {
                func: main_id,
                value: out.as_local().expect("local value"),
            },
        )
    );
    Ok(())
}
