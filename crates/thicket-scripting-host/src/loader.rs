//! Module loading and entry-point discovery
//!
//! A compiled module satisfies the script contract when it exports
//! `initialize: func()` and `execute: func()`, and optionally
//! `teardown: func()`. Discovery is a typed export lookup, not metadata
//! introspection: a missing or wrongly typed export is a load failure
//! reported through diagnostics.

use wasmtime::{Engine, Linker, Module, Store, TypedFunc};

use crate::context::ScriptContext;
use crate::diagnostics::{Diagnostic, FailureStage, ScriptFailure};

/// Per-instance store data
///
/// `host_context` is set by [`LoadedScript`] for the duration of each WASM
/// call and cleared afterwards; host imports refuse to run without it.
pub struct ScriptState {
    pub(crate) host_context: Option<*const ScriptContext>,
    pub(crate) label: String,
}

/// A live script instance: one instantiation of one compiled revision
pub struct LoadedScript {
    label: String,
    store: Store<ScriptState>,
    initialize: TypedFunc<(), ()>,
    execute: TypedFunc<(), ()>,
    teardown: Option<TypedFunc<(), ()>>,
}

impl LoadedScript {
    /// Instantiate a compiled module and discover its contract surface.
    ///
    /// Does not run `initialize`; the runner does that separately so a
    /// failed initialization can be rolled back before anything is
    /// published.
    pub fn instantiate(
        engine: &Engine,
        linker: &Linker<ScriptState>,
        module: &Module,
        label: &str,
    ) -> Result<Self, ScriptFailure> {
        let state = ScriptState {
            host_context: None,
            label: label.to_string(),
        };
        let mut store = Store::new(engine, state);

        let instance = linker.instantiate(&mut store, module).map_err(|e| {
            ScriptFailure::single(
                FailureStage::Load,
                Diagnostic::error(format!("instantiation failed: {:#}", e)),
            )
        })?;

        let initialize = instance
            .get_typed_func::<(), ()>(&mut store, "initialize")
            .map_err(|e| contract_failure("initialize", e))?;
        let execute = instance
            .get_typed_func::<(), ()>(&mut store, "execute")
            .map_err(|e| contract_failure("execute", e))?;

        // Teardown is optional, but when present it must have the right type
        let teardown = match instance.get_func(&mut store, "teardown") {
            Some(func) => Some(
                func.typed::<(), ()>(&store)
                    .map_err(|e| contract_failure("teardown", e))?,
            ),
            None => None,
        };

        Ok(Self {
            label: label.to_string(),
            store,
            initialize,
            execute,
            teardown,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the script's one-time setup. A trap here aborts publication.
    pub fn initialize(&mut self, ctx: &ScriptContext) -> Result<(), ScriptFailure> {
        let func = self.initialize.clone();
        self.call_with_context(ctx, func).map_err(|e| {
            ScriptFailure::single(
                FailureStage::Initialize,
                Diagnostic::error(format!("{:#}", e)),
            )
        })
    }

    /// Run one tick of the script. A trap is contained by the caller.
    pub fn execute(&mut self, ctx: &ScriptContext) -> anyhow::Result<()> {
        let func = self.execute.clone();
        self.call_with_context(ctx, func)
    }

    /// Invoke the optional teardown capability; best-effort.
    pub fn teardown(&mut self, ctx: &ScriptContext) -> anyhow::Result<()> {
        match self.teardown.clone() {
            Some(func) => self.call_with_context(ctx, func),
            None => Ok(()),
        }
    }

    fn call_with_context(
        &mut self,
        ctx: &ScriptContext,
        func: TypedFunc<(), ()>,
    ) -> anyhow::Result<()> {
        self.store.data_mut().host_context = Some(ctx as *const ScriptContext);
        let result = func.call(&mut self.store, ());
        self.store.data_mut().host_context = None;
        result
    }
}

fn contract_failure(export: &str, err: wasmtime::Error) -> ScriptFailure {
    ScriptFailure::single(
        FailureStage::Load,
        Diagnostic::error(format!(
            "module does not satisfy the script contract: export `{}`: {:#}",
            export, err
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::context::{ScriptContext, WorldSnapshot};
    use crate::engine::{create_engine, create_host_linker};
    use std::path::PathBuf;

    fn load(source: &str) -> Result<LoadedScript, ScriptFailure> {
        let engine = create_engine().unwrap();
        let linker = create_host_linker(&engine).unwrap();
        let module = compile_source(&engine, &PathBuf::from("t.script.wat"), source)
            .expect("fixture compiles");
        LoadedScript::instantiate(&engine, &linker, &module, "t")
    }

    fn test_ctx() -> (
        ScriptContext,
        tokio::sync::mpsc::UnboundedReceiver<crate::context::HostAction>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (ScriptContext::new(tx, WorldSnapshot::default(), 0), rx)
    }

    #[test]
    fn discovers_full_contract() {
        let script = load(
            r#"(module
                (func (export "initialize"))
                (func (export "execute"))
                (func (export "teardown")))"#,
        )
        .expect("valid contract");
        assert!(script.teardown.is_some());
    }

    #[test]
    fn teardown_is_optional() {
        let script = load(
            r#"(module
                (func (export "initialize"))
                (func (export "execute")))"#,
        )
        .expect("valid contract");
        assert!(script.teardown.is_none());
    }

    #[test]
    fn missing_execute_is_a_load_failure() {
        let err = load(r#"(module (func (export "initialize")))"#)
            .err()
            .expect("no execute export");
        assert_eq!(err.stage, FailureStage::Load);
        assert!(err.diagnostics[0].message.contains("execute"));
    }

    #[test]
    fn wrongly_typed_export_is_a_load_failure() {
        let err = load(
            r#"(module
                (func (export "initialize"))
                (func (export "execute") (param i32)))"#,
        )
        .err()
        .expect("execute takes no params");
        assert_eq!(err.stage, FailureStage::Load);
    }

    #[test]
    fn initialize_trap_is_reported() {
        let mut script = load(
            r#"(module
                (func (export "initialize") unreachable)
                (func (export "execute")))"#,
        )
        .expect("contract is satisfied");
        let (ctx, _rx) = test_ctx();
        let err = script.initialize(&ctx).expect_err("initialize traps");
        assert_eq!(err.stage, FailureStage::Initialize);
    }

    #[test]
    fn entry_points_stay_callable_across_the_whole_lifecycle() {
        let mut script = load(
            r#"(module
                (import "host" "spawn_entity" (func $spawn (param i32 i32 i32 i32 i64)))
                (memory (export "memory") 1)
                (data (i32.const 0) "spark")
                (func (export "initialize"))
                (func (export "execute")
                    (call $spawn (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 5) (i64.const 0)))
                (func (export "teardown")))"#,
        )
        .expect("contract is satisfied");
        let (ctx, mut rx) = test_ctx();

        script.initialize(&ctx).unwrap();
        for _ in 0..3 {
            script.execute(&ctx).unwrap();
        }
        script.teardown(&ctx).unwrap();

        let mut spawns = 0;
        while rx.try_recv().is_ok() {
            spawns += 1;
        }
        assert_eq!(spawns, 3, "execute ran once per call");
    }

    #[test]
    fn execute_reaches_host_imports() {
        let mut script = load(
            r#"(module
                (import "host" "spawn_entity" (func $spawn (param i32 i32 i32 i32 i64)))
                (memory (export "memory") 1)
                (data (i32.const 0) "spark")
                (func (export "initialize"))
                (func (export "execute")
                    (call $spawn (i32.const 3) (i32.const 4) (i32.const 0) (i32.const 5) (i64.const 1000))))"#,
        )
        .expect("contract is satisfied");
        let (ctx, mut rx) = test_ctx();
        script.initialize(&ctx).unwrap();
        script.execute(&ctx).unwrap();

        let action = rx.try_recv().expect("spawn requested");
        assert_eq!(
            action,
            crate::context::HostAction::SpawnEntity {
                x: 3,
                y: 4,
                tag: "spark".into(),
                lifetime_ms: 1000,
            }
        );
    }
}
