//! Reference set resolution: the fixed runtime every script links against
//!
//! Built once at startup. The wasmtime `Engine` plus a `Linker` populated
//! with the full host import set are the only things a script compilation
//! may depend on; if either cannot be assembled no script could ever run,
//! so failure here is fatal to the scripting subsystem (and only here).

use anyhow::{Context, Result};
use wasmtime::{Config, Engine, Linker};

use crate::bindings;
use crate::loader::ScriptState;

/// Create a configured wasmtime engine for script execution
pub fn create_engine() -> Result<Engine> {
    let mut config = Config::new();

    // Scripts run synchronously on the tick thread
    config.async_support(false);

    #[cfg(not(debug_assertions))]
    {
        config.cranelift_opt_level(wasmtime::OptLevel::Speed);
    }

    Engine::new(&config).context("failed to create wasmtime engine")
}

/// Assemble the host import set every script instantiation links against.
///
/// The returned linker is read-only shared state; it is never mutated after
/// startup, so concurrent compilations and sequential instantiations all see
/// the same reference set.
pub fn create_host_linker(engine: &Engine) -> Result<Linker<ScriptState>> {
    let mut linker = Linker::new(engine);
    bindings::add_host_imports(&mut linker).context("failed to assemble host import set")?;
    Ok(linker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_set_resolves() {
        let engine = create_engine().expect("engine");
        create_host_linker(&engine).expect("host linker");
    }
}
