//! Host imports exposed to WASM scripts
//!
//! Scripts import from the `"host"` module. String arguments cross the
//! boundary as `(ptr, len)` pairs into the script's exported linear memory;
//! a bad pointer traps the calling script, which the runner contains and
//! logs without affecting other scripts.

use anyhow::{anyhow, Result};
use wasmtime::{Caller, Extern, Linker};

use crate::context::ScriptContext;
use crate::loader::ScriptState;

/// Add all host imports to the linker
pub fn add_host_imports(linker: &mut Linker<ScriptState>) -> Result<()> {
    linker.func_wrap(
        "host",
        "spawn_entity",
        |mut caller: Caller<'_, ScriptState>,
         x: i32,
         y: i32,
         tag_ptr: u32,
         tag_len: u32,
         lifetime_ms: i64|
         -> Result<()> {
            let tag = read_string(&mut caller, tag_ptr, tag_len)?;
            let ctx = host_context(caller.data())?;
            ctx.spawn_entity(x, y, tag, lifetime_ms.max(0) as u64);
            Ok(())
        },
    )?;

    linker.func_wrap(
        "host",
        "entity_count",
        |mut caller: Caller<'_, ScriptState>, tag_ptr: u32, tag_len: u32| -> Result<i32> {
            let tag = read_string(&mut caller, tag_ptr, tag_len)?;
            let ctx = host_context(caller.data())?;
            Ok(ctx.entity_count(&tag) as i32)
        },
    )?;

    linker.func_wrap(
        "host",
        "now_millis",
        |caller: Caller<'_, ScriptState>| -> Result<i64> {
            let ctx = host_context(caller.data())?;
            Ok(ctx.now_millis() as i64)
        },
    )?;

    linker.func_wrap(
        "host",
        "log",
        |mut caller: Caller<'_, ScriptState>, msg_ptr: u32, msg_len: u32| -> Result<()> {
            let message = read_string(&mut caller, msg_ptr, msg_len)?;
            let label = caller.data().label.clone();
            let ctx = host_context(caller.data())?;
            ctx.log(&label, &message);
            Ok(())
        },
    )?;

    Ok(())
}

/// Get the ScriptContext for the current lifecycle call
///
/// # Safety
/// The pointer is set by `LoadedScript` immediately before each WASM call
/// and cleared immediately after, and the context outlives the call; scripts
/// cannot retain it across calls.
fn host_context(state: &ScriptState) -> Result<&ScriptContext> {
    let ptr = state
        .host_context
        .ok_or_else(|| anyhow!("host capability is not available in this call"))?;
    Ok(unsafe { &*ptr })
}

/// Read a UTF-8 string out of the script's exported memory
fn read_string(caller: &mut Caller<'_, ScriptState>, ptr: u32, len: u32) -> Result<String> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("script does not export a memory named \"memory\""))?;

    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| anyhow!("string range overflows"))?;

    let data = memory.data(&caller);
    let bytes = data
        .get(start..end)
        .ok_or_else(|| anyhow!("string range {}..{} is out of bounds", start, end))?;

    let text = std::str::from_utf8(bytes)
        .map_err(|e| anyhow!("string is not valid UTF-8: {}", e))?;
    Ok(text.to_string())
}
