//! Host runtime for compiling, loading and hot-reloading WASM scripts
//!
//! Script sources are WebAssembly text files named `*.script.wat` inside one
//! designated directory. Each file is compiled at process runtime into an
//! in-memory module and must export the script contract:
//!
//! - `initialize: func()` - one-time setup, runs before the script is
//!   published; a trap aborts publication
//! - `execute: func()` - runs once per host tick while the script is active
//! - `teardown: func()` (optional) - best-effort, runs when the script is
//!   superseded or removed
//!
//! Scripts reach the host through imports in the `"host"` module
//! (`spawn_entity`, `entity_count`, `now_millis`, `log`); string arguments
//! are `(ptr, len)` pairs into the script's exported `memory`.
//!
//! Editing, adding or deleting a source file is picked up by a background
//! watcher and applied at the next tick boundary without restarting the
//! host; a broken edit never takes down a previously working script.

pub mod bindings;
pub mod compiler;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod loader;
pub mod reclaim;
pub mod registry;
pub mod reload;
pub mod runner;
pub mod scanner;
pub mod watcher;

pub use config::ScriptingConfig;
pub use context::{EntitySnapshot, HostAction, ScriptContext, WorldSnapshot};
pub use diagnostics::{Diagnostic, FailureStage, ScriptFailure, SourceSpan};
pub use reload::setup_restart_signal;
pub use runner::ScriptRunner;
pub use scanner::{script_label, ChangeKind, ScriptChange, SCRIPT_SUFFIX};
