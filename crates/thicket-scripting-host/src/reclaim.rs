//! Reclamation of superseded compiled modules
//!
//! A superseded or removed module is held here until no execution pass that
//! started before its retirement can still reference it. Execution is
//! sequential on the tick thread and publication happens at tick boundaries,
//! so a module retired during tick T has zero observers once tick T
//! completes; the sweep at the start of tick T+1 releases it.

use tracing::debug;
use wasmtime::Module;

struct RetiredModule {
    label: String,
    revision: u64,
    /// Held until the sweep; dropping it releases the compiled code
    _module: Module,
    retired_at: u64,
}

#[derive(Default)]
pub struct Reclaimer {
    pending: Vec<RetiredModule>,
    released_total: u64,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over a superseded module. `retired_at` is the tick during which
    /// it was retired.
    pub fn retire(&mut self, label: String, revision: u64, module: Module, retired_at: u64) {
        debug!(
            target: "scripting",
            script = %label,
            revision,
            "module retired, pending reclamation"
        );
        self.pending.push(RetiredModule {
            label,
            revision,
            _module: module,
            retired_at,
        });
    }

    /// Release every module retired before the current tick began.
    pub fn sweep(&mut self, current_tick: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|retired| {
            if retired.retired_at < current_tick {
                debug!(
                    target: "scripting",
                    script = %retired.label,
                    revision = retired.revision,
                    "module released"
                );
                false
            } else {
                true
            }
        });
        let released = before - self.pending.len();
        self.released_total += released as u64;
        released
    }

    /// Release everything immediately; only valid once execution has stopped.
    pub fn drain_all(&mut self) -> usize {
        let released = self.pending.len();
        self.pending.clear();
        self.released_total += released as u64;
        released
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn released_total(&self) -> u64 {
        self.released_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::engine::create_engine;
    use std::path::PathBuf;

    fn module() -> Module {
        let engine = create_engine().unwrap();
        compile_source(&engine, &PathBuf::from("m.script.wat"), "(module)").unwrap()
    }

    #[test]
    fn releases_only_after_the_retiring_tick() {
        let mut reclaimer = Reclaimer::new();
        reclaimer.retire("a".into(), 1, module(), 5);

        assert_eq!(reclaimer.sweep(5), 0, "still observable during tick 5");
        assert_eq!(reclaimer.pending_count(), 1);

        assert_eq!(reclaimer.sweep(6), 1);
        assert_eq!(reclaimer.pending_count(), 0);
        assert_eq!(reclaimer.released_total(), 1);
    }

    #[test]
    fn drain_releases_everything() {
        let mut reclaimer = Reclaimer::new();
        reclaimer.retire("a".into(), 1, module(), 1);
        reclaimer.retire("b".into(), 3, module(), 2);
        assert_eq!(reclaimer.drain_all(), 2);
        assert_eq!(reclaimer.pending_count(), 0);
    }
}
