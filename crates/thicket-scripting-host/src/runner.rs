//! The script runner: registry transitions plus the per-tick execution pass
//!
//! All registry mutation happens here, on the host tick thread, at tick
//! boundaries. The watcher thread only delivers change events over a
//! channel; compile workers only deliver compiled modules over a channel.
//! Neither ever touches the registry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use wasmtime::{Engine, Linker, Module};

use crate::compiler::compile_file;
use crate::config::ScriptingConfig;
use crate::context::{HostAction, ScriptContext, WorldSnapshot};
use crate::diagnostics::ScriptFailure;
use crate::loader::{LoadedScript, ScriptState};
use crate::reclaim::Reclaimer;
use crate::registry::ScriptRegistry;
use crate::scanner::{script_label, ChangeKind, ScriptChange, ScriptScanner};
use crate::watcher::DirectoryWatcher;

/// How long shutdown waits for in-flight compiles before abandoning them
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one off-thread compilation
struct CompileResult {
    path: PathBuf,
    /// Runtime generation the compile was requested under
    generation: u64,
    outcome: Result<Module, ScriptFailure>,
}

/// Drives scripts: loads them, hot-reloads them, executes them every tick
pub struct ScriptRunner {
    engine: Engine,
    linker: Linker<ScriptState>,
    config: ScriptingConfig,
    registry: ScriptRegistry,
    reclaimer: Reclaimer,
    /// Channel for host actions requested by scripts
    action_tx: UnboundedSender<HostAction>,
    /// Change events from the watcher thread
    events_tx: UnboundedSender<ScriptChange>,
    events_rx: UnboundedReceiver<ScriptChange>,
    /// Compile results from worker threads
    results_tx: UnboundedSender<CompileResult>,
    results_rx: UnboundedReceiver<CompileResult>,
    watcher: Option<DirectoryWatcher>,
    /// Coalesced change requests: at most one per identity, latest kind wins
    pending: Vec<ScriptChange>,
    /// Identities with a compile in flight; their transitions are serialized
    in_flight: HashSet<PathBuf>,
    /// Bumped on every shutdown so compiles abandoned at the drain deadline
    /// can never publish into a later runtime.
    generation: u64,
    tick_count: u64,
    last_now_millis: u64,
}

impl ScriptRunner {
    /// Create the runner, scan the script directory, and start the watcher.
    ///
    /// Fails only when the reference set (wasmtime engine + host import set)
    /// cannot be assembled; everything per-script is reported, not raised.
    pub fn new(config: ScriptingConfig, action_tx: UnboundedSender<HostAction>) -> Result<Self> {
        let engine = crate::engine::create_engine()?;
        let linker = crate::engine::create_host_linker(&engine)
            .context("scripting subsystem cannot start")?;

        let (events_tx, events_rx) = unbounded_channel();
        let (results_tx, results_rx) = unbounded_channel();

        let mut runner = Self {
            engine,
            linker,
            config,
            registry: ScriptRegistry::new(),
            reclaimer: Reclaimer::new(),
            action_tx,
            events_tx,
            events_rx,
            results_tx,
            results_rx,
            watcher: None,
            pending: Vec::new(),
            in_flight: HashSet::new(),
            generation: 0,
            tick_count: 0,
            last_now_millis: 0,
        };

        runner.attach();
        Ok(runner)
    }

    /// Scan the directory for the initial identity set and start the watcher
    /// with that scan as its baseline.
    fn attach(&mut self) {
        if !self.config.enabled {
            info!(target: "scripting", "scripting disabled by config");
            return;
        }

        let script_dir = self.config.script_dir();
        let mut scanner = ScriptScanner::with_interval(script_dir.clone(), self.config.scan_interval());
        for change in scanner.scan_changes() {
            self.coalesce(change);
        }
        info!(
            target: "scripting",
            "found {} script(s) in {}",
            self.pending.len(),
            script_dir.display()
        );

        if self.config.hot_reload {
            match DirectoryWatcher::spawn(scanner, self.events_tx.clone()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => {
                    error!(target: "scripting", "hot reload unavailable: {:#}", e);
                }
            }
        }
    }

    /// Number of currently published scripts
    pub fn script_count(&self) -> usize {
        self.registry.len()
    }

    /// Labels of currently published scripts, in execution order
    pub fn script_labels(&self) -> Vec<String> {
        self.registry.labels().iter().map(|s| s.to_string()).collect()
    }

    /// Current revision of a published script, if any
    pub fn revision_of(&self, path: &Path) -> Option<u64> {
        self.registry.revision_of(path)
    }

    /// True while any reload transition is queued or compiling
    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty() || !self.in_flight.is_empty()
    }

    pub fn retired_pending(&self) -> usize {
        self.reclaimer.pending_count()
    }

    /// Run one host tick: apply settled transitions at the boundary, then
    /// execute every published script in insertion order.
    pub fn tick(&mut self, snapshot: WorldSnapshot, now_millis: u64) {
        self.tick_count += 1;
        self.last_now_millis = now_millis;

        self.reclaimer.sweep(self.tick_count);

        let ctx = ScriptContext::new(self.action_tx.clone(), snapshot, now_millis);

        self.drain_watch_events();
        self.dispatch_pending();
        self.apply_results(&ctx);
        self.execute_all(&ctx);
    }

    /// Full restart: tear everything down, re-scan, re-run the Added path
    /// for every discovered file.
    pub fn restart(&mut self) {
        info!(target: "scripting", "restarting script runtime");
        self.shutdown();
        self.attach();
    }

    /// Orderly teardown: watcher first, then in-flight transitions drained
    /// to a safe point, then every published entry torn down.
    pub fn shutdown(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        while self.events_rx.try_recv().is_ok() {}
        self.pending.clear();

        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while !self.in_flight.is_empty() && Instant::now() < deadline {
            while let Ok(result) = self.results_rx.try_recv() {
                self.in_flight.remove(&result.path);
            }
            if !self.in_flight.is_empty() {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        if !self.in_flight.is_empty() {
            warn!(
                target: "scripting",
                "abandoning {} unfinished compile(s) at shutdown",
                self.in_flight.len()
            );
            self.in_flight.clear();
        }
        // Abandoned workers may still deliver into results_rx; the new
        // generation makes anything they send unpublishable.
        self.generation = self.generation.wrapping_add(1);

        let entries = self.registry.drain();
        if !entries.is_empty() {
            debug!(target: "scripting", "tearing down {} script(s)", entries.len());
        }
        let ctx = self.lifecycle_ctx();
        for (label, module, mut instance) in entries {
            if let Err(e) = instance.teardown(&ctx) {
                warn!(target: "scripting", script = %label, "teardown failed: {:#}", e);
            }
            drop(instance);
            drop(module);
        }

        self.reclaimer.drain_all();
    }

    /// Context for lifecycle calls that happen outside a tick (shutdown);
    /// queries see an empty world, actions still flow to the host.
    fn lifecycle_ctx(&self) -> ScriptContext {
        ScriptContext::new(
            self.action_tx.clone(),
            WorldSnapshot::default(),
            self.last_now_millis,
        )
    }

    /// Move watcher events into the pending set, coalescing per identity
    fn drain_watch_events(&mut self) {
        while let Ok(change) = self.events_rx.try_recv() {
            self.coalesce(change);
        }
    }

    fn coalesce(&mut self, change: ScriptChange) {
        self.pending.retain(|p| p.path != change.path);
        self.pending.push(change);
    }

    /// Act on pending requests whose identity has no transition in flight
    fn dispatch_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let (ready, blocked): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|change| !self.in_flight.contains(&change.path));
        self.pending = blocked;

        for change in ready {
            match change.kind {
                ChangeKind::Removed => self.apply_removal(&change.path),
                ChangeKind::Added | ChangeKind::Modified => self.spawn_compile(change),
            }
        }
    }

    fn apply_removal(&mut self, path: &Path) {
        let Some((module, mut instance)) = self.registry.remove(path) else {
            return;
        };
        let label = instance.label().to_string();
        info!(target: "scripting", script = %label, "script removed");

        let ctx = self.lifecycle_ctx();
        if let Err(e) = instance.teardown(&ctx) {
            warn!(target: "scripting", script = %label, "teardown failed: {:#}", e);
        }
        drop(instance);

        let revision = self.registry.next_revision(path).saturating_sub(1);
        self.reclaimer.retire(label, revision, module, self.tick_count);
    }

    fn spawn_compile(&mut self, change: ScriptChange) {
        let label = script_label(&change.path);

        if !self.config.script_enabled(&label) && !self.registry.contains(&change.path) {
            info!(target: "scripting", script = %label, "skipping disabled script");
            return;
        }

        let engine = self.engine.clone();
        let path = change.path.clone();
        let results_tx = self.results_tx.clone();
        let generation = self.generation;

        let spawned = std::thread::Builder::new()
            .name(format!("script-compile-{}", label))
            .spawn(move || {
                let outcome = compile_file(&engine, &path);
                let _ = results_tx.send(CompileResult {
                    path,
                    generation,
                    outcome,
                });
            });

        match spawned {
            Ok(_) => {
                debug!(target: "scripting", script = %label, "compiling");
                self.in_flight.insert(change.path);
            }
            Err(e) => {
                // Retry on the next tick
                warn!(target: "scripting", script = %label, "could not spawn compile worker: {}", e);
                self.pending.push(change);
            }
        }
    }

    /// Apply completed compilations: instantiate, initialize, publish.
    fn apply_results(&mut self, ctx: &ScriptContext) {
        while let Ok(result) = self.results_rx.try_recv() {
            // A compile abandoned by a previous runtime finally finished.
            // It must not publish, and it must not un-serialize an identity
            // the current runtime may be compiling.
            if result.generation != self.generation {
                debug!(
                    target: "scripting",
                    "discarding build of {} from a previous runtime",
                    result.path.display()
                );
                continue;
            }
            self.in_flight.remove(&result.path);

            // A newer request for the same identity arrived mid-compile;
            // this result is stale and only the latest request is honored.
            if self.pending.iter().any(|p| p.path == result.path) {
                debug!(
                    target: "scripting",
                    "discarding stale build of {}",
                    result.path.display()
                );
                continue;
            }

            let label = script_label(&result.path);
            match result.outcome {
                Ok(module) => self.publish(ctx, result.path, label, module),
                Err(failure) => self.report_failure(&label, &failure),
            }
        }
    }

    fn publish(&mut self, ctx: &ScriptContext, path: PathBuf, label: String, module: Module) {
        let mut instance =
            match LoadedScript::instantiate(&self.engine, &self.linker, &module, &label) {
                Ok(instance) => instance,
                Err(failure) => {
                    self.report_failure(&label, &failure);
                    return;
                }
            };

        if let Err(failure) = instance.initialize(ctx) {
            // Roll back: nothing was published, the module goes straight
            // to the reclaimer.
            self.report_failure(&label, &failure);
            drop(instance);
            let revision = self.registry.next_revision(&path);
            self.reclaimer.retire(label, revision, module, self.tick_count);
            return;
        }

        let (revision, superseded) = self.registry.publish(path, label.clone(), module, instance);

        match superseded {
            Some((old_module, mut old_instance)) => {
                info!(target: "scripting", script = %label, revision, "script reloaded");
                // Teardown happens-after publish: the identity is never
                // left without a servable entry.
                if let Err(e) = old_instance.teardown(ctx) {
                    warn!(target: "scripting", script = %label, "teardown failed: {:#}", e);
                }
                drop(old_instance);
                self.reclaimer
                    .retire(label, revision - 1, old_module, self.tick_count);
            }
            None => {
                info!(target: "scripting", script = %label, revision, "script loaded");
            }
        }
    }

    fn report_failure(&self, label: &str, failure: &ScriptFailure) {
        warn!(
            target: "scripting",
            script = %label,
            stage = %failure.stage,
            "script not (re)loaded"
        );
        for diagnostic in &failure.diagnostics {
            warn!(target: "scripting", script = %label, "{}", diagnostic);
        }
    }

    /// Execute every published script once, sequentially, in insertion
    /// order. A trap is contained: logged with identity and revision,
    /// the entry stays published, the tick continues.
    fn execute_all(&mut self, ctx: &ScriptContext) {
        for entry in self.registry.iter_mut() {
            if let Err(e) = entry.instance.execute(ctx) {
                error!(
                    target: "scripting",
                    script = %entry.label,
                    revision = entry.revision,
                    "execute trapped: {:#}",
                    e
                );
            }
        }
    }
}

impl Drop for ScriptRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
