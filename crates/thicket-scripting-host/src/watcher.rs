//! Background directory watcher
//!
//! Runs the [`ScriptScanner`] on a dedicated thread and forwards observed
//! changes over a channel; it never compiles or instantiates anything on the
//! delivery context. The thread is stopped and joined before the registry is
//! torn down, so no event can reach a dead runner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::scanner::{ScriptChange, ScriptScanner};

/// Poll granularity for the stop flag; scans themselves are gated by the
/// scanner's own interval.
const WAKE_INTERVAL: Duration = Duration::from_millis(25);

pub struct DirectoryWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Spawn the watcher thread over an already-primed scanner.
    pub fn spawn(
        mut scanner: ScriptScanner,
        events_tx: UnboundedSender<ScriptChange>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("script-watcher".to_string())
            .spawn(move || {
                debug!(
                    target: "scripting",
                    "watching {} for script changes",
                    scanner.script_dir().display()
                );
                while !thread_stop.load(Ordering::Relaxed) {
                    if scanner.should_scan() {
                        for change in scanner.scan_changes() {
                            if events_tx.send(change).is_err() {
                                // Receiver dropped; nothing left to notify
                                return;
                            }
                        }
                    }
                    std::thread::sleep(WAKE_INTERVAL);
                }
                debug!(target: "scripting", "script watcher stopped");
            })
            .context("failed to spawn script watcher thread")?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the watcher and wait for the thread to exit. After this returns
    /// no further events will be delivered.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
