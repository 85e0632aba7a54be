//! Capability handle passed to scripts for interacting with the host
//!
//! Scripts never touch the world directly. Queries go through a snapshot
//! taken at the tick boundary, and mutations are enqueued as [`HostAction`]s
//! that the engine drains after the script pass of the same tick. This keeps
//! script execution strictly sequential with host state mutation.

use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// A world mutation requested by a script, applied by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    /// Spawn a transient world entity at the given world coordinates
    SpawnEntity {
        x: i32,
        y: i32,
        tag: String,
        lifetime_ms: u64,
    },
}

/// One renderable world entity as seen by scripts
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub x: i32,
    pub y: i32,
    pub tag: String,
}

/// Read-only view of the world, consistent for the duration of one tick
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// Count currently renderable entities carrying the given category tag
    pub fn entity_count(&self, tag: &str) -> u32 {
        self.entities.iter().filter(|e| e.tag == tag).count() as u32
    }
}

/// Context provided to scripts for the duration of one lifecycle call
pub struct ScriptContext {
    /// Channel for host actions requested by scripts
    action_tx: UnboundedSender<HostAction>,
    /// World state at the tick boundary
    snapshot: WorldSnapshot,
    /// Tick timestamp, milliseconds since engine start
    now_millis: u64,
}

impl ScriptContext {
    pub fn new(
        action_tx: UnboundedSender<HostAction>,
        snapshot: WorldSnapshot,
        now_millis: u64,
    ) -> Self {
        Self {
            action_tx,
            snapshot,
            now_millis,
        }
    }

    /// Request a transient entity spawn; applied by the engine after the
    /// script pass of the current tick.
    pub fn spawn_entity(&self, x: i32, y: i32, tag: impl Into<String>, lifetime_ms: u64) {
        let _ = self.action_tx.send(HostAction::SpawnEntity {
            x,
            y,
            tag: tag.into(),
            lifetime_ms,
        });
    }

    /// Count renderable entities with the given tag, as of the tick boundary
    pub fn entity_count(&self, tag: &str) -> u32 {
        self.snapshot.entity_count(tag)
    }

    /// Current tick timestamp in milliseconds since engine start
    pub fn now_millis(&self) -> u64 {
        self.now_millis
    }

    /// Emit a log line attributed to the given script
    pub fn log(&self, script: &str, message: &str) {
        info!(target: "scripting", script, "{}", message);
    }
}
