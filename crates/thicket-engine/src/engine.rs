//! The host engine: owns the world and drives scripts once per tick
//!
//! Scripts never run concurrently with world mutation: each tick first
//! expires entities, then takes a snapshot, runs the script pass against it,
//! and finally applies whatever actions the scripts queued.

use anyhow::Result;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::error;

use thicket_scripting_host::{HostAction, ScriptRunner};

use crate::config::ThicketConfig;
use crate::world::World;

pub struct Engine {
    world: World,
    /// `None` when the scripting subsystem failed to start; the host
    /// continues without scripting.
    scripts: Option<ScriptRunner>,
    actions_rx: UnboundedReceiver<HostAction>,
}

impl Engine {
    pub fn new(config: &ThicketConfig) -> Result<Self> {
        let (action_tx, actions_rx) = unbounded_channel();

        let scripts = match ScriptRunner::new(config.scripting.clone(), action_tx) {
            Ok(runner) => Some(runner),
            Err(e) => {
                error!(target: "scripting", "scripting subsystem failed to start: {:#}", e);
                None
            }
        };

        Ok(Self {
            world: World::new(),
            scripts,
            actions_rx,
        })
    }

    /// Run one frame of game logic
    pub fn tick(&mut self) {
        self.world.update();

        if let Some(scripts) = self.scripts.as_mut() {
            let snapshot = self.world.snapshot();
            let now = self.world.now_millis();
            scripts.tick(snapshot, now);
        }

        while let Ok(action) = self.actions_rx.try_recv() {
            self.world.apply(action);
        }
    }

    /// Tear down and rebuild the whole scripting runtime from the directory
    pub fn restart_scripts(&mut self) {
        if let Some(scripts) = self.scripts.as_mut() {
            scripts.restart();
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(scripts) = self.scripts.as_mut() {
            scripts.shutdown();
        }
        // Actions queued by teardown handlers still apply
        while let Ok(action) = self.actions_rx.try_recv() {
            self.world.apply(action);
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn scripts(&self) -> Option<&ScriptRunner> {
        self.scripts.as_ref()
    }
}
