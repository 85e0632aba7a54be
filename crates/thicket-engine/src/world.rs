//! World entity store: the boundary scripts interact with
//!
//! Holds transient tagged entities, expires them when their lifetime
//! elapses, and produces the per-tick snapshot handed to scripts.

use std::time::Instant;

use thicket_scripting_host::{EntitySnapshot, HostAction, WorldSnapshot};
use tracing::debug;

/// A transient world entity with a category tag and an optional lifetime
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    pub tag: String,
    /// Expiry timestamp in world time, `None` for permanent entities
    pub expires_at_millis: Option<u64>,
}

/// The game world as far as scripts are concerned
pub struct World {
    started: Instant,
    entities: Vec<Entity>,
    next_id: u64,
}

impl World {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entities: Vec::new(),
            next_id: 1,
        }
    }

    /// Milliseconds since the world was created; the tick timestamp scripts see
    pub fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Expire entities whose lifetime has elapsed; runs at each tick boundary
    pub fn update(&mut self) {
        let now = self.now_millis();
        self.entities.retain(|entity| {
            let keep = entity.expires_at_millis.is_none_or(|expiry| expiry > now);
            if !keep {
                debug!(target: "world", id = entity.id, tag = %entity.tag, "entity expired");
            }
            keep
        });
    }

    /// Spawn a transient entity; a zero lifetime means permanent
    pub fn spawn(&mut self, x: i32, y: i32, tag: String, lifetime_ms: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let expires_at_millis = (lifetime_ms > 0).then(|| self.now_millis() + lifetime_ms);
        debug!(target: "world", id, tag = %tag, x, y, "entity spawned");
        self.entities.push(Entity {
            id,
            x,
            y,
            tag,
            expires_at_millis,
        });
        id
    }

    /// Apply a host action requested by a script
    pub fn apply(&mut self, action: HostAction) {
        match action {
            HostAction::SpawnEntity {
                x,
                y,
                tag,
                lifetime_ms,
            } => {
                self.spawn(x, y, tag, lifetime_ms);
            }
        }
    }

    /// Consistent read-only view for the current tick
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            entities: self
                .entities
                .iter()
                .map(|e| EntitySnapshot {
                    x: e.x,
                    y: e.y,
                    tag: e.tag.clone(),
                })
                .collect(),
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn count_tagged(&self, tag: &str) -> usize {
        self.entities.iter().filter(|e| e.tag == tag).count()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawned_entities_show_up_in_snapshot() {
        let mut world = World::new();
        world.spawn(10, 20, "powerup".into(), 0);
        world.spawn(30, 40, "bomb".into(), 0);

        let snapshot = world.snapshot();
        assert_eq!(snapshot.entity_count("powerup"), 1);
        assert_eq!(snapshot.entity_count("bomb"), 1);
    }

    #[test]
    fn entities_expire_after_their_lifetime() {
        let mut world = World::new();
        world.spawn(0, 0, "spark".into(), 20);
        world.spawn(0, 0, "keeper".into(), 0);

        world.update();
        assert_eq!(world.count_tagged("spark"), 1);

        std::thread::sleep(Duration::from_millis(30));
        world.update();
        assert_eq!(world.count_tagged("spark"), 0);
        assert_eq!(world.count_tagged("keeper"), 1, "permanent entity survives");
    }

    #[test]
    fn apply_spawn_action() {
        let mut world = World::new();
        world.apply(HostAction::SpawnEntity {
            x: 5,
            y: 6,
            tag: "powerup".into(),
            lifetime_ms: 0,
        });
        assert_eq!(world.count_tagged("powerup"), 1);
        assert_eq!(world.entities()[0].x, 5);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut world = World::new();
        let a = world.spawn(0, 0, "a".into(), 0);
        let b = world.spawn(0, 0, "b".into(), 0);
        assert!(b > a);
    }
}
