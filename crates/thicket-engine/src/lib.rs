//! World model and tick loop for the thicket game host
//!
//! Rendering, input and the full game-object model live elsewhere; this
//! crate holds the part of the host that scripts can observe and mutate,
//! plus the engine loop that drives them.

pub mod config;
pub mod engine;
pub mod world;

pub use config::ThicketConfig;
pub use engine::Engine;
pub use world::{Entity, World};
