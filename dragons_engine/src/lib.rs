//! Scripted game-logic engine: a fixed-rate frame loop interpreting
//! object scripts and actor sequence programs against a shared world of
//! actors, object records, flags, cursor and inventory state.

pub mod actor;
pub mod backend;
pub mod cursor;
pub mod flags;
pub mod game;
pub mod interaction;
pub mod inventory;
pub mod registry;
pub mod resources;
pub mod save;
pub mod script;
pub mod script_ops;
pub mod sequence_ops;
pub mod world;

#[cfg(test)]
pub mod testkit;

pub use backend::{Backend, EventSource, InputEvent, NullBackend, ScriptedEvents};
pub use game::Engine;
pub use resources::GameResources;
pub use world::World;
