use serde::Serialize;

use crate::actor::ActorPool;
use crate::cursor::CursorState;
use crate::flags::FlagRegister;
use crate::inventory::Inventory;
use crate::registry::WorldRegistry;
use crate::script::ScriptError;
use dragons_formats::VarTable;

/// The click being carried toward resolution. Queued by the dispatcher
/// when the action button lands on a target, consumed once the walk latch
/// reaches the ready state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PendingInteraction {
    /// 1-based record whose script is probed first. For an item use this
    /// is the held item, not the hovered object.
    pub target: u16,
    /// Verb sequence id at click time.
    pub action: u16,
    /// 1-based hovered record for an item use, 0 otherwise.
    pub second: u16,
}

/// Edge-triggered button state for one tick.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ButtonState {
    pub left_up: bool,
    pub right_up: bool,
    pub inventory_up: bool,
}

impl ButtonState {
    pub fn clear(&mut self) {
        *self = ButtonState::default();
    }
}

// Interaction latch values. 1 while the player walks toward a queued
// target; the scripted-update pass ORs in 2 whenever the player stands
// still, so 3 means "arrived, resolve now".
pub const LATCH_WALKING: u8 = 0x1;
pub const LATCH_ARRIVED: u8 = 0x2;
pub const LATCH_READY: u8 = LATCH_WALKING | LATCH_ARRIVED;

/// All mutable per-run state: everything the tick loop and the two
/// interpreters read and write. Parsed game data stays in
/// `GameResources`; keeping the split lets script handlers hold the world
/// mutably while walking resource tables.
#[derive(Debug, Default, Serialize)]
pub struct World {
    pub flags: FlagRegister,
    pub registry: WorldRegistry,
    pub actors: ActorPool,
    pub cursor: CursorState,
    pub inventory: Inventory,
    pub vars: VarTable,
    pub scene_id: u16,
    /// Last non-transitional scene, restored after cutscene scenes.
    pub scene_id_back: u16,
    /// Idle tick counter driving the player fidget.
    pub counter: u32,
    /// Interaction latch, see the LATCH_* values.
    pub latch: u8,
    pub pending: Option<PendingInteraction>,
    /// Scene change requested by a script, applied at the top of the next
    /// tick.
    pub pending_scene: Option<u16>,
    /// Record the player stood on last tick, for step-trigger edges.
    pub last_step_object: u16,
    #[serde(skip)]
    pub buttons: ButtonState,
    #[serde(skip)]
    pub quit: bool,
}

impl World {
    /// Pool slot of the player actor; the player record must own one
    /// whenever a scene is live.
    pub fn flicker_actor_id(&self) -> Result<u16, ScriptError> {
        self.registry
            .records()
            .first()
            .and_then(|flicker| flicker.actor)
            .ok_or(ScriptError::MissingPlayerActor)
    }

    /// The player record only participates while placed in the current
    /// scene. False on the default (empty) registry, so a tick before the
    /// first scene load is a no-op rather than a panic.
    pub fn flicker_in_scene(&self) -> bool {
        self.registry
            .records()
            .first()
            .is_some_and(|flicker| flicker.scene_id == self.scene_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_world_has_no_live_player() {
        let world = World::default();
        assert!(!world.flicker_in_scene());
        assert!(world.flicker_actor_id().is_err());
    }
}
