use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};

use crate::actor::{
    ACTOR_COUNT, ACTOR_FLAG_HALTED, ACTOR_FLAG_IDLE, ACTOR_FLAG_MANUAL_SEQUENCE,
    ACTOR_FLAG_NO_CLIP, ACTOR_FLAG_PRIORITY_OVERRIDE, ACTOR_FLAG_READY, ACTOR_FLAG_RESTART,
    ACTOR_FLAG_VISIBLE, ACTOR_FLAG_WALKING, FOREGROUND_ACTOR_COUNT, ITEM_ACTOR_BASE,
    UI_ACTOR_SLOTS, remap_priority,
};
use crate::backend::{Backend, EventSource, InputEvent};
use crate::cursor::CURSOR_SEQ_ITEM_IN_HAND;
use crate::flags::{
    ENGINE_FLAG_BACKGROUND_ACTORS, ENGINE_FLAG_FADE_PENDING, ENGINE_FLAG_FIDGET,
    ENGINE_FLAG_INPUT, ENGINE_FLAG_PATHFINDING, ENGINE_FLAG_SCRIPTED_UPDATE,
};
use crate::interaction::{queue_interaction, resolve_interaction};
use crate::inventory::{HOVER_BAG, HOVER_PANEL_SWAP, ITEM_SLOT_COUNT, Inventory, InventoryMode};
use crate::registry::{HOVER_NON_OBJECT, INI_FLAG_SCRIPT_PENDING, WorldRegistry};
use crate::resources::GameResources;
use crate::save::{SaveState, read_slot, write_slot};
use crate::script::ScriptCall;
use crate::script_ops::{ACTION_AUTO, ScriptEnv, run_auto_entry, run_entry, run_script, select_entry};
use crate::sequence_ops::run_sequence;
use crate::world::{LATCH_ARRIVED, LATCH_READY, LATCH_WALKING, World};
use dragons_formats::obd::{OBD_ATTR_STEP_TRIGGER, blob_attributes, blob_program};
use dragons_formats::rms::{TILE_HEIGHT, TILE_WIDTH};
use dragons_formats::var::VAR_INVENTORY_SWAP_DISABLED;

/// Frame period of the game loop.
pub const TICK_INTERVAL_MS: u64 = 17;
/// Idle ticks before the player fidget kicks in.
const FIDGET_THRESHOLD: u32 = 0x4af;
/// Actor resource that carries the fidget sequences.
const FIDGET_ACTOR_RESOURCE: u16 = 0xe;
/// Record whose variant word selects the alternate fidget.
const FIDGET_VARIANT_RECORD: usize = 0xc2;
const FIDGET_SEQUENCE: u16 = 2;
const FIDGET_VARIANT_SEQUENCE: u16 = 0x30;
/// Scene whose input gate follows a record's img word.
const GATE_SCENE: u16 = 0x1d;
const GATE_RECORD: usize = 0x179;
/// Scene id substituted when booting below the playable range.
const BOOTSTRAP_SCENE: u16 = 0x12;
/// Transitional hub scene; never remembered as the scene to return to.
const CUTSCENE_HUB_SCENE: u16 = 2;
/// Scene-level script run when entering a scene above the hub.
const INTRO_SCRIPT: usize = 3;

/// Drift-free frame pacing: returns how long to sleep before the next
/// tick and advances the deadline by one interval. An overrun fires
/// immediately and rebases the deadline so lag never accumulates.
pub fn next_frame_delay(now_ms: u64, deadline_ms: &mut u64, interval_ms: u64) -> u64 {
    if *deadline_ms <= now_ms {
        *deadline_ms = now_ms + interval_ms;
        0
    } else {
        let delay = *deadline_ms - now_ms;
        *deadline_ms += interval_ms;
        delay
    }
}

/// The engine proper: owns the world, the parsed game data, and the
/// platform collaborators, and advances everything one tick at a time.
pub struct Engine {
    pub world: World,
    resources: GameResources,
    backend: Box<dyn Backend>,
    events: Box<dyn EventSource>,
    start: Instant,
    next_deadline_ms: u64,
    pacing: bool,
    verbose: bool,
}

impl Engine {
    pub fn new(
        resources: GameResources,
        backend: Box<dyn Backend>,
        events: Box<dyn EventSource>,
    ) -> Self {
        let mut world = World::default();
        world.vars = resources.vars.clone();
        Engine {
            world,
            resources,
            backend,
            events,
            start: Instant::now(),
            next_deadline_ms: 0,
            pacing: true,
            verbose: false,
        }
    }

    pub fn set_pacing(&mut self, pacing: bool) {
        self.pacing = pacing;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    fn env(&mut self) -> ScriptEnv<'_> {
        ScriptEnv {
            world: &mut self.world,
            res: &self.resources,
            backend: self.backend.as_mut(),
        }
    }

    /// Tears down per-scene state and enters `scene_id`. Scene 0 (and
    /// anything below the playable range) boots the first playable scene;
    /// scenes above the hub run the scene intro script first.
    pub fn load_scene(&mut self, scene_id: u16) -> Result<()> {
        let mut scene_id = scene_id;
        self.world.flags.reset_for_scene();
        self.world.pending = None;
        self.world.pending_scene = None;
        self.world.latch = 0;
        self.world.counter = 0;
        self.world.last_step_object = 0;
        self.world.buttons.clear();
        self.world.cursor.reset_for_scene();
        self.world.inventory.reset_for_scene();
        self.world.registry = WorldRegistry::from_ini(&self.resources.ini);

        if scene_id > CUTSCENE_HUB_SCENE {
            self.world.vars.set(1, 1);
            self.world.scene_id = CUTSCENE_HUB_SCENE;
            self.run_intro_script()?;
        } else {
            scene_id = BOOTSTRAP_SCENE;
        }

        // the player record pins the scene: an unplaced player adopts the
        // requested one, a placed player overrides it
        if self.world.registry.flicker().scene_id == 0 {
            self.world.registry.flicker_mut().scene_id = scene_id;
        } else {
            scene_id = self.world.registry.flicker().scene_id;
        }
        self.world.scene_id = scene_id;
        self.world.scene_id_back = scene_id;

        self.activate_scene_actors()?;
        // input opens with the scene; the dispatcher and the scene gate
        // own the bit from here on
        self.world.flags.set(ENGINE_FLAG_INPUT);
        if self.verbose {
            eprintln!("[dragons_engine] entered scene {scene_id:#x}");
        }
        Ok(())
    }

    fn run_intro_script(&mut self) -> Result<()> {
        let program = blob_program(self.resources.obd.from_spt(INTRO_SCRIPT)?)?;
        let Some(entry) = select_entry(program, ACTION_AUTO)? else {
            return Ok(());
        };
        let mut env = ScriptEnv {
            world: &mut self.world,
            res: &self.resources,
            backend: self.backend.as_mut(),
        };
        run_entry(&mut env, program, entry)?;
        Ok(())
    }

    fn activate_scene_actors(&mut self) -> Result<()> {
        self.world.actors.reset();
        let scene = self.world.scene_id;
        for index in 0..self.world.registry.len() {
            let (in_scene, has_actor, img_id, resource) = {
                let record = self.world.registry.get(index);
                (
                    record.scene_id == scene,
                    record.has_actor_resource(),
                    record.img_id,
                    record.actor_resource_id,
                )
            };
            if !in_scene || !has_actor {
                continue;
            }
            let (x, y) = match self.resources.img.get(img_id) {
                Ok(region) => (region.target_x as i16, region.target_y as i16),
                Err(_) => (0, 0),
            };
            let slot = self.world.actors.activate(resource, x, y, 0);
            self.world.registry.get_mut(index).actor = slot;
        }
        if self.world.flicker_in_scene() {
            self.world.flicker_actor_id()?;
        }
        Ok(())
    }

    /// Runs until something (an event, a script) requests a quit.
    pub fn run(&mut self) -> Result<()> {
        while !self.world.quit {
            self.tick()?;
        }
        Ok(())
    }

    /// Runs at most `frames` ticks; headless runs and tests drive this.
    pub fn run_frames(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            if self.world.quit {
                break;
            }
            self.tick()?;
        }
        Ok(())
    }

    /// One frame of the game loop: present, pace, update, then dispatch
    /// input along the latch / panel-mode axes.
    pub fn tick(&mut self) -> Result<()> {
        if let Some(scene) = self.world.pending_scene.take() {
            self.load_scene(scene)?;
        }

        self.backend.draw(&self.world);
        self.backend.present();
        self.wait();
        self.update_handler()?;
        self.update_events();
        if self.world.quit {
            return Ok(());
        }

        if self.world.scene_id != CUTSCENE_HUB_SCENE {
            self.world.scene_id_back = self.world.scene_id;
        }

        self.world.counter += 1;
        self.fidget_tick()?;

        if self.world.latch == 0 {
            self.world.flags.set(ENGINE_FLAG_INPUT);
        }

        self.step_trigger_tick()?;
        self.update_hover();

        // an armed latch pre-empts everything else this tick
        if self.world.latch == LATCH_READY {
            self.world.latch = 0;
            self.apply_arrival_pose();
            let mut env = self.env();
            resolve_interaction(&mut env)?;
            self.scene_gate_tick();
            self.world.counter = 0;
            return Ok(());
        }

        if self.world.buttons.right_up && self.world.flags.input_enabled() {
            self.world.cursor.select_previous_cursor();
            self.world.counter = 0;
            return Ok(());
        }

        match self.world.inventory.mode() {
            InventoryMode::Closed => self.closed_mode_tick(),
            InventoryMode::Primary => self.primary_mode_tick(),
            InventoryMode::Secondary => self.secondary_mode_tick(),
        }
    }

    fn wait(&mut self) {
        let now = self.start.elapsed().as_millis() as u64;
        let delay = next_frame_delay(now, &mut self.next_deadline_ms, TICK_INTERVAL_MS);
        if self.pacing && delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
    }

    /// Nested frame pump used by panel animations: keeps actors, pacing
    /// and events alive without running the dispatcher.
    fn wait_for_frames(&mut self, frames: u32) -> Result<()> {
        for _ in 0..frames {
            if self.world.quit {
                break;
            }
            self.wait();
            self.update_handler()?;
            self.backend.draw(&self.world);
            self.backend.present();
            self.update_events();
        }
        Ok(())
    }

    fn update_events(&mut self) {
        self.world.buttons.clear();
        while let Some(event) = self.events.poll() {
            match event {
                InputEvent::Quit => self.world.quit = true,
                InputEvent::MouseMove { x, y } => self.world.cursor.update_position(x, y),
                InputEvent::LeftButtonUp => self.world.buttons.left_up = true,
                InputEvent::RightButtonUp => self.world.buttons.right_up = true,
                InputEvent::InventoryButtonUp => self.world.buttons.inventory_up = true,
            }
        }
    }

    // Per-tick world update: sequences, priorities, walks, then the
    // scripted-update pass.
    fn update_handler(&mut self) -> Result<()> {
        self.update_actor_sequences()?;
        self.update_priorities();
        if self.world.flags.is_set(ENGINE_FLAG_PATHFINDING) {
            for id in 0..FOREGROUND_ACTOR_COUNT as u16 {
                let actor = self.world.actors.get_mut(id);
                if actor.is_walking() {
                    actor.walk_step();
                }
            }
        }
        if self.world.flags.is_set(ENGINE_FLAG_SCRIPTED_UPDATE) {
            self.scripted_update()?;
        }
        Ok(())
    }

    fn update_actor_sequences(&mut self) -> Result<()> {
        if !self.world.flags.is_set(ENGINE_FLAG_PATHFINDING) {
            return Ok(());
        }
        let count = if self.world.flags.is_set(ENGINE_FLAG_BACKGROUND_ACTORS) {
            ACTOR_COUNT
        } else {
            FOREGROUND_ACTOR_COUNT
        };
        for id in (0..count as u16).rev() {
            // the two UI slots animate under the fade gate, not here
            if (id as usize) < UI_ACTOR_SLOTS && self.world.flags.is_set(ENGINE_FLAG_FADE_PENDING) {
                continue;
            }
            let eligible = {
                let actor = self.world.actors.get(id);
                actor.is_flag_set(ACTOR_FLAG_READY)
                    && !actor.is_flag_set(ACTOR_FLAG_IDLE)
                    && !actor.is_flag_set(ACTOR_FLAG_HALTED)
                    && (actor.sequence_timer == 0 || actor.is_flag_set(ACTOR_FLAG_RESTART))
            };
            if !eligible {
                continue;
            }
            let sequence_id = {
                let actor = self.world.actors.get_mut(id);
                if actor.is_flag_set(ACTOR_FLAG_RESTART) {
                    actor.restart_sequence();
                }
                actor.sequence_id
            };
            // actors without a sequence program are display-only
            if !self.resources.seq.contains(sequence_id) {
                continue;
            }
            let program = self.resources.seq.program(sequence_id)?;
            run_sequence(self.world.actors.get_mut(id), program, self.backend.as_mut())?;
        }
        Ok(())
    }

    fn update_priorities(&mut self) {
        let scene = self.world.scene_id;
        let flicker_actor = if self.world.flicker_in_scene() {
            self.world.registry.flicker().actor
        } else {
            None
        };
        for id in 0..FOREGROUND_ACTOR_COUNT as u16 {
            let (ready, overridden, x, y) = {
                let actor = self.world.actors.get(id);
                (
                    actor.is_flag_set(ACTOR_FLAG_READY),
                    actor.is_flag_set(ACTOR_FLAG_PRIORITY_OVERRIDE),
                    actor.x,
                    actor.y,
                )
            };
            if !ready {
                continue;
            }
            if !overridden {
                let sampled = self.resources.rms.priority_at(scene, x, y);
                let actor = self.world.actors.get_mut(id);
                if flicker_actor == Some(id) {
                    // the player keeps its layer in the handoff band
                    if sampled < 8 || sampled == 0x10 {
                        actor.priority_layer = sampled;
                    }
                } else if sampled != -1 {
                    actor.priority_layer = sampled;
                }
                actor.priority_layer = remap_priority(actor.priority_layer);
            }
            let actor = self.world.actors.get_mut(id);
            if actor.sequence_timer != 0 {
                actor.sequence_timer -= 1;
            }
        }
        if self.world.flags.is_set(ENGINE_FLAG_BACKGROUND_ACTORS) {
            for id in FOREGROUND_ACTOR_COUNT as u16..ACTOR_COUNT as u16 {
                let actor = self.world.actors.get_mut(id);
                if actor.is_flag_set(ACTOR_FLAG_READY) && actor.sequence_timer != 0 {
                    actor.sequence_timer -= 1;
                }
            }
        }
    }

    /// The scripted-update pass: promotes the interaction latch once the
    /// player stops walking, reverts the player to its queued base pose,
    /// and ticks object countdowns while no panel is open.
    fn scripted_update(&mut self) -> Result<()> {
        if self.world.flicker_in_scene() {
            let actor_id = self.world.flicker_actor_id()?;
            if !self.world.actors.get(actor_id).is_flag_set(ACTOR_FLAG_WALKING) {
                if self.world.latch & LATCH_ARRIVED == 0 {
                    self.world.latch |= LATCH_ARRIVED;
                }
                let actor = self.world.actors.get_mut(actor_id);
                if !actor.is_flag_set(ACTOR_FLAG_MANUAL_SEQUENCE)
                    && actor.is_flag_set(ACTOR_FLAG_IDLE)
                    && actor.pending_sequence_id >= 0
                    && actor.pending_sequence_id as u16 != actor.sequence_id
                {
                    let next = actor.pending_sequence_id as u16;
                    actor.update_sequence(next);
                }
            }
        }
        if self.world.inventory.mode() == InventoryMode::Closed {
            let scene = self.world.scene_id;
            self.world.registry.tick_countdowns(scene);
        }
        Ok(())
    }

    /// Launches the player fidget after enough idle ticks, and clears it
    /// again the moment the fidget sequence finishes.
    fn fidget_tick(&mut self) -> Result<()> {
        if !self.world.flicker_in_scene() {
            return Ok(());
        }
        let actor_id = self.world.flicker_actor_id()?;
        if self.world.counter > FIDGET_THRESHOLD
            && self.world.actors.get(actor_id).resource_id == FIDGET_ACTOR_RESOURCE
        {
            let variant = self
                .world
                .registry
                .records()
                .get(FIDGET_VARIANT_RECORD)
                .map(|record| record.variant)
                .unwrap_or(0);
            let sequence = if variant == 1 {
                FIDGET_VARIANT_SEQUENCE
            } else {
                FIDGET_SEQUENCE
            };
            self.world.registry.flicker_mut().base_seq = FIDGET_SEQUENCE as i16;
            let actor = self.world.actors.get_mut(actor_id);
            actor.pending_sequence_id = FIDGET_SEQUENCE as i16;
            actor.update_sequence(sequence);
            self.world.counter = 0;
            self.world.flags.set(ENGINE_FLAG_FIDGET);
        }
        if self.world.flags.is_set(ENGINE_FLAG_FIDGET)
            && self.world.actors.get(actor_id).is_flag_set(ACTOR_FLAG_IDLE)
        {
            self.world.counter = 0;
            self.world.flags.clear(ENGINE_FLAG_FIDGET);
        }
        Ok(())
    }

    /// Edge-triggered step scan: entering a different object's region
    /// fires its step sub-body, framed at +4 with its length word at +2.
    fn step_trigger_tick(&mut self) -> Result<()> {
        if !self.world.flicker_in_scene() {
            self.world.last_step_object = 0;
            return Ok(());
        }
        let actor_id = self.world.flicker_actor_id()?;
        let (tile_x, tile_y) = {
            let actor = self.world.actors.get(actor_id);
            (actor.x / TILE_WIDTH as i16, actor.y / TILE_HEIGHT as i16)
        };
        let current = self.world.registry.object_under_tile(
            self.world.scene_id,
            tile_x,
            tile_y,
            &self.resources.img,
        );
        if current != 0 && current != self.world.last_step_object {
            let blob = self.resources.obd.from_opt((current - 1) as usize)?;
            if blob_attributes(blob)? & OBD_ATTR_STEP_TRIGGER != 0 {
                let program = blob_program(blob)?;
                if program.len() >= 4 {
                    let len = u16::from_le_bytes([program[2], program[3]]) as usize;
                    let mut call = ScriptCall::over_range(program, 4, len)?;
                    let mut env = ScriptEnv {
                        world: &mut self.world,
                        res: &self.resources,
                        backend: self.backend.as_mut(),
                    };
                    run_script(&mut env, &mut call)?;
                    self.world.counter = 0;
                }
            }
        }
        self.world.last_step_object = current;
        Ok(())
    }

    /// Recomputes the hovered id: panel hit-targets and item icons while
    /// a panel is open, the region scan otherwise.
    fn update_hover(&mut self) {
        let (x, y) = (self.world.cursor.x, self.world.cursor.y);
        let hovered = if self.world.inventory.mode() != InventoryMode::Closed {
            self.world
                .inventory
                .panel_hit_target(x, y)
                .or_else(|| self.item_under_cursor())
                .unwrap_or(0)
        } else if Inventory::bag_hit(x, y) {
            HOVER_BAG
        } else {
            let (tile_x, tile_y) = (x / TILE_WIDTH as i16, y / TILE_HEIGHT as i16);
            self.world.registry.object_under_tile(
                self.world.scene_id,
                tile_x,
                tile_y,
                &self.resources.img,
            )
        };
        self.world.cursor.ini_under_cursor = hovered;
        self.world.cursor.activation_offset = if hovered == 0 { 0 } else { 5 };
    }

    fn item_under_cursor(&self) -> Option<u16> {
        let (x, y) = (self.world.cursor.x, self.world.cursor.y);
        for slot in 0..ITEM_SLOT_COUNT {
            let item = self.world.inventory.item_at(slot);
            if item == 0 {
                continue;
            }
            let actor = self.world.actors.get((ITEM_ACTOR_BASE + slot) as u16);
            if (actor.x - x).abs() <= 16 && (actor.y - y).abs() <= 12 {
                return Some(item);
            }
        }
        None
    }

    /// Arrival: hand the player the action pose of the record it walked
    /// to, before the queued interaction resolves.
    fn apply_arrival_pose(&mut self) {
        let Some(pending) = self.world.pending else {
            return;
        };
        if !self.world.flicker_in_scene() {
            return;
        }
        let Ok(actor_id) = self.world.flicker_actor_id() else {
            return;
        };
        if self.world.actors.get(actor_id).pending_sequence_id == -1 {
            return;
        }
        let record_id = if self.world.cursor.sequence_id != CURSOR_SEQ_ITEM_IN_HAND {
            pending.target
        } else {
            pending.second
        };
        if record_id == 0 || record_id & HOVER_NON_OBJECT != 0 {
            return;
        }
        let index = (record_id - 1) as usize;
        if index >= self.world.registry.len() {
            return;
        }
        let action_seq = self.world.registry.get(index).action_seq;
        if action_seq != -1 {
            self.world.actors.get_mut(actor_id).pending_sequence_id = action_seq;
        }
    }

    /// Every resolved interaction re-enables input, except in the one
    /// scene whose gate holds it on a record's img word.
    fn scene_gate_tick(&mut self) {
        let gated = self.world.scene_id == GATE_SCENE
            && self
                .world
                .registry
                .records()
                .get(GATE_RECORD)
                .map(|record| record.img_id != 0)
                .unwrap_or(false);
        if gated {
            self.world.flags.clear(ENGINE_FLAG_INPUT);
        } else {
            self.world.flags.set(ENGINE_FLAG_INPUT);
        }
    }

    fn closed_mode_tick(&mut self) -> Result<()> {
        if self.world.buttons.inventory_up
            && self.world.flags.input_enabled()
            && (self.world.latch & LATCH_READY) != LATCH_WALKING
        {
            let disabled = self.world.vars.get(VAR_INVENTORY_SWAP_DISABLED) == 1;
            if self.world.inventory.open_from_closed(disabled) {
                self.world.counter = 0;
                self.world.cursor.sequence_id = if self.world.cursor.holding_item() {
                    CURSOR_SEQ_ITEM_IN_HAND
                } else {
                    1
                };
                self.sync_item_actors();
            }
            return Ok(());
        }
        if self.world.buttons.left_up && self.world.flags.is_set(ENGINE_FLAG_INPUT) {
            self.world.counter = 0;
            let hovered = self.world.cursor.ini_under_cursor;
            if hovered == HOVER_BAG {
                self.closed_bag_click()?;
            } else {
                let mut env = self.env();
                queue_interaction(&mut env, hovered, false)?;
            }
        }
        self.run_object_scripts()
    }

    /// Clicking the bag corner while no panel is open: an empty hand
    /// opens the panel, a held item drops into the first free bag slot.
    fn closed_bag_click(&mut self) -> Result<()> {
        if self.world.cursor.holding_item() {
            if let Some(slot) = self.world.inventory.first_empty_slot() {
                self.world.cursor.sequence_id = 1;
                self.wait_for_frames(1)?;
                let held = self.world.cursor.item_in_hand;
                self.world.cursor.item_in_hand = 0;
                self.world.cursor.ini_under_cursor = 0;
                self.world.inventory.set_item(slot, held);
            }
            return Ok(());
        }
        if (self.world.latch & LATCH_READY) != LATCH_WALKING {
            let disabled = self.world.vars.get(VAR_INVENTORY_SWAP_DISABLED) == 1;
            if self.world.inventory.open_from_closed(disabled) {
                self.world.cursor.sequence_id = 1;
                self.sync_item_actors();
            }
        }
        Ok(())
    }

    fn primary_mode_tick(&mut self) -> Result<()> {
        if self.world.buttons.inventory_up && self.world.flags.input_enabled() {
            self.world.counter = 0;
            let disabled = self.world.vars.get(VAR_INVENTORY_SWAP_DISABLED) == 1;
            self.world.inventory.close_from_primary(disabled);
            self.sync_item_actors();
            return Ok(());
        }
        if self.world.buttons.left_up && self.world.flags.is_set(ENGINE_FLAG_INPUT) {
            self.world.counter = 0;
            let hovered = self.world.cursor.ini_under_cursor;
            match hovered {
                HOVER_PANEL_SWAP => {
                    self.world.inventory.set_previous_mode(InventoryMode::Primary);
                    self.world.inventory.set_mode(InventoryMode::Closed);
                    self.sync_item_actors();
                    return Ok(());
                }
                HOVER_BAG => {
                    self.world.inventory.set_previous_mode(InventoryMode::Primary);
                    self.world.inventory.set_mode(InventoryMode::Secondary);
                    self.sync_item_actors();
                    return Ok(());
                }
                0 => {
                    if self.world.cursor.holding_item() {
                        self.drop_item_at_cursor();
                    } else {
                        return self.run_object_scripts();
                    }
                }
                item => {
                    let verb = self.world.cursor.sequence_id;
                    if verb == 2 || verb == 4 {
                        self.pick_up_item(item);
                        return Ok(());
                    }
                    let mut env = self.env();
                    queue_interaction(&mut env, item, true)?;
                }
            }
        }
        self.drag_out_check()
    }

    fn secondary_mode_tick(&mut self) -> Result<()> {
        if self.world.buttons.inventory_up && self.world.flags.input_enabled() {
            self.world.counter = 0;
            let disabled = self.world.vars.get(VAR_INVENTORY_SWAP_DISABLED) == 1;
            self.world.inventory.swap_from_secondary(disabled);
            self.sync_item_actors();
            self.world.cursor.sequence_id = if self.world.cursor.holding_item() {
                CURSOR_SEQ_ITEM_IN_HAND
            } else {
                1
            };
            return Ok(());
        }
        if self.world.buttons.left_up && self.world.flags.is_set(ENGINE_FLAG_INPUT) {
            self.world.counter = 0;
            let hovered = self.world.cursor.ini_under_cursor;
            if hovered == HOVER_PANEL_SWAP {
                self.world.inventory.set_previous_mode(InventoryMode::Secondary);
                self.world.inventory.set_mode(InventoryMode::Primary);
                self.sync_item_actors();
                return Ok(());
            }
            let mut env = self.env();
            queue_interaction(&mut env, hovered, false)?;
        }
        self.run_object_scripts()
    }

    /// Dragging a held item off the panel area closes the panel.
    fn drag_out_check(&mut self) -> Result<()> {
        if !self.world.cursor.holding_item() {
            return self.run_object_scripts();
        }
        let inside = (10..310).contains(&self.world.cursor.x)
            && (10..190).contains(&self.world.cursor.y);
        if inside {
            return self.run_object_scripts();
        }
        self.world.cursor.sequence_id = CURSOR_SEQ_ITEM_IN_HAND;
        self.wait_for_frames(2)?;
        self.world.inventory.close_from_primary(false);
        self.sync_item_actors();
        Ok(())
    }

    /// Grab verb on a panel item: it moves into the hand and whatever was
    /// held drops into its slot.
    fn pick_up_item(&mut self, item: u16) {
        let Some(slot) = self.world.inventory.slot_of(item) else {
            return;
        };
        let previous = self.world.cursor.item_in_hand;
        self.world.inventory.set_item(slot, previous);
        self.world.cursor.item_in_hand = item;
        self.world.cursor.sequence_id = CURSOR_SEQ_ITEM_IN_HAND;
        self.sync_item_actors();
    }

    /// Dropping the held item onto a slot position swaps it in.
    fn drop_item_at_cursor(&mut self) {
        let Some(slot) = self.item_slot_under_cursor() else {
            return;
        };
        let previous = self.world.inventory.item_at(slot);
        let held = self.world.cursor.item_in_hand;
        self.world.inventory.set_item(slot, held);
        self.world.cursor.item_in_hand = previous;
        if previous == 0 && self.world.cursor.sequence_id == CURSOR_SEQ_ITEM_IN_HAND {
            self.world.cursor.sequence_id = 4;
        }
        self.sync_item_actors();
    }

    fn item_slot_under_cursor(&self) -> Option<usize> {
        let (x, y) = (self.world.cursor.x, self.world.cursor.y);
        (0..ITEM_SLOT_COUNT).find(|&slot| {
            let (sx, sy) = item_slot_position(slot);
            (sx - x).abs() <= 16 && (sy - y).abs() <= 12
        })
    }

    /// Lays the item icon actors over the open panel, or hides them when
    /// every panel is closed.
    fn sync_item_actors(&mut self) {
        let open = self.world.inventory.mode() != InventoryMode::Closed;
        for slot in 0..ITEM_SLOT_COUNT {
            let item = self.world.inventory.item_at(slot);
            let actor = self.world.actors.get_mut((ITEM_ACTOR_BASE + slot) as u16);
            if !open || item == 0 {
                actor.clear_flag(ACTOR_FLAG_READY | ACTOR_FLAG_VISIBLE);
                continue;
            }
            let (x, y) = item_slot_position(slot);
            actor.x = x;
            actor.y = y;
            actor.priority_layer = 6;
            actor.set_flag(
                ACTOR_FLAG_READY
                    | ACTOR_FLAG_VISIBLE
                    | ACTOR_FLAG_PRIORITY_OVERRIDE
                    | ACTOR_FLAG_NO_CLIP,
            );
            let index = (item - 1) as usize;
            if index < self.world.registry.len() {
                let icon_seq = self.world.registry.get(index).icon_seq;
                self.world
                    .actors
                    .get_mut((ITEM_ACTOR_BASE + slot) as u16)
                    .update_sequence(icon_seq * 2 + 10);
            }
        }
    }

    /// Countdown-armed object scripts, run with input suppressed and the
    /// flag word restored afterwards.
    fn run_object_scripts(&mut self) -> Result<()> {
        for index in 0..self.world.registry.len() {
            if self.world.registry.get(index).flags & INI_FLAG_SCRIPT_PENDING == 0 {
                continue;
            }
            self.world.registry.get_mut(index).flags &= !INI_FLAG_SCRIPT_PENDING;
            let saved = self.world.flags.engine_bits();
            self.world.flags.clear(ENGINE_FLAG_INPUT);
            let mut env = ScriptEnv {
                world: &mut self.world,
                res: &self.resources,
                backend: self.backend.as_mut(),
            };
            run_auto_entry(&mut env, (index + 1) as u16, 0)?;
            self.world.flags.restore_engine_bits(saved);
        }
        Ok(())
    }

    pub fn can_save(&self) -> bool {
        self.world.flags.input_enabled() && self.world.inventory.mode() == InventoryMode::Closed
    }

    pub fn save_game(&self, dir: &Path, slot: u8) -> Result<()> {
        ensure!(self.can_save(), "cannot save while input is held or a panel is open");
        write_slot(dir, slot, &SaveState::capture(&self.world))
    }

    pub fn load_game(&mut self, dir: &Path, slot: u8) -> Result<()> {
        let save = read_slot(dir, slot)?;
        self.load_scene(save.scene_id)?;
        save.apply(&mut self.world);
        Ok(())
    }
}

/// Fixed grid position of an item slot on the open panel.
fn item_slot_position(slot: usize) -> (i16, i16) {
    let col = (slot % 9) as i16;
    let row = (slot / 9) as i16;
    (20 + col * 32, 30 + row * 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_delay_is_drift_free() {
        let mut deadline = 0;
        // first call fires immediately and seeds the deadline
        assert_eq!(next_frame_delay(100, &mut deadline, 17), 0);
        assert_eq!(deadline, 117);
        // on-time caller sleeps out the remainder and keeps phase
        assert_eq!(next_frame_delay(110, &mut deadline, 17), 7);
        assert_eq!(deadline, 134);
        // an overrun fires at once and rebases
        assert_eq!(next_frame_delay(200, &mut deadline, 17), 0);
        assert_eq!(deadline, 217);
    }

    #[test]
    fn item_slots_tile_the_panel_without_overlap() {
        let mut seen = std::collections::BTreeSet::new();
        for slot in 0..ITEM_SLOT_COUNT {
            assert!(seen.insert(item_slot_position(slot)));
        }
    }
}
