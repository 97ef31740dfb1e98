use serde::Serialize;

// Per-actor flag word. Bit names follow the behaviors the interpreter and
// scheduler key off; scripts may set others we only carry.
pub const ACTOR_FLAG_RESTART: u16 = 0x1;
pub const ACTOR_FLAG_IDLE: u16 = 0x4;
pub const ACTOR_FLAG_SUSPEND: u16 = 0x8;
pub const ACTOR_FLAG_WALKING: u16 = 0x10;
pub const ACTOR_FLAG_READY: u16 = 0x40;
pub const ACTOR_FLAG_VISIBLE: u16 = 0x80;
pub const ACTOR_FLAG_PRIORITY_OVERRIDE: u16 = 0x100;
pub const ACTOR_FLAG_NO_CLIP: u16 = 0x200;
pub const ACTOR_FLAG_HALTED: u16 = 0x400;
pub const ACTOR_FLAG_SNAP_TARGET: u16 = 0x800;
pub const ACTOR_FLAG_LOOPING: u16 = 0x1000;
pub const ACTOR_FLAG_MANUAL_SEQUENCE: u16 = 0x2000;

/// Total pool capacity.
pub const ACTOR_COUNT: usize = 64;
/// Slots below this are foreground actors, updated every tick; the rest
/// are background actors behind `ENGINE_FLAG_BACKGROUND_ACTORS`.
pub const FOREGROUND_ACTOR_COUNT: usize = 23;
/// First pool slot used for inventory item icons.
pub const ITEM_ACTOR_BASE: usize = FOREGROUND_ACTOR_COUNT;
/// Slots 0 and 1 carry the pointer and bag art; scene actors never land
/// there.
pub const UI_ACTOR_SLOTS: usize = 2;

/// Extended-range priority layers fold down into the visible 0..=8 band.
pub fn remap_priority(layer: i16) -> i16 {
    let mut layer = layer;
    if layer >= 0x11 {
        layer = 0;
    }
    if layer >= 9 {
        layer -= 8;
    }
    layer
}

/// One pool slot: position, active sequence program state, and the flag
/// word gating how the per-tick update treats it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Actor {
    pub x: i16,
    pub y: i16,
    pub resource_id: u16,
    pub flags: u16,
    pub priority_layer: i16,
    /// Frame currently shown, as selected by the sequence program.
    pub frame: u16,
    pub sequence_id: u16,
    /// Sequence queued to replace the active one once the actor idles;
    /// -1 means nothing queued.
    pub pending_sequence_id: i16,
    /// Byte offset of the next opcode within the active sequence program.
    pub seq_ip: usize,
    /// Ticks until the sequence program re-enters the interpreter.
    pub sequence_timer: u16,
    walk_target: Option<(i16, i16)>,
}

impl Actor {
    pub fn is_flag_set(&self, bits: u16) -> bool {
        self.flags & bits != 0
    }

    pub fn set_flag(&mut self, bits: u16) {
        self.flags |= bits;
    }

    pub fn clear_flag(&mut self, bits: u16) {
        self.flags &= !bits;
    }

    /// Switches to `sequence_id` at its first opcode on the next update.
    pub fn update_sequence(&mut self, sequence_id: u16) {
        self.sequence_id = sequence_id;
        self.set_flag(ACTOR_FLAG_RESTART);
        self.clear_flag(ACTOR_FLAG_IDLE);
    }

    /// Restart semantics: rewind the program counter and drop the control
    /// bits a fresh program must not inherit.
    pub fn restart_sequence(&mut self) {
        self.seq_ip = 0;
        self.sequence_timer = 0;
        self.clear_flag(ACTOR_FLAG_RESTART | ACTOR_FLAG_SUSPEND | ACTOR_FLAG_LOOPING);
    }

    /// Begins a straight-line walk toward a pixel target. The flag
    /// contract is what the interaction latch observes: WALKING while en
    /// route, IDLE once arrived.
    pub fn start_walk(&mut self, target_x: i16, target_y: i16) {
        self.walk_target = Some((target_x, target_y));
        self.set_flag(ACTOR_FLAG_WALKING);
        self.clear_flag(ACTOR_FLAG_IDLE);
    }

    pub fn is_walking(&self) -> bool {
        self.walk_target.is_some()
    }

    /// One tick of walk progress; call only while a target is set.
    pub fn walk_step(&mut self) {
        let Some((tx, ty)) = self.walk_target else {
            return;
        };
        self.x += (tx - self.x).clamp(-4, 4);
        self.y += (ty - self.y).clamp(-2, 2);
        if self.x == tx && self.y == ty {
            self.walk_target = None;
            self.clear_flag(ACTOR_FLAG_WALKING);
            self.set_flag(ACTOR_FLAG_IDLE);
        }
    }
}

/// Fixed-capacity actor pool. Slots are exclusively owned here; object
/// records refer to slots by index.
#[derive(Debug, Clone, Serialize)]
pub struct ActorPool {
    slots: Vec<Actor>,
}

impl Default for ActorPool {
    fn default() -> Self {
        ActorPool {
            slots: vec![Actor::default(); ACTOR_COUNT],
        }
    }
}

impl ActorPool {
    pub fn new() -> Self {
        ActorPool::default()
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = Actor::default();
        }
    }

    pub fn get(&self, id: u16) -> &Actor {
        &self.slots[id as usize]
    }

    pub fn get_mut(&mut self, id: u16) -> &mut Actor {
        &mut self.slots[id as usize]
    }

    /// Claims the first free foreground slot for a scene actor.
    pub fn activate(&mut self, resource_id: u16, x: i16, y: i16, sequence_id: u16) -> Option<u16> {
        let id = self.slots[UI_ACTOR_SLOTS..FOREGROUND_ACTOR_COUNT]
            .iter()
            .position(|slot| !slot.is_flag_set(ACTOR_FLAG_READY))
            .map(|index| index + UI_ACTOR_SLOTS)?
            as u16;
        let actor = self.get_mut(id);
        *actor = Actor {
            x,
            y,
            resource_id,
            flags: ACTOR_FLAG_READY | ACTOR_FLAG_VISIBLE,
            priority_layer: 0,
            frame: 0,
            sequence_id,
            pending_sequence_id: -1,
            seq_ip: 0,
            sequence_timer: 0,
            walk_target: None,
        };
        Some(id)
    }
}
