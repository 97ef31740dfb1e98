use serde::Serialize;

// Engine-level condition bits. Names follow observed behavior; several are
// latched by scripts and only read back by other scripts.
pub const ENGINE_FLAG_PATHFINDING: u32 = 0x4;
pub const ENGINE_FLAG_INPUT: u32 = 0x8;
pub const ENGINE_FLAG_SCRIPTED_UPDATE: u32 = 0x20;
pub const ENGINE_FLAG_FADE_PENDING: u32 = 0x40;
pub const ENGINE_FLAG_BACKGROUND_ACTORS: u32 = 0x80;
pub const ENGINE_FLAG_INPUT_DISABLED: u32 = 0x400;
pub const ENGINE_FLAG_TALK_ACTIVE: u32 = 0x200000;
pub const ENGINE_FLAG_CUTSCENE: u32 = 0x2000_0000;
pub const ENGINE_FLAG_FIDGET: u32 = 0x8000_0000;

// Auxiliary flag set; only one bit has known semantics so far.
pub const ENGINE_UNK1_PAD_DISABLED: u32 = 0x8;
pub const ENGINE_UNK1_FADING: u32 = 0x2;

/// Baseline value every scene load resets the engine flags to.
pub const SCENE_BASELINE_FLAGS: u32 = (0x1046 & 0x1c0_7040) | 0x26;

/// The two process-wide bit sets: engine conditions and the auxiliary set.
/// Bits are only ever combined with OR / AND-NOT; predicates that involve
/// more than one bit live here as named helpers instead of raw masks at
/// call sites.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct FlagRegister {
    engine: u32,
    unk: u32,
}

impl FlagRegister {
    pub fn new() -> Self {
        FlagRegister::default()
    }

    pub fn reset_for_scene(&mut self) {
        self.engine = SCENE_BASELINE_FLAGS;
        self.unk = 0;
    }

    pub fn set(&mut self, bits: u32) {
        self.engine |= bits;
    }

    pub fn clear(&mut self, bits: u32) {
        self.engine &= !bits;
    }

    pub fn is_set(&self, bits: u32) -> bool {
        self.engine & bits != 0
    }

    pub fn engine_bits(&self) -> u32 {
        self.engine
    }

    /// Restores a snapshot taken before a nested script run.
    pub fn restore_engine_bits(&mut self, bits: u32) {
        self.engine = bits;
    }

    pub fn set_unk(&mut self, bits: u32) {
        self.unk |= bits;
    }

    pub fn clear_unk(&mut self, bits: u32) {
        self.unk &= !bits;
    }

    pub fn is_unk_set(&self, bits: u32) -> bool {
        self.unk & bits != 0
    }

    /// Input is enabled unless a cutscene holds it or a script disabled it.
    pub fn input_enabled(&self) -> bool {
        !self.is_set(ENGINE_FLAG_CUTSCENE) && !self.is_set(ENGINE_FLAG_INPUT_DISABLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_baseline_matches_boot_expression() {
        let mut flags = FlagRegister::new();
        flags.set(0xdead_beef);
        flags.reset_for_scene();
        assert_eq!(flags.engine_bits(), (0x1046 & 0x1c0_7040) | 0x26);
        assert!(!flags.is_unk_set(u32::MAX));
    }

    #[test]
    fn input_predicate_checks_both_disable_bits() {
        let mut flags = FlagRegister::new();
        assert!(flags.input_enabled());
        flags.set(ENGINE_FLAG_CUTSCENE);
        assert!(!flags.input_enabled());
        flags.clear(ENGINE_FLAG_CUTSCENE);
        flags.set(ENGINE_FLAG_INPUT_DISABLED);
        assert!(!flags.input_enabled());
    }

    #[test]
    fn set_and_clear_are_or_and_not() {
        let mut flags = FlagRegister::new();
        flags.set(ENGINE_FLAG_INPUT | ENGINE_FLAG_PATHFINDING);
        flags.clear(ENGINE_FLAG_INPUT);
        assert!(!flags.is_set(ENGINE_FLAG_INPUT));
        assert!(flags.is_set(ENGINE_FLAG_PATHFINDING));
    }
}
