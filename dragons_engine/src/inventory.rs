use serde::Serialize;

/// Number of item slots in the bag.
pub const ITEM_SLOT_COUNT: usize = 41;

/// Panel hit-target ids surfaced through `ini_under_cursor`.
pub const HOVER_PANEL_SWAP: u16 = 0x8001;
pub const HOVER_BAG: u16 = 0x8002;

/// Which panel (if any) is on screen. Gates the dispatcher's button
/// semantics and which scripts may run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InventoryMode {
    #[default]
    Closed,
    Primary,
    Secondary,
}

/// Tri-state inventory controller with a single-slot mode history (the
/// previous mode, not a stack) plus the bag's item array.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    mode: InventoryMode,
    previous_mode: InventoryMode,
    /// Bag animation state; scripts flip this between open/closed art.
    pub bag_sequence: u16,
    items: Vec<u16>,
}

impl Default for Inventory {
    fn default() -> Self {
        Inventory {
            mode: InventoryMode::Closed,
            previous_mode: InventoryMode::Closed,
            bag_sequence: 0,
            items: vec![0; ITEM_SLOT_COUNT],
        }
    }
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn reset_for_scene(&mut self) {
        self.mode = InventoryMode::Closed;
        self.previous_mode = InventoryMode::Closed;
        self.bag_sequence = 0;
    }

    pub fn mode(&self) -> InventoryMode {
        self.mode
    }

    pub fn previous_mode(&self) -> InventoryMode {
        self.previous_mode
    }

    pub fn set_mode(&mut self, mode: InventoryMode) {
        self.mode = mode;
    }

    pub fn set_previous_mode(&mut self, mode: InventoryMode) {
        self.previous_mode = mode;
    }

    /// Closed -> Primary on the inventory button. The swap-disable
    /// variable is read at the transition point; value 1 suppresses the
    /// panel entirely and leaves the mode untouched.
    pub fn open_from_closed(&mut self, swap_disabled: bool) -> bool {
        if swap_disabled {
            return false;
        }
        self.previous_mode = InventoryMode::Closed;
        self.mode = InventoryMode::Primary;
        true
    }

    /// Primary -> previous mode on the inventory button; the swap-disable
    /// variable forces Closed instead of returning to Secondary.
    pub fn close_from_primary(&mut self, swap_disabled: bool) {
        let target = if swap_disabled {
            InventoryMode::Closed
        } else {
            self.previous_mode
        };
        self.previous_mode = InventoryMode::Primary;
        self.mode = target;
    }

    /// Secondary -> Primary on the inventory button (mirror rule), with
    /// the swap-disable variable forcing Closed.
    pub fn swap_from_secondary(&mut self, swap_disabled: bool) {
        let target = if swap_disabled {
            InventoryMode::Closed
        } else {
            InventoryMode::Primary
        };
        self.previous_mode = InventoryMode::Secondary;
        self.mode = target;
    }

    pub fn item_at(&self, slot: usize) -> u16 {
        self.items[slot]
    }

    pub fn set_item(&mut self, slot: usize, item: u16) {
        self.items[slot] = item;
    }

    pub fn first_empty_slot(&self) -> Option<usize> {
        self.items.iter().position(|&item| item == 0)
    }

    pub fn slot_of(&self, item: u16) -> Option<usize> {
        self.items.iter().position(|&held| held == item)
    }

    pub fn clear_items(&mut self) {
        self.items.iter_mut().for_each(|item| *item = 0);
    }

    /// The bag art sits in the top-right corner in every mode, panel open
    /// or not; its hit-target is always live.
    pub fn bag_hit(x: i16, y: i16) -> bool {
        (288..=320).contains(&x) && (0..=16).contains(&y)
    }

    /// Fixed panel hit-targets tested before object hover while a panel is
    /// open: the swap button in the top-left corner, the bag in the
    /// top-right.
    pub fn panel_hit_target(&self, x: i16, y: i16) -> Option<u16> {
        if self.mode == InventoryMode::Closed {
            return None;
        }
        if (0..=32).contains(&x) && (0..=16).contains(&y) {
            return Some(HOVER_PANEL_SWAP);
        }
        if Self::bag_hit(x, y) {
            return Some(HOVER_BAG);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_round_trip_restores_pre_open_mode() {
        let mut inventory = Inventory::new();
        assert!(inventory.open_from_closed(false));
        assert_eq!(inventory.mode(), InventoryMode::Primary);
        inventory.close_from_primary(false);
        assert_eq!(inventory.mode(), InventoryMode::Closed);
        assert_eq!(inventory.previous_mode(), InventoryMode::Primary);
    }

    #[test]
    fn swap_disable_routes_primary_close_to_closed() {
        let mut inventory = Inventory::new();
        inventory.set_mode(InventoryMode::Primary);
        inventory.set_previous_mode(InventoryMode::Secondary);
        // with the variable clear, the close would return to Secondary
        inventory.close_from_primary(true);
        assert_eq!(inventory.mode(), InventoryMode::Closed);
    }

    #[test]
    fn swap_disable_suppresses_opening() {
        let mut inventory = Inventory::new();
        assert!(!inventory.open_from_closed(true));
        assert_eq!(inventory.mode(), InventoryMode::Closed);
    }

    #[test]
    fn secondary_swaps_back_to_primary() {
        let mut inventory = Inventory::new();
        inventory.set_mode(InventoryMode::Secondary);
        inventory.swap_from_secondary(false);
        assert_eq!(inventory.mode(), InventoryMode::Primary);
        assert_eq!(inventory.previous_mode(), InventoryMode::Secondary);
    }

    #[test]
    fn panel_hit_targets_only_exist_while_open() {
        let mut inventory = Inventory::new();
        assert_eq!(inventory.panel_hit_target(10, 10), None);
        inventory.set_mode(InventoryMode::Primary);
        assert_eq!(inventory.panel_hit_target(10, 10), Some(HOVER_PANEL_SWAP));
        assert_eq!(inventory.panel_hit_target(300, 4), Some(HOVER_BAG));
        assert_eq!(inventory.panel_hit_target(100, 100), None);
    }

    #[test]
    fn item_slots_store_and_find() {
        let mut inventory = Inventory::new();
        assert_eq!(inventory.first_empty_slot(), Some(0));
        inventory.set_item(0, 7);
        inventory.set_item(1, 9);
        assert_eq!(inventory.first_empty_slot(), Some(2));
        assert_eq!(inventory.slot_of(9), Some(1));
        assert_eq!(inventory.slot_of(42), None);
    }
}
