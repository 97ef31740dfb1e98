use serde::Serialize;

/// Verb sequence ids the pointer cycles through. 0..=4 are the plain
/// verbs; 5 means "item in hand" and is entered by picking an item up,
/// never by cycling.
pub const CURSOR_SEQ_ITEM_IN_HAND: u16 = 5;
/// Verb id for the "look" action, consulted by the interaction fallback.
pub const CURSOR_SEQ_LOOK: u16 = 3;

/// On-screen pointer state: position, hovered record, held item, and the
/// sequence-id window selecting which cursor art band is shown.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CursorState {
    pub x: i16,
    pub y: i16,
    /// 1-based hovered record id; 0 none; `HOVER_NON_OBJECT` bit marks
    /// panel hit-targets.
    pub ini_under_cursor: u16,
    /// 1-based record id of the held inventory item, 0 for empty hand.
    pub item_in_hand: u16,
    pub sequence_id: u16,
    /// 0 or 5: offsets into the cursor art table when the hovered target
    /// accepts interaction.
    pub activation_offset: u16,
}

impl CursorState {
    /// Scene-load reset. The held item survives scene changes; the verb
    /// follows it.
    pub fn reset_for_scene(&mut self) {
        self.ini_under_cursor = 0;
        self.activation_offset = 0;
        self.sequence_id = if self.item_in_hand != 0 {
            CURSOR_SEQ_ITEM_IN_HAND
        } else {
            0
        };
    }

    pub fn update_position(&mut self, x: i16, y: i16) {
        self.x = x;
        self.y = y;
    }

    /// Right-button verb cycling, wrapping below zero. The item band is
    /// only reachable while something is held.
    pub fn select_previous_cursor(&mut self) {
        let top = if self.item_in_hand != 0 {
            CURSOR_SEQ_ITEM_IN_HAND
        } else {
            CURSOR_SEQ_ITEM_IN_HAND - 1
        };
        self.sequence_id = if self.sequence_id == 0 {
            top
        } else {
            self.sequence_id - 1
        };
    }

    pub fn holding_item(&self) -> bool {
        self.item_in_hand != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycling_wraps_through_verb_band() {
        let mut cursor = CursorState::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            cursor.select_previous_cursor();
            seen.push(cursor.sequence_id);
        }
        assert_eq!(seen, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn cycling_includes_item_band_only_when_holding() {
        let mut cursor = CursorState {
            item_in_hand: 7,
            ..CursorState::default()
        };
        cursor.select_previous_cursor();
        assert_eq!(cursor.sequence_id, CURSOR_SEQ_ITEM_IN_HAND);
    }

    #[test]
    fn scene_reset_keeps_held_item_verb() {
        let mut cursor = CursorState {
            item_in_hand: 3,
            sequence_id: 2,
            ini_under_cursor: 9,
            activation_offset: 5,
            ..CursorState::default()
        };
        cursor.reset_for_scene();
        assert_eq!(cursor.sequence_id, CURSOR_SEQ_ITEM_IN_HAND);
        assert_eq!(cursor.ini_under_cursor, 0);
        assert_eq!(cursor.activation_offset, 0);
    }
}
