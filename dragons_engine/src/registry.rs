use dragons_formats::{ImgTable, IniFile, IniRecord, INI_NO_ACTOR_RESOURCE};
use serde::Serialize;

// Behavior bits on an object record's flag word.
pub const INI_FLAG_AT_ACTOR_POS: u16 = 0x1;
pub const INI_FLAG_SCRIPT_PENDING: u16 = 0x10;
pub const INI_FLAG_SUPPRESS_INTERACTION: u16 = 0x4000;

/// Hover ids with this bit set are panel hit-targets, not object records.
pub const HOVER_NON_OBJECT: u16 = 0x8000;

/// The reserved player-controlled record index.
pub const FLICKER_RECORD: usize = 0;

/// One placed game entity: the decoded record plus the mutable state the
/// interpreter and scheduler work against for the lifetime of a scene.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInstance {
    pub scene_id: u16,
    pub img_id: u16,
    pub actor_resource_id: u16,
    pub icon_seq: u16,
    pub action_seq: i16,
    pub countdown: i16,
    pub target_dx: u16,
    pub target_dy: u16,
    pub variant: u16,
    pub flags: u16,
    /// Pool slot of the owned actor, if this record has one in the scene.
    pub actor: Option<u16>,
    /// Base pose the owned actor returns to after an interaction; -1 none.
    pub base_seq: i16,
}

impl ObjectInstance {
    pub fn from_record(record: &IniRecord) -> Self {
        ObjectInstance {
            scene_id: record.scene_id,
            img_id: record.img_id,
            actor_resource_id: record.actor_resource_id,
            icon_seq: record.icon_seq,
            action_seq: record.action_seq,
            countdown: record.countdown,
            target_dx: record.target_dx,
            target_dy: record.target_dy,
            variant: record.variant,
            flags: record.flags,
            actor: None,
            base_seq: -1,
        }
    }

    pub fn has_actor_resource(&self) -> bool {
        self.actor_resource_id != INI_NO_ACTOR_RESOURCE
    }
}

/// Fixed table of object instances, reloaded wholesale on scene change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldRegistry {
    records: Vec<ObjectInstance>,
}

impl WorldRegistry {
    pub fn from_ini(ini: &IniFile) -> Self {
        WorldRegistry {
            records: ini.records().iter().map(ObjectInstance::from_record).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> &ObjectInstance {
        &self.records[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut ObjectInstance {
        &mut self.records[index]
    }

    /// The player record. The INI parser guarantees at least one record,
    /// so this only panics on a registry that was never loaded; callers
    /// reachable before a scene load go through `World::flicker_in_scene`.
    pub fn flicker(&self) -> &ObjectInstance {
        &self.records[FLICKER_RECORD]
    }

    pub fn flicker_mut(&mut self) -> &mut ObjectInstance {
        &mut self.records[FLICKER_RECORD]
    }

    pub fn records(&self) -> &[ObjectInstance] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ObjectInstance] {
        &mut self.records
    }

    /// Per-tick countdown pass: records present in `scene_id` with a
    /// non-negative countdown tick down once; crossing below zero latches
    /// the script-pending bit exactly once. The floor is -1, so a fired
    /// countdown stays put until a script rearms it.
    pub fn tick_countdowns(&mut self, scene_id: u16) {
        for record in &mut self.records {
            if record.countdown >= 0 && record.scene_id == scene_id {
                record.countdown -= 1;
                if record.countdown < 0 {
                    record.flags |= INI_FLAG_SCRIPT_PENDING;
                }
            }
        }
    }

    /// Spec'd hover/target resolution: first record in table order whose
    /// region contains the tile wins; returns the 1-based record id, or 0
    /// for no match. Table order is the only tie-break.
    pub fn object_under_tile(&self, scene_id: u16, tile_x: i16, tile_y: i16, img: &ImgTable) -> u16 {
        for (index, record) in self.records.iter().enumerate() {
            if record.scene_id != scene_id || record.flags & INI_FLAG_SUPPRESS_INTERACTION != 0 {
                continue;
            }
            let Ok(region) = img.get(record.img_id) else {
                continue;
            };
            if region.contains_tile(tile_x, tile_y) {
                return (index + 1) as u16;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragons_formats::img::{build_img, ImgRegion};
    use dragons_formats::ini::build_ini;

    fn registry_with(records: Vec<IniRecord>) -> WorldRegistry {
        let ini = IniFile::parse(&build_ini(&records)).unwrap();
        WorldRegistry::from_ini(&ini)
    }

    fn overlap_fixture() -> (WorldRegistry, ImgTable) {
        let region = ImgRegion {
            x: 0,
            y: 0,
            w: 4,
            h: 4,
            target_x: 0,
            target_y: 0,
        };
        let img = ImgTable::parse(&build_img(&[region, region, region])).unwrap();
        let registry = registry_with(vec![
            IniRecord {
                scene_id: 1,
                img_id: 0,
                ..IniRecord::empty()
            },
            IniRecord {
                scene_id: 1,
                img_id: 1,
                ..IniRecord::empty()
            },
            IniRecord {
                scene_id: 1,
                img_id: 2,
                ..IniRecord::empty()
            },
        ]);
        (registry, img)
    }

    #[test]
    fn countdown_latches_pending_bit_exactly_once() {
        let mut registry = registry_with(vec![IniRecord {
            scene_id: 3,
            countdown: 1,
            ..IniRecord::empty()
        }]);

        registry.tick_countdowns(3);
        assert_eq!(registry.get(0).countdown, 0);
        assert_eq!(registry.get(0).flags & INI_FLAG_SCRIPT_PENDING, 0);

        registry.tick_countdowns(3);
        assert_eq!(registry.get(0).countdown, -1);
        assert!(registry.get(0).flags & INI_FLAG_SCRIPT_PENDING != 0);

        // simulate the dispatcher consuming the bit; further ticks must
        // neither decrement nor re-latch
        registry.get_mut(0).flags &= !INI_FLAG_SCRIPT_PENDING;
        for _ in 0..10 {
            registry.tick_countdowns(3);
        }
        assert_eq!(registry.get(0).countdown, -1);
        assert_eq!(registry.get(0).flags & INI_FLAG_SCRIPT_PENDING, 0);
    }

    #[test]
    fn countdown_only_ticks_in_current_scene() {
        let mut registry = registry_with(vec![IniRecord {
            scene_id: 3,
            countdown: 5,
            ..IniRecord::empty()
        }]);
        registry.tick_countdowns(4);
        assert_eq!(registry.get(0).countdown, 5);
    }

    #[test]
    fn hover_takes_first_match_in_table_order() {
        let (registry, img) = overlap_fixture();
        for _ in 0..3 {
            assert_eq!(registry.object_under_tile(1, 2, 2, &img), 1);
        }
    }

    #[test]
    fn hover_skips_suppressed_and_foreign_scene_records() {
        let (mut registry, img) = overlap_fixture();
        registry.get_mut(0).flags |= INI_FLAG_SUPPRESS_INTERACTION;
        registry.get_mut(1).scene_id = 9;
        assert_eq!(registry.object_under_tile(1, 2, 2, &img), 3);

        registry.get_mut(2).flags |= INI_FLAG_SUPPRESS_INTERACTION;
        assert_eq!(registry.object_under_tile(1, 2, 2, &img), 0);
    }
}
