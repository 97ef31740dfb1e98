use std::io::Cursor;

use anyhow::{Result, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

/// Sentinel for "this record never owns an actor".
pub const INI_NO_ACTOR_RESOURCE: u16 = 0xffff;

/// Decoded initial state for one object-instance record. Record 0 is the
/// reserved player ("flicker") record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IniRecord {
    pub scene_id: u16,
    pub img_id: u16,
    pub actor_resource_id: u16,
    /// Inventory icon sequence group; icon actors run `icon_seq * 2 + 10`.
    pub icon_seq: u16,
    /// Base/action sequence handed to the player when interacting; -1 none.
    pub action_seq: i16,
    /// Tick countdown toward a pending script run; negative means idle.
    pub countdown: i16,
    pub target_dx: u16,
    pub target_dy: u16,
    /// Free-form state word consulted by scene scripts (fidget variants).
    pub variant: u16,
    pub flags: u16,
}

/// The INI resource: the whole object-instance table for the game.
#[derive(Debug, Clone)]
pub struct IniFile {
    records: Vec<IniRecord>,
}

impl IniFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u16::<LittleEndian>()? as usize;
        ensure!(count >= 1, "INI table must contain the player record");
        ensure!(
            bytes.len() >= 2 + count * 20,
            "INI table truncated: {count} records declared"
        );

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(IniRecord {
                scene_id: cursor.read_u16::<LittleEndian>()?,
                img_id: cursor.read_u16::<LittleEndian>()?,
                actor_resource_id: cursor.read_u16::<LittleEndian>()?,
                icon_seq: cursor.read_u16::<LittleEndian>()?,
                action_seq: cursor.read_i16::<LittleEndian>()?,
                countdown: cursor.read_i16::<LittleEndian>()?,
                target_dx: cursor.read_u16::<LittleEndian>()?,
                target_dy: cursor.read_u16::<LittleEndian>()?,
                variant: cursor.read_u16::<LittleEndian>()?,
                flags: cursor.read_u16::<LittleEndian>()?,
            });
        }
        Ok(IniFile { records })
    }

    pub fn records(&self) -> &[IniRecord] {
        &self.records
    }
}

/// Serializes records into the binary table layout (test fixtures).
pub fn build_ini(records: &[IniRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    for record in records {
        out.extend_from_slice(&record.scene_id.to_le_bytes());
        out.extend_from_slice(&record.img_id.to_le_bytes());
        out.extend_from_slice(&record.actor_resource_id.to_le_bytes());
        out.extend_from_slice(&record.icon_seq.to_le_bytes());
        out.extend_from_slice(&record.action_seq.to_le_bytes());
        out.extend_from_slice(&record.countdown.to_le_bytes());
        out.extend_from_slice(&record.target_dx.to_le_bytes());
        out.extend_from_slice(&record.target_dy.to_le_bytes());
        out.extend_from_slice(&record.variant.to_le_bytes());
        out.extend_from_slice(&record.flags.to_le_bytes());
    }
    out
}

impl IniRecord {
    /// A blank record; fixtures override the fields they care about.
    pub fn empty() -> Self {
        IniRecord {
            scene_id: 0,
            img_id: 0,
            actor_resource_id: INI_NO_ACTOR_RESOURCE,
            icon_seq: 0,
            action_seq: -1,
            countdown: -1,
            target_dx: 0,
            target_dy: 0,
            variant: 0,
            flags: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_records() {
        let records = vec![
            IniRecord {
                scene_id: 0x12,
                actor_resource_id: 0xe,
                ..IniRecord::empty()
            },
            IniRecord {
                img_id: 3,
                countdown: 100,
                ..IniRecord::empty()
            },
        ];
        let parsed = IniFile::parse(&build_ini(&records)).unwrap();
        assert_eq!(parsed.records(), records.as_slice());
    }

    #[test]
    fn rejects_empty_table() {
        assert!(IniFile::parse(&0u16.to_le_bytes()).is_err());
    }
}
