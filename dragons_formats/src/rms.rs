use std::io::Cursor;

use anyhow::{Result, ensure};
use byteorder::{LittleEndian, ReadBytesExt};

/// Horizontal pixels per priority cell.
pub const TILE_WIDTH: u32 = 32;
/// Vertical pixels per priority cell.
pub const TILE_HEIGHT: u32 = 8;

#[derive(Debug, Clone)]
struct RoomGrid {
    scene_id: u16,
    cols: u16,
    rows: u16,
    cells: Vec<i8>,
}

/// The RMS resource: per-scene priority-layer grids sampled by pixel
/// position during the per-tick actor update.
#[derive(Debug, Clone)]
pub struct RmsFile {
    rooms: Vec<RoomGrid>,
}

impl RmsFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let room_count = cursor.read_u16::<LittleEndian>()? as usize;

        let mut rooms = Vec::with_capacity(room_count);
        for index in 0..room_count {
            let scene_id = cursor.read_u16::<LittleEndian>()?;
            let cols = cursor.read_u16::<LittleEndian>()?;
            let rows = cursor.read_u16::<LittleEndian>()?;
            let cell_count = cols as usize * rows as usize;
            let start = cursor.position() as usize;
            ensure!(
                bytes.len() >= start + cell_count,
                "RMS room {index} truncated: {cols}x{rows} cells declared"
            );
            let cells = bytes[start..start + cell_count]
                .iter()
                .map(|&b| b as i8)
                .collect();
            cursor.set_position((start + cell_count) as u64);
            rooms.push(RoomGrid {
                scene_id,
                cols,
                rows,
                cells,
            });
        }
        Ok(RmsFile { rooms })
    }

    pub fn empty() -> Self {
        RmsFile { rooms: Vec::new() }
    }

    /// Priority layer at a pixel position, -1 when the scene has no grid
    /// or the position falls outside it (the "no layer" sentinel).
    pub fn priority_at(&self, scene_id: u16, x: i16, y: i16) -> i16 {
        let Some(room) = self.rooms.iter().find(|room| room.scene_id == scene_id) else {
            return -1;
        };
        if x < 0 || y < 0 {
            return -1;
        }
        let col = x as u32 / TILE_WIDTH;
        let row = y as u32 / TILE_HEIGHT;
        if col >= room.cols as u32 || row >= room.rows as u32 {
            return -1;
        }
        room.cells[(row * room.cols as u32 + col) as usize] as i16
    }
}

/// Serializes one grid into the binary layout (test fixtures).
pub fn build_rms(scene_id: u16, cols: u16, rows: u16, cells: &[i8]) -> Vec<u8> {
    assert_eq!(cells.len(), cols as usize * rows as usize);
    let mut out = Vec::new();
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&scene_id.to_le_bytes());
    out.extend_from_slice(&cols.to_le_bytes());
    out.extend_from_slice(&rows.to_le_bytes());
    out.extend(cells.iter().map(|&c| c as u8));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_cells_by_pixel() {
        let raw = build_rms(5, 2, 2, &[1, 2, 3, -1]);
        let rms = RmsFile::parse(&raw).unwrap();
        assert_eq!(rms.priority_at(5, 0, 0), 1);
        assert_eq!(rms.priority_at(5, 33, 3), 2);
        assert_eq!(rms.priority_at(5, 10, 9), 3);
        assert_eq!(rms.priority_at(5, 40, 12), -1);
    }

    #[test]
    fn unknown_scene_and_out_of_range_yield_sentinel() {
        let rms = RmsFile::parse(&build_rms(5, 1, 1, &[4])).unwrap();
        assert_eq!(rms.priority_at(9, 0, 0), -1);
        assert_eq!(rms.priority_at(5, 200, 0), -1);
        assert_eq!(rms.priority_at(5, -5, 0), -1);
    }

    #[test]
    fn rejects_truncated_grid() {
        let mut raw = build_rms(5, 2, 2, &[1, 2, 3, 4]);
        raw.truncate(raw.len() - 1);
        assert!(RmsFile::parse(&raw).is_err());
    }
}
