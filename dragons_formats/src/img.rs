use std::io::Cursor;

use anyhow::{Result, anyhow, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

/// Interaction region for one image resource: an axis-aligned box in tile
/// units (32x8 pixel cells) plus the pixel position an actor walks to when
/// the object is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImgRegion {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub target_x: u16,
    pub target_y: u16,
}

impl ImgRegion {
    /// Inclusive on both edges.
    pub fn contains_tile(&self, tile_x: i16, tile_y: i16) -> bool {
        tile_x >= self.x as i16
            && tile_x <= (self.x + self.w) as i16
            && tile_y >= self.y as i16
            && tile_y <= (self.y + self.h) as i16
    }
}

/// The IMG resource: region records indexed by image id.
#[derive(Debug, Clone)]
pub struct ImgTable {
    regions: Vec<ImgRegion>,
}

impl ImgTable {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u16::<LittleEndian>()? as usize;
        ensure!(
            bytes.len() >= 2 + count * 12,
            "IMG table truncated: {count} records declared"
        );

        let mut regions = Vec::with_capacity(count);
        for _ in 0..count {
            regions.push(ImgRegion {
                x: cursor.read_u16::<LittleEndian>()?,
                y: cursor.read_u16::<LittleEndian>()?,
                w: cursor.read_u16::<LittleEndian>()?,
                h: cursor.read_u16::<LittleEndian>()?,
                target_x: cursor.read_u16::<LittleEndian>()?,
                target_y: cursor.read_u16::<LittleEndian>()?,
            });
        }
        Ok(ImgTable { regions })
    }

    pub fn get(&self, img_id: u16) -> Result<&ImgRegion> {
        self.regions
            .get(img_id as usize)
            .ok_or_else(|| anyhow!("no IMG record with id {img_id}"))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Serializes regions back into the binary table layout (test fixtures).
pub fn build_img(regions: &[ImgRegion]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(regions.len() as u16).to_le_bytes());
    for region in regions {
        for field in [
            region.x,
            region.y,
            region.w,
            region.h,
            region.target_x,
            region.target_y,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_test_is_inclusive_on_both_edges() {
        let region = ImgRegion {
            x: 4,
            y: 2,
            w: 3,
            h: 5,
            target_x: 0,
            target_y: 0,
        };
        assert!(region.contains_tile(4, 2));
        assert!(region.contains_tile(7, 7));
        assert!(!region.contains_tile(8, 7));
        assert!(!region.contains_tile(4, 8));
        assert!(!region.contains_tile(3, 2));
    }

    #[test]
    fn parses_built_table() {
        let regions = vec![
            ImgRegion {
                x: 1,
                y: 2,
                w: 3,
                h: 4,
                target_x: 100,
                target_y: 50,
            },
            ImgRegion {
                x: 9,
                y: 9,
                w: 1,
                h: 1,
                target_x: 310,
                target_y: 90,
            },
        ];
        let table = ImgTable::parse(&build_img(&regions)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap(), &regions[1]);
        assert!(table.get(2).is_err());
    }

    #[test]
    fn rejects_truncated_table() {
        let mut raw = build_img(&[ImgRegion {
            x: 0,
            y: 0,
            w: 1,
            h: 1,
            target_x: 0,
            target_y: 0,
        }]);
        raw.truncate(raw.len() - 2);
        assert!(ImgTable::parse(&raw).is_err());
    }
}
