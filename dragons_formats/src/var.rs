use std::io::Cursor;

use anyhow::{Result, ensure};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

/// Number of 16-bit variables in `dragon.var`.
pub const VAR_COUNT: usize = 100;

/// Variable used by the inventory toggle: value 1 forces the Primary panel
/// to close instead of swapping to the Secondary panel.
pub const VAR_INVENTORY_SWAP_DISABLED: u16 = 7;

/// The VAR resource: the fixed table of named 16-bit game variables.
#[derive(Debug, Clone, Serialize)]
pub struct VarTable {
    values: Vec<u16>,
}

impl Default for VarTable {
    fn default() -> Self {
        VarTable::zeroed()
    }
}

impl VarTable {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= VAR_COUNT * 2,
            "VAR table shorter than {VAR_COUNT} entries"
        );
        let mut cursor = Cursor::new(bytes);
        let mut values = Vec::with_capacity(VAR_COUNT);
        for _ in 0..VAR_COUNT {
            values.push(cursor.read_u16::<LittleEndian>()?);
        }
        Ok(VarTable { values })
    }

    pub fn zeroed() -> Self {
        VarTable {
            values: vec![0; VAR_COUNT],
        }
    }

    pub fn get(&self, id: u16) -> u16 {
        self.values.get(id as usize).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: u16, value: u16) {
        if let Some(slot) = self.values.get_mut(id as usize) {
            *slot = value;
        }
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn restore(&mut self, values: &[u16]) {
        for (slot, value) in self.values.iter_mut().zip(values) {
            *slot = *value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_reads_back() {
        let mut raw = Vec::new();
        for value in 0..VAR_COUNT as u16 {
            raw.extend_from_slice(&value.to_le_bytes());
        }
        let table = VarTable::parse(&raw).unwrap();
        assert_eq!(table.get(0), 0);
        assert_eq!(table.get(7), 7);
        // out-of-range reads are benign zeros, never faults
        assert_eq!(table.get(5000), 0);
    }

    #[test]
    fn set_ignores_out_of_range() {
        let mut table = VarTable::zeroed();
        table.set(1, 42);
        table.set(5000, 42);
        assert_eq!(table.get(1), 42);
    }

    #[test]
    fn rejects_short_table() {
        assert!(VarTable::parse(&[0u8; 10]).is_err());
    }
}
