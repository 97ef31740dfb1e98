use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Result, anyhow};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::obd;

/// The SEQ resource: actor sequence programs keyed by sequence id. Each
/// program is framed with the same 8-byte container header as OBD blobs.
#[derive(Debug, Clone)]
pub struct SeqTable {
    programs: BTreeMap<u16, Vec<u8>>,
}

impl SeqTable {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u16::<LittleEndian>()? as usize;

        let mut directory = Vec::with_capacity(count);
        for _ in 0..count {
            let sequence_id = cursor.read_u16::<LittleEndian>()?;
            let offset = cursor.read_u32::<LittleEndian>()? as usize;
            directory.push((sequence_id, offset));
        }

        let mut programs = BTreeMap::new();
        for (sequence_id, offset) in directory {
            let blob = read_framed(bytes, offset).ok_or_else(|| {
                anyhow!("SEQ program {sequence_id} at offset {offset} is out of bounds")
            })?;
            programs.insert(sequence_id, blob.to_vec());
        }
        Ok(SeqTable { programs })
    }

    pub fn empty() -> Self {
        SeqTable {
            programs: BTreeMap::new(),
        }
    }

    /// Used by synthetic fixtures; `program` is the unframed opcode stream.
    pub fn insert(&mut self, sequence_id: u16, program: &[u8]) {
        self.programs
            .insert(sequence_id, obd::build_blob(0, program));
    }

    pub fn contains(&self, sequence_id: u16) -> bool {
        self.programs.contains_key(&sequence_id)
    }

    /// Executable region of the sequence program. Missing sequences are a
    /// fatal asset error at the call site.
    pub fn program(&self, sequence_id: u16) -> Result<&[u8]> {
        let blob = self
            .programs
            .get(&sequence_id)
            .ok_or_else(|| anyhow!("no sequence program with id {sequence_id}"))?;
        obd::blob_program(blob)
    }
}

fn read_framed(bytes: &[u8], offset: usize) -> Option<&[u8]> {
    let header = bytes.get(offset..offset + obd::BLOB_HEADER_SIZE)?;
    let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    bytes.get(offset..offset + obd::BLOB_HEADER_SIZE + len)
}

/// Assembles a whole SEQ resource from (id, program) pairs (test fixtures).
pub fn build_seq(programs: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(programs.len() as u16).to_le_bytes());

    let directory_len = 2 + programs.len() * 6;
    let mut data_offset = directory_len;
    let mut blobs = Vec::new();
    for (sequence_id, program) in programs {
        let blob = obd::build_blob(0, program);
        out.extend_from_slice(&sequence_id.to_le_bytes());
        out.extend_from_slice(&(data_offset as u32).to_le_bytes());
        data_offset += blob.len();
        blobs.push(blob);
    }
    for blob in blobs {
        out.extend_from_slice(&blob);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directory_and_programs() {
        let raw = build_seq(&[(2, vec![0x01, 0x05, 0x00]), (0x30, vec![0x00])]);
        let seq = SeqTable::parse(&raw).unwrap();
        assert!(seq.contains(2));
        assert_eq!(seq.program(2).unwrap(), &[0x01, 0x05, 0x00]);
        assert_eq!(seq.program(0x30).unwrap(), &[0x00]);
        assert!(seq.program(9).is_err());
    }

    #[test]
    fn rejects_offset_outside_payload() {
        let mut raw = build_seq(&[(1, vec![0x00])]);
        raw[4] = 0xff;
        assert!(SeqTable::parse(&raw).is_err());
    }
}
