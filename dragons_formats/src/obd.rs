use std::io::Cursor;

use anyhow::{Result, anyhow, bail, ensure};
use byteorder::{LittleEndian, ReadBytesExt};

/// Size of the container header in front of every script/sequence blob.
/// Byte 0..4 is the little-endian program length, byte 4..6 the attribute
/// flags word, byte 6..8 reserved. Execution always starts at +8.
pub const BLOB_HEADER_SIZE: usize = 8;

/// Attribute bit: the target can be used without walking up to it first.
pub const OBD_ATTR_NO_WALK: u16 = 0x8;
/// Attribute bit: stepping onto the object's region fires its sub-body.
pub const OBD_ATTR_STEP_TRIGGER: u16 = 0x10;

/// The OBD resource: one script blob per object record ("opt" table) plus
/// a short table of scene-level special scripts ("spt" table).
#[derive(Debug, Clone)]
pub struct ObdFile {
    opt: Vec<Vec<u8>>,
    spt: Vec<Vec<u8>>,
}

impl ObdFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let opt_count = cursor.read_u16::<LittleEndian>()? as usize;
        let spt_count = cursor.read_u16::<LittleEndian>()? as usize;

        let mut offsets = Vec::with_capacity(opt_count + spt_count);
        for _ in 0..opt_count + spt_count {
            offsets.push(cursor.read_u32::<LittleEndian>()? as usize);
        }

        let mut blobs = Vec::with_capacity(offsets.len());
        for (index, offset) in offsets.iter().enumerate() {
            let blob = read_blob(bytes, *offset)
                .ok_or_else(|| anyhow!("OBD blob {index} at offset {offset} is out of bounds"))?;
            blobs.push(blob.to_vec());
        }

        let spt = blobs.split_off(opt_count);
        Ok(ObdFile { opt: blobs, spt })
    }

    pub fn opt_count(&self) -> usize {
        self.opt.len()
    }

    /// Script blob for object record `index`, header included.
    pub fn from_opt(&self, index: usize) -> Result<&[u8]> {
        self.opt
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("no opt script for record {index}"))
    }

    /// Scene-level special script `index` (index 3 is the intro script).
    pub fn from_spt(&self, index: usize) -> Result<&[u8]> {
        self.spt
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("no spt script {index}"))
    }
}

fn read_blob(bytes: &[u8], offset: usize) -> Option<&[u8]> {
    let header = bytes.get(offset..offset + BLOB_HEADER_SIZE)?;
    let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    bytes.get(offset..offset + BLOB_HEADER_SIZE + len)
}

/// Attribute flags word at blob offset +4.
pub fn blob_attributes(blob: &[u8]) -> Result<u16> {
    ensure!(blob.len() >= BLOB_HEADER_SIZE, "script blob shorter than header");
    Ok(u16::from_le_bytes(blob[4..6].try_into().unwrap()))
}

/// The executable region `[8, 8 + len)` of a blob. Every call site starts
/// execution here; the declared length is authoritative and a lying header
/// is rejected up front.
pub fn blob_program(blob: &[u8]) -> Result<&[u8]> {
    ensure!(blob.len() >= BLOB_HEADER_SIZE, "script blob shorter than header");
    let len = u32::from_le_bytes(blob[0..4].try_into().unwrap()) as usize;
    let Some(program) = blob.get(BLOB_HEADER_SIZE..BLOB_HEADER_SIZE + len) else {
        bail!(
            "script blob declares {len} program bytes but only {} are present",
            blob.len() - BLOB_HEADER_SIZE
        );
    };
    Ok(program)
}

/// Frames `program` into a blob with the standard 8-byte container header.
pub fn build_blob(attributes: u16, program: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(BLOB_HEADER_SIZE + program.len());
    blob.extend_from_slice(&(program.len() as u32).to_le_bytes());
    blob.extend_from_slice(&attributes.to_le_bytes());
    blob.extend_from_slice(&0u16.to_le_bytes());
    blob.extend_from_slice(program);
    blob
}

/// Assembles a whole OBD resource from pre-framed blobs (test fixtures).
pub fn build_obd(opt: &[Vec<u8>], spt: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(opt.len() as u16).to_le_bytes());
    out.extend_from_slice(&(spt.len() as u16).to_le_bytes());

    let directory_len = 4 + (opt.len() + spt.len()) * 4;
    let mut data_offset = directory_len;
    for blob in opt.iter().chain(spt.iter()) {
        out.extend_from_slice(&(data_offset as u32).to_le_bytes());
        data_offset += blob.len();
    }
    for blob in opt.iter().chain(spt.iter()) {
        out.extend_from_slice(blob);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opt_and_spt_tables() {
        let opt = vec![build_blob(OBD_ATTR_NO_WALK, &[0x00]), build_blob(0, &[0x01, 0x02])];
        let spt = vec![build_blob(0, &[0x03])];
        let obd = ObdFile::parse(&build_obd(&opt, &spt)).unwrap();

        assert_eq!(obd.opt_count(), 2);
        assert_eq!(blob_attributes(obd.from_opt(0).unwrap()).unwrap(), OBD_ATTR_NO_WALK);
        assert_eq!(blob_program(obd.from_opt(1).unwrap()).unwrap(), &[0x01, 0x02]);
        assert_eq!(blob_program(obd.from_spt(0).unwrap()).unwrap(), &[0x03]);
        assert!(obd.from_opt(2).is_err());
    }

    #[test]
    fn rejects_blob_with_lying_length() {
        let mut blob = build_blob(0, &[0x00, 0x00, 0x00]);
        blob[0] = 200; // declared length exceeds the actual payload
        let err = blob_program(&blob).unwrap_err();
        assert!(format!("{err:#}").contains("200 program bytes"));
    }

    #[test]
    fn rejects_directory_pointing_outside_payload() {
        let opt = vec![build_blob(0, &[0x00])];
        let mut raw = build_obd(&opt, &[]);
        raw[4] = 0xff; // corrupt the first directory offset
        assert!(ObdFile::parse(&raw).is_err());
    }
}
