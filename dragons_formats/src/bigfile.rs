use std::fs::File;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use memmap2::{Mmap, MmapOptions};

const MAGIC: &[u8; 4] = b"BIGF";
const HEADER_SIZE: usize = 12;
const ENTRY_SIZE: usize = 16;

/// One named blob inside the bulk asset container.
#[derive(Debug, Clone)]
pub struct BigfileEntry {
    pub name: String,
    pub offset: u64,
    pub size: u32,
}

impl BigfileEntry {
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        let end = start + self.size as usize;
        start..end
    }
}

/// Memory-mapped view over `bigfile.dat`, the single archive holding every
/// resource table and script blob the engine loads.
#[derive(Debug)]
pub struct BigfileArchive {
    path: PathBuf,
    mmap: Mmap,
    entries: Vec<BigfileEntry>,
}

impl BigfileArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening bigfile at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping bigfile {}", path_buf.display()))?;

        let entries = parse_directory(&mmap)
            .with_context(|| format!("parsing bigfile directory {}", path_buf.display()))?;

        Ok(BigfileArchive {
            path: path_buf,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[BigfileEntry] {
        &self.entries
    }

    pub fn find_entry(&self, name: &str) -> Option<&BigfileEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Blob lookup used by every resource loader; absence of a required
    /// table is a hard error at load time, not at first access.
    pub fn load(&self, name: &str) -> Result<&[u8]> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| anyhow!("bigfile has no entry named {name}"))?;
        Ok(&self.mmap[entry.data_range()])
    }

    pub fn read_entry_bytes(&self, entry: &BigfileEntry) -> &[u8] {
        &self.mmap[entry.data_range()]
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &BigfileEntry, dest: P) -> Result<()> {
        let bytes = self.read_entry_bytes(entry);
        let mut file = File::create(dest.as_ref())
            .with_context(|| format!("creating {}", dest.as_ref().display()))?;
        file.write_all(bytes)
            .with_context(|| format!("writing {}", dest.as_ref().display()))?;
        Ok(())
    }
}

fn parse_directory(mmap: &Mmap) -> Result<Vec<BigfileEntry>> {
    ensure!(
        mmap.len() >= HEADER_SIZE,
        "bigfile is too small to contain a header"
    );

    if &mmap[0..4] != MAGIC {
        bail!("bigfile missing BIGF signature");
    }

    let entry_count = u32::from_le_bytes(mmap[4..8].try_into().unwrap()) as usize;
    let name_table_len = u32::from_le_bytes(mmap[8..12].try_into().unwrap()) as usize;

    let directory_len = entry_count
        .checked_mul(ENTRY_SIZE)
        .ok_or_else(|| anyhow!("bigfile entry count overflow"))?;
    let names_offset = HEADER_SIZE + directory_len;
    let names_end = names_offset
        .checked_add(name_table_len)
        .ok_or_else(|| anyhow!("bigfile name table overflow"))?;
    ensure!(names_end <= mmap.len(), "bigfile truncated before name table");

    let names_block = &mmap[names_offset..names_end];
    let mut entries = Vec::with_capacity(entry_count);

    for index in 0..entry_count {
        let base = HEADER_SIZE + index * ENTRY_SIZE;
        let raw = &mmap[base..base + ENTRY_SIZE];

        let name_offset = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
        let data_offset = u32::from_le_bytes(raw[4..8].try_into().unwrap()) as usize;
        let size = u32::from_le_bytes(raw[8..12].try_into().unwrap());

        ensure!(
            name_offset < name_table_len,
            "bigfile entry {index} has invalid name offset {name_offset}"
        );
        let data_end = data_offset
            .checked_add(size as usize)
            .ok_or_else(|| anyhow!("bigfile entry {index} size overflow"))?;
        ensure!(
            data_end <= mmap.len(),
            "bigfile entry {index} data extends beyond file"
        );

        let name = read_c_string(names_block, name_offset)
            .with_context(|| format!("reading name for entry {index}"))?;

        entries.push(BigfileEntry {
            name,
            offset: data_offset as u64,
            size,
        });
    }

    Ok(entries)
}

fn read_c_string(table: &[u8], offset: usize) -> Result<String> {
    let mut end = offset;
    while end < table.len() && table[end] != 0 {
        end += 1;
    }
    ensure!(end > offset, "empty bigfile entry name");
    Ok(String::from_utf8_lossy(&table[offset..end]).into_owned())
}

/// Builds an archive image in memory; shared by the format tests and the
/// engine's synthetic fixtures.
pub fn build_archive(blobs: &[(&str, &[u8])]) -> Vec<u8> {
    let mut names = Vec::new();
    let mut name_offsets = Vec::new();
    for (name, _) in blobs {
        name_offsets.push(names.len() as u32);
        names.extend_from_slice(name.as_bytes());
        names.push(0);
    }

    let data_start = HEADER_SIZE + blobs.len() * ENTRY_SIZE + names.len();
    let mut data = Vec::new();
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(blobs.len() as u32).to_le_bytes());
    out.extend_from_slice(&(names.len() as u32).to_le_bytes());

    for (index, (_, blob)) in blobs.iter().enumerate() {
        out.extend_from_slice(&name_offsets[index].to_le_bytes());
        out.extend_from_slice(&((data_start + data.len()) as u32).to_le_bytes());
        out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(blob);
    }

    out.extend_from_slice(&names);
    out.extend_from_slice(&data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_named_blobs() {
        let image = build_archive(&[
            ("dragon.var", b"AAAA".as_slice()),
            ("dragon.obd", b"script-bytes".as_slice()),
        ]);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();

        let archive = BigfileArchive::open(file.path()).unwrap();
        assert_eq!(archive.entries().len(), 2);
        assert_eq!(archive.load("dragon.obd").unwrap(), b"script-bytes");
        // lookup is case-insensitive
        assert_eq!(archive.load("DRAGON.VAR").unwrap(), b"AAAA");
        assert!(archive.load("dragon.rms").is_err());
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"LABN\0\0\0\0\0\0\0\0").unwrap();
        let err = BigfileArchive::open(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("BIGF"));
    }

    #[test]
    fn rejects_truncated_blob() {
        let mut image = build_archive(&[("dragon.img", b"12345678".as_slice())]);
        image.truncate(image.len() - 4);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();
        assert!(BigfileArchive::open(file.path()).is_err());
    }
}
