use std::path::Path;

use anyhow::{Context, Result};

use dragons_formats::bigfile::BigfileArchive;
use dragons_formats::img::ImgTable;
use dragons_formats::ini::IniFile;
use dragons_formats::obd::ObdFile;
use dragons_formats::rms::RmsFile;
use dragons_formats::seq::SeqTable;
use dragons_formats::var::VarTable;

/// Parsed game data, loaded once at startup and shared read-only by the
/// interpreters. Per-run mutable state lives in `World`.
pub struct GameResources {
    pub obd: ObdFile,
    pub img: ImgTable,
    pub ini: IniFile,
    pub vars: VarTable,
    pub rms: RmsFile,
    pub seq: SeqTable,
}

impl GameResources {
    /// Loads every table out of a BIGF archive on disk.
    pub fn load(archive_path: &Path) -> Result<Self> {
        let archive = BigfileArchive::open(archive_path)
            .with_context(|| format!("opening archive {}", archive_path.display()))?;
        let obd = ObdFile::parse(&archive.load("dragon.obd")?)
            .context("parsing object script table dragon.obd")?;
        let img = ImgTable::parse(&archive.load("dragon.img")?)
            .context("parsing region table dragon.img")?;
        let ini = IniFile::parse(&archive.load("dragon.ini")?)
            .context("parsing object record table dragon.ini")?;
        let vars = VarTable::parse(&archive.load("dragon.var")?)
            .context("parsing variable table dragon.var")?;
        let rms = RmsFile::parse(&archive.load("dragon.rms")?)
            .context("parsing priority grid table dragon.rms")?;
        let seq = SeqTable::parse(&archive.load("dragon.seq")?)
            .context("parsing sequence table dragon.seq")?;
        Ok(GameResources {
            obd,
            img,
            ini,
            vars,
            rms,
            seq,
        })
    }

    /// Assembles resources from already-parsed tables. Used by tests that
    /// build small in-memory worlds without an archive on disk.
    pub fn from_parts(
        obd: ObdFile,
        img: ImgTable,
        ini: IniFile,
        vars: VarTable,
        rms: RmsFile,
        seq: SeqTable,
    ) -> Self {
        GameResources {
            obd,
            img,
            ini,
            vars,
            rms,
            seq,
        }
    }
}
