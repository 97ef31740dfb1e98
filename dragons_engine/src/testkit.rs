//! Shared fixtures for interpreter and dispatcher tests: a one-scene
//! world with the player record live plus one object record per supplied
//! script program.

use crate::registry::WorldRegistry;
use crate::resources::GameResources;
use crate::world::World;
use dragons_formats::img::build_img;
use dragons_formats::ini::build_ini;
use dragons_formats::obd::{build_blob, build_obd};
use dragons_formats::{ImgRegion, ImgTable, IniFile, IniRecord, ObdFile, RmsFile, SeqTable, VarTable};

pub const FIXTURE_SCENE: u16 = 1;

/// One handler entry: [mask][probe bits][reserved][body len][body].
pub fn entry(mask: u16, bits: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&mask.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Body that stores `value` into variable `var` and ends.
pub fn set_body(var: u16, value: u16) -> Vec<u8> {
    let mut out = vec![0x03];
    out.extend_from_slice(&var.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out.extend_from_slice(&[0x00, 0x00, 0x00]);
    out
}

pub fn env_fixture() -> (World, GameResources) {
    env_fixture_with_scripts(Vec::new())
}

/// Record 1 (index 0) is the player; each script program becomes object
/// record `i + 2` with its own unit-square region at tile (i+1, 0).
pub fn env_fixture_with_scripts(scripts: Vec<Vec<u8>>) -> (World, GameResources) {
    let mut regions = vec![ImgRegion {
        x: 0,
        y: 0,
        w: 0,
        h: 0,
        target_x: 64,
        target_y: 64,
    }];
    let mut records = vec![IniRecord {
        scene_id: FIXTURE_SCENE,
        img_id: 0,
        actor_resource_id: 0xe,
        ..IniRecord::empty()
    }];
    let mut opt = vec![build_blob(0, &[])];

    for (index, program) in scripts.iter().enumerate() {
        regions.push(ImgRegion {
            x: (index + 1) as u16,
            y: 0,
            w: 0,
            h: 0,
            target_x: (index + 1) as u16 * 32,
            target_y: 32,
        });
        records.push(IniRecord {
            scene_id: FIXTURE_SCENE,
            img_id: (index + 1) as u16,
            ..IniRecord::empty()
        });
        opt.push(build_blob(0, program));
    }

    let ini = IniFile::parse(&build_ini(&records)).unwrap();
    let res = GameResources::from_parts(
        ObdFile::parse(&build_obd(&opt, &[])).unwrap(),
        ImgTable::parse(&build_img(&regions)).unwrap(),
        ini.clone(),
        VarTable::zeroed(),
        RmsFile::empty(),
        SeqTable::empty(),
    );

    let mut world = World {
        scene_id: FIXTURE_SCENE,
        scene_id_back: FIXTURE_SCENE,
        registry: WorldRegistry::from_ini(&ini),
        ..World::default()
    };
    let actor = world
        .actors
        .activate(0xe, 100, 100, 0)
        .expect("empty pool has a free slot");
    world.registry.flicker_mut().actor = Some(actor);
    (world, res)
}
