use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dragons_engine::backend::ScriptedEvents;
use dragons_engine::{Engine, GameResources, NullBackend};

/// Headless runner for the scripted game loop: boots a scene out of a
/// BIGF archive, ticks the frame loop, and optionally dumps the final
/// world state as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// BIGF archive holding the game data tables.
    #[arg(long)]
    bigfile: PathBuf,
    /// Scene to boot into; 0 boots the first playable scene.
    #[arg(long, default_value_t = 0)]
    scene: u16,
    /// Number of ticks to run.
    #[arg(long, default_value_t = 300)]
    frames: u64,
    /// Pace ticks at the real frame interval instead of running flat out.
    #[arg(long)]
    realtime: bool,
    /// Directory holding save slots.
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// Load this slot before running (requires --save-dir).
    #[arg(long)]
    load_slot: Option<u8>,
    /// Save to this slot after the run (requires --save-dir).
    #[arg(long)]
    save_slot: Option<u8>,
    /// Write the final world state as JSON to this path.
    #[arg(long)]
    state_json: Option<PathBuf>,
    /// Chatty progress logging on stderr.
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let resources = GameResources::load(&args.bigfile)?;

    let events = ScriptedEvents::new();
    let mut engine = Engine::new(resources, Box::new(NullBackend::default()), Box::new(events));
    engine.set_pacing(args.realtime);
    engine.set_verbose(args.verbose);

    match (&args.save_dir, args.load_slot) {
        (Some(dir), Some(slot)) => engine.load_game(dir, slot)?,
        (None, Some(_)) => anyhow::bail!("--load-slot requires --save-dir"),
        _ => engine.load_scene(args.scene)?,
    }

    engine.run_frames(args.frames)?;
    if args.verbose {
        eprintln!(
            "[dragons_engine] ran {} frames, scene {:#x}",
            args.frames, engine.world.scene_id
        );
    }

    match (&args.save_dir, args.save_slot) {
        (Some(dir), Some(slot)) => engine.save_game(dir, slot)?,
        (None, Some(_)) => anyhow::bail!("--save-slot requires --save-dir"),
        _ => {}
    }

    if let Some(path) = &args.state_json {
        let json = serde_json::to_string_pretty(&engine.world)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing world state to {}", path.display()))?;
    }
    Ok(())
}
