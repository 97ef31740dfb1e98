use anyhow::{Result, bail};

use crate::backend::Backend;
use crate::resources::GameResources;
use crate::script::{RESULT_CONTINUE, ScriptCall, ScriptError};
use crate::world::World;

/// Action id for script entries that run outside a player verb: countdown
/// scripts, step triggers, scene intro scripts.
pub const ACTION_AUTO: u16 = 15;

/// Deepest allowed script-to-script hand-off chain.
const MAX_HANDOFF_DEPTH: usize = 8;
/// Opcode budget for one invocation; a program still running past this
/// is looping without ever halting.
const MAX_STEPS: usize = 10_000;

/// Everything an opcode handler may touch. `res` is a plain reference so
/// handlers can hold program slices across nested runs while the world
/// stays mutably borrowed.
pub struct ScriptEnv<'a> {
    pub world: &'a mut World,
    pub res: &'a GameResources,
    pub backend: &'a mut dyn Backend,
}

/// A matched handler entry inside an object script program: the probe
/// result bits it advertises and the committed body region behind its
/// 8-byte entry header.
#[derive(Debug, Clone, Copy)]
pub struct EntryProbe {
    pub bits: u16,
    pub body_offset: usize,
    pub body_len: usize,
}

/// Probe pass: scans the program's handler entries for one whose action
/// mask covers `action`. Entries are [mask u16][probe bits u16][reserved
/// u16][body len u16][body]; the first match in stream order wins. Probing
/// commits nothing.
pub fn select_entry(program: &[u8], action: u16) -> Result<Option<EntryProbe>, ScriptError> {
    let mut call = ScriptCall::over(program);
    while !call.at_end() {
        let mask = call.read_u16()?;
        let bits = call.read_u16()?;
        let _reserved = call.read_u16()?;
        let body_len = call.read_u16()? as usize;
        let body_offset = call.ip;
        // validate the declared body against the region before skipping it
        let next = ScriptCall::over_range(program, body_offset, body_len)?.end;
        if mask & (1 << (action & 0xf)) != 0 {
            return Ok(Some(EntryProbe {
                bits,
                body_offset,
                body_len,
            }));
        }
        call.ip = next;
    }
    Ok(None)
}

/// Commits a matched entry's body.
pub fn run_entry(env: &mut ScriptEnv, program: &[u8], entry: EntryProbe) -> Result<u16> {
    let mut call = ScriptCall::over_range(program, entry.body_offset, entry.body_len)?;
    run_nested(env, &mut call, 0)
}

/// Selects and commits the auto entry of an object record's script, if it
/// has one. Countdown scripts and hand-offs both land here.
pub fn run_auto_entry(env: &mut ScriptEnv, record_id: u16, depth: usize) -> Result<u16> {
    let res = env.res;
    let index = record_id
        .checked_sub(1)
        .ok_or(ScriptError::BadObjectRef(record_id))? as usize;
    let blob = res
        .obd
        .from_opt(index)
        .map_err(|_| ScriptError::BadObjectRef(record_id))?;
    let program = dragons_formats::obd::blob_program(blob)?;
    let Some(entry) = select_entry(program, ACTION_AUTO)? else {
        return Ok(0);
    };
    let mut call = ScriptCall::over_range(program, entry.body_offset, entry.body_len)?;
    run_nested(env, &mut call, depth)
}

/// Drives one call until its program yields a non-continue result or runs
/// off its declared end.
pub fn run_script(env: &mut ScriptEnv, call: &mut ScriptCall) -> Result<u16> {
    run_nested(env, call, 0)
}

fn run_nested(env: &mut ScriptEnv, call: &mut ScriptCall, depth: usize) -> Result<u16> {
    if depth > MAX_HANDOFF_DEPTH {
        return Err(ScriptError::NestingTooDeep(depth).into());
    }
    let mut steps = 0;
    while call.result == RESULT_CONTINUE {
        if call.at_end() {
            call.result = 0;
            break;
        }
        steps += 1;
        if steps > MAX_STEPS {
            bail!("object script looped for {MAX_STEPS} opcodes without halting");
        }
        step(env, call, depth)?;
    }
    Ok(call.result)
}

fn step(env: &mut ScriptEnv, call: &mut ScriptCall, depth: usize) -> Result<()> {
    let offset = call.ip;
    let opcode = call.read_u8()?;
    match opcode {
        // end of body
        0x00 => {
            call.result = call.read_u16()?;
            if call.result == RESULT_CONTINUE {
                call.result = 0;
            }
        }
        // engine flag set / clear
        0x01 => {
            let bits = call.read_u32()?;
            env.world.flags.set(bits);
        }
        0x02 => {
            let bits = call.read_u32()?;
            env.world.flags.clear(bits);
        }
        // variable store
        0x03 => {
            let id = call.read_u16()?;
            let value = call.read_u16()?;
            env.world.vars.set(id, value);
        }
        // object record flag set / clear
        0x04 => {
            let record = record_ref(env, call)?;
            let bits = call.read_u16()?;
            env.world.registry.get_mut(record).flags |= bits;
        }
        0x05 => {
            let record = record_ref(env, call)?;
            let bits = call.read_u16()?;
            env.world.registry.get_mut(record).flags &= !bits;
        }
        // rearm a countdown
        0x06 => {
            let record = record_ref(env, call)?;
            let ticks = call.read_i16()?;
            env.world.registry.get_mut(record).countdown = ticks;
        }
        // launch a sequence on the record's actor; records without a live
        // actor absorb the request
        0x07 => {
            let record = record_ref(env, call)?;
            let sequence_id = call.read_u16()?;
            if let Some(actor_id) = env.world.registry.get(record).actor {
                env.world.actors.get_mut(actor_id).update_sequence(sequence_id);
            }
        }
        0x08 => {
            let sound_id = call.read_u16()?;
            env.backend.play_sound(sound_id);
        }
        // scene change: queued for the top of the next tick, halts this
        // program
        0x09 => {
            let scene_id = call.read_u16()?;
            env.world.pending_scene = Some(scene_id);
            call.result = 0;
        }
        0x0a => {
            let target = call.read_u16()?;
            call.jump_to(target)?;
        }
        // branch when a variable holds the given value
        0x0b => {
            let id = call.read_u16()?;
            let value = call.read_u16()?;
            let target = call.read_u16()?;
            if env.world.vars.get(id) == value {
                call.jump_to(target)?;
            }
        }
        // branch when the engine flag bits are all clear
        0x0c => {
            let bits = call.read_u32()?;
            let target = call.read_u16()?;
            if !env.world.flags.is_set(bits) {
                call.jump_to(target)?;
            }
        }
        // hand off to another record's auto entry
        0x0d => {
            let record_id = call.read_u16()?;
            run_auto_entry(env, record_id, depth + 1)?;
        }
        // nudge a record's walk-up target offset
        0x0e => {
            let record = record_ref(env, call)?;
            let dx = call.read_i16()?;
            let dy = call.read_i16()?;
            let instance = env.world.registry.get_mut(record);
            instance.target_dx = instance.target_dx.wrapping_add_signed(dx);
            instance.target_dy = instance.target_dy.wrapping_add_signed(dy);
        }
        // move the record's actor
        0x0f => {
            let record = record_ref(env, call)?;
            let x = call.read_i16()?;
            let y = call.read_i16()?;
            if let Some(actor_id) = env.world.registry.get(record).actor {
                let actor = env.world.actors.get_mut(actor_id);
                actor.x = x;
                actor.y = y;
            }
        }
        _ => return Err(ScriptError::UnknownOpcode { opcode, offset }.into()),
    }
    Ok(())
}

/// Reads a 1-based record operand and resolves it to a table index.
fn record_ref(env: &ScriptEnv, call: &mut ScriptCall) -> Result<usize, ScriptError> {
    let record_id = call.read_u16()?;
    let index = record_id
        .checked_sub(1)
        .map(usize::from)
        .filter(|&index| index < env.world.registry.len());
    index.ok_or(ScriptError::BadObjectRef(record_id))
}
