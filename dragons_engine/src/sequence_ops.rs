use anyhow::{Result, bail};

use crate::actor::{ACTOR_FLAG_HALTED, ACTOR_FLAG_IDLE, Actor};
use crate::backend::Backend;
use crate::script::{RESULT_CONTINUE, ScriptCall, ScriptError};

/// Opcode budget for one re-entry; a program must yield a frame within
/// this many steps or it is looping forever.
const MAX_STEPS: usize = 1_000;

/// Runs one actor's sequence program from its persisted instruction
/// pointer until the program yields a frame, halts, or stops. The pointer
/// is written back so the next eligible tick resumes in place.
pub fn run_sequence(actor: &mut Actor, program: &[u8], backend: &mut dyn Backend) -> Result<()> {
    if actor.seq_ip > program.len() {
        return Err(ScriptError::OutOfBounds {
            offset: actor.seq_ip,
            end: program.len(),
        }
        .into());
    }
    let mut call = ScriptCall::over(program);
    call.ip = actor.seq_ip;

    let mut steps = 0;
    while call.result == RESULT_CONTINUE {
        if call.at_end() {
            // falling off the end is a completed one-shot program
            actor.set_flag(ACTOR_FLAG_IDLE);
            call.result = 0;
            break;
        }
        steps += 1;
        if steps > MAX_STEPS {
            bail!(
                "sequence {} looped for {MAX_STEPS} opcodes without yielding a frame",
                actor.sequence_id
            );
        }
        step(actor, &mut call, backend)?;
    }
    actor.seq_ip = call.ip;
    Ok(())
}

fn step(actor: &mut Actor, call: &mut ScriptCall, backend: &mut dyn Backend) -> Result<()> {
    let offset = call.ip;
    let opcode = call.read_u8()?;
    match opcode {
        // sequence complete; the actor idles until something restarts it
        0x00 => {
            actor.set_flag(ACTOR_FLAG_IDLE);
            call.result = 0;
        }
        // show a frame and yield for `delay` ticks
        0x01 => {
            let frame = call.read_u16()?;
            let delay = call.read_u8()?;
            actor.frame = frame;
            actor.sequence_timer = delay as u16;
            call.result = 0;
        }
        // teleport
        0x02 => {
            actor.x = call.read_i16()?;
            actor.y = call.read_i16()?;
        }
        // relative move
        0x03 => {
            let dx = call.read_i16()?;
            let dy = call.read_i16()?;
            actor.x += dx;
            actor.y += dy;
        }
        0x04 => {
            actor.priority_layer = call.read_u8()? as i16;
        }
        0x05 => {
            let bits = call.read_u16()?;
            actor.set_flag(bits);
        }
        0x06 => {
            let bits = call.read_u16()?;
            actor.clear_flag(bits);
        }
        // loop point
        0x07 => {
            let target = call.read_u16()?;
            call.jump_to(target)?;
        }
        0x08 => {
            let sound_id = call.read_u16()?;
            backend.play_sound(sound_id);
        }
        // yield without changing the frame
        0x09 => {
            actor.sequence_timer = call.read_u8()? as u16;
            call.result = 0;
        }
        // halt permanently; only an explicit restart revives the actor
        0x0a => {
            actor.set_flag(ACTOR_FLAG_HALTED);
            call.result = 0;
        }
        // switch to the queued base sequence, if one is set
        0x0b => {
            if actor.pending_sequence_id >= 0 {
                let next = actor.pending_sequence_id as u16;
                actor.update_sequence(next);
            } else {
                actor.set_flag(ACTOR_FLAG_IDLE);
            }
            call.result = 0;
        }
        _ => return Err(ScriptError::UnknownOpcode { opcode, offset }.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ACTOR_FLAG_READY;
    use crate::backend::NullBackend;

    fn ready_actor() -> Actor {
        let mut actor = Actor::default();
        actor.set_flag(ACTOR_FLAG_READY);
        actor.pending_sequence_id = -1;
        actor
    }

    #[test]
    fn frames_yield_and_resume_in_place() {
        // frame 1 for 2 ticks, frame 2 for 3 ticks, stop
        let program = [0x01, 1, 0, 2, 0x01, 2, 0, 3, 0x0a];
        let mut actor = ready_actor();
        let mut backend = NullBackend::default();

        run_sequence(&mut actor, &program, &mut backend).unwrap();
        assert_eq!((actor.frame, actor.sequence_timer), (1, 2));
        assert_eq!(actor.seq_ip, 4);

        run_sequence(&mut actor, &program, &mut backend).unwrap();
        assert_eq!((actor.frame, actor.sequence_timer), (2, 3));

        run_sequence(&mut actor, &program, &mut backend).unwrap();
        assert!(actor.is_flag_set(ACTOR_FLAG_HALTED));
    }

    #[test]
    fn loop_jump_replays_from_the_loop_point() {
        // frame 5, jump back to offset 0
        let program = [0x01, 5, 0, 1, 0x07, 0, 0];
        let mut actor = ready_actor();
        let mut backend = NullBackend::default();

        for _ in 0..3 {
            actor.frame = 0;
            run_sequence(&mut actor, &program, &mut backend).unwrap();
            assert_eq!(actor.frame, 5);
            assert_eq!(actor.sequence_timer, 1);
        }
    }

    #[test]
    fn loop_without_yield_is_fatal() {
        // jump-to-self never produces a frame
        let program = [0x07, 0, 0];
        let mut actor = ready_actor();
        let mut backend = NullBackend::default();
        let err = run_sequence(&mut actor, &program, &mut backend).unwrap_err();
        assert!(format!("{err:#}").contains("without yielding"));
    }

    #[test]
    fn switch_opcode_promotes_the_queued_sequence() {
        let program = [0x0b];
        let mut actor = ready_actor();
        actor.sequence_id = 4;
        actor.pending_sequence_id = 9;
        let mut backend = NullBackend::default();
        run_sequence(&mut actor, &program, &mut backend).unwrap();
        assert_eq!(actor.sequence_id, 9);
        assert!(actor.is_flag_set(crate::actor::ACTOR_FLAG_RESTART));
    }

    #[test]
    fn persisted_pointer_outside_program_is_a_boundary_fault() {
        let program = [0x00];
        let mut actor = ready_actor();
        actor.seq_ip = 5;
        let mut backend = NullBackend::default();
        assert!(run_sequence(&mut actor, &program, &mut backend).is_err());
    }
}
