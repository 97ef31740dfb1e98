use anyhow::{Result, ensure};

use crate::actor::{ACTOR_FLAG_IDLE, ACTOR_FLAG_WALKING};
use crate::cursor::{CURSOR_SEQ_ITEM_IN_HAND, CURSOR_SEQ_LOOK};
use crate::flags::{ENGINE_FLAG_INPUT, ENGINE_FLAG_TALK_ACTIVE};
use crate::inventory::InventoryMode;
use crate::registry::INI_FLAG_AT_ACTOR_POS;
use crate::script::{PROBE_DEFER, ScriptError};
use crate::script_ops::{ACTION_AUTO, EntryProbe, ScriptEnv, run_entry, select_entry};
use crate::world::{LATCH_READY, LATCH_WALKING, PendingInteraction};
use dragons_formats::obd::{OBD_ATTR_NO_WALK, blob_attributes, blob_program};

/// Queues the click that just landed and starts the player moving. For an
/// item use the probe target swaps to the held item while the hovered
/// record is kept as the second participant. `walk_to_pending` selects
/// whether the walk aims at the post-swap target (panel clicks) or the
/// hovered record (scene clicks).
pub fn queue_interaction(env: &mut ScriptEnv, hovered: u16, walk_to_pending: bool) -> Result<()> {
    let action = env.world.cursor.sequence_id;
    let pending = if action >= CURSOR_SEQ_ITEM_IN_HAND {
        PendingInteraction {
            target: env.world.cursor.item_in_hand,
            action,
            second: hovered,
        }
    } else {
        PendingInteraction {
            target: hovered,
            action,
            second: 0,
        }
    };
    let walk_target = if walk_to_pending { pending.target } else { hovered };
    env.world.pending = Some(pending);
    walk_to_object(env, walk_target)?;
    if env.world.latch != 0 {
        env.world.flags.clear(ENGINE_FLAG_INPUT);
    }
    Ok(())
}

/// Moves the player toward a clicked record and sets the interaction
/// latch. Targets flagged no-walk, clicks while a panel is open, and
/// clicks during active dialogue all skip the walk and arm the latch
/// directly.
pub fn walk_to_object(env: &mut ScriptEnv, target_id: u16) -> Result<()> {
    let panel_open = env.world.inventory.mode() != InventoryMode::Closed;
    let talking = env.world.flags.is_set(ENGINE_FLAG_TALK_ACTIVE);

    if !env.world.flicker_in_scene() {
        env.world.latch = if target_id != 0 { LATCH_READY } else { 0 };
        return Ok(());
    }
    let actor_id = env.world.flicker_actor_id()?;

    if target_id == 0 {
        // empty ground click: walk to the pointer, nothing to resolve
        if !panel_open && !talking {
            let (x, y) = (env.world.cursor.x, env.world.cursor.y);
            env.world.actors.get_mut(actor_id).start_walk(x, y);
        }
        env.world.latch = 0;
        return Ok(());
    }

    let index = target_id
        .checked_sub(1)
        .map(usize::from)
        .filter(|&index| index < env.world.registry.len())
        .ok_or(ScriptError::BadObjectRef(target_id))?;
    let attributes = blob_attributes(env.res.obd.from_opt(index)?)?;

    if attributes & OBD_ATTR_NO_WALK == 0 && !panel_open && !talking {
        let record = env.world.registry.get(index);
        let destination = if record.flags & INI_FLAG_AT_ACTOR_POS != 0 {
            let Some(owned) = record.actor else {
                // positioned at its actor but owns none: nowhere to walk
                return Ok(());
            };
            let owned = env.world.actors.get(owned);
            (owned.x, owned.y)
        } else {
            // records that neither sit at an actor nor own an actor
            // resource have no walk destination at all; the click fizzles
            // without arming the latch
            if !record.has_actor_resource() {
                return Ok(());
            }
            let region = env.res.img.get(record.img_id)?;
            (region.target_x as i16, region.target_y as i16)
        };
        let record = env.world.registry.get(index);
        let x = destination.0.wrapping_add(record.target_dx as i16);
        let y = destination.1.wrapping_add(record.target_dy as i16);
        env.world.actors.get_mut(actor_id).start_walk(x, y);
        env.world.latch = LATCH_WALKING;
    } else if talking {
        env.world.latch = LATCH_READY;
    } else {
        // no walk needed: pose the player and arm the latch immediately
        let action_seq = env.world.registry.get(index).action_seq;
        env.world.registry.flicker_mut().base_seq = action_seq;
        let actor = env.world.actors.get_mut(actor_id);
        actor.clear_flag(ACTOR_FLAG_WALKING);
        actor.set_flag(ACTOR_FLAG_IDLE);
        actor.pending_sequence_id = action_seq;
        env.world.latch = LATCH_READY;
    }
    Ok(())
}

/// Resolves the queued interaction once the player has arrived: probes
/// both participants, commits at most one body, and falls back to the
/// default look when neither side volunteers.
pub fn resolve_interaction(env: &mut ScriptEnv) -> Result<()> {
    let Some(pending) = env.world.pending.take() else {
        return Ok(());
    };
    ensure!(pending.target > 0, "interaction resolved with no queued target");
    let res = env.res;
    let saved_input = env.world.flags.engine_bits() & ENGINE_FLAG_INPUT;

    let first_index = (pending.target - 1) as usize;
    let first_program = blob_program(res.obd.from_opt(first_index)?)?;
    let first_entry = select_entry(first_program, pending.action)?;
    let mut first_bits = first_entry.map(|entry| entry.bits).unwrap_or(0);

    let mut second: Option<(&[u8], EntryProbe)> = None;
    let mut second_bits = 0;
    if pending.action >= CURSOR_SEQ_ITEM_IN_HAND && pending.second != 0 {
        let program = blob_program(res.obd.from_opt((pending.second - 1) as usize)?)?;
        if let Some(entry) = select_entry(program, pending.action)? {
            second_bits = entry.bits;
            second = Some((program, entry));
        }
    }

    // the held item's body wins unless it defers to a willing object
    let mut chosen = if second_bits != 0 { second } else { None };
    if first_bits != 0
        && (first_bits & PROBE_DEFER == 0 || second_bits & PROBE_DEFER != 0 || second_bits == 0)
    {
        chosen = first_entry.map(|entry| (first_program, entry));
    }
    first_bits &= !PROBE_DEFER;

    let mut committed = 0;
    if let Some((program, entry)) = chosen {
        env.world.flags.clear(ENGINE_FLAG_INPUT);
        committed = run_entry(env, program, entry)?;
    }

    if committed & 1 == 0 {
        if pending.action == CURSOR_SEQ_LOOK {
            if let Some(extra) = select_entry(first_program, ACTION_AUTO)? {
                first_bits |= extra.bits & !PROBE_DEFER;
            }
        }
        if first_bits == 0
            && second_bits & !PROBE_DEFER == 0
            && pending.action < CURSOR_SEQ_ITEM_IN_HAND
        {
            default_walk_up(env)?;
        }
    }

    env.world.flags.set(saved_input);
    Ok(())
}

/// Default response when no script volunteered: the player just stands
/// and looks, returning to the record's action pose if it has one.
fn default_walk_up(env: &mut ScriptEnv) -> Result<()> {
    if !env.world.flicker_in_scene() {
        return Ok(());
    }
    let actor_id = env.world.flicker_actor_id()?;
    let action_seq = env.world.registry.flicker().action_seq;
    let actor = env.world.actors.get_mut(actor_id);
    actor.clear_flag(ACTOR_FLAG_WALKING);
    actor.set_flag(ACTOR_FLAG_IDLE);
    if action_seq != -1 {
        actor.pending_sequence_id = action_seq;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::script::PROBE_HAS_BODY;
    use crate::testkit::{entry, env_fixture_with_scripts, set_body};
    use crate::world::PendingInteraction;

    // verb 2 on record 2 whose script offers a body storing var 20 = 7
    #[test]
    fn committed_body_runs_with_input_suppressed_then_restored() {
        let body = set_body(20, 7);
        let scripts = vec![entry(1 << 2, PROBE_HAS_BODY, &body)];
        let (mut world, res) = env_fixture_with_scripts(scripts);
        world.flags.set(ENGINE_FLAG_INPUT);
        world.pending = Some(PendingInteraction {
            target: 2,
            action: 2,
            second: 0,
        });
        let mut backend = NullBackend::default();
        let mut env = ScriptEnv {
            world: &mut world,
            res: &res,
            backend: &mut backend,
        };
        resolve_interaction(&mut env).unwrap();
        assert_eq!(world.vars.get(20), 7);
        assert!(world.flags.is_set(ENGINE_FLAG_INPUT));
    }

    #[test]
    fn deferring_target_yields_to_willing_second_participant() {
        // record 2 (the held item) defers; record 3 (the object) commits
        let scripts = vec![
            entry(1 << 5, PROBE_HAS_BODY | PROBE_DEFER, &set_body(30, 1)),
            entry(1 << 5, PROBE_HAS_BODY, &set_body(30, 2)),
        ];
        let (mut world, res) = env_fixture_with_scripts(scripts);
        world.pending = Some(PendingInteraction {
            target: 2,
            action: 5,
            second: 3,
        });
        let mut backend = NullBackend::default();
        let mut env = ScriptEnv {
            world: &mut world,
            res: &res,
            backend: &mut backend,
        };
        resolve_interaction(&mut env).unwrap();
        assert_eq!(world.vars.get(30), 2);
    }

    #[test]
    fn unwilling_scripts_fall_back_to_default_look() {
        // record 2 has no entry for verb 2 at all
        let scripts = vec![entry(1 << 1, PROBE_HAS_BODY, &set_body(40, 1))];
        let (mut world, res) = env_fixture_with_scripts(scripts);
        let actor_id = world.flicker_actor_id().unwrap();
        world.actors.get_mut(actor_id).set_flag(ACTOR_FLAG_WALKING);
        world.pending = Some(PendingInteraction {
            target: 2,
            action: 2,
            second: 0,
        });
        let mut backend = NullBackend::default();
        let mut env = ScriptEnv {
            world: &mut world,
            res: &res,
            backend: &mut backend,
        };
        resolve_interaction(&mut env).unwrap();
        assert_eq!(world.vars.get(40), 0);
        let actor = world.actors.get(actor_id);
        assert!(!actor.is_flag_set(ACTOR_FLAG_WALKING));
        assert!(actor.is_flag_set(ACTOR_FLAG_IDLE));
    }

    #[test]
    fn click_on_record_without_actor_resource_fizzles() {
        let scripts = vec![entry(1 << 2, PROBE_HAS_BODY, &set_body(50, 1))];
        let (mut world, res) = env_fixture_with_scripts(scripts);
        world.flags.set(ENGINE_FLAG_INPUT);
        let actor_id = world.flicker_actor_id().unwrap();
        let mut backend = NullBackend::default();
        let mut env = ScriptEnv {
            world: &mut world,
            res: &res,
            backend: &mut backend,
        };
        // record 2 sits at its region, not at an actor, and owns no actor
        // resource: the click has nowhere to walk and must not arm the
        // latch or swallow input
        queue_interaction(&mut env, 2, false).unwrap();
        assert_eq!(world.latch, 0);
        assert!(!world.actors.get(actor_id).is_flag_set(ACTOR_FLAG_WALKING));
        assert!(world.flags.is_set(ENGINE_FLAG_INPUT));
    }

    #[test]
    fn resolving_without_a_queued_click_is_benign() {
        let (mut world, res) = env_fixture_with_scripts(vec![]);
        let mut backend = NullBackend::default();
        let mut env = ScriptEnv {
            world: &mut world,
            res: &res,
            backend: &mut backend,
        };
        resolve_interaction(&mut env).unwrap();
    }
}
