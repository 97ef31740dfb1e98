use thiserror::Error;

/// Result code meaning "keep executing within this program". Any other
/// value halts the driving loop for the current invocation.
pub const RESULT_CONTINUE: u16 = 1;
/// Probe result bit: the program offers a committed body for this action.
pub const PROBE_HAS_BODY: u16 = 0x1;
/// Probe result bit: prefer the other participant's body if it has one.
pub const PROBE_DEFER: u16 = 0x2;

/// Fatal interpreter faults. All of these indicate a corrupted or
/// unsupported asset and propagate out of the frame loop; there is no
/// recovery tier.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("bytecode cursor ran past declared end ({offset} > {end})")]
    OutOfBounds { offset: usize, end: usize },
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("player record has no live actor")]
    MissingPlayerActor,
    #[error("script references object record {0} outside the table")]
    BadObjectRef(u16),
    #[error("script hand-off nesting exceeded {0} levels")]
    NestingTooDeep(usize),
}

/// One interpreter invocation: a read cursor over a program region, the
/// declared end bound, and the accumulated result code. Stack-allocated
/// per invocation; re-entrant hand-offs build a fresh call over another
/// region rather than sharing this one.
#[derive(Debug)]
pub struct ScriptCall<'a> {
    program: &'a [u8],
    pub ip: usize,
    pub end: usize,
    pub result: u16,
}

impl<'a> ScriptCall<'a> {
    /// Call over a whole program region (already stripped of its
    /// container header by `dragons_formats::obd::blob_program`).
    pub fn over(program: &'a [u8]) -> Self {
        ScriptCall {
            program,
            ip: 0,
            end: program.len(),
            result: RESULT_CONTINUE,
        }
    }

    /// Call over a sub-range of a program (committed bodies, step
    /// triggers). A sub-range lying outside the program is the same
    /// boundary fault as running off the end.
    pub fn over_range(program: &'a [u8], start: usize, len: usize) -> Result<Self, ScriptError> {
        let end = start.checked_add(len).filter(|&e| e <= program.len());
        let Some(end) = end else {
            return Err(ScriptError::OutOfBounds {
                offset: start.saturating_add(len),
                end: program.len(),
            });
        };
        Ok(ScriptCall {
            program,
            ip: start,
            end,
            result: RESULT_CONTINUE,
        })
    }

    pub fn program(&self) -> &'a [u8] {
        self.program
    }

    pub fn at_end(&self) -> bool {
        self.ip >= self.end
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ScriptError> {
        let next = self.ip.checked_add(len).filter(|&n| n <= self.end);
        let Some(next) = next else {
            return Err(ScriptError::OutOfBounds {
                offset: self.ip.saturating_add(len),
                end: self.end,
            });
        };
        let bytes = &self.program[self.ip..next];
        self.ip = next;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ScriptError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ScriptError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, ScriptError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> Result<i16, ScriptError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Branch target: absolute offset within this call's bounds. Jumping
    /// exactly to `end` is a normal termination on the next fetch.
    pub fn jump_to(&mut self, offset: u16) -> Result<(), ScriptError> {
        let offset = offset as usize;
        if offset > self.end {
            return Err(ScriptError::OutOfBounds {
                offset,
                end: self.end,
            });
        }
        self.ip = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_and_stop_at_declared_end() {
        let program = [0x01, 0x02, 0x03];
        let mut call = ScriptCall::over(&program);
        assert_eq!(call.read_u8().unwrap(), 0x01);
        assert_eq!(call.read_u16().unwrap(), 0x0302);
        assert!(call.at_end());
        assert!(matches!(
            call.read_u8(),
            Err(ScriptError::OutOfBounds { offset: 4, end: 3 })
        ));
    }

    #[test]
    fn sub_range_outside_program_is_a_boundary_fault() {
        let program = [0u8; 8];
        assert!(ScriptCall::over_range(&program, 4, 4).is_ok());
        assert!(ScriptCall::over_range(&program, 4, 5).is_err());
        assert!(ScriptCall::over_range(&program, usize::MAX, 2).is_err());
    }

    #[test]
    fn jump_rejects_targets_past_end() {
        let program = [0u8; 4];
        let mut call = ScriptCall::over(&program);
        call.jump_to(4).unwrap();
        assert!(call.at_end());
        assert!(call.jump_to(5).is_err());
    }
}
