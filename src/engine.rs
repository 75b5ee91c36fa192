//! The engine: holds one state and drives it forward one bytecode at a
//! time, per §4.5.

use tracing::debug;

use crate::algo::{Algorithm, Opcode, StepContext};
use crate::algo::{access, branch, fork, local};
use crate::error::{EngineError, Result};
use crate::state::State;

fn algorithm_for(opcode: Opcode) -> &'static dyn Algorithm {
    use Opcode::*;
    match opcode {
        Nop => &local::Nop,
        IconstM1 => &local::IconstM1,
        Iconst0 => &local::Iconst0,
        Iconst1 => &local::Iconst1,
        Iconst2 => &local::Iconst2,
        Iconst3 => &local::Iconst3,
        Iconst4 => &local::Iconst4,
        Iconst5 => &local::Iconst5,
        Iload => &local::Iload,
        Iaload => &fork::Iaload,
        Istore => &local::Istore,
        Iastore => &fork::Iastore,
        Pop => &local::Pop,
        Dup => &local::Dup,
        Swap => &local::Swap,
        Iadd => &local::Iadd,
        Isub => &local::Isub,
        Imul => &local::Imul,
        Idiv => &local::Idiv,
        Irem => &local::Irem,
        Ineg => &local::Ineg,
        Return => &local::Return,
        Wide => &local::Wide,
        Goto => &branch::Goto,
        Ifeq => &branch::Ifeq,
        Ifne => &branch::Ifne,
        Tableswitch => &branch::Tableswitch,
        Getstatic => &access::Getstatic,
        Putstatic => &access::Putstatic,
        Getfield => &fork::Getfield,
        Putfield => &fork::Putfield,
        Invokestatic => &access::Invokestatic,
    }
}

/// One state's step/fork driver. Owns no policy (scope limits, hooks) —
/// that's the [`crate::runner::Runner`]'s job; the engine only knows how
/// to take one state one bytecode forward.
pub struct Engine<'a> {
    ctx: StepContext<'a>,
}

impl<'a> Engine<'a> {
    pub fn new(ctx: StepContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn ctx_mut(&mut self) -> &mut StepContext<'a> {
        &mut self.ctx
    }

    /// Advance `state` by exactly one bytecode. Returns the successor
    /// states produced by a fork (empty if `state` was mutated in place).
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn step(&mut self, state: &mut State) -> Result<Vec<State>> {
        if state.stuck().is_stuck() {
            return Ok(vec![]);
        }

        let opcode_byte = state.get_instruction(0)?;
        let Some(opcode) = Opcode::from_byte(opcode_byte) else {
            state.set_stuck(crate::state::Stuck::Unsupported(opcode_byte));
            return Err(EngineError::UnsupportedBytecode(opcode_byte));
        };

        debug!(?opcode, pc = ?state.thread_stack().current().map(|f| f.pc()), "step");
        let algorithm = algorithm_for(opcode);
        let successors = algorithm.exec(state, &mut self.ctx)?;
        state.increment_sequence_number();
        Ok(successors)
    }
}
