//! Schema (b): concrete branch/index algorithms. A concrete condition is
//! taken unconditionally; a symbolic one delegates to schema (d) (the
//! `fork` module).

use symex_core::{Operator, Simplex, Value};

use crate::algo::fork::{fork_binary_branch, fork_table_switch};
use crate::algo::{Algorithm, StepContext};
use crate::error::Result;
use crate::state::State;

fn read_i16_be(state: &State, offset: i64) -> Result<i16> {
    let hi = state.get_instruction(offset)?;
    let lo = state.get_instruction(offset + 1)?;
    Ok(i16::from_be_bytes([hi, lo]))
}

fn read_i32_be(state: &State, offset: i64) -> Result<i32> {
    let b0 = state.get_instruction(offset)?;
    let b1 = state.get_instruction(offset + 1)?;
    let b2 = state.get_instruction(offset + 2)?;
    let b3 = state.get_instruction(offset + 3)?;
    Ok(i32::from_be_bytes([b0, b1, b2, b3]))
}

/// `goto`: unconditional jump by a signed 16-bit offset from the opcode's pc.
pub struct Goto;
impl Algorithm for Goto {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let offset = read_i16_be(state, 1)?;
        state.inc_pc(i32::from(offset))?;
        Ok(vec![])
    }
}

/// Shared `ifeq`/`ifne` logic: build `popped OP 0`, and take the concrete
/// branch directly or delegate to the fork schema for a symbolic result.
fn conditional_branch(state: &mut State, ctx: &mut StepContext, op: Operator) -> Result<Vec<State>> {
    let offset = read_i16_be(state, 1)?;
    let value = state.pop()?;
    let condition = state.calculator().binary(op, value, Value::Simplex(Simplex::Int(0)))?;
    match condition.as_simplex() {
        Some(Simplex::Boolean(true)) => {
            state.inc_pc(i32::from(offset))?;
            Ok(vec![])
        }
        Some(Simplex::Boolean(false)) => {
            state.inc_pc(3)?;
            Ok(vec![])
        }
        _ => fork_binary_branch(state, ctx, condition, i32::from(offset), 3),
    }
}

pub struct Ifeq;
impl Algorithm for Ifeq {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        conditional_branch(state, ctx, Operator::Eq)
    }
}

pub struct Ifne;
impl Algorithm for Ifne {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        conditional_branch(state, ctx, Operator::Ne)
    }
}

/// `tableswitch`: `low`(i32) `high`(i32) then `high - low + 1` jump offsets
/// (i32 each), all immediately following the opcode byte. A default offset
/// is not separately encoded here — out-of-range concrete keys fall
/// through to pc+1 (documented simplification; see `DESIGN.md`).
pub struct Tableswitch;
impl Algorithm for Tableswitch {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let low = read_i32_be(state, 1)?;
        let high = read_i32_be(state, 5)?;
        let key = state.pop()?;

        match key.as_simplex() {
            Some(Simplex::Int(k)) => {
                if k >= low && k <= high {
                    let index = (k - low) as i64;
                    let offset = read_i32_be(state, 9 + index * 4)?;
                    state.inc_pc(offset)?;
                } else {
                    state.inc_pc(1)?;
                }
                Ok(vec![])
            }
            _ => {
                let num_cases = (high - low + 1).max(0) as i64;
                let mut cases = Vec::with_capacity(num_cases as usize);
                for i in 0..num_cases {
                    let offset = read_i32_be(state, 9 + i * 4)?;
                    cases.push((low + i as i32, offset));
                }
                fork_table_switch(state, ctx, key, cases, 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_hierarchy::TestClassHierarchy;
    use crate::decision::TrivialDecisionProcedure;
    use crate::lics::LicsRules;
    use std::rc::Rc;
    use symex_core::{Calculator, Signature};

    fn ctx<'a>(dp: &'a mut TrivialDecisionProcedure, rules: &'a LicsRules) -> StepContext<'a> {
        StepContext {
            decision_procedure: dp,
            lics_rules: rules,
            heap_scope: None,
        }
    }

    fn state_with(code: Vec<u8>) -> State {
        State::new(
            Signature::new("pkg/Main", "()V", "main"),
            Rc::from(code),
            vec![],
            Rc::new(TestClassHierarchy::new()),
            Rc::new(Calculator::default()),
        )
    }

    #[test]
    fn goto_jumps_by_signed_offset() {
        let mut s = state_with(vec![0xa7, 0x00, 0x05, 0, 0, 0]);
        let mut dp = TrivialDecisionProcedure::default();
        let rules = LicsRules::default();
        Goto.exec(&mut s, &mut ctx(&mut dp, &rules)).unwrap();
        assert_eq!(s.thread_stack().current().unwrap().pc(), 5);
    }

    #[test]
    fn ifeq_takes_branch_on_concrete_zero() {
        let mut s = state_with(vec![0x99, 0x00, 0x04, 0, 0]);
        let mut dp = TrivialDecisionProcedure::default();
        let rules = LicsRules::default();
        s.push(Value::Simplex(Simplex::Int(0))).unwrap();
        Ifeq.exec(&mut s, &mut ctx(&mut dp, &rules)).unwrap();
        assert_eq!(s.thread_stack().current().unwrap().pc(), 4);
    }

    #[test]
    fn ifeq_falls_through_on_concrete_nonzero() {
        let mut s = state_with(vec![0x99, 0x00, 0x04, 0, 0]);
        let mut dp = TrivialDecisionProcedure::default();
        let rules = LicsRules::default();
        s.push(Value::Simplex(Simplex::Int(7))).unwrap();
        Ifeq.exec(&mut s, &mut ctx(&mut dp, &rules)).unwrap();
        assert_eq!(s.thread_stack().current().unwrap().pc(), 3);
    }
}
