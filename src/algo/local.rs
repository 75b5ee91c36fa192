//! Schema (a): purely local algorithms. No decision, no fork; consume
//! operands, produce operands and/or mutate the frame, advance pc by the
//! bytecode's fixed length.

use symex_core::{Operator, Simplex, Value};

use crate::algo::{Algorithm, StepContext};
use crate::error::{EngineError, Result};
use crate::state::State;

fn push_int_const(state: &mut State, value: i32) -> Result<Vec<State>> {
    state.push(Value::Simplex(Simplex::Int(value)))?;
    state.inc_pc(1)?;
    Ok(vec![])
}

pub struct Nop;
impl Algorithm for Nop {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

macro_rules! iconst_algorithm {
    ($name:ident, $value:expr) => {
        pub struct $name;
        impl Algorithm for $name {
            fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
                push_int_const(state, $value)
            }
        }
    };
}

iconst_algorithm!(IconstM1, -1);
iconst_algorithm!(Iconst0, 0);
iconst_algorithm!(Iconst1, 1);
iconst_algorithm!(Iconst2, 2);
iconst_algorithm!(Iconst3, 3);
iconst_algorithm!(Iconst4, 4);
iconst_algorithm!(Iconst5, 5);

/// `iload <index>`: a 1-byte opcode plus a 1-byte local-variable index,
/// widened to a 2-byte index by a preceding `wide`.
pub struct Iload;
impl Algorithm for Iload {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let wide = state.wide();
        let index = if wide {
            u32::from(state.get_instruction(1)?) << 8 | u32::from(state.get_instruction(2)?)
        } else {
            u32::from(state.get_instruction(1)?)
        };
        let value = state
            .thread_stack()
            .current()
            .and_then(|f| f.get_local(index))
            .cloned()
            .ok_or_else(|| EngineError::UnexpectedInternal(format!("local variable {index} not found")))?;
        state.push(value)?;
        state.set_wide(false);
        state.inc_pc(if wide { 4 } else { 2 })?;
        Ok(vec![])
    }
}

/// `istore <index>`, the mirror of [`Iload`].
pub struct Istore;
impl Algorithm for Istore {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let wide = state.wide();
        let index = if wide {
            u32::from(state.get_instruction(1)?) << 8 | u32::from(state.get_instruction(2)?)
        } else {
            u32::from(state.get_instruction(1)?)
        };
        let value = state.pop()?;
        let frame = state.thread_stack_mut().current_mut().ok_or(EngineError::ThreadStackEmpty)?;
        if !frame.set_local(index, value) {
            return Err(EngineError::UnexpectedInternal(format!("local variable {index} out of range")));
        }
        state.set_wide(false);
        state.inc_pc(if wide { 4 } else { 2 })?;
        Ok(vec![])
    }
}

pub struct Pop;
impl Algorithm for Pop {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        state.pop()?;
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

pub struct Dup;
impl Algorithm for Dup {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let top = state.top()?.clone();
        state.push(top)?;
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

pub struct Swap;
impl Algorithm for Swap {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let a = state.pop()?;
        let b = state.pop()?;
        state.push(a)?;
        state.push(b)?;
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

/// Sets the one-shot `wide` flag; the *next* instruction reads a 2-byte
/// local index instead of 1-byte and is responsible for clearing it.
pub struct Wide;
impl Algorithm for Wide {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        state.set_wide(true);
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

fn binary_arithmetic(state: &mut State, op: Operator) -> Result<Vec<State>> {
    let right = state.pop()?;
    let left = state.pop()?;
    let result = state.calculator().binary(op, left, right)?;
    state.push(result)?;
    state.inc_pc(1)?;
    Ok(vec![])
}

pub struct Iadd;
impl Algorithm for Iadd {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        binary_arithmetic(state, Operator::Add)
    }
}

pub struct Isub;
impl Algorithm for Isub {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        binary_arithmetic(state, Operator::Sub)
    }
}

pub struct Imul;
impl Algorithm for Imul {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        binary_arithmetic(state, Operator::Mul)
    }
}

pub struct Ineg;
impl Algorithm for Ineg {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let arg = state.pop()?;
        let result = state.calculator().unary(Operator::Neg, arg)?;
        state.push(result)?;
        state.inc_pc(1)?;
        Ok(vec![])
    }
}

/// `idiv`/`irem` stay in the local schema even though they can throw: only
/// a *concrete* zero divisor is ever tested (§4.1 rule 2), so no decision
/// point exists — a concrete zero throws `ArithmeticException` without a
/// fork, a symbolic divisor builds an expression like any other arithmetic.
fn checked_div_rem(state: &mut State, op: Operator) -> Result<Vec<State>> {
    let right = state.pop()?;
    let left = state.pop()?;
    let outcome = if op == Operator::Rem {
        state.calculator().rem(left, right)?
    } else {
        state.calculator().div(left, right)?
    };
    match outcome {
        symex_core::ArithmeticOutcome::Value(value) => {
            state.push(value)?;
            state.inc_pc(1)?;
        }
        symex_core::ArithmeticOutcome::DivisionByZero => {
            // pc is left unchanged: the throw walks frames for a handler.
            state.create_throwable_and_throw_it("java/lang/ArithmeticException")?;
        }
    }
    Ok(vec![])
}

pub struct Idiv;
impl Algorithm for Idiv {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        checked_div_rem(state, Operator::Div)
    }
}

pub struct Irem;
impl Algorithm for Irem {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        checked_div_rem(state, Operator::Rem)
    }
}

/// `return` (void): pop the current frame and resume the caller at its
/// `return_pc` — the pc `invokestatic` recorded before pushing this frame,
/// or the pc a `getstatic`/`putstatic` left unchanged (§4.3's `MustExit`
/// convention) so the triggering bytecode re-executes against the now
/// initialized class. An empty thread stack after the pop means the root
/// method itself returned.
pub struct Return;
impl Algorithm for Return {
    fn exec(&self, state: &mut State, _ctx: &mut StepContext) -> Result<Vec<State>> {
        let returned = state.thread_stack_mut().pop().ok_or(EngineError::ThreadStackEmpty)?;
        match state.thread_stack_mut().current_mut() {
            Some(caller) => {
                if !caller.set_pc(returned.return_pc()) {
                    return Err(EngineError::UnexpectedInternal(format!(
                        "return_pc {} out of range for caller frame",
                        returned.return_pc()
                    )));
                }
            }
            None => state.set_stuck(crate::state::Stuck::Return),
        }
        Ok(vec![])
    }
}
