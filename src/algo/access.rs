//! Schema (c): static field/method access. Resolution and lazy class
//! initialization are the resolver's job; these algorithms decode the
//! constant-pool operand, call the resolver, and apply the `MustExit`
//! convention (pc does not advance, so `<clinit>` returning re-executes the
//! same bytecode). `getfield`/`putfield` live in `fork` instead: an
//! instance field access needs the receiver resolved first (schema d), not
//! just the declaring class initialized.

use std::rc::Rc;

use symex_core::{Signature, Value};

use crate::algo::{Algorithm, StepContext};
use crate::class_hierarchy::MethodInfo;
use crate::error::{EngineError, Result};
use crate::frame::Frame;
use crate::resolver::{self, KlassInitOutcome};
use crate::state::State;

pub(crate) fn read_u16_be(state: &State, offset: i64) -> Result<u16> {
    let hi = state.get_instruction(offset)?;
    let lo = state.get_instruction(offset + 1)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

/// The `MethodInfo` for the frame currently executing, looked up through
/// the class hierarchy rather than cached on `Frame` (keeps `Frame` a pure
/// execution record).
fn current_method(state: &State) -> Result<MethodInfo> {
    let sig = state.current_signature()?.clone();
    state
        .class_hierarchy()
        .get_class_file(&sig.class_name)?
        .find_method(&sig.member_name, &sig.descriptor)
        .cloned()
        .ok_or_else(|| EngineError::UnexpectedInternal(format!("current method {sig} not found")))
}

pub(crate) fn constant_pool_signature(state: &State, index: u16) -> Result<Signature> {
    current_method(state)?
        .constant_pool_signature(index)
        .cloned()
        .ok_or_else(|| EngineError::UnexpectedInternal(format!("constant pool index {index} out of range")))
}

/// Count the parameter types in a method descriptor's `(...)` segment:
/// each primitive code is one argument, each `L...;` is one argument
/// regardless of length, and a leading run of `[` doesn't add a separate
/// argument (it just marks the element type as an array).
fn parameter_count(descriptor: &str) -> usize {
    let params = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .unwrap_or("");
    let mut count = 0;
    let mut chars = params.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                count += 1;
            }
            _ => count += 1,
        }
    }
    count
}

/// `getstatic`: the compile-time-constant carve-out reads `constant_value`
/// directly, never forcing `<clinit>`; otherwise resolve, initialize if
/// needed, and (on `MustExit`) stop without advancing pc.
pub struct Getstatic;
impl Algorithm for Getstatic {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = read_u16_be(state, 1)?;
        let signature = constant_pool_signature(state, index)?;
        let current_class = state.current_signature()?.class_name.clone();

        let field_info = state
            .class_hierarchy()
            .get_class_file(&signature.class_name)?
            .find_field(&signature.member_name)
            .cloned();
        if let Some(field_info) = &field_info
            && let Some(constant) = &field_info.constant_value
        {
            state.push(Value::Simplex(constant.clone()))?;
            state.inc_pc(3)?;
            return Ok(vec![]);
        }

        let (resolved, outcome) =
            resolver::resolve_field(state, &current_class, &signature, true, ctx.decision_procedure)?;
        if outcome == KlassInitOutcome::MustExit {
            return Ok(vec![]);
        }
        let klass = state
            .get_klass(&resolved.signature.class_name)
            .ok_or_else(|| EngineError::UnexpectedInternal(format!("{} not initialized", resolved.signature.class_name)))?;
        let value = klass
            .get_field_value(&resolved.signature)
            .cloned()
            .unwrap_or(Value::Null);
        state.push(value)?;
        state.inc_pc(3)?;
        Ok(vec![])
    }
}

pub struct Putstatic;
impl Algorithm for Putstatic {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = read_u16_be(state, 1)?;
        let signature = constant_pool_signature(state, index)?;
        let current_class = state.current_signature()?.class_name.clone();

        let (resolved, outcome) =
            resolver::resolve_field(state, &current_class, &signature, true, ctx.decision_procedure)?;
        if outcome == KlassInitOutcome::MustExit {
            return Ok(vec![]);
        }
        let value = state.pop()?;
        let klass = state
            .get_klass_mut(&resolved.signature.class_name)
            .ok_or_else(|| EngineError::UnexpectedInternal(format!("{} not initialized", resolved.signature.class_name)))?;
        klass.put_field_value(resolved.signature, value)?;
        state.inc_pc(3)?;
        Ok(vec![])
    }
}

/// `invokestatic`: resolve the callee, initialize its declaring class if
/// needed, then push a fresh frame seeded with the popped arguments.
/// Full virtual dispatch is not re-derived here — method resolution is the
/// oracle's job (§4.2).
pub struct Invokestatic;
impl Algorithm for Invokestatic {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = read_u16_be(state, 1)?;
        let signature = constant_pool_signature(state, index)?;
        let current_class = state.current_signature()?.class_name.clone();

        let (resolved, outcome) =
            resolver::resolve_method(state, &current_class, &signature, false, ctx.decision_procedure)?;
        if outcome == KlassInitOutcome::MustExit {
            return Ok(vec![]);
        }

        let arg_count = parameter_count(&resolved.signature.descriptor);
        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(state.pop()?);
        }
        args.reverse();

        let code = resolved
            .info
            .code
            .clone()
            .ok_or_else(|| EngineError::CannotInvokeNative(resolved.signature.to_string()))?;
        let mut locals = vec![Value::Null; resolved.info.max_locals as usize];
        for (i, arg) in args.into_iter().enumerate() {
            if let Some(slot) = locals.get_mut(i) {
                *slot = arg;
            }
        }
        let return_pc = {
            let frame = state.thread_stack().current().ok_or(EngineError::ThreadStackEmpty)?;
            frame.pc() + 3
        };
        state
            .thread_stack_mut()
            .push(Frame::new(resolved.signature, code, locals, return_pc));
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_hierarchy::{AccessFlags, ClassFile, FieldInfo, TestClassHierarchy};
    use crate::decision::TrivialDecisionProcedure;
    use crate::lics::LicsRules;
    use std::rc::Rc;
    use symex_core::{Calculator, Simplex};

    fn ctx<'a>(dp: &'a mut TrivialDecisionProcedure, rules: &'a LicsRules) -> StepContext<'a> {
        StepContext {
            decision_procedure: dp,
            lics_rules: rules,
            heap_scope: None,
        }
    }

    #[test]
    fn getstatic_reads_compile_time_constant_without_clinit() {
        let field_sig = Signature::new("pkg/K", "I", "LIMIT");
        let main_sig = Signature::new("pkg/Main", "()V", "main");
        let hierarchy = TestClassHierarchy::new()
            .with_class(ClassFile {
                name: Rc::from("pkg/K"),
                super_class: None,
                interfaces: vec![],
                fields: vec![FieldInfo {
                    signature: field_sig.clone(),
                    access_flags: AccessFlags::STATIC | AccessFlags::FINAL,
                    constant_value: Some(Simplex::Int(42)),
                }],
                methods: vec![],
                access_flags: AccessFlags::PUBLIC,
            })
            .with_class(ClassFile {
                name: Rc::from("pkg/Main"),
                super_class: None,
                interfaces: vec![],
                fields: vec![],
                methods: vec![MethodInfo {
                    signature: main_sig.clone(),
                    access_flags: AccessFlags::STATIC,
                    code: Some(Rc::from(vec![0xb2u8, 0x00, 0x00])),
                    max_locals: 0,
                    handlers: vec![],
                    constant_pool: vec![field_sig],
                }],
                access_flags: AccessFlags::PUBLIC,
            });

        let mut state = State::new(
            main_sig,
            Rc::from(vec![0xb2u8, 0x00, 0x00]),
            vec![],
            Rc::new(hierarchy),
            Rc::new(Calculator::default()),
        );
        let mut dp = TrivialDecisionProcedure::default();
        let rules = LicsRules::default();

        Getstatic.exec(&mut state, &mut ctx(&mut dp, &rules)).unwrap();
        assert_eq!(state.pop().unwrap(), Value::Simplex(Simplex::Int(42)));
        assert_eq!(state.thread_stack().current().unwrap().pc(), 3);
        assert!(state.get_klass("pkg/K").is_none());
    }

    #[test]
    fn getstatic_triggers_clinit_without_advancing_pc() {
        let field_sig = Signature::new("pkg/K", "D", "total");
        let main_sig = Signature::new("pkg/Main", "()V", "main");
        let hierarchy = TestClassHierarchy::new()
            .with_class(ClassFile {
                name: Rc::from("pkg/K"),
                super_class: None,
                interfaces: vec![],
                fields: vec![FieldInfo {
                    signature: field_sig.clone(),
                    access_flags: AccessFlags::STATIC,
                    constant_value: None,
                }],
                methods: vec![MethodInfo {
                    signature: Signature::new("pkg/K", "()V", "<clinit>"),
                    access_flags: AccessFlags::STATIC,
                    code: Some(Rc::from(vec![0u8; 1])),
                    max_locals: 0,
                    handlers: vec![],
                    constant_pool: vec![],
                }],
                access_flags: AccessFlags::PUBLIC,
            })
            .with_class(ClassFile {
                name: Rc::from("pkg/Main"),
                super_class: None,
                interfaces: vec![],
                fields: vec![],
                methods: vec![MethodInfo {
                    signature: main_sig.clone(),
                    access_flags: AccessFlags::STATIC,
                    code: Some(Rc::from(vec![0xb2u8, 0x00, 0x00])),
                    max_locals: 0,
                    handlers: vec![],
                    constant_pool: vec![field_sig],
                }],
                access_flags: AccessFlags::PUBLIC,
            });

        let mut state = State::new(
            main_sig,
            Rc::from(vec![0xb2u8, 0x00, 0x00]),
            vec![],
            Rc::new(hierarchy),
            Rc::new(Calculator::default()),
        );
        let mut dp = TrivialDecisionProcedure::default();
        let rules = LicsRules::default();

        Getstatic.exec(&mut state, &mut ctx(&mut dp, &rules)).unwrap();
        // pc has not advanced: <clinit> was pushed and must return first.
        assert_eq!(state.thread_stack().current().unwrap().pc(), 0);
        assert_eq!(state.thread_stack().depth(), 2);
    }

    #[test]
    fn parameter_count_handles_primitives_arrays_and_reference_types() {
        assert_eq!(parameter_count("()V"), 0);
        assert_eq!(parameter_count("(III)V"), 3);
        assert_eq!(parameter_count("(Ljava/lang/String;I)V"), 2);
        assert_eq!(parameter_count("([I[Ljava/lang/String;)V"), 2);
    }
}
