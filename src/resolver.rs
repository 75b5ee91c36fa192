//! Field/method resolution with lazy class initialization (§4.3): the
//! `getstatic`/`putstatic`/invoke family all funnel through these helpers
//! before touching the heap or static area.

use std::rc::Rc;

use ordered_float::OrderedFloat;
use symex_core::{Signature, Simplex, TypeTag, Value};

use crate::class_hierarchy::{AccessFlags, FieldInfo, MethodInfo};
use crate::decision::DecisionProcedure;
use crate::error::{EngineError, ResolutionError, Result};
use crate::frame::Frame;
use crate::objekt::Klass;
use crate::path_condition::Clause;
use crate::state::State;

/// What `ensure_klass` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlassInitOutcome {
    /// The class was already initialized (or has no `<clinit>`); the
    /// caller may proceed with the current bytecode.
    NoAction,
    /// A `<clinit>` frame was pushed; the caller must stop without
    /// advancing pc so the current bytecode re-executes after it returns.
    MustExit,
}

fn default_value_for(tag: TypeTag) -> Value {
    match tag {
        TypeTag::Byte => Value::Simplex(Simplex::Byte(0)),
        TypeTag::Char => Value::Simplex(Simplex::Char(0)),
        TypeTag::Double => Value::Simplex(Simplex::Double(OrderedFloat(0.0))),
        TypeTag::Float => Value::Simplex(Simplex::Float(OrderedFloat(0.0))),
        TypeTag::Int => Value::Simplex(Simplex::Int(0)),
        TypeTag::Long => Value::Simplex(Simplex::Long(0)),
        TypeTag::Short => Value::Simplex(Simplex::Short(0)),
        TypeTag::Boolean => Value::Simplex(Simplex::Boolean(false)),
        TypeTag::Void | TypeTag::Class | TypeTag::Array | TypeTag::Null => Value::Null,
    }
}

fn descriptor_tag(descriptor: &str) -> TypeTag {
    descriptor
        .chars()
        .next()
        .and_then(TypeTag::from_code)
        .unwrap_or(TypeTag::Class)
}

/// Lazily initialize `class_name` per §4.3. Superclasses and interfaces
/// with nonabstract methods are initialized first, recursively.
pub fn ensure_klass(state: &mut State, class_name: &str, dp: &mut dyn DecisionProcedure) -> Result<KlassInitOutcome> {
    if state.get_klass(class_name).is_some() {
        if !dp.is_sat_initialized(class_name)? {
            return Err(EngineError::Contradiction);
        }
        state
            .path_condition_mut()
            .push(Clause::AssumeClassInitialized(Rc::from(class_name)));
        return Ok(KlassInitOutcome::NoAction);
    }

    let class_file = state.class_hierarchy().get_class_file(class_name)?.clone();

    if let Some(super_class) = &class_file.super_class {
        ensure_klass(state, super_class, dp)?;
    }
    for interface in &class_file.interfaces {
        let has_nonabstract_methods = state
            .class_hierarchy()
            .get_class_file(interface)
            .map(|cf| cf.methods.iter().any(|m| !m.is_abstract()))
            .unwrap_or(false);
        if has_nonabstract_methods {
            ensure_klass(state, interface, dp)?;
        }
    }

    let mut klass = Klass::new(class_file.name.clone());
    for field in &class_file.fields {
        if field.access_flags.contains(AccessFlags::STATIC) {
            klass.put_field_value(field.signature.clone(), default_value_for(descriptor_tag(&field.signature.descriptor)))?;
        }
    }

    if !dp.is_sat_not_initialized(class_name)? {
        return Err(EngineError::Contradiction);
    }
    state
        .path_condition_mut()
        .push(Clause::AssumeClassNotInitialized(class_file.name.clone()));
    state.insert_klass(klass);

    match class_file.clinit() {
        Some(clinit) => {
            let code = clinit
                .code
                .clone()
                .ok_or_else(|| EngineError::UnexpectedInternal(format!("{class_name} <clinit> has no code")))?;
            let locals = vec![Value::Null; clinit.max_locals as usize];
            state
                .thread_stack_mut()
                .push(Frame::new(clinit.signature.clone(), code, locals, 0));
            Ok(KlassInitOutcome::MustExit)
        }
        None => Ok(KlassInitOutcome::NoAction),
    }
}

fn check_accessible_field(resolved: &Signature, field_info: &FieldInfo, current_class: &str) -> Result<()> {
    if field_info.access_flags.contains(AccessFlags::PRIVATE) && &*resolved.class_name != current_class {
        return Err(EngineError::Resolution(ResolutionError::FieldNotAccessible {
            class: resolved.class_name.to_string(),
            member: resolved.member_name.to_string(),
        }));
    }
    Ok(())
}

fn check_accessible_method(resolved: &Signature, method_info: &MethodInfo, current_class: &str) -> Result<()> {
    if method_info.access_flags.contains(AccessFlags::PRIVATE) && &*resolved.class_name != current_class {
        return Err(EngineError::Resolution(ResolutionError::MethodNotAccessible {
            class: resolved.class_name.to_string(),
            member: resolved.member_name.to_string(),
            descriptor: resolved.descriptor.to_string(),
        }));
    }
    Ok(())
}

/// Resolve a field access: the resolved signature, its declaration info,
/// and (when `class_name` defines one) the `<clinit>` initialization
/// outcome, in the order `getstatic`/`putstatic` need them.
pub struct ResolvedField {
    pub signature: Signature,
    pub info: FieldInfo,
}

/// Resolve `signature` against `current_class`, verify accessibility, and
/// (for a `static` access) ensure the declaring class is initialized. The
/// compile-time-constant carve-out (read directly from the constant pool,
/// no `<clinit>` forced) is the caller's job — it must check
/// `info.constant_value` *before* calling this for a `getstatic`.
pub fn resolve_field(
    state: &mut State,
    current_class: &str,
    signature: &Signature,
    require_static: bool,
    dp: &mut dyn DecisionProcedure,
) -> Result<(ResolvedField, KlassInitOutcome)> {
    let resolved = state.class_hierarchy().resolve_field(current_class, signature)?;
    let field_info = state
        .class_hierarchy()
        .get_class_file(&resolved.class_name)?
        .find_field(&resolved.member_name)
        .cloned()
        .ok_or_else(|| ResolutionError::FieldNotFound {
            class: resolved.class_name.to_string(),
            member: resolved.member_name.to_string(),
        })?;

    check_accessible_field(&resolved, &field_info, current_class)?;

    if require_static != field_info.access_flags.contains(AccessFlags::STATIC) {
        return Err(EngineError::Resolution(ResolutionError::IncompatibleFieldType {
            class: resolved.class_name.to_string(),
            member: resolved.member_name.to_string(),
        }));
    }

    let outcome = if require_static {
        ensure_klass(state, &resolved.class_name, dp)?
    } else {
        KlassInitOutcome::NoAction
    };

    Ok((
        ResolvedField {
            signature: resolved,
            info: field_info,
        },
        outcome,
    ))
}

pub struct ResolvedMethod {
    pub signature: Signature,
    pub info: MethodInfo,
}

pub fn resolve_method(
    state: &mut State,
    current_class: &str,
    signature: &Signature,
    is_interface: bool,
    dp: &mut dyn DecisionProcedure,
) -> Result<(ResolvedMethod, KlassInitOutcome)> {
    let resolved = state
        .class_hierarchy()
        .resolve_method(current_class, signature, is_interface)?;
    let method_info = state
        .class_hierarchy()
        .get_class_file(&resolved.class_name)?
        .find_method(&resolved.member_name, &resolved.descriptor)
        .cloned()
        .ok_or_else(|| ResolutionError::MethodNotFound {
            class: resolved.class_name.to_string(),
            member: resolved.member_name.to_string(),
            descriptor: resolved.descriptor.to_string(),
        })?;

    check_accessible_method(&resolved, &method_info, current_class)?;

    let outcome = if method_info.is_static() {
        ensure_klass(state, &resolved.class_name, dp)?
    } else {
        KlassInitOutcome::NoAction
    };

    Ok((
        ResolvedMethod {
            signature: resolved,
            info: method_info,
        },
        outcome,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_hierarchy::{ClassFile, TestClassHierarchy};
    use crate::decision::TrivialDecisionProcedure;
    use std::rc::Rc;
    use symex_core::Calculator;

    fn hierarchy_with_clinit() -> TestClassHierarchy {
        TestClassHierarchy::new().with_class(ClassFile {
            name: Rc::from("pkg/K"),
            super_class: None,
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: Signature::new("pkg/K", "I", "value"),
                access_flags: AccessFlags::STATIC,
                constant_value: None,
            }],
            methods: vec![MethodInfo {
                signature: Signature::new("pkg/K", "()V", "<clinit>"),
                access_flags: AccessFlags::STATIC,
                code: Some(Rc::from(vec![0u8; 4])),
                max_locals: 0,
                handlers: vec![],
                constant_pool: vec![],
            }],
            access_flags: AccessFlags::PUBLIC,
        })
    }

    fn state_with(hierarchy: TestClassHierarchy) -> State {
        State::new(
            Signature::new("pkg/Main", "()V", "main"),
            Rc::from(vec![0u8; 8]),
            vec![],
            Rc::new(hierarchy),
            Rc::new(Calculator::default()),
        )
    }

    #[test]
    fn ensure_klass_pushes_clinit_frame_once() {
        let mut state = state_with(hierarchy_with_clinit());
        let mut dp = TrivialDecisionProcedure::default();

        let outcome = ensure_klass(&mut state, "pkg/K", &mut dp).unwrap();
        assert_eq!(outcome, KlassInitOutcome::MustExit);
        assert_eq!(state.thread_stack().depth(), 2);

        // A second call sees the Klass already exists and just asserts it.
        let outcome = ensure_klass(&mut state, "pkg/K", &mut dp).unwrap();
        assert_eq!(outcome, KlassInitOutcome::NoAction);
        assert_eq!(state.thread_stack().depth(), 2);
    }

    #[test]
    fn resolve_field_rejects_instance_field_for_static_access() {
        let hierarchy = TestClassHierarchy::new().with_class(ClassFile {
            name: Rc::from("pkg/K"),
            super_class: None,
            interfaces: vec![],
            fields: vec![FieldInfo {
                signature: Signature::new("pkg/K", "I", "value"),
                access_flags: AccessFlags::PRIVATE,
                constant_value: None,
            }],
            methods: vec![],
            access_flags: AccessFlags::PUBLIC,
        });
        let mut state = state_with(hierarchy);
        let mut dp = TrivialDecisionProcedure::default();
        let sig = Signature::new("pkg/K", "I", "value");
        let err = resolve_field(&mut state, "pkg/K", &sig, true, &mut dp).unwrap_err();
        assert!(matches!(err, EngineError::Resolution(ResolutionError::IncompatibleFieldType { .. })));
    }
}
