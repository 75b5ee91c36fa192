//! Schema (d): fork on a decision. The generic protocol — collect decision
//! inputs, build alternatives, ask the decision procedure for the feasible
//! subset, clone per feasible alternative, apply its effect, queue the
//! clones — lives here; each bytecode algorithm only describes its
//! alternatives and their effects.

use std::rc::Rc;

use symex_core::{Operator, Simplex, Value};

use crate::algo::access::{constant_pool_signature, read_u16_be};
use crate::algo::StepContext;
use crate::class_hierarchy::AccessFlags;
use crate::error::{EngineError, Result};
use crate::heap::HeapPos;
use crate::objekt::{Instance, Objekt};
use crate::path_condition::Clause;
use crate::resolver;
use crate::state::State;

/// Synchronize the decision procedure's assumptions to `state`'s path
/// condition before the first query on it (§5's `setAssumptions` contract).
/// The resync itself is a bulk push, so it runs fast-and-imprecise; the
/// mode is off again before any `is_sat*` query that follows.
fn sync_assumptions(state: &State, ctx: &mut StepContext) -> Result<()> {
    ctx.decision_procedure.go_fast_and_imprecise();
    let result = ctx.decision_procedure.set_assumptions(state.path_condition());
    ctx.decision_procedure.stop_fast_and_imprecise();
    result?;
    Ok(())
}

/// `ifeq`/`ifne`/`if_icmplt`/... on a symbolic condition: `{TAKEN, NOT_TAKEN}`.
pub fn fork_binary_branch(
    state: &mut State,
    ctx: &mut StepContext,
    condition: Value,
    taken_delta: i32,
    not_taken_delta: i32,
) -> Result<Vec<State>> {
    sync_assumptions(state, ctx)?;
    let negated = state.calculator().unary(Operator::Not, condition.clone())?;

    let taken_sat = ctx.decision_procedure.is_sat(&condition)?;
    let not_taken_sat = ctx.decision_procedure.is_sat(&negated)?;

    let mut successors = Vec::new();
    if taken_sat {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::Assume(condition.clone()));
        clone.inc_pc(taken_delta)?;
        clone.push_identifier_suffix('T');
        clone.increment_depth();
        successors.push(clone);
    }
    if not_taken_sat {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::Assume(negated));
        clone.inc_pc(not_taken_delta)?;
        clone.push_identifier_suffix('N');
        clone.increment_depth();
        successors.push(clone);
    }
    if successors.is_empty() {
        return Err(EngineError::Contradiction);
    }
    Ok(successors)
}

/// `tableswitch`/`lookupswitch` on a symbolic key: `{case_0, .., case_{k-1}, DEFAULT}`.
/// `cases` pairs each case's literal value with its pc delta; any key not
/// matching one of them takes `default_delta`.
pub fn fork_table_switch(
    state: &mut State,
    ctx: &mut StepContext,
    key: Value,
    cases: Vec<(i32, i32)>,
    default_delta: i32,
) -> Result<Vec<State>> {
    sync_assumptions(state, ctx)?;

    let mut successors = Vec::new();
    let mut none_matched = Value::Simplex(Simplex::Boolean(true));
    for (case_value, delta) in &cases {
        let matches = state
            .calculator()
            .binary(Operator::Eq, key.clone(), Value::Simplex(Simplex::Int(*case_value)))?;
        if ctx.decision_procedure.is_sat(&matches)? {
            let mut clone = state.clone();
            clone.path_condition_mut().push(Clause::Assume(matches.clone()));
            clone.inc_pc(*delta)?;
            clone.push_identifier_suffix('C');
            clone.increment_depth();
            successors.push(clone);
        }
        let not_matches = state.calculator().unary(Operator::Not, matches)?;
        none_matched = state.calculator().binary(Operator::And, none_matched, not_matches)?;
    }
    if ctx.decision_procedure.is_sat(&none_matched)? {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::Assume(none_matched));
        clone.inc_pc(default_delta)?;
        clone.push_identifier_suffix('D');
        clone.increment_depth();
        successors.push(clone);
    }
    if successors.is_empty() {
        return Err(EngineError::Contradiction);
    }
    Ok(successors)
}

/// `iaload`/`iastore`/... bounds check: `{IN, OUT}`. `on_in_bounds` performs
/// the load/store and advances pc on the in-bounds clone; the out-of-bounds
/// clone throws `ArrayIndexOutOfBoundsException` and leaves pc unchanged
/// (the throw walks frames for a handler).
pub fn fork_array_bounds(
    state: &mut State,
    ctx: &mut StepContext,
    index: Value,
    length: Value,
    on_in_bounds: impl Fn(&mut State, &Value) -> Result<()>,
) -> Result<Vec<State>> {
    let zero = Value::Simplex(Simplex::Int(0));
    let ge_zero = state.calculator().binary(Operator::Ge, index.clone(), zero)?;
    let lt_len = state.calculator().binary(Operator::Lt, index.clone(), length)?;
    let in_bounds = state.calculator().binary(Operator::And, ge_zero, lt_len)?;
    let out_of_bounds = state.calculator().unary(Operator::Not, in_bounds.clone())?;

    sync_assumptions(state, ctx)?;
    let in_sat = ctx.decision_procedure.is_sat(&in_bounds)?;
    let out_sat = ctx.decision_procedure.is_sat(&out_of_bounds)?;

    let mut successors = Vec::new();
    if in_sat {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::Assume(in_bounds));
        on_in_bounds(&mut clone, &index)?;
        clone.push_identifier_suffix('I');
        clone.increment_depth();
        successors.push(clone);
    }
    if out_sat {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::Assume(out_of_bounds));
        clone.create_throwable_and_throw_it("java/lang/ArrayIndexOutOfBoundsException")?;
        clone.push_identifier_suffix('O');
        clone.increment_depth();
        successors.push(clone);
    }
    if successors.is_empty() {
        return Err(EngineError::Contradiction);
    }
    Ok(successors)
}

/// `iaload`: pop index and array reference, bounds-check, push the element
/// on the in-bounds clone.
pub struct Iaload;
impl crate::algo::Algorithm for Iaload {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = state.pop()?;
        let array_ref = state.pop()?;
        let pos = match array_ref {
            Value::ReferenceConcrete(Some(pos)) => pos,
            Value::Null | Value::ReferenceConcrete(None) => {
                state.create_throwable_and_throw_it("java/lang/NullPointerException")?;
                return Ok(vec![]);
            }
            other => {
                return Err(EngineError::UnexpectedInternal(format!("iaload on unresolved reference {other:?}")));
            }
        };
        let length = state
            .heap()
            .get(pos)
            .and_then(|o| o.as_array())
            .map(|a| a.length().clone())
            .ok_or_else(|| EngineError::UnexpectedInternal(format!("heap position {pos} is not an array")))?;

        fork_array_bounds(state, ctx, index, length, move |state, index| {
            let value = state
                .heap()
                .get(pos)
                .and_then(|o| o.as_array())
                .and_then(|a| a.get(index))
                .cloned()
                .unwrap_or(Value::Simplex(Simplex::Int(0)));
            state.push(value)?;
            state.inc_pc(1)?;
            Ok(())
        })
    }
}

/// `iastore`: pop value, index, and array reference, bounds-check, store
/// the value on the in-bounds clone.
pub struct Iastore;
impl crate::algo::Algorithm for Iastore {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let value = state.pop()?;
        let index = state.pop()?;
        let array_ref = state.pop()?;
        let pos = match array_ref {
            Value::ReferenceConcrete(Some(pos)) => pos,
            Value::Null | Value::ReferenceConcrete(None) => {
                state.create_throwable_and_throw_it("java/lang/NullPointerException")?;
                return Ok(vec![]);
            }
            other => {
                return Err(EngineError::UnexpectedInternal(format!("iastore on unresolved reference {other:?}")));
            }
        };
        let length = state
            .heap()
            .get(pos)
            .and_then(|o| o.as_array())
            .map(|a| a.length().clone())
            .ok_or_else(|| EngineError::UnexpectedInternal(format!("heap position {pos} is not an array")))?;

        fork_array_bounds(state, ctx, index, length, move |state, index| {
            let array = state
                .heap_mut()
                .get_mut(pos)
                .and_then(|o| o.as_array_mut())
                .ok_or_else(|| EngineError::UnexpectedInternal(format!("heap position {pos} is not an array")))?;
            array.put(index.clone(), value.clone());
            state.inc_pc(1)?;
            Ok(())
        })
    }
}

/// Every class assignable to `declared_class` that a fresh instance could
/// actually be allocated as: concrete (not abstract, not an interface) and
/// a subclass (or the class itself).
fn expand_candidates_for(state: &State, declared_class: &str) -> Vec<Rc<str>> {
    state
        .class_hierarchy()
        .all_class_names()
        .into_iter()
        .filter(|name| {
            state.class_hierarchy().is_subclass(name, declared_class)
                && state
                    .class_hierarchy()
                    .get_class_file(name)
                    .is_ok_and(|cf| !cf.is_interface() && !cf.access_flags.contains(AccessFlags::ABSTRACT))
        })
        .collect()
}

/// Every instance already on the heap whose runtime type is assignable to
/// `declared_class`: the candidates `ALIASES` may pick among.
fn alias_candidates_for(state: &State, declared_class: &str) -> Vec<AliasCandidate> {
    state
        .heap()
        .iter()
        .filter(|(_, o)| o.as_instance().is_some() && state.class_hierarchy().is_subclass(o.type_name(), declared_class))
        .map(|(pos, _)| AliasCandidate {
            pos: *pos,
            origin: state.allocation_origin(*pos).cloned(),
        })
        .collect()
}

/// `getfield`: an instance field read. A concrete, non-null receiver reads
/// directly; a `Null`/unresolved receiver throws immediately; a symbolic
/// receiver forks over `{NULL, ALIASES, EXPANDS}` before reading (§4.4).
pub struct Getfield;
impl crate::algo::Algorithm for Getfield {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = read_u16_be(state, 1)?;
        let signature = constant_pool_signature(state, index)?;
        let current_class = state.current_signature()?.class_name.clone();
        let receiver = state.pop()?;

        match receiver {
            Value::ReferenceConcrete(Some(pos)) => {
                let (resolved, _) = resolver::resolve_field(state, &current_class, &signature, false, ctx.decision_procedure)?;
                let value = state
                    .heap()
                    .get(pos)
                    .and_then(Objekt::as_instance)
                    .and_then(|instance| instance.get_field_value(&resolved.signature))
                    .cloned()
                    .unwrap_or(Value::Null);
                state.push(value)?;
                state.inc_pc(3)?;
                Ok(vec![])
            }
            Value::Null | Value::ReferenceConcrete(None) => {
                state.create_throwable_and_throw_it("java/lang/NullPointerException")?;
                Ok(vec![])
            }
            Value::ReferenceSymbolic { origin, id } => {
                let (resolved, _) = resolver::resolve_field(state, &current_class, &signature, false, ctx.decision_procedure)?;
                let declaring_class = resolved.signature.class_name.clone();
                let field_sig = resolved.signature;
                let reference = Value::ReferenceSymbolic { origin: origin.clone(), id };
                let alias_candidates = alias_candidates_for(state, &declaring_class);
                let expand_candidates = expand_candidates_for(state, &declaring_class);

                fork_reference_resolution(
                    state,
                    ctx,
                    reference,
                    &origin,
                    alias_candidates,
                    expand_candidates,
                    move |state, resolved_ref| match resolved_ref {
                        Value::Null => state.create_throwable_and_throw_it("java/lang/NullPointerException"),
                        Value::ReferenceConcrete(Some(pos)) => {
                            let value = state
                                .heap()
                                .get(pos)
                                .and_then(Objekt::as_instance)
                                .and_then(|instance| instance.get_field_value(&field_sig))
                                .cloned()
                                .unwrap_or(Value::Null);
                            state.push(value)?;
                            state.inc_pc(3)?;
                            Ok(())
                        }
                        other => Err(EngineError::UnexpectedInternal(format!("getfield resolved to {other:?}"))),
                    },
                )
            }
            other => Err(EngineError::UnexpectedInternal(format!("getfield on unexpected receiver {other:?}"))),
        }
    }
}

/// `putfield`: an instance field write, mirroring [`Getfield`]'s receiver
/// dispatch. The value is popped before the receiver is classified, so
/// every clone a fork produces sees the same value to store.
pub struct Putfield;
impl crate::algo::Algorithm for Putfield {
    fn exec(&self, state: &mut State, ctx: &mut StepContext) -> Result<Vec<State>> {
        let index = read_u16_be(state, 1)?;
        let signature = constant_pool_signature(state, index)?;
        let current_class = state.current_signature()?.class_name.clone();
        let value = state.pop()?;
        let receiver = state.pop()?;

        match receiver {
            Value::ReferenceConcrete(Some(pos)) => {
                let (resolved, _) = resolver::resolve_field(state, &current_class, &signature, false, ctx.decision_procedure)?;
                let instance = state
                    .heap_mut()
                    .get_mut(pos)
                    .and_then(Objekt::as_instance_mut)
                    .ok_or_else(|| EngineError::UnexpectedInternal(format!("heap position {pos} is not an instance")))?;
                instance.put_field_value(resolved.signature, value)?;
                state.inc_pc(3)?;
                Ok(vec![])
            }
            Value::Null | Value::ReferenceConcrete(None) => {
                state.create_throwable_and_throw_it("java/lang/NullPointerException")?;
                Ok(vec![])
            }
            Value::ReferenceSymbolic { origin, id } => {
                let (resolved, _) = resolver::resolve_field(state, &current_class, &signature, false, ctx.decision_procedure)?;
                let declaring_class = resolved.signature.class_name.clone();
                let field_sig = resolved.signature;
                let reference = Value::ReferenceSymbolic { origin: origin.clone(), id };
                let alias_candidates = alias_candidates_for(state, &declaring_class);
                let expand_candidates = expand_candidates_for(state, &declaring_class);

                fork_reference_resolution(
                    state,
                    ctx,
                    reference,
                    &origin,
                    alias_candidates,
                    expand_candidates,
                    move |state, resolved_ref| match resolved_ref {
                        Value::Null => state.create_throwable_and_throw_it("java/lang/NullPointerException"),
                        Value::ReferenceConcrete(Some(pos)) => {
                            let instance = state
                                .heap_mut()
                                .get_mut(pos)
                                .and_then(Objekt::as_instance_mut)
                                .ok_or_else(|| EngineError::UnexpectedInternal(format!("heap position {pos} is not an instance")))?;
                            instance.put_field_value(field_sig.clone(), value.clone())?;
                            state.inc_pc(3)?;
                            Ok(())
                        }
                        other => Err(EngineError::UnexpectedInternal(format!("putfield resolved to {other:?}"))),
                    },
                )
            }
            other => Err(EngineError::UnexpectedInternal(format!("putfield on unexpected receiver {other:?}"))),
        }
    }
}

/// One candidate an existing heap object offers for `ALIASES`.
pub struct AliasCandidate {
    pub pos: HeapPos,
    /// This object's own allocation-site origin, if it was created by an
    /// `EXPANDS` resolution — what a `MayAlias` LICS rule's pattern
    /// constrains, per `LicsEffect::MayAlias`'s own contract. `None` for
    /// objects allocated any other way (never matches a `MayAlias` pattern).
    pub origin: Option<Rc<str>>,
}

/// Reference resolution: `{NULL} ∪ {ALIASES(pos)} ∪ {EXPANDS(class)}`, each
/// constrained by LICS rules before the decision procedure is ever asked.
/// `origin` is the reference's textual allocation-site origin (used only to
/// look up LICS rules); `alias_candidates` and `expand_candidates` are
/// already filtered by static-type compatibility (the resolver/caller's
/// job, since only it knows the reference's declared type).
pub fn fork_reference_resolution(
    state: &mut State,
    ctx: &mut StepContext,
    reference: Value,
    origin: &str,
    alias_candidates: Vec<AliasCandidate>,
    expand_candidates: Vec<Rc<str>>,
    on_resolved: impl Fn(&mut State, Value) -> Result<()>,
) -> Result<Vec<State>> {
    sync_assumptions(state, ctx)?;

    let never_null = ctx.lics_rules.is_never_null(origin);
    let expand_patterns = ctx.lics_rules.expand_patterns(origin);
    let alias_patterns = ctx.lics_rules.alias_patterns(origin);

    let mut successors = Vec::new();

    if !never_null && ctx.decision_procedure.is_sat_null(&reference)? {
        let mut clone = state.clone();
        clone.path_condition_mut().push(Clause::AssumeNull(reference.clone()));
        on_resolved(&mut clone, Value::Null)?;
        clone.push_identifier_suffix('Z');
        clone.increment_depth();
        successors.push(clone);
    }

    let mut sorted_aliases = alias_candidates;
    sorted_aliases.sort_by_key(|c| c.pos);
    for candidate in sorted_aliases {
        if !alias_patterns.is_empty() {
            let candidate_origin = candidate.origin.as_deref().unwrap_or("");
            if !alias_patterns.iter().any(|p| crate::lics::LicsRules::class_permitted_by(p, candidate_origin)) {
                continue;
            }
        }
        if ctx.decision_procedure.is_sat_aliases(&reference, candidate.pos)? {
            let mut clone = state.clone();
            clone
                .path_condition_mut()
                .push(Clause::AssumeAliases(reference.clone(), candidate.pos));
            on_resolved(&mut clone, Value::ReferenceConcrete(Some(candidate.pos)))?;
            clone.push_identifier_suffix('A');
            clone.increment_depth();
            successors.push(clone);
        }
    }

    let mut sorted_expands: Vec<Rc<str>> = expand_candidates;
    sorted_expands.sort();
    for class_name in sorted_expands {
        if !expand_patterns.is_empty()
            && !expand_patterns
                .iter()
                .any(|p| crate::lics::LicsRules::class_permitted_by(p, &class_name))
        {
            continue;
        }
        if let Some(scope) = ctx.heap_scope
            && state.heap().count_of_class(&class_name) + 1 > scope.per_class_limit
        {
            continue;
        }
        if ctx.decision_procedure.is_sat_expands(&reference, &class_name)? {
            let mut clone = state.clone();
            let pos = clone.heap_mut().allocate(Objekt::Instance(Instance::new(class_name.clone())));
            clone.record_allocation_origin(pos, Rc::from(origin));
            clone
                .path_condition_mut()
                .push(Clause::AssumeExpands(reference.clone(), class_name.clone()));
            on_resolved(&mut clone, Value::ReferenceConcrete(Some(pos)))?;
            clone.push_identifier_suffix('E');
            clone.increment_depth();
            successors.push(clone);
        }
    }

    if successors.is_empty() {
        return Err(EngineError::Contradiction);
    }
    Ok(successors)
}
