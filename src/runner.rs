//! The runner: a depth-first worklist driver around [`Engine`], enforcing
//! the scope limits and per-step hooks from §4.5/§6.

use std::rc::Rc;
use std::time::{Duration, Instant};

use symex_core::{Signature, Value};
use tracing::{info, warn};

use crate::algo::{HeapScope, StepContext};
use crate::decision::DecisionProcedure;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::lics::LicsRules;
use crate::state::State;

/// Runner configuration (§6's `Configuration (consumed by the runner)`).
/// `0`/empty fields mean unbounded, the teacher's convention for numeric
/// scope fields.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub root_method: Signature,
    pub depth_scope: u32,
    pub count_scope: u32,
    pub heap_scope: usize,
    pub timeout: Duration,
    pub identifier_subregion: String,
    pub lics_rules: LicsRules,
    /// `(class, static field)` pairs the runner notifies hooks about on change.
    pub observed_variables: Vec<(Rc<str>, Rc<str>)>,
}

impl RunnerConfig {
    pub fn new(root_method: Signature) -> Self {
        Self {
            root_method,
            depth_scope: 0,
            count_scope: 0,
            heap_scope: 0,
            timeout: Duration::ZERO,
            identifier_subregion: String::new(),
            lics_rules: LicsRules::default(),
            observed_variables: Vec::new(),
        }
    }

    pub fn with_depth_scope(mut self, limit: u32) -> Self {
        self.depth_scope = limit;
        self
    }

    pub fn with_count_scope(mut self, limit: u32) -> Self {
        self.count_scope = limit;
        self
    }

    pub fn with_heap_scope(mut self, limit: usize) -> Self {
        self.heap_scope = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_identifier_subregion(mut self, prefix: impl Into<String>) -> Self {
        self.identifier_subregion = prefix.into();
        self
    }

    pub fn with_lics_rules(mut self, rules: LicsRules) -> Self {
        self.lics_rules = rules;
        self
    }

    pub fn with_observed_variables(mut self, variables: Vec<(Rc<str>, Rc<str>)>) -> Self {
        self.observed_variables = variables;
        self
    }

    fn heap_scope_limit(&self) -> Option<HeapScope> {
        if self.heap_scope == 0 {
            None
        } else {
            Some(HeapScope { per_class_limit: self.heap_scope })
        }
    }
}

/// Per-step hooks (§6's `actions`). Default no-ops so embedders only
/// override what they need.
pub trait RunnerActions {
    fn at_root(&mut self, _state: &State) {}
    fn at_pre(&mut self, _state: &State) {}
    fn at_post(&mut self, _state: &State) {}
    fn at_contradiction(&mut self, _state: &State) {}
    fn at_stuck(&mut self, _state: &State) {}
    /// One configured `(class, field)` observed variable changed value
    /// across a step. `before` is `None` if the class wasn't initialized yet.
    fn at_observed_change(
        &mut self,
        _state: &State,
        _class_name: &str,
        _field_name: &str,
        _before: Option<&Value>,
        _after: Option<&Value>,
    ) {
    }
}

/// Hooks that do nothing, for runs that don't need observation.
#[derive(Debug, Default)]
pub struct NoopActions;
impl RunnerActions for NoopActions {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    NormalCompletion,
    Aborted,
    UnsupportedBytecode,
    InternalError,
}

/// What a completed (or aborted) run produced.
pub struct RunSummary {
    pub exit_kind: ExitKind,
    pub states_explored: u32,
    /// States that reached `stuck` or were skipped by a scope limit.
    pub finished_states: Vec<State>,
    /// States still on the worklist when the run stopped (timeout/count scope).
    pub unfinished_states: Vec<State>,
}

pub struct Runner<'a> {
    config: RunnerConfig,
    decision_procedure: &'a mut dyn DecisionProcedure,
    actions: &'a mut dyn RunnerActions,
    worklist: Vec<State>,
    states_explored: u32,
    finished_states: Vec<State>,
}

/// The current value of every configured observed variable, in the same
/// order as `observed`, `None` for a not-yet-initialized class.
fn observed_snapshot(state: &State, observed: &[(Rc<str>, Rc<str>)]) -> Vec<Option<Value>> {
    observed
        .iter()
        .map(|(class, field)| state.get_klass(class).and_then(|k| k.field_value_by_name(field)).cloned())
        .collect()
}

/// Compare `state`'s current observed values against `before` (taken prior
/// to the step that produced `state`) and fire the hook for each that changed.
fn notify_observed_changes(
    actions: &mut dyn RunnerActions,
    observed: &[(Rc<str>, Rc<str>)],
    before: &[Option<Value>],
    state: &State,
) {
    for ((class, field), prior) in observed.iter().zip(before) {
        let after = state.get_klass(class).and_then(|k| k.field_value_by_name(field)).cloned();
        if &after != prior {
            actions.at_observed_change(state, class, field, prior.as_ref(), after.as_ref());
        }
    }
}

impl<'a> Runner<'a> {
    pub fn new(
        config: RunnerConfig,
        decision_procedure: &'a mut dyn DecisionProcedure,
        actions: &'a mut dyn RunnerActions,
    ) -> Self {
        Self {
            config,
            decision_procedure,
            actions,
            worklist: Vec::new(),
            states_explored: 0,
            finished_states: Vec::new(),
        }
    }

    /// Drive `root` (and every state it forks into) to completion, a scope
    /// limit, or a timeout.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(&mut self, root: State) -> Result<RunSummary> {
        info!(root_method = %self.config.root_method, "starting run");
        self.actions.at_root(&root);
        self.worklist.push(root);

        let deadline = if self.config.timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + self.config.timeout)
        };

        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                warn!("runner timeout reached, aborting with states outstanding");
                return Ok(self.finish(ExitKind::Aborted));
            }
            if self.config.count_scope != 0 && self.states_explored >= self.config.count_scope {
                return Ok(self.finish(ExitKind::NormalCompletion));
            }

            let Some(mut state) = self.worklist.pop() else {
                return Ok(self.finish(ExitKind::NormalCompletion));
            };

            if !self.config.identifier_subregion.is_empty() && !state.identifier().starts_with(&self.config.identifier_subregion) {
                continue;
            }
            if self.config.depth_scope != 0 && state.depth() >= self.config.depth_scope {
                self.finished_states.push(state);
                continue;
            }

            self.states_explored += 1;
            self.actions.at_pre(&state);
            let observed_before = observed_snapshot(&state, &self.config.observed_variables);

            #[cfg(feature = "profiling")]
            profiling::scope!("engine_step");

            let ctx = StepContext {
                decision_procedure: &mut *self.decision_procedure,
                lics_rules: &self.config.lics_rules,
                heap_scope: self.config.heap_scope_limit(),
            };
            let mut engine = Engine::new(ctx);
            let step_result = engine.step(&mut state);

            match step_result {
                Ok(successors) => {
                    self.actions.at_post(&state);
                    if !self.config.observed_variables.is_empty() {
                        notify_observed_changes(&mut *self.actions, &self.config.observed_variables, &observed_before, &state);
                        for successor in &successors {
                            notify_observed_changes(&mut *self.actions, &self.config.observed_variables, &observed_before, successor);
                        }
                    }
                    if state.stuck().is_stuck() {
                        self.actions.at_stuck(&state);
                        self.finished_states.push(state);
                    } else if successors.is_empty() {
                        self.worklist.push(state);
                    } else {
                        let mut successors = successors.into_iter();
                        let first = successors.next().expect("non-empty successor list");
                        let rest: Vec<State> = successors.collect();
                        for successor in rest.into_iter().rev() {
                            self.worklist.push(successor);
                        }
                        self.worklist.push(first);
                    }
                }
                Err(EngineError::Contradiction) => {
                    warn!(identifier = %state.identifier(), "path pruned by contradiction");
                    self.actions.at_contradiction(&state);
                }
                Err(EngineError::UnsupportedBytecode(_)) => {
                    self.finished_states.push(state);
                }
                Err(e) if e.is_fatal() => {
                    return Err(e);
                }
                Err(_) => {
                    self.finished_states.push(state);
                }
            }
        }
    }

    fn finish(&mut self, exit_kind: ExitKind) -> RunSummary {
        RunSummary {
            exit_kind,
            states_explored: self.states_explored,
            finished_states: std::mem::take(&mut self.finished_states),
            unfinished_states: std::mem::take(&mut self.worklist),
        }
    }
}
