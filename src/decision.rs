//! The decision procedure interface: the SMT/theorem-prover backend is an
//! external collaborator, consumed through this trait.

use std::rc::Rc;

use symex_core::Value;

use crate::error::DecisionError;
use crate::heap::HeapPos;
use crate::path_condition::{Clause, PathCondition};

/// One concrete outcome of a decision point. A single sum type, rather than
/// the `(kind, extra)` split a less type-driven language would need, since
/// each variant already names both its decision category and its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AlternativeKind {
    BranchTaken,
    BranchNotTaken,
    SwitchCase(i32),
    SwitchDefault,
    ArrayIn,
    ArrayOut,
    ReferenceNull,
    ReferenceAliases(HeapPos),
    ReferenceExpands(Rc<str>),
}

/// One feasible alternative produced by a fork, tagged with enough metadata
/// for the runner to order successors and encode identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionAlternative {
    pub kind: AlternativeKind,
    pub id: u32,
    pub branch_number: u32,
    /// At most one alternative per fork carries `true`: the one the
    /// decision procedure wasn't actually needed to confirm.
    pub is_concrete: bool,
}

impl DecisionAlternative {
    pub fn new(kind: AlternativeKind, id: u32, branch_number: u32, is_concrete: bool) -> Self {
        Self {
            kind,
            id,
            branch_number,
            is_concrete,
        }
    }

    /// The letter this alternative contributes to a successor's identifier,
    /// per the stable ordering in the fork protocol.
    pub fn identifier_suffix(&self) -> char {
        match self.kind {
            AlternativeKind::BranchTaken => 'T',
            AlternativeKind::BranchNotTaken => 'N',
            AlternativeKind::SwitchCase(_) => 'C',
            AlternativeKind::SwitchDefault => 'D',
            AlternativeKind::ArrayIn => 'I',
            AlternativeKind::ArrayOut => 'O',
            AlternativeKind::ReferenceNull => 'Z',
            AlternativeKind::ReferenceAliases(_) => 'A',
            AlternativeKind::ReferenceExpands(_) => 'E',
        }
    }
}

/// The external SMT/theorem-prover adapter. The engine synchronizes a
/// procedure's assumptions to the state under consideration with
/// `set_assumptions` before its first query, then `push_assumption`
/// incrementally for clauses appended afterward; clones never snapshot the
/// procedure itself, only the path condition (§5).
pub trait DecisionProcedure {
    fn set_assumptions(&mut self, path_condition: &PathCondition) -> Result<(), DecisionError>;
    fn push_assumption(&mut self, clause: &Clause) -> Result<(), DecisionError>;

    fn is_sat(&mut self, condition: &Value) -> Result<bool, DecisionError>;
    fn is_sat_null(&mut self, reference: &Value) -> Result<bool, DecisionError>;
    fn is_sat_aliases(&mut self, reference: &Value, pos: HeapPos) -> Result<bool, DecisionError>;
    fn is_sat_expands(&mut self, reference: &Value, class_name: &str) -> Result<bool, DecisionError>;
    fn is_sat_initialized(&mut self, class_name: &str) -> Result<bool, DecisionError>;
    fn is_sat_not_initialized(&mut self, class_name: &str) -> Result<bool, DecisionError>;

    /// An equivalent, simpler primitive under the current assumptions.
    fn simplify(&mut self, primitive: &Value) -> Result<Value, DecisionError>;

    /// Skip consistency checks for a batch of incremental `push_assumption`
    /// calls; must be paired with `stop_fast_and_imprecise` before the next
    /// `is_sat*` query.
    fn go_fast_and_imprecise(&mut self);
    fn stop_fast_and_imprecise(&mut self);

    /// Release any native/SMT resources. Called when the runner finishes or aborts.
    fn close(&mut self);
}

/// A decision procedure that treats every query as satisfiable and never
/// simplifies. Useful where a path's feasibility isn't under test (e.g.
/// control-flow and resolution tests that don't exercise `Contradiction`).
#[derive(Debug, Default)]
pub struct TrivialDecisionProcedure {
    fast_and_imprecise: bool,
}

impl DecisionProcedure for TrivialDecisionProcedure {
    fn set_assumptions(&mut self, _path_condition: &PathCondition) -> Result<(), DecisionError> {
        Ok(())
    }

    fn push_assumption(&mut self, _clause: &Clause) -> Result<(), DecisionError> {
        Ok(())
    }

    fn is_sat(&mut self, _condition: &Value) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn is_sat_null(&mut self, _reference: &Value) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn is_sat_aliases(&mut self, _reference: &Value, _pos: HeapPos) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn is_sat_expands(&mut self, _reference: &Value, _class_name: &str) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn is_sat_initialized(&mut self, _class_name: &str) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn is_sat_not_initialized(&mut self, _class_name: &str) -> Result<bool, DecisionError> {
        Ok(true)
    }

    fn simplify(&mut self, primitive: &Value) -> Result<Value, DecisionError> {
        Ok(primitive.clone())
    }

    fn go_fast_and_imprecise(&mut self) {
        self.fast_and_imprecise = true;
    }

    fn stop_fast_and_imprecise(&mut self) {
        self.fast_and_imprecise = false;
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_suffixes_are_distinct_per_kind() {
        let alts = [
            AlternativeKind::BranchTaken,
            AlternativeKind::BranchNotTaken,
            AlternativeKind::ArrayIn,
            AlternativeKind::ArrayOut,
            AlternativeKind::ReferenceNull,
        ];
        let suffixes: Vec<char> = alts
            .into_iter()
            .map(|kind| DecisionAlternative::new(kind, 0, 0, false).identifier_suffix())
            .collect();
        let mut sorted = suffixes.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), suffixes.len());
    }

    #[test]
    fn trivial_procedure_accepts_everything() {
        let mut dp = TrivialDecisionProcedure::default();
        assert!(dp.is_sat(&Value::Null).unwrap());
        assert!(dp.is_sat_initialized("pkg/C").unwrap());
    }
}
