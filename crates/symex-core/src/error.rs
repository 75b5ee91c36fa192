//! Error types for the value algebra.
//!
//! Mirrors the phase-layered error hierarchy used across the rest of the
//! engine: a fine-grained error per subsystem (here, just the calculator),
//! with a crate-level wrapper for callers that don't need to distinguish.

use thiserror::Error;

use crate::type_tag::TypeTag;

/// Errors raised by [`crate::calculator::Calculator`] builders.
///
/// The calculator never silently coerces a mistyped or malformed operand;
/// every builder either returns a `Value` or one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculatorError {
    /// An operand was missing, or an operator received the wrong arity.
    #[error("invalid operand for {operator}: {detail}")]
    InvalidOperand { operator: String, detail: String },

    /// Operand types did not satisfy the operator's type-promotion rules.
    #[error("invalid type for {operator}: expected {expected}, found {found}")]
    InvalidType {
        operator: String,
        expected: TypeTag,
        found: TypeTag,
    },

    /// A unary operator was given two operands, or a binary operator one.
    #[error("invalid operator arity for {operator}")]
    InvalidOperator { operator: String },
}

/// Crate-level error wrapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Calculator(#[from] CalculatorError),
}

pub type Result<T> = std::result::Result<T, CalculatorError>;
