//! Unified error types for the engine.
//!
//! Mirrors the phase-layered hierarchy the value algebra uses: one
//! `thiserror` enum per subsystem (resolution, decision procedure, engine),
//! with a crate-level wrapper for callers that don't need to distinguish.
//! Hosted-VM exceptions (§7 tier 1 of the design) are *not* here — they are
//! modeled data (`Stuck::Exception`), never a Rust `Result::Err`.

use thiserror::Error;

use symex_core::CalculatorError;

/// Failures from the class hierarchy oracle and the field/method resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("class file not found: {0}")]
    ClassFileNotFound(String),

    #[error("field not found: {class}::{member}")]
    FieldNotFound { class: String, member: String },

    #[error("method not found: {class}::{member}{descriptor}")]
    MethodNotFound {
        class: String,
        member: String,
        descriptor: String,
    },

    #[error("field not accessible: {class}::{member}")]
    FieldNotAccessible { class: String, member: String },

    #[error("method not accessible: {class}::{member}{descriptor}")]
    MethodNotAccessible {
        class: String,
        member: String,
        descriptor: String,
    },

    #[error("invalid constant pool index: {0}")]
    InvalidIndex(u16),

    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("field {class}::{member} cannot hold a value of this type")]
    IncompatibleFieldType { class: String, member: String },
}

/// Failures surfaced by a [`crate::decision::DecisionProcedure`] adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("decision procedure backend failure: {0}")]
    Backend(String),
}

/// Tier 2/3 errors from §7: engine-recoverable and fatal failures. Tier 1
/// (hosted-VM exceptions) never reach this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The decision procedure rejected every alternative at a fork point;
    /// the state is infeasible and must be pruned by the runner.
    #[error("contradiction: no feasible alternative at this decision point")]
    Contradiction,

    /// A native method invocation could not be modeled.
    #[error("cannot invoke native method: {0}")]
    CannotInvokeNative(String),

    /// An invariant was violated (e.g. a resolution that previously
    /// succeeded now fails). Fatal: the runner aborts and preserves the
    /// offending state for post-mortem inspection.
    #[error("internal invariant violated: {0}")]
    UnexpectedInternal(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Calculator(#[from] CalculatorError),

    /// The current frame's program counter fell outside the method's
    /// bytecode buffer.
    #[error("invalid program counter {pc} in method of length {len}")]
    InvalidProgramCounter { pc: u32, len: u32 },

    /// The thread stack was popped while empty.
    #[error("thread stack is empty")]
    ThreadStackEmpty,

    /// No algorithm is registered for this opcode.
    #[error("unsupported bytecode opcode {0:#04x}")]
    UnsupportedBytecode(u8),
}

impl EngineError {
    /// Tier 3 per §7: errors that abort the runner rather than pruning a
    /// single path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::UnexpectedInternal(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
