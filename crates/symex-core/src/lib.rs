//! Foundational types for the symbolic execution engine: the primitive type
//! alphabet, field/method signatures, the symbolic value algebra, and the
//! calculator/rewriter pipeline that builds and canonicalizes it.
//!
//! This crate has no knowledge of the heap, stack frames, or the step/fork
//! driver — those live in the root `symex` crate, which depends on this one.

pub mod calculator;
pub mod error;
pub mod rewriter;
pub mod signature;
pub mod type_tag;
pub mod value;

pub use calculator::{ArithmeticOutcome, Calculator};
pub use error::{CalculatorError, CoreError};
pub use rewriter::{ComparisonNormalize, ConstantFold, IdentityLaws, Rewriter, RewriterChain};
pub use signature::Signature;
pub use type_tag::TypeTag;
pub use value::{ExpressionNode, FunctionApplicationNode, Operator, Simplex, TermIdGenerator, Value};
