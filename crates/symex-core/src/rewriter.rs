//! The rewriter pipeline: a visitor over the primitive algebra that
//! canonicalizes and simplifies freshly built nodes.
//!
//! Each [`Rewriter`] is a small visitor with one hook per node kind; the
//! default hook is the identity (build the node as given). A
//! [`RewriterChain`] composes several rewriters by folding each node through
//! them in order. The [`crate::calculator::Calculator`] calls the chain
//! exactly once per newly built node — operands are already canonical
//! because they were produced by earlier calculator calls that went through
//! the same chain, so one pass at each level is enough to keep the whole
//! tree in normal form (this is also what makes `rewrite(rewrite(p)) ==
//! rewrite(p)`: re-running the chain on an already-normal node is a no-op).

use std::rc::Rc;

use crate::value::{ExpressionNode, FunctionApplicationNode, Operator, Simplex, Value};

/// A visitor over one freshly-constructed primitive node.
///
/// Implementors override only the hooks relevant to the simplification they
/// perform; unhandled kinds fall through to the default (identity) build.
pub trait Rewriter {
    fn name(&self) -> &'static str;

    /// Takes the already-interned `Rc` so a no-op rewrite can hand it back
    /// unchanged instead of reallocating — this is what lets
    /// [`crate::calculator::Calculator`]'s hash-consing cache survive the
    /// rewriter chain: a structurally-equal node built twice stays
    /// `Rc::ptr_eq` all the way out of `apply` as long as every stage's
    /// fallback path returns the same `Rc` it was given.
    fn rewrite_expression(&self, node: Rc<ExpressionNode>) -> Value {
        Value::Expression(node)
    }

    fn rewrite_widening(&self, dst: crate::type_tag::TypeTag, arg: Value) -> Value {
        Value::WideningConversion {
            dst,
            arg: Rc::new(arg),
        }
    }

    fn rewrite_narrowing(&self, dst: crate::type_tag::TypeTag, arg: Value) -> Value {
        Value::NarrowingConversion {
            dst,
            arg: Rc::new(arg),
        }
    }

    fn rewrite_function_application(&self, node: FunctionApplicationNode) -> Value {
        Value::FunctionApplication(Rc::new(node))
    }

    /// Dispatch a value to the hook for its kind; non-compound values (already
    /// in normal form by construction) pass through unchanged.
    fn dispatch(&self, value: Value) -> Value {
        match value {
            Value::Expression(node) => self.rewrite_expression(node),
            Value::WideningConversion { dst, arg } => {
                self.rewrite_widening(dst, Rc::unwrap_or_clone(arg))
            }
            Value::NarrowingConversion { dst, arg } => {
                self.rewrite_narrowing(dst, Rc::unwrap_or_clone(arg))
            }
            Value::FunctionApplication(node) => {
                self.rewrite_function_application(Rc::unwrap_or_clone(node))
            }
            other => other,
        }
    }
}

/// Constant folding: if every operand of a compound node is `Simplex`, this
/// rewriter is not expected to run (the calculator evaluates eagerly per
/// §4.1 rule 2) but it is kept as a safety net for nodes assembled outside
/// the calculator's builders (e.g. by other rewriters rebuilding a tree).
#[derive(Debug, Default)]
pub struct ConstantFold;

impl Rewriter for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn rewrite_expression(&self, node: Rc<ExpressionNode>) -> Value {
        if let Some(folded) = try_fold(&node) {
            return Value::Simplex(folded);
        }
        Value::Expression(node)
    }
}

fn try_fold(node: &ExpressionNode) -> Option<Simplex> {
    let left = node.left.as_simplex()?;
    if node.unary {
        return crate::calculator::eval_unary(node.operator, left).ok();
    }
    let right = node.right.as_ref()?.as_simplex()?;
    crate::calculator::eval_binary(node.operator, left, right).ok()
}

/// Algebraic identity laws: `x+0=x`, `x*1=x`, `x&0=0`, `x|0=x`,
/// `neg(neg(x))=x`, `not(not(x))=x`, and collapsing redundant conversions.
#[derive(Debug, Default)]
pub struct IdentityLaws;

impl Rewriter for IdentityLaws {
    fn name(&self) -> &'static str {
        "identity-laws"
    }

    fn rewrite_expression(&self, node: Rc<ExpressionNode>) -> Value {
        use Operator::*;

        if node.unary {
            if matches!(node.operator, Neg | Not | BitNot)
                && let Value::Expression(inner) = &node.left
                && inner.unary
                && inner.operator == node.operator
            {
                return inner.left.clone();
            }
            return Value::Expression(node);
        }

        let right = node.right.as_ref().expect("binary node has right operand");
        match node.operator {
            Add if is_zero(right) => return node.left.clone(),
            Add if is_zero(&node.left) => return right.clone(),
            Mul if is_one(right) => return node.left.clone(),
            Mul if is_one(&node.left) => return right.clone(),
            Mul if is_zero(right) || is_zero(&node.left) => {
                return Value::Simplex(zero_like(node.ty))
            }
            Sub if is_zero(right) => return node.left.clone(),
            And if is_zero(right) || is_zero(&node.left) => {
                return Value::Simplex(zero_like(node.ty))
            }
            Or if is_zero(right) => return node.left.clone(),
            Or if is_zero(&node.left) => return right.clone(),
            Xor if is_zero(right) => return node.left.clone(),
            Xor if is_zero(&node.left) => return right.clone(),
            _ => {}
        }
        Value::Expression(node)
    }

    fn rewrite_widening(&self, dst: crate::type_tag::TypeTag, arg: Value) -> Value {
        // Widening to the type the value already has is redundant.
        if arg.type_tag() == Some(dst) {
            return arg;
        }
        // Double widening collapses to a single widening to the final type.
        if let Value::WideningConversion { arg: inner, .. } = &arg {
            return Value::WideningConversion {
                dst,
                arg: inner.clone(),
            };
        }
        Value::WideningConversion {
            dst,
            arg: Rc::new(arg),
        }
    }

    fn rewrite_narrowing(&self, dst: crate::type_tag::TypeTag, arg: Value) -> Value {
        if arg.type_tag() == Some(dst) {
            return arg;
        }
        if let Value::NarrowingConversion { arg: inner, .. } = &arg {
            return Value::NarrowingConversion {
                dst,
                arg: inner.clone(),
            };
        }
        Value::NarrowingConversion {
            dst,
            arg: Rc::new(arg),
        }
    }
}

/// Normalizes `>` and `>=` to `<` and `<=` with swapped operands, giving
/// comparisons a single canonical shape so that `a < b` built two different
/// ways always produces the same tree.
#[derive(Debug, Default)]
pub struct ComparisonNormalize;

impl Rewriter for ComparisonNormalize {
    fn name(&self) -> &'static str {
        "comparison-normalize"
    }

    fn rewrite_expression(&self, node: Rc<ExpressionNode>) -> Value {
        if node.unary || !matches!(node.operator, Operator::Gt | Operator::Ge) {
            return Value::Expression(node);
        }
        let swapped = node.operator.swapped().expect("comparison operators swap");
        Value::Expression(Rc::new(ExpressionNode {
            ty: node.ty,
            unary: false,
            operator: swapped,
            left: node.right.clone().expect("binary node has right operand"),
            right: Some(node.left.clone()),
        }))
    }
}

fn is_zero(v: &Value) -> bool {
    matches!(v.as_simplex(), Some(s) if s.is_zero())
}

fn is_one(v: &Value) -> bool {
    matches!(v.as_simplex(), Some(s) if s.is_one())
}

fn zero_like(ty: crate::type_tag::TypeTag) -> Simplex {
    use crate::type_tag::TypeTag;
    match ty {
        TypeTag::Byte => Simplex::Byte(0),
        TypeTag::Char => Simplex::Char(0),
        TypeTag::Double => Simplex::Double(ordered_float::OrderedFloat(0.0)),
        TypeTag::Float => Simplex::Float(ordered_float::OrderedFloat(0.0)),
        TypeTag::Int => Simplex::Int(0),
        TypeTag::Long => Simplex::Long(0),
        TypeTag::Short => Simplex::Short(0),
        TypeTag::Boolean => Simplex::Boolean(false),
        _ => Simplex::Int(0),
    }
}

/// An ordered sequence of rewriters, applied left to right, used by the
/// calculator for every compound node it builds.
pub struct RewriterChain {
    rewriters: Vec<Box<dyn Rewriter>>,
}

impl RewriterChain {
    pub fn new(rewriters: Vec<Box<dyn Rewriter>>) -> Self {
        Self { rewriters }
    }

    /// The chain this engine ships by default: normalize comparisons, apply
    /// identity laws, then fold any constants the previous steps exposed.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ComparisonNormalize),
            Box::new(IdentityLaws),
            Box::new(ConstantFold),
        ])
    }

    pub fn apply(&self, value: Value) -> Value {
        self.rewriters.iter().fold(value, |v, rw| rw.dispatch(v))
    }
}

impl Default for RewriterChain {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_tag::TypeTag;

    fn int(n: i32) -> Value {
        Value::Simplex(Simplex::Int(n))
    }

    fn term() -> Value {
        Value::Term {
            ty: TypeTag::Int,
            id: 7,
        }
    }

    #[test]
    fn add_zero_identity() {
        let chain = RewriterChain::standard();
        let node = ExpressionNode {
            ty: TypeTag::Int,
            unary: false,
            operator: Operator::Add,
            left: term(),
            right: Some(int(0)),
        };
        assert_eq!(chain.apply(Value::Expression(Rc::new(node))), term());
    }

    #[test]
    fn mul_one_identity() {
        let chain = RewriterChain::standard();
        let node = ExpressionNode {
            ty: TypeTag::Int,
            unary: false,
            operator: Operator::Mul,
            left: term(),
            right: Some(int(1)),
        };
        assert_eq!(chain.apply(Value::Expression(Rc::new(node))), term());
    }

    #[test]
    fn double_negation_cancels() {
        let chain = RewriterChain::standard();
        let inner = Value::Expression(Rc::new(ExpressionNode {
            ty: TypeTag::Int,
            unary: true,
            operator: Operator::Neg,
            left: term(),
            right: None,
        }));
        let outer = ExpressionNode {
            ty: TypeTag::Int,
            unary: true,
            operator: Operator::Neg,
            left: inner,
            right: None,
        };
        assert_eq!(chain.apply(Value::Expression(Rc::new(outer))), term());
    }

    #[test]
    fn comparison_normalization_swaps_gt_to_lt() {
        let chain = RewriterChain::standard();
        let node = ExpressionNode {
            ty: TypeTag::Boolean,
            unary: false,
            operator: Operator::Gt,
            left: term(),
            right: Some(int(3)),
        };
        let rewritten = chain.apply(Value::Expression(Rc::new(node)));
        match rewritten {
            Value::Expression(e) => {
                assert_eq!(e.operator, Operator::Lt);
                assert_eq!(e.left, int(3));
                assert_eq!(e.right, Some(term()));
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn rewrite_idempotence() {
        let chain = RewriterChain::standard();
        let node = ExpressionNode {
            ty: TypeTag::Int,
            unary: false,
            operator: Operator::Add,
            left: term(),
            right: Some(int(5)),
        };
        let once = chain.apply(Value::Expression(Rc::new(node)));
        let twice = chain.apply(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn redundant_widening_collapses() {
        let chain = RewriterChain::standard();
        let widened_once = chain.apply(Value::WideningConversion {
            dst: TypeTag::Long,
            arg: Rc::new(Value::Simplex(Simplex::Int(4))),
        });
        let widened_twice = chain.apply(Value::WideningConversion {
            dst: TypeTag::Long,
            arg: Rc::new(widened_once.clone()),
        });
        assert_eq!(widened_twice, widened_once);
    }
}
