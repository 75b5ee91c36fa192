//! The calculator: sole constructor of primitive [`Value`]s.
//!
//! Every builder validates operand types against the hosted VM's
//! type-promotion rules, evaluates eagerly when every operand is concrete,
//! otherwise builds a symbolic node and pipes it through the rewriter chain
//! exactly once (see `rewriter.rs` module docs for why one pass suffices).

use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::Xxh64;

use crate::error::CalculatorError;
use crate::rewriter::RewriterChain;
use crate::type_tag::TypeTag;
use crate::value::{ExpressionNode, FunctionApplicationNode, Operator, Simplex, Value};

const INTERN_SEED: u64 = 0x9e3779b97f4a7c15;

/// The result of a division or remainder: either a value, or a signal that
/// the (concrete) divisor was zero. Per §4.1 rule 2, the calculator detects
/// this eagerly but does not itself raise the hosted `ArithmeticException`
/// — that is the bytecode algorithm's job once the failure reaches it.
#[derive(Debug, Clone, PartialEq)]
pub enum ArithmeticOutcome {
    Value(Value),
    DivisionByZero,
}

pub struct Calculator {
    rewriters: RewriterChain,
    /// Hash-consing cache for freshly built expression nodes, keyed by an
    /// xxh64 digest of the node's structure. Two structurally equal nodes
    /// share one `Rc` allocation, so later `Rc::ptr_eq` checks (e.g. in a
    /// decision procedure's own memoization) see them as identical without
    /// walking the tree.
    node_cache: RefCell<FxHashMap<u64, Vec<Rc<ExpressionNode>>>>,
}

impl Calculator {
    pub fn new(rewriters: RewriterChain) -> Self {
        Self { rewriters, node_cache: RefCell::new(FxHashMap::default()) }
    }

    fn op_name(op: Operator) -> String {
        op.to_string()
    }

    fn intern(&self, node: ExpressionNode) -> Rc<ExpressionNode> {
        let mut hasher = Xxh64::new(INTERN_SEED);
        node.hash(&mut hasher);
        let digest = hasher.finish();

        let mut cache = self.node_cache.borrow_mut();
        let bucket = cache.entry(digest).or_default();
        if let Some(existing) = bucket.iter().find(|candidate| candidate.as_ref() == &node) {
            return Rc::clone(existing);
        }
        let interned = Rc::new(node);
        bucket.push(Rc::clone(&interned));
        interned
    }

    fn promoted_binary_type(
        op: Operator,
        left: TypeTag,
        right: TypeTag,
    ) -> Result<TypeTag, CalculatorError> {
        let pl = left.promote();
        let pr = right.promote();
        if pl != pr {
            return Err(CalculatorError::InvalidType {
                operator: Self::op_name(op),
                expected: pl,
                found: pr,
            });
        }
        Ok(pl)
    }

    /// Build (or eagerly evaluate) a binary arithmetic/bitwise/shift/comparison
    /// expression, honoring JVM-style type promotion.
    pub fn binary(&self, op: Operator, left: Value, right: Value) -> Result<Value, CalculatorError> {
        if op.is_unary() {
            return Err(CalculatorError::InvalidOperator {
                operator: Self::op_name(op),
            });
        }
        let left_ty = left
            .type_tag()
            .ok_or_else(|| CalculatorError::InvalidOperand {
                operator: Self::op_name(op),
                detail: "left operand is not a primitive".into(),
            })?;
        let right_ty = right
            .type_tag()
            .ok_or_else(|| CalculatorError::InvalidOperand {
                operator: Self::op_name(op),
                detail: "right operand is not a primitive".into(),
            })?;

        if (left_ty == TypeTag::Boolean) != (right_ty == TypeTag::Boolean) {
            return Err(CalculatorError::InvalidType {
                operator: Self::op_name(op),
                expected: left_ty,
                found: right_ty,
            });
        }

        let result_ty = match op {
            Operator::Shl | Operator::Shr | Operator::Ushr => {
                if right_ty.promote() != TypeTag::Int {
                    return Err(CalculatorError::InvalidType {
                        operator: Self::op_name(op),
                        expected: TypeTag::Int,
                        found: right_ty,
                    });
                }
                left_ty.promote()
            }
            _ => Self::promoted_binary_type(op, left_ty, right_ty)?,
        };

        if op.is_comparison() {
            if matches!(op, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
                && result_ty == TypeTag::Boolean
            {
                return Err(CalculatorError::InvalidType {
                    operator: Self::op_name(op),
                    expected: TypeTag::Int,
                    found: TypeTag::Boolean,
                });
            }
        } else if matches!(op, Operator::And | Operator::Or | Operator::Xor) {
            // allowed on Boolean directly, or on promoted integral types
        } else if result_ty == TypeTag::Boolean {
            return Err(CalculatorError::InvalidType {
                operator: Self::op_name(op),
                expected: TypeTag::Int,
                found: TypeTag::Boolean,
            });
        }

        if let (Some(l), Some(r)) = (left.as_simplex(), right.as_simplex()) {
            return Ok(Value::Simplex(eval_binary(op, l, r)?));
        }

        let node_ty = if op.is_comparison() { TypeTag::Boolean } else { result_ty };
        let node = ExpressionNode {
            ty: node_ty,
            unary: false,
            operator: op,
            left,
            right: Some(right),
        };
        Ok(self.rewriters.apply(Value::Expression(self.intern(node))))
    }

    /// Division, with the zero-divisor case surfaced as [`ArithmeticOutcome::DivisionByZero`]
    /// rather than a `CalculatorError` (division by a non-zero or symbolic
    /// divisor is a plain binary builder).
    pub fn div(&self, left: Value, right: Value) -> Result<ArithmeticOutcome, CalculatorError> {
        self.checked_div_rem(Operator::Div, left, right)
    }

    pub fn rem(&self, left: Value, right: Value) -> Result<ArithmeticOutcome, CalculatorError> {
        self.checked_div_rem(Operator::Rem, left, right)
    }

    fn checked_div_rem(
        &self,
        op: Operator,
        left: Value,
        right: Value,
    ) -> Result<ArithmeticOutcome, CalculatorError> {
        if let Some(r) = right.as_simplex()
            && r.is_zero()
        {
            return Ok(ArithmeticOutcome::DivisionByZero);
        }
        self.binary(op, left, right).map(ArithmeticOutcome::Value)
    }

    /// Build (or eagerly evaluate) a unary arithmetic/bitwise/logical expression.
    pub fn unary(&self, op: Operator, arg: Value) -> Result<Value, CalculatorError> {
        if !op.is_unary() {
            return Err(CalculatorError::InvalidOperator {
                operator: Self::op_name(op),
            });
        }
        let arg_ty = arg
            .type_tag()
            .ok_or_else(|| CalculatorError::InvalidOperand {
                operator: Self::op_name(op),
                detail: "operand is not a primitive".into(),
            })?;

        let result_ty = match op {
            Operator::Not => {
                if arg_ty != TypeTag::Boolean {
                    return Err(CalculatorError::InvalidType {
                        operator: Self::op_name(op),
                        expected: TypeTag::Boolean,
                        found: arg_ty,
                    });
                }
                TypeTag::Boolean
            }
            Operator::Neg | Operator::BitNot => {
                let promoted = arg_ty.promote();
                if promoted == TypeTag::Boolean {
                    return Err(CalculatorError::InvalidType {
                        operator: Self::op_name(op),
                        expected: TypeTag::Int,
                        found: arg_ty,
                    });
                }
                promoted
            }
            _ => unreachable!("non-unary operator filtered above"),
        };

        if let Some(v) = arg.as_simplex() {
            return Ok(Value::Simplex(eval_unary(op, v)?));
        }

        let node = ExpressionNode {
            ty: result_ty,
            unary: true,
            operator: op,
            left: arg,
            right: None,
        };
        Ok(self.rewriters.apply(Value::Expression(self.intern(node))))
    }

    /// A widening conversion (`byte -> int`, `int -> long`, `int -> float`, ...).
    pub fn widen(&self, dst: TypeTag, arg: Value) -> Result<Value, CalculatorError> {
        let src = arg
            .type_tag()
            .ok_or_else(|| CalculatorError::InvalidOperand {
                operator: "widen".into(),
                detail: "operand is not a primitive".into(),
            })?;
        if let Some(simplex) = arg.as_simplex() {
            return Ok(Value::Simplex(widen_simplex(dst, simplex).ok_or_else(
                || CalculatorError::InvalidType {
                    operator: "widen".into(),
                    expected: dst,
                    found: src,
                },
            )?));
        }
        Ok(self.rewriters.apply(Value::WideningConversion {
            dst,
            arg: Rc::new(arg),
        }))
    }

    /// A narrowing conversion (`int -> byte`, `double -> int`, ...).
    pub fn narrow(&self, dst: TypeTag, arg: Value) -> Result<Value, CalculatorError> {
        if arg.type_tag().is_none() {
            return Err(CalculatorError::InvalidOperand {
                operator: "narrow".into(),
                detail: "operand is not a primitive".into(),
            });
        }
        if let Some(simplex) = arg.as_simplex() {
            return Ok(Value::Simplex(narrow_simplex(dst, simplex)));
        }
        Ok(self.rewriters.apply(Value::NarrowingConversion {
            dst,
            arg: Rc::new(arg),
        }))
    }

    /// An uninterpreted function application over primitive arguments (used
    /// to model native/library primitives the engine does not evaluate
    /// itself, e.g. `Math.sqrt`).
    pub fn apply_function(
        &self,
        ty: TypeTag,
        name: impl Into<Rc<str>>,
        args: Vec<Value>,
    ) -> Result<Value, CalculatorError> {
        for arg in &args {
            if arg.type_tag().is_none() {
                return Err(CalculatorError::InvalidOperand {
                    operator: "apply_function".into(),
                    detail: "argument is not a primitive".into(),
                });
            }
        }
        let node = FunctionApplicationNode {
            ty,
            name: name.into(),
            args,
        };
        Ok(self.rewriters.apply(Value::FunctionApplication(Rc::new(node))))
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new(RewriterChain::standard())
    }
}

pub(crate) fn eval_binary(op: Operator, l: Simplex, r: Simplex) -> Result<Simplex, CalculatorError> {
    use Operator::*;
    let err = || CalculatorError::InvalidOperand {
        operator: op.to_string(),
        detail: format!("incompatible operand kinds {l:?}, {r:?}"),
    };
    Ok(match (op, l, r) {
        (Add, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_add(b)),
        (Sub, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_sub(b)),
        (Mul, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_mul(b)),
        (Div, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_div(b)),
        (Rem, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_rem(b)),
        (And, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a & b),
        (Or, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a | b),
        (Xor, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a ^ b),
        (Shl, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_shl(b as u32 & 31)),
        (Shr, Simplex::Int(a), Simplex::Int(b)) => Simplex::Int(a.wrapping_shr(b as u32 & 31)),
        (Ushr, Simplex::Int(a), Simplex::Int(b)) => {
            Simplex::Int(((a as u32).wrapping_shr(b as u32 & 31)) as i32)
        }
        (Eq, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a == b),
        (Ne, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a != b),
        (Lt, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a < b),
        (Le, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a <= b),
        (Gt, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a > b),
        (Ge, Simplex::Int(a), Simplex::Int(b)) => Simplex::Boolean(a >= b),

        (Add, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a.wrapping_add(b)),
        (Sub, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a.wrapping_sub(b)),
        (Mul, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a.wrapping_mul(b)),
        (Div, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a.wrapping_div(b)),
        (Rem, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a.wrapping_rem(b)),
        (And, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a & b),
        (Or, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a | b),
        (Xor, Simplex::Long(a), Simplex::Long(b)) => Simplex::Long(a ^ b),
        (Shl, Simplex::Long(a), Simplex::Int(b)) => Simplex::Long(a.wrapping_shl(b as u32 & 63)),
        (Shr, Simplex::Long(a), Simplex::Int(b)) => Simplex::Long(a.wrapping_shr(b as u32 & 63)),
        (Ushr, Simplex::Long(a), Simplex::Int(b)) => {
            Simplex::Long(((a as u64).wrapping_shr(b as u32 & 63)) as i64)
        }
        (Eq, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a == b),
        (Ne, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a != b),
        (Lt, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a < b),
        (Le, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a <= b),
        (Gt, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a > b),
        (Ge, Simplex::Long(a), Simplex::Long(b)) => Simplex::Boolean(a >= b),

        (Add, Simplex::Float(a), Simplex::Float(b)) => Simplex::Float(OrderedFloat(a.0 + b.0)),
        (Sub, Simplex::Float(a), Simplex::Float(b)) => Simplex::Float(OrderedFloat(a.0 - b.0)),
        (Mul, Simplex::Float(a), Simplex::Float(b)) => Simplex::Float(OrderedFloat(a.0 * b.0)),
        (Div, Simplex::Float(a), Simplex::Float(b)) => Simplex::Float(OrderedFloat(a.0 / b.0)),
        (Rem, Simplex::Float(a), Simplex::Float(b)) => Simplex::Float(OrderedFloat(a.0 % b.0)),
        (Eq, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 == b.0),
        (Ne, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 != b.0),
        (Lt, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 < b.0),
        (Le, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 <= b.0),
        (Gt, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 > b.0),
        (Ge, Simplex::Float(a), Simplex::Float(b)) => Simplex::Boolean(a.0 >= b.0),

        (Add, Simplex::Double(a), Simplex::Double(b)) => Simplex::Double(OrderedFloat(a.0 + b.0)),
        (Sub, Simplex::Double(a), Simplex::Double(b)) => Simplex::Double(OrderedFloat(a.0 - b.0)),
        (Mul, Simplex::Double(a), Simplex::Double(b)) => Simplex::Double(OrderedFloat(a.0 * b.0)),
        (Div, Simplex::Double(a), Simplex::Double(b)) => Simplex::Double(OrderedFloat(a.0 / b.0)),
        (Rem, Simplex::Double(a), Simplex::Double(b)) => Simplex::Double(OrderedFloat(a.0 % b.0)),
        (Eq, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 == b.0),
        (Ne, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 != b.0),
        (Lt, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 < b.0),
        (Le, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 <= b.0),
        (Gt, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 > b.0),
        (Ge, Simplex::Double(a), Simplex::Double(b)) => Simplex::Boolean(a.0 >= b.0),

        (And, Simplex::Boolean(a), Simplex::Boolean(b)) => Simplex::Boolean(a & b),
        (Or, Simplex::Boolean(a), Simplex::Boolean(b)) => Simplex::Boolean(a | b),
        (Xor, Simplex::Boolean(a), Simplex::Boolean(b)) => Simplex::Boolean(a ^ b),
        (Eq, Simplex::Boolean(a), Simplex::Boolean(b)) => Simplex::Boolean(a == b),
        (Ne, Simplex::Boolean(a), Simplex::Boolean(b)) => Simplex::Boolean(a != b),

        _ => return Err(err()),
    })
}

pub(crate) fn eval_unary(op: Operator, v: Simplex) -> Result<Simplex, CalculatorError> {
    use Operator::*;
    Ok(match (op, v) {
        (Neg, Simplex::Int(a)) => Simplex::Int(a.wrapping_neg()),
        (Neg, Simplex::Long(a)) => Simplex::Long(a.wrapping_neg()),
        (Neg, Simplex::Float(a)) => Simplex::Float(OrderedFloat(-a.0)),
        (Neg, Simplex::Double(a)) => Simplex::Double(OrderedFloat(-a.0)),
        (BitNot, Simplex::Int(a)) => Simplex::Int(!a),
        (BitNot, Simplex::Long(a)) => Simplex::Long(!a),
        (Not, Simplex::Boolean(a)) => Simplex::Boolean(!a),
        _ => {
            return Err(CalculatorError::InvalidOperand {
                operator: op.to_string(),
                detail: format!("cannot apply to {v:?}"),
            });
        }
    })
}

fn widen_simplex(dst: TypeTag, v: Simplex) -> Option<Simplex> {
    use Simplex::*;
    Some(match (dst, v) {
        (TypeTag::Short, Byte(a)) => Short(a as i16),
        (TypeTag::Int, Byte(a)) => Int(a as i32),
        (TypeTag::Int, Short(a)) => Int(a as i32),
        (TypeTag::Int, Char(a)) => Int(a as i32),
        (TypeTag::Long, Byte(a)) => Long(a as i64),
        (TypeTag::Long, Short(a)) => Long(a as i64),
        (TypeTag::Long, Char(a)) => Long(a as i64),
        (TypeTag::Long, Int(a)) => Long(a as i64),
        (TypeTag::Float, Byte(a)) => Float(OrderedFloat(a as f32)),
        (TypeTag::Float, Short(a)) => Float(OrderedFloat(a as f32)),
        (TypeTag::Float, Char(a)) => Float(OrderedFloat(a as f32)),
        (TypeTag::Float, Int(a)) => Float(OrderedFloat(a as f32)),
        (TypeTag::Float, Long(a)) => Float(OrderedFloat(a as f32)),
        (TypeTag::Double, Byte(a)) => Double(OrderedFloat(a as f64)),
        (TypeTag::Double, Short(a)) => Double(OrderedFloat(a as f64)),
        (TypeTag::Double, Char(a)) => Double(OrderedFloat(a as f64)),
        (TypeTag::Double, Int(a)) => Double(OrderedFloat(a as f64)),
        (TypeTag::Double, Long(a)) => Double(OrderedFloat(a as f64)),
        (TypeTag::Double, Float(a)) => Double(OrderedFloat(a.0 as f64)),
        _ if dst == v.type_tag() => v,
        _ => return None,
    })
}

fn narrow_simplex(dst: TypeTag, v: Simplex) -> Simplex {
    use Simplex::*;
    match (dst, v) {
        (TypeTag::Byte, Int(a)) => Byte(a as i8),
        (TypeTag::Short, Int(a)) => Short(a as i16),
        (TypeTag::Char, Int(a)) => Char(a as u16),
        (TypeTag::Int, Long(a)) => Int(a as i32),
        (TypeTag::Int, Float(a)) => Int(a.0 as i32),
        (TypeTag::Int, Double(a)) => Int(a.0 as i32),
        (TypeTag::Long, Float(a)) => Long(a.0 as i64),
        (TypeTag::Long, Double(a)) => Long(a.0 as i64),
        (TypeTag::Float, Double(a)) => Float(OrderedFloat(a.0 as f32)),
        (TypeTag::Byte, Short(a)) => Byte(a as i8),
        (TypeTag::Byte, Char(a)) => Byte(a as i8),
        _ => v,
    }
}
