//! Runtime numbers and the operators defined on them.

use std::cmp::Ordering;
use std::fmt;

use snafu::OptionExt;

use crate::ast::BinOp;
use crate::error::{DivisionByZeroSnafu, OverflowSnafu, RuntimeError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub const TRUE: Number = Number::Int(1);
    pub const FALSE: Number = Number::Int(0);

    pub fn from_bool(b: bool) -> Self {
        if b {
            Number::TRUE
        } else {
            Number::FALSE
        }
    }

    pub fn is_true(self) -> bool {
        match self {
            Number::Int(i) => i != 0,
            Number::Float(x) => x != 0.0,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }

    pub fn apply(self, op: BinOp, other: Number) -> Result<Number, RuntimeError> {
        match op {
            BinOp::Add => self.arith(other, op, i64::checked_add, |a, b| a + b),
            BinOp::Sub => self.arith(other, op, i64::checked_sub, |a, b| a - b),
            BinOp::Mul => self.arith(other, op, i64::checked_mul, |a, b| a * b),
            BinOp::Div => self.divide(other),
            BinOp::Eq => Ok(Number::from_bool(self.compare(other) == Some(Ordering::Equal))),
            BinOp::Ne => Ok(Number::from_bool(self.compare(other) != Some(Ordering::Equal))),
            BinOp::Gt => Ok(Number::from_bool(self.compare(other) == Some(Ordering::Greater))),
            BinOp::Ge => Ok(Number::from_bool(matches!(
                self.compare(other),
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinOp::Lt => Ok(Number::from_bool(self.compare(other) == Some(Ordering::Less))),
            BinOp::Le => Ok(Number::from_bool(matches!(
                self.compare(other),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinOp::And => Ok(Number::from_bool(self.is_true() && other.is_true())),
            BinOp::Or => Ok(Number::from_bool(self.is_true() || other.is_true())),
        }
    }

    fn arith(
        self,
        other: Number,
        op: BinOp,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Number, RuntimeError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => int_op(a, b)
                .map(Number::Int)
                .context(OverflowSnafu { op: op.spelling() }),
            (a, b) => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
        }
    }

    /// Integer division truncates toward zero, matching `__aeabi_idiv`.
    fn divide(self, other: Number) -> Result<Number, RuntimeError> {
        if !other.is_true() {
            return DivisionByZeroSnafu.fail();
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_div(b)
                .map(Number::Int)
                .context(OverflowSnafu { op: "/" }),
            (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{:?}", x),
        }
    }
}
