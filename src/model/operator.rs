//! Operator model: Java symbols, value semantics and solver term builders.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{Arith, Cmp, JattackError, JattackResult, Term, Throwable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AriOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AriOp {
    pub const ALL: [AriOp; 5] = [Self::Add, Self::Sub, Self::Mul, Self::Div, Self::Mod];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }

    /// Applies the operator after binary numeric promotion.
    ///
    /// Integral division or remainder by zero raises `ArithmeticException`; int and long
    /// arithmetic wraps.
    pub fn apply(self, left: &Value, right: &Value) -> JattackResult<Value> {
        let (l, r) = Value::promote(left, right)?;
        Ok(match (l, r) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match self {
                Self::Add => a.wrapping_add(b),
                Self::Sub => a.wrapping_sub(b),
                Self::Mul => a.wrapping_mul(b),
                Self::Div if b == 0 => return Err(Throwable::arithmetic().into()),
                Self::Div => a.wrapping_div(b),
                Self::Mod if b == 0 => return Err(Throwable::arithmetic().into()),
                Self::Mod => a.wrapping_rem(b),
            }),
            (Value::Long(a), Value::Long(b)) => Value::Long(match self {
                Self::Add => a.wrapping_add(b),
                Self::Sub => a.wrapping_sub(b),
                Self::Mul => a.wrapping_mul(b),
                Self::Div if b == 0 => return Err(Throwable::arithmetic().into()),
                Self::Div => a.wrapping_div(b),
                Self::Mod if b == 0 => return Err(Throwable::arithmetic().into()),
                Self::Mod => a.wrapping_rem(b),
            }),
            (Value::Double(a), Value::Double(b)) => Value::Double(match self {
                Self::Add => a + b,
                Self::Sub => a - b,
                Self::Mul => a * b,
                Self::Div => a / b,
                Self::Mod => a % b,
            }),
            (l, r) => {
                return Err(JattackError::InvalidArgument(format!(
                    "{} not applicable to {l:?} and {r:?}",
                    self.symbol()
                )))
            }
        })
    }

    /// `None` means the solver integration abstains for this operator.
    pub fn term(self, left: Term, right: Term) -> Option<Term> {
        let op = match self {
            Self::Add => Arith::Add,
            Self::Sub => Arith::Sub,
            Self::Mul => Arith::Mul,
            Self::Div => Arith::Div,
            Self::Mod => return None,
        };
        Some(Term::Arith(op, Box::new(left), Box::new(right)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    pub const ALL: [RelOp; 6] = [Self::Eq, Self::Ge, Self::Gt, Self::Le, Self::Lt, Self::Ne];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn apply(self, left: &Value, right: &Value) -> JattackResult<bool> {
        if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
            return match self {
                Self::Eq => Ok(a == b),
                Self::Ne => Ok(a != b),
                _ => Err(JattackError::InvalidArgument(format!(
                    "{} not applicable to booleans",
                    self.symbol()
                ))),
            };
        }
        if left.ty().is_reference() || right.ty().is_reference() {
            return match self {
                Self::Eq => Ok(left.same(right)),
                Self::Ne => Ok(!left.same(right)),
                _ => Err(JattackError::InvalidArgument(format!(
                    "{} not applicable to references",
                    self.symbol()
                ))),
            };
        }
        let (l, r) = Value::promote(left, right)?;
        Ok(match (l, r) {
            (Value::Double(a), Value::Double(b)) => self.compare(a, b),
            (l, r) => self.compare(l.as_i64()?, r.as_i64()?),
        })
    }

    fn compare<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }

    pub fn term(self, left: Term, right: Term) -> Option<Term> {
        let cmp = match self {
            Self::Eq => Cmp::Eq,
            // NE is built as the negation of EQ.
            Self::Ne => {
                return Some(Term::Not(Box::new(Term::Cmp(
                    Cmp::Eq,
                    Box::new(left),
                    Box::new(right),
                ))))
            }
            Self::Lt => Cmp::Lt,
            Self::Le => Cmp::Le,
            Self::Gt => Cmp::Gt,
            Self::Ge => Cmp::Ge,
        };
        Some(Term::Cmp(cmp, Box::new(left), Box::new(right)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOp {
    And,
    Or,
}

impl LogOp {
    pub const ALL: [LogOp; 2] = [Self::And, Self::Or];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// The result decided by the left operand alone, if any.
    pub fn short_circuit(self, left: bool) -> Option<bool> {
        match (self, left) {
            (Self::And, false) => Some(false),
            (Self::Or, true) => Some(true),
            _ => None,
        }
    }

    pub fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }

    pub fn term(self, left: Term, right: Term) -> Option<Term> {
        Some(match self {
            Self::And => Term::And(Box::new(left), Box::new(right)),
            Self::Or => Term::Or(Box::new(left), Box::new(right)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftOp {
    Shl,
    Shr,
    Ushr,
}

impl ShiftOp {
    pub const ALL: [ShiftOp; 3] = [Self::Shl, Self::Shr, Self::Ushr];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Ushr => ">>>",
        }
    }

    /// The left operand keeps its own (int or long) type; the distance is masked to
    /// 5 or 6 bits.
    pub fn apply(self, left: &Value, right: &Value) -> JattackResult<Value> {
        let distance = right.as_i64()?;
        Ok(match left {
            Value::Int(v) => {
                let n = (distance & 0x1f) as u32;
                Value::Int(match self {
                    Self::Shl => v.wrapping_shl(n),
                    Self::Shr => v.wrapping_shr(n),
                    Self::Ushr => ((*v as u32) >> n) as i32,
                })
            }
            Value::Long(v) => {
                let n = (distance & 0x3f) as u32;
                Value::Long(match self {
                    Self::Shl => v.wrapping_shl(n),
                    Self::Shr => v.wrapping_shr(n),
                    Self::Ushr => ((*v as u64) >> n) as i64,
                })
            }
            other => {
                return Err(JattackError::InvalidArgument(format!(
                    "{} not applicable to {other:?}",
                    self.symbol()
                )))
            }
        })
    }

    pub fn term(self, left: Term, right: Term, wide: bool) -> Option<Term> {
        Some(Term::Shift {
            op: self,
            wide,
            value: Box::new(left),
            amount: Box::new(right),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncDecOp {
    PreInc,
}

impl IncDecOp {
    pub fn symbol(self) -> &'static str {
        "++"
    }

    pub fn apply(self, v: &Value) -> JattackResult<Value> {
        match v {
            Value::Int(i) => Ok(Value::Int(i.wrapping_add(1))),
            Value::Long(l) => Ok(Value::Long(l.wrapping_add(1))),
            Value::Double(d) => Ok(Value::Double(d + 1.0)),
            other => Err(JattackError::InvalidArgument(format!("++ not applicable to {other:?}"))),
        }
    }
}

/// Any binary operator; used by operator-choice nodes and template expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "op", rename_all = "snake_case")]
pub enum Operator {
    Ari(AriOp),
    Rel(RelOp),
    Log(LogOp),
    Shift(ShiftOp),
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Ari(op) => op.symbol(),
            Self::Rel(op) => op.symbol(),
            Self::Log(op) => op.symbol(),
            Self::Shift(op) => op.symbol(),
        }
    }

    /// Strict application; logical operators evaluate both sides here.
    pub fn apply(self, left: &Value, right: &Value) -> JattackResult<Value> {
        match self {
            Self::Ari(op) => op.apply(left, right),
            Self::Rel(op) => op.apply(left, right).map(Value::Bool),
            Self::Log(op) => Ok(Value::Bool(op.apply(left.as_bool()?, right.as_bool()?))),
            Self::Shift(op) => op.apply(left, right),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thrown_class(r: JattackResult<Value>) -> String {
        match r {
            Err(JattackError::Thrown(t)) => t.class,
            other => panic!("expected a thrown exception, got {other:?}"),
        }
    }

    #[test]
    fn int_arithmetic_wraps_like_java() {
        let max = Value::Int(i32::MAX);
        assert_eq!(AriOp::Add.apply(&max, &Value::Int(1)).unwrap(), Value::Int(i32::MIN));
        assert_eq!(
            AriOp::Div.apply(&Value::Int(i32::MIN), &Value::Int(-1)).unwrap(),
            Value::Int(i32::MIN)
        );
        assert_eq!(AriOp::Mod.apply(&Value::Int(-7), &Value::Int(3)).unwrap(), Value::Int(-1));
        assert_eq!(AriOp::Div.apply(&Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn integral_division_by_zero_raises() {
        for op in [AriOp::Div, AriOp::Mod] {
            assert_eq!(
                thrown_class(op.apply(&Value::Int(1), &Value::Int(0))),
                crate::ARITHMETIC_EXCEPTION
            );
            assert_eq!(
                thrown_class(op.apply(&Value::Long(1), &Value::Long(0))),
                crate::ARITHMETIC_EXCEPTION
            );
        }
        match AriOp::Div.apply(&Value::Double(1.0), &Value::Double(0.0)).unwrap() {
            Value::Double(d) => assert!(d.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mixed_operands_are_promoted() {
        assert_eq!(AriOp::Mul.apply(&Value::Int(3), &Value::Long(4)).unwrap(), Value::Long(12));
        assert_eq!(
            AriOp::Add.apply(&Value::Int(1), &Value::Double(0.5)).unwrap(),
            Value::Double(1.5)
        );
    }

    #[test]
    fn relational_truth_tables() {
        let (one, two) = (Value::Int(1), Value::Int(2));
        let expected = [
            (RelOp::Eq, false),
            (RelOp::Ne, true),
            (RelOp::Lt, true),
            (RelOp::Le, true),
            (RelOp::Gt, false),
            (RelOp::Ge, false),
        ];
        for (op, want) in expected {
            assert_eq!(op.apply(&one, &two).unwrap(), want, "{}", op.symbol());
        }
        let nan = Value::Double(f64::NAN);
        assert!(!RelOp::Eq.apply(&nan, &nan).unwrap());
        assert!(RelOp::Ne.apply(&nan, &nan).unwrap());
    }

    #[test]
    fn logical_short_circuit() {
        assert_eq!(LogOp::And.short_circuit(false), Some(false));
        assert_eq!(LogOp::And.short_circuit(true), None);
        assert_eq!(LogOp::Or.short_circuit(true), Some(true));
        assert!(LogOp::Or.apply(false, true));
    }

    #[test]
    fn shift_distance_is_masked() {
        assert_eq!(ShiftOp::Shl.apply(&Value::Int(1), &Value::Int(33)).unwrap(), Value::Int(2));
        assert_eq!(ShiftOp::Shr.apply(&Value::Int(-8), &Value::Int(1)).unwrap(), Value::Int(-4));
        assert_eq!(
            ShiftOp::Ushr.apply(&Value::Int(-1), &Value::Int(28)).unwrap(),
            Value::Int(15)
        );
        assert_eq!(
            ShiftOp::Shl.apply(&Value::Long(1), &Value::Int(65)).unwrap(),
            Value::Long(2)
        );
    }

    #[test]
    fn modulo_has_no_solver_term() {
        assert!(AriOp::Mod.term(Term::Int(1), Term::Int(2)).is_none());
        assert!(AriOp::Add.term(Term::Int(1), Term::Int(2)).is_some());
    }
}
