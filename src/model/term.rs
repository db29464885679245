//! Solver terms over booleans and mathematical integers.
//!
//! Identifiers become free constants, array accesses become fresh constants named by
//! their Java text. Shapes the solver cannot represent (doubles, `%`, side effects)
//! produce no term at all.

use std::fmt;

use crate::{Node, NodeKind, Operator, ShiftOp, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cmp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn holds(self, a: i128, b: i128) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arith {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "div",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Bool(bool),
    Int(i128),
    BoolVar(String),
    IntVar(String),
    Not(Box<Term>),
    And(Box<Term>, Box<Term>),
    Or(Box<Term>, Box<Term>),
    Cmp(Cmp, Box<Term>, Box<Term>),
    Arith(Arith, Box<Term>, Box<Term>),
    Shift {
        op: ShiftOp,
        wide: bool,
        value: Box<Term>,
        amount: Box<Term>,
    },
}

impl Term {
    pub fn not(t: Term) -> Term {
        Term::Not(Box::new(t))
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::BoolVar(_) | Self::Not(_) | Self::And(..) | Self::Or(..) | Self::Cmp(..)
        )
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) if *i < 0 => write!(f, "(- {})", i.unsigned_abs()),
            Self::Int(i) => write!(f, "{i}"),
            Self::BoolVar(n) | Self::IntVar(n) => write!(f, "|{n}|"),
            Self::Not(t) => write!(f, "(not {t})"),
            Self::And(a, b) => write!(f, "(and {a} {b})"),
            Self::Or(a, b) => write!(f, "(or {a} {b})"),
            Self::Cmp(c, a, b) => write!(f, "({} {a} {b})", c.symbol()),
            Self::Arith(op, a, b) => write!(f, "({} {a} {b})", op.symbol()),
            Self::Shift {
                op,
                wide,
                value,
                amount,
            } => {
                let name = match op {
                    ShiftOp::Shl => "bvshl",
                    ShiftOp::Shr => "bvashr",
                    ShiftOp::Ushr => "bvlshr",
                };
                write!(f, "({name}{} {value} {amount})", if *wide { "64" } else { "32" })
            }
        }
    }
}

impl Node {
    /// Solver term for the node's current choice, or `None` when the shape is not
    /// representable.
    pub fn to_term(&self) -> Option<Term> {
        match &self.kind {
            NodeKind::Literal(lit) => match lit.current()? {
                crate::Lit::Bool(b) => Some(Term::Bool(b)),
                crate::Lit::Int(i) => Some(Term::Int(i128::from(i))),
                crate::Lit::Long(l) => Some(Term::Int(i128::from(l))),
                crate::Lit::Double(_) | crate::Lit::Null => None,
            },
            NodeKind::Identifier(id) => {
                let name = id.current()?.to_string();
                match id.ty {
                    Type::Boolean => Some(Term::BoolVar(name)),
                    Type::Int | Type::Long => Some(Term::IntVar(name)),
                    _ => None,
                }
            }
            NodeKind::ArrayAccess(acc) => {
                let name = self.to_string();
                match acc.elem_type()? {
                    Type::Boolean => Some(Term::BoolVar(name)),
                    Type::Int | Type::Long => Some(Term::IntVar(name)),
                    _ => None,
                }
            }
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => {
                let left = b.left.to_term()?;
                let right = b.right.to_term()?;
                match b.operator()? {
                    Operator::Ari(op) => op.term(left, right),
                    Operator::Rel(_) if left.is_bool() || right.is_bool() => None,
                    Operator::Rel(op) => op.term(left, right),
                    Operator::Log(op) => op.term(left, right),
                    Operator::Shift(op) => {
                        let wide = b.left.result_type() == Some(Type::Long);
                        op.term(left, right, wide)
                    }
                }
            }
            NodeKind::Alt(alt) => alt.current()?.to_term(),
            _ => None,
        }
    }
}
