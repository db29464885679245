//! Decision oracle behind condition-hole pruning.
//!
//! [`LinearOracle`] is sound and incomplete over mathematical integers. It folds
//! constants, rewrites every comparison into a bound on a gcd-normalized linear form,
//! enumerates the propositional models of the formula and checks each model's bounds
//! form by form. Non-linear subterms are opaque integer constants.

use std::collections::{BTreeMap, BTreeSet};

use crate::{AriOp, Arith, Cmp, Node, ShiftOp, Term, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatStatus {
    Sat,
    Unsat,
    Unknown,
}

pub trait Solver {
    fn check(&mut self, formula: &Term) -> SatStatus;
}

/// `Some(false)` when the node's current choice can never hold, `Some(true)` when it
/// always holds, `None` when unknown or not representable.
pub fn check_feasibility(solver: &mut dyn Solver, node: &Node) -> Option<bool> {
    let term = node.to_term()?;
    if !term.is_bool() {
        return None;
    }
    if solver.check(&term) == SatStatus::Unsat {
        return Some(false);
    }
    if solver.check(&Term::not(term)) == SatStatus::Unsat {
        return Some(true);
    }
    None
}

const DEFAULT_MAX_ATOMS: usize = 14;

#[derive(Debug, Clone)]
pub struct LinearOracle {
    max_atoms: usize,
    checks: u64,
}

impl Default for LinearOracle {
    fn default() -> Self {
        Self {
            max_atoms: DEFAULT_MAX_ATOMS,
            checks: 0,
        }
    }
}

impl LinearOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }
}

impl Solver for LinearOracle {
    fn check(&mut self, formula: &Term) -> SatStatus {
        self.checks += 1;
        let mut lowering = Lowering::default();
        let Some(f) = lowering.formula(formula) else {
            return SatStatus::Unknown;
        };
        if lowering.atoms.len() > self.max_atoms {
            return SatStatus::Unknown;
        }
        let status = lowering.decide(&f);
        tracing::trace!(formula = %formula, ?status, "linear oracle");
        status
    }
}

#[derive(Debug, Clone)]
enum Formula {
    Const(bool),
    Atom(usize),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
}

impl Formula {
    fn eval(&self, model: u64) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::Atom(i) => model & (1 << i) != 0,
            Self::Not(f) => !f.eval(model),
            Self::And(a, b) => a.eval(model) && b.eval(model),
            Self::Or(a, b) => a.eval(model) || b.eval(model),
        }
    }
}

/// `Σ coeff·var + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Linear {
    coeffs: BTreeMap<String, i128>,
    constant: i128,
}

impl Linear {
    fn constant(c: i128) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c,
        }
    }

    fn var(name: String) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(name, 1);
        Self {
            coeffs,
            constant: 0,
        }
    }

    fn as_constant(&self) -> Option<i128> {
        self.coeffs.is_empty().then_some(self.constant)
    }

    fn add(mut self, other: &Linear, sign: i128) -> Option<Self> {
        for (v, c) in &other.coeffs {
            let entry = self.coeffs.entry(v.clone()).or_insert(0);
            *entry = entry.checked_add(c.checked_mul(sign)?)?;
            if *entry == 0 {
                self.coeffs.remove(v);
            }
        }
        self.constant = self.constant.checked_add(other.constant.checked_mul(sign)?)?;
        Some(self)
    }

    fn scale(mut self, k: i128) -> Option<Self> {
        if k == 0 {
            return Some(Self::constant(0));
        }
        for c in self.coeffs.values_mut() {
            *c = c.checked_mul(k)?;
        }
        self.constant = self.constant.checked_mul(k)?;
        Some(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bound {
    Le(i128),
    Ge(i128),
    Eq(i128),
}

impl Bound {
    fn negate(self) -> Option<Constraint> {
        Some(match self {
            Self::Le(b) => Constraint::Bound(Self::Ge(b.checked_add(1)?)),
            Self::Ge(b) => Constraint::Bound(Self::Le(b.checked_sub(1)?)),
            Self::Eq(b) => Constraint::Ne(b),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Constraint {
    Bound(Bound),
    Ne(i128),
}

/// Normalized linear form: coefficients with gcd 1 and a positive leading one.
type FormKey = Vec<(String, i128)>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Bool(String),
    Bound(FormKey, Bound),
}

#[derive(Debug, Default)]
struct Lowering {
    atoms: Vec<Atom>,
    index: BTreeMap<Atom, usize>,
    /// Free variables behind every opaque constant.
    opaque: BTreeMap<String, BTreeSet<String>>,
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn floor_div(a: i128, b: i128) -> i128 {
    a.div_euclid(b)
}

fn ceil_div(a: i128, b: i128) -> i128 {
    -((-a).div_euclid(b))
}

fn free_vars(term: &Term, out: &mut BTreeSet<String>) {
    match term {
        Term::Bool(_) | Term::Int(_) => {}
        Term::BoolVar(n) | Term::IntVar(n) => {
            out.insert(n.clone());
        }
        Term::Not(t) => free_vars(t, out),
        Term::And(a, b) | Term::Or(a, b) | Term::Cmp(_, a, b) | Term::Arith(_, a, b) => {
            free_vars(a, out);
            free_vars(b, out);
        }
        Term::Shift { value, amount, .. } => {
            free_vars(value, out);
            free_vars(amount, out);
        }
    }
}

/// Java division, truncating toward zero. `None` on division by zero.
fn fold_div(x: i128, y: i128) -> Option<i128> {
    let (x, y) = (i64::try_from(x).ok()?, i64::try_from(y).ok()?);
    let q = AriOp::Div.apply(&Value::Long(x), &Value::Long(y)).ok()?;
    q.as_i64().ok().map(i128::from)
}

fn fold_shift(op: ShiftOp, wide: bool, value: i128, amount: i128) -> i128 {
    if wide {
        let v = value as i64;
        let n = (amount & 0x3f) as u32;
        i128::from(match op {
            ShiftOp::Shl => v.wrapping_shl(n),
            ShiftOp::Shr => v.wrapping_shr(n),
            ShiftOp::Ushr => ((v as u64) >> n) as i64,
        })
    } else {
        let v = value as i32;
        let n = (amount & 0x1f) as u32;
        i128::from(match op {
            ShiftOp::Shl => v.wrapping_shl(n),
            ShiftOp::Shr => v.wrapping_shr(n),
            ShiftOp::Ushr => ((v as u32) >> n) as i32,
        })
    }
}

impl Lowering {
    fn atom(&mut self, atom: Atom) -> Formula {
        if let Some(i) = self.index.get(&atom) {
            return Formula::Atom(*i);
        }
        let i = self.atoms.len();
        self.index.insert(atom.clone(), i);
        self.atoms.push(atom);
        Formula::Atom(i)
    }

    fn opaque(&mut self, term: &Term) -> Linear {
        let name = term.to_string();
        let mut vars = BTreeSet::new();
        free_vars(term, &mut vars);
        self.opaque.insert(name.clone(), vars);
        Linear::var(name)
    }

    fn linear(&mut self, term: &Term) -> Option<Linear> {
        match term {
            Term::Int(i) => Some(Linear::constant(*i)),
            Term::IntVar(n) => Some(Linear::var(n.clone())),
            Term::Arith(op, a, b) => {
                let la = self.linear(a)?;
                let lb = self.linear(b)?;
                match op {
                    Arith::Add => la.add(&lb, 1),
                    Arith::Sub => la.add(&lb, -1),
                    Arith::Mul => match (la.as_constant(), lb.as_constant()) {
                        (Some(k), _) => lb.scale(k),
                        (_, Some(k)) => la.scale(k),
                        _ => Some(self.opaque(term)),
                    },
                    Arith::Div => match (la.as_constant(), lb.as_constant()) {
                        (Some(x), Some(y)) => match fold_div(x, y) {
                            Some(q) => Some(Linear::constant(q)),
                            None => Some(self.opaque(term)),
                        },
                        _ => Some(self.opaque(term)),
                    },
                }
            }
            Term::Shift {
                op,
                wide,
                value,
                amount,
            } => {
                let lv = self.linear(value)?;
                let la = self.linear(amount)?;
                match (lv.as_constant(), la.as_constant()) {
                    (Some(v), Some(n)) => Some(Linear::constant(fold_shift(*op, *wide, v, n))),
                    _ => Some(self.opaque(term)),
                }
            }
            _ => None,
        }
    }

    fn formula(&mut self, term: &Term) -> Option<Formula> {
        Some(match term {
            Term::Bool(b) => Formula::Const(*b),
            Term::BoolVar(n) => self.atom(Atom::Bool(n.clone())),
            Term::Not(t) => Formula::Not(Box::new(self.formula(t)?)),
            Term::And(a, b) => Formula::And(Box::new(self.formula(a)?), Box::new(self.formula(b)?)),
            Term::Or(a, b) => Formula::Or(Box::new(self.formula(a)?), Box::new(self.formula(b)?)),
            Term::Cmp(cmp, a, b) => {
                let diff = self.linear(a)?.add(&self.linear(b)?, -1)?;
                self.comparison(*cmp, diff)?
            }
            Term::Int(_) | Term::IntVar(_) | Term::Arith(..) | Term::Shift { .. } => return None,
        })
    }

    /// Lowers `diff <cmp> 0`.
    fn comparison(&mut self, cmp: Cmp, diff: Linear) -> Option<Formula> {
        if let Some(k) = diff.as_constant() {
            return Some(Formula::Const(cmp.holds(k, 0)));
        }
        let g = diff.coeffs.values().fold(0, |acc, c| gcd(acc, *c));
        let leading = *diff.coeffs.values().next()?;
        // diff = s·g·e + k where e has a positive leading coefficient
        let s: i128 = if leading > 0 { 1 } else { -1 };
        let key: FormKey = diff
            .coeffs
            .iter()
            .map(|(v, c)| (v.clone(), c / g * s))
            .collect();
        let (cmp, k) = if s > 0 {
            (cmp, diff.constant)
        } else {
            let flipped = match cmp {
                Cmp::Lt => Cmp::Gt,
                Cmp::Le => Cmp::Ge,
                Cmp::Gt => Cmp::Lt,
                Cmp::Ge => Cmp::Le,
                Cmp::Eq => Cmp::Eq,
            };
            (flipped, diff.constant.checked_neg()?)
        };
        // now: g·e + k <cmp> 0
        let bound = match cmp {
            Cmp::Le => Bound::Le(floor_div(k.checked_neg()?, g)),
            Cmp::Lt => Bound::Le(floor_div(k.checked_neg()?.checked_sub(1)?, g)),
            Cmp::Ge => Bound::Ge(ceil_div(k.checked_neg()?, g)),
            Cmp::Gt => Bound::Ge(ceil_div(k.checked_neg()?.checked_add(1)?, g)),
            Cmp::Eq if k % g != 0 => return Some(Formula::Const(false)),
            Cmp::Eq => Bound::Eq(k.checked_neg()? / g),
        };
        Some(self.atom(Atom::Bound(key, bound)))
    }

    fn decide(&self, f: &Formula) -> SatStatus {
        let mut any_consistent = false;
        for model in 0u64..(1u64 << self.atoms.len()) {
            if !f.eval(model) {
                continue;
            }
            match self.model_status(model) {
                SatStatus::Sat => return SatStatus::Sat,
                SatStatus::Unknown => any_consistent = true,
                SatStatus::Unsat => {}
            }
        }
        if any_consistent {
            SatStatus::Unknown
        } else {
            SatStatus::Unsat
        }
    }

    /// Unsat when some form's bounds contradict; Sat when every form is consistent
    /// and the forms share no variable; Unknown otherwise.
    fn model_status(&self, model: u64) -> SatStatus {
        let mut forms: BTreeMap<&FormKey, Vec<Constraint>> = BTreeMap::new();
        for (i, atom) in self.atoms.iter().enumerate() {
            let Atom::Bound(key, bound) = atom else {
                continue;
            };
            let constraint = if model & (1 << i) != 0 {
                Some(Constraint::Bound(*bound))
            } else {
                bound.negate()
            };
            match constraint {
                Some(c) => forms.entry(key).or_default().push(c),
                None => return SatStatus::Unknown,
            }
        }
        let mut independent = true;
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (key, constraints) in &forms {
            if !consistent(constraints) {
                return SatStatus::Unsat;
            }
            for (var, _) in key.iter() {
                if self.opaque.contains_key(var) {
                    independent = false;
                }
                if !seen.insert(var.clone()) {
                    independent = false;
                }
            }
        }
        if independent {
            SatStatus::Sat
        } else {
            SatStatus::Unknown
        }
    }
}

fn consistent(constraints: &[Constraint]) -> bool {
    let mut lo: Option<i128> = None;
    let mut hi: Option<i128> = None;
    let mut ne: BTreeSet<i128> = BTreeSet::new();
    for c in constraints {
        match *c {
            Constraint::Bound(Bound::Le(b)) => hi = Some(hi.map_or(b, |h| h.min(b))),
            Constraint::Bound(Bound::Ge(b)) => lo = Some(lo.map_or(b, |l| l.max(b))),
            Constraint::Bound(Bound::Eq(b)) => {
                hi = Some(hi.map_or(b, |h| h.min(b)));
                lo = Some(lo.map_or(b, |l| l.max(b)));
            }
            Constraint::Ne(b) => {
                ne.insert(b);
            }
        }
    }
    match (lo, hi) {
        (Some(l), Some(h)) if l > h => false,
        (Some(l), Some(h)) => {
            let excluded = ne.range(l..=h).count() as u128;
            let width = (h - l) as u128 + 1;
            excluded < width
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Term {
        Term::IntVar("x".to_string())
    }

    fn y() -> Term {
        Term::IntVar("y".to_string())
    }

    fn cmp(c: Cmp, a: Term, b: Term) -> Term {
        Term::Cmp(c, Box::new(a), Box::new(b))
    }

    fn arith(op: Arith, a: Term, b: Term) -> Term {
        Term::Arith(op, Box::new(a), Box::new(b))
    }

    fn check(t: &Term) -> SatStatus {
        LinearOracle::new().check(t)
    }

    #[test]
    fn tautologies_have_unsat_negations() {
        let eq = cmp(Cmp::Eq, x(), x());
        assert_eq!(check(&Term::not(eq.clone())), SatStatus::Unsat);
        assert_eq!(check(&eq), SatStatus::Sat);

        let succ = cmp(Cmp::Gt, arith(Arith::Add, x(), Term::Int(1)), x());
        assert_eq!(check(&Term::not(succ)), SatStatus::Unsat);
    }

    #[test]
    fn contradictory_bounds_are_unsat() {
        let both = Term::And(
            Box::new(cmp(Cmp::Lt, x(), Term::Int(0))),
            Box::new(cmp(Cmp::Gt, x(), Term::Int(0))),
        );
        assert_eq!(check(&both), SatStatus::Unsat);

        let parity = cmp(Cmp::Eq, arith(Arith::Mul, Term::Int(2), x()), Term::Int(1));
        assert_eq!(check(&parity), SatStatus::Unsat);

        let squeezed = Term::And(
            Box::new(cmp(Cmp::Ge, x(), Term::Int(1))),
            Box::new(Term::And(
                Box::new(cmp(Cmp::Le, x(), Term::Int(2))),
                Box::new(Term::And(
                    Box::new(Term::not(cmp(Cmp::Eq, x(), Term::Int(1)))),
                    Box::new(Term::not(cmp(Cmp::Eq, x(), Term::Int(2)))),
                )),
            )),
        );
        assert_eq!(check(&squeezed), SatStatus::Unsat);
    }

    #[test]
    fn shared_variables_across_forms_are_unknown() {
        let t = Term::And(
            Box::new(cmp(Cmp::Le, x(), Term::Int(0))),
            Box::new(cmp(Cmp::Ge, arith(Arith::Add, x(), y()), Term::Int(5))),
        );
        assert_eq!(check(&t), SatStatus::Unknown);
    }

    #[test]
    fn nonlinear_terms_are_opaque() {
        let t = cmp(Cmp::Gt, arith(Arith::Mul, x(), y()), Term::Int(0));
        assert_eq!(check(&t), SatStatus::Unknown);
        assert_eq!(check(&Term::not(t)), SatStatus::Unknown);
    }

    #[test]
    fn constants_fold() {
        assert_eq!(check(&cmp(Cmp::Lt, Term::Int(1), Term::Int(2))), SatStatus::Sat);
        assert_eq!(check(&cmp(Cmp::Gt, Term::Int(1), Term::Int(2))), SatStatus::Unsat);
        let shifted = Term::Shift {
            op: ShiftOp::Shl,
            wide: false,
            value: Box::new(Term::Int(1)),
            amount: Box::new(Term::Int(33)),
        };
        assert_eq!(check(&cmp(Cmp::Eq, shifted, Term::Int(2))), SatStatus::Sat);

        let quotient = || arith(Arith::Div, Term::Int(-7), Term::Int(2));
        assert_eq!(check(&cmp(Cmp::Eq, quotient(), Term::Int(-3))), SatStatus::Sat);
        assert_eq!(
            check(&Term::not(cmp(Cmp::Eq, quotient(), Term::Int(-3)))),
            SatStatus::Unsat
        );
    }

    #[test]
    fn feasibility_of_nodes() {
        use crate::{Itr, RelOp, Type, VarPool};
        let mut pool = VarPool::new();
        pool.declare("x", Type::Int, crate::Value::Int(0));
        let mut solver = LinearOracle::new();

        let mut same = crate::Node::relation(
            crate::Node::ident(Type::Int, &["x"]),
            crate::Node::ident(Type::Int, &["x"]),
            &[RelOp::Eq, RelOp::Ne, RelOp::Lt],
        );
        same.prepare(&pool).unwrap();
        same.next().unwrap();
        assert_eq!(check_feasibility(&mut solver, &same), Some(true));
        same.next().unwrap();
        assert_eq!(check_feasibility(&mut solver, &same), Some(false));
        same.next().unwrap();
        assert_eq!(check_feasibility(&mut solver, &same), Some(false));

        let mut mixed = crate::Node::relation(
            crate::Node::ident(Type::Int, &["x"]),
            crate::Node::int_fixed(3),
            &[RelOp::Lt],
        );
        mixed.prepare(&pool).unwrap();
        mixed.next().unwrap();
        assert_eq!(check_feasibility(&mut solver, &mixed), None);
    }
}
