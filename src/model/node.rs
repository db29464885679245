//! Hole contents: expression and statement nodes with a search space.
//!
//! A node is a tree whose leaves carry a finite set of choices (literal values,
//! identifier names, operators, alternatives). Systematic search walks the product of
//! those choices through [`Itr`]; random search draws one with [`Node::step_random`].
//! Once every leaf has a choice the node evaluates like ordinary Java code and prints
//! as Java source.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
    chain_has_next, chain_is_reset, AriOp, Chain, ImItr, IncDecOp, Itr, JattackError,
    JattackResult, Lit, LitItr, LogOp, Operator, Rand, RangeItr, RelOp, ShiftOp, Type, Value,
};

pub type HoleId = u32;

/// Variables visible to a node while it is prepared or evaluated.
pub trait Scope {
    fn read(&self, name: &str) -> Option<Value>;

    fn write(&mut self, name: &str, value: Value) -> JattackResult<()>;

    fn vars(&self) -> Vec<(String, Type)>;

    /// Sorted names of every visible variable of exactly `ty`.
    fn names_of_type(&self, ty: &Type) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars()
            .into_iter()
            .filter(|(_, t)| t == ty)
            .map(|(n, _)| n)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// A flat, owned scope. Used by tests and as the snapshot behind index inference.
#[derive(Debug, Clone, Default)]
pub struct VarPool {
    vars: BTreeMap<String, (Type, Value)>,
}

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: Type, value: Value) {
        self.vars.insert(name.into(), (ty, value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|(_, v)| v)
    }

    pub fn snapshot(scope: &dyn Scope) -> Self {
        let mut pool = Self::default();
        for (name, ty) in scope.vars() {
            if let Some(v) = scope.read(&name) {
                pool.vars.insert(name, (ty, v));
            }
        }
        pool
    }
}

impl Scope for VarPool {
    fn read(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|(_, v)| v.clone())
    }

    fn write(&mut self, name: &str, value: Value) -> JattackResult<()> {
        match self.vars.get_mut(name) {
            Some((ty, slot)) => {
                *slot = value.convert(ty)?;
                Ok(())
            }
            None => Err(JattackError::Template(format!(
                "assignment to undeclared variable {name}"
            ))),
        }
    }

    fn vars(&self) -> Vec<(String, Type)> {
        self.vars
            .iter()
            .map(|(n, (t, _))| (n.clone(), t.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Hole id, bound when the node is the root of a hole.
    #[serde(skip)]
    pub id: Option<HoleId>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Literal(Literal),
    Identifier(Identifier),
    BinaryArith(Binary),
    BinaryRel(Binary),
    BinaryLogical(Binary),
    Shift(Binary),
    ArrayAccess(ArrayAccess),
    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    PreInc {
        target: Box<Node>,
    },
    ExprStmt {
        expr: Box<Node>,
    },
    Block {
        stmts: Vec<Node>,
        #[serde(skip)]
        unit: ImItr,
    },
    If {
        cond: Box<Node>,
        then: Box<Node>,
        #[serde(default)]
        otherwise: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    Try {
        body: Box<Node>,
        catch: Box<Node>,
        #[serde(default)]
        finally: Option<Box<Node>>,
    },
    Alt(Alt),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    Fixed { value: Lit },
    Set { values: Vec<Lit> },
    /// Half-open `[low, high)`.
    Range { low: i64, high: i64 },
    /// The configured default values of the type; expanded when a template is loaded.
    Defaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Literal {
    pub ty: Type,
    pub domain: Domain,
    #[serde(skip)]
    im: ImItr,
    #[serde(skip)]
    set: LitItr,
    #[serde(skip)]
    range: Option<RangeItr>,
    #[serde(skip)]
    chosen: Option<Lit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub ty: Type,
    /// Explicit candidates; empty means "every variable of `ty` in scope".
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(skip)]
    candidates: Option<Vec<String>>,
    #[serde(skip)]
    cursor: LitItr,
    #[serde(skip)]
    chosen: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpChoice {
    pub ops: Vec<Operator>,
    #[serde(skip)]
    cursor: LitItr,
    #[serde(skip)]
    chosen: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binary {
    pub left: Box<Node>,
    pub op: OpChoice,
    pub right: Box<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayAccess {
    pub array: Box<Node>,
    /// Explicit index; `None` infers valid indices from the array's length.
    #[serde(default)]
    pub index: Option<Box<Node>>,
    #[serde(skip)]
    derived: Option<Box<Node>>,
    #[serde(skip)]
    arrays: VarPool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alt {
    pub alts: Vec<Node>,
    #[serde(skip)]
    cursor: LitItr,
    #[serde(skip)]
    chosen: Option<usize>,
    #[serde(skip)]
    pruned: bool,
}

fn no_choice(what: impl fmt::Display) -> JattackError {
    JattackError::NoChoice(what.to_string())
}

fn sized_has_next(cursor: &LitItr, len: usize) -> bool {
    if cursor.len() == len {
        cursor.has_next()
    } else {
        len > 0
    }
}

fn sized_next(cursor: &mut LitItr, len: usize) -> JattackResult<usize> {
    if cursor.len() != len {
        *cursor = LitItr::new(len);
    }
    cursor.next()?;
    cursor.pos().ok_or(JattackError::Exhausted)
}

impl Literal {
    pub fn new(ty: Type, domain: Domain) -> Self {
        Self {
            ty,
            domain,
            im: ImItr::default(),
            set: LitItr::default(),
            range: None,
            chosen: None,
        }
    }

    pub fn current(&self) -> Option<Lit> {
        self.chosen
    }

    fn has_choice(&self) -> bool {
        match &self.domain {
            Domain::Fixed { .. } => true,
            Domain::Set { values } => !values.is_empty(),
            Domain::Range { low, high } => self.ty.is_integral() && low < high,
            Domain::Defaults => false,
        }
    }

    fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        let lit = match &self.domain {
            Domain::Fixed { value } => *value,
            Domain::Set { values } => *rng
                .pick(values)
                .ok_or_else(|| no_choice("empty literal set"))?,
            Domain::Range { low, high } if low < high => {
                Lit::integral(&self.ty, rng.range_i64(*low, *high))?
            }
            Domain::Range { low, high } => {
                return Err(no_choice(format!("empty range [{low}, {high})")))
            }
            Domain::Defaults => return Err(no_choice("default domain was never expanded")),
        };
        self.chosen = Some(lit);
        Ok(())
    }

    fn api_text(&self) -> String {
        let p = api_prefix(&self.ty);
        match &self.domain {
            Domain::Fixed { value } => format!("{p}Val({value})"),
            Domain::Set { values } if self.ty == Type::Boolean && values.len() == 2 => {
                format!("{p}Val()")
            }
            Domain::Set { values } => {
                let vs: Vec<String> = values.iter().map(Lit::to_string).collect();
                format!("{p}Val(new {}[]{{{}}})", self.ty.java_name(), vs.join(", "))
            }
            Domain::Range { low, high } => {
                let suffix = if self.ty == Type::Long { "L" } else { "" };
                format!("{p}Val({low}{suffix}, {high}{suffix})")
            }
            Domain::Defaults => format!("{p}Val()"),
        }
    }
}

impl Itr for Literal {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        match &self.domain {
            Domain::Fixed { value } => {
                self.im.next()?;
                self.chosen = Some(*value);
            }
            Domain::Set { values } => {
                let i = sized_next(&mut self.set, values.len())?;
                self.chosen = values.get(i).copied();
            }
            Domain::Range { low, high } => {
                if self.range.is_none() {
                    let top = high.checked_add(1).ok_or_else(|| {
                        JattackError::InvalidArgument(format!("range bound {high} overflows"))
                    })?;
                    self.range = Some(RangeItr::new(*low, top)?);
                }
                let range = self.range.as_mut().ok_or(JattackError::Exhausted)?;
                range.next()?;
                let v = range.current().ok_or(JattackError::Exhausted)?;
                self.chosen = Some(Lit::integral(&self.ty, v)?);
            }
            Domain::Defaults => return Err(JattackError::Exhausted),
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.im.reset();
        self.set.reset();
        if let Some(range) = &mut self.range {
            range.reset();
        }
        self.chosen = None;
    }

    fn has_next(&self) -> bool {
        match &self.domain {
            Domain::Fixed { .. } => self.im.has_next(),
            Domain::Set { values } => sized_has_next(&self.set, values.len()),
            Domain::Range { low, high } => match &self.range {
                Some(range) => range.has_next(),
                None => low < high,
            },
            Domain::Defaults => false,
        }
    }

    fn is_reset(&self) -> bool {
        match &self.domain {
            Domain::Fixed { .. } => self.im.is_reset(),
            Domain::Set { .. } => self.set.is_reset(),
            Domain::Range { .. } => self.range.as_ref().map_or(true, |r| r.is_reset()),
            Domain::Defaults => true,
        }
    }
}

impl Identifier {
    pub fn new(ty: Type, names: Vec<String>) -> Self {
        Self {
            ty,
            names,
            exclude: Vec::new(),
            candidates: None,
            cursor: LitItr::default(),
            chosen: None,
        }
    }

    /// Candidate names once prepared, the explicit names before that.
    pub fn choices(&self) -> &[String] {
        match &self.candidates {
            Some(c) => c,
            None => &self.names,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.chosen
            .and_then(|i| self.choices().get(i))
            .map(String::as_str)
    }

    fn prepare(&mut self, scope: &dyn Scope) {
        if self.candidates.is_some() {
            return;
        }
        let mut candidates = if self.names.is_empty() {
            scope.names_of_type(&self.ty)
        } else {
            let mut seen = BTreeSet::new();
            self.names
                .iter()
                .filter(|n| seen.insert(n.as_str()))
                .cloned()
                .collect()
        };
        candidates.retain(|n| !self.exclude.contains(n));
        self.candidates = Some(candidates);
    }

    fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        let len = self.choices().len();
        if len == 0 {
            return Err(no_choice(format!("no {} variable in scope", self.ty)));
        }
        self.chosen = Some(rng.below(len));
        Ok(())
    }
}

impl Itr for Identifier {
    fn next(&mut self) -> JattackResult<()> {
        let len = self.choices().len();
        self.chosen = Some(sized_next(&mut self.cursor, len)?);
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.chosen = None;
    }

    fn has_next(&self) -> bool {
        sized_has_next(&self.cursor, self.choices().len())
    }

    fn is_reset(&self) -> bool {
        self.cursor.is_reset()
    }
}

impl OpChoice {
    pub fn new(ops: Vec<Operator>) -> Self {
        Self {
            ops,
            cursor: LitItr::default(),
            chosen: None,
        }
    }

    pub fn current(&self) -> Option<Operator> {
        self.chosen.and_then(|i| self.ops.get(i)).copied()
    }

    fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        if self.ops.is_empty() {
            return Err(no_choice("empty operator set"));
        }
        self.chosen = Some(rng.below(self.ops.len()));
        Ok(())
    }
}

impl Itr for OpChoice {
    fn next(&mut self) -> JattackResult<()> {
        self.chosen = Some(sized_next(&mut self.cursor, self.ops.len())?);
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.chosen = None;
    }

    fn has_next(&self) -> bool {
        sized_has_next(&self.cursor, self.ops.len())
    }

    fn is_reset(&self) -> bool {
        self.cursor.is_reset()
    }
}

impl Binary {
    pub fn operator(&self) -> Option<Operator> {
        self.op.current()
    }

    fn evaluate(&self, scope: &mut dyn Scope) -> JattackResult<Value> {
        let op = self.operator().ok_or_else(|| no_choice("operator not chosen"))?;
        let left = self.left.evaluate(scope)?;
        if let Operator::Log(log) = op {
            let l = left.as_bool()?;
            if let Some(v) = log.short_circuit(l) {
                return Ok(Value::Bool(v));
            }
            let r = self.right.evaluate(scope)?.as_bool()?;
            return Ok(Value::Bool(log.apply(l, r)));
        }
        let right = self.right.evaluate(scope)?;
        op.apply(&left, &right).map_err(|e| match (op, e) {
            (Operator::Ari(_), JattackError::Thrown(t)) => JattackError::Thrown(t.from_template()),
            (_, e) => e,
        })
    }
}

impl ArrayAccess {
    pub fn elem_type(&self) -> Option<Type> {
        self.array.result_type()?.element().cloned()
    }

    /// The explicit index, or the one derived from the current array.
    pub fn index_node(&self) -> Option<&Node> {
        self.index.as_deref().or(self.derived.as_deref())
    }

    fn index_value(&self, scope: &mut dyn Scope) -> JattackResult<i64> {
        self.index_node()
            .ok_or_else(|| no_choice("array index not chosen"))?
            .evaluate(scope)?
            .as_i64()
    }

    /// Index over `[0, len)` of the current array, or the fixed index 0 when the
    /// array is empty or raised while being evaluated.
    fn derive_index(&mut self) -> JattackResult<()> {
        let len = match self.array.evaluate(&mut self.arrays) {
            Ok(v) => v.array_len().unwrap_or(0),
            Err(JattackError::Thrown(_)) => 0,
            Err(e) => return Err(e),
        };
        let index = if len == 0 {
            Node::int_fixed(0)
        } else {
            Node::int_range(0, i64::try_from(len).unwrap_or(i64::from(i32::MAX)))
        };
        self.derived = Some(Box::new(index));
        Ok(())
    }

    fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        self.array.step_random(rng)?;
        if self.index.is_none() {
            self.derive_index()?;
        }
        match self.index.as_deref_mut().or(self.derived.as_deref_mut()) {
            Some(index) => index.step_random(rng),
            None => Err(no_choice("array index not chosen")),
        }
    }
}

impl Itr for ArrayAccess {
    fn next(&mut self) -> JattackResult<()> {
        if let Some(index) = self.index.as_deref_mut() {
            let mut parts: [&mut dyn Itr; 2] = [&mut *self.array, index];
            return Chain::new(&mut parts).next();
        }
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        // index varies fastest, then the array
        let advance_array = self.array.is_reset()
            || self.derived.as_ref().map_or(true, |d| !d.has_next());
        if advance_array {
            self.array.next()?;
            self.derive_index()?;
        }
        match self.derived.as_deref_mut() {
            Some(index) => index.next(),
            None => Err(JattackError::Exhausted),
        }
    }

    fn reset(&mut self) {
        self.array.reset();
        if let Some(index) = self.index.as_deref_mut() {
            index.reset();
        }
        self.derived = None;
    }

    fn has_next(&self) -> bool {
        if let Some(index) = self.index.as_deref() {
            let parts: [&dyn Itr; 2] = [&*self.array, index];
            return chain_has_next(&parts);
        }
        match self.derived.as_deref() {
            None => self.array.has_next(),
            Some(index) => self.array.has_next() || index.has_next(),
        }
    }

    fn is_reset(&self) -> bool {
        if let Some(index) = self.index.as_deref() {
            let parts: [&dyn Itr; 2] = [&*self.array, index];
            return chain_is_reset(&parts);
        }
        self.derived.is_none()
    }
}

impl Alt {
    pub fn new(alts: Vec<Node>) -> Self {
        Self {
            alts,
            cursor: LitItr::default(),
            chosen: None,
            pruned: false,
        }
    }

    pub fn current(&self) -> Option<&Node> {
        self.chosen.and_then(|i| self.alts.get(i))
    }

    /// Drops alternatives that have no choice in the current scope.
    fn prune(&mut self) -> JattackResult<()> {
        if self.pruned {
            return Ok(());
        }
        self.alts.retain(Node::has_random_choice);
        self.pruned = true;
        if self.alts.is_empty() {
            return Err(no_choice("no alternative has a choice"));
        }
        Ok(())
    }

    fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        if self.alts.is_empty() {
            return Err(no_choice("no alternative has a choice"));
        }
        let i = rng.below(self.alts.len());
        self.chosen = Some(i);
        match self.alts.get_mut(i) {
            Some(alt) => alt.step_random(rng),
            None => Err(no_choice("no alternative has a choice")),
        }
    }
}

impl Itr for Alt {
    fn next(&mut self) -> JattackResult<()> {
        if !self.has_next() {
            return Err(JattackError::Exhausted);
        }
        let advance = self.current().map_or(true, |alt| !alt.has_next());
        if advance {
            let i = sized_next(&mut self.cursor, self.alts.len())?;
            self.chosen = Some(i);
            if let Some(alt) = self.alts.get_mut(i) {
                alt.reset();
            }
        }
        match self.chosen.and_then(|i| self.alts.get_mut(i)) {
            Some(alt) => alt.next(),
            None => Err(JattackError::Exhausted),
        }
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.chosen = None;
        for alt in &mut self.alts {
            alt.reset();
        }
    }

    fn has_next(&self) -> bool {
        let more_alts = sized_has_next(&self.cursor, self.alts.len());
        match self.current() {
            None => more_alts,
            Some(alt) => more_alts || alt.has_next(),
        }
    }

    fn is_reset(&self) -> bool {
        self.chosen.is_none()
    }
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { id: None, kind }
    }

    pub fn with_id(mut self, id: HoleId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn literal(ty: Type, domain: Domain) -> Self {
        Self::new(NodeKind::Literal(Literal::new(ty, domain)))
    }

    pub fn int_fixed(v: i32) -> Self {
        Self::literal(Type::Int, Domain::Fixed { value: Lit::Int(v) })
    }

    pub fn int_val(values: &[i32]) -> Self {
        let values = values.iter().map(|v| Lit::Int(*v)).collect();
        Self::literal(Type::Int, Domain::Set { values })
    }

    /// Ints in `[low, high)`.
    pub fn int_range(low: i64, high: i64) -> Self {
        Self::literal(Type::Int, Domain::Range { low, high })
    }

    pub fn long_val(values: &[i64]) -> Self {
        let values = values.iter().map(|v| Lit::Long(*v)).collect();
        Self::literal(Type::Long, Domain::Set { values })
    }

    pub fn long_range(low: i64, high: i64) -> Self {
        Self::literal(Type::Long, Domain::Range { low, high })
    }

    pub fn double_val(values: &[f64]) -> Self {
        let values = values.iter().map(|v| Lit::Double(*v)).collect();
        Self::literal(Type::Double, Domain::Set { values })
    }

    pub fn bool_val() -> Self {
        Self::literal(
            Type::Boolean,
            Domain::Set {
                values: vec![Lit::Bool(false), Lit::Bool(true)],
            },
        )
    }

    pub fn bool_fixed(b: bool) -> Self {
        Self::literal(Type::Boolean, Domain::Fixed { value: Lit::Bool(b) })
    }

    /// Identifier over explicit names; an empty list infers from scope.
    pub fn ident(ty: Type, names: &[&str]) -> Self {
        let names = names.iter().map(|n| n.to_string()).collect();
        Self::new(NodeKind::Identifier(Identifier::new(ty, names)))
    }

    pub fn id_excluding(ty: Type, exclude: &[&str]) -> Self {
        let mut id = Identifier::new(ty, Vec::new());
        id.exclude = exclude.iter().map(|n| n.to_string()).collect();
        Self::new(NodeKind::Identifier(id))
    }

    fn binary(left: Node, ops: Vec<Operator>, right: Node) -> Binary {
        Binary {
            left: Box::new(left),
            op: OpChoice::new(ops),
            right: Box::new(right),
        }
    }

    /// An empty operator list means every operator of the class.
    pub fn arith(left: Node, right: Node, ops: &[AriOp]) -> Self {
        let ops = if ops.is_empty() { &AriOp::ALL[..] } else { ops };
        let ops = ops.iter().map(|o| Operator::Ari(*o)).collect();
        Self::new(NodeKind::BinaryArith(Self::binary(left, ops, right)))
    }

    pub fn relation(left: Node, right: Node, ops: &[RelOp]) -> Self {
        let ops = if ops.is_empty() { &RelOp::ALL[..] } else { ops };
        let ops = ops.iter().map(|o| Operator::Rel(*o)).collect();
        Self::new(NodeKind::BinaryRel(Self::binary(left, ops, right)))
    }

    pub fn logic(left: Node, right: Node, ops: &[LogOp]) -> Self {
        let ops = if ops.is_empty() { &LogOp::ALL[..] } else { ops };
        let ops = ops.iter().map(|o| Operator::Log(*o)).collect();
        Self::new(NodeKind::BinaryLogical(Self::binary(left, ops, right)))
    }

    pub fn shift(left: Node, right: Node, ops: &[ShiftOp]) -> Self {
        let ops = if ops.is_empty() { &ShiftOp::ALL[..] } else { ops };
        let ops = ops.iter().map(|o| Operator::Shift(*o)).collect();
        Self::new(NodeKind::Shift(Self::binary(left, ops, right)))
    }

    pub fn array_access(array: Node, index: Option<Node>) -> Self {
        Self::new(NodeKind::ArrayAccess(ArrayAccess {
            array: Box::new(array),
            index: index.map(Box::new),
            derived: None,
            arrays: VarPool::default(),
        }))
    }

    pub fn assign(target: Node, value: Node) -> Self {
        Self::new(NodeKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn pre_inc(target: Node) -> Self {
        Self::new(NodeKind::PreInc {
            target: Box::new(target),
        })
    }

    pub fn expr_stmt(expr: Node) -> Self {
        Self::new(NodeKind::ExprStmt {
            expr: Box::new(expr),
        })
    }

    pub fn block(stmts: Vec<Node>) -> Self {
        Self::new(NodeKind::Block {
            stmts,
            unit: ImItr::default(),
        })
    }

    pub fn if_stmt(cond: Node, then: Node, otherwise: Option<Node>) -> Self {
        Self::new(NodeKind::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn while_stmt(cond: Node, body: Node) -> Self {
        Self::new(NodeKind::While {
            cond: Box::new(cond),
            body: Box::new(body),
        })
    }

    pub fn try_stmt(body: Node, catch: Node, finally: Option<Node>) -> Self {
        Self::new(NodeKind::Try {
            body: Box::new(body),
            catch: Box::new(catch),
            finally: finally.map(Box::new),
        })
    }

    pub fn alt(alts: Vec<Node>) -> Self {
        Self::new(NodeKind::Alt(Alt::new(alts)))
    }

    /// Replaces every `default` literal domain with the values `defaults` gives its type.
    pub fn expand_defaults(&mut self, defaults: &dyn Fn(&Type) -> Vec<Lit>) {
        if let NodeKind::Literal(l) = &mut self.kind {
            if l.domain == Domain::Defaults {
                l.domain = Domain::Set {
                    values: defaults(&l.ty),
                };
            }
            return;
        }
        for child in self.children_mut() {
            child.expand_defaults(defaults);
        }
    }

    pub fn is_statement(&self) -> bool {
        match &self.kind {
            NodeKind::ExprStmt { .. }
            | NodeKind::Block { .. }
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::Try { .. } => true,
            NodeKind::Alt(alt) => alt.alts.first().map_or(false, Node::is_statement),
            _ => false,
        }
    }

    pub fn result_type(&self) -> Option<Type> {
        match &self.kind {
            NodeKind::Literal(l) => Some(l.ty.clone()),
            NodeKind::Identifier(id) => Some(id.ty.clone()),
            NodeKind::BinaryArith(b) => {
                Type::promote(&b.left.result_type()?, &b.right.result_type()?)
            }
            NodeKind::BinaryRel(_) | NodeKind::BinaryLogical(_) => Some(Type::Boolean),
            NodeKind::Shift(b) => b.left.result_type(),
            NodeKind::ArrayAccess(acc) => acc.elem_type(),
            NodeKind::Assign { target, .. } | NodeKind::PreInc { target } => target.result_type(),
            NodeKind::Alt(alt) => alt.current().or(alt.alts.first())?.result_type(),
            NodeKind::ExprStmt { .. }
            | NodeKind::Block { .. }
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::Try { .. } => Some(Type::Void),
        }
    }

    /// Direct child nodes, every alternative included.
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Identifier(_) => Vec::new(),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => vec![&*b.left, &*b.right],
            NodeKind::ArrayAccess(acc) => {
                let mut v = vec![&*acc.array];
                v.extend(acc.index.as_deref());
                v
            }
            NodeKind::Assign { target, value } => vec![&**target, &**value],
            NodeKind::PreInc { target } => vec![&**target],
            NodeKind::ExprStmt { expr } => vec![&**expr],
            NodeKind::Block { stmts, .. } => stmts.iter().collect(),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let mut v = vec![&**cond, &**then];
                v.extend(otherwise.as_deref());
                v
            }
            NodeKind::While { cond, body } => vec![&**cond, &**body],
            NodeKind::Try {
                body,
                catch,
                finally,
            } => {
                let mut v = vec![&**body, &**catch];
                v.extend(finally.as_deref());
                v
            }
            NodeKind::Alt(alt) => alt.alts.iter().collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Node> {
        match &mut self.kind {
            NodeKind::Literal(_) | NodeKind::Identifier(_) => Vec::new(),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => vec![&mut *b.left, &mut *b.right],
            NodeKind::ArrayAccess(acc) => {
                let mut v = vec![&mut *acc.array];
                v.extend(acc.index.as_deref_mut());
                v
            }
            NodeKind::Assign { target, value } => vec![&mut **target, &mut **value],
            NodeKind::PreInc { target } => vec![&mut **target],
            NodeKind::ExprStmt { expr } => vec![&mut **expr],
            NodeKind::Block { stmts, .. } => stmts.iter_mut().collect(),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let mut v = vec![&mut **cond, &mut **then];
                v.extend(otherwise.as_deref_mut());
                v
            }
            NodeKind::While { cond, body } => vec![&mut **cond, &mut **body],
            NodeKind::Try {
                body,
                catch,
                finally,
            } => {
                let mut v = vec![&mut **body, &mut **catch];
                v.extend(finally.as_deref_mut());
                v
            }
            NodeKind::Alt(alt) => alt.alts.iter_mut().collect(),
        }
    }

    /// Binds identifiers and array snapshots to `scope`, then prunes alternatives
    /// without a choice. Identifier candidates are inferred on the first call only.
    pub fn prepare(&mut self, scope: &dyn Scope) -> JattackResult<()> {
        match &mut self.kind {
            NodeKind::Identifier(id) => {
                id.prepare(scope);
                return Ok(());
            }
            NodeKind::ArrayAccess(acc) if acc.index.is_none() => {
                acc.arrays = VarPool::snapshot(scope);
            }
            _ => {}
        }
        for child in self.children_mut() {
            child.prepare(scope)?;
        }
        if let NodeKind::Alt(alt) = &mut self.kind {
            alt.prune()?;
        }
        Ok(())
    }

    pub fn has_random_choice(&self) -> bool {
        match &self.kind {
            NodeKind::Literal(l) => l.has_choice(),
            NodeKind::Identifier(id) => !id.choices().is_empty(),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => {
                !b.op.ops.is_empty() && b.left.has_random_choice() && b.right.has_random_choice()
            }
            NodeKind::Alt(alt) => alt.alts.iter().any(Node::has_random_choice),
            _ => self.children().iter().all(|c| c.has_random_choice()),
        }
    }

    /// Draws a uniformly random choice for every leaf, children before parents.
    pub fn step_random(&mut self, rng: &mut Rand) -> JattackResult<()> {
        match &mut self.kind {
            NodeKind::Literal(l) => return l.step_random(rng),
            NodeKind::Identifier(id) => return id.step_random(rng),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => {
                b.left.step_random(rng)?;
                b.right.step_random(rng)?;
                return b.op.step_random(rng);
            }
            NodeKind::ArrayAccess(acc) => return acc.step_random(rng),
            NodeKind::Alt(alt) => return alt.step_random(rng),
            _ => {}
        }
        for child in self.children_mut() {
            child.step_random(rng)?;
        }
        Ok(())
    }

    pub fn evaluate(&self, scope: &mut dyn Scope) -> JattackResult<Value> {
        match &self.kind {
            NodeKind::Literal(l) => l
                .current()
                .map(Value::from)
                .ok_or_else(|| no_choice("literal not chosen")),
            NodeKind::Identifier(id) => {
                let name = id.current().ok_or_else(|| no_choice("identifier not chosen"))?;
                scope
                    .read(name)
                    .ok_or_else(|| JattackError::Template(format!("{name} is not in scope")))
            }
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => b.evaluate(scope),
            NodeKind::ArrayAccess(acc) => {
                let array = acc.array.evaluate(scope)?;
                let index = acc.index_value(scope)?;
                array.load(index)
            }
            NodeKind::Assign { target, value } => {
                let v = value.evaluate(scope)?;
                target.store(scope, v)
            }
            NodeKind::PreInc { target } => {
                let old = target.evaluate(scope)?;
                let new = IncDecOp::PreInc.apply(&old)?;
                target.store(scope, new)
            }
            NodeKind::Alt(alt) => alt
                .current()
                .ok_or_else(|| no_choice("alternative not chosen"))?
                .evaluate(scope),
            _ => Err(JattackError::Template(format!("statement `{self}` has no value"))),
        }
    }

    /// Writes `value` through an assignable node and returns the converted value.
    fn store(&self, scope: &mut dyn Scope, value: Value) -> JattackResult<Value> {
        match &self.kind {
            NodeKind::Identifier(id) => {
                let name = id.current().ok_or_else(|| no_choice("identifier not chosen"))?;
                let v = value.convert(&id.ty)?;
                scope.write(name, v.clone())?;
                Ok(v)
            }
            NodeKind::ArrayAccess(acc) => {
                let array = acc.array.evaluate(scope)?;
                let index = acc.index_value(scope)?;
                let v = match acc.elem_type() {
                    Some(ty) => value.convert(&ty)?,
                    None => value,
                };
                array.store(index, v.clone())?;
                Ok(v)
            }
            NodeKind::Alt(alt) => alt
                .current()
                .ok_or_else(|| no_choice("alternative not chosen"))?
                .store(scope, value),
            _ => Err(JattackError::Template(format!("`{self}` is not assignable"))),
        }
    }

    pub fn execute(&self, scope: &mut dyn Scope) -> JattackResult<()> {
        match &self.kind {
            NodeKind::ExprStmt { expr } => expr.evaluate(scope).map(drop),
            NodeKind::Block { stmts, .. } => {
                for stmt in stmts {
                    stmt.execute(scope)?;
                }
                Ok(())
            }
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.evaluate(scope)?.as_bool()? {
                    then.execute(scope)
                } else if let Some(otherwise) = otherwise {
                    otherwise.execute(scope)
                } else {
                    Ok(())
                }
            }
            NodeKind::While { cond, body } => {
                while cond.evaluate(scope)?.as_bool()? {
                    body.execute(scope)?;
                }
                Ok(())
            }
            NodeKind::Try {
                body,
                catch,
                finally,
            } => {
                let outcome = match body.execute(scope) {
                    Err(JattackError::Thrown(_)) => catch.execute(scope),
                    other => other,
                };
                if let Some(finally) = finally {
                    finally.execute(scope)?;
                }
                outcome
            }
            NodeKind::Alt(alt) => alt
                .current()
                .ok_or_else(|| no_choice("alternative not chosen"))?
                .execute(scope),
            _ => self.evaluate(scope).map(drop),
        }
    }

    /// Builder-call text of the node, the form a hole takes before it is filled.
    pub fn api_text(&self) -> String {
        fn list(nodes: Vec<&Node>) -> String {
            nodes
                .iter()
                .map(|n| n.api_text())
                .collect::<Vec<_>>()
                .join(", ")
        }
        match &self.kind {
            NodeKind::Literal(l) => l.api_text(),
            NodeKind::Identifier(id) => {
                let names: Vec<String> = id.names.iter().map(|n| format!("\"{n}\"")).collect();
                format!("{}Id({})", api_prefix(&id.ty), names.join(", "))
            }
            NodeKind::BinaryArith(b) => binary_api("arithmetic", b),
            NodeKind::BinaryRel(b) => binary_api("relation", b),
            NodeKind::BinaryLogical(b) => binary_api("logic", b),
            NodeKind::Shift(b) => binary_api("shift", b),
            NodeKind::ArrayAccess(acc) => {
                let prefix = acc.elem_type().map_or_else(|| "ref".to_string(), |t| api_prefix(&t));
                format!("{prefix}ArrAccessExp({})", list(self.children()))
            }
            NodeKind::Assign { .. } => format!("assign({})", list(self.children())),
            NodeKind::PreInc { .. } => format!("preIncExp({})", list(self.children())),
            NodeKind::ExprStmt { .. } => format!("exprStmt({})", list(self.children())),
            NodeKind::Block { .. } => format!("block({})", list(self.children())),
            NodeKind::If { .. } => format!("ifStmt({})", list(self.children())),
            NodeKind::While { .. } => format!("whileStmt({})", list(self.children())),
            NodeKind::Try { .. } => format!("tryStmt({})", list(self.children())),
            NodeKind::Alt(_) => format!("alt({})", list(self.children())),
        }
    }

    /// A copy of the node whose only choice is its current one, positioned on it.
    /// Frozen nodes survive serialization: reset and advance once after loading.
    pub fn freeze(&self) -> JattackResult<Node> {
        let mut frozen = self.frozen()?;
        frozen.reset();
        frozen.next()?;
        Ok(frozen)
    }

    fn frozen(&self) -> JattackResult<Node> {
        fn binary(b: &Binary) -> JattackResult<Binary> {
            let op = b.operator().ok_or_else(|| no_choice("operator not chosen"))?;
            Ok(Binary {
                left: Box::new(b.left.frozen()?),
                op: OpChoice::new(vec![op]),
                right: Box::new(b.right.frozen()?),
            })
        }
        fn boxed(node: &Node) -> JattackResult<Box<Node>> {
            node.frozen().map(Box::new)
        }
        fn optional(node: &Option<Box<Node>>) -> JattackResult<Option<Box<Node>>> {
            node.as_deref().map(boxed).transpose()
        }
        let kind = match &self.kind {
            NodeKind::Literal(l) => {
                let value = l.current().ok_or_else(|| no_choice("literal not chosen"))?;
                NodeKind::Literal(Literal::new(l.ty.clone(), Domain::Fixed { value }))
            }
            NodeKind::Identifier(id) => {
                let name = id.current().ok_or_else(|| no_choice("identifier not chosen"))?;
                NodeKind::Identifier(Identifier::new(id.ty.clone(), vec![name.to_string()]))
            }
            NodeKind::BinaryArith(b) => NodeKind::BinaryArith(binary(b)?),
            NodeKind::BinaryRel(b) => NodeKind::BinaryRel(binary(b)?),
            NodeKind::BinaryLogical(b) => NodeKind::BinaryLogical(binary(b)?),
            NodeKind::Shift(b) => NodeKind::Shift(binary(b)?),
            NodeKind::ArrayAccess(acc) => {
                let index = acc
                    .index_node()
                    .ok_or_else(|| no_choice("array index not chosen"))?;
                NodeKind::ArrayAccess(ArrayAccess {
                    array: boxed(&acc.array)?,
                    index: Some(boxed(index)?),
                    derived: None,
                    arrays: VarPool::default(),
                })
            }
            NodeKind::Assign { target, value } => NodeKind::Assign {
                target: boxed(target)?,
                value: boxed(value)?,
            },
            NodeKind::PreInc { target } => NodeKind::PreInc {
                target: boxed(target)?,
            },
            NodeKind::ExprStmt { expr } => NodeKind::ExprStmt { expr: boxed(expr)? },
            NodeKind::Block { stmts, .. } => NodeKind::Block {
                stmts: stmts.iter().map(Node::frozen).collect::<JattackResult<_>>()?,
                unit: ImItr::default(),
            },
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => NodeKind::If {
                cond: boxed(cond)?,
                then: boxed(then)?,
                otherwise: optional(otherwise)?,
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: boxed(cond)?,
                body: boxed(body)?,
            },
            NodeKind::Try {
                body,
                catch,
                finally,
            } => NodeKind::Try {
                body: boxed(body)?,
                catch: boxed(catch)?,
                finally: optional(finally)?,
            },
            NodeKind::Alt(alt) => {
                let chosen = alt
                    .current()
                    .ok_or_else(|| no_choice("alternative not chosen"))?;
                return Ok(Node {
                    id: self.id,
                    kind: chosen.frozen()?.kind,
                });
            }
        };
        Ok(Node { id: self.id, kind })
    }

    fn parts(&self) -> Vec<&dyn Itr> {
        let mut parts: Vec<&dyn Itr> = Vec::new();
        match &self.kind {
            NodeKind::Literal(l) => parts.push(l),
            NodeKind::Identifier(id) => parts.push(id),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => {
                parts.push(&b.op);
                parts.push(&*b.left);
                parts.push(&*b.right);
            }
            NodeKind::ArrayAccess(acc) => parts.push(acc),
            NodeKind::Block { stmts, unit } if stmts.is_empty() => parts.push(unit),
            NodeKind::Alt(alt) => parts.push(alt),
            _ => {
                for child in self.children() {
                    parts.push(child);
                }
            }
        }
        parts
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Itr> {
        let composite = match &self.kind {
            NodeKind::Block { stmts, .. } => !stmts.is_empty(),
            NodeKind::Assign { .. }
            | NodeKind::PreInc { .. }
            | NodeKind::ExprStmt { .. }
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::Try { .. } => true,
            _ => false,
        };
        if composite {
            return self
                .children_mut()
                .into_iter()
                .map(|c| c as &mut dyn Itr)
                .collect();
        }
        let mut parts: Vec<&mut dyn Itr> = Vec::new();
        match &mut self.kind {
            NodeKind::Literal(l) => parts.push(l),
            NodeKind::Identifier(id) => parts.push(id),
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => {
                parts.push(&mut b.op);
                parts.push(&mut *b.left);
                parts.push(&mut *b.right);
            }
            NodeKind::ArrayAccess(acc) => parts.push(acc),
            NodeKind::Block { unit, .. } => parts.push(unit),
            NodeKind::Alt(alt) => parts.push(alt),
            _ => {}
        }
        parts
    }
}

impl Itr for Node {
    fn next(&mut self) -> JattackResult<()> {
        let mut parts = self.parts_mut();
        Chain::new(&mut parts).next()
    }

    fn reset(&mut self) {
        for part in self.parts_mut() {
            part.reset();
        }
    }

    fn has_next(&self) -> bool {
        chain_has_next(&self.parts())
    }

    fn is_reset(&self) -> bool {
        chain_is_reset(&self.parts())
    }
}

fn api_prefix(ty: &Type) -> String {
    match ty {
        Type::Void => "void".to_string(),
        Type::Boolean => "bool".to_string(),
        Type::Int => "int".to_string(),
        Type::Long => "long".to_string(),
        Type::Double => "double".to_string(),
        Type::Object => "ref".to_string(),
        Type::Array(elem) => format!("{}Arr", api_prefix(elem)),
    }
}

fn binary_api(name: &str, b: &Binary) -> String {
    let ops: Vec<String> = b
        .op
        .ops
        .iter()
        .map(|op| {
            match op {
                Operator::Ari(o) => format!("{o:?}"),
                Operator::Rel(o) => format!("{o:?}"),
                Operator::Log(o) => format!("{o:?}"),
                Operator::Shift(o) => format!("{o:?}"),
            }
            .to_uppercase()
        })
        .collect();
    format!(
        "{name}({}, {}, {})",
        b.left.api_text(),
        b.right.api_text(),
        ops.join(", ")
    )
}

/// Statement text with braces forced around non-block bodies.
struct Braced<'a>(&'a Node);

impl fmt::Display for Braced<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Block { .. } => write!(f, "{}", self.0),
            _ => write!(f, "{{ {} }}", self.0),
        }
    }
}

impl fmt::Display for Node {
    /// Java source of the current choice. Unresolved leaves fall back to builder text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Literal(l) => match l.current() {
                Some(v) => write!(f, "{v}"),
                None => f.write_str(&self.api_text()),
            },
            NodeKind::Identifier(id) => match id.current() {
                Some(name) => f.write_str(name),
                None => f.write_str(&self.api_text()),
            },
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => match b.operator() {
                Some(op) => write!(f, "({} {op} {})", b.left, b.right),
                None => f.write_str(&self.api_text()),
            },
            NodeKind::ArrayAccess(acc) => match acc.index_node() {
                Some(index) => write!(f, "{}[{index}]", acc.array),
                None => f.write_str(&self.api_text()),
            },
            NodeKind::Assign { target, value } => write!(f, "({target} = {value})"),
            NodeKind::PreInc { target } => write!(f, "++{target}"),
            NodeKind::ExprStmt { expr } => match &expr.kind {
                NodeKind::Assign { target, value } => write!(f, "{target} = {value};"),
                _ => write!(f, "{expr};"),
            },
            NodeKind::Block { stmts, .. } => {
                f.write_str("{")?;
                for stmt in stmts {
                    write!(f, " {stmt}")?;
                }
                f.write_str(" }")
            }
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "if ({cond}) {}", Braced(then))?;
                if let Some(otherwise) = otherwise {
                    write!(f, " else {}", Braced(otherwise))?;
                }
                Ok(())
            }
            NodeKind::While { cond, body } => write!(f, "while ({cond}) {}", Braced(body)),
            NodeKind::Try {
                body,
                catch,
                finally,
            } => {
                write!(
                    f,
                    "try {} catch (Throwable e) {}",
                    Braced(body),
                    Braced(catch)
                )?;
                if let Some(finally) = finally {
                    write!(f, " finally {}", Braced(finally))?;
                }
                Ok(())
            }
            NodeKind::Alt(alt) => match alt.current() {
                Some(node) => write!(f, "{node}"),
                None => f.write_str(&self.api_text()),
            },
        }
    }
}
