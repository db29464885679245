//! Static checks and code layout of template classes.
//!
//! [`compile`] rejects the classes javac would reject for the constructs the model
//! has, then lays out every method the way javac does: byte offsets for statements and
//! hole call sites, local slots reused after block exit, and a local variable table.
//! The interpreter uses the table to decide which locals a hole can see.

use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
    Expr, FieldDecl, HoleId, HoleSite, JattackError, JattackResult, LValue, Lit, Node, NodeKind,
    Operator, Param, RelOp, Stmt, StmtKind, TemplateClass, Type, Value, VarPool,
};

/// Start offset of method arguments in the local variable table.
pub const ARG_START: i64 = -1;

/// Name of the method holding the copied static initializer.
pub const CLINIT: &str = "<clinit>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalVar {
    pub name: String,
    pub ty: Type,
    pub slot: u16,
    /// Offset of the defining store, or [`ARG_START`].
    pub start: i64,
    /// Exclusive.
    pub end: i64,
    pub is_arg: bool,
}

impl LocalVar {
    pub fn is_live_at(&self, offset: u32) -> bool {
        let offset = i64::from(offset);
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct MethodLayout {
    pub locals: Vec<LocalVar>,
    pub hole_offsets: BTreeMap<HoleId, u32>,
    /// Slot of the local declared by the statement at each offset.
    pub local_slots: BTreeMap<u32, u16>,
    pub max_locals: u16,
    pub code_len: u32,
}

impl MethodLayout {
    pub fn live_at(&self, offset: u32) -> Vec<&LocalVar> {
        self.locals.iter().filter(|l| l.is_live_at(offset)).collect()
    }

    pub fn hole_offset(&self, id: HoleId) -> Option<u32> {
        self.hole_offsets.get(&id).copied()
    }

    pub fn slot_of_local(&self, stmt_offset: u32) -> Option<u16> {
        self.local_slots.get(&stmt_offset).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticField {
    pub name: String,
    pub ty: Type,
    pub slot: usize,
    /// As declared; the descriptor itself treats every field as writable.
    pub declared_final: bool,
}

/// The static state of a class: what a reset zeroes before rerunning the initializer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDescriptor {
    pub fields: Vec<StaticField>,
}

impl StateDescriptor {
    pub fn of(class: &TemplateClass) -> Self {
        let fields = class
            .fields
            .iter()
            .enumerate()
            .map(|(slot, f)| StaticField {
                name: f.name.clone(),
                ty: f.ty.clone(),
                slot,
                declared_final: f.is_final,
            })
            .collect();
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&StaticField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn zeroed(&self) -> Vec<Value> {
        self.fields.iter().map(|f| f.ty.default_value()).collect()
    }

    pub fn shape(&self) -> Vec<(String, Type)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.ty.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CompiledClass {
    /// The class with statement offsets assigned.
    pub class: TemplateClass,
    pub layouts: BTreeMap<String, MethodLayout>,
    pub state: StateDescriptor,
    /// Field initializers in declaration order followed by the static block.
    pub clinit: Vec<Stmt>,
}

impl CompiledClass {
    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn layout(&self, method: &str) -> JattackResult<&MethodLayout> {
        self.layouts.get(method).ok_or_else(|| {
            JattackError::InvalidArgument(format!("{} has no method {method}", self.class.name))
        })
    }

    pub fn signatures(&self) -> BTreeSet<(String, Vec<Type>, Type)> {
        self.class.methods.iter().map(|m| m.signature()).collect()
    }
}

pub fn compile(class: &TemplateClass) -> JattackResult<CompiledClass> {
    let diagnostics = Checker::new(class).check();
    if !diagnostics.is_empty() {
        tracing::debug!(class = %class.name, errors = diagnostics.len(), "compilation failed");
        return Err(JattackError::Compilation {
            class: class.name.clone(),
            diagnostics,
        });
    }
    let mut class = class.clone();
    let state = StateDescriptor::of(&class);
    let mut clinit = clinit_copy(&class);
    let mut layouts = BTreeMap::new();
    for m in &mut class.methods {
        let layout = Layout::new().method(&m.params, &mut m.body);
        layouts.insert(m.name.clone(), layout);
    }
    layouts.insert(CLINIT.to_string(), Layout::new().method(&[], &mut clinit));
    tracing::debug!(class = %class.name, methods = layouts.len(), "compiled");
    Ok(CompiledClass {
        class,
        layouts,
        state,
        clinit,
    })
}

fn clinit_copy(class: &TemplateClass) -> Vec<Stmt> {
    let mut body: Vec<Stmt> = class
        .fields
        .iter()
        .filter_map(|f| {
            let init = f.init.clone()?;
            Some(Stmt::new(StmtKind::Assign {
                target: LValue::Var {
                    name: f.name.clone(),
                },
                value: init,
            }))
        })
        .collect();
    body.extend(class.static_init.iter().cloned());
    body
}

/// Value of a node built only from literals and operators, evaluated once.
pub fn node_constant(node: &Node) -> Option<Value> {
    fn pure(node: &Node) -> bool {
        match &node.kind {
            NodeKind::Literal(_) => true,
            NodeKind::BinaryArith(b)
            | NodeKind::BinaryRel(b)
            | NodeKind::BinaryLogical(b)
            | NodeKind::Shift(b) => pure(&b.left) && pure(&b.right),
            NodeKind::Alt(alt) => alt.current().map_or(false, pure),
            _ => false,
        }
    }
    if !pure(node) {
        return None;
    }
    node.evaluate(&mut VarPool::new()).ok()
}

fn binary_type(op: Operator, l: &Type, r: &Type) -> Result<Type, String> {
    let bad = || {
        format!(
            "bad operand types for binary operator '{}': {l} and {r}",
            op.symbol()
        )
    };
    match op {
        Operator::Ari(_) => Type::promote(l, r).ok_or_else(bad),
        Operator::Rel(RelOp::Eq | RelOp::Ne) => {
            let ok = (*l == Type::Boolean && *r == Type::Boolean)
                || Type::promote(l, r).is_some()
                || (l.is_reference() && r.is_reference());
            if ok {
                Ok(Type::Boolean)
            } else {
                Err(bad())
            }
        }
        Operator::Rel(_) => Type::promote(l, r).map(|_| Type::Boolean).ok_or_else(bad),
        Operator::Log(_) if *l == Type::Boolean && *r == Type::Boolean => Ok(Type::Boolean),
        Operator::Shift(_) if l.is_integral() && r.is_integral() => Ok(l.clone()),
        Operator::Log(_) | Operator::Shift(_) => Err(bad()),
    }
}

fn castable(from: &Type, to: &Type) -> bool {
    from == to
        || (from.is_numeric() && to.is_numeric())
        || (*to == Type::Object && *from != Type::Void)
        || (*from == Type::Object && to.is_reference())
}

struct Checker<'a> {
    class: &'a TemplateClass,
    context: String,
    /// Fields declared before the initializer being checked.
    visible_fields: usize,
    in_clinit: bool,
    scopes: Vec<Vec<(String, Type)>>,
    diagnostics: Vec<String>,
}

impl<'a> Checker<'a> {
    fn new(class: &'a TemplateClass) -> Self {
        Self {
            class,
            context: String::new(),
            visible_fields: class.fields.len(),
            in_clinit: false,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, msg: impl fmt::Display) {
        self.diagnostics
            .push(format!("{}.{}: {msg}", self.class.name, self.context));
    }

    fn check(mut self) -> Vec<String> {
        let class = self.class;
        let mut seen = BTreeSet::new();
        for f in &class.fields {
            if !seen.insert(f.name.as_str()) {
                self.context = f.name.clone();
                self.error(format!("variable {} is already defined", f.name));
            }
        }
        let mut seen = BTreeSet::new();
        for m in &class.methods {
            if !seen.insert(m.name.as_str()) {
                self.context = m.name.clone();
                self.error(format!("method {} is already defined", m.name));
            }
        }

        self.in_clinit = true;
        for (i, f) in class.fields.iter().enumerate() {
            self.context = f.name.clone();
            self.visible_fields = i;
            if let Some(init) = &f.init {
                self.expect(init, &f.ty);
            }
        }
        self.visible_fields = class.fields.len();
        self.context = CLINIT.to_string();
        self.scopes = vec![Vec::new()];
        self.block(&class.static_init, None);
        self.in_clinit = false;

        for m in &class.methods {
            self.context = m.name.clone();
            self.scopes = vec![Vec::new()];
            for p in &m.params {
                self.declare(&p.name, &p.ty);
            }
            let completes = self.block(&m.body, Some(&m.ret));
            if completes && m.ret != Type::Void {
                self.error("missing return statement");
            }
        }
        self.diagnostics
    }

    fn local(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|s| s.iter())
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    fn field(&self, name: &str) -> Option<&'a FieldDecl> {
        let visible = self.visible_fields.min(self.class.fields.len());
        self.class.fields[..visible].iter().find(|f| f.name == name)
    }

    fn lookup(&mut self, name: &str) -> Option<Type> {
        let found = match self.local(name) {
            Some(t) => Some(t.clone()),
            None => self.field(name).map(|f| f.ty.clone()),
        };
        if found.is_none() {
            self.error(format!("cannot find symbol: variable {name}"));
        }
        found
    }

    fn declare(&mut self, name: &str, ty: &Type) {
        if self.local(name).is_some() {
            self.error(format!("variable {name} is already defined"));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), ty.clone()));
        }
    }

    fn expect(&mut self, e: &Expr, ty: &Type) {
        if matches!(e, Expr::Lit { value: Lit::Null }) && ty.is_reference() {
            return;
        }
        if let Some(t) = self.type_of(e) {
            if !ty.accepts(&t) {
                self.error(format!("incompatible types: {t} cannot be converted to {ty}"));
            }
        }
    }

    fn condition(&mut self, cond: &Expr) {
        if let Some(t) = self.type_of(cond) {
            if t != Type::Boolean {
                self.error(format!("incompatible types: {t} cannot be converted to boolean"));
            }
        }
    }

    fn index_type(&mut self, array: &Expr, index: &Expr) -> Option<Type> {
        let a = self.type_of(array);
        let i = self.type_of(index);
        let (a, i) = (a?, i?);
        if i != Type::Int {
            self.error(format!("incompatible types: {i} cannot be converted to int"));
        }
        match a.element() {
            Some(elem) => Some(elem.clone()),
            None => {
                self.error(format!("array required, but {a} found"));
                None
            }
        }
    }

    fn type_of(&mut self, e: &Expr) -> Option<Type> {
        match e {
            Expr::Lit { value } => Some(value.ty()),
            Expr::Var { name } => self.lookup(name),
            Expr::Binary { op, left, right } => {
                let l = self.type_of(left);
                let r = self.type_of(right);
                let (l, r) = (l?, r?);
                match binary_type(*op, &l, &r) {
                    Ok(t) => Some(t),
                    Err(msg) => {
                        self.error(msg);
                        None
                    }
                }
            }
            Expr::Not { expr } => {
                let t = self.type_of(expr)?;
                if t == Type::Boolean {
                    Some(t)
                } else {
                    self.error(format!("bad operand type {t} for unary operator '!'"));
                    None
                }
            }
            Expr::Neg { expr } => {
                let t = self.type_of(expr)?;
                if t.is_numeric() {
                    Some(t)
                } else {
                    self.error(format!("bad operand type {t} for unary operator '-'"));
                    None
                }
            }
            Expr::Index { array, index } => self.index_type(array, index),
            Expr::Length { array } => {
                let a = self.type_of(array)?;
                if a.element().is_none() {
                    self.error(format!("array required, but {a} found"));
                    return None;
                }
                Some(Type::Int)
            }
            Expr::NewArray { elem, len } => {
                self.expect(len, &Type::Int);
                Some(Type::array_of(elem.clone()))
            }
            Expr::ArrayLit { elem, values } => {
                for v in values {
                    self.expect(v, elem);
                }
                Some(Type::array_of(elem.clone()))
            }
            Expr::Call { method, args } => {
                let arg_types: Vec<Option<Type>> = args.iter().map(|a| self.type_of(a)).collect();
                let Some(m) = self.class.method(method) else {
                    self.error(format!("cannot find symbol: method {method}"));
                    return None;
                };
                if m.params.len() != args.len() {
                    self.error(format!(
                        "method {method} cannot be applied to given types: expected {} arguments, found {}",
                        m.params.len(),
                        args.len()
                    ));
                    return Some(m.ret.clone());
                }
                for (p, t) in m.params.iter().zip(&arg_types) {
                    if let Some(t) = t {
                        if !p.ty.accepts(t) {
                            self.error(format!(
                                "incompatible types: {t} cannot be converted to {}",
                                p.ty
                            ));
                        }
                    }
                }
                Some(m.ret.clone())
            }
            Expr::Cast { ty, expr } => {
                let t = self.type_of(expr)?;
                if castable(&t, ty) {
                    Some(ty.clone())
                } else {
                    self.error(format!("incompatible types: {t} cannot be converted to {ty}"));
                    None
                }
            }
            Expr::Hole(site) => self.hole_type(site),
            Expr::Filled(fill) => {
                self.fill_names(&fill.node);
                let t = fill.node.result_type();
                if t.is_none() {
                    self.error(format!("hole {}: `{}` has no type", fill.id, fill.text));
                }
                t
            }
        }
    }

    fn hole_type(&mut self, site: &HoleSite) -> Option<Type> {
        let id = site.id.map_or_else(|| "?".to_string(), |i| i.to_string());
        if site.node.is_statement() {
            self.error(format!("hole {id}: statement used as an expression"));
            return None;
        }
        let t = site.node.result_type();
        if t.is_none() {
            self.error(format!("hole {id}: expression has no type"));
        }
        t
    }

    /// Identifiers chosen by a fill must resolve where the fill sits.
    fn fill_names(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Identifier(id) => {
                if let Some(name) = id.current() {
                    if self.local(name).is_none() && self.field(name).is_none() {
                        self.error(format!("cannot find symbol: variable {name}"));
                    }
                }
            }
            NodeKind::Alt(alt) => {
                if let Some(chosen) = alt.current() {
                    self.fill_names(chosen);
                }
            }
            _ => {
                for child in node.children() {
                    self.fill_names(child);
                }
            }
        }
    }

    /// Whether a filled statement can complete normally.
    fn fill_completes(&mut self, node: &Node) -> bool {
        match &node.kind {
            NodeKind::Block { stmts, .. } => {
                let mut reachable = true;
                for s in stmts {
                    if !reachable {
                        self.error("unreachable statement");
                    }
                    reachable = self.fill_completes(s);
                }
                reachable
            }
            NodeKind::If {
                then, otherwise, ..
            } => {
                let t = self.fill_completes(then);
                match otherwise {
                    Some(o) => {
                        let e = self.fill_completes(o);
                        t || e
                    }
                    None => true,
                }
            }
            NodeKind::While { cond, body } => match node_constant(cond) {
                Some(Value::Bool(true)) => {
                    self.fill_completes(body);
                    false
                }
                Some(Value::Bool(false)) => {
                    self.error("unreachable statement");
                    true
                }
                _ => {
                    self.fill_completes(body);
                    true
                }
            },
            NodeKind::Try {
                body,
                catch,
                finally,
            } => {
                let b = self.fill_completes(body);
                let c = self.fill_completes(catch);
                match finally {
                    Some(f) => self.fill_completes(f) && (b || c),
                    None => b || c,
                }
            }
            NodeKind::Alt(alt) => match alt.current() {
                Some(chosen) => self.fill_completes(chosen),
                None => true,
            },
            _ => true,
        }
    }

    fn const_value(&self, e: &Expr, depth: usize) -> Option<Value> {
        if depth > self.class.fields.len() + 1 {
            return None;
        }
        match e {
            Expr::Lit { value: Lit::Null } => None,
            Expr::Lit { value } => Some(value.to_value()),
            Expr::Var { name } => {
                if self.local(name).is_some() {
                    return None;
                }
                let f = self.class.field(name)?;
                if !f.is_final {
                    return None;
                }
                self.const_value(f.init.as_ref()?, depth + 1)
            }
            Expr::Binary { op, left, right } => {
                let l = self.const_value(left, depth)?;
                let r = self.const_value(right, depth)?;
                op.apply(&l, &r).ok()
            }
            Expr::Not { expr } => {
                let b = self.const_value(expr, depth)?.as_bool().ok()?;
                Some(Value::Bool(!b))
            }
            Expr::Neg { expr } => match self.const_value(expr, depth)? {
                Value::Int(i) => Some(Value::Int(i.wrapping_neg())),
                Value::Long(l) => Some(Value::Long(l.wrapping_neg())),
                Value::Double(d) => Some(Value::Double(-d)),
                _ => None,
            },
            Expr::Cast { ty, expr } if !ty.is_reference() => {
                self.const_value(expr, depth)?.convert(ty).ok()
            }
            Expr::Filled(fill) => node_constant(&fill.node),
            _ => None,
        }
    }

    fn constant_bool(&self, e: &Expr) -> Option<bool> {
        self.const_value(e, 0)?.as_bool().ok()
    }

    fn lvalue_type(&mut self, target: &LValue) -> Option<Type> {
        match target {
            LValue::Var { name } => {
                if self.local(name).is_none() {
                    if let Some(f) = self.field(name) {
                        if f.is_final && !self.in_clinit {
                            self.error(format!("cannot assign a value to final variable {name}"));
                        }
                    }
                }
                self.lookup(name)
            }
            LValue::Index { array, index } => self.index_type(array, index),
        }
    }

    /// Checks a statement list in a new scope; true when it can complete normally.
    fn block(&mut self, stmts: &[Stmt], ret: Option<&Type>) -> bool {
        self.scopes.push(Vec::new());
        let mut reachable = true;
        for s in stmts {
            if !reachable {
                self.error("unreachable statement");
            }
            reachable = self.stmt(s, ret);
        }
        self.scopes.pop();
        reachable
    }

    fn loop_body(&mut self, cond: &Expr, body: &[Stmt], ret: Option<&Type>) -> bool {
        self.condition(cond);
        match self.constant_bool(cond) {
            Some(true) => {
                self.block(body, ret);
                false
            }
            Some(false) => {
                self.error("unreachable statement");
                self.block(body, ret);
                true
            }
            None => {
                self.block(body, ret);
                true
            }
        }
    }

    fn stmt(&mut self, s: &Stmt, ret: Option<&Type>) -> bool {
        match &s.kind {
            StmtKind::Local { ty, name, init } => {
                if let Some(init) = init {
                    self.expect(init, ty);
                }
                self.declare(name, ty);
                true
            }
            StmtKind::Assign { target, value } => {
                match self.lvalue_type(target) {
                    Some(t) => self.expect(value, &t),
                    None => {
                        self.type_of(value);
                    }
                }
                true
            }
            StmtKind::Expr { expr } => {
                self.type_of(expr);
                if !matches!(expr, Expr::Call { .. } | Expr::Hole(_) | Expr::Filled(_)) {
                    self.error("not a statement");
                }
                true
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.condition(cond);
                let t = self.block(then, ret);
                match otherwise {
                    Some(o) => {
                        let e = self.block(o, ret);
                        t || e
                    }
                    None => true,
                }
            }
            StmtKind::While { cond, body } => self.loop_body(cond, body, ret),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.scopes.push(Vec::new());
                if let Some(init) = init {
                    self.stmt(init, ret);
                }
                if let Some(update) = update {
                    self.stmt(update, ret);
                }
                let completes = self.loop_body(cond, body, ret);
                self.scopes.pop();
                completes
            }
            StmtKind::Block { body } => self.block(body, ret),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                let b = self.block(body, ret);
                let c = self.block(catch, ret);
                match finally {
                    Some(f) => self.block(f, ret) && (b || c),
                    None => b || c,
                }
            }
            StmtKind::Throw { .. } => false,
            StmtKind::Return { value } => {
                match (ret, value) {
                    (None, _) => self.error("return outside method"),
                    (Some(Type::Void), Some(v)) => {
                        self.type_of(v);
                        self.error("incompatible types: unexpected return value");
                    }
                    (Some(Type::Void), None) => {}
                    (Some(t), Some(v)) => self.expect(v, t),
                    (Some(_), None) => self.error("missing return value"),
                }
                false
            }
            StmtKind::Hole(site) => {
                if !site.node.is_statement() {
                    let id = site.id.map_or_else(|| "?".to_string(), |i| i.to_string());
                    self.error(format!("hole {id}: expression used as a statement"));
                }
                true
            }
            StmtKind::Filled(fill) => {
                self.fill_names(&fill.node);
                if !fill.node.is_statement() {
                    self.error(format!("hole {}: `{}` is not a statement", fill.id, fill.text));
                }
                self.fill_completes(&fill.node)
            }
        }
    }
}

fn lit_size(lit: &Lit) -> u32 {
    match lit {
        Lit::Bool(_) | Lit::Null => 1,
        Lit::Int(v) if (-1..=5).contains(v) => 1,
        Lit::Int(v) if i8::try_from(*v).is_ok() => 2,
        Lit::Int(v) if i16::try_from(*v).is_ok() => 3,
        Lit::Int(_) => 2,
        Lit::Long(0 | 1) => 1,
        Lit::Long(_) => 3,
        Lit::Double(d) if *d == 0.0 || *d == 1.0 => 1,
        Lit::Double(_) => 3,
    }
}

fn store_size(slot: u16) -> u32 {
    if slot <= 3 {
        1
    } else {
        2
    }
}

fn node_size(node: &Node) -> u32 {
    2 + node.children().iter().map(|c| node_size(c)).sum::<u32>()
}

/// javac-shaped code layout of one method.
struct Layout {
    pc: u32,
    next_slot: u16,
    /// Per open block: name, slot and index into the local table.
    scopes: Vec<Vec<(String, u16, usize)>>,
    out: MethodLayout,
}

impl Layout {
    fn new() -> Self {
        Self {
            pc: 0,
            next_slot: 0,
            scopes: Vec::new(),
            out: MethodLayout::default(),
        }
    }

    fn method(mut self, params: &[Param], body: &mut [Stmt]) -> MethodLayout {
        self.scopes.push(Vec::new());
        for p in params {
            let slot = self.alloc(&p.ty);
            self.record(&p.name, &p.ty, slot, ARG_START, true);
        }
        self.block(body);
        let end = i64::from(self.pc);
        for local in self.out.locals.iter_mut().filter(|l| l.is_arg) {
            local.end = end;
        }
        self.out.code_len = self.pc;
        self.out
    }

    fn alloc(&mut self, ty: &Type) -> u16 {
        let slot = self.next_slot;
        self.next_slot += if ty.is_wide() { 2 } else { 1 };
        self.out.max_locals = self.out.max_locals.max(self.next_slot);
        slot
    }

    fn record(&mut self, name: &str, ty: &Type, slot: u16, start: i64, is_arg: bool) {
        let index = self.out.locals.len();
        self.out.locals.push(LocalVar {
            name: name.to_string(),
            ty: ty.clone(),
            slot,
            start,
            end: start,
            is_arg,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), slot, index));
        }
    }

    fn open(&mut self) -> u16 {
        self.scopes.push(Vec::new());
        self.next_slot
    }

    fn close(&mut self, saved: u16) {
        if let Some(scope) = self.scopes.pop() {
            for (_, _, index) in scope {
                if let Some(local) = self.out.locals.get_mut(index) {
                    local.end = i64::from(self.pc);
                }
            }
        }
        self.next_slot = saved;
    }

    fn slot_of(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|s| s.iter().rev())
            .find(|(n, _, _)| n == name)
            .map(|(_, slot, _)| *slot)
    }

    fn load_size(&self, name: &str) -> u32 {
        // getstatic/putstatic otherwise
        self.slot_of(name).map_or(3, store_size)
    }

    fn block(&mut self, stmts: &mut [Stmt]) {
        let saved = self.open();
        for s in stmts {
            self.stmt(s);
        }
        self.close(saved);
    }

    fn hole(&mut self, site: &HoleSite) {
        // the node is built, then `eval()` is invoked on it
        self.pc += 3;
        if let Some(id) = site.id {
            self.out.hole_offsets.insert(id, self.pc);
        }
        self.pc += 3;
    }

    fn expr(&mut self, e: &Expr) {
        match e {
            Expr::Lit { value } => self.pc += lit_size(value),
            Expr::Var { name } => self.pc += self.load_size(name),
            Expr::Binary { op, left, right } => {
                self.expr(left);
                self.expr(right);
                self.pc += match op {
                    Operator::Ari(_) | Operator::Shift(_) => 1,
                    Operator::Rel(_) => 7,
                    Operator::Log(_) => 8,
                };
            }
            Expr::Not { expr } => {
                self.expr(expr);
                self.pc += 7;
            }
            Expr::Neg { expr } | Expr::Length { array: expr } => {
                self.expr(expr);
                self.pc += 1;
            }
            Expr::Cast { ty, expr } => {
                self.expr(expr);
                self.pc += if ty.is_reference() { 3 } else { 1 };
            }
            Expr::Index { array, index } => {
                self.expr(array);
                self.expr(index);
                self.pc += 1;
            }
            Expr::NewArray { len, .. } => {
                self.expr(len);
                self.pc += 2;
            }
            Expr::ArrayLit { values, .. } => {
                self.pc += 3;
                for v in values {
                    self.pc += 2;
                    self.expr(v);
                    self.pc += 1;
                }
            }
            Expr::Call { args, .. } => {
                for a in args {
                    self.expr(a);
                }
                self.pc += 3;
            }
            Expr::Hole(site) => self.hole(site),
            Expr::Filled(fill) => self.pc += node_size(&fill.node) + if fill.track { 6 } else { 0 },
        }
    }

    fn stmt(&mut self, s: &mut Stmt) {
        s.offset = self.pc;
        let offset = s.offset;
        match &mut s.kind {
            StmtKind::Local { ty, name, init } => {
                match init {
                    Some(e) => self.expr(e),
                    None => self.pc += 1,
                }
                let slot = self.alloc(ty);
                let store = store_size(slot);
                self.pc += store;
                // the table reports the instruction after the store
                let reported = i64::from(self.pc);
                self.record(name, ty, slot, reported - i64::from(store), false);
                self.out.local_slots.insert(offset, slot);
            }
            StmtKind::Assign { target, value } => match target {
                LValue::Var { name } => {
                    self.expr(value);
                    self.pc += self.load_size(name);
                }
                LValue::Index { array, index } => {
                    self.expr(array);
                    self.expr(index);
                    self.expr(value);
                    self.pc += 1;
                }
            },
            StmtKind::Expr { expr } => {
                self.expr(expr);
                self.pc += 1;
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                self.pc += 3;
                self.block(then);
                if let Some(otherwise) = otherwise {
                    self.pc += 3;
                    self.block(otherwise);
                }
            }
            StmtKind::While { cond, body } => {
                self.expr(cond);
                self.pc += 3;
                self.block(body);
                self.pc += 3;
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let saved = self.open();
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.expr(cond);
                self.pc += 3;
                self.block(body);
                if let Some(update) = update {
                    self.stmt(update);
                }
                self.pc += 3;
                self.close(saved);
            }
            StmtKind::Block { body } => self.block(body),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                self.block(body);
                self.pc += 3;
                let saved = self.open();
                let slot = self.alloc(&Type::Object);
                self.pc += store_size(slot);
                self.block(catch);
                self.close(saved);
                if let Some(finally) = finally {
                    self.block(finally);
                }
            }
            StmtKind::Throw { .. } => self.pc += 8,
            StmtKind::Return { value } => {
                if let Some(v) = value {
                    self.expr(v);
                }
                self.pc += 1;
            }
            StmtKind::Hole(site) => self.hole(site),
            StmtKind::Filled(fill) => self.pc += node_size(&fill.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AriOp, MethodDecl, MethodRole};

    fn class(fields: Vec<FieldDecl>, body: Vec<Stmt>, ret: Type) -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields,
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: vec![Param {
                    name: "p".to_string(),
                    ty: Type::Long,
                }],
                ret,
                role: MethodRole::Entry,
                body,
            }],
        }
    }

    fn diagnostics(c: &TemplateClass) -> Vec<String> {
        match compile(c) {
            Err(JattackError::Compilation { diagnostics, .. }) => diagnostics,
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => Vec::new(),
        }
    }

    fn numbered_hole(node: Node, id: HoleId) -> Expr {
        Expr::Hole(HoleSite {
            id: Some(id),
            condition: false,
            node,
        })
    }

    #[test]
    fn locals_are_live_after_their_store_until_block_exit() {
        let body = vec![
            Stmt::local(Type::Int, "a", Expr::int(1)),
            Stmt::if_else(
                Expr::bool(true),
                vec![
                    Stmt::local(Type::Double, "d", Expr::int(2)),
                    Stmt::expr(numbered_hole(Node::int_val(&[1]), 1)),
                ],
                None,
            ),
            Stmt::local(Type::Int, "b", numbered_hole(Node::int_val(&[2]), 2)),
            Stmt::ret(Some(Expr::var("b"))),
        ];
        let compiled = compile(&class(Vec::new(), body, Type::Int)).unwrap();
        let layout = compiled.layout("m").unwrap();

        let first = layout.hole_offset(1).unwrap();
        let names: Vec<&str> = layout.live_at(first).iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["p", "a", "d"]);

        let second = layout.hole_offset(2).unwrap();
        let names: Vec<&str> = layout.live_at(second).iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["p", "a"]);

        let slot = |n: &str| layout.locals.iter().find(|l| l.name == n).unwrap().slot;
        assert_eq!(slot("p"), 0);
        assert_eq!(slot("a"), 2);
        assert_eq!(slot("d"), 3);
        // d's slots are reused after its block closes
        assert_eq!(slot("b"), 3);
        assert_eq!(layout.max_locals, 5);
        assert!(layout.locals.iter().find(|l| l.name == "p").unwrap().start == ARG_START);
    }

    #[test]
    fn type_errors_are_reported() {
        let body = vec![
            Stmt::local(Type::Int, "x", Expr::var("p")),
            Stmt::assign("nope", Expr::int(1)),
            Stmt::local(Type::Int, "x", Expr::int(1)),
            Stmt::if_else(Expr::int(1), Vec::new(), None),
        ];
        let diags = diagnostics(&class(Vec::new(), body, Type::Int));
        assert!(diags.iter().any(|d| d.contains("long cannot be converted to int")));
        assert!(diags.iter().any(|d| d.contains("cannot find symbol: variable nope")));
        assert!(diags.iter().any(|d| d.contains("variable x is already defined")));
        assert!(diags.iter().any(|d| d.contains("cannot be converted to boolean")));
        assert!(diags.iter().any(|d| d.contains("missing return statement")));
    }

    #[test]
    fn reachability_follows_constant_conditions() {
        let after_loop = vec![
            Stmt::while_loop(Expr::bool(true), Vec::new()),
            Stmt::ret(Some(Expr::int(0))),
        ];
        let diags = diagnostics(&class(Vec::new(), after_loop, Type::Int));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].ends_with("unreachable statement"));

        // an infinite loop needs no return after it
        let forever = vec![Stmt::while_loop(Expr::bool(true), Vec::new())];
        assert!(diagnostics(&class(Vec::new(), forever, Type::Int)).is_empty());

        let dead_loop = vec![
            Stmt::while_loop(Expr::bool(false), Vec::new()),
            Stmt::ret(Some(Expr::int(0))),
        ];
        assert_eq!(diagnostics(&class(Vec::new(), dead_loop, Type::Int)).len(), 1);

        let dead_if = vec![
            Stmt::if_else(Expr::bool(false), vec![Stmt::ret(Some(Expr::int(1)))], None),
            Stmt::ret(Some(Expr::int(0))),
        ];
        assert!(diagnostics(&class(Vec::new(), dead_if, Type::Int)).is_empty());

        let constant_field = vec![
            Stmt::while_loop(
                Expr::binary(
                    Operator::Rel(RelOp::Gt),
                    Expr::var("K"),
                    Expr::int(0),
                ),
                Vec::new(),
            ),
            Stmt::ret(Some(Expr::int(0))),
        ];
        let fields = vec![FieldDecl {
            name: "K".to_string(),
            ty: Type::Int,
            is_final: true,
            init: Some(Expr::binary(Operator::Ari(AriOp::Add), Expr::int(1), Expr::int(2))),
        }];
        assert_eq!(diagnostics(&class(fields, constant_field, Type::Int)).len(), 1);
    }

    #[test]
    fn static_initializer_copy_runs_field_initializers_first() {
        let mut c = class(
            vec![
                FieldDecl {
                    name: "s".to_string(),
                    ty: Type::Int,
                    is_final: true,
                    init: Some(Expr::int(3)),
                },
                FieldDecl {
                    name: "t".to_string(),
                    ty: Type::Int,
                    is_final: false,
                    init: None,
                },
            ],
            vec![Stmt::ret(Some(Expr::var("s")))],
            Type::Int,
        );
        c.static_init = vec![Stmt::assign("t", Expr::var("s"))];
        let compiled = compile(&c).unwrap();
        assert_eq!(compiled.clinit.len(), 2);
        assert!(matches!(
            &compiled.clinit[0].kind,
            StmtKind::Assign { target: LValue::Var { name }, .. } if name == "s"
        ));
        assert_eq!(compiled.state.zeroed(), vec![Value::Int(0), Value::Int(0)]);
        assert!(compiled.state.field("s").unwrap().declared_final);
        assert!(compiled.layouts.contains_key(CLINIT));
    }

    #[test]
    fn assigning_a_final_field_outside_the_initializer_fails() {
        let fields = vec![FieldDecl {
            name: "s".to_string(),
            ty: Type::Int,
            is_final: true,
            init: Some(Expr::int(3)),
        }];
        let body = vec![Stmt::assign("s", Expr::int(1)), Stmt::ret(Some(Expr::int(0)))];
        let diags = diagnostics(&class(fields, body, Type::Int));
        assert!(diags[0].contains("cannot assign a value to final variable s"));
    }
}
