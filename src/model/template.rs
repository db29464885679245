//! Target program model: a single Java class whose code may contain holes.
//!
//! All methods are static. Exactly one method is the entry; one argument-provider
//! method per entry parameter computes its argument. Statements carry the byte offset
//! the compiler assigns them; it is never serialized.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::{HoleId, JattackError, JattackResult, Lit, Node, Operator, Type};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateClass {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Body of the `static {}` block, run after field initializers.
    #[serde(default)]
    pub static_init: Vec<Stmt>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodRole {
    #[default]
    Plain,
    /// The method the driver invokes repeatedly.
    Entry,
    /// Computes one entry argument, in declaration order.
    Argument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    pub ret: Type,
    #[serde(default)]
    pub role: MethodRole,
    pub body: Vec<Stmt>,
}

/// A hole as written in the template: the prototype of its choice space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoleSite {
    /// Assigned in source order when the template is numbered.
    #[serde(default)]
    pub id: Option<HoleId>,
    /// Direct condition of an `if`, `while` or `for`.
    #[serde(default)]
    pub condition: bool,
    pub node: Node,
}

/// A hole replaced by its resolved choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub id: HoleId,
    /// Java text of the choice.
    pub text: String,
    /// The node restricted to that choice.
    pub node: Node,
    /// Wrapped in `track(val, id)` when emitted.
    #[serde(default)]
    pub track: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Lit {
        value: Lit,
    },
    Var {
        name: String,
    },
    Binary {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
    Neg {
        expr: Box<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Length {
        array: Box<Expr>,
    },
    NewArray {
        elem: Type,
        len: Box<Expr>,
    },
    ArrayLit {
        elem: Type,
        values: Vec<Expr>,
    },
    Call {
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Cast {
        ty: Type,
        expr: Box<Expr>,
    },
    Hole(HoleSite),
    Filled(Fill),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LValue {
    Var { name: String },
    Index { array: Expr, index: Expr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    #[serde(skip)]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum StmtKind {
    /// Without an initializer the local starts at the type's default value.
    Local {
        ty: Type,
        name: String,
        #[serde(default)]
        init: Option<Expr>,
    },
    Assign {
        target: LValue,
        value: Expr,
    },
    Expr {
        expr: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        cond: Expr,
        #[serde(default)]
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Block {
        body: Vec<Stmt>,
    },
    /// `try { body } catch (Throwable e) { catch } [finally { finally }]`
    Try {
        body: Vec<Stmt>,
        #[serde(default)]
        catch: Vec<Stmt>,
        #[serde(default)]
        finally: Option<Vec<Stmt>>,
    },
    /// `throw new <class>();`
    Throw {
        class: String,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Hole(HoleSite),
    Filled(Fill),
}

impl Expr {
    pub fn int(v: i32) -> Self {
        Self::Lit { value: Lit::Int(v) }
    }

    pub fn long(v: i64) -> Self {
        Self::Lit {
            value: Lit::Long(v),
        }
    }

    pub fn bool(b: bool) -> Self {
        Self::Lit {
            value: Lit::Bool(b),
        }
    }

    pub fn var(name: &str) -> Self {
        Self::Var {
            name: name.to_string(),
        }
    }

    pub fn binary(op: Operator, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        Self::Index {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    pub fn call(method: &str, args: Vec<Expr>) -> Self {
        Self::Call {
            method: method.to_string(),
            args,
        }
    }

    pub fn hole(node: Node) -> Self {
        Self::Hole(HoleSite {
            id: None,
            condition: false,
            node,
        })
    }

    /// Every hole site in evaluation order.
    pub fn holes(&self) -> Vec<&HoleSite> {
        let mut out = Vec::new();
        self.collect_holes(&mut out);
        out
    }

    fn collect_holes<'a>(&'a self, out: &mut Vec<&'a HoleSite>) {
        match self {
            Self::Hole(site) => out.push(site),
            Self::Lit { .. } | Self::Var { .. } | Self::Filled(_) => {}
            Self::Binary { left, right, .. } => {
                left.collect_holes(out);
                right.collect_holes(out);
            }
            Self::Not { expr } | Self::Neg { expr } | Self::Cast { expr, .. } => {
                expr.collect_holes(out)
            }
            Self::Index { array, index } => {
                array.collect_holes(out);
                index.collect_holes(out);
            }
            Self::Length { array } => array.collect_holes(out),
            Self::NewArray { len, .. } => len.collect_holes(out),
            Self::ArrayLit { values, .. } | Self::Call { args: values, .. } => {
                for v in values {
                    v.collect_holes(out);
                }
            }
        }
    }

    pub fn holes_mut(&mut self) -> Vec<&mut HoleSite> {
        let mut out = Vec::new();
        self.collect_holes_mut(&mut out);
        out
    }

    fn collect_holes_mut<'a>(&'a mut self, out: &mut Vec<&'a mut HoleSite>) {
        match self {
            Self::Hole(site) => out.push(site),
            Self::Lit { .. } | Self::Var { .. } | Self::Filled(_) => {}
            Self::Binary { left, right, .. } => {
                left.collect_holes_mut(out);
                right.collect_holes_mut(out);
            }
            Self::Not { expr } | Self::Neg { expr } | Self::Cast { expr, .. } => {
                expr.collect_holes_mut(out)
            }
            Self::Index { array, index } => {
                array.collect_holes_mut(out);
                index.collect_holes_mut(out);
            }
            Self::Length { array } => array.collect_holes_mut(out),
            Self::NewArray { len, .. } => len.collect_holes_mut(out),
            Self::ArrayLit { values, .. } | Self::Call { args: values, .. } => {
                for v in values {
                    v.collect_holes_mut(out);
                }
            }
        }
    }
}

impl Expr {
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Lit { .. } | Self::Var { .. } | Self::Hole(_) | Self::Filled(_) => Vec::new(),
            Self::Binary { left, right, .. } => vec![&mut **left, &mut **right],
            Self::Not { expr } | Self::Neg { expr } | Self::Cast { expr, .. } => vec![&mut **expr],
            Self::Index { array, index } => vec![&mut **array, &mut **index],
            Self::Length { array } => vec![&mut **array],
            Self::NewArray { len, .. } => vec![&mut **len],
            Self::ArrayLit { values, .. } | Self::Call { args: values, .. } => {
                values.iter_mut().collect()
            }
        }
    }

    pub fn walk_mut(&mut self, v: &mut dyn VisitMut) -> JattackResult<()> {
        v.expr(self)?;
        for child in self.children_mut() {
            child.walk_mut(v)?;
        }
        Ok(())
    }
}

/// Mutable pre-order visitor over a template's statements and expressions.
pub trait VisitMut {
    fn stmt(&mut self, _stmt: &mut Stmt) -> JattackResult<()> {
        Ok(())
    }

    fn expr(&mut self, _expr: &mut Expr) -> JattackResult<()> {
        Ok(())
    }
}

impl LValue {
    fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Var { .. } => Vec::new(),
            Self::Index { array, index } => vec![array, index],
        }
    }

    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Var { .. } => Vec::new(),
            Self::Index { array, index } => vec![array, index],
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, offset: 0 }
    }

    pub fn local(ty: Type, name: &str, init: Expr) -> Self {
        Self::new(StmtKind::Local {
            ty,
            name: name.to_string(),
            init: Some(init),
        })
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            target: LValue::Var {
                name: name.to_string(),
            },
            value,
        })
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr { expr })
    }

    pub fn if_else(cond: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::While { cond, body })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return { value })
    }

    pub fn hole(node: Node) -> Self {
        Self::new(StmtKind::Hole(HoleSite {
            id: None,
            condition: false,
            node,
        }))
    }

    /// Expressions evaluated directly by this statement, not by nested statements.
    pub fn own_exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Local { init, .. } => init.iter().collect(),
            StmtKind::Assign { target, value } => {
                let mut v = target.exprs();
                v.push(value);
                v
            }
            StmtKind::Expr { expr } => vec![expr],
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } | StmtKind::For { cond, .. } => {
                vec![cond]
            }
            StmtKind::Return { value } => value.iter().collect(),
            StmtKind::Block { .. }
            | StmtKind::Try { .. }
            | StmtKind::Throw { .. }
            | StmtKind::Hole(_)
            | StmtKind::Filled(_) => Vec::new(),
        }
    }

    pub fn own_exprs_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            StmtKind::Local { init, .. } => init.iter_mut().collect(),
            StmtKind::Assign { target, value } => {
                let mut v = target.exprs_mut();
                v.push(value);
                v
            }
            StmtKind::Expr { expr } => vec![expr],
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } | StmtKind::For { cond, .. } => {
                vec![cond]
            }
            StmtKind::Return { value } => value.iter_mut().collect(),
            StmtKind::Block { .. }
            | StmtKind::Try { .. }
            | StmtKind::Throw { .. }
            | StmtKind::Hole(_)
            | StmtKind::Filled(_) => Vec::new(),
        }
    }

    /// Nested statement lists, in source order.
    pub fn bodies(&self) -> Vec<&Vec<Stmt>> {
        match &self.kind {
            StmtKind::If {
                then, otherwise, ..
            } => {
                let mut v = vec![then];
                v.extend(otherwise.as_ref());
                v
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } | StmtKind::Block { body } => {
                vec![body]
            }
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                let mut v = vec![body, catch];
                v.extend(finally.as_ref());
                v
            }
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match &mut self.kind {
            StmtKind::If {
                then, otherwise, ..
            } => {
                let mut v = vec![then];
                v.extend(otherwise.as_mut());
                v
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } | StmtKind::Block { body } => {
                vec![body]
            }
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                let mut v = vec![body, catch];
                v.extend(finally.as_mut());
                v
            }
            _ => Vec::new(),
        }
    }

    /// Pre-order walk: the statement, its own expressions, then nested statements.
    pub fn walk_mut(&mut self, v: &mut dyn VisitMut) -> JattackResult<()> {
        v.stmt(self)?;
        if let StmtKind::For { init, .. } = &mut self.kind {
            if let Some(init) = init {
                init.walk_mut(v)?;
            }
        }
        for e in self.own_exprs_mut() {
            e.walk_mut(v)?;
        }
        if let StmtKind::For {
            update: Some(update),
            ..
        } = &mut self.kind
        {
            update.walk_mut(v)?;
        }
        for body in self.bodies_mut() {
            for s in body.iter_mut() {
                s.walk_mut(v)?;
            }
        }
        Ok(())
    }

    /// Holes of this statement and everything nested in it, in source order.
    pub fn holes(&self) -> Vec<&HoleSite> {
        let mut out = Vec::new();
        self.collect_holes(&mut out);
        out
    }

    fn collect_holes<'a>(&'a self, out: &mut Vec<&'a HoleSite>) {
        match &self.kind {
            StmtKind::Hole(site) => out.push(site),
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    init.collect_holes(out);
                }
                out.extend(cond.holes());
                if let Some(update) = update {
                    update.collect_holes(out);
                }
                for s in body {
                    s.collect_holes(out);
                }
            }
            _ => {
                for e in self.own_exprs() {
                    out.extend(e.holes());
                }
                for body in self.bodies() {
                    for s in body {
                        s.collect_holes(out);
                    }
                }
            }
        }
    }

    pub fn holes_mut(&mut self) -> Vec<&mut HoleSite> {
        let mut out = Vec::new();
        self.collect_holes_mut(&mut out);
        out
    }

    fn collect_holes_mut<'a>(&'a mut self, out: &mut Vec<&'a mut HoleSite>) {
        match &mut self.kind {
            StmtKind::Hole(site) => out.push(site),
            StmtKind::Filled(_) | StmtKind::Throw { .. } => {}
            StmtKind::Local { init, .. } => {
                if let Some(e) = init {
                    e.collect_holes_mut(out);
                }
            }
            StmtKind::Assign { target, value } => {
                for e in target.exprs_mut() {
                    e.collect_holes_mut(out);
                }
                value.collect_holes_mut(out);
            }
            StmtKind::Expr { expr } => expr.collect_holes_mut(out),
            StmtKind::Return { value } => {
                if let Some(e) = value {
                    e.collect_holes_mut(out);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_holes_mut(out);
                for s in then {
                    s.collect_holes_mut(out);
                }
                for s in otherwise.iter_mut().flatten() {
                    s.collect_holes_mut(out);
                }
            }
            StmtKind::While { cond, body } => {
                cond.collect_holes_mut(out);
                for s in body {
                    s.collect_holes_mut(out);
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    init.collect_holes_mut(out);
                }
                cond.collect_holes_mut(out);
                if let Some(update) = update {
                    update.collect_holes_mut(out);
                }
                for s in body {
                    s.collect_holes_mut(out);
                }
            }
            StmtKind::Block { body } => {
                for s in body {
                    s.collect_holes_mut(out);
                }
            }
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                for s in body.iter_mut().chain(catch.iter_mut()) {
                    s.collect_holes_mut(out);
                }
                for s in finally.iter_mut().flatten() {
                    s.collect_holes_mut(out);
                }
            }
        }
    }
}

pub fn holes_of(stmts: &[Stmt]) -> Vec<&HoleSite> {
    stmts.iter().flat_map(Stmt::holes).collect()
}

impl MethodDecl {
    pub fn signature(&self) -> (String, Vec<Type>, Type) {
        (
            self.name.clone(),
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.ret.clone(),
        )
    }
}

impl TemplateClass {
    pub fn from_json(text: &str) -> JattackResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn entry(&self) -> JattackResult<&MethodDecl> {
        let mut entries = self.methods.iter().filter(|m| m.role == MethodRole::Entry);
        match (entries.next(), entries.next()) {
            (Some(entry), None) => Ok(entry),
            (None, _) => Err(JattackError::Template(format!(
                "{} has no entry method",
                self.name
            ))),
            (Some(_), Some(_)) => Err(JattackError::Template(format!(
                "{} has more than one entry method",
                self.name
            ))),
        }
    }

    pub fn argument_methods(&self) -> Vec<&MethodDecl> {
        self.methods
            .iter()
            .filter(|m| m.role == MethodRole::Argument)
            .collect()
    }

    /// Every hole in numbering order: field initializers, static block, then methods.
    pub fn holes(&self) -> Vec<&HoleSite> {
        let mut out: Vec<&HoleSite> = Vec::new();
        for f in &self.fields {
            if let Some(init) = &f.init {
                out.extend(init.holes());
            }
        }
        out.extend(holes_of(&self.static_init));
        for m in &self.methods {
            out.extend(holes_of(&m.body));
        }
        out
    }

    pub fn holes_mut(&mut self) -> Vec<&mut HoleSite> {
        let mut out: Vec<&mut HoleSite> = Vec::new();
        for f in &mut self.fields {
            if let Some(init) = &mut f.init {
                out.extend(init.holes_mut());
            }
        }
        for s in &mut self.static_init {
            out.extend(s.holes_mut());
        }
        for m in &mut self.methods {
            for s in &mut m.body {
                out.extend(s.holes_mut());
            }
        }
        out
    }

    pub fn hole_ids(&self) -> BTreeSet<HoleId> {
        self.holes().iter().filter_map(|h| h.id).collect()
    }

    /// Walks field initializers, the static block, then every method body.
    pub fn walk_mut(&mut self, v: &mut dyn VisitMut) -> JattackResult<()> {
        for f in &mut self.fields {
            if let Some(init) = &mut f.init {
                init.walk_mut(v)?;
            }
        }
        for s in &mut self.static_init {
            s.walk_mut(v)?;
        }
        for m in &mut self.methods {
            for s in &mut m.body {
                s.walk_mut(v)?;
            }
        }
        Ok(())
    }

    /// Replaces `default` literal domains in every hole with `defaults`.
    pub fn expand_defaults(&mut self, defaults: &dyn Fn(&Type) -> Vec<Lit>) {
        for site in self.holes_mut() {
            site.node.expand_defaults(defaults);
        }
    }
}
