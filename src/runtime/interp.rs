//! Tree-walking execution of compiled template classes.
//!
//! Locals live in per-frame slots at the positions the compiler laid out. When
//! execution reaches a hole, the locals whose live range covers the hole's call site
//! and the class's static fields are offered to the session as the hole's scope.

use std::collections::BTreeSet;

use crate::{
    CompiledClass, Expr, Fill, HoleId, HoleSite, JattackError, JattackResult, LValue,
    MethodLayout, Operator, Param, Scope, Session, StateDescriptor, Stmt, StmtKind, Throwable,
    Type, Value, CLINIT,
};

/// Calls nested deeper than this raise `StackOverflowError` in the target.
pub const MAX_CALL_DEPTH: usize = 64;

pub const STACK_OVERFLOW_ERROR: &str = "java.lang.StackOverflowError";

enum Flow {
    Normal,
    Return(Option<Value>),
}

struct Frame<'l> {
    layout: &'l MethodLayout,
    ret: Type,
    slots: Vec<Value>,
    /// Per open block: name, slot and declared type.
    scopes: Vec<Vec<(String, u16, Type)>>,
}

impl<'l> Frame<'l> {
    fn new(layout: &'l MethodLayout, params: &[Param], ret: Type, args: Vec<Value>) -> JattackResult<Self> {
        if params.len() != args.len() {
            return Err(JattackError::InvalidArgument(format!(
                "expected {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }
        let mut frame = Self {
            layout,
            ret,
            slots: vec![Value::Null; usize::from(layout.max_locals)],
            scopes: vec![Vec::new()],
        };
        let arg_slots = layout.locals.iter().filter(|l| l.is_arg);
        for ((p, v), local) in params.iter().zip(args).zip(arg_slots) {
            frame.declare(&p.name, &p.ty, local.slot, v.convert(&p.ty)?)?;
        }
        Ok(frame)
    }

    fn declare(&mut self, name: &str, ty: &Type, slot: u16, value: Value) -> JattackResult<()> {
        let cell = self
            .slots
            .get_mut(usize::from(slot))
            .ok_or_else(|| JattackError::Template(format!("slot {slot} out of range for {name}")))?;
        *cell = value;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), slot, ty.clone()));
        }
        Ok(())
    }

    fn local(&self, name: &str) -> Option<(u16, &Type)> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|s| s.iter().rev())
            .find(|(n, _, _)| n == name)
            .map(|(_, slot, ty)| (*slot, ty))
    }

    fn visible(&self) -> Vec<(String, Type, u16)> {
        self.scopes
            .iter()
            .flatten()
            .map(|(n, slot, ty)| (n.clone(), ty.clone(), *slot))
            .collect()
    }
}

/// The variables a hole sees: live locals shadow static fields.
struct HoleScope<'f> {
    locals: Vec<(String, Type, u16)>,
    slots: &'f mut Vec<Value>,
    state: &'f StateDescriptor,
    statics: &'f mut Vec<Value>,
}

impl HoleScope<'_> {
    fn local(&self, name: &str) -> Option<&(String, Type, u16)> {
        self.locals.iter().rev().find(|(n, _, _)| n == name)
    }
}

impl Scope for HoleScope<'_> {
    fn read(&self, name: &str) -> Option<Value> {
        match self.local(name) {
            Some((_, _, slot)) => self.slots.get(usize::from(*slot)).cloned(),
            None => {
                let field = self.state.field(name)?;
                self.statics.get(field.slot).cloned()
            }
        }
    }

    fn write(&mut self, name: &str, value: Value) -> JattackResult<()> {
        let local = self.local(name).map(|(_, ty, slot)| (ty.clone(), *slot));
        let state = self.state;
        let (cell, ty) = match local {
            Some((ty, slot)) => (self.slots.get_mut(usize::from(slot)), ty),
            None => match state.field(name) {
                Some(field) => (self.statics.get_mut(field.slot), field.ty.clone()),
                None => (None, Type::Void),
            },
        };
        let cell = cell.ok_or_else(|| {
            JattackError::Template(format!("assignment to unknown variable {name}"))
        })?;
        *cell = value.convert(&ty)?;
        Ok(())
    }

    fn vars(&self) -> Vec<(String, Type)> {
        let mut vars: Vec<(String, Type)> = self
            .locals
            .iter()
            .map(|(n, ty, _)| (n.clone(), ty.clone()))
            .collect();
        for field in &self.state.fields {
            if self.local(&field.name).is_none() {
                vars.push((field.name.clone(), field.ty.clone()));
            }
        }
        vars
    }
}

pub struct Interp<'a> {
    compiled: &'a CompiledClass,
    statics: &'a mut Vec<Value>,
    session: Option<&'a mut Session>,
    depth: usize,
    reached: BTreeSet<HoleId>,
}

impl<'a> Interp<'a> {
    /// Without a session, reaching an unfilled hole fails with `NotDriven`.
    pub fn new(
        compiled: &'a CompiledClass,
        statics: &'a mut Vec<Value>,
        session: Option<&'a mut Session>,
    ) -> Self {
        Self {
            compiled,
            statics,
            session,
            depth: 0,
            reached: BTreeSet::new(),
        }
    }

    pub fn invoke(&mut self, method: &str, args: Vec<Value>) -> JattackResult<Value> {
        self.call(method, args)
    }

    /// Runs the static initializer copy against the current static state.
    pub fn run_clinit(&mut self) -> JattackResult<()> {
        let compiled = self.compiled;
        let layout = compiled.layout(CLINIT)?;
        let mut frame = Frame::new(layout, &[], Type::Void, Vec::new())?;
        self.block(&mut frame, &compiled.clinit).map(drop)
    }

    pub fn statics(&self) -> &[Value] {
        self.statics.as_slice()
    }

    /// Holes evaluated so far, resolved or filled.
    pub fn reached(&self) -> &BTreeSet<HoleId> {
        &self.reached
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> JattackResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Throwable::new(STACK_OVERFLOW_ERROR, "").into());
        }
        let compiled = self.compiled;
        let method = compiled.class.method(name).ok_or_else(|| {
            JattackError::InvalidArgument(format!("{} has no method {name}", compiled.name()))
        })?;
        let layout = compiled.layout(name)?;
        let mut frame = Frame::new(layout, &method.params, method.ret.clone(), args)?;
        self.depth += 1;
        let flow = self.block(&mut frame, &method.body);
        self.depth -= 1;
        match flow? {
            Flow::Return(Some(v)) => Ok(v),
            Flow::Return(None) | Flow::Normal => Ok(Value::Null),
        }
    }

    fn block(&mut self, frame: &mut Frame<'_>, stmts: &[Stmt]) -> JattackResult<Flow> {
        frame.scopes.push(Vec::new());
        let result = self.stmts(frame, stmts);
        frame.scopes.pop();
        result
    }

    fn stmts(&mut self, frame: &mut Frame<'_>, stmts: &[Stmt]) -> JattackResult<Flow> {
        for s in stmts {
            if let Flow::Return(v) = self.exec(frame, s)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn condition(&mut self, frame: &mut Frame<'_>, cond: &Expr) -> JattackResult<bool> {
        self.eval(frame, cond)?.as_bool()
    }

    fn exec(&mut self, frame: &mut Frame<'_>, s: &Stmt) -> JattackResult<Flow> {
        match &s.kind {
            StmtKind::Local { ty, name, init } => {
                let value = match init {
                    Some(e) => self.eval(frame, e)?.convert(ty)?,
                    None => ty.default_value(),
                };
                let slot = frame.layout.slot_of_local(s.offset).ok_or_else(|| {
                    JattackError::Template(format!("local {name} has no slot"))
                })?;
                frame.declare(name, ty, slot, value)?;
            }
            StmtKind::Assign { target, value } => self.assign(frame, target, value)?,
            StmtKind::Expr { expr } => {
                self.eval(frame, expr)?;
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.condition(frame, cond)? {
                    return self.block(frame, then);
                }
                if let Some(otherwise) = otherwise {
                    return self.block(frame, otherwise);
                }
            }
            StmtKind::While { cond, body } => {
                while self.condition(frame, cond)? {
                    if let Flow::Return(v) = self.block(frame, body)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                frame.scopes.push(Vec::new());
                let flow = self.for_loop(frame, init.as_deref(), cond, update.as_deref(), body);
                frame.scopes.pop();
                return flow;
            }
            StmtKind::Block { body } => return self.block(frame, body),
            StmtKind::Try {
                body,
                catch,
                finally,
            } => return self.try_stmt(frame, body, catch, finally.as_deref()),
            StmtKind::Throw { class } => return Err(Throwable::new(class, "").into()),
            StmtKind::Return { value } => {
                let value = match value {
                    Some(e) => Some(self.eval(frame, e)?.convert(&frame.ret)?),
                    None => None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Hole(site) => self.exec_hole(frame, site)?,
            StmtKind::Filled(fill) => self.exec_fill(frame, fill)?,
        }
        Ok(Flow::Normal)
    }

    fn for_loop(
        &mut self,
        frame: &mut Frame<'_>,
        init: Option<&Stmt>,
        cond: &Expr,
        update: Option<&Stmt>,
        body: &[Stmt],
    ) -> JattackResult<Flow> {
        if let Some(init) = init {
            self.exec(frame, init)?;
        }
        while self.condition(frame, cond)? {
            if let Flow::Return(v) = self.block(frame, body)? {
                return Ok(Flow::Return(v));
            }
            if let Some(update) = update {
                self.exec(frame, update)?;
            }
        }
        Ok(Flow::Normal)
    }

    /// `catch (Throwable e)`: only target exceptions are caught, and engine errors
    /// skip `finally`.
    fn try_stmt(
        &mut self,
        frame: &mut Frame<'_>,
        body: &[Stmt],
        catch: &[Stmt],
        finally: Option<&[Stmt]>,
    ) -> JattackResult<Flow> {
        let outcome = match self.block(frame, body) {
            Err(JattackError::Thrown(t)) => {
                tracing::trace!(exception = %t, "caught");
                self.block(frame, catch)
            }
            other => other,
        };
        if let Err(e) = &outcome {
            if !e.is_target_exception() {
                return outcome;
            }
        }
        match finally {
            Some(finally) => match self.block(frame, finally)? {
                Flow::Return(v) => Ok(Flow::Return(v)),
                Flow::Normal => outcome,
            },
            None => outcome,
        }
    }

    fn assign(&mut self, frame: &mut Frame<'_>, target: &LValue, value: &Expr) -> JattackResult<()> {
        match target {
            LValue::Var { name } => {
                let v = self.eval(frame, value)?;
                self.store_var(frame, name, v)
            }
            LValue::Index { array, index } => {
                let array = self.eval(frame, array)?;
                let index = self.eval(frame, index)?.as_i64()?;
                let v = self.eval(frame, value)?;
                let elem = array.as_array()?.borrow().elem.clone();
                array.store(index, v.convert(&elem)?)
            }
        }
    }

    fn store_var(&mut self, frame: &mut Frame<'_>, name: &str, v: Value) -> JattackResult<()> {
        if let Some((slot, ty)) = frame.local(name) {
            let v = v.convert(ty)?;
            if let Some(cell) = frame.slots.get_mut(usize::from(slot)) {
                *cell = v;
                return Ok(());
            }
        }
        let field = self
            .compiled
            .state
            .field(name)
            .ok_or_else(|| JattackError::Template(format!("unknown variable {name}")))?;
        let v = v.convert(&field.ty)?;
        match self.statics.get_mut(field.slot) {
            Some(cell) => {
                *cell = v;
                Ok(())
            }
            None => Err(JattackError::Template(format!("static {name} is not allocated"))),
        }
    }

    fn load_var(&self, frame: &Frame<'_>, name: &str) -> JattackResult<Value> {
        if let Some((slot, _)) = frame.local(name) {
            if let Some(v) = frame.slots.get(usize::from(slot)) {
                return Ok(v.clone());
            }
        }
        self.compiled
            .state
            .field(name)
            .and_then(|f| self.statics.get(f.slot))
            .cloned()
            .ok_or_else(|| JattackError::Template(format!("unknown variable {name}")))
    }

    fn eval(&mut self, frame: &mut Frame<'_>, e: &Expr) -> JattackResult<Value> {
        match e {
            Expr::Lit { value } => Ok(value.to_value()),
            Expr::Var { name } => self.load_var(frame, name),
            Expr::Binary { op, left, right } => {
                let l = self.eval(frame, left)?;
                if let Operator::Log(log) = op {
                    if let Some(v) = log.short_circuit(l.as_bool()?) {
                        return Ok(Value::Bool(v));
                    }
                }
                let r = self.eval(frame, right)?;
                op.apply(&l, &r)
            }
            Expr::Not { expr } => Ok(Value::Bool(!self.eval(frame, expr)?.as_bool()?)),
            Expr::Neg { expr } => match self.eval(frame, expr)? {
                Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
                Value::Long(l) => Ok(Value::Long(l.wrapping_neg())),
                Value::Double(d) => Ok(Value::Double(-d)),
                other => Err(JattackError::Template(format!("cannot negate {other:?}"))),
            },
            Expr::Index { array, index } => {
                let array = self.eval(frame, array)?;
                let index = self.eval(frame, index)?.as_i64()?;
                array.load(index)
            }
            Expr::Length { array } => {
                let array = self.eval(frame, array)?;
                let len = array.as_array()?.borrow().data.len();
                Ok(Value::Int(i32::try_from(len).unwrap_or(i32::MAX)))
            }
            Expr::NewArray { elem, len } => {
                let len = self.eval(frame, len)?.as_i64()?;
                Ok(Value::new_array(elem.clone(), len)?)
            }
            Expr::ArrayLit { elem, values } => {
                let mut data = Vec::with_capacity(values.len());
                for v in values {
                    data.push(self.eval(frame, v)?.convert(elem)?);
                }
                Ok(Value::array_from(elem.clone(), data))
            }
            Expr::Call { method, args } => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(frame, a)?);
                }
                self.call(method, values)
            }
            Expr::Cast { ty, expr } => self.eval(frame, expr)?.convert(ty),
            Expr::Hole(site) => self.eval_hole(frame, site),
            Expr::Filled(fill) => self.eval_fill(frame, fill),
        }
    }

    fn hole_locals(frame: &Frame<'_>, site: &HoleSite) -> Vec<(String, Type, u16)> {
        let Some(offset) = site.id.and_then(|id| frame.layout.hole_offset(id)) else {
            return frame.visible();
        };
        frame
            .layout
            .live_at(offset)
            .into_iter()
            .map(|l| (l.name.clone(), l.ty.clone(), l.slot))
            .collect()
    }

    fn with_hole<T>(
        &mut self,
        frame: &mut Frame<'_>,
        site: &HoleSite,
        run: impl FnOnce(&crate::Node, &mut HoleScope<'_>) -> JattackResult<T>,
    ) -> JattackResult<T> {
        let id = site
            .id
            .ok_or_else(|| JattackError::Template("hole reached before numbering".to_string()))?;
        let locals = Self::hole_locals(frame, site);
        let Some(session) = self.session.as_deref_mut() else {
            return Err(JattackError::NotDriven { hole: id });
        };
        let mut scope = HoleScope {
            locals,
            slots: &mut frame.slots,
            state: &self.compiled.state,
            statics: &mut *self.statics,
        };
        let result = match session.resolve(site, &scope) {
            Ok(node) => run(node, &mut scope),
            Err(e) => Err(e),
        };
        self.reached.insert(id);
        // only arithmetic failures inside the hole are flagged as the template's
        if let Err(JattackError::Thrown(t)) = &result {
            if t.template {
                if let Some(session) = self.session.as_deref_mut() {
                    session.note_template_exception();
                }
            }
        }
        result
    }

    fn eval_hole(&mut self, frame: &mut Frame<'_>, site: &HoleSite) -> JattackResult<Value> {
        self.with_hole(frame, site, |node, scope| node.evaluate(scope))
    }

    fn exec_hole(&mut self, frame: &mut Frame<'_>, site: &HoleSite) -> JattackResult<()> {
        self.with_hole(frame, site, |node, scope| node.execute(scope))
    }

    fn fill_scope<'f>(
        frame: &'f mut Frame<'_>,
        state: &'f StateDescriptor,
        statics: &'f mut Vec<Value>,
    ) -> HoleScope<'f> {
        HoleScope {
            locals: frame.visible(),
            slots: &mut frame.slots,
            state,
            statics,
        }
    }

    fn eval_fill(&mut self, frame: &mut Frame<'_>, fill: &Fill) -> JattackResult<Value> {
        self.reached.insert(fill.id);
        let mut scope = Self::fill_scope(frame, &self.compiled.state, &mut *self.statics);
        fill.node.evaluate(&mut scope)
    }

    fn exec_fill(&mut self, frame: &mut Frame<'_>, fill: &Fill) -> JattackResult<()> {
        self.reached.insert(fill.id);
        let mut scope = Self::fill_scope(frame, &self.compiled.state, &mut *self.statics);
        fill.node.execute(&mut scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compile, AriOp, FieldDecl, MethodDecl, MethodRole, Node, RelOp, SearchStrategy,
        TemplateClass,
    };

    fn method(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> MethodDecl {
        MethodDecl {
            name: name.to_string(),
            params,
            ret,
            role: MethodRole::Plain,
            body,
        }
    }

    fn numbered(node: Node, id: HoleId) -> HoleSite {
        HoleSite {
            id: Some(id),
            condition: false,
            node,
        }
    }

    fn class(methods: Vec<MethodDecl>) -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: vec![FieldDecl {
                name: "s".to_string(),
                ty: Type::Int,
                is_final: false,
                init: Some(Expr::int(10)),
            }],
            static_init: Vec::new(),
            methods,
        }
    }

    #[test]
    fn loops_calls_and_statics() {
        let sum = method(
            "sum",
            vec![Param {
                name: "n".to_string(),
                ty: Type::Int,
            }],
            Type::Int,
            vec![
                Stmt::local(Type::Int, "acc", Expr::var("s")),
                Stmt::new(StmtKind::For {
                    init: Some(Box::new(Stmt::local(Type::Int, "i", Expr::int(0)))),
                    cond: Expr::binary(Operator::Rel(RelOp::Lt), Expr::var("i"), Expr::var("n")),
                    update: Some(Box::new(Stmt::assign(
                        "i",
                        Expr::binary(Operator::Ari(AriOp::Add), Expr::var("i"), Expr::int(1)),
                    ))),
                    body: vec![Stmt::assign(
                        "acc",
                        Expr::binary(Operator::Ari(AriOp::Add), Expr::var("acc"), Expr::var("i")),
                    )],
                }),
                Stmt::assign("s", Expr::var("acc")),
                Stmt::ret(Some(Expr::var("acc"))),
            ],
        );
        let compiled = compile(&class(vec![sum])).unwrap();
        let mut statics = compiled.state.zeroed();
        let mut interp = Interp::new(&compiled, &mut statics, None);
        interp.run_clinit().unwrap();
        assert_eq!(interp.invoke("sum", vec![Value::Int(4)]).unwrap(), Value::Int(16));
        assert_eq!(interp.invoke("sum", vec![Value::Int(1)]).unwrap(), Value::Int(16));
        assert_eq!(interp.statics(), &[Value::Int(16)]);
    }

    #[test]
    fn try_catches_target_exceptions_and_runs_finally() {
        let m = method(
            "m",
            Vec::new(),
            Type::Int,
            vec![
                Stmt::local(Type::Int, "r", Expr::int(0)),
                Stmt::new(StmtKind::Try {
                    body: vec![Stmt::assign(
                        "r",
                        Expr::binary(Operator::Ari(AriOp::Div), Expr::int(1), Expr::var("r")),
                    )],
                    catch: vec![Stmt::assign("r", Expr::int(7))],
                    finally: Some(vec![Stmt::assign("s", Expr::int(3))]),
                }),
                Stmt::ret(Some(Expr::var("r"))),
            ],
        );
        let compiled = compile(&class(vec![m])).unwrap();
        let mut statics = compiled.state.zeroed();
        let mut interp = Interp::new(&compiled, &mut statics, None);
        assert_eq!(interp.invoke("m", Vec::new()).unwrap(), Value::Int(7));
        assert_eq!(interp.statics(), &[Value::Int(3)]);
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let r = method(
            "r",
            Vec::new(),
            Type::Int,
            vec![Stmt::ret(Some(Expr::call("r", Vec::new())))],
        );
        let compiled = compile(&class(vec![r])).unwrap();
        let mut statics = compiled.state.zeroed();
        let err = Interp::new(&compiled, &mut statics, None)
            .invoke("r", Vec::new())
            .unwrap_err();
        assert!(matches!(err, JattackError::Thrown(t) if t.class == STACK_OVERFLOW_ERROR));
    }

    #[test]
    fn holes_see_live_locals_and_statics() {
        let body = vec![
            Stmt::local(Type::Int, "a", Expr::int(5)),
            Stmt::if_else(
                Expr::bool(true),
                vec![Stmt::local(Type::Int, "b", Expr::int(6))],
                None,
            ),
            Stmt::ret(Some(Expr::Hole(numbered(Node::ident(Type::Int, &[]), 1)))),
        ];
        let compiled = compile(&class(vec![method("m", Vec::new(), Type::Int, body)])).unwrap();
        let mut statics = compiled.state.zeroed();
        let mut session = Session::new(SearchStrategy::Systematic, 0);
        let mut seen = Vec::new();
        for _ in 0..2 {
            session.begin_run();
            session.set_driven(true);
            let mut interp = Interp::new(&compiled, &mut statics, Some(&mut session));
            interp.run_clinit().unwrap();
            seen.push(interp.invoke("m", Vec::new()).unwrap());
            assert!(interp.reached().contains(&1));
            session.end_run();
        }
        // `b` is out of scope at the hole; `a` sorts before `s`
        assert_eq!(seen, [Value::Int(5), Value::Int(10)]);
    }

    #[test]
    fn template_exceptions_are_flagged() {
        let body = vec![Stmt::ret(Some(Expr::Hole(numbered(
            Node::arith(Node::int_val(&[1]), Node::int_val(&[0]), &[AriOp::Div]),
            1,
        ))))];
        let compiled = compile(&class(vec![method("m", Vec::new(), Type::Int, body)])).unwrap();
        let mut statics = compiled.state.zeroed();
        let mut session = Session::new(SearchStrategy::Random, 0);
        session.begin_run();
        session.set_driven(true);
        let err = Interp::new(&compiled, &mut statics, Some(&mut session))
            .invoke("m", Vec::new())
            .unwrap_err();
        assert!(matches!(err, JattackError::Thrown(t) if t.template));
        assert_eq!(session.template_exceptions(), 1);
    }

    #[test]
    fn array_failures_in_holes_are_not_template_exceptions() {
        let body = vec![
            Stmt::local(
                Type::array_of(Type::Int),
                "xs",
                Expr::NewArray {
                    elem: Type::Int,
                    len: Box::new(Expr::int(1)),
                },
            ),
            Stmt::ret(Some(Expr::Hole(numbered(
                Node::array_access(
                    Node::ident(Type::array_of(Type::Int), &["xs"]),
                    Some(Node::int_val(&[5])),
                ),
                1,
            )))),
        ];
        let compiled = compile(&class(vec![method("m", Vec::new(), Type::Int, body)])).unwrap();
        let mut statics = compiled.state.zeroed();
        let mut session = Session::new(SearchStrategy::Random, 0);
        session.begin_run();
        session.set_driven(true);
        let err = Interp::new(&compiled, &mut statics, Some(&mut session))
            .invoke("m", Vec::new())
            .unwrap_err();
        assert!(
            matches!(err, JattackError::Thrown(t) if t.class == crate::ARRAY_INDEX_EXCEPTION && !t.template)
        );
        assert_eq!(session.template_exceptions(), 0);
    }

    #[test]
    fn holes_without_a_session_are_not_driven() {
        let body = vec![Stmt::ret(Some(Expr::Hole(numbered(Node::int_val(&[1]), 1))))];
        let compiled = compile(&class(vec![method("m", Vec::new(), Type::Int, body)])).unwrap();
        let mut statics = compiled.state.zeroed();
        let err = Interp::new(&compiled, &mut statics, None)
            .invoke("m", Vec::new())
            .unwrap_err();
        assert!(matches!(err, JattackError::NotDriven { hole: 1 }));
    }
}
