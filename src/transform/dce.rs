//! Dead code elimination driven by condition verdicts.
//!
//! Only conditions that are holes filled in the current run are considered, using the
//! verdict of their current choice. Statement shells stay in place: an always-true
//! condition becomes `true`, so declarations and control flow the rest of the method
//! depends on keep their shape. Holes inside removed code are reported as never
//! reachable.

use std::collections::BTreeSet;

use crate::{holes_of, Expr, HoleId, JattackResult, Session, Stmt, StmtKind, TemplateClass};

struct Eliminator<'s> {
    session: &'s Session,
    dead: BTreeSet<HoleId>,
}

impl Eliminator<'_> {
    fn verdict(&self, cond: &Expr) -> Option<bool> {
        match cond {
            Expr::Hole(site) => site.id.and_then(|id| self.session.verdict_of(id)),
            _ => None,
        }
    }

    fn kill(&mut self, stmts: &[Stmt]) {
        self.dead
            .extend(holes_of(stmts).iter().filter_map(|site| site.id));
    }

    fn block(&mut self, stmts: &mut Vec<Stmt>) {
        let old = std::mem::take(stmts);
        for s in old {
            if let Some(mut kept) = self.stmt(s) {
                for body in kept.bodies_mut() {
                    self.block(body);
                }
                stmts.push(kept);
            }
        }
    }

    /// The statement that replaces `s`, if any.
    fn stmt(&mut self, mut s: Stmt) -> Option<Stmt> {
        match &mut s.kind {
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => match self.verdict(cond) {
                Some(true) => {
                    *cond = Expr::bool(true);
                    if let Some(dropped) = otherwise.take() {
                        self.kill(&dropped);
                    }
                }
                Some(false) => {
                    self.kill(then);
                    return otherwise
                        .take()
                        .map(|body| Stmt::new(StmtKind::Block { body }));
                }
                None => {}
            },
            StmtKind::While { cond, body } => match self.verdict(cond) {
                Some(true) => *cond = Expr::bool(true),
                Some(false) => {
                    self.kill(body);
                    return None;
                }
                None => {}
            },
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => match self.verdict(cond) {
                Some(true) => *cond = Expr::bool(true),
                Some(false) => {
                    self.kill(body);
                    if let Some(update) = update.take() {
                        self.kill(std::slice::from_ref(&*update));
                    }
                    // the initializer still runs once, in its own scope
                    return init.take().map(|init| {
                        Stmt::new(StmtKind::Block {
                            body: vec![*init],
                        })
                    });
                }
                None => {}
            },
            _ => {}
        }
        Some(s)
    }
}

/// Rewrites `class` in place and returns the holes that can no longer be reached.
pub fn eliminate_dead_code(
    class: &mut TemplateClass,
    session: &Session,
) -> JattackResult<BTreeSet<HoleId>> {
    let mut pass = Eliminator {
        session,
        dead: BTreeSet::new(),
    };
    pass.block(&mut class.static_init);
    for m in &mut class.methods {
        pass.block(&mut m.body);
    }
    if !pass.dead.is_empty() {
        tracing::debug!(class = %class.name, holes = ?pass.dead, "never reachable");
    }
    Ok(pass.dead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assign_hole_ids, MethodDecl, MethodRole, Node, RelOp, SearchStrategy, Type, Value,
        VarPool,
    };

    fn resolve_conditions(class: &TemplateClass, session: &mut Session, pool: &VarPool) {
        session.begin_run();
        session.set_driven(true);
        for site in class.holes().into_iter().filter(|h| h.condition) {
            session.resolve(site, pool).unwrap();
        }
        session.set_driven(false);
    }

    fn method(body: Vec<Stmt>) -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: Vec::new(),
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: Vec::new(),
                ret: Type::Void,
                role: MethodRole::Entry,
                body,
            }],
        }
    }

    fn x_pool() -> VarPool {
        let mut pool = VarPool::new();
        pool.declare("x", Type::Int, Value::Int(1));
        pool
    }

    fn cond(ops: &[RelOp]) -> Expr {
        Expr::hole(Node::relation(
            Node::ident(Type::Int, &["x"]),
            Node::ident(Type::Int, &["x"]),
            ops,
        ))
    }

    #[test]
    fn always_true_if_keeps_its_shell_and_drops_else() {
        let mut class = method(vec![Stmt::if_else(
            cond(&[RelOp::Eq]),
            vec![Stmt::hole(Node::block(Vec::new()))],
            Some(vec![Stmt::hole(Node::block(Vec::new()))]),
        )]);
        assign_hole_ids(&mut class).unwrap();
        let mut session = Session::new(SearchStrategy::Random, 0);
        resolve_conditions(&class, &mut session, &x_pool());

        let dead = eliminate_dead_code(&mut class, &session).unwrap();
        assert_eq!(dead, BTreeSet::from([3]));
        match &class.methods[0].body[0].kind {
            StmtKind::If {
                cond: Expr::Lit { .. },
                then,
                otherwise: None,
            } => assert_eq!(then.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn always_false_loops_disappear() {
        let mut class = method(vec![
            Stmt::while_loop(cond(&[RelOp::Ne]), vec![Stmt::hole(Node::block(Vec::new()))]),
            Stmt::ret(None),
        ]);
        assign_hole_ids(&mut class).unwrap();
        let mut session = Session::new(SearchStrategy::Random, 0);
        resolve_conditions(&class, &mut session, &x_pool());

        let dead = eliminate_dead_code(&mut class, &session).unwrap();
        assert_eq!(dead, BTreeSet::from([2]));
        assert_eq!(class.methods[0].body.len(), 1);
    }

    #[test]
    fn unknown_verdicts_leave_code_alone() {
        let open = Expr::hole(Node::relation(
            Node::ident(Type::Int, &["x"]),
            Node::int_val(&[0]),
            &[RelOp::Lt],
        ));
        let mut class = method(vec![Stmt::if_else(open, Vec::new(), Some(Vec::new()))]);
        assign_hole_ids(&mut class).unwrap();
        let mut session = Session::new(SearchStrategy::Random, 0);
        resolve_conditions(&class, &mut session, &x_pool());

        assert!(eliminate_dead_code(&mut class, &session).unwrap().is_empty());
        assert!(matches!(
            &class.methods[0].body[0].kind,
            StmtKind::If { otherwise: Some(_), .. }
        ));
    }
}
