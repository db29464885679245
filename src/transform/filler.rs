//! Substitution of resolved choices into a template.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Expr, Fill, HoleId, Itr, JattackResult, Stmt, StmtKind, TemplateClass, VisitMut};

struct Filler<'f> {
    fills: BTreeMap<HoleId, &'f Fill>,
    track: bool,
    filled: usize,
}

impl Filler<'_> {
    fn take(&mut self, id: Option<HoleId>) -> Option<Fill> {
        let fill = id.and_then(|id| self.fills.get(&id))?;
        self.filled += 1;
        Some((*fill).clone())
    }
}

impl VisitMut for Filler<'_> {
    fn stmt(&mut self, stmt: &mut Stmt) -> JattackResult<()> {
        if let StmtKind::Hole(site) = &stmt.kind {
            if let Some(fill) = self.take(site.id) {
                stmt.kind = StmtKind::Filled(fill);
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr) -> JattackResult<()> {
        if let Expr::Hole(site) = expr {
            if let Some(mut fill) = self.take(site.id) {
                fill.track = self.track;
                *expr = Expr::Filled(fill);
            }
        }
        Ok(())
    }
}

/// Replaces every hole that has a fill; other holes stay as they are. Expression
/// fills are marked for tracking when `track` is set. Returns the number replaced.
pub fn fill_holes(class: &mut TemplateClass, fills: &[Fill], track: bool) -> JattackResult<usize> {
    let mut filler = Filler {
        fills: fills.iter().map(|f| (f.id, f)).collect(),
        track,
        filled: 0,
    };
    class.walk_mut(&mut filler)?;
    Ok(filler.filled)
}

struct Rearm(BTreeSet<HoleId>);

impl VisitMut for Rearm {
    fn stmt(&mut self, stmt: &mut Stmt) -> JattackResult<()> {
        if let StmtKind::Filled(fill) = &mut stmt.kind {
            fill.node.reset();
            fill.node.next()?;
            self.0.insert(fill.id);
        }
        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr) -> JattackResult<()> {
        if let Expr::Filled(fill) = expr {
            fill.node.reset();
            fill.node.next()?;
            self.0.insert(fill.id);
        }
        Ok(())
    }
}

/// Positions every fill on its single choice again, as needed after loading a program
/// from JSON. Returns the filled hole ids.
pub fn rearm_fills(class: &mut TemplateClass) -> JattackResult<BTreeSet<HoleId>> {
    let mut rearm = Rearm(BTreeSet::new());
    class.walk_mut(&mut rearm)?;
    Ok(rearm.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assign_hole_ids, MethodDecl, MethodRole, Node, SearchStrategy, Session, Type, VarPool};

    fn class() -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: Vec::new(),
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: Vec::new(),
                ret: Type::Int,
                role: MethodRole::Entry,
                body: vec![
                    Stmt::hole(Node::block(Vec::new())),
                    Stmt::ret(Some(Expr::hole(Node::int_val(&[7, 8])))),
                ],
            }],
        }
    }

    #[test]
    fn only_resolved_holes_are_filled() {
        let mut template = class();
        assign_hole_ids(&mut template).unwrap();
        let mut session = Session::new(SearchStrategy::Systematic, 0);
        session.begin_run();
        session.set_driven(true);
        let ret_hole = template.holes()[1].clone();
        session.resolve(&ret_hole, &VarPool::new()).unwrap();

        let fills = session.fills().unwrap();
        assert_eq!(fill_holes(&mut template, &fills, true).unwrap(), 1);
        assert_eq!(template.holes().len(), 1);
        match &template.methods[0].body[1].kind {
            StmtKind::Return {
                value: Some(Expr::Filled(fill)),
            } => {
                assert_eq!(fill.text, "7");
                assert!(fill.track);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fills_survive_json() {
        let mut template = class();
        assign_hole_ids(&mut template).unwrap();
        let mut session = Session::new(SearchStrategy::Systematic, 0);
        session.begin_run();
        session.set_driven(true);
        for site in template.holes().into_iter().cloned().collect::<Vec<_>>() {
            session.resolve(&site, &VarPool::new()).unwrap();
        }
        fill_holes(&mut template, &session.fills().unwrap(), false).unwrap();

        let json = serde_json::to_string(&template).unwrap();
        let mut loaded = TemplateClass::from_json(&json).unwrap();
        let ids = rearm_fills(&mut loaded).unwrap();
        assert_eq!(ids, BTreeSet::from([1, 2]));
        match &loaded.methods[0].body[1].kind {
            StmtKind::Return {
                value: Some(Expr::Filled(fill)),
            } => assert_eq!(fill.node.to_string(), "7"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
