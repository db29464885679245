//! Hole numbering and template validation.

use serde::{Deserialize, Serialize};

use crate::{Expr, HoleId, JattackError, JattackResult, Stmt, StmtKind, TemplateClass, VisitMut};

/// What numbering learned about a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub total_holes: usize,
    pub entry: String,
    /// Argument methods in entry parameter order.
    pub arg_methods: Vec<String>,
}

struct ConditionMarker;

impl VisitMut for ConditionMarker {
    fn stmt(&mut self, stmt: &mut Stmt) -> JattackResult<()> {
        match &mut stmt.kind {
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } | StmtKind::For { cond, .. } => {
                if let Expr::Hole(site) = cond {
                    site.condition = true;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Numbers every hole 1.. in source order, marks condition holes and checks the
/// entry and argument methods.
pub fn assign_hole_ids(class: &mut TemplateClass) -> JattackResult<TemplateInfo> {
    let mut total = 0usize;
    for (i, site) in class.holes_mut().into_iter().enumerate() {
        let id = HoleId::try_from(i + 1)
            .map_err(|_| JattackError::Template("too many holes".to_string()))?;
        site.id = Some(id);
        site.condition = false;
        total = i + 1;
    }
    class.walk_mut(&mut ConditionMarker)?;
    let info = validate(class, total)?;
    tracing::debug!(class = %class.name, holes = total, entry = %info.entry, "numbered holes");
    Ok(info)
}

fn validate(class: &TemplateClass, total_holes: usize) -> JattackResult<TemplateInfo> {
    let entry = class.entry()?;
    let args = class.argument_methods();
    if args.len() != entry.params.len() {
        return Err(JattackError::Template(format!(
            "entry {} takes {} parameters but {} argument methods are declared",
            entry.name,
            entry.params.len(),
            args.len()
        )));
    }
    for (param, method) in entry.params.iter().zip(&args) {
        if !method.params.is_empty() {
            return Err(JattackError::Template(format!(
                "argument method {} must not take parameters",
                method.name
            )));
        }
        if !param.ty.accepts(&method.ret) {
            return Err(JattackError::Template(format!(
                "argument method {} returns {} but parameter {} is {}",
                method.name, method.ret, param.name, param.ty
            )));
        }
    }
    Ok(TemplateInfo {
        total_holes,
        entry: entry.name.clone(),
        arg_methods: args.iter().map(|m| m.name.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MethodDecl, MethodRole, Node, Param, RelOp, Type};

    fn template(arg_ret: Type) -> TemplateClass {
        let cond = Expr::hole(Node::relation(
            Node::ident(Type::Int, &["a"]),
            Node::int_val(&[0]),
            &[RelOp::Gt],
        ));
        TemplateClass {
            name: "T".to_string(),
            fields: Vec::new(),
            static_init: Vec::new(),
            methods: vec![
                MethodDecl {
                    name: "m".to_string(),
                    params: vec![Param {
                        name: "a".to_string(),
                        ty: Type::Long,
                    }],
                    ret: Type::Int,
                    role: MethodRole::Entry,
                    body: vec![
                        Stmt::while_loop(cond, vec![Stmt::hole(Node::block(Vec::new()))]),
                        Stmt::ret(Some(Expr::hole(Node::int_val(&[1])))),
                    ],
                },
                MethodDecl {
                    name: "arg".to_string(),
                    params: Vec::new(),
                    ret: arg_ret,
                    role: MethodRole::Argument,
                    body: vec![Stmt::ret(Some(Expr::int(3)))],
                },
            ],
        }
    }

    #[test]
    fn holes_are_numbered_and_conditions_marked() {
        let mut class = template(Type::Int);
        let info = assign_hole_ids(&mut class).unwrap();
        assert_eq!(info.total_holes, 3);
        assert_eq!(info.arg_methods, ["arg"]);
        let holes = class.holes();
        let ids: Vec<_> = holes.iter().map(|h| h.id).collect();
        assert_eq!(ids, [Some(1), Some(2), Some(3)]);
        let conditions: Vec<_> = holes.iter().map(|h| h.condition).collect();
        assert_eq!(conditions, [true, false, false]);
    }

    #[test]
    fn argument_types_must_fit_the_entry() {
        let mut class = template(Type::Double);
        let err = assign_hole_ids(&mut class).unwrap_err();
        assert!(err.to_string().contains("argument method arg returns double"));
    }
}
