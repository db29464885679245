//! Executes a generated program the way its `main0` harness does.

use crate::{
    compile, Checksum, ClassRegistry, GeneratedProgram, JattackError, JattackResult,
    ProgramReport, Type,
};

/// Runs the entry `min(cap, iterations)` times and returns the harness checksum.
/// Reaching an unfilled hole fails with `NotDriven`.
pub fn run_program(program: &GeneratedProgram, cap: Option<u64>) -> JattackResult<ProgramReport> {
    let harness = &program.harness;
    let iterations = cap.map_or(harness.iterations, |c| c.min(harness.iterations));
    let name = program.name().to_string();
    let entry = program.class.method(&harness.entry).ok_or_else(|| {
        JattackError::InvalidArgument(format!("{name} has no method {}", harness.entry))
    })?;
    let returns_value = entry.ret != Type::Void;

    let mut registry = ClassRegistry::new();
    registry.define(compile(&program.class)?)?;
    let mut interp = registry.interp(&name, None)?;
    interp.run_clinit()?;

    let mut args = Vec::with_capacity(harness.args.len());
    for method in &harness.args {
        args.push(interp.invoke(method, Vec::new())?);
    }

    let mut cs = Checksum::ignoring(&harness.ignored_types);
    for _ in 0..iterations {
        match interp.invoke(&harness.entry, args.clone()) {
            Ok(v) if returns_value => cs.update(&v),
            Ok(_) => {}
            Err(JattackError::Thrown(t)) => cs.update_str(&t.class),
            Err(e) => return Err(e),
        }
    }
    for v in interp.statics() {
        cs.update(v);
    }

    let report = ProgramReport {
        class: name,
        iterations,
        checksum: cs.value(),
        reached_holes: interp.reached().iter().copied().collect(),
        total_holes: harness.total_holes,
    };
    tracing::debug!(class = %report.class, checksum = report.checksum, "program finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assign_hole_ids, synthesize_harness, Expr, FieldDecl, MethodDecl, MethodRole, Node,
        Stmt, TemplateClass,
    };

    fn program(ret: Expr) -> GeneratedProgram {
        let mut class = TemplateClass {
            name: "T".to_string(),
            fields: vec![FieldDecl {
                name: "calls".to_string(),
                ty: Type::Int,
                is_final: false,
                init: Some(Expr::int(0)),
            }],
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: Vec::new(),
                ret: Type::Int,
                role: MethodRole::Entry,
                body: vec![
                    Stmt::assign(
                        "calls",
                        Expr::binary(
                            crate::Operator::Ari(crate::AriOp::Add),
                            Expr::var("calls"),
                            Expr::int(1),
                        ),
                    ),
                    Stmt::ret(Some(ret)),
                ],
            }],
        };
        let info = assign_hole_ids(&mut class).unwrap();
        let harness = synthesize_harness(&mut class, &info, 10, &[], false).unwrap();
        GeneratedProgram { class, harness }
    }

    #[test]
    fn checksum_is_deterministic_and_capped() {
        let p = program(Expr::var("calls"));
        let a = run_program(&p, None).unwrap();
        let b = run_program(&p, None).unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.iterations, 10);

        let capped = run_program(&p, Some(3)).unwrap();
        assert_eq!(capped.iterations, 3);
        assert_ne!(capped.checksum, a.checksum);
        assert_eq!(run_program(&p, Some(50)).unwrap().iterations, 10);
    }

    #[test]
    fn unfilled_holes_are_not_driven() {
        let p = program(Expr::hole(Node::int_val(&[1])));
        let err = run_program(&p, Some(1)).unwrap_err();
        assert!(matches!(err, JattackError::NotDriven { hole: 1 }));
    }
}
