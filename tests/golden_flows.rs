use std::path::PathBuf;

use jattack::{
    generate, run_program, Config, Expr, GenerateOptions, GeneratedProgram, GenerationStatus,
    MethodDecl, MethodRole, Node, Operator, AriOp, RelOp, SearchStrategy, Stmt, TemplateClass,
    Type,
};

fn temp_workspace(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("jattack-golden-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn config(ws: &PathBuf) -> Config {
    Config {
        output_dir: ws.join("out"),
        invocations: 4,
        ..Config::default()
    }
}

fn entry(body: Vec<Stmt>) -> TemplateClass {
    TemplateClass {
        name: "T".to_string(),
        fields: Vec::new(),
        static_init: Vec::new(),
        methods: vec![MethodDecl {
            name: "m".to_string(),
            params: Vec::new(),
            ret: Type::Int,
            role: MethodRole::Entry,
            body,
        }],
    }
}

/// `int a = {1,2,3}; int b = {1,2,3}; return a * 10 + b;`
fn two_holes() -> TemplateClass {
    entry(vec![
        Stmt::local(Type::Int, "a", Expr::hole(Node::int_val(&[1, 2, 3]))),
        Stmt::local(Type::Int, "b", Expr::hole(Node::int_val(&[1, 2, 3]))),
        Stmt::ret(Some(Expr::binary(
            Operator::Ari(AriOp::Add),
            Expr::binary(Operator::Ari(AriOp::Mul), Expr::var("a"), Expr::int(10)),
            Expr::var("b"),
        ))),
    ])
}

#[test]
fn systematic_search_walks_every_combination_once() {
    let ws = temp_workspace("systematic");
    let result = generate(
        &config(&ws),
        &two_holes(),
        &GenerateOptions {
            strategy: Some(SearchStrategy::Systematic),
            seed: Some(1),
            exhaustive: true,
            ..GenerateOptions::default()
        },
    )
    .expect("generate");

    assert_eq!(result.summary.status, GenerationStatus::Exhausted);
    assert_eq!(result.summary.outputs, 9);
    assert_eq!(result.summary.filled_holes, 2);

    let mut expected = Vec::new();
    for a in 1..=3 {
        for b in 1..=3 {
            expected.push((a, b));
        }
    }
    for (program, (a, b)) in result.programs.iter().zip(expected) {
        let java = program.java();
        assert!(java.contains(&format!("int a = {a};")), "{java}");
        assert!(java.contains(&format!("int b = {b};")), "{java}");
    }
    assert_eq!(result.programs[8].name(), "TGen8");
    assert!(ws.join("out").join("TGen8.java").exists());
    let _ = std::fs::remove_dir_all(&ws);
}

#[test]
fn always_true_condition_collapses_to_its_then_branch() {
    let ws = temp_workspace("dce");
    let cond = Expr::hole(Node::relation(
        Node::ident(Type::Int, &["x"]),
        Node::ident(Type::Int, &["x"]),
        &[RelOp::Eq],
    ));
    let template = entry(vec![
        Stmt::local(Type::Int, "x", Expr::int(1)),
        Stmt::if_else(
            cond,
            vec![Stmt::assign("x", Expr::hole(Node::int_val(&[5])))],
            Some(vec![Stmt::assign("x", Expr::hole(Node::int_val(&[6])))]),
        ),
        Stmt::ret(Some(Expr::var("x"))),
    ]);
    let result = generate(
        &config(&ws),
        &template,
        &GenerateOptions {
            strategy: Some(SearchStrategy::Systematic),
            seed: Some(2),
            ..GenerateOptions::default()
        },
    )
    .expect("generate");

    assert_eq!(result.programs.len(), 1);
    assert_eq!(result.summary.solver_calls, 1);
    let java = result.programs[0].java();
    assert!(java.contains("if (true) {"), "{java}");
    assert!(java.contains("x = 5;"), "{java}");
    assert!(!java.contains("else"), "{java}");
    assert!(!java.contains("intVal"), "{java}");
    let _ = std::fs::remove_dir_all(&ws);
}

#[test]
fn saved_programs_run_to_the_same_checksum() {
    let ws = temp_workspace("run");
    let result = generate(
        &config(&ws),
        &two_holes(),
        &GenerateOptions {
            strategy: Some(SearchStrategy::Random),
            seed: Some(3),
            n_outputs: Some(2),
            ..GenerateOptions::default()
        },
    )
    .expect("generate");
    assert_eq!(result.summary.status, GenerationStatus::Quota);

    for program in &result.programs {
        let direct = run_program(program, None).expect("run generated program");
        let path = ws.join("out").join(format!("{}.json", program.name()));
        let loaded = GeneratedProgram::load(&path).expect("load program");
        let reloaded = run_program(&loaded, None).expect("run loaded program");
        assert_eq!(direct.checksum, reloaded.checksum);
        assert_eq!(reloaded.reached_holes, vec![1, 2]);
        assert_eq!(reloaded.iterations, 4);
    }
    let _ = std::fs::remove_dir_all(&ws);
}

#[test]
fn random_search_is_reproducible_from_its_seed() {
    let texts = |tag: &str| {
        let ws = temp_workspace(tag);
        let result = generate(
            &config(&ws),
            &two_holes(),
            &GenerateOptions {
                strategy: Some(SearchStrategy::Random),
                seed: Some(42),
                n_outputs: Some(3),
                ..GenerateOptions::default()
            },
        )
        .expect("generate");
        let _ = std::fs::remove_dir_all(&ws);
        result
            .programs
            .iter()
            .map(GeneratedProgram::java)
            .collect::<Vec<_>>()
    };
    assert_eq!(texts("seed-a"), texts("seed-b"));
}
