//! Java source text of templates and generated programs.

use crate::{Expr, Harness, LValue, Lit, MethodDecl, MethodRole, Stmt, StmtKind, TemplateClass, Type};

const INDENT: &str = "    ";

/// Runtime exception thrown by an unfilled hole evaluated outside the driver.
pub const NOT_DRIVEN_EXCEPTION: &str = "jattack.exception.InvokedFromNotDriverException";

pub const TOTAL_HOLES: &str = "TOTAL_HOLES";
pub const FILLED_HOLES: &str = "FILLED_HOLES";

struct Printer {
    out: String,
    depth: usize,
    /// Nesting of catch blocks, for fresh exception variable names.
    catches: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn body(&mut self, stmts: &[Stmt]) {
        self.depth += 1;
        for s in stmts {
            self.stmt(s);
        }
        self.depth -= 1;
    }

    fn stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.line(&format!("if ({}) {{", expr(cond)));
                self.body(then);
                match otherwise {
                    Some(otherwise) => {
                        self.line("} else {");
                        self.body(otherwise);
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            StmtKind::While { cond, body } => {
                self.line(&format!("while ({}) {{", expr(cond)));
                self.body(body);
                self.line("}");
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let init = init.as_deref().map(inline).unwrap_or_default();
                let update = update.as_deref().map(inline).unwrap_or_default();
                self.line(&format!("for ({init}; {}; {update}) {{", expr(cond)));
                self.body(body);
                self.line("}");
            }
            StmtKind::Block { body } => {
                self.line("{");
                self.body(body);
                self.line("}");
            }
            StmtKind::Try {
                body,
                catch,
                finally,
            } => {
                self.line("try {");
                self.body(body);
                self.catches += 1;
                self.line(&format!("}} catch (Throwable e{}) {{", self.catches));
                self.body(catch);
                self.catches -= 1;
                if let Some(finally) = finally {
                    self.line("} finally {");
                    self.body(finally);
                }
                self.line("}");
            }
            StmtKind::Throw { class } => self.line(&format!("throw new {class}();")),
            StmtKind::Return { value: Some(v) } => self.line(&format!("return {};", expr(v))),
            StmtKind::Return { value: None } => self.line("return;"),
            StmtKind::Hole(site) => self.line(&format!("{}.eval();", site.node.api_text())),
            StmtKind::Filled(fill) => self.line(&fill.node.to_string()),
            StmtKind::Local { .. } | StmtKind::Assign { .. } | StmtKind::Expr { .. } => {
                self.line(&format!("{};", inline(s)))
            }
        }
    }

    fn method(&mut self, m: &MethodDecl, argument_index: Option<usize>) {
        match (m.role, argument_index) {
            (MethodRole::Entry, _) => self.line("@Entry"),
            (MethodRole::Argument, Some(i)) => self.line(&format!("@Argument({i})")),
            _ => {}
        }
        let params: Vec<String> = m
            .params
            .iter()
            .map(|p| format!("{} {}", p.ty.java_name(), p.name))
            .collect();
        self.line(&format!(
            "public static {} {}({}) {{",
            m.ret.java_name(),
            m.name,
            params.join(", ")
        ));
        self.body(&m.body);
        self.line("}");
    }
}

fn default_lit(ty: &Type) -> Lit {
    match ty {
        Type::Boolean => Lit::Bool(false),
        Type::Int => Lit::Int(0),
        Type::Long => Lit::Long(0),
        Type::Double => Lit::Double(0.0),
        Type::Void | Type::Object | Type::Array(_) => Lit::Null,
    }
}

/// Statement text without the trailing semicolon, as used in `for` headers.
fn inline(s: &Stmt) -> String {
    match &s.kind {
        StmtKind::Local { ty, name, init } => {
            let init = match init {
                Some(e) => expr(e),
                None => default_lit(ty).to_string(),
            };
            format!("{} {name} = {init}", ty.java_name())
        }
        StmtKind::Assign { target, value } => format!("{} = {}", lvalue(target), expr(value)),
        StmtKind::Expr { expr: e } => expr(e),
        StmtKind::Filled(fill) => fill.node.to_string().trim_end_matches(';').to_string(),
        StmtKind::Hole(site) => format!("{}.eval()", site.node.api_text()),
        _ => String::new(),
    }
}

fn lvalue(target: &LValue) -> String {
    match target {
        LValue::Var { name } => name.clone(),
        LValue::Index { array, index } => format!("{}[{}]", expr(array), expr(index)),
    }
}

fn new_array(elem: &Type, len: &Expr) -> String {
    let mut base = elem;
    let mut dims = 0;
    while let Type::Array(inner) = base {
        base = inner;
        dims += 1;
    }
    format!("new {}[{}]{}", base.java_name(), expr(len), "[]".repeat(dims))
}

fn expr(e: &Expr) -> String {
    match e {
        Expr::Lit { value } => value.to_string(),
        Expr::Var { name } => name.clone(),
        Expr::Binary { op, left, right } => format!("({} {op} {})", expr(left), expr(right)),
        Expr::Not { expr: inner } => format!("!{}", expr(inner)),
        Expr::Neg { expr: inner } => format!("-({})", expr(inner)),
        Expr::Index { array, index } => format!("{}[{}]", expr(array), expr(index)),
        Expr::Length { array } => format!("{}.length", expr(array)),
        Expr::NewArray { elem, len } => new_array(elem, len),
        Expr::ArrayLit { elem, values } => {
            let values: Vec<String> = values.iter().map(expr).collect();
            format!("new {}[]{{{}}}", elem.java_name(), values.join(", "))
        }
        Expr::Call { method, args } => {
            let args: Vec<String> = args.iter().map(expr).collect();
            format!("{method}({})", args.join(", "))
        }
        Expr::Cast { ty, expr: inner } => format!("(({}) {})", ty.java_name(), expr(inner)),
        Expr::Hole(site) => format!("{}.eval()", site.node.api_text()),
        Expr::Filled(fill) if fill.track => format!("track({}, {})", fill.node, fill.id),
        Expr::Filled(fill) => fill.node.to_string(),
    }
}

/// Java source of `class`, with the harness members when `harness` is given.
pub fn print_class(class: &TemplateClass, harness: Option<&Harness>) -> String {
    let mut p = Printer {
        out: String::new(),
        depth: 0,
        catches: 0,
    };
    if harness.is_none() {
        p.line("import jattack.annotation.Argument;");
        p.line("import jattack.annotation.Entry;");
    }
    if !class.holes().is_empty() {
        p.line("import static jattack.Boom.*;");
    }
    if harness.is_some() {
        p.line("import org.csutil.checksum.WrappedChecksum;");
    }
    p.line("");
    p.line(&format!("public class {} {{", class.name));
    p.depth += 1;

    for f in &class.fields {
        let modifiers = if f.is_final { "static final" } else { "static" };
        match &f.init {
            Some(init) => p.line(&format!(
                "{modifiers} {} {} = {};",
                f.ty.java_name(),
                f.name,
                expr(init)
            )),
            None => p.line(&format!("{modifiers} {} {};", f.ty.java_name(), f.name)),
        }
        p.line("");
    }
    if !class.static_init.is_empty() {
        p.line("static {");
        p.body(&class.static_init);
        p.line("}");
        p.line("");
    }

    let mut argument_index = 0;
    for m in &class.methods {
        let index = (m.role == MethodRole::Argument).then(|| {
            argument_index += 1;
            argument_index - 1
        });
        // annotations only mean something to the generator
        let index = if harness.is_some() { None } else { index };
        if harness.is_some() && m.role == MethodRole::Entry {
            let mut plain = m.clone();
            plain.role = MethodRole::Plain;
            p.method(&plain, None);
        } else {
            p.method(m, index);
        }
        p.line("");
    }

    if let Some(harness) = harness {
        harness_members(&mut p, class, harness);
    }
    p.depth -= 1;
    p.line("}");
    p.out
}

fn harness_members(p: &mut Printer, class: &TemplateClass, harness: &Harness) {
    if harness.track_holes {
        p.line(&format!(
            "private static final boolean[] {TOTAL_HOLES} = new boolean[{}];",
            harness.total_holes
        ));
        p.line("");
        p.line(&format!(
            "private static final int {FILLED_HOLES} = {};",
            harness.filled_holes
        ));
        p.line("");
        p.line("private static <T> T track(T val, int id) {");
        p.depth += 1;
        p.line(&format!("{TOTAL_HOLES}[id - 1] = true;"));
        p.line("return val;");
        p.depth -= 1;
        p.line("}");
        p.line("");
    }

    p.line("public static long main0(String[] args) {");
    p.depth += 1;
    p.line(&format!("int N = {};", harness.iterations));
    p.line("if (args.length > 0) {");
    p.body_text("N = Math.min(Integer.parseInt(args[0]), N);");
    p.line("}");
    p.line("WrappedChecksum cs = new WrappedChecksum();");
    let entry = class.method(&harness.entry);
    let mut call_args = Vec::new();
    for (i, arg) in harness.args.iter().enumerate() {
        let ty = entry
            .and_then(|m| m.params.get(i))
            .map_or_else(|| "Object".to_string(), |p| p.ty.java_name());
        p.line(&format!("{ty} eArg{} = {arg}();", i + 1));
        call_args.push(format!("eArg{}", i + 1));
    }
    let call = format!("{}({})", harness.entry, call_args.join(", "));
    p.line("for (int i = 0; i < N; ++i) {");
    p.depth += 1;
    p.line("try {");
    if entry.map_or(false, |m| m.ret == Type::Void) {
        p.body_text(&format!("{call};"));
    } else {
        p.body_text(&format!("cs.update({call});"));
    }
    p.line("} catch (Throwable e) {");
    p.depth += 1;
    p.line(&format!("if (e instanceof {NOT_DRIVEN_EXCEPTION}) {{"));
    p.body_text(&format!("throw ({NOT_DRIVEN_EXCEPTION}) e;"));
    p.line("}");
    p.line("cs.update(e.getClass().getName());");
    p.depth -= 1;
    p.line("}");
    p.depth -= 1;
    p.line("}");
    p.line(&format!("cs.updateStaticFieldsOfClass({}.class);", class.name));
    p.line("return cs.getValue();");
    p.depth -= 1;
    p.line("}");
    p.line("");

    p.line("public static void main(String[] args) {");
    p.body_text("System.out.println(main0(args));");
    p.line("}");
}

impl Printer {
    fn body_text(&mut self, text: &str) {
        self.depth += 1;
        self.line(text);
        self.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AriOp, FieldDecl, Node, Operator, Param};

    fn class() -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: vec![FieldDecl {
                name: "s".to_string(),
                ty: Type::array_of(Type::Int),
                is_final: false,
                init: Some(Expr::NewArray {
                    elem: Type::Int,
                    len: Box::new(Expr::int(3)),
                }),
            }],
            static_init: Vec::new(),
            methods: vec![
                MethodDecl {
                    name: "m".to_string(),
                    params: vec![Param {
                        name: "a".to_string(),
                        ty: Type::Int,
                    }],
                    ret: Type::Int,
                    role: MethodRole::Entry,
                    body: vec![
                        Stmt::new(StmtKind::Try {
                            body: vec![Stmt::new(StmtKind::Throw {
                                class: "java.lang.RuntimeException".to_string(),
                            })],
                            catch: Vec::new(),
                            finally: None,
                        }),
                        Stmt::ret(Some(Expr::binary(
                            Operator::Ari(AriOp::Add),
                            Expr::var("a"),
                            Expr::hole(Node::int_val(&[1, 2])),
                        ))),
                    ],
                },
                MethodDecl {
                    name: "arg0".to_string(),
                    params: Vec::new(),
                    ret: Type::Int,
                    role: MethodRole::Argument,
                    body: vec![Stmt::ret(Some(Expr::int(5)))],
                },
            ],
        }
    }

    #[test]
    fn templates_print_with_annotations_and_hole_calls() {
        let text = print_class(&class(), None);
        assert!(text.contains("import static jattack.Boom.*;"));
        assert!(text.contains("static int[] s = new int[3];"));
        assert!(text.contains("@Entry\n    public static int m(int a) {"));
        assert!(text.contains("@Argument(0)"));
        assert!(text.contains("} catch (Throwable e1) {"));
        assert!(text.contains("return (a + intVal(new int[]{1, 2}).eval());"));
    }

    #[test]
    fn harness_drives_the_entry() {
        let harness = Harness {
            iterations: 10,
            entry: "m".to_string(),
            args: vec!["arg0".to_string()],
            ignored_types: Vec::new(),
            track_holes: true,
            total_holes: 1,
            filled_holes: 1,
        };
        let text = print_class(&class(), Some(&harness));
        assert!(!text.contains("@Entry"));
        assert!(text.contains("int eArg1 = arg0();"));
        assert!(text.contains("cs.update(m(eArg1));"));
        assert!(text.contains("cs.updateStaticFieldsOfClass(T.class);"));
        assert!(text.contains("private static final boolean[] TOTAL_HOLES = new boolean[1];"));
        assert!(text.trim_end().ends_with('}'));
    }
}
