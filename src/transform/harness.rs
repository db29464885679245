//! Harness synthesis, class renaming and the on-disk form of generated programs.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{
    print_class, rearm_fills, Expr, JattackError, JattackResult, Stmt, StmtKind, TemplateClass,
    TemplateInfo, VisitMut,
};

/// Methods the harness owns; template versions of them are replaced.
const HARNESS_METHODS: [&str; 2] = ["main", "main0"];

/// How a generated program is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Harness {
    /// Entry invocations when no cap is given.
    pub iterations: u64,
    pub entry: String,
    /// Argument methods, called once, in entry parameter order.
    pub args: Vec<String>,
    #[serde(default)]
    pub ignored_types: Vec<String>,
    #[serde(default)]
    pub track_holes: bool,
    pub total_holes: usize,
    pub filled_holes: usize,
}

/// A filled template together with its harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub class: TemplateClass,
    pub harness: Harness,
}

impl GeneratedProgram {
    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn java(&self) -> String {
        print_class(&self.class, Some(&self.harness))
    }

    /// Writes `<Name>.java` and `<Name>.json` into `dir` and returns the Java path.
    pub fn save(&self, dir: &Path) -> JattackResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let java = dir.join(format!("{}.java", self.name()));
        std::fs::write(&java, self.java())?;
        let json = dir.join(format!("{}.json", self.name()));
        std::fs::write(&json, serde_json::to_vec_pretty(self)?)?;
        Ok(java)
    }

    /// Reads a program saved by [`GeneratedProgram::save`]. A `.java` path is
    /// redirected to the JSON document next to it.
    pub fn load(path: &Path) -> JattackResult<Self> {
        let json = if path.extension().map_or(false, |e| e == "java") {
            path.with_extension("json")
        } else {
            path.to_path_buf()
        };
        let text = std::fs::read_to_string(&json)?;
        let mut program: GeneratedProgram = serde_json::from_str(&text)?;
        if program.class.method(&program.harness.entry).is_none() {
            return Err(JattackError::InvalidArgument(format!(
                "{}: entry method {} not found",
                json.display(),
                program.harness.entry
            )));
        }
        rearm_fills(&mut program.class)?;
        Ok(program)
    }
}

struct FillCounter(usize);

impl VisitMut for FillCounter {
    fn stmt(&mut self, stmt: &mut Stmt) -> JattackResult<()> {
        if let StmtKind::Filled(_) = stmt.kind {
            self.0 += 1;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr) -> JattackResult<()> {
        if let Expr::Filled(_) = expr {
            self.0 += 1;
        }
        Ok(())
    }
}

/// Drops template `main`/`main0` methods and describes how to drive the entry.
pub fn synthesize_harness(
    class: &mut TemplateClass,
    info: &TemplateInfo,
    iterations: u64,
    ignored_types: &[String],
    track_holes: bool,
) -> JattackResult<Harness> {
    class
        .methods
        .retain(|m| !HARNESS_METHODS.contains(&m.name.as_str()));
    let mut filled = FillCounter(0);
    class.walk_mut(&mut filled)?;
    Ok(Harness {
        iterations,
        entry: info.entry.clone(),
        args: info.arg_methods.clone(),
        ignored_types: ignored_types.to_vec(),
        track_holes,
        total_holes: info.total_holes,
        filled_holes: filled.0,
    })
}

/// Renames the class. Members are referenced unqualified, so only the name changes.
pub fn rename_class(class: &mut TemplateClass, name: &str) -> JattackResult<()> {
    let valid = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(JattackError::InvalidArgument(format!(
            "invalid class name {name:?}"
        )));
    }
    class.name = name.to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assign_hole_ids, Expr, MethodDecl, MethodRole, Node, Stmt, Type};

    fn class() -> TemplateClass {
        let method = |name: &str, role| MethodDecl {
            name: name.to_string(),
            params: Vec::new(),
            ret: Type::Int,
            role,
            body: vec![Stmt::ret(Some(Expr::hole(Node::int_val(&[3]))))],
        };
        TemplateClass {
            name: "T".to_string(),
            fields: Vec::new(),
            static_init: Vec::new(),
            methods: vec![
                method("m", MethodRole::Entry),
                method("main0", MethodRole::Plain),
            ],
        }
    }

    #[test]
    fn template_main_methods_are_replaced() {
        let mut template = class();
        let info = assign_hole_ids(&mut template).unwrap();
        let harness = synthesize_harness(&mut template, &info, 5, &[], false).unwrap();
        assert_eq!(template.methods.len(), 1);
        assert_eq!(harness.total_holes, 2);
        assert_eq!(harness.filled_holes, 0);
        assert_eq!(harness.entry, "m");
    }

    #[test]
    fn rename_rejects_bad_names() {
        let mut template = class();
        rename_class(&mut template, "TGen0").unwrap();
        assert_eq!(template.name, "TGen0");
        assert!(rename_class(&mut template, "0T").is_err());
        assert!(rename_class(&mut template, "a.b").is_err());
    }

    #[test]
    fn saved_programs_load_back() {
        let dir = std::env::temp_dir().join(format!("jattack-harness-{}", uuid::Uuid::new_v4()));
        let mut template = class();
        let info = assign_hole_ids(&mut template).unwrap();
        let harness = synthesize_harness(&mut template, &info, 5, &[], false).unwrap();
        let program = GeneratedProgram {
            class: template,
            harness,
        };
        let java = program.save(&dir).unwrap();
        assert!(std::fs::read_to_string(&java).unwrap().contains("public static long main0"));

        let loaded = GeneratedProgram::load(&java).unwrap();
        assert_eq!(loaded.harness, program.harness);
        assert_eq!(loaded.name(), "T");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
