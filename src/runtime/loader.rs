//! Loaded classes and their static state.

use std::collections::BTreeMap;

use crate::{CompiledClass, Interp, JattackError, JattackResult, Session, Value};

#[derive(Debug)]
pub struct LoadedClass {
    pub compiled: CompiledClass,
    pub statics: Vec<Value>,
    /// Loader generation the class was first defined in.
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<String, LoadedClass>,
    generations: u64,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `compiled`, or redefines the loaded class of the same name.
    ///
    /// A redefinition keeps the static state and must not change the static fields or
    /// the method signatures. Returns the loader generation.
    pub fn define(&mut self, compiled: CompiledClass) -> JattackResult<u64> {
        let name = compiled.name().to_string();
        if let Some(loaded) = self.classes.get_mut(&name) {
            if loaded.compiled.state.shape() != compiled.state.shape() {
                return Err(JattackError::Redefinition {
                    class: name,
                    reason: "static fields changed".to_string(),
                });
            }
            if loaded.compiled.signatures() != compiled.signatures() {
                return Err(JattackError::Redefinition {
                    class: name,
                    reason: "method signatures changed".to_string(),
                });
            }
            loaded.compiled = compiled;
            tracing::trace!(class = %name, generation = loaded.generation, "redefined");
            return Ok(loaded.generation);
        }
        self.generations += 1;
        let statics = compiled.state.zeroed();
        tracing::trace!(class = %name, generation = self.generations, "defined");
        self.classes.insert(
            name,
            LoadedClass {
                compiled,
                statics,
                generation: self.generations,
            },
        );
        Ok(self.generations)
    }

    pub fn get(&self, name: &str) -> JattackResult<&LoadedClass> {
        self.classes
            .get(name)
            .ok_or_else(|| JattackError::InvalidArgument(format!("class {name} is not loaded")))
    }

    pub fn remove(&mut self, name: &str) -> Option<LoadedClass> {
        self.classes.remove(name)
    }

    /// An interpreter over the loaded class and its static state.
    pub fn interp<'s>(
        &'s mut self,
        name: &str,
        session: Option<&'s mut Session>,
    ) -> JattackResult<Interp<'s>> {
        let loaded = self
            .classes
            .get_mut(name)
            .ok_or_else(|| JattackError::InvalidArgument(format!("class {name} is not loaded")))?;
        Ok(Interp::new(&loaded.compiled, &mut loaded.statics, session))
    }

    /// Zeroes every static field, then reruns the static initializer copy.
    pub fn reset_statics(&mut self, name: &str, session: Option<&mut Session>) -> JattackResult<()> {
        let loaded = self
            .classes
            .get_mut(name)
            .ok_or_else(|| JattackError::InvalidArgument(format!("class {name} is not loaded")))?;
        loaded.statics = loaded.compiled.state.zeroed();
        Interp::new(&loaded.compiled, &mut loaded.statics, session).run_clinit()
    }

    pub fn invoke(
        &mut self,
        name: &str,
        method: &str,
        args: Vec<Value>,
        session: Option<&mut Session>,
    ) -> JattackResult<Value> {
        self.interp(name, session)?.invoke(method, args)
    }

    pub fn statics(&self, name: &str) -> JattackResult<&[Value]> {
        Ok(&self.get(name)?.statics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, Expr, FieldDecl, MethodDecl, MethodRole, Stmt, TemplateClass, Type};

    fn class(field_ty: Type, ret: i32) -> TemplateClass {
        TemplateClass {
            name: "T".to_string(),
            fields: vec![FieldDecl {
                name: "s".to_string(),
                ty: field_ty,
                is_final: false,
                init: Some(Expr::int(4)),
            }],
            static_init: Vec::new(),
            methods: vec![MethodDecl {
                name: "m".to_string(),
                params: Vec::new(),
                ret: Type::Int,
                role: MethodRole::Entry,
                body: vec![
                    Stmt::assign("s", Expr::int(ret)),
                    Stmt::ret(Some(Expr::int(ret))),
                ],
            }],
        }
    }

    #[test]
    fn redefinition_keeps_static_state() {
        let mut registry = ClassRegistry::new();
        let first = registry.define(compile(&class(Type::Int, 1)).unwrap()).unwrap();
        registry.reset_statics("T", None).unwrap();
        assert_eq!(registry.statics("T").unwrap(), &[Value::Int(4)]);

        let second = registry.define(compile(&class(Type::Int, 2)).unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.statics("T").unwrap(), &[Value::Int(4)]);
        assert_eq!(
            registry.invoke("T", "m", Vec::new(), None).unwrap(),
            Value::Int(2)
        );
        assert_eq!(registry.statics("T").unwrap(), &[Value::Int(2)]);
    }

    #[test]
    fn shape_changes_are_rejected() {
        let mut registry = ClassRegistry::new();
        registry.define(compile(&class(Type::Int, 1)).unwrap()).unwrap();
        let err = registry
            .define(compile(&class(Type::Long, 1)).unwrap())
            .unwrap_err();
        assert!(matches!(err, JattackError::Redefinition { .. }));
    }

    #[test]
    fn fresh_definitions_get_new_generations() {
        let mut registry = ClassRegistry::new();
        let a = registry.define(compile(&class(Type::Int, 1)).unwrap()).unwrap();
        registry.remove("T");
        let b = registry.define(compile(&class(Type::Int, 1)).unwrap()).unwrap();
        assert!(b > a);
    }
}
