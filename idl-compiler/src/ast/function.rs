//! Functions: definitions, calls, builtins, and the compile units made of a statement list.

use std::sync::Arc;

use idl_arch::VersionRequirement;
use itertools::Itertools;

use crate::ast::eval::internal;
use crate::ast::{Call, Flow, Loc, Stmt, TypeName};
use crate::error::{CompileResult, InternalError, ValueError, ValueResult, ValueResultExt};
use crate::symtab::{Binding, SymbolError, SymbolTable, Var};
use crate::types::{Type, TypeKind};
use crate::value::Value;

/// `Type name`, as in argument and template parameter lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedName {
    pub ty: TypeName,
    pub name: String,
}

pub type TemplateParam = TypedName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub templates: Vec<TemplateParam>,
    pub returns: Vec<TypeName>,
    pub args: Vec<TypedName>,
    pub description: Option<String>,
    /// `None` for builtins.
    pub body: Option<Vec<Stmt>>,
    pub builtin: bool,
    pub loc: Loc,
}

impl FunctionDef {
    pub fn is_template(&self) -> bool {
        !self.templates.is_empty()
    }

    /// A fresh scope, child of the global one, with the template parameters bound. A `None`
    /// value binds the parameter as not known.
    pub fn scope(
        &self,
        caller: &SymbolTable,
        template_values: &[Option<Value>],
    ) -> CompileResult<SymbolTable> {
        let mut symtab = caller.global_clone();
        symtab.push();
        self.bind_templates(&mut symtab, template_values)?;
        Ok(symtab)
    }

    fn bind_templates(
        &self,
        symtab: &mut SymbolTable,
        values: &[Option<Value>],
    ) -> CompileResult<()> {
        if values.len() != self.templates.len() {
            bail_internal!(
                "{} template values for {} template parameters of {}",
                values.len(),
                self.templates.len(),
                self.name
            );
        }
        for (index, (param, value)) in self.templates.iter().zip(values).enumerate() {
            let ty = param.ty.resolve(symtab, &self.loc)?.make_const();
            let var = Var {
                template_index: Some(index),
                ..Var::new(param.name.clone(), ty, value.clone())
            };
            add_unique(symtab, &param.name, Binding::Var(var), &self.loc)?;
        }
        Ok(())
    }

    pub fn arg_types(&self, symtab: &SymbolTable) -> CompileResult<Vec<Type>> {
        self.args
            .iter()
            .map(|arg| arg.ty.resolve(symtab, &self.loc))
            .collect()
    }

    pub fn return_types(&self, symtab: &SymbolTable) -> CompileResult<Vec<Type>> {
        self.returns
            .iter()
            .map(|ty| ty.resolve(symtab, &self.loc))
            .collect()
    }

    /// Check the body of the function, instantiated with the given template values.
    pub fn type_check_body(
        &self,
        caller: &SymbolTable,
        template_values: &[Value],
    ) -> CompileResult<()> {
        let Some(body) = &self.body else {
            if !self.builtin {
                bail_type!(&self.loc, "function {} has no body", self.name);
            }
            return Ok(());
        };
        if self.builtin {
            bail_type!(&self.loc, "builtin function {} cannot have a body", self.name);
        }
        let Some(callee) = caller.enter_call() else {
            trace!("Not checking {} again, call depth exceeded", self.name);
            return Ok(());
        };
        debug!("Checking body of {}", self.name);
        let mut symtab = callee;
        symtab.push();
        self.bind_templates(&mut symtab, &all_known(template_values))?;
        for (arg, ty) in self.args.iter().zip(self.arg_types(&symtab)?) {
            add_unique(
                &mut symtab,
                &arg.name,
                Binding::Var(Var::new(arg.name.clone(), ty, None)),
                &self.loc,
            )?;
        }
        let returns = self.return_types(&symtab)?;
        symtab.push_function(returns);
        for stmt in body {
            stmt.type_check(&mut symtab)?;
        }
        symtab.pop_function()?;
        symtab.pop()?;
        Ok(())
    }

    /// Evaluate a call of the function by executing its body.
    pub fn call(
        &self,
        caller: &SymbolTable,
        template_values: &[Value],
        args: Vec<Option<Value>>,
    ) -> ValueResult<Value> {
        let Some(body) = &self.body else {
            bail_unknown!("{} has no body", self.name);
        };
        let Some(mut symtab) = caller.enter_call() else {
            bail_unknown!("call depth exceeded evaluating {}", self.name);
        };
        symtab.push();
        self.bind_templates(&mut symtab, &all_known(template_values))
            .map_err(internal)?;
        let arg_types = self.arg_types(&symtab).map_err(internal)?;
        for ((arg, ty), value) in self.args.iter().zip(arg_types).zip(args) {
            symtab
                .add(arg.name.clone(), Binding::Var(Var::new(arg.name.clone(), ty, value)))
                .map_err(|e| match e {
                    SymbolError::Internal(e) => ValueError::Internal(e),
                    e => ValueError::Internal(InternalError::new(e.to_string())),
                })?;
        }
        let returns = self.return_types(&symtab).map_err(internal)?;
        let void = returns.is_empty();
        symtab.push_function(returns);
        for stmt in body {
            if let Flow::Return(value) = stmt.execute(&mut symtab)? {
                return Ok(value);
            }
        }
        if void {
            Ok(Value::unit())
        } else {
            bail_unknown!("{} ends without returning a value", self.name)
        }
    }

    pub fn to_idl(&self) -> String {
        let mut out = String::new();
        if self.builtin {
            out += "builtin ";
        }
        out += &format!("function {} {{\n", self.name);
        let typed = |list: &[TypedName]| {
            list.iter()
                .map(|t| format!("{} {}", t.ty.to_idl(), t.name))
                .join(", ")
        };
        if !self.templates.is_empty() {
            out += &format!("  template {}\n", typed(&self.templates));
        }
        if !self.returns.is_empty() {
            out += &format!(
                "  returns {}\n",
                self.returns.iter().map(|t| t.to_idl()).join(", ")
            );
        }
        if !self.args.is_empty() {
            out += &format!("  arguments {}\n", typed(&self.args));
        }
        if let Some(description) = &self.description {
            out += &format!("  description {{\n{}\n  }}\n", description.trim());
        }
        if let Some(body) = &self.body {
            out += "  body {\n";
            for stmt in body {
                for line in stmt.to_idl().lines() {
                    out += &format!("    {}\n", line);
                }
            }
            out += "  }\n";
        }
        out += "}\n";
        out
    }
}

pub(crate) fn add_unique(
    symtab: &mut SymbolTable,
    name: &str,
    binding: Binding,
    loc: &Loc,
) -> CompileResult<()> {
    match symtab.add(name, binding) {
        Ok(()) => Ok(()),
        Err(SymbolError::Duplicate(name)) => bail_type!(loc, "'{}' is already defined", name),
        Err(SymbolError::Internal(e)) => Err(e.into()),
    }
}

impl Call {
    fn function(&self, symtab: &SymbolTable, loc: &Loc) -> CompileResult<Arc<FunctionDef>> {
        match symtab.get(&self.name) {
            Some(Binding::Function(def)) => Ok(def.clone()),
            Some(_) => bail_type!(loc, "'{}' is not a function", self.name),
            None => bail_type!(loc, "undefined function '{}'", self.name),
        }
    }

    pub(crate) fn check(
        &self,
        loc: &Loc,
        symtab: &SymbolTable,
        report: bool,
    ) -> CompileResult<Type> {
        let def = self.function(symtab, loc)?;
        let mut scope = symtab.global_clone();
        scope.push();
        let mut template_values = vec![];
        if def.is_template() {
            let Some(template_args) = &self.template_args else {
                bail_type!(loc, "missing template arguments in call to {}", self.name);
            };
            if template_args.len() != def.templates.len() {
                bail_type!(
                    loc,
                    "wrong number of template arguments in call to {}: expected {}, found {}",
                    self.name,
                    def.templates.len(),
                    template_args.len()
                );
            }
            for (index, (param, arg)) in def.templates.iter().zip(template_args).enumerate() {
                let arg_ty = arg.check(symtab, report)?;
                let param_ty = param.ty.resolve(&scope, &def.loc)?;
                if !arg_ty.is_bits() || !arg_ty.convertible_to(&param_ty) {
                    bail_type!(
                        &arg.loc,
                        "wrong type for template argument {} of {}: expected {}, found {} ({})",
                        param.name,
                        self.name,
                        param_ty,
                        arg,
                        arg_ty
                    );
                }
                let Some(value) = arg.value(symtab).known()? else {
                    bail_type!(
                        &arg.loc,
                        "template argument {} of {} must be known at compile time",
                        arg,
                        self.name
                    );
                };
                let value = value.convert(&arg_ty, &param_ty);
                let var = Var {
                    template_index: Some(index),
                    ..Var::new(param.name.clone(), param_ty.make_const(), Some(value.clone()))
                };
                add_unique(&mut scope, &param.name, Binding::Var(var), &def.loc)?;
                template_values.push(value);
            }
        } else if self.template_args.is_some() {
            bail_type!(loc, "{} is not a template function", self.name);
        }
        let arg_types = def.arg_types(&scope)?;
        if arg_types.len() != self.args.len() {
            bail_type!(
                loc,
                "{} expects {} arguments, found {}",
                self.name,
                arg_types.len(),
                self.args.len()
            );
        }
        for (index, (arg, param_ty)) in self.args.iter().zip(&arg_types).enumerate() {
            let arg_ty = arg.check(symtab, report)?;
            if !arg_ty.convertible_to(param_ty) {
                bail_type!(
                    &arg.loc,
                    "argument {} of {}: cannot convert {} ({}) to {}",
                    index + 1,
                    self.name,
                    arg,
                    arg_ty,
                    param_ty
                );
            }
        }
        let returns = def.return_types(&scope)?;
        if report && def.is_template() {
            def.type_check_body(symtab, &template_values)?;
        }
        Ok(Type::returning(returns))
    }

    pub(crate) fn value(&self, loc: &Loc, symtab: &SymbolTable) -> ValueResult<Value> {
        let def = self.function(symtab, loc).map_err(internal)?;
        if def.builtin {
            return self.builtin_value(&def, symtab);
        }
        let mut template_values = vec![];
        if let Some(template_args) = &self.template_args {
            let scope = def.scope(symtab, &[]).ok();
            for (param, arg) in def.templates.iter().zip(template_args) {
                let value = arg.value(symtab)?;
                let param_ty = match &scope {
                    Some(scope) => param.ty.resolve(scope, &def.loc).ok(),
                    None => None,
                };
                template_values.push(match param_ty {
                    Some(param_ty) => value.convert(&arg.ty(symtab)?, &param_ty),
                    None => value,
                });
            }
        }
        let scope = def
            .scope(symtab, &all_known(&template_values))
            .map_err(internal)?;
        let arg_types = def.arg_types(&scope).map_err(internal)?;
        let mut args = vec![];
        for (arg, param_ty) in self.args.iter().zip(&arg_types) {
            let value = arg.value(symtab).known()?;
            let arg_ty = arg.ty(symtab)?;
            args.push(value.map(|v| v.convert(&arg_ty, param_ty)));
        }
        def.call(symtab, &template_values, args)
    }

    /// Builtins are evaluated against the configuration.
    fn builtin_value(&self, def: &FunctionDef, symtab: &SymbolTable) -> ValueResult<Value> {
        match def.name.as_str() {
            "implemented?" | "implemented_version?" => {
                let extension = self.extension_name(symtab)?;
                let requirement = match self.args.get(1) {
                    Some(arg) => match arg.value(symtab)? {
                        Value::String(req) => match req.parse::<VersionRequirement>() {
                            Ok(req) => Some(req),
                            Err(e) => bail_unknown!("invalid version requirement '{}': {}", req, e),
                        },
                        other => bail_internal!("version requirement evaluated to {}", other),
                    },
                    None => None,
                };
                match symtab.arch().ext(&extension, requirement.as_ref()) {
                    Some(implemented) => Ok(Value::Bool(implemented)),
                    None => bail_unknown!("whether {} is implemented", extension),
                }
            }
            "xlen" => match symtab.xlen() {
                Some(xlen) => Ok(Value::Int(xlen as u128)),
                None => bail_unknown!("XLEN is not known"),
            },
            name => bail_unknown!("builtin {} has no compile-time value", name),
        }
    }

    fn extension_name(&self, symtab: &SymbolTable) -> ValueResult<String> {
        let Some(arg) = self.args.first() else {
            bail_internal!("{} without arguments", self.name);
        };
        let ty = arg.ty(symtab)?;
        let value = arg.value(symtab)?;
        match (ty.kind(), value) {
            (TypeKind::Enum(def), Value::Int(v)) => match def.member_of(v) {
                Some(member) => Ok(member.to_string()),
                None => bail_internal!("{} is not a member of {}", v, def.name),
            },
            (_, Value::String(name)) => Ok(name),
            (_, other) => bail_internal!("extension name evaluated to {}", other),
        }
    }
}

fn all_known(values: &[Value]) -> Vec<Option<Value>> {
    values.iter().cloned().map(Some).collect()
}

/// The body of a function, compiled on its own against a caller-provided scope.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub name: String,
    pub stmts: Vec<Stmt>,
    pub returns: Vec<Type>,
    /// The scope the body runs in: globals plus the symbols the caller provided.
    pub symtab: SymbolTable,
}

impl FunctionBody {
    pub(crate) fn check(&self, symtab: &mut SymbolTable) -> CompileResult<()> {
        symtab.push_function(self.returns.clone());
        let result: CompileResult<()> = symtab.scoped(|symtab| {
            for stmt in &self.stmts {
                stmt.type_check(symtab)?;
            }
            Ok(())
        });
        symtab.pop_function()?;
        result
    }

    pub fn to_idl(&self) -> String {
        self.stmts.iter().map(|s| s.to_idl()).join("\n")
    }
}

/// The operation of an instruction, with its decode variables in scope.
#[derive(Debug, Clone)]
pub struct InstOperation {
    pub name: String,
    pub stmts: Vec<Stmt>,
    pub symtab: SymbolTable,
}

impl InstOperation {
    pub(crate) fn check(&self, symtab: &mut SymbolTable) -> CompileResult<()> {
        symtab.scoped(|symtab| {
            for stmt in &self.stmts {
                stmt.type_check(symtab)?;
            }
            Ok(())
        })
    }

    pub fn to_idl(&self) -> String {
        self.stmts.iter().map(|s| s.to_idl()).join("\n")
    }
}

