//! Scoped symbol table.
//!
//! The global scope is shared behind an [`Arc`]: forking a table ([`SymbolTable::deep_clone`])
//! never copies it, a mutation of an unfrozen global scope copies it on write. Once
//! [`SymbolTable::deep_freeze`] has been called the global scope is immutable and any attempt to
//! change it is an [`InternalError`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use idl_arch::{Architecture, ParamDef, ParamKind, ParamValue};
use idl_diagnostics::{Diagnostic, DiagnosticContext};
use thiserror::Error;

use crate::ast::{FunctionDef, Loc};
use crate::error::InternalError;
use crate::types::Type;
use crate::value::Value;

/// Maximum nesting of function calls while evaluating.
pub const MAX_CALL_DEPTH: u32 = 64;

#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub ty: Type,
    /// `None` when the value is not known at compile time.
    pub value: Option<Value>,
    /// Decoded from the instruction encoding.
    pub decode_var: bool,
    /// Position in the template parameter list of the enclosing function.
    pub template_index: Option<usize>,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: Type, value: Option<Value>) -> Var {
        Var {
            name: name.into(),
            ty,
            value,
            decode_var: false,
            template_index: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Binding {
    Var(Var),
    Type(Type),
    Function(Arc<FunctionDef>),
}

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("symbol '{0}' is already defined in this scope")]
    Duplicate(String),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

type Scope = HashMap<String, Binding>;

#[derive(Debug, Clone)]
pub struct SymbolTable {
    arch: Arc<dyn Architecture>,
    global: Arc<Scope>,
    frozen: bool,
    scopes: Vec<Scope>,
    xlen: Option<u32>,
    /// Return types of the functions being checked, innermost last.
    functions: Vec<Vec<Type>>,
    call_depth: u32,
    diagnostics: Arc<Mutex<DiagnosticContext>>,
}

impl SymbolTable {
    /// Make a table holding only the builtin globals: `XLEN`, the register file `X` and the
    /// configuration parameters.
    pub fn new(arch: Arc<dyn Architecture>, diagnostics: Arc<Mutex<DiagnosticContext>>) -> Self {
        let xlen = arch.xlen();
        let mut global = Scope::new();
        for param in arch.params() {
            global.insert(param.name.clone(), Binding::Var(param_var(param)));
        }
        insert_xlen_globals(&mut global, xlen);
        SymbolTable {
            arch,
            global: Arc::new(global),
            frozen: false,
            scopes: vec![],
            xlen,
            functions: vec![],
            call_depth: 0,
            diagnostics,
        }
    }

    pub fn arch(&self) -> &Arc<dyn Architecture> {
        &self.arch
    }

    pub fn diagnostics(&self) -> &Arc<Mutex<DiagnosticContext>> {
        &self.diagnostics
    }

    /// The effective XLEN, if known.
    pub fn xlen(&self) -> Option<u32> {
        self.xlen
    }

    /// Number of scopes, the global one included.
    pub fn levels(&self) -> usize {
        self.scopes.len() + 1
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Add a binding to the innermost scope.
    pub fn add(&mut self, name: impl Into<String>, binding: Binding) -> Result<(), SymbolError> {
        let name = name.into();
        match self.scopes.last_mut() {
            Some(scope) => {
                if scope.contains_key(&name) {
                    return Err(SymbolError::Duplicate(name));
                }
                scope.insert(name, binding);
                Ok(())
            }
            None => {
                if self.global.contains_key(&name) {
                    return Err(SymbolError::Duplicate(name));
                }
                self.add_global(name, binding)?;
                Ok(())
            }
        }
    }

    /// Add (or replace) a binding in the global scope.
    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        binding: Binding,
    ) -> Result<(), InternalError> {
        let name = name.into();
        if self.frozen {
            return Err(InternalError::new(format!(
                "cannot add '{}' to a frozen global scope",
                name
            )));
        }
        Arc::make_mut(&mut self.global).insert(name, binding);
        Ok(())
    }

    /// Look up a name, innermost scope first.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.global.get(name))
    }

    pub fn get_var(&self, name: &str) -> Option<&Var> {
        match self.get(name) {
            Some(Binding::Var(var)) => Some(var),
            _ => None,
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        match self.get(name) {
            Some(Binding::Function(f)) => Some(f),
            _ => None,
        }
    }

    /// Whether the name resolves to a binding of the global scope.
    pub fn is_global(&self, name: &str) -> bool {
        !self.scopes.iter().any(|scope| scope.contains_key(name)) && self.global.contains_key(name)
    }

    /// Update the value of the innermost variable called `name`.
    pub fn set_value(&mut self, name: &str, value: Option<Value>) -> Result<(), InternalError> {
        if let Some(scope) = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.contains_key(name))
        {
            return match scope.get_mut(name) {
                Some(Binding::Var(var)) => {
                    var.value = value;
                    Ok(())
                }
                _ => Err(InternalError::new(format!("'{}' is not a variable", name))),
            };
        }
        if self.frozen {
            return Err(InternalError::new(format!(
                "cannot change '{}' in a frozen global scope",
                name
            )));
        }
        match Arc::make_mut(&mut self.global).get_mut(name) {
            Some(Binding::Var(var)) => {
                var.value = value;
                Ok(())
            }
            Some(_) => Err(InternalError::new(format!("'{}' is not a variable", name))),
            None => Err(InternalError::new(format!("undefined variable '{}'", name))),
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop(&mut self) -> Result<(), InternalError> {
        match self.scopes.pop() {
            Some(_) => Ok(()),
            None => Err(InternalError::new("pop of the global scope")),
        }
    }

    /// Run `f` inside a new scope, which is popped whatever `f` returns. A successful `f` that
    /// leaves other scopes pushed, or pops more than it pushed, is an internal error.
    pub fn scoped<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SymbolTable) -> Result<T, E>,
        E: From<InternalError>,
    {
        let levels = self.levels();
        self.push();
        let result = f(self);
        let inner = self.levels();
        self.scopes.truncate(levels - 1);
        if result.is_ok() && inner != levels + 1 {
            bail_internal!(
                "unbalanced scopes: {} levels at the end of a block, expected {}",
                inner,
                levels + 1
            );
        }
        result
    }

    /// An independent copy of the table: no change made to the copy is visible in `self`.
    pub fn deep_clone(&self) -> SymbolTable {
        self.clone()
    }

    /// An independent copy of the table with only the global scope, the context a function body
    /// runs in.
    pub fn global_clone(&self) -> SymbolTable {
        SymbolTable {
            scopes: vec![],
            functions: vec![],
            ..self.clone()
        }
    }

    /// Make the global scope immutable. Only valid with no local scopes.
    pub fn deep_freeze(&mut self) -> Result<(), InternalError> {
        if !self.scopes.is_empty() {
            return Err(InternalError::new(format!(
                "deep_freeze with {} local scopes",
                self.scopes.len()
            )));
        }
        self.frozen = true;
        Ok(())
    }

    /// A copy of the table where the effective XLEN is `xlen`.
    ///
    /// The global scope of the copy is a new one, so this is allowed on a frozen table.
    pub fn specialize_xlen(&self, xlen: u32) -> SymbolTable {
        let mut global = (*self.global).clone();
        insert_xlen_globals(&mut global, Some(xlen));
        SymbolTable {
            global: Arc::new(global),
            xlen: Some(xlen),
            ..self.clone()
        }
    }

    pub fn push_function(&mut self, returns: Vec<Type>) {
        self.functions.push(returns);
    }

    pub fn pop_function(&mut self) -> Result<(), InternalError> {
        self.functions
            .pop()
            .map(|_| ())
            .ok_or_else(|| InternalError::new("pop_function without function"))
    }

    /// Return types of the function being checked, `None` outside of functions.
    pub fn current_function(&self) -> Option<&[Type]> {
        self.functions.last().map(|r| r.as_slice())
    }

    pub fn call_depth(&self) -> u32 {
        self.call_depth
    }

    /// The context of a call to a function: only the global scope, one level deeper.
    pub fn enter_call(&self) -> Option<SymbolTable> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return None;
        }
        let mut table = self.global_clone();
        table.call_depth += 1;
        Some(table)
    }

    /// Emit a warning about the IDL source.
    pub fn warn(&self, loc: &Loc, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", loc, message);
        if let Ok(mut diagnostics) = self.diagnostics.lock() {
            diagnostics.add_diagnostic(
                Diagnostic::warning(message).at(&*loc.file, loc.line as usize),
            );
        }
    }
}

fn insert_xlen_globals(global: &mut Scope, xlen: Option<u32>) {
    global.insert(
        "XLEN".into(),
        Binding::Var(Var::new(
            "XLEN",
            Type::bits(8).make_const(),
            xlen.map(|x| Value::Int(x as u128)),
        )),
    );
    global.insert(
        "X".into(),
        Binding::Var(Var::new(
            "X",
            Type::array(Type::bits_with(xlen), Some(32)),
            None,
        )),
    );
}

fn param_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Boolean(b) => Value::Bool(*b),
        ParamValue::Integer(v) => Value::Int(*v as u128),
        ParamValue::String(s) => Value::String(s.clone()),
        ParamValue::Array(items) => Value::Array(items.iter().map(param_value).collect()),
    }
}

fn param_type(kind: ParamKind, param: &ParamDef) -> Type {
    match kind {
        ParamKind::Bits => Type::bits(param.width.unwrap_or(64)),
        ParamKind::Boolean => Type::boolean(),
        ParamKind::String => Type::string(),
        ParamKind::Array => Type::array(
            param_type(param.element.unwrap_or(ParamKind::Bits), param),
            param.length,
        ),
    }
}

fn param_var(param: &ParamDef) -> Var {
    Var::new(
        param.name.clone(),
        param_type(param.kind, param).make_const(),
        param.value.as_ref().map(param_value),
    )
}

#[cfg(test)]
mod tests {
    use idl_arch::ConfiguredArchitecture;

    use super::*;

    fn table() -> SymbolTable {
        let arch = ConfiguredArchitecture::from_yaml_str(
            "name: t\nxlens: [64]\nparams:\n  MXLEN: { type: bits, width: 7, value: 64 }\n",
        )
        .unwrap();
        SymbolTable::new(Arc::new(arch), Default::default())
    }

    #[test]
    fn test_builtin_globals() {
        let st = table();
        assert_eq!(st.xlen(), Some(64));
        assert_eq!(st.get_var("XLEN").unwrap().value, Some(Value::Int(64)));
        assert_eq!(st.get_var("MXLEN").unwrap().value, Some(Value::Int(64)));
        assert!(st.get_var("MXLEN").unwrap().ty.is_const());
        assert_eq!(st.get_var("X").unwrap().ty.to_string(), "Bits<64>[32]");
    }

    #[test]
    fn test_shadowing_and_duplicates() {
        let mut st = table();
        st.add("a", Binding::Var(Var::new("a", Type::bits(8), None)))
            .unwrap();
        assert!(matches!(
            st.add("a", Binding::Var(Var::new("a", Type::bits(8), None))),
            Err(SymbolError::Duplicate(_))
        ));
        st.push();
        st.add("a", Binding::Var(Var::new("a", Type::boolean(), None)))
            .unwrap();
        assert!(st.get_var("a").unwrap().ty.is_boolean());
        st.pop().unwrap();
        assert!(st.get_var("a").unwrap().ty.is_bits());
        assert!(st.pop().is_err());
    }

    #[test]
    fn test_freeze_forbids_global_changes() {
        let mut st = table();
        st.add("g", Binding::Var(Var::new("g", Type::bits(8), None)))
            .unwrap();
        st.push();
        assert!(st.deep_freeze().is_err());
        st.pop().unwrap();
        st.deep_freeze().unwrap();
        assert!(st.set_value("g", Some(Value::Int(1))).is_err());
        assert!(st.add_global("h", Binding::Type(Type::boolean())).is_err());
        assert!(matches!(
            st.add("h", Binding::Type(Type::boolean())),
            Err(SymbolError::Internal(_))
        ));
        st.push();
        st.add("l", Binding::Var(Var::new("l", Type::bits(8), None)))
            .unwrap();
        st.set_value("l", Some(Value::Int(3))).unwrap();
        st.pop().unwrap();
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let mut st = table();
        st.add("g", Binding::Var(Var::new("g", Type::bits(8), None)))
            .unwrap();
        let mut fork = st.deep_clone();
        fork.set_value("g", Some(Value::Int(7))).unwrap();
        fork.add("h", Binding::Type(Type::boolean())).unwrap();
        assert_eq!(st.get_var("g").unwrap().value, None);
        assert!(st.get("h").is_none());
        assert_eq!(fork.get_var("g").unwrap().value, Some(Value::Int(7)));
    }

    #[test]
    fn test_scoped_pops_on_error() {
        let mut st = table();
        let result: Result<(), InternalError> = st.scoped(|st| {
            st.push();
            Err(InternalError::new("stop"))
        });
        assert_eq!(result.unwrap_err().message, "stop");
        assert_eq!(st.levels(), 1);
    }

    #[test]
    fn test_scoped_rejects_unbalanced_blocks() {
        let mut st = table();
        let result: Result<(), InternalError> = st.scoped(|st| {
            st.push();
            Ok(())
        });
        assert!(result.unwrap_err().message.contains("unbalanced scopes"));
        assert_eq!(st.levels(), 1);

        st.push();
        let result: Result<(), InternalError> = st.scoped(|st| st.pop());
        assert!(result.is_err());
        assert_eq!(st.levels(), 1);
        st.push();
        assert!(st.scoped(|st| st.add("a", Binding::Type(Type::boolean()))).is_ok());
        assert_eq!(st.levels(), 2);
    }

    #[test]
    fn test_specialize_xlen() {
        let mut st = table();
        st.deep_freeze().unwrap();
        let st32 = st.specialize_xlen(32);
        assert_eq!(st32.xlen(), Some(32));
        assert_eq!(st32.get_var("XLEN").unwrap().value, Some(Value::Int(32)));
        assert_eq!(st.get_var("XLEN").unwrap().value, Some(Value::Int(64)));
    }
}
