//! Call graph closures: the functions a compile unit may call and the exceptions it may raise.
//!
//! Both walk the unit like the evaluator would: a branch whose condition is known only has its
//! taken side visited, every other branch is visited assuming it may run. Calls to user functions
//! are followed into their bodies, bound to the argument values known at the call site.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::ast::{
    add_unique, forget, BinaryOp, Call, Checked, Expr, ExprKind, FunctionDef, Loc, Stmt, StmtKind,
};
use crate::error::{CompileResult, ValueResultExt};
use crate::passes::{apply, root_scope, AnalysisRoot};
use crate::symtab::{Binding, SymbolTable, Var, MAX_CALL_DEPTH};
use crate::value::Value;

lazy_static! {
    /// Builtins whose first argument is the code of the exception they raise.
    pub static ref RAISE_FUNCTIONS: HashSet<&'static str> = {
        let mut functions = HashSet::new();
        functions.insert("raise");
        functions.insert("raise_precise");
        functions
    };
}

/// A function instantiation already walked: name, template values and argument values.
type CallKey = (String, Vec<Option<Value>>, Vec<Option<Value>>);

/// Walks the calls reachable from a list of statements, reporting each one to `visit`.
struct CallWalker<V> {
    visit: V,
    walked: HashSet<CallKey>,
    depth: u32,
}

impl<V> CallWalker<V>
where
    V: FnMut(&Expr, &Call, &Arc<FunctionDef>, &SymbolTable) -> CompileResult<()>,
{
    fn new(visit: V) -> Self {
        CallWalker {
            visit,
            walked: HashSet::new(),
            depth: 0,
        }
    }

    /// Returns whether the block always returns.
    fn walk_block(&mut self, stmts: &[Stmt], symtab: &mut SymbolTable) -> CompileResult<bool> {
        for stmt in stmts {
            if self.walk_stmt(stmt, symtab)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn walk_stmt(&mut self, stmt: &Stmt, symtab: &mut SymbolTable) -> CompileResult<bool> {
        match &stmt.kind {
            StmtKind::If { cond, body, orelse } => {
                self.walk_expr(cond, symtab)?;
                match cond.value(symtab).known()?.and_then(|v| v.as_bool()) {
                    Some(taken) => {
                        let block = if taken { body } else { orelse };
                        symtab.scoped(|symtab| self.walk_block(block, symtab))
                    }
                    None => {
                        let body_returns = self.walk_branch(body, symtab)?;
                        let orelse_returns = self.walk_branch(orelse, symtab)?;
                        stmt.execute_unknown(symtab)?;
                        Ok(body_returns && orelse_returns)
                    }
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.walk_exprs(init, symtab)?;
                let mut scope = symtab.deep_clone();
                scope.scoped(|scope| -> CompileResult<()> {
                    init.execute_unknown(scope)?;
                    let mut assigned = vec![];
                    stmt.assigned_vars(&mut assigned);
                    for name in &assigned {
                        forget(name, scope)?;
                    }
                    self.walk_expr(cond, scope)?;
                    self.walk_exprs(update, scope)?;
                    scope.scoped(|scope| self.walk_block(body, scope))?;
                    Ok(())
                })?;
                apply(stmt, symtab)?;
                Ok(false)
            }
            StmtKind::Return(_) => {
                self.walk_exprs(stmt, symtab)?;
                Ok(true)
            }
            _ => {
                self.walk_exprs(stmt, symtab)?;
                apply(stmt, symtab)?;
                Ok(false)
            }
        }
    }

    fn walk_branch(&mut self, stmts: &[Stmt], symtab: &SymbolTable) -> CompileResult<bool> {
        let mut branch = symtab.deep_clone();
        branch.scoped(|branch| self.walk_block(stmts, branch))
    }

    fn walk_exprs(&mut self, stmt: &Stmt, symtab: &SymbolTable) -> CompileResult<()> {
        for expr in stmt.exprs() {
            self.walk_expr(expr, symtab)?;
        }
        Ok(())
    }

    fn walk_expr(&mut self, expr: &Expr, symtab: &SymbolTable) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::Ternary { cond, then, orelse } => {
                self.walk_expr(cond, symtab)?;
                match cond.value(symtab).known()?.and_then(|v| v.as_bool()) {
                    Some(true) => self.walk_expr(then, symtab),
                    Some(false) => self.walk_expr(orelse, symtab),
                    None => {
                        self.walk_expr(then, symtab)?;
                        self.walk_expr(orelse, symtab)
                    }
                }
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::LogicalAnd | BinaryOp::LogicalOr),
                lhs,
                rhs,
            } => {
                self.walk_expr(lhs, symtab)?;
                let short = *op == BinaryOp::LogicalOr;
                if lhs.value(symtab).known()?.and_then(|v| v.as_bool()) == Some(short) {
                    return Ok(());
                }
                self.walk_expr(rhs, symtab)
            }
            ExprKind::Call(call) => {
                for arg in expr.children() {
                    self.walk_expr(arg, symtab)?;
                }
                self.walk_call(expr, call, symtab)
            }
            _ => {
                for child in expr.children() {
                    self.walk_expr(child, symtab)?;
                }
                Ok(())
            }
        }
    }

    fn walk_call(&mut self, expr: &Expr, call: &Call, symtab: &SymbolTable) -> CompileResult<()> {
        let Some(def) = symtab.get_function(&call.name).cloned() else {
            bail_internal!("call of undefined function {}", call.name);
        };
        (self.visit)(expr, call, &def, symtab)?;
        let Some(body) = &def.body else {
            return Ok(());
        };
        if self.depth >= MAX_CALL_DEPTH {
            trace!("{}: not following {}, call depth exceeded", expr.loc, call.name);
            return Ok(());
        }

        let mut template_values = vec![];
        let globals = symtab.global_clone();
        for (param, arg) in def.templates.iter().zip(call.template_args.iter().flatten()) {
            let value = arg.value(symtab).known()?;
            if value.is_none() {
                trace!("{}: template argument {} is not known", arg.loc, arg);
            }
            let param_ty = param.ty.resolve(&globals, &def.loc)?;
            let arg_ty = arg.type_of(symtab)?;
            template_values.push(value.map(|v| v.convert(&arg_ty, &param_ty)));
        }
        let mut scope = def.scope(symtab, &template_values)?;
        let arg_types = def.arg_types(&scope)?;
        let mut arg_values = vec![];
        for (arg, ty) in call.args.iter().zip(&arg_types) {
            let value = arg.value(symtab).known()?;
            let arg_ty = arg.type_of(symtab)?;
            arg_values.push(value.map(|v| v.convert(&arg_ty, ty)));
        }
        let key = (def.name.clone(), template_values, arg_values.clone());
        if !self.walked.insert(key) {
            return Ok(());
        }

        for ((arg, ty), value) in def.args.iter().zip(arg_types).zip(arg_values) {
            add_unique(
                &mut scope,
                &arg.name,
                Binding::Var(Var::new(arg.name.clone(), ty, value)),
                &def.loc,
            )?;
        }
        scope.push_function(def.return_types(&scope)?);
        self.depth += 1;
        let result = scope.scoped(|scope| self.walk_block(body, scope));
        self.depth -= 1;
        result.map(|_| ())
    }
}

fn walk<R, V>(root: &R, symtab: &mut SymbolTable, visit: V) -> CompileResult<()>
where
    R: AnalysisRoot,
    V: FnMut(&Expr, &Call, &Arc<FunctionDef>, &SymbolTable) -> CompileResult<()>,
{
    let mut walker = CallWalker::new(visit);
    symtab.scoped(|symtab| walker.walk_block(root.stmts(), symtab))?;
    Ok(())
}

/// User functions that may be called, directly or indirectly, by `root`, sorted by name.
pub fn reachable_functions<R: AnalysisRoot>(
    root: &Checked<R>,
) -> CompileResult<Vec<Arc<FunctionDef>>> {
    debug!("Reachable functions of {}", root.description());
    let mut found: BTreeMap<String, Arc<FunctionDef>> = BTreeMap::new();
    let mut symtab = root_scope(&**root);
    walk(&**root, &mut symtab, |_, _, def, _| {
        if !def.builtin && !found.contains_key(&def.name) {
            trace!("{} is reachable", def.name);
            found.insert(def.name.clone(), def.clone());
        }
        Ok(())
    })?;
    Ok(found.into_values().collect())
}

/// Exception codes a compile unit may raise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSet {
    pub codes: BTreeSet<u64>,
    /// Raise sites whose exception code is not known at compile time.
    pub undetermined: Vec<Loc>,
}

impl ExceptionSet {
    /// The codes as a bit mask, bit `n` set for code `n`.
    pub fn mask(&self) -> u64 {
        self.codes
            .iter()
            .filter(|&&code| code < 64)
            .fold(0, |mask, code| mask | (1 << code))
    }

    pub fn contains(&self, code: u64) -> bool {
        self.codes.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.undetermined.is_empty()
    }

    pub fn union(&mut self, other: ExceptionSet) {
        self.codes.extend(other.codes);
        for loc in other.undetermined {
            if !self.undetermined.contains(&loc) {
                self.undetermined.push(loc);
            }
        }
    }
}

/// Exception codes `root` may raise.
///
/// When the effective XLEN is not fixed by the configuration the analysis is repeated for every
/// possible XLEN and the results are merged.
pub fn reachable_exceptions<R: AnalysisRoot>(root: &Checked<R>) -> CompileResult<ExceptionSet> {
    debug!("Reachable exceptions of {}", root.description());
    let symtab = root_scope(&**root);
    if symtab.xlen().is_some() {
        return exceptions_in(&**root, symtab);
    }
    let mut result = ExceptionSet::default();
    for xlen in symtab.arch().possible_xlens() {
        trace!("Reachable exceptions of {} with XLEN={}", root.description(), xlen);
        result.union(exceptions_in(&**root, symtab.specialize_xlen(xlen))?);
    }
    Ok(result)
}

fn exceptions_in<R: AnalysisRoot>(
    root: &R,
    mut symtab: SymbolTable,
) -> CompileResult<ExceptionSet> {
    let mut result = ExceptionSet::default();
    walk(root, &mut symtab, |expr, call, def, symtab| {
        if !def.builtin || !RAISE_FUNCTIONS.contains(def.name.as_str()) {
            return Ok(());
        }
        let Some(code) = call.args.first() else {
            bail_internal!("{} without exception code", call.name);
        };
        let known = code.value(symtab).known()?;
        match known.and_then(|v| v.as_int()).map(u64::try_from) {
            Some(Ok(code)) => {
                trace!("{}: raises {}", expr.loc, code);
                result.codes.insert(code);
            }
            _ => {
                trace!("{}: exception code {} is not known", expr.loc, code);
                if !result.undetermined.contains(&expr.loc) {
                    result.undetermined.push(expr.loc.clone());
                }
            }
        }
        Ok(())
    })?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use idl_arch::ConfiguredArchitecture;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::compiler::Compiler;
    use crate::types::Type;

    const FUNCTIONS: &str = "function add_one {
  returns Bits<64>
  arguments Bits<64> x
  body {
    return x + 1;
  }
}

function widen {
  template U32 N
  returns Bits<64>
  arguments Bits<N> value
  body {
    return add_one(value);
  }
}
";

    #[test]
    fn test_unknown_template_value_walks_the_body() {
        let arch = ConfiguredArchitecture::from_yaml_str("name: t\nxlens: [64]\n").unwrap();
        let compiler = Compiler::new(Arc::new(arch));
        let isa = compiler.compile_source("functions.isa", FUNCTIONS).unwrap();
        let n = Var::new("N", Type::bits(32).make_const(), Some(Value::Int(8)));
        let a = Var::new("a", Type::bits(8), None);
        let body = compiler
            .compile_func_body(
                "return widen<N>(a);",
                vec![Type::bits(64)],
                &isa.symtab,
                "test",
                None,
                vec![("N".into(), Binding::Var(n)), ("a".into(), Binding::Var(a))],
            )
            .unwrap();

        let mut symtab = root_scope(&*body);
        symtab.set_value("N", None).unwrap();
        let mut called = vec![];
        walk(&*body, &mut symtab, |_, call, _, _| {
            called.push(call.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(called, vec!["widen".to_string(), "add_one".to_string()]);
    }
}
