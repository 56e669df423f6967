//! Whole-program analyses of checked compile units.
//!
//! Every pass interprets the unit abstractly: it walks the statements in order, tracking the
//! compile-time known values in a private copy of the unit's scope, so that branches decided by
//! the configuration are followed only on the side that is taken.

use crate::ast::{FunctionBody, InstOperation, Stmt};
use crate::error::{CompileResult, ValueError};
use crate::symtab::SymbolTable;
use crate::types::Type;

mod prune;
mod reachable;

pub use prune::{prune, prune_expr, prune_stmts};
pub use reachable::{reachable_exceptions, reachable_functions, ExceptionSet, RAISE_FUNCTIONS};

/// A compile unit the passes can start from.
pub trait AnalysisRoot: Clone {
    fn stmts(&self) -> &[Stmt];

    /// The scope the statements run in.
    fn symtab(&self) -> &SymbolTable;

    /// A copy of the unit with other statements.
    fn with_stmts(&self, stmts: Vec<Stmt>) -> Self;

    fn description(&self) -> String;

    /// Return types of the unit, if it is a function.
    fn returns(&self) -> Option<Vec<Type>> {
        None
    }
}

impl AnalysisRoot for FunctionBody {
    fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    fn with_stmts(&self, stmts: Vec<Stmt>) -> Self {
        FunctionBody {
            stmts,
            ..self.clone()
        }
    }

    fn description(&self) -> String {
        format!("function {}", self.name)
    }

    fn returns(&self) -> Option<Vec<Type>> {
        Some(self.returns.clone())
    }
}

impl AnalysisRoot for InstOperation {
    fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    fn with_stmts(&self, stmts: Vec<Stmt>) -> Self {
        InstOperation {
            stmts,
            ..self.clone()
        }
    }

    fn description(&self) -> String {
        format!("operation of {}", self.name)
    }
}

/// The scope a pass runs `root` in.
fn root_scope<R: AnalysisRoot>(root: &R) -> SymbolTable {
    let mut symtab = root.symtab().deep_clone();
    if let Some(returns) = root.returns() {
        symtab.push_function(returns);
    }
    symtab
}

/// Update `symtab` with the effect of `stmt`, making unknown what cannot be predicted.
fn apply(stmt: &Stmt, symtab: &mut SymbolTable) -> CompileResult<()> {
    match stmt.execute(symtab) {
        Ok(_) => Ok(()),
        Err(ValueError::Unknown(reason)) => {
            trace!("{}: effect not known ({})", stmt.loc, reason);
            stmt.execute_unknown(symtab)?;
            Ok(())
        }
        Err(ValueError::Internal(e)) => Err(e.into()),
    }
}
