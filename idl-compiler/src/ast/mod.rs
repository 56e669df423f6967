//! The typed abstract syntax tree of IDL.
//!
//! Every node owns its children and knows where it comes from ([`Loc`]). Expressions implement
//! `type_check`, `type_of`, `value` and `to_idl`; statements additionally implement `execute`
//! and `execute_unknown`, the two steps of the compile-time abstract interpreter.

use std::ops::Deref;
use std::sync::Arc;

mod check;
mod eval;
mod expr;
mod function;
mod global;
mod stmt;
mod type_name;

pub(crate) use function::add_unique;
pub(crate) use stmt::forget;
pub use expr::{BinaryOp, Call, Expr, ExprKind, IntLiteral, LiteralWidth, SystemFunction, UnaryOp};
pub use function::{FunctionBody, FunctionDef, InstOperation, TemplateParam, TypedName};
pub use global::{BitfieldDecl, EnumDecl, GlobalDef, IsaAst};
pub use stmt::{Flow, Stmt, StmtKind};
pub use type_name::TypeName;

/// Source location of a node: file, 1-based line and byte range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub file: Arc<str>,
    pub line: u32,
    pub start: usize,
    pub end: usize,
}

impl Loc {
    pub fn new(file: &str, line: u32, start: usize, end: usize) -> Loc {
        Loc {
            file: file.into(),
            line,
            start,
            end,
        }
    }

    /// Location of nodes made up by the compiler.
    pub fn synthetic(file: &str) -> Loc {
        Loc::new(file, 0, 0, 0)
    }
}

/// A type-checked, frozen node: it can only be read from now on, and it can be shared.
#[derive(Debug)]
pub struct Checked<T>(Arc<T>);

impl<T> Checked<T> {
    pub(crate) fn new(node: T) -> Checked<T> {
        Checked(Arc::new(node))
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.0
    }
}

impl<T> Clone for Checked<T> {
    fn clone(&self) -> Self {
        Checked(self.0.clone())
    }
}

impl<T> Deref for Checked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Whether `name` follows the constant naming convention.
pub(crate) fn is_const_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}
