//! Semantic compiler of IDL, the ISA description language of RISC-V specifications.
//!
//! Sources are parsed into a typed AST ([`ast`]), checked against a [`SymbolTable`] populated
//! from the target configuration ([`idl_arch::Architecture`]) and frozen. The checked code can
//! then be specialized for the configuration ([`passes::prune`]) and analyzed for the functions
//! it calls ([`passes::reachable_functions`]) and the exceptions it raises
//! ([`passes::reachable_exceptions`]).
//!
//! Every entry point is a method of [`Compiler`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use idl_arch::ConfiguredArchitecture;
//! # use idl_compiler::Compiler;
//! let arch = ConfiguredArchitecture::from_path("rv64.yaml").unwrap();
//! let compiler = Compiler::new(Arc::new(arch));
//! let isa = compiler.compile_file("isa/globals.isa").unwrap();
//! let expr = compiler.compile_expression("XLEN == 64", &isa.symtab).unwrap();
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate pest_derive;

#[macro_use]
mod error;

pub mod ast;
mod compiler;
mod parser;
pub mod passes;
mod symtab;
mod types;
mod value;

pub use compiler::{CompiledIsa, Compiler, TypeCheck, EXPRESSION_FILE};
pub use error::{
    CompileError, CompileResult, InternalError, TypeError, ValueError, ValueResult, ValueResultExt,
};
pub use parser::{parse_body, parse_expression, parse_file};
pub use symtab::{Binding, SymbolError, SymbolTable, Var, MAX_CALL_DEPTH};
pub use types::{BitfieldDef, BitfieldField, EnumDef, Qualifier, Type, TypeKind, MAX_BITS_WIDTH};
pub use value::{mask, sign_extend, Value};

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use idl_arch::ConfiguredArchitecture;

    use crate::symtab::SymbolTable;

    /// A table for a configuration with XLEN fixed to 64.
    pub fn symtab64() -> SymbolTable {
        let arch = ConfiguredArchitecture::from_yaml_str("name: t\nxlens: [64]\n").unwrap();
        SymbolTable::new(Arc::new(arch), Default::default())
    }
}
