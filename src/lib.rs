//! # riscv-idl
//!
//! The IDL semantic compiler and the crates it is built from: the target configuration
//! ([`arch`]), the diagnostics ([`diagnostics`]) and the compiler itself, whose API is re-exported
//! at the top level.

pub use idl_arch as arch;
pub use idl_compiler::*;
pub use idl_diagnostics as diagnostics;
