//! Architecture data consumed by the IDL compiler.
//!
//! The compiler never reads the architecture database directly: it queries an [`Architecture`],
//! which answers questions about the target configuration (XLEN, parameters, implemented
//! extensions, CSRs and instructions). [`ConfiguredArchitecture`] is the implementation backed by
//! a YAML configuration file.

#[macro_use]
extern crate log;

use std::fmt::Debug;
use std::sync::Arc;

mod config;
mod csr;
mod instruction;
mod param;
mod version;

pub use config::{ConfigKind, ConfiguredArchitecture, ExtensionVersion};
pub use csr::{CsrDef, CsrFieldDef, CsrFieldType, FieldLocation, ResetValue};
pub use instruction::{DecodeVariable, Encoding, EncodingField, InstructionDef};
pub use param::{ParamDef, ParamKind, ParamValue};
pub use version::{Version, VersionOp, VersionRequirement};

/// The target configuration, as seen by the compiler.
///
/// Every query may be answered with "not known": a partially configured architecture leaves some
/// extensions and parameters open, and the effective XLEN may have more than one possible value.
pub trait Architecture: Debug + Send + Sync {
    /// Name of the configuration, used in diagnostics.
    fn name(&self) -> &str;

    /// All the values the effective XLEN can take, sorted.
    fn possible_xlens(&self) -> Vec<u32>;

    /// The effective XLEN, if there is only one possible value.
    fn xlen(&self) -> Option<u32> {
        match self.possible_xlens().as_slice() {
            [xlen] => Some(*xlen),
            _ => None,
        }
    }

    fn param(&self, name: &str) -> Option<&ParamDef>;

    fn params(&self) -> Vec<&ParamDef>;

    /// Whether the extension is implemented (and its version satisfies the requirement).
    ///
    /// `None` when the configuration does not pin it down.
    fn ext(&self, name: &str, requirement: Option<&VersionRequirement>) -> Option<bool>;

    fn csr(&self, name: &str) -> Option<Arc<CsrDef>>;

    fn csr_by_address(&self, address: u32) -> Option<Arc<CsrDef>>;

    fn instruction(&self, name: &str) -> Option<Arc<InstructionDef>>;
}
