//! Top-level definitions of an IDL file.

use std::sync::Arc;

use itertools::Itertools;

use crate::ast::{FunctionDef, Loc, Stmt};
use crate::error::CompileResult;
use crate::types::{BitfieldDef, BitfieldField, EnumDef, MAX_BITS_WIDTH};

/// A whole IDL compilation unit, includes already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsaAst {
    pub definitions: Vec<GlobalDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalDef {
    Include { path: String, loc: Loc },
    Enum(Arc<EnumDecl>),
    Bitfield(Arc<BitfieldDecl>),
    Function(Arc<FunctionDef>),
    /// A global variable or constant declaration.
    Var(Stmt),
}

impl IsaAst {
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionDef>> {
        self.definitions.iter().filter_map(|def| match def {
            GlobalDef::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn to_idl(&self) -> String {
        self.definitions.iter().map(|def| def.to_idl()).join("\n")
    }
}

impl GlobalDef {
    pub fn loc(&self) -> &Loc {
        match self {
            GlobalDef::Include { loc, .. } => loc,
            GlobalDef::Enum(decl) => &decl.loc,
            GlobalDef::Bitfield(decl) => &decl.loc,
            GlobalDef::Function(def) => &def.loc,
            GlobalDef::Var(stmt) => &stmt.loc,
        }
    }

    pub fn to_idl(&self) -> String {
        match self {
            GlobalDef::Include { path, .. } => format!("include \"{}\"\n", path),
            GlobalDef::Enum(decl) => decl.to_idl(),
            GlobalDef::Bitfield(decl) => decl.to_idl(),
            GlobalDef::Function(def) => def.to_idl(),
            GlobalDef::Var(stmt) => format!("{}\n", stmt.to_idl()),
        }
    }
}

/// `enum Name { A 0 B C 5 }`: members without a value take the previous one plus one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<(String, Option<u128>)>,
    pub loc: Loc,
}

impl EnumDecl {
    pub fn to_def(&self) -> CompileResult<EnumDef> {
        if self.members.is_empty() {
            bail_type!(&self.loc, "enum {} has no members", self.name);
        }
        let mut members: Vec<(String, u128)> = vec![];
        let mut next = 0u128;
        for (name, value) in &self.members {
            if members.iter().any(|(n, _)| n == name) {
                bail_type!(&self.loc, "{}::{} is defined twice", self.name, name);
            }
            let value = value.unwrap_or(next);
            if let Some((other, _)) = members.iter().find(|(_, v)| *v == value) {
                bail_type!(
                    &self.loc,
                    "{}::{} and {}::{} have the same value {}",
                    self.name,
                    other,
                    self.name,
                    name,
                    value
                );
            }
            members.push((name.clone(), value));
            next = value.wrapping_add(1);
        }
        Ok(EnumDef {
            name: self.name.clone(),
            members,
        })
    }

    pub fn to_idl(&self) -> String {
        let mut out = format!("enum {} {{\n", self.name);
        for (name, value) in &self.members {
            match value {
                Some(v) => out += &format!("  {} {}\n", name, v),
                None => out += &format!("  {}\n", name),
            }
        }
        out += "}\n";
        out
    }
}

/// `bitfield (N) Name { F msb-lsb G bit }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfieldDecl {
    pub name: String,
    pub width: u32,
    pub fields: Vec<(String, u32, u32)>,
    pub loc: Loc,
}

impl BitfieldDecl {
    pub fn to_def(&self) -> CompileResult<BitfieldDef> {
        if self.width == 0 || self.width > MAX_BITS_WIDTH {
            bail_type!(
                &self.loc,
                "bitfield {} must be between 1 and {} bits wide",
                self.name,
                MAX_BITS_WIDTH
            );
        }
        let mut fields: Vec<BitfieldField> = vec![];
        for (name, msb, lsb) in &self.fields {
            if msb < lsb || *msb >= self.width {
                bail_type!(
                    &self.loc,
                    "field {} of {} has invalid range {}-{}",
                    name,
                    self.name,
                    msb,
                    lsb
                );
            }
            for other in &fields {
                if other.name == *name {
                    bail_type!(&self.loc, "field {} of {} is defined twice", name, self.name);
                }
                if other.lsb <= *msb && *lsb <= other.msb {
                    bail_type!(
                        &self.loc,
                        "fields {} and {} of {} overlap",
                        other.name,
                        name,
                        self.name
                    );
                }
            }
            fields.push(BitfieldField {
                name: name.clone(),
                msb: *msb,
                lsb: *lsb,
            });
        }
        Ok(BitfieldDef {
            name: self.name.clone(),
            width: self.width,
            fields,
        })
    }

    pub fn to_idl(&self) -> String {
        let mut out = format!("bitfield ({}) {} {{\n", self.width, self.name);
        for (name, msb, lsb) in &self.fields {
            if msb == lsb {
                out += &format!("  {} {}\n", name, msb);
            } else {
                out += &format!("  {} {}-{}\n", name, msb, lsb);
            }
        }
        out += "}\n";
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Loc {
        Loc::new("globals.idl", 1, 0, 0)
    }

    #[test]
    fn test_enum_implicit_values() {
        let decl = EnumDecl {
            name: "PrivilegeMode".into(),
            members: vec![
                ("U".into(), None),
                ("S".into(), None),
                ("M".into(), Some(3)),
                ("VU".into(), Some(4)),
                ("VS".into(), None),
            ],
            loc: loc(),
        };
        let def = decl.to_def().unwrap();
        assert_eq!(def.value_of("S"), Some(1));
        assert_eq!(def.value_of("VS"), Some(5));
        assert_eq!(def.width(), 3);
    }

    #[test]
    fn test_enum_duplicate_value() {
        let decl = EnumDecl {
            name: "E".into(),
            members: vec![("A".into(), Some(1)), ("B".into(), None), ("C".into(), Some(2))],
            loc: loc(),
        };
        let err = decl.to_def().unwrap_err();
        assert!(err.to_string().contains("same value 2"), "{}", err);
    }

    #[test]
    fn test_bitfield_overlap() {
        let decl = BitfieldDecl {
            name: "Satp".into(),
            width: 64,
            fields: vec![("MODE".into(), 63, 60), ("ASID".into(), 60, 44)],
            loc: loc(),
        };
        let err = decl.to_def().unwrap_err();
        assert!(err.to_string().contains("overlap"), "{}", err);
    }

    #[test]
    fn test_bitfield_to_idl() {
        let decl = BitfieldDecl {
            name: "Satp".into(),
            width: 64,
            fields: vec![("MODE".into(), 63, 60), ("A".into(), 0, 0)],
            loc: loc(),
        };
        assert_eq!(
            decl.to_idl(),
            "bitfield (64) Satp {\n  MODE 63-60\n  A 0\n}\n"
        );
    }
}
