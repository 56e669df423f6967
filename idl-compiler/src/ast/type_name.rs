use crate::ast::{Expr, Loc};
use crate::error::{CompileResult, TypeError, ValueResultExt};
use crate::symtab::{Binding, SymbolTable};
use crate::types::{Type, MAX_BITS_WIDTH};
use crate::value::Value;

/// A type as written in the source, resolved to a [`Type`] against a symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    /// `Bits<N>`.
    Bits(Box<Expr>),
    XReg,
    U32,
    U64,
    Boolean,
    String,
    /// An enum or bitfield.
    Named(String),
    /// `T name[N]` declarations.
    Array(Box<TypeName>, Box<Expr>),
}

impl TypeName {
    pub fn resolve(&self, symtab: &SymbolTable, loc: &Loc) -> CompileResult<Type> {
        Ok(match self {
            TypeName::Bits(width) => {
                let width = resolve_width(width, symtab, "Bits width")?;
                if width == Some(0) || width.is_some_and(|w| w > MAX_BITS_WIDTH) {
                    bail_type!(
                        loc,
                        "Bits width must be between 1 and {}, found {}",
                        MAX_BITS_WIDTH,
                        width.unwrap_or_default()
                    );
                }
                Type::bits_with(width)
            }
            TypeName::XReg => Type::bits_with(symtab.xlen()),
            TypeName::U32 => Type::bits(32),
            TypeName::U64 => Type::bits(64),
            TypeName::Boolean => Type::boolean(),
            TypeName::String => Type::string(),
            TypeName::Named(name) => match symtab.get(name) {
                Some(Binding::Type(ty)) => ty.clone(),
                Some(_) => bail_type!(loc, "'{}' is not a type", name),
                None => bail_type!(loc, "undefined type '{}'", name),
            },
            TypeName::Array(element, len) => {
                let element = element.resolve(symtab, loc)?;
                let len = resolve_width(len, symtab, "array length")?;
                Type::array(element, len)
            }
        })
    }

    pub fn to_idl(&self) -> String {
        match self {
            TypeName::Bits(width) => format!("Bits<{}>", width.to_idl()),
            TypeName::XReg => "XReg".into(),
            TypeName::U32 => "U32".into(),
            TypeName::U64 => "U64".into(),
            TypeName::Boolean => "Boolean".into(),
            TypeName::String => "String".into(),
            TypeName::Named(name) => name.clone(),
            TypeName::Array(element, _) => element.to_idl(),
        }
    }

    /// Serialize a declaration of `name` with this type: array lengths follow the name.
    pub fn declare(&self, name: &str) -> String {
        match self {
            TypeName::Array(element, len) => {
                format!("{} {}[{}]", element.to_idl(), name, len.to_idl())
            }
            _ => format!("{} {}", self.to_idl(), name),
        }
    }
}

/// Evaluate a width expression. `None` when it depends on the configuration.
fn resolve_width(expr: &Expr, symtab: &SymbolTable, what: &str) -> CompileResult<Option<u32>> {
    expr.type_check(symtab)?;
    let ty = expr.type_of(symtab)?;
    if !ty.is_bits() {
        return Err(TypeError::new(
            &expr.loc,
            format!("{} must be an integer, found {} of type {}", what, expr, ty),
        )
        .into());
    }
    match expr.value(symtab).known()? {
        Some(Value::Int(v)) => match u32::try_from(v) {
            Ok(v) => Ok(Some(v)),
            Err(_) => bail_type!(&expr.loc, "{} {} is too large", what, v),
        },
        Some(other) => bail_internal!("integer expression with value {}", other),
        None => Ok(None),
    }
}
