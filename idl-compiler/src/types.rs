//! The IDL type system.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use idl_arch::CsrDef;
use itertools::Itertools;

use crate::error::{ValueError, ValueResult};
use crate::value::{bit_length, Value};

/// Widest `Bits` type the evaluator can represent.
pub const MAX_BITS_WIDTH: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    Const,
    Signed,
}

/// An enum declaration: an ordered list of members with their values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<(String, u128)>,
}

impl EnumDef {
    pub fn value_of(&self, member: &str) -> Option<u128> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, v)| *v)
    }

    pub fn member_of(&self, value: u128) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }

    /// Bits needed to store any member.
    pub fn width(&self) -> u32 {
        bit_length(self.members.iter().map(|(_, v)| *v).max().unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfieldField {
    pub name: String,
    pub msb: u32,
    pub lsb: u32,
}

impl BitfieldField {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfieldDef {
    pub name: String,
    pub width: u32,
    pub fields: Vec<BitfieldField>,
}

impl BitfieldDef {
    pub fn field(&self, name: &str) -> Option<&BitfieldField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Bits,
    Boolean,
    Enum(Arc<EnumDef>),
    Bitfield(Arc<BitfieldDef>),
    Csr(Arc<CsrDef>),
    /// The width of the array type is its number of elements.
    Array(Box<Type>),
    Tuple(Vec<Type>),
    Void,
    DontCare,
    String,
}

/// An immutable IDL type.
///
/// `width` is the bit width of `Bits` (and of bitfields, enums and CSRs) or the element count of
/// arrays. `None` means the width depends on the configuration and is not known.
#[derive(Debug, Clone)]
pub struct Type {
    kind: TypeKind,
    width: Option<u32>,
    qualifiers: BTreeSet<Qualifier>,
}

impl Type {
    fn new(kind: TypeKind, width: Option<u32>) -> Type {
        Type {
            kind,
            width,
            qualifiers: BTreeSet::new(),
        }
    }

    pub fn bits(width: u32) -> Type {
        Type::new(TypeKind::Bits, Some(width))
    }

    /// A `Bits` type whose width is not known yet.
    pub fn bits_with(width: Option<u32>) -> Type {
        Type::new(TypeKind::Bits, width)
    }

    pub fn boolean() -> Type {
        Type::new(TypeKind::Boolean, None)
    }

    pub fn string() -> Type {
        Type::new(TypeKind::String, None)
    }

    pub fn void() -> Type {
        Type::new(TypeKind::Void, None)
    }

    pub fn dont_care() -> Type {
        Type::new(TypeKind::DontCare, None)
    }

    pub fn enum_ref(def: Arc<EnumDef>) -> Type {
        let width = def.width();
        Type::new(TypeKind::Enum(def), Some(width))
    }

    pub fn bitfield(def: Arc<BitfieldDef>) -> Type {
        let width = def.width;
        Type::new(TypeKind::Bitfield(def), Some(width))
    }

    pub fn csr(def: Arc<CsrDef>, xlen: Option<u32>) -> Type {
        let width = def.length(xlen);
        Type::new(TypeKind::Csr(def), width)
    }

    pub fn array(element: Type, len: Option<u32>) -> Type {
        Type::new(TypeKind::Array(Box::new(element)), len)
    }

    pub fn tuple(members: Vec<Type>) -> Type {
        Type::new(TypeKind::Tuple(members), None)
    }

    /// The type of a function returning `returns`.
    pub fn returning(mut returns: Vec<Type>) -> Type {
        match returns.len() {
            0 => Type::void(),
            1 => returns.remove(0),
            _ => Type::tuple(returns),
        }
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    /// Width of the type when used as an integer, `None` for non-integer types or unknown widths.
    pub fn bits_width(&self) -> Option<u32> {
        if self.is_bits_like() {
            self.width
        } else {
            None
        }
    }

    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    pub fn is_const(&self) -> bool {
        self.qualifiers.contains(&Qualifier::Const)
    }

    pub fn is_signed(&self) -> bool {
        self.qualifiers.contains(&Qualifier::Signed)
    }

    pub fn make_const(&self) -> Type {
        let mut ty = self.clone();
        ty.qualifiers.insert(Qualifier::Const);
        ty
    }

    pub fn make_signed(&self) -> Type {
        let mut ty = self.clone();
        ty.qualifiers.insert(Qualifier::Signed);
        ty
    }

    /// Same type, without qualifiers.
    pub fn unqualified(&self) -> Type {
        Type::new(self.kind.clone(), self.width)
    }

    pub fn is_bits(&self) -> bool {
        matches!(self.kind, TypeKind::Bits)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Boolean)
    }

    /// Types that behave as a vector of bits in arithmetic.
    pub fn is_bits_like(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Bits | TypeKind::Bitfield(_) | TypeKind::Csr(_)
        )
    }

    /// Structural equality. Qualifiers other than `signed` are ignored; enums, bitfields and CSRs
    /// compare by declaration identity.
    pub fn equal_to(&self, other: &Type) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (TypeKind::Bits, TypeKind::Bits)
            | (TypeKind::Boolean, TypeKind::Boolean)
            | (TypeKind::Void, TypeKind::Void)
            | (TypeKind::DontCare, TypeKind::DontCare)
            | (TypeKind::String, TypeKind::String) => true,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => Arc::ptr_eq(a, b),
            (TypeKind::Bitfield(a), TypeKind::Bitfield(b)) => Arc::ptr_eq(a, b),
            (TypeKind::Csr(a), TypeKind::Csr(b)) => Arc::ptr_eq(a, b) || a.name == b.name,
            (TypeKind::Array(a), TypeKind::Array(b)) => a.equal_to(b),
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.equal_to(b))
            }
            _ => false,
        };
        same_kind && self.width == other.width && self.is_signed() == other.is_signed()
    }

    /// Whether a value of this type can be stored in a location of type `other`.
    ///
    /// Any `Bits` converts to any other `Bits`: widening is zero- (or sign-) extension, narrowing
    /// truncates and is reported as a warning by the checker.
    pub fn convertible_to(&self, other: &Type) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::DontCare, _) | (_, TypeKind::DontCare) => true,
            (TypeKind::Bits | TypeKind::Bitfield(_) | TypeKind::Csr(_), TypeKind::Bits) => true,
            (TypeKind::Bits | TypeKind::Csr(_), TypeKind::Bitfield(_)) => true,
            (TypeKind::Bitfield(a), TypeKind::Bitfield(b)) => Arc::ptr_eq(a, b),
            (TypeKind::Bits | TypeKind::Bitfield(_) | TypeKind::Csr(_), TypeKind::Csr(_)) => true,
            (TypeKind::Boolean, TypeKind::Boolean) => true,
            (TypeKind::String, TypeKind::String) => true,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => Arc::ptr_eq(a, b),
            (TypeKind::Array(a), TypeKind::Array(b)) => {
                self.width == other.width && a.convertible_to(b)
            }
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.convertible_to(b))
            }
            _ => false,
        }
    }

    /// Whether `==`, `<` and friends can be applied to the two types.
    pub fn comparable_to(&self, other: &Type) -> bool {
        match (&self.kind, &other.kind) {
            (a, b) if self.is_bits_like() && other.is_bits_like() => !matches!(
                (a, b),
                (TypeKind::Bitfield(x), TypeKind::Bitfield(y)) if !Arc::ptr_eq(x, y)
            ),
            (TypeKind::Boolean, TypeKind::Boolean) => true,
            (TypeKind::String, TypeKind::String) => true,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Initial value of a variable declared without initializer.
    pub fn default_value(&self) -> ValueResult<Value> {
        match &self.kind {
            TypeKind::Bits | TypeKind::Bitfield(_) | TypeKind::Csr(_) => Ok(Value::Int(0)),
            TypeKind::Boolean => Ok(Value::Bool(false)),
            TypeKind::String => Ok(Value::String(String::new())),
            TypeKind::Enum(def) => match def.members.first() {
                Some((_, v)) => Ok(Value::Int(*v)),
                None => Err(ValueError::unknown(format!("enum {} has no members", def.name))),
            },
            TypeKind::Array(element) => match self.width {
                Some(len) => Ok(Value::Array(vec![element.default_value()?; len as usize])),
                None => Err(ValueError::unknown("array length depends on the configuration")),
            },
            TypeKind::Tuple(members) => Ok(Value::Tuple(
                members
                    .iter()
                    .map(|m| m.default_value())
                    .collect::<ValueResult<_>>()?,
            )),
            TypeKind::Void | TypeKind::DontCare => {
                Err(ValueError::unknown(format!("{} has no value", self)))
            }
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_const() {
            write!(f, "const ")?;
        }
        if self.is_signed() {
            write!(f, "signed ")?;
        }
        let width = |w: Option<u32>| w.map_or_else(|| "?".to_string(), |w| w.to_string());
        match &self.kind {
            TypeKind::Bits => write!(f, "Bits<{}>", width(self.width)),
            TypeKind::Boolean => write!(f, "Boolean"),
            TypeKind::Enum(def) => write!(f, "{}", def.name),
            TypeKind::Bitfield(def) => write!(f, "{}", def.name),
            TypeKind::Csr(def) => write!(f, "CSR[{}]", def.name),
            TypeKind::Array(element) => write!(f, "{}[{}]", element, width(self.width)),
            TypeKind::Tuple(members) => write!(f, "({})", members.iter().join(", ")),
            TypeKind::Void => write!(f, "void"),
            TypeKind::DontCare => write!(f, "dontcare"),
            TypeKind::String => write!(f, "String"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext_enum() -> Arc<EnumDef> {
        Arc::new(EnumDef {
            name: "ExtensionName".into(),
            members: vec![("A".into(), 0), ("C".into(), 2), ("M".into(), 12)],
        })
    }

    #[test]
    fn test_bits_conversions() {
        assert!(Type::bits(5).convertible_to(&Type::bits(32)));
        assert!(Type::bits(64).convertible_to(&Type::bits(32)));
        assert!(!Type::bits(1).convertible_to(&Type::boolean()));
        assert!(Type::bits(8).comparable_to(&Type::bits(64)));
        assert!(!Type::bits(8).equal_to(&Type::bits(64)));
    }

    #[test]
    fn test_qualifiers_return_clones() {
        let ty = Type::bits(12);
        let signed = ty.make_signed();
        assert!(!ty.is_signed());
        assert!(signed.is_signed());
        assert!(ty.make_const().equal_to(&ty));
        assert!(!signed.equal_to(&ty));
        assert_eq!(signed.make_const().to_string(), "const signed Bits<12>");
    }

    #[test]
    fn test_enum_identity() {
        let a = ext_enum();
        let b = ext_enum();
        assert!(Type::enum_ref(a.clone()).equal_to(&Type::enum_ref(a.clone())));
        assert!(!Type::enum_ref(a.clone()).equal_to(&Type::enum_ref(b.clone())));
        assert!(!Type::enum_ref(a).comparable_to(&Type::enum_ref(b)));
    }

    #[test]
    fn test_enum_width() {
        assert_eq!(ext_enum().width(), 4);
        assert_eq!(ext_enum().value_of("C"), Some(2));
        assert_eq!(ext_enum().member_of(12), Some("M"));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(Type::bits(32).default_value().unwrap(), Value::Int(0));
        assert_eq!(Type::boolean().default_value().unwrap(), Value::Bool(false));
        assert_eq!(
            Type::array(Type::bits(8), Some(2)).default_value().unwrap(),
            Value::Array(vec![Value::Int(0), Value::Int(0)])
        );
        assert!(Type::array(Type::bits(8), None).default_value().is_err());
        assert_eq!(
            Type::enum_ref(ext_enum()).default_value().unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::bits_with(None).to_string(), "Bits<?>");
        assert_eq!(
            Type::tuple(vec![Type::bits(8), Type::boolean()]).to_string(),
            "(Bits<8>, Boolean)"
        );
        assert_eq!(Type::array(Type::bits(64), Some(32)).to_string(), "Bits<64>[32]");
    }
}
