//! Compile-time values.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::types::{Type, TypeKind};

/// A compile-time-known value.
///
/// Integers are always stored unsigned, already masked to the width of their type; the signedness
/// lives in the [`Type`], not in the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(u128),
    Bool(bool),
    String(String),
    Array(Vec<Value>),
    /// Multiple return values. The empty tuple is the result of a void function.
    Tuple(Vec<Value>),
}

impl Value {
    pub fn unit() -> Value {
        Value::Tuple(vec![])
    }

    pub fn as_int(&self) -> Option<u128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a value of type `from` so that it can be stored in a variable of type `to`:
    /// signed integers are sign extended, then everything is truncated to the new width.
    pub fn convert(self, from: &Type, to: &Type) -> Value {
        match (self, to.bits_width()) {
            (Value::Int(v), Some(to_width)) => {
                let v = match from.bits_width() {
                    Some(from_width) if from.is_signed() && from_width < to_width => {
                        sign_extend(v, from_width)
                    }
                    _ => v,
                };
                Value::Int(v & mask(to_width))
            }
            (Value::Array(items), _) => match (from.kind(), to.kind()) {
                (TypeKind::Array(from_elem), TypeKind::Array(to_elem)) => Value::Array(
                    items
                        .into_iter()
                        .map(|v| v.convert(from_elem, to_elem))
                        .collect(),
                ),
                _ => Value::Array(items),
            },
            (value, _) => value,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => write!(f, "[{}]", items.iter().join(", ")),
            Value::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
        }
    }
}

/// All ones in the low `width` bits.
pub fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Sign extend the `width`-bit value `v` to 128 bits.
pub fn sign_extend(v: u128, width: u32) -> u128 {
    if width == 0 || width >= 128 {
        return v;
    }
    let v = v & mask(width);
    if (v >> (width - 1)) & 1 == 1 {
        v | !mask(width)
    } else {
        v
    }
}

/// Interpret the `width`-bit value `v` as two's complement.
pub fn to_signed(v: u128, width: u32) -> i128 {
    sign_extend(v, width) as i128
}

/// Number of bits needed to represent `v`, at least 1.
pub fn bit_length(v: u128) -> u32 {
    (128 - v.leading_zeros()).max(1)
}
