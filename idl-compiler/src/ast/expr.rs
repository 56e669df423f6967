use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::ast::Loc;
use crate::value::bit_length;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralWidth {
    /// `31`, `0x1f`: as many bits as the value needs.
    Unsized,
    /// `'d31`: XLEN bits.
    Xlen,
    /// `5'd31`.
    Explicit(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntLiteral {
    pub value: u128,
    pub width: LiteralWidth,
    pub signed: bool,
    /// Source text, kept for re-serialization.
    pub text: String,
}

impl IntLiteral {
    /// Parse an integer literal in any of the supported forms.
    pub fn parse(text: &str) -> Result<IntLiteral, String> {
        let digits = |s: &str, radix: u32| {
            let clean: String = s.chars().filter(|c| *c != '_').collect();
            u128::from_str_radix(&clean, radix)
                .map_err(|e| format!("invalid integer literal '{}': {}", text, e))
        };
        if let Some((width, rest)) = text.split_once('\'') {
            let width = if width.is_empty() {
                LiteralWidth::Xlen
            } else {
                let width: u32 = width
                    .parse()
                    .map_err(|_| format!("invalid literal width in '{}'", text))?;
                if width == 0 {
                    return Err(format!("literal '{}' has zero width", text));
                }
                LiteralWidth::Explicit(width)
            };
            let (signed, rest) = match rest.strip_prefix('s') {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            let mut chars = rest.chars();
            let radix = match chars.next() {
                Some('d') => 10,
                Some('h') => 16,
                Some('b') => 2,
                Some('o') => 8,
                _ => return Err(format!("invalid radix in literal '{}'", text)),
            };
            return Ok(IntLiteral {
                value: digits(chars.as_str(), radix)?,
                width,
                signed,
                text: text.to_string(),
            });
        }
        let value = if let Some(hex) = text.strip_prefix("0x") {
            digits(hex, 16)?
        } else if let Some(bin) = text.strip_prefix("0b") {
            digits(bin, 2)?
        } else {
            digits(text, 10)?
        };
        Ok(IntLiteral {
            value,
            width: LiteralWidth::Unsized,
            signed: false,
            text: text.to_string(),
        })
    }

    /// A literal of exactly `width` bits, written in canonical form.
    pub fn sized(value: u128, width: u32, signed: bool) -> IntLiteral {
        let text = if signed {
            format!("{}'sd{}", width, value)
        } else {
            format!("{}'d{}", width, value)
        };
        IntLiteral {
            value,
            width: LiteralWidth::Explicit(width),
            signed,
            text,
        }
    }

    /// The declared width, `None` for XLEN-wide literals.
    pub fn explicit_width(&self) -> Option<u32> {
        match self.width {
            LiteralWidth::Unsized => Some(bit_length(self.value)),
            LiteralWidth::Explicit(w) => Some(w),
            LiteralWidth::Xlen => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    LogicalNot,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "~",
            UnaryOp::LogicalNot => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Sra,
    WideShl,
    Add,
    Sub,
    WideAdd,
    WideSub,
    Mul,
    WideMul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn from_token(token: &str) -> Option<BinaryOp> {
        Some(match token {
            "||" => BinaryOp::LogicalOr,
            "&&" => BinaryOp::LogicalAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "&" => BinaryOp::BitAnd,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ">>>" => BinaryOp::Sra,
            "`<<" => BinaryOp::WideShl,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "`+" => BinaryOp::WideAdd,
            "`-" => BinaryOp::WideSub,
            "*" => BinaryOp::Mul,
            "`*" => BinaryOp::WideMul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::LogicalOr => "||",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Sra => ">>>",
            BinaryOp::WideShl => "`<<",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::WideAdd => "`+",
            BinaryOp::WideSub => "`-",
            BinaryOp::Mul => "*",
            BinaryOp::WideMul => "`*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// Binding power, higher binds tighter. All operators are left associative.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::LogicalOr => 1,
            BinaryOp::LogicalAnd => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra | BinaryOp::WideShl => 8,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::WideAdd | BinaryOp::WideSub => 9,
            BinaryOp::Mul | BinaryOp::WideMul | BinaryOp::Div | BinaryOp::Rem => 10,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemFunction {
    /// `$bits(x)`: reinterpret as `Bits`.
    Bits,
    /// `$signed(x)`.
    Signed,
    /// `$array_size(a)`.
    ArraySize,
    /// `$enum_size(E)`: number of members.
    EnumSize,
    /// `$enum_element_size(E)`: bits of a member.
    EnumElementSize,
}

impl SystemFunction {
    pub fn from_name(name: &str) -> Option<SystemFunction> {
        Some(match name {
            "$bits" => SystemFunction::Bits,
            "$signed" => SystemFunction::Signed,
            "$array_size" => SystemFunction::ArraySize,
            "$enum_size" => SystemFunction::EnumSize,
            "$enum_element_size" => SystemFunction::EnumElementSize,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemFunction::Bits => "$bits",
            SystemFunction::Signed => "$signed",
            SystemFunction::ArraySize => "$array_size",
            SystemFunction::EnumSize => "$enum_size",
            SystemFunction::EnumElementSize => "$enum_element_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    /// `None` when the call has no `<...>`.
    pub template_args: Option<Vec<Expr>>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Int(IntLiteral),
    Bool(bool),
    String(String),
    Id(String),
    EnumRef {
        class: String,
        member: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Paren(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Range {
        base: Box<Expr>,
        msb: Box<Expr>,
        lsb: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    /// `CSR[name]`.
    Csr(String),
    /// `CSR[name].function()`.
    CsrCall {
        csr: String,
        function: String,
    },
    Call(Call),
    Concat(Vec<Expr>),
    Replicate {
        count: Box<Expr>,
        value: Box<Expr>,
    },
    /// `$bits(x)`, `$signed(x)`, `$array_size(x)`.
    System {
        function: SystemFunction,
        arg: Box<Expr>,
    },
    /// `$enum_size(E)`, `$enum_element_size(E)`.
    EnumInfo {
        function: SystemFunction,
        class: String,
    },
    Pc,
    /// `-` in a multiple assignment.
    DontCare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc) -> Expr {
        Expr { kind, loc }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::String(_) | ExprKind::EnumRef { .. }
        )
    }

    /// Name of the variable at the root of an assignment target (`x` in `x[3:0]`).
    pub fn root_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Id(name) => Some(name),
            ExprKind::Index { base, .. }
            | ExprKind::Range { base, .. }
            | ExprKind::Field { base, .. } => base.root_var(),
            _ => None,
        }
    }

    /// Direct sub-expressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Int(_)
            | ExprKind::Bool(_)
            | ExprKind::String(_)
            | ExprKind::Id(_)
            | ExprKind::EnumRef { .. }
            | ExprKind::Csr(_)
            | ExprKind::CsrCall { .. }
            | ExprKind::EnumInfo { .. }
            | ExprKind::Pc
            | ExprKind::DontCare => vec![],
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Paren(e) => vec![e.as_ref()],
            ExprKind::Ternary { cond, then, orelse } => {
                vec![cond.as_ref(), then.as_ref(), orelse.as_ref()]
            }
            ExprKind::Index { base, index } => vec![base.as_ref(), index.as_ref()],
            ExprKind::Range { base, msb, lsb } => vec![base.as_ref(), msb.as_ref(), lsb.as_ref()],
            ExprKind::Field { base, .. } => vec![base.as_ref()],
            ExprKind::Call(call) => call
                .template_args
                .iter()
                .flatten()
                .chain(call.args.iter())
                .collect(),
            ExprKind::Concat(items) => items.iter().collect(),
            ExprKind::Replicate { count, value } => vec![count.as_ref(), value.as_ref()],
            ExprKind::System { arg, .. } => vec![arg.as_ref()],
        }
    }

    /// Canonical IDL source of the expression.
    pub fn to_idl(&self) -> String {
        match &self.kind {
            ExprKind::Int(lit) => lit.text.clone(),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::String(s) => format!("\"{}\"", s),
            ExprKind::Id(name) => name.clone(),
            ExprKind::EnumRef { class, member } => format!("{}::{}", class, member),
            ExprKind::Unary { op, operand } => {
                format!("{}{}", op.as_str(), operand.to_idl_operand(u8::MAX))
            }
            ExprKind::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                lhs.to_idl_operand(op.precedence()),
                op.as_str(),
                rhs.to_idl_operand(op.precedence() + 1)
            ),
            ExprKind::Paren(e) => format!("({})", e.to_idl()),
            ExprKind::Ternary { cond, then, orelse } => format!(
                "{} ? {} : {}",
                cond.to_idl_operand(1),
                then.to_idl(),
                orelse.to_idl()
            ),
            ExprKind::Index { base, index } => {
                format!("{}[{}]", base.to_idl_operand(u8::MAX), index.to_idl())
            }
            ExprKind::Range { base, msb, lsb } => format!(
                "{}[{}:{}]",
                base.to_idl_operand(u8::MAX),
                msb.to_idl(),
                lsb.to_idl()
            ),
            ExprKind::Field { base, field } => {
                format!("{}.{}", base.to_idl_operand(u8::MAX), field)
            }
            ExprKind::Csr(name) => format!("CSR[{}]", name),
            ExprKind::CsrCall { csr, function } => format!("CSR[{}].{}()", csr, function),
            ExprKind::Call(call) => {
                let template = match &call.template_args {
                    Some(args) => format!("<{}>", args.iter().map(|a| a.to_idl()).join(", ")),
                    None => String::new(),
                };
                format!(
                    "{}{}({})",
                    call.name,
                    template,
                    call.args.iter().map(|a| a.to_idl()).join(", ")
                )
            }
            ExprKind::Concat(items) => {
                format!("{{{}}}", items.iter().map(|a| a.to_idl()).join(", "))
            }
            ExprKind::Replicate { count, value } => {
                format!("{{{}{{{}}}}}", count.to_idl(), value.to_idl())
            }
            ExprKind::System { function, arg } => {
                format!("{}({})", function.as_str(), arg.to_idl())
            }
            ExprKind::EnumInfo { function, class } => format!("{}({})", function.as_str(), class),
            ExprKind::Pc => "$pc".to_string(),
            ExprKind::DontCare => "-".to_string(),
        }
    }

    /// Serialize as the operand of an operator of the given binding power, adding parentheses
    /// when the expression binds less tightly.
    fn to_idl_operand(&self, precedence: u8) -> String {
        let own = match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Ternary { .. } => 0,
            ExprKind::Unary { .. } => u8::MAX - 1,
            _ => u8::MAX,
        };
        if own < precedence {
            format!("({})", self.to_idl())
        } else {
            self.to_idl()
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_idl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Loc {
        Loc::synthetic("test")
    }

    fn int(v: u128) -> Expr {
        Expr::new(ExprKind::Int(IntLiteral::parse(&v.to_string()).unwrap()), loc())
    }

    fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc(),
        )
    }

    #[test]
    fn test_parse_literals() {
        let lit = IntLiteral::parse("5'd31").unwrap();
        assert_eq!(lit.value, 31);
        assert_eq!(lit.width, LiteralWidth::Explicit(5));
        let lit = IntLiteral::parse("'h1F").unwrap();
        assert_eq!(lit.value, 31);
        assert_eq!(lit.width, LiteralWidth::Xlen);
        let lit = IntLiteral::parse("12'sb1111_1111_1111").unwrap();
        assert!(lit.signed);
        assert_eq!(lit.value, 0xfff);
        assert_eq!(IntLiteral::parse("0x10").unwrap().value, 16);
        assert_eq!(IntLiteral::parse("0b101").unwrap().value, 5);
        assert_eq!(IntLiteral::parse("42").unwrap().explicit_width(), Some(6));
        assert!(IntLiteral::parse("0'd1").is_err());
        assert!(IntLiteral::parse("4'q1").is_err());
    }

    #[test]
    fn test_to_idl_parenthesizes() {
        let sum = bin(BinaryOp::Add, int(1), int(2));
        let product = bin(BinaryOp::Mul, sum.clone(), int(3));
        assert_eq!(product.to_idl(), "(1 + 2) * 3");
        let right = bin(BinaryOp::Sub, int(1), bin(BinaryOp::Sub, int(2), int(3)));
        assert_eq!(right.to_idl(), "1 - (2 - 3)");
        let left = bin(BinaryOp::Sub, bin(BinaryOp::Sub, int(1), int(2)), int(3));
        assert_eq!(left.to_idl(), "1 - 2 - 3");
    }

    #[test]
    fn test_sized_literal_text() {
        assert_eq!(IntLiteral::sized(1, 5, false).text, "5'd1");
        assert_eq!(IntLiteral::sized(4095, 12, true).text, "12'sd4095");
    }
}
