//! Compile-time evaluation of expressions.

use std::cmp::Ordering;

use idl_arch::CsrFieldType;

use crate::ast::check::{lookup_csr, lookup_enum};
use crate::ast::{BinaryOp, Expr, ExprKind, SystemFunction, UnaryOp};
use crate::error::{CompileError, InternalError, ValueError, ValueResult};
use crate::symtab::{Binding, SymbolTable};
use crate::types::{Type, TypeKind, MAX_BITS_WIDTH};
use crate::value::{mask, sign_extend, to_signed, Value};

/// Errors of the type rules met while evaluating are compiler defects: only checked nodes are
/// evaluated.
pub(crate) fn internal(error: CompileError) -> ValueError {
    match error {
        CompileError::Internal(e) => ValueError::Internal(e),
        e => ValueError::Internal(InternalError::new(format!(
            "evaluating an expression that does not check: {}",
            e
        ))),
    }
}

impl Expr {
    /// The compile-time value of the expression, or [`ValueError::Unknown`].
    pub fn value(&self, symtab: &SymbolTable) -> ValueResult<Value> {
        match &self.kind {
            ExprKind::Int(lit) => match self.ty(symtab)?.width() {
                Some(width) => Ok(Value::Int(lit.value & mask(width))),
                None => bail_unknown!("width of {} depends on XLEN", lit.text),
            },
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Id(name) => match symtab.get(name) {
                Some(Binding::Var(var)) => match &var.value {
                    Some(value) => Ok(value.clone()),
                    None => bail_unknown!("value of '{}' is not known", name),
                },
                _ => bail_internal!("'{}' is not a variable", name),
            },
            ExprKind::EnumRef { class, member } => {
                let (_, def) = lookup_enum(symtab, class, &self.loc).map_err(internal)?;
                match def.value_of(member) {
                    Some(v) => Ok(Value::Int(v)),
                    None => bail_internal!("enum {} has no member {}", class, member),
                }
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::LogicalNot => Ok(Value::Bool(!bool_value(operand, symtab)?)),
                UnaryOp::Neg | UnaryOp::Not => {
                    let width = known_width(&self.ty(symtab)?, self)?;
                    let v = int_operand(operand, symtab, width)?;
                    let result = match op {
                        UnaryOp::Neg => 0u128.wrapping_sub(v),
                        _ => !v,
                    };
                    Ok(Value::Int(result & mask(width)))
                }
            },
            ExprKind::Binary { op, lhs, rhs } => self.binary_value(*op, lhs, rhs, symtab),
            ExprKind::Paren(inner) => inner.value(symtab),
            ExprKind::Ternary { cond, then, orelse } => {
                let branch = if bool_value(cond, symtab)? {
                    then
                } else {
                    orelse
                };
                let value = branch.value(symtab)?;
                Ok(value.convert(&branch.ty(symtab)?, &self.ty(symtab)?))
            }
            ExprKind::Index { base, index } => {
                let i = int_value(index, symtab)?;
                if matches!(&base.kind, ExprKind::Id(name) if name == "X") && i == 0 {
                    return Ok(Value::Int(0));
                }
                match base.value(symtab)? {
                    Value::Array(items) => match items.get(i as usize) {
                        Some(item) => Ok(item.clone()),
                        None => bail_unknown!("index {} out of range", i),
                    },
                    Value::Int(v) => Ok(Value::Int(if i < 128 { (v >> i) & 1 } else { 0 })),
                    other => bail_internal!("cannot index {}", other),
                }
            }
            ExprKind::Range { base, msb, lsb } => {
                let m = int_value(msb, symtab)?;
                let l = int_value(lsb, symtab)?;
                let v = int_value(base, symtab)?;
                let width = m
                    .checked_sub(l)
                    .and_then(|d| d.checked_add(1))
                    .and_then(|w| u32::try_from(w).ok())
                    .filter(|&w| l < 128 && w <= MAX_BITS_WIDTH);
                let Some(width) = width else {
                    bail_unknown!("invalid range [{}:{}]", m, l);
                };
                Ok(Value::Int((v >> l) & mask(width)))
            }
            ExprKind::Field { base, field } => {
                let base_ty = base.ty(symtab)?;
                match base_ty.kind() {
                    TypeKind::Bitfield(def) => {
                        let Some(f) = def.field(field) else {
                            bail_internal!("bitfield {} has no field {}", def.name, field);
                        };
                        let v = int_value(base, symtab)?;
                        Ok(Value::Int((v >> f.lsb) & mask(f.width())))
                    }
                    TypeKind::Csr(def) => {
                        let Some(f) = def.field(field) else {
                            bail_internal!("CSR {} has no field {}", def.name, field);
                        };
                        match (f.ty, f.known_reset_value()) {
                            (CsrFieldType::ReadOnly, Some(reset)) => {
                                let width = known_width(&self.ty(symtab)?, self)?;
                                Ok(Value::Int(reset as u128 & mask(width)))
                            }
                            _ => bail_unknown!(
                                "CSR[{}].{} is {}, its value is not known",
                                def.name,
                                field,
                                f.ty
                            ),
                        }
                    }
                    _ => bail_internal!("field access on {}", base_ty),
                }
            }
            ExprKind::Csr(name) => bail_unknown!("contents of CSR[{}]", name),
            ExprKind::CsrCall { csr, function } => {
                let def = lookup_csr(symtab, csr, &self.loc).map_err(internal)?;
                match (function.as_str(), def.address) {
                    ("address", Some(address)) => Ok(Value::Int(address as u128)),
                    _ => bail_unknown!("CSR[{}].{}()", csr, function),
                }
            }
            ExprKind::Call(call) => call.value(&self.loc, symtab),
            ExprKind::Concat(items) => {
                let mut result = 0u128;
                for item in items {
                    let width = known_width(&item.ty(symtab)?, item)?;
                    let v = int_value(item, symtab)?;
                    result = if width >= 128 { v } else { (result << width) | v };
                }
                Ok(Value::Int(result))
            }
            ExprKind::Replicate { count, value } => {
                let n = int_value(count, symtab)?;
                let width = known_width(&value.ty(symtab)?, value)?;
                let v = int_value(value, symtab)?;
                let mut result = 0u128;
                for _ in 0..n.min(128) {
                    result = if width >= 128 { v } else { (result << width) | v };
                }
                Ok(Value::Int(result))
            }
            ExprKind::System { function, arg } => match function {
                SystemFunction::Bits => match arg.value(symtab)? {
                    Value::Bool(b) => Ok(Value::Int(b as u128)),
                    Value::Int(v) => Ok(Value::Int(v)),
                    other => bail_internal!("$bits of {}", other),
                },
                SystemFunction::Signed => arg.value(symtab),
                SystemFunction::ArraySize => match arg.ty(symtab)?.width() {
                    Some(len) => Ok(Value::Int(len as u128)),
                    None => bail_unknown!("length of {}", arg),
                },
                SystemFunction::EnumSize | SystemFunction::EnumElementSize => {
                    bail_internal!("enum function applied to an expression")
                }
            },
            ExprKind::EnumInfo { function, class } => {
                let (_, def) = lookup_enum(symtab, class, &self.loc).map_err(internal)?;
                match function {
                    SystemFunction::EnumSize => Ok(Value::Int(def.members.len() as u128)),
                    _ => Ok(Value::Int(def.width() as u128)),
                }
            }
            ExprKind::Pc => bail_unknown!("$pc"),
            ExprKind::DontCare => bail_unknown!("don't care"),
        }
    }

    pub(crate) fn ty(&self, symtab: &SymbolTable) -> ValueResult<Type> {
        self.type_of(symtab).map_err(internal)
    }

    fn binary_value(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        symtab: &SymbolTable,
    ) -> ValueResult<Value> {
        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                let short = op == BinaryOp::LogicalOr;
                return match bool_value(lhs, symtab) {
                    Ok(l) if l == short => Ok(Value::Bool(short)),
                    Ok(_) => Ok(Value::Bool(bool_value(rhs, symtab)?)),
                    // `unknown && false` and `unknown || true` are still known
                    Err(ValueError::Unknown(reason)) => match bool_value(rhs, symtab) {
                        Ok(r) if r == short => Ok(Value::Bool(short)),
                        Err(ValueError::Internal(e)) => Err(e.into()),
                        _ => Err(ValueError::Unknown(reason)),
                    },
                    Err(e) => Err(e),
                };
            }
            _ if op.is_comparison() => {
                let l = lhs.value(symtab)?;
                let r = rhs.value(symtab)?;
                let ordering = match (&l, &r) {
                    (Value::Int(a), Value::Int(b)) => {
                        let (lt, rt) = (lhs.ty(symtab)?, rhs.ty(symtab)?);
                        match (lt.is_signed() && rt.is_signed(), lt.width(), rt.width()) {
                            (true, Some(lw), Some(rw)) => to_signed(*a, lw).cmp(&to_signed(*b, rw)),
                            _ => a.cmp(b),
                        }
                    }
                    _ => l.cmp(&r),
                };
                let result = match op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::Ne => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                return Ok(Value::Bool(result));
            }
            _ => {}
        }
        let ty = self.ty(symtab)?;
        let width = known_width(&ty, self)?;
        let l = int_operand(lhs, symtab, width)?;
        let r = match op {
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra | BinaryOp::WideShl => {
                int_value(rhs, symtab)?
            }
            _ => int_operand(rhs, symtab, width)?,
        };
        let signed = ty.is_signed();
        let result = match op {
            BinaryOp::BitOr => l | r,
            BinaryOp::BitXor => l ^ r,
            BinaryOp::BitAnd => l & r,
            BinaryOp::Shl | BinaryOp::WideShl => {
                if r >= 128 {
                    0
                } else {
                    l << r
                }
            }
            BinaryOp::Shr => {
                if r >= 128 {
                    0
                } else {
                    l >> r
                }
            }
            BinaryOp::Sra => (to_signed(l, width) >> r.min(127)) as u128,
            BinaryOp::Add | BinaryOp::WideAdd => l.wrapping_add(r),
            BinaryOp::Sub | BinaryOp::WideSub => l.wrapping_sub(r),
            BinaryOp::Mul | BinaryOp::WideMul => l.wrapping_mul(r),
            BinaryOp::Div | BinaryOp::Rem => {
                if r == 0 {
                    bail_unknown!("division by zero in {}", self);
                }
                match (signed, op) {
                    (true, BinaryOp::Div) => {
                        to_signed(l, width).wrapping_div(to_signed(r, width)) as u128
                    }
                    (true, _) => to_signed(l, width).wrapping_rem(to_signed(r, width)) as u128,
                    (false, BinaryOp::Div) => l / r,
                    (false, _) => l % r,
                }
            }
            _ => bail_internal!("unexpected operator {}", op.as_str()),
        };
        Ok(Value::Int(result & mask(width)))
    }
}

fn known_width(ty: &Type, expr: &Expr) -> ValueResult<u32> {
    match ty.width() {
        Some(width) => Ok(width),
        None => bail_unknown!("width of {} depends on the configuration", expr),
    }
}

fn int_value(expr: &Expr, symtab: &SymbolTable) -> ValueResult<u128> {
    match expr.value(symtab)? {
        Value::Int(v) => Ok(v),
        other => bail_internal!("{} evaluated to {}, expecting an integer", expr, other),
    }
}

/// Value of an operand, extended to the width of the operation.
fn int_operand(expr: &Expr, symtab: &SymbolTable, width: u32) -> ValueResult<u128> {
    let v = int_value(expr, symtab)?;
    let ty = expr.ty(symtab)?;
    let v = match ty.width() {
        Some(from) if ty.is_signed() && from < width => sign_extend(v, from),
        _ => v,
    };
    Ok(v & mask(width))
}

pub(crate) fn bool_value(expr: &Expr, symtab: &SymbolTable) -> ValueResult<bool> {
    match expr.value(symtab)? {
        Value::Bool(b) => Ok(b),
        other => bail_internal!("{} evaluated to {}, expecting a Boolean", expr, other),
    }
}
