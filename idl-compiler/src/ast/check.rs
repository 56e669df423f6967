//! Type rules of the expressions.

use std::sync::Arc;

use idl_arch::CsrDef;

use crate::ast::{BinaryOp, Expr, ExprKind, LiteralWidth, Loc, SystemFunction, UnaryOp};
use crate::error::{CompileError, CompileResult, InternalError, TypeError, ValueResultExt};
use crate::symtab::{Binding, SymbolTable};
use crate::types::{EnumDef, Type, TypeKind, MAX_BITS_WIDTH};
use crate::value::{bit_length, mask, Value};

impl Expr {
    /// Check the expression, reporting warnings (e.g. truncated literals).
    pub fn type_check(&self, symtab: &SymbolTable) -> CompileResult<()> {
        self.check(symtab, true).map(|_| ())
    }

    /// Type of an expression that already passed [`Expr::type_check`].
    pub fn type_of(&self, symtab: &SymbolTable) -> CompileResult<Type> {
        self.check(symtab, false).map_err(|e| match e {
            CompileError::Type(e) => {
                InternalError::new(format!("type_of on an expression that does not check: {}", e))
                    .into()
            }
            e => e,
        })
    }

    pub(crate) fn check(&self, symtab: &SymbolTable, report: bool) -> CompileResult<Type> {
        let loc = &self.loc;
        match &self.kind {
            ExprKind::Int(lit) => {
                let ty = match lit.width {
                    LiteralWidth::Unsized => Type::bits(bit_length(lit.value)),
                    LiteralWidth::Explicit(width) => {
                        if width > MAX_BITS_WIDTH {
                            bail_type!(
                                loc,
                                "literal {} is wider than {} bits",
                                lit.text,
                                MAX_BITS_WIDTH
                            );
                        }
                        if report && lit.value > mask(width) {
                            symtab.warn(
                                loc,
                                format!(
                                    "literal {} does not fit in {} bits and is truncated",
                                    lit.text, width
                                ),
                            );
                        }
                        Type::bits(width)
                    }
                    LiteralWidth::Xlen => {
                        if let Some(xlen) = symtab.xlen() {
                            if report && lit.value > mask(xlen) {
                                symtab.warn(
                                    loc,
                                    format!("literal {} does not fit in XLEN bits", lit.text),
                                );
                            }
                        }
                        Type::bits_with(symtab.xlen())
                    }
                };
                let ty = if lit.signed { ty.make_signed() } else { ty };
                Ok(ty.make_const())
            }
            ExprKind::Bool(_) => Ok(Type::boolean().make_const()),
            ExprKind::String(_) => Ok(Type::string().make_const()),
            ExprKind::Id(name) => match symtab.get(name) {
                Some(Binding::Var(var)) => Ok(var.ty.clone()),
                Some(Binding::Type(_)) => bail_type!(loc, "'{}' is a type, not a value", name),
                Some(Binding::Function(_)) => {
                    bail_type!(loc, "'{}' is a function, not a value", name)
                }
                None => bail_type!(loc, "undefined symbol '{}'", name),
            },
            ExprKind::EnumRef { class, member } => {
                let (ty, def) = lookup_enum(symtab, class, loc)?;
                if def.value_of(member).is_none() {
                    bail_type!(loc, "enum {} has no member '{}'", class, member);
                }
                Ok(ty.make_const())
            }
            ExprKind::Unary { op, operand } => {
                let ty = operand.check(symtab, report)?;
                match op {
                    UnaryOp::Neg | UnaryOp::Not => {
                        require_bits(operand, &ty, op.as_str())?;
                        let result = Type::bits_with(ty.width());
                        Ok(if ty.is_signed() {
                            result.make_signed()
                        } else {
                            result
                        })
                    }
                    UnaryOp::LogicalNot => {
                        require_boolean(operand, &ty, "!")?;
                        Ok(Type::boolean())
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let ty = check_binary(*op, lhs, rhs, symtab, report)?;
                if report {
                    self.warn_literal_overflow(*op, lhs, rhs, &ty, symtab);
                }
                Ok(ty)
            }
            ExprKind::Paren(inner) => inner.check(symtab, report),
            ExprKind::Ternary { cond, then, orelse } => {
                let cond_ty = cond.check(symtab, report)?;
                require_boolean(cond, &cond_ty, "?:")?;
                match cond.value(symtab).known()? {
                    Some(Value::Bool(true)) => return then.check(symtab, report),
                    Some(Value::Bool(false)) => return orelse.check(symtab, report),
                    _ => {}
                }
                let then_ty = then.check(symtab, report)?;
                let else_ty = orelse.check(symtab, report)?;
                if then_ty.is_bits_like() && else_ty.is_bits_like() {
                    let ty = Type::bits_with(max_width(then_ty.width(), else_ty.width()));
                    return Ok(if then_ty.is_signed() && else_ty.is_signed() {
                        ty.make_signed()
                    } else {
                        ty
                    });
                }
                if then_ty.convertible_to(&else_ty) && else_ty.convertible_to(&then_ty) {
                    Ok(then_ty.unqualified())
                } else {
                    bail_type!(
                        loc,
                        "branches of the conditional have different types: {} is {}, {} is {}",
                        then,
                        then_ty,
                        orelse,
                        else_ty
                    )
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = base.check(symtab, report)?;
                let index_ty = index.check(symtab, report)?;
                require_bits(index, &index_ty, "[]")?;
                let index_value = index.value(symtab).known()?.and_then(|v| v.as_int());
                let (len, result) = match base_ty.kind() {
                    TypeKind::Array(element) => (base_ty.width(), element.as_ref().clone()),
                    _ if base_ty.is_bits_like() => (base_ty.width(), Type::bits(1)),
                    _ => bail_type!(loc, "{} of type {} cannot be indexed", base, base_ty),
                };
                if let (Some(i), Some(len)) = (index_value, len) {
                    if i >= len as u128 {
                        bail_type!(loc, "index {} is out of range for {} ({})", i, base, base_ty);
                    }
                }
                Ok(result)
            }
            ExprKind::Range { base, msb, lsb } => {
                let base_ty = base.check(symtab, report)?;
                require_bits(base, &base_ty, "[:]")?;
                let msb_ty = msb.check(symtab, report)?;
                require_bits(msb, &msb_ty, "[:]")?;
                let lsb_ty = lsb.check(symtab, report)?;
                require_bits(lsb, &lsb_ty, "[:]")?;
                let msb_value = msb.value(symtab).known()?.and_then(|v| v.as_int());
                let lsb_value = lsb.value(symtab).known()?.and_then(|v| v.as_int());
                match (msb_value, lsb_value) {
                    (Some(m), Some(l)) => {
                        if m < l {
                            bail_type!(loc, "range [{}:{}] has msb smaller than lsb", m, l);
                        }
                        if let Some(width) = base_ty.width() {
                            if m >= width as u128 {
                                bail_type!(
                                    loc,
                                    "range [{}:{}] is out of bounds for {} ({})",
                                    m,
                                    l,
                                    base,
                                    base_ty
                                );
                            }
                        }
                        let width = (m - l).checked_add(1).map(u32::try_from);
                        match width {
                            Some(Ok(width)) if width <= MAX_BITS_WIDTH => Ok(Type::bits(width)),
                            _ => bail_type!(
                                loc,
                                "range [{}:{}] is wider than {} bits",
                                m,
                                l,
                                MAX_BITS_WIDTH
                            ),
                        }
                    }
                    _ => Ok(Type::bits_with(None)),
                }
            }
            ExprKind::Field { base, field } => {
                let base_ty = base.check(symtab, report)?;
                match base_ty.kind() {
                    TypeKind::Bitfield(def) => match def.field(field) {
                        Some(f) => Ok(Type::bits(f.width())),
                        None => bail_type!(loc, "bitfield {} has no field '{}'", def.name, field),
                    },
                    TypeKind::Csr(def) => csr_field_type(def, field, symtab, loc),
                    _ => bail_type!(loc, "{} of type {} has no fields", base, base_ty),
                }
            }
            ExprKind::Csr(name) => {
                let def = lookup_csr(symtab, name, loc)?;
                Ok(Type::csr(def, symtab.xlen()))
            }
            ExprKind::CsrCall { csr, function } => {
                let def = lookup_csr(symtab, csr, loc)?;
                match function.as_str() {
                    "address" => Ok(Type::bits(12)),
                    "sw_read" => Ok(Type::bits_with(def.length(symtab.xlen()))),
                    _ => bail_type!(loc, "unknown CSR function '{}'", function),
                }
            }
            ExprKind::Call(call) => call.check(loc, symtab, report),
            ExprKind::Concat(items) => {
                let mut width = Some(0);
                for item in items {
                    let ty = item.check(symtab, report)?;
                    require_bits(item, &ty, "{}")?;
                    width = width.zip(ty.width()).map(|(a, b)| a + b);
                }
                check_width(width, loc)?;
                Ok(Type::bits_with(width))
            }
            ExprKind::Replicate { count, value } => {
                let count_ty = count.check(symtab, report)?;
                require_bits(count, &count_ty, "{}")?;
                let value_ty = value.check(symtab, report)?;
                require_bits(value, &value_ty, "{}")?;
                let count_value = count.value(symtab).known()?.and_then(|v| v.as_int());
                if count_value == Some(0) {
                    bail_type!(loc, "replication count must be positive");
                }
                let width = match count_value.zip(value_ty.width()) {
                    Some((n, w)) => match u32::try_from(n).ok().and_then(|n| n.checked_mul(w)) {
                        Some(width) => Some(width),
                        None => bail_type!(
                            loc,
                            "{} copies of {} are wider than {} bits",
                            n,
                            value,
                            MAX_BITS_WIDTH
                        ),
                    },
                    None => None,
                };
                check_width(width, loc)?;
                Ok(Type::bits_with(width))
            }
            ExprKind::System { function, arg } => {
                let ty = arg.check(symtab, report)?;
                match function {
                    SystemFunction::Bits => match ty.kind() {
                        TypeKind::Boolean => Ok(Type::bits(1)),
                        TypeKind::Enum(_) => Ok(Type::bits_with(ty.width())),
                        _ if ty.is_bits_like() => Ok(Type::bits_with(ty.width())),
                        _ => bail_type!(loc, "$bits cannot be applied to {} of type {}", arg, ty),
                    },
                    SystemFunction::Signed => {
                        require_bits(arg, &ty, "$signed")?;
                        Ok(Type::bits_with(ty.width()).make_signed())
                    }
                    SystemFunction::ArraySize => match ty.kind() {
                        TypeKind::Array(_) => Ok(Type::bits(32)),
                        _ => bail_type!(loc, "{} of type {} is not an array", arg, ty),
                    },
                    SystemFunction::EnumSize | SystemFunction::EnumElementSize => {
                        Err(InternalError::new("enum function applied to an expression").into())
                    }
                }
            }
            ExprKind::EnumInfo { class, .. } => {
                lookup_enum(symtab, class, loc)?;
                Ok(Type::bits(32).make_const())
            }
            ExprKind::Pc => Ok(Type::bits_with(symtab.xlen())),
            ExprKind::DontCare => Ok(Type::dont_care()),
        }
    }

    /// Warn about `+` and `*` between two literals whose result does not fit its width.
    fn warn_literal_overflow(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        ty: &Type,
        symtab: &SymbolTable,
    ) {
        if !matches!(lhs.kind, ExprKind::Int(_)) || !matches!(rhs.kind, ExprKind::Int(_)) {
            return;
        }
        let operand = |e: &Expr| e.value(symtab).ok().and_then(|v| v.as_int());
        let (Some(l), Some(r), Some(width)) = (operand(lhs), operand(rhs), ty.width()) else {
            return;
        };
        let exact = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Mul => l.checked_mul(r),
            _ => return,
        };
        if exact.map_or(true, |v| v > mask(width)) {
            symtab.warn(
                &self.loc,
                format!("result of {} is truncated to {} bits", self, width),
            );
        }
    }
}

fn check_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    symtab: &SymbolTable,
    report: bool,
) -> CompileResult<Type> {
    let lhs_ty = lhs.check(symtab, report)?;
    let rhs_ty = rhs.check(symtab, report)?;
    if op.is_logical() {
        require_boolean(lhs, &lhs_ty, op.as_str())?;
        require_boolean(rhs, &rhs_ty, op.as_str())?;
        return Ok(Type::boolean());
    }
    if op.is_comparison() {
        if !lhs_ty.comparable_to(&rhs_ty) {
            bail_type!(
                &lhs.loc,
                "cannot compare {} ({}) with {} ({})",
                lhs,
                lhs_ty,
                rhs,
                rhs_ty
            );
        }
        return Ok(Type::boolean());
    }
    require_bits(lhs, &lhs_ty, op.as_str())?;
    require_bits(rhs, &rhs_ty, op.as_str())?;
    let width = match op {
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra => lhs_ty.width(),
        BinaryOp::WideShl => {
            let shift = rhs.value(symtab).known()?.and_then(|v| v.as_int());
            lhs_ty
                .width()
                .zip(shift)
                .map(|(w, s)| (w as u128 + s).min(u32::MAX as u128) as u32)
        }
        BinaryOp::WideAdd | BinaryOp::WideSub => {
            max_width(lhs_ty.width(), rhs_ty.width()).map(|w| w + 1)
        }
        BinaryOp::WideMul => lhs_ty.width().zip(rhs_ty.width()).map(|(a, b)| a + b),
        _ => max_width(lhs_ty.width(), rhs_ty.width()),
    };
    check_width(width, &lhs.loc)?;
    let signed = match op {
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sra | BinaryOp::WideShl => lhs_ty.is_signed(),
        _ => lhs_ty.is_signed() && rhs_ty.is_signed(),
    };
    let ty = Type::bits_with(width);
    Ok(if signed { ty.make_signed() } else { ty })
}

pub(crate) fn max_width(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    a.zip(b).map(|(a, b)| a.max(b))
}

fn check_width(width: Option<u32>, loc: &Loc) -> CompileResult<()> {
    match width {
        Some(w) if w > MAX_BITS_WIDTH => {
            bail_type!(loc, "result is {} bits wide, the maximum is {}", w, MAX_BITS_WIDTH)
        }
        _ => Ok(()),
    }
}

pub(crate) fn require_bits(expr: &Expr, ty: &Type, op: &str) -> CompileResult<()> {
    if ty.is_bits_like() {
        Ok(())
    } else {
        Err(TypeError::new(
            &expr.loc,
            format!("'{}' needs an integer, but {} has type {}", op, expr, ty),
        )
        .into())
    }
}

pub(crate) fn require_boolean(expr: &Expr, ty: &Type, op: &str) -> CompileResult<()> {
    if ty.is_boolean() {
        Ok(())
    } else {
        Err(TypeError::new(
            &expr.loc,
            format!("'{}' needs a Boolean, but {} has type {}", op, expr, ty),
        )
        .into())
    }
}

pub(crate) fn lookup_enum(
    symtab: &SymbolTable,
    class: &str,
    loc: &Loc,
) -> CompileResult<(Type, Arc<EnumDef>)> {
    match symtab.get(class) {
        Some(Binding::Type(ty)) => match ty.kind() {
            TypeKind::Enum(def) => Ok((ty.clone(), def.clone())),
            _ => bail_type!(loc, "'{}' is not an enum", class),
        },
        _ => bail_type!(loc, "undefined enum '{}'", class),
    }
}

pub(crate) fn lookup_csr(
    symtab: &SymbolTable,
    name: &str,
    loc: &Loc,
) -> CompileResult<Arc<CsrDef>> {
    match symtab.arch().csr(name) {
        Some(def) => Ok(def),
        None => bail_type!(loc, "no CSR named '{}'", name),
    }
}

fn csr_field_type(
    def: &CsrDef,
    field: &str,
    symtab: &SymbolTable,
    loc: &Loc,
) -> CompileResult<Type> {
    let Some(f) = def.field(field) else {
        bail_type!(loc, "CSR {} has no field '{}'", def.name, field);
    };
    match f.location(symtab.xlen()) {
        Ok(Some(location)) => Ok(Type::bits(location.width())),
        Ok(None) => Ok(Type::bits_with(None)),
        Err(e) => bail_type!(loc, "CSR[{}].{}: {}", def.name, field, e),
    }
}
