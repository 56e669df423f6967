//! Dead code elimination.
//!
//! Expressions whose value is known for the configuration are replaced by literals, branches
//! that cannot be taken are dropped and statements after an unconditional `return` are removed.
//! The output is semantically equivalent to the input for the configuration it was pruned
//! against, and pruning it again gives the same statements.

use crate::ast::{forget, BinaryOp, Call, Checked, Expr, ExprKind, IntLiteral, Stmt, StmtKind};
use crate::error::{CompileResult, ValueResultExt};
use crate::passes::{apply, root_scope, AnalysisRoot};
use crate::symtab::SymbolTable;
use crate::types::TypeKind;
use crate::value::Value;

/// Prune a checked compile unit.
///
/// The result is not checked again: it is derived from checked code and keeps its types.
pub fn prune<R: AnalysisRoot>(root: &Checked<R>) -> CompileResult<Checked<R>> {
    let mut symtab = root_scope(&**root);
    let stmts = prune_stmts(root.stmts(), &mut symtab)?;
    debug!(
        "Pruned {}: {} top-level statements left of {}",
        root.description(),
        stmts.len(),
        root.stmts().len()
    );
    Ok(Checked::new(root.with_stmts(stmts)))
}

/// Prune a list of checked statements running in `symtab`, which is updated with their effect.
pub fn prune_stmts(stmts: &[Stmt], symtab: &mut SymbolTable) -> CompileResult<Vec<Stmt>> {
    let mut out = vec![];
    prune_block(stmts, symtab, &mut out)?;
    Ok(out)
}

/// Prune `stmts` into `out`. Returns whether the block always returns.
fn prune_block(
    stmts: &[Stmt],
    symtab: &mut SymbolTable,
    out: &mut Vec<Stmt>,
) -> CompileResult<bool> {
    for (index, stmt) in stmts.iter().enumerate() {
        if prune_stmt(stmt, symtab, out)? {
            let dropped = stmts.len() - index - 1;
            if dropped > 0 {
                trace!("{}: dropping {} unreachable statements", stmt.loc, dropped);
            }
            return Ok(true);
        }
    }
    Ok(false)
}

fn prune_stmt(stmt: &Stmt, symtab: &mut SymbolTable, out: &mut Vec<Stmt>) -> CompileResult<bool> {
    let loc = stmt.loc.clone();
    match &stmt.kind {
        StmtKind::If { cond, body, orelse } => {
            if let Some(taken) = known_bool(cond, symtab)? {
                let block = if taken { body } else { orelse };
                let mut pruned = vec![];
                let returns = symtab.scoped(|symtab| prune_block(block, symtab, &mut pruned))?;
                // Declarations must not leak into the enclosing scope.
                if pruned.iter().any(|s| matches!(s.kind, StmtKind::Decl { .. })) {
                    let always = Expr::new(ExprKind::Bool(true), cond.loc.clone());
                    out.push(Stmt::new(
                        StmtKind::If {
                            cond: always,
                            body: pruned,
                            orelse: vec![],
                        },
                        loc,
                    ));
                } else {
                    out.extend(pruned);
                }
                return Ok(returns);
            }
            let cond = prune_expr(cond, symtab)?;
            let (body, body_returns) = prune_branch(body, symtab)?;
            let (orelse, orelse_returns) = prune_branch(orelse, symtab)?;
            let pruned = Stmt::new(StmtKind::If { cond, body, orelse }, loc);
            pruned.execute_unknown(symtab)?;
            out.push(pruned);
            Ok(body_returns && orelse_returns)
        }
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            let init_pruned = prune_simple(init, symtab)?;
            // The body is pruned once for every iteration: nothing the loop writes is known.
            let mut scope = symtab.deep_clone();
            let (cond, update, body) = scope.scoped(|scope| -> CompileResult<_> {
                init.execute_unknown(scope)?;
                let mut assigned = vec![];
                stmt.assigned_vars(&mut assigned);
                for name in &assigned {
                    forget(name, scope)?;
                }
                let cond = prune_expr(cond, scope)?;
                let update = prune_simple(update, scope)?;
                let mut body_out = vec![];
                scope.scoped(|scope| prune_block(body, scope, &mut body_out))?;
                Ok((cond, update, body_out))
            })?;
            let pruned = Stmt::new(
                StmtKind::For {
                    init: Box::new(init_pruned),
                    cond,
                    update: Box::new(update),
                    body,
                },
                loc,
            );
            apply(&pruned, symtab)?;
            out.push(pruned);
            Ok(false)
        }
        StmtKind::Return(_) => {
            out.push(prune_simple(stmt, symtab)?);
            Ok(true)
        }
        _ => {
            let pruned = prune_simple(stmt, symtab)?;
            apply(&pruned, symtab)?;
            out.push(pruned);
            Ok(false)
        }
    }
}

/// Prune a branch whose execution is not known, without touching `symtab`.
fn prune_branch(stmts: &[Stmt], symtab: &SymbolTable) -> CompileResult<(Vec<Stmt>, bool)> {
    let mut branch = symtab.deep_clone();
    let mut out = vec![];
    let returns = branch.scoped(|branch| prune_block(stmts, branch, &mut out))?;
    Ok((out, returns))
}

/// Prune the expressions of a statement without nested blocks.
fn prune_simple(stmt: &Stmt, symtab: &SymbolTable) -> CompileResult<Stmt> {
    let kind = match &stmt.kind {
        StmtKind::Decl { ty, names, init } => StmtKind::Decl {
            ty: ty.clone(),
            names: names.clone(),
            init: init.as_ref().map(|e| prune_expr(e, symtab)).transpose()?,
        },
        StmtKind::Assign { target, value } => StmtKind::Assign {
            target: prune_target(target, symtab)?,
            value: prune_expr(value, symtab)?,
        },
        StmtKind::MultiAssign { targets, value } => StmtKind::MultiAssign {
            targets: targets
                .iter()
                .map(|t| prune_target(t, symtab))
                .collect::<CompileResult<_>>()?,
            value: prune_expr(value, symtab)?,
        },
        // A statement must stay a call even if its value is known.
        StmtKind::Expr(expr) => StmtKind::Expr(prune_children(expr, symtab)?),
        StmtKind::Return(values) => StmtKind::Return(
            values
                .iter()
                .map(|v| prune_expr(v, symtab))
                .collect::<CompileResult<_>>()?,
        ),
        kind => kind.clone(),
    };
    Ok(Stmt::new(kind, stmt.loc.clone()))
}

/// Prune a checked expression: known sub-expressions become literals.
pub fn prune_expr(expr: &Expr, symtab: &SymbolTable) -> CompileResult<Expr> {
    if expr.is_literal() {
        return Ok(expr.clone());
    }
    if let Some(literal) = fold(expr, symtab)? {
        return Ok(literal);
    }
    match &expr.kind {
        ExprKind::Ternary { cond, then, orelse } => {
            if let Some(taken) = known_bool(cond, symtab)? {
                let (branch, other) = if taken { (then, orelse) } else { (orelse, then) };
                if branch.type_of(symtab)?.equal_to(&other.type_of(symtab)?) {
                    return prune_expr(branch, symtab);
                }
            }
        }
        ExprKind::Binary {
            op: op @ (BinaryOp::LogicalAnd | BinaryOp::LogicalOr),
            lhs,
            rhs,
        } => {
            // `true && x` is `x`, `false || x` is `x`.
            let neutral = *op == BinaryOp::LogicalAnd;
            if known_bool(lhs, symtab)? == Some(neutral) {
                return prune_expr(rhs, symtab);
            }
            if known_bool(rhs, symtab)? == Some(neutral) {
                return prune_expr(lhs, symtab);
            }
        }
        _ => {}
    }
    prune_children(expr, symtab)
}

fn known_bool(expr: &Expr, symtab: &SymbolTable) -> CompileResult<Option<bool>> {
    Ok(expr.value(symtab).known()?.and_then(|v| v.as_bool()))
}

/// The literal with the value of `expr`, if known and expressible as a literal.
fn fold(expr: &Expr, symtab: &SymbolTable) -> CompileResult<Option<Expr>> {
    let Some(value) = expr.value(symtab).known()? else {
        return Ok(None);
    };
    let ty = expr.type_of(symtab)?;
    let kind = match (ty.kind(), value) {
        (TypeKind::Bits, Value::Int(v)) => match ty.width() {
            Some(width) if width > 0 => ExprKind::Int(IntLiteral::sized(v, width, ty.is_signed())),
            _ => return Ok(None),
        },
        (TypeKind::Boolean, Value::Bool(b)) => ExprKind::Bool(b),
        (TypeKind::String, Value::String(s)) => ExprKind::String(s),
        (TypeKind::Enum(def), Value::Int(v)) => match def.member_of(v) {
            Some(member) => ExprKind::EnumRef {
                class: def.name.clone(),
                member: member.to_string(),
            },
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    let literal = Expr::new(kind, expr.loc.clone());
    trace!("{}: {} folded to {}", expr.loc, expr, literal);
    Ok(Some(literal))
}

fn prune_children(expr: &Expr, symtab: &SymbolTable) -> CompileResult<Expr> {
    let prune = |e: &Expr| -> CompileResult<Box<Expr>> { Ok(Box::new(prune_expr(e, symtab)?)) };
    let kind = match &expr.kind {
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: prune(operand)?,
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op: *op,
            lhs: prune(lhs)?,
            rhs: prune(rhs)?,
        },
        ExprKind::Paren(inner) => {
            let inner = prune(inner)?;
            if inner.is_literal() {
                return Ok(*inner);
            }
            ExprKind::Paren(inner)
        }
        ExprKind::Ternary { cond, then, orelse } => ExprKind::Ternary {
            cond: prune(cond)?,
            then: prune(then)?,
            orelse: prune(orelse)?,
        },
        ExprKind::Index { base, index } => ExprKind::Index {
            base: prune(base)?,
            index: prune(index)?,
        },
        ExprKind::Range { base, msb, lsb } => ExprKind::Range {
            base: prune(base)?,
            msb: prune(msb)?,
            lsb: prune(lsb)?,
        },
        ExprKind::Field { base, field } => ExprKind::Field {
            base: prune(base)?,
            field: field.clone(),
        },
        // Template arguments are left as written.
        ExprKind::Call(call) => ExprKind::Call(Call {
            name: call.name.clone(),
            template_args: call.template_args.clone(),
            args: call
                .args
                .iter()
                .map(|a| prune_expr(a, symtab))
                .collect::<CompileResult<_>>()?,
        }),
        ExprKind::Concat(items) => ExprKind::Concat(
            items
                .iter()
                .map(|e| prune_expr(e, symtab))
                .collect::<CompileResult<_>>()?,
        ),
        ExprKind::Replicate { count, value } => ExprKind::Replicate {
            count: count.clone(),
            value: prune(value)?,
        },
        ExprKind::System { function, arg } => ExprKind::System {
            function: *function,
            arg: prune(arg)?,
        },
        kind => kind.clone(),
    };
    Ok(Expr::new(kind, expr.loc.clone()))
}

/// Assignment targets keep their variables; only the index expressions are pruned.
fn prune_target(target: &Expr, symtab: &SymbolTable) -> CompileResult<Expr> {
    let kind = match &target.kind {
        ExprKind::Index { base, index } => ExprKind::Index {
            base: Box::new(prune_target(base, symtab)?),
            index: Box::new(prune_expr(index, symtab)?),
        },
        ExprKind::Range { base, msb, lsb } => ExprKind::Range {
            base: Box::new(prune_target(base, symtab)?),
            msb: Box::new(prune_expr(msb, symtab)?),
            lsb: Box::new(prune_expr(lsb, symtab)?),
        },
        ExprKind::Field { base, field } => ExprKind::Field {
            base: Box::new(prune_target(base, symtab)?),
            field: field.clone(),
        },
        kind => kind.clone(),
    };
    Ok(Expr::new(kind, target.loc.clone()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::{parse_body, parse_expression};
    use crate::symtab::{Binding, Var};
    use crate::test_util::symtab64;
    use crate::types::Type;

    fn unknown_arg(symtab: &mut SymbolTable) {
        symtab.push();
        symtab
            .add("a", Binding::Var(Var::new("a", Type::bits(64), None)))
            .unwrap();
    }

    /// Check `source` as a function body returning `Bits<64>` with an unknown argument `a`, then
    /// prune it.
    fn pruned(source: &str) -> String {
        let stmts = parse_body("test", source).unwrap();
        let mut symtab = symtab64();
        symtab.push_function(vec![Type::bits(64)]);
        unknown_arg(&mut symtab);
        let mut check = symtab.deep_clone();
        check.push();
        for stmt in &stmts {
            stmt.type_check(&mut check).unwrap();
        }
        symtab.push();
        let out = prune_stmts(&stmts, &mut symtab).unwrap();
        out.iter().map(|s| s.to_idl()).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_known_branch_is_spliced() {
        let out = pruned("Bits<64> x = 1; if (XLEN == 64) { x = 2; } else { x = 3; } return x;");
        assert_eq!(out, "Bits<64> x = 1;\nx = 2;\nreturn 64'd2;");
    }

    #[test]
    fn test_known_values_are_folded() {
        let out = pruned("Bits<64> x; Bits<64> y = x + 1; return a + y;");
        assert_eq!(out, "Bits<64> x;\nBits<64> y = 64'd1;\nreturn a + 64'd1;");
    }

    #[test]
    fn test_unknown_branch_is_kept() {
        let out = pruned("Bits<64> x = 1; if (a == 0) { x = XLEN; } return x;");
        assert_eq!(
            out,
            "Bits<64> x = 1;\nif (a == 0) {\n  x = 8'd64;\n}\nreturn x;"
        );
    }

    #[test]
    fn test_statements_after_return_are_dropped() {
        let out = pruned("return 1; return 2;");
        assert_eq!(out, "return 1;");
    }

    #[test]
    fn test_declarations_stay_scoped() {
        let out = pruned("if (true) { Bits<64> t = 5; } return 0;");
        assert!(out.starts_with("if (true) {"), "{}", out);
    }

    #[test]
    fn test_short_circuit() {
        let mut symtab = symtab64();
        unknown_arg(&mut symtab);
        let expr = parse_expression("test", "(XLEN == 64) && (a == 1)").unwrap();
        expr.type_check(&symtab).unwrap();
        assert_eq!(prune_expr(&expr, &symtab).unwrap().to_idl(), "(a == 1)");
        let expr = parse_expression("test", "(XLEN == 32) || a[0] == 1").unwrap();
        expr.type_check(&symtab).unwrap();
        assert_eq!(prune_expr(&expr, &symtab).unwrap().to_idl(), "a[0] == 1");
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let source = "Bits<64> x = 1; if (XLEN == 64) { Bits<64> t = a; x = t; } \
                      if (a == 0) { return 1; } else { return x; } return 5;";
        let stmts = parse_body("test", source).unwrap();
        let mut symtab = symtab64();
        symtab.push_function(vec![Type::bits(64)]);
        unknown_arg(&mut symtab);
        symtab.push();
        let once = prune_stmts(&stmts, &mut symtab.deep_clone()).unwrap();
        let twice = prune_stmts(&once, &mut symtab.deep_clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }
}
