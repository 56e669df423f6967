use crate::ast::check::require_boolean;
use crate::ast::eval::{bool_value, internal};
use crate::ast::function::add_unique;
use crate::ast::{is_const_name, Expr, ExprKind, Loc, TypeName};
use crate::error::{CompileResult, InternalError, ValueError, ValueResult, ValueResultExt};
use crate::symtab::{Binding, SymbolError, SymbolTable, Var};
use crate::types::{Type, TypeKind};
use crate::value::{mask, Value};

/// Iterations after which the evaluator gives up on a loop.
pub const MAX_LOOP_ITERATIONS: usize = 4096;

/// Outcome of executing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Return(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// `T a, b;` or `T a = init;`.
    Decl {
        ty: TypeName,
        names: Vec<String>,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    /// `(a, -, c) = f();`
    MultiAssign {
        targets: Vec<Expr>,
        value: Expr,
    },
    /// A function call whose result is discarded.
    Expr(Expr),
    /// `else if` chains are nested `If`s in `orelse`.
    If {
        cond: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        update: Box<Stmt>,
        body: Vec<Stmt>,
    },
    Return(Vec<Expr>),
    /// `i++` / `i--`.
    Step {
        target: String,
        decrement: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Loc) -> Stmt {
        Stmt { kind, loc }
    }

    pub fn type_check(&self, symtab: &mut SymbolTable) -> CompileResult<()> {
        let loc = &self.loc;
        match &self.kind {
            StmtKind::Decl { ty, names, init } => {
                let ty = ty.resolve(symtab, loc)?;
                for name in names {
                    let constant = is_const_name(name);
                    let value = match init {
                        Some(init) => {
                            let init_ty = init.check(symtab, true)?;
                            if !init_ty.convertible_to(&ty) {
                                bail_type!(
                                    &init.loc,
                                    "cannot initialize {} ({}) with {} ({})",
                                    name,
                                    ty,
                                    init,
                                    init_ty
                                );
                            }
                            warn_narrowing(symtab, init, &init_ty, &ty);
                            let value = init.value(symtab).known()?;
                            if constant && value.is_none() {
                                bail_type!(
                                    loc,
                                    "constant {} must be initialized with a compile-time-known value",
                                    name
                                );
                            }
                            value.map(|v| v.convert(&init_ty, &ty))
                        }
                        None if constant => {
                            bail_type!(loc, "constant {} must be initialized", name)
                        }
                        None => None,
                    };
                    // Global variables are machine state, only constants have a value.
                    let value = if symtab.levels() == 1 && !constant {
                        None
                    } else {
                        value
                    };
                    let var_ty = if constant { ty.make_const() } else { ty.clone() };
                    add_unique(
                        symtab,
                        name,
                        Binding::Var(Var::new(name.clone(), var_ty, value)),
                        loc,
                    )?;
                }
                Ok(())
            }
            StmtKind::Assign { target, value } => {
                let target_ty = check_target(target, symtab)?;
                let value_ty = value.check(symtab, true)?;
                if !value_ty.convertible_to(&target_ty) {
                    bail_type!(
                        loc,
                        "cannot assign {} ({}) to {} ({})",
                        value,
                        value_ty,
                        target,
                        target_ty
                    );
                }
                warn_narrowing(symtab, value, &value_ty, &target_ty);
                forget_target(target, symtab)?;
                Ok(())
            }
            StmtKind::MultiAssign { targets, value } => {
                let value_ty = value.check(symtab, true)?;
                let TypeKind::Tuple(members) = value_ty.kind() else {
                    bail_type!(loc, "{} ({}) does not return multiple values", value, value_ty);
                };
                if members.len() != targets.len() {
                    bail_type!(
                        loc,
                        "{} returns {} values, but there are {} targets",
                        value,
                        members.len(),
                        targets.len()
                    );
                }
                for (target, member) in targets.iter().zip(members) {
                    if matches!(target.kind, ExprKind::DontCare) {
                        continue;
                    }
                    let target_ty = check_target(target, symtab)?;
                    if !member.convertible_to(&target_ty) {
                        bail_type!(
                            &target.loc,
                            "cannot assign {} to {} ({})",
                            member,
                            target,
                            target_ty
                        );
                    }
                }
                for target in targets {
                    forget_target(target, symtab)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                if !matches!(expr.kind, ExprKind::Call(_)) {
                    bail_type!(loc, "{} is not a statement", expr);
                }
                expr.type_check(symtab)
            }
            StmtKind::If { cond, body, orelse } => {
                let cond_ty = cond.check(symtab, true)?;
                require_boolean(cond, &cond_ty, "if")?;
                match cond.value(symtab).known()? {
                    Some(Value::Bool(true)) => check_block(body, symtab),
                    Some(Value::Bool(false)) => check_block(orelse, symtab),
                    _ => {
                        check_block(body, symtab)?;
                        check_block(orelse, symtab)
                    }
                }
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => symtab.scoped(|symtab| -> CompileResult<()> {
                if !matches!(init.kind, StmtKind::Decl { .. }) {
                    bail_type!(&init.loc, "a for loop must start with a declaration");
                }
                init.type_check(symtab)?;
                let mut assigned = vec![];
                update.assigned_vars(&mut assigned);
                for stmt in body {
                    stmt.assigned_vars(&mut assigned);
                }
                for name in &assigned {
                    forget(name, symtab)?;
                }
                let cond_ty = cond.check(symtab, true)?;
                require_boolean(cond, &cond_ty, "for")?;
                update.type_check(symtab)?;
                check_block(body, symtab)
            }),
            StmtKind::Return(values) => {
                let Some(returns) = symtab.current_function().map(|r| r.to_vec()) else {
                    bail_type!(loc, "return outside of a function");
                };
                let types = values
                    .iter()
                    .map(|v| v.check(symtab, true))
                    .collect::<CompileResult<Vec<_>>>()?;
                let returned = match types.as_slice() {
                    [single] if returns.len() > 1 => match single.kind() {
                        TypeKind::Tuple(members) => members.clone(),
                        _ => types.clone(),
                    },
                    _ => types.clone(),
                };
                if returned.len() != returns.len() {
                    bail_type!(
                        loc,
                        "returning {} values from a function that returns {}",
                        returned.len(),
                        returns.len()
                    );
                }
                for (ty, expected) in returned.iter().zip(&returns) {
                    if !ty.convertible_to(expected) {
                        bail_type!(loc, "cannot return {} as {}", ty, expected);
                    }
                }
                Ok(())
            }
            StmtKind::Step { target, .. } => {
                match symtab.get(target) {
                    Some(Binding::Var(var)) => {
                        if var.decode_var {
                            bail_type!(
                                loc,
                                "cannot modify {}, it is decoded from the encoding",
                                target
                            );
                        }
                        if var.ty.is_const() {
                            bail_type!(loc, "cannot modify constant {}", target);
                        }
                        if !var.ty.is_bits() {
                            bail_type!(loc, "cannot increment {} of type {}", target, var.ty);
                        }
                    }
                    Some(_) => bail_type!(loc, "'{}' is not a variable", target),
                    None => bail_type!(loc, "undefined symbol '{}'", target),
                }
                forget(target, symtab)?;
                Ok(())
            }
        }
    }

    /// Execute the statement, updating the values of the variables.
    ///
    /// A statement that fails with [`ValueError::Unknown`] may have updated some variables; the
    /// caller is expected to follow up with [`Stmt::execute_unknown`].
    pub fn execute(&self, symtab: &mut SymbolTable) -> ValueResult<Flow> {
        match &self.kind {
            StmtKind::Decl { ty, names, init } => {
                let ty = ty.resolve(symtab, &self.loc).map_err(internal)?;
                let value = match init {
                    Some(init) => init.value(symtab)?.convert(&init.ty(symtab)?, &ty),
                    None => ty.default_value()?,
                };
                for name in names {
                    let var_ty = if is_const_name(name) {
                        ty.make_const()
                    } else {
                        ty.clone()
                    };
                    symtab
                        .add(
                            name.clone(),
                            Binding::Var(Var::new(name.clone(), var_ty, Some(value.clone()))),
                        )
                        .map_err(symbol_error)?;
                }
                Ok(Flow::Continue)
            }
            StmtKind::Assign { target, value } => {
                let v = value.value(symtab)?;
                write_target(target, v, &value.ty(symtab)?, symtab)?;
                Ok(Flow::Continue)
            }
            StmtKind::MultiAssign { targets, value } => {
                let value_ty = value.ty(symtab)?;
                let (Value::Tuple(items), TypeKind::Tuple(members)) =
                    (value.value(symtab)?, value_ty.kind())
                else {
                    bail_internal!("{} did not evaluate to multiple values", value);
                };
                for ((target, item), member) in targets.iter().zip(items).zip(members) {
                    if !matches!(target.kind, ExprKind::DontCare) {
                        write_target(target, item, member, symtab)?;
                    }
                }
                Ok(Flow::Continue)
            }
            StmtKind::Expr(expr) => {
                expr.value(symtab)?;
                Ok(Flow::Continue)
            }
            StmtKind::If { cond, body, orelse } => {
                let block = if bool_value(cond, symtab)? {
                    body
                } else {
                    orelse
                };
                symtab.scoped(|symtab| execute_block(block, symtab))
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => symtab.scoped(|symtab| -> ValueResult<Flow> {
                init.execute(symtab)?;
                for _ in 0..MAX_LOOP_ITERATIONS {
                    if !bool_value(cond, symtab)? {
                        return Ok(Flow::Continue);
                    }
                    if let Flow::Return(v) = symtab.scoped(|symtab| execute_block(body, symtab))? {
                        return Ok(Flow::Return(v));
                    }
                    update.execute(symtab)?;
                }
                bail_unknown!("loop does not terminate in {} iterations", MAX_LOOP_ITERATIONS)
            }),
            StmtKind::Return(values) => {
                let returns = symtab.current_function().map(|r| r.to_vec()).unwrap_or_default();
                let mut result = vec![];
                for (i, expr) in values.iter().enumerate() {
                    let v = expr.value(symtab)?;
                    let ty = expr.ty(symtab)?;
                    result.push(match returns.get(i) {
                        Some(expected) if values.len() == returns.len() => v.convert(&ty, expected),
                        _ => v,
                    });
                }
                Ok(Flow::Return(match result.len() {
                    1 => result.remove(0),
                    _ => Value::Tuple(result),
                }))
            }
            StmtKind::Step { target, decrement } => {
                if symtab.is_global(target) {
                    bail_unknown!("{} modifies global state", target);
                }
                let Some(var) = symtab.get_var(target) else {
                    bail_internal!("undefined variable {}", target);
                };
                let (width, value) = (var.ty.width(), var.value.clone());
                let Some(width) = width else {
                    bail_unknown!("width of {} is not known", target);
                };
                let v = match value {
                    Some(Value::Int(v)) => v,
                    Some(other) => bail_internal!("{} has value {}", target, other),
                    None => bail_unknown!("value of {} is not known", target),
                };
                let v = if *decrement {
                    v.wrapping_sub(1)
                } else {
                    v.wrapping_add(1)
                };
                symtab.set_value(target, Some(Value::Int(v & mask(width))))?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Model the effect of the statement when its execution cannot be predicted: every variable
    /// it may write becomes unknown, declarations are still performed.
    pub fn execute_unknown(&self, symtab: &mut SymbolTable) -> Result<(), InternalError> {
        match &self.kind {
            StmtKind::Decl { ty, names, .. } => {
                let ty = ty
                    .resolve(symtab, &self.loc)
                    .unwrap_or_else(|_| Type::bits_with(None));
                for name in names {
                    let var = Var::new(name.clone(), ty.clone(), None);
                    match symtab.add(name.clone(), Binding::Var(var)) {
                        Ok(()) => {}
                        Err(SymbolError::Duplicate(_)) => symtab.set_value(name, None)?,
                        Err(SymbolError::Internal(e)) => return Err(e),
                    }
                }
                Ok(())
            }
            StmtKind::Assign { .. } | StmtKind::MultiAssign { .. } | StmtKind::Step { .. } => {
                let mut assigned = vec![];
                self.assigned_vars(&mut assigned);
                for name in &assigned {
                    forget(name, symtab)?;
                }
                Ok(())
            }
            StmtKind::Expr(_) | StmtKind::Return(_) => Ok(()),
            StmtKind::If { body, orelse, .. } => {
                symtab.scoped(|symtab| execute_block_unknown(body, symtab))?;
                symtab.scoped(|symtab| execute_block_unknown(orelse, symtab))
            }
            StmtKind::For {
                init, update, body, ..
            } => symtab.scoped(|symtab| -> Result<(), InternalError> {
                init.execute_unknown(symtab)?;
                symtab.scoped(|symtab| execute_block_unknown(body, symtab))?;
                update.execute_unknown(symtab)
            }),
        }
    }

    /// Names of the variables the statement may assign, nested blocks included.
    pub fn assigned_vars(&self, out: &mut Vec<String>) {
        match &self.kind {
            StmtKind::Assign { target, .. } => {
                if let Some(root) = target.root_var() {
                    push_unique(out, root);
                }
            }
            StmtKind::MultiAssign { targets, .. } => {
                for root in targets.iter().filter_map(|t| t.root_var()) {
                    push_unique(out, root);
                }
            }
            StmtKind::Step { target, .. } => push_unique(out, target),
            StmtKind::If { body, orelse, .. } => {
                for stmt in body.iter().chain(orelse) {
                    stmt.assigned_vars(out);
                }
            }
            StmtKind::For {
                init, update, body, ..
            } => {
                init.assigned_vars(out);
                update.assigned_vars(out);
                for stmt in body {
                    stmt.assigned_vars(out);
                }
            }
            StmtKind::Decl { .. } | StmtKind::Expr(_) | StmtKind::Return(_) => {}
        }
    }

    /// Expressions directly contained in the statement (not in nested statements).
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Decl { init, .. } => init.iter().collect(),
            StmtKind::Assign { target, value } => vec![target, value],
            StmtKind::MultiAssign { targets, value } => {
                targets.iter().chain(std::iter::once(value)).collect()
            }
            StmtKind::Expr(expr) => vec![expr],
            StmtKind::If { cond, .. } | StmtKind::For { cond, .. } => vec![cond],
            StmtKind::Return(values) => values.iter().collect(),
            StmtKind::Step { .. } => vec![],
        }
    }

    pub fn to_idl(&self) -> String {
        match &self.kind {
            StmtKind::If { cond, body, orelse } => {
                let mut out = format!("if ({}) {}", cond.to_idl(), block_to_idl(body));
                match orelse.as_slice() {
                    [] => {}
                    [nested @ Stmt {
                        kind: StmtKind::If { .. },
                        ..
                    }] => out += &format!(" else {}", nested.to_idl()),
                    _ => out += &format!(" else {}", block_to_idl(orelse)),
                }
                out
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => format!(
                "for ({} {}; {}) {}",
                init.to_idl(),
                cond.to_idl(),
                update.to_idl_inline(),
                block_to_idl(body)
            ),
            _ => format!("{};", self.to_idl_inline()),
        }
    }

    /// Simple statements without the trailing `;`.
    fn to_idl_inline(&self) -> String {
        match &self.kind {
            StmtKind::Decl { ty, names, init } => {
                let mut out = ty.declare(&names[0]);
                for name in &names[1..] {
                    out += &format!(", {}", name);
                }
                if let Some(init) = init {
                    out += &format!(" = {}", init.to_idl());
                }
                out
            }
            StmtKind::Assign { target, value } => {
                format!("{} = {}", target.to_idl(), value.to_idl())
            }
            StmtKind::MultiAssign { targets, value } => format!(
                "({}) = {}",
                targets
                    .iter()
                    .map(|t| t.to_idl())
                    .collect::<Vec<_>>()
                    .join(", "),
                value.to_idl()
            ),
            StmtKind::Expr(expr) => expr.to_idl(),
            StmtKind::Return(values) if values.is_empty() => "return".to_string(),
            StmtKind::Return(values) => format!(
                "return {}",
                values
                    .iter()
                    .map(|v| v.to_idl())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            StmtKind::Step { target, decrement } => {
                format!("{}{}", target, if *decrement { "--" } else { "++" })
            }
            StmtKind::If { .. } | StmtKind::For { .. } => self.to_idl(),
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn block_to_idl(stmts: &[Stmt]) -> String {
    let mut out = "{\n".to_string();
    for stmt in stmts {
        for line in stmt.to_idl().lines() {
            out += &format!("  {}\n", line);
        }
    }
    out += "}";
    out
}

fn check_block(stmts: &[Stmt], symtab: &mut SymbolTable) -> CompileResult<()> {
    symtab.scoped(|symtab| {
        for stmt in stmts {
            stmt.type_check(symtab)?;
        }
        Ok(())
    })
}

pub(crate) fn execute_block(stmts: &[Stmt], symtab: &mut SymbolTable) -> ValueResult<Flow> {
    for stmt in stmts {
        if let Flow::Return(v) = stmt.execute(symtab)? {
            return Ok(Flow::Return(v));
        }
    }
    Ok(Flow::Continue)
}

fn execute_block_unknown(stmts: &[Stmt], symtab: &mut SymbolTable) -> Result<(), InternalError> {
    for stmt in stmts {
        stmt.execute_unknown(symtab)?;
    }
    Ok(())
}

fn symbol_error(error: SymbolError) -> ValueError {
    match error {
        SymbolError::Internal(e) => ValueError::Internal(e),
        e => ValueError::Internal(InternalError::new(e.to_string())),
    }
}

/// Make the value of a variable unknown, if it can hold one.
pub(crate) fn forget(name: &str, symtab: &mut SymbolTable) -> Result<(), InternalError> {
    if symtab.get_var(name).is_none() || (symtab.is_frozen() && symtab.is_global(name)) {
        return Ok(());
    }
    symtab.set_value(name, None)
}

fn forget_target(target: &Expr, symtab: &mut SymbolTable) -> Result<(), InternalError> {
    match target.root_var() {
        Some(root) => forget(root, symtab),
        None => Ok(()),
    }
}

fn warn_narrowing(symtab: &SymbolTable, value: &Expr, from: &Type, to: &Type) {
    let (Some(from_width), Some(to_width)) = (from.bits_width(), to.bits_width()) else {
        return;
    };
    if from_width <= to_width {
        return;
    }
    let fits = match &value.kind {
        ExprKind::Int(lit) => lit.value <= mask(to_width),
        _ => false,
    };
    if !fits {
        symtab.warn(
            &value.loc,
            format!("{} ({}) is truncated to {} bits", value, from, to_width),
        );
    }
}

/// Check that `target` can be assigned, returning its type.
fn check_target(target: &Expr, symtab: &SymbolTable) -> CompileResult<Type> {
    let loc = &target.loc;
    match &target.kind {
        ExprKind::Id(name) => match symtab.get(name) {
            Some(Binding::Var(var)) => {
                if var.decode_var {
                    bail_type!(loc, "cannot assign to {}, it is decoded from the encoding", name);
                }
                if var.ty.is_const() {
                    bail_type!(loc, "cannot assign to constant {}", name);
                }
                Ok(var.ty.clone())
            }
            Some(_) => bail_type!(loc, "'{}' is not a variable", name),
            None => bail_type!(loc, "undefined symbol '{}'", name),
        },
        ExprKind::Index { base, .. } | ExprKind::Range { base, .. } => {
            check_target(base, symtab)?;
            target.check(symtab, true)
        }
        ExprKind::Field { base, field } => {
            if let ExprKind::Csr(name) = &base.kind {
                if let Some(def) = symtab.arch().csr(name) {
                    if let Some(f) = def.field(field) {
                        if f.ty.is_read_only() {
                            bail_type!(
                                loc,
                                "CSR[{}].{} is read-only ({}) and cannot be assigned",
                                name,
                                field,
                                f.ty
                            );
                        }
                    }
                }
            } else {
                check_target(base, symtab)?;
            }
            target.check(symtab, true)
        }
        ExprKind::Csr(_) => target.check(symtab, true),
        _ => bail_type!(loc, "{} cannot be assigned", target),
    }
}

/// Store `value` (of type `value_ty`) into `target`.
fn write_target(
    target: &Expr,
    value: Value,
    value_ty: &Type,
    symtab: &mut SymbolTable,
) -> ValueResult<()> {
    let Some(root) = target.root_var() else {
        bail_unknown!("{} writes architectural state", target);
    };
    if symtab.is_global(root) {
        bail_unknown!("{} writes global state", target);
    }
    let target_ty = target.ty(symtab)?;
    let value = value.convert(value_ty, &target_ty);
    let new_value = match &target.kind {
        ExprKind::Id(_) => value,
        ExprKind::Index { base, index } if matches!(base.kind, ExprKind::Id(_)) => {
            let i = index.value(symtab)?.as_int().unwrap_or(u128::MAX);
            match base.value(symtab)? {
                Value::Array(mut items) => {
                    match items.get_mut(i as usize) {
                        Some(item) => *item = value,
                        None => bail_unknown!("index {} out of range", i),
                    }
                    Value::Array(items)
                }
                Value::Int(v) => {
                    let bit = value.as_int().unwrap_or(0) & 1;
                    if i >= 128 {
                        bail_unknown!("index {} out of range", i);
                    }
                    Value::Int((v & !(1 << i)) | (bit << i))
                }
                other => bail_internal!("cannot index {}", other),
            }
        }
        ExprKind::Range { base, msb, lsb } if matches!(base.kind, ExprKind::Id(_)) => {
            let m = msb.value(symtab)?.as_int().unwrap_or(0);
            let l = lsb.value(symtab)?.as_int().unwrap_or(0);
            let current = base.value(symtab)?.as_int().unwrap_or(0);
            splice(current, value.as_int().unwrap_or(0), m, l)?
        }
        ExprKind::Field { base, field } if matches!(base.kind, ExprKind::Id(_)) => {
            let base_ty = base.ty(symtab)?;
            let TypeKind::Bitfield(def) = base_ty.kind() else {
                bail_internal!("field write on {}", base_ty);
            };
            let Some(f) = def.field(field) else {
                bail_internal!("bitfield {} has no field {}", def.name, field);
            };
            let current = base.value(symtab)?.as_int().unwrap_or(0);
            splice(
                current,
                value.as_int().unwrap_or(0),
                f.msb as u128,
                f.lsb as u128,
            )?
        }
        _ => bail_unknown!("cannot model assignment to {}", target),
    };
    symtab.set_value(root, Some(new_value))?;
    Ok(())
}

/// Replace bits `m..=l` of `current` with `value`.
fn splice(current: u128, value: u128, m: u128, l: u128) -> ValueResult<Value> {
    if m < l || m >= 128 {
        bail_unknown!("invalid range [{}:{}]", m, l);
    }
    let field_mask = mask((m - l + 1) as u32) << l;
    Ok(Value::Int((current & !field_mask) | ((value << l) & field_mask)))
}
