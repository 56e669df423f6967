//! Front-end of the compiler: IDL source text to (unchecked) AST.

use std::fmt::Debug;
use std::sync::Arc;

use pest::error::LineColLocation;
use pest::iterators::Pairs;
use pest::Parser;

use crate::ast::{
    BinaryOp, BitfieldDecl, Call, EnumDecl, Expr, ExprKind, FunctionDef, GlobalDef, IntLiteral,
    IsaAst, Loc, Stmt, StmtKind, SystemFunction, TypeName, TypedName, UnaryOp,
};
use crate::error::{CompileError, CompileResult, InternalError};

mod fold;

use fold::fold_binary;

/// This module exists because of a `pest`'s bug: https://github.com/pest-parser/pest/issues/326
#[allow(missing_docs)]
mod grammar {
    /// The IDL parser.
    #[derive(Parser)]
    #[grammar = "parser/idl.pest"]
    pub struct IdlParser;
}

use grammar::{IdlParser, Rule};

/// Helper type for lightening the types.
type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Parse a whole IDL file. `include`s are left unresolved.
pub fn parse_file(file: &str, source: &str) -> CompileResult<IsaAst> {
    let pair = parse(file, Rule::file, source)?;
    Builder::new(file).file(pair)
}

/// Parse a list of statements, such as a function body or an instruction operation.
pub fn parse_body(file: &str, source: &str) -> CompileResult<Vec<Stmt>> {
    let pair = parse(file, Rule::body_unit, source)?;
    let builder = Builder::new(file);
    pair.into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| builder.stmt(p))
        .collect()
}

pub fn parse_expression(file: &str, source: &str) -> CompileResult<Expr> {
    let pair = parse(file, Rule::expression_unit, source)?;
    let builder = Builder::new(file);
    builder.expression(first(pair)?)
}

fn parse<'a>(file: &str, rule: Rule, source: &'a str) -> CompileResult<Pair<'a>> {
    let mut pairs = IdlParser::parse(rule, source).map_err(|e| {
        let line = match &e.line_col {
            LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => *line,
        };
        CompileError::Parse {
            file: file.to_string(),
            line,
            message: e.variant.message().to_string(),
        }
    })?;
    pairs.next().ok_or_else(|| corrupted(rule))
}

fn corrupted(what: impl Debug) -> CompileError {
    InternalError::new(format!("corrupted parse tree at {:?}", what)).into()
}

fn next<'a>(pairs: &mut Pairs<'a, Rule>, what: &str) -> CompileResult<Pair<'a>> {
    pairs.next().ok_or_else(|| corrupted(what))
}

fn first(pair: Pair) -> CompileResult<Pair> {
    let rule = pair.as_rule();
    pair.into_inner().next().ok_or_else(|| corrupted(rule))
}

/// Converts parse tree nodes to AST nodes, all in the same file.
struct Builder {
    file: Arc<str>,
}

impl Builder {
    fn new(file: &str) -> Builder {
        Builder { file: file.into() }
    }

    fn loc(&self, pair: &Pair) -> Loc {
        let span = pair.as_span();
        Loc {
            file: self.file.clone(),
            line: span.start_pos().line_col().0 as u32,
            start: span.start(),
            end: span.end(),
        }
    }

    fn syntax_error(&self, pair: &Pair, message: String) -> CompileError {
        CompileError::Parse {
            file: self.file.to_string(),
            line: pair.as_span().start_pos().line_col().0,
            message,
        }
    }

    fn file(&self, pair: Pair) -> CompileResult<IsaAst> {
        let mut definitions = vec![];
        for pair in pair.into_inner() {
            let loc = self.loc(&pair);
            match pair.as_rule() {
                Rule::include => {
                    let path = self.string(&first(pair)?);
                    definitions.push(GlobalDef::Include { path, loc });
                }
                Rule::enum_def => definitions.push(GlobalDef::Enum(Arc::new(self.enum_def(pair)?))),
                Rule::bitfield_def => {
                    definitions.push(GlobalDef::Bitfield(Arc::new(self.bitfield_def(pair)?)))
                }
                Rule::function_def => {
                    definitions.push(GlobalDef::Function(Arc::new(self.function_def(pair)?)))
                }
                Rule::declaration => definitions.push(GlobalDef::Var(self.declaration(pair)?)),
                Rule::EOI => {}
                rule => return Err(corrupted(rule)),
            }
        }
        Ok(IsaAst { definitions })
    }

    fn enum_def(&self, pair: Pair) -> CompileResult<EnumDecl> {
        let loc = self.loc(&pair);
        let mut inner = pair.into_inner();
        let name = next(&mut inner, "enum name")?.as_str().to_string();
        let mut members = vec![];
        for member in inner {
            let mut parts = member.into_inner();
            let name = next(&mut parts, "enum member")?.as_str().to_string();
            let value = match parts.next() {
                Some(value) => Some(self.int_literal(&value)?.value),
                None => None,
            };
            members.push((name, value));
        }
        Ok(EnumDecl { name, members, loc })
    }

    fn bitfield_def(&self, pair: Pair) -> CompileResult<BitfieldDecl> {
        let loc = self.loc(&pair);
        let mut inner = pair.into_inner();
        let width = self.small_int(&next(&mut inner, "bitfield width")?)?;
        let name = next(&mut inner, "bitfield name")?.as_str().to_string();
        let mut fields = vec![];
        for field in inner {
            let mut parts = field.into_inner();
            let name = next(&mut parts, "field name")?.as_str().to_string();
            let msb = self.small_int(&next(&mut parts, "field msb")?)?;
            let lsb = match parts.next() {
                Some(lsb) => self.small_int(&lsb)?,
                None => msb,
            };
            fields.push((name, msb, lsb));
        }
        Ok(BitfieldDecl {
            name,
            width,
            fields,
            loc,
        })
    }

    fn function_def(&self, pair: Pair) -> CompileResult<FunctionDef> {
        let loc = self.loc(&pair);
        let mut def = FunctionDef {
            name: String::new(),
            templates: vec![],
            returns: vec![],
            args: vec![],
            description: None,
            body: None,
            builtin: false,
            loc,
        };
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::builtin_kw => def.builtin = true,
                Rule::func_name => def.name = part.as_str().to_string(),
                Rule::template_clause => def.templates = self.typed_names(part)?,
                Rule::arguments_clause => def.args = self.typed_names(part)?,
                Rule::returns_clause => {
                    def.returns = part
                        .into_inner()
                        .map(|t| self.type_name(t))
                        .collect::<CompileResult<_>>()?
                }
                Rule::description_clause => {
                    def.description = Some(first(part)?.as_str().trim().to_string())
                }
                Rule::body_clause => def.body = Some(self.block(first(part)?)?),
                rule => return Err(corrupted(rule)),
            }
        }
        Ok(def)
    }

    fn typed_names(&self, pair: Pair) -> CompileResult<Vec<TypedName>> {
        pair.into_inner()
            .map(|typed| -> CompileResult<TypedName> {
                let mut parts = typed.into_inner();
                let ty = self.type_name(next(&mut parts, "type")?)?;
                let name = next(&mut parts, "name")?.as_str().to_string();
                Ok(TypedName { ty, name })
            })
            .collect()
    }

    fn type_name(&self, pair: Pair) -> CompileResult<TypeName> {
        let inner = first(pair)?;
        Ok(match inner.as_rule() {
            Rule::bits_type => TypeName::Bits(Box::new(self.template_arg(first(inner)?)?)),
            Rule::builtin_type => match inner.as_str() {
                "XReg" => TypeName::XReg,
                "U32" => TypeName::U32,
                "U64" => TypeName::U64,
                "Boolean" => TypeName::Boolean,
                "String" => TypeName::String,
                other => return Err(corrupted(other)),
            },
            Rule::id => TypeName::Named(inner.as_str().to_string()),
            rule => return Err(corrupted(rule)),
        })
    }

    fn block(&self, pair: Pair) -> CompileResult<Vec<Stmt>> {
        pair.into_inner().map(|p| self.stmt(p)).collect()
    }

    fn stmt(&self, pair: Pair) -> CompileResult<Stmt> {
        let loc = self.loc(&pair);
        let kind = match pair.as_rule() {
            Rule::declaration => return self.declaration(pair),
            Rule::if_stmt => self.if_stmt(pair)?,
            Rule::for_stmt => {
                let mut inner = pair.into_inner();
                let init = self.declaration(next(&mut inner, "for init")?)?;
                let cond = self.expression(next(&mut inner, "for condition")?)?;
                let update = next(&mut inner, "for update")?;
                let update_loc = self.loc(&update);
                let update = match update.as_rule() {
                    Rule::step_update => self.step(update)?,
                    Rule::assign_update => self.assign(update)?,
                    rule => return Err(corrupted(rule)),
                };
                let body = self.block(next(&mut inner, "for body")?)?;
                StmtKind::For {
                    init: Box::new(init),
                    cond,
                    update: Box::new(Stmt::new(update, update_loc)),
                    body,
                }
            }
            Rule::return_stmt => StmtKind::Return(
                pair.into_inner()
                    .map(|e| self.expression(e))
                    .collect::<CompileResult<_>>()?,
            ),
            Rule::multi_assign => {
                let mut targets = vec![];
                let mut value = None;
                for part in pair.into_inner() {
                    match part.as_rule() {
                        Rule::dont_care => {
                            targets.push(Expr::new(ExprKind::DontCare, self.loc(&part)))
                        }
                        Rule::postfix => targets.push(self.postfix(part)?),
                        Rule::expression => value = Some(self.expression(part)?),
                        rule => return Err(corrupted(rule)),
                    }
                }
                StmtKind::MultiAssign {
                    targets,
                    value: value.ok_or_else(|| corrupted("multiple assignment value"))?,
                }
            }
            Rule::assignment => self.assign(pair)?,
            Rule::step_stmt => self.step(pair)?,
            Rule::call_stmt => StmtKind::Expr(self.expression(first(pair)?)?),
            rule => return Err(corrupted(rule)),
        };
        Ok(Stmt::new(kind, loc))
    }

    fn if_stmt(&self, pair: Pair) -> CompileResult<StmtKind> {
        let mut inner = pair.into_inner();
        let cond = self.expression(next(&mut inner, "if condition")?)?;
        let body = self.block(next(&mut inner, "if body")?)?;
        let orelse = match inner.next() {
            Some(else_clause) => {
                let branch = first(else_clause)?;
                match branch.as_rule() {
                    Rule::if_stmt => {
                        let loc = self.loc(&branch);
                        vec![Stmt::new(self.if_stmt(branch)?, loc)]
                    }
                    _ => self.block(branch)?,
                }
            }
            None => vec![],
        };
        Ok(StmtKind::If { cond, body, orelse })
    }

    fn assign(&self, pair: Pair) -> CompileResult<StmtKind> {
        let mut inner = pair.into_inner();
        let target = self.postfix(next(&mut inner, "assignment target")?)?;
        let value = self.expression(next(&mut inner, "assignment value")?)?;
        Ok(StmtKind::Assign { target, value })
    }

    fn step(&self, pair: Pair) -> CompileResult<StmtKind> {
        let mut inner = pair.into_inner();
        let target = next(&mut inner, "step target")?.as_str().to_string();
        let decrement = next(&mut inner, "step operator")?.as_str() == "--";
        Ok(StmtKind::Step { target, decrement })
    }

    fn declaration(&self, pair: Pair) -> CompileResult<Stmt> {
        let loc = self.loc(&pair);
        let mut inner = pair.into_inner();
        let mut ty = self.type_name(next(&mut inner, "declaration type")?)?;
        let mut names = vec![];
        let mut init = None;
        for part in inner {
            match part.as_rule() {
                Rule::decl_name => {
                    let name_loc = part.clone();
                    let mut parts = part.into_inner();
                    names.push(next(&mut parts, "declared name")?.as_str().to_string());
                    if let Some(suffix) = parts.next() {
                        if names.len() > 1 || matches!(ty, TypeName::Array(..)) {
                            return Err(self.syntax_error(
                                &name_loc,
                                "an array declaration declares a single variable".into(),
                            ));
                        }
                        let len = self.expression(first(suffix)?)?;
                        ty = TypeName::Array(Box::new(ty), Box::new(len));
                    } else if matches!(ty, TypeName::Array(..)) {
                        return Err(self.syntax_error(
                            &name_loc,
                            "an array declaration declares a single variable".into(),
                        ));
                    }
                }
                Rule::expression => init = Some(self.expression(part)?),
                rule => return Err(corrupted(rule)),
            }
        }
        Ok(Stmt::new(StmtKind::Decl { ty, names, init }, loc))
    }

    fn expression(&self, pair: Pair) -> CompileResult<Expr> {
        match pair.as_rule() {
            Rule::expression => self.expression(first(pair)?),
            Rule::ternary => {
                let loc = self.loc(&pair);
                let mut inner = pair.into_inner();
                let cond = self.binary(next(&mut inner, "condition")?)?;
                match inner.next() {
                    Some(then) => {
                        let then = self.expression(then)?;
                        let orelse = self.expression(next(&mut inner, "else value")?)?;
                        Ok(Expr::new(
                            ExprKind::Ternary {
                                cond: Box::new(cond),
                                then: Box::new(then),
                                orelse: Box::new(orelse),
                            },
                            loc,
                        ))
                    }
                    None => Ok(cond),
                }
            }
            rule => Err(corrupted(rule)),
        }
    }

    /// A `binary` or `template_arg`: operands separated by operators.
    fn binary(&self, pair: Pair) -> CompileResult<Expr> {
        let mut inner = pair.into_inner();
        let first = self.unary(next(&mut inner, "operand")?)?;
        let mut rest = vec![];
        while let Some(op) = inner.next() {
            let op = BinaryOp::from_token(op.as_str()).ok_or_else(|| corrupted(op.as_str()))?;
            rest.push((op, self.unary(next(&mut inner, "operand")?)?));
        }
        Ok(fold_binary(first, rest))
    }

    fn template_arg(&self, pair: Pair) -> CompileResult<Expr> {
        self.binary(pair)
    }

    fn unary(&self, pair: Pair) -> CompileResult<Expr> {
        let loc = self.loc(&pair);
        let mut ops = vec![];
        let mut operand = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::unary_op => ops.push(match part.as_str() {
                    "-" => UnaryOp::Neg,
                    "~" => UnaryOp::Not,
                    _ => UnaryOp::LogicalNot,
                }),
                Rule::postfix => operand = Some(self.postfix(part)?),
                rule => return Err(corrupted(rule)),
            }
        }
        let mut expr = operand.ok_or_else(|| corrupted("unary operand"))?;
        for op in ops.into_iter().rev() {
            expr = Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(expr),
                },
                loc.clone(),
            );
        }
        Ok(expr)
    }

    fn postfix(&self, pair: Pair) -> CompileResult<Expr> {
        let mut inner = pair.into_inner();
        let mut expr = self.primary(next(&mut inner, "primary")?)?;
        for op in inner {
            let loc = Loc {
                end: op.as_span().end(),
                ..expr.loc.clone()
            };
            let base = Box::new(expr);
            let kind = match op.as_rule() {
                Rule::index_op => ExprKind::Index {
                    base,
                    index: Box::new(self.expression(first(op)?)?),
                },
                Rule::range_op => {
                    let mut parts = op.into_inner();
                    ExprKind::Range {
                        base,
                        msb: Box::new(self.expression(next(&mut parts, "msb")?)?),
                        lsb: Box::new(self.expression(next(&mut parts, "lsb")?)?),
                    }
                }
                Rule::field_op => ExprKind::Field {
                    base,
                    field: first(op)?.as_str().to_string(),
                },
                rule => return Err(corrupted(rule)),
            };
            expr = Expr::new(kind, loc);
        }
        Ok(expr)
    }

    fn primary(&self, pair: Pair) -> CompileResult<Expr> {
        let loc = self.loc(&pair);
        let kind = match pair.as_rule() {
            Rule::paren => ExprKind::Paren(Box::new(self.expression(first(pair)?)?)),
            Rule::replication => {
                let mut inner = pair.into_inner();
                ExprKind::Replicate {
                    count: Box::new(self.expression(next(&mut inner, "count")?)?),
                    value: Box::new(self.expression(next(&mut inner, "value")?)?),
                }
            }
            Rule::concat => ExprKind::Concat(
                pair.into_inner()
                    .map(|e| self.expression(e))
                    .collect::<CompileResult<_>>()?,
            ),
            Rule::int_lit => ExprKind::Int(self.int_literal(&pair)?),
            Rule::bool_lit => ExprKind::Bool(pair.as_str() == "true"),
            Rule::string_lit => ExprKind::String(self.string(&pair)),
            Rule::sys_call => {
                let mut inner = pair.into_inner();
                let name = next(&mut inner, "system function")?;
                ExprKind::System {
                    function: SystemFunction::from_name(name.as_str())
                        .ok_or_else(|| corrupted(name.as_str()))?,
                    arg: Box::new(self.expression(next(&mut inner, "argument")?)?),
                }
            }
            Rule::enum_info => {
                let mut inner = pair.into_inner();
                let name = next(&mut inner, "system function")?;
                ExprKind::EnumInfo {
                    function: SystemFunction::from_name(name.as_str())
                        .ok_or_else(|| corrupted(name.as_str()))?,
                    class: next(&mut inner, "enum")?.as_str().to_string(),
                }
            }
            Rule::pc => ExprKind::Pc,
            Rule::csr_call => {
                let mut inner = pair.into_inner();
                ExprKind::CsrCall {
                    csr: next(&mut inner, "CSR")?.as_str().to_string(),
                    function: next(&mut inner, "CSR function")?.as_str().to_string(),
                }
            }
            Rule::csr_ref => ExprKind::Csr(first(pair)?.as_str().to_string()),
            Rule::enum_ref => {
                let mut inner = pair.into_inner();
                ExprKind::EnumRef {
                    class: next(&mut inner, "enum")?.as_str().to_string(),
                    member: next(&mut inner, "enum member")?.as_str().to_string(),
                }
            }
            Rule::template_call | Rule::call => {
                let mut call = Call {
                    name: String::new(),
                    template_args: None,
                    args: vec![],
                };
                for part in pair.into_inner() {
                    match part.as_rule() {
                        Rule::func_name => call.name = part.as_str().to_string(),
                        Rule::template_args => {
                            call.template_args = Some(
                                part.into_inner()
                                    .map(|a| self.template_arg(a))
                                    .collect::<CompileResult<_>>()?,
                            )
                        }
                        Rule::call_args => {
                            call.args = part
                                .into_inner()
                                .map(|a| self.expression(a))
                                .collect::<CompileResult<_>>()?
                        }
                        rule => return Err(corrupted(rule)),
                    }
                }
                ExprKind::Call(call)
            }
            Rule::id => ExprKind::Id(pair.as_str().to_string()),
            rule => return Err(corrupted(rule)),
        };
        Ok(Expr::new(kind, loc))
    }

    fn int_literal(&self, pair: &Pair) -> CompileResult<IntLiteral> {
        IntLiteral::parse(pair.as_str()).map_err(|message| self.syntax_error(pair, message))
    }

    fn small_int(&self, pair: &Pair) -> CompileResult<u32> {
        let value = self.int_literal(pair)?.value;
        u32::try_from(value)
            .map_err(|_| self.syntax_error(pair, format!("{} is too large", pair.as_str())))
    }

    fn string(&self, pair: &Pair) -> String {
        let text = pair.as_str();
        text.strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_expression_precedence() {
        let expr = parse_expression("test", "a + b * c == d && !e").unwrap();
        assert_eq!(expr.to_idl(), "a + b * c == d && !e");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::LogicalAnd,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_postfix_and_literals() {
        let expr = parse_expression("test", "X[rs1][XLEN-1:0] + 12'sb1111_0000_0000").unwrap();
        assert_eq!(expr.to_idl(), "X[rs1][XLEN - 1:0] + 12'sb1111_0000_0000");
        let expr = parse_expression("test", "CSR[mstatus].SXL").unwrap();
        assert!(matches!(expr.kind, ExprKind::Field { .. }));
        let expr = parse_expression("test", "CSR[mtvec].address()").unwrap();
        assert!(matches!(expr.kind, ExprKind::CsrCall { .. }));
    }

    #[test]
    fn test_parse_calls() {
        let expr = parse_expression("test", "implemented?(ExtensionName::C)").unwrap();
        let ExprKind::Call(call) = &expr.kind else {
            panic!("not a call: {:?}", expr);
        };
        assert_eq!(call.name, "implemented?");
        assert!(call.template_args.is_none());
        let expr = parse_expression("test", "sext<XLEN - 1>(a, 12)").unwrap();
        let ExprKind::Call(call) = &expr.kind else {
            panic!("not a call: {:?}", expr);
        };
        assert_eq!(call.template_args.as_ref().map(|a| a.len()), Some(1));
        assert_eq!(call.args.len(), 2);
        let expr = parse_expression("test", "a < b").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn test_parse_concat_and_replication() {
        let expr = parse_expression("test", "{a, {XLEN{1'b0}}, b[3]}").unwrap();
        let ExprKind::Concat(items) = &expr.kind else {
            panic!("not a concatenation: {:?}", expr);
        };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1].kind, ExprKind::Replicate { .. }));
    }

    #[test]
    fn test_parse_body() {
        let body = parse_body(
            "test",
            r#"
            # comment
            Bits<8> a, b;
            XReg table[4];
            (a, -) = f();
            for (U32 i = 0; i < 4; i++) {
                if (i == 2) {
                    a = a + 1;
                } else if (i == 3) {
                    b = b - 1;
                } else {
                    table[i] = 0;
                }
            }
            return a;
            "#,
        )
        .unwrap();
        assert_eq!(body.len(), 5);
        assert!(matches!(body[1].kind, StmtKind::Decl { ty: TypeName::Array(..), .. }));
        let StmtKind::MultiAssign { targets, .. } = &body[2].kind else {
            panic!("not a multiple assignment: {:?}", body[2]);
        };
        assert_eq!(targets[1].kind, ExprKind::DontCare);
        let StmtKind::For { update, body: for_body, .. } = &body[3].kind else {
            panic!("not a for loop: {:?}", body[3]);
        };
        assert!(matches!(update.kind, StmtKind::Step { decrement: false, .. }));
        let StmtKind::If { orelse, .. } = &for_body[0].kind else {
            panic!("not an if: {:?}", for_body[0]);
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_parse_file() {
        let ast = parse_file(
            "isa.idl",
            r#"
            include "other.idl"

            enum ExtensionName { A B C }

            bitfield (64) Satp {
              MODE 63-60
              ASID 59-44
              PPN 43-0
            }

            Bits<32> Answer = 42;

            builtin function implemented? {
              returns Boolean
              arguments ExtensionName ext
              description { Whether the extension is implemented. }
            }

            function sext {
              template U32 N
              returns XReg
              arguments XReg value
              body {
                return value;
              }
            }
            "#,
        )
        .unwrap();
        assert_eq!(ast.definitions.len(), 6);
        assert!(matches!(
            &ast.definitions[0],
            GlobalDef::Include { path, .. } if path == "other.idl"
        ));
        let GlobalDef::Function(builtin) = &ast.definitions[4] else {
            panic!("not a function: {:?}", ast.definitions[4]);
        };
        assert!(builtin.builtin);
        assert_eq!(builtin.description.as_deref(), Some("Whether the extension is implemented."));
        assert_eq!(ast.functions().count(), 2);
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse_body("op.idl", "a = 1;\nb = ;\n").unwrap_err();
        let CompileError::Parse { file, line, .. } = &err else {
            panic!("not a syntax error: {:?}", err);
        };
        assert_eq!(file, "op.idl");
        assert_eq!(*line, 2);
    }

    #[test]
    fn test_to_idl_reparses() {
        let source = "if (a == 1) {\n  b = {a, 2'b01};\n} else {\n  b = a[3:0] `+ 1;\n}";
        let body = parse_body("test", source).unwrap();
        let printed = body[0].to_idl();
        assert_eq!(printed, source);
        assert_eq!(parse_body("test", &printed).unwrap()[0].to_idl(), printed);
    }
}
