//! The driver: every way of turning IDL source into a checked AST goes through a [`Compiler`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use idl_arch::{Architecture, InstructionDef};
use idl_diagnostics::DiagnosticContext;

use crate::ast::{
    add_unique, Checked, Expr, FunctionBody, GlobalDef, InstOperation, IsaAst, Loc, Stmt,
};
use crate::error::{CompileError, CompileResult, TypeError};
use crate::parser::{parse_body, parse_expression, parse_file};
use crate::symtab::{Binding, SymbolTable, Var};
use crate::types::Type;

/// File name used in the locations of expressions compiled with
/// [`Compiler::compile_expression`].
pub const EXPRESSION_FILE: &str = "<expression>";

/// The result of compiling a whole IDL file: the definitions and the frozen global scope they
/// populate.
#[derive(Debug, Clone)]
pub struct CompiledIsa {
    pub ast: Checked<IsaAst>,
    pub symtab: SymbolTable,
}

/// The context every compile unit is compiled in: the target configuration and where the
/// diagnostics go.
#[derive(Debug, Clone)]
pub struct Compiler {
    arch: Arc<dyn Architecture>,
    diagnostics: Arc<Mutex<DiagnosticContext>>,
}

/// An AST that can be checked again against another scope, see [`Compiler::type_check`].
pub trait TypeCheck: Sized {
    /// Check the node, returning it with whatever scope it keeps updated to `symtab`.
    fn check_against(self, symtab: &SymbolTable) -> CompileResult<Self>;
}

impl Compiler {
    pub fn new(arch: Arc<dyn Architecture>) -> Compiler {
        Compiler {
            arch,
            diagnostics: Default::default(),
        }
    }

    pub fn arch(&self) -> &Arc<dyn Architecture> {
        &self.arch
    }

    /// Warnings and errors of every compile unit so far.
    pub fn diagnostics(&self) -> &Arc<Mutex<DiagnosticContext>> {
        &self.diagnostics
    }

    /// A symbol table with only the builtin globals of the configuration.
    pub fn symtab(&self) -> SymbolTable {
        SymbolTable::new(self.arch.clone(), self.diagnostics.clone())
    }

    /// Compile a whole IDL file, following its includes, into a frozen AST and global scope.
    pub fn compile_file<P: AsRef<Path>>(&self, path: P) -> CompileResult<CompiledIsa> {
        let path = path.as_ref();
        debug!("Compiling {}", path.display());
        let mut sources = HashMap::new();
        let mut loader = IncludeLoader::default();
        let definitions = loader.load(path, None, &mut sources)?;
        let result = self.compile_definitions(IsaAst { definitions });
        self.record(result, |file| sources.get(file).map(|s| s.as_str()))
    }

    /// Compile IDL source not read from disk. Includes are resolved relative to the directory of
    /// `name`.
    pub fn compile_source(&self, name: &str, source: &str) -> CompileResult<CompiledIsa> {
        debug!("Compiling {}", name);
        let ast = parse_file(name, source)?;
        let mut sources = HashMap::new();
        sources.insert(name.to_string(), source.to_string());
        let base = Path::new(name).parent().unwrap_or(Path::new(""));
        let mut loader = IncludeLoader::default();
        loader.enter_in_memory(Path::new(name));
        let mut definitions = vec![];
        for def in ast.definitions {
            match def {
                GlobalDef::Include { path, loc } => {
                    definitions.extend(loader.load(&base.join(path), Some(&loc), &mut sources)?)
                }
                def => definitions.push(def),
            }
        }
        let result = self.compile_definitions(IsaAst { definitions });
        self.record(result, |file| sources.get(file).map(|s| s.as_str()))
    }

    fn compile_definitions(&self, ast: IsaAst) -> CompileResult<CompiledIsa> {
        let mut symtab = self.symtab();
        for def in &ast.definitions {
            match def {
                GlobalDef::Enum(decl) => {
                    let ty = Type::enum_ref(Arc::new(decl.to_def()?));
                    add_unique(&mut symtab, &decl.name, Binding::Type(ty), &decl.loc)?;
                }
                GlobalDef::Bitfield(decl) => {
                    let ty = Type::bitfield(Arc::new(decl.to_def()?));
                    add_unique(&mut symtab, &decl.name, Binding::Type(ty), &decl.loc)?;
                }
                _ => {}
            }
        }
        for def in ast.functions() {
            match (&def.body, def.builtin) {
                (None, false) => bail_type!(&def.loc, "function {} has no body", def.name),
                (Some(_), true) => {
                    bail_type!(&def.loc, "builtin function {} cannot have a body", def.name)
                }
                _ => {}
            }
            add_unique(
                &mut symtab,
                &def.name,
                Binding::Function(def.clone()),
                &def.loc,
            )?;
        }
        for def in &ast.definitions {
            match def {
                GlobalDef::Var(stmt) => stmt.type_check(&mut symtab)?,
                GlobalDef::Include { loc, .. } => {
                    bail_internal!("unresolved include at {}", loc)
                }
                _ => {}
            }
        }
        for def in ast.functions() {
            if !def.builtin && !def.is_template() {
                def.type_check_body(&symtab, &[])?;
            }
        }
        symtab.deep_freeze()?;
        debug!(
            "Compiled {} global definitions, {} functions",
            ast.definitions.len(),
            ast.functions().count()
        );
        Ok(CompiledIsa {
            ast: Checked::new(ast),
            symtab,
        })
    }

    /// Compile the body of a function against an independent copy of `symtab`, with
    /// `extra_symbols` (for example the arguments) in scope.
    pub fn compile_func_body(
        &self,
        source: &str,
        return_types: Vec<Type>,
        symtab: &SymbolTable,
        name: &str,
        parent: Option<&str>,
        extra_symbols: Vec<(String, Binding)>,
    ) -> CompileResult<Checked<FunctionBody>> {
        let file = match parent {
            Some(parent) => format!("{}::{}", parent, name),
            None => name.to_string(),
        };
        debug!("Compiling function body {}", file);
        let result = (|| -> CompileResult<_> {
            let stmts = parse_body(&file, source)?;
            let mut scope = symtab.deep_clone();
            scope.push();
            let loc = Loc::synthetic(&file);
            for (symbol, binding) in extra_symbols {
                add_unique(&mut scope, &symbol, binding, &loc)?;
            }
            let body = FunctionBody {
                name: name.to_string(),
                stmts,
                returns: return_types,
                symtab: scope,
            };
            Ok(Checked::new(body.check_against_own()?))
        })();
        self.record(result, |_| Some(source))
    }

    /// Compile the operation of an instruction, with its decode variables in scope.
    pub fn compile_inst_operation(
        &self,
        inst: &InstructionDef,
        symtab: &SymbolTable,
    ) -> CompileResult<Checked<InstOperation>> {
        debug!("Compiling operation of {}", inst.name);
        let loc = Loc::synthetic(&inst.name);
        let Some(source) = &inst.operation else {
            bail_type!(&loc, "instruction {} has no operation", inst.name);
        };
        let result = (|| -> CompileResult<_> {
            let stmts = parse_body(&inst.name, source)?;
            let mut scope = symtab.deep_clone();
            scope.push();
            for var in inst.decode_variables() {
                let width = var.width().map_err(|e| {
                    TypeError::new(&loc, format!("decode variable {}: {:#}", var.name, e))
                })?;
                let ty = Type::bits(width).make_const();
                let ty = if var.sign_extend { ty.make_signed() } else { ty };
                let decode_var = Var {
                    decode_var: true,
                    ..Var::new(var.name.clone(), ty, None)
                };
                add_unique(&mut scope, &var.name, Binding::Var(decode_var), &loc)?;
            }
            let op = InstOperation {
                name: inst.name.clone(),
                stmts,
                symtab: scope,
            };
            Ok(Checked::new(op.check_against_own()?))
        })();
        self.record(result, |_| Some(source.as_str()))
    }

    /// Compile a standalone expression.
    pub fn compile_expression(
        &self,
        source: &str,
        symtab: &SymbolTable,
    ) -> CompileResult<Checked<Expr>> {
        debug!("Compiling expression {}", source);
        let result = (|| -> CompileResult<_> {
            let expr = parse_expression(EXPRESSION_FILE, source)?;
            expr.type_check(symtab)?;
            Ok(Checked::new(expr))
        })();
        self.record(result, |_| Some(source))
    }

    /// Check an already built AST again, against `symtab`. Used after specializing an AST for a
    /// configuration.
    pub fn type_check<T: TypeCheck + Clone>(
        &self,
        ast: &T,
        symtab: &SymbolTable,
        description: &str,
    ) -> CompileResult<Checked<T>> {
        debug!("Type checking {}", description);
        let result = ast.clone().check_against(symtab).map(Checked::new);
        if let Err(e) = &result {
            debug!("Type check of {} failed: {}", description, e);
        }
        self.record(result, |_| None)
    }

    /// Log the type errors and add them to the diagnostics.
    fn record<'s, T, F>(&self, result: CompileResult<T>, source_of: F) -> CompileResult<T>
    where
        F: Fn(&str) -> Option<&'s str>,
    {
        if let Err(CompileError::Type(e)) = &result {
            warn!("{}", e);
            if let Ok(mut diagnostics) = self.diagnostics.lock() {
                diagnostics.add_diagnostic(e.to_diagnostic(source_of(&*e.loc.file)));
            }
        }
        result
    }
}

impl FunctionBody {
    fn check_against_own(self) -> CompileResult<FunctionBody> {
        let mut scope = self.symtab.clone();
        self.check(&mut scope)?;
        Ok(FunctionBody {
            symtab: scope,
            ..self
        })
    }
}

impl InstOperation {
    fn check_against_own(self) -> CompileResult<InstOperation> {
        let mut scope = self.symtab.clone();
        self.check(&mut scope)?;
        Ok(InstOperation {
            symtab: scope,
            ..self
        })
    }
}

impl TypeCheck for Expr {
    fn check_against(self, symtab: &SymbolTable) -> CompileResult<Self> {
        self.type_check(symtab)?;
        Ok(self)
    }
}

impl TypeCheck for Vec<Stmt> {
    fn check_against(self, symtab: &SymbolTable) -> CompileResult<Self> {
        let mut scope = symtab.deep_clone();
        scope.scoped(|scope| -> CompileResult<()> {
            for stmt in &self {
                stmt.type_check(scope)?;
            }
            Ok(())
        })?;
        Ok(self)
    }
}

impl TypeCheck for FunctionBody {
    fn check_against(self, symtab: &SymbolTable) -> CompileResult<Self> {
        FunctionBody {
            symtab: symtab.deep_clone(),
            ..self
        }
        .check_against_own()
    }
}

impl TypeCheck for InstOperation {
    fn check_against(self, symtab: &SymbolTable) -> CompileResult<Self> {
        InstOperation {
            symtab: symtab.deep_clone(),
            ..self
        }
        .check_against_own()
    }
}

/// Resolves `include`s, each file at most once.
#[derive(Default)]
struct IncludeLoader {
    /// Files being loaded, to detect cycles.
    stack: Vec<PathBuf>,
    loaded: HashSet<PathBuf>,
}

impl IncludeLoader {
    /// Track `path`, whose source is already in memory, as being loaded. A name that is not a
    /// file on disk cannot be included again, so it is left out.
    fn enter_in_memory(&mut self, path: &Path) {
        if let Ok(canonical) = path.canonicalize() {
            self.loaded.insert(canonical.clone());
            self.stack.push(canonical);
        }
    }

    fn load(
        &mut self,
        path: &Path,
        from: Option<&Loc>,
        sources: &mut HashMap<String, String>,
    ) -> CompileResult<Vec<GlobalDef>> {
        let io_error = |source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let canonical = path.canonicalize().map_err(io_error)?;
        if self.stack.contains(&canonical) {
            let loc = from.cloned().unwrap_or_else(|| Loc::synthetic(&path.to_string_lossy()));
            bail_type!(&loc, "{} includes itself", path.display());
        }
        if !self.loaded.insert(canonical.clone()) {
            trace!("{} already included", path.display());
            return Ok(vec![]);
        }
        let source = std::fs::read_to_string(path).map_err(io_error)?;
        let name = path.to_string_lossy().to_string();
        let ast = parse_file(&name, &source)?;
        sources.insert(name, source);
        self.stack.push(canonical);
        let base = path.parent().unwrap_or(Path::new(""));
        let mut definitions = vec![];
        for def in ast.definitions {
            match def {
                GlobalDef::Include { path, loc } => {
                    debug!("Including {} from {}", path, loc);
                    definitions.extend(self.load(&base.join(path), Some(&loc), sources)?);
                }
                def => definitions.push(def),
            }
        }
        self.stack.pop();
        Ok(definitions)
    }
}
