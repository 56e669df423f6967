use std::sync::Arc;

use riscv_idl::arch::{Architecture, ConfiguredArchitecture};
use riscv_idl::ast::{Checked, Expr, FunctionBody, InstOperation};
use riscv_idl::diagnostics::DiagnosticLevel;
use riscv_idl::{
    Binding, CompileError, CompiledIsa, Compiler, SymbolTable, Type, TypeError, Value, Var,
};

use crate::common::{arch, setup, test_file};

/// Interface for testing IDL code: the shared definitions of `tests/isa/globals.isa` compiled
/// against one of the test configurations.
#[derive(Debug)]
pub struct TestIsa {
    pub arch: Arc<ConfiguredArchitecture>,
    pub compiler: Compiler,
    pub isa: CompiledIsa,
}

/// A compiled expression under test.
#[derive(Debug)]
pub struct TestExpression<'a> {
    isa: &'a TestIsa,
    symtab: SymbolTable,
    expr: Checked<Expr>,
}

impl TestIsa {
    pub fn load(config: &str) -> Self {
        setup();
        let arch = arch(config);
        let compiler = Compiler::new(arch.clone());
        let isa = match compiler.compile_file(test_file("isa/globals.isa")) {
            Ok(isa) => isa,
            Err(e) => panic!("globals.isa does not compile: {}", e),
        };
        TestIsa {
            arch,
            compiler,
            isa,
        }
    }

    pub fn symtab(&self) -> &SymbolTable {
        &self.isa.symtab
    }

    /// Compile an expression in the global scope.
    pub fn expression(&self, source: &str) -> TestExpression<'_> {
        self.expression_in(source, self.symtab().deep_clone())
    }

    /// Compile an expression in the given scope.
    pub fn expression_in(&self, source: &str, symtab: SymbolTable) -> TestExpression<'_> {
        let expr = match self.compiler.compile_expression(source, &symtab) {
            Ok(expr) => expr,
            Err(e) => panic!("'{}' does not compile: {}", source, e),
        };
        TestExpression {
            isa: self,
            symtab,
            expr,
        }
    }

    /// The type error of an expression that must not compile.
    pub fn expression_error(&self, source: &str) -> TypeError {
        match self.compiler.compile_expression(source, self.symtab()) {
            Ok(expr) => panic!("'{}' compiled to {:?}", source, expr),
            Err(CompileError::Type(e)) => e,
            Err(e) => panic!("'{}' failed with a non type error: {}", source, e),
        }
    }

    /// Compile a function body with the given return types and unknown `Bits<64>` arguments.
    pub fn body(&self, source: &str, returns: Vec<Type>, args: &[&str]) -> Checked<FunctionBody> {
        match self.compile_body(source, returns, args) {
            Ok(body) => body,
            Err(e) => panic!("Body does not compile: {}\n{}", e, source),
        }
    }

    /// The type error of a function body that must not compile.
    pub fn body_error(&self, source: &str) -> TypeError {
        match self.compile_body(source, vec![], &[]) {
            Ok(_) => panic!("Body compiled: {}", source),
            Err(CompileError::Type(e)) => e,
            Err(e) => panic!("Body failed with a non type error: {}", e),
        }
    }

    fn compile_body(
        &self,
        source: &str,
        returns: Vec<Type>,
        args: &[&str],
    ) -> Result<Checked<FunctionBody>, CompileError> {
        let extra = args
            .iter()
            .map(|name| {
                let var = Var::new(*name, Type::bits(64), None);
                (name.to_string(), Binding::Var(var))
            })
            .collect();
        self.compiler
            .compile_func_body(source, returns, self.symtab(), "test", Some("tests"), extra)
    }

    /// Compile the operation of one of the instructions of the configuration.
    pub fn operation(&self, inst: &str) -> Checked<InstOperation> {
        let Some(def) = self.arch.instruction(inst) else {
            panic!("No instruction {} in {}", inst, self.arch.name());
        };
        match self.compiler.compile_inst_operation(&def, self.symtab()) {
            Ok(op) => op,
            Err(e) => panic!("Operation of {} does not compile: {}", inst, e),
        }
    }

    /// Messages of the warnings emitted so far.
    pub fn warnings(&self) -> Vec<String> {
        let diagnostics = self.compiler.diagnostics().lock().unwrap();
        let warnings = diagnostics
            .with_level(DiagnosticLevel::Warning)
            .map(|d| d.message().to_string())
            .collect();
        warnings
    }
}

impl<'a> TestExpression<'a> {
    pub fn expr(&self) -> &Checked<Expr> {
        &self.expr
    }

    pub fn type_is(self, expected: &str) -> Self {
        let ty = self.expr.type_of(&self.symtab).unwrap();
        assert_eq!(ty.unqualified().to_string(), expected, "type of {}", *self.expr);
        self
    }

    pub fn value_is(self, expected: Value) -> Self {
        let value = self.expr.value(&self.symtab);
        assert!(
            matches!(&value, Ok(v) if *v == expected),
            "value of {}: expected {}, found {:?}",
            *self.expr,
            expected,
            value
        );
        self
    }

    pub fn int_value_is(self, expected: u128) -> Self {
        self.value_is(Value::Int(expected))
    }

    pub fn bool_value_is(self, expected: bool) -> Self {
        self.value_is(Value::Bool(expected))
    }

    pub fn unknown(self) -> Self {
        let value = self.expr.value(&self.symtab);
        assert!(
            matches!(value, Err(riscv_idl::ValueError::Unknown(_))),
            "value of {} should not be known, found {:?}",
            *self.expr,
            value
        );
        self
    }

    pub fn warns(self, fragment: &str) -> Self {
        let warnings = self.isa.warnings();
        assert!(
            warnings.iter().any(|w| w.contains(fragment)),
            "no warning containing '{}' in {:?}",
            fragment,
            warnings
        );
        self
    }
}
