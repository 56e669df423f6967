mod common;

use std::path::Path;

use anyhow::Error;
use common::{arch, setup};
use riscv_idl::{Binding, CompileError, Compiler};
use speculoos::prelude::*;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> Result<(), Error> {
    std::fs::write(dir.join(name), content)?;
    Ok(())
}

fn compiler() -> Compiler {
    setup();
    Compiler::new(arch("rv64"))
}

#[test]
fn test_includes_are_resolved() -> Result<(), Error> {
    let dir = TempDir::new()?;
    write(
        dir.path(),
        "main.isa",
        "include \"lib/defs.isa\"\ninclude \"lib/defs.isa\"\n\nBits<8> LAST = $bits(Color::Blue);\n",
    )?;
    std::fs::create_dir(dir.path().join("lib"))?;
    write(
        dir.path().join("lib").as_path(),
        "defs.isa",
        "enum Color {\n  Red\n  Green 4\n  Blue\n}\n\nfunction double {\n  returns Bits<8>\n  arguments Bits<8> x\n  body {\n    return x + x;\n  }\n}\n",
    )?;

    let isa = compiler().compile_file(dir.path().join("main.isa"))?;
    assert!(isa.symtab.is_frozen());
    assert_that!(isa.symtab.get_function("double")).is_some();
    assert!(matches!(isa.symtab.get("Color"), Some(Binding::Type(_))));
    let last = isa.symtab.get_var("LAST").map(|v| v.value.clone());
    assert_eq!(last, Some(Some(riscv_idl::Value::Int(5))));
    Ok(())
}

#[test]
fn test_include_cycle() -> Result<(), Error> {
    let dir = TempDir::new()?;
    write(dir.path(), "a.isa", "include \"b.isa\"\n")?;
    write(dir.path(), "b.isa", "include \"a.isa\"\n")?;

    let compiler = compiler();
    let err = compiler.compile_file(dir.path().join("a.isa")).unwrap_err();
    let Some(err) = err.as_type_error() else {
        panic!("expected a type error, found {}", err);
    };
    assert_that!(err.message).contains("includes itself");
    assert_that!(err.loc.file.as_ref()).ends_with("b.isa");
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = compiler()
        .compile_file("/nonexistent/riscv-idl/main.isa")
        .unwrap_err();
    assert!(matches!(err, CompileError::Io { .. }), "{:?}", err);
}

#[test]
fn test_syntax_error_line() -> Result<(), Error> {
    let dir = TempDir::new()?;
    write(
        dir.path(),
        "bad.isa",
        "Bits<8> A = 1;\nBits<8> B = 2;\nBits<8> C = ;\n",
    )?;
    let err = compiler()
        .compile_file(dir.path().join("bad.isa"))
        .unwrap_err();
    let CompileError::Parse { file, line, .. } = &err else {
        panic!("expected a syntax error, found {:?}", err);
    };
    assert_that!(file.as_str()).ends_with("bad.isa");
    assert_eq!(*line, 3);
    Ok(())
}

#[test]
fn test_type_errors_are_diagnosed() -> Result<(), Error> {
    let dir = TempDir::new()?;
    write(dir.path(), "main.isa", "Bits<8> A = 1;\nBoolean B = A;\n")?;
    let compiler = compiler();
    let err = compiler
        .compile_file(dir.path().join("main.isa"))
        .unwrap_err();
    let err = err.as_type_error().expect("not a type error");
    assert_eq!(err.loc.line, 2);
    let diagnostics = compiler.diagnostics().lock().unwrap();
    assert!(diagnostics.has_errors());
    Ok(())
}

#[test]
fn test_compile_source_with_include() -> Result<(), Error> {
    let dir = TempDir::new()?;
    write(dir.path(), "defs.isa", "Bits<8> ONE = 1;\n")?;
    let main = dir.path().join("main.isa");
    let isa = compiler().compile_source(
        &main.to_string_lossy(),
        "include \"defs.isa\"\nBits<8> TWO = ONE + 1;\n",
    )?;
    let two = isa.symtab.get_var("TWO").and_then(|v| v.value.clone());
    assert_eq!(two, Some(riscv_idl::Value::Int(2)));
    Ok(())
}

#[test]
fn test_compile_source_include_cycle() -> Result<(), Error> {
    let dir = TempDir::new()?;
    let source = "include \"defs.isa\"\nBits<8> TWO = 2;\n";
    write(dir.path(), "main.isa", source)?;
    write(dir.path(), "defs.isa", "include \"main.isa\"\nBits<8> ONE = 1;\n")?;
    let main = dir.path().join("main.isa");
    let err = compiler()
        .compile_source(&main.to_string_lossy(), source)
        .unwrap_err();
    let Some(err) = err.as_type_error() else {
        panic!("expected a type error, found {}", err);
    };
    assert_that!(err.message).contains("includes itself");
    assert_that!(err.loc.file.as_ref()).ends_with("defs.isa");
    Ok(())
}
