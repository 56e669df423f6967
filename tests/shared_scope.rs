mod common;

use std::thread;

use common::TestIsa;
use riscv_idl::passes::reachable_exceptions;
use riscv_idl::{parse_body, parse_expression};
use speculoos::prelude::*;

#[test]
fn test_global_scope_is_frozen() {
    let isa = TestIsa::load("rv64");
    assert!(isa.symtab().is_frozen());
    assert_eq!(isa.symtab().levels(), 1);

    let mut copy = isa.symtab().deep_clone();
    assert!(copy.is_frozen());
    assert!(copy
        .add("NEW_GLOBAL", riscv_idl::Binding::Type(riscv_idl::Type::boolean()))
        .is_err());
    copy.push();
    assert!(copy
        .add("local", riscv_idl::Binding::Type(riscv_idl::Type::boolean()))
        .is_ok());
    assert!(isa.symtab().get("local").is_none());
}

#[test]
fn test_checking_leaves_scopes_balanced() {
    let isa = TestIsa::load("rv64");
    let mut scope = isa.symtab().deep_clone();
    scope.push();
    let source = "Bits<64> x = 1;\nif (x == 1) {\n  Bits<64> y = x;\n  x = y + 1;\n}\nfor (U32 i = 0; i < 4; i++) {\n  x = x + i;\n}";
    for stmt in parse_body("balanced", source).unwrap() {
        stmt.type_check(&mut scope).unwrap();
    }
    assert_eq!(scope.levels(), 2);
    scope.pop().unwrap();
    assert_eq!(scope.levels(), 1);

    let error = isa.body_error("Bits<64> x = 1;\nif (x == 1) {\n  Boolean b = x;\n}");
    assert_that!(error.loc.line).is_equal_to(3);
    assert_eq!(isa.symtab().levels(), 1);
}

#[test]
fn test_concurrent_compilation() {
    let isa = TestIsa::load("all_bases");
    let names = ["add", "trap_on_zero", "lw", "jump"];
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let isa = &isa;
                s.spawn(move || {
                    let op = isa.operation(name);
                    reachable_exceptions(&op).unwrap().mask()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let sequential: Vec<_> = names
        .iter()
        .map(|name| reachable_exceptions(&isa.operation(name)).unwrap().mask())
        .collect();
    assert_eq!(results, sequential);
    assert_eq!(results[2], 1 << 4);
}

#[test]
fn test_expression_to_idl_round_trip() {
    let isa = TestIsa::load("rv64");
    for source in [
        "XLEN == 64",
        "{RA_INDEX, 3'b101}",
        "(5'd31 `+ 5'd2) >> 1",
        "(XLEN == 64) ? 8'd1 : 8'd2",
        "zext<8>(8'd200)",
        "CSR[mvendorid].OFFSET",
        "$enum_size(ExceptionCode)",
    ] {
        let first = isa.expression(source);
        let idl = first.expr().to_idl();
        let second = isa.expression(&idl);
        let symtab = isa.symtab();
        assert_eq!(
            first.expr().type_of(symtab).unwrap().to_string(),
            second.expr().type_of(symtab).unwrap().to_string(),
            "type of {} printed as {}",
            source,
            idl
        );
        assert_eq!(
            first.expr().value(symtab).ok(),
            second.expr().value(symtab).ok(),
            "value of {} printed as {}",
            source,
            idl
        );
        assert!(parse_expression("printed", &idl).is_ok());
    }
}

#[test]
fn test_operation_to_idl_round_trip() {
    let isa = TestIsa::load("rv64");
    for name in ["add", "trap_on_zero", "lw", "jump"] {
        let op = isa.operation(name);
        let stmts = parse_body(name, &op.to_idl()).unwrap();
        let rechecked = isa
            .compiler
            .type_check(&stmts, &op.symtab, "printed operation");
        assert!(rechecked.is_ok(), "{}: {:?}", name, rechecked.err());
    }
}

#[test]
fn test_values_are_deterministic() {
    let isa = TestIsa::load("rv64");
    let expr = isa.expression("add_two(64'd40) + $bits(ExtensionName::M)");
    let first = expr.expr().value(isa.symtab()).unwrap();
    for _ in 0..8 {
        assert_eq!(expr.expr().value(isa.symtab()).unwrap(), first);
    }
    assert_eq!(first, riscv_idl::Value::Int(47));
}
