mod common;

use common::TestIsa;
use pretty_assertions::assert_eq;
use riscv_idl::passes::{prune, reachable_exceptions};
use riscv_idl::Type;
use speculoos::prelude::*;

#[test]
fn test_prune_operation_for_configuration() {
    let isa = TestIsa::load("rv64");
    let op = isa.operation("jump");
    let pruned = prune(&op).unwrap();
    let idl = pruned.to_idl();
    assert_that!(idl).contains("Mcall");
    assert_that!(idl).does_not_contain("Breakpoint");
    assert_that!(idl).contains("compressed_offset(imm)");

    let rechecked = isa
        .compiler
        .type_check(&*pruned, &pruned.symtab, "pruned jump");
    assert!(rechecked.is_ok(), "{:?}", rechecked.err());
}

#[test]
fn test_pruning_keeps_exceptions() {
    let isa = TestIsa::load("rv64");
    for inst in ["add", "trap_on_zero", "lw", "jump"] {
        let op = isa.operation(inst);
        let pruned = prune(&op).unwrap();
        assert_eq!(
            reachable_exceptions(&op).unwrap().codes,
            reachable_exceptions(&pruned).unwrap().codes,
            "exceptions of {}",
            inst
        );
    }
}

#[test]
fn test_prune_function_body() {
    let isa = TestIsa::load("rv64");
    let body = isa.body(
        "Bits<64> width = XLEN;\nif (width == 32) {\n  return rv32_only(a);\n}\nreturn a + width;",
        vec![Type::bits(64)],
        &["a"],
    );
    let pruned = prune(&body).unwrap();
    let idl = pruned.to_idl();
    assert_that!(idl).does_not_contain("rv32_only");
    assert_that!(idl).contains("return a + 64'd64;");

    let rechecked = isa
        .compiler
        .type_check(&*pruned, &pruned.symtab, "pruned body");
    assert!(rechecked.is_ok(), "{:?}", rechecked.err());
}

#[test]
fn test_prune_is_idempotent() {
    let isa = TestIsa::load("rv64");
    for inst in ["add", "trap_on_zero", "lw", "jump"] {
        let op = isa.operation(inst);
        let once = prune(&op).unwrap();
        let twice = prune(&once).unwrap();
        assert_eq!(once.to_idl(), twice.to_idl(), "prune of {}", inst);
    }
}

#[test]
fn test_prune_does_not_touch_the_input() {
    let isa = TestIsa::load("rv64");
    let op = isa.operation("jump");
    let before = op.to_idl();
    prune(&op).unwrap();
    assert_eq!(before, op.to_idl());
    assert_that!(before).contains("Breakpoint");
}
