mod common;

use common::TestIsa;
use riscv_idl::passes::{prune, reachable_functions};
use riscv_idl::{parse_body, Binding, Type};
use speculoos::prelude::*;

#[test]
fn declared_variable_in_arithmetic() {
    let isa = TestIsa::load("rv64");
    let mut scope = isa.symtab().deep_clone();
    scope.push();
    for stmt in parse_body("test", "Bits<32> x = 5;").unwrap() {
        stmt.type_check(&mut scope).unwrap();
    }
    isa.expression_in("x + 3", scope)
        .type_is("Bits<32>")
        .int_value_is(8);
}

#[test]
fn literal_arithmetic_is_truncated() {
    let isa = TestIsa::load("rv64");
    isa.expression("5'd31 + 5'd2")
        .type_is("Bits<5>")
        .int_value_is(1)
        .warns("truncated to 5 bits");
    isa.expression("5'd31 `+ 5'd2")
        .type_is("Bits<6>")
        .int_value_is(33);
}

#[test]
fn literal_truncation_is_reported_once() {
    let isa = TestIsa::load("rv64");
    let body = isa.body(
        "Bits<5> x = 5'd31 + 5'd2;\nreturn a + x;",
        vec![Type::bits(64)],
        &["a"],
    );
    for _ in 0..3 {
        prune(&body).unwrap();
        reachable_functions(&body).unwrap();
    }
    let truncated = isa
        .warnings()
        .iter()
        .filter(|w| w.contains("5'd31 + 5'd2"))
        .count();
    assert_eq!(truncated, 1);
}

#[test]
fn read_only_csr_field_cannot_be_assigned() {
    let isa = TestIsa::load("rv64");
    let error = isa.body_error("CSR[mstatus].SXL = 0;");
    assert_that!(error.message).contains("read-only");
    assert_that!(error.message).contains("RO-H");
    isa.body("CSR[mstatus].MIE = 1;", vec![], &[]);
}

#[test]
fn csr_field_values() {
    let isa = TestIsa::load("rv64");
    isa.expression("CSR[mvendorid].OFFSET")
        .type_is("Bits<7>")
        .int_value_is(5);
    isa.expression("CSR[mstatus].SXL").type_is("Bits<2>").unknown();
    isa.expression("CSR[mstatus].address()").int_value_is(0x300);
    isa.expression("CSR[mstatus].sw_read()").unknown();
}

#[test]
fn enum_member_value() {
    let isa = TestIsa::load("rv64");
    isa.expression("ExtensionName::C")
        .type_is("ExtensionName")
        .int_value_is(1);
    isa.expression("ExceptionCode::Mcall").int_value_is(11);
    isa.expression("$enum_size(ExceptionCode)").int_value_is(8);
}

#[test]
fn implemented_extensions() {
    let isa = TestIsa::load("rv64");
    isa.expression("implemented?(ExtensionName::C)")
        .type_is("Boolean")
        .bool_value_is(false);
    isa.expression("implemented?(ExtensionName::M)")
        .bool_value_is(true);
    isa.expression("xlen()").int_value_is(64);
}

#[test]
fn template_arguments_are_required() {
    let isa = TestIsa::load("rv64");
    let error = isa.body_error("Bits<64> y = zext(5);");
    assert_that!(error.message).contains("missing template arguments");
    let error = isa.body_error("Bits<64> y = zext<true>(5);");
    assert_that!(error.message).contains("wrong type");
    isa.expression("zext<8>(8'd200)")
        .type_is("Bits<64>")
        .int_value_is(200);
}

#[test]
fn conditional_trap_is_reachable() {
    let isa = TestIsa::load("rv64");
    let op = isa.operation("trap_on_zero");
    let exceptions = riscv_idl::passes::reachable_exceptions(&op).unwrap();
    assert_that!(exceptions.codes.iter().copied().collect::<Vec<_>>()).is_equal_to(vec![2]);
    assert!(exceptions.undetermined.is_empty());
    assert_eq!(exceptions.mask(), 1 << 2);
}

#[test]
fn sign_extended_decode_variable_is_signed() {
    let isa = TestIsa::load("rv64");
    let op = isa.operation("lw");
    let Some(Binding::Var(imm)) = op.symtab.get("imm") else {
        panic!("imm is not a variable of lw");
    };
    assert!(imm.decode_var);
    assert_eq!(imm.ty.to_string(), "const signed Bits<12>");
    let Some(Binding::Var(rd)) = op.symtab.get("rd") else {
        panic!("rd is not a variable of lw");
    };
    assert_eq!(rd.ty.to_string(), "const Bits<5>");
}

#[test]
fn decode_variables_cannot_be_written() {
    let isa = TestIsa::load("rv64");
    let op = isa.operation("lw");
    for source in ["imm = 0;", "imm++;"] {
        let stmts = parse_body("lw", source).unwrap();
        let err = isa
            .compiler
            .type_check(&stmts, &op.symtab, "write to imm")
            .unwrap_err();
        let Some(err) = err.as_type_error() else {
            panic!("expected a type error, found {}", err);
        };
        assert_that!(err.message).contains("decoded from the encoding");
    }
}

#[test]
fn widths_beyond_the_limit() {
    let isa = TestIsa::load("rv64");
    let error = isa.expression_error("{64'h100000001{1'b1}}");
    assert_that!(error.message).contains("wider than 128 bits");
    let error = isa.expression_error("{65{2'b01}}");
    assert_that!(error.message).contains("130 bits wide");

    let isa = TestIsa::load("all_bases");
    let error = isa.expression_error("$pc[200:0]");
    assert_that!(error.message).contains("range [200:0] is wider than 128 bits");
    isa.expression("$pc[127:0]").type_is("Bits<128>");
}
