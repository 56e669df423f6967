//! The grammar parses `a op b op c ...` as a flat list; this turns it into a tree where every
//! operator is left associative and tighter operators bind first.

use std::iter::Peekable;

use crate::ast::{BinaryOp, Expr, ExprKind, Loc};

pub(crate) fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    let mut rest = rest.into_iter().peekable();
    climb(first, &mut rest, 0)
}

fn climb<I>(mut lhs: Expr, rest: &mut Peekable<I>, min_precedence: u8) -> Expr
where
    I: Iterator<Item = (BinaryOp, Expr)>,
{
    while let Some((op, mut rhs)) = rest.next_if(|(op, _)| op.precedence() >= min_precedence) {
        while rest
            .peek()
            .is_some_and(|(next, _)| next.precedence() > op.precedence())
        {
            rhs = climb(rhs, rest, op.precedence() + 1);
        }
        lhs = binary(op, lhs, rhs);
    }
    lhs
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let loc = Loc {
        file: lhs.loc.file.clone(),
        line: lhs.loc.line,
        start: lhs.loc.start,
        end: rhs.loc.end,
    };
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        loc,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Expr {
        Expr::new(ExprKind::Id(name.into()), Loc::synthetic("fold"))
    }

    #[test]
    fn test_left_associative() {
        let expr = fold_binary(
            id("a"),
            vec![(BinaryOp::Sub, id("b")), (BinaryOp::Sub, id("c"))],
        );
        assert_eq!(expr.to_idl(), "a - b - c");
        let ExprKind::Binary { lhs, .. } = &expr.kind else {
            panic!("not a binary expression: {:?}", expr);
        };
        assert_eq!(lhs.to_idl(), "a - b");
    }

    #[test]
    fn test_precedence() {
        let expr = fold_binary(
            id("a"),
            vec![
                (BinaryOp::Add, id("b")),
                (BinaryOp::Mul, id("c")),
                (BinaryOp::Eq, id("d")),
                (BinaryOp::LogicalAnd, id("e")),
            ],
        );
        let ExprKind::Binary { op, lhs, rhs } = &expr.kind else {
            panic!("not a binary expression: {:?}", expr);
        };
        assert_eq!(*op, BinaryOp::LogicalAnd);
        assert_eq!(rhs.to_idl(), "e");
        assert_eq!(lhs.to_idl(), "a + b * c == d");
        let ExprKind::Binary { lhs: sum, .. } = &lhs.kind else {
            panic!("not a binary expression: {:?}", lhs);
        };
        assert!(matches!(sum.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_single_operand() {
        assert_eq!(fold_binary(id("x"), vec![]), id("x"));
    }
}
