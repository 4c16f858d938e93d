//! `parser` contains generated parsing routines for SQL and tests on them.

use pest::iterators::Pairs;
use pest::pratt_parser::PrattParser;

use crate::ast;
use crate::pt_to_ast;

#[allow(unused_imports)]
use pest::Parser; // This needs to be in scope for the next statements to work.
#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SQLParser;

// From: https://pest.rs/book/examples/calculator.html, MIT,Apache2.0 licenses.
lazy_static::lazy_static! {
    pub static ref PRATT_PARSER: PrattParser<Rule> = {
        use pest::pratt_parser::{Assoc::*, Op};
        use Rule::*;

        // Precedence is defined lowest to highest
        PrattParser::new()
            .op(Op::infix(or_op, Left))
            .op(Op::infix(and_op, Left))
            .op(Op::prefix(not_op))
            // Comparisons have equal precedence
            .op(Op::infix(eq, Left)
                | Op::infix(ne, Left)
                | Op::infix(lt, Left)
                | Op::infix(le, Left)
                | Op::infix(gt, Left)
                | Op::infix(ge, Left))
            .op(Op::postfix(is_null) | Op::postfix(is_not_null))
    };
}

/// Folds the flat operator/operand sequence of an `expr` rule into a tree.
pub fn parse_expr(pairs: Pairs<Rule>) -> Result<ast::Expr, pt_to_ast::Error> {
    PRATT_PARSER
        .map_primary(|primary| match primary.as_rule() {
            Rule::literal => Ok(ast::Expr::Constant(pt_to_ast::parse_literal(primary)?)),
            Rule::column_ref => Ok(ast::Expr::Column(pt_to_ast::parse_column_ref(primary)?)),
            Rule::func_call => Ok(ast::Expr::Func(pt_to_ast::parse_func_call(primary)?)),
            Rule::subquery => Ok(ast::Expr::Subquery(Box::new(
                pt_to_ast::parse_subquery(primary)?,
            ))),
            Rule::expr => parse_expr(primary.into_inner()),
            rule => Err(pt_to_ast::Error::Unexpected(format!("{:?}", rule))),
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(ast::Expr::Not(Box::new(rhs?))),
            rule => Err(pt_to_ast::Error::Unexpected(format!("{:?}", rule))),
        })
        .map_postfix(|lhs, op| {
            let negated = match op.as_rule() {
                Rule::is_null => false,
                Rule::is_not_null => true,
                rule => return Err(pt_to_ast::Error::Unexpected(format!("{:?}", rule))),
            };
            Ok(ast::Expr::IsNull {
                expr: Box::new(lhs?),
                negated,
            })
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (Box::new(lhs?), Box::new(rhs?));
            let cmp = match op.as_rule() {
                Rule::and_op => {
                    return Ok(ast::Expr::Logic {
                        lhs,
                        op: ast::BoolOp::And,
                        rhs,
                    })
                }
                Rule::or_op => {
                    return Ok(ast::Expr::Logic {
                        lhs,
                        op: ast::BoolOp::Or,
                        rhs,
                    })
                }
                Rule::eq => ast::CmpOp::Eq,
                Rule::ne => ast::CmpOp::NotEq,
                Rule::lt => ast::CmpOp::Lt,
                Rule::le => ast::CmpOp::LtEq,
                Rule::gt => ast::CmpOp::Gt,
                Rule::ge => ast::CmpOp::GtEq,
                rule => return Err(pt_to_ast::Error::Unexpected(format!("{:?}", rule))),
            };
            Ok(ast::Expr::Compare { lhs, op: cmp, rhs })
        })
        .parse(pairs)
}

#[test]
fn test_parse_literals() {
    let cases = vec![
        ("1"),
        ("1000000000000"),
        ("-1000000000000"),
        ("1.01"),
        ("123456789.987654321"),
        ("'hi'"),
        ("'it''s'"),
        ("true"),
        ("tRuE"),
        ("FALSE"),
        ("null"),
        ("NULL"),
    ];
    for case in cases {
        assert!(SQLParser::parse(Rule::literal, case).is_ok());
    }
}

#[test]
fn test_parse_identifiers() {
    let ok = vec!["a", "order_id", "_x1", "\"Quoted Name\"", "selected", "isbn"];
    for case in ok {
        println!("Running case: {}", case);
        let parsed = SQLParser::parse(Rule::identifier, case).unwrap();
        assert_eq!(parsed.as_str(), case);
    }
    for case in vec!["select", "FROM", "1abc", "and"] {
        println!("Running case: {}", case);
        assert!(SQLParser::parse(Rule::identifier, case).is_err());
    }
}

#[test]
fn test_parse_select_statements() {
    let ok = vec![
        "SELECT a FROM t",
        "select a, b from t;",
        "SELECT DISTINCT t.a AS x FROM t WHERE t.b = 1 AND NOT t.c < 2",
        "SELECT c.name FROM customers c JOIN orders o ON c.id = o.cust WHERE o.id = 5",
        "SELECT a FROM t LEFT OUTER JOIN u ON t.a = u.b RIGHT JOIN v ON v.c = u.b",
        "SELECT a, COUNT(DISTINCT b) FROM t GROUP BY a HAVING COUNT(b) > 1 ORDER BY 2 DESC, a",
        "SELECT SUM(x) OVER (PARTITION BY a ORDER BY b ASC) FROM t",
        "SELECT x FROM (SELECT a AS x FROM t) AS s",
        "SELECT a FROM t WHERE b IS NOT NULL OR (c >= 1 AND d <> 'z')",
        "SELECT a FROM t -- trailing comment\n WHERE a != 3",
    ];
    for case in ok {
        println!("Running case: {}", case);
        assert!(SQLParser::parse(Rule::select_stmt, case).is_ok());
    }
    let bad = vec!["SELECT", "SELECT a FROM", "SELECT a FROM t WHERE", "SELECT a b c FROM t"];
    for case in bad {
        println!("Running case: {}", case);
        assert!(SQLParser::parse(Rule::select_stmt, case).is_err());
    }
}

#[test]
fn test_parse_expr_precedence() {
    let cases = vec![
        ("a = 1 OR b = 2 AND c = 3", "(a = 1 OR (b = 2 AND c = 3))"),
        ("NOT a = 1 AND b < 2", "(NOT (a = 1) AND b < 2)"),
        ("(a = 1 OR b = 2) AND c IS NULL", "((a = 1 OR b = 2) AND c IS NULL)"),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        let mut pairs = SQLParser::parse(Rule::expr, input).unwrap();
        let expr = parse_expr(pairs.next().unwrap().into_inner()).unwrap();
        assert_eq!(expr.to_string(), expected);
    }
}
