//! `pt_to_ast` has routines for converting parse trees to ASTs for SQL.
//! A Pest parse tree has one enum for all possible terminals and non-terminals.
//! Our AST has enums for groups of terminals that are used in the same production.
//! The AST also discards some lexical detail like keyword case and position in the input.

use pest::iterators::Pair;

use crate::ast;
use crate::parser::{parse_expr, Rule, SQLParser};
use crate::pest::Parser;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Error parsing SQL: {0}")]
    Parse(String),
    #[error("Unexpected parse tree node: {0}")]
    Unexpected(String),
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(e: pest::error::Error<Rule>) -> Self {
        Error::Parse(e.to_string())
    }
}

fn unexpected(pair: &Pair<Rule>) -> Error {
    Error::Unexpected(format!("{:?} at `{}`", pair.as_rule(), pair.as_str()))
}

/// Parses one SELECT statement.
pub fn pt_select_statement_to_ast(query: &str) -> Result<ast::SelectStatement, Error> {
    let select_stmt = SQLParser::parse(Rule::select_stmt, query)?
        .next()
        .ok_or_else(|| Error::Parse(String::from("empty input")))?;
    for p in select_stmt.into_inner() {
        if p.as_rule() == Rule::select_body {
            return parse_select_body(p);
        }
    }
    Err(Error::Parse(String::from("no select statement")))
}

fn parse_select_body(pair: Pair<Rule>) -> Result<ast::SelectStatement, Error> {
    let mut ss = ast::SelectStatement::default();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::SELECT => (),
            Rule::DISTINCT => ss.distinct = true,
            Rule::select_items => {
                for item in p.into_inner() {
                    ss.items.push(parse_select_item(item)?);
                }
            }
            Rule::from_clause => {
                for f in p.into_inner().filter(|f| f.as_rule() == Rule::from_item) {
                    ss.from.push(parse_from_item(f)?);
                }
            }
            Rule::where_clause => ss.where_clause = Some(parse_trailing_expr(p)?),
            Rule::group_by_clause => {
                for e in p.into_inner().filter(|e| e.as_rule() == Rule::expr) {
                    ss.group_by.push(parse_expr(e.into_inner())?);
                }
            }
            Rule::having_clause => ss.having = Some(parse_trailing_expr(p)?),
            Rule::order_by_clause => ss.order_by = parse_order_by(p)?,
            _ => return Err(unexpected(&p)),
        }
    }
    Ok(ss)
}

/// Parses the single `expr` child of a `WHERE e` or `HAVING e` clause.
fn parse_trailing_expr(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
    let text = pair.as_str().to_string();
    match pair.into_inner().find(|e| e.as_rule() == Rule::expr) {
        Some(e) => parse_expr(e.into_inner()),
        None => Err(Error::Parse(text)),
    }
}

fn parse_order_by(pair: Pair<Rule>) -> Result<Vec<ast::OrderItem>, Error> {
    let mut items = vec![];
    for item in pair.into_inner().filter(|i| i.as_rule() == Rule::order_item) {
        let mut expr = None;
        let mut descending = false;
        for p in item.into_inner() {
            match p.as_rule() {
                Rule::expr => expr = Some(parse_expr(p.into_inner())?),
                Rule::ASC => descending = false,
                Rule::DESC => descending = true,
                _ => return Err(unexpected(&p)),
            }
        }
        match expr {
            Some(expr) => items.push(ast::OrderItem { expr, descending }),
            None => return Err(Error::Parse(String::from("ORDER BY item without expression"))),
        }
    }
    Ok(items)
}

fn parse_select_item(pair: Pair<Rule>) -> Result<ast::SelItem, Error> {
    let mut expr = None;
    let mut alias = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::star => return Ok(ast::SelItem::Star),
            Rule::expr => expr = Some(parse_expr(p.into_inner())?),
            Rule::AS => (),
            Rule::identifier => alias = Some(parse_identifier(p)?),
            _ => return Err(unexpected(&p)),
        }
    }
    match expr {
        Some(expr) => Ok(ast::SelItem::Expr { expr, alias }),
        None => Err(Error::Parse(String::from("select item without expression"))),
    }
}

fn parse_from_item(pair: Pair<Rule>) -> Result<ast::FromItem, Error> {
    let mut result: Option<ast::FromItem> = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::table_primary => result = Some(parse_table_primary(p)?),
            Rule::join_part => {
                let left = result.ok_or_else(|| Error::Parse(String::from("JOIN without left side")))?;
                result = Some(parse_join_part(left, p)?);
            }
            _ => return Err(unexpected(&p)),
        }
    }
    result.ok_or_else(|| Error::Parse(String::from("empty FROM item")))
}

fn parse_join_part(left: ast::FromItem, pair: Pair<Rule>) -> Result<ast::FromItem, Error> {
    let mut kind = ast::JoinKind::Inner;
    let mut right = None;
    let mut on = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::join_kind => {
                kind = match p.into_inner().next().map(|k| k.as_rule()) {
                    Some(Rule::LEFT) => ast::JoinKind::Left,
                    Some(Rule::RIGHT) => ast::JoinKind::Right,
                    Some(Rule::FULL) => ast::JoinKind::Full,
                    _ => ast::JoinKind::Inner,
                }
            }
            Rule::JOIN | Rule::ON => (),
            Rule::table_primary => right = Some(parse_table_primary(p)?),
            Rule::expr => on = Some(parse_expr(p.into_inner())?),
            _ => return Err(unexpected(&p)),
        }
    }
    let right = right.ok_or_else(|| Error::Parse(String::from("JOIN without right side")))?;
    Ok(ast::FromItem::Join {
        left: Box::new(left),
        right: Box::new(right),
        kind,
        on,
    })
}

fn parse_table_primary(pair: Pair<Rule>) -> Result<ast::FromItem, Error> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| Error::Parse(String::from("empty table reference")))?;
    match inner.as_rule() {
        Rule::from_item => parse_from_item(inner),
        Rule::table_source => {
            let mut names = vec![];
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::identifier => names.push(parse_identifier(p)?),
                    Rule::AS => (),
                    _ => return Err(unexpected(&p)),
                }
            }
            let mut names = names.into_iter();
            let name = names
                .next()
                .ok_or_else(|| Error::Parse(String::from("table reference without name")))?;
            Ok(ast::FromItem::Table {
                name,
                alias: names.next(),
            })
        }
        Rule::subquery_source => {
            let mut query = None;
            let mut alias = None;
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::subquery => query = Some(parse_subquery(p)?),
                    Rule::AS => (),
                    Rule::identifier => alias = Some(parse_identifier(p)?),
                    _ => return Err(unexpected(&p)),
                }
            }
            let query = query.ok_or_else(|| Error::Parse(String::from("missing subquery")))?;
            Ok(ast::FromItem::Subquery {
                query: Box::new(query),
                alias,
            })
        }
        _ => Err(unexpected(&inner)),
    }
}

pub(crate) fn parse_subquery(pair: Pair<Rule>) -> Result<ast::SelectStatement, Error> {
    let text = pair.as_str().to_string();
    match pair.into_inner().find(|p| p.as_rule() == Rule::select_body) {
        Some(body) => parse_select_body(body),
        None => Err(Error::Parse(text)),
    }
}

/// Bare identifiers fold to lower case; quoted identifiers keep their case.
pub(crate) fn parse_identifier(pair: Pair<Rule>) -> Result<String, Error> {
    let inner = match pair.as_rule() {
        Rule::identifier => pair
            .into_inner()
            .next()
            .ok_or_else(|| Error::Parse(String::from("empty identifier")))?,
        _ => pair,
    };
    match inner.as_rule() {
        Rule::bare_identifier => Ok(inner.as_str().to_lowercase()),
        Rule::quoted_identifier => {
            let s = inner.as_str();
            Ok(String::from(&s[1..s.len() - 1]))
        }
        _ => Err(unexpected(&inner)),
    }
}

pub(crate) fn parse_column_ref(pair: Pair<Rule>) -> Result<ast::ColumnRef, Error> {
    let mut parts = vec![];
    for p in pair.into_inner() {
        parts.push(parse_identifier(p)?);
    }
    match parts.len() {
        1 => Ok(ast::ColumnRef {
            qualifier: None,
            name: parts.remove(0),
        }),
        2 => {
            let name = parts.remove(1);
            Ok(ast::ColumnRef {
                qualifier: Some(parts.remove(0)),
                name,
            })
        }
        _ => Err(Error::Parse(format!("bad column reference: {}", parts.join(".")))),
    }
}

pub(crate) fn parse_func_call(pair: Pair<Rule>) -> Result<ast::FuncCall, Error> {
    let mut call = ast::FuncCall {
        name: String::new(),
        distinct: false,
        star: false,
        args: vec![],
        over: None,
    };
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::identifier => call.name = parse_identifier(p)?,
            Rule::DISTINCT => call.distinct = true,
            Rule::func_args => {
                for a in p.into_inner() {
                    match a.as_rule() {
                        Rule::star => call.star = true,
                        Rule::expr => call.args.push(parse_expr(a.into_inner())?),
                        _ => return Err(unexpected(&a)),
                    }
                }
            }
            Rule::over_clause => {
                let mut spec = ast::WindowSpec::default();
                for w in p.into_inner() {
                    match w.as_rule() {
                        Rule::OVER => (),
                        Rule::partition_clause => {
                            for e in w.into_inner().filter(|e| e.as_rule() == Rule::expr) {
                                spec.partition_by.push(parse_expr(e.into_inner())?);
                            }
                        }
                        Rule::order_by_clause => spec.order_by = parse_order_by(w)?,
                        _ => return Err(unexpected(&w)),
                    }
                }
                call.over = Some(spec);
            }
            _ => return Err(unexpected(&p)),
        }
    }
    Ok(call)
}

pub(crate) fn parse_literal(pair: Pair<Rule>) -> Result<ast::Constant, Error> {
    let inner = match pair.as_rule() {
        Rule::literal => pair
            .into_inner()
            .next()
            .ok_or_else(|| Error::Parse(String::from("empty literal")))?,
        _ => pair,
    };
    let text = inner.as_str();
    match inner.as_rule() {
        Rule::null_literal => Ok(ast::Constant::Null()),
        Rule::true_literal => Ok(ast::Constant::Bool(true)),
        Rule::false_literal => Ok(ast::Constant::Bool(false)),
        Rule::integer_literal => str::parse::<i64>(text)
            .map(ast::Constant::Int)
            .map_err(|_| Error::InvalidLiteral(String::from(text))),
        // Danger: floating point conversion.
        Rule::decimal_literal => match str::parse::<f64>(text) {
            Ok(v) if v.is_finite() => Ok(ast::Constant::Real(v)),
            _ => Err(Error::InvalidLiteral(String::from(text))),
        },
        Rule::single_quoted_string => Ok(ast::Constant::String(
            text[1..text.len() - 1].replace("''", "'"),
        )),
        _ => Err(unexpected(&inner)),
    }
}

/// Parses a single `CREATE TABLE` statement.
pub fn pt_create_statement_to_ast(c: &str) -> Result<ast::CreateStatement, Error> {
    let create_stmt = SQLParser::parse(Rule::create_stmt, c)?
        .next()
        .ok_or_else(|| Error::Parse(String::from("empty input")))?;
    match create_stmt
        .into_inner()
        .find(|p| p.as_rule() == Rule::create_body)
    {
        Some(body) => parse_create_body(body),
        None => Err(Error::Parse(String::from("no create statement"))),
    }
}

/// Parses a sequence of `;`-separated `CREATE TABLE` statements.
pub fn pt_schema_to_ast(sql: &str) -> Result<Vec<ast::CreateStatement>, Error> {
    let schema = SQLParser::parse(Rule::schema, sql)?
        .next()
        .ok_or_else(|| Error::Parse(String::from("empty input")))?;
    schema
        .into_inner()
        .filter(|p| p.as_rule() == Rule::create_body)
        .map(parse_create_body)
        .collect()
}

fn parse_create_body(body: Pair<Rule>) -> Result<ast::CreateStatement, Error> {
    use itertools::Itertools;
    let mut tablename = String::new();
    let mut coldefs = vec![];
    for c in body.into_inner() {
        match c.as_rule() {
            Rule::CREATE | Rule::TEMP | Rule::TABLE => (),
            Rule::identifier => tablename = parse_identifier(c)?,
            Rule::column_defs => {
                for column_def in c.into_inner() {
                    let text = column_def.as_str().to_string();
                    let (name, coltype) = column_def
                        .into_inner()
                        .collect_tuple()
                        .ok_or(Error::Parse(text))?;
                    coldefs.push(ast::ColDef {
                        colname: parse_identifier(name)?,
                        coltype: coltype.as_str().to_lowercase(),
                    });
                }
            }
            _ => return Err(unexpected(&c)),
        }
    }
    Ok(ast::CreateStatement { tablename, coldefs })
}

#[test]
fn test_pt_create_statement_to_ast() {
    let input = "CREATE TABLE t (a int)";
    let actual = pt_create_statement_to_ast(input).unwrap();
    let expected = ast::CreateStatement {
        tablename: "t".to_string(),
        coldefs: vec![ast::ColDef {
            colname: "a".to_string(),
            coltype: "int".to_string(),
        }],
    };
    assert_eq!(actual, expected);
}

#[test]
fn test_pt_schema_to_ast() {
    let cases = vec![
        (
            "CREATE TABLE customers (id int, name varchar(255)); CREATE TABLE orders (id int, cust int);",
            vec![
                ("customers", vec![("id", "int"), ("name", "varchar(255)")]),
                ("orders", vec![("id", "int"), ("cust", "int")]),
            ],
        ),
        (
            "create temp table Tbl_Two(a INT,b decimal(10, 2))",
            vec![("tbl_two", vec![("a", "int"), ("b", "decimal(10, 2)")])],
        ),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        let actual: Vec<(String, Vec<(String, String)>)> = pt_schema_to_ast(input)
            .unwrap()
            .into_iter()
            .map(|c| {
                (
                    c.tablename,
                    c.coldefs
                        .into_iter()
                        .map(|d| (d.colname, d.coltype))
                        .collect(),
                )
            })
            .collect();
        let expected: Vec<(String, Vec<(String, String)>)> = expected
            .into_iter()
            .map(|(t, cols)| {
                (
                    t.to_string(),
                    cols.into_iter()
                        .map(|(n, ty)| (n.to_string(), ty.to_string()))
                        .collect(),
                )
            })
            .collect();
        assert_eq!(actual, expected);
    }
}

#[test]
fn test_parsing_literals() {
    let cases = vec![
        ("1", ast::Constant::Int(1)),
        ("-7", ast::Constant::Int(-7)),
        ("1.5", ast::Constant::Real(1.5)),
        ("'hi'", ast::Constant::String(String::from("hi"))),
        ("'it''s'", ast::Constant::String(String::from("it's"))),
        ("TRUE", ast::Constant::Bool(true)),
        ("null", ast::Constant::Null()),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        let pair = SQLParser::parse(Rule::literal, input).unwrap().next().unwrap();
        assert_eq!(parse_literal(pair).unwrap(), expected);
    }
}

#[test]
fn test_pt_select_statement_to_ast() {
    struct Case {
        desc: &'static str,
        input: &'static str,
        expected: &'static str,
    }
    let cases = vec![
        Case {
            desc: "join with where",
            input: "SELECT customers.name FROM customers JOIN orders ON customers.id = orders.cust WHERE orders.id = 5",
            expected: "SELECT customers.name FROM customers INNER JOIN orders ON customers.id = orders.cust WHERE orders.id = 5",
        },
        Case {
            desc: "aliases and keyword case",
            input: "select DISTINCT C.Name n from Customers c",
            expected: "SELECT DISTINCT c.name AS n FROM customers AS c",
        },
        Case {
            desc: "grouping and ordering",
            input: "SELECT a, count(distinct b) FROM t GROUP BY a HAVING count(b) > 1 ORDER BY 2 DESC, a",
            expected: "SELECT a, count(DISTINCT b) FROM t GROUP BY a HAVING count(b) > 1 ORDER BY 2 DESC, a ASC",
        },
        Case {
            desc: "window function",
            input: "SELECT sum(x) OVER (PARTITION BY a ORDER BY b) AS s FROM t",
            expected: "SELECT sum(x) OVER (PARTITION BY a ORDER BY b ASC) AS s FROM t",
        },
        Case {
            desc: "subquery source and outer join",
            input: "SELECT s.x FROM (SELECT a AS x FROM t) s LEFT OUTER JOIN u ON s.x = u.y",
            expected: "SELECT s.x FROM (SELECT a AS x FROM t) AS s LEFT JOIN u ON s.x = u.y",
        },
        Case {
            desc: "right-nested join",
            input: "SELECT a FROM t JOIN (u JOIN v ON u.b = v.c) ON t.a = u.b",
            expected: "SELECT a FROM t INNER JOIN (u INNER JOIN v ON u.b = v.c) ON t.a = u.b",
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let actual = pt_select_statement_to_ast(case.input).unwrap();
        assert_eq!(actual.to_string(), case.expected);
    }
}

#[test]
fn test_pt_select_statement_to_ast_errors() {
    for input in vec!["SELECT", "SELECT a FROM t LIMIT 1", "INSERT INTO t VALUES (1)"] {
        println!("Running case: {}", input);
        assert!(matches!(pt_select_statement_to_ast(input), Err(Error::Parse(_))));
    }
}

#[test]
fn test_decimal_literal_out_of_range() {
    let huge = format!("SELECT a FROM t WHERE a < {}.5", "9".repeat(400));
    assert!(matches!(
        pt_select_statement_to_ast(&huge),
        Err(Error::InvalidLiteral(_))
    ));
    assert!(pt_select_statement_to_ast("SELECT a FROM t WHERE a < 1.5").is_ok());
}
