//! SQL text for components.
//!
//! Concretized trees (where every chain has become a [`RealCol`](super::RealCol) and every
//! source carries an alias) render as PostgreSQL-compatible SQL. Abstract trees render in the
//! same shape with `"table"."column"` standing in for unbound chains, which is what `Debug`
//! output and log lines show.

use std::fmt;

use itertools::Itertools;

use super::*;

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Single-quotes a string literal, doubling embedded quotes.
pub fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// A float as SQL. Non-finite values become PostgreSQL `float8` casts.
fn float_literal(v: f64) -> String {
    if v.is_nan() {
        String::from("'NaN'::float8")
    } else if v.is_infinite() {
        match v > 0.0 {
            true => String::from("'Infinity'::float8"),
            false => String::from("'-Infinity'::float8"),
        }
    } else {
        format!("{:?}", v)
    }
}

fn comma_list(items: &[Component]) -> String {
    items.iter().map(|i| i.to_string()).join(", ")
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Table(t) => write!(f, "{}", quote_ident(&t.name)),
            Node::ColChain(c) => write!(
                f,
                "{}.{}",
                quote_ident(&c.table.name),
                quote_ident(&c.column)
            ),
            Node::AggChain(c) => write!(f, "{}({})", c.func, c.child),
            Node::WindowFuncChain(c) => write!(f, "{}({})", c.func, c.child),
            Node::IntConst(v) => write!(f, "{}", v),
            Node::FloatConst(v) => write!(f, "{}", float_literal(*v)),
            Node::StringConst(s) => write!(f, "{}", quote_str(s)),
            Node::Absent => Ok(()),
            Node::Distinct => write!(f, "DISTINCT"),
            Node::CompareOp(op) => write!(f, "{}", op),
            Node::LogicOp(op) => write!(f, "{}", op),
            Node::JoinType(t) => write!(f, "{}", t),
            Node::AggFunc(func) => write!(f, "{}", func),
            Node::WindowFunc(func) => write!(f, "{}", func),
            Node::OrderDir(d) => write!(f, "{}", d),
            Node::Aggregation(a) => {
                if a.distinct {
                    write!(f, "{}(DISTINCT {})", a.func, a.parameter)
                } else {
                    write!(f, "{}({})", a.func, a.parameter)
                }
            }
            Node::WindowFuncClause(func) => write!(f, "{}()", func),
            Node::WindowCallAgg(w) | Node::WindowCallFunc(w) => {
                let mut over = vec![];
                if !w.partition.is_absent() {
                    over.push(format!("PARTITION BY {}", w.partition));
                }
                if !w.order_by.is_absent() {
                    over.push(format!("ORDER BY {}", w.order_by));
                }
                write!(f, "{} OVER ({})", w.func, over.join(" "))
            }
            Node::PartitionList(items)
            | Node::GroupByList(items)
            | Node::OrderByList(items)
            | Node::SelectClause(items) => write!(f, "{}", comma_list(items)),
            Node::OrderByItem(o) => write!(f, "{} {}", o.chain, o.dir),
            Node::PredicateOp(p) => write!(f, "{} {} {}", p.larg, p.op, p.rarg),
            Node::PredicateLogic(p) => {
                let side = |c: &Component| match c.kind() {
                    Kind::PredicateLogic => format!("({})", c),
                    _ => c.to_string(),
                };
                write!(f, "{} {} {}", side(&p.larg), p.op, side(&p.rarg))
            }
            Node::SelectItemAlias(a) => write!(f, "{} AS {}", a.item, quote_ident(&a.alias)),
            Node::TableSource(t) => match &t.alias {
                Some(alias) => write!(f, "{} AS {}", t.table, quote_ident(alias)),
                None => write!(f, "{}", t.table),
            },
            Node::QuerySource(q) => match &q.alias {
                Some(alias) => write!(f, "({}) AS {}", q.query, quote_ident(alias)),
                None => write!(f, "({})", q.query),
            },
            Node::Join(j) => {
                write!(f, "{} {} ", j.larg, j.join_type)?;
                match j.rarg.kind() {
                    Kind::Join => write!(f, "({})", j.rarg)?,
                    _ => write!(f, "{}", j.rarg)?,
                }
                write!(f, " ON {}", j.on)
            }
            Node::Query(q) => {
                write!(f, "SELECT ")?;
                if q.distinct {
                    write!(f, "DISTINCT ")?;
                }
                write!(f, "{} FROM {}", q.select, q.source)?;
                if !q.where_clause.is_absent() {
                    write!(f, " WHERE {}", q.where_clause)?;
                }
                if !q.group_by.is_absent() {
                    write!(f, " GROUP BY {}", q.group_by)?;
                }
                if !q.having.is_absent() {
                    write!(f, " HAVING {}", q.having)?;
                }
                if !q.order_by.is_absent() {
                    write!(f, " ORDER BY {}", q.order_by)?;
                }
                Ok(())
            }
            Node::RealCol(r) => {
                if r.table_alias.is_empty() {
                    write!(f, "{}", quote_ident(&r.column))
                } else {
                    write!(
                        f,
                        "{}.{}",
                        quote_ident(&r.table_alias),
                        quote_ident(&r.column)
                    )
                }
            }
        }
    }
}

/// An always-false query with `arity` NULL columns named `c1..cn`.
pub fn placeholder_query(arity: usize) -> String {
    let names = (1..=arity).map(|i| quote_ident(&format!("c{}", i))).join(", ");
    let nulls = (0..arity).map(|_| "NULL").join(", ");
    format!(
        "SELECT {} FROM (VALUES ({})) AS \"T_cte_empty\"({}) WHERE 1 = 0",
        names, nulls, names
    )
}

#[cfg(test)]
use super::testing::{col, customers_orders};

#[test]
fn test_render_fragments() {
    let (customers, orders) = customers_orders();
    let id = col(&customers, "id");
    struct Case {
        desc: &'static str,
        input: Component,
        expected: &'static str,
    }
    let or = Component::predicate_logic(
        Component::predicate_op(id.clone(), CompareOp::Eq, Component::int_const(1)),
        LogicOp::Or,
        Component::predicate_op(id.clone(), CompareOp::Lt, Component::float_const(2.5)),
    );
    let cases = vec![
        Case {
            desc: "quoted string",
            input: Component::string_const("it's"),
            expected: "'it''s'",
        },
        Case {
            desc: "float keeps its point",
            input: Component::float_const(3.0),
            expected: "3.0",
        },
        Case {
            desc: "infinite float",
            input: Component::float_const(f64::NEG_INFINITY),
            expected: "'-Infinity'::float8",
        },
        Case {
            desc: "nan float",
            input: Component::float_const(f64::NAN),
            expected: "'NaN'::float8",
        },
        Case {
            desc: "nested logic is parenthesized",
            input: Component::predicate_logic(
                or.clone(),
                LogicOp::And,
                Component::predicate_op(
                    id.clone(),
                    CompareOp::Neq,
                    Component::string_const("x"),
                ),
            ),
            expected: "(\"customers\".\"id\" = 1 OR \"customers\".\"id\" < 2.5) AND \"customers\".\"id\" <> 'x'",
        },
        Case {
            desc: "distinct aggregation",
            input: Component::aggregation(AggFunc::Count, id.clone(), true),
            expected: "COUNT(DISTINCT \"customers\".\"id\")",
        },
        Case {
            desc: "window call",
            input: Component::window_call_func(
                Component::window_func_clause(WindowFunc::DenseRank),
                Component::absent(),
                Component::order_by_list(vec![Component::order_by_item(
                    id.clone(),
                    OrderDir::Desc,
                )]),
            ),
            expected: "DENSE_RANK() OVER (ORDER BY \"customers\".\"id\" DESC)",
        },
        Case {
            desc: "real column without table alias",
            input: Component::real_col("", "name", col(&customers, "name")),
            expected: "\"name\"",
        },
        Case {
            desc: "aliased table",
            input: Component::table_source(orders.clone(), Some(String::from("T_orders_0"))),
            expected: "\"orders\" AS \"T_orders_0\"",
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        assert_eq!(case.input.to_string(), case.expected);
    }
}

#[test]
fn test_render_right_nested_join() {
    let (customers, orders) = customers_orders();
    let on = Component::predicate_op(
        col(&customers, "id"),
        CompareOp::Eq,
        col(&orders, "cust"),
    );
    let inner = Component::join(
        Component::table_source(orders.clone(), None),
        Component::table_source(orders.clone(), None),
        JoinType::Left,
        on.clone(),
    );
    let outer = Component::join(
        Component::table_source(customers, None),
        inner,
        JoinType::Inner,
        on,
    );
    assert_eq!(
        outer.to_string(),
        "\"customers\" INNER JOIN (\"orders\" LEFT JOIN \"orders\" ON \"customers\".\"id\" = \"orders\".\"cust\") ON \"customers\".\"id\" = \"orders\".\"cust\""
    );
}

#[test]
fn test_placeholder_query() {
    assert_eq!(
        placeholder_query(2),
        "SELECT \"c1\", \"c2\" FROM (VALUES (NULL, NULL)) AS \"T_cte_empty\"(\"c1\", \"c2\") WHERE 1 = 0"
    );
}
