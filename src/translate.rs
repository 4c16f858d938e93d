//! `translate` converts a parsed SELECT statement into a DSL query.
//!
//! Column references are resolved through an alias dictionary built bottom-up from the FROM
//! clause. Comparisons are normalized to `<`, `<=`, `=` and `<>`, and `NOT` is pushed into the
//! operators it covers instead of being represented.

use std::rc::Rc;

use thiserror::Error;

use crate::ast;
use crate::dsl::{
    AggFunc, CompareOp, Component, IdGenerator, JoinType, LogicOp, OrderDir, Query, WindowFunc,
};
use crate::schema::Schema;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Translation not supported: {0}.")]
    TranslationUnsupported(String),
    #[error("Column {0} does not exist.")]
    AliasResolutionMissing(String),
    #[error("Column reference {0} is ambiguous.")]
    AliasResolutionAmbiguous(String),
    #[error("Table {0} is not in the schema.")]
    UnknownTable(String),
}

fn unsupported(what: impl std::fmt::Display) -> Error {
    Error::TranslationUnsupported(what.to_string())
}

#[derive(Debug, Clone)]
struct AliasEntry {
    namespace: String,
    column: String,
    chain: Component,
}

/// The columns visible at some point of a query, by `namespace.column`.
#[derive(Debug, Clone, Default)]
struct AliasDic {
    entries: Vec<AliasEntry>,
}

impl AliasDic {
    fn record(&mut self, namespace: &str, column: &str, chain: Component) {
        self.entries.push(AliasEntry {
            namespace: String::from(namespace),
            column: String::from(column),
            chain,
        });
    }

    fn combine(mut self, other: AliasDic) -> AliasDic {
        self.entries.extend(other.entries);
        self
    }

    /// The same columns, all under `namespace`.
    fn renamespace(self, namespace: &str) -> AliasDic {
        AliasDic {
            entries: self
                .entries
                .into_iter()
                .map(|e| AliasEntry {
                    namespace: String::from(namespace),
                    ..e
                })
                .collect(),
        }
    }

    fn lookup(&self, c: &ast::ColumnRef) -> Result<Component, Error> {
        let mut found: Vec<&Component> = vec![];
        for e in &self.entries {
            let namespace_ok = match &c.qualifier {
                Some(q) => *q == e.namespace,
                None => true,
            };
            if namespace_ok && e.column == c.name && !found.contains(&&e.chain) {
                found.push(&e.chain);
            }
        }
        match found.as_slice() {
            [] => Err(Error::AliasResolutionMissing(c.to_string())),
            [chain] => Ok((*chain).clone()),
            _ => Err(Error::AliasResolutionAmbiguous(c.to_string())),
        }
    }

    /// Namespace of the unique binding of `c`, or empty.
    fn namespace_of(&self, c: &ast::ColumnRef) -> String {
        match &c.qualifier {
            Some(q) => q.clone(),
            None => self
                .entries
                .iter()
                .find(|e| e.column == c.name)
                .map(|e| e.namespace.clone())
                .unwrap_or_default(),
        }
    }
}

struct Translator<'a> {
    schema: &'a Schema,
    ids: &'a mut IdGenerator,
}

/// Translates `stmt` and returns the query with the names of its output columns.
pub fn translate(
    stmt: &ast::SelectStatement,
    schema: &Schema,
    ids: &mut IdGenerator,
) -> Result<(Component, Vec<String>), Error> {
    let mut t = Translator { schema, ids };
    let (query, _) = t.select(stmt)?;
    Ok((query, stmt.output_names()))
}

/// The chain a SELECT item makes available to GROUP BY, ORDER BY and enclosing queries.
fn output_chain(item: &Component) -> Result<Component, Error> {
    item.provided_chains()
        .into_iter()
        .next()
        .ok_or_else(|| unsupported(format!("select item {}", item)))
}

fn referencable(c: Component) -> Result<Component, Error> {
    if c.kind().is_referencable_chain() {
        Ok(c)
    } else {
        Err(unsupported(format!("{} as a column reference", c)))
    }
}

/// The operator and operand order of `lhs op rhs`, under an odd number of NOTs if `negated`.
fn normalize(op: ast::CmpOp, negated: bool) -> (CompareOp, bool) {
    use ast::CmpOp::*;
    match (op, negated) {
        (Eq, false) | (NotEq, true) => (CompareOp::Eq, false),
        (NotEq, false) | (Eq, true) => (CompareOp::Neq, false),
        (Lt, false) | (GtEq, true) => (CompareOp::Lt, false),
        (LtEq, false) | (Gt, true) => (CompareOp::Leq, false),
        (Gt, false) | (LtEq, true) => (CompareOp::Lt, true),
        (GtEq, false) | (Lt, true) => (CompareOp::Leq, true),
    }
}

impl<'a> Translator<'a> {
    fn select(&mut self, stmt: &ast::SelectStatement) -> Result<(Component, AliasDic), Error> {
        let from = match stmt.from.as_slice() {
            [from] => from,
            [] => return Err(unsupported("SELECT without FROM")),
            _ => return Err(unsupported("FROM with more than one item")),
        };
        let (source, dic) = self.from_item(from)?;

        let mut items = vec![];
        for item in &stmt.items {
            match item {
                ast::SelItem::Expr { expr, .. } => items.push(self.value(expr, &dic)?),
                ast::SelItem::Star => return Err(unsupported("SELECT *")),
            }
        }
        let names = stmt.output_names();

        let where_clause = match &stmt.where_clause {
            Some(e) => self.predicate(e, &dic, false)?,
            None => Component::absent(),
        };
        let group_by = match stmt.group_by.as_slice() {
            [] => Component::absent(),
            exprs => {
                let mut chains = vec![];
                for e in exprs {
                    chains.push(self.reference(e, &dic, &items, stmt)?);
                }
                Component::group_by_list(chains)
            }
        };
        let having = match &stmt.having {
            Some(e) => self.predicate(e, &dic, false)?,
            None => Component::absent(),
        };
        let order_by = match stmt.order_by.as_slice() {
            [] => Component::absent(),
            order => {
                let mut keys = vec![];
                for o in order {
                    let chain = self.reference(&o.expr, &dic, &items, stmt)?;
                    let dir = match o.descending {
                        true => OrderDir::Desc,
                        false => OrderDir::Asc,
                    };
                    keys.push(Component::order_by_item(chain, dir));
                }
                Component::order_by_list(keys)
            }
        };

        let mut outputs = AliasDic::default();
        for ((item, expr), name) in items.iter().zip(&stmt.items).zip(&names) {
            let namespace = match expr {
                ast::SelItem::Expr {
                    expr: ast::Expr::Column(c),
                    ..
                } => dic.namespace_of(c),
                _ => String::new(),
            };
            outputs.record(&namespace, name, output_chain(item)?);
        }

        let query = Component::query(Query {
            select: Component::select_clause(items),
            source,
            where_clause,
            group_by,
            having,
            order_by,
            distinct: stmt.distinct,
        });
        Ok((query, outputs))
    }

    fn from_item(&mut self, f: &ast::FromItem) -> Result<(Component, AliasDic), Error> {
        match f {
            ast::FromItem::Table { name, alias } => {
                let def = self
                    .schema
                    .table(name)
                    .ok_or_else(|| Error::UnknownTable(name.clone()))?;
                let table_name = def.name.to_lowercase();
                let table = Component::table(Rc::new(
                    self.ids.table(&table_name, def.columns.clone()),
                ));
                let namespace = alias.as_deref().unwrap_or(&table_name);
                let mut dic = AliasDic::default();
                for chain in table.provided_chains() {
                    if let Some(col) = chain.node().as_col_chain() {
                        let column = col.column.clone();
                        dic.record(namespace, &column, chain);
                    }
                }
                Ok((Component::table_source(table, alias.clone()), dic))
            }
            ast::FromItem::Subquery { query, alias } => {
                let (inner, dic) = self.select(query)?;
                let dic = match alias {
                    Some(a) => dic.renamespace(a),
                    None => dic,
                };
                Ok((Component::query_source(inner, alias.clone()), dic))
            }
            ast::FromItem::Join {
                left,
                right,
                kind,
                on,
            } => {
                let (l, ldic) = self.from_item(left)?;
                let (r, rdic) = self.from_item(right)?;
                let dic = ldic.combine(rdic);
                let Some(on) = on else {
                    return Err(unsupported("JOIN without ON"));
                };
                let on = self.predicate(on, &dic, false)?;
                let join = match kind {
                    ast::JoinKind::Inner => Component::join(l, r, JoinType::Inner, on),
                    ast::JoinKind::Left => Component::join(l, r, JoinType::Left, on),
                    ast::JoinKind::Full => Component::join(l, r, JoinType::Full, on),
                    ast::JoinKind::Right => Component::join(r, l, JoinType::Left, on),
                };
                Ok((join, dic))
            }
        }
    }

    /// A GROUP BY or ORDER BY key: a column, a 1-based select position, an output alias or an
    /// aggregate, always as a referencable chain.
    fn reference(
        &mut self,
        e: &ast::Expr,
        dic: &AliasDic,
        items: &[Component],
        stmt: &ast::SelectStatement,
    ) -> Result<Component, Error> {
        match e {
            ast::Expr::Constant(ast::Constant::Int(n)) => {
                let item = usize::try_from(*n)
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| unsupported(format!("position {} outside the select list", n)))?;
                referencable(output_chain(item)?)
            }
            ast::Expr::Column(c) => match dic.lookup(c) {
                Ok(chain) => referencable(chain),
                Err(Error::AliasResolutionMissing(_)) if c.qualifier.is_none() => {
                    let aliased = stmt.items.iter().position(|i| {
                        matches!(i, ast::SelItem::Expr { alias: Some(a), .. } if *a == c.name)
                    });
                    match aliased.and_then(|i| items.get(i)) {
                        Some(item) => referencable(output_chain(item)?),
                        None => Err(Error::AliasResolutionMissing(c.to_string())),
                    }
                }
                Err(err) => Err(err),
            },
            ast::Expr::Func(_) => referencable(output_chain(&self.value(e, dic)?)?),
            _ => Err(unsupported(format!("{} as a grouping or ordering key", e))),
        }
    }

    fn value(&mut self, e: &ast::Expr, dic: &AliasDic) -> Result<Component, Error> {
        match e {
            ast::Expr::Column(c) => dic.lookup(c),
            ast::Expr::Constant(c) => match c {
                ast::Constant::Int(v) => Ok(Component::int_const(*v)),
                ast::Constant::Real(v) => Ok(Component::float_const(*v)),
                ast::Constant::String(s) => Ok(Component::string_const(s)),
                ast::Constant::Bool(_) | ast::Constant::Null() => {
                    Err(unsupported(format!("constant {}", c)))
                }
            },
            ast::Expr::Func(f) => self.func_call(f, dic),
            ast::Expr::Subquery(_) => Err(unsupported("scalar subquery")),
            _ => Err(unsupported(format!("{} as a value", e))),
        }
    }

    fn func_call(&mut self, f: &ast::FuncCall, dic: &AliasDic) -> Result<Component, Error> {
        if f.star {
            return Err(unsupported(format!("{}(*)", f.name)));
        }
        if let Some(func) = WindowFunc::from_name(&f.name) {
            let Some(over) = &f.over else {
                return Err(unsupported(format!("{} without OVER", f.name)));
            };
            if !f.args.is_empty() {
                return Err(unsupported(format!("arguments to {}", f.name)));
            }
            let (partition, order_by) = self.window(over, dic)?;
            return Ok(Component::window_call_func(
                Component::window_func_clause(func),
                partition,
                order_by,
            ));
        }
        let Some(func) = AggFunc::from_name(&f.name) else {
            return Err(unsupported(format!("function {}", f.name)));
        };
        let [arg] = f.args.as_slice() else {
            return Err(unsupported(format!("{} with {} arguments", f.name, f.args.len())));
        };
        let parameter = referencable(self.value(arg, dic)?)?;
        let agg = Component::aggregation(func, parameter, f.distinct);
        match &f.over {
            Some(over) => {
                let (partition, order_by) = self.window(over, dic)?;
                Ok(Component::window_call_agg(agg, partition, order_by))
            }
            None => Ok(agg),
        }
    }

    fn window(
        &mut self,
        over: &ast::WindowSpec,
        dic: &AliasDic,
    ) -> Result<(Component, Component), Error> {
        let partition = match over.partition_by.as_slice() {
            [] => Component::absent(),
            exprs => {
                let mut chains = vec![];
                for e in exprs {
                    chains.push(referencable(self.value(e, dic)?)?);
                }
                Component::partition_list(chains)
            }
        };
        let order_by = match over.order_by.as_slice() {
            [] => Component::absent(),
            order => {
                let mut keys = vec![];
                for o in order {
                    let chain = referencable(output_chain(&self.value(&o.expr, dic)?)?)?;
                    let dir = match o.descending {
                        true => OrderDir::Desc,
                        false => OrderDir::Asc,
                    };
                    keys.push(Component::order_by_item(chain, dir));
                }
                Component::order_by_list(keys)
            }
        };
        Ok((partition, order_by))
    }

    /// A boolean expression. `negated` is set under an odd number of enclosing NOTs.
    fn predicate(
        &mut self,
        e: &ast::Expr,
        dic: &AliasDic,
        negated: bool,
    ) -> Result<Component, Error> {
        match e {
            ast::Expr::Compare { lhs, op, rhs } => {
                let (l, r) = (self.value(lhs, dic)?, self.value(rhs, dic)?);
                let (op, swap) = normalize(*op, negated);
                Ok(match swap {
                    true => Component::predicate_op(r, op, l),
                    false => Component::predicate_op(l, op, r),
                })
            }
            ast::Expr::Logic { lhs, op, rhs } => {
                let op = match (op, negated) {
                    (ast::BoolOp::And, false) | (ast::BoolOp::Or, true) => LogicOp::And,
                    (ast::BoolOp::Or, false) | (ast::BoolOp::And, true) => LogicOp::Or,
                };
                let l = self.predicate(lhs, dic, negated)?;
                let r = self.predicate(rhs, dic, negated)?;
                Ok(Component::predicate_logic(l, op, r))
            }
            ast::Expr::Not(inner) => self.predicate(inner, dic, !negated),
            ast::Expr::IsNull { .. } => Err(unsupported("IS NULL")),
            ast::Expr::Subquery(_) => Err(unsupported("subquery in a predicate")),
            _ => Err(unsupported(format!("{} as a predicate", e))),
        }
    }
}

#[cfg(test)]
use crate::dsl::testing::{col, scenario_query};
#[cfg(test)]
use crate::pt_to_ast::pt_select_statement_to_ast;

#[cfg(test)]
fn test_schema() -> Schema {
    Schema::from_sql(
        "CREATE TABLE customers (id int, name varchar); CREATE TABLE orders (id int, cust int)",
    )
    .unwrap()
}

#[cfg(test)]
fn translate_sql(sql: &str) -> Result<(Component, Vec<String>), Error> {
    let stmt = pt_select_statement_to_ast(sql).unwrap();
    translate(&stmt, &test_schema(), &mut IdGenerator::new())
}

#[test]
fn test_translate_scenario() {
    let (query, names) = translate_sql(
        "SELECT customers.name FROM customers JOIN orders ON customers.id = orders.cust \
         WHERE orders.id = 5",
    )
    .unwrap();
    let (expected, _, _) = scenario_query();
    assert_eq!(query, expected);
    assert_eq!(names, vec!["name"]);
}

#[test]
fn test_translate_normalizes_predicates() {
    let (_, customers, orders) = scenario_query();
    let id = col(&orders, "id");
    let cust = col(&orders, "cust");
    let five = Component::int_const(5);
    struct Case {
        desc: &'static str,
        input: &'static str,
        expected: Component,
    }
    let cases = vec![
        Case {
            desc: "greater than swaps",
            input: "orders.id > 5",
            expected: Component::predicate_op(five.clone(), CompareOp::Lt, id.clone()),
        },
        Case {
            desc: "greater or equal swaps",
            input: "orders.id >= 5",
            expected: Component::predicate_op(five.clone(), CompareOp::Leq, id.clone()),
        },
        Case {
            desc: "bang equals",
            input: "orders.id != 5",
            expected: Component::predicate_op(id.clone(), CompareOp::Neq, five.clone()),
        },
        Case {
            desc: "not equal",
            input: "NOT orders.id = 5",
            expected: Component::predicate_op(id.clone(), CompareOp::Neq, five.clone()),
        },
        Case {
            desc: "not less than",
            input: "NOT orders.id < 5",
            expected: Component::predicate_op(five.clone(), CompareOp::Leq, id.clone()),
        },
        Case {
            desc: "not greater than",
            input: "NOT (orders.id > 5)",
            expected: Component::predicate_op(id.clone(), CompareOp::Leq, five.clone()),
        },
        Case {
            desc: "double negation",
            input: "NOT NOT orders.id < 5",
            expected: Component::predicate_op(id.clone(), CompareOp::Lt, five.clone()),
        },
        Case {
            desc: "de morgan",
            input: "NOT (orders.id = 5 AND cust = 5)",
            expected: Component::predicate_logic(
                Component::predicate_op(id.clone(), CompareOp::Neq, five.clone()),
                LogicOp::Or,
                Component::predicate_op(cust.clone(), CompareOp::Neq, five.clone()),
            ),
        },
        Case {
            desc: "unqualified unique column",
            input: "name = 'bob'",
            expected: Component::predicate_op(
                col(&customers, "name"),
                CompareOp::Eq,
                Component::string_const("bob"),
            ),
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let sql = format!(
            "SELECT customers.name FROM customers JOIN orders ON customers.id = orders.cust WHERE {}",
            case.input
        );
        let (query, _) = translate_sql(&sql).unwrap();
        assert_eq!(query.node().as_query().unwrap().where_clause, case.expected);
    }
}

#[test]
fn test_translate_right_join_and_aliases() {
    let (query, names) = translate_sql(
        "SELECT c.name AS who FROM orders o RIGHT JOIN customers c ON c.id = o.cust ORDER BY who DESC",
    )
    .unwrap();
    assert_eq!(names, vec!["who"]);
    let q = query.node().as_query().unwrap();
    let join = q.source.node().as_join().unwrap();
    assert_eq!(join.join_type, JoinType::Left);
    let left = join.larg.node().as_table_source().unwrap();
    assert_eq!(left.alias.as_deref(), Some("c"));
    assert_eq!(
        q.order_by.to_string(),
        "\"customers\".\"name\" DESC"
    );
}

#[test]
fn test_translate_grouping() {
    let (query, names) = translate_sql(
        "SELECT orders.cust, COUNT(DISTINCT orders.id) FROM orders GROUP BY 1 \
         HAVING COUNT(orders.id) > 2 ORDER BY COUNT(DISTINCT orders.id)",
    )
    .unwrap();
    assert_eq!(names, vec!["cust", "tmp"]);
    let q = query.node().as_query().unwrap();
    assert_eq!(q.group_by.to_string(), "\"orders\".\"cust\"");
    assert_eq!(q.having.to_string(), "2 < COUNT(\"orders\".\"id\")");
    assert_eq!(q.order_by.to_string(), "COUNT(\"orders\".\"id\") ASC");
    assert_eq!(
        q.select.to_string(),
        "\"orders\".\"cust\", COUNT(DISTINCT \"orders\".\"id\")"
    );
}

#[test]
fn test_translate_subquery_and_window() {
    let (query, _) = translate_sql(
        "SELECT s.total FROM (SELECT cust, SUM(id) AS total FROM orders GROUP BY cust) AS s",
    )
    .unwrap();
    assert_eq!(query.provided_chains()[0].to_string(), "SUM(\"orders\".\"id\")");

    let (query, _) = translate_sql(
        "SELECT DENSE_RANK() OVER (PARTITION BY cust ORDER BY id DESC) FROM orders",
    )
    .unwrap();
    assert_eq!(
        query.node().as_query().unwrap().select.to_string(),
        "DENSE_RANK() OVER (PARTITION BY \"orders\".\"cust\" ORDER BY \"orders\".\"id\" DESC)"
    );
}

#[test]
fn test_translate_errors() {
    struct Case {
        input: &'static str,
        expected: Error,
    }
    let cases = vec![
        Case {
            input: "SELECT id FROM customers JOIN orders ON customers.id = orders.cust",
            expected: Error::AliasResolutionAmbiguous(String::from("id")),
        },
        Case {
            input: "SELECT price FROM orders",
            expected: Error::AliasResolutionMissing(String::from("price")),
        },
        Case {
            input: "SELECT id FROM products",
            expected: Error::UnknownTable(String::from("products")),
        },
        Case {
            input: "SELECT * FROM orders",
            expected: unsupported("SELECT *"),
        },
        Case {
            input: "SELECT COUNT(*) FROM orders",
            expected: unsupported("count(*)"),
        },
        Case {
            input: "SELECT id FROM orders, customers",
            expected: unsupported("FROM with more than one item"),
        },
        Case {
            input: "SELECT id FROM orders WHERE cust IS NULL",
            expected: unsupported("IS NULL"),
        },
        Case {
            input: "SELECT id FROM orders WHERE id = (SELECT id FROM customers)",
            expected: unsupported("scalar subquery"),
        },
        Case {
            input: "SELECT median(id) FROM orders",
            expected: unsupported("function median"),
        },
    ];
    for case in cases {
        println!("Running case: {}", case.input);
        assert_eq!(translate_sql(case.input).unwrap_err(), case.expected);
    }
}
