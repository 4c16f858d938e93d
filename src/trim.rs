//! Projects a generated query down to exactly the output columns that are asked for.
//!
//! Trimming walks the query top-down. At each query level only the select items that provide a
//! needed chain survive; what the surviving items and the other clauses require becomes the
//! need passed to the source. When several items provide the same chain, every choice is a
//! separate result.

use std::collections::HashSet;

use itertools::Itertools;
use thiserror::Error;

use crate::dsl::{Component, Kind, Node, Query};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Query cannot provide the requested output columns.")]
    Unsatisfiable,
    #[error("{0} output names given for {1} output columns.")]
    OutputNames(usize, usize),
    #[error("Cannot trim a {0:?}.")]
    Unexpected(Kind),
}

/// Every minimal form of `query` whose SELECT list provides `necessary` in order, with output
/// `i` aliased to `output_names[i]`.
pub fn trim(
    query: &Component,
    necessary: &[Component],
    output_names: &[String],
) -> Result<Vec<Component>, Error> {
    if necessary.len() != output_names.len() {
        return Err(Error::OutputNames(output_names.len(), necessary.len()));
    }
    let provided: HashSet<Component> = query.provided_chains().into_iter().collect();
    if !necessary.iter().all(|c| provided.contains(c)) {
        return Err(Error::Unsatisfiable);
    }
    let needed: HashSet<Component> = necessary.iter().cloned().collect();
    trim_query(query, &needed)?
        .iter()
        .map(|q| project(q, necessary, output_names))
        .collect()
}

fn first_provided(item: &Component) -> Option<Component> {
    item.provided_chains().into_iter().next()
}

/// Reorders the SELECT list of a trimmed query to match `necessary` and names the outputs.
fn project(
    query: &Component,
    necessary: &[Component],
    output_names: &[String],
) -> Result<Component, Error> {
    let Some(q) = query.node().as_query() else {
        return Err(Error::Unexpected(query.kind()));
    };
    let Some(items) = q.select.node().as_select_clause() else {
        return Err(Error::Unexpected(q.select.kind()));
    };
    let mut select = vec![];
    for (chain, name) in necessary.iter().zip(output_names) {
        let Some(item) = items
            .iter()
            .find(|i| first_provided(i).as_ref() == Some(chain))
        else {
            return Err(Error::Unsatisfiable);
        };
        let inner = match item.node() {
            Node::SelectItemAlias(a) => a.item.clone(),
            _ => item.clone(),
        };
        select.push(Component::aliased(inner, name));
    }
    Ok(Component::query(Query {
        select: Component::select_clause(select),
        ..q.clone()
    }))
}

fn trim_query(query: &Component, needed: &HashSet<Component>) -> Result<Vec<Component>, Error> {
    let Some(q) = query.node().as_query() else {
        return Err(Error::Unexpected(query.kind()));
    };
    let Some(items) = q.select.node().as_select_clause() else {
        return Err(Error::Unexpected(q.select.kind()));
    };
    let ordered = q.order_by.required_chains();

    // Candidate items per kept chain, in SELECT order.
    let mut choices: Vec<(Component, Vec<Component>)> = vec![];
    for item in items {
        let Some(chain) = first_provided(item) else {
            continue;
        };
        if !needed.contains(&chain) && !ordered.contains(&chain) {
            continue;
        }
        match choices.iter_mut().find(|(c, _)| *c == chain) {
            Some((_, alternatives)) => alternatives.push(item.clone()),
            None => choices.push((chain, vec![item.clone()])),
        }
    }
    if choices.is_empty() {
        return Err(Error::Unsatisfiable);
    }

    let clauses: Vec<Component> = [&q.where_clause, &q.group_by, &q.having, &q.order_by]
        .into_iter()
        .flat_map(|c| c.required_chains())
        .collect();
    let mut out = vec![];
    for chosen in choices
        .into_iter()
        .map(|(_, alternatives)| alternatives)
        .multi_cartesian_product()
    {
        let below: HashSet<Component> = chosen
            .iter()
            .flat_map(|i| i.required_chains())
            .chain(clauses.iter().cloned())
            .collect();
        for source in trim_source(&q.source, &below)? {
            out.push(Component::query(Query {
                select: Component::select_clause(chosen.clone()),
                source,
                ..q.clone()
            }));
        }
    }
    Ok(out)
}

fn trim_source(source: &Component, needed: &HashSet<Component>) -> Result<Vec<Component>, Error> {
    match source.node() {
        Node::TableSource(_) => Ok(vec![source.clone()]),
        Node::QuerySource(s) => Ok(trim_query(&s.query, needed)?
            .into_iter()
            .map(|q| Component::query_source(q, s.alias.clone()))
            .collect()),
        Node::Join(j) => {
            // ON chains are needed on both sides; each side keeps only what it provides.
            let mut both = needed.clone();
            both.extend(j.on.required_chains());
            let lefts = trim_source(&j.larg, &both)?;
            let rights = trim_source(&j.rarg, &both)?;
            Ok(lefts
                .iter()
                .cartesian_product(rights.iter())
                .map(|(l, r)| Component::join(l.clone(), r.clone(), j.join_type, j.on.clone()))
                .collect())
        }
        _ => Err(Error::Unexpected(source.kind())),
    }
}

#[cfg(test)]
use crate::dsl::testing::{col, customers_orders, scenario_query};
#[cfg(test)]
use crate::dsl::{AggFunc, CompareOp, JoinType};

#[cfg(test)]
fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| String::from(*s)).collect()
}

#[test]
fn test_trim_scenario() {
    let (query, customers, _) = scenario_query();
    let got = trim(&query, &[col(&customers, "name")], &names(&["name"])).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(
        got[0].to_string(),
        "SELECT \"customers\".\"name\" AS \"name\" FROM \"customers\" INNER JOIN \"orders\" \
         ON \"customers\".\"id\" = \"orders\".\"cust\" WHERE \"orders\".\"id\" = 5"
    );
}

#[test]
fn test_trim_unsatisfiable() {
    let (query, customers, orders) = scenario_query();
    struct Case {
        desc: &'static str,
        necessary: Vec<Component>,
        names: Vec<String>,
        expected: Error,
    }
    let cases = vec![
        Case {
            desc: "second column is not selected",
            necessary: vec![col(&customers, "name"), col(&orders, "id")],
            names: names(&["name", "id"]),
            expected: Error::Unsatisfiable,
        },
        Case {
            desc: "names do not match",
            necessary: vec![col(&customers, "name")],
            names: names(&["name", "id"]),
            expected: Error::OutputNames(2, 1),
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        assert_eq!(
            trim(&query, &case.necessary, &case.names),
            Err(case.expected)
        );
    }
}

#[test]
fn test_trim_ambiguous_items() {
    let (customers, orders) = customers_orders();
    let plain = Component::aggregation(AggFunc::Count, col(&orders, "id"), false);
    let distinct = Component::aggregation(AggFunc::Count, col(&orders, "id"), true);
    let query = Component::query(Query {
        select: Component::select_clause(vec![
            col(&customers, "name"),
            plain.clone(),
            distinct.clone(),
        ]),
        source: Component::join(
            Component::table_source(customers.clone(), None),
            Component::table_source(orders.clone(), None),
            JoinType::Inner,
            Component::predicate_op(col(&customers, "id"), CompareOp::Eq, col(&orders, "cust")),
        ),
        where_clause: Component::absent(),
        group_by: Component::group_by_list(vec![col(&customers, "name")]),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    });
    let count = Component::agg_chain(AggFunc::Count, col(&orders, "id"));
    let got = trim(&query, &[count], &names(&["n"])).unwrap();
    assert_eq!(got.len(), 2);
    let firsts: Vec<Component> = got
        .iter()
        .map(|q| {
            let items = q.node().as_query().unwrap().select.node().as_select_clause().unwrap();
            assert_eq!(items.len(), 1);
            items[0].node().as_select_item_alias().unwrap().item.clone()
        })
        .collect();
    assert_eq!(firsts, vec![plain, distinct]);
}

#[test]
fn test_trim_drops_unneeded_subquery_outputs() {
    let (customers, orders) = customers_orders();
    let inner = Component::query(Query {
        select: Component::select_clause(vec![col(&orders, "cust"), col(&orders, "id")]),
        source: Component::table_source(orders.clone(), None),
        where_clause: Component::predicate_op(col(&orders, "id"), CompareOp::Lt, Component::int_const(9)),
        group_by: Component::absent(),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    });
    let query = Component::query(Query {
        select: Component::select_clause(vec![col(&customers, "name")]),
        source: Component::join(
            Component::table_source(customers.clone(), None),
            Component::query_source(inner, None),
            JoinType::Left,
            Component::predicate_op(col(&customers, "id"), CompareOp::Eq, col(&orders, "cust")),
        ),
        where_clause: Component::absent(),
        group_by: Component::absent(),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    });
    let got = trim(&query, &[col(&customers, "name")], &names(&["name"])).unwrap();
    assert_eq!(got.len(), 1);
    let join = got[0].node().as_query().unwrap().source.node().as_join().unwrap().clone();
    let sub = join.rarg.node().as_query_source().unwrap().query.clone();
    assert_eq!(sub.provided_chains(), vec![col(&orders, "cust")]);
}
