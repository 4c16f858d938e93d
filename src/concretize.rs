//! Binds the abstract chains of a trimmed query to concrete `"alias"."column"` references.
//!
//! Sources are concretized first and hand an environment upwards: a table binds each of its
//! columns under its alias, a subquery binds each of its outputs under the subquery's alias,
//! and a join merges both sides. Every chain used by an expression is then looked up in the
//! environment and replaced by a [`RealCol`](crate::dsl::RealCol).

use std::collections::HashMap;

use thiserror::Error;

use crate::dsl::{Component, Kind, Node, Query};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("No binding for {0}.")]
    BindingMissing(String),
    #[error("More than one binding for {0}.")]
    BindingAmbiguous(String),
    #[error("Cannot concretize a {0:?} in this position.")]
    Unexpected(Kind),
}

/// Hands out fresh table and column aliases, numbered per hint. One generator is used for the
/// whole of one candidate.
#[derive(Debug, Default)]
pub struct NameGenerator {
    hints: HashMap<String, usize>,
}

impl NameGenerator {
    pub fn new() -> NameGenerator {
        NameGenerator::default()
    }

    fn next(&mut self, hint: &str) -> usize {
        let n = self.hints.entry(String::from(hint)).or_insert(0);
        let idx = *n;
        *n += 1;
        idx
    }

    /// `T_<hint>_<n>`.
    pub fn table_name(&mut self, hint: &str) -> String {
        let hint = format!("T_{}", hint);
        let idx = self.next(&hint);
        format!("{}_{}", hint, idx)
    }

    /// `c_<hint><n>`, or `c_<n>` without a hint.
    pub fn col_name(&mut self, hint: Option<&str>) -> String {
        match hint {
            Some(h) if !h.is_empty() => {
                let hint = format!("c_{}", h);
                let idx = self.next(&hint);
                format!("{}{}", hint, idx)
            }
            _ => format!("c_{}", self.next("")),
        }
    }
}

/// Where a chain can be read from: `table` is empty for an output alias of the current query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub table: String,
    pub column: String,
}

impl Binding {
    pub fn new(table: &str, column: &str) -> Binding {
        Binding {
            table: String::from(table),
            column: String::from(column),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConcretizeEnv {
    bindings: HashMap<Component, Vec<Binding>>,
}

impl ConcretizeEnv {
    pub fn new() -> ConcretizeEnv {
        ConcretizeEnv::default()
    }

    pub fn bind(mut self, chain: Component, binding: Binding) -> ConcretizeEnv {
        let entry = self.bindings.entry(chain).or_default();
        if !entry.contains(&binding) {
            entry.push(binding);
        }
        self
    }

    pub fn merge(self, other: ConcretizeEnv) -> ConcretizeEnv {
        let mut out = self;
        for (chain, bindings) in other.bindings {
            for b in bindings {
                out = out.bind(chain.clone(), b);
            }
        }
        out
    }

    /// The same chains, now read through the source aliased `table`.
    pub fn rebind(self, table: &str) -> ConcretizeEnv {
        ConcretizeEnv {
            bindings: self
                .bindings
                .into_iter()
                .map(|(chain, bindings)| {
                    let moved = bindings
                        .into_iter()
                        .map(|b| Binding::new(table, &b.column))
                        .collect();
                    (chain, moved)
                })
                .collect(),
        }
    }

    pub fn contains(&self, chain: &Component) -> bool {
        self.bindings.contains_key(chain)
    }

    fn lookup(&self, chain: &Component) -> Result<Option<&Binding>, Error> {
        match self.bindings.get(chain).map(|v| v.as_slice()) {
            None | Some([]) => Ok(None),
            Some([b]) => Ok(Some(b)),
            Some(_) => Err(Error::BindingAmbiguous(chain.to_string())),
        }
    }
}

/// Resolves `chain` in the first environment that binds it.
fn resolve(chain: &Component, scopes: &[&ConcretizeEnv]) -> Result<Component, Error> {
    for env in scopes {
        if let Some(b) = env.lookup(chain)? {
            return Ok(Component::real_col(&b.table, &b.column, chain.clone()));
        }
    }
    Err(Error::BindingMissing(chain.to_string()))
}

/// The hint a generated output alias is named after.
fn alias_hint(item: &Component) -> Option<&str> {
    match item.node() {
        Node::ColChain(c) => Some(&c.column),
        Node::RealCol(r) => Some(&r.column),
        Node::AggChain(a) => Some(a.func.name()),
        Node::Aggregation(a) => Some(a.func.name()),
        Node::WindowFuncChain(w) => Some(w.func.name()),
        Node::WindowFuncClause(f) => Some(f.name()),
        Node::WindowCallAgg(w) | Node::WindowCallFunc(w) => alias_hint(&w.func),
        Node::SelectItemAlias(a) => Some(&a.alias),
        _ => None,
    }
}

fn expr_list(items: &[Component], scopes: &[&ConcretizeEnv]) -> Result<Vec<Component>, Error> {
    items.iter().map(|i| expr(i, scopes)).collect()
}

/// Concretizes a value, predicate or list used inside a query.
fn expr(c: &Component, scopes: &[&ConcretizeEnv]) -> Result<Component, Error> {
    Ok(match c.node() {
        Node::ColChain(_) | Node::AggChain(_) | Node::WindowFuncChain(_) => resolve(c, scopes)?,
        Node::IntConst(_)
        | Node::FloatConst(_)
        | Node::StringConst(_)
        | Node::Absent
        | Node::RealCol(_)
        | Node::WindowFuncClause(_) => c.clone(),
        Node::Aggregation(a) => {
            Component::aggregation(a.func, expr(&a.parameter, scopes)?, a.distinct)
        }
        Node::WindowCallAgg(w) => Component::window_call_agg(
            expr(&w.func, scopes)?,
            expr(&w.partition, scopes)?,
            expr(&w.order_by, scopes)?,
        ),
        Node::WindowCallFunc(w) => Component::window_call_func(
            expr(&w.func, scopes)?,
            expr(&w.partition, scopes)?,
            expr(&w.order_by, scopes)?,
        ),
        Node::PartitionList(items) => Component::partition_list(expr_list(items, scopes)?),
        Node::GroupByList(items) => Component::group_by_list(expr_list(items, scopes)?),
        Node::OrderByList(items) => Component::order_by_list(expr_list(items, scopes)?),
        Node::OrderByItem(o) => Component::order_by_item(expr(&o.chain, scopes)?, o.dir),
        Node::PredicateOp(p) => {
            Component::predicate_op(expr(&p.larg, scopes)?, p.op, expr(&p.rarg, scopes)?)
        }
        Node::PredicateLogic(p) => {
            Component::predicate_logic(expr(&p.larg, scopes)?, p.op, expr(&p.rarg, scopes)?)
        }
        Node::SelectItemAlias(a) => Component::aliased(expr(&a.item, scopes)?, &a.alias),
        _ => return Err(Error::Unexpected(c.kind())),
    })
}

fn source(c: &Component, names: &mut NameGenerator) -> Result<(Component, ConcretizeEnv), Error> {
    match c.node() {
        Node::TableSource(t) => {
            let alias = match &t.alias {
                Some(a) => a.clone(),
                None => {
                    let name = t.table.node().as_table().map(|t| t.name.clone());
                    names.table_name(&name.unwrap_or_default())
                }
            };
            let mut env = ConcretizeEnv::new();
            for chain in t.table.provided_chains() {
                if let Some(col) = chain.node().as_col_chain() {
                    let b = Binding::new(&alias, &col.column);
                    env = env.bind(chain.clone(), b);
                }
            }
            Ok((Component::table_source(t.table.clone(), Some(alias)), env))
        }
        Node::QuerySource(q) => {
            let (inner, env) = query(&q.query, names)?;
            let alias = match &q.alias {
                Some(a) => a.clone(),
                None => names.table_name("cte"),
            };
            let env = env.rebind(&alias);
            Ok((Component::query_source(inner, Some(alias)), env))
        }
        Node::Join(j) => {
            let (l, lenv) = source(&j.larg, names)?;
            let (r, renv) = source(&j.rarg, names)?;
            let env = lenv.merge(renv);
            let on = expr(&j.on, &[&env])?;
            Ok((Component::join(l, r, j.join_type, on), env))
        }
        _ => Err(Error::Unexpected(c.kind())),
    }
}

fn is_aggregate(item: &Component) -> bool {
    match item.node() {
        Node::SelectItemAlias(a) => is_aggregate(&a.item),
        Node::Aggregation(_) | Node::AggChain(_) => true,
        _ => false,
    }
}

/// Resolves ORDER BY keys against the outputs, then the source. In a grouped query an
/// aggregate key that no output provides is computed again over the source.
fn order_keys(
    c: &Component,
    outputs: &ConcretizeEnv,
    env: &ConcretizeEnv,
    grouped: bool,
) -> Result<Component, Error> {
    match c.node() {
        Node::OrderByList(items) => {
            let keys = items
                .iter()
                .map(|i| order_keys(i, outputs, env, grouped))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Component::order_by_list(keys))
        }
        Node::OrderByItem(o) => Ok(Component::order_by_item(
            order_keys(&o.chain, outputs, env, grouped)?,
            o.dir,
        )),
        Node::AggChain(a) if grouped && !outputs.contains(c) && !env.contains(c) => Ok(
            Component::aggregation(a.func, expr(&a.child, &[env])?, false),
        ),
        _ => expr(c, &[outputs, env]),
    }
}

/// Concretizes a query and returns the environment of its outputs, bound to their aliases.
fn query(c: &Component, names: &mut NameGenerator) -> Result<(Component, ConcretizeEnv), Error> {
    let Some(q) = c.node().as_query() else {
        return Err(Error::Unexpected(c.kind()));
    };
    let (src, env) = source(&q.source, names)?;
    let where_clause = expr(&q.where_clause, &[&env])?;
    let group_by = expr(&q.group_by, &[&env])?;
    let having = expr(&q.having, &[&env])?;

    let mut items = vec![];
    let mut outputs = ConcretizeEnv::new();
    let Some(select) = q.select.node().as_select_clause() else {
        return Err(Error::Unexpected(q.select.kind()));
    };
    for item in select {
        let (inner, alias) = match item.node() {
            Node::SelectItemAlias(a) => (expr(&a.item, &[&env])?, a.alias.clone()),
            _ => (expr(item, &[&env])?, names.col_name(alias_hint(item))),
        };
        if let Some(chain) = item.provided_chains().into_iter().next() {
            if !outputs.contains(&chain) {
                outputs = outputs.bind(chain, Binding::new("", &alias));
            }
        }
        items.push(Component::aliased(inner, &alias));
    }

    let grouped = !q.group_by.is_absent() || select.iter().any(is_aggregate);
    let order_by = order_keys(&q.order_by, &outputs, &env, grouped)?;
    let concrete = Component::query(Query {
        select: Component::select_clause(items),
        source: src,
        where_clause,
        group_by,
        having,
        order_by,
        distinct: q.distinct,
    });
    Ok((concrete, outputs))
}

/// Binds every chain of `c` to a concrete reference. Fresh aliases come from `names`.
pub fn concretize(c: &Component, names: &mut NameGenerator) -> Result<Component, Error> {
    query(c, names).map(|(q, _)| q)
}

#[cfg(test)]
use crate::dsl::testing::{col, customers_orders, scenario_query};
#[cfg(test)]
use crate::dsl::{AggFunc, CompareOp, JoinType};

#[test]
fn test_name_generator() {
    let mut names = NameGenerator::new();
    assert_eq!(names.table_name("orders"), "T_orders_0");
    assert_eq!(names.table_name("orders"), "T_orders_1");
    assert_eq!(names.table_name("cte"), "T_cte_0");
    assert_eq!(names.col_name(Some("id")), "c_id0");
    assert_eq!(names.col_name(Some("id")), "c_id1");
    assert_eq!(names.col_name(None), "c_0");
    assert_eq!(names.col_name(Some("")), "c_1");
}

#[test]
fn test_env_lookup() {
    let (customers, _) = customers_orders();
    let id = col(&customers, "id");
    let env = ConcretizeEnv::new().bind(id.clone(), Binding::new("T_customers_0", "id"));
    assert_eq!(
        resolve(&id, &[&env]).unwrap().to_string(),
        "\"T_customers_0\".\"id\""
    );
    let moved = env.clone().rebind("T_cte_0");
    assert_eq!(
        resolve(&id, &[&moved]).unwrap().to_string(),
        "\"T_cte_0\".\"id\""
    );
    let both = env.merge(moved);
    assert!(matches!(
        resolve(&id, &[&both]),
        Err(Error::BindingAmbiguous(_))
    ));
    let name = col(&customers, "name");
    assert!(matches!(
        resolve(&name, &[&both]),
        Err(Error::BindingMissing(_))
    ));
}

#[test]
fn test_concretize_scenario() {
    let (query, _, _) = scenario_query();
    let mut names = NameGenerator::new();
    let got = concretize(&query, &mut names).unwrap();
    assert_eq!(
        got.to_string(),
        "SELECT \"T_customers_0\".\"name\" AS \"c_name0\" FROM \"customers\" AS \"T_customers_0\" \
         INNER JOIN \"orders\" AS \"T_orders_0\" ON \"T_customers_0\".\"id\" = \"T_orders_0\".\"cust\" \
         WHERE \"T_orders_0\".\"id\" = 5"
    );
}

#[test]
fn test_concretize_subquery_and_order_by_alias() {
    let (customers, orders) = customers_orders();
    let count = Component::aggregation(AggFunc::Count, col(&orders, "id"), false);
    let inner = Component::query(Query {
        select: Component::select_clause(vec![col(&orders, "cust"), count]),
        source: Component::table_source(orders.clone(), None),
        where_clause: Component::absent(),
        group_by: Component::group_by_list(vec![col(&orders, "cust")]),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    });
    let count_chain = Component::agg_chain(AggFunc::Count, col(&orders, "id"));
    let outer = Component::query(Query {
        select: Component::select_clause(vec![col(&customers, "name"), count_chain.clone()]),
        source: Component::join(
            Component::table_source(customers.clone(), None),
            Component::query_source(inner, None),
            JoinType::Inner,
            Component::predicate_op(col(&customers, "id"), CompareOp::Eq, col(&orders, "cust")),
        ),
        where_clause: Component::absent(),
        group_by: Component::absent(),
        having: Component::absent(),
        order_by: Component::order_by_list(vec![Component::order_by_item(
            count_chain,
            crate::dsl::OrderDir::Desc,
        )]),
        distinct: false,
    });
    let got = concretize(&outer, &mut NameGenerator::new()).unwrap();
    assert_eq!(
        got.to_string(),
        "SELECT \"T_customers_0\".\"name\" AS \"c_name0\", \"T_cte_0\".\"c_count0\" AS \"c_count1\" \
         FROM \"customers\" AS \"T_customers_0\" INNER JOIN (SELECT \"T_orders_0\".\"cust\" AS \"c_cust0\", \
         COUNT(\"T_orders_0\".\"id\") AS \"c_count0\" FROM \"orders\" AS \"T_orders_0\" \
         GROUP BY \"T_orders_0\".\"cust\") AS \"T_cte_0\" ON \"T_customers_0\".\"id\" = \"T_cte_0\".\"c_cust0\" \
         ORDER BY \"c_count1\" DESC"
    );
}

#[test]
fn test_aggregate_chain_without_binding_fails() {
    let (query, _, orders) = scenario_query();
    let parts = query.node().as_query().unwrap();
    let bad = Component::query(Query {
        where_clause: Component::predicate_op(
            Component::agg_chain(AggFunc::Max, col(&orders, "id")),
            CompareOp::Eq,
            Component::int_const(5),
        ),
        ..parts.clone()
    });
    assert!(matches!(
        concretize(&bad, &mut NameGenerator::new()),
        Err(Error::BindingMissing(_))
    ));
}

#[test]
fn test_order_by_aggregate_not_selected() {
    let (_, orders) = customers_orders();
    let count_chain = Component::agg_chain(AggFunc::Count, col(&orders, "id"));
    let grouped = Component::query(Query {
        select: Component::select_clause(vec![col(&orders, "cust")]),
        source: Component::table_source(orders.clone(), None),
        where_clause: Component::absent(),
        group_by: Component::group_by_list(vec![col(&orders, "cust")]),
        having: Component::absent(),
        order_by: Component::order_by_list(vec![Component::order_by_item(
            count_chain,
            crate::dsl::OrderDir::Asc,
        )]),
        distinct: false,
    });
    let got = concretize(&grouped, &mut NameGenerator::new()).unwrap();
    assert_eq!(
        got.to_string(),
        "SELECT \"T_orders_0\".\"cust\" AS \"c_cust0\" FROM \"orders\" AS \"T_orders_0\" \
         GROUP BY \"T_orders_0\".\"cust\" ORDER BY COUNT(\"T_orders_0\".\"id\") ASC"
    );

    // Without grouping the aggregate cannot be ordered on.
    let parts = grouped.node().as_query().unwrap();
    let ungrouped = Component::query(Query {
        group_by: Component::absent(),
        ..parts.clone()
    });
    assert!(matches!(
        concretize(&ungrouped, &mut NameGenerator::new()),
        Err(Error::BindingMissing(_))
    ));
}
