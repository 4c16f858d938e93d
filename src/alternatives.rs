//! One-shot rewrites applied to the seed bank before the search starts.
//!
//! Each rule proposes components that are likely equivalent to something in the input query
//! (a GROUP BY as a PARTITION BY, a grouping column swapped for one it is joined on, ...). The
//! proposals go into the bank and their counters are made free in the cost model.

use itertools::Itertools;

use crate::bank::Bank;
use crate::constraints::ConstraintSet;
use crate::cost::CostEstimator;
use crate::dsl::{Category, CompareOp, Component, ComponentCounter, Kind, Node, OrderDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeRule {
    PartitionByToGroupBy,
    GroupBySubsets,
    GroupByTransitive,
    GroupBySameColName,
    GroupByToPartitionBy,
    LtToOrderBy,
}

impl AlternativeRule {
    /// The rules in application order.
    pub const ALL: [AlternativeRule; 6] = [
        AlternativeRule::PartitionByToGroupBy,
        AlternativeRule::GroupBySubsets,
        AlternativeRule::GroupByTransitive,
        AlternativeRule::GroupBySameColName,
        AlternativeRule::GroupByToPartitionBy,
        AlternativeRule::LtToOrderBy,
    ];

    /// The proposed components and the counter to register as allowance.
    pub fn generate_alternatives(
        &self,
        bank: &Bank,
        est: &CostEstimator,
    ) -> (Vec<Component>, ComponentCounter) {
        let out = match self {
            AlternativeRule::PartitionByToGroupBy => seed(bank, est, Kind::PartitionList)
                .iter()
                .filter_map(|c| c.node().as_partition_list().cloned())
                .map(Component::group_by_list)
                .collect(),
            AlternativeRule::GroupByToPartitionBy => group_lists(bank, est)
                .into_iter()
                .map(Component::partition_list)
                .collect(),
            AlternativeRule::GroupBySubsets => group_lists(bank, est)
                .into_iter()
                .flat_map(|items| {
                    (1..items.len())
                        .flat_map(|k| items.iter().cloned().combinations(k))
                        .collect::<Vec<_>>()
                })
                .map(Component::group_by_list)
                .collect(),
            AlternativeRule::GroupBySameColName => group_lists(bank, est)
                .into_iter()
                .flat_map(|items| {
                    items
                        .iter()
                        .map(|c| same_name_chains(c, bank, est))
                        .multi_cartesian_product()
                        .collect::<Vec<_>>()
                })
                .map(Component::group_by_list)
                .collect(),
            AlternativeRule::GroupByTransitive => group_by_transitive(bank, est),
            AlternativeRule::LtToOrderBy => lt_to_order_by(bank, est),
        };
        let mut allowance = ComponentCounter::new();
        for c in &out {
            allowance.add(c.counter());
        }
        (out, allowance)
    }
}

/// Bank components of `kind` that are free under the global model.
fn seed(bank: &Bank, est: &CostEstimator, kind: Kind) -> Vec<Component> {
    bank.get_from_bank(
        Category::Is(kind),
        0,
        est.model(),
        est,
        &ConstraintSet::new(),
    )
}

fn group_lists(bank: &Bank, est: &CostEstimator) -> Vec<Vec<Component>> {
    seed(bank, est, Kind::GroupByList)
        .iter()
        .filter_map(|c| c.node().as_group_by_list().cloned())
        .collect()
}

/// Chains standing for the same column name on any table instance in the bank. Aggregate
/// chains are expanded through their argument; any other chain stands only for itself.
pub fn same_name_chains(chain: &Component, bank: &Bank, est: &CostEstimator) -> Vec<Component> {
    match chain.node() {
        Node::ColChain(c) => seed(bank, est, Kind::Table)
            .iter()
            .flat_map(|t| t.provided_chains())
            .filter(|p| p.node().as_col_chain().map(|pc| pc.column == c.column) == Some(true))
            .collect(),
        Node::AggChain(a) => same_name_chains(&a.child, bank, est)
            .into_iter()
            .map(|inner| Component::agg_chain(a.func, inner))
            .collect(),
        _ => vec![chain.clone()],
    }
}

fn group_by_transitive(bank: &Bank, est: &CostEstimator) -> Vec<Component> {
    let equalities: Vec<Component> = seed(bank, est, Kind::PredicateOp);
    let mut out = vec![];
    for items in group_lists(bank, est) {
        let [reference] = items.as_slice() else {
            continue;
        };
        for eq in &equalities {
            let Some(p) = eq.node().as_predicate_op() else {
                continue;
            };
            if p.op != CompareOp::Eq {
                continue;
            }
            if &p.larg == reference {
                out.push(Component::group_by_list(vec![p.rarg.clone()]));
            } else if &p.rarg == reference {
                out.push(Component::group_by_list(vec![p.larg.clone()]));
            }
        }
    }
    out
}

fn lt_to_order_by(bank: &Bank, est: &CostEstimator) -> Vec<Component> {
    let mut out = vec![];
    for pred in seed(bank, est, Kind::PredicateOp) {
        let Some(p) = pred.node().as_predicate_op() else {
            continue;
        };
        if !matches!(p.op, CompareOp::Lt | CompareOp::Leq) {
            continue;
        }
        for side in [&p.larg, &p.rarg] {
            if side.kind().is_referencable_chain() {
                let item = Component::order_by_item(side.clone(), OrderDir::Asc);
                out.push(Component::order_by_list(vec![item]));
            }
        }
    }
    out
}

#[cfg(test)]
use crate::dsl::testing::{col, customers_orders};
#[cfg(test)]
use crate::dsl::{AggFunc, JoinType, Query};

#[cfg(test)]
fn grouped_query() -> (Component, Component, Component) {
    let (customers, orders) = customers_orders();
    let on = Component::predicate_op(
        col(&customers, "id"),
        CompareOp::Eq,
        col(&orders, "cust"),
    );
    let query = Component::query(Query {
        select: Component::select_clause(vec![
            col(&customers, "id"),
            Component::aggregation(AggFunc::Count, col(&orders, "id"), false),
        ]),
        source: Component::join(
            Component::table_source(customers.clone(), None),
            Component::table_source(orders.clone(), None),
            JoinType::Inner,
            on,
        ),
        where_clause: Component::predicate_op(
            col(&orders, "id"),
            CompareOp::Lt,
            Component::int_const(10),
        ),
        group_by: Component::group_by_list(vec![col(&customers, "id")]),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    });
    (query, customers, orders)
}

#[test]
fn test_alternative_rules() {
    let (query, customers, orders) = grouped_query();
    let est = CostEstimator::new(&query);
    let mut bank = Bank::new();
    bank.extend(query.all_components());

    struct Case {
        rule: AlternativeRule,
        expected: Vec<Component>,
    }
    let cases = vec![
        Case {
            rule: AlternativeRule::GroupByToPartitionBy,
            expected: vec![Component::partition_list(vec![col(&customers, "id")])],
        },
        Case {
            rule: AlternativeRule::PartitionByToGroupBy,
            expected: vec![],
        },
        Case {
            rule: AlternativeRule::GroupBySubsets,
            expected: vec![],
        },
        Case {
            rule: AlternativeRule::GroupByTransitive,
            expected: vec![Component::group_by_list(vec![col(&orders, "cust")])],
        },
        Case {
            rule: AlternativeRule::GroupBySameColName,
            expected: vec![
                Component::group_by_list(vec![col(&customers, "id")]),
                Component::group_by_list(vec![col(&orders, "id")]),
            ],
        },
        Case {
            rule: AlternativeRule::LtToOrderBy,
            expected: vec![Component::order_by_list(vec![Component::order_by_item(
                col(&orders, "id"),
                OrderDir::Asc,
            )])],
        },
    ];
    for case in cases {
        println!("Running case: {:?}", case.rule);
        let (got, allowance) = case.rule.generate_alternatives(&bank, &est);
        assert_eq!(got, case.expected);
        for c in &got {
            assert!(allowance.contains(&c.fingerprint()));
        }
    }
}

#[test]
fn test_allowance_makes_alternatives_free() {
    let (query, _, orders) = grouped_query();
    let mut est = CostEstimator::new(&query);
    let mut bank = Bank::new();
    bank.extend(query.all_components());
    let swapped = Component::group_by_list(vec![col(&orders, "cust")]);
    assert_eq!(est.cost(&swapped), 1);
    let (got, allowance) = AlternativeRule::GroupByTransitive.generate_alternatives(&bank, &est);
    bank.extend(got);
    est.update_allow_cost_model(&allowance);
    assert!(bank.contains(&swapped));
    assert_eq!(est.cost(&swapped), 0);
}

#[test]
fn test_same_name_chains() {
    let (query, customers, orders) = grouped_query();
    let est = CostEstimator::new(&query);
    let mut bank = Bank::new();
    bank.extend(query.all_components());
    let ids = same_name_chains(&col(&customers, "id"), &bank, &est);
    assert_eq!(ids, vec![col(&customers, "id"), col(&orders, "id")]);
    let counts = same_name_chains(
        &Component::agg_chain(AggFunc::Count, col(&orders, "id")),
        &bank,
        &est,
    );
    assert_eq!(counts.len(), 2);
    let five = Component::int_const(5);
    assert_eq!(same_name_chains(&five, &bank, &est), vec![five]);
}
