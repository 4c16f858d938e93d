//! Predicates that prune bank lookups before candidates are built.

use std::collections::HashSet;

use crate::data_type::DataType;
use crate::dsl::{Component, Kind, Node};

#[derive(Debug, Clone)]
pub enum Constraint {
    /// Every chain the component requires is among these.
    FulfilledByProvidedChains(HashSet<Component>),
    /// Each side of a comparison draws from one of the two sets, and not the same one.
    /// Boolean connectives must satisfy this on both sides.
    TwoSideDifferentSource(HashSet<Component>, HashSet<Component>),
    NotIn(Vec<Component>),
    DataTypeIn(Vec<DataType>),
    /// None of the component's comparisons already appear in the template predicate.
    LogicExpressionNoDuplicates(HashSet<Component>),
    NotNone,
    NoAggInPredicate,
    AggregationOnly,
    NonAggregationOnly,
    ColumnEitherInGroupByOrAggregation(HashSet<Component>),
    MaxDepth(usize),
    /// None of the component's provided chains are among these.
    DisjointProvidedChains(HashSet<Component>),
}

/// The comparison atoms of a predicate tree.
pub fn atoms(c: &Component) -> Vec<Component> {
    match c.node() {
        Node::PredicateOp(_) => vec![c.clone()],
        Node::PredicateLogic(l) => {
            let mut v = atoms(&l.larg);
            v.extend(atoms(&l.rarg));
            v
        }
        _ => vec![],
    }
}

fn subset(chains: &[Component], of: &HashSet<Component>) -> bool {
    chains.iter().all(|c| of.contains(c))
}

fn two_side(c: &Component, left: &HashSet<Component>, right: &HashSet<Component>) -> bool {
    match c.node() {
        Node::PredicateOp(p) => {
            let (l, r) = (p.larg.required_chains(), p.rarg.required_chains());
            (subset(&l, left) && subset(&r, right)) || (subset(&l, right) && subset(&r, left))
        }
        Node::PredicateLogic(p) => two_side(&p.larg, left, right) && two_side(&p.rarg, left, right),
        _ => false,
    }
}

fn no_agg(c: &Component) -> bool {
    match c.node() {
        Node::Aggregation(_) => false,
        Node::PredicateOp(p) => no_agg(&p.larg) && no_agg(&p.rarg),
        Node::PredicateLogic(p) => no_agg(&p.larg) && no_agg(&p.rarg),
        _ => true,
    }
}

fn grouped(c: &Component, group: &HashSet<Component>) -> bool {
    match c.node() {
        Node::Aggregation(_) => true,
        Node::PredicateOp(p) => grouped(&p.larg, group) && grouped(&p.rarg, group),
        Node::PredicateLogic(p) => grouped(&p.larg, group) && grouped(&p.rarg, group),
        _ if c.kind().is_referencable_chain() => group.contains(c),
        _ => true,
    }
}

impl Constraint {
    pub fn fulfilled_by(chains: Vec<Component>) -> Constraint {
        Constraint::FulfilledByProvidedChains(chains.into_iter().collect())
    }

    pub fn no_duplicates_of(template: &Component) -> Constraint {
        Constraint::LogicExpressionNoDuplicates(atoms(template).into_iter().collect())
    }

    pub fn verify(&self, c: &Component) -> bool {
        match self {
            Constraint::FulfilledByProvidedChains(provided) => {
                subset(&c.required_chains(), provided)
            }
            Constraint::TwoSideDifferentSource(left, right) => two_side(c, left, right),
            Constraint::NotIn(black_list) => !black_list.contains(c),
            Constraint::DataTypeIn(types) => match c.data_type() {
                Some(t) => types.contains(&t),
                None => false,
            },
            Constraint::LogicExpressionNoDuplicates(template) => {
                atoms(c).iter().all(|a| !template.contains(a))
            }
            Constraint::NotNone => c.kind() != Kind::Absent,
            Constraint::NoAggInPredicate => no_agg(c),
            Constraint::AggregationOnly => c.kind() == Kind::Aggregation,
            Constraint::NonAggregationOnly => c.kind() != Kind::Aggregation,
            Constraint::ColumnEitherInGroupByOrAggregation(group) => grouped(c, group),
            Constraint::MaxDepth(n) => c.depth() <= *n,
            Constraint::DisjointProvidedChains(taken) => {
                c.provided_chains().iter().all(|p| !taken.contains(p))
            }
        }
    }
}

/// An AND-list of constraints, checked in order.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet(Vec<Constraint>);

impl ConstraintSet {
    pub fn new() -> ConstraintSet {
        ConstraintSet::default()
    }

    pub fn with(mut self, c: Constraint) -> ConstraintSet {
        self.0.push(c);
        self
    }

    pub fn verify(&self, c: &Component) -> bool {
        self.0.iter().all(|k| k.verify(c))
    }
}

impl From<Vec<Constraint>> for ConstraintSet {
    fn from(v: Vec<Constraint>) -> Self {
        ConstraintSet(v)
    }
}

#[cfg(test)]
use crate::dsl::testing::{col, customers_orders};
#[cfg(test)]
use crate::dsl::{AggFunc, CompareOp, LogicOp};

#[test]
fn test_constraints() {
    let (customers, orders) = customers_orders();
    let cid = col(&customers, "id");
    let cname = col(&customers, "name");
    let cust = col(&orders, "cust");
    let on = Component::predicate_op(cid.clone(), CompareOp::Eq, cust.clone());
    let same_side = Component::predicate_op(cid.clone(), CompareOp::Eq, cid.clone());
    let count = Component::aggregation(AggFunc::Count, cust.clone(), false);
    let having = Component::predicate_op(count.clone(), CompareOp::Lt, Component::int_const(3));

    let left: HashSet<Component> = customers.provided_chains().into_iter().collect();
    let right: HashSet<Component> = orders.provided_chains().into_iter().collect();

    struct Case {
        desc: &'static str,
        constraint: Constraint,
        input: Component,
        expected: bool,
    }
    let cases = vec![
        Case {
            desc: "fulfilled",
            constraint: Constraint::fulfilled_by(customers.provided_chains()),
            input: cname.clone(),
            expected: true,
        },
        Case {
            desc: "not fulfilled",
            constraint: Constraint::fulfilled_by(customers.provided_chains()),
            input: on.clone(),
            expected: false,
        },
        Case {
            desc: "two sides",
            constraint: Constraint::TwoSideDifferentSource(left.clone(), right.clone()),
            input: on.clone(),
            expected: true,
        },
        Case {
            desc: "two sides, swapped sets",
            constraint: Constraint::TwoSideDifferentSource(right.clone(), left.clone()),
            input: on.clone(),
            expected: true,
        },
        Case {
            desc: "one side only",
            constraint: Constraint::TwoSideDifferentSource(left.clone(), right.clone()),
            input: same_side.clone(),
            expected: false,
        },
        Case {
            desc: "two sides through AND",
            constraint: Constraint::TwoSideDifferentSource(left.clone(), right.clone()),
            input: Component::predicate_logic(on.clone(), LogicOp::And, same_side.clone()),
            expected: false,
        },
        Case {
            desc: "data type of a string column",
            constraint: Constraint::DataTypeIn(vec![DataType::Number]),
            input: cname.clone(),
            expected: false,
        },
        Case {
            desc: "predicates have no data type",
            constraint: Constraint::DataTypeIn(vec![DataType::Number, DataType::Str]),
            input: on.clone(),
            expected: false,
        },
        Case {
            desc: "duplicate atom",
            constraint: Constraint::no_duplicates_of(&on),
            input: Component::predicate_logic(on.clone(), LogicOp::Or, same_side.clone()),
            expected: false,
        },
        Case {
            desc: "fresh atom",
            constraint: Constraint::no_duplicates_of(&on),
            input: same_side.clone(),
            expected: true,
        },
        Case {
            desc: "absent",
            constraint: Constraint::NotNone,
            input: Component::absent(),
            expected: false,
        },
        Case {
            desc: "aggregate in predicate",
            constraint: Constraint::NoAggInPredicate,
            input: having.clone(),
            expected: false,
        },
        Case {
            desc: "aggregate chains are not aggregations",
            constraint: Constraint::NoAggInPredicate,
            input: Component::agg_chain(AggFunc::Count, cust.clone()),
            expected: true,
        },
        Case {
            desc: "aggregation only",
            constraint: Constraint::AggregationOnly,
            input: count.clone(),
            expected: true,
        },
        Case {
            desc: "non aggregation only",
            constraint: Constraint::NonAggregationOnly,
            input: count.clone(),
            expected: false,
        },
        Case {
            desc: "ungrouped column",
            constraint: Constraint::ColumnEitherInGroupByOrAggregation(HashSet::new()),
            input: cname.clone(),
            expected: false,
        },
        Case {
            desc: "grouped predicate",
            constraint: Constraint::ColumnEitherInGroupByOrAggregation(
                [cid.clone()].into_iter().collect(),
            ),
            input: Component::predicate_logic(having, LogicOp::And, same_side),
            expected: true,
        },
        Case {
            desc: "constants need no grouping",
            constraint: Constraint::ColumnEitherInGroupByOrAggregation(HashSet::new()),
            input: Component::int_const(1),
            expected: true,
        },
        Case {
            desc: "depth",
            constraint: Constraint::MaxDepth(0),
            input: Component::table_source(customers.clone(), None),
            expected: true,
        },
        Case {
            desc: "disjoint sources",
            constraint: Constraint::DisjointProvidedChains(left.clone()),
            input: Component::table_source(orders.clone(), None),
            expected: true,
        },
        Case {
            desc: "overlapping sources",
            constraint: Constraint::DisjointProvidedChains(left),
            input: Component::table_source(customers.clone(), None),
            expected: false,
        },
        Case {
            desc: "blacklisted",
            constraint: Constraint::NotIn(vec![cid.clone()]),
            input: cid,
            expected: false,
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        assert_eq!(case.constraint.verify(&case.input), case.expected);
    }
}

#[test]
fn test_constraint_set_is_conjunction() {
    let set = ConstraintSet::new()
        .with(Constraint::NotNone)
        .with(Constraint::MaxDepth(3));
    assert!(!set.verify(&Component::absent()));
    assert!(set.verify(&Component::int_const(1)));
    assert!(ConstraintSet::new().verify(&Component::absent()));
}
