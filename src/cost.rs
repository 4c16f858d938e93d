//! Structural edit distance between a candidate and the input query.
//!
//! The template is the component counter of the input query plus the terminal library. A
//! candidate's cost is taken over its counter minus the model: every excess chain or aggregate
//! function name costs 1 no matter how often it is used (and nothing if the template already
//! has it), every other excess component costs its multiplicity.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::dsl::{terminal_library, Component, ComponentCounter, Fingerprint, Kind};

pub type Cost = i64;

/// The counter a cost is measured against. During generation a composite's later siblings are
/// costed against a remainder model from which the earlier siblings have been removed.
#[derive(Debug, Clone)]
pub struct CostModel {
    counter: ComponentCounter,
    global: bool,
}

impl CostModel {
    /// The model left after `used` has consumed its share.
    pub fn without(&self, used: &Component) -> CostModel {
        CostModel {
            counter: self.counter.minus(used.counter()),
            global: false,
        }
    }

    pub fn counter(&self) -> &ComponentCounter {
        &self.counter
    }
}

#[derive(Debug)]
pub struct CostEstimator {
    template: ComponentCounter,
    model: CostModel,
    memo: RefCell<HashMap<Fingerprint, Cost>>,
}

fn counts_once(kind: Kind) -> bool {
    kind.is_chain() || kind == Kind::AggFunc
}

impl CostEstimator {
    pub fn new(query: &Component) -> CostEstimator {
        let mut template = query.counter().clone();
        for t in terminal_library() {
            template.add(t.counter());
        }
        CostEstimator {
            model: CostModel {
                counter: template.clone(),
                global: true,
            },
            template,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Makes `allowance` free from now on. The template used to waive chains is unchanged.
    pub fn update_allow_cost_model(&mut self, allowance: &ComponentCounter) {
        self.model.counter.add(allowance);
        self.memo.borrow_mut().clear();
    }

    pub fn model(&self) -> &CostModel {
        &self.model
    }

    /// Cost against the global model.
    pub fn cost(&self, c: &Component) -> Cost {
        if let Some(cost) = self.memo.borrow().get(&c.fingerprint()) {
            return *cost;
        }
        let cost = self.compute(c, &self.model.counter);
        self.memo.borrow_mut().insert(c.fingerprint(), cost);
        cost
    }

    pub fn cost_under(&self, c: &Component, model: &CostModel) -> Cost {
        if model.global {
            self.cost(c)
        } else {
            self.compute(c, &model.counter)
        }
    }

    fn compute(&self, c: &Component, model: &ComponentCounter) -> Cost {
        let mut cost = 0;
        for (fp, n) in c.counter().iter() {
            let excess = n.saturating_sub(model.get(fp));
            if excess == 0 {
                continue;
            }
            if counts_once(fp.kind) {
                if !self.template.contains(fp) {
                    cost += 1;
                }
            } else {
                cost += excess as Cost;
            }
        }
        cost
    }
}

#[cfg(test)]
use crate::dsl::testing::{col, scenario_query};
#[cfg(test)]
use crate::dsl::{AggFunc, CompareOp, JoinType, LogicOp};

#[test]
fn test_cost_of_template_parts_is_zero() {
    let (query, customers, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    assert_eq!(est.cost(&query), 0);
    for c in query.all_components() {
        println!("Running case: {:?}", c);
        assert_eq!(est.cost(&c), 0);
    }
    assert_eq!(est.cost(&col(&orders, "id")), 0);
    assert_eq!(est.cost(&col(&customers, "id")), 0);
    assert_eq!(est.cost(&Component::join_type(JoinType::Left)), 0);
}

#[test]
fn test_cost_rules() {
    let (query, _, orders) = scenario_query();
    let est = CostEstimator::new(&query);

    // A new predicate over known chains costs 1 for itself.
    let p = Component::predicate_op(
        col(&orders, "cust"),
        CompareOp::Lt,
        Component::int_const(5),
    );
    assert_eq!(est.cost(&p), 1);

    // A new constant chain costs 1 regardless of how often it is used.
    let seven = Component::int_const(7);
    let p7 = Component::predicate_op(col(&orders, "id"), CompareOp::Eq, seven.clone());
    assert_eq!(est.cost(&seven), 1);
    let twice = Component::predicate_logic(
        p7.clone(),
        LogicOp::Or,
        Component::predicate_op(col(&orders, "cust"), CompareOp::Eq, seven),
    );
    // Two new atoms, the OR entry, and the constant once.
    assert_eq!(est.cost(&twice), 4);

    // Aggregate function names are free because they are in the library.
    let agg = Component::aggregation(AggFunc::Sum, col(&orders, "cust"), false);
    assert_eq!(est.cost(&agg), 1);

    // DISTINCT is not part of the library.
    assert_eq!(est.cost(&Component::distinct()), 1);
}

#[test]
fn test_remainder_model() {
    let (query, _, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    let q = query.node().as_query().unwrap();
    let rest = est.model().without(&q.where_clause);
    // The WHERE predicate was consumed; using it a second time is no longer free.
    assert_eq!(est.cost_under(&q.where_clause, &rest), 1);
    assert_eq!(est.cost_under(&col(&orders, "id"), &rest), 0);
}

#[test]
fn test_update_allow_cost_model() {
    let (query, _, orders) = scenario_query();
    let mut est = CostEstimator::new(&query);
    let p = Component::predicate_op(
        col(&orders, "cust"),
        CompareOp::Lt,
        Component::int_const(5),
    );
    assert_eq!(est.cost(&p), 1);
    est.update_allow_cost_model(p.counter());
    assert_eq!(est.cost(&p), 0);
}
