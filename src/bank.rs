//! The bank: every distinct component discovered so far, indexed by kind.

use std::collections::{BTreeMap, HashSet};

use crate::constraints::ConstraintSet;
use crate::cost::{Cost, CostEstimator, CostModel};
use crate::dsl::{Category, Component, Kind};

/// Components of one kind, kept in discovery order.
#[derive(Debug, Clone, Default)]
struct KindSet {
    items: Vec<Component>,
    members: HashSet<Component>,
}

impl KindSet {
    fn insert(&mut self, c: Component) -> bool {
        if self.members.insert(c.clone()) {
            self.items.push(c);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bank {
    kinds: BTreeMap<Kind, KindSet>,
}

impl Bank {
    pub fn new() -> Bank {
        Bank::default()
    }

    /// Adds `c` unless a structurally equal component is already present.
    pub fn insert(&mut self, c: Component) -> bool {
        self.kinds.entry(c.kind()).or_default().insert(c)
    }

    pub fn contains(&self, c: &Component) -> bool {
        match self.kinds.get(&c.kind()) {
            Some(set) => set.members.contains(c),
            None => false,
        }
    }

    pub fn merge(&mut self, other: Bank) {
        for (_, set) in other.kinds {
            for c in set.items {
                self.insert(c);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored components of `kind`.
    pub fn of_kind(&self, kind: Kind) -> &[Component] {
        match self.kinds.get(&kind) {
            Some(set) => &set.items,
            None => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.kinds.values().flat_map(|s| s.items.iter())
    }

    /// Components admitted by `category` that cost at most `budget` under `model` and satisfy
    /// `constraints`. A negative budget always yields nothing.
    pub fn get_from_bank(
        &self,
        category: Category,
        budget: Cost,
        model: &CostModel,
        estimator: &CostEstimator,
        constraints: &ConstraintSet,
    ) -> Vec<Component> {
        if budget < 0 {
            return vec![];
        }
        self.kinds
            .iter()
            .filter(|(kind, _)| category.admits(**kind))
            .flat_map(|(_, set)| set.items.iter())
            .filter(|c| estimator.cost_under(c, model) <= budget)
            .filter(|c| constraints.verify(c))
            .cloned()
            .collect()
    }
}

impl Extend<Component> for Bank {
    fn extend<T: IntoIterator<Item = Component>>(&mut self, iter: T) {
        for c in iter {
            self.insert(c);
        }
    }
}

#[cfg(test)]
use crate::constraints::Constraint;
#[cfg(test)]
use crate::dsl::testing::{col, scenario_query};
#[cfg(test)]
use crate::dsl::{CompareOp, JoinType};

#[test]
fn test_insert_dedups_structurally() {
    let (_, customers, _) = scenario_query();
    let mut bank = Bank::new();
    assert!(bank.insert(col(&customers, "id")));
    assert!(!bank.insert(col(&customers, "id")));
    assert!(bank.insert(Component::absent()));
    assert_eq!(bank.len(), 2);
    assert!(bank.contains(&col(&customers, "id")));
    assert!(!bank.contains(&col(&customers, "name")));

    let mut other = Bank::new();
    other.insert(col(&customers, "id"));
    other.insert(col(&customers, "name"));
    bank.merge(other);
    assert_eq!(bank.len(), 3);
}

#[test]
fn test_get_from_bank() {
    let (query, _, orders) = scenario_query();
    let est = CostEstimator::new(&query);
    let mut bank = Bank::new();
    bank.extend(query.all_components());
    let costly = Component::predicate_op(
        col(&orders, "cust"),
        CompareOp::Lt,
        Component::int_const(5),
    );
    bank.insert(costly.clone());

    let none = ConstraintSet::new();
    let preds = bank.get_from_bank(Category::Predicate, 0, est.model(), &est, &none);
    assert!(!preds.contains(&costly));
    assert!(preds.contains(&Component::absent()));
    assert_eq!(preds.len(), 3);

    let preds = bank.get_from_bank(Category::Predicate, 1, est.model(), &est, &none);
    assert!(preds.contains(&costly));

    let not_none = ConstraintSet::new().with(Constraint::NotNone);
    let preds = bank.get_from_bank(Category::Predicate, 1, est.model(), &est, &not_none);
    assert_eq!(preds.len(), 3);

    let joins = bank.get_from_bank(
        Category::Is(Kind::JoinType),
        0,
        est.model(),
        &est,
        &none,
    );
    assert_eq!(joins, vec![Component::join_type(JoinType::Inner)]);
}

#[test]
fn test_negative_budget_is_empty() {
    let (query, _, _) = scenario_query();
    let est = CostEstimator::new(&query);
    let mut bank = Bank::new();
    bank.extend(query.all_components());
    for category in [Category::Chain, Category::Predicate, Category::Source] {
        assert!(bank
            .get_from_bank(category, -1, est.model(), &est, &ConstraintSet::new())
            .is_empty());
    }
}
