use std::rc::Rc;

use proptest::prelude::*;

use querysynth::bank::Bank;
use querysynth::constraints::ConstraintSet;
use querysynth::cost::CostEstimator;
use querysynth::data_type::DataType;
use querysynth::dsl::{Category, CompareOp, Component, IdGenerator, JoinType, Kind, Query};

fn table(ids: &mut IdGenerator, name: &str, columns: &[&str]) -> Component {
    let columns = columns
        .iter()
        .map(|c| (String::from(*c), DataType::Number))
        .collect();
    Component::table(Rc::new(ids.table(name, columns)))
}

fn fixture() -> (Component, Component) {
    let mut ids = IdGenerator::new();
    let t = table(&mut ids, "t", &["a", "b", "c", "d"]);
    let u = table(&mut ids, "u", &["a", "e"]);
    (t, u)
}

fn template(t: &Component, u: &Component) -> Component {
    let tc = t.provided_chains();
    let uc = u.provided_chains();
    Component::query(Query {
        select: Component::select_clause(vec![tc[0].clone()]),
        source: Component::join(
            Component::table_source(t.clone(), None),
            Component::table_source(u.clone(), None),
            JoinType::Inner,
            Component::predicate_op(tc[0].clone(), CompareOp::Eq, uc[0].clone()),
        ),
        where_clause: Component::predicate_op(tc[1].clone(), CompareOp::Lt, Component::int_const(3)),
        group_by: Component::absent(),
        having: Component::absent(),
        order_by: Component::absent(),
        distinct: false,
    })
}

fn compare_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Lt),
        Just(CompareOp::Leq),
        Just(CompareOp::Eq),
        Just(CompareOp::Neq),
    ]
}

proptest! {
    #[test]
    fn test_structural_hash_is_deterministic(col in 0usize..4, op in compare_op(), v in any::<i64>()) {
        let (t, _) = fixture();
        let (t2, _) = fixture();
        let a = Component::predicate_op(t.provided_chains()[col].clone(), op, Component::int_const(v));
        let b = Component::predicate_op(t2.provided_chains()[col].clone(), op, Component::int_const(v));
        prop_assert_eq!(a.structural_hash(), b.structural_hash());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_group_by_order_is_canonical(order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()) {
        let (t, _) = fixture();
        let chains = t.provided_chains();
        let shuffled: Vec<Component> = order.iter().map(|i| chains[*i].clone()).collect();
        prop_assert_eq!(
            Component::group_by_list(shuffled),
            Component::group_by_list(chains.clone())
        );
    }

    #[test]
    fn test_cost_is_never_negative(
        lcol in 0usize..4,
        rcol in 0usize..2,
        op in compare_op(),
        v in -10i64..10,
    ) {
        let (t, u) = fixture();
        let est = CostEstimator::new(&template(&t, &u));
        let l = t.provided_chains()[lcol].clone();
        let r = u.provided_chains()[rcol].clone();
        let candidates = [
            Component::predicate_op(l.clone(), op, r.clone()),
            Component::predicate_op(l.clone(), op, Component::int_const(v)),
            Component::group_by_list(vec![l, r]),
        ];
        for c in &candidates {
            prop_assert!(est.cost(c) >= 0);
        }
    }

    #[test]
    fn test_negative_budget_finds_nothing(budget in i64::MIN..0) {
        let (t, u) = fixture();
        let query = template(&t, &u);
        let est = CostEstimator::new(&query);
        let mut bank = Bank::new();
        bank.extend(query.all_components());
        prop_assert!(!bank.is_empty());
        let got = bank.get_from_bank(
            Category::Is(Kind::PredicateOp),
            budget,
            est.model(),
            &est,
            &ConstraintSet::new(),
        );
        prop_assert!(got.is_empty());
    }
}
