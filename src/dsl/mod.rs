//! `dsl` is the structural language the synthesizer searches over.
//!
//! A query is a tree of immutable [`Component`]s. Each component knows, from the moment it is
//! built, its structural hash, the chains it needs from its environment and the chains it
//! exposes, its nesting depth, and the multiset of sub-components it consumed (its
//! [`ComponentCounter`]), which is what the cost model compares against the input query.
//!
//! Components are compared by kind and structural hash only, so two trees built independently
//! from equal parts are the same component.

mod build;
mod counter;
mod render;
mod table;
mod terminals;

use std::collections::HashSet;
use std::rc::Rc;

use enum_as_inner::EnumAsInner;

use crate::data_type::DataType;

pub use counter::{ComponentCounter, Fingerprint};
pub use render::{placeholder_query, quote_ident, quote_str};
pub use table::{IdGenerator, Table};
pub use terminals::{AggFunc, CompareOp, JoinType, LogicOp, OrderDir, WindowFunc};

/// The concrete kind of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Table,
    ColChain,
    AggChain,
    WindowFuncChain,
    IntConst,
    FloatConst,
    StringConst,
    Absent,
    Distinct,
    CompareOp,
    LogicOp,
    JoinType,
    AggFunc,
    WindowFunc,
    OrderDir,
    Aggregation,
    WindowFuncClause,
    WindowCallAgg,
    WindowCallFunc,
    PartitionList,
    GroupByList,
    OrderByItem,
    OrderByList,
    PredicateOp,
    PredicateLogic,
    SelectClause,
    SelectItemAlias,
    TableSource,
    QuerySource,
    Join,
    Query,
    RealCol,
}

impl Kind {
    /// Chains are the values a query can project. The absent sentinel counts as a chain.
    pub fn is_chain(self) -> bool {
        matches!(
            self,
            Kind::ColChain
                | Kind::AggChain
                | Kind::WindowFuncChain
                | Kind::IntConst
                | Kind::FloatConst
                | Kind::StringConst
                | Kind::Absent
        )
    }

    /// Chains usable in GROUP BY, ORDER BY and PARTITION BY.
    pub fn is_referencable_chain(self) -> bool {
        matches!(self, Kind::ColChain | Kind::AggChain | Kind::WindowFuncChain)
    }
}

/// A set of kinds that may fill one slot of a composite component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Is(Kind),
    Chain,
    ReferencableChain,
    /// Chains and aggregations.
    SingleValue,
    SelectItem,
    Predicate,
    GroupBy,
    OrderBy,
    Partition,
    Source,
}

impl Category {
    pub fn admits(&self, kind: Kind) -> bool {
        match self {
            Category::Is(k) => *k == kind,
            Category::Chain => kind.is_chain(),
            Category::ReferencableChain => kind.is_referencable_chain(),
            Category::SingleValue => kind.is_chain() || kind == Kind::Aggregation,
            Category::SelectItem => {
                Category::SingleValue.admits(kind)
                    || matches!(kind, Kind::WindowCallAgg | Kind::WindowCallFunc)
            }
            Category::Predicate => {
                matches!(kind, Kind::PredicateOp | Kind::PredicateLogic | Kind::Absent)
            }
            Category::GroupBy => matches!(kind, Kind::GroupByList | Kind::Absent),
            Category::OrderBy => matches!(kind, Kind::OrderByList | Kind::Absent),
            Category::Partition => matches!(kind, Kind::PartitionList | Kind::Absent),
            Category::Source => {
                matches!(kind, Kind::TableSource | Kind::QuerySource | Kind::Join)
            }
        }
    }
}

impl From<Kind> for Category {
    fn from(k: Kind) -> Self {
        Category::Is(k)
    }
}

#[derive(Debug, Clone)]
pub struct ColChain {
    pub table: Rc<Table>,
    pub column: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub struct AggChain {
    pub func: AggFunc,
    pub child: Component,
}

#[derive(Debug, Clone)]
pub struct WindowFuncChain {
    pub func: WindowFunc,
    /// The absent sentinel for functions without an argument.
    pub child: Component,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub func: AggFunc,
    pub parameter: Component,
    pub distinct: bool,
}

/// `func OVER (PARTITION BY partition ORDER BY order_by)`. `func` is an aggregation for
/// `WindowCallAgg` and a window function clause for `WindowCallFunc`.
#[derive(Debug, Clone)]
pub struct WindowCall {
    pub func: Component,
    pub partition: Component,
    pub order_by: Component,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub chain: Component,
    pub dir: OrderDir,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub larg: Component,
    pub op: CompareOp,
    pub rarg: Component,
}

#[derive(Debug, Clone)]
pub struct Logic {
    pub larg: Component,
    pub op: LogicOp,
    pub rarg: Component,
}

#[derive(Debug, Clone)]
pub struct AliasedItem {
    pub item: Component,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct TableSource {
    pub table: Component,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuerySource {
    pub query: Component,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub larg: Component,
    pub rarg: Component,
    pub join_type: JoinType,
    pub on: Component,
}

/// Clauses that are not present hold the absent sentinel.
#[derive(Debug, Clone)]
pub struct Query {
    pub select: Component,
    pub source: Component,
    pub where_clause: Component,
    pub group_by: Component,
    pub having: Component,
    pub order_by: Component,
    pub distinct: bool,
}

/// A chain bound to a concrete `"table_alias"."column"`. Only produced by concretization.
#[derive(Debug, Clone)]
pub struct RealCol {
    pub table_alias: String,
    pub column: String,
    pub chain: Component,
}

#[derive(Debug, Clone, EnumAsInner)]
pub enum Node {
    Table(Rc<Table>),
    ColChain(ColChain),
    AggChain(AggChain),
    WindowFuncChain(WindowFuncChain),
    IntConst(i64),
    FloatConst(f64),
    StringConst(String),
    Absent,
    Distinct,
    CompareOp(CompareOp),
    LogicOp(LogicOp),
    JoinType(JoinType),
    AggFunc(AggFunc),
    WindowFunc(WindowFunc),
    OrderDir(OrderDir),
    Aggregation(Aggregation),
    WindowFuncClause(WindowFunc),
    WindowCallAgg(WindowCall),
    WindowCallFunc(WindowCall),
    PartitionList(Vec<Component>),
    GroupByList(Vec<Component>),
    OrderByItem(OrderByItem),
    OrderByList(Vec<Component>),
    PredicateOp(Comparison),
    PredicateLogic(Logic),
    SelectClause(Vec<Component>),
    SelectItemAlias(AliasedItem),
    TableSource(TableSource),
    QuerySource(QuerySource),
    Join(Join),
    Query(Query),
    RealCol(RealCol),
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Table(_) => Kind::Table,
            Node::ColChain(_) => Kind::ColChain,
            Node::AggChain(_) => Kind::AggChain,
            Node::WindowFuncChain(_) => Kind::WindowFuncChain,
            Node::IntConst(_) => Kind::IntConst,
            Node::FloatConst(_) => Kind::FloatConst,
            Node::StringConst(_) => Kind::StringConst,
            Node::Absent => Kind::Absent,
            Node::Distinct => Kind::Distinct,
            Node::CompareOp(_) => Kind::CompareOp,
            Node::LogicOp(_) => Kind::LogicOp,
            Node::JoinType(_) => Kind::JoinType,
            Node::AggFunc(_) => Kind::AggFunc,
            Node::WindowFunc(_) => Kind::WindowFunc,
            Node::OrderDir(_) => Kind::OrderDir,
            Node::Aggregation(_) => Kind::Aggregation,
            Node::WindowFuncClause(_) => Kind::WindowFuncClause,
            Node::WindowCallAgg(_) => Kind::WindowCallAgg,
            Node::WindowCallFunc(_) => Kind::WindowCallFunc,
            Node::PartitionList(_) => Kind::PartitionList,
            Node::GroupByList(_) => Kind::GroupByList,
            Node::OrderByItem(_) => Kind::OrderByItem,
            Node::OrderByList(_) => Kind::OrderByList,
            Node::PredicateOp(_) => Kind::PredicateOp,
            Node::PredicateLogic(_) => Kind::PredicateLogic,
            Node::SelectClause(_) => Kind::SelectClause,
            Node::SelectItemAlias(_) => Kind::SelectItemAlias,
            Node::TableSource(_) => Kind::TableSource,
            Node::QuerySource(_) => Kind::QuerySource,
            Node::Join(_) => Kind::Join,
            Node::Query(_) => Kind::Query,
            Node::RealCol(_) => Kind::RealCol,
        }
    }

    /// The component-valued fields, in declaration order.
    pub fn children(&self) -> Vec<&Component> {
        match self {
            Node::AggChain(c) => vec![&c.child],
            Node::WindowFuncChain(c) => vec![&c.child],
            Node::Aggregation(a) => vec![&a.parameter],
            Node::WindowCallAgg(w) | Node::WindowCallFunc(w) => {
                vec![&w.func, &w.partition, &w.order_by]
            }
            Node::PartitionList(items)
            | Node::GroupByList(items)
            | Node::OrderByList(items)
            | Node::SelectClause(items) => items.iter().collect(),
            Node::OrderByItem(o) => vec![&o.chain],
            Node::PredicateOp(p) => vec![&p.larg, &p.rarg],
            Node::PredicateLogic(p) => vec![&p.larg, &p.rarg],
            Node::SelectItemAlias(a) => vec![&a.item],
            Node::TableSource(t) => vec![&t.table],
            Node::QuerySource(q) => vec![&q.query],
            Node::Join(j) => vec![&j.larg, &j.rarg, &j.on],
            Node::Query(q) => vec![
                &q.select,
                &q.source,
                &q.where_clause,
                &q.group_by,
                &q.having,
                &q.order_by,
            ],
            Node::RealCol(r) => vec![&r.chain],
            _ => vec![],
        }
    }
}

/// Chains a component needs or exposes. Chains list themselves, which cannot be stored inside
/// their own allocation.
#[derive(Debug)]
enum ChainRefs {
    Itself,
    Listed(Vec<Component>),
}

#[derive(Debug)]
struct Inner {
    node: Node,
    fingerprint: Fingerprint,
    required: ChainRefs,
    provided: ChainRefs,
    data_type: Option<DataType>,
    depth: usize,
    counter: ComponentCounter,
}

/// A shared, immutable node of the DSL together with its derived properties.
#[derive(Clone)]
pub struct Component(Rc<Inner>);

impl Component {
    pub fn node(&self) -> &Node {
        &self.0.node
    }

    pub fn kind(&self) -> Kind {
        self.0.fingerprint.kind
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.0.fingerprint
    }

    pub fn structural_hash(&self) -> u64 {
        self.0.fingerprint.hash
    }

    pub fn is_absent(&self) -> bool {
        self.kind() == Kind::Absent
    }

    pub fn required_chains(&self) -> Vec<Component> {
        self.refs(&self.0.required)
    }

    pub fn provided_chains(&self) -> Vec<Component> {
        self.refs(&self.0.provided)
    }

    fn refs(&self, r: &ChainRefs) -> Vec<Component> {
        match r {
            ChainRefs::Itself => vec![self.clone()],
            ChainRefs::Listed(v) => v.clone(),
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.0.data_type
    }

    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn counter(&self) -> &ComponentCounter {
        &self.0.counter
    }

    pub fn children(&self) -> Vec<&Component> {
        self.0.node.children()
    }

    /// Every component reachable from this one, including itself, the terminals standing for
    /// its operator fields, and the chain forms of its predicates and aggregations.
    pub fn all_components(&self) -> Vec<Component> {
        let mut seen = HashSet::new();
        let mut out = vec![];
        self.collect_all(&mut seen, &mut out);
        out
    }

    fn collect_all(&self, seen: &mut HashSet<Component>, out: &mut Vec<Component>) {
        if !seen.insert(self.clone()) {
            return;
        }
        out.push(self.clone());
        for extra in self.implied_components() {
            extra.collect_all(seen, out);
        }
        for child in self.children() {
            child.collect_all(seen, out);
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.0.fingerprint == other.0.fingerprint
    }
}

impl Eq for Component {}

impl std::hash::Hash for Component {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.fingerprint.hash(state)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self.kind(), self)
    }
}

/// The fixed library of terminals that is always available to the search at no cost.
pub fn terminal_library() -> Vec<Component> {
    vec![
        Component::compare_op(CompareOp::Eq),
        Component::compare_op(CompareOp::Lt),
        Component::compare_op(CompareOp::Leq),
        Component::logic_op(LogicOp::Or),
        Component::compare_op(CompareOp::Neq),
        Component::logic_op(LogicOp::And),
        Component::agg_func(AggFunc::Min),
        Component::agg_func(AggFunc::Count),
        Component::agg_func(AggFunc::Max),
        Component::agg_func(AggFunc::Avg),
        Component::window_func(WindowFunc::DenseRank),
        Component::agg_func(AggFunc::Sum),
        Component::order_dir(OrderDir::Asc),
        Component::order_dir(OrderDir::Desc),
        Component::absent(),
        Component::join_type(JoinType::Left),
        Component::join_type(JoinType::Inner),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for tests across the crate.
    use super::*;

    pub fn customers_orders() -> (Component, Component) {
        let mut ids = IdGenerator::new();
        let customers = ids.table(
            "customers",
            vec![
                (String::from("id"), DataType::Number),
                (String::from("name"), DataType::Str),
            ],
        );
        let orders = ids.table(
            "orders",
            vec![
                (String::from("id"), DataType::Number),
                (String::from("cust"), DataType::Number),
            ],
        );
        (
            Component::table(Rc::new(customers)),
            Component::table(Rc::new(orders)),
        )
    }

    /// The provided chain of `table` named `column`.
    pub fn col(table: &Component, column: &str) -> Component {
        table
            .provided_chains()
            .into_iter()
            .find(|c| c.node().as_col_chain().map(|cc| cc.column.as_str()) == Some(column))
            .unwrap()
    }

    /// `SELECT customers.name FROM customers JOIN orders ON customers.id = orders.cust
    /// WHERE orders.id = 5`, built by hand.
    pub fn scenario_query() -> (Component, Component, Component) {
        let (customers, orders) = customers_orders();
        let on = Component::predicate_op(
            col(&customers, "id"),
            CompareOp::Eq,
            col(&orders, "cust"),
        );
        let source = Component::join(
            Component::table_source(customers.clone(), None),
            Component::table_source(orders.clone(), None),
            JoinType::Inner,
            on,
        );
        let query = Component::query(Query {
            select: Component::select_clause(vec![col(&customers, "name")]),
            source,
            where_clause: Component::predicate_op(
                col(&orders, "id"),
                CompareOp::Eq,
                Component::int_const(5),
            ),
            group_by: Component::absent(),
            having: Component::absent(),
            order_by: Component::absent(),
            distinct: false,
        });
        (query, customers, orders)
    }
}

#[test]
fn test_structural_equality() {
    let (a_customers, _) = testing::customers_orders();
    let (b_customers, _) = testing::customers_orders();
    // Same name, columns and id: the same table instance.
    assert_eq!(a_customers, b_customers);
    let name = testing::col(&a_customers, "name");
    let id = testing::col(&a_customers, "id");
    assert_ne!(name, id);
    assert_eq!(name, testing::col(&b_customers, "name"));

    let p1 = Component::predicate_op(id.clone(), CompareOp::Eq, Component::int_const(1));
    let p2 = Component::predicate_op(id.clone(), CompareOp::Eq, Component::int_const(1));
    let p3 = Component::predicate_op(id, CompareOp::Eq, Component::int_const(2));
    assert_eq!(p1, p2);
    assert_ne!(p1, p3);
}

#[test]
fn test_categories() {
    assert!(Category::SingleValue.admits(Kind::Aggregation));
    assert!(Category::SingleValue.admits(Kind::Absent));
    assert!(!Category::SingleValue.admits(Kind::WindowCallAgg));
    assert!(Category::SelectItem.admits(Kind::WindowCallAgg));
    assert!(Category::GroupBy.admits(Kind::Absent));
    assert!(!Category::ReferencableChain.admits(Kind::IntConst));
    assert!(Category::Source.admits(Kind::QuerySource));
    assert!(Category::from(Kind::Table).admits(Kind::Table));
}

#[test]
fn test_all_components() {
    let (query, customers, orders) = testing::scenario_query();
    let all = query.all_components();
    assert!(all.contains(&query));
    assert!(all.contains(&testing::col(&customers, "name")));
    assert!(all.contains(&testing::col(&orders, "cust")));
    assert!(all.contains(&Component::compare_op(CompareOp::Eq)));
    assert!(all.contains(&Component::join_type(JoinType::Inner)));
    assert!(all.contains(&Component::table_source(customers, None)));
    assert!(!all.contains(&Component::join_type(JoinType::Left)));
}
