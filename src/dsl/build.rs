//! Construction of components and computation of their derived properties.

use std::rc::Rc;

use itertools::Itertools;

use super::*;

const HASH_SEED: u64 = 0x517c_c1b7_2722_0a95;

/// Accumulates the declared fields of one node into a byte string and hashes it with xxh64.
struct FieldHasher {
    buf: Vec<u8>,
}

impl FieldHasher {
    fn new(kind: Kind) -> FieldHasher {
        FieldHasher {
            buf: vec![kind as u8],
        }
    }

    fn tag(&mut self, t: u8) -> &mut Self {
        self.buf.push(t);
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn str(&mut self, s: &str) -> &mut Self {
        self.u64(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    fn component(&mut self, c: &Component) -> &mut Self {
        self.tag(c.kind() as u8).u64(c.structural_hash())
    }

    fn finish(&self) -> u64 {
        xxhash_rust::xxh64::xxh64(&self.buf, HASH_SEED)
    }
}

fn structural_hash(node: &Node) -> u64 {
    let mut h = FieldHasher::new(node.kind());
    match node {
        Node::Table(t) => {
            h.str(&t.name).u64(t.id);
        }
        Node::ColChain(c) => {
            h.str(&c.table.name).u64(c.table.id).str(&c.column);
        }
        Node::AggChain(c) => {
            h.tag(c.func as u8).component(&c.child);
        }
        Node::WindowFuncChain(c) => {
            h.tag(c.func as u8).component(&c.child);
        }
        Node::IntConst(v) => {
            h.u64(*v as u64);
        }
        Node::FloatConst(v) => {
            h.u64(v.to_bits());
        }
        Node::StringConst(s) => {
            h.str(s);
        }
        Node::Absent | Node::Distinct => (),
        Node::CompareOp(op) => {
            h.tag(*op as u8);
        }
        Node::LogicOp(op) => {
            h.tag(*op as u8);
        }
        Node::JoinType(t) => {
            h.tag(*t as u8);
        }
        Node::AggFunc(f) => {
            h.tag(*f as u8);
        }
        Node::WindowFunc(f) | Node::WindowFuncClause(f) => {
            h.tag(*f as u8);
        }
        Node::OrderDir(d) => {
            h.tag(*d as u8);
        }
        Node::Aggregation(a) => {
            h.tag(a.func as u8)
                .component(&a.parameter)
                .tag(a.distinct as u8);
        }
        Node::OrderByItem(o) => {
            h.component(&o.chain).tag(o.dir as u8);
        }
        Node::PredicateOp(p) => {
            h.component(&p.larg).tag(p.op as u8).component(&p.rarg);
        }
        Node::PredicateLogic(p) => {
            h.component(&p.larg).tag(p.op as u8).component(&p.rarg);
        }
        Node::SelectItemAlias(a) => {
            h.component(&a.item).str(&a.alias);
        }
        Node::Join(j) => {
            h.component(&j.larg)
                .component(&j.rarg)
                .tag(j.join_type as u8)
                .component(&j.on);
        }
        Node::Query(q) => {
            for c in node.children() {
                h.component(c);
            }
            h.tag(q.distinct as u8);
        }
        // Sources are identified by what they read, not by the alias they are given.
        Node::TableSource(t) => {
            h.component(&t.table);
        }
        Node::QuerySource(q) => {
            h.component(&q.query);
        }
        Node::RealCol(r) => {
            h.component(&r.chain);
        }
        Node::WindowCallAgg(_)
        | Node::WindowCallFunc(_)
        | Node::PartitionList(_)
        | Node::GroupByList(_)
        | Node::OrderByList(_)
        | Node::SelectClause(_) => {
            for c in node.children() {
                h.component(c);
            }
        }
    }
    h.finish()
}

/// Concatenates chain lists, keeping the first occurrence of each chain.
fn union_chains(lists: impl IntoIterator<Item = Vec<Component>>) -> Vec<Component> {
    lists.into_iter().flatten().unique().collect()
}

fn required_of(node: &Node) -> ChainRefs {
    use ChainRefs::*;
    match node {
        Node::ColChain(_) | Node::AggChain(_) | Node::WindowFuncChain(_) => Itself,
        Node::Aggregation(a) => Listed(a.parameter.provided_chains().into_iter().take(1).collect()),
        Node::WindowCallAgg(w) | Node::WindowCallFunc(w) => Listed(union_chains([
            w.func.required_chains(),
            w.partition.required_chains(),
            w.order_by.required_chains(),
        ])),
        Node::PartitionList(items)
        | Node::GroupByList(items)
        | Node::OrderByList(items)
        | Node::SelectClause(items) => {
            Listed(union_chains(items.iter().map(|i| i.required_chains())))
        }
        Node::OrderByItem(o) => Listed(vec![o.chain.clone()]),
        Node::PredicateOp(p) => Listed(union_chains([
            p.larg.required_chains(),
            p.rarg.required_chains(),
        ])),
        Node::PredicateLogic(p) => Listed(union_chains([
            p.larg.required_chains(),
            p.rarg.required_chains(),
        ])),
        Node::SelectItemAlias(a) => Listed(a.item.required_chains()),
        Node::RealCol(r) => Listed(vec![r.chain.clone()]),
        _ => Listed(vec![]),
    }
}

fn provided_of(node: &Node) -> ChainRefs {
    use ChainRefs::*;
    match node {
        Node::Table(t) => Listed(
            t.columns
                .iter()
                .map(|(col, dt)| Component::col_chain(t.clone(), col, *dt))
                .collect(),
        ),
        Node::ColChain(_)
        | Node::AggChain(_)
        | Node::WindowFuncChain(_)
        | Node::IntConst(_)
        | Node::FloatConst(_)
        | Node::StringConst(_) => Itself,
        Node::Aggregation(a) => Listed(
            a.parameter
                .provided_chains()
                .into_iter()
                .take(1)
                .map(|p| Component::agg_chain(a.func, p))
                .collect(),
        ),
        Node::WindowFuncClause(f) => Listed(vec![Component::window_func_chain(
            *f,
            Component::absent(),
        )]),
        Node::WindowCallAgg(w) | Node::WindowCallFunc(w) => Listed(w.func.provided_chains()),
        Node::SelectClause(items) => Listed(items.iter().flat_map(|i| i.provided_chains()).collect()),
        Node::SelectItemAlias(a) => Listed(a.item.provided_chains()),
        Node::TableSource(t) => Listed(t.table.provided_chains()),
        Node::QuerySource(q) => Listed(q.query.provided_chains()),
        Node::Join(j) => Listed(
            j.larg
                .provided_chains()
                .into_iter()
                .chain(j.rarg.provided_chains())
                .collect(),
        ),
        Node::Query(q) => Listed(q.select.provided_chains()),
        Node::RealCol(r) => Listed(vec![r.chain.clone()]),
        _ => Listed(vec![]),
    }
}

fn data_type_of(node: &Node) -> Option<DataType> {
    match node {
        Node::ColChain(c) => Some(c.data_type),
        Node::AggChain(c) => match c.func {
            AggFunc::Max | AggFunc::Min => c.child.data_type(),
            _ => Some(DataType::Number),
        },
        Node::Aggregation(a) => match a.func {
            AggFunc::Max | AggFunc::Min => a.parameter.data_type(),
            _ => Some(DataType::Number),
        },
        Node::WindowFuncChain(_)
        | Node::WindowCallAgg(_)
        | Node::WindowCallFunc(_)
        | Node::IntConst(_)
        | Node::FloatConst(_) => Some(DataType::Number),
        Node::StringConst(_) => Some(DataType::Str),
        Node::OrderByItem(o) => o.chain.data_type(),
        Node::SelectItemAlias(a) => a.item.data_type(),
        Node::RealCol(r) => r.chain.data_type(),
        _ => None,
    }
}

fn depth_of(node: &Node) -> usize {
    match node {
        Node::Query(q) => q.source.depth() + 1,
        Node::QuerySource(q) => q.query.depth(),
        Node::Join(j) => j.larg.depth().max(j.rarg.depth()),
        _ => 0,
    }
}

fn sum_of<'a>(parts: impl IntoIterator<Item = &'a Component>) -> ComponentCounter {
    let mut c = ComponentCounter::new();
    for p in parts {
        c.add(p.counter());
    }
    c
}

fn counter_of(node: &Node, me: Fingerprint) -> ComponentCounter {
    let mut c = match node {
        Node::Absent => return ComponentCounter::new(),
        Node::AggChain(a) => Component::agg_func(a.func).counter().plus(a.child.counter()),
        Node::WindowFuncChain(w) => Component::window_func(w.func)
            .counter()
            .plus(w.child.counter()),
        // Aggregations are counted by provenance: the chain they compute, plus DISTINCT.
        Node::Aggregation(a) => {
            let mut c = Component::agg_chain(a.func, a.parameter.clone())
                .counter()
                .clone();
            if a.distinct {
                c.add(Component::distinct().counter());
            }
            return c;
        }
        Node::WindowFuncClause(f) => return Component::window_func(*f).counter().clone(),
        Node::WindowCallAgg(w) => return sum_of([&w.func, &w.partition, &w.order_by]),
        Node::WindowCallFunc(w) => sum_of([&w.func, &w.partition, &w.order_by]),
        Node::PartitionList(items) | Node::GroupByList(items) | Node::OrderByList(items) => {
            sum_of(items.iter())
        }
        Node::OrderByItem(o) => o.chain.counter().plus(Component::order_dir(o.dir).counter()),
        Node::PredicateOp(p) => {
            let mut c = sum_of([&p.larg, &p.rarg]);
            c.add(Component::compare_op(p.op).counter());
            c.insert(comparison_chain_fingerprint(p, me), 1);
            return c;
        }
        Node::PredicateLogic(p) => {
            let mut c = sum_of([&p.larg, &p.rarg]);
            c.add(Component::logic_op(p.op).counter());
            if p.op != LogicOp::And {
                c.insert(logic_chain_fingerprint(p, me), 1);
            }
            return c;
        }
        Node::SelectClause(items) => {
            return items
                .iter()
                .fold(ComponentCounter::new(), |acc, i| acc.union(i.counter()))
        }
        Node::SelectItemAlias(a) => return ComponentCounter::single(a.item.fingerprint()),
        Node::TableSource(t) => return t.table.counter().clone(),
        Node::QuerySource(q) => return q.query.counter().clone(),
        Node::Join(j) => {
            let mut c = sum_of([&j.larg, &j.rarg, &j.on]);
            c.add(Component::join_type(j.join_type).counter());
            return c;
        }
        Node::Query(q) => {
            let mut c = sum_of(node.children());
            if q.distinct {
                c.add(Component::distinct().counter());
            }
            return c;
        }
        Node::RealCol(r) => return ComponentCounter::single(r.chain.fingerprint()),
        _ => ComponentCounter::new(),
    };
    c.insert(me, 1);
    c
}

fn comparison_chain_fingerprint(p: &Comparison, me: Fingerprint) -> Fingerprint {
    let (l, r) = (p.larg.chain_form(), p.rarg.chain_form());
    if l == p.larg && r == p.rarg {
        me
    } else {
        Component::predicate_op(l, p.op, r).fingerprint()
    }
}

fn logic_chain_fingerprint(p: &Logic, me: Fingerprint) -> Fingerprint {
    let (l, r) = (p.larg.chain_form(), p.rarg.chain_form());
    if l == p.larg && r == p.rarg {
        me
    } else {
        Component::predicate_logic(l, p.op, r).fingerprint()
    }
}

fn sorted_by_hash(mut items: Vec<Component>) -> Vec<Component> {
    items.sort_by_key(|c| c.fingerprint());
    items
}

impl Component {
    /// Builds a component and all of its derived properties.
    pub fn new(node: Node) -> Component {
        let fingerprint = Fingerprint {
            kind: node.kind(),
            hash: structural_hash(&node),
        };
        Component(Rc::new(Inner {
            required: required_of(&node),
            provided: provided_of(&node),
            data_type: data_type_of(&node),
            depth: depth_of(&node),
            counter: counter_of(&node, fingerprint),
            fingerprint,
            node,
        }))
    }

    pub fn table(t: Rc<Table>) -> Component {
        Component::new(Node::Table(t))
    }

    pub fn col_chain(table: Rc<Table>, column: &str, data_type: DataType) -> Component {
        Component::new(Node::ColChain(ColChain {
            table,
            column: String::from(column),
            data_type,
        }))
    }

    pub fn agg_chain(func: AggFunc, child: Component) -> Component {
        Component::new(Node::AggChain(AggChain { func, child }))
    }

    pub fn window_func_chain(func: WindowFunc, child: Component) -> Component {
        Component::new(Node::WindowFuncChain(WindowFuncChain { func, child }))
    }

    pub fn int_const(v: i64) -> Component {
        Component::new(Node::IntConst(v))
    }

    pub fn float_const(v: f64) -> Component {
        Component::new(Node::FloatConst(v))
    }

    pub fn string_const(s: &str) -> Component {
        Component::new(Node::StringConst(String::from(s)))
    }

    /// The sentinel for an empty clause or a missing argument.
    pub fn absent() -> Component {
        Component::new(Node::Absent)
    }

    pub fn distinct() -> Component {
        Component::new(Node::Distinct)
    }

    pub fn compare_op(op: CompareOp) -> Component {
        Component::new(Node::CompareOp(op))
    }

    pub fn logic_op(op: LogicOp) -> Component {
        Component::new(Node::LogicOp(op))
    }

    pub fn join_type(t: JoinType) -> Component {
        Component::new(Node::JoinType(t))
    }

    pub fn agg_func(f: AggFunc) -> Component {
        Component::new(Node::AggFunc(f))
    }

    pub fn window_func(f: WindowFunc) -> Component {
        Component::new(Node::WindowFunc(f))
    }

    pub fn order_dir(d: OrderDir) -> Component {
        Component::new(Node::OrderDir(d))
    }

    pub fn aggregation(func: AggFunc, parameter: Component, distinct: bool) -> Component {
        Component::new(Node::Aggregation(Aggregation {
            func,
            parameter,
            distinct,
        }))
    }

    pub fn window_func_clause(f: WindowFunc) -> Component {
        Component::new(Node::WindowFuncClause(f))
    }

    pub fn window_call_agg(agg: Component, partition: Component, order_by: Component) -> Component {
        Component::new(Node::WindowCallAgg(WindowCall {
            func: agg,
            partition,
            order_by,
        }))
    }

    pub fn window_call_func(
        func: Component,
        partition: Component,
        order_by: Component,
    ) -> Component {
        Component::new(Node::WindowCallFunc(WindowCall {
            func,
            partition,
            order_by,
        }))
    }

    pub fn partition_list(items: Vec<Component>) -> Component {
        Component::new(Node::PartitionList(sorted_by_hash(items)))
    }

    pub fn group_by_list(items: Vec<Component>) -> Component {
        Component::new(Node::GroupByList(sorted_by_hash(items)))
    }

    pub fn order_by_item(chain: Component, dir: OrderDir) -> Component {
        Component::new(Node::OrderByItem(OrderByItem { chain, dir }))
    }

    pub fn order_by_list(items: Vec<Component>) -> Component {
        Component::new(Node::OrderByList(sorted_by_hash(items)))
    }

    pub fn predicate_op(larg: Component, op: CompareOp, rarg: Component) -> Component {
        Component::new(Node::PredicateOp(Comparison { larg, op, rarg }))
    }

    pub fn predicate_logic(larg: Component, op: LogicOp, rarg: Component) -> Component {
        Component::new(Node::PredicateLogic(Logic { larg, op, rarg }))
    }

    pub fn select_clause(items: Vec<Component>) -> Component {
        Component::new(Node::SelectClause(items))
    }

    pub fn aliased(item: Component, alias: &str) -> Component {
        Component::new(Node::SelectItemAlias(AliasedItem {
            item,
            alias: String::from(alias),
        }))
    }

    pub fn table_source(table: Component, alias: Option<String>) -> Component {
        Component::new(Node::TableSource(TableSource { table, alias }))
    }

    pub fn query_source(query: Component, alias: Option<String>) -> Component {
        Component::new(Node::QuerySource(QuerySource { query, alias }))
    }

    pub fn join(larg: Component, rarg: Component, join_type: JoinType, on: Component) -> Component {
        Component::new(Node::Join(Join {
            larg,
            rarg,
            join_type,
            on,
        }))
    }

    pub fn query(q: Query) -> Component {
        Component::new(Node::Query(q))
    }

    pub fn real_col(table_alias: &str, column: &str, chain: Component) -> Component {
        Component::new(Node::RealCol(RealCol {
            table_alias: String::from(table_alias),
            column: String::from(column),
            chain,
        }))
    }

    /// The provenance form of a value or predicate: aggregations become the chain they compute,
    /// recursively through comparisons and boolean connectives. Everything else is unchanged.
    pub fn chain_form(&self) -> Component {
        match self.node() {
            Node::Aggregation(a) => Component::agg_chain(a.func, a.parameter.clone()),
            Node::PredicateOp(p) => {
                let (l, r) = (p.larg.chain_form(), p.rarg.chain_form());
                if l == p.larg && r == p.rarg {
                    self.clone()
                } else {
                    Component::predicate_op(l, p.op, r)
                }
            }
            Node::PredicateLogic(p) => {
                let (l, r) = (p.larg.chain_form(), p.rarg.chain_form());
                if l == p.larg && r == p.rarg {
                    self.clone()
                } else {
                    Component::predicate_logic(l, p.op, r)
                }
            }
            _ => self.clone(),
        }
    }

    /// Terminals and chain forms implied by this node but not stored as its children.
    pub(super) fn implied_components(&self) -> Vec<Component> {
        match self.node() {
            Node::AggChain(a) => vec![Component::agg_func(a.func)],
            Node::WindowFuncChain(w) => vec![Component::window_func(w.func)],
            Node::WindowFuncClause(f) => vec![Component::window_func(*f)],
            Node::Aggregation(a) => {
                let mut v = vec![
                    Component::agg_func(a.func),
                    self.chain_form(),
                    Component::aggregation(a.func, a.parameter.clone(), false),
                ];
                if a.distinct {
                    v.push(Component::distinct());
                }
                v
            }
            Node::OrderByItem(o) => vec![Component::order_dir(o.dir)],
            Node::PredicateOp(p) => vec![Component::compare_op(p.op), self.chain_form()],
            Node::PredicateLogic(p) => vec![Component::logic_op(p.op), self.chain_form()],
            Node::Join(j) => vec![Component::join_type(j.join_type)],
            Node::Query(q) if q.distinct => vec![Component::distinct()],
            _ => vec![],
        }
    }
}

#[cfg(test)]
use super::testing::{col, customers_orders, scenario_query};

#[test]
fn test_group_by_list_is_canonical() {
    let (customers, _) = customers_orders();
    let a = col(&customers, "id");
    let b = col(&customers, "name");
    let ab = Component::group_by_list(vec![a.clone(), b.clone()]);
    let ba = Component::group_by_list(vec![b, a]);
    assert_eq!(ab, ba);
    assert_eq!(ab.to_string(), ba.to_string());
}

#[test]
fn test_chains_and_depth() {
    let (query, customers, orders) = scenario_query();
    assert_eq!(query.provided_chains(), vec![col(&customers, "name")]);
    assert_eq!(query.depth(), 1);
    let nested = Component::query_source(query.clone(), None);
    assert_eq!(nested.depth(), 1);
    let source = query.node().as_query().unwrap().source.clone();
    assert_eq!(source.provided_chains().len(), 4);
    let pred = Component::predicate_op(
        col(&customers, "id"),
        CompareOp::Lt,
        col(&orders, "cust"),
    );
    assert_eq!(
        pred.required_chains(),
        vec![col(&customers, "id"), col(&orders, "cust")]
    );
    let agg = Component::aggregation(AggFunc::Sum, col(&orders, "cust"), false);
    assert_eq!(agg.required_chains(), vec![col(&orders, "cust")]);
    assert_eq!(
        agg.provided_chains(),
        vec![Component::agg_chain(AggFunc::Sum, col(&orders, "cust"))]
    );
    assert_eq!(agg.data_type(), Some(DataType::Number));
}

#[test]
fn test_counters() {
    let (customers, orders) = customers_orders();
    let id = col(&customers, "id");
    let five = Component::int_const(5);
    let pred = Component::predicate_op(id.clone(), CompareOp::Eq, five.clone());
    let c = pred.counter();
    assert_eq!(c.get(&id.fingerprint()), 1);
    assert_eq!(c.get(&five.fingerprint()), 1);
    assert_eq!(c.get(&pred.fingerprint()), 1);
    assert_eq!(
        c.get(&Component::compare_op(CompareOp::Eq).fingerprint()),
        1
    );

    // AND does not count itself, OR does.
    let and = Component::predicate_logic(pred.clone(), LogicOp::And, pred.clone());
    assert!(!and.counter().contains(&and.fingerprint()));
    let or = Component::predicate_logic(pred.clone(), LogicOp::Or, pred);
    assert!(or.counter().contains(&or.fingerprint()));

    // Aggregations are counted as the chain they compute.
    let cust = col(&orders, "cust");
    let agg = Component::aggregation(AggFunc::Max, cust.clone(), true);
    let chain = Component::agg_chain(AggFunc::Max, cust.clone());
    assert!(agg.counter().contains(&chain.fingerprint()));
    assert!(agg.counter().contains(&Component::distinct().fingerprint()));
    assert!(!agg.counter().contains(&agg.fingerprint()));

    // A comparison over an aggregation is counted by its chain form.
    let having = Component::predicate_op(agg.clone(), CompareOp::Lt, five);
    assert_ne!(having.chain_form(), having);
    assert!(having.counter().contains(&having.chain_form().fingerprint()));

    // Select clauses take the union of their items.
    let select = Component::select_clause(vec![cust.clone(), cust.clone()]);
    assert_eq!(select.counter().get(&cust.fingerprint()), 1);

    assert!(Component::absent().counter().is_empty());
}
