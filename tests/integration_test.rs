use querysynth::synthesizer::Error;
use querysynth::translate;
use querysynth::{Candidate, Oracle, SynthConfig, Verdict};

const SCHEMA: &str = "CREATE TABLE customers (id int, name varchar(40));
                      CREATE TABLE orders (id int, cust int, total decimal(10, 2));";

const SCENARIO: &str = "SELECT customers.name FROM customers JOIN orders \
                        ON customers.id = orders.cust WHERE orders.id = 5";

fn bounded(max_cost: i64) -> SynthConfig {
    SynthConfig {
        max_cost: Some(max_cost),
        ..SynthConfig::default()
    }
}

fn candidates(query: &str, config: SynthConfig, n: usize) -> Vec<Candidate> {
    querysynth::synthesize(SCHEMA, query, config)
        .unwrap()
        .take(n)
        .map(|c| c.unwrap())
        .collect()
}

#[test]
fn test_placeholder_then_literal() {
    let got = candidates(SCENARIO, SynthConfig::default(), 2);
    assert_eq!(
        got[0].sql,
        "SELECT \"c1\" FROM (VALUES (NULL)) AS \"T_cte_empty\"(\"c1\") WHERE 1 = 0"
    );
    assert_eq!(got[0].cost, 0);
    assert_eq!(
        got[1].sql,
        "SELECT \"T_customers_0\".\"name\" AS \"name\" FROM \"customers\" AS \"T_customers_0\" \
         INNER JOIN \"orders\" AS \"T_orders_0\" ON \"T_customers_0\".\"id\" = \"T_orders_0\".\"cust\" \
         WHERE \"T_orders_0\".\"id\" = 5"
    );
    assert_eq!(got[1].cost, 0);
}

#[test]
fn test_swapped_join_at_no_cost() {
    let got = candidates(SCENARIO, bounded(0), usize::MAX);
    assert!(got.iter().all(|c| c.cost == 0));
    assert!(got
        .iter()
        .any(|c| c.sql.contains("FROM \"orders\" AS \"T_orders_0\" INNER JOIN \"customers\"")));
}

#[test]
fn test_order_by_aggregate_outside_select() {
    let query = "SELECT orders.cust FROM orders GROUP BY orders.cust ORDER BY COUNT(orders.id)";
    let got = candidates(query, bounded(0), usize::MAX);
    assert_eq!(
        got[1].sql,
        "SELECT \"T_orders_0\".\"cust\" AS \"cust\" FROM \"orders\" AS \"T_orders_0\" \
         GROUP BY \"T_orders_0\".\"cust\" ORDER BY COUNT(\"T_orders_0\".\"id\") ASC"
    );
    assert_eq!(got[1].cost, 0);
}

/// The text of every WHERE clause in `sql`, up to the next clause or the end of its query.
fn where_clauses(sql: &str) -> Vec<&str> {
    let ends = [" GROUP BY ", " HAVING ", " ORDER BY ", ") AS "];
    sql.match_indices(" WHERE ")
        .map(|(i, w)| {
            let rest = &sql[i + w.len()..];
            let end = ends
                .iter()
                .filter_map(|e| rest.find(e))
                .min()
                .unwrap_or(rest.len());
            &rest[..end]
        })
        .collect()
}

#[test]
fn test_no_aggregates_in_where() {
    let aggregates = ["COUNT(", "SUM(", "AVG(", "MAX(", "MIN(", "BIT_AND(", "BIT_OR("];
    let query = "SELECT orders.cust, COUNT(orders.id) FROM orders WHERE orders.total > 10 \
                 GROUP BY orders.cust";
    let got = candidates(query, bounded(1), 150);
    assert!(got.len() > 2);
    for c in &got[1..] {
        for clause in where_clauses(&c.sql) {
            for agg in aggregates {
                assert!(!clause.contains(agg), "aggregate in WHERE: {}", c.sql);
            }
        }
    }
}

#[test]
fn test_two_output_columns() {
    let query = "SELECT customers.name, orders.id FROM customers JOIN orders \
                 ON customers.id = orders.cust";
    let got = candidates(query, bounded(0), usize::MAX);
    assert!(got[0].sql.starts_with("SELECT \"c1\", \"c2\" FROM (VALUES (NULL, NULL))"));
    assert!(got.len() >= 2);
    for c in &got[1..] {
        assert!(c.sql.contains(" AS \"name\", "), "{}", c.sql);
        assert!(c.sql.contains(" AS \"id\" FROM "), "{}", c.sql);
    }
}

#[test]
fn test_translation_errors() {
    struct Case {
        desc: &'static str,
        query: &'static str,
        expected: translate::Error,
    }
    let cases = vec![
        Case {
            desc: "unknown column",
            query: "SELECT price FROM orders",
            expected: translate::Error::AliasResolutionMissing(String::from("price")),
        },
        Case {
            desc: "unknown table",
            query: "SELECT a FROM nowhere",
            expected: translate::Error::UnknownTable(String::from("nowhere")),
        },
    ];
    for case in cases {
        println!("Running case: {}", case.desc);
        let items: Vec<Result<Candidate, Error>> =
            querysynth::synthesize(SCHEMA, case.query, SynthConfig::default())
                .unwrap()
                .collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(Error::Translation(case.expected)));
    }
}

#[test]
fn test_unparseable_input() {
    assert!(querysynth::synthesize(SCHEMA, "SELECT FROM", SynthConfig::default()).is_err());
    assert!(querysynth::synthesize("CREATE TABLE", SCENARIO, SynthConfig::default()).is_err());
}

/// Accepts everything except the placeholder.
struct AcceptAll;

impl Oracle for AcceptAll {
    type Counterexample = ();

    fn test(
        &mut self,
        candidate: &str,
        _original: &str,
        _counterexamples: &[()],
    ) -> anyhow::Result<(bool, Vec<()>)> {
        Ok((!candidate.contains("VALUES"), vec![()]))
    }
}

#[test]
fn test_optimize_reports_first_accepted() {
    let mut reports = querysynth::optimize(SCHEMA, SCENARIO, bounded(0), AcceptAll).unwrap();
    let first = reports.next().unwrap().unwrap();
    assert_eq!(first.verdict, Verdict::Equivalent);
    assert!(first.sql.starts_with("SELECT \"T_customers_0\".\"name\" AS \"name\""));
    assert_eq!(first.stats.generated, 2);
    assert_eq!(first.stats.passed, 1);
    assert_eq!(first.stats.oracle_breaks, 0);

    let rest: Vec<_> = reports.map(|r| r.unwrap()).collect();
    assert!(!rest.is_empty());
    assert!(rest.iter().all(|r| r.verdict == Verdict::Equivalent));
}
