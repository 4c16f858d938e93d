//! Physical tables referenced by a query, each instance with its own identity.

use crate::data_type::DataType;

/// One instantiation of a schema table inside a query. Two instances of the same schema table
/// (as in a self-join) differ by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    pub name: String,
    pub columns: Vec<(String, DataType)>,
    pub id: u64,
}

/// Hands out table identities. One generator is threaded through the translation of a query.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> IdGenerator {
        IdGenerator::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn table(&mut self, name: &str, columns: Vec<(String, DataType)>) -> Table {
        Table {
            name: String::from(name),
            columns,
            id: self.next_id(),
        }
    }
}

#[test]
fn test_tables_get_distinct_ids() {
    let mut ids = IdGenerator::new();
    let cols = vec![(String::from("id"), DataType::Number)];
    let a = ids.table("t", cols.clone());
    let b = ids.table("t", cols);
    assert_ne!(a, b);
    assert_eq!(a.id + 1, b.id);
}
