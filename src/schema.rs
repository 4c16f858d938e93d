//! `schema` holds the table definitions a query is synthesized against.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::ast;
use crate::data_type::DataType;
use crate::pt_to_ast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<(String, DataType)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<String, TableDef>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    /// Builds a schema from `;`-separated `CREATE TABLE` statements.
    pub fn from_sql(sql: &str) -> Result<Schema, pt_to_ast::Error> {
        let mut schema = Schema::new();
        for stmt in pt_to_ast::pt_schema_to_ast(sql)? {
            schema.add_create_statement(&stmt);
        }
        Ok(schema)
    }

    pub fn add_create_statement(&mut self, stmt: &ast::CreateStatement) {
        let columns = stmt
            .coldefs
            .iter()
            .map(|c| {
                (
                    c.colname.clone(),
                    DataType::from_str(&c.coltype).unwrap_or(DataType::Str),
                )
            })
            .collect();
        self.add_table(&stmt.tablename, columns);
    }

    pub fn add_table(&mut self, name: &str, columns: Vec<(String, DataType)>) {
        self.tables.insert(
            name.to_lowercase(),
            TableDef {
                name: String::from(name),
                columns,
            },
        );
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[test]
fn test_schema_from_sql() {
    let schema = Schema::from_sql(
        "CREATE TABLE customers (id int, name varchar); CREATE TABLE orders (id int, cust int)",
    )
    .unwrap();
    assert_eq!(schema.len(), 2);
    let customers = schema.table("CUSTOMERS").unwrap();
    assert_eq!(
        customers.columns,
        vec![
            (String::from("id"), DataType::Number),
            (String::from("name"), DataType::Str)
        ]
    );
    assert!(schema.table("products").is_none());
}
