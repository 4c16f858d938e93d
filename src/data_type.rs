//! Defines the semantic data types that the synthesizer distinguishes and their mapping from
//! the type names used in `CREATE TABLE` statements.
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Comparison operators other than equality only type-check on `Number`.
/// Everything that is not numeric is treated as a string.
pub enum DataType {
    Number,
    Str,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Number => "number".fmt(f),
            DataType::Str => "str".fmt(f),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unable to parse DataType from type name: {0}.")]
    ParseDataTypeError(String),
}

impl FromStr for DataType {
    type Err = Error;

    /// Accepts a declared column type such as `int`, `varchar(20)` or `decimal(10, 2)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let base = s.split('(').next().unwrap_or("").trim().to_lowercase();
        match base.as_str() {
            "" => Err(Error::ParseDataTypeError(String::from(s))),
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "decimal" | "numeric"
            | "real" | "float" | "double" => Ok(DataType::Number),
            _ => Ok(DataType::Str),
        }
    }
}

use crate::ast;
/// The type of a literal, or `None` for literals the synthesizer cannot model.
pub fn from_ast_constant(c: &ast::Constant) -> Option<DataType> {
    match c {
        ast::Constant::Int(_) => Some(DataType::Number),
        ast::Constant::Real(_) => Some(DataType::Number),
        ast::Constant::String(_) => Some(DataType::Str),
        ast::Constant::Bool(_) => None,
        ast::Constant::Null() => None,
    }
}

#[test]
fn test_data_type_from_str() {
    let cases = vec![
        ("int", Ok(DataType::Number)),
        ("INTEGER", Ok(DataType::Number)),
        ("decimal(10, 2)", Ok(DataType::Number)),
        ("varchar(255)", Ok(DataType::Str)),
        ("date", Ok(DataType::Str)),
        ("", Err(Error::ParseDataTypeError(String::new()))),
    ];
    for (input, expected) in cases {
        println!("Running case: {}", input);
        assert_eq!(DataType::from_str(input), expected);
    }
}
