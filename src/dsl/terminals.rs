//! Operator and keyword terminals.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompareOp {
    Lt,
    Leq,
    Eq,
    Neq,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Lt => "<".fmt(f),
            CompareOp::Leq => "<=".fmt(f),
            CompareOp::Eq => "=".fmt(f),
            CompareOp::Neq => "<>".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicOp {
    And,
    Or,
}

impl std::fmt::Display for LogicOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicOp::And => "AND".fmt(f),
            LogicOp::Or => "OR".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinType {
    Inner,
    Left,
    Full,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => "INNER JOIN".fmt(f),
            JoinType::Left => "LEFT JOIN".fmt(f),
            JoinType::Full => "FULL JOIN".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    BitAnd,
    BitOr,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<AggFunc> {
        match name.to_lowercase().as_str() {
            "count" => Some(AggFunc::Count),
            "sum" => Some(AggFunc::Sum),
            "avg" => Some(AggFunc::Avg),
            "max" => Some(AggFunc::Max),
            "min" => Some(AggFunc::Min),
            "bit_and" => Some(AggFunc::BitAnd),
            "bit_or" => Some(AggFunc::BitOr),
            _ => None,
        }
    }

    /// Lower-case name, used as a hint for generated column aliases.
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::BitAnd => "bit_and",
            AggFunc::BitOr => "bit_or",
        }
    }
}

impl std::fmt::Display for AggFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().to_uppercase().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowFunc {
    DenseRank,
}

impl WindowFunc {
    pub fn from_name(name: &str) -> Option<WindowFunc> {
        match name.to_lowercase().as_str() {
            "dense_rank" => Some(WindowFunc::DenseRank),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowFunc::DenseRank => "dense_rank",
        }
    }
}

impl std::fmt::Display for WindowFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().to_uppercase().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderDir {
    Asc,
    Desc,
}

impl std::fmt::Display for OrderDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderDir::Asc => "ASC".fmt(f),
            OrderDir::Desc => "DESC".fmt(f),
        }
    }
}

#[test]
fn test_agg_func_names() {
    for func in [
        AggFunc::Count,
        AggFunc::Sum,
        AggFunc::Avg,
        AggFunc::Max,
        AggFunc::Min,
        AggFunc::BitAnd,
        AggFunc::BitOr,
    ] {
        assert_eq!(AggFunc::from_name(func.name()), Some(func));
    }
    assert_eq!(AggFunc::from_name("SUM"), Some(AggFunc::Sum));
    assert_eq!(AggFunc::from_name("median"), None);
    assert_eq!(AggFunc::BitAnd.to_string(), "BIT_AND");
}
