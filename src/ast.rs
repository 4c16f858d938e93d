//! This module defines abstract syntax tree (AST) types for SQL.
//! Every AST type renders back to SQL text through `Display`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => self.name.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    String(String),
    Real(f64),
    Bool(bool),
    Null(),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(x) => x.fmt(f),
            Constant::String(x) => write!(f, "'{}'", x.replace('\'', "''")),
            Constant::Real(x) => x.fmt(f),
            Constant::Bool(true) => "TRUE".fmt(f),
            Constant::Bool(false) => "FALSE".fmt(f),
            Constant::Null() => "NULL".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmpOp::Eq => "=".fmt(f),
            CmpOp::NotEq => "<>".fmt(f),
            CmpOp::Lt => "<".fmt(f),
            CmpOp::LtEq => "<=".fmt(f),
            CmpOp::Gt => ">".fmt(f),
            CmpOp::GtEq => ">=".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl std::fmt::Display for BoolOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoolOp::And => "AND".fmt(f),
            BoolOp::Or => "OR".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

impl std::fmt::Display for OrderItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.descending {
            true => write!(f, "{} DESC", self.expr),
            false => write!(f, "{} ASC", self.expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: String,
    pub distinct: bool,
    /// `f(*)`.
    pub star: bool,
    pub args: Vec<Expr>,
    pub over: Option<WindowSpec>,
}

impl std::fmt::Display for FuncCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.star {
            write!(f, "*")?;
        }
        write!(f, "{})", join(&self.args, ", "))?;
        if let Some(w) = &self.over {
            write!(f, " OVER (")?;
            let mut parts = vec![];
            if !w.partition_by.is_empty() {
                parts.push(format!("PARTITION BY {}", join(&w.partition_by, ", ")));
            }
            if !w.order_by.is_empty() {
                parts.push(format!("ORDER BY {}", join(&w.order_by, ", ")));
            }
            write!(f, "{})", parts.join(" "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Constant(Constant),
    Compare {
        lhs: Box<Expr>,
        op: CmpOp,
        rhs: Box<Expr>,
    },
    Logic {
        lhs: Box<Expr>,
        op: BoolOp,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Func(FuncCall),
    Subquery(Box<SelectStatement>),
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Column(c) => c.fmt(f),
            Expr::Constant(c) => c.fmt(f),
            Expr::Compare { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Logic { lhs, op, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Not(e) => write!(f, "NOT ({})", e),
            Expr::IsNull { expr, negated } => match negated {
                true => write!(f, "{} IS NOT NULL", expr),
                false => write!(f, "{} IS NULL", expr),
            },
            Expr::Func(x) => x.fmt(f),
            Expr::Subquery(q) => write!(f, "({})", q),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelItem {
    Expr { expr: Expr, alias: Option<String> },
    Star,
}

impl std::fmt::Display for SelItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelItem::Expr { expr, alias: None } => expr.fmt(f),
            SelItem::Expr {
                expr,
                alias: Some(a),
            } => write!(f, "{} AS {}", expr, a),
            SelItem::Star => "*".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinKind::Inner => "INNER JOIN".fmt(f),
            JoinKind::Left => "LEFT JOIN".fmt(f),
            JoinKind::Right => "RIGHT JOIN".fmt(f),
            JoinKind::Full => "FULL JOIN".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Box<SelectStatement>,
        alias: Option<String>,
    },
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        kind: JoinKind,
        on: Option<Expr>,
    },
}

impl std::fmt::Display for FromItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FromItem::Table { name, alias: None } => name.fmt(f),
            FromItem::Table {
                name,
                alias: Some(a),
            } => write!(f, "{} AS {}", name, a),
            FromItem::Subquery { query, alias: None } => write!(f, "({})", query),
            FromItem::Subquery {
                query,
                alias: Some(a),
            } => write!(f, "({}) AS {}", query, a),
            FromItem::Join {
                left,
                right,
                kind,
                on,
            } => {
                match right.as_ref() {
                    FromItem::Join { .. } => write!(f, "{} {} ({})", left, kind, right)?,
                    _ => write!(f, "{} {} {}", left, kind, right)?,
                }
                match on {
                    Some(on) => write!(f, " ON {}", on),
                    None => Ok(()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub distinct: bool,
    pub items: Vec<SelItem>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
}

impl SelectStatement {
    /// The names of the output columns: the alias if given, else the column name, else `tmp`.
    pub fn output_names(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| match item {
                SelItem::Expr {
                    alias: Some(a), ..
                } => a.clone(),
                SelItem::Expr {
                    expr: Expr::Column(c),
                    alias: None,
                } => c.name.clone(),
                _ => String::from("tmp"),
            })
            .collect()
    }
}

impl std::fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{}", join(&self.items, ", "))?;
        if !self.from.is_empty() {
            write!(f, " FROM {}", join(&self.from, ", "))?;
        }
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {}", w)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", join(&self.group_by, ", "))?;
        }
        if let Some(h) = &self.having {
            write!(f, " HAVING {}", h)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", join(&self.order_by, ", "))?;
        }
        Ok(())
    }
}

fn join<T: std::fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColDef {
    pub colname: String,
    pub coltype: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStatement {
    pub tablename: String,
    pub coldefs: Vec<ColDef>,
}

#[test]
fn test_display_select_statement() {
    let ss = SelectStatement {
        distinct: true,
        items: vec![SelItem::Expr {
            expr: Expr::Column(ColumnRef {
                qualifier: Some(String::from("c")),
                name: String::from("name"),
            }),
            alias: Some(String::from("n")),
        }],
        from: vec![FromItem::Table {
            name: String::from("customers"),
            alias: Some(String::from("c")),
        }],
        where_clause: Some(Expr::Compare {
            lhs: Box::new(Expr::Column(ColumnRef {
                qualifier: None,
                name: String::from("id"),
            })),
            op: CmpOp::GtEq,
            rhs: Box::new(Expr::Constant(Constant::String(String::from("it's")))),
        }),
        ..Default::default()
    };
    assert_eq!(
        ss.to_string(),
        "SELECT DISTINCT c.name AS n FROM customers AS c WHERE id >= 'it''s'"
    );
}

#[test]
fn test_output_names() {
    let col = |n: &str| {
        Expr::Column(ColumnRef {
            qualifier: None,
            name: String::from(n),
        })
    };
    let ss = SelectStatement {
        items: vec![
            SelItem::Expr {
                expr: col("a"),
                alias: None,
            },
            SelItem::Expr {
                expr: col("b"),
                alias: Some(String::from("bee")),
            },
            SelItem::Expr {
                expr: Expr::Constant(Constant::Int(1)),
                alias: None,
            },
        ],
        ..Default::default()
    };
    assert_eq!(ss.output_names(), vec!["a", "bee", "tmp"]);
}
