//! Query compilation.
//!
//! Turns a [`QuerySpec`] into the single `SELECT` statement the datasource
//! streams from. Compilation is pure: equal specs always produce identical
//! text.
//!
//! String values are quoted but not escaped. Callers must not pass untrusted
//! input as filter values.

use std::fmt;
use std::str::FromStr;

use tundra_common::{Error, Result};

/// Comparison operators accepted in filter clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::GtEq => ">=",
            Operator::LtEq => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::NotEq),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::GtEq),
            "<=" => Ok(Operator::LtEq),
            other => Err(Error::Compilation(format!("unsupported operator '{}'", other))),
        }
    }
}

/// A single typed value, used both for filter literals and for cells
/// returned by scalar queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Renders the value as a query literal. `Null` has no literal form.
    fn to_literal(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::UInt(u) => Some(u.to_string()),
            Scalar::Float(v) => Some(v.to_string()),
            Scalar::String(s) => Some(format!("'{}'", s)),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value as i64)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::UInt(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column: String,
    pub op: Operator,
    pub value: Scalar,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<Scalar>) -> Self {
        Self { column: column.into(), op, value: value.into() }
    }

    /// Renders the clause body, without the surrounding parentheses.
    pub fn render(&self) -> Result<String> {
        match (self.op, self.value.to_literal()) {
            (Operator::NotEq, None) => Ok(format!("{} IS NOT NULL", self.column)),
            (op, None) => Err(Error::Compilation(format!(
                "operator '{}' on column '{}' has no rendering for a null value",
                op, self.column
            ))),
            (op, Some(literal)) => Ok(format!("{} {} {}", self.column, op, literal)),
        }
    }
}

/// Filter clauses keyed by column, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    clauses: Vec<ColumnFilter>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clause for `filter.column`. A column that already has a clause
    /// keeps its position and takes the new operator and value.
    pub fn insert(&mut self, filter: ColumnFilter) {
        match self.clauses.iter_mut().find(|c| c.column == filter.column) {
            Some(existing) => *existing = filter,
            None => self.clauses.push(filter),
        }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnFilter> {
        self.clauses.iter().find(|c| c.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnFilter> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl FromIterator<ColumnFilter> for Filters {
    fn from_iter<I: IntoIterator<Item = ColumnFilter>>(iter: I) -> Self {
        let mut filters = Filters::new();
        for filter in iter {
            filters.insert(filter);
        }
        filters
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub columns: Vec<String>,
    pub descending: bool,
}

impl OrderSpec {
    pub fn new<I, S>(columns: I, descending: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect(), descending }
    }

    pub fn asc<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(columns, false)
    }

    pub fn desc<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(columns, true)
    }

    /// `None` when there is nothing to order by.
    fn render(&self) -> Option<String> {
        let mut clause = match self.columns.as_slice() {
            [] => return None,
            [single] => format!("ORDER BY {}", single),
            many => format!("ORDER BY ({})", many.join(", ")),
        };
        if self.descending {
            clause.push_str(" DESC");
        }
        Some(clause)
    }
}

/// Structured description of a query against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub table: String,
    /// `None` selects every column.
    pub columns: Option<Vec<String>>,
    pub filters: Filters,
    pub order: Option<OrderSpec>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), columns: None, filters: Filters::new(), order: None }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filter(
        mut self,
        column: impl Into<String>,
        op: Operator,
        value: impl Into<Scalar>,
    ) -> Self {
        self.filters.insert(ColumnFilter::new(column, op, value));
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order = Some(order);
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.order.as_ref().is_some_and(|o| !o.columns.is_empty())
    }

    pub fn compile(&self) -> Result<String> {
        compile(self)
    }
}

/// Compiles a query spec into `SELECT .. FROM .. [WHERE ..] [ORDER BY ..]`.
pub fn compile(spec: &QuerySpec) -> Result<String> {
    let projection = match spec.columns.as_deref() {
        None | Some([]) => "*".to_string(),
        Some(columns) => columns.join(", "),
    };

    let mut clauses = vec![format!("SELECT {}", projection), format!("FROM {}", spec.table)];

    if !spec.filters.is_empty() {
        let predicates = spec
            .filters
            .iter()
            .map(|f| f.render().map(|body| format!("({})", body)))
            .collect::<Result<Vec<_>>>()?;
        clauses.push(format!("WHERE {}", predicates.join(" AND ")));
    }

    if let Some(order_clause) = spec.order.as_ref().and_then(OrderSpec::render) {
        clauses.push(order_clause);
    }

    Ok(clauses.join(" "))
}
