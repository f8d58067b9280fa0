//! DDL generation for the datasink.

use arrow::datatypes::{DataType, Schema};

/// Optional clauses for `CREATE TABLE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSettings {
    /// Defaults to `MergeTree()`.
    pub engine: Option<String>,
    /// Defaults to a column picked from the schema, see [`pick_order_by`].
    pub order_by: Option<String>,
    pub partition_by: Option<String>,
    pub primary_key: Option<String>,
    pub settings: Option<String>,
}

impl TableSettings {
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_partition_by(mut self, partition_by: impl Into<String>) -> Self {
        self.partition_by = Some(partition_by.into());
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = Some(settings.into());
        self
    }
}

/// ClickHouse column type for an Arrow type. Unknown types fall back to `String`.
pub fn clickhouse_type(data_type: &DataType) -> String {
    match data_type {
        DataType::Boolean => "UInt8".to_string(),
        DataType::Int8 => "Int8".to_string(),
        DataType::Int16 => "Int16".to_string(),
        DataType::Int32 => "Int32".to_string(),
        DataType::Int64 => "Int64".to_string(),
        DataType::UInt8 => "UInt8".to_string(),
        DataType::UInt16 => "UInt16".to_string(),
        DataType::UInt32 => "UInt32".to_string(),
        DataType::UInt64 => "UInt64".to_string(),
        DataType::Float16 | DataType::Float32 => "Float32".to_string(),
        DataType::Float64 => "Float64".to_string(),
        DataType::Decimal128(precision, scale) | DataType::Decimal256(precision, scale) => {
            let precision = if *precision == 0 { 38 } else { *precision };
            format!("Decimal({}, {})", precision, (*scale).max(0))
        }
        DataType::Timestamp(_, _) => "DateTime64(3)".to_string(),
        _ => "String".to_string(),
    }
}

fn is_string(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View)
}

/// Default sorting key: the first timestamp column, else the first
/// non-string column, else the first column, else `tuple()`.
pub fn pick_order_by(schema: &Schema) -> String {
    let fields = schema.fields();
    fields
        .iter()
        .find(|f| matches!(f.data_type(), DataType::Timestamp(_, _)))
        .or_else(|| fields.iter().find(|f| !is_string(f.data_type())))
        .or_else(|| fields.first())
        .map(|f| f.name().clone())
        .unwrap_or_else(|| "tuple()".to_string())
}

pub fn create_table_sql(table: &str, schema: &Schema, settings: &TableSettings) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|f| format!("    `{}` {}", f.name(), clickhouse_type(f.data_type())))
        .collect::<Vec<_>>()
        .join(",\n");
    let engine = settings.engine.as_deref().unwrap_or("MergeTree()");
    let order_by = settings.order_by.clone().unwrap_or_else(|| pick_order_by(schema));

    let mut lines = vec![
        format!("CREATE TABLE IF NOT EXISTS {} (", table),
        columns,
        ")".to_string(),
        format!("ENGINE = {}", engine),
        format!("ORDER BY {}", order_by),
    ];
    if let Some(partition_by) = &settings.partition_by {
        lines.push(format!("PARTITION BY {}", partition_by));
    }
    if let Some(primary_key) = &settings.primary_key {
        lines.push(format!("PRIMARY KEY ({})", primary_key));
    }
    if let Some(extra) = &settings.settings {
        lines.push(format!("SETTINGS {}", extra));
    }
    lines.join("\n")
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

pub fn show_create_table_sql(table: &str) -> String {
    format!("SHOW CREATE TABLE {}", table)
}

/// Splits `db.table`; an unqualified name lives in `default`.
pub fn split_table_name(table: &str) -> (&str, &str) {
    table.split_once('.').unwrap_or(("default", table))
}

pub fn table_exists_sql(table: &str) -> String {
    let (database, name) = split_table_name(table);
    format!(
        "SELECT 1 FROM system.tables WHERE database = '{}' AND name = '{}' LIMIT 1",
        database, name
    )
}

const CLAUSES_AFTER_ORDER_BY: [&str; 6] =
    [" ENGINE", " SETTINGS ", " PRIMARY KEY ", " PARTITION BY ", " SAMPLE BY ", " TTL "];

/// Extracts the sorting key from `SHOW CREATE TABLE` output.
pub fn parse_order_by(ddl: &str) -> Option<String> {
    let upper = ddl.to_ascii_uppercase();
    let start = upper.find("ORDER BY")? + "ORDER BY".len();

    let rest = &ddl[start..];
    let line_end = rest.find('\n').unwrap_or(rest.len());
    let line = &rest[..line_end];
    let line_upper = line.to_ascii_uppercase();
    let end = CLAUSES_AFTER_ORDER_BY
        .iter()
        .filter_map(|clause| line_upper.find(clause))
        .min()
        .unwrap_or(line.len());

    let clause = line[..end].trim();
    (!clause.is_empty()).then(|| clause.to_string())
}
