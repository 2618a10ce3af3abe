//! Query request and tabular result models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl QueryParam {
    /// JSON form of the parameter, used by HTTP sources.
    pub fn to_json(&self) -> Value {
        match self {
            QueryParam::Null => Value::Null,
            QueryParam::Bool(b) => Value::Bool(*b),
            QueryParam::Int(i) => Value::from(*i),
            QueryParam::Float(f) => Value::from(*f),
            QueryParam::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        QueryParam::Text(s.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(i: i64) -> Self {
        QueryParam::Int(i)
    }
}

/// A query to run through the retrying client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueryRequest {
    /// Query text, passed through to the remote service untouched.
    #[validate(length(min = 1, message = "Query text is required"))]
    pub query: String,

    /// Positional bound parameters.
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl QueryRequest {
    /// Creates a request without parameters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Adds positional parameters.
    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }
}

/// Result of a query: named columns plus rows of JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column information.
    pub columns: Vec<ColumnInfo>,

    /// Row data (each row is a vector of JSON values).
    pub rows: Vec<Vec<Value>>,

    /// Number of rows returned.
    #[serde(default)]
    pub row_count: usize,

    /// Number of rows affected (for INSERT/UPDATE/DELETE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,

    /// Query execution time in milliseconds.
    #[serde(default)]
    pub execution_time_ms: u64,
}

/// Column information in query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type as reported by the source.
    pub data_type: String,

    /// Whether the column is nullable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

impl ColumnInfo {
    /// Creates a column with unknown nullability.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: None,
        }
    }
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn empty() -> Self {
        Self::with_columns(vec![])
    }

    /// Creates an empty result that still carries its column identifiers.
    pub fn with_columns(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            rows: vec![],
            row_count: 0,
            affected_rows: None,
            execution_time_ms: 0,
        }
    }

    /// Creates a result from columns and rows, filling in the row count.
    pub fn from_rows(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            affected_rows: None,
            execution_time_ms: 0,
        }
    }

    /// Builds a table from a list of JSON objects.
    ///
    /// Column order follows first appearance across records; missing cells
    /// become `null`. Returns `None` if any record is not an object.
    pub fn from_records(records: &[Value]) -> Option<Self> {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.as_object()?.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                names
                    .iter()
                    .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect::<Vec<Vec<Value>>>();

        let columns = names
            .iter()
            .map(|name| {
                let data_type = rows
                    .iter()
                    .filter_map(|row| {
                        let idx = names.iter().position(|n| n == name)?;
                        json_type_name(&row[idx])
                    })
                    .next()
                    .unwrap_or("null");
                ColumnInfo::new(name.clone(), data_type)
            })
            .collect();

        Some(Self::from_rows(columns, rows))
    }

    /// Creates a query result with affected rows count (for non-SELECT queries).
    pub fn affected(affected: u64, execution_time_ms: u64) -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            row_count: 0,
            affected_rows: Some(affected),
            execution_time_ms,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of the named column.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }

    /// Appends a column whose values are supplied per row.
    ///
    /// Values beyond the current row count are ignored; missing values are `null`.
    pub fn push_column(&mut self, column: ColumnInfo, values: Vec<Value>) {
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or(Value::Null));
        }
        self.columns.push(column);
    }
}

fn json_type_name(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("double"),
        Value::String(_) => Some("text"),
        Value::Array(_) => Some("array"),
        Value::Object(_) => Some("object"),
    }
}
