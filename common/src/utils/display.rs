//! Plain-text rendering of query results and nested JSON.

use serde_json::Value;

use crate::models::query::QueryResult;

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a result as a boxed text table.
pub fn render_table(table: &QueryResult) -> String {
    let headers: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            (0..headers.len())
                .map(|i| row.get(i).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = {
        let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+", parts.join("+"))
    };
    let line = |values: &[String]| {
        let parts: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:<width$} ", v, width = *w))
            .collect();
        format!("|{}|", parts.join("|"))
    };

    let mut out = vec![border.clone(), line(headers.as_slice()), border.clone()];
    out.extend(cells.iter().map(|r| line(r.as_slice())));
    out.push(border);
    out.push(format!("({} rows)", table.rows.len()));
    out.join("\n")
}

/// Flattens nested JSON into `(path, value)` pairs.
///
/// Object keys are joined with `.`, array items use `[i]`.
pub fn flatten_paths(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    walk(value, String::new(), &mut out);
    out
}

fn walk(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                walk(v, path, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk(v, format!("{}[{}]", prefix, i), out);
            }
        }
        other => out.push((prefix, cell_text(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::ColumnInfo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_table() {
        let table = QueryResult::from_rows(
            vec![ColumnInfo::new("id", "integer"), ColumnInfo::new("name", "text")],
            vec![vec![json!(1), json!("alpha")], vec![json!(22), Value::Null]],
        );
        let expected = "\
+----+-------+
| id | name  |
+----+-------+
| 1  | alpha |
| 22 |       |
+----+-------+
(2 rows)";
        assert_eq!(render_table(&table), expected);
    }

    #[test]
    fn test_render_empty_table_keeps_header() {
        let table = QueryResult::with_columns(vec![ColumnInfo::new("one", "INTEGER")]);
        assert!(render_table(&table).contains("| one |"));
        assert!(render_table(&table).ends_with("(0 rows)"));
    }

    #[test]
    fn test_flatten_paths() {
        let value = json!({"key": "OPS-1", "fields": {"summary": "Fix", "labels": ["a", "b"]}});
        assert_eq!(
            flatten_paths(&value),
            vec![
                ("key".to_string(), "OPS-1".to_string()),
                ("fields.summary".to_string(), "Fix".to_string()),
                ("fields.labels[0]".to_string(), "a".to_string()),
                ("fields.labels[1]".to_string(), "b".to_string()),
            ]
        );
    }
}
