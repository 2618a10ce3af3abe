//! Fork-join helpers for applying a function to table rows on worker threads.

use serde_json::Value;

use crate::models::query::{ColumnInfo, QueryResult};

/// Splits `len` items into `parts` contiguous ranges.
///
/// The first `len % parts` ranges get one extra item. `parts == 0` is
/// treated as 1. Ranges may be empty when `parts > len`.
pub fn chunk_ranges(len: usize, parts: usize) -> Vec<std::ops::Range<usize>> {
    let parts = parts.max(1);
    let base = len / parts;
    let extra = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Applies `f` to every item, one scoped thread per chunk, keeping input order.
///
/// A panic in a worker is re-raised on the calling thread once all workers
/// have been joined.
pub fn parallel_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let ranges = chunk_ranges(items.len(), workers);
    let f = &f;

    let chunk_results: Vec<std::thread::Result<Vec<R>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .map(|range| {
                let chunk = &items[range];
                scope.spawn(move || chunk.iter().map(f).collect::<Vec<R>>())
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut out = Vec::with_capacity(items.len());
    for result in chunk_results {
        match result {
            Ok(values) => out.extend(values),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
    out
}

/// Computes a new column from each row in parallel and appends it to the table.
pub fn apply_column<F>(table: &mut QueryResult, column: ColumnInfo, workers: usize, f: F)
where
    F: Fn(&[Value]) -> Value + Sync,
{
    let values = parallel_map(&table.rows, workers, |row| f(row.as_slice()));
    table.push_column(column, values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_ranges_match_array_split() {
        assert_eq!(chunk_ranges(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(chunk_ranges(2, 4), vec![0..1, 1..2, 2..2, 2..2]);
        assert_eq!(chunk_ranges(5, 0), vec![0..5]);
    }

    #[test]
    fn test_parallel_map_preserves_order() {
        let items: Vec<u64> = (0..1000).collect();
        let squared = parallel_map(&items, 7, |x| x * x);
        let expected: Vec<u64> = items.iter().map(|x| x * x).collect();
        assert_eq!(squared, expected);
    }

    #[test]
    fn test_parallel_map_empty_input() {
        let items: Vec<i32> = vec![];
        assert!(parallel_map(&items, 4, |x| *x).is_empty());
    }

    #[test]
    fn test_apply_column_sums_rows() {
        let mut table = QueryResult::from_rows(
            vec![ColumnInfo::new("a", "integer"), ColumnInfo::new("b", "integer")],
            (0..20).map(|i| vec![json!(i), json!(i * 10)]).collect(),
        );
        apply_column(&mut table, ColumnInfo::new("sum", "integer"), 3, |row| {
            json!(row[0].as_i64().unwrap_or(0) + row[1].as_i64().unwrap_or(0))
        });
        assert_eq!(table.column_names(), vec!["a", "b", "sum"]);
        assert_eq!(table.rows[19][2], json!(19 + 190));
        assert_eq!(table.rows[0][2], json!(0));
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_worker_panic_propagates() {
        let items = vec![1, 2, 3];
        parallel_map(&items, 2, |x| {
            if *x == 3 {
                panic!("boom");
            }
            *x
        });
    }
}
