//! In-memory table
//!
//! Rows held in memory, scanned in batches. Between two batches the scan
//! checks the query's cancellation flag and stops early once it is set.
//! Tables can be loaded from CSV, inferring a type per cell.

use crate::cancellation::Cancellation;
use crate::config::TableConfig;
use crate::table::error::{TableError, TableResult};
use crate::table::{TableConnector, TableQuery, TableRow, TableStream};
use crate::value::Value;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Table backed by a vector of rows
#[derive(Debug)]
pub struct InMemoryTable {
    name: String,
    rows: Arc<Vec<Row>>,
    batch_size: usize,
    scans: AtomicUsize,
}

impl InMemoryTable {
    /// Create a table from rows
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(rows),
            batch_size: TableConfig::default().batch_size,
            scans: AtomicUsize::new(0),
        }
    }

    /// Create a table from (column, value) pairs per row
    pub fn from_rows<I, R, K, V>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
            .collect();
        Self::new(name, rows)
    }

    /// Builder method: set the number of rows per batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder method: apply table configuration
    pub fn with_config(self, config: &TableConfig) -> Self {
        self.with_batch_size(config.batch_size)
    }

    /// Load a CSV file with a header row
    pub fn from_csv_path(name: impl Into<String>, path: &Path) -> TableResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_csv_reader(name, file)
    }

    /// Load CSV data with a header row
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> TableResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = record?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(header, cell)| (header.to_string(), infer_value(cell)))
                .collect();
            rows.push(row);
        }

        let table = Self::new(name, rows);
        tracing::debug!(table = %table.name, rows = table.len(), "Loaded CSV table");
        Ok(table)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check for a table without rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of scans started so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }
}

/// Long, then Double, then Bool, else Text
fn infer_value(cell: &str) -> Value {
    if let Ok(l) = cell.parse::<i64>() {
        return Value::Long(l);
    }
    if let Ok(d) = cell.parse::<f64>() {
        return Value::Double(d);
    }
    match cell.to_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::text(cell),
    }
}

#[async_trait]
impl TableConnector for InMemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_slices(
        &self,
        query: TableQuery,
        cancellation: Arc<Cancellation>,
    ) -> TableResult<TableStream> {
        self.scans.fetch_add(1, Ordering::Relaxed);

        let rows = self.rows.clone();
        let query = Arc::new(query);
        let batch_size = self.batch_size;
        let table = self.name.clone();

        let batches = stream::unfold(0usize, move |offset| {
            let rows = rows.clone();
            let query = query.clone();
            let cancellation = cancellation.clone();
            let table = table.clone();
            async move {
                if offset >= rows.len() {
                    return None;
                }
                if cancellation.is_cancelled() {
                    tracing::debug!(table = %table, offset, "Table scan cancelled");
                    return None;
                }

                let end = (offset + batch_size).min(rows.len());
                let batch: Vec<TableResult<TableRow>> = rows[offset..end]
                    .iter()
                    .filter(|row| query.filter.matches(*row))
                    .map(|row| Ok(query.project(row)))
                    .collect();
                tracing::trace!(table = %table, offset, matched = batch.len(), "Table batch");

                tokio::task::yield_now().await;
                Some((stream::iter(batch), end))
            }
        });

        Ok(batches.flatten().boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::slice::GroupBy;
    use futures_util::TryStreamExt;
    use std::io::Write;

    fn table() -> InMemoryTable {
        InMemoryTable::from_rows(
            "sales",
            vec![
                vec![("color", Value::text("red")), ("k1", Value::Long(123))],
                vec![("color", Value::text("blue")), ("k2", Value::Long(234))],
                vec![
                    ("color", Value::text("red")),
                    ("k1", Value::Long(345)),
                    ("k2", Value::Long(456)),
                ],
            ],
        )
    }

    fn query(filter: Filter) -> TableQuery {
        TableQuery {
            filter,
            group_by: GroupBy::of(["color"]),
            aggregated_columns: vec!["k1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_stream_filters_rows() {
        let table = table().with_batch_size(1);
        let stream = table
            .stream_slices(query(Filter::equals("color", "red")), Arc::new(Cancellation::new()))
            .await
            .unwrap();
        let rows: Vec<TableRow> = stream.try_collect().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, vec![Some(Value::Long(123))]);
        assert_eq!(rows[1].values, vec![Some(Value::Long(345))]);
        assert_eq!(table.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_between_batches() {
        let table = table().with_batch_size(1);
        let cancellation = Arc::new(Cancellation::new());
        let mut stream = table
            .stream_slices(query(Filter::MatchAll), cancellation.clone())
            .await
            .unwrap();

        assert!(stream.next().await.is_some());
        cancellation.cancel();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_csv_type_inference() {
        let csv = "color,k1,ratio,flag,note\nred,1,0.5,true,\nblue,,2,FALSE,hello\n";
        let table = InMemoryTable::from_csv_reader("csv", csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first.get("k1"), Some(&Value::Long(1)));
        assert_eq!(first.get("ratio"), Some(&Value::Double(0.5)));
        assert_eq!(first.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(first.get("note"), None);

        let second = &table.rows[1];
        assert_eq!(second.get("k1"), None);
        assert_eq!(second.get("ratio"), Some(&Value::Long(2)));
        assert_eq!(second.get("flag"), Some(&Value::Bool(false)));
        assert_eq!(second.get("note"), Some(&Value::text("hello")));
    }

    #[test]
    fn test_csv_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "color,k1\nred,3").unwrap();
        let table = InMemoryTable::from_csv_path("sales", file.path()).unwrap();
        assert_eq!(table.name(), "sales");
        assert_eq!(table.len(), 1);

        let missing = InMemoryTable::from_csv_path("x", Path::new("/nonexistent/table.csv"));
        assert!(matches!(missing, Err(TableError::Io { .. })));
    }
}
