//! Query results

use crate::slice::Slice;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use uuid::Uuid;

/// Vertex counters of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// Vertices in the DAG
    pub steps: usize,
    pub evaluated: usize,
    pub cached: usize,
    pub skipped: usize,
    /// Vertices completing after cancellation
    pub leaked: usize,
    /// Vertices only reachable through cache hits, never run
    pub pruned: usize,
    /// Most step outputs held at once
    pub peak_outputs: usize,
    pub elapsed_ms: u64,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub slice: Slice,
    /// Values of the measures that produced one for this slice
    pub values: BTreeMap<String, Value>,
}

/// Table of slice → {measure: value}
#[derive(Debug, Clone, Serialize)]
pub struct CubeResult {
    pub query_id: Uuid,
    /// Requested measures, in request order
    pub columns: Vec<String>,
    /// Rows sorted by slice
    pub rows: Vec<ResultRow>,
    /// Whether the query was cancelled before completing
    pub cancelled: bool,
    pub stats: ExecutionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

impl CubeResult {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check for a result without rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of a slice
    pub fn row(&self, slice: &Slice) -> Option<&ResultRow> {
        self.rows
            .binary_search_by(|row| row.slice.cmp(slice))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Value of a measure for a slice
    pub fn value(&self, slice: &Slice, measure: &str) -> Option<&Value> {
        self.row(slice)?.values.get(measure)
    }

    /// Render as an aligned text table
    pub fn to_table_string(&self) -> String {
        let coordinates: Vec<String> = self
            .rows
            .iter()
            .flat_map(|row| row.slice.iter().map(|(c, _)| c.to_string()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let header: Vec<String> = coordinates.iter().chain(&self.columns).cloned().collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                coordinates
                    .iter()
                    .map(|c| row.slice.get(c).map(|v| v.to_string()).unwrap_or_default())
                    .chain(
                        self.columns
                            .iter()
                            .map(|m| row.values.get(m).map(|v| v.to_string()).unwrap_or_default()),
                    )
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = (0..header.len())
            .map(|i| {
                body.iter()
                    .map(|cells| cells[i].len())
                    .chain(std::iter::once(header[i].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let render = |cells: &[String], out: &mut String| {
            let line: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect();
            let _ = writeln!(out, "{}", line.join(" | ").trim_end());
        };

        render(&header, &mut out);
        let _ = writeln!(
            out,
            "{}",
            widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
        );
        for cells in &body {
            render(cells, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> CubeResult {
        let row = |color: &str, k1: i64| ResultRow {
            slice: Slice::of([("color", color)]),
            values: [("k1".to_string(), Value::Long(k1))].into_iter().collect(),
        };
        CubeResult {
            query_id: Uuid::new_v4(),
            columns: vec!["k1".to_string(), "k2".to_string()],
            rows: vec![row("blue", 10), row("red", 3)],
            cancelled: false,
            stats: ExecutionStats::default(),
            explain: None,
        }
    }

    #[test]
    fn test_lookup() {
        let result = result();
        let red = Slice::of([("color", "red")]);
        assert_eq!(result.value(&red, "k1"), Some(&Value::Long(3)));
        assert_eq!(result.value(&red, "k2"), None);
        assert!(result.row(&Slice::of([("color", "green")])).is_none());
    }

    #[test]
    fn test_table_rendering() {
        let table = result().to_table_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "color | k1 | k2");
        assert_eq!(lines[2], "blue  | 10 |");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_json() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!(json["columns"][0], "k1");
        assert_eq!(json["rows"][1]["slice"]["color"], "red");
        assert_eq!(json["rows"][1]["values"]["k1"], 3);
        assert!(json.get("explain").is_none());
    }
}
