//! Measure Forest
//!
//! The name-unique, immutable registry of measures. A forest is built once,
//! before any query runs, and then shared read-only between queries.
//!
//! # Measure Files
//!
//! ```toml
//! name = "sales"
//!
//! [[measures]]
//! name = "revenue"
//! kind = "aggregator"
//! column = "revenue"
//! aggregation = "sum"
//!
//! [[measures]]
//! name = "revenue_fr"
//! kind = "filtrator"
//! underlying = "revenue"
//! filter = "country = 'FR'"
//! ```

use crate::measure::error::{MeasureError, MeasureResult};
use crate::measure::types::Measure;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Immutable registry of measures, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MeasureForest {
    name: String,
    measures: HashMap<String, Arc<Measure>>,
}

/// Accumulates measures before freezing them into a forest
#[derive(Debug, Default)]
pub struct MeasureForestBuilder {
    name: String,
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct MeasureFile {
    #[serde(default = "default_forest_name")]
    name: String,
    #[serde(default)]
    measures: Vec<Measure>,
}

fn default_forest_name() -> String {
    "default".to_string()
}

impl MeasureForestBuilder {
    /// Add a measure
    pub fn measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Add several measures
    pub fn measures<I: IntoIterator<Item = Measure>>(mut self, measures: I) -> Self {
        self.measures.extend(measures);
        self
    }

    /// Validate every measure and freeze the forest
    pub fn build(self) -> MeasureResult<MeasureForest> {
        let mut measures = HashMap::with_capacity(self.measures.len());

        for measure in self.measures {
            measure.validate()?;
            if measures.contains_key(&measure.name) {
                return Err(MeasureError::Duplicate(measure.name));
            }
            measures.insert(measure.name.clone(), Arc::new(measure));
        }

        tracing::debug!(forest = %self.name, measures = measures.len(), "Measure forest built");

        Ok(MeasureForest {
            name: self.name,
            measures,
        })
    }
}

impl MeasureForest {
    /// Start building a forest
    pub fn builder(name: impl Into<String>) -> MeasureForestBuilder {
        MeasureForestBuilder {
            name: name.into(),
            measures: Vec::new(),
        }
    }

    /// Parse a forest from TOML
    pub fn from_toml_str(content: &str) -> MeasureResult<Self> {
        let file: MeasureFile =
            toml::from_str(content).map_err(|e| MeasureError::Parse(e.to_string()))?;

        Self::builder(file.name).measures(file.measures).build()
    }

    /// Load a forest from a TOML file
    pub fn from_toml_file(path: &Path) -> MeasureResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MeasureError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Name of the forest
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look a measure up by name
    pub fn get(&self, name: &str) -> Option<&Arc<Measure>> {
        self.measures.get(name)
    }

    /// Check whether a measure is registered
    pub fn contains(&self, name: &str) -> bool {
        self.measures.contains_key(name)
    }

    /// Number of measures
    pub fn len(&self) -> usize {
        self.measures.len()
    }

    /// Check for an empty forest
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    /// Measure names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.measures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterate over measures in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Measure>> {
        self.measures.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::measure::{Aggregation, Combination, MeasureKind};
    use crate::slice::GroupBy;
    use std::io::Write;

    #[test]
    fn test_duplicate_names_rejected() {
        let result = MeasureForest::builder("test")
            .measure(Measure::aggregator("k1", "k1", Aggregation::Sum))
            .measure(Measure::aggregator("k1", "k2", Aggregation::Max))
            .build();
        assert!(matches!(result, Err(MeasureError::Duplicate(name)) if name == "k1"));
    }

    #[test]
    fn test_invalid_measure_rejected() {
        let result = MeasureForest::builder("test")
            .measure(Measure::combinator("r", ["a", "b", "c"], Combination::Divide))
            .build();
        assert!(matches!(result, Err(MeasureError::Invalid { .. })));
    }

    #[test]
    fn test_lookup() {
        let forest = MeasureForest::builder("test")
            .measure(Measure::aggregator("k1", "k1", Aggregation::Sum))
            .measure(Measure::aggregator("k2", "k2", Aggregation::Sum))
            .build()
            .unwrap();

        assert_eq!(forest.name(), "test");
        assert_eq!(forest.len(), 2);
        assert!(forest.contains("k1"));
        assert!(forest.get("k3").is_none());
        assert_eq!(forest.names(), vec!["k1", "k2"]);
    }

    #[test]
    fn test_from_toml() {
        let content = r#"
name = "sales"

[[measures]]
name = "revenue"
kind = "aggregator"
column = "revenue"
aggregation = "sum"

[[measures]]
name = "revenue_fr"
kind = "filtrator"
underlying = "revenue"
filter = "country = 'FR'"

[[measures]]
name = "revenue_all_countries"
kind = "unfiltrator"
underlying = "revenue"
columns = ["country"]

[[measures]]
name = "max_color"
kind = "bucketor"
underlying = "revenue"
group_by = ["color"]
aggregation = "max"

[[measures]]
name = "share"
kind = "combinator"
underlyings = ["revenue", "revenue_all_countries"]
combination = "divide"
description = "Share of revenue"

[[measures]]
name = "nothing"
kind = "empty"
"#;
        let forest = MeasureForest::from_toml_str(content).unwrap();
        assert_eq!(forest.name(), "sales");
        assert_eq!(forest.len(), 6);

        let fr = forest.get("revenue_fr").unwrap();
        assert_eq!(
            fr.kind,
            MeasureKind::Filtrator {
                underlying: "revenue".to_string(),
                filter: Filter::equals("country", "FR"),
            }
        );

        let bucketor = forest.get("max_color").unwrap();
        assert_eq!(
            bucketor.kind,
            MeasureKind::Bucketor {
                underlying: "revenue".to_string(),
                group_by: GroupBy::of(["color"]),
                aggregation: Aggregation::Max,
            }
        );

        let share = forest.get("share").unwrap();
        assert_eq!(share.description.as_deref(), Some("Share of revenue"));
        assert!(matches!(forest.get("nothing").unwrap().kind, MeasureKind::Empty));
    }

    #[test]
    fn test_from_toml_rejects_bad_operator() {
        let content = r#"
[[measures]]
name = "m"
kind = "aggregator"
column = "x"
aggregation = "median"
"#;
        assert!(matches!(
            MeasureForest::from_toml_str(content),
            Err(MeasureError::Parse(_))
        ));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[measures]]\nname = \"k1\"\nkind = \"aggregator\"\ncolumn = \"k1\"\naggregation = \"sum\""
        )
        .unwrap();

        let forest = MeasureForest::from_toml_file(file.path()).unwrap();
        assert_eq!(forest.name(), "default");
        assert!(forest.contains("k1"));

        let missing = MeasureForest::from_toml_file(Path::new("/nonexistent/measures.toml"));
        assert!(matches!(missing, Err(MeasureError::Io { .. })));
    }
}
