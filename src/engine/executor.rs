//! Cube Engine
//!
//! Entry point for running queries:
//!
//! ```text
//! CubeQuery → DagBuilder → QueryDag → Scheduler → root outputs → CubeResult
//! ```
//!
//! The engine holds the read-only measure forest, the table connector and the
//! step cache shared by every query it runs.

use crate::cache::StepCache;
use crate::cancellation::Cancellation;
use crate::config::{Config, EngineConfig};
use crate::dag::{CubeQuery, DagBuilder, QueryDag, QueryOption};
use crate::engine::error::EngineResult;
use crate::engine::evaluator::EvalContext;
use crate::engine::observer::{ExecutionObserver, ObserverSet, RecordingObserver, TracingObserver};
use crate::engine::result::{CubeResult, ResultRow};
use crate::engine::scheduler::{RunContext, Scheduler};
use crate::measure::MeasureForest;
use crate::slice::Slice;
use crate::table::TableConnector;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Per-execution settings chosen by the caller
#[derive(Clone)]
pub struct ExecutionContext {
    query_id: Uuid,
    cancellation: Arc<Cancellation>,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Fresh query id, not cancelled, no observer
    pub fn new() -> Self {
        Self {
            query_id: Uuid::new_v4(),
            cancellation: Arc::new(Cancellation::new()),
            observer: None,
        }
    }

    /// Builder method: share a cancellation signal with the caller
    pub fn with_cancellation(mut self, cancellation: Arc<Cancellation>) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Builder method: observe vertex lifecycle
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Identity of the query
    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    /// Cancellation signal of the query
    pub fn cancellation(&self) -> &Arc<Cancellation> {
        &self.cancellation
    }
}

/// Evaluates queries over a measure forest and a table
pub struct CubeEngine {
    forest: Arc<MeasureForest>,
    table: Arc<dyn TableConnector>,
    cache: Option<Arc<StepCache>>,
    config: EngineConfig,
}

impl CubeEngine {
    /// Create an engine; the step cache follows `config.cache`
    pub fn new(forest: Arc<MeasureForest>, table: Arc<dyn TableConnector>, config: &Config) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(StepCache::from_config(&config.cache)));

        Self {
            forest,
            table,
            cache,
            config: config.engine.clone(),
        }
    }

    /// Builder method: share a step cache, e.g. between engines
    pub fn with_cache(mut self, cache: Arc<StepCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builder method: disable the step cache
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// The measure forest
    pub fn forest(&self) -> &MeasureForest {
        &self.forest
    }

    /// The step cache, if enabled
    pub fn cache(&self) -> Option<&Arc<StepCache>> {
        self.cache.as_ref()
    }

    /// Resolve a query into its DAG without running it
    pub fn prepare(&self, query: &CubeQuery) -> EngineResult<QueryDag> {
        let query = self.effective_query(query);
        Ok(DagBuilder::build(&self.forest, &query)?)
    }

    /// Render the DAG of a query without running it
    pub fn explain(&self, query: &CubeQuery) -> EngineResult<String> {
        Ok(self.prepare(query)?.explain())
    }

    /// Run a query
    pub async fn execute(&self, query: &CubeQuery) -> EngineResult<CubeResult> {
        self.execute_with(query, ExecutionContext::new()).await
    }

    /// Run a query with caller-provided id, cancellation and observer
    pub async fn execute_with(&self, query: &CubeQuery, context: ExecutionContext) -> EngineResult<CubeResult> {
        let start = Instant::now();
        let query = self.effective_query(query);
        let query_id = context.query_id;
        let dag = DagBuilder::build(&self.forest, &query)?;

        tracing::info!(
            query_id = %query_id,
            measures = query.measures.len(),
            steps = dag.len(),
            group_by = %query.group_by,
            "Executing query"
        );

        let mut observers = ObserverSet::default();
        if let Some(observer) = &context.observer {
            observers.push(observer.clone());
        }
        if query.has_option(QueryOption::Debug) {
            observers.push(Arc::new(TracingObserver::new(query_id)));
        }
        let recorder = query.has_option(QueryOption::Explain).then(|| {
            let recorder = Arc::new(RecordingObserver::new());
            observers.push(recorder.clone());
            recorder
        });

        let timer = self.config.query_timeout().map(|timeout| {
            let cancellation = context.cancellation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if cancellation.cancel() {
                    tracing::warn!(
                        query_id = %query_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Query timed out"
                    );
                }
            })
        });

        let scheduler = if query.has_option(QueryOption::Sequential) {
            Scheduler::new(1)
        } else {
            Scheduler::new(self.config.max_concurrency)
        };
        let cache = if query.has_option(QueryOption::NoCache) {
            None
        } else {
            self.cache.clone()
        };

        let ctx = Arc::new(RunContext {
            eval: EvalContext {
                query_id,
                table: self.table.clone(),
                cancellation: context.cancellation.clone(),
            },
            cache,
            observer: Arc::new(observers),
        });

        let run = scheduler.run(&dag, ctx).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        let run = run?;

        let mut rows: BTreeMap<Slice, BTreeMap<String, Value>> = BTreeMap::new();
        let mut columns = Vec::with_capacity(dag.roots().len());
        for &root in dag.roots() {
            let measure = dag.step(root).measure_name().to_string();
            if let Some(output) = run.roots.get(&root) {
                for (slice, value) in output.iter() {
                    rows.entry(slice.clone())
                        .or_default()
                        .insert(measure.clone(), value.clone());
                }
            }
            columns.push(measure);
        }
        if query.group_by.is_grand_total() {
            rows.entry(Slice::grand_total()).or_default();
        }

        let cancelled = context.cancellation.is_cancelled();
        let mut stats = run.stats;
        stats.elapsed_ms = start.elapsed().as_millis() as u64;

        let explain = recorder.map(|recorder| dag.explain_with(|id, _| recorder.annotation(id)));

        tracing::info!(
            query_id = %query_id,
            rows = rows.len(),
            evaluated = stats.evaluated,
            cached = stats.cached,
            skipped = stats.skipped,
            pruned = stats.pruned,
            elapsed_ms = stats.elapsed_ms,
            cancelled,
            "Query completed"
        );

        Ok(CubeResult {
            query_id,
            columns,
            rows: rows
                .into_iter()
                .map(|(slice, values)| ResultRow { slice, values })
                .collect(),
            cancelled,
            stats,
            explain,
        })
    }

    fn effective_query(&self, query: &CubeQuery) -> CubeQuery {
        let mut query = query.clone();
        if self.config.unknown_measures_are_empty {
            query.options.insert(QueryOption::UnknownMeasuresAreEmpty);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagError;
    use crate::engine::error::EngineError;
    use crate::engine::observer::{StepEvent, StepSource, StepStats};
    use crate::filter::Filter;
    use crate::measure::{Aggregation, Combination, Measure};
    use crate::slice::GroupBy;
    use crate::table::{InMemoryTable, TableError, TableQuery, TableResult, TableStream};
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use std::time::Duration;

    fn base_table() -> InMemoryTable {
        InMemoryTable::from_rows(
            "base",
            vec![
                vec![("k1", 123)],
                vec![("k2", 234)],
                vec![("k1", 345), ("k2", 456)],
            ],
        )
    }

    fn sales_table() -> InMemoryTable {
        let row = |color: &str, country: &str, amount: i64| {
            vec![
                ("color", Value::text(color)),
                ("country", Value::text(country)),
                ("amount", Value::Long(amount)),
            ]
        };
        InMemoryTable::from_rows(
            "sales",
            vec![
                row("red", "FR", 10),
                row("red", "US", 20),
                row("blue", "FR", 5),
                row("blue", "US", 7),
                row("blue", "US", 1),
            ],
        )
        .with_batch_size(2)
    }

    fn base_forest() -> Arc<MeasureForest> {
        Arc::new(
            MeasureForest::builder("base")
                .measure(Measure::aggregator("k1", "k1", Aggregation::Sum))
                .measure(Measure::aggregator("k2", "k2", Aggregation::Sum))
                .measure(Measure::combinator("k1PlusK2", ["k1", "k2"], Combination::Sum))
                .measure(Measure::combinator("ratio", ["k1", "k2"], Combination::Divide))
                .build()
                .unwrap(),
        )
    }

    fn sales_forest() -> Arc<MeasureForest> {
        Arc::new(
            MeasureForest::builder("sales")
                .measure(Measure::aggregator("amount", "amount", Aggregation::Sum))
                .measure(Measure::aggregator("rows", "*", Aggregation::Count))
                .measure(Measure::filtrator(
                    "amount_fr",
                    "amount",
                    Filter::equals("country", "FR"),
                ))
                .measure(Measure::unfiltrator("amount_all_countries", "amount", ["country"]))
                .measure(Measure::combinator(
                    "share",
                    ["amount", "amount_all_countries"],
                    Combination::Divide,
                ))
                .measure(Measure::bucketor(
                    "max_per_country",
                    "amount",
                    GroupBy::of(["country"]),
                    Aggregation::Max,
                ))
                .build()
                .unwrap(),
        )
    }

    fn engine(forest: Arc<MeasureForest>, table: InMemoryTable) -> CubeEngine {
        CubeEngine::new(forest, Arc::new(table), &Config::default())
    }

    fn red() -> Slice {
        Slice::of([("color", "red")])
    }

    fn blue() -> Slice {
        Slice::of([("color", "blue")])
    }

    #[tokio::test]
    async fn test_grand_total() {
        let engine = engine(base_forest(), base_table());
        let query = CubeQuery::builder().measures(["k1", "k2", "k1PlusK2"]).build();
        let result = engine.execute(&query).await.unwrap();

        assert_eq!(result.columns, vec!["k1", "k2", "k1PlusK2"]);
        assert_eq!(result.len(), 1);
        let total = Slice::grand_total();
        assert_eq!(result.value(&total, "k1"), Some(&Value::Long(468)));
        assert_eq!(result.value(&total, "k2"), Some(&Value::Long(690)));
        assert_eq!(result.value(&total, "k1PlusK2"), Some(&Value::Long(1158)));
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_unknown_measure() {
        let engine = engine(base_forest(), base_table());

        let strict = CubeQuery::builder().measures(["k2", "unknown"]).build();
        let err = engine.execute(&strict).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Dag(DagError::UnknownMeasure { ref name, .. }) if name == "unknown"
        ));

        let lenient = CubeQuery::builder()
            .measure("unknown")
            .option(QueryOption::UnknownMeasuresAreEmpty)
            .build();
        let result = engine.execute(&lenient).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].slice, Slice::grand_total());
        assert!(result.rows[0].values.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_measures_from_config() {
        let mut config = Config::default();
        config.engine.unknown_measures_are_empty = true;
        let engine = CubeEngine::new(base_forest(), Arc::new(base_table()), &config);

        let query = CubeQuery::builder().measures(["k1", "unknown"]).build();
        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.value(&Slice::grand_total(), "k1"), Some(&Value::Long(468)));
        assert_eq!(result.value(&Slice::grand_total(), "unknown"), None);
    }

    #[tokio::test]
    async fn test_shared_underlyings_evaluated_once() {
        let table = Arc::new(base_table());
        let engine = CubeEngine::new(base_forest(), table.clone(), &Config::default()).without_cache();

        let query = CubeQuery::builder()
            .measures(["k1PlusK2", "ratio", "k1"])
            .build();
        let result = engine.execute(&query).await.unwrap();

        // k1 and k2 scanned once each despite three consumers
        assert_eq!(table.scan_count(), 2);
        assert_eq!(result.stats.steps, 4);
        assert_eq!(result.stats.evaluated, 4);
        let ratio = result.value(&Slice::grand_total(), "ratio").unwrap();
        assert_eq!(ratio, &Value::Double(468.0 / 690.0));
    }

    #[tokio::test]
    async fn test_cache_hit_across_queries() {
        let table = Arc::new(base_table());
        let mut config = Config::default();
        config.cache.min_weight = 1;
        let engine = CubeEngine::new(base_forest(), table.clone(), &config);

        let query = CubeQuery::builder().measure("k1").build();
        let first = engine.execute(&query).await.unwrap();
        let second = engine.execute(&query).await.unwrap();

        assert_eq!(first.stats.evaluated, 1);
        assert_eq!(second.stats.cached, 1);
        assert_eq!(table.scan_count(), 1);
        assert_eq!(first.rows, second.rows);

        let no_cache = CubeQuery::builder().measure("k1").option(QueryOption::NoCache).build();
        engine.execute(&no_cache).await.unwrap();
        assert_eq!(table.scan_count(), 2);
        assert_eq!(engine.cache().unwrap().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_group_by_and_filtrator() {
        let engine = engine(sales_forest(), sales_table());
        let query = CubeQuery::builder()
            .measures(["amount", "amount_fr", "rows"])
            .group_by(GroupBy::of(["color"]))
            .build();
        let result = engine.execute(&query).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[0].slice, blue());
        assert_eq!(result.value(&red(), "amount"), Some(&Value::Long(30)));
        assert_eq!(result.value(&blue(), "amount"), Some(&Value::Long(13)));
        assert_eq!(result.value(&red(), "amount_fr"), Some(&Value::Long(10)));
        assert_eq!(result.value(&blue(), "amount_fr"), Some(&Value::Long(5)));
        assert_eq!(result.value(&blue(), "rows"), Some(&Value::Long(3)));
    }

    #[tokio::test]
    async fn test_unfiltrator_ignores_stripped_column() {
        let engine = engine(sales_forest(), sales_table());
        let query = CubeQuery::builder()
            .measures(["amount", "amount_all_countries", "share"])
            .filter(Filter::equals("country", "FR"))
            .build();
        let result = engine.execute(&query).await.unwrap();

        let total = Slice::grand_total();
        assert_eq!(result.value(&total, "amount"), Some(&Value::Long(15)));
        assert_eq!(result.value(&total, "amount_all_countries"), Some(&Value::Long(43)));
        assert_eq!(result.value(&total, "share"), Some(&Value::Double(15.0 / 43.0)));
    }

    #[tokio::test]
    async fn test_bucketor_reaggregates() {
        let engine = engine(sales_forest(), sales_table());
        let query = CubeQuery::builder()
            .measure("max_per_country")
            .group_by(GroupBy::of(["color"]))
            .build();
        let result = engine.execute(&query).await.unwrap();

        // red: FR=10, US=20; blue: FR=5, US=8
        assert_eq!(result.value(&red(), "max_per_country"), Some(&Value::Long(20)));
        assert_eq!(result.value(&blue(), "max_per_country"), Some(&Value::Long(8)));
    }

    #[tokio::test]
    async fn test_inline_measure() {
        let engine = engine(sales_forest(), sales_table());
        let query = CubeQuery::builder()
            .measure(Measure::filtrator("amount_us", "amount", Filter::equals("country", "US")))
            .build();
        let result = engine.execute(&query).await.unwrap();
        assert_eq!(result.value(&Slice::grand_total(), "amount_us"), Some(&Value::Long(28)));
    }

    #[tokio::test]
    async fn test_sequential_matches_concurrent() {
        let engine = engine(sales_forest(), sales_table()).without_cache();
        let measures = ["amount", "amount_fr", "share", "max_per_country", "rows"];

        let concurrent = CubeQuery::builder()
            .measures(measures)
            .group_by(GroupBy::of(["color"]))
            .build();
        let sequential = CubeQuery::builder()
            .measures(measures)
            .group_by(GroupBy::of(["color"]))
            .option(QueryOption::Sequential)
            .build();

        let a = engine.execute(&concurrent).await.unwrap();
        let b = engine.execute(&sequential).await.unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.columns, b.columns);
    }

    #[tokio::test]
    async fn test_explain_option_annotates() {
        let engine = engine(base_forest(), base_table());
        let query = CubeQuery::builder()
            .measure("k1PlusK2")
            .option(QueryOption::Explain)
            .build();
        let result = engine.execute(&query).await.unwrap();

        let explain = result.explain.unwrap();
        assert!(explain.contains("m=k1PlusK2(Combinator[SUM])"));
        assert!(explain.contains("evaluated 1 slices"));

        let plain = engine.explain(&query).unwrap();
        assert!(!plain.contains("evaluated"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = engine(base_forest(), base_table());
        let context = ExecutionContext::new();
        context.cancellation().cancel();

        let query = CubeQuery::builder().measures(["k1PlusK2"]).build();
        let result = engine.execute_with(&query, context).await.unwrap();

        assert!(result.cancelled);
        assert_eq!(result.stats.skipped, 3);
        assert_eq!(result.stats.evaluated, 0);
        assert_eq!(result.len(), 1);
        assert!(result.rows[0].values.is_empty());
        assert!(engine.cache().unwrap().is_empty());
    }

    /// Fails every scan
    struct FailingTable;

    #[async_trait]
    impl TableConnector for FailingTable {
        fn name(&self) -> &str {
            "failing"
        }

        async fn stream_slices(
            &self,
            _query: TableQuery,
            _cancellation: Arc<Cancellation>,
        ) -> TableResult<TableStream> {
            Ok(stream::iter(vec![Err(TableError::Backend("disk on fire".to_string()))]).boxed())
        }
    }

    #[tokio::test]
    async fn test_table_error_carries_query_identity() {
        let engine = CubeEngine::new(base_forest(), Arc::new(FailingTable), &Config::default());
        let context = ExecutionContext::new();
        let query_id = context.query_id();

        let query = CubeQuery::builder().measure("k1PlusK2").build();
        let err = engine.execute_with(&query, context).await.unwrap_err();
        match err {
            EngineError::Table {
                query_id: failed, ..
            } => assert_eq!(failed, query_id),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Cancels the query while the table is being scanned
    struct CancellingTable {
        inner: InMemoryTable,
    }

    #[async_trait]
    impl TableConnector for CancellingTable {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn stream_slices(
            &self,
            query: TableQuery,
            cancellation: Arc<Cancellation>,
        ) -> TableResult<TableStream> {
            let stream = self.inner.stream_slices(query, cancellation.clone()).await?;
            cancellation.cancel();
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn test_cancelled_mid_scan_reports_leak() {
        let table = CancellingTable {
            inner: base_table().with_batch_size(1),
        };
        let engine = CubeEngine::new(base_forest(), Arc::new(table), &Config::default());
        let recorder = Arc::new(RecordingObserver::new());
        let context = ExecutionContext::new().with_observer(recorder.clone());

        let query = CubeQuery::builder()
            .measure("k1")
            .option(QueryOption::Sequential)
            .build();
        let result = engine.execute_with(&query, context).await.unwrap();

        assert!(result.cancelled);
        assert_eq!(result.stats.leaked, 1);
        let stats: StepStats = recorder.stats(0).unwrap();
        assert_eq!(stats.source, StepSource::Evaluated);
        assert!(stats.leaked.is_some());
        assert!(engine.cache().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_cancels_query() {
        let mut config = Config::default();
        config.engine.query_timeout_ms = Some(0);
        let engine = CubeEngine::new(base_forest(), Arc::new(SlowTable), &config);

        let query = CubeQuery::builder().measure("k1PlusK2").build();
        let result = engine.execute(&query).await.unwrap();
        assert!(result.cancelled);
    }

    /// Takes a while before returning no rows
    struct SlowTable;

    #[async_trait]
    impl TableConnector for SlowTable {
        fn name(&self) -> &str {
            "slow"
        }

        async fn stream_slices(
            &self,
            _query: TableQuery,
            cancellation: Arc<Cancellation>,
        ) -> TableResult<TableStream> {
            tokio::time::timeout(Duration::from_secs(5), cancellation.cancelled())
                .await
                .map_err(|_| TableError::Backend("never cancelled".to_string()))?;
            Ok(stream::empty().boxed())
        }
    }

    fn colored_table() -> InMemoryTable {
        InMemoryTable::from_rows(
            "colored",
            vec![
                vec![("color", Value::text("red")), ("k1", Value::Long(1))],
                vec![("color", Value::text("green")), ("k1", Value::Long(2))],
                vec![("color", Value::text("blue")), ("k2", Value::Long(3))],
            ],
        )
    }

    #[tokio::test]
    async fn test_cache_hit_prunes_subtree() {
        let forest = Arc::new(
            MeasureForest::builder("colored")
                .measure(Measure::aggregator("k1", "k1", Aggregation::Sum))
                .measure(Measure::aggregator("k2", "k2", Aggregation::Sum))
                .measure(Measure::combinator("both", ["k1", "k2"], Combination::Sum))
                .build()
                .unwrap(),
        );
        let table = Arc::new(colored_table());
        let mut config = Config::default();
        // only the three-slice root is worth caching
        config.cache.min_weight = 3;
        let engine = CubeEngine::new(forest, table.clone(), &config);

        let query = CubeQuery::builder()
            .measure("both")
            .group_by(GroupBy::of(["color"]))
            .build();
        let first = engine.execute(&query).await.unwrap();
        assert_eq!(table.scan_count(), 2);
        assert_eq!(first.stats.evaluated, 3);
        assert_eq!(engine.cache().unwrap().len(), 1);

        let second = engine.execute(&query).await.unwrap();
        assert_eq!(table.scan_count(), 2);
        assert_eq!(second.stats.cached, 1);
        assert_eq!(second.stats.evaluated, 0);
        assert_eq!(second.stats.pruned, 2);
        assert_eq!(first.rows, second.rows);
        assert_eq!(
            second.value(&Slice::of([("color", "blue")]), "both"),
            Some(&Value::Long(3))
        );
    }

    #[tokio::test]
    async fn test_cache_hit_below_missing_root() {
        let table = Arc::new(base_table());
        let mut config = Config::default();
        config.cache.min_weight = 1;
        let engine = CubeEngine::new(base_forest(), table.clone(), &config);

        engine
            .execute(&CubeQuery::builder().measure("k1").build())
            .await
            .unwrap();
        assert_eq!(table.scan_count(), 1);

        // k1 comes from the cache, only k2 is scanned
        let result = engine
            .execute(&CubeQuery::builder().measure("k1PlusK2").build())
            .await
            .unwrap();
        assert_eq!(table.scan_count(), 2);
        assert_eq!(result.stats.cached, 1);
        assert_eq!(result.stats.evaluated, 2);
        assert_eq!(
            result.value(&Slice::grand_total(), "k1PlusK2"),
            Some(&Value::Long(1158))
        );
    }

    fn chain_forest() -> Arc<MeasureForest> {
        Arc::new(
            MeasureForest::builder("chain")
                .measure(Measure::aggregator("a", "k1", Aggregation::Sum))
                .measure(Measure::combinator("b", ["a"], Combination::Sum))
                .measure(Measure::combinator("c", ["b"], Combination::Sum))
                .measure(Measure::combinator("d", ["c"], Combination::Sum))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_consumed_outputs_are_released() {
        let engine = engine(chain_forest(), base_table()).without_cache();

        let chain = CubeQuery::builder()
            .measure("d")
            .option(QueryOption::Sequential)
            .build();
        let result = engine.execute(&chain).await.unwrap();
        assert_eq!(result.stats.steps, 4);
        assert_eq!(result.stats.peak_outputs, 1);
        assert_eq!(result.value(&Slice::grand_total(), "d"), Some(&Value::Long(468)));

        // requested outputs are kept until the end
        let with_middle = CubeQuery::builder()
            .measures(["d", "b"])
            .option(QueryOption::Sequential)
            .build();
        let result = engine.execute(&with_middle).await.unwrap();
        assert_eq!(result.stats.peak_outputs, 2);
        assert_eq!(result.value(&Slice::grand_total(), "b"), Some(&Value::Long(468)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_step_starts_before_its_underlyings() {
        let engine = engine(sales_forest(), sales_table().with_batch_size(1)).without_cache();
        let query = CubeQuery::builder()
            .measures(["amount", "amount_fr", "share", "max_per_country", "rows"])
            .group_by(GroupBy::of(["color"]))
            .build();
        let dag = engine.prepare(&query).unwrap();

        for _ in 0..10 {
            let recorder = Arc::new(RecordingObserver::new());
            let context = ExecutionContext::new().with_observer(recorder.clone());
            engine.execute_with(&query, context).await.unwrap();

            let events = recorder.events();
            for (position, event) in events.iter().enumerate() {
                let StepEvent::Started(id) = event else { continue };
                for &u in dag.underlyings(*id) {
                    assert!(
                        events[..position].contains(&StepEvent::Completed(u)),
                        "step #{} started before #{} completed",
                        id,
                        u
                    );
                }
            }

            let mut started = recorder.started();
            started.sort_unstable();
            assert_eq!(started, (0..dag.len()).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_share_cache() {
        let table = Arc::new(sales_table());
        let mut config = Config::default();
        config.cache.min_weight = 1;
        let engine = CubeEngine::new(sales_forest(), table, &config);
        let query = CubeQuery::builder()
            .measures(["amount", "amount_fr", "share", "max_per_country"])
            .group_by(GroupBy::of(["color"]))
            .build();

        let results = futures_util::future::join_all((0..8).map(|_| engine.execute(&query))).await;
        let results: Vec<CubeResult> = results.into_iter().map(Result::unwrap).collect();

        for result in &results[1..] {
            assert_eq!(result.rows, results[0].rows);
        }
        assert_eq!(results[0].value(&red(), "amount"), Some(&Value::Long(30)));

        let stats = engine.cache().unwrap().stats();
        let evaluated: usize = results.iter().map(|r| r.stats.evaluated).sum();
        let cached: usize = results.iter().map(|r| r.stats.cached).sum();
        assert_eq!(stats.hits as usize, cached);
        assert_eq!((stats.puts + stats.rejected) as usize, evaluated);
    }
}
