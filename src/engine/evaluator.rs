//! Per-kind step evaluation
//!
//! Given the outputs of a vertex's underlyings (positional, one per declared
//! underlying), produce the vertex's own output:
//!
//! - **Aggregator**: stream rows from the table and merge them per slice
//! - **Combinator**: combine the underlyings over the union of their slices
//! - **Filtrator / Unfiltrator**: hand the underlying output through
//! - **Bucketor**: project the wider slices and re-aggregate
//! - **Empty**: nothing

use crate::cancellation::Cancellation;
use crate::cell::{MultitypeColumn, SliceToValue};
use crate::dag::CubeQueryStep;
use crate::engine::error::{EngineError, EngineResult};
use crate::measure::{Aggregation, Combination, MeasureKind};
use crate::slice::{GroupBy, Slice};
use crate::table::{TableConnector, TableError, TableQuery};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// What evaluation needs besides the step
pub(crate) struct EvalContext {
    pub query_id: Uuid,
    pub table: Arc<dyn TableConnector>,
    pub cancellation: Arc<Cancellation>,
}

/// Evaluate one step from its underlyings' outputs
pub(crate) async fn evaluate(
    step: &CubeQueryStep,
    inputs: &[Arc<SliceToValue>],
    ctx: &EvalContext,
) -> EngineResult<Arc<SliceToValue>> {
    match &step.measure.kind {
        MeasureKind::Aggregator {
            column,
            aggregation,
        } => aggregate_table(step, column, *aggregation, ctx)
            .await
            .map(Arc::new),
        MeasureKind::Combinator { combination, .. } => Ok(Arc::new(combine(*combination, inputs))),
        MeasureKind::Filtrator { .. } | MeasureKind::Unfiltrator { .. } => {
            Ok(inputs.first().cloned().unwrap_or_default())
        }
        MeasureKind::Bucketor { aggregation, .. } => Ok(Arc::new(rebucket(
            *aggregation,
            &step.group_by,
            inputs.first().map(Arc::as_ref),
        ))),
        MeasureKind::Empty => Ok(Arc::default()),
    }
}

async fn aggregate_table(
    step: &CubeQueryStep,
    column: &str,
    aggregation: Aggregation,
    ctx: &EvalContext,
) -> EngineResult<SliceToValue> {
    if step.filter.is_match_none() {
        return Ok(SliceToValue::empty());
    }

    let table_error = |source: TableError| EngineError::Table {
        query_id: ctx.query_id,
        measure: step.measure_name().to_string(),
        source,
    };

    let query = TableQuery {
        filter: step.filter.clone(),
        group_by: step.group_by.clone(),
        aggregated_columns: vec![column.to_string()],
    };
    let mut rows = ctx
        .table
        .stream_slices(query, ctx.cancellation.clone())
        .await
        .map_err(table_error)?;

    let mut cells = MultitypeColumn::new(aggregation);
    let mut scanned = 0usize;
    while let Some(row) = rows.next().await {
        let row = row.map_err(table_error)?;
        scanned += 1;
        if let Some(Some(value)) = row.values.into_iter().next() {
            cells.merge_raw(row.slice, value);
        }
    }

    tracing::debug!(
        query_id = %ctx.query_id,
        measure = step.measure_name(),
        table = ctx.table.name(),
        rows = scanned,
        slices = cells.len(),
        "Aggregated table rows"
    );

    Ok(cells.finish())
}

fn combine(combination: Combination, inputs: &[Arc<SliceToValue>]) -> SliceToValue {
    let slices: HashSet<&Slice> = inputs.iter().flat_map(|input| input.slices()).collect();

    slices
        .into_iter()
        .filter_map(|slice| {
            let values: Vec<_> = inputs.iter().map(|input| input.get(slice)).collect();
            combination
                .combine(&values)
                .map(|value| (slice.clone(), value))
        })
        .collect()
}

fn rebucket(aggregation: Aggregation, group_by: &GroupBy, input: Option<&SliceToValue>) -> SliceToValue {
    let mut cells = MultitypeColumn::new(aggregation);
    for (slice, value) in input.into_iter().flat_map(|input| input.iter()) {
        cells.merge_raw(slice.project(group_by), value.clone());
    }
    cells.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn output(pairs: &[(&str, Value)]) -> Arc<SliceToValue> {
        Arc::new(
            pairs
                .iter()
                .map(|(color, v)| (Slice::of([("color", *color)]), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_combine_over_union_of_slices() {
        let numerator = output(&[("red", Value::Long(132)), ("blue", Value::Long(12))]);
        let denominator = output(&[("blue", Value::Long(0)), ("green", Value::Long(234))]);

        let ratio = combine(Combination::Divide, &[numerator, denominator]);
        assert_eq!(ratio.len(), 3);

        let red = ratio.get(&Slice::of([("color", "red")])).unwrap();
        assert!(matches!(red, Value::Double(d) if d.is_nan()));
        assert_eq!(
            ratio.get(&Slice::of([("color", "blue")])),
            Some(&Value::Double(f64::INFINITY))
        );
        assert_eq!(
            ratio.get(&Slice::of([("color", "green")])),
            Some(&Value::Double(0.0))
        );
    }

    #[test]
    fn test_rebucket_projects_and_reaggregates() {
        let wide: Arc<SliceToValue> = Arc::new(
            [
                (Slice::of([("color", "red"), ("country", "FR")]), Value::Long(5)),
                (Slice::of([("color", "red"), ("country", "US")]), Value::Long(9)),
                (Slice::of([("color", "blue"), ("country", "FR")]), Value::Long(1)),
            ]
            .into_iter()
            .collect(),
        );

        let by_color = GroupBy::of(["color"]);
        let max = rebucket(Aggregation::Max, &by_color, Some(wide.as_ref()));
        assert_eq!(max.get(&Slice::of([("color", "red")])), Some(&Value::Long(9)));
        assert_eq!(max.get(&Slice::of([("color", "blue")])), Some(&Value::Long(1)));

        let count = rebucket(Aggregation::Count, &GroupBy::grand_total(), Some(wide.as_ref()));
        assert_eq!(count.get(&Slice::grand_total()), Some(&Value::Long(3)));

        assert!(rebucket(Aggregation::Sum, &by_color, None).is_empty());
    }
}
