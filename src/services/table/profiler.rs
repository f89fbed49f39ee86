use std::collections::HashSet;

use polars::prelude::DataType;
use smallvec::SmallVec;

use super::{is_numeric_dtype, Table};
use crate::error::AppError;
use crate::models::{
    CellValue, ColumnKind, ColumnProfile, TableProfile, CATEGORICAL_MAX_DISTINCT, LABEL_COLUMN,
    SAMPLE_SIZE, UNIQUE_VALUES_LIMIT,
};

pub fn profile_table(table: &Table) -> Result<TableProfile, AppError> {
    let start = std::time::Instant::now();

    let columns = table
        .column_names()
        .iter()
        .map(|name| {
            let dtype = table.dtype(name)?;
            let values = table.column_values(name)?;
            let profile = profile_column(name, &dtype, &values);
            tracing::debug!("Column {} profiled as {}", name, profile.kind.name());
            Ok(profile)
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    tracing::info!("Profiled {} columns in {:?}", columns.len(), start.elapsed());

    Ok(TableProfile {
        row_count: table.height(),
        column_count: table.width(),
        has_label: table.has_column(LABEL_COLUMN),
        columns,
    })
}

pub fn profile_column(name: &str, dtype: &DataType, values: &[CellValue]) -> ColumnProfile {
    let null_count = values.iter().filter(|v| v.is_missing()).count();
    let distinct = distinct_values(values);

    let kind = if *dtype == DataType::Boolean {
        let (shown, truncated) = truncate(&distinct);
        ColumnKind::Boolean {
            values: shown
                .iter()
                .filter_map(|v| match v {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect(),
            truncated,
        }
    } else if is_numeric_dtype(dtype) {
        numeric_summary(values)
    } else if distinct.len() + usize::from(null_count > 0) <= CATEGORICAL_MAX_DISTINCT {
        let (shown, truncated) = truncate(&distinct);
        ColumnKind::Categorical {
            values: shown.iter().map(|v| v.to_string()).collect(),
            truncated,
        }
    } else {
        ColumnKind::Text
    };

    let sample_values: SmallVec<[String; SAMPLE_SIZE]> = values
        .iter()
        .take(SAMPLE_SIZE)
        .map(|v| v.to_string())
        .collect();

    ColumnProfile {
        name: name.to_string(),
        kind,
        null_count,
        unique_count: distinct.len(),
        sample_values,
    }
}

/// Present values, first-seen order.
fn distinct_values(values: &[CellValue]) -> Vec<CellValue> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| !v.is_missing())
        .filter(|v| {
            let key = match v {
                CellValue::Number(x) => format!("n:{}", x.to_bits()),
                other => format!("v:{:?}", other),
            };
            seen.insert(key)
        })
        .cloned()
        .collect()
}

fn truncate(distinct: &[CellValue]) -> (&[CellValue], bool) {
    if distinct.len() > UNIQUE_VALUES_LIMIT {
        (&distinct[..UNIQUE_VALUES_LIMIT], true)
    } else {
        (distinct, false)
    }
}

fn numeric_summary(values: &[CellValue]) -> ColumnKind {
    let present: Vec<f64> = values.iter().filter_map(CellValue::as_f64).collect();
    if present.is_empty() {
        return ColumnKind::Numeric { min: 0.0, max: 0.0, mean: 0.0 };
    }

    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    ColumnKind::Numeric { min, max, mean }
}
