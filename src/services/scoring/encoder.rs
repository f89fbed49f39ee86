use std::collections::BTreeMap;

use polars::prelude::DataType;

use crate::error::AppError;
use crate::models::{CellValue, LABEL_COLUMN};
use crate::services::table::Table;

/// Row-major standardized feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn subset(&self, positions: &[usize]) -> Vec<Vec<f64>> {
        positions.iter().map(|&p| self.rows[p].clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct EncodedTable {
    pub features: FeatureMatrix,
    pub labels: Option<Vec<u8>>,
    pub row_ids: Vec<usize>,
}

/// Builds the working copy the models see; the source table is never touched.
pub fn encode_table(table: &Table) -> Result<EncodedTable, AppError> {
    let names: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| name != LABEL_COLUMN)
        .collect();

    if names.is_empty() || table.is_empty() {
        tracing::error!("Cannot score an empty feature table");
        return Err(AppError::Model("Feature table is empty".to_string()));
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let values = table.column_values(name)?;
        let raw = if table.is_numeric(name) || table.dtype(name)? == DataType::Boolean {
            values.iter().map(CellValue::as_f64).collect::<Vec<_>>()
        } else {
            encode_categories(&values)
        };
        let imputed = impute_mean(&raw);
        columns.push(standardize(&imputed));
    }

    let rows = (0..table.height())
        .map(|row| columns.iter().map(|col| col[row]).collect())
        .collect();

    let labels = if table.has_column(LABEL_COLUMN) {
        Some(parse_labels(&table.column_values(LABEL_COLUMN)?)?)
    } else {
        None
    };

    tracing::debug!("Encoded {} rows x {} features", table.height(), names.len());

    Ok(EncodedTable {
        features: FeatureMatrix { names, rows },
        labels,
        row_ids: table.row_ids().to_vec(),
    })
}

/// Integer code per distinct string, codes assigned in sorted order.
/// Missing values share the code of the empty string.
fn encode_categories(values: &[CellValue]) -> Vec<Option<f64>> {
    let mut codes: BTreeMap<String, usize> = values.iter().map(|v| (v.to_string(), 0)).collect();
    for (code, slot) in codes.values_mut().enumerate() {
        *slot = code;
    }
    values
        .iter()
        .map(|v| codes.get(&v.to_string()).map(|&code| code as f64))
        .collect()
}

/// Fills gaps with the mean of present values, or 0 when none are present.
pub fn impute_mean(values: &[Option<f64>]) -> Vec<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = if present.is_empty() {
        0.0
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };
    values.iter().map(|v| v.unwrap_or(mean)).collect()
}

/// Zero mean, unit (population) variance. Constant columns only get centered.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let scale = if variance > f64::EPSILON { variance.sqrt() } else { 1.0 };
    values.iter().map(|v| (v - mean) / scale).collect()
}

fn parse_labels(values: &[CellValue]) -> Result<Vec<u8>, AppError> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            CellValue::Bool(b) => Ok(u8::from(*b)),
            CellValue::Number(v) if *v == 0.0 => Ok(0),
            CellValue::Number(v) if *v == 1.0 => Ok(1),
            other => Err(AppError::Model(format!(
                "{} column must hold only 0 or 1, found '{}' in row {}",
                LABEL_COLUMN, other, row
            ))),
        })
        .collect()
}
