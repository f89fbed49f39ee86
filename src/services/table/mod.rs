pub mod loader;
pub mod profiler;

pub use loader::{load_csv, to_csv};
pub use profiler::profile_table;

use polars::prelude::*;

use crate::error::AppError;
use crate::models::CellValue;

/// A polars frame plus the original position of every row.
///
/// `row_ids[i]` is the index the row had when the table was loaded, so any
/// subset or reordering can still be joined back to per-row scores.
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    row_ids: Vec<usize>,
}

pub type Record = Vec<(String, CellValue)>;

impl Table {
    pub fn new(frame: DataFrame) -> Self {
        let row_ids = (0..frame.height()).collect();
        Self { frame, row_ids }
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, AppError> {
        Ok(Self::new(DataFrame::new(columns)?))
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn dtype(&self, name: &str) -> Result<DataType, AppError> {
        Ok(self.column(name)?.dtype().clone())
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.dtype(name)
            .map(|dtype| is_numeric_dtype(&dtype))
            .unwrap_or(false)
    }

    /// Column contents as engine values. Nulls and NaN become `Missing`.
    pub fn column_values(&self, name: &str) -> Result<Vec<CellValue>, AppError> {
        let series = self.column(name)?.as_materialized_series();
        Ok(series_values(series)?)
    }

    /// New table holding the rows at `positions` (current positions, not ids), in that order.
    pub fn select_rows(&self, positions: &[usize]) -> Result<Table, AppError> {
        if let Some(bad) = positions.iter().find(|&&p| p >= self.height()) {
            return Err(AppError::Internal(format!(
                "Row position {} out of bounds for table of {} rows",
                bad,
                self.height()
            )));
        }

        let indices: Vec<IdxSize> = positions.iter().map(|&p| p as IdxSize).collect();
        let frame = self.frame.take(&IdxCa::from_vec("rows".into(), indices))?;
        let row_ids = positions.iter().map(|&p| self.row_ids[p]).collect();
        Ok(Table { frame, row_ids })
    }

    /// Adds or replaces a column, keeping row identity.
    pub fn with_column(&self, column: Column) -> Result<Table, AppError> {
        let mut frame = self.frame.clone();
        frame.with_column(column)?;
        Ok(Table {
            frame,
            row_ids: self.row_ids.clone(),
        })
    }

    pub fn without_column(&self, name: &str) -> Result<Table, AppError> {
        let frame = self.frame.drop(name)?;
        Ok(Table {
            frame,
            row_ids: self.row_ids.clone(),
        })
    }

    /// The first `limit` rows as ordered (column, value) pairs.
    pub fn records(&self, limit: usize) -> Result<Vec<Record>, AppError> {
        let names = self.column_names();
        let columns = names
            .iter()
            .map(|name| self.column_values(name))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self.height().min(limit);
        Ok((0..rows)
            .map(|row| {
                names
                    .iter()
                    .zip(columns.iter())
                    .map(|(name, values)| (name.clone(), values[row].clone()))
                    .collect()
            })
            .collect())
    }

    fn column(&self, name: &str) -> Result<&Column, AppError> {
        self.frame
            .column(name)
            .map_err(|_| AppError::Configuration(format!("Column '{}' does not exist in the dataset", name)))
    }
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float()
}

fn series_values(series: &Series) -> PolarsResult<Vec<CellValue>> {
    let dtype = series.dtype();
    if *dtype == DataType::Boolean {
        Ok(series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Missing, CellValue::Bool))
            .collect())
    } else if is_numeric_dtype(dtype) {
        let floats = series.cast(&DataType::Float64)?;
        Ok(floats
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if !x.is_nan() => CellValue::Number(x),
                _ => CellValue::Missing,
            })
            .collect())
    } else {
        let strings = series.cast(&DataType::String)?;
        Ok(strings
            .str()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Missing, |s| CellValue::Text(s.to_string())))
            .collect())
    }
}
