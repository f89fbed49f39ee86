use std::io::Cursor;

use polars::prelude::*;

use super::{is_numeric_dtype, Table};
use crate::error::AppError;

/// Parses an uploaded CSV (header row required) into a [`Table`].
///
/// Fails closed: any parse problem rejects the whole upload.
pub fn load_csv(data: &[u8]) -> Result<Table, AppError> {
    let start = std::time::Instant::now();
    tracing::info!("Loading CSV upload, size: {}KB", data.len() / 1024);

    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
    }

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(data.to_vec()))
        .finish()
        .map_err(|e| {
            tracing::error!("Failed to parse CSV upload: {}", e);
            AppError::InvalidInput(format!("Error loading dataset: {}", e))
        })?;

    validate_frame(&frame)?;
    let frame = type_all_missing_columns(frame)?;

    tracing::info!(
        "CSV loaded in {:?}: {} rows, {} columns",
        start.elapsed(),
        frame.height(),
        frame.width()
    );
    Ok(Table::new(frame))
}

fn validate_frame(frame: &DataFrame) -> Result<(), AppError> {
    if frame.width() == 0 {
        return Err(AppError::InvalidInput("Dataset has no columns".to_string()));
    }
    if frame.height() == 0 {
        return Err(AppError::InvalidInput("Dataset has a header but no rows".to_string()));
    }
    if frame.get_column_names().iter().any(|name| name.trim().is_empty()) {
        return Err(AppError::InvalidInput("Dataset has a blank column name".to_string()));
    }
    Ok(())
}

/// Columns with no values at all are read as strings. They profile as numeric.
fn type_all_missing_columns(frame: DataFrame) -> Result<DataFrame, AppError> {
    let height = frame.height();
    if !frame.get_columns().iter().any(|c| c.null_count() == height) {
        return Ok(frame);
    }

    let columns = frame
        .get_columns()
        .iter()
        .map(|column| {
            if column.null_count() == height && !is_numeric_dtype(column.dtype()) {
                tracing::debug!("Column {} has no values, typing it as Float64", column.name());
                column.cast(&DataType::Float64)
            } else {
                Ok(column.clone())
            }
        })
        .collect::<PolarsResult<Vec<Column>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Serializes a table back to CSV, header included.
pub fn to_csv(table: &Table) -> Result<String, AppError> {
    let mut frame = table.frame().clone();
    let mut buffer: Vec<u8> = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(&mut frame)?;

    String::from_utf8(buffer).map_err(|e| AppError::Internal(format!("CSV export is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, ColumnKind, FilterCondition};
    use crate::services::filter::FilterSet;
    use crate::services::table::profile_table;

    #[test]
    fn loads_typed_columns() {
        let table = load_csv(b"Supplier_ID,Price,Certified,Region\nS1,10,true,EU\nS2,,false,US\n").unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.width(), 4);
        assert_eq!(table.row_ids(), &[0, 1]);
        assert!(table.is_numeric("Price"));
        assert_eq!(table.dtype("Certified").unwrap(), DataType::Boolean);
        assert_eq!(table.column_values("Price").unwrap()[1], CellValue::Missing);
    }

    #[test]
    fn all_missing_column_loads_as_numeric() {
        let table = load_csv(b"Price,Cost\n10,\n20,\n").unwrap();
        assert!(table.is_numeric("Cost"));
        assert_eq!(table.column_values("Cost").unwrap(), vec![CellValue::Missing, CellValue::Missing]);

        let profile = profile_table(&table).unwrap();
        let cost = profile.column("Cost").unwrap();
        assert_eq!(cost.kind, ColumnKind::Numeric { min: 0.0, max: 0.0, mean: 0.0 });
        assert_eq!(cost.null_count, 2);

        let mut filters = FilterSet::new();
        assert!(filters
            .apply_edit("Cost", FilterCondition::Numeric { min: 0.0, max: 0.0 }, &profile)
            .is_ok());
    }

    #[test]
    fn rejects_empty_upload() {
        assert!(matches!(load_csv(b"  \n"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn rejects_header_without_rows() {
        assert!(matches!(load_csv(b"A,B\n"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn rejects_rows_with_extra_fields() {
        assert!(matches!(load_csv(b"A,B\n1,2\n3,4,5\n"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn export_includes_header() {
        let table = load_csv(b"A,B\n1,x\n2,y\n").unwrap();
        let csv = to_csv(&table).unwrap();
        assert!(csv.starts_with("A,B\n"));
        assert!(csv.contains("2,y"));
    }
}
