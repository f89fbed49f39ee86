use serde::Serialize;

use crate::error::AppError;
use crate::models::{CellValue, Criterion, LABEL_COLUMN, SCORE_COLUMN};
use crate::services::ranking::RankedTable;
use crate::services::table::Table;

pub const DEFAULT_CHART_ROWS: usize = 10;

const ID_COLUMNS: [&str; 4] = ["Supplier_ID", "SupplierID", "ID", "supplier_id"];
const EXCLUDED_COLUMNS: [&str; 3] = [SCORE_COLUMN, "index", LABEL_COLUMN];
const LABEL_MAX_CHARS: usize = 10;
const FALLBACK_SERIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Bar chart contents for the top rows of a ranking. Drawing is left to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub y_label: String,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

/// Chart for the top rows of the last ranking.
pub fn chart_data(ranked: &RankedTable, top_n: usize) -> Result<ChartData, AppError> {
    chart_table(&ranked.table, ranked.mode.criteria(), top_n)
}

/// Chart for the first `top_n` rows of `table` in their current order.
///
/// Criteria columns are plotted when any are numeric, then the score column,
/// then the numeric column with the widest spread.
pub fn chart_table(table: &Table, criteria: &[Criterion], top_n: usize) -> Result<ChartData, AppError> {
    let rows = table.height().min(top_n);
    let top = table.select_rows(&(0..rows).collect::<Vec<_>>())?;
    let labels = row_labels(&top)?;

    let (title, y_label, columns) = if !criteria.is_empty() {
        let mut columns: Vec<String> = criteria
            .iter()
            .map(|c| c.column.clone())
            .filter(|c| top.is_numeric(c))
            .collect();
        if columns.is_empty() {
            columns = plottable_columns(&top).into_iter().take(FALLBACK_SERIES).collect();
        }
        (
            "Supplier Comparison Based on Selected Criteria".to_string(),
            "Value".to_string(),
            columns,
        )
    } else if top.has_column(SCORE_COLUMN) {
        (
            "Supplier Comparison: Model Score".to_string(),
            "Score".to_string(),
            vec![SCORE_COLUMN.to_string()],
        )
    } else {
        match widest_spread(&top)? {
            Some(column) => (format!("Supplier Comparison: {}", column), column.clone(), vec![column]),
            None => {
                return Ok(ChartData {
                    title: "Supplier Comparison".to_string(),
                    y_label: String::new(),
                    series: vec![ChartSeries {
                        name: "Suppliers".to_string(),
                        values: vec![Some(1.0); labels.len()],
                    }],
                    labels,
                });
            }
        }
    };

    let series = columns
        .into_iter()
        .map(|name| {
            let values = top.column_values(&name)?.iter().map(CellValue::as_f64).collect();
            Ok(ChartSeries { name, values })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(ChartData {
        title,
        y_label,
        labels,
        series,
    })
}

fn row_labels(table: &Table) -> Result<Vec<String>, AppError> {
    let labels: Vec<String> = match ID_COLUMNS.iter().find(|c| table.has_column(c)) {
        Some(column) => table
            .column_values(column)?
            .iter()
            .map(|v| v.to_string())
            .collect(),
        None => (1..=table.height()).map(|i| format!("Supplier {}", i)).collect(),
    };
    Ok(labels.into_iter().map(truncate_label).collect())
}

fn truncate_label(label: String) -> String {
    if label.chars().count() > LABEL_MAX_CHARS {
        format!("{}...", label.chars().take(LABEL_MAX_CHARS).collect::<String>())
    } else {
        label
    }
}

fn plottable_columns(table: &Table) -> Vec<String> {
    table
        .column_names()
        .into_iter()
        .filter(|c| !EXCLUDED_COLUMNS.contains(&c.as_str()) && table.is_numeric(c))
        .collect()
}

/// Numeric column with the largest sample variance; the first one wins ties.
fn widest_spread(table: &Table) -> Result<Option<String>, AppError> {
    let mut best: Option<(String, f64)> = None;
    for column in plottable_columns(table) {
        let variance = sample_variance(&table.column_values(&column)?);
        match &best {
            None => best = Some((column, variance)),
            Some((_, current)) if variance > *current => best = Some((column, variance)),
            _ => {}
        }
    }
    Ok(best.map(|(column, _)| column))
}

fn sample_variance(values: &[CellValue]) -> f64 {
    let present: Vec<f64> = values.iter().filter_map(CellValue::as_f64).collect();
    if present.len() < 2 {
        return f64::NAN;
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RankMode, ScoreKind, ScoreVector};
    use crate::services::ranking::{rank, RankOutcome};
    use crate::services::table::load_csv;

    fn ranked(table: &Table, mode: RankMode, scores: Option<&ScoreVector>) -> RankedTable {
        match rank(table, &mode, scores).unwrap() {
            RankOutcome::Ranked(ranked) => ranked,
            RankOutcome::NoMatches => panic!("expected ranked rows"),
        }
    }

    #[test]
    fn criteria_chart_plots_numeric_criteria_for_top_rows() {
        let table = load_csv(b"Supplier_ID,Price,Region\nS1,30,EU\nS2,10,US\nS3,20,EU\n").unwrap();
        let mode = RankMode::from_criteria(vec![Criterion::ascending("Price"), Criterion::ascending("Region")]);
        let chart = chart_data(&ranked(&table, mode, None), 2).unwrap();

        assert_eq!(chart.labels, vec!["S2", "S3"]);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "Price");
        assert_eq!(chart.series[0].values, vec![Some(10.0), Some(20.0)]);
        assert_eq!(chart.y_label, "Value");
    }

    #[test]
    fn criteria_without_numeric_columns_fall_back_to_first_three() {
        let table = load_csv(b"Name,A,B,C,D\nx,1,2,3,4\ny,5,6,7,8\n").unwrap();
        let mode = RankMode::from_criteria(vec![Criterion::ascending("Name")]);
        let chart = chart_data(&ranked(&table, mode, None), DEFAULT_CHART_ROWS).unwrap();

        let names: Vec<&str> = chart.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(chart.labels, vec!["Supplier 1", "Supplier 2"]);
    }

    #[test]
    fn score_mode_plots_score_column() {
        let table = load_csv(b"ID,Price\nalpha-supplier-long,1\nb,2\n").unwrap();
        let scores = ScoreVector::new(ScoreKind::Probability, &[0, 1], &[0.2, 0.7]);
        let chart = chart_data(&ranked(&table, RankMode::Score, Some(&scores)), DEFAULT_CHART_ROWS).unwrap();

        assert_eq!(chart.title, "Supplier Comparison: Model Score");
        assert_eq!(chart.series[0].values, vec![Some(0.7), Some(0.2)]);
        assert_eq!(chart.labels, vec!["b".to_string(), "alpha-supp...".to_string()]);
    }

    #[test]
    fn unranked_table_plots_widest_column() {
        let table = load_csv(b"Narrow,Wide,Label\n1,10,0\n2,90,1\n3,50,0\n").unwrap();
        let chart = chart_table(&table, &[], DEFAULT_CHART_ROWS).unwrap();

        assert_eq!(chart.title, "Supplier Comparison: Wide");
        assert_eq!(chart.series[0].values, vec![Some(10.0), Some(90.0), Some(50.0)]);
    }

    #[test]
    fn no_numeric_columns_give_unit_bars() {
        let table = load_csv(b"Name\na\nb\n").unwrap();
        let chart = chart_table(&table, &[], DEFAULT_CHART_ROWS).unwrap();

        assert_eq!(chart.title, "Supplier Comparison");
        assert_eq!(chart.series[0].values, vec![Some(1.0), Some(1.0)]);
    }
}
