use std::cmp::Ordering;

use polars::prelude::Column;

use crate::error::AppError;
use crate::models::{CellValue, Criterion, RankMode, ScoreKind, ScoreVector, SCORE_COLUMN};
use crate::services::table::Table;

pub const NO_MATCHES_MESSAGE: &str = "No suppliers match all selected filters. Please adjust your criteria.";

/// Filtered rows in their final order.
///
/// Criteria-mode tables carry exactly the source columns; score-mode tables
/// always carry an extra [`SCORE_COLUMN`].
#[derive(Debug, Clone)]
pub struct RankedTable {
    pub table: Table,
    pub mode: RankMode,
    pub score_kind: Option<ScoreKind>,
}

impl RankedTable {
    pub fn has_score_column(&self) -> bool {
        matches!(self.mode, RankMode::Score)
    }

    pub fn len(&self) -> usize {
        self.table.height()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum RankOutcome {
    Ranked(RankedTable),
    /// Filters left nothing to rank. Informational, not an error.
    NoMatches,
}

pub fn rank(filtered: &Table, mode: &RankMode, scores: Option<&ScoreVector>) -> Result<RankOutcome, AppError> {
    let start = std::time::Instant::now();

    if let RankMode::Criteria(criteria) = mode {
        validate_criteria(filtered, criteria)?;
    }

    if filtered.is_empty() {
        tracing::info!("{}", NO_MATCHES_MESSAGE);
        return Ok(RankOutcome::NoMatches);
    }

    let ranked = match mode {
        RankMode::Criteria(criteria) => RankedTable {
            table: rank_by_criteria(filtered, criteria)?,
            mode: mode.clone(),
            score_kind: None,
        },
        RankMode::Score => RankedTable {
            table: rank_by_score(filtered, scores)?,
            mode: RankMode::Score,
            score_kind: scores.map(|s| s.kind),
        },
    };

    tracing::info!("Ranked {} rows in {:?}", ranked.len(), start.elapsed());
    Ok(RankOutcome::Ranked(ranked))
}

pub fn validate_criteria(table: &Table, criteria: &[Criterion]) -> Result<(), AppError> {
    let missing: Vec<&str> = criteria
        .iter()
        .filter(|c| !table.has_column(&c.column))
        .map(|c| c.column.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::error!("Ranking criteria reference unknown columns: {:?}", missing);
        Err(AppError::Configuration(format!(
            "One or more columns do not exist in the dataset: {}",
            missing.join(", ")
        )))
    }
}

/// Stable multi-key sort. Missing values go last whatever the direction.
fn rank_by_criteria(table: &Table, criteria: &[Criterion]) -> Result<Table, AppError> {
    let keys = criteria
        .iter()
        .map(|c| Ok((table.column_values(&c.column)?, c.ascending)))
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut order: Vec<usize> = (0..table.height()).collect();
    order.sort_by(|&a, &b| {
        keys.iter()
            .map(|(values, ascending)| compare_cells(&values[a], &values[b], *ascending))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    table.select_rows(&order)
}

fn compare_cells(a: &CellValue, b: &CellValue, ascending: bool) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if ascending => a.cmp_present(b),
        (false, false) => b.cmp_present(a),
    }
}

/// Highest score first; rows without a score last; ties keep input order.
fn rank_by_score(table: &Table, scores: Option<&ScoreVector>) -> Result<Table, AppError> {
    let values: Vec<Option<f64>> = table
        .row_ids()
        .iter()
        .map(|&id| scores.and_then(|s| s.get(id)))
        .collect();

    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        tracing::warn!("{} rows have no score and will be ranked last", missing);
    }

    let annotated = table.with_column(Column::new(SCORE_COLUMN.into(), values.clone()))?;

    let mut order: Vec<usize> = (0..annotated.height()).collect();
    order.sort_by(|&a, &b| match (values[a], values[b]) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    annotated.select_rows(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::table::load_csv;

    fn ranked(outcome: RankOutcome) -> RankedTable {
        match outcome {
            RankOutcome::Ranked(table) => table,
            RankOutcome::NoMatches => panic!("expected ranked rows"),
        }
    }

    fn column(ranked: &RankedTable, name: &str) -> Vec<CellValue> {
        ranked.table.column_values(name).unwrap()
    }

    #[test]
    fn single_criterion_ascending() {
        let table = load_csv(b"Name,Price\nc,30\na,10\ne,50\nb,20\nd,40\n").unwrap();
        let mode = RankMode::from_criteria(vec![Criterion::ascending("Price")]);
        let out = ranked(rank(&table, &mode, None).unwrap());

        let prices: Vec<f64> = column(&out, "Price").iter().filter_map(CellValue::as_f64).collect();
        assert_eq!(prices, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(out.table.row_ids(), &[1, 3, 0, 4, 2]);
        assert!(!out.has_score_column());
        assert!(!out.table.has_column(SCORE_COLUMN));
    }

    #[test]
    fn later_criteria_break_ties_with_their_own_direction() {
        let table = load_csv(b"Region,Rating,Id\nEU,3,a\nUS,5,b\nEU,5,c\nUS,1,d\nEU,3,e\n").unwrap();
        let mode = RankMode::from_criteria(vec![Criterion::ascending("Region"), Criterion::descending("Rating")]);
        let out = ranked(rank(&table, &mode, None).unwrap());

        assert_eq!(out.table.row_ids(), &[2, 0, 4, 1, 3]);
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let table = load_csv(b"Price\n20\n\n10\n").unwrap();
        for criterion in [Criterion::ascending("Price"), Criterion::descending("Price")] {
            let out = ranked(rank(&table, &RankMode::Criteria(vec![criterion]), None).unwrap());
            assert_eq!(out.table.row_ids()[2], 1);
        }
    }

    #[test]
    fn unknown_criterion_is_configuration_error() {
        let table = load_csv(b"Price\n1\n2\n").unwrap();
        let mode = RankMode::from_criteria(vec![Criterion::ascending("Cost")]);
        assert!(matches!(rank(&table, &mode, None), Err(AppError::Configuration(_))));
    }

    #[test]
    fn score_mode_sorts_descending_and_keeps_ties_stable() {
        let table = load_csv(b"Name\na\nb\nc\nd\n").unwrap();
        let scores = ScoreVector::new(ScoreKind::Probability, &[0, 1, 2, 3], &[0.5, 0.9, 0.5, 0.1]);
        let out = ranked(rank(&table, &RankMode::Score, Some(&scores)).unwrap());

        assert_eq!(out.table.row_ids(), &[1, 0, 2, 3]);
        assert!(out.has_score_column());
        assert_eq!(out.score_kind, Some(ScoreKind::Probability));
        assert_eq!(column(&out, SCORE_COLUMN)[0], CellValue::Number(0.9));
    }

    #[test]
    fn score_lookup_uses_original_row_ids() {
        let table = load_csv(b"Name\na\nb\nc\n").unwrap();
        let subset = table.select_rows(&[2, 0]).unwrap();
        let scores = ScoreVector::new(ScoreKind::Probability, &[0, 1, 2], &[0.2, 0.5, 0.8]);
        let out = ranked(rank(&subset, &RankMode::Score, Some(&scores)).unwrap());

        assert_eq!(out.table.row_ids(), &[2, 0]);
        assert_eq!(
            column(&out, SCORE_COLUMN),
            vec![CellValue::Number(0.8), CellValue::Number(0.2)]
        );
    }

    #[test]
    fn unscored_rows_rank_last_with_missing_score() {
        let table = load_csv(b"Name\na\nb\nc\n").unwrap();
        let scores = ScoreVector::new(ScoreKind::ClusterId, &[1], &[0.0]);
        let out = ranked(rank(&table, &RankMode::Score, Some(&scores)).unwrap());

        assert_eq!(out.table.row_ids(), &[1, 0, 2]);
        assert_eq!(column(&out, SCORE_COLUMN)[1], CellValue::Missing);
    }

    #[test]
    fn empty_input_reports_no_matches() {
        let table = load_csv(b"Price\n1\n2\n").unwrap();
        let empty = table.select_rows(&[]).unwrap();
        assert!(matches!(rank(&empty, &RankMode::Score, None).unwrap(), RankOutcome::NoMatches));
    }
}
