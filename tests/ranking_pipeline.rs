use supplier_services::error::AppError;
use supplier_services::models::{CellValue, Criterion, FilterCondition, RankMode, ScoreKind, SCORE_COLUMN};
use supplier_services::services::filter::{apply_filters, FilterSet};
use supplier_services::services::ranking::{rank, RankOutcome, RankedTable};
use supplier_services::services::scoring::{score_table, ScoringConfig};
use supplier_services::services::session::{RankStatus, Session};
use supplier_services::services::table::{load_csv, profile_table, to_csv, Table};

const PRICES: &[u8] = b"Supplier_ID,Price\nS3,30\nS1,10\nS5,50\nS2,20\nS4,40\n";

fn numbers(table: &Table, column: &str) -> Vec<f64> {
    table
        .column_values(column)
        .unwrap()
        .iter()
        .filter_map(CellValue::as_f64)
        .collect()
}

fn ranked(outcome: RankOutcome) -> RankedTable {
    match outcome {
        RankOutcome::Ranked(ranked) => ranked,
        RankOutcome::NoMatches => panic!("expected ranked rows"),
    }
}

#[test]
fn price_ascending_orders_all_rows() {
    let table = load_csv(PRICES).unwrap();
    let mode = RankMode::from_criteria(vec![Criterion::ascending("Price")]);
    let out = ranked(rank(&table, &mode, None).unwrap());

    assert_eq!(numbers(&out.table, "Price"), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
}

#[test]
fn price_range_filter_keeps_middle_rows() {
    let table = load_csv(PRICES).unwrap();
    let profile = profile_table(&table).unwrap();
    let mut filters = FilterSet::new();
    filters
        .apply_edit("Price", FilterCondition::Numeric { min: 25.0, max: 45.0 }, &profile)
        .unwrap();

    let filtered = apply_filters(&table, &filters).unwrap();
    let mode = RankMode::from_criteria(vec![Criterion::ascending("Price")]);
    let out = ranked(rank(&filtered, &mode, None).unwrap());

    assert_eq!(numbers(&out.table, "Price"), vec![30.0, 40.0]);
}

#[test]
fn single_class_label_scores_with_predicted_labels() {
    let table = load_csv(b"Price,Quality,Label\n10,1,0\n20,2,0\n30,3,0\n40,4,0\n50,5,0\n60,6,0\n").unwrap();
    let run = score_table(&table, &ScoringConfig::default()).unwrap();

    assert_eq!(run.scores.kind, ScoreKind::PredictedLabel);
    assert_eq!(run.scores.len(), 6);
    assert!(run.scores.scores.values().all(|&s| s == 0.0));
    assert_eq!(run.accuracy, Some(1.0));
}

#[test]
fn unlabeled_table_gets_three_cluster_ids() {
    let table = load_csv(b"Cost,Delay\n1,1\n1,2\n2,1\n20,20\n20,21\n21,20\n40,1\n41,2\n40,2\n").unwrap();
    let run = score_table(&table, &ScoringConfig::default()).unwrap();

    assert_eq!(run.scores.len(), 9);
    assert!(run.accuracy.is_none());
    let mut ids: Vec<f64> = run.scores.scores.values().copied().collect();
    ids.sort_by(f64::total_cmp);
    ids.dedup();
    assert_eq!(ids, vec![0.0, 1.0, 2.0]);
}

#[test]
fn eliminating_every_row_leaves_prior_ranking() {
    let mut session = Session::from_upload(PRICES).unwrap();
    session
        .rank(vec![Criterion::descending("Price")], &ScoringConfig::default())
        .unwrap();
    let before = session.ranked().unwrap().table.row_ids().to_vec();

    session
        .set_filter("Price", FilterCondition::Numeric { min: 11.0, max: 19.0 })
        .unwrap();
    let status = session
        .rank(vec![Criterion::ascending("Price")], &ScoringConfig::default())
        .unwrap();

    assert!(matches!(status, RankStatus::NoMatches { .. }));
    assert_eq!(session.ranked().unwrap().table.row_ids(), before.as_slice());
}

#[test]
fn score_ranking_runs_on_full_table_then_filters() {
    let csv = b"Supplier_ID,Price,Quality,Label\nA,10,9,1\nB,12,8,1\nC,11,9,1\nD,50,2,0\nE,55,1,0\nF,52,2,0\nG,13,7,1\nH,49,3,0\nI,14,9,1\nJ,51,1,0\n";
    let mut session = Session::from_upload(csv).unwrap();
    session
        .set_filter("Price", FilterCondition::Numeric { min: 10.0, max: 20.0 })
        .unwrap();
    let status = session.rank(Vec::new(), &ScoringConfig::default()).unwrap();

    match status {
        RankStatus::Ranked { row_count, score_kind, accuracy, .. } => {
            assert_eq!(row_count, 5);
            assert_eq!(score_kind, Some(ScoreKind::Probability));
            assert!(accuracy.is_some());
        }
        RankStatus::NoMatches { .. } => panic!("expected ranked rows"),
    }

    let ranked = session.ranked().unwrap();
    let scores = numbers(&ranked.table, SCORE_COLUMN);
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(session.scores().unwrap().scores.len(), 10);
}

#[test]
fn exported_csv_parses_back_to_same_rows() {
    let table = load_csv(b"Supplier_ID,Price,Region,Certified\nS1,10.5,EU,true\nS2,,US,false\nS3,30,,true\n").unwrap();
    let mode = RankMode::from_criteria(vec![Criterion::descending("Price")]);
    let out = ranked(rank(&table, &mode, None).unwrap());

    let reparsed = load_csv(to_csv(&out.table).unwrap().as_bytes()).unwrap();
    assert_eq!(reparsed.column_names(), out.table.column_names());
    for column in out.table.column_names() {
        assert_eq!(
            reparsed.column_values(&column).unwrap(),
            out.table.column_values(&column).unwrap(),
            "column {}",
            column
        );
    }
}

#[test]
fn malformed_upload_is_input_error() {
    assert!(matches!(Session::from_upload(b"   \n"), Err(AppError::InvalidInput(_))));
    assert!(matches!(Session::from_upload(b"Price\n"), Err(AppError::InvalidInput(_))));
}

#[test]
fn too_few_rows_to_cluster_is_model_error() {
    let mut session = Session::from_upload(b"Price\n1\n2\n").unwrap();
    let err = session.rank(Vec::new(), &ScoringConfig::default()).unwrap_err();
    assert!(matches!(err, AppError::Model(_)));
    assert!(session.ranked().is_none());
}
