pub mod classifier;
pub mod encoder;
pub mod kmeans;

pub use classifier::{Classifier, DecisionTree};
pub use encoder::{encode_table, EncodedTable, FeatureMatrix};
pub use kmeans::KMeans;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{ScoreKind, ScoreVector};
use crate::services::table::Table;

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub clusters: usize,
    pub kmeans_restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub max_depth: Option<usize>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            clusters: 3,
            kmeans_restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            max_depth: None,
        }
    }
}

/// Output of one scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRun {
    pub strategy: &'static str,
    pub scores: ScoreVector,
    /// Held-out accuracy; `None` for unsupervised runs.
    pub accuracy: Option<f64>,
}

/// Shared contract of the scoring paths: one score per row, optional accuracy.
pub trait ScoringStrategy {
    fn name(&self) -> &'static str;

    fn score(&self, encoded: &EncodedTable) -> Result<ScoreRun, AppError>;
}

/// Trains on an 80/20 split and scores every row with the positive-class probability.
#[derive(Debug, Clone)]
pub struct SupervisedScoring<C: Classifier> {
    prototype: C,
    test_fraction: f64,
    seed: u64,
}

impl<C: Classifier> SupervisedScoring<C> {
    pub fn new(prototype: C, test_fraction: f64, seed: u64) -> Self {
        Self { prototype, test_fraction, seed }
    }
}

impl<C: Classifier> ScoringStrategy for SupervisedScoring<C> {
    fn name(&self) -> &'static str {
        "supervised"
    }

    fn score(&self, encoded: &EncodedTable) -> Result<ScoreRun, AppError> {
        let labels = encoded
            .labels
            .as_ref()
            .ok_or_else(|| AppError::Model("Supervised scoring needs a label column".to_string()))?;
        let features = &encoded.features;

        let (train, test) = train_test_split(features.len(), self.test_fraction, self.seed)?;
        let train_labels: Vec<u8> = train.iter().map(|&i| labels[i]).collect();

        let mut model = self.prototype.clone();
        model.fit(&features.subset(&train), &train_labels)?;

        let correct = test
            .iter()
            .filter(|&&i| model.predict(&features.rows[i]) == labels[i])
            .count();
        let accuracy = correct as f64 / test.len() as f64;

        // Every row is scored, training rows included.
        let (kind, values): (ScoreKind, Vec<f64>) = match model.classes().iter().position(|&c| c == 1) {
            Some(positive) if model.classes().len() > 1 => (
                ScoreKind::Probability,
                features
                    .rows
                    .iter()
                    .map(|row| model.predict_proba(row)[positive])
                    .collect(),
            ),
            _ => {
                tracing::warn!(
                    "Training split holds a single class {:?}, scoring with predicted labels",
                    model.classes()
                );
                (
                    ScoreKind::PredictedLabel,
                    features.rows.iter().map(|row| model.predict(row) as f64).collect(),
                )
            }
        };

        tracing::info!(
            "Supervised scoring: {} train rows, {} test rows, accuracy {:.4}",
            train.len(),
            test.len(),
            accuracy
        );

        Ok(ScoreRun {
            strategy: self.name(),
            scores: ScoreVector::new(kind, &encoded.row_ids, &values),
            accuracy: Some(accuracy),
        })
    }
}

/// Groups rows into clusters; the cluster id is the score.
#[derive(Debug, Clone)]
pub struct ClusterScoring {
    kmeans: KMeans,
}

impl ClusterScoring {
    pub fn new(kmeans: KMeans) -> Self {
        Self { kmeans }
    }
}

impl ScoringStrategy for ClusterScoring {
    fn name(&self) -> &'static str {
        "clustering"
    }

    fn score(&self, encoded: &EncodedTable) -> Result<ScoreRun, AppError> {
        let clustering = self.kmeans.fit_predict(&encoded.features.rows)?;
        let values: Vec<f64> = clustering.assignments.iter().map(|&c| c as f64).collect();

        tracing::info!(
            "Clustered {} rows into {} groups, inertia {:.4}",
            values.len(),
            self.kmeans.clusters,
            clustering.inertia
        );

        Ok(ScoreRun {
            strategy: self.name(),
            scores: ScoreVector::new(ScoreKind::ClusterId, &encoded.row_ids, &values),
            accuracy: None,
        })
    }
}

/// Supervised when a label column exists, clustering otherwise.
pub fn select_strategy(encoded: &EncodedTable, config: &ScoringConfig) -> Box<dyn ScoringStrategy> {
    if encoded.labels.is_some() {
        Box::new(SupervisedScoring::new(
            DecisionTree::new(config.max_depth),
            config.test_fraction,
            config.seed,
        ))
    } else {
        Box::new(ClusterScoring::new(KMeans {
            clusters: config.clusters,
            restarts: config.kmeans_restarts,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }))
    }
}

pub fn score_table(table: &Table, config: &ScoringConfig) -> Result<ScoreRun, AppError> {
    let start = std::time::Instant::now();
    let encoded = encode_table(table)?;
    let strategy = select_strategy(&encoded, config);
    tracing::info!("Scoring {} rows with {} strategy", table.height(), strategy.name());

    let run = strategy.score(&encoded)?;
    tracing::info!("Scoring completed in {:?}", start.elapsed());
    Ok(run)
}

/// Seeded shuffle, then the first `ceil(n * test_fraction)` positions are held out.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>), AppError> {
    let test_len = (n as f64 * test_fraction).ceil() as usize;
    if test_len == 0 || test_len >= n {
        return Err(AppError::Model(format!(
            "Not enough rows for a train/test split: found {}, need at least 2",
            n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = order.split_off(test_len);
    Ok((train, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::table::load_csv;

    #[test]
    fn split_is_reproducible_and_disjoint() {
        let (train_a, test_a) = train_test_split(10, 0.2, 42).unwrap();
        let (train_b, test_b) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 2);
        assert_eq!(train_a.len(), 8);

        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_rounds_test_size_up() {
        let (train, test) = train_test_split(3, 0.2, 42).unwrap();
        assert_eq!(test.len(), 1);
        assert_eq!(train.len(), 2);
    }

    #[test]
    fn single_row_cannot_be_split() {
        assert!(matches!(train_test_split(1, 0.2, 42), Err(AppError::Model(_))));
    }

    #[test]
    fn supervised_scores_every_row_with_probability() {
        let table = load_csv(
            b"Price,Quality,Label\n10,9,1\n12,8,1\n11,9,1\n50,2,0\n55,1,0\n52,2,0\n13,7,1\n49,3,0\n14,9,1\n51,1,0\n",
        )
        .unwrap();
        let run = score_table(&table, &ScoringConfig::default()).unwrap();

        assert_eq!(run.strategy, "supervised");
        assert_eq!(run.scores.kind, ScoreKind::Probability);
        assert_eq!(run.scores.len(), 10);
        assert!(run.scores.scores.values().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(run.accuracy, Some(1.0));
        assert_eq!(run.scores.get(0), Some(1.0));
        assert_eq!(run.scores.get(3), Some(0.0));
    }

    #[test]
    fn unlabeled_table_is_clustered() {
        let table = load_csv(b"A,B\n0,0\n0,1\n1,0\n10,10\n10,11\n11,10\n-10,10\n-10,11\n-11,10\n").unwrap();
        let run = score_table(&table, &ScoringConfig::default()).unwrap();

        assert_eq!(run.strategy, "clustering");
        assert_eq!(run.scores.kind, ScoreKind::ClusterId);
        assert!(run.accuracy.is_none());
        assert_eq!(run.scores.len(), 9);
        assert!(run.scores.scores.values().all(|&c| c == 0.0 || c == 1.0 || c == 2.0));
    }

    #[test]
    fn scores_are_keyed_by_original_row_id() {
        let table = load_csv(b"A,B\n0,0\n0,1\n1,0\n10,10\n10,11\n11,10\n").unwrap();
        let subset = table.select_rows(&[5, 4, 3, 2, 1, 0]).unwrap();
        let run = score_table(&subset, &ScoringConfig::default()).unwrap();
        let keys: Vec<usize> = run.scores.scores.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 4, 5]);
    }
}
