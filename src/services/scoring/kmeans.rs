use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AppError;

/// Lloyd's k-means with k-means++ seeding and a fixed seed.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub clusters: usize,
    pub restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl KMeans {
    pub fn fit_predict(&self, rows: &[Vec<f64>]) -> Result<Clustering, AppError> {
        if self.clusters == 0 {
            return Err(AppError::Model("Cluster count must be positive".to_string()));
        }
        if rows.len() < self.clusters {
            return Err(AppError::Model(format!(
                "Clustering into {} groups needs at least {} rows, found {}",
                self.clusters,
                self.clusters,
                rows.len()
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let threshold = self.tolerance * mean_variance(rows);
        let mut best: Option<Clustering> = None;

        for _ in 0..self.restarts.max(1) {
            let run = self.run_once(rows, &mut rng, threshold);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        best.ok_or_else(|| AppError::Internal("k-means produced no run".to_string()))
    }

    fn run_once(&self, rows: &[Vec<f64>], rng: &mut StdRng, threshold: f64) -> Clustering {
        let mut centroids = seed_centroids(rows, self.clusters, rng);
        let mut assignments = assign(rows, &centroids);

        for _ in 0..self.max_iterations {
            let updated = recompute(rows, &assignments, &centroids);
            let shift: f64 = centroids
                .iter()
                .zip(updated.iter())
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;
            assignments = assign(rows, &centroids);
            if shift <= threshold {
                break;
            }
        }

        let inertia = rows
            .iter()
            .zip(assignments.iter())
            .map(|(row, &c)| squared_distance(row, &centroids[c]))
            .sum();

        Clustering { assignments, centroids, inertia }
    }
}

/// k-means++: each next seed is drawn with probability proportional to its
/// squared distance from the closest seed chosen so far.
fn seed_centroids(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![rows[rng.gen_range(0..rows.len())].clone()];

    while centroids.len() < k {
        let distances: Vec<f64> = rows
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .map(|c| squared_distance(row, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();

        let pick = if total <= 0.0 {
            rng.gen_range(0..rows.len())
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = rows.len() - 1;
            for (i, d) in distances.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        };
        centroids.push(rows[pick].clone());
    }

    centroids
}

fn assign(rows: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    rows.iter().map(|row| nearest(row, centroids)).collect()
}

fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(row, c);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// New means per cluster. An emptied cluster is moved onto the row that is
/// currently farthest from its own centroid.
fn recompute(rows: &[Vec<f64>], assignments: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let width = rows[0].len();
    let mut sums = vec![vec![0.0; width]; previous.len()];
    let mut counts = vec![0usize; previous.len()];

    for (row, &c) in rows.iter().zip(assignments.iter()) {
        counts[c] += 1;
        for (acc, v) in sums[c].iter_mut().zip(row.iter()) {
            *acc += v;
        }
    }

    let mut centroids: Vec<Vec<f64>> = sums
        .into_iter()
        .zip(counts.iter())
        .map(|(sum, &n)| {
            if n == 0 {
                Vec::new()
            } else {
                sum.into_iter().map(|s| s / n as f64).collect()
            }
        })
        .collect();

    for c in 0..centroids.len() {
        if !centroids[c].is_empty() {
            continue;
        }
        let farthest = rows
            .iter()
            .zip(assignments.iter())
            .map(|(row, &a)| squared_distance(row, &previous[a]))
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, d)| if d > acc.1 { (i, d) } else { acc })
            .0;
        centroids[c] = rows[farthest].clone();
    }

    centroids
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn mean_variance(rows: &[Vec<f64>]) -> f64 {
    let n = rows.len() as f64;
    let width = rows[0].len();
    if width == 0 {
        return 0.0;
    }
    (0..width)
        .map(|j| {
            let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
            rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n
        })
        .sum::<f64>()
        / width as f64
}
