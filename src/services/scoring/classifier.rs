use crate::error::AppError;

/// A binary-label classifier the supervised strategy can be built on.
pub trait Classifier: Clone + Send {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8]) -> Result<(), AppError>;

    /// Distinct labels seen during `fit`, ascending.
    fn classes(&self) -> &[u8];

    fn predict(&self, row: &[f64]) -> u8;

    /// One probability per entry of [`Classifier::classes`].
    fn predict_proba(&self, row: &[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        counts: [usize; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART tree using Gini impurity.
///
/// Splits are searched feature by feature, thresholds ascending, and the first
/// best split wins, so fitting is deterministic for a given input.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    max_depth: Option<usize>,
    min_samples_split: usize,
    nodes: Vec<Node>,
    classes: Vec<u8>,
}

impl DecisionTree {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            nodes: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn build(&mut self, rows: &[Vec<f64>], labels: &[u8], indices: Vec<usize>, depth: usize) -> usize {
        let counts = class_counts(labels, &indices);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { counts });

        let pure = counts[0] == 0 || counts[1] == 0;
        let depth_reached = self.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || indices.len() < self.min_samples_split {
            return id;
        }

        if let Some((feature, threshold)) = best_split(rows, labels, &indices) {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| rows[i][feature] <= threshold);
            let left = self.build(rows, labels, left_idx, depth + 1);
            let right = self.build(rows, labels, right_idx, depth + 1);
            self.nodes[id] = Node::Split { feature, threshold, left, right };
        }
        id
    }

    fn leaf_counts(&self, row: &[f64]) -> [usize; 2] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { counts } => return *counts,
                Node::Split { feature, threshold, left, right } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8]) -> Result<(), AppError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(AppError::Model(format!(
                "Cannot fit a tree on {} rows with {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(AppError::Model(format!("Unsupported class label {}", bad)));
        }

        let mut classes: Vec<u8> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        self.classes = classes;
        self.nodes.clear();
        self.build(rows, labels, (0..rows.len()).collect(), 0);
        Ok(())
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn predict(&self, row: &[f64]) -> u8 {
        let counts = self.leaf_counts(row);
        // Ties go to the lower class.
        if counts[1] > counts[0] {
            1
        } else {
            0
        }
    }

    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let counts = self.leaf_counts(row);
        let total = (counts[0] + counts[1]).max(1) as f64;
        self.classes
            .iter()
            .map(|&class| counts[class as usize] as f64 / total)
            .collect()
    }
}

fn class_counts(labels: &[u8], indices: &[usize]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &i in indices {
        counts[labels[i] as usize] += 1;
    }
    counts
}

fn gini(counts: [usize; 2]) -> f64 {
    let total = (counts[0] + counts[1]) as f64;
    if total == 0.0 {
        return 0.0;
    }
    let p0 = counts[0] as f64 / total;
    let p1 = counts[1] as f64 / total;
    1.0 - p0 * p0 - p1 * p1
}

/// Lowest weighted child impurity over all (feature, midpoint) pairs.
fn best_split(rows: &[Vec<f64>], labels: &[u8], indices: &[usize]) -> Option<(usize, f64)> {
    let width = rows[indices[0]].len();
    let total = indices.len() as f64;
    let parent = class_counts(labels, indices);
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..width {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left = [0usize; 2];
        for pos in 0..sorted.len() - 1 {
            left[labels[sorted[pos]] as usize] += 1;
            let here = rows[sorted[pos]][feature];
            let next = rows[sorted[pos + 1]][feature];
            if here == next {
                continue;
            }

            let right = [parent[0] - left[0], parent[1] - left[1]];
            let left_n = (pos + 1) as f64;
            let impurity = (left_n * gini(left) + (total - left_n) * gini(right)) / total;
            if best.map_or(true, |(_, _, current)| impurity < current - 1e-12) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some((feature, threshold, impurity));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|&v| vec![v]).collect()
    }

    #[test]
    fn separable_data_is_learned_exactly() {
        let x = rows(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]);
        let y = vec![0, 0, 0, 1, 1, 1];
        let mut tree = DecisionTree::new(None);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.classes(), &[0, 1]);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[2.5]), 0);
        assert_eq!(tree.predict(&[9.0]), 1);
        assert_eq!(tree.predict_proba(&[11.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn single_class_exposes_one_probability() {
        let x = rows(&[1.0, 2.0, 3.0]);
        let y = vec![0, 0, 0];
        let mut tree = DecisionTree::new(None);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.classes(), &[0]);
        assert_eq!(tree.predict(&[5.0]), 0);
        assert_eq!(tree.predict_proba(&[5.0]), vec![1.0]);
    }

    #[test]
    fn identical_rows_with_mixed_labels_make_a_leaf() {
        let x = rows(&[1.0, 1.0, 1.0, 1.0]);
        let y = vec![0, 1, 1, 1];
        let mut tree = DecisionTree::new(None);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_proba(&[1.0]), vec![0.25, 0.75]);
        assert_eq!(tree.predict(&[1.0]), 1);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x = rows(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = vec![0, 1, 0, 1, 0, 1];
        let mut tree = DecisionTree::new(Some(1));
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn refitting_is_deterministic() {
        let x = vec![vec![0.1, 3.0], vec![0.4, 1.0], vec![0.2, 2.0], vec![0.9, 0.5]];
        let y = vec![1, 0, 1, 0];
        let mut a = DecisionTree::new(None);
        let mut b = DecisionTree::new(None);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        for row in &x {
            assert_eq!(a.predict_proba(row), b.predict_proba(row));
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut tree = DecisionTree::new(None);
        assert!(tree.fit(&rows(&[1.0, 2.0]), &[0]).is_err());
    }
}
