use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Reserved ground-truth column. Its presence switches scoring to supervised mode.
pub const LABEL_COLUMN: &str = "Label";
/// Reserved output column added by score-mode ranking.
pub const SCORE_COLUMN: &str = "Supplier_Score";

pub const SAMPLE_SIZE: usize = 3;
pub const CATEGORICAL_MAX_DISTINCT: usize = 10;
pub const UNIQUE_VALUES_LIMIT: usize = 30;

/// A single cell, as seen by the engines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Ordering between two present values of the same column.
    /// Values of different kinds order Bool < Number < Text.
    pub fn cmp_present(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Number(_) => 1,
            CellValue::Text(_) => 2,
            CellValue::Missing => 3,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric { min: f64, max: f64, mean: f64 },
    Boolean { values: Vec<bool>, truncated: bool },
    Categorical { values: Vec<String>, truncated: bool },
    Text,
}

impl ColumnKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Numeric { .. } => "numeric",
            ColumnKind::Boolean { .. } => "boolean",
            ColumnKind::Categorical { .. } => "categorical",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
    pub null_count: usize,
    pub unique_count: usize,
    pub sample_values: SmallVec<[String; SAMPLE_SIZE]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub has_label: bool,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A column-scoped predicate. Numeric bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterCondition {
    Numeric { min: f64, max: f64 },
    Categorical { values: Vec<String> },
    Boolean { values: Vec<bool> },
    Text { search: String },
}

impl FilterCondition {
    pub fn matches(&self, value: &CellValue) -> bool {
        match (self, value) {
            (_, CellValue::Missing) => false,
            (FilterCondition::Numeric { min, max }, CellValue::Number(v)) => *min <= *v && *v <= *max,
            (FilterCondition::Categorical { values }, CellValue::Text(s)) => values.iter().any(|v| v == s),
            (FilterCondition::Boolean { values }, CellValue::Bool(b)) => values.contains(b),
            (FilterCondition::Text { search }, present) => present
                .to_string()
                .to_lowercase()
                .contains(&search.to_lowercase()),
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FilterCondition::Numeric { .. } => "numeric",
            FilterCondition::Categorical { .. } => "categorical",
            FilterCondition::Boolean { .. } => "boolean",
            FilterCondition::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl Criterion {
    pub fn ascending(column: &str) -> Self {
        Self { column: column.to_string(), ascending: true }
    }

    pub fn descending(column: &str) -> Self {
        Self { column: column.to_string(), ascending: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Positive-class probability from a supervised classifier.
    Probability,
    /// Raw predicted label; the classifier saw a single class.
    PredictedLabel,
    /// Cluster id. Not ordinal; sorting by it is a convention only.
    ClusterId,
}

/// Per-row score keyed by original row index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreVector {
    pub kind: ScoreKind,
    pub scores: BTreeMap<usize, f64>,
}

impl ScoreVector {
    pub fn new(kind: ScoreKind, row_ids: &[usize], values: &[f64]) -> Self {
        let scores = row_ids.iter().copied().zip(values.iter().copied()).collect();
        Self { kind, scores }
    }

    pub fn get(&self, row_id: usize) -> Option<f64> {
        self.scores.get(&row_id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "criteria", rename_all = "snake_case")]
pub enum RankMode {
    Criteria(Vec<Criterion>),
    Score,
}

impl RankMode {
    pub fn from_criteria(criteria: Vec<Criterion>) -> Self {
        if criteria.is_empty() {
            RankMode::Score
        } else {
            RankMode::Criteria(criteria)
        }
    }

    pub fn criteria(&self) -> &[Criterion] {
        match self {
            RankMode::Criteria(criteria) => criteria,
            RankMode::Score => &[],
        }
    }
}
