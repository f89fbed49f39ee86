use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AppError;
use crate::models::{ColumnKind, FilterCondition, TableProfile};
use crate::services::table::Table;

/// Active filters keyed by column. Conditions that would not narrow the
/// column are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
    conditions: BTreeMap<String, FilterCondition>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn get(&self, column: &str) -> Option<&FilterCondition> {
        self.conditions.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterCondition)> {
        self.conditions.iter()
    }

    /// Validates an edit against the column profile, then stores it when it
    /// is active or drops any existing condition when it is not.
    /// Returns whether a condition is stored for `column` afterwards.
    pub fn apply_edit(
        &mut self,
        column: &str,
        condition: FilterCondition,
        profile: &TableProfile,
    ) -> Result<bool, AppError> {
        let column_profile = profile
            .column(column)
            .ok_or_else(|| AppError::Configuration(format!("Cannot filter on unknown column '{}'", column)))?;

        if is_active(&condition, &column_profile.kind)? {
            tracing::debug!("Filter on {} set: {:?}", column, condition);
            self.conditions.insert(column.to_string(), condition);
            Ok(true)
        } else {
            tracing::debug!("Filter on {} covers the full column, removed", column);
            self.conditions.remove(column);
            Ok(false)
        }
    }

    pub fn remove(&mut self, column: &str) -> bool {
        self.conditions.remove(column).is_some()
    }

    pub fn clear(&mut self) {
        self.conditions.clear();
    }

    pub fn describe(&self) -> Vec<String> {
        self.conditions
            .iter()
            .map(|(column, condition)| match condition {
                FilterCondition::Numeric { min, max } => format!("{}: between {} and {}", column, min, max),
                FilterCondition::Categorical { values } => format!("{}: {}", column, values.join(", ")),
                FilterCondition::Boolean { values } => format!(
                    "{}: {}",
                    column,
                    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
                ),
                FilterCondition::Text { search } => format!("{}: contains '{}'", column, search),
            })
            .collect()
    }
}

fn is_active(condition: &FilterCondition, kind: &ColumnKind) -> Result<bool, AppError> {
    match (condition, kind) {
        (FilterCondition::Numeric { min: lo, max: hi }, ColumnKind::Numeric { min, max, .. }) => {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(AppError::Configuration(format!(
                    "Invalid numeric range: min {} is greater than max {}",
                    lo, hi
                )));
            }
            Ok(lo > min || hi < max)
        }
        (FilterCondition::Categorical { values: selected }, ColumnKind::Categorical { values, truncated }) => {
            Ok(*truncated || values.iter().any(|v| !selected.contains(v)))
        }
        (FilterCondition::Boolean { values: selected }, ColumnKind::Boolean { values, truncated }) => {
            Ok(*truncated || values.iter().any(|v| !selected.contains(v)))
        }
        (FilterCondition::Text { search }, _) => Ok(!search.is_empty()),
        (condition, kind) => Err(AppError::Configuration(format!(
            "A {} filter cannot be applied to a {} column",
            condition.kind_name(),
            kind.name()
        ))),
    }
}

/// Rows passing every condition, original order and row ids kept.
/// An empty result is a valid outcome.
pub fn apply_filters(table: &Table, filters: &FilterSet) -> Result<Table, AppError> {
    if filters.is_empty() {
        return Ok(table.clone());
    }

    let mut keep = vec![true; table.height()];
    for (column, condition) in filters.iter() {
        let values = table.column_values(column)?;
        for (slot, value) in keep.iter_mut().zip(values.iter()) {
            if *slot && !condition.matches(value) {
                *slot = false;
            }
        }
    }

    let positions: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect();

    tracing::info!(
        "Filters kept {} of {} rows ({} active conditions)",
        positions.len(),
        table.height(),
        filters.len()
    );
    table.select_rows(&positions)
}
