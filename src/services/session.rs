use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Criterion, FilterCondition, RankMode, ScoreKind, TableProfile, LABEL_COLUMN};
use crate::services::filter::{apply_filters, FilterSet};
use crate::services::ranking::{rank, validate_criteria, RankOutcome, RankedTable, NO_MATCHES_MESSAGE};
use crate::services::scoring::{score_table, ScoreRun, ScoringConfig};
use crate::services::table::{load_csv, profile_table, Table};

/// Everything one user works on between uploads.
///
/// Each mutating call either commits all of its outputs or leaves the
/// session exactly as it was.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    table: Table,
    profile: TableProfile,
    filters: FilterSet,
    scores: Option<ScoreRun>,
    ranked: Option<RankedTable>,
    report: Option<String>,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankStatus {
    Ranked {
        row_count: usize,
        #[serde(flatten)]
        mode: RankMode,
        score_kind: Option<ScoreKind>,
        accuracy: Option<f64>,
    },
    NoMatches {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub profile: TableProfile,
    pub filters: FilterSet,
    pub active_filters: Vec<String>,
    pub ranked_rows: Option<usize>,
    pub accuracy: Option<f64>,
    pub has_report: bool,
}

impl Session {
    pub fn new(table: Table) -> Result<Self, AppError> {
        let profile = profile_table(&table)?;
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            table,
            profile,
            filters: FilterSet::new(),
            scores: None,
            ranked: None,
            report: None,
            generation: 0,
        })
    }

    pub fn from_upload(data: &[u8]) -> Result<Self, AppError> {
        Self::new(load_csv(data)?)
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn profile(&self) -> &TableProfile {
        &self.profile
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn scores(&self) -> Option<&ScoreRun> {
        self.scores.as_ref()
    }

    pub fn ranked(&self) -> Option<&RankedTable> {
        self.ranked.as_ref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    /// Bumped on every committed ranking.
    pub fn ranking_generation(&self) -> u64 {
        self.generation
    }

    pub fn set_filter(&mut self, column: &str, condition: FilterCondition) -> Result<bool, AppError> {
        self.filters.apply_edit(column, condition, &self.profile)
    }

    pub fn remove_filter(&mut self, column: &str) -> bool {
        self.filters.remove(column)
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Scoring, then filtering, then ranking.
    ///
    /// Criteria mode only scores a labeled table, for its accuracy, and a
    /// scoring failure there does not block the ranking.
    pub fn rank(&mut self, criteria: Vec<Criterion>, config: &ScoringConfig) -> Result<RankStatus, AppError> {
        let mode = RankMode::from_criteria(criteria);
        validate_criteria(&self.table, mode.criteria())?;

        let run = match mode {
            RankMode::Score => Some(score_table(&self.table, config)?),
            RankMode::Criteria(_) if self.table.has_column(LABEL_COLUMN) => {
                match score_table(&self.table, config) {
                    Ok(run) => Some(run),
                    Err(e) => {
                        tracing::warn!("Session {}: accuracy unavailable: {}", self.id, e);
                        None
                    }
                }
            }
            RankMode::Criteria(_) => None,
        };
        let filtered = apply_filters(&self.table, &self.filters)?;

        match rank(&filtered, &mode, run.as_ref().map(|r| &r.scores))? {
            RankOutcome::NoMatches => Ok(RankStatus::NoMatches {
                message: NO_MATCHES_MESSAGE.to_string(),
            }),
            RankOutcome::Ranked(ranked) => {
                let status = RankStatus::Ranked {
                    row_count: ranked.len(),
                    mode: ranked.mode.clone(),
                    score_kind: ranked.score_kind,
                    accuracy: run.as_ref().and_then(|r| r.accuracy),
                };
                self.scores = run;
                self.ranked = Some(ranked);
                self.report = None;
                self.generation += 1;
                tracing::info!("Session {} ranked: {:?}", self.id, status);
                Ok(status)
            }
        }
    }

    /// Keeps a report only if it describes the current ranking.
    pub fn store_report(&mut self, generation: u64, report: String) -> Result<(), AppError> {
        if generation != self.generation {
            tracing::warn!(
                "Session {}: discarding report for ranking {}, current is {}",
                self.id,
                generation,
                self.generation
            );
            return Err(AppError::Configuration(
                "Ranking changed while the report was generated; request a new report".to_string(),
            ));
        }
        self.report = Some(report);
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            created_at: self.created_at,
            profile: self.profile.clone(),
            filters: self.filters.clone(),
            active_filters: self.filters.describe(),
            ranked_rows: self.ranked.as_ref().map(RankedTable::len),
            accuracy: self.scores.as_ref().and_then(|r| r.accuracy),
            has_report: self.report.is_some(),
        }
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory sessions, evicted when idle or over capacity.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<Uuid, SharedSession>,
}

impl SessionStore {
    pub fn new(max_sessions: u64, idle_ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(idle_ttl)
                .build(),
        }
    }

    pub fn insert(&self, session: Session) -> Uuid {
        let id = session.id;
        self.cache.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    pub fn get(&self, id: &Uuid) -> Result<SharedSession, AppError> {
        self.cache
            .get(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.cache.remove(id).is_some()
    }
}
