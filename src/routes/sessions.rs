use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{CellValue, Criterion, FilterCondition},
    services::{
        chart::{chart_data, chart_table, ChartData, DEFAULT_CHART_ROWS},
        report::{render_document, ReportInput, DEFAULT_REPORT_ROWS},
        session::{RankStatus, Session, SessionSummary},
        table::{to_csv, Table},
    },
    AppState,
};

const PREVIEW_ROWS: usize = 20;

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/filters", delete(clear_filters))
        .route("/sessions/:id/filters/:column", put(set_filter).delete(remove_filter))
        .route("/sessions/:id/rank", post(rank_session))
        .route("/sessions/:id/export", get(export_ranked))
        .route("/sessions/:id/chart", get(session_chart))
        .route("/sessions/:id/report", post(session_report))
        .route("/sessions/:id/document", get(export_document))
        .layer(cors)
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    active: bool,
    filters: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankRequest {
    #[serde(default)]
    criteria: Vec<Criterion>,
}

#[derive(Debug, Serialize)]
pub struct RowsPreview {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    #[serde(flatten)]
    status: RankStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<RowsPreview>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    report: String,
}

fn preview(table: &Table) -> Result<RowsPreview, AppError> {
    let rows = table
        .records(PREVIEW_ROWS)?
        .into_iter()
        .map(|record| record.into_iter().map(|(_, value)| value).collect())
        .collect();
    Ok(RowsPreview {
        columns: table.column_names(),
        rows,
    })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let start = std::time::Instant::now();
    tracing::info!("Received upload of {}KB", body.len() / 1024);

    let session = tokio::task::spawn_blocking(move || Session::from_upload(&body)).await??;
    let summary = session.summary();
    state.sessions.insert(session);

    tracing::info!(
        "Session {} created with {} rows, {} columns in {:?}",
        summary.id,
        summary.profile.row_count,
        summary.profile.column_count,
        start.elapsed()
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = state.sessions.get(&id)?;
    let summary = session.lock().summary();
    Ok(Json(summary))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&id) {
        tracing::info!("Session {} deleted", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::SessionNotFound(id.to_string()))
    }
}

async fn set_filter(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
    Json(condition): Json<FilterCondition>,
) -> Result<Json<FilterResponse>, AppError> {
    let session = state.sessions.get(&id)?;
    let mut session = session.lock();
    let active = session.set_filter(&column, condition)?;
    Ok(Json(FilterResponse {
        active,
        filters: session.filters().describe(),
    }))
}

async fn remove_filter(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
) -> Result<Json<FilterResponse>, AppError> {
    let session = state.sessions.get(&id)?;
    let mut session = session.lock();
    session.remove_filter(&column);
    Ok(Json(FilterResponse {
        active: false,
        filters: session.filters().describe(),
    }))
}

async fn clear_filters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FilterResponse>, AppError> {
    let session = state.sessions.get(&id)?;
    let mut session = session.lock();
    session.clear_filters();
    Ok(Json(FilterResponse {
        active: false,
        filters: Vec::new(),
    }))
}

async fn rank_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RankRequest>,
) -> Result<Json<RankResponse>, AppError> {
    let session = state.sessions.get(&id)?;
    let scoring = state.config.scoring();
    tracing::info!("Ranking session {} with {} criteria", id, request.criteria.len());

    let response = tokio::task::spawn_blocking(move || -> Result<RankResponse, AppError> {
        let mut session = session.lock();
        let status = session.rank(request.criteria, &scoring)?;
        let preview = match &status {
            RankStatus::Ranked { .. } => session.ranked().map(|r| preview(&r.table)).transpose()?,
            RankStatus::NoMatches { .. } => None,
        };
        Ok(RankResponse { status, preview })
    })
    .await??;

    Ok(Json(response))
}

async fn export_ranked(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.get(&id)?;
    let csv = {
        let session = session.lock();
        let ranked = session
            .ranked()
            .ok_or_else(|| AppError::Configuration("Nothing has been ranked in this session yet".to_string()))?;
        to_csv(&ranked.table)?
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"ranked_suppliers.csv\""),
        ],
        csv,
    ))
}

/// Chart of the last ranking, or of the uploaded rows when nothing is ranked yet.
async fn session_chart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChartData>, AppError> {
    let session = state.sessions.get(&id)?;
    let session = session.lock();
    let chart = match session.ranked() {
        Some(ranked) => chart_data(ranked, DEFAULT_CHART_ROWS)?,
        None => chart_table(session.table(), &[], DEFAULT_CHART_ROWS)?,
    };
    Ok(Json(chart))
}

async fn session_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    request: Option<Json<ReportRequest>>,
) -> Result<Json<ReportResponse>, AppError> {
    let top_n = request
        .and_then(|Json(r)| r.top_n)
        .unwrap_or(DEFAULT_REPORT_ROWS);
    let session = state.sessions.get(&id)?;

    let (input, generation) = {
        let session = session.lock();
        let ranked = session
            .ranked()
            .ok_or_else(|| AppError::Configuration("Rank suppliers before generating a report".to_string()))?;
        (ReportInput::from_ranked(ranked, top_n)?, session.ranking_generation())
    };

    let report = match state.reports.generate(&input).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Report generation failed for session {}: {}", id, e);
            return Err(e);
        }
    };

    session.lock().store_report(generation, report.clone())?;
    Ok(Json(ReportResponse { report }))
}

/// Markdown download of the stored report with the chart data of its ranking.
async fn export_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.get(&id)?;
    let document = {
        let session = session.lock();
        let report = session
            .report()
            .ok_or_else(|| AppError::Configuration("Generate a report before exporting it".to_string()))?;
        let ranked = session
            .ranked()
            .ok_or_else(|| AppError::Internal("Stored report has no ranking".to_string()))?;
        let chart = chart_data(ranked, DEFAULT_CHART_ROWS)?;
        render_document(
            report,
            &session.filters().describe(),
            &chart,
            !ranked.mode.criteria().is_empty(),
        )
    };
    tracing::info!("Session {} document exported, {} bytes", id, document.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"supplier_report.md\""),
        ],
        document,
    ))
}
