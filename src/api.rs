use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    answer,
    dataset::Dataset,
    errors::ApiError,
    kb::KbIndex,
    models::{
        AskRequest, AskResponse, QueryCriteria, ReportRequest, SearchResponse, SearchResult,
        Season, SourceRef,
    },
    report::{self, ReportThresholds},
    AppState,
};

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

/// Raw query-string form of the record criteria. Values are kept as
/// strings so malformed input can be rejected with the field named
/// instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaParams {
    state: Option<String>,
    district: Option<String>,
    block: Option<String>,
    year: Option<String>,
    season: Option<String>,
}

impl CriteriaParams {
    fn into_criteria(self) -> Result<QueryCriteria, ApiError> {
        let year = match non_empty(self.year) {
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| {
                ApiError::validation("year", format!("`{raw}` is not a valid year"))
            })?),
            None => None,
        };
        let season = match non_empty(self.season) {
            Some(raw) => {
                Some(Season::parse(&raw).map_err(|err| ApiError::validation("season", err.to_string()))?)
            }
            None => None,
        };
        Ok(QueryCriteria {
            state: non_empty(self.state),
            district: non_empty(self.district),
            block: non_empty(self.block),
            year,
            season,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn get_filters(State(state): State<AppState>) -> impl IntoResponse {
    let dataset = snapshot(&state).await;
    Json(dataset.filters().options())
}

pub async fn get_water_levels(
    State(state): State<AppState>,
    Query(params): Query<CriteriaParams>,
) -> Result<impl IntoResponse, ApiError> {
    let criteria = params.into_criteria()?;
    let dataset = snapshot(&state).await;
    Ok(Json(dataset.query(&criteria)))
}

pub async fn get_series(
    State(state): State<AppState>,
    Query(params): Query<CriteriaParams>,
) -> Result<impl IntoResponse, ApiError> {
    let criteria = params.into_criteria()?;
    let dataset = snapshot(&state).await;
    Ok(Json(dataset.series(&criteria)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    query: Option<String>,
    k: Option<String>,
}

pub async fn search_kb(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = non_empty(params.query).unwrap_or_default();
    let k = match non_empty(params.k) {
        Some(raw) => {
            let parsed = raw.parse::<usize>().map_err(|_| {
                ApiError::validation("k", format!("`{raw}` is not a valid k"))
            })?;
            parse_k(&Some(parsed), &state)?
        }
        None => state.config.ask_default_k,
    };

    let kb = state.kb.read().await.clone();
    let results = kb
        .search(&query, k)
        .into_iter()
        .map(|hit| SearchResult {
            score: hit.score,
            text: hit.document.text,
            heading: hit.document.heading,
            source_title: hit.document.source_title,
        })
        .collect();
    Ok(Json(SearchResponse { query, results }))
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let k = parse_k(&request.k, &state)?;
    let kb = state.kb.read().await.clone();
    let hits = kb.search(&request.question, k);

    let sources: Vec<SourceRef> = hits
        .iter()
        .map(|hit| SourceRef {
            source_title: hit.document.source_title.clone(),
            heading: hit.document.heading.clone(),
            score: hit.score,
        })
        .collect();

    // The generation call shells out and blocks; keep it off the
    // async executor.
    let generator = state.generator.clone();
    let question = request.question.clone();
    let answer = tokio::task::spawn_blocking(move || {
        answer::synthesize(&question, &hits, generator.as_ref())
    })
    .await
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("Answer task failed: {err}")))?;

    Ok(Json(AskResponse {
        question: request.question,
        answer,
        sources,
    }))
}

fn parse_k(k: &Option<usize>, state: &AppState) -> Result<usize, ApiError> {
    match k {
        Some(0) => Err(ApiError::validation("k", "k must be a positive integer")),
        Some(k) => Ok((*k).min(state.config.ask_max_k)),
        None => Ok(state.config.ask_default_k),
    }
}

pub async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let dataset = snapshot(&state).await;
    let thresholds = ReportThresholds::from_config(&state.config);
    let document = report::assemble(&request, &dataset, &thresholds)?;
    info!(
        state = %document.state,
        district = %document.district,
        report_type = document.report_type.as_str(),
        sections = document.sections.len(),
        "Report assembled"
    );
    Ok(Json(document))
}

/// Rebuild both snapshots from disk, then swap. A failed rebuild
/// leaves the serving snapshots untouched.
pub async fn reload(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let dataset_path = state.config.dataset_path.clone();
    let kb_dir = state.config.kb_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<(Dataset, KbIndex)> {
        let dataset = Dataset::load(&dataset_path)?;
        let kb = KbIndex::load(&kb_dir)?;
        Ok((dataset, kb))
    })
    .await
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("Reload task failed: {err}")))?;

    let (dataset, kb) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("Snapshot reload failed, keeping previous snapshots: {err:#}");
            return Err(ApiError::Reload(err));
        }
    };

    let records = dataset.records().len();
    let documents = kb.len();
    *state.dataset.write().await = std::sync::Arc::new(dataset);
    *state.kb.write().await = std::sync::Arc::new(kb);
    info!(records, documents, "Snapshots reloaded");

    Ok(Json(json!({ "records": records, "documents": documents })))
}

async fn snapshot(state: &AppState) -> std::sync::Arc<Dataset> {
    state.dataset.read().await.clone()
}
