use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Measurement period of a groundwater reading. The snapshot spells
/// these `Pre-monsoon` / `Post-monsoon`; the dashboard's query strings
/// abbreviate them to `pre` / `post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    #[serde(rename = "Pre-monsoon")]
    PreMonsoon,
    #[serde(rename = "Post-monsoon")]
    PostMonsoon,
}

impl Season {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pre-monsoon" | "pre" => Ok(Self::PreMonsoon),
            "post-monsoon" | "post" => Ok(Self::PostMonsoon),
            other => bail!("Unsupported season `{other}`. Supported: Pre-monsoon, Post-monsoon."),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMonsoon => "Pre-monsoon",
            Self::PostMonsoon => "Post-monsoon",
        }
    }
}

/// One groundwater measurement, location fields already canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub state: String,
    pub district: String,
    pub block: String,
    pub year: i32,
    pub season: Season,
    /// Depth to water in meters below ground level. Larger is deeper.
    pub water_level: f64,
}

/// Partial predicate over record fields. `None` means unconstrained.
#[derive(Debug, Clone, Default)]
pub struct QueryCriteria {
    pub state: Option<String>,
    pub district: Option<String>,
    pub block: Option<String>,
    pub year: Option<i32>,
    pub season: Option<Season>,
}

/// One `(year, level)` chart point. Duplicate years are emitted as-is;
/// aggregation across them is the renderer's call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub year: i32,
    pub water_level: f64,
}

/// Snapshot of the cascading filter hierarchy, plus the year/season
/// domains the dashboard needs for its remaining dropdowns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub states: Vec<String>,
    pub state_to_districts: std::collections::BTreeMap<String, Vec<String>>,
    pub district_to_blocks: std::collections::BTreeMap<String, Vec<String>>,
    pub years: Vec<i32>,
    pub seasons: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    pub k: Option<usize>,
}

/// Provenance entry returned next to an answer or search result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub source_title: String,
    pub heading: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub score: f64,
    pub text: String,
    pub heading: String,
    pub source_title: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Summary,
    Annual,
    Detailed,
}

impl ReportType {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "annual" => Ok(Self::Annual),
            "detailed" => Ok(Self::Detailed),
            other => {
                bail!("Unsupported report type `{other}`. Supported: summary, annual, detailed.")
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Annual => "annual",
            Self::Detailed => "detailed",
        }
    }
}

/// Declarative report configuration, as posted by the dashboard.
/// `report_type` stays a raw string here so validation can reject
/// unknown values with the field named.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub state: String,
    pub district: String,
    #[serde(default)]
    pub block: Option<String>,
    pub report_type: String,
    #[serde(default = "default_true")]
    pub include_charts: bool,
    #[serde(default = "default_true")]
    pub include_trends: bool,
    #[serde(default)]
    pub include_comparisons: bool,
    #[serde(default = "default_true")]
    pub include_recommendations: bool,
}

fn default_true() -> bool {
    true
}

/// Aggregate statistics over the matched water levels, all in meters
/// below ground level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelStatistics {
    pub deepest: f64,
    pub shallowest: f64,
    pub mean: f64,
    pub median: f64,
    pub measurements: usize,
}

/// Per-season series of yearly mean levels, for the two-line trend
/// chart the renderer draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalSeries {
    pub season: Season,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPeriod {
    pub first_year: i32,
    pub last_year: i32,
    pub year_count: i32,
    pub measurements: usize,
}

/// Change in yearly mean level between two consecutive observed years.
/// Positive change means the water table deepened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearDelta {
    pub from_year: i32,
    pub to_year: i32,
    pub change_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingComparison {
    pub district: String,
    pub mean_level: f64,
    /// Target district mean minus this district's mean.
    pub difference_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearComparisonRow {
    pub metric: String,
    pub latest: f64,
    pub previous: f64,
    pub change_m: f64,
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearComparison {
    pub latest_year: i32,
    pub previous_year: i32,
    pub rows: Vec<YearComparisonRow>,
}

/// One assembled report section. The `kind` tag is what the renderer
/// dispatches on; payloads are already computed, never raw queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportSection {
    #[serde(rename_all = "camelCase")]
    Summary {
        title: String,
        text: String,
        statistics: Option<LevelStatistics>,
    },
    #[serde(rename_all = "camelCase")]
    DataTable { title: String, rows: Vec<Record> },
    #[serde(rename_all = "camelCase")]
    Chart {
        title: String,
        points: Vec<SeriesPoint>,
        seasonal_means: Vec<SeasonalSeries>,
    },
    #[serde(rename_all = "camelCase")]
    TrendAnalysis {
        title: String,
        text: String,
        period: Option<DataPeriod>,
        year_over_year: Vec<YearDelta>,
        overall_slope_m: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Comparison {
        title: String,
        target_mean: Option<f64>,
        siblings: Vec<SiblingComparison>,
        year_over_year: Option<YearComparison>,
    },
    #[serde(rename_all = "camelCase")]
    Recommendations {
        title: String,
        items: Vec<String>,
        summary: Option<String>,
    },
}

/// The structured report handed to the external renderer. The core
/// returns structure, never bytes, and does not persist it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub report_type: ReportType,
    pub state: String,
    pub district: String,
    pub block: Option<String>,
    pub sections: Vec<ReportSection>,
}
