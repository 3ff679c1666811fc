use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::Config,
    dataset::Dataset,
    errors::ApiError,
    models::{
        DataPeriod, LevelStatistics, QueryCriteria, Record, ReportDocument, ReportRequest,
        ReportSection, ReportType, SeasonalSeries, SeriesPoint, SiblingComparison, Season,
        YearComparison, YearComparisonRow, YearDelta,
    },
};

/// Tunable cutoffs for the rule-based sections. Levels are meters
/// below ground level, so a positive change means decline.
#[derive(Debug, Clone, Copy)]
pub struct ReportThresholds {
    pub critical_depth_m: f64,
    pub decline_threshold_m: f64,
    pub recovery_threshold_m: f64,
}

impl ReportThresholds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            critical_depth_m: config.critical_depth_m,
            decline_threshold_m: config.decline_threshold_m,
            recovery_threshold_m: config.recovery_threshold_m,
        }
    }
}

/// Assemble a structured report for the external renderer. Validation
/// failures name the offending field; an empty match still assembles,
/// with an explicit no-data summary.
pub fn assemble(
    request: &ReportRequest,
    dataset: &Dataset,
    thresholds: &ReportThresholds,
) -> Result<ReportDocument, ApiError> {
    let state = request.state.trim();
    if state.is_empty() {
        return Err(ApiError::validation("state", "state is required"));
    }
    let district = request.district.trim();
    if district.is_empty() {
        return Err(ApiError::validation("district", "district is required"));
    }
    if request.report_type.trim().is_empty() {
        return Err(ApiError::validation("reportType", "reportType is required"));
    }
    let report_type = ReportType::parse(&request.report_type)
        .map_err(|err| ApiError::validation("reportType", err.to_string()))?;

    if !dataset.filters().contains_district(state, district) {
        return Err(ApiError::validation(
            "district",
            format!("`{district}` is not a district of `{state}`"),
        ));
    }

    // The dashboard posts an empty string when no block is picked.
    let block = request
        .block
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());
    if let Some(block) = block {
        if !dataset.filters().contains_block(district, block) {
            return Err(ApiError::validation(
                "block",
                format!("`{block}` is not a block of `{district}`"),
            ));
        }
    }

    let criteria = QueryCriteria {
        state: Some(state.to_string()),
        district: Some(district.to_string()),
        block: block.map(ToString::to_string),
        ..Default::default()
    };
    let rows = dataset.query(&criteria);
    let means_by_year = yearly_means(&rows);

    let mut sections = Vec::new();
    sections.push(summary_section(state, district, block, &rows));
    sections.push(ReportSection::DataTable {
        title: "Measurements".to_string(),
        rows: rows.clone(),
    });
    if request.include_charts {
        sections.push(chart_section(dataset, &criteria, &rows));
    }
    if request.include_trends {
        sections.push(trend_section(&rows, &means_by_year));
    }
    if request.include_comparisons {
        sections.push(comparison_section(state, district, dataset, &rows));
    }
    if request.include_recommendations {
        sections.push(recommendations_section(&rows, &means_by_year, thresholds));
    }

    Ok(ReportDocument {
        report_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        report_type,
        state: state.to_string(),
        district: district.to_string(),
        block: block.map(ToString::to_string),
        sections,
    })
}

fn summary_section(
    state: &str,
    district: &str,
    block: Option<&str>,
    rows: &[Record],
) -> ReportSection {
    let location = match block {
        Some(block) => format!("{block}, {district}, {state}"),
        None => format!("{district}, {state}"),
    };
    if rows.is_empty() {
        return ReportSection::Summary {
            title: "Summary".to_string(),
            text: format!("No data available for this selection ({location})."),
            statistics: None,
        };
    }
    let statistics = level_statistics(rows);
    ReportSection::Summary {
        title: "Summary".to_string(),
        text: format!(
            "{count} groundwater measurements for {location}.",
            count = rows.len()
        ),
        statistics: Some(statistics),
    }
}

fn chart_section(dataset: &Dataset, criteria: &QueryCriteria, rows: &[Record]) -> ReportSection {
    let mut seasonal_means = Vec::new();
    for season in [Season::PreMonsoon, Season::PostMonsoon] {
        let seasonal: Vec<Record> = rows.iter().filter(|r| r.season == season).cloned().collect();
        let points: Vec<SeriesPoint> = yearly_means(&seasonal)
            .into_iter()
            .map(|(year, water_level)| SeriesPoint { year, water_level })
            .collect();
        if !points.is_empty() {
            seasonal_means.push(SeasonalSeries { season, points });
        }
    }
    ReportSection::Chart {
        title: "Water Level Trends".to_string(),
        points: dataset.series(criteria),
        seasonal_means,
    }
}

fn trend_section(rows: &[Record], means_by_year: &[(i32, f64)]) -> ReportSection {
    let title = "Trend Analysis".to_string();
    if rows.is_empty() {
        return ReportSection::TrendAnalysis {
            title,
            text: "No year information available to compute trends.".to_string(),
            period: None,
            year_over_year: Vec::new(),
            overall_slope_m: None,
        };
    }

    let first_year = rows.iter().map(|r| r.year).min().unwrap_or_default();
    let last_year = rows.iter().map(|r| r.year).max().unwrap_or_default();
    let period = DataPeriod {
        first_year,
        last_year,
        year_count: last_year - first_year + 1,
        measurements: rows.len(),
    };

    let year_over_year: Vec<YearDelta> = means_by_year
        .windows(2)
        .map(|pair| YearDelta {
            from_year: pair[0].0,
            to_year: pair[1].0,
            change_m: pair[1].1 - pair[0].1,
        })
        .collect();

    let (text, overall_slope_m) = if means_by_year.len() >= 2 {
        let (first, first_mean) = means_by_year[0];
        let (last, last_mean) = means_by_year[means_by_year.len() - 1];
        let slope = last_mean - first_mean;
        (
            format!("Mean water level change from {first} to {last}: {slope:+.2} m bgl."),
            Some(slope),
        )
    } else {
        (
            "Insufficient years to compute a slope-based trend.".to_string(),
            None,
        )
    };

    ReportSection::TrendAnalysis {
        title,
        text,
        period: Some(period),
        year_over_year,
        overall_slope_m,
    }
}

fn comparison_section(
    state: &str,
    district: &str,
    dataset: &Dataset,
    rows: &[Record],
) -> ReportSection {
    let target_mean = mean(rows.iter().map(|r| r.water_level));

    let mut siblings = Vec::new();
    if let Some(target_mean) = target_mean {
        for sibling in dataset.filters().districts_of(state) {
            if sibling == district {
                continue;
            }
            let sibling_rows = dataset.query(&QueryCriteria {
                state: Some(state.to_string()),
                district: Some(sibling.clone()),
                ..Default::default()
            });
            if let Some(mean_level) = mean(sibling_rows.iter().map(|r| r.water_level)) {
                siblings.push(SiblingComparison {
                    district: sibling.clone(),
                    mean_level,
                    difference_m: target_mean - mean_level,
                });
            }
        }
    }

    ReportSection::Comparison {
        title: "Regional Comparison".to_string(),
        target_mean,
        siblings,
        year_over_year: year_comparison(rows),
    }
}

/// Latest vs previous observed year over the selection, the original
/// report's YoY table: mean, min and max with absolute and percent
/// change.
fn year_comparison(rows: &[Record]) -> Option<YearComparison> {
    let mut years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    years.sort_unstable();
    years.dedup();
    if years.len() < 2 {
        return None;
    }
    let latest_year = years[years.len() - 1];
    let previous_year = years[years.len() - 2];

    let levels_of = |year: i32| -> Vec<f64> {
        rows.iter()
            .filter(|r| r.year == year)
            .map(|r| r.water_level)
            .collect()
    };
    let latest = levels_of(latest_year);
    let previous = levels_of(previous_year);

    let row = |metric: &str, latest: f64, previous: f64| YearComparisonRow {
        metric: metric.to_string(),
        latest,
        previous,
        change_m: latest - previous,
        change_pct: if previous != 0.0 {
            Some((latest - previous) / previous * 100.0)
        } else {
            None
        },
    };

    Some(YearComparison {
        latest_year,
        previous_year,
        rows: vec![
            row(
                "mean",
                mean(latest.iter().copied()).unwrap_or_default(),
                mean(previous.iter().copied()).unwrap_or_default(),
            ),
            row(
                "min",
                latest.iter().copied().fold(f64::INFINITY, f64::min),
                previous.iter().copied().fold(f64::INFINITY, f64::min),
            ),
            row(
                "max",
                latest.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                previous.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ),
        ],
    })
}

fn recommendations_section(
    rows: &[Record],
    means_by_year: &[(i32, f64)],
    thresholds: &ReportThresholds,
) -> ReportSection {
    let title = "Recommendations".to_string();
    let mut items = Vec::new();

    if means_by_year.len() < 2 {
        items.push(
            "Insufficient yearly mean data to make strong recommendations. Consider improving \
             monitoring density."
                .to_string(),
        );
        return ReportSection::Recommendations {
            title,
            items,
            summary: None,
        };
    }

    let (previous_year, previous_mean) = means_by_year[means_by_year.len() - 2];
    let (_, latest_mean) = means_by_year[means_by_year.len() - 1];
    let change = latest_mean - previous_mean;
    if change > thresholds.decline_threshold_m {
        items.push(format!(
            "Mean groundwater level has worsened by {change:+.2} m since {previous_year}. \
             Consider groundwater recharge measures (check dams, infiltration wells)."
        ));
    } else if change < -thresholds.decline_threshold_m {
        items.push(format!(
            "Mean groundwater level has improved by {change:+.2} m since {previous_year}. \
             Continue monitoring and sustaining recharge practices."
        ));
    } else {
        items.push(format!(
            "Mean groundwater level is relatively stable year over year ({change:+.2} m). \
             Continue periodic monitoring."
        ));
    }

    if let Some(overall_mean) = mean(rows.iter().map(|r| r.water_level)) {
        if overall_mean > thresholds.critical_depth_m {
            items.push(format!(
                "Mean depth of {overall_mean:.2} m bgl exceeds the critical threshold of \
                 {:.2} m. Classify this selection as critical and prioritize intervention.",
                thresholds.critical_depth_m
            ));
        }
    }

    if means_by_year.len() >= 3 {
        let last3 = &means_by_year[means_by_year.len() - 3..];
        if last3.windows(2).all(|pair| pair[1].1 > pair[0].1) {
            items.push(
                "Groundwater shows a consistent decline over the past three years. Immediate \
                 recharge and demand-management measures recommended."
                    .to_string(),
            );
        }
    }

    if let Some(item) = recovery_item(rows, thresholds) {
        items.push(item);
    }

    let overall_change = means_by_year[means_by_year.len() - 1].1 - means_by_year[0].1;
    let summary = if overall_change > 0.5 {
        "Overall, the groundwater levels indicate a notable declining trend over the recorded \
         period."
    } else if overall_change < -0.5 {
        "Overall, groundwater levels show a notable improvement across the period."
    } else {
        "Overall, groundwater levels are relatively stable over the recorded period."
    };

    ReportSection::Recommendations {
        title,
        items,
        summary: Some(summary.to_string()),
    }
}

/// Pre- vs post-monsoon means of the latest year covered by both
/// seasons. Positive recovery means the post-monsoon table is
/// shallower.
fn recovery_item(rows: &[Record], thresholds: &ReportThresholds) -> Option<String> {
    let latest_common = |season: Season| {
        rows.iter()
            .filter(|r| r.season == season)
            .map(|r| r.year)
            .max()
    };
    let pre_year = latest_common(Season::PreMonsoon)?;
    let post_year = latest_common(Season::PostMonsoon)?;
    if pre_year != post_year {
        return None;
    }

    let seasonal_mean = |season: Season| {
        mean(
            rows.iter()
                .filter(|r| r.season == season && r.year == pre_year)
                .map(|r| r.water_level),
        )
    };
    let recovery = seasonal_mean(Season::PreMonsoon)? - seasonal_mean(Season::PostMonsoon)?;

    if recovery < thresholds.recovery_threshold_m {
        Some(format!(
            "Post-monsoon recovery is weak ({recovery:.2} m in {pre_year}). Strengthen recharge \
             practices and watershed measures."
        ))
    } else {
        Some(
            "Post-monsoon recovery appears adequate. Maintain recharge and conservation measures."
                .to_string(),
        )
    }
}

fn level_statistics(rows: &[Record]) -> LevelStatistics {
    let mut levels: Vec<f64> = rows.iter().map(|r| r.water_level).collect();
    levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = levels.len() / 2;
    let median = if levels.len() % 2 == 0 {
        (levels[mid - 1] + levels[mid]) / 2.0
    } else {
        levels[mid]
    };
    LevelStatistics {
        deepest: levels[levels.len() - 1],
        shallowest: levels[0],
        mean: mean(levels.iter().copied()).unwrap_or_default(),
        median,
        measurements: levels.len(),
    }
}

/// Mean level per observed year, ascending by year.
fn yearly_means(rows: &[Record]) -> Vec<(i32, f64)> {
    let mut years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    years.sort_unstable();
    years.dedup();
    years
        .into_iter()
        .filter_map(|year| {
            mean(
                rows.iter()
                    .filter(|r| r.year == year)
                    .map(|r| r.water_level),
            )
            .map(|m| (year, m))
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::{assemble, ReportThresholds};
    use crate::{
        dataset::Dataset,
        errors::ApiError,
        models::{Record, ReportRequest, ReportSection, Season},
    };

    fn record(
        state: &str,
        district: &str,
        block: &str,
        year: i32,
        season: Season,
        level: f64,
    ) -> Record {
        Record {
            state: state.to_string(),
            district: district.to_string(),
            block: block.to_string(),
            year,
            season,
            water_level: level,
        }
    }

    fn thresholds() -> ReportThresholds {
        ReportThresholds {
            critical_depth_m: 25.0,
            decline_threshold_m: 0.25,
            recovery_threshold_m: 0.5,
        }
    }

    fn request(state: &str, district: &str) -> ReportRequest {
        ReportRequest {
            state: state.to_string(),
            district: district.to_string(),
            block: None,
            report_type: "annual".to_string(),
            include_charts: true,
            include_trends: true,
            include_comparisons: false,
            include_recommendations: true,
        }
    }

    fn sample() -> Dataset {
        Dataset::from_records(vec![
            record("Gujarat", "Mehsana", "Kadi", 2019, Season::PreMonsoon, 12.0),
            record("Gujarat", "Mehsana", "Kadi", 2019, Season::PostMonsoon, 11.0),
            record("Gujarat", "Mehsana", "Kadi", 2020, Season::PreMonsoon, 12.8),
            record("Gujarat", "Mehsana", "Kadi", 2020, Season::PostMonsoon, 11.9),
            record("Gujarat", "Mehsana", "Kadi", 2021, Season::PreMonsoon, 13.6),
            record("Gujarat", "Mehsana", "Kadi", 2021, Season::PostMonsoon, 13.3),
            record("Gujarat", "Banaskantha", "Palanpur", 2021, Season::PreMonsoon, 18.0),
        ])
        .unwrap()
    }

    #[test]
    fn unknown_district_pairing_names_the_district_field() {
        let err = assemble(&request("Gujarat", "Sangrur"), &sample(), &thresholds()).unwrap_err();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field, "district"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_report_type_names_the_field() {
        let mut req = request("Gujarat", "Mehsana");
        req.report_type = "quarterly".to_string();
        let err = assemble(&req, &sample(), &thresholds()).unwrap_err();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field, "reportType"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_block_names_the_block_field() {
        let mut req = request("Gujarat", "Mehsana");
        req.block = Some("Palanpur".to_string());
        let err = assemble(&req, &sample(), &thresholds()).unwrap_err();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field, "block"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn empty_block_string_is_treated_as_absent() {
        let mut req = request("Gujarat", "Mehsana");
        req.block = Some(String::new());
        let report = assemble(&req, &sample(), &thresholds()).unwrap();
        assert_eq!(report.block, None);
    }

    #[test]
    fn sections_follow_the_fixed_order_and_respect_toggles() {
        let mut req = request("Gujarat", "Mehsana");
        req.include_comparisons = true;
        let report = assemble(&req, &sample(), &thresholds()).unwrap();
        let kinds: Vec<&str> = report
            .sections
            .iter()
            .map(|s| match s {
                ReportSection::Summary { .. } => "summary",
                ReportSection::DataTable { .. } => "dataTable",
                ReportSection::Chart { .. } => "chart",
                ReportSection::TrendAnalysis { .. } => "trendAnalysis",
                ReportSection::Comparison { .. } => "comparison",
                ReportSection::Recommendations { .. } => "recommendations",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "summary",
                "dataTable",
                "chart",
                "trendAnalysis",
                "comparison",
                "recommendations"
            ]
        );

        let mut req = request("Gujarat", "Mehsana");
        req.include_charts = false;
        req.include_trends = false;
        req.include_recommendations = false;
        let report = assemble(&req, &sample(), &thresholds()).unwrap();
        assert_eq!(report.sections.len(), 2);
    }

    #[test]
    fn empty_match_still_assembles_with_a_no_data_summary() {
        // `Vadgam` hangs off Banaskantha, so the hierarchy admits it
        // under a Mehsana query only through the flat district map;
        // the exact query then matches nothing.
        let dataset = Dataset::from_records(vec![
            record("Gujarat", "Mehsana", "Kadi", 2020, Season::PreMonsoon, 12.0),
            record("Rajasthan", "Mehsana", "Vadgam", 2020, Season::PreMonsoon, 15.0),
        ])
        .unwrap();
        let mut req = request("Gujarat", "Mehsana");
        req.block = Some("Vadgam".to_string());
        req.include_charts = false;
        req.report_type = "summary".to_string();

        let report = assemble(&req, &dataset, &thresholds()).unwrap();
        match &report.sections[0] {
            ReportSection::Summary {
                text, statistics, ..
            } => {
                assert!(text.contains("No data available for this selection"));
                assert!(statistics.is_none());
            }
            other => panic!("expected summary first, got {other:?}"),
        }
        assert!(!report
            .sections
            .iter()
            .any(|s| matches!(s, ReportSection::Chart { .. })));
        match &report.sections[1] {
            ReportSection::DataTable { rows, .. } => assert!(rows.is_empty()),
            other => panic!("expected data table second, got {other:?}"),
        }
    }

    #[test]
    fn trend_section_reports_slope_and_deltas() {
        let report = assemble(&request("Gujarat", "Mehsana"), &sample(), &thresholds()).unwrap();
        let trend = report
            .sections
            .iter()
            .find_map(|s| match s {
                ReportSection::TrendAnalysis {
                    year_over_year,
                    overall_slope_m,
                    period,
                    ..
                } => Some((year_over_year, overall_slope_m, period)),
                _ => None,
            })
            .unwrap();
        let (deltas, slope, period) = trend;
        assert_eq!(deltas.len(), 2);
        // Yearly means: 2019 -> 11.5, 2020 -> 12.35, 2021 -> 13.45.
        assert!((deltas[0].change_m - 0.85).abs() < 1e-9);
        assert!((slope.unwrap() - 1.95).abs() < 1e-9);
        let period = period.as_ref().unwrap();
        assert_eq!(period.first_year, 2019);
        assert_eq!(period.last_year, 2021);
    }

    #[test]
    fn comparison_includes_siblings_and_year_over_year() {
        let mut req = request("Gujarat", "Mehsana");
        req.include_comparisons = true;
        let report = assemble(&req, &sample(), &thresholds()).unwrap();
        let comparison = report
            .sections
            .iter()
            .find_map(|s| match s {
                ReportSection::Comparison {
                    siblings,
                    year_over_year,
                    ..
                } => Some((siblings, year_over_year)),
                _ => None,
            })
            .unwrap();
        let (siblings, yoy) = comparison;
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].district, "Banaskantha");
        let yoy = yoy.as_ref().unwrap();
        assert_eq!(yoy.latest_year, 2021);
        assert_eq!(yoy.previous_year, 2020);
        assert_eq!(yoy.rows.len(), 3);
    }

    #[test]
    fn sustained_decline_and_weak_recovery_are_flagged() {
        let report = assemble(&request("Gujarat", "Mehsana"), &sample(), &thresholds()).unwrap();
        let items = report
            .sections
            .iter()
            .find_map(|s| match s {
                ReportSection::Recommendations { items, .. } => Some(items),
                _ => None,
            })
            .unwrap();
        assert!(items.iter().any(|i| i.contains("worsened")));
        assert!(items.iter().any(|i| i.contains("consistent decline")));
        // 2021 pre 13.6 vs post 13.3: recovery 0.3 m, below the 0.5 cutoff.
        assert!(items.iter().any(|i| i.contains("recovery is weak")));
    }

    #[test]
    fn deep_selection_is_flagged_critical() {
        let dataset = Dataset::from_records(vec![
            record("Gujarat", "Mehsana", "Kadi", 2020, Season::PreMonsoon, 30.0),
            record("Gujarat", "Mehsana", "Kadi", 2021, Season::PreMonsoon, 31.0),
        ])
        .unwrap();
        let report = assemble(&request("Gujarat", "Mehsana"), &dataset, &thresholds()).unwrap();
        let items = report
            .sections
            .iter()
            .find_map(|s| match s {
                ReportSection::Recommendations { items, .. } => Some(items),
                _ => None,
            })
            .unwrap();
        assert!(items.iter().any(|i| i.contains("critical threshold")));
    }
}
