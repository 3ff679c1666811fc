use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
    models::{FilterOptions, QueryCriteria, Record, Season, SeriesPoint},
    normalize::canonical_label,
};

/// Row shape of the finalized snapshot CSV produced by the upstream
/// preprocessing step. Location names still carry their code suffixes;
/// everything else arrives clean.
#[derive(Debug, Deserialize)]
struct SnapshotRow {
    state: String,
    district: String,
    block: String,
    water_level_m_bgl: f64,
    season: String,
    year: i32,
}

/// Cascading filter hierarchy derived from one dataset load. Read-only
/// after build; iteration over every relation is lexicographically
/// sorted so filter snapshots are reproducible.
#[derive(Debug, Default)]
pub struct FilterIndex {
    states: BTreeSet<String>,
    districts_by_state: BTreeMap<String, BTreeSet<String>>,
    blocks_by_district: BTreeMap<String, BTreeSet<String>>,
    years: BTreeSet<i32>,
    seasons: BTreeSet<Season>,
}

impl FilterIndex {
    fn build(records: &[Record]) -> Self {
        let mut index = Self::default();
        for record in records {
            index.states.insert(record.state.clone());
            index
                .districts_by_state
                .entry(record.state.clone())
                .or_default()
                .insert(record.district.clone());
            index
                .blocks_by_district
                .entry(record.district.clone())
                .or_default()
                .insert(record.block.clone());
            index.years.insert(record.year);
            index.seasons.insert(record.season);
        }
        index
    }

    pub fn states(&self) -> impl Iterator<Item = &String> {
        self.states.iter()
    }

    /// Districts of a state; empty for an unknown state, never an error.
    pub fn districts_of(&self, state: &str) -> impl Iterator<Item = &String> {
        self.districts_by_state.get(state).into_iter().flatten()
    }

    /// Blocks of a district; empty for an unknown district.
    pub fn blocks_of(&self, district: &str) -> impl Iterator<Item = &String> {
        self.blocks_by_district.get(district).into_iter().flatten()
    }

    pub fn contains_district(&self, state: &str, district: &str) -> bool {
        self.districts_by_state
            .get(state)
            .is_some_and(|districts| districts.contains(district))
    }

    pub fn contains_block(&self, district: &str, block: &str) -> bool {
        self.blocks_by_district
            .get(district)
            .is_some_and(|blocks| blocks.contains(block))
    }

    pub fn options(&self) -> FilterOptions {
        FilterOptions {
            states: self.states.iter().cloned().collect(),
            state_to_districts: self
                .districts_by_state
                .iter()
                .map(|(state, districts)| (state.clone(), districts.iter().cloned().collect()))
                .collect(),
            district_to_blocks: self
                .blocks_by_district
                .iter()
                .map(|(district, blocks)| (district.clone(), blocks.iter().cloned().collect()))
                .collect(),
            years: self.years.iter().copied().collect(),
            seasons: self
                .seasons
                .iter()
                .map(|season| season.as_str().to_string())
                .collect(),
        }
    }
}

/// The loaded measurement snapshot: normalized records plus the filter
/// hierarchy derived from them. Immutable once built; a reload builds a
/// fresh `Dataset` and swaps the shared pointer.
#[derive(Debug)]
pub struct Dataset {
    records: Vec<Record>,
    filters: FilterIndex,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open dataset snapshot {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to load dataset snapshot {}", path.display()))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for row in csv_reader.deserialize::<SnapshotRow>() {
            let row = row.context("Malformed snapshot row")?;
            let season = Season::parse(&row.season)
                .with_context(|| format!("Snapshot row for {}/{}", row.state, row.district))?;
            records.push(Record {
                state: canonical_label(&row.state).to_string(),
                district: canonical_label(&row.district).to_string(),
                block: canonical_label(&row.block).to_string(),
                year: row.year,
                season,
                water_level: row.water_level_m_bgl,
            });
        }
        Self::from_records(records)
    }

    /// Build from records whose location fields may still carry code
    /// suffixes. Normalization happens here and nowhere downstream.
    pub fn from_records(raw: Vec<Record>) -> Result<Self> {
        let records: Vec<Record> = raw
            .into_iter()
            .map(|r| Record {
                state: canonical_label(&r.state).to_string(),
                district: canonical_label(&r.district).to_string(),
                block: canonical_label(&r.block).to_string(),
                ..r
            })
            .collect();
        let filters = FilterIndex::build(&records);
        verify_integrity(&records, &filters)?;
        Ok(Self { records, filters })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn filters(&self) -> &FilterIndex {
        &self.filters
    }

    /// Records matching every *specified* criterion exactly. Empty
    /// criteria match everything; no match is an empty vec, not an
    /// error.
    pub fn query(&self, criteria: &QueryCriteria) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| matches(r, criteria))
            .cloned()
            .collect()
    }

    /// Chart series for the matching records, ascending by year. Years
    /// with several matching records yield several points, in match
    /// order; aggregation is the caller's decision.
    pub fn series(&self, criteria: &QueryCriteria) -> Vec<SeriesPoint> {
        let mut points: Vec<SeriesPoint> = self
            .records
            .iter()
            .filter(|r| matches(r, criteria))
            .map(|r| SeriesPoint {
                year: r.year,
                water_level: r.water_level,
            })
            .collect();
        points.sort_by_key(|p| p.year);
        points
    }
}

fn matches(record: &Record, criteria: &QueryCriteria) -> bool {
    criteria.state.as_deref().is_none_or(|s| record.state == s)
        && criteria
            .district
            .as_deref()
            .is_none_or(|d| record.district == d)
        && criteria.block.as_deref().is_none_or(|b| record.block == b)
        && criteria.year.is_none_or(|y| record.year == y)
        && criteria.season.is_none_or(|s| record.season == s)
}

/// Every record's location triple must resolve through the hierarchy
/// built from the same load. A violation means the cascade would serve
/// wrong options, so the load is refused outright.
fn verify_integrity(records: &[Record], filters: &FilterIndex) -> Result<()> {
    for (idx, record) in records.iter().enumerate() {
        if record.state.is_empty() || record.district.is_empty() || record.block.is_empty() {
            bail!(
                "Data integrity violation at record {idx}: empty location label \
                 ({:?}, {:?}, {:?})",
                record.state,
                record.district,
                record.block
            );
        }
        if !filters.contains_district(&record.state, &record.district)
            || !filters.contains_block(&record.district, &record.block)
        {
            bail!(
                "Data integrity violation at record {idx}: ({}, {}, {}) is not in the \
                 filter hierarchy",
                record.state,
                record.district,
                record.block
            );
        }
    }
    Ok(())
}
