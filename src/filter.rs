use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::PopulationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    TotalCost,
    YearCost(i32),
    Name,
}

impl FromStr for SortKey {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "total" => Ok(SortKey::TotalCost),
            "name" => Ok(SortKey::Name),
            other => other
                .strip_prefix("year:")
                .and_then(|year| year.parse::<i32>().ok())
                .map(SortKey::YearCost)
                .ok_or_else(|| ConfigError::SortKey(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PopulationFilter {
    pub employer: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: SortKey,
}

impl PopulationFilter {
    pub fn apply<'a>(&self, records: &'a [PopulationRecord]) -> Vec<&'a PopulationRecord> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(str::to_lowercase);

        let mut selected: Vec<&PopulationRecord> = records
            .iter()
            .filter(|record| self.employer.as_ref().map_or(true, |e| &record.employer == e))
            .filter(|record| self.status.as_ref().map_or(true, |s| &record.status == s))
            .filter(|record| needle.as_deref().map_or(true, |n| matches_search(record, n)))
            .collect();

        selected.sort_by(|a, b| compare(a, b, self.sort));
        selected
    }
}

fn matches_search(record: &PopulationRecord, needle: &str) -> bool {
    [&record.email, &record.first_name, &record.last_name]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

fn compare(a: &PopulationRecord, b: &PopulationRecord, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::TotalCost => b.costs.total().total_cmp(&a.costs.total()),
        SortKey::YearCost(year) => b.costs.year(year).total_cmp(&a.costs.year(year)),
        SortKey::Name => (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)),
    };
    primary.then_with(|| a.user_id.cmp(&b.user_id))
}

/// Sorted distinct employers, for filter choices.
pub fn employers(records: &[PopulationRecord]) -> Vec<String> {
    distinct(records.iter().map(|record| record.employer.as_str()))
}

/// Sorted distinct enrollment statuses, for filter choices.
pub fn statuses(records: &[PopulationRecord]) -> Vec<String> {
    distinct(records.iter().map(|record| record.status.as_str()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Headline numbers for a population listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingMetrics {
    pub users: usize,
    pub average_by_year: Vec<(i32, f64)>,
    pub average_total: f64,
}

pub fn listing_metrics(records: &[&PopulationRecord], years: &[i32]) -> ListingMetrics {
    let mean = |sum: f64| {
        if records.is_empty() {
            0.0
        } else {
            sum / records.len() as f64
        }
    };

    let average_by_year = years
        .iter()
        .map(|&year| (year, mean(records.iter().map(|r| r.costs.year(year)).sum())))
        .collect();

    ListingMetrics {
        users: records.len(),
        average_by_year,
        average_total: mean(records.iter().map(|r| r.costs.total()).sum()),
    }
}
