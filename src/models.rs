use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Label used for rows whose employer cell is blank.
pub const UNASSIGNED_EMPLOYER: &str = "Unassigned";

/// A single cell as delivered by a row source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl RawValue {
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Text(text) => Some(text.clone()),
            RawValue::Number(value) => Some(value.to_string()),
            RawValue::Date(date) => Some(date.to_string()),
        }
    }
}

pub type RawRow = BTreeMap<String, RawValue>;

/// Cost per calendar year. Years that are absent count as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearlyCosts {
    pub by_year: BTreeMap<i32, f64>,
}

impl YearlyCosts {
    pub fn year(&self, year: i32) -> f64 {
        self.by_year.get(&year).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.by_year.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRecord {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub employer: String,
    pub company: String,
    pub status: String,
    pub costs: YearlyCosts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentDate {
    Known(NaiveDate),
    Unparseable,
}

impl EnrollmentDate {
    pub fn known(&self) -> Option<NaiveDate> {
        match self {
            EnrollmentDate::Known(date) => Some(*date),
            EnrollmentDate::Unparseable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentEvent {
    pub user_id: String,
    pub employer: String,
    pub date: EnrollmentDate,
    pub cost: f64,
}

/// Counts and sums for one named date window of one employer.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregate {
    pub window: String,
    pub enrolled: u64,
    pub cost: Option<f64>,
    pub enrolled_pct: Option<f64>,
    pub cost_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployerSummary {
    pub employer: String,
    pub population: u64,
    pub cost_total: Option<f64>,
    pub target: u64,
    pub windows: Vec<WindowAggregate>,
}

/// Employer seen in enrollment events but absent from the population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanEmployer {
    pub employer: String,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub rows: Vec<EmployerSummary>,
    pub total: EmployerSummary,
    pub orphans: Vec<OrphanEmployer>,
    pub undated_events: u64,
}

/// One fetch of both record sets. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub population: Vec<PopulationRecord>,
    pub events: Vec<EnrollmentEvent>,
}
