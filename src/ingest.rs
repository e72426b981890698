use std::collections::BTreeSet;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{ColumnMap, DashboardConfig};
use crate::cost;
use crate::dates;
use crate::error::IngestError;
use crate::models::{
    EnrollmentDate, EnrollmentEvent, PopulationRecord, RawRow, RawValue, Snapshot,
    UNASSIGNED_EMPLOYER,
};
use crate::source::RowSource;

/// Pulls both worksheets and maps them into a new snapshot.
pub async fn fetch_snapshot<S: RowSource>(
    source: &S,
    config: &DashboardConfig,
) -> Result<Snapshot, IngestError> {
    let population_rows = source.fetch_rows(&config.population_sheet).await?;
    let event_rows = source.fetch_rows(&config.events_sheet).await?;
    warn_on_missing_column(&population_rows, &config.population_sheet, &config.columns.employer);
    warn_on_missing_column(&event_rows, &config.events_sheet, &config.columns.employer);
    warn_on_missing_column(&event_rows, &config.events_sheet, &config.columns.enrollment_date);

    Ok(Snapshot {
        id: Uuid::new_v4(),
        fetched_at: Utc::now(),
        population: population_from_rows(&population_rows, &config.columns, &config.cost_years),
        events: events_from_rows(&event_rows, &config.columns, &config.cost_years),
    })
}

pub fn population_from_rows(
    rows: &[RawRow],
    columns: &ColumnMap,
    cost_years: &[i32],
) -> Vec<PopulationRecord> {
    rows.iter()
        .map(|row| PopulationRecord {
            user_id: text(row, &columns.user_id),
            first_name: text(row, &columns.first_name),
            last_name: text(row, &columns.last_name),
            email: text(row, &columns.email),
            employer: employer(row, &columns.employer),
            company: text(row, &columns.company),
            status: text(row, &columns.status),
            costs: cost::parse_yearly_costs(cell(row, &columns.cost), cost_years),
        })
        .collect()
}

pub fn events_from_rows(
    rows: &[RawRow],
    columns: &ColumnMap,
    cost_years: &[i32],
) -> Vec<EnrollmentEvent> {
    let events: Vec<EnrollmentEvent> = rows
        .iter()
        .map(|row| EnrollmentEvent {
            user_id: text(row, &columns.user_id),
            employer: employer(row, &columns.employer),
            date: dates::normalize_date(cell(row, &columns.enrollment_date)),
            cost: cost::parse_cost_total(cell(row, &columns.cost), cost_years),
        })
        .collect();

    let undated = events
        .iter()
        .filter(|event| event.date == EnrollmentDate::Unparseable)
        .count();
    if undated > 0 {
        tracing::warn!(
            undated,
            column = %columns.enrollment_date,
            "enrollment events with unparseable dates"
        );
    }

    events
}

/// Column names present in any row, for diagnosing a wrong column map.
pub fn column_names(rows: &[RawRow]) -> BTreeSet<&str> {
    rows.iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect()
}

fn warn_on_missing_column(rows: &[RawRow], sheet: &str, column: &str) {
    let columns = column_names(rows);
    if !rows.is_empty() && !columns.contains(column) {
        tracing::warn!(
            sheet,
            column,
            available = ?columns,
            "configured column not present in sheet"
        );
    }
}

static MISSING: RawValue = RawValue::Null;

fn cell<'a>(row: &'a RawRow, column: &str) -> &'a RawValue {
    row.get(column).unwrap_or(&MISSING)
}

fn text(row: &RawRow, column: &str) -> String {
    cell(row, column)
        .as_text()
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn employer(row: &RawRow, column: &str) -> String {
    let name = text(row, column);
    if name.is_empty() {
        UNASSIGNED_EMPLOYER.to_string()
    } else {
        name
    }
}
