use std::collections::{BTreeMap, HashMap};

use crate::config::ReportConfig;
use crate::models::{
    EmployerSummary, EnrollmentEvent, OrphanEmployer, PopulationRecord, SummaryTable,
    WindowAggregate,
};

pub const TOTAL_LABEL: &str = "TOTAL";

const TARGET_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: u64,
    cost: f64,
}

/// Builds the per-employer summary. Population is the left side of the join:
/// employers that only appear in `events` end up in `orphans`, not in `rows`.
pub fn summarize(
    population: &[PopulationRecord],
    events: &[EnrollmentEvent],
    config: &ReportConfig,
) -> SummaryTable {
    let mut base: HashMap<&str, Tally> = HashMap::new();
    for record in population {
        let entry = base.entry(record.employer.as_str()).or_default();
        entry.count += 1;
        entry.cost += record.costs.total();
    }

    let per_window: Vec<HashMap<&str, Tally>> = config
        .windows
        .iter()
        .map(|window| {
            let mut tallies: HashMap<&str, Tally> = HashMap::new();
            for event in events {
                let Some(date) = event.date.known() else {
                    continue;
                };
                if !window.contains(date) {
                    continue;
                }
                let entry = tallies.entry(event.employer.as_str()).or_default();
                entry.count += 1;
                entry.cost += event.cost;
            }
            tallies
        })
        .collect();

    let mut rows: Vec<EmployerSummary> = base
        .iter()
        .map(|(&employer, tally)| {
            let windows = per_window
                .iter()
                .map(|tallies| tallies.get(employer).copied().unwrap_or_default())
                .collect::<Vec<_>>();
            build_row(
                employer,
                tally.count,
                tally.cost,
                enrollment_target(tally.count, config.target_fraction),
                &windows,
                config,
            )
        })
        .collect();

    rows.sort_by(|a, b| {
        b.population
            .cmp(&a.population)
            .then_with(|| a.employer.cmp(&b.employer))
    });

    let total = total_row(&rows, config);
    let orphans = find_orphans(&base, events);
    for orphan in &orphans {
        tracing::warn!(
            employer = %orphan.employer,
            events = orphan.events,
            "enrollment events for employer missing from population"
        );
    }

    let undated_events = events
        .iter()
        .filter(|event| event.date.known().is_none())
        .count() as u64;

    tracing::info!(
        employers = rows.len(),
        population = total.population,
        orphans = orphans.len(),
        undated_events,
        "summary computed"
    );

    SummaryTable {
        rows,
        total,
        orphans,
        undated_events,
    }
}

/// `ceil(population * fraction)`, ignoring float noise just above an integer.
pub fn enrollment_target(population: u64, fraction: f64) -> u64 {
    let raw = population as f64 * fraction;
    if raw <= 0.0 {
        return 0;
    }
    let nearest = raw.round();
    if (raw - nearest).abs() < TARGET_TOLERANCE {
        nearest as u64
    } else {
        raw.ceil() as u64
    }
}

/// `100 * numerator / denominator`, or 0 when the denominator is zero.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        100.0 * numerator / denominator
    }
}

fn build_row(
    employer: &str,
    population: u64,
    cost: f64,
    target: u64,
    windows: &[Tally],
    config: &ReportConfig,
) -> EmployerSummary {
    let windows = config
        .windows
        .iter()
        .zip(windows)
        .map(|(window, tally)| WindowAggregate {
            window: window.name.clone(),
            enrolled: tally.count,
            cost: config.include_costs.then_some(tally.cost),
            enrolled_pct: config
                .include_percentages
                .then(|| percentage(tally.count as f64, population as f64)),
            cost_pct: (config.include_percentages && config.include_costs)
                .then(|| percentage(tally.cost, cost)),
        })
        .collect();

    EmployerSummary {
        employer: employer.to_string(),
        population,
        cost_total: config.include_costs.then_some(cost),
        target,
        windows,
    }
}

fn total_row(rows: &[EmployerSummary], config: &ReportConfig) -> EmployerSummary {
    let population = rows.iter().map(|row| row.population).sum();
    let cost = rows.iter().filter_map(|row| row.cost_total).sum();
    let target = rows.iter().map(|row| row.target).sum();

    let windows: Vec<Tally> = (0..config.windows.len())
        .map(|index| {
            rows.iter()
                .map(|row| &row.windows[index])
                .fold(Tally::default(), |acc, window| Tally {
                    count: acc.count + window.enrolled,
                    cost: acc.cost + window.cost.unwrap_or(0.0),
                })
        })
        .collect();

    build_row(TOTAL_LABEL, population, cost, target, &windows, config)
}

fn find_orphans(base: &HashMap<&str, Tally>, events: &[EnrollmentEvent]) -> Vec<OrphanEmployer> {
    let mut orphans: BTreeMap<&str, u64> = BTreeMap::new();
    for event in events {
        if !base.contains_key(event.employer.as_str()) {
            *orphans.entry(event.employer.as_str()).or_insert(0) += 1;
        }
    }

    orphans
        .into_iter()
        .map(|(employer, events)| OrphanEmployer {
            employer: employer.to_string(),
            events,
        })
        .collect()
}
