use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::filter::ListingMetrics;
use crate::models::{EmployerSummary, PopulationRecord, SummaryTable};

/// Headline numbers shown above the employer table.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlineMetrics {
    pub employers: usize,
    pub population: u64,
    pub target: u64,
    /// (window name, enrolled count, enrolled % of population)
    pub enrolled: Vec<(String, u64, f64)>,
}

pub fn headline_metrics(table: &SummaryTable) -> HeadlineMetrics {
    let population = table.total.population;
    HeadlineMetrics {
        employers: table.rows.len(),
        population,
        target: table.total.target,
        enrolled: table
            .total
            .windows
            .iter()
            .map(|window| {
                let pct = crate::aggregate::percentage(window.enrolled as f64, population as f64);
                (window.window.clone(), window.enrolled, pct)
            })
            .collect(),
    }
}

pub fn build_summary_report(table: &SummaryTable, fetched_at: DateTime<Utc>) -> String {
    let metrics = headline_metrics(table);
    let mut output = String::new();

    let _ = writeln!(output, "# High Cost Utilizer Enrollment");
    let _ = writeln!(
        output,
        "Data fetched {}",
        fetched_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Headline");
    let _ = writeln!(output, "- Employers: {}", format_count(metrics.employers as u64));
    let _ = writeln!(output, "- HCU population: {}", format_count(metrics.population));
    let _ = writeln!(output, "- Enrollment target: {}", format_count(metrics.target));
    for (window, enrolled, pct) in &metrics.enrolled {
        let _ = writeln!(
            output,
            "- Enrolled {}: {} ({})",
            window,
            format_count(*enrolled),
            format_percent(*pct)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Employer");

    if table.rows.is_empty() {
        let _ = writeln!(output, "No population rows found.");
    } else {
        let header = summary_header(&table.total);
        let _ = writeln!(output, "| {} |", header.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(header.len()));
        for row in table.rows.iter().chain(std::iter::once(&table.total)) {
            let _ = writeln!(output, "| {} |", summary_cells(row).join(" | "));
        }
    }

    if !table.orphans.is_empty() || table.undated_events > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Data Quality");
        for orphan in &table.orphans {
            let _ = writeln!(
                output,
                "- {}: {} enrollment events with no population rows (excluded)",
                orphan.employer,
                format_count(orphan.events)
            );
        }
        if table.undated_events > 0 {
            let _ = writeln!(
                output,
                "- {} enrollment events with unreadable dates (excluded from date windows)",
                format_count(table.undated_events)
            );
        }
    }

    output
}

/// Text cell for a markdown table row; a bare `|` would split the cell.
fn table_cell(value: &str) -> String {
    value.replace('|', "\\|")
}

fn summary_header(total: &EmployerSummary) -> Vec<String> {
    let mut header = vec!["Employer".to_string(), "HCU".to_string()];
    if total.cost_total.is_some() {
        header.push("Claim Cost".to_string());
    }
    header.push("Target".to_string());
    for window in &total.windows {
        let name = table_cell(&window.window);
        header.push(format!("Enrolled {name}"));
        if window.enrolled_pct.is_some() {
            header.push(format!("% {name}"));
        }
        if window.cost.is_some() {
            header.push(format!("Cost {name}"));
        }
        if window.cost_pct.is_some() {
            header.push(format!("Cost % {name}"));
        }
    }
    header
}

fn summary_cells(row: &EmployerSummary) -> Vec<String> {
    let mut cells = vec![table_cell(&row.employer), format_count(row.population)];
    if let Some(cost) = row.cost_total {
        cells.push(format_currency(cost));
    }
    cells.push(format_count(row.target));
    for window in &row.windows {
        cells.push(format_count(window.enrolled));
        if let Some(pct) = window.enrolled_pct {
            cells.push(format_percent(pct));
        }
        if let Some(cost) = window.cost {
            cells.push(format_currency(cost));
        }
        if let Some(pct) = window.cost_pct {
            cells.push(format_percent(pct));
        }
    }
    cells
}

pub fn build_user_listing(
    selected: &[&PopulationRecord],
    total_users: usize,
    years: &[i32],
    metrics: &ListingMetrics,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# High Cost Utilizers");
    let _ = writeln!(output, "- Total users: {}", format_count(metrics.users as u64));
    for (year, average) in &metrics.average_by_year {
        let _ = writeln!(output, "- Avg claim cost {}: {}", year, format_currency_whole(*average));
    }
    let _ = writeln!(
        output,
        "- Avg total claim cost: {}",
        format_currency_whole(metrics.average_total)
    );
    let _ = writeln!(output);

    let mut header: Vec<String> = [
        "User", "Email", "First Name", "Last Name", "Employer", "Company", "Status",
    ]
    .iter()
    .map(|title| title.to_string())
    .collect();
    header.extend(years.iter().map(|year| format!("Claim Cost {year}")));
    header.push("Total Claim Cost".to_string());

    let _ = writeln!(output, "| {} |", header.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(header.len()));
    for record in selected {
        let mut cells: Vec<String> = [
            &record.user_id,
            &record.email,
            &record.first_name,
            &record.last_name,
            &record.employer,
            &record.company,
            &record.status,
        ]
        .into_iter()
        .map(|text| table_cell(text))
        .collect();
        for &year in years {
            let amount = record.costs.year(year);
            cells.push(if amount > 0.0 {
                format_currency(amount)
            } else {
                "-".to_string()
            });
        }
        cells.push(format_currency(record.costs.total()));
        let _ = writeln!(output, "| {} |", cells.join(" | "));
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Showing {} of {} users",
        format_count(selected.len() as u64),
        format_count(total_users as u64)
    );

    output
}

pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

pub fn format_currency(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}${}.{cents}", group_thousands(whole))
}

fn format_currency_whole(value: f64) -> String {
    let formatted = format!("{:.0}", value.abs());
    let sign = if value < 0.0 && formatted != "0" { "-" } else { "" };
    format!("{sign}${}", group_thousands(&formatted))
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::aggregate::summarize;
    use crate::config::ReportConfig;
    use crate::filter::listing_metrics;
    use crate::models::{EnrollmentDate, EnrollmentEvent, YearlyCosts};
    use crate::window::DateWindow;

    fn person(id: &str, employer: &str, cost_2025: f64) -> PopulationRecord {
        PopulationRecord {
            user_id: id.to_string(),
            first_name: "Lee".to_string(),
            last_name: "Chen".to_string(),
            email: "lee@example.com".to_string(),
            employer: employer.to_string(),
            company: "Holding".to_string(),
            status: "Pending".to_string(),
            costs: YearlyCosts {
                by_year: [(2024, 0.0), (2025, cost_2025)].into_iter().collect(),
            },
        }
    }

    fn scenario() -> SummaryTable {
        let population = vec![
            person("1", "Acme", 0.0),
            person("2", "Acme", 0.0),
            person("3", "Globex", 0.0),
        ];
        let events = vec![
            EnrollmentEvent {
                user_id: "1".to_string(),
                employer: "Acme".to_string(),
                date: EnrollmentDate::Known(chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()),
                cost: 0.0,
            },
            EnrollmentEvent {
                user_id: "9".to_string(),
                employer: "Initech".to_string(),
                date: EnrollmentDate::Unparseable,
                cost: 0.0,
            },
        ];
        let config = ReportConfig {
            windows: vec![DateWindow::month(2026, 1)],
            target_fraction: 0.30,
            include_costs: false,
            include_percentages: true,
        };
        summarize(&population, &events, &config)
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(1234567), "1,234,567");
        assert_eq!(format_currency(1234.5), "$1,234.50");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_percent(100.0 / 3.0), "33.3%");
        assert_eq!(format_percent(0.0), "0.0%");
        assert_eq!(format_currency_whole(2500.4), "$2,500");
    }

    #[test]
    fn headline_uses_total_row() {
        let metrics = headline_metrics(&scenario());
        assert_eq!(metrics.employers, 2);
        assert_eq!(metrics.population, 3);
        assert_eq!(metrics.target, 2);
        assert_eq!(metrics.enrolled.len(), 1);
        assert_eq!(format_percent(metrics.enrolled[0].2), "33.3%");
    }

    #[test]
    fn summary_report_renders_rows_total_and_data_quality() {
        let fetched_at = Utc.with_ymd_and_hms(2026, 1, 20, 9, 30, 0).unwrap();
        let report = build_summary_report(&scenario(), fetched_at);

        assert!(report.contains("Data fetched 2026-01-20 09:30 UTC"));
        assert!(report.contains("| Employer | HCU | Target | Enrolled 2026-01 | % 2026-01 |"));
        assert!(report.contains("| Acme | 2 | 1 | 1 | 50.0% |"));
        assert!(report.contains("| Globex | 1 | 1 | 0 | 0.0% |"));
        assert!(report.contains("| TOTAL | 3 | 2 | 1 | 33.3% |"));
        assert!(report.contains("- Initech: 1 enrollment events with no population rows"));
        assert!(report.contains("- 1 enrollment events with unreadable dates"));
    }

    #[test]
    fn listing_shows_dash_for_zero_year_cost() {
        let records = vec![person("1", "Acme", 1500.0)];
        let selected: Vec<&PopulationRecord> = records.iter().collect();
        let metrics = listing_metrics(&selected, &[2024, 2025]);
        let listing = build_user_listing(&selected, 4, &[2024, 2025], &metrics);

        assert!(listing.contains("| 1 | lee@example.com | Lee | Chen | Acme | Holding | Pending | - | $1,500.00 | $1,500.00 |"));
        assert!(listing.contains("- Avg claim cost 2025: $1,500"));
        assert!(listing.contains("Showing 1 of 4 users"));
    }

    #[test]
    fn pipes_in_text_cells_are_escaped() {
        let mut record = person("1", "Smith | Sons", 0.0);
        record.last_name = "Chen|Wu".to_string();
        let records = vec![record];
        let selected: Vec<&PopulationRecord> = records.iter().collect();
        let metrics = listing_metrics(&selected, &[2025]);
        let listing = build_user_listing(&selected, 1, &[2025], &metrics);
        assert!(listing.contains("| Lee | Chen\\|Wu | Smith \\| Sons | Holding |"));

        let config = ReportConfig {
            windows: vec![DateWindow::year(2026)],
            target_fraction: 0.30,
            include_costs: false,
            include_percentages: false,
        };
        let table = summarize(&records, &[], &config);
        let report = build_summary_report(&table, Utc.with_ymd_and_hms(2026, 1, 20, 9, 30, 0).unwrap());
        assert!(report.contains("| Smith \\| Sons | 1 | 1 | 0 |"));
    }
}
