use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::window::DateWindow;

/// Column names in the source sheets.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMap {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub employer: String,
    pub company: String,
    pub status: String,
    pub cost: String,
    pub enrollment_date: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            user_id: "userId".to_string(),
            email: "email".to_string(),
            first_name: "firstName".to_string(),
            last_name: "lastName".to_string(),
            employer: "employerName".to_string(),
            company: "companyName".to_string(),
            status: "enrollmentStatus".to_string(),
            cost: "claim_cost".to_string(),
            enrollment_date: "enrollmentDate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub population_sheet: String,
    pub events_sheet: String,
    pub target_fraction: f64,
    /// Empty means the current year and the current month.
    pub windows: Vec<DateWindow>,
    pub cost_years: Vec<i32>,
    pub include_costs: bool,
    pub include_percentages: bool,
    pub freshness_secs: i64,
    pub columns: ColumnMap,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            population_sheet: "High Cost Utilizer".to_string(),
            events_sheet: "Enrollments".to_string(),
            target_fraction: 0.30,
            windows: Vec::new(),
            cost_years: vec![2024, 2025],
            include_costs: true,
            include_percentages: true,
            freshness_secs: 300,
            columns: ColumnMap::default(),
        }
    }
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DashboardConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_fraction > 0.0 && self.target_fraction <= 1.0) {
            return Err(ConfigError::Fraction(self.target_fraction));
        }
        self.freshness()?;
        Ok(())
    }

    /// Maximum age of a cached snapshot.
    pub fn freshness(&self) -> Result<Duration, ConfigError> {
        if self.freshness_secs <= 0 {
            return Err(ConfigError::Freshness(self.freshness_secs));
        }
        Duration::try_seconds(self.freshness_secs).ok_or(ConfigError::Freshness(self.freshness_secs))
    }

    pub fn report_config(&self, today: NaiveDate) -> ReportConfig {
        let windows = if self.windows.is_empty() {
            vec![
                DateWindow::year(today.year()),
                DateWindow::month(today.year(), today.month()),
            ]
        } else {
            self.windows.clone()
        };

        ReportConfig {
            windows,
            target_fraction: self.target_fraction,
            include_costs: self.include_costs,
            include_percentages: self.include_percentages,
        }
    }
}

/// Parameters of one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub windows: Vec<DateWindow>,
    pub target_fraction: f64,
    pub include_costs: bool,
    pub include_percentages: bool,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target_fraction: 0.25\nwindows: [\"2026\", \"Q1 kickoff=2026-01\"]\ncolumns:\n  enrollment_date: enrolledAt"
        )
        .unwrap();

        let config = DashboardConfig::load(file.path()).unwrap();
        assert_eq!(config.target_fraction, 0.25);
        assert_eq!(config.windows[1].name, "Q1 kickoff");
        assert_eq!(config.columns.enrollment_date, "enrolledAt");
        assert_eq!(config.columns.employer, "employerName");
        assert_eq!(config.cost_years, vec![2024, 2025]);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_fraction: 1.5").unwrap();
        assert!(matches!(
            DashboardConfig::load(file.path()),
            Err(ConfigError::Fraction(_))
        ));
    }

    #[test]
    fn rejects_unusable_freshness_window() {
        for value in ["0", "-30", "9223372036854775807"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "freshness_secs: {value}").unwrap();
            assert!(
                matches!(
                    DashboardConfig::load(file.path()),
                    Err(ConfigError::Freshness(_))
                ),
                "freshness_secs {value} should be rejected"
            );
        }

        let config = DashboardConfig::default();
        assert_eq!(config.freshness().unwrap(), Duration::seconds(300));
    }

    #[test]
    fn rejects_bad_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "windows: [\"2026-13\"]").unwrap();
        assert!(matches!(
            DashboardConfig::load(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn empty_windows_default_to_current_period() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let report = DashboardConfig::default().report_config(today);
        assert_eq!(
            report.windows,
            vec![DateWindow::year(2026), DateWindow::month(2026, 3)]
        );
    }
}
