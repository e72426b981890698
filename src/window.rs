use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// A named calendar window: a whole year, or one month of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub name: String,
    pub year: i32,
    pub month: Option<u32>,
}

impl DateWindow {
    pub fn year(year: i32) -> Self {
        Self {
            name: year.to_string(),
            year,
            month: None,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            name: format!("{year}-{month:02}"),
            year,
            month: Some(month),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && self.month.map_or(true, |month| date.month() == month)
    }
}

/// Accepts `2026`, `2026-01` and `label=2026-01`.
impl FromStr for DateWindow {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Window(value.to_string());
        let (label, period) = match value.split_once('=') {
            Some((label, period)) => (Some(label.trim()), period.trim()),
            None => (None, value.trim()),
        };

        let mut window = match period.split_once('-') {
            Some((year, month)) => {
                let year = year.parse::<i32>().map_err(|_| invalid())?;
                let month = month.parse::<u32>().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                DateWindow::month(year, month)
            }
            None => DateWindow::year(period.parse::<i32>().map_err(|_| invalid())?),
        };

        if let Some(label) = label {
            if label.is_empty() {
                return Err(invalid());
            }
            window.name = label.to_string();
        }

        Ok(window)
    }
}

impl<'de> Deserialize<'de> for DateWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
