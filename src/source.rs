use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::error::IngestError;
use crate::models::{RawRow, RawValue};

/// Anything that can hand back the rows of a named worksheet.
#[allow(async_fn_in_trait)]
pub trait RowSource {
    async fn fetch_rows(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError>;
}

/// Directory of CSV exports, one `<sheet>.csv` per worksheet.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        if sheet.contains(['/', '\\']) || sheet.starts_with('.') {
            return Err(IngestError::InvalidSheetName(sheet.to_string()));
        }
        let path = self.dir.join(format!("{sheet}.csv"));
        if !path.exists() {
            return Err(IngestError::SheetNotFound(sheet.to_string()));
        }

        let csv_error = |source: csv::Error| IngestError::Csv {
            path: path.clone(),
            source,
        };
        let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
        let headers = reader.headers().map_err(csv_error)?.clone();
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let row: RawRow = headers
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.trim().to_string(), csv_cell(value)))
                .collect();
            rows.push(row);
        }

        Ok(rows)
    }
}

impl RowSource for CsvSource {
    async fn fetch_rows(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        self.read(sheet)
    }
}

fn csv_cell(value: &str) -> RawValue {
    if value.trim().is_empty() {
        RawValue::Null
    } else {
        RawValue::Text(value.to_string())
    }
}

/// Spreadsheet workbook (`.xlsx`, `.xls`, `.ods`); header row first.
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
}

impl WorkbookSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        let mut workbook = open_workbook_auto(&self.path)?;
        if !workbook.sheet_names().iter().any(|name| name == sheet) {
            return Err(IngestError::SheetNotFound(sheet.to_string()));
        }

        let range = workbook.worksheet_range(sheet)?;
        let mut lines = range.rows();
        let Some(header) = lines.next() else {
            return Ok(Vec::new());
        };
        let headers: Vec<String> = header
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let rows: Vec<RawRow> = lines
            .filter(|line| line.iter().any(|cell| !cell.is_empty()))
            .map(|line| {
                headers
                    .iter()
                    .zip(line.iter())
                    .filter(|(name, _)| !name.is_empty())
                    .map(|(name, cell)| (name.clone(), workbook_cell(cell)))
                    .collect::<RawRow>()
            })
            .collect();

        Ok(rows)
    }
}

impl RowSource for WorkbookSource {
    async fn fetch_rows(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        self.read(sheet)
    }
}

fn workbook_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Null,
        Data::Int(value) => RawValue::Number(*value as f64),
        Data::Float(value) => RawValue::Number(*value),
        Data::Bool(value) => RawValue::Text(value.to_string()),
        Data::String(value) if value.trim().is_empty() => RawValue::Null,
        Data::String(value) => RawValue::Text(value.clone()),
        Data::DateTime(_) => cell
            .as_date()
            .map(RawValue::Date)
            .unwrap_or(RawValue::Null),
        Data::DateTimeIso(value) | Data::DurationIso(value) => RawValue::Text(value.clone()),
    }
}

/// Postgres tables addressed by `table` or `schema.table`.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RowSource for PgSource {
    async fn fetch_rows(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        let table = quoted_table(sheet)?;
        let query = format!("SELECT row_to_json(t)::text AS row FROM {table} t");
        let records = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut rows: Vec<RawRow> = Vec::with_capacity(records.len());

        for record in records {
            let payload: String = record.try_get("row")?;
            let Value::Object(map) = serde_json::from_str::<Value>(&payload)? else {
                continue;
            };
            rows.push(
                map.into_iter()
                    .map(|(name, value)| (name, json_cell(value)))
                    .collect(),
            );
        }

        Ok(rows)
    }
}

/// Validates `name` / `schema.name` and returns it double-quoted.
fn quoted_table(sheet: &str) -> Result<String, IngestError> {
    let invalid = || IngestError::InvalidSheetName(sheet.to_string());
    let parts: Vec<&str> = sheet.split('.').collect();
    if parts.len() > 2 {
        return Err(invalid());
    }

    let mut quoted = Vec::with_capacity(parts.len());
    for part in parts {
        let valid = part
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');
        if !valid {
            return Err(invalid());
        }
        quoted.push(format!("\"{part}\""));
    }
    Ok(quoted.join("."))
}

fn json_cell(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Number(number) => number.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
        Value::String(text) if text.trim().is_empty() => RawValue::Null,
        Value::String(text) => RawValue::Text(text),
        Value::Bool(flag) => RawValue::Text(flag.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

/// The source picked on the command line.
#[derive(Debug, Clone)]
pub enum Source {
    Csv(CsvSource),
    Workbook(WorkbookSource),
    Postgres(PgSource),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::Csv(source) => format!("csv:{}", source.dir.display()),
            Source::Workbook(source) => format!("workbook:{}", source.path.display()),
            Source::Postgres(_) => "postgres".to_string(),
        }
    }
}

impl RowSource for Source {
    async fn fetch_rows(&self, sheet: &str) -> Result<Vec<RawRow>, IngestError> {
        let rows = match self {
            Source::Csv(source) => source.fetch_rows(sheet).await,
            Source::Workbook(source) => source.fetch_rows(sheet).await,
            Source::Postgres(source) => source.fetch_rows(sheet).await,
        }?;
        tracing::debug!(source = %self.describe(), sheet, rows = rows.len(), "fetched rows");
        Ok(rows)
    }
}

pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "xlsx" | "xlsm" | "xls" | "xlsb" | "ods"
            )
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn reads_csv_sheet_with_null_cells() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("High Cost Utilizer.csv"),
            "userId,employerName,claim_cost\nu1,Acme,\"{'2024': 10}\"\nu2,,\n",
        )
        .unwrap();

        let rows = CsvSource::new(dir.path())
            .fetch_rows("High Cost Utilizer")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["employerName"], RawValue::Text("Acme".to_string()));
        assert_eq!(rows[0]["claim_cost"], RawValue::Text("{'2024': 10}".to_string()));
        assert_eq!(rows[1]["employerName"], RawValue::Null);
    }

    #[tokio::test]
    async fn missing_csv_sheet_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvSource::new(dir.path()).fetch_rows("Enrollments").await.unwrap_err();
        assert!(matches!(err, IngestError::SheetNotFound(name) if name == "Enrollments"));
    }

    #[tokio::test]
    async fn csv_sheet_names_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvSource::new(dir.path()).fetch_rows("../secrets").await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidSheetName(_)));
    }

    #[test]
    fn table_identifiers_are_validated_and_quoted() {
        assert_eq!(quoted_table("enrollments").unwrap(), "\"enrollments\"");
        assert_eq!(
            quoted_table("hcu.High Cost Utilizer").unwrap(),
            "\"hcu\".\"High Cost Utilizer\""
        );
        for bad in ["", "a.b.c", "x; DROP TABLE y", "1abc", "a\"b"] {
            assert!(quoted_table(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn json_cells_map_to_raw_values() {
        assert_eq!(json_cell(serde_json::json!(1.5)), RawValue::Number(1.5));
        assert_eq!(json_cell(serde_json::json!("  ")), RawValue::Null);
        assert_eq!(
            json_cell(serde_json::json!({"2024": 10})),
            RawValue::Text("{\"2024\":10}".to_string())
        );
    }

    #[test]
    fn workbook_cells_map_to_raw_values() {
        assert_eq!(workbook_cell(&Data::Int(7)), RawValue::Number(7.0));
        assert_eq!(workbook_cell(&Data::Empty), RawValue::Null);
        assert_eq!(
            workbook_cell(&Data::String("Acme".to_string())),
            RawValue::Text("Acme".to_string())
        );
    }

    #[test]
    fn recognises_workbook_extensions() {
        assert!(is_workbook(Path::new("hcu.XLSX")));
        assert!(is_workbook(Path::new("hcu.ods")));
        assert!(!is_workbook(Path::new("exports")));
    }
}
