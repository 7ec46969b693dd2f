use std::collections::{HashMap, HashSet};
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use log::{info, warn};
use ndarray::Array2;

use crate::{
    config::ColumnConfig,
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// cells read as missing
const MISSING_TOKENS: &[&str] = &[
    "", "na", "n/a", "#n/a", "nan", "-nan", "null", "none", "<na>",
];

/// One subject as read from the table; `None` marks a missing cell
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRecord {
    pub id: String,
    pub event: Option<bool>,
    pub time: Option<f64>,
    pub covariates: Vec<Option<f64>>,
}

impl SubjectRecord {
    pub fn is_complete(&self) -> bool {
        self.event.is_some() && self.time.is_some() && self.covariates.iter().all(Option::is_some)
    }
}

/// Subjects that made it through a join, ready for fitting
#[derive(Debug, Clone)]
pub struct JoinedSubjects {
    pub ids: Vec<String>,
    pub data: SurvivalData,
    pub n_requested: usize,
    pub n_unmatched: usize,  // ids absent from the table
    pub n_incomplete: usize, // dropped for missing values
}

/// Subject table keyed by identifier
#[derive(Debug, Clone)]
pub struct SubjectTable {
    covariate_names: Vec<String>,
    records: Vec<SubjectRecord>,
    index: HashMap<String, usize>,
}

impl SubjectTable {
    pub fn new(covariate_names: Vec<String>, records: Vec<SubjectRecord>) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.covariates.len() != covariate_names.len() {
                return Err(SurvivalError::invalid_dimensions(format!(
                    "subject '{}' has {} covariates, expected {}",
                    record.id,
                    record.covariates.len(),
                    covariate_names.len()
                )));
            }
            if record.time.is_some_and(|t| t < 0.0) {
                return Err(SurvivalError::invalid_survival_data(format!(
                    "subject '{}' has negative time",
                    record.id
                )));
            }
            if index.insert(record.id.clone(), i).is_some() {
                return Err(SurvivalError::invalid_survival_data(format!(
                    "duplicate subject id '{}'",
                    record.id
                )));
            }
        }

        Ok(Self {
            covariate_names,
            records,
            index,
        })
    }

    /// Read a CSV with a header row. Identifiers stay strings; other columns
    /// beyond the configured ones are ignored.
    pub fn from_csv(path: impl AsRef<Path>, columns: &ColumnConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let position = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SurvivalError::missing_column(name, path))
        };

        let id_col = position(columns.id.as_str())?;
        let event_col = position(columns.event.as_str())?;
        let time_col = position(columns.time.as_str())?;
        let covariate_cols = columns
            .covariates
            .iter()
            .map(|name| position(name.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row?;
            let cell = |col: usize| row.get(col);
            let context = |col: usize| format!("{} row {} column '{}'", path.display(), line + 2, &headers[col]);

            let id = cell(id_col).unwrap_or_default().to_string();
            if id.is_empty() {
                return Err(SurvivalError::invalid_survival_data(context(id_col) + ": empty subject id"));
            }

            let event = parse_event(cell(event_col)).map_err(|e| {
                SurvivalError::invalid_survival_data(format!("{}: {}", context(event_col), e))
            })?;
            let time = parse_number(cell(time_col)).map_err(|e| {
                SurvivalError::invalid_survival_data(format!("{}: {}", context(time_col), e))
            })?;
            let covariates = covariate_cols
                .iter()
                .map(|&col| {
                    parse_number(cell(col)).map_err(|e| {
                        SurvivalError::invalid_survival_data(format!("{}: {}", context(col), e))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            records.push(SubjectRecord {
                id,
                event,
                time,
                covariates,
            });
        }

        info!("loaded {} subjects from {}", records.len(), path.display());
        Self::new(columns.covariates.clone(), records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&SubjectRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Inner join in the order of `ids`, then drop rows with anything missing.
    pub fn join(&self, ids: &[String]) -> Result<JoinedSubjects> {
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(SurvivalError::invalid_survival_data(format!(
                "subject id '{}' listed twice in one split partition",
                dup
            )));
        }

        let mut n_unmatched = 0;
        let mut n_incomplete = 0;
        let mut kept = Vec::new();
        for id in ids {
            match self.get(id) {
                None => n_unmatched += 1,
                Some(record) if !record.is_complete() => n_incomplete += 1,
                Some(record) => kept.push(record),
            }
        }

        if n_unmatched > 0 {
            warn!("{} of {} split ids not found in the subject table", n_unmatched, ids.len());
        }

        let n_features = self.covariate_names.len();
        let mut covariates = Array2::zeros((kept.len(), n_features));
        let mut times = Vec::with_capacity(kept.len());
        let mut events = Vec::with_capacity(kept.len());
        for (i, record) in kept.iter().enumerate() {
            for (j, value) in record.covariates.iter().enumerate() {
                covariates[[i, j]] = value.unwrap_or(f64::NAN);
            }
            times.push(record.time.unwrap_or(f64::NAN));
            events.push(record.event.unwrap_or(false));
        }

        Ok(JoinedSubjects {
            ids: kept.iter().map(|r| r.id.clone()).collect(),
            data: SurvivalData::new(times, events, covariates)?,
            n_requested: ids.len(),
            n_unmatched,
            n_incomplete,
        })
    }
}

fn is_missing(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(s) => MISSING_TOKENS.contains(&s.to_ascii_lowercase().as_str()),
    }
}

fn parse_number(cell: Option<&str>) -> std::result::Result<Option<f64>, String> {
    if is_missing(cell) {
        return Ok(None);
    }
    let text = cell.unwrap_or_default();
    let value: f64 = text.parse().map_err(|_| format!("'{}' is not a number", text))?;
    Ok(if value.is_nan() { None } else { Some(value) })
}

fn parse_event(cell: Option<&str>) -> std::result::Result<Option<bool>, String> {
    if is_missing(cell) {
        return Ok(None);
    }
    let text = cell.unwrap_or_default();
    match text.to_ascii_lowercase().as_str() {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        other => other
            .parse::<f64>()
            .map(|v| Some(v != 0.0))
            .map_err(|_| format!("'{}' is not an event flag", text)),
    }
}
