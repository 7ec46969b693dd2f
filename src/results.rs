use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use csv::Writer;
use log::info;
use ndarray::{Array1, Array2};

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
    stratify::RiskThreshold,
};

/// Name under which the built-in risk group is exposed as a label column
pub const RISK_GROUP_COLUMN: &str = "risk_group";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskGroup {
    Low,
    Medium,
    High,
}

impl RiskGroup {
    pub const ALL: [RiskGroup; 3] = [RiskGroup::Low, RiskGroup::Medium, RiskGroup::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskGroup::Low => "low",
            RiskGroup::Medium => "medium",
            RiskGroup::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == label)
    }
}

impl fmt::Display for RiskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test subject after scoring
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSubject {
    pub id: String,
    pub fold: usize,
    pub time: f64,
    pub event: bool,
    pub covariates: Vec<f64>,
    pub predicted_hazard: f64,
    pub low_risk: bool,
    pub risk_group: RiskGroup,
}

/// Per-fold bookkeeping kept next to the pooled rows
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSummary {
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub n_train_dropped: usize, // missing values or absent from the table
    pub n_test_dropped: usize,
    pub threshold: RiskThreshold,
}

/// Scored test subjects pooled across folds
#[derive(Debug, Clone, Default)]
pub struct ResultsTable {
    covariate_names: Vec<String>,
    rows: Vec<ScoredSubject>,
    folds: Vec<FoldSummary>,
    extra_labels: BTreeMap<String, Vec<String>>,
}

impl ResultsTable {
    pub fn new(covariate_names: Vec<String>) -> Self {
        Self {
            covariate_names,
            ..Default::default()
        }
    }

    pub fn from_rows(covariate_names: Vec<String>, rows: Vec<ScoredSubject>) -> Result<Self> {
        let mut table = Self::new(covariate_names);
        table.extend_rows(rows)?;
        Ok(table)
    }

    fn extend_rows(&mut self, rows: Vec<ScoredSubject>) -> Result<()> {
        if !self.extra_labels.is_empty() {
            return Err(SurvivalError::invalid_dimensions(
                "can't append rows once label columns are attached",
            ));
        }
        if let Some(row) = rows.iter().find(|r| r.covariates.len() != self.covariate_names.len()) {
            return Err(SurvivalError::invalid_dimensions(format!(
                "row '{}' has {} covariates, table has {}",
                row.id,
                row.covariates.len(),
                self.covariate_names.len()
            )));
        }
        self.rows.extend(rows);
        Ok(())
    }

    /// concatenate one fold's test rows, keeping the schema
    pub fn push_fold(&mut self, summary: FoldSummary, rows: Vec<ScoredSubject>) -> Result<()> {
        if rows.len() != summary.n_test {
            return Err(SurvivalError::invalid_dimensions(format!(
                "fold {} reports {} test rows but carries {}",
                summary.fold,
                summary.n_test,
                rows.len()
            )));
        }
        self.extend_rows(rows)?;
        self.folds.push(summary);
        Ok(())
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn rows(&self) -> &[ScoredSubject] {
        &self.rows
    }

    pub fn folds(&self) -> &[FoldSummary] {
        &self.folds
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn times(&self) -> Array1<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    pub fn events(&self) -> Vec<bool> {
        self.rows.iter().map(|r| r.event).collect()
    }

    pub fn predicted_hazards(&self) -> Array1<f64> {
        self.rows.iter().map(|r| r.predicted_hazard).collect()
    }

    /// outcomes with the low-risk flag as the only covariate (1.0 = low risk)
    pub fn low_risk_data(&self) -> Result<SurvivalData> {
        let indicator: Vec<f64> = self.rows.iter().map(|r| if r.low_risk { 1.0 } else { 0.0 }).collect();
        let covariates = Array2::from_shape_vec((self.rows.len(), 1), indicator)
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;
        SurvivalData::new(self.times().to_vec(), self.events(), covariates)
    }

    /// attach an extra categorical column, one value per row
    pub fn add_label_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        let name = name.into();
        if name == RISK_GROUP_COLUMN {
            return Err(SurvivalError::invalid_parameter("label column", name));
        }
        if values.len() != self.rows.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "label column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.extra_labels.insert(name, values);
        Ok(())
    }

    /// values of a label column; `risk_group` is always available
    pub fn labels(&self, column: &str) -> Result<Vec<String>> {
        if column == RISK_GROUP_COLUMN {
            return Ok(self.rows.iter().map(|r| r.risk_group.to_string()).collect());
        }
        self.extra_labels
            .get(column)
            .cloned()
            .ok_or_else(|| SurvivalError::invalid_parameter("label column", column))
    }

    /// row indices whose `column` value equals `value`
    pub fn indices_where(&self, column: &str, value: &str) -> Result<Vec<usize>> {
        Ok(self
            .labels(column)?
            .iter()
            .enumerate()
            .filter(|(_, label)| label.as_str() == value)
            .map(|(i, _)| i)
            .collect())
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = Writer::from_path(path)?;

        let mut header: Vec<String> = vec!["id".into(), "fold".into(), "time_to_event".into(), "event".into()];
        header.extend(self.covariate_names.iter().cloned());
        header.extend(["predicted_hazard".to_string(), "lowrisk".to_string(), RISK_GROUP_COLUMN.to_string()]);
        header.extend(self.extra_labels.keys().cloned());
        writer.write_record(&header)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record = vec![
                row.id.clone(),
                row.fold.to_string(),
                row.time.to_string(),
                u8::from(row.event).to_string(),
            ];
            record.extend(row.covariates.iter().map(|x| x.to_string()));
            record.push(row.predicted_hazard.to_string());
            record.push(row.low_risk.to_string());
            record.push(row.risk_group.to_string());
            record.extend(self.extra_labels.values().map(|values| values[i].clone()));
            writer.write_record(&record)?;
        }

        writer.flush().map_err(|e| SurvivalError::io(path, e))?;
        info!("wrote {} scored subjects to {}", self.rows.len(), path.display());
        Ok(())
    }
}
