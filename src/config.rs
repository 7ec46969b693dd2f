//! Pipeline configuration, loadable from TOML.
//!
//! Every field has a default, and `PipelineConfig::default()` is the
//! two-covariate baseline: `slide_id` identifiers, `rop`/`rpp` covariates,
//! ridge penalizer 0.1, median split, five folds.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    error::{Result, SurvivalError},
    optimization::TieMethod,
};

/// Where each field of the subject table lives
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnConfig {
    pub id: String,
    pub event: String,
    pub time: String,
    pub covariates: Vec<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "slide_id".to_string(),
            event: "event".to_string(),
            time: "time_to_event".to_string(),
            covariates: vec!["rop".to_string(), "rpp".to_string()],
        }
    }
}

/// Split file naming and layout
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    /// `{k}` is replaced by the fold index
    pub file_pattern: String,
    pub train_column: String,
    pub test_column: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            file_pattern: "splits_{k}.csv".to_string(),
            train_column: "train".to_string(),
            test_column: "test".to_string(),
        }
    }
}

impl SplitConfig {
    pub fn file_name(&self, fold: usize) -> String {
        self.file_pattern.replace("{k}", &fold.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub penalizer: f64,
    pub ties: TieMethod,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub alpha: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            penalizer: 0.1,
            ties: TieMethod::Efron,
            max_iterations: 500,
            tolerance: 1e-7,
            alpha: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StratificationMode {
    /// low iff score < percentile cutoff
    #[default]
    Binary,
    /// low / medium / high at the training tertiles
    Tertile,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StratificationConfig {
    pub mode: StratificationMode,
    pub lowrisk_percentile: f64,
}

impl Default for StratificationConfig {
    fn default() -> Self {
        Self {
            mode: StratificationMode::Binary,
            lowrisk_percentile: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub folds: usize,
    /// where `baseline_model_from_config` looks for the split files
    pub splits_dir: Option<PathBuf>,
    pub columns: ColumnConfig,
    pub splits: SplitConfig,
    pub model: ModelConfig,
    pub stratification: StratificationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            splits_dir: None,
            columns: ColumnConfig::default(),
            splits: SplitConfig::default(),
            model: ModelConfig::default(),
            stratification: StratificationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SurvivalError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.folds == 0 {
            return Err(SurvivalError::invalid_parameter("folds", "0"));
        }
        let percentile = self.stratification.lowrisk_percentile;
        if !(0.0..=100.0).contains(&percentile) {
            return Err(SurvivalError::invalid_parameter(
                "stratification.lowrisk_percentile",
                percentile.to_string(),
            ));
        }
        if !(self.model.penalizer >= 0.0) {
            return Err(SurvivalError::invalid_parameter(
                "model.penalizer",
                self.model.penalizer.to_string(),
            ));
        }
        if !(self.model.alpha > 0.0 && self.model.alpha < 1.0) {
            return Err(SurvivalError::invalid_parameter("model.alpha", self.model.alpha.to_string()));
        }
        if self.columns.covariates.is_empty() {
            return Err(SurvivalError::invalid_parameter("columns.covariates", "[]"));
        }
        if !self.splits.file_pattern.contains("{k}") {
            return Err(SurvivalError::invalid_parameter(
                "splits.file_pattern",
                self.splits.file_pattern.clone(),
            ));
        }
        Ok(())
    }
}
