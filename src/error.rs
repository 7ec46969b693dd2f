use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

#[derive(Error, Debug)]
pub enum SurvivalError {
    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("optimization blew up: {message}")]
    OptimizationFailed { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },

    #[error("column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("can't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv trouble: {0}")]
    Csv(#[from] csv::Error),

    #[error("config is broken: {0}")]
    Config(#[from] toml::de::Error),

    #[error("plotting failed: {message}")]
    Plot { message: String },
}

impl SurvivalError {
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn optimization_failed(message: impl Into<String>) -> Self {
        Self::OptimizationFailed { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }

    pub fn missing_column(column: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            path: path.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn plot(message: impl Into<String>) -> Self {
        Self::Plot { message: message.into() }
    }
}
