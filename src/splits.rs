use std::collections::HashSet;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::{
    config::SplitConfig,
    error::{Result, SurvivalError},
};

/// train/test identifiers for one cross-validation fold
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSplit {
    pub fold: usize,
    pub train_ids: Vec<String>,
    pub test_ids: Vec<String>,
}

impl FoldSplit {
    /// Build a split, refusing partitions that share a subject
    pub fn new(fold: usize, train_ids: Vec<String>, test_ids: Vec<String>) -> Result<Self> {
        let train: HashSet<&str> = train_ids.iter().map(String::as_str).collect();
        if let Some(shared) = test_ids.iter().find(|id| train.contains(id.as_str())) {
            return Err(SurvivalError::invalid_survival_data(format!(
                "fold {}: subject '{}' is in both train and test",
                fold, shared
            )));
        }

        Ok(Self {
            fold,
            train_ids,
            test_ids,
        })
    }
}

/// Read `dir/<pattern with k>`. The train and test columns may differ in
/// length, so blank cells are skipped.
pub fn load_split(dir: impl AsRef<Path>, fold: usize, config: &SplitConfig) -> Result<FoldSplit> {
    let path = dir.as_ref().join(config.file_name(fold));
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(&path)?;

    let headers = reader.headers()?.clone();
    let position = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SurvivalError::missing_column(name, &path))
    };
    let train_col = position(config.train_column.as_str())?;
    let test_col = position(config.test_column.as_str())?;

    let mut train_ids = Vec::new();
    let mut test_ids = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(id) = row.get(train_col).filter(|s| !s.is_empty()) {
            train_ids.push(id.to_string());
        }
        if let Some(id) = row.get(test_col).filter(|s| !s.is_empty()) {
            test_ids.push(id.to_string());
        }
    }

    FoldSplit::new(fold, train_ids, test_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_uneven_columns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("splits_2.csv"),
            ",train,val,test\n0,a,,d\n1,b,,e\n2,c,,\n",
        )
        .unwrap();

        let split = load_split(dir.path(), 2, &SplitConfig::default()).unwrap();
        assert_eq!(split.fold, 2);
        assert_eq!(split.train_ids, vec!["a", "b", "c"]);
        assert_eq!(split.test_ids, vec!["d", "e"]);
    }

    #[test]
    fn test_overlap_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("splits_0.csv"), "train,test\na,b\nb,c\n").unwrap();
        assert!(load_split(dir.path(), 0, &SplitConfig::default()).is_err());
    }

    #[test]
    fn test_missing_file_and_column() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_split(dir.path(), 0, &SplitConfig::default()).is_err());

        fs::write(dir.path().join("splits_0.csv"), "train,holdout\na,b\n").unwrap();
        let err = load_split(dir.path(), 0, &SplitConfig::default()).unwrap_err();
        assert!(matches!(err, SurvivalError::MissingColumn { .. }));
    }
}
