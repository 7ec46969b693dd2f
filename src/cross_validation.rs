use std::path::Path;

use log::{info, warn};

use crate::{
    config::{PipelineConfig, StratificationMode},
    error::{Result, SurvivalError},
    results::{FoldSummary, ResultsTable},
    splits::load_split,
    stratify::{fit_model, fit_model_tertiles},
    table::SubjectTable,
};

/// Run `k` folds from `splits_dir` against `table` and pool the scored test
/// subjects in fold order.
pub fn baseline_model(
    k: usize,
    splits_dir: impl AsRef<Path>,
    table: &SubjectTable,
    config: &PipelineConfig,
) -> Result<ResultsTable> {
    if k == 0 {
        return Err(SurvivalError::invalid_parameter("k", "0"));
    }
    config.validate()?;
    if table.is_empty() {
        return Err(SurvivalError::invalid_survival_data("subject table has no rows"));
    }
    if table.covariate_names() != config.columns.covariates.as_slice() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "subject table covariates {:?} differ from configured {:?}",
            table.covariate_names(),
            config.columns.covariates
        )));
    }

    let splits_dir = splits_dir.as_ref();
    let mut results = ResultsTable::new(table.covariate_names().to_vec());

    for fold in 0..k {
        let split = load_split(splits_dir, fold, &config.splits)?;
        let train = table.join(&split.train_ids)?;
        let test = table.join(&split.test_ids)?;

        let dropped = train.n_incomplete + test.n_incomplete;
        if dropped > 0 {
            warn!("fold {}: dropped {} rows with missing values", fold, dropped);
        }
        info!(
            "fold {}: train: ({}, {}), test: ({}, {})",
            fold,
            train.data.n_samples(),
            train.data.n_features() + 2,
            test.data.n_samples(),
            test.data.n_features() + 2
        );

        let result = match config.stratification.mode {
            StratificationMode::Binary => fit_model(
                &train.data,
                &test.data,
                &test.ids,
                fold,
                &config.model,
                config.stratification.lowrisk_percentile,
            )?,
            StratificationMode::Tertile => {
                fit_model_tertiles(&train.data, &test.data, &test.ids, fold, &config.model)?
            }
        };

        let summary = FoldSummary {
            fold,
            n_train: train.data.n_samples(),
            n_test: test.data.n_samples(),
            n_train_dropped: train.n_unmatched + train.n_incomplete,
            n_test_dropped: test.n_unmatched + test.n_incomplete,
            threshold: result.threshold,
        };
        results.push_fold(summary, result.rows)?;
    }

    info!("pooled {} test subjects over {} folds", results.len(), k);
    Ok(results)
}

/// [`baseline_model`] over `config.folds` folds read from `config.splits_dir`
pub fn baseline_model_from_config(table: &SubjectTable, config: &PipelineConfig) -> Result<ResultsTable> {
    let splits_dir = config
        .splits_dir
        .as_deref()
        .ok_or_else(|| SurvivalError::invalid_parameter("splits_dir", "unset"))?;
    baseline_model(config.folds, splits_dir, table, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SubjectRecord;
    use std::fs;

    fn table(n: usize) -> SubjectTable {
        let records = (0..n)
            .map(|i| {
                let x = i as f64 / n as f64;
                SubjectRecord {
                    id: i.to_string(),
                    event: Some(i % 3 != 0),
                    time: Some(1.0 + ((i * 7) % n) as f64 / 4.0),
                    covariates: vec![Some(x), if i == 5 { None } else { Some((i % 4) as f64) }],
                }
            })
            .collect();
        SubjectTable::new(vec!["rop".into(), "rpp".into()], records).unwrap()
    }

    fn write_splits(dir: &Path, n: usize, k: usize) {
        for fold in 0..k {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|i| i % k == fold);
            let mut text = String::from("train,test\n");
            for row in 0..train.len().max(test.len()) {
                let cell = |v: &Vec<usize>| v.get(row).map(|i| i.to_string()).unwrap_or_default();
                text.push_str(&format!("{},{}\n", cell(&train), cell(&test)));
            }
            fs::write(dir.join(format!("splits_{}.csv", fold)), text).unwrap();
        }
    }

    #[test]
    fn test_pooled_rows_match_fold_sizes() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path(), 60, 3);
        let results = baseline_model(3, dir.path(), &table(60), &PipelineConfig::default()).unwrap();

        // subject 5 has a missing covariate and sits in fold 2's test set
        assert_eq!(results.len(), 59);
        assert_eq!(results.folds().iter().map(|f| f.n_test).sum::<usize>(), 59);
        assert_eq!(results.folds()[2].n_test_dropped, 1);
        assert!(results.rows().windows(2).all(|w| w[0].fold <= w[1].fold));
    }

    #[test]
    fn test_zero_folds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = baseline_model(0, dir.path(), &table(10), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, SurvivalError::InvalidParameter { .. }));
    }

    #[test]
    fn test_empty_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path(), 30, 2);
        let empty = SubjectTable::new(vec!["rop".into(), "rpp".into()], vec![]).unwrap();
        assert!(empty.is_empty());
        let err = baseline_model(2, dir.path(), &empty, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, SurvivalError::InvalidSurvivalData { .. }));
    }

    #[test]
    fn test_config_supplies_folds_and_splits_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path(), 60, 3);
        let table = table(60);

        let unset = PipelineConfig { folds: 3, ..Default::default() };
        let err = baseline_model_from_config(&table, &unset).unwrap_err();
        assert!(matches!(err, SurvivalError::InvalidParameter { .. }));

        let config = PipelineConfig {
            folds: 3,
            splits_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let from_config = baseline_model_from_config(&table, &config).unwrap();
        let direct = baseline_model(3, dir.path(), &table, &config).unwrap();
        assert_eq!(from_config.folds().len(), 3);
        assert_eq!(from_config.predicted_hazards(), direct.predicted_hazards());
    }

    #[test]
    fn test_missing_split_file_propagates() {
        let dir = tempfile::tempdir().unwrap();
        write_splits(dir.path(), 30, 2);
        assert!(baseline_model(3, dir.path(), &table(30), &PipelineConfig::default()).is_err());
    }
}
