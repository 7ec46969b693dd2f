//! Runs the whole baseline on a synthetic cohort and writes the report files.
//!
//! usage: cargo run --example baseline_report [output_dir] [config.toml]

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use survival_baselines::{
    PipelineConfig, SubjectTable, baseline_model_from_config, c_index_from_risk, get_hazard_with_alpha, plot_km,
    plot_km_tri,
};

const N_SUBJECTS: usize = 300;

/// subject table w/ two covariates, a few missing cells, exponential event times
fn write_cohort(path: &Path, config: &PipelineConfig) -> std::io::Result<()> {
    let mut rng = StdRng::seed_from_u64(2024);
    let columns = &config.columns;
    let mut text = format!(
        "{},{},{},{}\n",
        columns.id,
        columns.event,
        columns.time,
        columns.covariates.join(",")
    );

    for i in 0..N_SUBJECTS {
        let covariates: Vec<f64> = (0..columns.covariates.len()).map(|_| rng.gen_range(-1.5..1.5)).collect();
        let linear_pred: f64 = covariates.iter().enumerate().map(|(j, x)| x / (j + 1) as f64).sum();
        let event_time = -rng.gen_range(1e-6..1.0f64).ln() / (0.15 * linear_pred.exp());
        let censor_time: f64 = rng.gen_range(2.0..20.0);
        let (time, event) = if event_time < censor_time { (event_time, 1) } else { (censor_time, 0) };

        let cells: Vec<String> = covariates
            .iter()
            .enumerate()
            .map(|(j, x)| if (i + j) % 41 == 0 { "NA".to_string() } else { format!("{:.4}", x) })
            .collect();
        text.push_str(&format!("S{:04},{},{:.4},{}\n", i, event, time, cells.join(",")));
    }
    fs::write(path, text)
}

/// round-robin folds, one file per fold
fn write_splits(dir: &Path, config: &PipelineConfig) -> std::io::Result<()> {
    for fold in 0..config.folds {
        let (test, train): (Vec<usize>, Vec<usize>) = (0..N_SUBJECTS).partition(|i| i % config.folds == fold);
        let mut text = format!("{},{}\n", config.splits.train_column, config.splits.test_column);
        let cell = |ids: &[usize], row: usize| ids.get(row).map(|i| format!("S{:04}", i)).unwrap_or_default();
        for row in 0..train.len().max(test.len()) {
            text.push_str(&format!("{},{}\n", cell(&train, row), cell(&test, row)));
        }
        fs::write(dir.join(config.splits.file_name(fold)), text)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let out_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("baseline_report"));
    let mut config = match args.next() {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };

    // synthetic splits only ever go under the output directory
    let splits_dir = out_dir.join("splits");
    if let Some(configured) = config.splits_dir.replace(splits_dir.clone()) {
        warn!(
            "ignoring configured splits_dir {}, writing synthetic splits to {}",
            configured.display(),
            splits_dir.display()
        );
    }
    fs::create_dir_all(&splits_dir)?;

    let table_path = out_dir.join("cohort.csv");
    write_cohort(&table_path, &config)?;
    write_splits(&splits_dir, &config)?;

    let table = SubjectTable::from_csv(&table_path, &config.columns)?;
    let results = baseline_model_from_config(&table, &config)?;
    results.write_csv(out_dir.join("results.csv"))?;

    let risks = results.predicted_hazards();
    let c_index = c_index_from_risk(risks.view(), &results.events(), results.times().view())?;
    println!("pooled test subjects: {}", results.len());
    println!("concordance index: {:.3}", c_index);

    let low = results.rows().iter().filter(|r| r.low_risk).count();
    if low > 0 && low < results.len() {
        let hazard = get_hazard_with_alpha(&results, config.model.alpha)?;
        println!("{}", hazard);
        plot_km(&results, config.model.alpha, out_dir.join("km.svg"))?;
    }
    plot_km_tri(&results, "risk_group", out_dir.join("km_tri.svg"))?;

    // refit on everything to show what the covariates do
    let everyone = table.join(&table.records().iter().map(|r| r.id.clone()).collect::<Vec<_>>())?;
    let mut model = survival_baselines::CoxModel::new()
        .with_penalizer(config.model.penalizer)
        .with_ties(config.model.ties)
        .with_feature_names(table.covariate_names().to_vec());
    model.fit(&everyone.data)?;
    model.summary()?.print();

    info!("report written to {}", out_dir.display());
    Ok(())
}
