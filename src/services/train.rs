use crate::artifact::{self, ArtifactError, FEATURE_NAMES, ModelArtifact};
use crate::config::TrainerConfig;
use crate::dataset::{self, DatasetError, TrainingRow};
use crate::forest::{self, Evaluation, ForestError, ForestParams, RandomForestRegressor};
use crate::models::plant::{GenerationRecord, WeatherRecord};
use log::{info, warn};
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("training failed: {0}")]
    Forest(#[from] ForestError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Row counts at each stage, plus hold-out scores when the test set was usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    pub generation_timestamps: usize,
    pub weather_timestamps: usize,
    pub merged_rows: usize,
    pub daylight_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub evaluation: Option<Evaluation>,
}

/// Load both exports, fit the forest and write the artifact.
pub fn run(cfg: &TrainerConfig) -> Result<TrainingSummary, TrainError> {
    // Check both inputs up front so a missing second file fails before any parsing work.
    for path in [&cfg.generation_csv, &cfg.weather_csv] {
        if !path.is_file() {
            return Err(DatasetError::Missing { path: path.clone() }.into());
        }
    }

    info!("Loading datasets");
    let generation = dataset::load_generation(&cfg.generation_csv)?;
    let weather = dataset::load_weather(&cfg.weather_csv)?;
    info!(
        "Read {} generation row(s) from {} and {} weather row(s) from {}",
        generation.len(),
        cfg.generation_csv.display(),
        weather.len(),
        cfg.weather_csv.display()
    );

    let (artifact, summary) = build_model(&generation, &weather, &cfg.forest, cfg.test_fraction)?;
    artifact::save(&cfg.model_path, &artifact)?;
    Ok(summary)
}

/// Aggregate, join, filter, split and fit. Pure apart from logging.
pub fn build_model(
    generation: &[GenerationRecord],
    weather: &[WeatherRecord],
    params: &ForestParams,
    test_fraction: f64,
) -> Result<(ModelArtifact, TrainingSummary), TrainError> {
    let generation_totals = dataset::aggregate_generation(generation);
    let weather_means = dataset::aggregate_weather(weather);
    let merged = dataset::merge(&generation_totals, &weather_means);
    let rows = dataset::daylight_rows(&merged);
    info!(
        "Merged {} generation and {} weather timestamp(s) into {} row(s); {} with daylight",
        generation_totals.len(),
        weather_means.len(),
        merged.len(),
        rows.len()
    );

    let (train, test) = dataset::train_test_split(&rows, test_fraction, params.seed)?;
    info!(
        "Training forest: {} tree(s), {} training row(s), {} test row(s)",
        params.n_estimators,
        train.len(),
        test.len()
    );

    let (x_train, y_train) = to_matrix(&train);
    let mut model = RandomForestRegressor::new(*params);
    model.fit(&x_train, &y_train)?;
    let trees = model.trees();
    info!(
        "Forest fitted: max depth {}, {} leaves in total",
        trees.iter().map(|t| t.depth()).max().unwrap_or(0),
        trees.iter().map(|t| t.n_leaves()).sum::<usize>()
    );

    let (x_test, y_test) = to_matrix(&test);
    let evaluation = forest::evaluate(&model.predict(&x_test)?, &y_test);
    match evaluation {
        Some(e) => info!("Hold-out scores: r2={:.4} mae={:.2} rmse={:.2}", e.r2, e.mae, e.rmse),
        None => warn!("Hold-out set is empty; skipping evaluation"),
    }

    let summary = TrainingSummary {
        generation_timestamps: generation_totals.len(),
        weather_timestamps: weather_means.len(),
        merged_rows: merged.len(),
        daylight_rows: rows.len(),
        train_rows: train.len(),
        test_rows: test.len(),
        evaluation,
    };
    Ok((ModelArtifact::new(model, train.len(), test.len()), summary))
}

/// Feature matrix in [`FEATURE_NAMES`] column order, plus the DC power targets.
fn to_matrix(rows: &[TrainingRow]) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((rows.len(), FEATURE_NAMES.len()), |(i, j)| rows[i].features.values()[j]);
    let y = rows.iter().map(|r| r.dc_power).collect();
    (x, y)
}
