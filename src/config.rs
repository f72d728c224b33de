//! Runtime configuration read from the process environment.
//! Defaults match the Kaggle plant export file names and the public Open-Meteo endpoints.

use crate::client::{DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL};
use crate::forest::ForestParams;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GENERATION_CSV: &str = "Plant_1_Generation_Data.csv";
pub const DEFAULT_WEATHER_CSV: &str = "Plant_1_Weather_Sensor_Data.csv";
pub const DEFAULT_MODEL_PATH: &str = "solar_model.bin";
pub const DEFAULT_TREES: usize = 100;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_CITY: &str = "Pune";

#[derive(Debug, Error, PartialEq)]
#[error("{name}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub generation_csv: PathBuf,
    pub weather_csv: PathBuf,
    pub model_path: PathBuf,
    /// Tree count and seed; the seed also drives the train/test shuffle.
    pub forest: ForestParams,
    pub test_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub model_path: PathBuf,
    pub geocoding_url: String,
    pub forecast_url: String,
    /// `None` keeps requests unbounded.
    pub http_timeout: Option<Duration>,
    pub default_city: String,
}

impl TrainerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let n_estimators: usize = parse_or(&lookup, "FOREST_TREES", DEFAULT_TREES)?;
        if n_estimators == 0 {
            return Err(invalid("FOREST_TREES", "0", "at least one tree is required"));
        }
        let seed: u64 = parse_or(&lookup, "RANDOM_SEED", DEFAULT_SEED)?;
        let test_fraction: f64 = parse_or(&lookup, "TEST_FRACTION", DEFAULT_TEST_FRACTION)?;
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(invalid(
                "TEST_FRACTION",
                &test_fraction.to_string(),
                "must be strictly between 0 and 1",
            ));
        }

        Ok(TrainerConfig {
            generation_csv: path_or(&lookup, "GENERATION_CSV", DEFAULT_GENERATION_CSV),
            weather_csv: path_or(&lookup, "WEATHER_CSV", DEFAULT_WEATHER_CSV),
            model_path: path_or(&lookup, "MODEL_PATH", DEFAULT_MODEL_PATH),
            forest: ForestParams {
                n_estimators,
                seed,
                ..ForestParams::default()
            },
            test_fraction,
        })
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let http_timeout = match non_empty(&lookup, "HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .parse::<u64>()
                    .map_err(|e| invalid("HTTP_TIMEOUT_SECS", &raw, &e.to_string()))?;
                if secs == 0 {
                    return Err(invalid("HTTP_TIMEOUT_SECS", &raw, "leave unset to disable the timeout"));
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(DashboardConfig {
            model_path: path_or(&lookup, "MODEL_PATH", DEFAULT_MODEL_PATH),
            geocoding_url: non_empty(&lookup, "GEOCODING_URL").unwrap_or_else(|| DEFAULT_GEOCODING_URL.to_string()),
            forecast_url: non_empty(&lookup, "FORECAST_URL").unwrap_or_else(|| DEFAULT_FORECAST_URL.to_string()),
            http_timeout,
            default_city: non_empty(&lookup, "DEFAULT_CITY").unwrap_or_else(|| DEFAULT_CITY.to_string()),
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn path_or(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> PathBuf {
    PathBuf::from(non_empty(lookup, name).unwrap_or_else(|| default.to_string()))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|e| invalid(name, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
