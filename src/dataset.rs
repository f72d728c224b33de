//! Trainer input: reading the two plant exports and turning them into training rows.

use crate::artifact::FeatureVector;
use crate::models::plant::{GenerationRecord, WeatherRecord};
use chrono::NaiveDateTime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("input file {} not found; put both plant CSV files in place before training", path.display())]
    Missing { path: PathBuf },
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("need at least 2 daylight rows to split into train and test sets, got {rows}")]
    NotEnoughRows { rows: usize },
    #[error("test fraction must be between 0 and 1, got {0}")]
    InvalidTestFraction(f64),
}

/// Per-timestamp sums over all inverters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationTotals {
    pub dc_power: f64,
    pub ac_power: f64,
    pub daily_yield: f64,
    pub total_yield: f64,
}

/// Per-timestamp means over all weather sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherMeans {
    pub ambient_temperature: f64,
    pub module_temperature: f64,
    pub irradiation: f64,
}

/// One timestamp present in both aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedRow {
    pub timestamp: NaiveDateTime,
    pub dc_power: f64,
    pub weather: WeatherMeans,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRow {
    pub features: FeatureVector,
    pub dc_power: f64,
}

pub fn load_generation(path: &Path) -> Result<Vec<GenerationRecord>, DatasetError> {
    read_csv(path)
}

pub fn load_weather(path: &Path) -> Result<Vec<WeatherRecord>, DatasetError> {
    read_csv(path)
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DatasetError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DatasetError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(DatasetError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_csv(file).map_err(|source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Deserialize every row; the first malformed row aborts with its position.
pub fn parse_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect()
}

pub fn aggregate_generation(records: &[GenerationRecord]) -> BTreeMap<NaiveDateTime, GenerationTotals> {
    let mut out: BTreeMap<NaiveDateTime, GenerationTotals> = BTreeMap::new();
    for r in records {
        let t = out.entry(r.timestamp).or_default();
        t.dc_power += r.dc_power;
        t.ac_power += r.ac_power.unwrap_or(0.0);
        t.daily_yield += r.daily_yield.unwrap_or(0.0);
        t.total_yield += r.total_yield.unwrap_or(0.0);
    }
    out
}

pub fn aggregate_weather(records: &[WeatherRecord]) -> BTreeMap<NaiveDateTime, WeatherMeans> {
    let mut sums: BTreeMap<NaiveDateTime, ([f64; 3], usize)> = BTreeMap::new();
    for r in records {
        let (acc, n) = sums.entry(r.timestamp).or_insert(([0.0; 3], 0));
        acc[0] += r.ambient_temperature;
        acc[1] += r.module_temperature;
        acc[2] += r.irradiation;
        *n += 1;
    }
    sums.into_iter()
        .map(|(ts, (acc, n))| {
            let n = n as f64;
            (
                ts,
                WeatherMeans {
                    ambient_temperature: acc[0] / n,
                    module_temperature: acc[1] / n,
                    irradiation: acc[2] / n,
                },
            )
        })
        .collect()
}

/// Inner join on exact timestamp equality, ordered by timestamp.
pub fn merge(
    generation: &BTreeMap<NaiveDateTime, GenerationTotals>,
    weather: &BTreeMap<NaiveDateTime, WeatherMeans>,
) -> Vec<MergedRow> {
    generation
        .iter()
        .filter_map(|(ts, totals)| {
            weather.get(ts).map(|w| MergedRow {
                timestamp: *ts,
                dc_power: totals.dc_power,
                weather: *w,
            })
        })
        .collect()
}

/// Drops night-time rows (no irradiation) and reshapes the rest into model rows.
pub fn daylight_rows(merged: &[MergedRow]) -> Vec<TrainingRow> {
    merged
        .iter()
        .filter(|row| row.weather.irradiation > 0.0)
        .map(|row| TrainingRow {
            features: FeatureVector {
                irradiation: row.weather.irradiation,
                ambient_temperature: row.weather.ambient_temperature,
                module_temperature: row.weather.module_temperature,
            },
            dc_power: row.dc_power,
        })
        .collect()
}

/// Seeded shuffle, then the first `ceil(n * test_fraction)` rows form the test set.
pub fn train_test_split<T: Clone>(
    rows: &[T],
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), DatasetError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DatasetError::InvalidTestFraction(test_fraction));
    }
    let n = rows.len();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n < 2 || n_test >= n {
        return Err(DatasetError::NotEnoughRows { rows: n });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let test = order[..n_test].iter().map(|&i| rows[i].clone()).collect();
    let train = order[n_test..].iter().map(|&i| rows[i].clone()).collect();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 5, 15).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn gen_row(h: u32, m: u32, dc: f64, ac: Option<f64>) -> GenerationRecord {
        GenerationRecord {
            timestamp: ts(h, m),
            dc_power: dc,
            ac_power: ac,
            daily_yield: None,
            total_yield: None,
        }
    }

    fn weather_row(h: u32, m: u32, amb: f64, module: f64, irr: f64) -> WeatherRecord {
        WeatherRecord {
            timestamp: ts(h, m),
            ambient_temperature: amb,
            module_temperature: module,
            irradiation: irr,
        }
    }

    #[test]
    fn generation_is_summed_per_timestamp() {
        let rows = vec![
            gen_row(12, 0, 100.0, Some(10.0)),
            gen_row(12, 0, 250.0, None),
            gen_row(12, 15, 40.0, Some(4.0)),
        ];
        let agg = aggregate_generation(&rows);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[&ts(12, 0)].dc_power, 350.0);
        assert_eq!(agg[&ts(12, 0)].ac_power, 10.0);
        assert_eq!(agg[&ts(12, 15)].dc_power, 40.0);
    }

    #[test]
    fn weather_is_averaged_per_timestamp() {
        let rows = vec![
            weather_row(12, 0, 30.0, 50.0, 0.8),
            weather_row(12, 0, 32.0, 54.0, 0.6),
            weather_row(12, 15, 31.0, 51.0, 0.7),
        ];
        let agg = aggregate_weather(&rows);
        assert_eq!(agg.len(), 2);
        let noon = agg[&ts(12, 0)];
        assert_eq!(noon.ambient_temperature, 31.0);
        assert_eq!(noon.module_temperature, 52.0);
        assert!((noon.irradiation - 0.7).abs() < 1e-12);
    }

    #[test]
    fn merge_keeps_only_shared_timestamps() {
        let generation = aggregate_generation(&[gen_row(11, 45, 1.0, None), gen_row(12, 0, 2.0, None)]);
        let weather = aggregate_weather(&[weather_row(12, 0, 30.0, 50.0, 0.8), weather_row(12, 15, 30.0, 50.0, 0.8)]);
        let merged = merge(&generation, &weather);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].timestamp, ts(12, 0));
        assert_eq!(merged[0].dc_power, 2.0);
    }

    #[test]
    fn night_rows_are_dropped() {
        let generation = aggregate_generation(&[
            gen_row(5, 0, 0.0, None),
            gen_row(6, 0, 0.0, None),
            gen_row(12, 0, 9000.0, None),
        ]);
        let weather = aggregate_weather(&[
            weather_row(5, 0, 22.0, 21.0, 0.0),
            weather_row(6, 0, 23.0, 22.0, -0.0001),
            weather_row(12, 0, 31.0, 55.0, 0.9),
        ]);
        let rows = daylight_rows(&merge(&generation, &weather));
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.features.irradiation > 0.0));
        assert_eq!(rows[0].dc_power, 9000.0);
        assert_eq!(rows[0].features.module_temperature, 55.0);
    }

    #[test]
    fn fixtures_load_and_join() {
        let generation: Vec<GenerationRecord> =
            parse_csv(File::open("tests/data/generation.csv").expect("fixture present")).expect("parse");
        let weather: Vec<WeatherRecord> =
            parse_csv(File::open("tests/data/weather.csv").expect("fixture present")).expect("parse");
        assert_eq!(generation.len(), 128);
        assert_eq!(weather.len(), 64);

        let merged = merge(&aggregate_generation(&generation), &aggregate_weather(&weather));
        assert_eq!(merged.len(), 63);
        assert!(merged.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(daylight_rows(&merged).len(), 47);
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let err = load_weather(Path::new("tests/data/does-not-exist.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::Missing { .. }));
    }

    #[test]
    fn malformed_row_aborts_parsing() {
        let data = "DATE_TIME,AMBIENT_TEMPERATURE,MODULE_TEMPERATURE,IRRADIATION\n\
                    2020-05-15 12:00:00,30.0,50.0,0.8\n\
                    2020-05-15 12:15:00,warm,50.0,0.8\n";
        let err = parse_csv::<WeatherRecord, _>(data.as_bytes()).unwrap_err();
        let pos = err.position().expect("row position");
        assert_eq!(pos.line(), 3);
    }

    #[test]
    fn split_is_deterministic_and_rounds_test_size_up() {
        let rows: Vec<u32> = (0..47).collect();
        let (train, test) = train_test_split(&rows, 0.2, 42).unwrap();
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 37);

        let (train2, test2) = train_test_split(&rows, 0.2, 42).unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);

        let mut all: Vec<u32> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, rows);
    }

    #[test]
    fn split_rejects_degenerate_inputs() {
        assert!(matches!(
            train_test_split(&[1u8], 0.2, 42),
            Err(DatasetError::NotEnoughRows { rows: 1 })
        ));
        assert!(matches!(
            train_test_split(&[1u8, 2, 3], 1.0, 42),
            Err(DatasetError::InvalidTestFraction(_))
        ));
    }
}
