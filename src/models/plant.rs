//! Row types for the solar plant CSV exports (generation + weather sensor).
//!
//! The two files come from different loggers and use different `DATE_TIME`
//! layouts, so each record type carries its own timestamp parser.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

/// `15-05-2020 00:15`
pub const GENERATION_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";
/// `2020-05-15 00:15:00`
pub const WEATHER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One inverter reading from the generation export.
///
/// Only `DC_POWER` is required; the remaining numeric columns are summed along
/// with it when present. Identifier columns (`PLANT_ID`, `SOURCE_KEY`) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationRecord {
    #[serde(rename = "DATE_TIME", deserialize_with = "generation_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "DC_POWER")]
    pub dc_power: f64,
    #[serde(rename = "AC_POWER", default)]
    pub ac_power: Option<f64>,
    #[serde(rename = "DAILY_YIELD", default)]
    pub daily_yield: Option<f64>,
    #[serde(rename = "TOTAL_YIELD", default)]
    pub total_yield: Option<f64>,
}

/// One sensor reading from the weather export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherRecord {
    #[serde(rename = "DATE_TIME", deserialize_with = "weather_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "AMBIENT_TEMPERATURE")]
    pub ambient_temperature: f64,
    #[serde(rename = "MODULE_TEMPERATURE")]
    pub module_temperature: f64,
    #[serde(rename = "IRRADIATION")]
    pub irradiation: f64,
}

fn generation_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    parse_timestamp(deserializer, GENERATION_TIMESTAMP_FORMAT)
}

fn weather_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    parse_timestamp(deserializer, WEATHER_TIMESTAMP_FORMAT)
}

fn parse_timestamp<'de, D>(deserializer: D, format: &str) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(raw.trim(), format).map_err(|e| {
        serde::de::Error::custom(format!("DATE_TIME {:?} does not match {:?}: {}", raw, format, e))
    })
}
