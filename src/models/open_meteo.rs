//! Wire types for the Open-Meteo geocoding and forecast endpoints.
//!
//! Only the fields the live forecast reads are modeled; everything else in the
//! responses is ignored.

use serde::{Deserialize, Serialize};

/// `GET /v1/search` response. `results` is omitted entirely when nothing matches.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingResponse {
    #[serde(default)]
    pub results: Option<Vec<GeoLocation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

/// `GET /v1/forecast?current=...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub current: CurrentWeather,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    /// Air temperature 2 m above ground, °C.
    pub temperature_2m: f64,
    /// Global horizontal irradiance, W/m².
    pub shortwave_radiation: f64,
    /// km/h. Fetched for display parity, not fed to the model.
    pub wind_speed_10m: f64,
}

/// Comma separated list for the forecast `current` query parameter.
pub const CURRENT_FIELDS: &str = "temperature_2m,shortwave_radiation,wind_speed_10m";
