//! Blocking HTTP client for the two Open-Meteo endpoints the live forecast uses.
//!
//! - `ureq` agent, no async; one request at a time.
//! - No timeout unless one is configured; a hung upstream blocks the caller.
//! - Non-2xx responses are surfaced with their status and body, and JSON
//!   decoding failures carry the path of the field that did not match.

use crate::models::open_meteo::{CURRENT_FIELDS, CurrentWeather, ForecastResponse, GeoLocation, GeocodingResponse};
use http::StatusCode;
use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),
    #[error("http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("json error at `{path}`: {message}")]
    Json { path: String, message: String },
}

impl ClientError {
    /// True when the response arrived but its body did not have the expected shape.
    pub fn is_response_shape(&self) -> bool {
        matches!(self, ClientError::Json { .. })
    }
}

/// Source of location and current weather data for the live forecast.
pub trait WeatherSource {
    /// First geocoding match for `city`, or `None` when nothing matches.
    fn geocode(&self, city: &str) -> Result<Option<GeoLocation>, ClientError>;

    fn current_weather(&self, latitude: f64, longitude: f64) -> Result<CurrentWeather, ClientError>;
}

pub struct OpenMeteoClient {
    agent: ureq::Agent,
    geocoding_url: String,
    forecast_url: String,
}

impl OpenMeteoClient {
    pub fn new(geocoding_url: impl Into<String>, forecast_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();

        OpenMeteoClient {
            agent: ureq::Agent::new_with_config(config),
            geocoding_url: geocoding_url.into(),
            forecast_url: forecast_url.into(),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
        let mut req = self.agent.get(url).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(*k, v);
        }

        debug!("GET {} {:?}", url, query);
        let mut res = req.call()?;
        let status = res.status();
        let body = res.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(ClientError::Http { status, body });
        }
        parse_json(&body)
    }
}

/// Decode a response body, keeping the JSON path of the first mismatch.
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| ClientError::Json {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

impl WeatherSource for OpenMeteoClient {
    fn geocode(&self, city: &str) -> Result<Option<GeoLocation>, ClientError> {
        let resp: GeocodingResponse = self.get_json(
            &self.geocoding_url,
            &[
                ("name", city.to_string()),
                ("count", "1".to_string()),
                ("language", "en".to_string()),
                ("format", "json".to_string()),
            ],
        )?;
        Ok(resp.results.and_then(|r| r.into_iter().next()))
    }

    fn current_weather(&self, latitude: f64, longitude: f64) -> Result<CurrentWeather, ClientError> {
        let resp: ForecastResponse = self.get_json(
            &self.forecast_url,
            &[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ],
        )?;
        Ok(resp.current)
    }
}
