//! Manual and live prediction flows behind the dashboard.
//!
//! Live flow: geocode the place name, fetch current conditions for the match,
//! rescale and derive the model inputs, predict. A failed lookup stops before
//! any weather request is made.

use crate::artifact::{FeatureVector, PowerModel, PredictError};
use crate::client::{ClientError, WeatherSource};
use crate::models::open_meteo::{CurrentWeather, GeoLocation};
use log::debug;
use thiserror::Error;

/// Panel heating per W/m² of irradiance above air temperature, °C.
/// Empirical value carried over as-is.
pub const MODULE_HEATING_COEFFICIENT: f64 = 0.025;
/// The model was trained on kW/m²; the weather API reports W/m².
pub const WATTS_PER_KILOWATT: f64 = 1000.0;
/// Predictions below this (kW) under strong sun are flagged as suspicious.
pub const LOW_OUTPUT_THRESHOLD_KW: f64 = 100.0;
/// Irradiance (W/m²) above which a low prediction is flagged.
pub const HIGH_IRRADIANCE_THRESHOLD_W: f64 = 500.0;

/// Inclusive range and default for one manual input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const IRRADIATION_BOUNDS: Bounds = Bounds {
    min: 0.0,
    max: 1.2,
    default: 0.8,
};
pub const AMBIENT_TEMPERATURE_BOUNDS: Bounds = Bounds {
    min: 15.0,
    max: 45.0,
    default: 32.0,
};
pub const MODULE_TEMPERATURE_BOUNDS: Bounds = Bounds {
    min: 20.0,
    max: 75.0,
    default: 50.0,
};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("city {0:?} not found")]
    CityNotFound(String),
    #[error("weather service unreachable: {0}")]
    Network(#[source] ClientError),
    #[error("unexpected weather response: {0}")]
    ResponseShape(#[source] ClientError),
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictError),
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl From<ClientError> for ForecastError {
    fn from(value: ClientError) -> Self {
        if value.is_response_shape() {
            ForecastError::ResponseShape(value)
        } else {
            ForecastError::Network(value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualInputs {
    /// kW/m²
    pub irradiation: f64,
    pub ambient_temperature: f64,
    pub module_temperature: f64,
}

impl Default for ManualInputs {
    fn default() -> Self {
        Self {
            irradiation: IRRADIATION_BOUNDS.default,
            ambient_temperature: AMBIENT_TEMPERATURE_BOUNDS.default,
            module_temperature: MODULE_TEMPERATURE_BOUNDS.default,
        }
    }
}

impl ManualInputs {
    pub fn validate(&self) -> Result<FeatureVector, ForecastError> {
        check("irradiation", self.irradiation, IRRADIATION_BOUNDS)?;
        check("ambient_temperature", self.ambient_temperature, AMBIENT_TEMPERATURE_BOUNDS)?;
        check("module_temperature", self.module_temperature, MODULE_TEMPERATURE_BOUNDS)?;
        Ok(FeatureVector {
            irradiation: self.irradiation,
            ambient_temperature: self.ambient_temperature,
            module_temperature: self.module_temperature,
        })
    }
}

fn check(field: &'static str, value: f64, bounds: Bounds) -> Result<(), ForecastError> {
    if bounds.contains(value) {
        Ok(())
    } else {
        Err(ForecastError::OutOfRange {
            field,
            value,
            min: bounds.min,
            max: bounds.max,
        })
    }
}

pub fn predict_manual<M: PowerModel + ?Sized>(model: &M, inputs: &ManualInputs) -> Result<f64, ForecastError> {
    let features = inputs.validate()?;
    Ok(model.predict(features)?)
}

/// Current conditions at a resolved location plus the derived model inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveWeatherSample {
    pub location: GeoLocation,
    pub air_temperature: f64,
    /// W/m², as reported.
    pub irradiance_watts: f64,
    pub wind_speed: f64,
    /// kW/m², model scale.
    pub irradiation: f64,
    pub module_temperature: f64,
}

impl LiveWeatherSample {
    pub fn derive(location: GeoLocation, current: CurrentWeather) -> Self {
        let irradiance_watts = current.shortwave_radiation;
        Self {
            location,
            air_temperature: current.temperature_2m,
            irradiance_watts,
            wind_speed: current.wind_speed_10m,
            irradiation: irradiance_watts / WATTS_PER_KILOWATT,
            module_temperature: estimate_module_temperature(current.temperature_2m, irradiance_watts),
        }
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            irradiation: self.irradiation,
            ambient_temperature: self.air_temperature,
            module_temperature: self.module_temperature,
        }
    }
}

pub fn estimate_module_temperature(air_temperature: f64, irradiance_watts: f64) -> f64 {
    air_temperature + irradiance_watts * MODULE_HEATING_COEFFICIENT
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveForecast {
    pub sample: LiveWeatherSample,
    /// kW
    pub prediction: f64,
    pub low_output_warning: bool,
}

/// Heuristic only: strong sun with a small prediction usually means a unit mix-up.
pub fn is_low_output(prediction: f64, irradiance_watts: f64) -> bool {
    prediction < LOW_OUTPUT_THRESHOLD_KW && irradiance_watts > HIGH_IRRADIANCE_THRESHOLD_W
}

pub fn predict_live<S, M>(source: &S, model: &M, city: &str) -> Result<LiveForecast, ForecastError>
where
    S: WeatherSource + ?Sized,
    M: PowerModel + ?Sized,
{
    let city = city.trim();
    if city.is_empty() {
        return Err(ForecastError::CityNotFound(String::new()));
    }

    let location = source
        .geocode(city)?
        .ok_or_else(|| ForecastError::CityNotFound(city.to_string()))?;
    debug!(
        "Resolved {:?} to {} ({}, {})",
        city, location.name, location.latitude, location.longitude
    );

    let current = source.current_weather(location.latitude, location.longitude)?;
    let sample = LiveWeatherSample::derive(location, current);
    let prediction = model.predict(sample.features())?;
    let low_output_warning = is_low_output(prediction, sample.irradiance_watts);
    debug!(
        "Live forecast for {}: {:.2} kW (irradiance {} W/m², air {} °C)",
        sample.location.name, prediction, sample.irradiance_watts, sample.air_temperature
    );

    Ok(LiveForecast {
        sample,
        prediction,
        low_output_warning,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Weather source fed from the JSON fixtures, counting calls.
    pub struct FixtureWeather {
        pub geocoding: &'static str,
        pub forecast: &'static str,
        pub geocode_calls: Cell<usize>,
        pub weather_calls: Cell<usize>,
    }

    impl FixtureWeather {
        pub fn new(geocoding: &'static str, forecast: &'static str) -> Self {
            Self {
                geocoding,
                forecast,
                geocode_calls: Cell::new(0),
                weather_calls: Cell::new(0),
            }
        }
    }

    impl WeatherSource for FixtureWeather {
        fn geocode(&self, _city: &str) -> Result<Option<GeoLocation>, ClientError> {
            self.geocode_calls.set(self.geocode_calls.get() + 1);
            let body = std::fs::read_to_string(self.geocoding).expect("fixture present");
            let resp: crate::models::open_meteo::GeocodingResponse = crate::client::parse_json(&body)?;
            Ok(resp.results.and_then(|r| r.into_iter().next()))
        }

        fn current_weather(&self, _latitude: f64, _longitude: f64) -> Result<CurrentWeather, ClientError> {
            self.weather_calls.set(self.weather_calls.get() + 1);
            let body = std::fs::read_to_string(self.forecast).expect("fixture present");
            let resp: crate::models::open_meteo::ForecastResponse = crate::client::parse_json(&body)?;
            Ok(resp.current)
        }
    }

    /// Model returning a fixed value and remembering every input it saw.
    pub struct RecordingModel {
        pub output: f64,
        pub seen: RefCell<Vec<FeatureVector>>,
    }

    impl RecordingModel {
        pub fn new(output: f64) -> Self {
            Self {
                output,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl PowerModel for RecordingModel {
        fn predict(&self, features: FeatureVector) -> Result<f64, PredictError> {
            self.seen.borrow_mut().push(features);
            Ok(self.output)
        }
    }
}
