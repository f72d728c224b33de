//! Interactive terminal front end. Reads one line per action from `input` and
//! renders results to `output`; the log is kept for diagnostics only.

use crate::artifact::PowerModel;
use crate::client::WeatherSource;
use crate::services::forecast::{
    self, AMBIENT_TEMPERATURE_BOUNDS, Bounds, ForecastError, IRRADIATION_BOUNDS, LiveForecast,
    MODULE_TEMPERATURE_BOUNDS, ManualInputs,
};
use log::{info, warn};
use std::io::{self, BufRead, Write};

const MENU: &str = "\
Smart Solar Forecaster
  1) Smart Forecast (Live API)
  2) Manual Simulation
  q) Quit";

pub struct Dashboard<'a, S: ?Sized, M: ?Sized> {
    source: &'a S,
    model: &'a M,
    default_city: String,
}

impl<'a, S, M> Dashboard<'a, S, M>
where
    S: WeatherSource + ?Sized,
    M: PowerModel + ?Sized,
{
    pub fn new(source: &'a S, model: &'a M, default_city: impl Into<String>) -> Self {
        Self {
            source,
            model,
            default_city: default_city.into(),
        }
    }

    /// Menu loop. Returns on `q` or end of input; only terminal I/O errors escape.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> io::Result<()> {
        info!("Dashboard ready");
        loop {
            writeln!(output, "\n{}", MENU)?;
            let Some(choice) = prompt(&mut input, &mut output, "Mode")? else {
                break;
            };
            let keep_going = match choice.as_str() {
                "1" => self.live(&mut input, &mut output)?,
                "2" => self.manual(&mut input, &mut output)?,
                "q" | "Q" | "quit" => false,
                "" => true,
                other => {
                    writeln!(output, "Unknown option {:?}.", other)?;
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        info!("Dashboard closed");
        Ok(())
    }

    /// `Ok(false)` means input ran out mid-flow.
    fn live<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> io::Result<bool> {
        writeln!(output, "\nReal-Time Solar Prediction")?;
        let label = format!("Enter City Name [{}]", self.default_city);
        let Some(city) = prompt(input, output, &label)? else {
            return Ok(false);
        };
        let city = if city.is_empty() { self.default_city.as_str() } else { city.as_str() };

        match forecast::predict_live(self.source, self.model, city) {
            Ok(result) => render_live(output, &result)?,
            Err(e) => {
                warn!("Live forecast for {:?} failed: {}", city, e);
                writeln!(output, "{}", describe(&e))?;
            }
        }
        Ok(true)
    }

    fn manual<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> io::Result<bool> {
        writeln!(output, "\nManual Simulation")?;
        let fields = [
            ("Solar Irradiation (kW/m²)", IRRADIATION_BOUNDS),
            ("Air Temperature (°C)", AMBIENT_TEMPERATURE_BOUNDS),
            ("Module Temperature (°C)", MODULE_TEMPERATURE_BOUNDS),
        ];
        let mut values = [0.0; 3];
        for (slot, (label, bounds)) in values.iter_mut().zip(fields) {
            match prompt_bounded(input, output, label, bounds)? {
                Some(v) => *slot = v,
                None => return Ok(false),
            }
        }

        let inputs = ManualInputs {
            irradiation: values[0],
            ambient_temperature: values[1],
            module_temperature: values[2],
        };
        match forecast::predict_manual(self.model, &inputs) {
            Ok(pred) => writeln!(output, "Expected Power: {} kW", format_kw(pred))?,
            Err(e) => {
                warn!("Manual prediction for {:?} failed: {}", inputs, e);
                writeln!(output, "{}", describe(&e))?;
            }
        }
        Ok(true)
    }
}

fn render_live<W: Write>(output: &mut W, result: &LiveForecast) -> io::Result<()> {
    let s = &result.sample;
    writeln!(output, "Location: {}", s.location.name)?;
    writeln!(output, "  Irradiance:      {} W/m²", s.irradiance_watts)?;
    writeln!(output, "  Air Temp:        {} °C", s.air_temperature)?;
    writeln!(output, "  Est. Panel Temp: {:.1} °C", s.module_temperature)?;
    writeln!(output, "  Wind:            {} km/h", s.wind_speed)?;
    writeln!(output, "Predicted Output: {} kW", format_kw(result.prediction))?;
    if result.low_output_warning {
        writeln!(output, "Warning: prediction is low. (Check model scaling)")?;
    }
    Ok(())
}

fn describe(err: &ForecastError) -> String {
    match err {
        ForecastError::CityNotFound(_) => "City not found.".to_string(),
        ForecastError::Network(e) => format!("Network error: {}", e),
        ForecastError::ResponseShape(e) => format!("Unexpected weather response: {}", e),
        ForecastError::Prediction(e) => format!("Prediction failed: {}", e),
        ForecastError::OutOfRange { .. } => err.to_string(),
    }
}

/// Print `label: ` and read one trimmed line. `None` at end of input.
fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> io::Result<Option<String>> {
    write!(output, "{}: ", label)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        writeln!(output)?;
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt_bounded<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    bounds: Bounds,
) -> io::Result<Option<f64>> {
    let full = format!("{} [{:.1}-{:.1}, default {:.1}]", label, bounds.min, bounds.max, bounds.default);
    loop {
        let Some(raw) = prompt(input, output, &full)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(Some(bounds.default));
        }
        match raw.parse::<f64>() {
            Ok(v) if bounds.contains(v) => return Ok(Some(v)),
            Ok(v) => writeln!(
                output,
                "{} is out of range; enter a value between {:.1} and {:.1}.",
                v, bounds.min, bounds.max
            )?,
            Err(_) => writeln!(output, "{:?} is not a number.", raw)?,
        }
    }
}

/// Two decimals with `,` thousands separators, e.g. `12,345.68`.
pub fn format_kw(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    if !int.bytes().all(|b| b.is_ascii_digit()) {
        // inf / NaN
        return format!("{:.2}", value);
    }

    let mut out = String::with_capacity(fixed.len() + int.len() / 3 + 1);
    // sign only when something nonzero survives rounding
    if value < 0.0 && fixed != "0.00" {
        out.push('-');
    }
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push('.');
    out.push_str(frac);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{FeatureVector, PredictError};
    use crate::services::forecast::testing::{FixtureWeather, RecordingModel};

    const PUNE: &str = "tests/data/geocoding-pune.json";
    const EMPTY: &str = "tests/data/geocoding-empty.json";
    const CURRENT: &str = "tests/data/forecast-current.json";
    const BROKEN: &str = "tests/data/forecast-missing-radiation.json";

    fn session<S: WeatherSource, M: PowerModel>(source: &S, model: &M, script: &str) -> String {
        let mut out = Vec::new();
        Dashboard::new(source, model, "Pune")
            .run(script.as_bytes(), &mut out)
            .expect("in-memory io");
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn format_kw_groups_thousands() {
        assert_eq!(format_kw(0.0), "0.00");
        assert_eq!(format_kw(12.345), "12.35");
        assert_eq!(format_kw(999.999), "1,000.00");
        assert_eq!(format_kw(1234567.891), "1,234,567.89");
        assert_eq!(format_kw(-1234.5), "-1,234.50");
        assert_eq!(format_kw(-0.004), "0.00");
        assert_eq!(format_kw(-0.5), "-0.50");
        assert_eq!(format_kw(f64::NAN), "NaN");
    }

    #[test]
    fn manual_defaults_on_empty_input() {
        let model = RecordingModel::new(1234.5);
        let out = session(&FixtureWeather::new(PUNE, CURRENT), &model, "2\n\n\n\nq\n");

        assert!(out.contains("Solar Irradiation (kW/m²) [0.0-1.2, default 0.8]"), "{out}");
        assert!(out.contains("Expected Power: 1,234.50 kW"), "{out}");
        assert_eq!(
            model.seen.borrow().as_slice(),
            &[FeatureVector {
                irradiation: 0.8,
                ambient_temperature: 32.0,
                module_temperature: 50.0,
            }]
        );
    }

    #[test]
    fn manual_reprompts_on_bad_input() {
        let model = RecordingModel::new(10.0);
        let out = session(&FixtureWeather::new(PUNE, CURRENT), &model, "2\nabc\n2.0\n0.5\n40\n\nq\n");

        assert!(out.contains("\"abc\" is not a number."), "{out}");
        assert!(out.contains("2 is out of range"), "{out}");
        let seen = model.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].irradiation, 0.5);
        assert_eq!(seen[0].ambient_temperature, 40.0);
        assert_eq!(seen[0].module_temperature, 50.0);
    }

    #[test]
    fn live_forecast_renders_metrics() {
        let source = FixtureWeather::new(PUNE, CURRENT);
        let model = RecordingModel::new(4321.0);
        let out = session(&source, &model, "1\n\n");

        assert!(out.contains("Enter City Name [Pune]"), "{out}");
        assert!(out.contains("Location: Pune"), "{out}");
        assert!(out.contains("800 W/m²"), "{out}");
        assert!(out.contains("30 °C"), "{out}");
        assert!(out.contains("Est. Panel Temp: 50.0 °C"), "{out}");
        assert!(out.contains("Predicted Output: 4,321.00 kW"), "{out}");
        assert!(!out.contains("Warning"), "{out}");
        assert_eq!(source.weather_calls.get(), 1);
    }

    #[test]
    fn live_low_output_warning() {
        let out = session(&FixtureWeather::new(PUNE, CURRENT), &RecordingModel::new(12.0), "1\nPune\nq\n");
        assert!(out.contains("Warning: prediction is low."), "{out}");
    }

    #[test]
    fn live_errors_are_rendered_and_loop_continues() {
        let source = FixtureWeather::new(EMPTY, CURRENT);
        let model = RecordingModel::new(1.0);
        let out = session(&source, &model, "1\nAtlantis\n2\n\n\n\nq\n");
        assert!(out.contains("City not found."), "{out}");
        assert!(out.contains("Expected Power: 1.00 kW"), "{out}");
        assert_eq!(source.weather_calls.get(), 0);

        let out = session(&FixtureWeather::new(PUNE, BROKEN), &model, "1\n\n");
        assert!(out.contains("Unexpected weather response:"), "{out}");
    }

    #[test]
    fn prediction_failures_are_tagged() {
        struct Failing;
        impl PowerModel for Failing {
            fn predict(&self, _features: FeatureVector) -> Result<f64, PredictError> {
                Err(PredictError::NonFiniteOutput(f64::INFINITY))
            }
        }
        let out = session(&FixtureWeather::new(PUNE, CURRENT), &Failing, "1\n\n");
        assert!(out.contains("Prediction failed: model produced a non-finite value inf"), "{out}");
    }

    #[test]
    fn unknown_option_and_eof() {
        let model = RecordingModel::new(1.0);
        let out = session(&FixtureWeather::new(PUNE, CURRENT), &model, "7\n2\n0.3\n");
        assert!(out.contains("Unknown option \"7\"."), "{out}");
        // input ends mid-simulation: nothing predicted, no error
        assert!(model.seen.borrow().is_empty());
    }
}
