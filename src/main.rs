pub mod models {
    pub mod open_meteo;
    pub mod plant;
}

pub mod artifact;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod env_file;
pub mod forest;
pub mod services {
    pub mod forecast;
    pub mod train;
}

use crate::artifact::{ArtifactError, SolarModel};
use crate::client::OpenMeteoClient;
use crate::config::{DashboardConfig, TrainerConfig};
use crate::dashboard::Dashboard;
use crate::services::train;
use log::{error, info};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

const MODEL_NOT_FOUND: &str = "Model not found. Run `solar-forecaster train` first.";

const USAGE: &str = "\
usage: solar-forecaster [--env-file PATH] <train|dashboard>

  train       fit the model from the plant CSV exports and write the model file
  dashboard   interactive manual and live-weather predictions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Train,
    Dashboard,
}

#[derive(Debug, PartialEq)]
enum Invocation {
    Run { env_file: Option<PathBuf>, command: Command },
    Help,
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
    applied: usize,
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Train => run_train(),
        Command::Dashboard => run_dashboard(),
    }
}

fn run_train() -> Result<(), String> {
    let cfg = TrainerConfig::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (generation={}, weather={}, model={}, trees={}, seed={}, test_fraction={})",
        cfg.generation_csv.display(),
        cfg.weather_csv.display(),
        cfg.model_path.display(),
        cfg.forest.n_estimators,
        cfg.forest.seed,
        cfg.test_fraction
    );

    let summary = train::run(&cfg).map_err(|e| e.to_string())?;
    info!(
        "Training complete: {} ({} training row(s), {} test row(s))",
        cfg.model_path.display(),
        summary.train_rows,
        summary.test_rows
    );
    Ok(())
}

fn run_dashboard() -> Result<(), String> {
    let cfg = DashboardConfig::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (model={}, geocoding={}, forecast={}, timeout={}, default_city={})",
        cfg.model_path.display(),
        cfg.geocoding_url,
        cfg.forecast_url,
        cfg.http_timeout
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "-".to_string()),
        cfg.default_city
    );

    let model = load_model(&cfg.model_path)?;
    let meta = model.artifact();
    info!(
        "Loaded model from {} (created {}, {} tree(s), seed {}, {} training row(s))",
        cfg.model_path.display(),
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.forest.trees().len(),
        meta.forest.params().seed,
        meta.training_rows
    );

    let client = OpenMeteoClient::new(cfg.geocoding_url, cfg.forecast_url, cfg.http_timeout);
    Dashboard::new(&client, &model, cfg.default_city)
        .run(io::stdin().lock(), io::stdout().lock())
        .map_err(|e| format!("terminal I/O failed: {}", e))
}

/// Load the model file, mapping a missing file to the operator hint.
fn load_model(path: &Path) -> Result<SolarModel, String> {
    match artifact::load(path) {
        Ok(model) => Ok(model),
        Err(ArtifactError::NotFound { .. }) => Err(MODEL_NOT_FOUND.to_string()),
        Err(e) => Err(format!("Loading model failed: {}", e)),
    }
}

fn parse_args<I>(args: I) -> Result<Invocation, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut env_file: Option<PathBuf> = None;
    let mut command: Option<Command> = None;

    let mut set_env_file = |path: PathBuf| -> Result<(), String> {
        if env_file.replace(path).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
        Ok(())
    };

    while let Some(arg) = args.next() {
        let next = match arg.to_str() {
            Some("-h" | "--help") => return Ok(Invocation::Help),
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                set_env_file(PathBuf::from(value))?;
                continue;
            }
            Some(s) if s.starts_with("--env-file=") => {
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                set_env_file(PathBuf::from(path_str))?;
                continue;
            }
            Some("train") => Command::Train,
            Some("dashboard") => Command::Dashboard,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if command.replace(next).is_some() {
            return Err("only one subcommand may be given".to_string());
        }
    }

    let command = command.ok_or_else(|| "missing subcommand".to_string())?;
    Ok(Invocation::Run { env_file, command })
}

fn configure_env(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };

    let applied = env_file::load(&path).map_err(|e| e.to_string())?;
    Ok(Some(LoadedEnvFile { path, explicit, applied }))
}

fn main() {
    let (env_path, command) = match parse_args(std::env::args_os().skip(1)) {
        Ok(Invocation::Run { env_file, command }) => (env_file, command),
        Ok(Invocation::Help) => {
            println!("{}", USAGE);
            return;
        }
        Err(err) => {
            eprintln!("fatal: {}\n\n{}", err, USAGE);
            std::process::exit(1);
        }
    };

    let loaded_env = match configure_env(env_path) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!(
            "Environment loaded from {} .env file: {} ({} variable(s) applied)",
            origin,
            info.path.display(),
            info.applied
        );
    }

    info!(
        "solar-forecaster {} (git {}) starting {:?}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH"),
        command
    );
    if let Err(e) = run(command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
