use crate::batch;
use crate::config;
use crate::error::IsochroneError;
use crate::otp::{IsochroneRequest, OtpClient, TravelMode};
use crate::points;

use chrono::NaiveDateTime;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

lazy_static::lazy_static! {
    // One runtime for every call so the pooled connections of CLIENT stay usable
    static ref RUNTIME: std::io::Result<tokio::runtime::Runtime> = tokio::runtime::Runtime::new();
    static ref CLIENT: reqwest::Client = reqwest::Client::new();
}

impl From<IsochroneError> for PyErr {
    fn from(err: IsochroneError) -> PyErr {
        match err {
            IsochroneError::InvalidTravelMode(_) | IsochroneError::InvalidConfig { .. } => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

fn runtime() -> PyResult<&'static tokio::runtime::Runtime> {
    RUNTIME
        .as_ref()
        .map_err(|e| PyRuntimeError::new_err(format!("failed to start tokio runtime: {e}")))
}

fn parse_departure(departure: Option<&str>) -> PyResult<NaiveDateTime> {
    match departure {
        Some(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| PyValueError::new_err(format!("invalid departure '{text}': {e}"))),
        None => Ok(config::default_departure()),
    }
}

/// Requests isochrones around a point and returns each feature as a GeoJSON string
#[pyfunction]
#[pyo3(signature = (base_url, lat, lon, modes, cutoff_minutes, departure=None, max_walk_distance=None))]
fn fetch_isochrones(
    base_url: String,
    lat: f64,
    lon: f64,
    modes: Vec<String>,
    cutoff_minutes: Vec<u32>,
    departure: Option<String>,
    max_walk_distance: Option<f64>,
) -> PyResult<Vec<String>> {
    let modes = modes
        .iter()
        .map(|mode| mode.parse::<TravelMode>())
        .collect::<Result<Vec<_>, _>>()?;
    let request = IsochroneRequest {
        lat,
        lon,
        modes: &modes,
        departure: parse_departure(departure.as_deref())?,
        cutoff_minutes: &cutoff_minutes,
        max_walk_distance,
    };

    let client = OtpClient::with_client(&base_url, CLIENT.clone());
    let features = runtime()?.block_on(client.fetch_isochrones(&request))?;

    Ok(features.iter().map(|feature| feature.to_string()).collect())
}

/// Runs the transit, bicycle and car configurations over a points table.
/// Returns (name, written, empty, failed) per configuration.
#[pyfunction]
#[pyo3(signature = (base_url, points_path, output_root=".".to_string(), departure=None, delimiter=','))]
fn run_batch(
    base_url: String,
    points_path: String,
    output_root: String,
    departure: Option<String>,
    delimiter: char,
) -> PyResult<Vec<(String, usize, usize, usize)>> {
    if !delimiter.is_ascii() {
        return Err(PyValueError::new_err("delimiter must be a single ASCII character"));
    }
    let points = points::load_points(&points_path, delimiter as u8)?;
    let profiles = config::default_profiles(parse_departure(departure.as_deref())?)
        .into_iter()
        .map(|profile| profile.with_output_root(Path::new(&output_root)))
        .collect::<Vec<_>>();

    let client = OtpClient::with_client(&base_url, CLIENT.clone());
    let summaries = runtime()?.block_on(batch::run_batch(&client, &points, &profiles));

    Ok(summaries
        .into_iter()
        .map(|s| (s.name, s.written, s.empty, s.failed))
        .collect())
}

/// Python module for batch OpenTripPlanner isochrones
#[pymodule]
fn otp_isochrones(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(fetch_isochrones, m)?)?;
    m.add_function(wrap_pyfunction!(run_batch, m)?)?;
    Ok(())
}
