use crate::convert::MinutesScale;
use crate::error::IsochroneError;
use crate::otp::{IsochroneRequest, TravelMode};
use crate::points::Point;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Everything needed to run one isochrone configuration over all points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub name: String,
    pub modes: Vec<TravelMode>,
    pub departure: NaiveDateTime,
    pub cutoff_minutes: Vec<u32>,
    #[serde(default)]
    pub max_walk_distance: Option<f64>,
    #[serde(default = "identity_scale")]
    pub scale: MinutesScale,
    pub output_directory: PathBuf,
    pub filename_prefix: String,
}

fn identity_scale() -> MinutesScale {
    MinutesScale::Identity
}

impl QueryConfig {
    pub fn request_for<'a>(&'a self, point: &Point) -> IsochroneRequest<'a> {
        IsochroneRequest {
            lat: point.lat,
            lon: point.lon,
            modes: &self.modes,
            departure: self.departure,
            cutoff_minutes: &self.cutoff_minutes,
            max_walk_distance: self.max_walk_distance,
        }
    }

    /// Checks the invariants a configuration must hold before any request is sent.
    pub fn validate(&self) -> Result<(), IsochroneError> {
        let invalid = |message: &str| IsochroneError::InvalidConfig {
            name: self.name.clone(),
            message: message.to_string(),
        };

        if self.modes.is_empty() {
            return Err(invalid("at least one travel mode is required"));
        }
        if self.cutoff_minutes.is_empty() {
            return Err(invalid("at least one cutoff is required"));
        }
        if self.cutoff_minutes.contains(&0) {
            return Err(invalid("cutoffs must be strictly positive"));
        }
        let factor = self.scale.factor();
        if !factor.is_finite() || factor <= 0.0 {
            return Err(invalid("scale factor must be strictly positive"));
        }
        if self.filename_prefix.is_empty() {
            return Err(invalid("filename prefix must not be empty"));
        }
        if !self.cutoff_minutes.windows(2).all(|pair| pair[0] < pair[1]) {
            log::warn!(
                "cutoffs of '{}' are not ascending: {:?}",
                self.name,
                self.cutoff_minutes
            );
        }
        Ok(())
    }

    /// Re-roots a relative output directory under `root`.
    pub fn with_output_root(mut self, root: &Path) -> Self {
        self.output_directory = root.join(&self.output_directory);
        self
    }
}

pub fn default_departure() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 27)
        .and_then(|date| date.and_hms_opt(8, 30, 0))
        .unwrap_or_default()
}

/// The transit, bicycle and two car configurations, departing at `departure`.
pub fn default_profiles(departure: NaiveDateTime) -> Vec<QueryConfig> {
    let every_ten = vec![10, 20, 30, 40, 50, 60];
    vec![
        QueryConfig {
            name: "transit".to_string(),
            modes: vec![TravelMode::Walk, TravelMode::Transit],
            departure,
            cutoff_minutes: every_ten.clone(),
            max_walk_distance: Some(1000.0),
            scale: MinutesScale::Identity,
            output_directory: PathBuf::from("transit_insee"),
            filename_prefix: "t".to_string(),
        },
        QueryConfig {
            name: "bicycle".to_string(),
            modes: vec![TravelMode::Bicycle],
            departure,
            cutoff_minutes: every_ten,
            max_walk_distance: None,
            scale: MinutesScale::Identity,
            output_directory: PathBuf::from("bike_insee"),
            filename_prefix: "c".to_string(),
        },
        QueryConfig {
            name: "car_a".to_string(),
            modes: vec![TravelMode::Car],
            departure,
            cutoff_minutes: vec![5, 10, 15, 20, 25, 30],
            max_walk_distance: None,
            scale: MinutesScale::Multiply(2.0),
            output_directory: PathBuf::from("car_a_insee"),
            filename_prefix: "c".to_string(),
        },
        QueryConfig {
            name: "car_b".to_string(),
            modes: vec![TravelMode::Car],
            departure,
            cutoff_minutes: vec![7, 14, 21, 28, 35, 42],
            max_walk_distance: None,
            scale: MinutesScale::Divide(0.7),
            output_directory: PathBuf::from("car_b_insee"),
            filename_prefix: "c".to_string(),
        },
    ]
}

/// Reads a JSON array of configurations that replaces the defaults.
pub fn load_profiles<P: AsRef<Path>>(path: P) -> Result<Vec<QueryConfig>, IsochroneError> {
    let path = path.as_ref();
    let to_error = |message: String| IsochroneError::ConfigRead {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| to_error(e.to_string()))?;
    let profiles: Vec<QueryConfig> =
        serde_json::from_reader(file).map_err(|e| to_error(e.to_string()))?;

    log::info!(
        "read {} query configurations from '{}'",
        profiles.len(),
        path.display()
    );
    Ok(profiles)
}
