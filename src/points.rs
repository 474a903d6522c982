use crate::error::IsochroneError;

use serde::Deserialize;
use std::path::Path;

/// An origin location read from the points table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Point {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "X")]
    pub lon: f64,
    #[serde(rename = "Y")]
    pub lat: f64,
}

/// Loads every row of a delimited points table with at least the columns
/// `ID`, `X` (longitude) and `Y` (latitude). Extra columns are ignored.
///
/// Any missing file or malformed row fails the whole load; the batch does not
/// start on a partial table.
pub fn load_points<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Vec<Point>, IsochroneError> {
    let path = path.as_ref();
    let to_error = |source: csv::Error| IsochroneError::PointsRead {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(to_error)?;

    let points = reader
        .deserialize::<Point>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_error)?;

    log::info!("loaded {} points from '{}'", points.len(), path.display());
    Ok(points)
}
