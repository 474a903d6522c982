use std::path::PathBuf;

// Custom error type for better error messages
#[derive(thiserror::Error, Debug)]
pub enum IsochroneError {
    #[error("failure reading points table '{path}': {source}")]
    PointsRead { path: PathBuf, source: csv::Error },
    #[error("request to isochrone service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("isochrone service returned a body that is not JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected isochrone service response: {0}")]
    UnexpectedResponse(String),
    #[error("malformed feature at index {index}: {message}")]
    MalformedFeature { index: usize, message: String },
    #[error("error building output directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failure writing '{path}': {message}")]
    Write { path: PathBuf, message: String },
    #[error("invalid query configuration '{name}': {message}")]
    InvalidConfig { name: String, message: String },
    #[error("failure reading configuration file '{path}': {message}")]
    ConfigRead { path: PathBuf, message: String },
    #[error("invalid travel mode '{0}'")]
    InvalidTravelMode(String),
}
