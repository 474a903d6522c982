//! Batch isochrones from an OpenTripPlanner server.
//!
//! Points are read from a CSV table, each point is sent to the OTP isochrone
//! endpoint once per [`config::QueryConfig`], and every non-empty answer is
//! written as a shapefile with a `minutes` attribute.

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod otp;
pub mod points;
pub mod writer;

#[cfg(feature = "python")]
mod python;

pub use batch::{run_batch, BatchSummary, PointOutcome};
pub use config::QueryConfig;
pub use error::IsochroneError;
pub use otp::{IsochroneRequest, OtpClient, TravelMode};
pub use points::Point;
