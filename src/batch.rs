use crate::config::QueryConfig;
use crate::convert::convert_features;
use crate::error::IsochroneError;
use crate::otp::OtpClient;
use crate::points::Point;
use crate::writer::write_table;

use serde_json::Value;
use std::path::PathBuf;

/// What happened to one point under one configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Written(PathBuf),
    Empty,
    /// the response could not be shaped into a table; logged with its payload
    Malformed,
}

/// Per-configuration counters of a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub name: String,
    pub written: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Fetches, converts and writes the isochrones of one point for one configuration.
pub async fn process_point(
    client: &OtpClient,
    config: &QueryConfig,
    point: &Point,
) -> Result<PointOutcome, IsochroneError> {
    let features = client.fetch_isochrones(&config.request_for(point)).await?;
    if !features.is_empty() && features.len() < config.cutoff_minutes.len() {
        log::debug!(
            "{} returned {} of {} isochrones for ID: {}",
            config.name,
            features.len(),
            config.cutoff_minutes.len(),
            point.id
        );
    }
    write_features(config, point, &features)
}

/// Converts and writes a feature list already fetched for `point`.
pub fn write_features(
    config: &QueryConfig,
    point: &Point,
    features: &[Value],
) -> Result<PointOutcome, IsochroneError> {
    let table = match convert_features(&point.id, features, config.scale) {
        Ok(Some(table)) => table,
        Ok(None) => return Ok(PointOutcome::Empty),
        Err(e @ IsochroneError::MalformedFeature { .. }) => {
            let payload = serde_json::to_string(features).unwrap_or_default();
            log::error!("{} for ID: {}. Full feature: {}", e, point.id, payload);
            return Ok(PointOutcome::Malformed);
        }
        Err(e) => return Err(e),
    };
    let path = write_table(
        &table,
        &config.output_directory,
        &config.filename_prefix,
        &point.id,
    )?;
    Ok(PointOutcome::Written(path))
}

/// Runs every configuration over every point, one request at a time.
///
/// Configurations run in the given order and points in table order. A failing
/// point is logged and counted; it never stops the batch.
pub async fn run_batch(
    client: &OtpClient,
    points: &[Point],
    configs: &[QueryConfig],
) -> Vec<BatchSummary> {
    let mut summaries = Vec::with_capacity(configs.len());

    for config in configs {
        log::info!(
            "computing {} isochrones for {} points into '{}'",
            config.name,
            points.len(),
            config.output_directory.display()
        );
        let mut summary = BatchSummary {
            name: config.name.clone(),
            ..Default::default()
        };

        for point in points {
            match process_point(client, config, point).await {
                Ok(PointOutcome::Written(_)) => summary.written += 1,
                Ok(PointOutcome::Empty) => summary.empty += 1,
                Ok(PointOutcome::Malformed) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    log::error!("{} failed for ID: {}: {}", config.name, point.id, e);
                }
            }
        }

        log::info!(
            "{} finished: {} written, {} empty, {} failed",
            summary.name,
            summary.written,
            summary.empty,
            summary.failed
        );
        summaries.push(summary);
    }

    summaries
}
