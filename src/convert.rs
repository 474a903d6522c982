use crate::error::IsochroneError;

use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the reported reachability time becomes the `minutes` attribute.
/// The factor is applied after converting seconds to minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "factor", rename_all = "snake_case")]
pub enum MinutesScale {
    Identity,
    Multiply(f64),
    Divide(f64),
}

impl MinutesScale {
    pub fn minutes(&self, seconds: f64) -> f64 {
        let minutes = seconds / 60.0;
        match self {
            MinutesScale::Identity => minutes,
            MinutesScale::Multiply(factor) => factor * minutes,
            MinutesScale::Divide(factor) => minutes / factor,
        }
    }

    pub fn factor(&self) -> f64 {
        match self {
            MinutesScale::Identity => 1.0,
            MinutesScale::Multiply(factor) | MinutesScale::Divide(factor) => *factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneRecord {
    pub geometry: MultiPolygon<f64>,
    pub minutes: f64,
    pub properties: Option<Map<String, Value>>,
}

/// Records built from one isochrone response, in response order.
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneTable {
    pub records: Vec<IsochroneRecord>,
    /// false when no feature of the response carried a properties object
    pub has_properties: bool,
}

impl IsochroneTable {
    pub fn minutes(&self) -> Vec<f64> {
        self.records.iter().map(|record| record.minutes).collect()
    }
}

/// Builds the output table for the features returned for one point.
///
/// Returns `Ok(None)` for an empty response. When no feature has properties a
/// warning naming `point_id` is logged and every record gets zero minutes.
/// Features without a polygonal geometry, or whose `time` is not a number, are
/// reported as [`IsochroneError::MalformedFeature`].
pub fn convert_features(
    point_id: &str,
    features: &[Value],
    scale: MinutesScale,
) -> Result<Option<IsochroneTable>, IsochroneError> {
    if features.is_empty() {
        return Ok(None);
    }

    let parsed = features
        .iter()
        .enumerate()
        .map(|(index, feature)| parse_feature(index, feature))
        .collect::<Result<Vec<_>, _>>()?;

    let has_properties = parsed.iter().any(|(_, properties)| properties.is_some());
    if !has_properties {
        log::warn!(
            "No 'properties' found for ID: {}. Using default values.",
            point_id
        );
    }

    let mut records = Vec::with_capacity(parsed.len());
    for (index, (geometry, properties)) in parsed.into_iter().enumerate() {
        let minutes = if has_properties {
            scale.minutes(reported_seconds(index, properties.as_ref())?)
        } else {
            0.0
        };
        records.push(IsochroneRecord {
            geometry,
            minutes,
            properties,
        });
    }

    Ok(Some(IsochroneTable {
        records,
        has_properties,
    }))
}

fn malformed(index: usize, message: String) -> IsochroneError {
    IsochroneError::MalformedFeature { index, message }
}

fn parse_feature(
    index: usize,
    feature: &Value,
) -> Result<(MultiPolygon<f64>, Option<Map<String, Value>>), IsochroneError> {
    let object = feature
        .as_object()
        .ok_or_else(|| malformed(index, format!("expected a JSON object, found: {feature}")))?;

    let geometry = object
        .get("geometry")
        .ok_or_else(|| malformed(index, "missing key 'geometry'".to_string()))?;
    let geometry = to_multi_polygon(index, geometry)?;

    let properties = match object.get("properties") {
        None | Some(Value::Null) => None,
        Some(Value::Object(properties)) => Some(properties.clone()),
        Some(other) => {
            return Err(malformed(
                index,
                format!("'properties' should be an object, found: {other}"),
            ))
        }
    };

    Ok((geometry, properties))
}

// Isochrones are areas, so only Polygon and MultiPolygon are accepted
fn to_multi_polygon(index: usize, raw: &Value) -> Result<MultiPolygon<f64>, IsochroneError> {
    let geometry: geojson::Geometry = serde_json::from_value(raw.clone())
        .map_err(|e| malformed(index, format!("invalid GeoJSON geometry: {e}")))?;

    let to_error = |e: geojson::Error| malformed(index, format!("invalid polygon: {e}"));
    let multi_polygon = match geometry.value {
        value @ geojson::Value::Polygon(_) => {
            let polygon = Polygon::<f64>::try_from(value).map_err(to_error)?;
            MultiPolygon::new(vec![polygon])
        }
        value @ geojson::Value::MultiPolygon(_) => {
            MultiPolygon::<f64>::try_from(value).map_err(to_error)?
        }
        _ => {
            return Err(malformed(
                index,
                format!(
                    "unsupported geometry type {}, expected Polygon or MultiPolygon",
                    raw.get("type").unwrap_or(&Value::Null)
                ),
            ))
        }
    };

    if is_empty_geometry(&multi_polygon) {
        return Err(malformed(index, format!("empty polygon geometry: {raw}")));
    }
    Ok(multi_polygon)
}

/// True when the geometry has no polygon or a ring without coordinates,
/// which the shapefile writer cannot encode.
pub fn is_empty_geometry(geometry: &MultiPolygon<f64>) -> bool {
    geometry.0.is_empty()
        || geometry.0.iter().any(|polygon| {
            polygon.exterior().0.is_empty()
                || polygon.interiors().iter().any(|ring| ring.0.is_empty())
        })
}

// A missing `time` counts as zero seconds
fn reported_seconds(
    index: usize,
    properties: Option<&Map<String, Value>>,
) -> Result<f64, IsochroneError> {
    match properties.and_then(|properties| properties.get("time")) {
        None | Some(Value::Null) => Ok(0.0),
        Some(time) => time
            .as_f64()
            .ok_or_else(|| malformed(index, format!("'time' should be a number, found: {time}"))),
    }
}
