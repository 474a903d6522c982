use crate::error::IsochroneError;

use chrono::NaiveDateTime;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const ISOCHRONE_PATH: &str = "/otp/routers/default/isochrone";

// Travel modes understood by the OTP isochrone endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    Walk,
    Transit,
    Bicycle,
    Car,
    Bus,
    Rail,
    Tram,
    Subway,
    Ferry,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walk => "WALK",
            TravelMode::Transit => "TRANSIT",
            TravelMode::Bicycle => "BICYCLE",
            TravelMode::Car => "CAR",
            TravelMode::Bus => "BUS",
            TravelMode::Rail => "RAIL",
            TravelMode::Tram => "TRAM",
            TravelMode::Subway => "SUBWAY",
            TravelMode::Ferry => "FERRY",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = IsochroneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WALK" => Ok(TravelMode::Walk),
            "TRANSIT" => Ok(TravelMode::Transit),
            "BICYCLE" => Ok(TravelMode::Bicycle),
            "CAR" => Ok(TravelMode::Car),
            "BUS" => Ok(TravelMode::Bus),
            "RAIL" => Ok(TravelMode::Rail),
            "TRAM" => Ok(TravelMode::Tram),
            "SUBWAY" => Ok(TravelMode::Subway),
            "FERRY" => Ok(TravelMode::Ferry),
            _ => Err(IsochroneError::InvalidTravelMode(s.to_string())),
        }
    }
}

/// One isochrone query: an origin, how to travel from it, when, and which
/// travel time thresholds to draw.
#[derive(Debug, Clone)]
pub struct IsochroneRequest<'a> {
    pub lat: f64,
    pub lon: f64,
    pub modes: &'a [TravelMode],
    pub departure: NaiveDateTime,
    pub cutoff_minutes: &'a [u32],
    pub max_walk_distance: Option<f64>,
}

impl IsochroneRequest<'_> {
    /// Query string pairs for the isochrone endpoint. `cutoffSec` is repeated
    /// once per cutoff, in the given order.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let modes = self
            .modes
            .iter()
            .map(TravelMode::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut params = vec![
            ("fromPlace", format!("{},{}", self.lat, self.lon)),
            ("mode", modes),
            ("date", self.departure.format("%Y-%m-%d").to_string()),
            ("time", self.departure.format("%H:%M:%S").to_string()),
        ];
        params.extend(
            self.cutoff_minutes
                .iter()
                .map(|minutes| ("cutoffSec", (u64::from(*minutes) * 60).to_string())),
        );
        // a zero distance is treated as unset
        if let Some(distance) = self.max_walk_distance.filter(|distance| *distance != 0.0) {
            params.push(("maxWalkDistance", distance.to_string()));
        }
        params
    }
}

/// Client for the isochrone endpoint of an OpenTripPlanner server.
///
/// Requests have no timeout: a server that never answers blocks the caller.
#[derive(Debug, Clone)]
pub struct OtpClient {
    base_url: String,
    client: reqwest::Client,
}

impl OtpClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    // Reuse an existing reqwest::Client and its connection pool
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        OtpClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn isochrone_url(&self) -> String {
        format!("{}{}", self.base_url, ISOCHRONE_PATH)
    }

    /// Fetches the isochrone features for one request.
    ///
    /// A non-200 answer is logged with its body and yields an empty list.
    /// Transport failures and 200 bodies that cannot be decoded are errors.
    pub async fn fetch_isochrones(
        &self,
        request: &IsochroneRequest<'_>,
    ) -> Result<Vec<Value>, IsochroneError> {
        let response = self
            .client
            .get(self.isochrone_url())
            .query(&request.query_params())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            log::error!("Error {}: {}", status.as_u16(), body);
            return Ok(Vec::new());
        }

        let body = response.text().await?;
        features_from_body(&body)
    }
}

// Extracts the feature list of a feature collection body
fn features_from_body(body: &str) -> Result<Vec<Value>, IsochroneError> {
    let mut collection: Value = serde_json::from_str(body)?;
    match collection.get_mut("features").map(Value::take) {
        Some(Value::Array(features)) => Ok(features),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(IsochroneError::UnexpectedResponse(format!(
            "'features' should be an array, found: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn departure() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 27)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_query_params_transit() {
        let modes = [TravelMode::Walk, TravelMode::Transit];
        let cutoffs = [10, 20, 30];
        let request = IsochroneRequest {
            lat: 48.86,
            lon: 2.35,
            modes: &modes,
            departure: departure(),
            cutoff_minutes: &cutoffs,
            max_walk_distance: Some(1000.0),
        };

        let params = request.query_params();

        assert_eq!(
            params,
            vec![
                ("fromPlace", "48.86,2.35".to_string()),
                ("mode", "WALK,TRANSIT".to_string()),
                ("date", "2024-08-27".to_string()),
                ("time", "08:30:00".to_string()),
                ("cutoffSec", "600".to_string()),
                ("cutoffSec", "1200".to_string()),
                ("cutoffSec", "1800".to_string()),
                ("maxWalkDistance", "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_params_omit_max_walk_distance() {
        let modes = [TravelMode::Car];
        let cutoffs = [7];
        let request = IsochroneRequest {
            lat: 48.86,
            lon: 2.35,
            modes: &modes,
            departure: departure(),
            cutoff_minutes: &cutoffs,
            max_walk_distance: None,
        };

        let params = request.query_params();

        assert!(params.iter().all(|(key, _)| *key != "maxWalkDistance"));
        assert!(params.contains(&("cutoffSec", "420".to_string())));
    }

    #[test]
    fn test_query_params_omit_zero_max_walk_distance() {
        let modes = [TravelMode::Walk, TravelMode::Transit];
        let cutoffs = [10];
        let request = IsochroneRequest {
            lat: 48.86,
            lon: 2.35,
            modes: &modes,
            departure: departure(),
            cutoff_minutes: &cutoffs,
            max_walk_distance: Some(0.0),
        };

        let params = request.query_params();

        assert!(params.iter().all(|(key, _)| *key != "maxWalkDistance"));
    }

    #[test]
    fn test_travel_mode_from_str() {
        assert_eq!("bicycle".parse::<TravelMode>().unwrap(), TravelMode::Bicycle);
        assert_eq!(" CAR ".parse::<TravelMode>().unwrap(), TravelMode::Car);
        assert!(matches!(
            "HOVERCRAFT".parse::<TravelMode>(),
            Err(IsochroneError::InvalidTravelMode(_))
        ));
    }

    #[test]
    fn test_isochrone_url_trims_trailing_slash() {
        let client = OtpClient::new("http://localhost:8080/");
        assert_eq!(
            client.isochrone_url(),
            "http://localhost:8080/otp/routers/default/isochrone"
        );
    }

    #[test]
    fn test_features_from_body_without_features_key() {
        let features = features_from_body(r#"{"type": "FeatureCollection"}"#).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_features_from_body_rejects_non_array() {
        let result = features_from_body(r#"{"features": 3}"#);
        assert!(matches!(result, Err(IsochroneError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_fetch_isochrones_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ISOCHRONE_PATH))
            .and(query_param("fromPlace", "48.86,2.35"))
            .and(query_param("mode", "CAR"))
            .and(query_param("date", "2024-08-27"))
            .and(query_param("time", "08:30:00"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"type":"FeatureCollection","features":[
                    {"type":"Feature","properties":{"time":300},
                     "geometry":{"type":"Polygon","coordinates":[[[2.3,48.8],[2.4,48.8],[2.4,48.9],[2.3,48.8]]]}}
                ]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let modes = [TravelMode::Car];
        let cutoffs = [5];
        let request = IsochroneRequest {
            lat: 48.86,
            lon: 2.35,
            modes: &modes,
            departure: departure(),
            cutoff_minutes: &cutoffs,
            max_walk_distance: None,
        };
        let client = OtpClient::new(&server.uri());

        let features = client.fetch_isochrones(&request).await.unwrap();

        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["time"], 300);
    }

    #[tokio::test]
    async fn test_fetch_isochrones_server_error_yields_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ISOCHRONE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("graph not loaded"))
            .mount(&server)
            .await;

        let modes = [TravelMode::Bicycle];
        let cutoffs = [10, 20];
        let request = IsochroneRequest {
            lat: 48.86,
            lon: 2.35,
            modes: &modes,
            departure: departure(),
            cutoff_minutes: &cutoffs,
            max_walk_distance: None,
        };
        let client = OtpClient::new(&server.uri());
        testing_logger::setup();

        let features = client.fetch_isochrones(&request).await.unwrap();

        assert!(features.is_empty());
        testing_logger::validate(|captured_logs| {
            let errors = captured_logs
                .iter()
                .filter(|log| log.level == log::Level::Error)
                .map(|log| log.body.as_str())
                .collect::<Vec<_>>();
            assert_eq!(errors, vec!["Error 500: graph not loaded"]);
        });
    }
}
