//! Google Places nearby search, used to name the restaurant at a coordinate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::gateway::ServiceGateway;
use super::http::fetch_json;
use crate::record::Coordinates;
use crate::retry::{Outcome, ServiceFault};
use crate::TARGET_WEB_REQUEST;

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/";
pub const SEARCH_RADIUS_METERS: u32 = 50;

const NEARBY_SEARCH_PATH: &str = "maps/api/place/nearbysearch/json";
const OPERATION: &str = "places_nearby";

/// The place a nearby search settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceMatch {
    pub name: String,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub vicinity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceMatch>,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct PlacesClient {
    http: reqwest::Client,
    gateway: ServiceGateway,
    endpoint: Url,
    api_key: Option<String>,
}

impl PlacesClient {
    pub fn new(http: reqwest::Client, gateway: ServiceGateway, api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(http, gateway, api_key, DEFAULT_PLACES_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        gateway: ServiceGateway,
        api_key: Option<String>,
        base_url: &str,
    ) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join(NEARBY_SEARCH_PATH))
            .with_context(|| format!("Invalid Places base URL: {}", base_url))?;

        Ok(PlacesClient {
            http,
            gateway,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// First restaurant within [`SEARCH_RADIUS_METERS`] of `coordinates`.
    pub async fn find_restaurant(&self, coordinates: Coordinates) -> Outcome<PlaceMatch> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!(target: TARGET_WEB_REQUEST, "No Places API key, skipping location lookup");
            return Outcome::Absent;
        };

        let latitude = coordinates.latitude.to_string();
        let longitude = coordinates.longitude.to_string();
        let radius = SEARCH_RADIUS_METERS.to_string();
        let location = format!("{},{}", latitude, longitude);
        let limit = self.gateway.policy().call_timeout;

        let outcome = self
            .gateway
            .call(OPERATION, &[latitude.as_str(), longitude.as_str(), radius.as_str()], || {
                let request = self.http.get(self.endpoint.clone()).query(&[
                    ("location", location.as_str()),
                    ("radius", radius.as_str()),
                    ("type", "restaurant"),
                    ("key", api_key),
                ]);
                async move {
                    let response: NearbySearchResponse = fetch_json(request, limit).await?;
                    interpret(response)
                }
            })
            .await;

        if let Outcome::Found(place) = &outcome {
            info!(target: TARGET_WEB_REQUEST, "Places found '{}' at {}", place.name, location);
        }
        outcome
    }
}

fn interpret(response: NearbySearchResponse) -> Result<Option<PlaceMatch>, ServiceFault> {
    match response.status.as_str() {
        "OK" => Ok(response
            .results
            .into_iter()
            .find(|place| !place.name.trim().is_empty())),
        "ZERO_RESULTS" => Ok(None),
        "OVER_QUERY_LIMIT" => Err(ServiceFault::RateLimited),
        "REQUEST_DENIED" => Err(ServiceFault::Unauthorized),
        other => Err(ServiceFault::Rejected {
            status: 200,
            message: format!(
                "{}: {}",
                other,
                response.error_message.unwrap_or_default()
            ),
        }),
    }
}
