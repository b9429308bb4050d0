use crate::error::FetchError;
use crate::types::{Dataset, SeismicEvent};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// USGS summary feed: all earthquakes from the past day.
pub const FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson";

const USER_AGENT: &str = "QuakeView/1.0";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// GeoJSON feature collection as served by the USGS summary feeds.
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    properties: Option<FeatureProperties>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    #[serde(default)]
    mag: Option<f64>,
    /// Required key; an explicit `null` is allowed.
    #[serde(deserialize_with = "nullable")]
    place: Option<String>,
}

/// Key must be present but may be `null`. A missing key is a deserialize error.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Option<Vec<f64>>,
}

impl Feature {
    /// Label used in error messages: the USGS event id, or the position in the feed.
    fn label(&self, index: usize) -> String {
        match &self.id {
            Some(id) => format!("{id} (#{index})"),
            None => format!("#{index}"),
        }
    }

    fn into_event(self, index: usize) -> Result<SeismicEvent, FetchError> {
        let label = self.label(index);

        let properties = self
            .properties
            .ok_or_else(|| FetchError::Parse(format!("feature {label} has no properties")))?;

        let coordinates = self
            .geometry
            .and_then(|g| g.coordinates)
            .ok_or_else(|| FetchError::Parse(format!("feature {label} has no coordinates")))?;

        if coordinates.len() < 2 {
            return Err(FetchError::Parse(format!(
                "feature {label} has {} coordinate value(s), expected at least 2",
                coordinates.len()
            )));
        }

        // GeoJSON positions are [longitude, latitude, depth], not lat/lon.
        let longitude = coordinates[0];
        let latitude = coordinates[1];

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(FetchError::Parse(format!(
                "feature {label} has latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(FetchError::Parse(format!(
                "feature {label} has longitude {longitude} outside [-180, 180]"
            )));
        }

        Ok(SeismicEvent {
            magnitude: properties.mag,
            place: properties.place.unwrap_or_default(),
            latitude,
            longitude,
        })
    }
}

/// Parse a feed body into a dataset, preserving feed order.
///
/// A single malformed feature fails the whole parse rather than being skipped.
pub fn parse_feed(body: &str) -> Result<Dataset, FetchError> {
    let collection: FeatureCollection = serde_json::from_str(body)?;

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| feature.into_event(i))
        .collect()
}

/// Reject anything outside the 2xx range.
fn check_status(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::HttpStatus {
            status: status.as_u16(),
        })
    }
}

/// Anything that can produce a fresh dataset on demand.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Dataset, FetchError>;
}

/// HTTP client for the USGS GeoJSON summary feed.
#[derive(Debug, Clone)]
pub struct UsgsFeed {
    client: Client,
    endpoint: String,
}

impl UsgsFeed {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoint(FEED_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FeedSource for UsgsFeed {
    async fn fetch(&self) -> Result<Dataset, FetchError> {
        debug!(url = %self.endpoint, "fetching earthquake feed");

        let resp = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/geo+json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        check_status(resp.status())?;

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read feed body: {e}")))?;

        let dataset = parse_feed(&body)?;
        info!(events = dataset.len(), "earthquake feed fetched");
        Ok(dataset)
    }
}
