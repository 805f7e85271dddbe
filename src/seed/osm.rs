use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::SeedSettings;
use crate::errors::SeedError;

use super::geometry::{BBox, LatLon};

const OVERPASS_TIMEOUT_SECS: u64 = 180;

/// One OSM way with its tags and node coordinates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsmWay {
    pub id: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub geometry: Vec<OsmPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OsmPoint {
    pub lat: f64,
    pub lon: f64,
}

impl From<OsmPoint> for LatLon {
    fn from(p: OsmPoint) -> Self {
        LatLon { lat: p.lat, lon: p.lon }
    }
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    way: OsmWay,
}

#[derive(Deserialize)]
struct NominatimPlace {
    /// `[south, north, west, east]` as strings.
    boundingbox: Vec<String>,
}

/// Where trail ways come from.
/// Real implementation: `OsmClient`. Tests use canned ways.
#[async_trait]
pub trait TrailSource: Send + Sync {
    /// Resolve a place name to its bounding box.
    async fn geocode(&self, place: &str) -> Result<BBox, SeedError>;

    /// Every `highway` way inside the box, with geometry.
    async fn fetch_ways(&self, bbox: &BBox) -> Result<Vec<OsmWay>, SeedError>;
}

/// Overpass QL for all highway ways in the box with inline geometry.
pub fn overpass_query(bbox: &BBox) -> String {
    format!(
        "[out:json][timeout:{}];way[\"highway\"]({});out geom;",
        OVERPASS_TIMEOUT_SECS,
        bbox.overpass_filter()
    )
}

/// Cache file name for a query: hex SHA-256 of its text.
pub fn cache_key(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

pub fn parse_overpass(body: &str) -> Result<Vec<OsmWay>, SeedError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| SeedError::Overpass(format!("Invalid response: {}", e)))?;
    Ok(response
        .elements
        .into_iter()
        .filter(|el| el.kind == "way")
        .map(|el| el.way)
        .collect())
}

fn parse_nominatim(place: &str, body: &str) -> Result<BBox, SeedError> {
    let not_found = || SeedError::PlaceNotFound {
        place: place.to_string(),
    };
    let results: Vec<NominatimPlace> = serde_json::from_str(body).map_err(|_| not_found())?;
    let first = results.into_iter().next().ok_or_else(not_found)?;
    let coords: Vec<f64> = first
        .boundingbox
        .iter()
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| not_found())?;
    let [south, north, west, east] = coords[..] else {
        return Err(not_found());
    };
    let bbox = BBox { south, west, north, east };
    if !bbox.is_valid() {
        return Err(not_found());
    }
    Ok(bbox)
}

/// Nominatim geocoder plus Overpass fetcher with an on-disk response cache.
pub struct OsmClient {
    http: reqwest::Client,
    overpass_url: String,
    nominatim_url: String,
    cache_dir: PathBuf,
}

impl OsmClient {
    pub fn new(settings: &SeedSettings) -> Result<Self, SeedError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(OVERPASS_TIMEOUT_SECS + 30))
            .user_agent(concat!("hikebot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SeedError::Overpass(e.to_string()))?;
        Ok(Self {
            http,
            overpass_url: settings.overpass_url.clone(),
            nominatim_url: settings.nominatim_url.clone(),
            cache_dir: settings.cache_dir.clone(),
        })
    }

    fn cache_path(&self, query: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", cache_key(query)))
    }

    async fn overpass(&self, query: &str) -> Result<String, SeedError> {
        let cached = self.cache_path(query);
        if let Ok(body) = tokio::fs::read_to_string(&cached).await {
            debug!(path = %cached.display(), "Overpass cache hit");
            return Ok(body);
        }

        let response = self
            .http
            .post(&self.overpass_url)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|e| SeedError::Overpass(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SeedError::Overpass(format!("HTTP {}", response.status())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| SeedError::Overpass(e.to_string()))?;

        if let Err(e) = self.store(&cached, &body).await {
            warn!(path = %cached.display(), error = %e, "Overpass response not cached");
        }
        Ok(body)
    }

    async fn store(&self, path: &Path, body: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(path, body).await
    }
}

#[async_trait]
impl TrailSource for OsmClient {
    async fn geocode(&self, place: &str) -> Result<BBox, SeedError> {
        let response = self
            .http
            .get(&self.nominatim_url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| SeedError::Geocode(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| SeedError::Geocode(e.to_string()))?;
        let bbox = parse_nominatim(place, &body)?;
        info!(place, bbox = %bbox.overpass_filter(), "Place geocoded");
        Ok(bbox)
    }

    async fn fetch_ways(&self, bbox: &BBox) -> Result<Vec<OsmWay>, SeedError> {
        let query = overpass_query(bbox);
        let body = self.overpass(&query).await?;
        parse_overpass(&body)
    }
}
