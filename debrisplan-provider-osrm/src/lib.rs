//! Distance provider backed by an OSRM routing service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::trace;

use debrisplan_core::model::Coordinate;
use debrisplan_core::ports::{DistanceProvider, ProviderError};

/// Public OSRM demo server.
pub const DEFAULT_BASE_URL: &str = "https://router.project-osrm.org";

/// Request timeout applied by [`client`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of a `/route/v1` answer.
#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,

    #[serde(default)]
    message: Option<String>,

    #[serde(default)]
    routes: Vec<RouteEntry>,
}

/// One alternative inside the answer; only the first is used.
#[derive(Debug, Deserialize)]
struct RouteEntry {
    /// Metres.
    distance: f64,

    #[serde(default)]
    geometry: Option<LineString>,
}

/// GeoJSON line string, positions as `[lon, lat]`.
#[derive(Debug, Deserialize)]
struct LineString {
    coordinates: Vec<[f64; 2]>,
}

/// HTTP client with the timeout and user agent the provider expects.
///
/// # Errors
///
/// Returns the [`reqwest::Error`] raised when the TLS backend cannot be initialised.
pub fn client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("debrisplan/", env!("CARGO_PKG_VERSION")))
        .timeout(DEFAULT_TIMEOUT)
        .build()
}

/// Driving distances and route geometry from OSRM.
pub struct OsrmProvider {
    client: Client,
    base_url: String,
}

impl OsrmProvider {
    /// Create a provider for the OSRM instance at `base_url`.
    #[must_use]
    pub fn new<S: Into<String>>(client: Client, base_url: S) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    fn route_request(&self, from: Coordinate, to: Coordinate, full: bool) -> RequestBuilder {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, from.lon, from.lat, to.lon, to.lat
        );
        let req = self.client.get(url);
        if full {
            req.query(&[("overview", "full"), ("geometries", "geojson")])
        } else {
            req.query(&[("overview", "false")])
        }
    }
}

#[async_trait]
impl DistanceProvider for OsrmProvider {
    async fn distance(&self, from: Coordinate, to: Coordinate) -> Result<f64, ProviderError> {
        let answer = fetch_route(self.route_request(from, to, false)).await?;
        let route = first_route(answer)?;
        trace!(%from, %to, metres = route.distance, "OSRM distance");
        Ok(route.distance / 1000.0)
    }

    async fn route(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<Vec<Coordinate>, ProviderError> {
        let answer = fetch_route(self.route_request(from, to, true)).await?;
        let geometry = first_route(answer)?
            .geometry
            .ok_or_else(|| ProviderError::Malformed("route without geometry".to_owned()))?;
        Ok(geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate::new(lat, lon))
            .collect())
    }
}

// OSRM reports "no route" as a 400 with a JSON body, so the body is read before the status.
async fn fetch_route(req: RequestBuilder) -> Result<RouteResponse, ProviderError> {
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    interpret(status, &body)
}

fn interpret(status: u16, body: &str) -> Result<RouteResponse, ProviderError> {
    let parsed = serde_json::from_str::<RouteResponse>(body);
    if matches!(&parsed, Ok(answer) if answer.code == "NoRoute") {
        return Err(ProviderError::NoRoute);
    }
    if !(200..300).contains(&status) {
        return Err(ProviderError::Status(status));
    }
    let answer = parsed.map_err(|err| ProviderError::Malformed(err.to_string()))?;
    if answer.code != "Ok" {
        return Err(ProviderError::Malformed(format!(
            "code {}: {}",
            answer.code,
            answer.message.as_deref().unwrap_or("no message")
        )));
    }
    Ok(answer)
}

fn first_route(answer: RouteResponse) -> Result<RouteEntry, ProviderError> {
    let route = answer
        .routes
        .into_iter()
        .next()
        .ok_or(ProviderError::NoRoute)?;
    if !route.distance.is_finite() || route.distance < 0.0 {
        return Err(ProviderError::Malformed(format!(
            "distance {} m",
            route.distance
        )));
    }
    Ok(route)
}
