use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    api::RoutingAPI,
    config::Config,
    entities::Coordinates,
    error::{routing_failed_error, Error},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Geometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Response {
    features: Option<Vec<Feature>>,
}

/// Directions from the OpenRouteService API, GeoJSON flavour.
#[derive(Clone, Debug)]
pub struct OpenRouteService {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    profile: String,
}

impl OpenRouteService {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            url: config.routing_url.trim_end_matches('/').to_string(),
            api_key: config.routing_api_key.clone(),
            profile: config.routing_profile.clone(),
        }
    }

    fn parse(data: Response) -> Result<Vec<Coordinates>, Error> {
        let feature = data
            .features
            .and_then(|features| features.into_iter().next())
            .ok_or_else(routing_failed_error)?;

        let geometry: Vec<Coordinates> = feature
            .geometry
            .coordinates
            .into_iter()
            .map(|[longitude, latitude]| Coordinates {
                latitude,
                longitude,
            })
            .collect();

        if geometry.is_empty() {
            return Err(routing_failed_error());
        }

        Ok(geometry)
    }
}

#[async_trait]
impl RoutingAPI for OpenRouteService {
    #[tracing::instrument(skip(self))]
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Vec<Coordinates>, Error> {
        let url = format!("{}/v2/directions/{}", self.url, self.profile);

        let mut request = self
            .client
            .get(url)
            .query(&[("start", origin.lng_lat_param())])
            .query(&[("end", destination.lng_lat_param())]);

        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }

        let res = request.send().await.map_err(|err| {
            tracing::warn!("routing request failed: {}", err);
            routing_failed_error()
        })?;

        let status_code = res.status().as_u16();

        if status_code != 200 {
            tracing::warn!("routing service answered {}", status_code);
            return Err(routing_failed_error());
        }

        let data: Response = res.json().await.map_err(|err| {
            tracing::warn!("unreadable routing response: {}", err);
            routing_failed_error()
        })?;

        Self::parse(data)
    }
}

#[test]
fn parse_test() {
    let data: Response = serde_json::from_value(serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "summary": { "distance": 157.2 } },
            "geometry": {
                "type": "LineString",
                "coordinates": [[2.35, 48.85], [2.351, 48.851]]
            }
        }]
    }))
    .unwrap();

    let geometry = OpenRouteService::parse(data).unwrap();

    assert_eq!(
        geometry,
        vec![
            Coordinates {
                latitude: 48.85,
                longitude: 2.35
            },
            Coordinates {
                latitude: 48.851,
                longitude: 2.351
            },
        ]
    );
}

#[test]
fn parse_empty_test() {
    let data: Response = serde_json::from_value(serde_json::json!({ "features": [] })).unwrap();
    assert!(OpenRouteService::parse(data)
        .unwrap_err()
        .is_routing_failed_error());

    let data: Response = serde_json::from_value(serde_json::json!({
        "features": [{ "geometry": { "coordinates": [] } }]
    }))
    .unwrap();
    assert!(OpenRouteService::parse(data).is_err());
}
