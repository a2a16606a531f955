use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use validator::Validate;

use crate::{
    api::{AccountAPI, MarkerAPI, RideAPI, RoutingAPI, API},
    config::Config,
    entities::{
        Account, Coordinates, Credentials, Marker, MarkerId, NewMarker, PasswordRetrieval, Ride,
    },
    error::{
        duplicate_entity_error, invalid_input_error, not_found_error, upstream_error, Error,
    },
    external::routing::OpenRouteService,
};

/// The REST backend holding markers, rides and accounts.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: Config,
    credentials: Option<Credentials>,
    routing: OpenRouteService,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("scootio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            routing: OpenRouteService::new(client.clone(), config),
            client,
            config: config.clone(),
            credentials: None,
        })
    }

    /// Sends every store request on behalf of the logged in rider.
    pub fn with_credentials(mut self, credentials: Credentials) -> Result<Self, Error> {
        credentials.validate()?;
        self.credentials = Some(credentials);

        Ok(self)
    }

    fn request(&self, method: Method, url: impl AsRef<str>) -> RequestBuilder {
        let request = self.client.request(method, url.as_ref());

        match &self.credentials {
            Some(credentials) => {
                request.basic_auth(&credentials.email, Some(&credentials.password))
            }
            None => request,
        }
    }
}

/// Maps a store response onto the crate's error kinds.
fn check_status(res: Response, entity: &str) -> Result<Response, Error> {
    let status_code = res.status().as_u16();

    match status_code {
        200..=299 => Ok(res),
        404 => Err(not_found_error(entity)),
        409 => Err(duplicate_entity_error(entity)),
        400..=499 => Err(invalid_input_error()),
        _ => {
            tracing::warn!("backend answered {} for {}", status_code, entity);
            Err(upstream_error())
        }
    }
}

#[async_trait]
impl RoutingAPI for HttpBackend {
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Vec<Coordinates>, Error> {
        self.routing.route(origin, destination).await
    }
}

#[async_trait]
impl MarkerAPI for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn fetch_markers(&self) -> Result<Vec<Marker>, Error> {
        let res = self
            .request(Method::GET, self.config.resource_url("markers"))
            .send()
            .await?;

        Ok(check_status(res, "marker")?.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn add_marker(&self, marker: NewMarker) -> Result<Marker, Error> {
        marker.geometry.validate()?;

        let res = self
            .request(Method::POST, self.config.resource_url("markers"))
            .json(&marker)
            .send()
            .await?;

        Ok(check_status(res, "marker")?.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_marker(&self, id: MarkerId) -> Result<(), Error> {
        let url = format!("{}/{}", self.config.resource_url("markers"), id);
        let res = self.request(Method::DELETE, url).send().await?;

        check_status(res, "marker")?;

        Ok(())
    }
}

#[async_trait]
impl RideAPI for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn add_ride(&self, ride: Ride) -> Result<Ride, Error> {
        let res = self
            .request(Method::POST, self.config.resource_url("rides"))
            .json(&ride)
            .send()
            .await?;

        Ok(check_status(res, "ride")?.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_rides(&self) -> Result<Vec<Ride>, Error> {
        let res = self
            .request(Method::GET, self.config.resource_url("rides"))
            .send()
            .await?;

        Ok(check_status(res, "ride")?.json().await?)
    }
}

#[async_trait]
impl AccountAPI for HttpBackend {
    #[tracing::instrument(skip(self, account), fields(email = %account.email))]
    async fn add_account(&self, account: Account) -> Result<(), Error> {
        let res = self
            .client
            .post(self.config.resource_url("accounts"))
            .json(&account)
            .send()
            .await?;

        check_status(res, "account")?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_password(&self, email: String) -> Result<(), Error> {
        let retrieval = PasswordRetrieval { email };
        retrieval.validate()?;

        let mut url = Url::parse(&self.config.resource_url("accounts"))
            .map_err(|_| invalid_input_error())?;
        url.path_segments_mut()
            .map_err(|_| invalid_input_error())?
            .push("retrieve_password")
            .push(&retrieval.email);

        let res = self.client.post(url).send().await?;

        check_status(res, "account")?;

        Ok(())
    }
}

impl API for HttpBackend {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::{
        extract::{Extension, Path, Query},
        http::StatusCode,
        routing::{delete, get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::entities::MarkerType;
    use crate::external::memory::{InMemoryBackend, StraightLineRouter};

    type Store = Arc<InMemoryBackend>;

    fn status(err: Error) -> StatusCode {
        if err.is_duplicate_entity_error() {
            StatusCode::CONFLICT
        } else if err.is_not_found_error() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    async fn list_markers(
        Extension(store): Extension<Store>,
    ) -> Result<Json<Vec<Marker>>, StatusCode> {
        store.fetch_markers().await.map(Json).map_err(status)
    }

    async fn add_marker(
        Extension(store): Extension<Store>,
        Json(marker): Json<NewMarker>,
    ) -> Result<Json<Marker>, StatusCode> {
        store.add_marker(marker).await.map(Json).map_err(status)
    }

    async fn delete_marker(
        Extension(store): Extension<Store>,
        Path(id): Path<MarkerId>,
    ) -> Result<StatusCode, StatusCode> {
        store
            .delete_marker(id)
            .await
            .map(|_| StatusCode::OK)
            .map_err(status)
    }

    async fn list_rides(
        Extension(store): Extension<Store>,
    ) -> Result<Json<Vec<Ride>>, StatusCode> {
        store.fetch_rides().await.map(Json).map_err(status)
    }

    async fn add_ride(
        Extension(store): Extension<Store>,
        Json(ride): Json<Ride>,
    ) -> Result<Json<Ride>, StatusCode> {
        store.add_ride(ride).await.map(Json).map_err(status)
    }

    async fn add_account(
        Extension(store): Extension<Store>,
        Json(account): Json<Account>,
    ) -> Result<StatusCode, StatusCode> {
        store
            .add_account(account)
            .await
            .map(|_| StatusCode::CREATED)
            .map_err(status)
    }

    async fn retrieve_password(
        Extension(store): Extension<Store>,
        Path(email): Path<String>,
    ) -> Result<StatusCode, StatusCode> {
        store
            .retrieve_password(email)
            .await
            .map(|_| StatusCode::OK)
            .map_err(status)
    }

    fn lng_lat(param: Option<&String>) -> Option<Coordinates> {
        let (longitude, latitude) = param?.split_once(',')?;

        Some(Coordinates {
            latitude: latitude.parse().ok()?,
            longitude: longitude.parse().ok()?,
        })
    }

    async fn directions(
        Path(_profile): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        let start = lng_lat(params.get("start")).ok_or(StatusCode::BAD_REQUEST)?;
        let end = lng_lat(params.get("end")).ok_or(StatusCode::BAD_REQUEST)?;

        let coordinates: Vec<[f64; 2]> = StraightLineRouter::new(2)
            .plot(start, end)
            .into_iter()
            .map(|c| [c.longitude, c.latitude])
            .collect();

        Ok(Json(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates }
            }]
        })))
    }

    async fn serve() -> Config {
        let store: Store = Arc::new(InMemoryBackend::new());

        let app = Router::new()
            .route("/api/markers", get(list_markers).post(add_marker))
            .route("/api/markers/:id", delete(delete_marker))
            .route("/api/rides", get(list_rides).post(add_ride))
            .route("/api/accounts", post(add_account))
            .route(
                "/api/accounts/retrieve_password/:email",
                post(retrieve_password),
            )
            .route("/broken/markers", get(|| async { StatusCode::BAD_GATEWAY }))
            .route("/v2/directions/:profile", get(directions))
            .layer(Extension(store));

        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);

        Config {
            backend_url: format!("http://{}", addr),
            routing_url: format!("http://{}", addr),
            ..Config::default()
        }
    }

    fn at(latitude: f64, longitude: f64) -> Coordinates {
        Coordinates {
            latitude,
            longitude,
        }
    }

    #[tokio::test]
    async fn markers_test() {
        let backend = HttpBackend::new(&serve().await).unwrap();

        let marker = backend
            .add_marker(NewMarker::new(MarkerType::Plothole, at(1.0, 1.0)))
            .await
            .unwrap();
        assert_eq!(marker.geometry, at(1.0, 1.0));

        let err = backend
            .add_marker(NewMarker::new(MarkerType::DenseTraffic, at(1.0, 1.0)))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_entity_error());

        assert_eq!(backend.fetch_markers().await.unwrap(), vec![marker.clone()]);

        backend.delete_marker(marker.id).await.unwrap();
        let err = backend.delete_marker(marker.id).await.unwrap_err();
        assert!(err.is_not_found_error());
        assert!(backend.fetch_markers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rides_test() {
        let backend = HttpBackend::new(&serve().await).unwrap();
        let ride = Ride::new("Cafe", at(1.0, 1.0)).unwrap();

        assert_eq!(backend.add_ride(ride.clone()).await.unwrap(), ride);
        let err = backend.add_ride(ride.clone()).await.unwrap_err();
        assert!(err.is_duplicate_entity_error());
        assert_eq!(backend.fetch_rides().await.unwrap(), vec![ride]);
    }

    #[tokio::test]
    async fn accounts_test() {
        use crate::entities::Registration;

        let backend = HttpBackend::new(&serve().await).unwrap();
        let account = Registration {
            email: "rider@example.com".into(),
            password: "correct horse".into(),
            password_confirm: "correct horse".into(),
        }
        .into_account()
        .unwrap();

        let err = backend
            .retrieve_password("rider@example.com".into())
            .await
            .unwrap_err();
        assert!(err.is_not_found_error());

        backend.add_account(account.clone()).await.unwrap();
        let err = backend.add_account(account).await.unwrap_err();
        assert!(err.is_duplicate_entity_error());

        backend
            .retrieve_password("rider@example.com".into())
            .await
            .unwrap();

        let err = backend
            .retrieve_password("not-an-email".into())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input_error());
    }

    #[tokio::test]
    async fn routing_test() {
        let backend = HttpBackend::new(&serve().await).unwrap();

        let geometry = backend.route(at(0.0, 0.0), at(1.0, 2.0)).await.unwrap();

        assert_eq!(geometry, vec![at(0.0, 0.0), at(0.5, 1.0), at(1.0, 2.0)]);
    }

    #[tokio::test]
    async fn upstream_failure_test() {
        let config = Config {
            api_prefix: "broken".into(),
            ..serve().await
        };
        let backend = HttpBackend::new(&config).unwrap();

        let err = backend.fetch_markers().await.unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn credentials_are_validated_test() {
        let backend = HttpBackend::new(&Config::default()).unwrap();

        let err = backend
            .with_credentials(Credentials {
                email: "rider".into(),
                password: "pw".into(),
            })
            .unwrap_err();
        assert!(err.is_invalid_input_error());
    }
}
