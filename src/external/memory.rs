//! Stores that live in process memory, with the same uniqueness rules as the
//! backend. Used for offline rides and as the test double for every store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use geo_types::Line;
use tokio::sync::Mutex;

use crate::{
    api::{AccountAPI, MarkerAPI, RideAPI, RoutingAPI, API},
    entities::{Account, Coordinates, Marker, MarkerId, NewMarker, Ride},
    error::{duplicate_entity_error, not_found_error, routing_failed_error, Error},
};

/// Routes along a straight line, split into `segments` legs.
#[derive(Clone, Debug)]
pub struct StraightLineRouter {
    segments: usize,
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        Self { segments: 8 }
    }
}

impl StraightLineRouter {
    pub fn new(segments: usize) -> Self {
        Self {
            segments: segments.max(1),
        }
    }

    pub fn plot(&self, origin: Coordinates, destination: Coordinates) -> Vec<Coordinates> {
        let line = Line::new(origin, destination);
        let delta = line.delta();

        (0..=self.segments)
            .map(|step| {
                let t = step as f64 / self.segments as f64;
                Coordinates::from(geo_types::Coord {
                    x: line.start.x + delta.x * t,
                    y: line.start.y + delta.y * t,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RoutingAPI for StraightLineRouter {
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Vec<Coordinates>, Error> {
        Ok(self.plot(origin, destination))
    }
}

/// Always answers with the same geometry, or fails when given none.
#[derive(Clone, Debug, Default)]
pub struct FixedRouter {
    geometry: Option<Vec<Coordinates>>,
}

impl FixedRouter {
    pub fn new(geometry: Vec<Coordinates>) -> Self {
        Self {
            geometry: Some(geometry),
        }
    }

    pub fn failing() -> Self {
        Self { geometry: None }
    }
}

#[async_trait]
impl RoutingAPI for FixedRouter {
    async fn route(&self, _: Coordinates, _: Coordinates) -> Result<Vec<Coordinates>, Error> {
        self.geometry.clone().ok_or_else(routing_failed_error)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBackend<R = StraightLineRouter> {
    router: R,
    next_marker_id: AtomicI64,
    markers: Mutex<Vec<Marker>>,
    rides: Mutex<Vec<Ride>>,
    accounts: Mutex<HashMap<String, Account>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> InMemoryBackend<R> {
    pub fn with_router(router: R) -> Self {
        Self {
            router,
            next_marker_id: AtomicI64::new(0),
            markers: Mutex::new(vec![]),
            rides: Mutex::new(vec![]),
            accounts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<R> RoutingAPI for InMemoryBackend<R>
where
    R: RoutingAPI + Send + Sync,
{
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Vec<Coordinates>, Error> {
        self.router.route(origin, destination).await
    }
}

#[async_trait]
impl<R: Send + Sync> MarkerAPI for InMemoryBackend<R> {
    async fn fetch_markers(&self) -> Result<Vec<Marker>, Error> {
        Ok(self.markers.lock().await.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn add_marker(&self, marker: NewMarker) -> Result<Marker, Error> {
        marker.geometry.validate()?;

        let mut markers = self.markers.lock().await;

        if markers
            .iter()
            .any(|existing| existing.geometry.same_spot(&marker.geometry))
        {
            return Err(duplicate_entity_error("marker"));
        }

        let id = self.next_marker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let marker = marker.with_id(id);
        markers.push(marker.clone());

        Ok(marker)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_marker(&self, id: MarkerId) -> Result<(), Error> {
        let mut markers = self.markers.lock().await;

        let index = markers
            .iter()
            .position(|marker| marker.id == id)
            .ok_or_else(|| not_found_error("marker"))?;
        markers.remove(index);

        Ok(())
    }
}

#[async_trait]
impl<R: Send + Sync> RideAPI for InMemoryBackend<R> {
    #[tracing::instrument(skip(self))]
    async fn add_ride(&self, ride: Ride) -> Result<Ride, Error> {
        let mut rides = self.rides.lock().await;

        if rides.iter().any(|existing| existing.name == ride.name) {
            return Err(duplicate_entity_error("ride"));
        }
        rides.push(ride.clone());

        Ok(ride)
    }

    async fn fetch_rides(&self) -> Result<Vec<Ride>, Error> {
        Ok(self.rides.lock().await.clone())
    }
}

#[async_trait]
impl<R: Send + Sync> AccountAPI for InMemoryBackend<R> {
    #[tracing::instrument(skip(self, account), fields(email = %account.email))]
    async fn add_account(&self, account: Account) -> Result<(), Error> {
        let mut accounts = self.accounts.lock().await;

        if accounts.contains_key(&account.email) {
            return Err(duplicate_entity_error("account"));
        }
        accounts.insert(account.email.clone(), account);

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_password(&self, email: String) -> Result<(), Error> {
        match self.accounts.lock().await.contains_key(&email) {
            true => Ok(()),
            false => Err(not_found_error("account")),
        }
    }
}

impl<R: RoutingAPI + Send + Sync> API for InMemoryBackend<R> {}

#[test]
fn straight_line_test() {
    let router = StraightLineRouter::new(4);
    let origin = Coordinates {
        latitude: 0.0,
        longitude: 0.0,
    };
    let destination = Coordinates {
        latitude: 1.0,
        longitude: 2.0,
    };

    let geometry = router.plot(origin, destination);

    assert_eq!(geometry.len(), 5);
    assert_eq!(geometry[0], origin);
    assert_eq!(geometry[2].latitude, 0.5);
    assert_eq!(geometry[2].longitude, 1.0);
    assert_eq!(geometry[4], destination);
}

#[test]
fn rides_test() {
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();
    let cafe = Ride::new(
        "Cafe",
        Coordinates {
            latitude: 1.0,
            longitude: 1.0,
        },
    )
    .unwrap();

    block_on(backend.add_ride(cafe.clone())).unwrap();
    let err = block_on(backend.add_ride(cafe.clone())).unwrap_err();
    assert!(err.is_duplicate_entity_error());

    assert_eq!(block_on(backend.fetch_rides()).unwrap(), vec![cafe]);
}

#[test]
fn accounts_test() {
    use crate::entities::Registration;
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();
    let account = Registration {
        email: "rider@example.com".into(),
        password: "correct horse".into(),
        password_confirm: "correct horse".into(),
    }
    .into_account()
    .unwrap();

    let err = block_on(backend.retrieve_password("rider@example.com".into())).unwrap_err();
    assert!(err.is_not_found_error());

    block_on(backend.add_account(account.clone())).unwrap();
    assert!(block_on(backend.add_account(account))
        .unwrap_err()
        .is_duplicate_entity_error());
    assert!(block_on(backend.retrieve_password("rider@example.com".into())).is_ok());
}
