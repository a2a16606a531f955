//! The ride state machine.
//!
//! A [`RideSession`] owns the rider's position, the active route (destination,
//! its name and the geometry leading there) and the markers shown on the map.
//! Network-bound transitions are split in two halves, a synchronous `request`
//! or `prepare` step and a `complete` step, so a driver can run the call
//! elsewhere and apply its outcome atomically. The `async` helpers compose
//! both halves for callers that can simply await.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{MarkerAPI, RideAPI, RoutingAPI},
    entities::{Coordinates, Marker, MarkerId, MarkerType, NewMarker, Place, Ride, Route},
    error::{
        duplicate_entity_error, invalid_state_error, location_unavailable_error,
        routing_failed_error, Error,
    },
};

pub const DEFAULT_ARRIVAL_RADIUS_M: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Routing,
    Navigating,
}

/// When a position counts as having reached the destination.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ArrivalPolicy {
    /// Position and destination must be the same spot.
    Exact,
    /// Position within this many meters of the destination.
    Within(f64),
}

impl Default for ArrivalPolicy {
    fn default() -> Self {
        Self::Within(DEFAULT_ARRIVAL_RADIUS_M)
    }
}

impl ArrivalPolicy {
    pub fn from_radius(radius_m: f64) -> Self {
        if radius_m > 0.0 {
            Self::Within(radius_m)
        } else {
            Self::Exact
        }
    }

    pub fn has_arrived(&self, position: &Coordinates, destination: &Coordinates) -> bool {
        match self {
            Self::Exact => position.same_spot(destination),
            Self::Within(radius_m) => {
                position.same_spot(destination) || position.distance_to(destination) <= *radius_m
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RideState {
    pub position: Option<Coordinates>,
    pub last_fix_at: Option<DateTime<Utc>>,
    pub route: Option<Route>,
}

impl RideState {
    pub fn destination(&self) -> Option<&Coordinates> {
        self.route.as_ref().map(|route| &route.destination)
    }

    pub fn destination_name(&self) -> Option<&str> {
        self.route.as_ref().map(|route| route.destination_name.as_str())
    }

    pub fn route_geometry(&self) -> Option<&[Coordinates]> {
        self.route.as_ref().map(|route| route.geometry.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub destination: Coordinates,
    pub destination_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteTicket(u64);

/// Identifies the marker collection a store fetch was started against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MarkerTicket(u64);

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub ticket: RouteTicket,
    pub origin: Coordinates,
    pub place: Place,
}

/// Everything a presentation layer needs to draw the map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub state: RideState,
    pub markers: Vec<Marker>,
}

#[derive(Debug)]
pub struct RideSession {
    id: Uuid,
    state: RideState,
    markers: Vec<Marker>,
    marker_generation: u64,
    pending_route: Option<RouteRequest>,
    next_ticket: u64,
    arrival: ArrivalPolicy,
}

impl Default for RideSession {
    fn default() -> Self {
        Self::new(ArrivalPolicy::default())
    }
}

impl RideSession {
    pub fn new(arrival: ArrivalPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RideState::default(),
            markers: vec![],
            marker_generation: 0,
            pending_route: None,
            next_ticket: 0,
            arrival,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &RideState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        match (&self.pending_route, &self.state.route) {
            (Some(_), _) => Phase::Routing,
            (None, Some(_)) => Phase::Navigating,
            (None, None) => Phase::Idle,
        }
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn markers_of(&self, kind: MarkerType) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |marker| marker.kind == kind)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            state: self.state.clone(),
            markers: self.markers.clone(),
        }
    }

    /// Meters left along the active route, if riding somewhere.
    pub fn remaining_distance(&self) -> Option<f64> {
        let position = self.state.position.as_ref()?;
        let route = self.state.route.as_ref()?;

        Some(route.remaining_distance(position))
    }

    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub fn update_location(&mut self, coordinates: Coordinates) -> Option<Arrival> {
        self.state.position = Some(coordinates);
        self.state.last_fix_at = Some(Utc::now());

        let arrived = match &self.state.route {
            Some(route) => self.arrival.has_arrived(&coordinates, &route.destination),
            None => false,
        };

        if !arrived {
            return None;
        }

        let route = self.state.route.take()?;
        tracing::info!("arrived at {}", route.destination_name);

        Some(Arrival {
            destination: route.destination,
            destination_name: route.destination_name,
        })
    }

    /// Starts routing towards `place`. Any request still in flight is
    /// superseded and its result will be discarded.
    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub fn request_route(&mut self, place: Place) -> Result<RouteRequest, Error> {
        let origin = self.state.position.ok_or_else(location_unavailable_error)?;
        place.validate()?;

        self.next_ticket += 1;
        let request = RouteRequest {
            ticket: RouteTicket(self.next_ticket),
            origin,
            place,
        };
        self.pending_route = Some(request.clone());

        Ok(request)
    }

    /// Applies the outcome of a route request. Returns `Ok(None)` when the
    /// request was superseded or cancelled in the meantime.
    #[tracing::instrument(skip(self, result), fields(session = %self.id))]
    pub fn complete_route(
        &mut self,
        ticket: RouteTicket,
        result: Result<Vec<Coordinates>, Error>,
    ) -> Result<Option<&Route>, Error> {
        let is_current = matches!(&self.pending_route, Some(request) if request.ticket == ticket);

        if !is_current {
            tracing::debug!("discarding stale route result {:?}", ticket);
            return Ok(None);
        }

        let request = self.pending_route.take().ok_or_else(invalid_state_error)?;

        let geometry = match result {
            Ok(geometry) if !geometry.is_empty() => geometry,
            Ok(_) => {
                tracing::warn!("routing to {} returned no geometry", request.place.name);
                return Err(routing_failed_error());
            }
            Err(err) => {
                tracing::warn!("routing to {} failed: {}", request.place.name, err);
                return Err(routing_failed_error());
            }
        };

        tracing::info!(
            "routing to {} with {} points",
            request.place.name,
            geometry.len()
        );

        let route = self.state.route.insert(Route {
            destination: request.place.geometry,
            destination_name: request.place.name,
            geometry,
        });

        Ok(Some(&*route))
    }

    pub async fn select_place<R>(&mut self, routing: &R, place: Place) -> Result<&Route, Error>
    where
        R: RoutingAPI + ?Sized,
    {
        let request = self.request_route(place)?;
        let result = routing
            .route(request.origin, request.place.geometry)
            .await;

        self.complete_route(request.ticket, result)?
            .ok_or_else(invalid_state_error)
    }

    #[tracing::instrument(skip(self), fields(session = %self.id))]
    pub fn cancel_ride(&mut self) -> Result<(), Error> {
        if self.phase() == Phase::Idle {
            return Err(invalid_state_error());
        }

        self.pending_route = None;
        self.state.route = None;

        Ok(())
    }

    pub fn prepare_ride(&self) -> Result<Ride, Error> {
        let route = self.state.route.as_ref().ok_or_else(invalid_state_error)?;

        Ride::new(route.destination_name.clone(), route.destination)
    }

    #[tracing::instrument(skip(self, rides), fields(session = %self.id))]
    pub async fn save_ride<S>(&self, rides: &S) -> Result<Ride, Error>
    where
        S: RideAPI + ?Sized,
    {
        let ride = self.prepare_ride()?;

        rides.add_ride(ride).await
    }

    pub fn replace_markers(&mut self, markers: Vec<Marker>) {
        self.markers = markers;
        self.marker_generation += 1;
    }

    /// Taken before fetching markers from the store; any local change made
    /// while the fetch runs makes the ticket stale.
    pub fn marker_ticket(&self) -> MarkerTicket {
        MarkerTicket(self.marker_generation)
    }

    /// Applies fetched markers unless the local collection changed since
    /// `ticket` was taken. Returns whether they were applied.
    #[tracing::instrument(skip(self, markers), fields(session = %self.id))]
    pub fn complete_markers(&mut self, ticket: MarkerTicket, markers: Vec<Marker>) -> bool {
        if ticket != self.marker_ticket() {
            tracing::debug!("discarding stale markers {:?}", ticket);
            return false;
        }

        self.replace_markers(markers);

        true
    }

    pub async fn load_markers<S>(&mut self, store: &S) -> Result<&[Marker], Error>
    where
        S: MarkerAPI + ?Sized,
    {
        let markers = store.fetch_markers().await?;
        self.replace_markers(markers);

        Ok(&self.markers)
    }

    /// Builds the marker to submit at the current position, rejecting it up
    /// front when one is already known at that spot.
    pub fn prepare_marker(&self, kind: MarkerType) -> Result<NewMarker, Error> {
        let position = self.state.position.ok_or_else(location_unavailable_error)?;

        if self
            .markers
            .iter()
            .any(|marker| marker.geometry.same_spot(&position))
        {
            return Err(duplicate_entity_error("marker"));
        }

        Ok(NewMarker::new(kind, position))
    }

    /// Records a marker the store has accepted. A marker already known under
    /// the same id is replaced.
    pub fn record_marker(&mut self, marker: Marker) {
        self.marker_generation += 1;

        match self.markers.iter_mut().find(|m| m.id == marker.id) {
            Some(known) => {
                tracing::debug!("marker {} already known, replacing it", marker.id);
                *known = marker;
            }
            None => self.markers.push(marker),
        }
    }

    #[tracing::instrument(skip(self, store), fields(session = %self.id))]
    pub async fn add_marker<S>(&mut self, store: &S, kind: MarkerType) -> Result<Marker, Error>
    where
        S: MarkerAPI + ?Sized,
    {
        let new_marker = self.prepare_marker(kind)?;
        let marker = store.add_marker(new_marker).await?;

        self.record_marker(marker.clone());

        Ok(marker)
    }

    /// Drops a marker the store has already deleted.
    pub fn forget_marker(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|marker| marker.id == id)?;
        self.marker_generation += 1;

        Some(self.markers.remove(index))
    }

    #[tracing::instrument(skip(self, store), fields(session = %self.id))]
    pub async fn delete_marker<S>(&mut self, store: &S, id: MarkerId) -> Result<(), Error>
    where
        S: MarkerAPI + ?Sized,
    {
        store.delete_marker(id).await?;
        self.forget_marker(id);

        Ok(())
    }
}

#[cfg(test)]
fn at(latitude: f64, longitude: f64) -> Coordinates {
    Coordinates {
        latitude,
        longitude,
    }
}

#[test]
fn position_tracks_latest_update_test() {
    let mut session = RideSession::default();
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.state().position, None);

    for i in 0..5 {
        let fix = at(0.001 * i as f64, 0.0);
        assert_eq!(session.update_location(fix), None);
        assert_eq!(session.state().position, Some(fix));
    }

    assert!(session.state().last_fix_at.is_some());
}

#[test]
fn select_place_test() {
    use crate::external::memory::FixedRouter;
    use tokio_test::block_on;

    let mut session = RideSession::new(ArrivalPolicy::Exact);
    session.update_location(at(0.0, 0.0));

    let router = FixedRouter::new(vec![at(0.0, 0.0), at(0.5, 0.5), at(1.0, 1.0)]);
    block_on(session.select_place(&router, Place::new("Cafe", at(1.0, 1.0)))).unwrap();

    let state = session.state();
    assert_eq!(session.phase(), Phase::Navigating);
    assert_eq!(state.destination(), Some(&at(1.0, 1.0)));
    assert_eq!(state.destination_name(), Some("Cafe"));
    assert_eq!(
        state.route_geometry(),
        Some(&[at(0.0, 0.0), at(0.5, 0.5), at(1.0, 1.0)][..])
    );

    // riding halfway is not arriving
    assert_eq!(session.update_location(at(0.5, 0.5)), None);
    assert_eq!(session.phase(), Phase::Navigating);

    let arrival = session.update_location(at(1.0, 1.0)).unwrap();
    assert_eq!(arrival.destination_name, "Cafe");
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.state().destination(), None);
    assert_eq!(session.state().destination_name(), None);
    assert_eq!(session.state().route_geometry(), None);

    // arriving is reported once
    assert_eq!(session.update_location(at(1.0, 1.0)), None);
}

#[test]
fn select_place_requires_position_test() {
    let mut session = RideSession::default();

    let err = session
        .request_route(Place::new("Cafe", at(1.0, 1.0)))
        .unwrap_err();

    assert!(err.is_location_unavailable_error());
    assert_eq!(session.phase(), Phase::Idle);
}

#[test]
fn routing_failure_leaves_state_test() {
    use crate::error::upstream_error;

    let mut session = RideSession::default();
    session.update_location(at(0.0, 0.0));

    let first = session.request_route(Place::new("Cafe", at(1.0, 1.0))).unwrap();
    session
        .complete_route(first.ticket, Ok(vec![at(0.0, 0.0), at(1.0, 1.0)]))
        .unwrap();
    let before = session.state().clone();

    let second = session.request_route(Place::new("Bakery", at(2.0, 2.0))).unwrap();
    assert_eq!(session.phase(), Phase::Routing);

    let err = session
        .complete_route(second.ticket, Err(upstream_error()))
        .unwrap_err();
    assert!(err.is_routing_failed_error());
    assert_eq!(session.state(), &before);
    assert_eq!(session.phase(), Phase::Navigating);

    let third = session.request_route(Place::new("Bakery", at(2.0, 2.0))).unwrap();
    let err = session.complete_route(third.ticket, Ok(vec![])).unwrap_err();
    assert!(err.is_routing_failed_error());
    assert_eq!(session.state(), &before);
}

#[test]
fn stale_route_is_discarded_test() {
    let mut session = RideSession::default();
    session.update_location(at(0.0, 0.0));

    let stale = session.request_route(Place::new("Cafe", at(1.0, 1.0))).unwrap();
    let current = session.request_route(Place::new("Bakery", at(2.0, 2.0))).unwrap();

    let outcome = session
        .complete_route(stale.ticket, Ok(vec![at(0.0, 0.0), at(1.0, 1.0)]))
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(session.phase(), Phase::Routing);

    session
        .complete_route(current.ticket, Ok(vec![at(0.0, 0.0), at(2.0, 2.0)]))
        .unwrap();
    assert_eq!(session.state().destination_name(), Some("Bakery"));

    // a cancelled request never lands
    let cancelled = session.request_route(Place::new("Cafe", at(1.0, 1.0))).unwrap();
    session.cancel_ride().unwrap();
    let outcome = session
        .complete_route(cancelled.ticket, Ok(vec![at(0.0, 0.0), at(1.0, 1.0)]))
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(session.phase(), Phase::Idle);
}

#[test]
fn cancel_ride_test() {
    let mut session = RideSession::default();
    assert!(session.cancel_ride().unwrap_err().is_invalid_state_error());

    session.update_location(at(0.0, 0.0));
    let request = session.request_route(Place::new("Cafe", at(1.0, 1.0))).unwrap();
    session
        .complete_route(request.ticket, Ok(vec![at(0.0, 0.0), at(1.0, 1.0)]))
        .unwrap();

    session.cancel_ride().unwrap();
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.state().route, None);
    assert_eq!(session.state().position, Some(at(0.0, 0.0)));
}

#[test]
fn arrival_policy_test() {
    let destination = at(48.0, 2.0);
    let nearby = at(48.00005, 2.0);

    assert!(!ArrivalPolicy::Exact.has_arrived(&nearby, &destination));
    assert!(ArrivalPolicy::Exact.has_arrived(&destination, &destination));
    assert!(ArrivalPolicy::Within(10.0).has_arrived(&nearby, &destination));
    assert!(!ArrivalPolicy::Within(1.0).has_arrived(&nearby, &destination));
    assert_eq!(ArrivalPolicy::from_radius(0.0), ArrivalPolicy::Exact);
}

#[test]
fn save_ride_test() {
    use crate::external::memory::InMemoryBackend;
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();
    let mut session = RideSession::default();

    assert!(block_on(session.save_ride(&backend))
        .unwrap_err()
        .is_invalid_state_error());

    session.update_location(at(0.0, 0.0));
    block_on(session.select_place(&backend, Place::new("Cafe", at(1.0, 1.0)))).unwrap();

    let ride = block_on(session.save_ride(&backend)).unwrap();
    assert_eq!(ride.name, "Cafe");
    let before = session.state().clone();

    let err = block_on(session.save_ride(&backend)).unwrap_err();
    assert!(err.is_duplicate_entity_error());
    assert_eq!(session.state(), &before);
}

#[test]
fn add_marker_test() {
    use crate::external::memory::InMemoryBackend;
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();
    let mut session = RideSession::default();

    let err = block_on(session.add_marker(&backend, MarkerType::Plothole)).unwrap_err();
    assert!(err.is_location_unavailable_error());

    session.update_location(at(0.0, 0.0));
    let marker = block_on(session.add_marker(&backend, MarkerType::Plothole)).unwrap();
    assert_eq!(marker.geometry, at(0.0, 0.0));
    assert_eq!(session.markers().len(), 1);

    // same spot, different kind: still a duplicate, caught locally
    let err = block_on(session.add_marker(&backend, MarkerType::DenseTraffic)).unwrap_err();
    assert!(err.is_duplicate_entity_error());
    assert_eq!(session.markers(), &[marker.clone()]);

    session.update_location(at(0.001, 0.0));
    block_on(session.add_marker(&backend, MarkerType::DenseTraffic)).unwrap();
    assert_eq!(session.markers_of(MarkerType::Plothole).count(), 1);
    assert_eq!(session.markers_of(MarkerType::DenseTraffic).count(), 1);
}

#[test]
fn add_marker_duplicate_in_store_test() {
    use crate::external::memory::InMemoryBackend;
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();

    // another rider declared it, this session has not fetched it yet
    let mut other = RideSession::default();
    other.update_location(at(0.0, 0.0));
    block_on(other.add_marker(&backend, MarkerType::Plothole)).unwrap();

    let mut session = RideSession::default();
    session.update_location(at(0.0, 0.0));

    let err = block_on(session.add_marker(&backend, MarkerType::Plothole)).unwrap_err();
    assert!(err.is_duplicate_entity_error());
    assert!(session.markers().is_empty());

    block_on(session.load_markers(&backend)).unwrap();
    assert_eq!(session.markers().len(), 1);
}

#[test]
fn delete_marker_test() {
    use crate::external::memory::InMemoryBackend;
    use tokio_test::block_on;

    let backend = InMemoryBackend::new();
    let mut session = RideSession::default();

    session.update_location(at(0.0, 0.0));
    let first = block_on(session.add_marker(&backend, MarkerType::Plothole)).unwrap();
    session.update_location(at(0.0, 0.001));
    let second = block_on(session.add_marker(&backend, MarkerType::DenseTraffic)).unwrap();

    block_on(session.delete_marker(&backend, first.id)).unwrap();
    assert_eq!(session.markers(), &[second.clone()]);

    let err = block_on(session.delete_marker(&backend, first.id)).unwrap_err();
    assert!(err.is_not_found_error());
    assert_eq!(session.markers(), &[second]);
}

#[test]
fn remaining_distance_test() {
    let mut session = RideSession::default();
    assert_eq!(session.remaining_distance(), None);

    session.update_location(at(0.0, 0.0));
    let request = session.request_route(Place::new("Depot", at(0.0, 0.01))).unwrap();
    session
        .complete_route(request.ticket, Ok(vec![at(0.0, 0.0), at(0.0, 0.01)]))
        .unwrap();

    let remaining = session.remaining_distance().unwrap();
    assert!((remaining - 1_112.0).abs() < 5.0, "got {}", remaining);
}

#[test]
fn stale_markers_are_discarded_test() {
    let marker = |id: MarkerId, longitude: f64| Marker {
        id,
        kind: MarkerType::Plothole,
        geometry: at(0.0, longitude),
    };

    let mut session = RideSession::default();

    let ticket = session.marker_ticket();
    assert!(session.complete_markers(ticket, vec![marker(1, 0.0)]));
    assert_eq!(session.markers().len(), 1);

    // a fetch started before a local add must not wipe it out
    let before_add = session.marker_ticket();
    session.record_marker(marker(2, 0.001));
    assert!(!session.complete_markers(before_add, vec![marker(1, 0.0)]));
    assert_eq!(session.markers().len(), 2);

    // nor bring back a marker deleted meanwhile
    let before_delete = session.marker_ticket();
    session.forget_marker(1);
    let fetched = vec![marker(1, 0.0), marker(2, 0.001)];
    assert!(!session.complete_markers(before_delete, fetched));
    assert_eq!(session.markers(), &[marker(2, 0.001)]);

    // forgetting an unknown marker changes nothing
    let ticket = session.marker_ticket();
    assert_eq!(session.forget_marker(42), None);
    assert!(session.complete_markers(ticket, vec![marker(2, 0.001)]));
}

#[test]
fn record_known_marker_replaces_it_test() {
    let mut session = RideSession::default();
    let mut marker = Marker {
        id: 7,
        kind: MarkerType::Plothole,
        geometry: at(0.0, 0.0),
    };

    session.record_marker(marker.clone());
    marker.kind = MarkerType::DenseTraffic;
    session.record_marker(marker.clone());

    assert_eq!(session.markers(), &[marker]);
}
