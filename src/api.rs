use async_trait::async_trait;
use std::sync::Arc;

use crate::entities::{Account, Coordinates, Marker, MarkerId, NewMarker, Ride};
use crate::error::Error;

#[async_trait]
pub trait RoutingAPI {
    /// Coordinates leading from `origin` to `destination`, in riding order.
    async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<Vec<Coordinates>, Error>;
}

#[async_trait]
pub trait MarkerAPI {
    async fn fetch_markers(&self) -> Result<Vec<Marker>, Error>;

    /// Fails with a duplicate entity error when a marker already sits at the
    /// same coordinates.
    async fn add_marker(&self, marker: NewMarker) -> Result<Marker, Error>;

    async fn delete_marker(&self, id: MarkerId) -> Result<(), Error>;
}

#[async_trait]
pub trait RideAPI {
    async fn add_ride(&self, ride: Ride) -> Result<Ride, Error>;
    async fn fetch_rides(&self) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait AccountAPI {
    async fn add_account(&self, account: Account) -> Result<(), Error>;
    async fn retrieve_password(&self, email: String) -> Result<(), Error>;
}

pub trait API: RoutingAPI + MarkerAPI + RideAPI + AccountAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
