mod account;
mod location;
mod marker;
mod place;
mod ride;
mod route;

pub use account::{Account, Credentials, PasswordRetrieval, Registration};
pub use location::{Coordinates, COORDINATE_EPSILON};
pub use marker::{Marker, MarkerId, MarkerType, NewMarker};
pub use place::Place;
pub use ride::Ride;
pub use route::Route;
