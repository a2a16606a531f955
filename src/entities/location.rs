use geo_types::{Coord, Point};
use serde::{Deserialize, Serialize};

use crate::error::{invalid_input_error, Error};

/// Two readings closer than this on both axes are the same spot (about 1cm).
pub const COORDINATE_EPSILON: f64 = 1e-7;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Error> {
        let coordinates = Self {
            latitude,
            longitude,
        };
        coordinates.validate()?;

        Ok(coordinates)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let valid = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);

        match valid {
            true => Ok(()),
            false => Err(invalid_input_error()),
        }
    }

    pub fn same_spot(&self, other: &Coordinates) -> bool {
        (self.latitude - other.latitude).abs() <= COORDINATE_EPSILON
            && (self.longitude - other.longitude).abs() <= COORDINATE_EPSILON
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lng = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Routing APIs speak GeoJSON order.
    pub fn lng_lat_param(&self) -> String {
        format!("{},{}", self.longitude, self.latitude)
    }
}

impl From<Coordinates> for Coord<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Coord {
            x: coordinates.longitude,
            y: coordinates.latitude,
        }
    }
}

impl From<Coord<f64>> for Coordinates {
    fn from(coord: Coord<f64>) -> Self {
        Coordinates {
            latitude: coord.y,
            longitude: coord.x,
        }
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.longitude, coordinates.latitude)
    }
}

#[test]
fn validate_test() {
    assert!(Coordinates::new(48.85, 2.35).is_ok());
    assert!(Coordinates::new(90.0, -180.0).is_ok());

    assert!(Coordinates::new(90.5, 0.0).unwrap_err().is_invalid_input_error());
    assert!(Coordinates::new(0.0, 181.0).is_err());
    assert!(Coordinates::new(f64::NAN, 0.0).is_err());
}

#[test]
fn same_spot_test() {
    let a = Coordinates {
        latitude: 1.0,
        longitude: 1.0,
    };
    let drifted = Coordinates {
        latitude: 1.0 + 1e-9,
        longitude: 1.0,
    };
    let elsewhere = Coordinates {
        latitude: 1.0001,
        longitude: 1.0,
    };

    assert!(a.same_spot(&a));
    assert!(a.same_spot(&drifted));
    assert!(!a.same_spot(&elsewhere));
}

#[test]
fn distance_test() {
    let paris = Coordinates {
        latitude: 48.8566,
        longitude: 2.3522,
    };
    let london = Coordinates {
        latitude: 51.5074,
        longitude: -0.1278,
    };

    let distance = paris.distance_to(&london);
    assert!((distance - 343_500.0).abs() < 1_500.0, "got {}", distance);
    assert_eq!(paris.distance_to(&paris), 0.0);
}

#[test]
fn geo_types_test() {
    let coordinates = Coordinates {
        latitude: 48.0,
        longitude: 2.0,
    };

    let coord: Coord<f64> = coordinates.into();
    assert_eq!(coord.x, 2.0);
    assert_eq!(coord.y, 48.0);
    assert_eq!(Coordinates::from(coord), coordinates);
    assert_eq!(coordinates.lng_lat_param(), "2,48");
}
