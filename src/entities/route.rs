use geo_types::LineString;
use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;

/// The destination the user is riding to, with the geometry leading there.
/// All three fields exist together or not at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Coordinates,
    pub destination_name: String,
    pub geometry: Vec<Coordinates>,
}

impl Route {
    pub fn line_string(&self) -> LineString<f64> {
        self.geometry.iter().map(|&c| geo_types::Coord::from(c)).collect()
    }

    /// Meters left to ride from `position`, following the geometry from the
    /// closest vertex onwards.
    pub fn remaining_distance(&self, position: &Coordinates) -> f64 {
        let closest = self
            .geometry
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                position
                    .distance_to(a)
                    .total_cmp(&position.distance_to(b))
            })
            .map(|(index, _)| index);

        let closest = match closest {
            Some(index) => index,
            None => return position.distance_to(&self.destination),
        };

        let along: f64 = self.geometry[closest..]
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum();

        position.distance_to(&self.geometry[closest]) + along
    }
}

#[test]
fn remaining_distance_test() {
    let at = |latitude: f64, longitude: f64| Coordinates {
        latitude,
        longitude,
    };

    let route = Route {
        destination: at(0.0, 0.02),
        destination_name: "Depot".into(),
        geometry: vec![at(0.0, 0.0), at(0.0, 0.01), at(0.0, 0.02)],
    };

    let full = route.remaining_distance(&at(0.0, 0.0));
    let half = route.remaining_distance(&at(0.0, 0.01));

    assert!((full - 2.0 * half).abs() < 1.0);
    assert!(route.remaining_distance(&at(0.0, 0.02)) < 1e-6);
    assert_eq!(route.line_string().0.len(), 3);
}
