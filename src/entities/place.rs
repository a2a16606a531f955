use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;
use crate::error::{invalid_input_error, Error};

/// A search result the user can pick as destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub geometry: Coordinates,
}

impl Place {
    pub fn new(name: impl Into<String>, geometry: Coordinates) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(invalid_input_error());
        }

        self.geometry.validate()
    }
}

#[test]
fn validate_test() {
    let cafe = Place::new(
        "Cafe",
        Coordinates {
            latitude: 1.0,
            longitude: 1.0,
        },
    );
    assert!(cafe.validate().is_ok());

    let unnamed = Place::new("  ", cafe.geometry);
    assert!(unnamed.validate().unwrap_err().is_invalid_input_error());

    let off_map = Place::new(
        "Nowhere",
        Coordinates {
            latitude: 120.0,
            longitude: 0.0,
        },
    );
    assert!(off_map.validate().is_err());
}
