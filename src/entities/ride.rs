use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;
use crate::error::{invalid_input_error, Error};

/// A saved ride; the name is unique per account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub name: String,
    pub destination: Coordinates,
}

impl Ride {
    pub fn new(name: impl Into<String>, destination: Coordinates) -> Result<Self, Error> {
        let name: String = name.into();

        if name.trim().is_empty() {
            return Err(invalid_input_error());
        }
        destination.validate()?;

        Ok(Self { name, destination })
    }
}
