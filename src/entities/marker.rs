use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;

pub type MarkerId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    Plothole,
    DenseTraffic,
}

impl MarkerType {
    pub fn name(&self) -> String {
        match self {
            Self::Plothole => "plothole".into(),
            Self::DenseTraffic => "dense_traffic".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    #[serde(rename = "type")]
    pub kind: MarkerType,
    pub geometry: Coordinates,
}

/// A marker as submitted to the store, before it has been given an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMarker {
    #[serde(rename = "type")]
    pub kind: MarkerType,
    pub geometry: Coordinates,
}

impl NewMarker {
    pub fn new(kind: MarkerType, geometry: Coordinates) -> Self {
        Self { kind, geometry }
    }

    pub fn with_id(self, id: MarkerId) -> Marker {
        Marker {
            id,
            kind: self.kind,
            geometry: self.geometry,
        }
    }
}

#[test]
fn marker_json_test() {
    let marker = NewMarker::new(
        MarkerType::DenseTraffic,
        Coordinates {
            latitude: 1.5,
            longitude: 2.5,
        },
    )
    .with_id(7);

    let value = serde_json::to_value(&marker).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "id": 7,
            "type": "dense_traffic",
            "geometry": { "latitude": 1.5, "longitude": 2.5 }
        })
    );

    let parsed: Marker = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.kind.name(), "dense_traffic");
}
