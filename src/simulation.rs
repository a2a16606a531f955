use std::time::Duration;

use geo_types::LineString;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal};

use crate::entities::Coordinates;
use crate::error::{invalid_input_error, location_unavailable_error, Error};
use crate::location::{LocationFeed, LocationUpdate};

const METERS_PER_DEGREE: f64 = 111_320.0;

fn sample_binomial<R: Rng + ?Sized>(rng: &mut R, dropout: &Binomial) -> bool {
    dropout.sample(rng) > 0
}

/// Replays a route the way a phone GPS would: fixes every `step_m` meters,
/// each off by some gaussian drift, some of them lost. The last fix always
/// lands exactly on the end of the route.
#[derive(Clone, Debug)]
pub struct TrackSimulator {
    step_m: f64,
    drift: Normal<f64>,
    dropout: Binomial,
}

impl TrackSimulator {
    /// Fixes every 25m, 3m of drift, one in twenty lost.
    pub fn phone() -> Result<Self, Error> {
        Self::new(25.0, 3.0, 0.05)
    }

    #[tracing::instrument(name = "TrackSimulator::new")]
    pub fn new(step_m: f64, drift_m: f64, dropout_probability: f64) -> Result<Self, Error> {
        if !step_m.is_finite() || step_m <= 0.0 {
            return Err(invalid_input_error());
        }

        if !drift_m.is_finite() || drift_m < 0.0 {
            return Err(invalid_input_error());
        }

        let drift = Normal::new(0.0, drift_m).map_err(|_| invalid_input_error())?;
        let dropout = Binomial::new(1, dropout_probability).map_err(|_| invalid_input_error())?;

        Ok(Self {
            step_m,
            drift,
            dropout,
        })
    }

    fn drifted<R: Rng + ?Sized>(&self, rng: &mut R, point: Coordinates) -> Coordinates {
        let north_m = self.drift.sample(rng);
        let east_m = self.drift.sample(rng);
        let scale = point.latitude.to_radians().cos().max(1e-6);

        Coordinates {
            latitude: (point.latitude + north_m / METERS_PER_DEGREE).clamp(-90.0, 90.0),
            longitude: (point.longitude + east_m / (METERS_PER_DEGREE * scale))
                .clamp(-180.0, 180.0),
        }
    }

    pub fn track(&self, geometry: &[Coordinates]) -> Vec<LocationUpdate> {
        self.track_with(&mut rand::thread_rng(), geometry)
    }

    pub fn track_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        geometry: &[Coordinates],
    ) -> Vec<LocationUpdate> {
        let last = match geometry.last() {
            Some(last) => *last,
            None => return vec![],
        };

        let line_string: LineString<f64> = geometry.iter().copied().collect();
        let mut updates = vec![];

        for line in line_string.lines() {
            let start = Coordinates::from(line.start);
            let end = Coordinates::from(line.end);
            let steps = (start.distance_to(&end) / self.step_m).ceil().max(1.0) as usize;
            let delta = line.delta();

            for step in 0..steps {
                if sample_binomial(rng, &self.dropout) {
                    updates.push(Err(location_unavailable_error()));
                    continue;
                }

                let t = step as f64 / steps as f64;
                let point = Coordinates::from(geo_types::Coord {
                    x: line.start.x + delta.x * t,
                    y: line.start.y + delta.y * t,
                });
                updates.push(Ok(self.drifted(rng, point)));
            }
        }

        updates.push(Ok(last));

        updates
    }

    /// Publishes a whole track on `feed`, one update per `interval`. Returns
    /// how many updates went out.
    #[tracing::instrument(skip(self, feed, geometry), fields(points = geometry.len()))]
    pub async fn drive(
        &self,
        feed: &LocationFeed,
        geometry: &[Coordinates],
        interval: Duration,
    ) -> usize {
        let updates = self.track(geometry);
        let count = updates.len();

        tracing::info!("replaying {} location updates", count);

        for update in updates {
            if let Err(err) = &update {
                tracing::debug!("dropping fix: {}", err);
            }

            feed.publish(update);
            tokio::time::sleep(interval).await;
        }

        count
    }
}

#[cfg(test)]
fn at(latitude: f64, longitude: f64) -> Coordinates {
    Coordinates {
        latitude,
        longitude,
    }
}

#[cfg(test)]
fn seeded() -> rand::rngs::StdRng {
    use rand::SeedableRng;

    rand::rngs::StdRng::seed_from_u64(7)
}

#[test]
fn steady_track_test() {
    let simulator = TrackSimulator::new(100.0, 0.0, 0.0).unwrap();
    let geometry = [at(0.0, 0.0), at(0.0, 0.01), at(0.01, 0.01)];

    let track: Vec<Coordinates> = simulator
        .track_with(&mut seeded(), &geometry)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    // about 1.1km per leg at 100m steps
    assert_eq!(track.len(), 12 + 12 + 1);
    assert_eq!(track[0], at(0.0, 0.0));
    assert_eq!(track[12], at(0.0, 0.01));
    assert_eq!(track.last(), Some(&at(0.01, 0.01)));

    for pair in track.windows(2) {
        assert!(pair[0].distance_to(&pair[1]) <= 100.0);
    }
}

#[test]
fn drift_stays_close_test() {
    let simulator = TrackSimulator::new(50.0, 5.0, 0.0).unwrap();
    let geometry = [at(48.85, 2.35), at(48.86, 2.35)];

    let track = simulator.track_with(&mut seeded(), &geometry);
    let destination = at(48.86, 2.35);

    assert_eq!(track.last(), Some(&Ok(destination)));

    for update in &track {
        let fix = update.as_ref().unwrap();
        let along = at(fix.latitude, 2.35);
        assert!(fix.distance_to(&along) < 50.0);
    }
}

#[test]
fn dropouts_test() {
    let simulator = TrackSimulator::new(100.0, 0.0, 1.0).unwrap();
    let geometry = [at(0.0, 0.0), at(0.0, 0.01)];

    let track = simulator.track_with(&mut seeded(), &geometry);

    let (last, lost) = track.split_last().unwrap();
    assert_eq!(last, &Ok(at(0.0, 0.01)));
    assert!(lost
        .iter()
        .all(|u| u.as_ref().unwrap_err().is_location_unavailable_error()));
}

#[test]
fn degenerate_tracks_test() {
    let simulator = TrackSimulator::phone().unwrap();

    assert!(simulator.track(&[]).is_empty());
    assert_eq!(simulator.track(&[at(1.0, 1.0)]), vec![Ok(at(1.0, 1.0))]);

    assert!(TrackSimulator::new(0.0, 1.0, 0.0).is_err());
    assert!(TrackSimulator::new(10.0, -1.0, 0.0)
        .unwrap_err()
        .is_invalid_input_error());
    assert!(TrackSimulator::new(10.0, f64::NAN, 0.0).is_err());
    assert!(TrackSimulator::new(10.0, f64::INFINITY, 0.0).is_err());
    assert!(TrackSimulator::new(10.0, 1.0, 1.5)
        .unwrap_err()
        .is_invalid_input_error());
}

#[tokio::test]
async fn drive_test() {
    use crate::location::{ChannelLocationSource, LocationSource};

    let (source, feed) = ChannelLocationSource::new();
    let mut subscription = source.watch().unwrap();

    let simulator = TrackSimulator::new(500.0, 0.0, 0.0).unwrap();
    let geometry = [at(0.0, 0.0), at(0.0, 0.01)];

    let sent = simulator.drive(&feed, &geometry, Duration::ZERO).await;
    assert_eq!(sent, 4);

    let mut last = None;
    for _ in 0..sent {
        last = subscription.next().await;
    }
    assert_eq!(last, Some(Ok(at(0.0, 0.01))));
}
