use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_channel::{Receiver, Sender};
use futures::stream::{BoxStream, StreamExt};
use uuid::Uuid;

use crate::entities::Coordinates;
use crate::error::Error;

pub type LocationUpdate = Result<Coordinates, Error>;

/// Something that watches the device position.
pub trait LocationSource: Send + Sync {
    fn watch(&self) -> Result<Subscription, Error>;
}

/// A live location watch. The watch is released when the subscription is
/// dropped or explicitly unsubscribed.
pub struct Subscription {
    id: Uuid,
    updates: BoxStream<'static, LocationUpdate>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        updates: BoxStream<'static, LocationUpdate>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            updates,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next update, or `None` once the source has stopped.
    pub async fn next(&mut self) -> Option<LocationUpdate> {
        self.updates.next().await
    }

    pub fn unsubscribe(mut self) {
        self.release_watch();
    }

    fn release_watch(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!("releasing location watch {}", self.id);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_watch();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.release.is_none())
            .finish()
    }
}

type Watchers = Arc<Mutex<HashMap<Uuid, Sender<LocationUpdate>>>>;

fn lock(watchers: &Watchers) -> MutexGuard<'_, HashMap<Uuid, Sender<LocationUpdate>>> {
    watchers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A location source fed by hand through a [`LocationFeed`]: GPS bridges,
/// replayed tracks and the simulator all push into it.
#[derive(Clone, Debug, Default)]
pub struct ChannelLocationSource {
    watchers: Watchers,
}

impl ChannelLocationSource {
    pub fn new() -> (Self, LocationFeed) {
        let source = Self::default();
        let feed = LocationFeed {
            watchers: source.watchers.clone(),
        };

        (source, feed)
    }
}

impl LocationSource for ChannelLocationSource {
    fn watch(&self) -> Result<Subscription, Error> {
        let (tx, rx): (Sender<LocationUpdate>, Receiver<LocationUpdate>) =
            async_channel::unbounded();
        let key = Uuid::new_v4();

        lock(&self.watchers).insert(key, tx);

        let watchers = self.watchers.clone();
        Ok(Subscription::new(rx.boxed(), move || {
            lock(&watchers).remove(&key);
        }))
    }
}

#[derive(Clone, Debug)]
pub struct LocationFeed {
    watchers: Watchers,
}

impl LocationFeed {
    pub fn publish(&self, update: LocationUpdate) {
        let mut watchers = lock(&self.watchers);

        watchers.retain(|_, tx| tx.try_send(update.clone()).is_ok());
    }

    pub fn fix(&self, coordinates: Coordinates) {
        self.publish(Ok(coordinates));
    }

    pub fn watcher_count(&self) -> usize {
        lock(&self.watchers).len()
    }
}

#[test]
fn fan_out_test() {
    use tokio_test::block_on;

    let (source, feed) = ChannelLocationSource::new();
    let mut first = source.watch().unwrap();
    let mut second = source.watch().unwrap();
    assert_eq!(feed.watcher_count(), 2);

    let here = Coordinates {
        latitude: 1.0,
        longitude: 2.0,
    };
    feed.fix(here);

    assert_eq!(block_on(first.next()), Some(Ok(here)));
    assert_eq!(block_on(second.next()), Some(Ok(here)));
}

#[test]
fn release_on_drop_test() {
    let (source, feed) = ChannelLocationSource::new();

    let subscription = source.watch().unwrap();
    let other = source.watch().unwrap();
    assert_eq!(feed.watcher_count(), 2);

    drop(subscription);
    assert_eq!(feed.watcher_count(), 1);

    other.unsubscribe();
    assert_eq!(feed.watcher_count(), 0);

    // publishing with nobody watching is a no-op
    feed.publish(Err(crate::error::location_unavailable_error()));
}
