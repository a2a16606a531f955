//! Drives a [`RideSession`] from a single task.
//!
//! The navigator receives location updates and user commands, runs store and
//! routing calls as background tasks and applies their outcomes back onto the
//! session one at a time. Failures never escape the loop: each one becomes a
//! single [`Notification::Failed`].

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    api::DynAPI,
    entities::{Coordinates, Marker, MarkerId, MarkerType, Place, Ride},
    error::{invalid_state_error, location_unavailable_error, unexpected_error, Error},
    location::{LocationSource, LocationUpdate, Subscription},
    session::{Arrival, MarkerTicket, Phase, RideSession, RouteRequest, RouteTicket, Snapshot},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SelectPlace(Place),
    CancelRide,
    SaveRide,
    AddMarker(MarkerType),
    DeleteMarker(MarkerId),
    RefreshMarkers,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    CancelRide,
    SaveRide,
    DeleteMarker(MarkerId),
}

impl Prompt {
    pub fn message(&self) -> &'static str {
        match self {
            Self::CancelRide => "Cancel the current ride?",
            Self::SaveRide => "Save the current ride?",
            Self::DeleteMarker(_) => "Delete this marker?",
        }
    }
}

/// Asks the rider before destructive or persisting actions.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: Prompt) -> bool;
}

/// Says yes to everything; for unattended runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _: Prompt) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    RouteReady { destination_name: String },
    Arrived(Arrival),
    RideCancelled,
    RideSaved(Ride),
    MarkerAdded(Marker),
    MarkerDeleted(MarkerId),
    MarkersLoaded(usize),
    Failed(Error),
}

impl Notification {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Text for the toast shown to the rider.
    pub fn message(&self) -> String {
        match self {
            Self::RouteReady { destination_name } => format!("Riding to {}", destination_name),
            Self::Arrived(arrival) => format!("You have arrived at {}!", arrival.destination_name),
            Self::RideCancelled => "Ride cancelled".into(),
            Self::RideSaved(_) => "Ride has been saved!".into(),
            Self::MarkerAdded(_) => "Marker has been added!".into(),
            Self::MarkerDeleted(_) => "Marker has been deleted!".into(),
            Self::MarkersLoaded(count) => format!("{} markers around", count),
            Self::Failed(err) if err.is_duplicate_entity_error() => {
                format!("Already declared: {}", err.message)
            }
            Self::Failed(err) if err.is_internal() => "Something went wrong, try again".into(),
            Self::Failed(err) => err.message.clone(),
        }
    }
}

enum Completion {
    Route {
        ticket: RouteTicket,
        result: Result<Vec<Coordinates>, Error>,
    },
    Confirmed(Prompt, bool),
    RideSaved(Result<Ride, Error>),
    MarkerAdded(Result<Marker, Error>),
    MarkerDeleted(MarkerId, Result<(), Error>),
    MarkersLoaded(MarkerTicket, Result<Vec<Marker>, Error>),
}

pub struct Navigator {
    session: RideSession,
    api: DynAPI,
    confirmer: Arc<dyn Confirmer>,
    subscription: Option<Subscription>,
    commands: Receiver<Command>,
    notifications: Sender<Notification>,
    snapshots: watch::Sender<Snapshot>,
    tasks: JoinSet<Completion>,
}

#[derive(Debug)]
pub struct NavigatorHandle {
    commands: Sender<Command>,
    notifications: Receiver<Notification>,
    snapshots: watch::Receiver<Snapshot>,
    join: JoinHandle<RideSession>,
}

impl NavigatorHandle {
    pub async fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .await
            .map_err(|_| invalid_state_error())
    }

    pub fn commands(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn notifications(&self) -> Receiver<Notification> {
        self.notifications.clone()
    }

    pub async fn next_notification(&self) -> Option<Notification> {
        self.notifications.recv().await.ok()
    }

    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Stops the loop, releases the location watch, aborts pending calls and
    /// hands back the session as it was left.
    pub async fn shutdown(self) -> Result<RideSession, Error> {
        self.commands.close();

        self.join.await.map_err(unexpected_error)
    }
}

async fn next_update(subscription: &mut Option<Subscription>) -> Option<LocationUpdate> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => futures::future::pending().await,
    }
}

impl Navigator {
    pub fn spawn<L>(
        session: RideSession,
        api: DynAPI,
        source: &L,
        confirmer: Arc<dyn Confirmer>,
    ) -> Result<NavigatorHandle, Error>
    where
        L: LocationSource + ?Sized,
    {
        let subscription = source.watch()?;

        let (command_tx, command_rx) = async_channel::unbounded();
        let (notification_tx, notification_rx) = async_channel::unbounded();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let navigator = Navigator {
            session,
            api,
            confirmer,
            subscription: Some(subscription),
            commands: command_rx,
            notifications: notification_tx,
            snapshots: snapshot_tx,
            tasks: JoinSet::new(),
        };

        Ok(NavigatorHandle {
            commands: command_tx,
            notifications: notification_rx,
            snapshots: snapshot_rx,
            join: tokio::spawn(navigator.run()),
        })
    }

    #[tracing::instrument(name = "Navigator::run", skip_all, fields(session = %self.session.id()))]
    async fn run(mut self) -> RideSession {
        tracing::info!("navigation started");

        self.spawn_load_markers();

        loop {
            // location updates come last so a busy feed cannot starve the rest
            tokio::select! {
                biased;

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(completion) => self.on_completion(completion),
                    Err(err) if err.is_cancelled() => (),
                    Err(err) => self.notify(Notification::Failed(unexpected_error(err))),
                },
                command = self.commands.recv() => match command {
                    Ok(command) => self.on_command(command),
                    Err(_) => break,
                },
                update = next_update(&mut self.subscription) => match update {
                    Some(update) => self.on_location(update),
                    None => {
                        tracing::warn!("location source stopped");
                        self.subscription = None;
                    }
                },
            }

            self.snapshots.send_replace(self.session.snapshot());
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.tasks.abort_all();

        tracing::info!("navigation stopped");

        self.session
    }

    fn notify(&self, notification: Notification) {
        if let Notification::Failed(err) = &notification {
            tracing::warn!("surfacing failure: {}", err);
        }

        if self.notifications.try_send(notification).is_err() {
            tracing::debug!("nobody listening for notifications");
        }
    }

    fn on_location(&mut self, update: LocationUpdate) {
        match update {
            Ok(coordinates) => {
                if let Some(arrival) = self.session.update_location(coordinates) {
                    self.notify(Notification::Arrived(arrival));
                }
            }
            Err(err) => {
                tracing::warn!("location update failed: {}", err);
                self.notify(Notification::Failed(location_unavailable_error()));
            }
        }
    }

    #[tracing::instrument(skip(self))]
    fn on_command(&mut self, command: Command) {
        match command {
            Command::SelectPlace(place) => match self.session.request_route(place) {
                Ok(request) => self.spawn_route(request),
                Err(err) => self.notify(Notification::Failed(err)),
            },
            Command::CancelRide => match self.session.phase() {
                Phase::Idle => self.notify(Notification::Failed(invalid_state_error())),
                _ => self.spawn_confirm(Prompt::CancelRide),
            },
            Command::SaveRide => match self.session.prepare_ride() {
                Ok(_) => self.spawn_confirm(Prompt::SaveRide),
                Err(err) => self.notify(Notification::Failed(err)),
            },
            Command::AddMarker(kind) => match self.session.prepare_marker(kind) {
                Ok(marker) => {
                    let api = self.api.clone();
                    self.tasks
                        .spawn(async move { Completion::MarkerAdded(api.add_marker(marker).await) });
                }
                Err(err) => self.notify(Notification::Failed(err)),
            },
            Command::DeleteMarker(id) => self.spawn_confirm(Prompt::DeleteMarker(id)),
            Command::RefreshMarkers => self.spawn_load_markers(),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Route { ticket, result } => {
                match self.session.complete_route(ticket, result) {
                    Ok(Some(route)) => {
                        let destination_name = route.destination_name.clone();
                        self.notify(Notification::RouteReady { destination_name });
                    }
                    Ok(None) => (),
                    Err(err) => self.notify(Notification::Failed(err)),
                }
            }
            Completion::Confirmed(prompt, false) => {
                tracing::debug!("rider declined: {}", prompt.message());
            }
            Completion::Confirmed(prompt, true) => self.on_confirmed(prompt),
            Completion::RideSaved(Ok(ride)) => self.notify(Notification::RideSaved(ride)),
            Completion::MarkerAdded(Ok(marker)) => {
                self.session.record_marker(marker.clone());
                self.notify(Notification::MarkerAdded(marker));
            }
            Completion::MarkerDeleted(id, Ok(())) => {
                self.session.forget_marker(id);
                self.notify(Notification::MarkerDeleted(id));
            }
            Completion::MarkersLoaded(ticket, Ok(markers)) => {
                let count = markers.len();

                if self.session.complete_markers(ticket, markers) {
                    self.notify(Notification::MarkersLoaded(count));
                } else {
                    // the store already holds the local changes, fetch again
                    self.spawn_load_markers();
                }
            }
            Completion::RideSaved(Err(err))
            | Completion::MarkerAdded(Err(err))
            | Completion::MarkerDeleted(_, Err(err))
            | Completion::MarkersLoaded(_, Err(err)) => self.notify(Notification::Failed(err)),
        }
    }

    /// The session may have moved on while the rider was answering, so every
    /// precondition is checked again.
    fn on_confirmed(&mut self, prompt: Prompt) {
        match prompt {
            Prompt::CancelRide => match self.session.cancel_ride() {
                Ok(()) => self.notify(Notification::RideCancelled),
                Err(err) => self.notify(Notification::Failed(err)),
            },
            Prompt::SaveRide => match self.session.prepare_ride() {
                Ok(ride) => {
                    let api = self.api.clone();
                    self.tasks
                        .spawn(async move { Completion::RideSaved(api.add_ride(ride).await) });
                }
                Err(err) => self.notify(Notification::Failed(err)),
            },
            Prompt::DeleteMarker(id) => {
                let api = self.api.clone();
                self.tasks.spawn(async move {
                    Completion::MarkerDeleted(id, api.delete_marker(id).await)
                });
            }
        }
    }

    fn spawn_route(&mut self, request: RouteRequest) {
        let api = self.api.clone();

        self.tasks.spawn(async move {
            let result = api.route(request.origin, request.place.geometry).await;

            Completion::Route {
                ticket: request.ticket,
                result,
            }
        });
    }

    fn spawn_confirm(&mut self, prompt: Prompt) {
        let confirmer = self.confirmer.clone();

        self.tasks.spawn(async move {
            let accepted = confirmer.confirm(prompt.clone()).await;

            Completion::Confirmed(prompt, accepted)
        });
    }

    fn spawn_load_markers(&mut self) {
        let api = self.api.clone();
        let ticket = self.session.marker_ticket();

        self.tasks.spawn(async move {
            Completion::MarkersLoaded(ticket, api.fetch_markers().await)
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::api::{AccountAPI, MarkerAPI, RideAPI, RoutingAPI, API};
    use crate::entities::{Account, NewMarker};
    use crate::external::memory::{FixedRouter, InMemoryBackend};
    use crate::location::{ChannelLocationSource, LocationFeed};

    /// Says no, and lets the test know it was asked.
    #[derive(Default)]
    struct Decline {
        asked: Notify,
    }

    #[async_trait]
    impl Confirmer for Decline {
        async fn confirm(&self, _: Prompt) -> bool {
            self.asked.notify_one();
            false
        }
    }

    /// A store whose marker listing is read right away but delivered late.
    #[derive(Default)]
    struct SlowFetch {
        inner: InMemoryBackend,
    }

    #[async_trait]
    impl RoutingAPI for SlowFetch {
        async fn route(
            &self,
            origin: Coordinates,
            destination: Coordinates,
        ) -> Result<Vec<Coordinates>, Error> {
            self.inner.route(origin, destination).await
        }
    }

    #[async_trait]
    impl MarkerAPI for SlowFetch {
        async fn fetch_markers(&self) -> Result<Vec<Marker>, Error> {
            let markers = self.inner.fetch_markers().await?;
            tokio::time::sleep(Duration::from_millis(200)).await;

            Ok(markers)
        }

        async fn add_marker(&self, marker: NewMarker) -> Result<Marker, Error> {
            self.inner.add_marker(marker).await
        }

        async fn delete_marker(&self, id: MarkerId) -> Result<(), Error> {
            self.inner.delete_marker(id).await
        }
    }

    #[async_trait]
    impl RideAPI for SlowFetch {
        async fn add_ride(&self, ride: Ride) -> Result<Ride, Error> {
            self.inner.add_ride(ride).await
        }

        async fn fetch_rides(&self) -> Result<Vec<Ride>, Error> {
            self.inner.fetch_rides().await
        }
    }

    #[async_trait]
    impl AccountAPI for SlowFetch {
        async fn add_account(&self, account: Account) -> Result<(), Error> {
            self.inner.add_account(account).await
        }

        async fn retrieve_password(&self, email: String) -> Result<(), Error> {
            self.inner.retrieve_password(email).await
        }
    }

    impl API for SlowFetch {}

    fn at(latitude: f64, longitude: f64) -> Coordinates {
        Coordinates {
            latitude,
            longitude,
        }
    }

    fn start(api: DynAPI, confirmer: Arc<dyn Confirmer>) -> (NavigatorHandle, LocationFeed) {
        let (source, feed) = ChannelLocationSource::new();
        let handle = Navigator::spawn(RideSession::default(), api, &source, confirmer).unwrap();

        (handle, feed)
    }

    /// Skips notifications until one matches, failing after a second.
    async fn expect<F>(handle: &NavigatorHandle, mut matches: F) -> Notification
    where
        F: FnMut(&Notification) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let notification = handle.next_notification().await.unwrap();
                if matches(&notification) {
                    return notification;
                }
            }
        })
        .await
        .expect("notification did not arrive")
    }

    async fn wait_for<F>(handle: &NavigatorHandle, mut ready: F) -> Snapshot
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut snapshots = handle.snapshots();

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = snapshots.borrow_and_update().clone();
                if ready(&snapshot) {
                    return snapshot;
                }
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .expect("snapshot never reached the expected state")
    }

    async fn ride_to_cafe(handle: &NavigatorHandle, feed: &LocationFeed) {
        feed.fix(at(0.0, 0.0));
        wait_for(handle, |s| s.state.position == Some(at(0.0, 0.0))).await;

        handle
            .send(Command::SelectPlace(Place::new("Cafe", at(0.001, 0.001))))
            .await
            .unwrap();
        expect(handle, |n| matches!(n, Notification::RouteReady { .. })).await;
    }

    #[tokio::test]
    async fn ride_until_arrival_test() {
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        ride_to_cafe(&handle, &feed).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.phase, Phase::Navigating);
        assert_eq!(snapshot.state.destination_name(), Some("Cafe"));

        feed.fix(at(0.0005, 0.0005));
        feed.fix(at(0.001, 0.001));

        let arrived = expect(&handle, |n| matches!(n, Notification::Arrived(_))).await;
        assert_eq!(arrived.message(), "You have arrived at Cafe!");

        let snapshot = wait_for(&handle, |s| s.state.position == Some(at(0.001, 0.001))).await;
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.state.route, None);

        assert_eq!(feed.watcher_count(), 1);
        let session = handle.shutdown().await.unwrap();
        assert_eq!(feed.watcher_count(), 0);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn commands_without_position_fail_once_test() {
        let (handle, _feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        handle
            .send(Command::AddMarker(MarkerType::Plothole))
            .await
            .unwrap();
        handle
            .send(Command::SelectPlace(Place::new("Cafe", at(1.0, 1.0))))
            .await
            .unwrap();
        handle.send(Command::SaveRide).await.unwrap();

        let mut failures = vec![];
        while failures.len() < 3 {
            if let Notification::Failed(err) = expect(&handle, Notification::is_failure).await {
                failures.push(err);
            }
        }

        assert!(failures[0].is_location_unavailable_error());
        assert!(failures[1].is_location_unavailable_error());
        assert!(failures[2].is_invalid_state_error());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn markers_test() {
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        feed.fix(at(0.0, 0.0));
        wait_for(&handle, |s| s.state.position.is_some()).await;

        handle
            .send(Command::AddMarker(MarkerType::Plothole))
            .await
            .unwrap();
        let marker = match expect(&handle, |n| matches!(n, Notification::MarkerAdded(_))).await {
            Notification::MarkerAdded(marker) => marker,
            _ => unreachable!(),
        };

        wait_for(&handle, |s| s.markers.len() == 1).await;
        handle
            .send(Command::AddMarker(MarkerType::DenseTraffic))
            .await
            .unwrap();
        let failure = expect(&handle, Notification::is_failure).await;
        assert!(failure.message().starts_with("Already declared"));

        handle.send(Command::DeleteMarker(marker.id)).await.unwrap();
        assert_eq!(
            expect(&handle, |n| matches!(n, Notification::MarkerDeleted(_))).await,
            Notification::MarkerDeleted(marker.id)
        );
        wait_for(&handle, |s| s.markers.is_empty()).await;

        handle.send(Command::DeleteMarker(marker.id)).await.unwrap();
        match expect(&handle, Notification::is_failure).await {
            Notification::Failed(err) => assert!(err.is_not_found_error()),
            _ => unreachable!(),
        }

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn save_ride_test() {
        let backend = Arc::new(InMemoryBackend::new());
        let (handle, feed) = start(backend.clone(), Arc::new(AutoConfirm));

        ride_to_cafe(&handle, &feed).await;

        handle.send(Command::SaveRide).await.unwrap();
        let saved = expect(&handle, |n| matches!(n, Notification::RideSaved(_))).await;
        assert_eq!(saved.message(), "Ride has been saved!");

        handle.send(Command::SaveRide).await.unwrap();
        match expect(&handle, Notification::is_failure).await {
            Notification::Failed(err) => assert!(err.is_duplicate_entity_error()),
            _ => unreachable!(),
        }

        use crate::api::RideAPI;
        assert_eq!(backend.fetch_rides().await.unwrap().len(), 1);
        assert_eq!(handle.snapshot().phase, Phase::Navigating);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn declined_cancel_keeps_ride_test() {
        let decline = Arc::new(Decline::default());
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), decline.clone());

        ride_to_cafe(&handle, &feed).await;
        handle.send(Command::CancelRide).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), decline.asked.notified())
            .await
            .expect("rider was never asked");

        // the refresh lands after the answer has been handled
        handle.send(Command::RefreshMarkers).await.unwrap();
        let seen = expect(&handle, |n| {
            matches!(n, Notification::MarkersLoaded(_) | Notification::RideCancelled)
        })
        .await;
        assert_eq!(seen, Notification::MarkersLoaded(0));

        let session = handle.shutdown().await.unwrap();
        assert_eq!(session.phase(), Phase::Navigating);
        assert_eq!(session.state().destination_name(), Some("Cafe"));
    }

    #[tokio::test]
    async fn busy_feed_does_not_hold_up_commands_test() {
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        expect(&handle, |n| matches!(n, Notification::MarkersLoaded(_))).await;
        feed.fix(at(0.0, 0.0));
        wait_for(&handle, |s| s.state.position == Some(at(0.0, 0.0))).await;

        for i in 1..=10_000 {
            feed.fix(at(0.0, i as f64 * 1e-5));
        }

        // shutting down is handled before the queued fixes
        let session = handle.shutdown().await.unwrap();
        assert_eq!(session.state().position, Some(at(0.0, 0.0)));
    }

    #[tokio::test]
    async fn late_marker_load_keeps_local_changes_test() {
        let (handle, feed) = start(Arc::new(SlowFetch::default()), Arc::new(AutoConfirm));

        feed.fix(at(0.0, 0.0));
        wait_for(&handle, |s| s.state.position.is_some()).await;

        // the startup load read an empty store before this marker was added
        handle
            .send(Command::AddMarker(MarkerType::Plothole))
            .await
            .unwrap();
        let added = expect(&handle, |n| matches!(n, Notification::MarkerAdded(_))).await;

        let loaded = expect(&handle, |n| matches!(n, Notification::MarkersLoaded(_))).await;
        assert_eq!(loaded, Notification::MarkersLoaded(1));

        let session = handle.shutdown().await.unwrap();
        match added {
            Notification::MarkerAdded(marker) => assert_eq!(session.markers(), &[marker]),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn confirmed_cancel_test() {
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        ride_to_cafe(&handle, &feed).await;
        handle.send(Command::CancelRide).await.unwrap();

        expect(&handle, |n| *n == Notification::RideCancelled).await;
        let snapshot = wait_for(&handle, |s| s.phase == Phase::Idle).await;
        assert_eq!(snapshot.state.route, None);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn routing_failure_test() {
        let backend = InMemoryBackend::with_router(FixedRouter::failing());
        let (handle, feed) = start(Arc::new(backend), Arc::new(AutoConfirm));

        feed.fix(at(0.0, 0.0));
        wait_for(&handle, |s| s.state.position.is_some()).await;

        handle
            .send(Command::SelectPlace(Place::new("Cafe", at(1.0, 1.0))))
            .await
            .unwrap();

        match expect(&handle, Notification::is_failure).await {
            Notification::Failed(err) => assert!(err.is_routing_failed_error()),
            _ => unreachable!(),
        }

        let snapshot = wait_for(&handle, |s| s.phase == Phase::Idle).await;
        assert_eq!(snapshot.state.route, None);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn location_errors_are_surfaced_test() {
        let (handle, feed) = start(Arc::new(InMemoryBackend::new()), Arc::new(AutoConfirm));

        feed.publish(Err(crate::error::upstream_error()));

        match expect(&handle, Notification::is_failure).await {
            Notification::Failed(err) => assert!(err.is_location_unavailable_error()),
            _ => unreachable!(),
        }

        handle.shutdown().await.unwrap();
    }
}
