use std::sync::Arc;
use std::time::Duration;

use scootio::api::DynAPI;
use scootio::config::Config;
use scootio::entities::{Coordinates, Place};
use scootio::error::{invalid_state_error, Error};
use scootio::external::{backend::HttpBackend, memory::InMemoryBackend};
use scootio::location::ChannelLocationSource;
use scootio::navigator::{AutoConfirm, Command, Navigator, NavigatorHandle, Notification};
use scootio::session::RideSession;
use scootio::simulation::TrackSimulator;

const FIX_INTERVAL: Duration = Duration::from_millis(200);

async fn wait_for_route(handle: &NavigatorHandle) -> Result<Vec<Coordinates>, Error> {
    loop {
        match handle.next_notification().await {
            Some(Notification::RouteReady { destination_name }) => {
                tracing::info!("route ready to {}", destination_name);
                break;
            }
            Some(Notification::Failed(err)) => return Err(err),
            Some(other) => tracing::info!("{}", other.message()),
            None => return Err(invalid_state_error()),
        }
    }

    let mut snapshots = handle.snapshots();
    loop {
        if let Some(geometry) = snapshots.borrow_and_update().state.route_geometry() {
            return Ok(geometry.to_vec());
        }

        snapshots.changed().await.map_err(|_| invalid_state_error())?;
    }
}

#[tracing::instrument(skip(config))]
async fn ride(config: Config) -> Result<(), Error> {
    let api: DynAPI = if config.offline {
        tracing::info!("riding offline");
        Arc::new(InMemoryBackend::new())
    } else {
        Arc::new(HttpBackend::new(&config)?)
    };

    let (source, feed) = ChannelLocationSource::new();
    let session = RideSession::new(config.arrival_policy());
    let handle = Navigator::spawn(session, api, &source, Arc::new(AutoConfirm))?;

    let origin = Coordinates::new(48.8566, 2.3522)?;
    let destination = Place::new("Gare de Lyon", Coordinates::new(48.8443, 2.3743)?);

    feed.fix(origin);
    handle.send(Command::SelectPlace(destination)).await?;

    let geometry = wait_for_route(&handle).await?;
    handle.send(Command::SaveRide).await?;

    let simulator = TrackSimulator::phone()?;
    let driving = tokio::spawn(async move {
        simulator.drive(&feed, &geometry, FIX_INTERVAL).await;
    });

    while let Some(notification) = handle.next_notification().await {
        if notification.is_failure() {
            tracing::warn!("{}", notification.message());
        } else {
            tracing::info!("{}", notification.message());
        }

        if let Notification::Arrived(_) = notification {
            break;
        }
    }

    driving.abort();

    let session = handle.shutdown().await?;
    tracing::info!("ride over, last fix at {:?}", session.state().last_fix_at);

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = ride(config).await {
        tracing::error!("ride failed: {}", err);
        std::process::exit(1);
    }
}
