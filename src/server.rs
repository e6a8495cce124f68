//! Wires the Store, PubSubBus, ConnRegistry, and Dispatcher together and
//! serves the WebSocket upgrade route. Grounded on the teacher's
//! `main.rs`/route-construction layout, generalized from a fixed
//! single-group upgrade route to the flat per-user model this service uses.

use std::sync::{Arc, OnceLock};

use log::{error, info};
use warp::Filter;

use crate::config::Config;
use crate::database::{ChatStore, Store, UnavailableStore};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::pubsub::{Bus, NullBus, OnMessage, RedisBus};
use crate::registry::ConnRegistry;

/// Builds the warp filter serving the single `/ws` upgrade route.
fn routes(
    dispatcher: Arc<Dispatcher>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
        let dispatcher = dispatcher.clone();
        crate::socket::upgrade(ws, dispatcher)
    })
}

/// Runs the server until the process receives SIGINT. Only a failure to
/// bind the listening socket is fatal; a database pool or pub/sub bus that
/// cannot be established at startup is logged and the process continues
/// without persistence or cross-node routing, matching the original
/// model-layer behavior of connecting (and tolerating failure) per call
/// rather than once at boot.
pub async fn run(config: Config) -> Result<()> {
    let store: Arc<dyn ChatStore> = match Store::connect(&config.database_url) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to establish the database pool, continuing without persistence: {e}");
            Arc::new(UnavailableStore)
        }
    };
    if let Err(e) = store.reset_all_online_to_offline().await {
        error!("failed to reset online users at boot: {e}");
    }

    let registry = Arc::new(ConnRegistry::new());

    // The Bus needs to call back into the Dispatcher it belongs to, but the
    // Dispatcher is constructed from the Bus. A `OnceLock` set right after
    // construction breaks the cycle without reaching for `Weak`.
    let dispatcher_cell: Arc<OnceLock<Arc<Dispatcher>>> = Arc::new(OnceLock::new());
    let cell_for_bus = dispatcher_cell.clone();
    let on_message: OnMessage = Arc::new(move |target, payload| {
        let cell = cell_for_bus.clone();
        tokio::spawn(async move {
            if let Some(dispatcher) = cell.get() {
                dispatcher.handle_bus_message(target, payload).await;
            }
        });
    });
    let bus: Arc<dyn Bus> = match RedisBus::connect(&config.redis_url, on_message).await {
        Ok(bus) => Arc::new(bus),
        Err(e) => {
            error!("failed to establish the pub/sub bus, continuing without cross-node routing: {e}");
            Arc::new(NullBus)
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), bus, registry));
    dispatcher_cell
        .set(dispatcher.clone())
        .unwrap_or_else(|_| unreachable!("dispatcher_cell is set exactly once"));

    let addr: std::net::IpAddr = config
        .host
        .parse()
        .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));

    // Validated up front so a bad bind address is a clean, logged exit
    // instead of a panic inside warp's own bind call.
    let listener = std::net::TcpListener::bind((addr, config.port)).map_err(|e| {
        error!("failed to bind {addr}:{}: {e}", config.port);
        e
    })?;
    drop(listener);

    info!("listening on {addr}:{}", config.port);
    let (_, server) = warp::serve(routes(dispatcher))
        .bind_with_graceful_shutdown((addr, config.port), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        });
    server.await;

    if let Err(e) = store.reset_all_online_to_offline().await {
        error!("failed to reset online users at shutdown: {e}");
    }
    info!("shutdown complete");
    Ok(())
}
