//! Binds a WebSocket connection to the Dispatcher. Mirrors the framework
//! callback surface described in SPEC_FULL.md §2: on-connect (the upgrade
//! below), on-message (`Dispatcher::dispatch`), on-disconnect
//! (`Dispatcher::handle_disconnect`).

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use log::{debug, error};
use warp::ws::WebSocket;

use crate::dispatcher::Dispatcher;

pub fn upgrade(ws: warp::ws::Ws, dispatcher: Arc<Dispatcher>) -> impl warp::Reply {
    ws.on_upgrade(move |socket: WebSocket| connected(socket, dispatcher))
}

async fn connected(ws: WebSocket, dispatcher: Arc<Dispatcher>) {
    // Splitting the web socket into separate sinks and streams: our means
    // of sending and receiving messages over the socket independently.
    let (ws_tx, mut ws_rx) = ws.split();

    // Channel used as a queue for outbound messages. ConnRegistry and the
    // Dispatcher hold clones of the sending half; nothing here retains a
    // reference across a lock, per SPEC_FULL.md §4.3.
    let (ch_tx, ch_rx) = tokio::sync::mpsc::unbounded_channel();
    let ch_rx = tokio_stream::wrappers::UnboundedReceiverStream::new(ch_rx);

    // Pull messages off the queue and write them to the socket. The I/O
    // thread only decodes and dispatches; outbound sends never block a
    // handler.
    tokio::task::spawn(ch_rx.forward(ws_tx).map(|result: Result<(), warp::Error>| {
        if let Err(e) = result {
            error!("error sending over socket: {e}");
        }
    }));

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(message) => {
                if let Ok(text) = message.to_str() {
                    dispatcher.dispatch(text, &ch_tx).await;
                }
            }
            Err(e) => {
                error!("error receiving from socket: {e}");
                break;
            }
        }
    }

    // The socket closed without an explicit LOGOUT frame (or after one, in
    // which case this is a no-op since the registry no longer has an
    // entry bound to `ch_tx`).
    dispatcher.handle_disconnect(&ch_tx).await;
    debug!("socket disconnected");
}
