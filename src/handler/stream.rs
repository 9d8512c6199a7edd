//! Viewer connections: one WebSocket per viewer, one binary message per frame.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use stream_bus::{Hub, MAILBOX_CAPACITY, Mailbox, Subscriber, SubscriberId};

use crate::handler::RelayState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_viewer(socket, state.hub))
}

/// Registers the viewer, then relays its mailbox until either direction fails.
/// Whichever loop ends first takes the other one down with it.
pub async fn handle_viewer(socket: WebSocket, hub: Hub) {
    let (subscriber, mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    let id = subscriber.id();
    if let Err(e) = hub.register(subscriber).await {
        log::warn!("viewer {}: register failed: {:#}", id, e);
        return;
    }
    log::info!("viewer {} connected", id);

    let (mut ws_tx, ws_rx) = socket.split();
    tokio::select! {
        _ = read_loop(ws_rx, id) => {},
        _ = write_loop(&mut ws_tx, mailbox, id) => {},
    }

    if let Err(e) = hub.unregister(id).await {
        log::debug!("viewer {}: unregister failed: {:#}", id, e);
    }
    let _ = ws_tx.close().await;
    log::info!("viewer {} disconnected", id);
}

// Viewers have nothing to say; anything they send is logged and dropped.
async fn read_loop(mut ws_rx: SplitStream<WebSocket>, id: SubscriberId) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => log::info!("viewer {} sent: {}", id, text.as_str()),
            Ok(Message::Binary(data)) => log::info!("viewer {} sent {} bytes", id, data.len()),
            Ok(Message::Close(_)) => {
                log::debug!("[reader] viewer {} closed", id);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("[reader] viewer {}: {}", id, e);
                return;
            }
        }
    }
}

async fn write_loop(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut mailbox: Mailbox,
    id: SubscriberId,
) {
    while let Some(frame) = mailbox.recv().await {
        if let Err(e) = ws_tx.send(Message::Binary(frame.into_bytes())).await {
            log::warn!("[writer] viewer {}: {}", id, e);
            return;
        }
    }
    log::debug!("[writer] viewer {}: mailbox closed", id);
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
