use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::models::event::OrderEvent;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only forward events for this order.
    pub order_id: Option<String>,
}

impl EventFilter {
    fn admits(&self, event: &OrderEvent) -> bool {
        self.order_id
            .as_deref()
            .is_none_or(|wanted| wanted == event.order_id)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<EventFilter>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_order_events(socket, state, filter))
}

async fn stream_order_events(socket: WebSocket, state: Arc<AppState>, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.order_events_tx.subscribe();

    info!(order_id = ?filter.order_id, "order event subscriber connected");

    let forward = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) if filter.admits(&event) => event,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "order event subscriber lagging; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, order_id = %event.order_id, "failed to encode order event");
                    continue;
                }
            };

            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; the loop only detects the client going away.
    let drain = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            if let Message::Close(_) = frame {
                break;
            }
            debug!("ignoring inbound websocket frame");
        }
    });

    tokio::select! {
        _ = forward => {},
        _ = drain => {},
    }

    info!("order event subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::OrderEventKind;
    use crate::models::order::fixtures::pending_order;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn filter_matches_only_the_requested_order() {
        let now = Utc::now();
        let order = pending_order("DLV-WATCHED1", Uuid::new_v4(), now);
        let event = OrderEvent::from_order(OrderEventKind::Created, &order, now);

        assert!(EventFilter::default().admits(&event));
        assert!(EventFilter { order_id: Some(order.order_id.clone()) }.admits(&event));
        assert!(!EventFilter { order_id: Some("DLV-OTHER000".into()) }.admits(&event));
    }
}
