use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::event::TrackingEvent;
use crate::state::AppState;

/// `?order_id=` narrows the feed to a single order.
#[derive(Debug, Default, Deserialize)]
pub struct FeedFilter {
    pub order_id: Option<Uuid>,
}

impl FeedFilter {
    fn admits(&self, event: &TrackingEvent) -> bool {
        match self.order_id {
            None => true,
            Some(wanted) => event.order_id() == Some(wanted),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FeedFilter>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_tracking(socket, state, filter))
}

async fn stream_tracking(socket: WebSocket, state: Arc<AppState>, filter: FeedFilter) {
    let (mut outbound, mut inbound) = socket.split();
    let mut feed = BroadcastStream::new(state.events.subscribe());

    info!(order_id = ?filter.order_id, "tracking subscriber connected");

    let forward = tokio::spawn(async move {
        while let Some(next) = feed.next().await {
            let event = match next {
                Ok(event) if filter.admits(&event) => event,
                Ok(_) => continue,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "tracking subscriber lagging; events dropped");
                    continue;
                }
            };

            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "could not encode tracking event");
                    continue;
                }
            };

            if outbound.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain client frames until the socket closes.
    let drain = tokio::spawn(async move {
        while let Some(Ok(frame)) = inbound.next().await {
            if let Message::Close(_) = frame {
                debug!("tracking subscriber sent close");
                break;
            }
        }
    });

    tokio::select! {
        _ = forward => {},
        _ = drain => {},
    }

    info!("tracking subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::courier::GeoPoint;

    #[test]
    fn filter_matches_only_the_requested_order() {
        let order_id = Uuid::new_v4();
        let position = TrackingEvent::Position {
            courier_id: Uuid::new_v4(),
            order_id: Some(order_id),
            position: GeoPoint::new(79.86, 6.93),
            at: Utc::now(),
        };
        let idle = TrackingEvent::Position {
            courier_id: Uuid::new_v4(),
            order_id: None,
            position: GeoPoint::new(79.86, 6.93),
            at: Utc::now(),
        };

        let filter = FeedFilter {
            order_id: Some(order_id),
        };
        assert!(filter.admits(&position));
        assert!(!filter.admits(&idle));
        assert!(FeedFilter::default().admits(&idle));
    }
}
