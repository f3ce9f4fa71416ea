use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::db::Database;
use crate::error::AppError;
use crate::state::AppState;

pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fixed in-band message; the real cause stays in the server log.
const SNAPSHOT_FAILED: &str = "Failed to load orders";

pub(crate) type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Serialized form of "today's orders with items". The feed compares whole
/// serialized snapshots, not diffs, so this must be deterministic for an
/// unchanged database.
pub fn snapshot_json(db: &Database) -> Result<String, AppError> {
    let conn = db.conn()?;
    let orders = super::orders::today_orders(&conn)?;

    Ok(serde_json::to_string(&orders)?)
}

/// One poll tick: recompute the snapshot and decide what, if anything, goes
/// out. A fresh `orders` event when the serialized form differs from the
/// last one sent, nothing when it is identical, an in-band `error` event
/// when the read fails. A failed tick leaves `last_sent` alone, so after
/// recovery the current state is re-sent only if it actually changed.
pub(crate) fn poll_event(db: &Database, last_sent: &mut Option<String>) -> Option<Event> {
    match snapshot_json(db) {
        Ok(json) => {
            if last_sent.as_deref() == Some(json.as_str()) {
                return None;
            }
            let event = Event::default().event("orders").data(&json);
            *last_sent = Some(json);
            Some(event)
        }
        Err(err) => {
            warn!("order snapshot failed: {err}");
            Some(Event::default().event("error").data(SNAPSHOT_FAILED))
        }
    }
}

/// Snapshot half of the feed. The first tick fires immediately, so the
/// first event a client sees is always an `orders` snapshot, even an empty
/// one. Exits once the client is gone and the channel closes.
pub(crate) async fn run_snapshot_loop(state: Arc<AppState>, tx: EventSender) {
    let mut last_sent: Option<String> = None;
    let mut ticker = interval(SNAPSHOT_INTERVAL);

    loop {
        ticker.tick().await;

        if tx.is_closed() {
            break;
        }

        let Some(event) = poll_event(&state.db, &mut last_sent) else {
            continue;
        };

        if tx.send(Ok(event)).await.is_err() {
            break;
        }
    }
}

/// Heartbeat half; the immediate tick is skipped so the snapshot loop owns
/// the first event. Winds down with the channel like the snapshot loop.
pub(crate) async fn run_heartbeat_loop(tx: EventSender) {
    let mut ticker = interval(HEARTBEAT_INTERVAL);

    ticker.tick().await;

    loop {
        ticker.tick().await;

        let event = Event::default()
            .event("heartbeat")
            .data(chrono::Local::now().to_rfc3339());

        if tx.send(Ok(event)).await.is_err() {
            break;
        }
    }
}

/// Kitchen-display live feed. Each connection gets two independent timer
/// tasks: a snapshot poll that re-sends only when the serialized snapshot
/// changed, and a slower heartbeat so the client can tell "idle" from
/// "dropped". Both tasks exit once the client goes away and the channel
/// closes; neither may outlive the connection.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);

    tokio::spawn(run_snapshot_loop(state.clone(), tx.clone()));
    tokio::spawn(run_heartbeat_loop(tx));

    Sse::new(ReceiverStream::new(rx))
}
