//! Live progress stream (Server-Sent Events)
//!
//! `GET /upload-stream/:task_id` opens an SSE stream that starts with
//! a status snapshot, relays every subsequent task event in order, and
//! closes itself after the terminal event. A subscriber that falls behind
//! the channel is resynchronized with a fresh snapshot rather than
//! dropped.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use uuid::Uuid;

use crate::api::authorize;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::events::TaskEvent;
use crate::AppState;

pub async fn events(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(task_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (snapshot, mut rx) = state
        .registry
        .subscribe(task_id)
        .await
        .map_err(|_| ApiError::NotFound("task not found".to_string()))?;
    authorize(&snapshot, &caller)?;

    let heartbeat = state.config.heartbeat;
    let registry = Arc::clone(&state.registry);

    let stream = async_stream::stream! {
        let initial = TaskEvent::Status { task: snapshot };
        let done = initial.is_terminal();
        if let Some(event) = to_sse(&initial) {
            yield Ok(event);
        }
        if done {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(task_event) => {
                    let terminal = task_event.is_terminal();
                    if let Some(event) = to_sse(&task_event) {
                        yield Ok(event);
                    }
                    if terminal {
                        debug!(task_id = %task_id, "Closing event stream after terminal event");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Resynchronize with a snapshot instead of dropping
                    debug!(task_id = %task_id, skipped, "Event stream lagged, resyncing");
                    match registry.snapshot(task_id).await {
                        Some(task) => {
                            let resync = TaskEvent::Status { task };
                            let terminal = resync.is_terminal();
                            if let Some(event) = to_sse(&resync) {
                                yield Ok(event);
                            }
                            if terminal {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat")))
}

fn to_sse(event: &TaskEvent) -> Option<Event> {
    Event::default().event(event.event_type()).json_data(event).ok()
}
