//! Logs WebSocket handler
//!
//! Streams one workload's buffered history, then its live lines, as text
//! frames. Inbound frames are ignored; they only tell us the viewer is alive.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, info};

use crate::api::server::AppState;
use crate::error::TailError;
use crate::models::WorkloadId;
use crate::stream::{Session, SessionEnd};

/// WebSocket handler for a workload's log stream
pub async fn logs_ws(
    ws: WebSocketUpgrade,
    Path(container_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, TailError> {
    let workload = WorkloadId::new(container_id)?;
    Ok(ws.on_upgrade(move |socket| handle_logs_ws(socket, state, workload)))
}

/// Handle WebSocket connection for logs
async fn handle_logs_ws(socket: WebSocket, state: AppState, workload: WorkloadId) {
    let (mut sender, receiver) = socket.split();

    let session = Session::attach(&state.registry, &workload);
    let subscriber = session.id();
    info!(
        workload = %workload,
        subscriber = %subscriber,
        backlog = session.backlog_len(),
        "Logs WebSocket connected"
    );

    let inbound = receiver.take_while(|msg| {
        future::ready(match msg {
            Ok(Message::Close(_)) => {
                debug!("Logs WebSocket received close");
                false
            }
            Ok(_) => true,
            Err(e) => {
                debug!("Logs WebSocket error: {}", e);
                false
            }
        })
    });
    let frames = (&mut sender)
        .with(|line: String| future::ready(Ok::<_, axum::Error>(Message::Text(line))));

    let end = session.run(frames, inbound).await;

    if let Some(frame) = close_frame(end) {
        let _ = sender.send(Message::Close(Some(frame))).await;
    }

    info!(
        workload = %workload,
        subscriber = %subscriber,
        ?end,
        "Logs WebSocket disconnected"
    );
}

/// Close frame sent to the viewer; none when the viewer already left
fn close_frame(end: SessionEnd) -> Option<CloseFrame<'static>> {
    match end {
        SessionEnd::StreamEnded => Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "log stream ended".into(),
        }),
        SessionEnd::Evicted => Some(CloseFrame {
            code: close_code::POLICY,
            reason: "viewer too slow".into(),
        }),
        SessionEnd::ViewerGone => None,
    }
}
