//! WebSocket push channel
//!
//! Every connection receives a `status_update` snapshot on connect and after
//! each successful mutation from any client or HTTP request. Clients may also
//! send commands; each is answered with a `result` or `error` message.

use std::collections::BTreeMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use servoctl_actuator::{BulkReport, MoveOutcome, ServoAngle, ServoId, ServoResult, StatusSnapshot};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::models::{ApiError, ServoStatus};
use crate::AppState;

/// Commands accepted from clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GetStatus,
    Refresh,
    Move { servo_id: ServoId, angle: i64 },
    MoveAll { angle: i64 },
    Center { servo_id: Option<ServoId> },
    Hold { servo_id: Option<ServoId> },
    Release { servo_id: Option<ServoId> },
}

/// Messages pushed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    StatusUpdate { servo: BTreeMap<ServoId, ServoStatus> },
    Result(CommandResult),
    Error(ApiError),
}

impl ServerMessage {
    pub fn status(snapshot: &StatusSnapshot) -> Self {
        ServerMessage::StatusUpdate {
            servo: snapshot
                .iter()
                .map(|(id, state)| (*id, ServoStatus::from(state)))
                .collect(),
        }
    }

    fn to_text(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| warn!(error = %e, "failed to encode websocket message"))
            .ok()
    }
}

/// Outcome of a client command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandResult {
    pub message: String,
    pub succeeded: Vec<ServoId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl CommandResult {
    fn single(servo_id: ServoId, message: String) -> Self {
        Self {
            message,
            succeeded: vec![servo_id],
            errors: BTreeMap::new(),
        }
    }

    fn bulk(report: BulkReport, action: &str) -> Self {
        Self {
            message: format!(
                "{action}: {} succeeded, {} failed",
                report.succeeded.len(),
                report.failed.len()
            ),
            succeeded: report.succeeded,
            errors: report
                .failed
                .into_iter()
                .map(|(id, err)| (id.to_string(), err.to_string()))
                .collect(),
        }
    }
}

/// Upgrade handler for `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut updates = state.registry.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(16);

    info!(clients = state.registry.subscriber_count(), "websocket client connected");

    // Writer: forwards broadcast snapshots and command replies. Commands run
    // in the reader so long moves never stall status delivery.
    let initial = ServerMessage::status(&state.registry.status().await);
    let writer = tokio::spawn(async move {
        if let Some(text) = initial.to_text() {
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        loop {
            let outgoing = tokio::select! {
                update = updates.recv() => match update {
                    Ok(snapshot) => ServerMessage::status(&snapshot),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "websocket client lagging; skipping stale snapshots");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };
            let Some(text) = outgoing.to_text() else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let reply = match message {
            Message::Text(text) => handle_text(&state, &text).await,
            Message::Close(_) => break,
            _ => continue,
        };
        if reply_tx.send(reply).await.is_err() {
            break;
        }
    }

    drop(reply_tx);
    writer.abort();
    info!("websocket client disconnected");
}

/// Parses and runs one client message, producing the reply for that client
pub async fn handle_text(state: &AppState, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(command) => execute(state, command).await,
        Err(e) => ServerMessage::Error(
            ApiError::new("INVALID_MESSAGE", format!("Unrecognized message: {e}"))
                .with_help("Send {\"type\": \"get_status\"} or a command such as {\"type\": \"move\", \"servo_id\": 1, \"angle\": 90}"),
        ),
    }
}

async fn execute(state: &AppState, command: ClientMessage) -> ServerMessage {
    let registry = &state.registry;
    let outcome: ServoResult<CommandResult> = match command {
        ClientMessage::GetStatus | ClientMessage::Refresh => {
            return ServerMessage::status(&registry.status().await);
        }
        ClientMessage::Move { servo_id, angle } => match ServoAngle::new(angle) {
            Ok(angle) => registry
                .move_one(servo_id, i32::from(angle.degrees()))
                .await
                .map(|outcome| CommandResult::single(servo_id, describe(servo_id, outcome))),
            Err(err) => Err(err),
        },
        ClientMessage::MoveAll { angle } => match ServoAngle::new(angle) {
            Ok(angle) => Ok(CommandResult::bulk(
                registry.move_all(i32::from(angle.degrees())).await,
                &format!("move all to {angle}"),
            )),
            Err(err) => Err(err),
        },
        ClientMessage::Center { servo_id: Some(id) } => registry
            .center_one(id)
            .await
            .map(|outcome| CommandResult::single(id, describe(id, outcome))),
        ClientMessage::Center { servo_id: None } => {
            Ok(CommandResult::bulk(registry.center_all().await, "center all"))
        }
        ClientMessage::Hold { servo_id: Some(id) } => registry
            .hold_one(id)
            .await
            .map(|()| CommandResult::single(id, format!("Servo {id} holding position"))),
        ClientMessage::Hold { servo_id: None } => {
            Ok(CommandResult::bulk(registry.hold_all().await, "hold all"))
        }
        ClientMessage::Release { servo_id: Some(id) } => registry
            .release_one(id)
            .await
            .map(|()| CommandResult::single(id, format!("Servo {id} released"))),
        ClientMessage::Release { servo_id: None } => {
            Ok(CommandResult::bulk(registry.release_all().await, "release all"))
        }
    };

    match outcome {
        Ok(result) => ServerMessage::Result(result),
        Err(err) => ServerMessage::Error(ApiError::from(&err)),
    }
}

fn describe(servo_id: ServoId, outcome: MoveOutcome) -> String {
    match outcome {
        MoveOutcome::Moved { angle } => format!("Servo {servo_id} moved to {angle}°"),
        MoveOutcome::Released => format!("Servo {servo_id} released, move skipped"),
    }
}
