//! WebSocket transport for the cloud-variable protocol.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /api/ws` and the socket upgrades.
//! 2. A one-time header screen runs: a missing/empty `User-Agent` closes with
//!    4002, a `Cookie` starting with `scratchsessionsid=` closes with 4005.
//! 3. The session starts in [`ConnState::Connected`] and must send a
//!    `handshake` message before anything else is accepted; a valid handshake
//!    joins a room (creating it on demand) and triggers the session's first
//!    catch-up pass.
//! 4. Once joined, the session may send `set` messages; malformed ones are
//!    logged and ignored rather than closing the connection.
//! 5. On socket close, the session removes itself from its room's subscriber
//!    set (a no-op if it never completed the handshake).
//!
//! Two independent events drive the loop: the next inbound WebSocket message,
//! and the session's own wake notification (fired by peers after a `set`, or
//! scheduled by the catch-up writer itself when a batch didn't fully drain).

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use tracing::{debug, info};

use crate::buffer::BoundedBuffer;
use crate::protocol::{self, ClientMessage, DecodeError};
use crate::reassembly::{FrameReassembler, MAX_MESSAGE_LENGTH};
use crate::session::Session;
use crate::username;
use crate::AppState;

/// `GET /api/ws` — WebSocket upgrade handler. Advertises the `cloud`
/// subprotocol when the client offers it.
pub async fn ws_upgrade(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    ws.protocols(["cloud"])
        .on_upgrade(move |socket| handle_ws(socket, state, headers))
}

/// Reject a connection before any messages are read. Returns the close code
/// and reason if the header screen fails.
fn header_screen_violation(headers: &HeaderMap) -> Option<(u16, &'static str)> {
    let has_user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .is_some_and(|v| !v.as_bytes().is_empty());
    if !has_user_agent {
        return Some((4002, "Provide a valid User-Agent"));
    }

    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        let bytes = cookie.as_bytes();
        let window = &bytes[..bytes.len().min(511)];
        if window.starts_with(b"scratchsessionsid=") {
            return Some((4005, "Stop including Scratch cookies"));
        }
    }

    None
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn send_frame(socket: &mut WebSocket, frame: Vec<u8>) -> bool {
    match String::from_utf8(frame) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn handle_ws(mut socket: WebSocket, state: AppState, headers: HeaderMap) {
    if let Some((code, reason)) = header_screen_violation(&headers) {
        debug!(code, reason, "header screen rejected connection");
        close_with(&mut socket, code, reason).await;
        return;
    }

    let mut session = Session::new();
    let mut reassembler = FrameReassembler::new();
    let mut tx = BoundedBuffer::new(MAX_MESSAGE_LENGTH);
    let session_id = session.id;

    loop {
        let waker = session.waker();
        tokio::select! {
            incoming = socket.recv() => {
                let Some(incoming) = incoming else { break };
                let msg = match incoming {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(session = %session_id, error = %e, "websocket error");
                        break;
                    }
                };

                let payload = match msg {
                    Message::Text(text) => Some(text.as_bytes().to_vec()),
                    Message::Binary(bytes) => Some(bytes.to_vec()),
                    Message::Ping(bytes) => {
                        let _ = socket.send(Message::Pong(bytes)).await;
                        None
                    }
                    Message::Pong(_) => None,
                    Message::Close(_) => break,
                };

                let Some(payload) = payload else { continue };

                match reassembler.push(&payload, true) {
                    Ok(Some(message)) => {
                        if !dispatch(&mut socket, &mut session, &state, &mut tx, &message).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(session = %session_id, ?e, "reassembly failed, closing");
                        close_with(&mut socket, 4000, "Message too large").await;
                        break;
                    }
                }
            }
            () = waker.notified() => {
                if let Some(outcome) = session.catch_up(&mut tx).await {
                    if let Some(frame) = outcome.frame {
                        if !send_frame(&mut socket, frame).await {
                            break;
                        }
                    }
                    if outcome.reschedule {
                        session.waker().notify_one();
                    }
                }
            }
        }
    }

    if let Some(room) = session.room() {
        let room = room.clone();
        state.room_registry.leave(&room, session_id).await;
    }
}

/// Decode and act on one reassembled message. Returns `false` if the
/// connection should be closed.
async fn dispatch(
    socket: &mut WebSocket,
    session: &mut Session,
    state: &AppState,
    tx: &mut BoundedBuffer,
    payload: &[u8],
) -> bool {
    let Ok(text) = std::str::from_utf8(payload) else {
        if !session.is_joined() {
            close_with(socket, 4000, "Invalid UTF-8").await;
            return false;
        }
        debug!(session = %session.id, "ignoring non-UTF-8 post-handshake message");
        return true;
    };

    if !session.is_joined() {
        return handle_handshake(socket, session, state, tx, text).await;
    }

    match protocol::decode(text) {
        Ok(ClientMessage::Set { name, value }) => {
            handle_set(session, &name, value.get().as_bytes()).await;
            true
        }
        Ok(ClientMessage::Handshake { .. }) => {
            debug!(session = %session.id, "ignoring handshake after join");
            true
        }
        Err(e) => {
            debug!(session = %session.id, ?e, "ignoring malformed post-handshake message");
            true
        }
    }
}

async fn handle_handshake(
    socket: &mut WebSocket,
    session: &mut Session,
    state: &AppState,
    tx: &mut BoundedBuffer,
    text: &str,
) -> bool {
    let (user, project_id) = match protocol::decode(text) {
        Ok(ClientMessage::Handshake { user, project_id }) => (user, project_id),
        Ok(ClientMessage::Set { .. }) => {
            close_with(socket, 4000, "Expected handshake").await;
            return false;
        }
        Err(DecodeError::HandshakeBadProjectId) => {
            close_with(socket, 4004, "Invalid project_id").await;
            return false;
        }
        Err(_) => {
            close_with(socket, 4000, "Invalid handshake").await;
            return false;
        }
    };

    if !username::validate(&user) {
        close_with(socket, 4002, "Invalid username").await;
        return false;
    }

    let Some(room) = state.room_registry.get_or_create(&project_id).await else {
        close_with(socket, 4003, "Room capacity exceeded").await;
        return false;
    };

    if !room.join(session.id, session.waker()).await {
        close_with(socket, 4003, "Room subscriber capacity exceeded").await;
        return false;
    }

    info!(session = %session.id, room = %project_id, user = %user, "session joined");
    session.join(user, room);

    if let Some(outcome) = session.catch_up(tx).await {
        if let Some(frame) = outcome.frame {
            if !send_frame(socket, frame).await {
                return false;
            }
        }
        if outcome.reschedule {
            session.waker().notify_one();
        }
    }

    true
}

async fn handle_set(session: &mut Session, name: &str, value_bytes: &[u8]) {
    let Some(room) = session.room().cloned() else {
        return;
    };

    let Some(index) = room.get_or_create_variable_index(name).await else {
        debug!(session = %session.id, name, "ignoring set: variable capacity or name too long");
        return;
    };

    match room.write_value(index, value_bytes).await {
        Ok(sequence_number) => {
            session.record_own_write(index, sequence_number);
            room.wake_others(session.id).await;
        }
        Err(e) => {
            debug!(session = %session.id, name, ?e, "ignoring oversize set, prior value preserved");
        }
    }
}
