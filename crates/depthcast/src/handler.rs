//! Per-connection handler: decode relay events and route them to the
//! stream manager.
//!
//! The relay names sessions with its own ids. Each connection keeps a map
//! from relay id to depthcast session id, and every session the relay
//! opened is closed when its connection ends.

use std::collections::HashMap;

use depthcast_device::DeviceDriver;
use depthcast_protocol::{Codec, JsonCodec, SessionId, SignalMessage, StreamReferenceInfo};
use depthcast_transport::{Connection, RtcEngine, WebSocketConnection};

use crate::{DepthcastError, StreamManager};

/// The sessions one relay connection has opened.
///
/// Dropping it closes whatever is left. Since `Drop` is synchronous, the
/// closes run in a spawned task.
struct RelaySessions<D: DeviceDriver, E: RtcEngine> {
    manager: StreamManager<D, E>,
    sessions: HashMap<String, SessionId>,
}

impl<D: DeviceDriver, E: RtcEngine> RelaySessions<D, E> {
    fn new(manager: StreamManager<D, E>) -> Self {
        Self {
            manager,
            sessions: HashMap::new(),
        }
    }

    fn get(&self, relay_id: &str) -> Result<SessionId, DepthcastError> {
        self.sessions
            .get(relay_id)
            .cloned()
            .ok_or_else(|| DepthcastError::NotFound(SessionId::from(relay_id)))
    }

    async fn close_all(&mut self) {
        for (relay_id, session_id) in self.sessions.drain() {
            if self.manager.close_session(&session_id).await {
                tracing::info!(%relay_id, %session_id, "closed session after relay disconnect");
            }
        }
    }
}

impl<D: DeviceDriver, E: RtcEngine> Drop for RelaySessions<D, E> {
    fn drop(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let manager = self.manager.clone();
        let sessions: Vec<SessionId> = self.sessions.drain().map(|(_, id)| id).collect();
        tokio::spawn(async move {
            for session_id in &sessions {
                manager.close_session(session_id).await;
            }
        });
    }
}

/// Handles a single relay connection from accept to close.
pub(crate) async fn handle_connection<D: DeviceDriver, E: RtcEngine>(
    conn: WebSocketConnection,
    manager: StreamManager<D, E>,
    codec: JsonCodec,
) -> Result<(), DepthcastError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new relay connection");

    let mut relay = RelaySessions::new(manager);

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "relay connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let message: SignalMessage = match codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode signal message");
                let err = DepthcastError::from(e);
                send_error(&conn, &codec, None, &err).await?;
                continue;
            }
        };

        handle_message(&conn, &codec, &mut relay, message).await?;
    }

    relay.close_all().await;
    Ok(())
}

async fn handle_message<D: DeviceDriver, E: RtcEngine>(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    relay: &mut RelaySessions<D, E>,
    message: SignalMessage,
) -> Result<(), DepthcastError> {
    let manager = relay.manager.clone();

    match message {
        SignalMessage::CreateSession {
            session_id: relay_id,
            device_id,
            stream_types,
        } => {
            if relay.sessions.contains_key(&relay_id) {
                let err = DepthcastError::InvalidArgument(format!(
                    "session {relay_id} already exists on this connection"
                ));
                return send_error(conn, codec, Some(relay_id), &err).await;
            }

            match manager.create_offer(&device_id, &stream_types).await {
                Ok((session_id, offer)) => {
                    tracing::info!(%relay_id, %session_id, %device_id, "relay session created");
                    relay.sessions.insert(relay_id.clone(), session_id);
                    send(
                        conn,
                        codec,
                        &SignalMessage::WebrtcOffer {
                            session_id: relay_id,
                            offer,
                        },
                    )
                    .await?;
                }
                Err(e) => send_error(conn, codec, Some(relay_id), &e).await?,
            }
        }

        SignalMessage::WebrtcAnswer {
            session_id: relay_id,
            answer,
        } => {
            let result = match relay.get(&relay_id) {
                Ok(session_id) => manager.process_answer(&session_id, answer).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                send_error(conn, codec, Some(relay_id), &e).await?;
            }
        }

        SignalMessage::IceCandidate {
            session_id: relay_id,
            candidate,
        } => {
            let result = match relay.get(&relay_id) {
                Ok(session_id) => manager.add_ice_candidate(&session_id, candidate).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                send_error(conn, codec, Some(relay_id), &e).await?;
            }
        }

        SignalMessage::SwitchStreamType {
            session_id: relay_id,
            stream_types,
        } => {
            let result = match relay.get(&relay_id) {
                Ok(session_id) => manager.switch_stream_types(&session_id, &stream_types).await,
                Err(e) => Err(e),
            };
            let reply = match result {
                Ok(()) => SignalMessage::StreamTypeSwitched {
                    session_id: relay_id,
                    stream_types,
                },
                Err(e) => SignalMessage::StreamTypeSwitchError {
                    session_id: relay_id,
                    code: e.code(),
                    error: e.to_string(),
                },
            };
            send(conn, codec, &reply).await?;
        }

        SignalMessage::SessionClosed {
            session_id: relay_id,
        } => match relay.sessions.remove(&relay_id) {
            Some(session_id) => {
                manager.close_session(&session_id).await;
                tracing::info!(%relay_id, %session_id, "relay session closed");
            }
            None => tracing::debug!(%relay_id, "close for unknown relay session"),
        },

        SignalMessage::ListSessions => {
            let sessions = manager.get_all_sessions().await;
            send(conn, codec, &SignalMessage::SessionList { sessions }).await?;
        }

        SignalMessage::StreamReferences => {
            let StreamReferenceInfo {
                stream_references,
                device_stream_configs,
            } = manager.stream_references().await;
            send(
                conn,
                codec,
                &SignalMessage::StreamReferenceInfo {
                    stream_references,
                    device_stream_configs,
                },
            )
            .await?;
        }

        other => {
            tracing::debug!(message = ?other, "ignoring outbound-only signal message");
            let err = DepthcastError::InvalidArgument("unexpected message type".into());
            send_error(conn, codec, other.session_id().map(str::to_string), &err).await?;
        }
    }

    Ok(())
}

async fn send(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    message: &SignalMessage,
) -> Result<(), DepthcastError> {
    let text = codec.encode_text(message)?;
    conn.send_text(&text).await?;
    Ok(())
}

/// Sends a `session-error` to the relay.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    session_id: Option<String>,
    err: &DepthcastError,
) -> Result<(), DepthcastError> {
    send(
        conn,
        codec,
        &SignalMessage::SessionError {
            session_id,
            code: err.code(),
            error: err.to_string(),
        },
    )
    .await
}
