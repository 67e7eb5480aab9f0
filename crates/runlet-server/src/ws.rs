//! WebSocket surface for interactive execution sessions.
//!
//! `/io/{language}` upgrades into a bridge between one transport connection
//! and one `runlet-core` session: inbound text frames are parsed at the
//! boundary and fed to the session, session events are framed back out as
//! they arrive. The first fatal error sends a single `WEBSOCKET ERROR`
//! frame and closes; a normal process exit sends the end sentinel and the
//! server closes the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::mpsc;

use runlet_core::{fault_frame, Frame, InteractiveSession, Language, SessionEvent};

use crate::AppState;

/// Handler for `GET /io/{language}` upgrade requests.
pub async fn io_handler(
    ws: WebSocketUpgrade,
    Path(language): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, language))
}

/// The fixed frame sent to connections for languages without interactive
/// support, independent of anything the client sends.
pub fn not_supported_frame(language: Language) -> String {
    fault_frame(format!(
        "interactive execution is not supported for {language}"
    ))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, language: String) {
    let language = match language.parse::<Language>() {
        Ok(language) => language,
        Err(err) => {
            let _ = socket.send(Message::Text(fault_frame(err).into())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let descriptor = language.descriptor();
    if !descriptor.interactive {
        let _ = socket
            .send(Message::Text(not_supported_frame(language).into()))
            .await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    log::info!("interactive {} session opened", language);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut session = InteractiveSession::new(state.store.clone(), descriptor, events_tx);

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(SessionEvent::Ended) => {
                    let _ = socket
                        .send(Message::Text(SessionEvent::Ended.to_frame().into()))
                        .await;
                    break;
                }
                Some(event) => {
                    if socket
                        .send(Message::Text(event.to_frame().into()))
                        .await
                        .is_err()
                    {
                        // Transport gone; the exit watcher still reaps the
                        // process and releases its artifacts.
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let outcome = match Frame::parse(text.as_str()) {
                        Ok(frame) => session.handle_frame(frame).await,
                        Err(err) => Err(err),
                    };
                    if let Err(err) = outcome {
                        log::warn!("interactive {} session failed: {}", language, err);
                        let _ = socket.send(Message::Text(fault_frame(&err).into())).await;
                        break;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    let _ = socket
                        .send(Message::Text(fault_frame("unrecognized frame").into()))
                        .await;
                    break;
                }
                // Transport-level frames carry no session meaning.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::warn!("interactive {} transport error: {}", language, err);
                    break;
                }
                None => break,
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    log::info!("interactive {} session closed", language);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_supported_frame_names_the_language() {
        let frame = not_supported_frame(Language::JavaScript);
        assert!(frame.starts_with("WEBSOCKET ERROR: "));
        assert!(frame.contains("javascript"));
    }
}
