use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message};
use async_trait::async_trait;
use futures_util::StreamExt as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::TurnEngine;
use crate::config::AppConfig;
use crate::session::{Outbound, SessionController, SessionEnd, TransportError};

const INBOUND_BUFFER: usize = 64;

/// Sends answers as text frames.
pub struct WsOutbound {
    session: actix_ws::Session,
}

impl WsOutbound {
    pub fn new(session: actix_ws::Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Outbound for WsOutbound {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.session.text(text).await.map_err(|_| TransportError::Closed)
    }
}

#[get("/ws/{session_id}")]
pub async fn ws_chat(
    req: HttpRequest,
    body: web::Payload,
    config: web::Data<AppConfig>,
    engine: web::Data<Arc<TurnEngine>>,
    session_id: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let id = session_id.into_inner();
    let greeting = config.chat.greeting.clone();

    info!("[WebSocket] Client {} connected", id);

    // web::Data<T> behaves like an Arc<T>. To get the inner Arc out of Data<Arc<T>> we deref and clone.
    let engine = engine.as_ref().clone();

    actix_web::rt::spawn(async move {
        if session.text(greeting).await.is_err() {
            warn!("[WebSocket] Client {} left before the greeting", id);
            return;
        }

        let (tx, rx) = mpsc::channel::<String>(INBOUND_BUFFER);
        let controller = SessionController::new(id.clone(), engine, WsOutbound::new(session.clone()));
        let mut controller_task = actix_web::rt::spawn(controller.run(rx));

        let end = loop {
            tokio::select! {
                joined = &mut controller_task => break joined.unwrap_or(SessionEnd::SendFailed),
                frame = msg_stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = tx.send(text.to_string()).await;
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            drop(tx);
                            break controller_task.await.unwrap_or(SessionEnd::SendFailed);
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        info!("[WebSocket] Client {} disconnected normally", id);
                        let _ = session.clone().close(reason).await;
                        drop(tx);
                        break controller_task.await.unwrap_or(SessionEnd::Disconnected);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("[WebSocket] Protocol error from {}: {}", id, e);
                        drop(tx);
                        break controller_task.await.unwrap_or(SessionEnd::Disconnected);
                    }
                    None => {
                        drop(tx);
                        break controller_task.await.unwrap_or(SessionEnd::Disconnected);
                    }
                }
            }
        };

        if end == SessionEnd::SendFailed {
            let reason = CloseReason {
                code: CloseCode::Error,
                description: Some("Something went wrong with connection.".to_string()),
            };
            let _ = session.close(Some(reason)).await;
        }
        info!("[WebSocket] Session ended for {}", id);
    });

    Ok(response)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_chat);
}
