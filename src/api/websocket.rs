use actix_web::{web, Error, HttpRequest, Responder};
use actix_ws::{self, Message};
use futures_util::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;

use crate::api::handlers::links::{LinkView, LinksResponse};
use crate::models::stats::LinkKey;
use crate::monitor::sampler::{LoopState, SamplingLoop};
use crate::monitor::store::LiveStatsStore;

// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// Missed heartbeats before a client is dropped
const HEARTBEAT_TOLERANCE: u32 = 3;

/// WebSocket message types that can be sent to clients
#[derive(Serialize)]
#[serde(tag = "type")]
enum WsOutMessage {
    #[serde(rename = "links")]
    Links {
        count: usize,
        links: BTreeMap<LinkKey, LinkView>,
    },

    #[serde(rename = "status")]
    Status { state: LoopState, cycles_completed: u64 },

    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
}

/// Handle WebSocket connections
pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    store: web::Data<Arc<LiveStatsStore>>,
    sampler: web::Data<Arc<RwLock<SamplingLoop>>>,
) -> Result<impl Responder, Error> {
    let addr = req
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("WebSocket connection from: {}", addr);

    let (response, session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let store = store.into_inner().as_ref().clone();
    let sampler = sampler.into_inner().as_ref().clone();
    let push_period = sampler.read().await.config().sample_period;

    let session_for_handler = session.clone();
    let session_for_updates = session.clone();
    let session_for_heartbeat = session;

    actix_web::rt::spawn(async move {
        let last_seen = Arc::new(Mutex::new(Instant::now()));
        let last_seen_for_handler = last_seen.clone();

        // Send initial status and snapshot
        let mut initial = session_for_handler.clone();
        if send_status(&mut initial, &sampler).await.is_err()
            || send_links(&mut initial, &store).await.is_err()
        {
            warn!("Failed to send initial state to {}", addr);
            return;
        }

        // Completes when the client sends a close message or disconnects
        let ws_msg_task = {
            let mut session = session_for_handler;
            let store = store.clone();
            let sampler = sampler.clone();

            async move {
                while let Some(Ok(msg)) = msg_stream.next().await {
                    match msg {
                        Message::Ping(bytes) => {
                            *last_seen_for_handler.lock() = Instant::now();
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Pong(_) => {
                            *last_seen_for_handler.lock() = Instant::now();
                        }
                        Message::Text(text) => {
                            debug!("Received text message: {}", text);
                            *last_seen_for_handler.lock() = Instant::now();

                            let sent = match text.trim() {
                                "status" => send_status(&mut session, &sampler).await,
                                "links" => send_links(&mut session, &store).await,
                                _ => Ok(()),
                            };
                            if sent.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => {
                            info!("Client requested close");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        };

        // Pushes a snapshot every sample period
        let updates_task = {
            let mut session = session_for_updates;

            async move {
                let mut ticker = interval(push_period);
                // the first tick fires immediately and the snapshot was just sent
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if send_links(&mut session, &store).await.is_err() {
                        break;
                    }
                }
            }
        };

        let heartbeat_task = {
            let mut session = session_for_heartbeat;

            async move {
                let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                loop {
                    heartbeat.tick().await;

                    if last_seen.lock().elapsed() > HEARTBEAT_INTERVAL * HEARTBEAT_TOLERANCE {
                        warn!("WebSocket client heartbeat timed out");
                        let _ = session.close(None).await;
                        break;
                    }

                    if session.ping(b"").await.is_err() {
                        break;
                    }

                    let ping_msg = WsOutMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    if let Ok(json) = serde_json::to_string(&ping_msg) {
                        if session.text(json).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        // Wait for any task to complete
        tokio::select! {
            _ = ws_msg_task => {},
            _ = updates_task => {},
            _ = heartbeat_task => {},
        }

        info!("WebSocket connection closed");
    });

    Ok(response)
}

/// Send the sampling loop state to a WebSocket client
async fn send_status(
    session: &mut actix_ws::Session,
    sampler: &Arc<RwLock<SamplingLoop>>,
) -> Result<(), actix_ws::Closed> {
    let msg = {
        let sampler = sampler.read().await;
        WsOutMessage::Status {
            state: sampler.state(),
            cycles_completed: sampler.cycles_completed(),
        }
    };

    if let Ok(json) = serde_json::to_string(&msg) {
        session.text(json).await?;
    }

    Ok(())
}

/// Send a snapshot of every link to a WebSocket client
async fn send_links(
    session: &mut actix_ws::Session,
    store: &Arc<LiveStatsStore>,
) -> Result<(), actix_ws::Closed> {
    let LinksResponse { count, links } = LinksResponse::from_store(store);
    let msg = WsOutMessage::Links { count, links };

    if let Ok(json) = serde_json::to_string(&msg) {
        session.text(json).await?;
    }

    Ok(())
}
