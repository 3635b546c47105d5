use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use crate::api::handlers::{
    links::{
        get_links,
        get_link,
    },
    monitor::{
        start_monitor,
        stop_monitor,
        get_monitor_status,
    },
};
use crate::api::websocket::ws_index;

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "linkstat API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Live per-link traffic, bandwidth and latency statistics",
        "endpoints": [
            {
                "path": "/api/links",
                "method": "GET",
                "description": "Snapshot of every link"
            },
            {
                "path": "/api/links/{link}",
                "method": "GET",
                "description": "Statistics of one link, e.g. h1-s1"
            },
            {
                "path": "/api/monitor/start",
                "method": "POST",
                "description": "Start the sampling loop"
            },
            {
                "path": "/api/monitor/stop",
                "method": "POST",
                "description": "Stop the sampling loop"
            },
            {
                "path": "/api/monitor/status",
                "method": "GET",
                "description": "State of the sampling loop"
            },
            {
                "path": "/api/ws",
                "method": "GET",
                "description": "WebSocket endpoint for periodic link snapshots"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        .service(
            web::scope("/api")
                // WebSocket route for periodic snapshots
                .route("/ws", web::get().to(ws_index))

                // Link statistics
                .service(
                    web::scope("/links")
                        .route("", web::get().to(get_links))
                        .route("/{link}", web::get().to(get_link))
                )
                // Sampling loop control
                .service(
                    web::scope("/monitor")
                        .route("/start", web::post().to(start_monitor))
                        .route("/stop", web::post().to(stop_monitor))
                        .route("/status", web::get().to(get_monitor_status))
                )
        );
}
