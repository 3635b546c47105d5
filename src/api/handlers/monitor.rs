use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::monitor::sampler::{LoopState, SamplingLoop};
use crate::utils::error::AppError;

/// Response for monitor status
#[derive(Serialize)]
pub struct MonitorStatusResponse {
    pub state: LoopState,
    pub cycles_completed: u64,
    pub links: usize,
    pub sample_period_secs: f64,
    pub output_directory: Option<String>,
}

impl MonitorStatusResponse {
    pub fn from_loop(sampler: &SamplingLoop) -> Self {
        let store = sampler.store();
        Self {
            state: sampler.state(),
            cycles_completed: sampler.cycles_completed(),
            links: store.link_count(),
            sample_period_secs: sampler.config().sample_period.as_secs_f64(),
            output_directory: store.output_directory().map(|p| p.display().to_string()),
        }
    }
}

/// Start the sampling loop
pub async fn start_monitor(sampler: web::Data<Arc<RwLock<SamplingLoop>>>) -> impl Responder {
    let mut sampler = sampler.write().await;

    match sampler.start() {
        Ok(()) => {
            info!("Monitoring started");
            HttpResponse::Ok().json(serde_json::json!({
                "status": "success",
                "message": "Monitoring started"
            }))
        }
        Err(AppError::MonitorError(message)) => HttpResponse::Conflict().json(serde_json::json!({
            "status": "error",
            "message": message
        })),
        Err(AppError::ConfigError(message)) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "status": "error",
                "message": message
            }))
        }
        Err(e) => {
            error!("Failed to start monitoring: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "message": format!("Failed to start monitoring: {}", e)
            }))
        }
    }
}

/// Stop the sampling loop; stopping an idle loop succeeds
pub async fn stop_monitor(sampler: web::Data<Arc<RwLock<SamplingLoop>>>) -> impl Responder {
    let mut sampler = sampler.write().await;
    sampler.stop().await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": "Monitoring stopped",
        "cycles_completed": sampler.cycles_completed()
    }))
}

/// Get monitor status
pub async fn get_monitor_status(sampler: web::Data<Arc<RwLock<SamplingLoop>>>) -> impl Responder {
    let sampler = sampler.read().await;
    HttpResponse::Ok().json(MonitorStatusResponse::from_loop(&sampler))
}
