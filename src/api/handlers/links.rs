use actix_web::{web, HttpResponse, Responder};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::stats::{LinkKey, LinkStats};
use crate::monitor::store::LiveStatsStore;

/// One link as reported by the API
#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    /// Most recent bandwidth sample in Mbps
    pub current_bandwidth: Option<f64>,

    /// Most recent latency sample in ms
    pub current_latency: Option<f64>,

    /// Totals and full histories
    #[serde(flatten)]
    pub stats: LinkStats,
}

impl From<LinkStats> for LinkView {
    fn from(stats: LinkStats) -> Self {
        Self {
            current_bandwidth: stats.current_bandwidth(),
            current_latency: stats.current_latency(),
            stats,
        }
    }
}

/// Response for listing links
#[derive(Serialize)]
pub struct LinksResponse {
    pub count: usize,
    pub links: BTreeMap<LinkKey, LinkView>,
}

impl LinksResponse {
    pub fn from_store(store: &LiveStatsStore) -> Self {
        let links: BTreeMap<LinkKey, LinkView> = store
            .snapshot()
            .into_iter()
            .map(|(key, stats)| (key, LinkView::from(stats)))
            .collect();
        Self {
            count: links.len(),
            links,
        }
    }
}

/// Get every link seen in this session
pub async fn get_links(store: web::Data<Arc<LiveStatsStore>>) -> impl Responder {
    let response = LinksResponse::from_store(&store);
    debug!("Returning snapshot of {} links", response.count);
    HttpResponse::Ok().json(response)
}

/// Get a single link by its key
pub async fn get_link(
    store: web::Data<Arc<LiveStatsStore>>,
    path: web::Path<String>,
) -> impl Responder {
    let key = LinkKey::from(path.as_str());

    match store.link(&key) {
        Some(stats) => HttpResponse::Ok().json(LinkView::from(stats)),
        None => {
            info!("Link {} not found", key);
            HttpResponse::NotFound().json(serde_json::json!({
                "status": "error",
                "message": format!("Link {} not found", key)
            }))
        }
    }
}
