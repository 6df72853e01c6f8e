//! Actix-web HTTP server for the realtime hub
//!
//! Endpoints:
//! - GET /health - Liveness and current connection count
//! - GET /ready - Bus and alert cache reachability
//! - GET /stats - Full statistics snapshot
//! - POST /broadcast - Administrative event injection
//! - GET /alerts/{id} - Cached client alert
//! - WebSocket /ws - Client connection

use crate::error::HubError;
use crate::hub::{BroadcastRequest, Hub};
use crate::websocket::HubSession;
use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use actix_web_actors::ws;
use std::sync::Arc;
use uuid::Uuid;

#[get("/health")]
async fn health_check(hub: web::Data<Hub>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "realtime-hub",
        "nodeId": hub.node_id(),
        "connections": hub.registry().connection_count(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/ready")]
async fn readiness_check(hub: web::Data<Hub>) -> impl Responder {
    match hub.readiness().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "not_ready",
                "error": e.to_string()
            }))
        }
    }
}

#[get("/stats")]
async fn stats(hub: web::Data<Hub>) -> impl Responder {
    HttpResponse::Ok().json(hub.stats())
}

#[post("/broadcast")]
async fn broadcast(
    hub: web::Data<Hub>,
    body: web::Json<BroadcastRequest>,
) -> Result<HttpResponse, HubError> {
    let report = hub.inject(body.into_inner())?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "delivered": report.delivered,
        "dropped": report.dropped
    })))
}

#[get("/alerts/{id}")]
async fn get_alert(
    hub: web::Data<Hub>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, HubError> {
    let id = path.into_inner();

    match hub.fetch_alert(id).await? {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Alert {} not found", id)
        }))),
    }
}

#[get("/ws")]
async fn websocket(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Hub>,
) -> actix_web::Result<HttpResponse> {
    ws::start(HubSession::new(hub.into_inner()), &req, stream)
}

/// Register every hub route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(readiness_check)
        .service(stats)
        .service(broadcast)
        .service(get_alert)
        .service(websocket);
}

/// Serve until shutdown. Failing to bind is the only fatal error.
pub async fn run(hub: Arc<Hub>, host: &str, port: u16) -> std::io::Result<()> {
    let data = web::Data::from(hub);
    let bind_addr = format!("{}:{}", host, port);

    tracing::info!("Realtime hub listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
            .wrap(actix_web::middleware::Logger::default())
    })
    .bind(&bind_addr)?
    .run()
    .await
}
