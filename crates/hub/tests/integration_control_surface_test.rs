/// Integration tests for the HTTP control surface
use actix_web::{http::StatusCode, test, web, App};
use sentinel_hub::{server, Hub, HubConfig, MemoryAlertStore, MemoryBus};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

fn create_hub() -> Arc<Hub> {
    Arc::new(Hub::new(
        HubConfig::for_node("node-http"),
        Arc::new(MemoryBus::default()),
        Arc::new(MemoryAlertStore::new()),
    ))
}

#[actix_web::test]
async fn test_health_reports_connections() {
    let hub = create_hub();
    let (_a, _rx_a) = hub.connect();
    let (_b, _rx_b) = hub.connect();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub.clone()))
            .configure(server::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "ok");
    assert_eq!(body["nodeId"], "node-http");
    assert_eq!(body["connections"], 2);
}

#[actix_web::test]
async fn test_ready_with_memory_backends() {
    let hub = create_hub();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub))
            .configure(server::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_stats_snapshot() {
    let hub = create_hub();
    let (id, _rx) = hub.connect();
    hub.registry().join(id, "flood").unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub))
            .configure(server::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/stats").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["totalConnections"], 1);
    assert_eq!(body["channels"]["flood"], 1);
    assert_eq!(body["connections"][0]["id"], id.to_string());
    assert_eq!(body["connections"][0]["channels"], json!(["flood"]));
    assert!(body["metrics"]["envelopesDispatched"].is_number());
}

#[actix_web::test]
async fn test_broadcast_requires_event_and_data() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(create_hub()))
            .configure(server::configure),
    )
    .await;

    for payload in [
        json!({ "data": {"x": 1} }),
        json!({ "event": "maintenance" }),
        json!({ "event": "", "data": {} }),
        json!({}),
    ] {
        let req = test::TestRequest::post()
            .uri("/broadcast")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "payload {}", payload);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid request"));
    }
}

#[actix_web::test]
async fn test_broadcast_to_channel_and_all() {
    let hub = create_hub();
    let (member, mut member_rx) = hub.connect();
    let (_other, mut other_rx) = hub.connect();
    hub.registry().join(member, "ops").unwrap();
    member_rx.try_recv().unwrap();
    other_rx.try_recv().unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub.clone()))
            .configure(server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/broadcast")
        .set_json(json!({ "event": "maintenance", "data": {"window": "02:00"}, "channel": "ops" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["delivered"], 1);
    assert!(member_rx.try_recv().is_ok());
    assert!(other_rx.try_recv().is_err());

    let req = test::TestRequest::post()
        .uri("/broadcast")
        .set_json(json!({ "event": "notice", "data": "all hands" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["delivered"], 2);

    let frame: Value = serde_json::from_str(&other_rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "notice");
    assert_eq!(frame["data"]["payload"], "all hands");
    assert_eq!(frame["data"]["source"]["kind"], "admin");
}

#[actix_web::test]
async fn test_injected_events_are_not_cached() {
    let hub = create_hub();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub.clone()))
            .configure(server::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/broadcast")
        .set_json(json!({ "event": "notice", "data": {} }))
        .to_request();
    test::call_service(&app, req).await;

    assert_eq!(hub.metrics().snapshot().alerts_stored, 0);
}

#[actix_web::test]
async fn test_alert_lookup() {
    let hub = create_hub();
    let (id, _rx) = hub.connect();
    let alert_id = hub
        .submit_alert(id, json!({"type": "evacuation", "zone": "B4"}))
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(hub.clone()))
            .configure(server::configure),
    )
    .await;

    // Caching runs in the background.
    for _ in 0..50 {
        if hub.metrics().snapshot().alerts_stored == 1 {
            break;
        }
        actix_web::rt::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let req = test::TestRequest::get()
        .uri(&format!("/alerts/{}", alert_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["id"], alert_id.to_string());
    assert_eq!(body["payload"]["zone"], "B4");

    let req = test::TestRequest::get()
        .uri(&format!("/alerts/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
