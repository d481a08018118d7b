//! Router-level tests for the servo API

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use servoctl_actuator::{HoldMode, ServoConfig, ServoRegistry, SimulatedFactory};
use servoctl_api::{
    build_app,
    middleware::{ApiKeyConfig, RateLimitConfig},
    ws::{handle_text, ServerMessage},
    AppOptions, AppState,
};
use tower::ServiceExt;

const PINS: [u8; 4] = [13, 6, 19, 26];

fn open_options() -> AppOptions {
    AppOptions {
        auth: ApiKeyConfig::default(),
        rate_limit: RateLimitConfig {
            enabled: false,
            ..Default::default()
        },
        cors: false,
    }
}

async fn setup(factory: SimulatedFactory, options: AppOptions) -> (Router, AppState) {
    let (registry, _) = ServoRegistry::start(PINS.to_vec(), ServoConfig::default(), Arc::new(factory))
        .await
        .unwrap();
    let state = AppState::new(registry);
    (build_app(state.clone(), options), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO & STATUS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_health_and_root() {
    let (app, _) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["servos"], 4);
    assert_eq!(body["active"], 4);
    assert_eq!(body["hold_mode"], "auto");

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"].as_array().unwrap().len() > 5);
}

#[tokio::test(start_paused = true)]
async fn test_status_map_is_keyed_by_servo() {
    let (app, _) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/api/servos/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let data = body["data"].as_object().unwrap();
    let keys: Vec<&str> = data.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["servo_1", "servo_2", "servo_3", "servo_4"]);
    assert_eq!(data["servo_2"]["gpio_pin"], 6);
    assert_eq!(data["servo_2"]["current_angle"], 90);
}

#[tokio::test(start_paused = true)]
async fn test_list_servos_ordered_by_id() {
    let (app, _) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/api/servos")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["servo_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_servo_is_404() {
    let (app, _) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/api/servos/9/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, post("/api/servos/9/move", json!({"angle": 10}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ═══════════════════════════════════════════════════════════════════════════
// MOTION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_move_servo() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, post("/api/servos/2/move", json!({"angle": 45}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Servo 2 moved to 45°");
    assert_eq!(body["data"]["servo_id"], 2);
    assert_eq!(body["data"]["angle"], 45);

    let servo = state.registry.status_of(2).await.unwrap();
    assert_eq!(servo.current_angle, Some(45));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_angle_rejected_at_boundary() {
    let factory = SimulatedFactory::new();
    let (app, state) = setup(factory.clone(), open_options()).await;
    factory.clear_events();

    for angle in [181, -1] {
        let (status, body) = send(&app, post("/api/servos/1/move", json!({"angle": angle}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_ANGLE");
    }

    let (status, _) = send(&app, post("/api/servos/move-all", json!({"angle": 500}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for gpio in PINS {
        assert!(factory.pulses(gpio).is_empty());
    }
    assert_eq!(state.registry.status_of(1).await.unwrap().current_angle, Some(90));
}

#[tokio::test(start_paused = true)]
async fn test_inactive_servo_is_409() {
    let (app, _) = setup(SimulatedFactory::new().fail_open(26), open_options()).await;

    let (status, body) = send(&app, post("/api/servos/4/move", json!({"angle": 10}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INACTIVE");

    let (status, body) = send(&app, get("/api/servos/4/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);
}

#[tokio::test(start_paused = true)]
async fn test_move_all_partial_is_207() {
    let (app, _) = setup(SimulatedFactory::new().fail_open(26), open_options()).await;

    let (status, body) = send(&app, post("/api/servos/move-all", json!({"angle": 120}))).await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["succeeded"], json!([1, 2, 3]));
    assert_eq!(body["data"]["errors"]["4"], "Servo 4 is not active");
}

#[tokio::test(start_paused = true)]
async fn test_center_all() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;
    state.registry.move_all(10).await;

    let (status, body) = send(&app, post("/api/servos/center-all", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["message"],
        "All servos centered at 90°. Affected servos: [1, 2, 3, 4]"
    );
    for servo in state.registry.status().await.values() {
        assert_eq!(servo.current_angle, Some(90));
    }
}

#[tokio::test(start_paused = true)]
async fn test_hold_and_release() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, _) = send(&app, post("/api/servos/1/release", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.registry.status_of(1).await.unwrap().attached);

    let (status, _) = send(&app, post("/api/servos/1/hold", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state.registry.status_of(1).await.unwrap().attached);

    let (status, body) = send(&app, post("/api/servos/release-all", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["succeeded"], json!([1, 2, 3, 4]));
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_config_roundtrip() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/api/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hold_mode"], "auto");
    assert_eq!(body["data"]["smooth_steps"], 10);

    let (status, body) = send(
        &app,
        put("/api/config", json!({"hold_mode": "hold", "smooth_enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hold_mode"], "hold");
    assert_eq!(body["data"]["smooth_enabled"], true);

    let config = state.registry.config().await;
    assert_eq!(config.hold_mode, HoldMode::Hold);
    assert!(config.smooth_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_changes_nothing() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;
    let before = state.registry.config().await;

    let (status, body) = send(
        &app,
        put("/api/config", json!({"hold_mode": "bogus", "smooth_steps": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONFIG_VALIDATION_ERROR");

    let (status, _) = send(&app, put("/api/config", json!({"min_pulse_width": 0.01}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(state.registry.config().await, before);
}

// ═══════════════════════════════════════════════════════════════════════════
// MIDDLEWARE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_api_key_required_when_configured() {
    let options = AppOptions {
        auth: ApiKeyConfig::from_keys("secret"),
        ..open_options()
    };
    let (app, _) = setup(SimulatedFactory::new(), options).await;

    let (status, body) = send(&app, get("/api/servos")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/api/servos")
        .header("X-API-Key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/servos")
        .header("X-API-Key", "secret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_rejects_burst() {
    let options = AppOptions {
        rate_limit: RateLimitConfig {
            requests_per_second: 1,
            burst_size: 2,
            enabled: true,
        },
        ..open_options()
    };
    let (app, _) = setup(SimulatedFactory::new(), options).await;

    assert_eq!(send(&app, get("/api/config")).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("/api/config")).await.0, StatusCode::OK);
    let (status, body) = send(&app, get("/api/config")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
}

#[tokio::test(start_paused = true)]
async fn test_openapi_document_served() {
    let (app, _) = setup(SimulatedFactory::new(), open_options()).await;

    let (status, body) = send(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/servos/{servo_id}/move"].is_object());
}

// ═══════════════════════════════════════════════════════════════════════════
// PUSH CHANNEL
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn test_http_mutation_broadcasts_snapshot() {
    let (app, state) = setup(SimulatedFactory::new(), open_options()).await;
    let mut updates = state.registry.subscribe();

    let (status, _) = send(&app, post("/api/servos/3/move", json!({"angle": 30}))).await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = updates.recv().await.unwrap();
    assert_eq!(snapshot[&3].current_angle, Some(30));
}

#[tokio::test(start_paused = true)]
async fn test_ws_commands() {
    let (_, state) = setup(SimulatedFactory::new().fail_open(26), open_options()).await;

    let reply = handle_text(&state, r#"{"type":"move","servo_id":1,"angle":60}"#).await;
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["data"]["message"], "Servo 1 moved to 60°");

    let reply = handle_text(&state, r#"{"type":"center"}"#).await;
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "result");
    assert_eq!(json["data"]["succeeded"], json!([1, 2, 3]));
    assert_eq!(json["data"]["errors"]["4"], "Servo 4 is not active");

    let reply = handle_text(&state, r#"{"type":"move","servo_id":1,"angle":200}"#).await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == "INVALID_ANGLE"));

    let reply = handle_text(&state, "not json").await;
    assert!(matches!(reply, ServerMessage::Error(ref e) if e.code == "INVALID_MESSAGE"));

    let reply = handle_text(&state, r#"{"type":"refresh"}"#).await;
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "status_update");
    assert_eq!(json["data"]["servo"]["1"]["current_angle"], 90);
}
