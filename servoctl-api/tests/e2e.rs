//! End-to-end test over a real socket

use std::sync::Arc;

use serde_json::{json, Value};
use servoctl_actuator::{ServoConfig, ServoRegistry, SimulatedFactory};
use servoctl_api::{build_app, middleware::RateLimitConfig, AppOptions, AppState};

#[tokio::test]
async fn test_serve_move_and_shutdown() {
    let factory = SimulatedFactory::new();
    let (registry, report) =
        ServoRegistry::start(vec![13, 6], ServoConfig::default(), Arc::new(factory.clone()))
            .await
            .unwrap();
    assert!(report.is_complete());

    let options = AppOptions {
        rate_limit: RateLimitConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let app = build_app(AppState::new(registry.clone()), options);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/servos/1/move"))
        .json(&json!({"angle": 135}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["message"], "Servo 1 moved to 135°");

    let body: Value = client
        .get(format!("http://{addr}/api/servos/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["servo_1"]["current_angle"], 135);
    assert_eq!(body["data"]["servo_2"]["current_angle"], 90);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();

    registry.shutdown().await;
    assert!(registry.status().await.values().all(|s| !s.attached));
    assert!(registry.move_one(1, 10).await.is_err());
    assert!(factory.disable_count(13) >= 1);
}
