//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// API routes live under `/api`. A [`TraceLayer`] logs each request and
/// response through `tracing`.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use glowhub_app::clock::Clock;
    use glowhub_app::device::DeviceInfo;
    use glowhub_app::dimmable::Dimmable;
    use glowhub_app::ports::NullTransport;
    use glowhub_app::registry::Registry;
    use glowhub_app::runtime::{Runtime, RuntimeConfig, Workers};
    use glowhub_domain::config::ReceiverConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn runtime() -> (Runtime, Workers, Arc<Dimmable>) {
        let mut registry = Registry::new();
        registry.insert_clock(Arc::new(Clock::new())).unwrap();
        let desk = Arc::new(Dimmable::new(
            DeviceInfo::new("desk", "light").with_receivers(["value", "duration"]),
            0.0,
            100.0,
            Duration::from_millis(200),
        ));
        registry.insert(desk.clone()).unwrap();
        let (runtime, workers) =
            Runtime::new(registry, RuntimeConfig::default(), Arc::new(NullTransport));
        (runtime, workers, desk)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn should_return_ok_when_health_check_called() {
        let (runtime, _workers, _) = runtime();
        let response = send(build(AppState::new(runtime)), Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn should_queue_command_when_switch_posted() {
        let (runtime, workers, desk) = runtime();
        let app = build(AppState::new(runtime.clone()));

        let response = send(
            app,
            Method::POST,
            "/api/switch",
            Some(json!({"device": "desk", "value": 50})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["input"]["device"], "desk");
        assert_eq!(body["input"]["value"], "50");

        let Workers {
            dispatcher,
            scheduler,
        } = workers;
        drop(runtime);
        drop(scheduler);
        dispatcher.run().await;
        assert_eq!(desk.target(), Some(50.0));
    }

    #[tokio::test]
    async fn should_reject_switch_without_device() {
        let (runtime, _workers, _) = runtime();
        let response = send(
            build(AppState::new(runtime)),
            Method::POST,
            "/api/switch",
            Some(json!({"device": " , ", "value": "on"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_return_status_snapshot() {
        let (runtime, _workers, desk) = runtime();
        desk.sync(30.0);

        let response = send(build(AppState::new(runtime)), Method::GET, "/api/status", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["desk"]["value"], 30.0);
        assert_eq!(body["desk"]["type"], "light");
        assert!(body.get("time").is_some());
    }

    #[tokio::test]
    async fn should_schedule_one_off_rule_with_fade_for_lights() {
        let (runtime, _workers, _) = runtime();
        let app = build(AppState::new(runtime.clone()));

        let response = send(
            app.clone(),
            Method::POST,
            "/api/rules/once",
            Some(json!({"device": "desk", "value": "80", "in": 2, "unit": "minutes"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let rules = runtime.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id().to_string(), id);
        assert!(rules[0].single_use());
        assert_eq!(rules[0].receivers().len(), 2);

        let response = send(app, Method::GET, "/api/rules", None).await;
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], id.as_str());
        assert_eq!(body[0]["single_use"], true);
    }

    #[tokio::test]
    async fn should_reject_one_off_rule_with_unknown_unit() {
        let (runtime, _workers, _) = runtime();
        let response = send(
            build(AppState::new(runtime.clone())),
            Method::POST,
            "/api/rules/once",
            Some(json!({"device": "desk", "value": "1", "in": 2, "unit": "weeks"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("weeks"));
        assert!(runtime.rules().is_empty());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_device() {
        let (runtime, _workers, _) = runtime();
        let response = send(
            build(AppState::new(runtime)),
            Method::POST,
            "/api/rules/once",
            Some(json!({"device": "cellar", "value": "1", "in": 2})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_delete_rule_once() {
        let (runtime, _workers, _) = runtime();
        let app = build(AppState::new(runtime.clone()));
        let id = runtime
            .schedule_once(
                vec![ReceiverConfig::new("desk", "value", "1")],
                Duration::from_secs(60),
            )
            .unwrap();
        let uri = format!("/api/rules/{id}");

        let response = send(app.clone(), Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(runtime.rules().is_empty());

        let response = send(app.clone(), Method::DELETE, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(app, Method::DELETE, "/api/rules/not-a-uuid", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
