use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tracing::error;

use crate::message::{RequestMessage, SOURCE_DIRECT_HTTP};
use crate::rabbitmq::Enqueue;

#[derive(Clone)]
pub struct AppState {
    pub enqueuer: Arc<dyn Enqueue>,
}

/// Build the full HTTP router (public entrypoint used by `relay-api`).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/request", post(enqueue_request))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Accepts any JSON object, stamps provenance, and enqueues it. Enqueue
/// failures are surfaced to the caller instead of being swallowed.
async fn enqueue_request(
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let message = RequestMessage::from_http(body);

    match state.enqueuer.enqueue(&message).await {
        Ok(()) => Json(json!({
            "message": "Request received and queued",
            "source": SOURCE_DIRECT_HTTP,
        }))
        .into_response(),
        Err(err) => {
            error!("Failed to enqueue request: {}", err);
            json_error(StatusCode::BAD_GATEWAY, "enqueue_failed", err.to_string())
        }
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::Utc;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::rabbitmq::QueueError;

    #[derive(Default)]
    struct RecordingEnqueuer {
        messages: Mutex<Vec<RequestMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl Enqueue for RecordingEnqueuer {
        async fn enqueue(&self, message: &RequestMessage) -> crate::rabbitmq::Result<()> {
            if self.fail {
                return Err(QueueError::Publish("broker unavailable".to_string()));
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn post_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/request")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_request_enqueues_and_acknowledges() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = build_app(AppState {
            enqueuer: enqueuer.clone(),
        });

        let before = Utc::now();
        let response = app.oneshot(post_request(r#"{"foo":1}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response_json(response).await,
            json!({"message": "Request received and queued", "source": "direct_http"})
        );

        let messages = enqueuer.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);

        let value = serde_json::to_value(&messages[0]).unwrap();
        assert_eq!(value.get("foo"), Some(&json!(1)));
        assert_eq!(value.get("source"), Some(&json!("direct_http")));

        let received_at = messages[0].received_at.unwrap();
        assert!(received_at >= before && received_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_empty_body_is_acknowledged() {
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let app = build_app(AppState {
            enqueuer: enqueuer.clone(),
        });

        let response = app.oneshot(post_request("{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response_json(response).await,
            json!({"message": "Request received and queued", "source": "direct_http"})
        );

        assert_eq!(enqueuer.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_surfaced() {
        let enqueuer = Arc::new(RecordingEnqueuer {
            fail: true,
            ..Default::default()
        });
        let app = build_app(AppState { enqueuer });

        let response = app.oneshot(post_request(r#"{"foo":1}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = response_json(response).await;
        assert_eq!(body.get("error"), Some(&json!("enqueue_failed")));
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_app(AppState {
            enqueuer: Arc::new(RecordingEnqueuer::default()),
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
