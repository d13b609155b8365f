//! Webhook HTTP server.
//!
//! Routes:
//! - `POST <webhook_path>`: Telegram update; acknowledged at once, handled in the background
//! - `GET /health`: liveness probe

use std::future::Future;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sitebot_shared::{Result, SiteBotError};
use sitebot_telegram::{Update, chat_id_from_value};

use crate::dispatch::Dispatcher;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
}

/// Build the router serving the webhook at `webhook_path`.
pub fn router(dispatcher: Dispatcher, webhook_path: &str) -> Router {
    let webhook_path = format!("/{}", webhook_path.trim_start_matches('/'));
    Router::new()
        .route(&webhook_path, post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { dispatcher })
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| SiteBotError::Network(format!("listener address: {e}")))?;
    info!(%addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SiteBotError::Network(format!("server error: {e}")))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn webhook_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "undecodable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": "invalid JSON" })),
            );
        }
    };

    let dispatcher = state.dispatcher.clone();
    match serde_json::from_value::<Update>(payload.clone()) {
        Ok(update) => {
            tokio::spawn(async move { dispatcher.handle_update(&update).await });
        }
        Err(e) => {
            warn!(error = %e, "webhook body is not a valid update");
            if let Some(chat_id) = chat_id_from_value(&payload) {
                tokio::spawn(async move { dispatcher.reply_failure(chat_id).await });
            }
        }
    }

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use sitebot_core::messages;
    use tower::ServiceExt;

    use crate::testing::{FakeMessenger, test_dispatcher};

    async fn test_router() -> (Router, FakeMessenger) {
        let (dispatcher, messenger) = test_dispatcher(FakeMessenger::default()).await;
        (router(dispatcher, "/webhook"), messenger)
    }

    fn post_webhook(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = test_router().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let (app, messenger) = test_router().await;
        let response = app.oneshot(post_webhook("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn update_is_acknowledged_and_answered() {
        let (app, messenger) = test_router().await;
        let response = app
            .oneshot(post_webhook(
                r#"{"update_id": 1, "message": {"chat": {"id": 5}, "text": "/start"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = messenger.wait_for(1, Duration::from_secs(5)).await;
        assert_eq!(sent, vec![(5, messages::GREETING.to_string())]);
    }

    #[tokio::test]
    async fn malformed_update_with_chat_gets_failure_reply() {
        let (app, messenger) = test_router().await;
        let response = app
            .oneshot(post_webhook(r#"{"message": {"chat": {"id": 8}, "text": "hi"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = messenger.wait_for(1, Duration::from_secs(5)).await;
        assert_eq!(sent, vec![(8, messages::PROCESSING_FAILED.to_string())]);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let (app, _) = test_router().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = serve(listener, app, async {}).await;
        assert!(result.is_ok());
    }
}
