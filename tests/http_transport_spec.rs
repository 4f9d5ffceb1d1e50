use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use ado_anchors::client::{HttpTransport, Method, Transport, TransportError};

// base64(":secret-pat")
const EXPECTED_AUTH: &str = "Basic OnNlY3JldC1wYXQ=";

async fn work_item(Path(id): Path<i64>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    if auth != Some(EXPECTED_AUTH) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    match id {
        42 => Ok(Json(json!({ "id": 42, "fields": { "System.Title": "Checkout" } }))),
        500 => Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "received": body }))
}

async fn start() -> String {
    let app = Router::new()
        .route("/Fabrikam/_apis/wit/workitems/{id}", get(work_item))
        .route("/Fabrikam/_apis/wit/wiql", post(echo))
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

mod requests {
    use super::*;

    #[tokio::test]
    async fn sends_the_token_as_basic_auth() {
        let base = start().await;
        let transport = HttpTransport::new(base, Some("secret-pat".to_string())).unwrap();

        let value = transport
            .request(Method::Get, "/Fabrikam/_apis/wit/workitems/42?api-version=7.0", None)
            .await
            .unwrap();

        assert_eq!(value["fields"]["System.Title"], "Checkout");
    }

    #[tokio::test]
    async fn posts_json_bodies() {
        let base = start().await;
        let transport = HttpTransport::new(format!("{base}/"), Some("secret-pat".to_string())).unwrap();

        let value = transport
            .request(
                Method::Post,
                "/Fabrikam/_apis/wit/wiql?api-version=7.0",
                Some(json!({ "query": "SELECT [System.Id] FROM WorkItems" })),
            )
            .await
            .unwrap();

        assert_eq!(value["received"]["query"], "SELECT [System.Id] FROM WorkItems");
    }

    #[tokio::test]
    async fn empty_bodies_decode_as_null() {
        let base = start().await;
        let transport = HttpTransport::new(base, None).unwrap();

        let value = transport.request(Method::Get, "/empty", None).await.unwrap();

        assert_eq!(value, Value::Null);
    }
}

mod status_mapping {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let base = start().await;
        let transport = HttpTransport::new(base, None).unwrap();

        let err = transport
            .request(Method::Get, "/Fabrikam/_apis/wit/workitems/42", None)
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Unauthorized));
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn not_found_and_server_errors_keep_their_status() {
        let base = start().await;
        let transport = HttpTransport::new(base, Some("secret-pat".to_string())).unwrap();

        let missing = transport
            .request(Method::Get, "/Fabrikam/_apis/wit/workitems/7", None)
            .await
            .unwrap_err();
        let broken = transport
            .request(Method::Get, "/Fabrikam/_apis/wit/workitems/500", None)
            .await
            .unwrap_err();

        assert!(matches!(missing, TransportError::NotFound(_)));
        assert!(matches!(broken, TransportError::Status { status: 500, .. }));
    }
}
