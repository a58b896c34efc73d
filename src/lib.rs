use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use rust_mcp_sdk::schema::Tool;
use tower_http::cors::{Any, CorsLayer};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod identity;
pub mod logging;
pub mod mcp;

use domain::metadata::{AuthorizationServerMetadata, WELL_KNOWN_PATH};
use identity::TokenVerifier;

const CORS_MAX_AGE_SECS: u64 = 86_400;

/// Process-scoped, read-only state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub metadata: Arc<AuthorizationServerMetadata>,
    pub tool_definitions: Arc<[Tool]>,
}

impl AppState {
    pub fn new(verifier: Arc<dyn TokenVerifier>, metadata: AuthorizationServerMetadata) -> Self {
        Self {
            verifier,
            metadata: Arc::new(metadata),
            tool_definitions: Arc::from(domain::tools::build_tools_list()),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/mcp",
            post(http::handlers::mcp_endpoint)
                .get(http::handlers::mcp_method_not_allowed)
                .delete(http::handlers::mcp_method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(CORS_MAX_AGE_SECS));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route(
            WELL_KNOWN_PATH,
            get(http::handlers::authorization_server_metadata),
        )
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::identity::{IdentityClaims, VerificationError};

    use super::*;

    #[derive(Default)]
    struct StaticVerifier {
        tokens: HashMap<String, IdentityClaims>,
        calls: AtomicUsize,
    }

    impl StaticVerifier {
        fn with_users(users: &[(&str, &str)]) -> Self {
            Self {
                tokens: users
                    .iter()
                    .map(|(token, sub)| (token.to_string(), IdentityClaims::for_subject(*sub)))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl TokenVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Result<IdentityClaims, VerificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Let concurrent requests interleave at the verifier.
            tokio::task::yield_now().await;
            self.tokens
                .get(token)
                .cloned()
                .ok_or_else(|| VerificationError::new("unknown token"))
        }
    }

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "STYTCH_PROJECT_ID" => Some("project-test-123".to_string()),
            _ => None,
        })
        .expect("config should parse")
    }

    fn app_with(verifier: Arc<StaticVerifier>) -> Router {
        let state = AppState::new(
            verifier,
            AuthorizationServerMetadata::from_config(&test_config()),
        );
        build_app(state)
    }

    fn app() -> Router {
        app_with(Arc::new(StaticVerifier::with_users(&[
            ("token-alice", "user-alice"),
            ("token-bob", "user-bob"),
        ])))
    }

    fn mcp_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/mcp")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request build")
    }

    async fn body_bytes(response: Response) -> axum::body::Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = body_bytes(response).await;
        serde_json::from_slice(&body).expect("valid json response")
    }

    const WHOAMI: &str = r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"whoami","arguments":{}}}"#;

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_is_public_and_complete() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/oauth-authorization-server")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["issuer"], "project-test-123");
        assert_eq!(
            body["token_endpoint"],
            "https://test.stytch.com/v1/public/project-test-123/oauth2/token"
        );
        assert_eq!(body["scopes_supported"][3], "offline_access");
        assert_eq!(body["grant_types_supported"][1], "refresh_token");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized_without_verification() {
        let verifier = Arc::new(StaticVerifier::with_users(&[("token-alice", "user-alice")]));
        let response = app_with(verifier.clone())
            .oneshot(mcp_request(None, WHOAMI))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_bytes(response).await, "{\"error\":\"Unauthorized\"}");
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized_without_verification() {
        let verifier = Arc::new(StaticVerifier::with_users(&[("token-alice", "user-alice")]));
        let response = app_with(verifier.clone())
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
                    .body(Body::from(WHOAMI))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_token_looks_like_missing_token() {
        let verifier = Arc::new(StaticVerifier::with_users(&[("token-alice", "user-alice")]));
        let response = app_with(verifier.clone())
            .oneshot(mcp_request(Some("token-mallory"), WHOAMI))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_bytes(response).await, "{\"error\":\"Unauthorized\"}");
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_returns_sum() {
        let response = app()
            .oneshot(mcp_request(
                Some("token-alice"),
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add","arguments":{"a":2,"b":3}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("mcp-session-id").is_none());
        let body = body_json(response).await;
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 3);
        assert_eq!(body["result"]["content"][0]["text"], "5");
    }

    #[tokio::test]
    async fn whoami_renders_verified_claims() {
        let response = app()
            .oneshot(mcp_request(Some("token-bob"), WHOAMI))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let text = body["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        assert!(text.starts_with("You are "));
        assert!(text.contains("user-bob"));
    }

    #[tokio::test]
    async fn concurrent_requests_see_only_their_own_identity() {
        let app = app();
        for _ in 0..16 {
            let (alice, bob) = tokio::join!(
                app.clone().oneshot(mcp_request(Some("token-alice"), WHOAMI)),
                app.clone().oneshot(mcp_request(Some("token-bob"), WHOAMI)),
            );
            let alice = body_json(alice.expect("alice request")).await;
            let bob = body_json(bob.expect("bob request")).await;

            let alice_text = alice["result"]["content"][0]["text"].to_string();
            let bob_text = bob["result"]["content"][0]["text"].to_string();
            assert!(alice_text.contains("user-alice") && !alice_text.contains("user-bob"));
            assert!(bob_text.contains("user-bob") && !bob_text.contains("user-alice"));
        }
    }

    #[tokio::test]
    async fn initialize_returns_server_info() {
        let response = app()
            .oneshot(mcp_request(
                Some("token-alice"),
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(body["result"]["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert!(body["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_returns_both_tools() {
        let response = app()
            .oneshot(mcp_request(
                Some("token-alice"),
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
            ))
            .await
            .expect("request execution");

        let body = body_json(response).await;
        assert_eq!(body["result"]["tools"][0]["name"], "add");
        assert_eq!(body["result"]["tools"][1]["name"], "whoami");
    }

    #[tokio::test]
    async fn notification_is_accepted() {
        let response = app()
            .oneshot(mcp_request(
                Some("token-alice"),
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let response = app()
            .oneshot(mcp_request(Some("token-alice"), "{"))
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32700);
        assert!(body["id"].is_null());
    }

    #[tokio::test]
    async fn get_on_mcp_is_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("GET")
                    .header(header::AUTHORIZATION, "Bearer token-alice")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32000);
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("OPTIONS")
                    .header(header::ORIGIN, "https://client.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }

    fn failing_app(handler: axum::routing::MethodRouter<AppState>) -> Router {
        let state = AppState::new(
            Arc::new(StaticVerifier::with_users(&[("token-alice", "user-alice")])),
            AuthorizationServerMetadata::from_config(&test_config()),
        );
        Router::new()
            .route("/mcp", handler)
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_bearer_token,
            ))
            .with_state(state)
    }

    async fn assert_internal_error(response: Response) {
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["message"], "Internal server error");
        assert!(body["id"].is_null());
    }

    async fn exploding_session() -> Result<Response, errors::AppError> {
        panic!("session blew up mid-request")
    }

    async fn failing_session() -> Result<Response, errors::AppError> {
        Err(errors::AppError::internal("transport failed"))
    }

    #[tokio::test]
    async fn panicking_session_is_an_internal_json_rpc_error() {
        let app = failing_app(post(|| http::handlers::guard_mcp_failure(exploding_session())));
        let response = app
            .oneshot(mcp_request(Some("token-alice"), WHOAMI))
            .await
            .expect("request execution");

        assert_internal_error(response).await;
    }

    #[tokio::test]
    async fn failing_session_is_an_internal_json_rpc_error() {
        let app = failing_app(post(|| http::handlers::guard_mcp_failure(failing_session())));
        let response = app
            .oneshot(mcp_request(Some("token-alice"), WHOAMI))
            .await
            .expect("request execution");

        assert_internal_error(response).await;
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .method("POST")
                    .header(header::AUTHORIZATION, "Bearer token-alice")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
