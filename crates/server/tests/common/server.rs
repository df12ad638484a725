//! Server test utilities.

use super::fixtures::{seed_channel, seed_session};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use ferry_core::config::{AppConfig, MetadataConfig};
use ferry_metadata::{MetadataStore, SqliteStore};
use ferry_server::{AppState, create_router};
use ferry_transport::MemoryTransport;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Bearer token of the user every test server is seeded with.
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-token-user-1";
#[allow(dead_code)]
pub const TEST_USER_ID: i64 = 1;
/// Transport session stored for the test user.
#[allow(dead_code)]
pub const TEST_TRANSPORT_SESSION: &str = "transport-session-1";
/// Default channel of the test user.
#[allow(dead_code)]
pub const TEST_CHANNEL: i64 = 100;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Strict in-memory transport: only registered identities and channels.
    pub transport: MemoryTransport,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Test server with one user, their transport session and default channel.
    pub async fn new() -> Self {
        Self::build(|_| {}, |store| store).await
    }

    /// Test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |store| store).await
    }

    /// Test server whose metadata store is wrapped by `wrap`.
    pub async fn with_metadata<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn MetadataStore>) -> Arc<dyn MetadataStore>,
    {
        Self::build(|_| {}, wrap).await
    }

    async fn build<F, W>(modifier: F, wrap: W) -> Self
    where
        F: FnOnce(&mut AppConfig),
        W: FnOnce(Arc<dyn MetadataStore>) -> Arc<dyn MetadataStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("metadata.db");
        let sqlite: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        seed_session(
            sqlite.as_ref(),
            TEST_TOKEN,
            TEST_USER_ID,
            TEST_TRANSPORT_SESSION,
        )
        .await;
        seed_channel(sqlite.as_ref(), TEST_USER_ID, TEST_CHANNEL, true).await;

        let transport = MemoryTransport::new();
        transport.add_user_session(TEST_TRANSPORT_SESSION, TEST_USER_ID);
        transport.add_channel(TEST_CHANNEL);

        let mut config = AppConfig::for_testing();
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let metadata = wrap(sqlite);
        let state = AppState::new(config, metadata, Arc::new(transport.clone()));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            transport,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// POST one part. `query` is the query string without the leading `?`.
    pub async fn upload(
        &self,
        token: Option<&str>,
        upload_id: &str,
        query: &str,
        body: Bytes,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/uploads/{upload_id}?{query}"))
            .header("Content-Length", body.len());
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).unwrap();
        self.send(request).await
    }

    /// Request without a body.
    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
