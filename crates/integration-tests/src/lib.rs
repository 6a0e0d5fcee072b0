//! Integration tests for Keyhaven.
//!
//! # Running Tests
//!
//! ```bash
//! # Mock-server scenarios (no backend needed)
//! cargo test -p keyhaven-integration-tests
//!
//! # Live checks against a running backend
//! KEYHAVEN_API_BASE_URL=http://localhost:8080 cargo test -p keyhaven-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - OTP sign-in, persisted session, guard and logout
//! - `conditional_cache` - Validators, stale-then-fresh emission, 304 substitution
//! - `token_refresh` - Silent refresh and single replay on 401
//! - `live_api` - Read-only checks against a real backend (ignored by default)

use keyhaven_client::{ClientConfig, KeyhavenClient, TokenPair, TokenStore};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::MockServer;

/// A client wired to a fresh mock server and a session file in a temp dir.
pub struct TestContext {
    pub server: MockServer,
    pub client: KeyhavenClient,
    pub config: ClientConfig,
    /// Keeps the session directory alive for the duration of the test.
    pub dir: TempDir,
}

impl TestContext {
    /// Start a mock backend and a client with an empty session.
    ///
    /// # Panics
    ///
    /// Panics if the temp dir or client cannot be created.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = ClientConfig::new(&server.uri()).expect("Mock server URI is valid");
        config.store_path = dir.path().join("session.json");

        let client = KeyhavenClient::from_config(config.clone()).expect("Failed to build client");

        Self {
            server,
            client,
            config,
            dir,
        }
    }

    /// Start with a stored token pair, as after a successful sign-in.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot be written.
    pub async fn logged_in(access_token: &str, refresh_token: &str) -> Self {
        let ctx = Self::new().await;
        ctx.client
            .interceptor()
            .store()
            .set_tokens(&TokenPair::new(access_token, refresh_token))
            .expect("Failed to store tokens");
        ctx
    }

    /// Open the session file again, as a new process would.
    ///
    /// # Panics
    ///
    /// Panics if the session file cannot be read.
    #[must_use]
    pub fn reopen_store(&self) -> TokenStore {
        TokenStore::open_file(self.config.store_path.clone()).expect("Failed to reopen session")
    }
}

/// A user document as the backend returns it.
#[must_use]
pub fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "phone": "5550100",
        "role": "host"
    })
}

/// A property document as the backend returns it.
#[must_use]
pub fn property_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "user_id": "u1",
        "title": title,
        "description": "Two bedrooms near the river",
        "location": "Lisbon",
        "price": 120.5,
        "images": ["https://cdn.example.com/front.jpg"],
        "availability": true,
        "created_at": "2025-03-01T10:00:00Z",
        "updated_at": "2025-03-02T10:00:00Z"
    })
}
