//! Authenticating, caching request interceptor.
//!
//! Every service call goes through [`Interceptor::intercept`], which wraps
//! the `reqwest` transport with:
//!
//! - bearer token injection from the [`TokenStore`]
//! - conditional requests (`If-None-Match`, `If-Modified-Since`) against the
//!   [`ResponseCache`]
//! - stale-while-revalidate: a cached body is yielded before the network
//!   answers, then the authoritative value follows
//! - `304 Not Modified` substitution with the cached body
//! - one silent token refresh and replay on `401 Unauthorized`
//!
//! Token refresh and OTP verification bypass all of the above and are sent
//! exactly as built.

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_TYPE, ETAG, HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use crate::auth::{RefreshRequest, RefreshResponse};
use crate::cache::{CacheEntry, ResponseCache};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::{
    ApiRequest, ApiResponse, FROM_CACHE_STATUS_TEXT, Fetched, RequestBody, ResponseSource,
    STALE_CACHE_STATUS_TEXT,
};
use crate::store::{TokenPair, TokenStore};

/// Request interceptor shared by every service.
///
/// Cheap to clone; clones share the transport, session store and cache.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<InterceptorInner>,
}

struct InterceptorInner {
    client: reqwest::Client,
    config: ClientConfig,
    store: TokenStore,
    cache: ResponseCache,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

/// Status, headers and body read off the wire.
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: bytes::Bytes,
}

impl RawResponse {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn into_api_response(self) -> ApiResponse {
        ApiResponse {
            status_text: self.status.canonical_reason().unwrap_or_default().to_string(),
            status: self.status,
            headers: self.headers,
            body: self.body,
            source: ResponseSource::Network,
        }
    }

    fn cache_entry(&self) -> CacheEntry {
        CacheEntry {
            etag: header_string(&self.headers, &ETAG),
            last_modified: header_string(&self.headers, &LAST_MODIFIED),
            content_type: header_string(&self.headers, &CONTENT_TYPE),
            body: self.body.clone(),
        }
    }
}

impl Interceptor {
    /// Create an interceptor with a transport built from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be created.
    pub fn new(config: ClientConfig, store: TokenStore, cache: ResponseCache) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("keyhaven-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config, store, cache))
    }

    /// Create an interceptor around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        config: ClientConfig,
        store: TokenStore,
        cache: ResponseCache,
    ) -> Self {
        Self {
            inner: Arc::new(InterceptorInner {
                client,
                config,
                store,
                cache,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    // =========================================================================
    // Interception
    // =========================================================================

    /// Send a request through the interceptor.
    ///
    /// Yields one or two items. When a cached body exists for the request
    /// target it is yielded first with [`ResponseSource::StaleCache`]; the
    /// last item is always the authoritative result of the network exchange.
    /// Dropping the stream cancels the in-flight exchange.
    pub fn intercept(
        &self,
        request: ApiRequest,
    ) -> impl Stream<Item = Result<ApiResponse>> + Send + 'static {
        let this = self.clone();
        stream! {
            if this.bypasses(&request) {
                yield this.forward(&request).await;
                return;
            }

            let cached = this.lookup(&request).await;
            if let Some(entry) = &cached {
                debug!(key = %request.target(), "Emitting stale cached response");
                yield Ok(cached_response(entry, ResponseSource::StaleCache));
            }

            yield this.exchange(&request, cached).await;
        }
    }

    /// Send a request and return only the authoritative result.
    ///
    /// # Errors
    ///
    /// Returns the `ClientError` of the network exchange. Stale cache
    /// emissions are skipped.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        if self.bypasses(&request) {
            return self.forward(&request).await;
        }
        let cached = self.lookup(&request).await;
        self.exchange(&request, cached).await
    }

    /// Like [`execute`](Self::execute), with the body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the body does not match `T`.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Fetched<T>> {
        let response = self.execute(request).await?;
        parse_fetched(&response)
    }

    /// Like [`intercept`](Self::intercept), with every body parsed as JSON.
    pub fn stream_json<T>(
        &self,
        request: ApiRequest,
    ) -> impl Stream<Item = Result<Fetched<T>>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.intercept(request)
            .map(|item| item.and_then(|response| parse_fetched(&response)))
    }

    // =========================================================================
    // Token refresh
    // =========================================================================

    /// Exchange a refresh token for a new token pair and persist it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingTokens` if the response lacks either
    /// token, or the `ClientError` of the exchange itself.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_session(&self, refresh_token: &SecretString) -> Result<TokenPair> {
        let request = ApiRequest::post(self.inner.config.endpoints.refresh.clone()).json(
            &RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            },
        )?;

        let response = self.forward(&request).await?;
        let body: RefreshResponse = response.json()?;
        let tokens = body.token_pair().ok_or(ClientError::MissingTokens)?;

        self.inner.store.set_tokens(&tokens)?;
        debug!("Stored refreshed token pair");
        Ok(tokens)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn bypasses(&self, request: &ApiRequest) -> bool {
        self.inner.config.endpoints.is_auth_exchange(&request.path)
    }

    async fn lookup(&self, request: &ApiRequest) -> Option<CacheEntry> {
        if !request.is_cacheable() {
            return None;
        }
        self.inner.cache.get(&request.target()).await
    }

    /// Send a bypassed request exactly as built.
    async fn forward(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.send(request, None, HeaderMap::new()).await?;
        if response.status.is_success() {
            Ok(response.into_api_response())
        } else {
            Err(self.status_error(request, &response))
        }
    }

    #[instrument(skip(self, request, cached), fields(method = %request.method, key = %request.target()))]
    async fn exchange(&self, request: &ApiRequest, cached: Option<CacheEntry>) -> Result<ApiResponse> {
        let token = self.inner.store.access_token()?;
        let conditional = cached
            .as_ref()
            .filter(|entry| entry.has_validators())
            .map(conditional_headers)
            .unwrap_or_default();
        if !conditional.is_empty() {
            debug!("Sending conditional request");
        }

        let response = self.send(request, token.as_ref(), conditional).await?;

        match response.status {
            StatusCode::NOT_MODIFIED => cached.map_or(Err(ClientError::NotModified), |entry| {
                debug!("Not modified, substituting cached body");
                Ok(cached_response(&entry, ResponseSource::NotModified))
            }),
            StatusCode::UNAUTHORIZED => self.recover(request, &response).await,
            _ => self.complete(request, response).await,
        }
    }

    /// Refresh the session once and replay `request` without conditional headers.
    async fn recover(&self, request: &ApiRequest, unauthorized: &RawResponse) -> Result<ApiResponse> {
        let original = ClientError::from_status(unauthorized.status, &unauthorized.text());

        let Some(refresh_token) = self.inner.store.refresh_token()? else {
            debug!("Unauthorized and no refresh token stored");
            return Err(original);
        };

        debug!("Unauthorized, attempting token refresh");
        let tokens = match self.refresh_session(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(ClientError::MissingTokens) => {
                warn!("Refresh response did not include a token pair");
                return Err(original);
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(ClientError::RefreshFailed(Box::new(e)));
            }
        };

        debug!("Replaying request with refreshed token");
        let replay = self
            .send(request, Some(&tokens.access_token), HeaderMap::new())
            .await?;
        self.complete(request, replay).await
    }

    /// Cache a successful body or turn the status into an error.
    async fn complete(&self, request: &ApiRequest, response: RawResponse) -> Result<ApiResponse> {
        if response.status == StatusCode::OK && request.is_cacheable() {
            self.inner
                .cache
                .insert(request.target(), response.cache_entry())
                .await;
        }
        if response.status.is_success() {
            Ok(response.into_api_response())
        } else {
            Err(self.status_error(request, &response))
        }
    }

    fn status_error(&self, request: &ApiRequest, response: &RawResponse) -> ClientError {
        let body = response.text();
        error!(
            status = %response.status,
            url = %self.inner.config.url_for(&request.path),
            body = %body.chars().take(500).collect::<String>(),
            "API request failed"
        );
        ClientError::from_status(response.status, &body)
    }

    async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&SecretString>,
        extra: HeaderMap,
    ) -> Result<RawResponse> {
        let url = self.inner.config.url_for(&request.target());
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder = builder.headers(extra);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(form) => builder.multipart(form.to_multipart()?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn conditional_headers(entry: &CacheEntry) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(etag) = entry.etag.as_deref()
        && let Ok(value) = HeaderValue::from_str(etag)
    {
        headers.insert(IF_NONE_MATCH, value);
    }
    if let Some(modified) = entry.last_modified.as_deref()
        && let Ok(value) = HeaderValue::from_str(modified)
    {
        headers.insert(IF_MODIFIED_SINCE, value);
    }
    headers
}

fn cached_response(entry: &CacheEntry, source: ResponseSource) -> ApiResponse {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (CONTENT_TYPE, entry.content_type.as_deref()),
        (ETAG, entry.etag.as_deref()),
        (LAST_MODIFIED, entry.last_modified.as_deref()),
    ] {
        if let Some(value) = value
            && let Ok(value) = HeaderValue::from_str(value)
        {
            headers.insert(name, value);
        }
    }

    let status_text = match source {
        ResponseSource::StaleCache => STALE_CACHE_STATUS_TEXT,
        _ => FROM_CACHE_STATUS_TEXT,
    };

    ApiResponse {
        status: StatusCode::OK,
        status_text: status_text.to_string(),
        headers,
        body: entry.body.clone(),
        source,
    }
}

fn header_string(headers: &HeaderMap, name: &reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn parse_fetched<T: DeserializeOwned>(response: &ApiResponse) -> Result<Fetched<T>> {
    Ok(Fetched {
        value: response.json()?,
        source: response.source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn interceptor(server: &MockServer, store: TokenStore) -> Interceptor {
        let config = ClientConfig::new(&server.uri()).unwrap();
        Interceptor::new(config, store, ResponseCache::new(100)).unwrap()
    }

    fn logged_in(access: &str, refresh: &str) -> TokenStore {
        let store = TokenStore::in_memory();
        store.set_tokens(&TokenPair::new(access, refresh)).unwrap();
        store
    }

    fn requests_with_header(requests: &[wiremock::Request], name: &str) -> usize {
        requests
            .iter()
            .filter(|r| r.headers.contains_key(name))
            .count()
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("access-1", "refresh-1"));
        let response = client.execute(ApiRequest::get("/properties")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_no_token_no_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = interceptor(&server, TokenStore::in_memory());
        client.execute(ApiRequest::get("/properties")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests_with_header(&requests, "authorization"), 0);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_bypasses_auth_and_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "a2", "refresh_token": "r2"})),
            )
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        let request = ApiRequest::post("/auth/refresh")
            .json(&json!({"refresh_token": "r1"}))
            .unwrap();
        let items: Vec<_> = client.intercept(request).collect().await;

        assert_eq!(items.len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests_with_header(&requests, "authorization"), 0);
        assert_eq!(requests_with_header(&requests, "if-none-match"), 0);
    }

    #[tokio::test]
    async fn test_first_fetch_populates_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_json(json!({"id": "42"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        let items: Vec<_> = client
            .intercept(ApiRequest::get("/properties/42"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests_with_header(&requests, "if-none-match"), 0);

        let entry = client.cache().get("/properties/42").await.unwrap();
        assert_eq!(entry.etag.as_deref(), Some("\"v1\""));
        assert_eq!(entry.body, items[0].body);
    }

    #[tokio::test]
    async fn test_stale_then_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties/42"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        client
            .cache()
            .insert(
                "/properties/42".to_string(),
                CacheEntry {
                    etag: Some("\"v1\"".to_string()),
                    last_modified: None,
                    content_type: Some("application/json".to_string()),
                    body: bytes::Bytes::from_static(b"{\"id\":\"42\"}"),
                },
            )
            .await;

        let items: Vec<_> = client
            .intercept(ApiRequest::get("/properties/42"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, ResponseSource::StaleCache);
        assert_eq!(items[0].status_text, STALE_CACHE_STATUS_TEXT);
        assert_eq!(items[1].status, StatusCode::OK);
        assert_eq!(items[1].source, ResponseSource::NotModified);
        assert_eq!(items[1].status_text, FROM_CACHE_STATUS_TEXT);
        assert_eq!(&items[1].body[..], b"{\"id\":\"42\"}");
    }

    #[tokio::test]
    async fn test_entry_without_validators_is_fetched_unconditionally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "p2"}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        client
            .cache()
            .insert(
                "/properties".to_string(),
                CacheEntry {
                    etag: None,
                    last_modified: None,
                    content_type: Some("application/json".to_string()),
                    body: bytes::Bytes::from_static(b"[{\"id\":\"p1\"}]"),
                },
            )
            .await;

        let items: Vec<_> = client
            .intercept(ApiRequest::get("/properties"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, ResponseSource::StaleCache);
        assert_eq!(items[1].source, ResponseSource::Network);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests_with_header(&requests, "if-none-match"), 0);
        assert_eq!(requests_with_header(&requests, "if-modified-since"), 0);
    }

    #[tokio::test]
    async fn test_not_modified_without_cache_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = interceptor(&server, TokenStore::in_memory());
        let err = client.execute(ApiRequest::get("/properties")).await.unwrap_err();
        assert!(matches!(err, ClientError::NotModified));
    }

    #[tokio::test]
    async fn test_post_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "7"})))
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        client
            .cache()
            .insert(
                "/properties".to_string(),
                CacheEntry {
                    etag: Some("\"list\"".to_string()),
                    last_modified: None,
                    content_type: None,
                    body: bytes::Bytes::from_static(b"[]"),
                },
            )
            .await;

        let items: Vec<_> = client
            .intercept(ApiRequest::post("/properties"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests_with_header(&requests, "if-none-match"), 0);
        let entry = client.cache().get("/properties").await.unwrap();
        assert_eq!(&entry.body[..], b"[]");
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = interceptor(&server, TokenStore::in_memory());
        let err = client.execute(ApiRequest::get("/users/u1")).await.unwrap_err();

        match err {
            ClientError::Unauthorized { body } => assert_eq!(body, "token expired"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_and_replay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .and(header("authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({"refresh_token": "old-refresh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "access_token": "new-access",
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .and(header("authorization", "Bearer new-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = logged_in("old-access", "old-refresh");
        let client = interceptor(&server, store.clone());
        let items: Vec<_> = client
            .intercept(ApiRequest::get("/users/u1"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, StatusCode::OK);
        assert_eq!(
            store.access_token().unwrap().unwrap().expose_secret(),
            "new-access"
        );
        assert_eq!(
            store.refresh_token().unwrap().unwrap().expose_secret(),
            "new-refresh"
        );
        assert!(client.cache().get("/users/u1").await.is_some());
    }

    #[tokio::test]
    async fn test_replay_drops_conditional_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties/42"))
            .and(header_exists("if-none-match"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "a2", "refresh_token": "r2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/properties/42"))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "v": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        client
            .cache()
            .insert(
                "/properties/42".to_string(),
                CacheEntry {
                    etag: Some("\"v1\"".to_string()),
                    last_modified: None,
                    content_type: None,
                    body: bytes::Bytes::from_static(b"{\"id\":\"42\",\"v\":1}"),
                },
            )
            .await;

        let response = client.execute(ApiRequest::get("/properties/42")).await.unwrap();
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["v"], 2);

        let requests = server.received_requests().await.unwrap();
        let replay = requests.last().unwrap();
        assert!(!replay.headers.contains_key("if-none-match"));
    }

    #[tokio::test]
    async fn test_refresh_failure_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid refresh token"))
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        let err = client.execute(ApiRequest::get("/users/u1")).await.unwrap_err();

        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_refresh_without_tokens_returns_original() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
            .expect(1)
            .mount(&server)
            .await;

        let store = logged_in("a1", "r1");
        let client = interceptor(&server, store.clone());
        let err = client.execute(ApiRequest::get("/users/u1")).await.unwrap_err();

        assert!(matches!(err, ClientError::Unauthorized { .. }));
        assert_eq!(store.access_token().unwrap().unwrap().expose_secret(), "a1");
    }

    #[tokio::test]
    async fn test_replay_is_attempted_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "a2", "refresh_token": "r2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        let err = client.execute(ApiRequest::get("/users/u1")).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_other_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Property not found"))
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        let err = client
            .execute(ApiRequest::get("/properties/missing"))
            .await
            .unwrap_err();

        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "Property not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_json_tags_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/properties"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v2\"")
                    .set_body_json(json!([1, 2])),
            )
            .mount(&server)
            .await;

        let client = interceptor(&server, logged_in("a1", "r1"));
        client
            .cache()
            .insert(
                "/properties".to_string(),
                CacheEntry {
                    etag: Some("\"v1\"".to_string()),
                    last_modified: None,
                    content_type: None,
                    body: bytes::Bytes::from_static(b"[1]"),
                },
            )
            .await;

        let items: Vec<Fetched<Vec<u32>>> = client
            .stream_json(ApiRequest::get("/properties"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_stale());
        assert_eq!(items[0].value, vec![1]);
        assert_eq!(items[1].source, ResponseSource::Network);
        assert_eq!(items[1].value, vec![1, 2]);

        let entry = client.cache().get("/properties").await.unwrap();
        assert_eq!(entry.etag.as_deref(), Some("\"v2\""));
    }
}
