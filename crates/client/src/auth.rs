//! Authentication service.
//!
//! Login and registration only trigger an OTP email; tokens are issued by
//! [`AuthService::verify_otp`] and renewed by [`AuthService::refresh_token`].
//! Those are the only two places a session is written.

use keyhaven_core::{Role, User, UserId};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{ClientError, Result};
use crate::interceptor::Interceptor;
use crate::request::ApiRequest;
use crate::store::TokenPair;

// =============================================================================
// Request bodies
// =============================================================================

/// Body of `POST /auth/login`. The backend also accepts a phone number here.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub role: Role,
}

/// Body of `POST /auth/request-otp`.
#[derive(Debug, Clone, Serialize)]
pub struct OtpRequest {
    pub email: String,
}

/// Body of `POST /auth/verify-otp`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub(crate) refresh_token: &'a str,
}

/// Partial user update. Unset fields are left unchanged by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UserUpdate {
    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none() && self.role.is_none()
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Response of login, registration and OTP requests.
///
/// `status` mirrors the HTTP status in the body. It is informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Response of `POST /auth/verify-otp`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Response of `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl RefreshResponse {
    /// Both tokens, if the server sent non-empty values for each.
    #[must_use]
    pub fn token_pair(&self) -> Option<TokenPair> {
        token_pair(self.access_token.as_deref(), self.refresh_token.as_deref())
    }
}

/// Response of `PATCH /users/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// An authenticated session: the signed-in user and their token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

fn token_pair(access: Option<&str>, refresh: Option<&str>) -> Option<TokenPair> {
    match (access, refresh) {
        (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
            Some(TokenPair::new(access, refresh))
        }
        _ => None,
    }
}

// =============================================================================
// Service
// =============================================================================

/// Authentication and user account operations.
#[derive(Debug, Clone)]
pub struct AuthService {
    interceptor: Interceptor,
}

impl AuthService {
    #[must_use]
    pub const fn new(interceptor: Interceptor) -> Self {
        Self { interceptor }
    }

    /// Ask the backend to email a login OTP.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` if the account does not exist.
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let endpoint = &self.interceptor.config().endpoints.login;
        let request = ApiRequest::post(endpoint.clone()).json(request)?;
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Create an account. The backend replies by emailing an OTP.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Status` with `409 Conflict` if the email or
    /// phone is already registered.
    #[instrument(skip(self, request), fields(role = %request.role))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let endpoint = &self.interceptor.config().endpoints.register;
        let request = ApiRequest::post(endpoint.clone()).json(request)?;
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Request a fresh OTP for an existing account.
    ///
    /// # Errors
    ///
    /// Returns the `ClientError` of the exchange.
    #[instrument(skip(self, request))]
    pub async fn request_otp(&self, request: &OtpRequest) -> Result<AuthResponse> {
        let endpoint = &self.interceptor.config().endpoints.request_otp;
        let request = ApiRequest::post(endpoint.clone()).json(request)?;
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Exchange an OTP for a session and persist it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` for a wrong or expired OTP, and
    /// `ClientError::MissingTokens` if the response carries no session.
    #[instrument(skip(self, request))]
    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> Result<Session> {
        let endpoint = &self.interceptor.config().endpoints.verify_otp;
        let api_request = ApiRequest::post(endpoint.clone()).json(request)?;
        let response: VerifyOtpResponse = self.interceptor.execute_json(api_request).await?.value;

        let tokens = token_pair(response.access_token.as_deref(), response.refresh_token.as_deref())
            .ok_or(ClientError::MissingTokens)?;
        let user = response.user.ok_or(ClientError::MissingTokens)?;

        self.interceptor.store().start_session(&tokens, &user)?;
        debug!(user_id = %user.id, "Session started");
        Ok(Session { user, tokens })
    }

    /// Exchange a refresh token for a new pair and persist it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingTokens` if the response lacks either token.
    pub async fn refresh_token(&self, refresh_token: &SecretString) -> Result<TokenPair> {
        self.interceptor.refresh_session(refresh_token).await
    }

    /// Refresh using the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` if no refresh token is stored.
    pub async fn refresh_stored(&self) -> Result<TokenPair> {
        let refresh_token = self
            .interceptor
            .store()
            .refresh_token()?
            .ok_or_else(|| ClientError::Unauthorized {
                body: "no refresh token stored".to_string(),
            })?;
        self.refresh_token(&refresh_token).await
    }

    /// Apply a partial update to a user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id or an empty update.
    #[instrument(skip(self, update), fields(user_id = %id))]
    pub async fn update_user(&self, id: &UserId, update: &UserUpdate) -> Result<UserUpdateResponse> {
        if id.is_blank() {
            return Err(ClientError::Validation("user id is required".to_string()));
        }
        if update.is_empty() {
            return Err(ClientError::Validation("nothing to update".to_string()));
        }
        let request = ApiRequest::patch(self.user_path(id)).json(update)?;
        Ok(self.interceptor.execute_json(request).await?.value)
    }

    /// Fetch a user and remember it as the current user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank id.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn get_user(&self, id: &UserId) -> Result<User> {
        if id.is_blank() {
            return Err(ClientError::Validation("user id is required".to_string()));
        }
        let user: User = self
            .interceptor
            .execute_json(ApiRequest::get(self.user_path(id)))
            .await?
            .value;
        self.interceptor.store().set_user(&user)?;
        Ok(user)
    }

    /// Forget the session and every cached response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the session file cannot be written.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<()> {
        self.interceptor.store().clear()?;
        self.interceptor.cache().clear();
        debug!("Session cleared");
        Ok(())
    }

    /// The persisted current user, if any.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the session cannot be read.
    pub fn current_user(&self) -> Result<Option<User>> {
        Ok(self.interceptor.store().current_user()?)
    }

    /// Whether a session has been established.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the session cannot be read.
    pub fn is_logged_in(&self) -> Result<bool> {
        Ok(self.interceptor.store().is_logged_in()?)
    }

    fn user_path(&self, id: &UserId) -> String {
        format!("{}/{}", self.interceptor.config().endpoints.users, id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cache::{CacheEntry, ResponseCache};
    use crate::config::ClientConfig;
    use crate::store::TokenStore;

    fn service(server: &MockServer) -> AuthService {
        let config = ClientConfig::new(&server.uri()).unwrap();
        let interceptor =
            Interceptor::new(config, TokenStore::in_memory(), ResponseCache::new(10)).unwrap();
        AuthService::new(interceptor)
    }

    fn user_json() -> serde_json::Value {
        json!({"id": "u1", "name": "Ada", "email": "ada@example.com", "phone": "555", "role": "host"})
    }

    #[tokio::test]
    async fn test_login_sends_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "ada@example.com"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": 200, "message": "OTP sent to email"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = service(&server);
        let response = auth
            .login(&LoginRequest {
                email: "ada@example.com".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.status, Some(200));
        assert_eq!(response.message.as_deref(), Some("OTP sent to email"));
        assert!(!auth.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"error": "email already registered"})),
            )
            .mount(&server)
            .await;

        let err = service(&server)
            .register(&RegisterRequest {
                name: "Ada".to_string(),
                phone: "555".to_string(),
                email: "ada@example.com".to_string(),
                role: Role::Host,
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(reqwest::StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn test_verify_otp_starts_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/verify-otp"))
            .and(body_json(json!({"email": "ada@example.com", "otp": "123456"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "access_token": "a1",
                "refresh_token": "r1",
                "user": user_json()
            })))
            .mount(&server)
            .await;

        let auth = service(&server);
        let session = auth
            .verify_otp(&VerifyOtpRequest {
                email: "ada@example.com".to_string(),
                otp: "123456".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.name, "Ada");
        assert!(auth.is_logged_in().unwrap());
        assert_eq!(auth.current_user().unwrap(), Some(session.user));
    }

    #[tokio::test]
    async fn test_verify_otp_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/verify-otp"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "otp expired or invalid"})),
            )
            .mount(&server)
            .await;

        let auth = service(&server);
        let err = auth
            .verify_otp(&VerifyOtpRequest {
                email: "ada@example.com".to_string(),
                otp: "000000".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Unauthorized { .. }));
        assert!(!auth.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_token_persists_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({"refresh_token": "r1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "a2", "refresh_token": "r2"})),
            )
            .mount(&server)
            .await;

        let auth = service(&server);
        let tokens = auth
            .refresh_token(&SecretString::from("r1".to_string()))
            .await
            .unwrap();

        assert_eq!(tokens.access_token.expose_secret(), "a2");
        assert!(auth.is_logged_in().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_stored_without_token() {
        let server = MockServer::start().await;
        let err = service(&server).refresh_stored().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_update_user_sends_partial() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/users/u1"))
            .and(body_json(json!({"phone": "777"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "User updated successfully"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = service(&server)
            .update_user(
                &UserId::new("u1"),
                &UserUpdate {
                    phone: Some("777".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(response.message.as_deref(), Some("User updated successfully"));
    }

    #[tokio::test]
    async fn test_update_user_validation() {
        let server = MockServer::start().await;
        let auth = service(&server);

        let err = auth
            .update_user(&UserId::new(" "), &UserUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = auth
            .update_user(&UserId::new("u1"), &UserUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_user_persists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/u1"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&server)
            .await;

        let auth = service(&server);
        auth.interceptor
            .store()
            .set_tokens(&TokenPair::new("a1", "r1"))
            .unwrap();

        let user = auth.get_user(&UserId::new("u1")).await.unwrap();
        assert_eq!(auth.current_user().unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_logout_clears_store_and_cache() {
        let server = MockServer::start().await;
        let auth = service(&server);
        let store = auth.interceptor.store();
        store.set_tokens(&TokenPair::new("a1", "r1")).unwrap();
        auth.interceptor
            .cache()
            .insert(
                "/properties".to_string(),
                CacheEntry {
                    etag: None,
                    last_modified: None,
                    content_type: None,
                    body: bytes::Bytes::from_static(b"[]"),
                },
            )
            .await;

        auth.logout().unwrap();

        assert!(!auth.is_logged_in().unwrap());
        assert!(store.access_token().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
        assert!(auth.interceptor.cache().get("/properties").await.is_none());
    }

    #[test]
    fn test_token_pair_requires_both() {
        assert!(token_pair(Some("a"), Some("r")).is_some());
        assert!(token_pair(Some("a"), None).is_none());
        assert!(token_pair(Some(""), Some("r")).is_none());
    }
}
