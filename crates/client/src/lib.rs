//! Keyhaven client library.
//!
//! Talks to the Keyhaven property-management API. Every call goes through a
//! single [`Interceptor`] that attaches the bearer token, revalidates cached
//! responses, and silently refreshes an expired session once.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use keyhaven_client::KeyhavenClient;
//!
//! let client = KeyhavenClient::from_env()?;
//! let mut listing = std::pin::pin!(client.properties().list_stream());
//! while let Some(fetched) = listing.next().await {
//!     let fetched = fetched?;
//!     println!("{} properties (stale: {})", fetched.value.len(), fetched.is_stale());
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod properties;
pub mod request;
pub mod store;

pub use auth::AuthService;
pub use cache::ResponseCache;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use guard::{GuardOutcome, NavigationGuard};
pub use interceptor::Interceptor;
pub use properties::PropertyService;
pub use request::{ApiRequest, ApiResponse, Fetched, ResponseSource};
pub use store::{TokenPair, TokenStore};

/// Every service wired to one shared interceptor.
#[derive(Debug, Clone)]
pub struct KeyhavenClient {
    interceptor: Interceptor,
    auth: AuthService,
    properties: PropertyService,
    guard: NavigationGuard,
}

impl KeyhavenClient {
    /// Build the client from a configuration and a session store.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be created.
    pub fn new(config: ClientConfig, store: TokenStore) -> Result<Self> {
        let cache = ResponseCache::new(config.cache_capacity);
        let guard = NavigationGuard::new(store.clone(), config.auth_route.clone());
        let interceptor = Interceptor::new(config, store, cache)?;

        Ok(Self {
            auth: AuthService::new(interceptor.clone()),
            properties: PropertyService::new(interceptor.clone()),
            guard,
            interceptor,
        })
    }

    /// Build the client with the session persisted at `config.store_path`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Store` if the session file exists but cannot be
    /// read.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let store = TokenStore::open_file(config.store_path.clone())?;
        Self::new(config, store)
    }

    /// Build the client from `KEYHAVEN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    #[must_use]
    pub const fn auth(&self) -> &AuthService {
        &self.auth
    }

    #[must_use]
    pub const fn properties(&self) -> &PropertyService {
        &self.properties
    }

    #[must_use]
    pub const fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    #[must_use]
    pub const fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }
}
