//! Request and response descriptors passed through the interceptor.
//!
//! An [`ApiRequest`] is a cloneable description of a call, not a built
//! `reqwest::Request`: the interceptor may need to send the same request a
//! second time after refreshing the access token, and multipart bodies can
//! only be consumed once.

use std::path::Path;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::cache_key;

/// Status text of a cached body emitted before the network answers.
pub const STALE_CACHE_STATUS_TEXT: &str = "OK (stale cache)";
/// Status text of a cached body substituted for a `304 Not Modified`.
pub const FROM_CACHE_STATUS_TEXT: &str = "OK (from cache)";

/// Body of an outbound request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(FormData),
}

/// Multipart form contents, kept in memory so the request can be replayed.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl FormData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file under `field`.
    #[must_use]
    pub fn file(mut self, field: impl Into<String>, mut part: FilePart) -> Self {
        part.field = field.into();
        self.files.push(part);
        self
    }

    /// Returns true if the form carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    /// Build a fresh `reqwest` multipart form.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if a file's MIME type is malformed.
    pub fn to_multipart(&self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
            if let Some(mime) = &file.mime {
                part = part.mime_str(mime)?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

/// A file attached to a multipart form.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field the file is sent under.
    pub field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl FilePart {
    /// Create an in-memory file part. The MIME type is guessed from the name.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        Self {
            field: String::new(),
            mime: guess_mime(&file_name).map(String::from),
            file_name,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(file_name, bytes))
    }
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Description of an outbound API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL (e.g. `/properties/42`).
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart form body.
    #[must_use]
    pub fn form(mut self, form: FormData) -> Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Request target used as the cache key: path plus encoded query.
    #[must_use]
    pub fn target(&self) -> String {
        cache_key(&self.path, &self.query)
    }

    /// Only `GET` requests take part in response caching.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// Cached body emitted before the network answered; a later value follows.
    StaleCache,
    /// Cached body substituted for a `304 Not Modified`.
    NotModified,
}

impl ResponseSource {
    /// Returns true for values that will be superseded by a later one.
    #[must_use]
    pub const fn is_stale(self) -> bool {
        matches!(self, Self::StaleCache)
    }
}

/// A completed response as seen by callers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Reason phrase, or a cache marker for substituted bodies.
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl ApiResponse {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A parsed value tagged with the source of the body it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: ResponseSource,
}

impl<T> Fetched<T> {
    /// Returns true if a more authoritative value will follow.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.source.is_stale()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_includes_query() {
        let request = ApiRequest::get("/properties").query("page", "2");
        assert_eq!(request.target(), "/properties?page=2");
    }

    #[test]
    fn test_only_get_is_cacheable() {
        assert!(ApiRequest::get("/properties").is_cacheable());
        assert!(!ApiRequest::post("/properties").is_cacheable());
        assert!(!ApiRequest::patch("/properties/1").is_cacheable());
        assert!(!ApiRequest::delete("/properties/1").is_cacheable());
    }

    #[test]
    fn test_json_body() {
        let request = ApiRequest::post("/auth/login")
            .json(&serde_json::json!({"email": "a@b.c"}))
            .unwrap();
        match request.body {
            RequestBody::Json(value) => assert_eq!(value["email"], "a@b.c"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_file_part_guesses_mime() {
        assert_eq!(FilePart::new("front.JPG", vec![1u8]).mime.as_deref(), Some("image/jpeg"));
        assert_eq!(FilePart::new("plan.pdf", vec![1u8]).mime, None);
        assert_eq!(FilePart::new("noext", vec![1u8]).mime, None);
    }

    #[test]
    fn test_form_data_builder() {
        let form = FormData::new()
            .text("title", "Loft")
            .file("images", FilePart::new("a.png", vec![0u8, 1, 2]));
        assert!(!form.is_empty());
        assert_eq!(form.files[0].field, "images");
        assert!(form.to_multipart().is_ok());
    }

    #[tokio::test]
    async fn test_file_part_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kitchen.png");
        tokio::fs::write(&path, b"png-bytes").await.unwrap();

        let part = FilePart::from_path(&path).await.unwrap();
        assert_eq!(part.file_name, "kitchen.png");
        assert_eq!(part.mime.as_deref(), Some("image/png"));
        assert_eq!(part.bytes, Bytes::from_static(b"png-bytes"));
    }

    #[test]
    fn test_response_json_and_text() {
        let response = ApiResponse {
            status: StatusCode::OK,
            status_text: STALE_CACHE_STATUS_TEXT.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{\"id\":\"42\"}"),
            source: ResponseSource::StaleCache,
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(response.text(), "{\"id\":\"42\"}");
        assert!(response.source.is_stale());
    }
}
