//! Remote image compression through the Tinify API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

use crate::error::RemoteError;
use crate::Result;

/// Production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.tinify.com";

/// Upload plus server-side compression can take a while for large images.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const COMPRESSION_COUNT_HEADER: &str = "Compression-Count";

/// An image compressed by a remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    /// Compressions used this month, as reported by the service.
    pub compression_count: Option<u64>,
}

/// A remote service that compresses image bytes.
#[async_trait]
pub trait RemoteCompressor: Send + Sync {
    async fn compress(&self, image: Vec<u8>) -> Result<CompressedImage>;
}

/// Tinify API client.
#[derive(Debug, Clone)]
pub struct TinifyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl TinifyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }

    async fn check(response: reqwest::Response) -> std::result::Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

#[async_trait]
impl RemoteCompressor for TinifyClient {
    async fn compress(&self, image: Vec<u8>) -> Result<CompressedImage> {
        let input_size = image.len();
        let response = self
            .client
            .post(format!("{}/shrink", self.base_url))
            .basic_auth("api", Some(&self.api_key))
            .body(image)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let compression_count = response
            .headers()
            .get(COMPRESSION_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| self.resolve(loc))
            .ok_or_else(|| {
                RemoteError::Connectivity("compression response has no Location header".into())
            })?;

        tracing::debug!("Uploaded {} bytes, fetching result from {}", input_size, location);

        let download = self
            .client
            .get(&location)
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await
            .map_err(transport_error)?;
        let download = Self::check(download).await?;
        let bytes = download.bytes().await.map_err(transport_error)?.to_vec();

        Ok(CompressedImage {
            bytes,
            compression_count,
        })
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Connectivity(e.to_string())
}

/// Map a non-success response to a failure category.
///
/// 429 and account-limit rejections are quota errors, other 4xx are client
/// errors and everything else is treated as a connectivity problem.
pub fn classify_failure(status: StatusCode, body: &str) -> RemoteError {
    let api: ApiError = serde_json::from_str(body).unwrap_or_default();
    let message = match (api.error.is_empty(), api.message.is_empty()) {
        (_, false) => api.message,
        (false, true) => api.error,
        (true, true) => body.trim().to_string(),
    };

    let mentions_limit = message.to_lowercase().contains("limit");
    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::QuotaExceeded(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if mentions_limit => {
            RemoteError::QuotaExceeded(message)
        }
        s if s.is_client_error() => RemoteError::Client {
            status: s.as_u16(),
            message,
        },
        s => RemoteError::Connectivity(format!("server returned {s}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use assert_matches::assert_matches;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn compresses_and_downloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shrink"))
            .and(basic_auth("api", "secret"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", format!("{}/output/abc123", server.uri()).as_str())
                    .insert_header("Compression-Count", "42")
                    .set_body_string(r#"{"input":{"size":12},"output":{"size":5}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/output/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"small".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = TinifyClient::with_base_url("secret", server.uri());
        let result = client.compress(b"large jpeg!!".to_vec()).await.unwrap();

        assert_eq!(result.bytes, b"small");
        assert_eq!(result.compression_count, Some(42));
    }

    #[tokio::test]
    async fn relative_location_is_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/shrink"))
            .respond_with(ResponseTemplate::new(201).insert_header("Location", "/output/rel"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/output/rel"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let client = TinifyClient::with_base_url("k", format!("{}/", server.uri()));
        let result = client.compress(b"img".to_vec()).await.unwrap();
        assert_eq!(result.bytes, b"ok");
        assert_eq!(result.compression_count, None);
    }

    #[tokio::test]
    async fn too_many_requests_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":"TooManyRequests","message":"Your monthly limit has been exceeded"}"#,
            ))
            .mount(&server)
            .await;

        let client = TinifyClient::with_base_url("k", server.uri());
        let err = client.compress(b"img".to_vec()).await.unwrap_err();
        assert_matches!(err, Error::Remote(RemoteError::QuotaExceeded(msg)) if msg.contains("monthly limit"));
    }

    #[tokio::test]
    async fn bad_credentials_are_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":"Unauthorized","message":"Credentials are invalid"}"#,
            ))
            .mount(&server)
            .await;

        let client = TinifyClient::with_base_url("wrong", server.uri());
        let err = client.compress(b"img".to_vec()).await.unwrap_err();
        assert_matches!(err, Error::Remote(RemoteError::Client { status: 401, .. }));
    }

    #[tokio::test]
    async fn server_error_is_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = TinifyClient::with_base_url("k", server.uri());
        let err = client.compress(b"img".to_vec()).await.unwrap_err();
        assert_matches!(err, Error::Remote(RemoteError::Connectivity(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_connectivity() {
        let client = TinifyClient::with_base_url("k", "http://127.0.0.1:1");
        let err = client.compress(b"img".to_vec()).await.unwrap_err();
        assert_matches!(err, Error::Remote(RemoteError::Connectivity(_)));
    }

    #[test]
    fn classification_rules() {
        assert_matches!(
            classify_failure(StatusCode::FORBIDDEN, r#"{"message":"Account limit reached"}"#),
            RemoteError::QuotaExceeded(_)
        );
        assert_matches!(
            classify_failure(StatusCode::UNSUPPORTED_MEDIA_TYPE, "not an image"),
            RemoteError::Client { status: 415, message } if message == "not an image"
        );
        assert_matches!(
            classify_failure(StatusCode::BAD_GATEWAY, ""),
            RemoteError::Connectivity(_)
        );
    }
}
