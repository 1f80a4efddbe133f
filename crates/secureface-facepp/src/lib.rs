//! secureface-facepp: Face++ v3 client.
//!
//! Implements [`FaceProvider`] over the Face++ HTTPS API: detection with
//! age/gender/emotion attributes, faceset search, and faceset membership.
//! Every call is a single request with the configured timeout; there is no
//! retry or caching here.

pub mod wire;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secureface_core::{DetectedFace, FaceProvider, ProviderError, SearchCandidate};
use std::fmt;
use std::time::Duration;

pub use wire::FacesetInfo;

pub const DEFAULT_API_URL: &str = "https://api-us.faceplusplus.com/facepp/v3";
const RETURN_ATTRIBUTES: &str = "gender,age,emotion";

/// Connection settings for the Face++ API.
#[derive(Clone)]
pub struct FaceppConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Faceset searched by resolution and extended by enrollment.
    pub faceset_token: String,
    pub timeout: Duration,
}

impl fmt::Debug for FaceppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceppConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("faceset_token", &self.faceset_token)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct FaceppClient {
    config: FaceppConfig,
    http: reqwest::Client,
}

impl FaceppClient {
    pub fn new(config: FaceppConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Create a faceset. Used once per deployment to obtain the faceset token.
    pub async fn create_faceset(
        &self,
        outer_id: &str,
        display_name: &str,
    ) -> Result<FacesetInfo, ProviderError> {
        let body = self
            .post_form(
                "faceset/create",
                &[("outer_id", outer_id), ("display_name", display_name)],
            )
            .await?;
        let info: FacesetInfo = wire::decode(&body)?;
        tracing::info!(faceset_token = %info.faceset_token, outer_id, "faceset created");
        Ok(info)
    }

    /// Describe the configured faceset, including its face tokens.
    pub async fn faceset_detail(&self) -> Result<FacesetInfo, ProviderError> {
        let body = self
            .post_form(
                "faceset/getdetail",
                &[("faceset_token", self.config.faceset_token.as_str())],
            )
            .await?;
        wire::decode(&body)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn credentials_form(&self) -> Form {
        Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("api_secret", self.config.api_secret.clone())
    }

    async fn post_multipart(&self, endpoint: &str, form: Form) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        read_body(endpoint, response).await
    }

    async fn post_form(
        &self,
        endpoint: &str,
        fields: &[(&str, &str)],
    ) -> Result<String, ProviderError> {
        let mut params = vec![
            ("api_key", self.config.api_key.as_str()),
            ("api_secret", self.config.api_secret.as_str()),
        ];
        params.extend_from_slice(fields);
        let response = self
            .http
            .post(self.url(endpoint))
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        read_body(endpoint, response).await
    }
}

async fn read_body(endpoint: &str, response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(format!("failed to read response: {e}")))?;
    tracing::debug!(endpoint, status = status.as_u16(), "face++ response");
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: wire::error_message(&body),
        });
    }
    Ok(body)
}

/// Multipart file part, named and typed after the sniffed image format.
fn image_part(image: &[u8]) -> Result<Part, ProviderError> {
    let (file_name, mime) = match image::guess_format(image) {
        Ok(format) => (
            format!("upload.{}", format.extensions_str().first().unwrap_or(&"bin")),
            format.to_mime_type(),
        ),
        Err(_) => ("upload.bin".to_string(), "application/octet-stream"),
    };
    Part::bytes(image.to_vec())
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|e| ProviderError::Request(e.to_string()))
}

#[async_trait]
impl FaceProvider for FaceppClient {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        let form = self
            .credentials_form()
            .text("return_attributes", RETURN_ATTRIBUTES)
            .part("image_file", image_part(image)?);
        let body = self.post_multipart("detect", form).await?;
        wire::parse_detect(&body)
    }

    async fn search(&self, image: &[u8]) -> Result<Vec<SearchCandidate>, ProviderError> {
        let form = self
            .credentials_form()
            .text("faceset_token", self.config.faceset_token.clone())
            .part("image_file", image_part(image)?);
        match self.post_multipart("search", form).await {
            Ok(body) => wire::parse_search(&body),
            // Nothing enrolled yet: no face can match.
            Err(ProviderError::Api { message, .. }) if message == wire::EMPTY_FACESET => {
                tracing::debug!("search against empty faceset");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn add_to_collection(&self, face_token: &str) -> Result<(), ProviderError> {
        let body = self
            .post_form(
                "faceset/addface",
                &[
                    ("faceset_token", self.config.faceset_token.as_str()),
                    ("face_tokens", face_token),
                ],
            )
            .await?;
        wire::parse_add_face(&body, face_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> FaceppConfig {
        FaceppConfig {
            base_url: base_url.into(),
            api_key: "key".into(),
            api_secret: "very-secret".into(),
            faceset_token: "fs-token".into(),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config(DEFAULT_API_URL));
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_url_joins_endpoint() {
        let client = FaceppClient::new(config("https://api-us.faceplusplus.com/facepp/v3/")).unwrap();
        assert_eq!(
            client.url("faceset/addface"),
            "https://api-us.faceplusplus.com/facepp/v3/faceset/addface"
        );
    }

    #[test]
    fn test_image_part_accepts_unknown_bytes() {
        assert!(image_part(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").is_ok());
        assert!(image_part(b"not an image").is_ok());
    }

    /// Serve canned Face++ responses on an ephemeral loopback port.
    async fn mock_facepp() -> String {
        use axum::http::StatusCode;
        use axum::routing::post;
        use axum::{Json, Router};
        use serde_json::json;

        let app = Router::new()
            .route(
                "/facepp/v3/search",
                post(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error_message": wire::EMPTY_FACESET })),
                    )
                }),
            )
            .route(
                "/facepp/v3/detect",
                post(|| async {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({ "error_message": "AUTHENTICATION_ERROR" })),
                    )
                }),
            )
            .route(
                "/facepp/v3/faceset/addface",
                post(|| async {
                    Json(json!({
                        "faceset_token": "fs-token",
                        "face_added": 0,
                        "face_count": 0,
                        "failure_detail": [{ "face_token": "tok-1", "reason": "INVALID_FACE_TOKEN" }]
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/facepp/v3")
    }

    #[tokio::test]
    async fn test_search_on_empty_faceset_has_no_candidates() {
        let client = FaceppClient::new(config(&mock_facepp().await)).unwrap();
        let candidates = client.search(b"\xff\xd8\xff").await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let client = FaceppClient::new(config(&mock_facepp().await)).unwrap();
        let err = client.detect(b"\xff\xd8\xff").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Api {
                status: 403,
                message: "AUTHENTICATION_ERROR".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_add_face_not_added_is_rejected() {
        let client = FaceppClient::new(config(&mock_facepp().await)).unwrap();
        let err = client.add_to_collection("tok-1").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::CollectionRejected {
                face_token: "tok-1".into(),
                reason: "INVALID_FACE_TOKEN".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = FaceppClient::new(config(&format!("http://{addr}/facepp/v3"))).unwrap();
        let err = client.search(b"\xff\xd8\xff").await.unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)), "{err:?}");
    }
}
