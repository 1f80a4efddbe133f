//! HTTP surface: multipart image endpoints plus read-only listings.

use async_trait::async_trait;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secureface_core::{
    EnrollmentWorkflow, FaceAttributes, IdentityError, IdentityStore, ProviderError,
    RegistrationForm, Resolution, ResolutionEngine, User, Visitor,
};
use secureface_facepp::{FaceppClient, FacesetInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const IMAGE_FIELD: &str = "image";
const DEFAULT_VISITOR_LIMIT: usize = 50;
const MAX_VISITOR_LIMIT: usize = 500;
const DEFAULT_FACESET_OUTER_ID: &str = "securefaceset";
const DEFAULT_FACESET_NAME: &str = "SecureFaceSet";

/// Provider-side faceset administration.
#[async_trait]
pub trait FacesetAdmin: Send + Sync {
    async fn create(&self, outer_id: &str, display_name: &str) -> Result<FacesetInfo, ProviderError>;
    async fn detail(&self) -> Result<FacesetInfo, ProviderError>;
}

#[async_trait]
impl FacesetAdmin for FaceppClient {
    async fn create(&self, outer_id: &str, display_name: &str) -> Result<FacesetInfo, ProviderError> {
        self.create_faceset(outer_id, display_name).await
    }

    async fn detail(&self) -> Result<FacesetInfo, ProviderError> {
        self.faceset_detail().await
    }
}

pub struct AppState {
    pub resolver: ResolutionEngine,
    pub enroller: EnrollmentWorkflow,
    pub store: Arc<dyn IdentityStore>,
    pub faceset: Arc<dyn FacesetAdmin>,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/detect", post(detect))
        .route("/register", post(register))
        .route("/match", post(match_face))
        .route("/users", get(list_users))
        .route("/visitors", get(list_visitors))
        .route("/faceset", get(faceset_detail).post(create_faceset))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Error payload: `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// `no_face` is the status this route uses for an image without a face.
    fn from_identity(err: IdentityError, no_face: StatusCode) -> Self {
        let status = match &err {
            IdentityError::NoImageSupplied | IdentityError::InvalidRegistrationInput(_) => {
                StatusCode::BAD_REQUEST
            }
            IdentityError::NoFaceDetected => no_face,
            IdentityError::DuplicateFace(_) => StatusCode::CONFLICT,
            IdentityError::ProviderUnavailable(_) | IdentityError::StoreFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if err.is_user_correctable() {
            tracing::info!(error = %err, "request rejected");
        } else {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// A parsed multipart upload: the `image` file plus any text fields.
struct Upload {
    image: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl Upload {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut image = None;
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == IMAGE_FIELD {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    image = Some(bytes.to_vec());
                }
            } else {
                let value = field.text().await?;
                fields.insert(name, value);
            }
        }
        Ok(Self { image, fields })
    }

    fn require_image(&mut self) -> Result<Vec<u8>, ApiError> {
        self.image
            .take()
            .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "No image file uploaded"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectResponse {
    message: &'static str,
    face_attributes: FaceAttributes,
}

#[derive(Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: User,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchedResponse {
    message: &'static str,
    user: User,
    current_emotion: Option<String>,
}

#[derive(Serialize)]
struct VisitorResponse {
    message: &'static str,
    visitor: Visitor,
}

async fn health() -> &'static str {
    "SecureFace Backend API"
}

async fn detect(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, ApiError> {
    let image = Upload::read(multipart).await?.require_image()?;
    let face_attributes = state
        .resolver
        .describe(&image)
        .await
        .map_err(|e| ApiError::from_identity(e, StatusCode::NOT_FOUND))?;
    Ok(Json(DetectResponse {
        message: "Face detected successfully",
        face_attributes,
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut upload = Upload::read(multipart).await?;
    let image = upload.require_image()?;
    let form = RegistrationForm {
        name: upload.fields.remove("name"),
        age: upload.fields.remove("age"),
        gender: upload.fields.remove("gender"),
    };
    let user = state
        .enroller
        .enroll(&image, &form)
        .await
        .map_err(|e| ApiError::from_identity(e, StatusCode::BAD_REQUEST))?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

async fn match_face(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let image = Upload::read(multipart).await?.require_image()?;
    let resolution = state
        .resolver
        .resolve(&image)
        .await
        .map_err(|e| ApiError::from_identity(e, StatusCode::BAD_REQUEST))?;
    Ok(match resolution {
        Resolution::UserMatched {
            user,
            current_emotion,
        } => Json(MatchedResponse {
            message: "Registered user recognized",
            user,
            current_emotion,
        })
        .into_response(),
        Resolution::VisitorRecorded(visitor) => Json(VisitorResponse {
            message: "Stranger detected",
            visitor,
        })
        .into_response(),
    })
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .store
        .list_users()
        .await
        .map_err(|e| ApiError::from_identity(e.into(), StatusCode::BAD_REQUEST))?;
    Ok(Json(users))
}

#[derive(Deserialize)]
struct VisitorQuery {
    limit: Option<usize>,
}

async fn list_visitors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VisitorQuery>,
) -> Result<Json<Vec<Visitor>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_VISITOR_LIMIT)
        .min(MAX_VISITOR_LIMIT);
    let visitors = state
        .store
        .recent_visitors(limit)
        .await
        .map_err(|e| ApiError::from_identity(e.into(), StatusCode::BAD_REQUEST))?;
    Ok(Json(visitors))
}

async fn faceset_detail(State(state): State<Arc<AppState>>) -> Result<Json<FacesetInfo>, ApiError> {
    let info = state
        .faceset
        .detail()
        .await
        .map_err(|e| ApiError::from_identity(e.into(), StatusCode::BAD_REQUEST))?;
    Ok(Json(info))
}

#[derive(Deserialize)]
struct CreateFacesetQuery {
    outer_id: Option<String>,
    display_name: Option<String>,
}

async fn create_faceset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreateFacesetQuery>,
) -> Result<(StatusCode, Json<FacesetInfo>), ApiError> {
    let outer_id = query.outer_id.as_deref().unwrap_or(DEFAULT_FACESET_OUTER_ID);
    let display_name = query.display_name.as_deref().unwrap_or(DEFAULT_FACESET_NAME);
    let info = state
        .faceset
        .create(outer_id, display_name)
        .await
        .map_err(|e| ApiError::from_identity(e.into(), StatusCode::BAD_REQUEST))?;
    Ok((StatusCode::CREATED, Json(info)))
}
