//! API request handlers for the catalog service

pub mod categories;
pub mod content;
pub mod products;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use catalog_common::{ContentItem, ContentKind, Error};
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    auth::AuthSettings,
    form::{read_multipart, SubmittedForm},
    rate_limit::{ClientRateLimiter, RateLimitConfig},
    storage::{DocumentStore, ProductStore, Repository},
    upload::UploadGateway,
};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub products: ProductStore,
    pub uploads: UploadGateway,
    pub auth: Option<AuthSettings>,
    pub allowed_origins: Vec<String>,
    pub expose_error_details: bool,
    pub rate_limiter: Option<ClientRateLimiter>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, uploads: UploadGateway) -> Self {
        Self {
            products: ProductStore::new(store.clone()),
            store,
            uploads,
            auth: None,
            allowed_origins: vec!["*".to_string()],
            expose_error_details: false,
            rate_limiter: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limiter = ClientRateLimiter::new(config);
        self
    }

    /// Typed access to one content collection
    pub fn content(&self, kind: ContentKind) -> Repository<ContentItem> {
        Repository::new(self.store.clone(), kind.collection())
    }
}

pub type SharedState = Arc<AppState>;

/// Diagnostic attached to 5xx responses; rendered only outside production
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub detail: String,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn internal(detail: String) -> Self {
        error!("Request failed: {}", detail);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_string(),
            detail: Some(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        let mut response = (self.status, Json(body)).into_response();
        if let Some(detail) = self.detail {
            response.extensions_mut().insert(ErrorDetail {
                message: self.message,
                detail,
            });
        }
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if !err.is_client_error() {
            return ApiError::internal(format!("{:#}", anyhow::Error::from(err)));
        }

        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateSlug(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };

        warn!("Rejected request: {}", err);
        ApiError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Parse a multipart body under the gateway's policy
pub(crate) async fn read_form(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<SubmittedForm, ApiError> {
    let form = read_multipart(multipart?, state.uploads.policy()).await?;
    Ok(form)
}

/// Health check endpoint
pub async fn health_handler(State(state): State<SharedState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": "catalog-api",
            "storage": "connected"
        }))
        .into_response(),
        Err(e) => {
            warn!("Storage health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": "catalog-api",
                    "storage": "unavailable"
                })),
            )
                .into_response()
        }
    }
}

/// JSON 404 for unknown routes
pub async fn fallback_handler(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route not found: {}", uri.path()))
}
