//! Admin authentication for mutating routes
//!
//! A single admin account configured through the environment logs in with
//! username and password and receives an HS256 bearer token. When no admin
//! account is configured every route is open.

use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use catalog_common::sanitize::escape_html;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::config::AdminConfig;
use crate::handlers::{ApiError, SharedState};

#[derive(Clone)]
pub struct AuthSettings {
    username: String,
    username_digest: Vec<u8>,
    password_digest: Vec<u8>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_secs: u64,
}

impl From<&AdminConfig> for AuthSettings {
    fn from(config: &AdminConfig) -> Self {
        Self::new(
            &config.username,
            &config.password,
            &config.jwt_secret,
            config.token_ttl_secs,
        )
    }
}

/// Token payload
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Fixed-length digest of the escaped form; JSON bodies arrive escaped
fn credential_digest(value: &str) -> Vec<u8> {
    Sha1::digest(escape_html(value).as_bytes()).to_vec()
}

impl AuthSettings {
    pub fn new(username: &str, password: &str, secret: &str, token_ttl_secs: u64) -> Self {
        Self {
            username: username.to_string(),
            username_digest: credential_digest(username),
            password_digest: credential_digest(password),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl_secs,
        }
    }

    /// Digests are compared in constant time regardless of input length
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        let user_ok = credential_digest(username).ct_eq(&self.username_digest);
        let pass_ok = credential_digest(password).ct_eq(&self.password_digest);
        (user_ok & pass_ok).into()
    }

    pub fn issue_token(&self) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: self.username.clone(),
            iat: now,
            exp: now + self.token_ttl_secs as i64,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) if data.claims.sub == self.username => Some(data.claims),
            Ok(_) => None,
            Err(e) => {
                warn!("Rejected bearer token: {}", e);
                None
            }
        }
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }
}

/// Proof that the request may mutate the catalog
#[derive(Debug, Clone)]
pub struct AdminGuard {
    /// Authenticated user, `None` when auth is disabled
    pub subject: Option<String>,
}

impl FromRequestParts<SharedState> for AdminGuard {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth) = &state.auth else {
            return Ok(Self { subject: None });
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

        let claims = auth
            .verify_token(token.trim())
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

        Ok(Self {
            subject: Some(claims.sub),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Exchange admin credentials for a bearer token
pub async fn login_handler(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let auth = state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Authentication is not configured"))?;

    if !auth.check_credentials(&payload.username, &payload.password) {
        warn!("Failed login attempt for user: {}", payload.username);
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = auth.issue_token()?;
    info!("Issued admin token for {}", payload.username);

    Ok(Json(LoginResponse {
        token,
        expires_in: auth.token_ttl_secs(),
    }))
}
