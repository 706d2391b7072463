//! Configuration management for the Catalog API
//!
//! Loads configuration from environment variables once at startup. The
//! resulting struct is passed down explicitly; nothing reads the environment
//! after `main` has built it.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::rate_limit::RateLimitConfig;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Credentials for the single admin account
#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Object storage account used instead of the local upload directory
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Document store URL (`redis://...`, or `memory://` for a throwaway store)
    pub database_url: String,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    pub environment: Environment,

    /// Origins allowed by CORS; `*` allows any
    pub allowed_origins: Vec<String>,

    /// Filesystem root for uploaded images
    pub upload_dir: PathBuf,

    /// URL prefix the upload root is served under
    pub upload_public_path: String,

    /// Per-file size ceiling in bytes
    pub max_upload_bytes: usize,

    /// Per-request file count ceiling
    pub max_upload_files: usize,

    /// Per-client throttling of `/api` routes; zero requests per minute disables it
    pub rate_limit: RateLimitConfig,

    /// Admin account; mutating routes are open when unset
    pub admin: Option<AdminConfig>,

    /// External image storage; local disk when unset
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let database_url = var("DATABASE_URL")
            .context("DATABASE_URL must be set to the document store connection string")?;

        let admin = match (var("ADMIN_USERNAME"), var("ADMIN_PASSWORD"), var("JWT_SECRET")) {
            (Some(username), Some(password), Some(jwt_secret)) => Some(AdminConfig {
                username,
                password,
                jwt_secret,
                token_ttl_secs: or_default("JWT_TTL_SECS", "86400")
                    .parse()
                    .context("Invalid JWT_TTL_SECS")?,
            }),
            (None, None, None) => None,
            _ => bail!("ADMIN_USERNAME, ADMIN_PASSWORD and JWT_SECRET must be set together"),
        };

        let cloudinary = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => bail!(
                "CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET must be set together"
            ),
        };

        let config = Config {
            database_url,

            api_host: or_default("API_HOST", "0.0.0.0"),

            api_port: or_default("API_PORT", "5000")
                .parse()
                .context("Invalid API_PORT")?,

            environment: Environment::parse(&or_default("APP_ENV", "development")),

            allowed_origins: or_default("ALLOWED_ORIGINS", "http://localhost:3000")
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),

            upload_dir: or_default("UPLOAD_DIR", "./uploads").into(),

            upload_public_path: or_default("UPLOAD_PUBLIC_PATH", "/uploads"),

            max_upload_bytes: or_default("MAX_UPLOAD_BYTES", "5242880")
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,

            max_upload_files: or_default("MAX_UPLOAD_FILES", "5")
                .parse()
                .context("Invalid MAX_UPLOAD_FILES")?,

            rate_limit: RateLimitConfig {
                per_minute: or_default("RATE_LIMIT_PER_MINUTE", "100")
                    .parse()
                    .context("Invalid RATE_LIMIT_PER_MINUTE")?,
                burst: or_default("RATE_LIMIT_BURST", "20")
                    .parse()
                    .context("Invalid RATE_LIMIT_BURST")?,
            },

            admin,
            cloudinary,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            bail!("API_PORT must be greater than 0");
        }

        if !self.upload_public_path.starts_with('/') || self.upload_public_path.len() < 2 {
            bail!("UPLOAD_PUBLIC_PATH must be an absolute path such as /uploads");
        }

        if self.max_upload_bytes == 0 || self.max_upload_files == 0 {
            bail!("MAX_UPLOAD_BYTES and MAX_UPLOAD_FILES must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Ensure the local upload directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        if self.cloudinary.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.upload_dir).with_context(|| {
            format!(
                "Failed to create upload directory: {}",
                self.upload_dir.display()
            )
        })
    }
}
