//! Upload Gateway
//!
//! Validated image files are written through an `ImageStore` and come back as
//! public references. A batch either lands completely or leaves nothing
//! behind; deletions of replaced files are best-effort.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::CloudinaryConfig;

pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Limits applied while a multipart body is read
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_file_size: usize,
    pub max_files: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES)
    }
}

impl UploadPolicy {
    pub fn new(max_file_size: usize, max_files: usize) -> Self {
        Self {
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_file_size,
            max_files,
        }
    }

    /// Lowercased extension of `file_name` when it is an accepted image type
    pub fn accepted_extension(&self, file_name: &str) -> Option<String> {
        let ext = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();

        self.allowed_extensions.contains(&ext).then_some(ext)
    }

    /// Largest request body these limits can produce, plus room for text fields
    pub fn body_limit(&self) -> usize {
        self.max_files
            .saturating_mul(2)
            .saturating_add(1)
            .saturating_mul(self.max_file_size)
            .saturating_add(1024 * 1024)
    }
}

/// Which part of a record an uploaded file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSlot {
    /// Product gallery image
    Gallery,
    /// Image for the certification entry at this index
    Certification(usize),
    /// The single image of a content record
    Single,
}

/// A validated file held in memory until it is persisted
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub slot: FileSlot,
    pub file_name: String,
    pub extension: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// `<unix-millis>-<9 random digits>.<ext>`
pub fn generate_file_name(extension: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000_000..1_000_000_000);
    format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, extension)
}

/// Backend that holds image bytes
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store a file and return its public reference
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String>;

    /// Remove a stored file. Returns false when it was already gone.
    async fn delete(&self, reference: &str) -> Result<bool>;

    /// Whether `reference` points into this store
    fn owns(&self, reference: &str) -> bool;

    /// Public prefix and filesystem root to serve statically, if any
    fn local_mount(&self) -> Option<(&str, &Path)> {
        None
    }
}

/// Images on local disk, served under a public URL prefix
pub struct LocalImageStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let public_prefix = public_prefix.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_prefix,
        }
    }

    /// Filesystem path of a reference, refusing anything outside the root
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let relative = reference
            .strip_prefix(&self.public_prefix)?
            .strip_prefix('/')?;
        let relative = Path::new(relative);

        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        clean.then(|| self.root.join(relative))
    }
}

fn check_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value.contains("..") {
        bail!("Invalid {} '{}'", kind, value);
    }
    Ok(())
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String> {
        check_segment("folder", folder)?;
        check_segment("file name", file_name)?;

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory: {}", dir.display()))?;

        let final_path = dir.join(file_name);
        let tmp_path = dir.join(format!("{}.part", file_name));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to write {}", final_path.display()));
        }

        debug!("Wrote {} bytes to {}", bytes.len(), final_path.display());
        Ok(format!("{}/{}/{}", self.public_prefix, folder, file_name))
    }

    async fn delete(&self, reference: &str) -> Result<bool> {
        let path = self
            .resolve(reference)
            .ok_or_else(|| anyhow!("Refusing to delete '{}'", reference))?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    fn owns(&self, reference: &str) -> bool {
        self.resolve(reference).is_some()
    }

    fn local_mount(&self) -> Option<(&str, &Path)> {
        Some((&self.public_prefix, &self.root))
    }
}

/// Images in a Cloudinary account
pub struct CloudinaryImageStore {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryImageStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    /// Hex SHA-1 over the sorted `key=value` pairs followed by the secret
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut params = params.to_vec();
        params.sort_by(|a, b| a.0.cmp(b.0));

        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn signed_form(&self, params: Vec<(&'static str, String)>) -> reqwest::multipart::Form {
        let signature = self.sign(&params);

        params
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k, v))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
    }
}

/// Public id of an image from its delivery URL:
/// `https://res.cloudinary.com/<cloud>/image/upload/v123/<folder>/<name>.<ext>`
pub fn cloudinary_public_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/upload/")?;

    let rest = match rest.split_once('/') {
        Some((version, tail))
            if version.len() > 1
                && version.starts_with('v')
                && version[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            tail
        }
        _ => rest,
    };

    let id = match rest.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => rest,
    };

    (!id.is_empty()).then(|| id.to_string())
}

#[async_trait]
impl ImageStore for CloudinaryImageStore {
    async fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String> {
        let public_id = file_name
            .rsplit_once('.')
            .map_or(file_name, |(stem, _)| stem)
            .to_string();

        let params = vec![
            ("folder", folder.to_string()),
            ("public_id", public_id),
            ("timestamp", Utc::now().timestamp().to_string()),
        ];

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .context("Invalid content type")?;
        let form = self.signed_form(params).part("file", part);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Cloudinary")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Cloudinary upload failed ({}): {}", status, body);
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("Failed to parse Cloudinary upload response")?;

        debug!("Uploaded {} to {}", file_name, uploaded.secure_url);
        Ok(uploaded.secure_url)
    }

    async fn delete(&self, reference: &str) -> Result<bool> {
        let public_id = cloudinary_public_id(reference)
            .ok_or_else(|| anyhow!("Cannot derive public id from '{}'", reference))?;

        let form = self.signed_form(vec![
            ("public_id", public_id),
            ("timestamp", Utc::now().timestamp().to_string()),
        ]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Cloudinary")?;

        if !response.status().is_success() {
            bail!("Cloudinary destroy failed ({})", response.status());
        }

        let outcome: DestroyResponse = response
            .json()
            .await
            .context("Failed to parse Cloudinary destroy response")?;

        Ok(outcome.result == "ok")
    }

    fn owns(&self, reference: &str) -> bool {
        reference.contains(&format!("res.cloudinary.com/{}/", self.config.cloud_name))
    }
}

/// Validated files in, public references out
#[derive(Clone)]
pub struct UploadGateway {
    store: Arc<dyn ImageStore>,
    policy: UploadPolicy,
}

impl UploadGateway {
    pub fn new(store: Arc<dyn ImageStore>, policy: UploadPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn local_mount(&self) -> Option<(&str, &Path)> {
        self.store.local_mount()
    }

    /// Whether `reference` names a file this gateway stored
    pub fn owns(&self, reference: &str) -> bool {
        self.store.owns(reference)
    }

    /// Write every file into `folder`. If any write fails the files already
    /// written by this call are removed and the error is returned.
    pub async fn persist(&self, folder: &str, files: &[&IncomingFile]) -> Result<Vec<String>> {
        let mut stored = Vec::with_capacity(files.len());

        for file in files {
            let name = generate_file_name(&file.extension);
            match self
                .store
                .put(folder, &name, &file.bytes, &file.content_type)
                .await
            {
                Ok(reference) => stored.push(reference),
                Err(e) => {
                    warn!("Upload of '{}' failed, rolling back batch", file.file_name);
                    self.discard(&stored).await;
                    return Err(e.context(format!("Failed to store '{}'", file.file_name)));
                }
            }
        }

        if !stored.is_empty() {
            info!("Stored {} file(s) in {}", stored.len(), folder);
        }
        Ok(stored)
    }

    /// Best-effort removal. Foreign references are skipped.
    pub async fn discard(&self, references: &[String]) {
        for reference in references {
            if !self.store.owns(reference) {
                debug!("Skipping deletion of foreign reference {}", reference);
                continue;
            }

            match self.store.delete(reference).await {
                Ok(true) => debug!("Deleted {}", reference),
                Ok(false) => debug!("Already gone: {}", reference),
                Err(e) => warn!("Failed to delete {}: {:#}", reference, e),
            }
        }
    }
}
