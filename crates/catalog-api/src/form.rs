//! Multipart form extraction
//!
//! Splits a multipart body into text fields and validated image files. Every
//! rejection (type, size, count, unknown file field) happens here, before any
//! handler logic runs and before anything is written to storage.

use axum::extract::Multipart;
use catalog_common::{Error, FormFields, Result};
use std::collections::BTreeMap;
use tracing::debug;

use crate::upload::{FileSlot, IncomingFile, UploadPolicy};

/// A parsed submission
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: FormFields,
    pub files: Vec<IncomingFile>,
}

impl SubmittedForm {
    pub fn gallery(&self) -> Vec<&IncomingFile> {
        self.files
            .iter()
            .filter(|f| f.slot == FileSlot::Gallery)
            .collect()
    }

    /// Certification files keyed by entry index
    pub fn certifications(&self) -> BTreeMap<usize, &IncomingFile> {
        self.files
            .iter()
            .filter_map(|f| match f.slot {
                FileSlot::Certification(i) => Some((i, f)),
                _ => None,
            })
            .collect()
    }

    pub fn single(&self) -> Option<&IncomingFile> {
        self.files.iter().find(|f| f.slot == FileSlot::Single)
    }
}

/// Map a multipart field name to the slot its file fills
pub fn file_slot(field_name: &str) -> Option<FileSlot> {
    match field_name {
        "images" | "images[]" => return Some(FileSlot::Gallery),
        "image" => return Some(FileSlot::Single),
        _ => {}
    }

    let index = field_name
        .strip_prefix("certificationImage_")
        .or_else(|| {
            field_name
                .strip_prefix("certificationImages[")
                .and_then(|rest| rest.strip_suffix(']'))
        })?;

    index.parse().ok().map(FileSlot::Certification)
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

fn multipart_error(e: impl std::fmt::Display) -> Error {
    Error::Upload(format!("Invalid multipart data: {}", e))
}

#[derive(Default)]
struct SlotCounts {
    gallery: usize,
    certification: usize,
    single: usize,
}

impl SlotCounts {
    fn admit(&mut self, slot: FileSlot, policy: &UploadPolicy) -> Result<()> {
        let (count, limit, group) = match slot {
            FileSlot::Gallery => (&mut self.gallery, policy.max_files, "gallery images"),
            FileSlot::Certification(_) => (
                &mut self.certification,
                policy.max_files,
                "certification images",
            ),
            FileSlot::Single => (&mut self.single, 1, "images"),
        };

        *count += 1;
        if *count > limit {
            return Err(Error::Upload(format!(
                "too many {}: at most {} per request",
                group, limit
            )));
        }
        Ok(())
    }
}

/// Read the whole multipart body under `policy`
pub async fn read_multipart(mut multipart: Multipart, policy: &UploadPolicy) -> Result<SubmittedForm> {
    let mut form = SubmittedForm::default();
    let mut counts = SlotCounts::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(&name, value);
            continue;
        };

        // Browsers submit an empty part for a file input left blank
        if file_name.is_empty() {
            continue;
        }

        let slot = file_slot(&name)
            .ok_or_else(|| Error::Upload(format!("unexpected file field '{}'", name)))?;

        let extension = policy.accepted_extension(&file_name).ok_or_else(|| {
            Error::Upload(format!(
                "'{}' is not an accepted image type ({})",
                file_name,
                policy.allowed_extensions.join(", ")
            ))
        })?;

        counts.admit(slot, policy)?;

        let content_type = field
            .content_type()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or(content_type_for(&extension))
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if bytes.len() + chunk.len() > policy.max_file_size {
                return Err(Error::Upload(format!(
                    "'{}' exceeds the {} byte limit",
                    file_name, policy.max_file_size
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            debug!("Skipping empty file part '{}'", file_name);
            continue;
        }

        form.files.push(IncomingFile {
            slot,
            file_name,
            extension,
            content_type,
            bytes,
        });
    }

    Ok(form)
}
