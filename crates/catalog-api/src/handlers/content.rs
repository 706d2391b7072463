//! CRUD for flat content records (certificates, testimonials, header, ...)
//!
//! One set of handlers serves every `ContentKind`; the kind is attached to
//! each route as an extension when the router is built.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use catalog_common::{ContentDraft, ContentItem, ContentKind, Error};
use tracing::info;
use uuid::Uuid;

use super::{products::DeleteResponse, read_form, ApiError, SharedState};
use crate::auth::AdminGuard;

async fn load(state: &SharedState, kind: ContentKind, id: &str) -> Result<ContentItem, ApiError> {
    state
        .content(kind)
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(kind.label()).into())
}

/// List all records of a kind, newest first
pub async fn list_handler(
    State(state): State<SharedState>,
    Extension(kind): Extension<ContentKind>,
) -> Result<Json<Vec<ContentItem>>, ApiError> {
    let mut items = state.content(kind).list().await?;
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    Ok(Json(items))
}

pub async fn get_handler(
    State(state): State<SharedState>,
    Extension(kind): Extension<ContentKind>,
    Path(id): Path<String>,
) -> Result<Json<ContentItem>, ApiError> {
    Ok(Json(load(&state, kind, &id).await?))
}

pub async fn create_handler(
    State(state): State<SharedState>,
    Extension(kind): Extension<ContentKind>,
    _admin: AdminGuard,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ContentItem>), ApiError> {
    let form = read_form(&state, multipart).await?;
    let mut item = ContentDraft::from_fields(&form.fields).into_item(Uuid::new_v4().to_string(), kind)?;

    let stored = match form.single() {
        Some(file) => state.uploads.persist(kind.upload_folder(), &[file]).await?,
        None => Vec::new(),
    };
    item.image = stored.first().cloned();

    if let Err(e) = state.content(kind).save(&item).await {
        state.uploads.discard(&stored).await;
        return Err(e.into());
    }

    info!("{} {} created", kind, item.id);
    Ok((StatusCode::CREATED, Json(item)))
}

/// Partial update; a new image replaces the old one, which is then deleted
pub async fn update_handler(
    State(state): State<SharedState>,
    Extension(kind): Extension<ContentKind>,
    Path(id): Path<String>,
    _admin: AdminGuard,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ContentItem>, ApiError> {
    let form = read_form(&state, multipart).await?;
    let draft = ContentDraft::from_fields(&form.fields);

    let existing = load(&state, kind, &id).await?;
    let mut item = existing.clone();
    draft.apply_to(&mut item)?;

    let stored = match form.single() {
        Some(file) => state.uploads.persist(kind.upload_folder(), &[file]).await?,
        None => Vec::new(),
    };
    if let Some(reference) = stored.first() {
        item.image = Some(reference.clone());
    }

    if let Err(e) = state.content(kind).save(&item).await {
        state.uploads.discard(&stored).await;
        return Err(e.into());
    }

    if let Some(old) = existing.image.filter(|old| item.image.as_ref() != Some(old)) {
        state.uploads.discard(&[old]).await;
    }

    info!("{} {} updated", kind, item.id);
    Ok(Json(item))
}

pub async fn delete_handler(
    State(state): State<SharedState>,
    Extension(kind): Extension<ContentKind>,
    Path(id): Path<String>,
    _admin: AdminGuard,
) -> Result<Json<DeleteResponse>, ApiError> {
    let item = load(&state, kind, &id).await?;

    if !state.content(kind).delete(&item.id).await? {
        return Err(Error::not_found(kind.label()).into());
    }
    if let Some(image) = item.image {
        state.uploads.discard(&[image]).await;
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("{} deleted", kind),
    }))
}
