//! Product endpoints: listing, lookup and the multipart ingestion pipeline

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use catalog_common::normalize::{
    check_certification_indices, check_certification_sources, merge_certifications, plan_gallery,
};
use catalog_common::{ApiProduct, Category, Error, Product, ProductDraft};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{read_form, ApiError, SharedState};
use crate::auth::AdminGuard;
use crate::form::SubmittedForm;

/// Upload folder for product images
pub const PRODUCT_FOLDER: &str = "products";

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MAX_PAGE_SIZE: usize = 100;

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
    PriceAsc,
    PriceDesc,
}

impl FromStr for ProductSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" | "-createdAt" => Ok(ProductSort::Newest),
            "oldest" | "createdAt" => Ok(ProductSort::Oldest),
            "title" => Ok(ProductSort::TitleAsc),
            "-title" => Ok(ProductSort::TitleDesc),
            "price" => Ok(ProductSort::PriceAsc),
            "-price" => Ok(ProductSort::PriceDesc),
            other => Err(Error::validation(format!(
                "unknown sort '{}' (expected newest, oldest, title, -title, price or -price)",
                other
            ))),
        }
    }
}

/// Products without a price sort after priced ones in both directions
fn compare_price(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.total_cmp(&a),
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ProductSort {
    pub fn sort(self, products: &mut [Product]) {
        products.sort_by(|a, b| {
            let primary = match self {
                ProductSort::Newest => b.created_at.cmp(&a.created_at),
                ProductSort::Oldest => a.created_at.cmp(&b.created_at),
                ProductSort::TitleAsc => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                ProductSort::TitleDesc => b.title.to_lowercase().cmp(&a.title.to_lowercase()),
                ProductSort::PriceAsc => compare_price(a.price, b.price, false),
                ProductSort::PriceDesc => compare_price(a.price, b.price, true),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Listing query; kept as text so malformed values get a JSON 400
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

fn parse_number(name: &str, raw: Option<&str>) -> Result<Option<usize>, Error> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| Error::validation(format!("{} must be a positive integer", name))),
    }
}

impl ListQuery {
    pub fn page_request(&self) -> Result<PageRequest, Error> {
        let limit = parse_number("limit", self.limit.as_deref())?
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = parse_number("page", self.page.as_deref())?
            .unwrap_or(1)
            .max(1);

        Ok(PageRequest { page, limit })
    }

    pub fn sort(&self) -> Result<ProductSort, Error> {
        match self.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse(),
            None => Ok(ProductSort::default()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub page: usize,
    pub pages: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<ApiProduct>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Filter, order and cut one page out of the catalog
pub fn paginate(
    mut products: Vec<Product>,
    category: Option<Category>,
    sort: ProductSort,
    request: PageRequest,
) -> ProductListResponse {
    if let Some(category) = category {
        products.retain(|p| p.category == category);
    }
    sort.sort(&mut products);

    let total = products.len();
    let pages = total.div_ceil(request.limit);
    let products = products
        .into_iter()
        .skip((request.page - 1).saturating_mul(request.limit))
        .take(request.limit)
        .map(ApiProduct::from)
        .collect();

    ProductListResponse {
        products,
        pagination: Pagination {
            total,
            page: request.page,
            pages,
            limit: request.limit,
        },
    }
}

async fn list_filtered(
    state: &SharedState,
    category: Option<Category>,
    query: &ListQuery,
) -> Result<Json<ProductListResponse>, ApiError> {
    let sort = query.sort()?;
    let request = query.page_request()?;
    let products = state.products.list().await?;

    Ok(Json(paginate(products, category, sort, request)))
}

/// List products
pub async fn list_products_handler(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let category = match query.category.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() && c != "all" => Some(c.parse::<Category>()?),
        _ => None,
    };

    list_filtered(&state, category, &query).await
}

/// List products of one category; unknown categories are a 404
pub async fn list_by_category_handler(
    State(state): State<SharedState>,
    Path(category): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let category = category
        .parse::<Category>()
        .map_err(|_| ApiError::not_found(format!("Category not found: {}", category)))?;

    list_filtered(&state, Some(category), &query).await
}

async fn load(state: &SharedState, id: &str) -> Result<Product, ApiError> {
    state
        .products
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("Product").into())
}

/// Get a product by id
pub async fn get_product_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ApiProduct>, ApiError> {
    Ok(Json(load(&state, &id).await?.into()))
}

/// Get a product by slug
pub async fn get_product_by_slug_handler(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiProduct>, ApiError> {
    let product = state
        .products
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| Error::not_found("Product"))?;

    Ok(Json(product.into()))
}

/// Files written for one submission
#[derive(Debug, Default)]
struct StoredFiles {
    gallery: Vec<String>,
    certifications: BTreeMap<usize, String>,
}

impl StoredFiles {
    fn all(&self) -> Vec<String> {
        self.gallery
            .iter()
            .chain(self.certifications.values())
            .cloned()
            .collect()
    }
}

/// Write the gallery and certification files of a validated submission
async fn store_files(state: &SharedState, form: &SubmittedForm) -> Result<StoredFiles, ApiError> {
    let gallery = state.uploads.persist(PRODUCT_FOLDER, &form.gallery()).await?;

    let cert_files = form.certifications();
    let cert_refs = match state
        .uploads
        .persist(PRODUCT_FOLDER, &cert_files.values().copied().collect::<Vec<_>>())
        .await
    {
        Ok(refs) => refs,
        Err(e) => {
            state.uploads.discard(&gallery).await;
            return Err(e.into());
        }
    };

    Ok(StoredFiles {
        gallery,
        certifications: cert_files.keys().copied().zip(cert_refs).collect(),
    })
}

/// Create a product from a multipart submission
pub async fn create_product_handler(
    State(state): State<SharedState>,
    _admin: AdminGuard,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ApiProduct>), ApiError> {
    let form = read_form(&state, multipart).await?;
    let draft = ProductDraft::from_fields(&form.fields)?;

    let cert_entries = draft.certifications.clone().unwrap_or_default();
    let mut product = draft.into_product(Uuid::new_v4().to_string())?;

    // Everything that can reject the request is checked before any write
    plan_gallery(&[], None, form.gallery().len())?;
    let cert_uploads: Vec<usize> = form.certifications().keys().copied().collect();
    check_certification_indices(cert_entries.len(), &cert_uploads)?;
    check_certification_sources(&cert_entries, &cert_uploads, |src| {
        !state.uploads.owns(src)
    })?;
    state
        .products
        .ensure_slug_available(&product.slug, &product.id)
        .await?;

    let stored = store_files(&state, &form).await?;

    let saved: catalog_common::Result<()> = async {
        product.images = stored.gallery.clone();
        product.certifications = merge_certifications(cert_entries, &stored.certifications)?;
        state.products.insert(&product).await
    }
    .await;

    if let Err(e) = saved {
        state.uploads.discard(&stored.all()).await;
        return Err(e.into());
    }

    info!(
        "Product {} created with {} image(s)",
        product.slug,
        product.images.len()
    );
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// Partially update a product from a multipart submission
pub async fn update_product_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    _admin: AdminGuard,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiProduct>, ApiError> {
    let form = read_form(&state, multipart).await?;
    let draft = ProductDraft::from_fields(&form.fields)?;

    let existing = load(&state, &id).await?;
    let mut product = existing.clone();
    draft.apply_to(&mut product)?;

    let plan = plan_gallery(
        &existing.images,
        draft.existing_images.as_deref(),
        form.gallery().len(),
    )?;
    let cert_uploads: Vec<usize> = form.certifications().keys().copied().collect();
    let cert_entries = draft.certifications.as_deref().unwrap_or_default();
    check_certification_indices(cert_entries.len(), &cert_uploads)?;
    check_certification_sources(cert_entries, &cert_uploads, |src| {
        existing.certifications.iter().any(|c| c.src == src) || !state.uploads.owns(src)
    })?;
    if product.slug != existing.slug {
        state
            .products
            .ensure_slug_available(&product.slug, &product.id)
            .await?;
    }

    let stored = store_files(&state, &form).await?;

    let saved: catalog_common::Result<()> = async {
        product.images = plan.kept.iter().chain(&stored.gallery).cloned().collect();
        if let Some(entries) = draft.certifications.clone() {
            product.certifications = merge_certifications(entries, &stored.certifications)?;
        }
        state.products.update(&existing.slug, &product).await
    }
    .await;

    if let Err(e) = saved {
        state.uploads.discard(&stored.all()).await;
        return Err(e.into());
    }

    let still_used = product.file_references();
    let stale: Vec<String> = existing
        .file_references()
        .into_iter()
        .filter(|r| !still_used.contains(r))
        .collect();
    state.uploads.discard(&stale).await;

    info!("Product {} updated, {} stale file(s) removed", product.slug, stale.len());
    Ok(Json(product.into()))
}

/// Delete a product and its files
pub async fn delete_product_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    _admin: AdminGuard,
) -> Result<Json<DeleteResponse>, ApiError> {
    let product = load(&state, &id).await?;

    if !state.products.delete(&product).await? {
        return Err(Error::not_found("Product").into());
    }
    state.uploads.discard(&product.file_references()).await;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Product {} deleted", product.slug),
    }))
}
