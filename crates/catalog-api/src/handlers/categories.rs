//! Static category endpoints

use axum::{extract::Path, Json};
use catalog_common::{Category, CategoryInfo};
use serde::Serialize;

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryInfo>,
    pub total: usize,
}

pub async fn list_categories_handler() -> Json<CategoriesResponse> {
    let categories: Vec<CategoryInfo> = Category::ALL.into_iter().map(CategoryInfo::from).collect();

    Json(CategoriesResponse {
        total: categories.len(),
        categories,
    })
}

pub async fn get_category_handler(Path(path): Path<String>) -> Result<Json<CategoryInfo>, ApiError> {
    let category = path
        .parse::<Category>()
        .map_err(|_| ApiError::not_found(format!("Category not found: {}", path)))?;

    Ok(Json(category.into()))
}
