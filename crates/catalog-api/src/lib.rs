//! Export Catalog API
//!
//! REST backend for the catalog website: products with image galleries and
//! certifications, the static category list, and the flat marketing content
//! collections.
//!
//! ## Endpoints
//!
//! - `GET /api/products` - Paginated, filterable product list
//! - `GET /api/products/category/{category}` - Products of one category
//! - `GET /api/products/slug/{slug}` - Product by slug
//! - `GET|PUT|DELETE /api/products/{id}` - Single product
//! - `POST /api/products` - Create a product (multipart)
//! - `GET /api/categories[/{path}]` - Category list / detail
//! - `/api/certificates`, `/api/testimonials`, `/api/header`, `/api/footer`,
//!   `/api/our-products`, `/api/packaging` - Content CRUD
//! - `POST /api/auth/login` - Admin token
//! - `GET /health` - Health check

pub mod auth;
pub mod config;
pub mod form;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod storage;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Extension, Router,
};
use catalog_common::ContentKind;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::{categories, content, products};

pub use auth::AuthSettings;
pub use config::Config;
pub use handlers::AppState;
pub use rate_limit::RateLimitConfig;
pub use storage::{DocumentStore, MemoryStore, RedisStore};
pub use upload::{CloudinaryImageStore, ImageStore, LocalImageStore, UploadGateway, UploadPolicy};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let body_limit = state.uploads.policy().body_limit();

    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_handler))
        // Auth
        .route("/api/auth/login", post(auth::login_handler))
        // Products
        .route(
            "/api/products",
            get(products::list_products_handler).post(products::create_product_handler),
        )
        .route(
            "/api/products/category/{category}",
            get(products::list_by_category_handler),
        )
        .route(
            "/api/products/slug/{slug}",
            get(products::get_product_by_slug_handler),
        )
        .route(
            "/api/products/{id}",
            get(products::get_product_handler)
                .put(products::update_product_handler)
                .delete(products::delete_product_handler),
        )
        // Categories
        .route("/api/categories", get(categories::list_categories_handler))
        .route(
            "/api/categories/{path}",
            get(categories::get_category_handler),
        );

    // Content collections
    for kind in ContentKind::ALL {
        router = router
            .route(
                kind.route(),
                get(content::list_handler)
                    .post(content::create_handler)
                    .layer(Extension(kind)),
            )
            .route(
                &format!("{}/{{id}}", kind.route()),
                get(content::get_handler)
                    .put(content::update_handler)
                    .delete(content::delete_handler)
                    .layer(Extension(kind)),
            );
    }

    // Uploaded images
    if let Some((prefix, root)) = state.uploads.local_mount() {
        router = router.nest_service(prefix, ServeDir::new(root));
    }

    router
        .fallback(handlers::fallback_handler)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::render_error_details,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone())
        // Middleware
        .layer(axum_middleware::from_fn(middleware::sanitize_request))
        .layer(middleware::panic_layer())
        .layer(middleware::cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
}
