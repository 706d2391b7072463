//! Shared domain types for the export catalog service
//!
//! Holds the product and content models, the fixed category set, the slug
//! rule, the request sanitization transform and the Field Normalizer that
//! turns multipart form fields into validated records.

pub mod category;
pub mod content;
pub mod error;
pub mod normalize;
pub mod product;
pub mod sanitize;
pub mod slug;

pub use category::{Category, CategoryInfo};
pub use content::{ContentItem, ContentKind};
pub use error::{DecodeError, Error, Result};
pub use normalize::{ContentDraft, FormFields, ProductDraft};
pub use product::{ApiProduct, Certification, Product, StoredProduct};
pub use slug::slugify;
