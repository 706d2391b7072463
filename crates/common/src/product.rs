//! Product domain type and its two serialization adapters
//!
//! `Product` is the canonical in-process shape. It is never serialized
//! directly: `ApiProduct` is the camelCase shape exchanged with HTTP clients,
//! `StoredProduct` is the snake_case shape written to the document store.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Gallery size limit per product
pub const MAX_PRODUCT_IMAGES: usize = 4;

/// Alt text used when a certification carries none
pub const DEFAULT_CERTIFICATION_ALT: &str = "Certificate";

/// Every Product field as `(api name, storage name)`
pub const FIELD_NAMES: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("slug", "slug"),
    ("category", "category"),
    ("shortDescription", "short_description"),
    ("description", "description"),
    ("videoUrl", "video_url"),
    ("datasheetUrl", "datasheet_url"),
    ("price", "price"),
    ("stock", "stock"),
    ("specifications", "specifications"),
    ("features", "features"),
    ("packaging", "packaging"),
    ("certifications", "certifications"),
    ("faqs", "faqs"),
    ("related", "related"),
    ("images", "images"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

/// Storage name for an API field name
pub fn storage_field_name(api_name: &str) -> Option<&'static str> {
    FIELD_NAMES
        .iter()
        .find(|(api, _)| *api == api_name)
        .map(|(_, stored)| *stored)
}

/// API name for a storage field name
pub fn api_field_name(storage_name: &str) -> Option<&'static str> {
    FIELD_NAMES
        .iter()
        .find(|(_, stored)| *stored == storage_name)
        .map(|(api, _)| *api)
}

/// Benefit / feature bullet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Packaging option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagingItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Certification badge shown on a product page.
///
/// Reads accept the legacy `url` key in place of `src`; writes always emit `src`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCertification")]
pub struct Certification {
    pub src: String,
    pub alt: String,
}

#[derive(Deserialize)]
struct RawCertification {
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    alt: Option<String>,
}

impl From<RawCertification> for Certification {
    fn from(raw: RawCertification) -> Self {
        let src = raw
            .src
            .filter(|s| !s.trim().is_empty())
            .or(raw.url)
            .unwrap_or_default();

        Certification::new(src, raw.alt)
    }
}

impl Certification {
    pub fn new(src: String, alt: Option<String>) -> Self {
        let alt = alt
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CERTIFICATION_ALT.to_string());
        Self { src, alt }
    }
}

/// Question and answer pair. `{question, answer}` is accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFaq")]
pub struct Faq {
    pub q: String,
    pub a: String,
}

#[derive(Deserialize)]
struct RawFaq {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    a: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

impl From<RawFaq> for Faq {
    fn from(raw: RawFaq) -> Self {
        Self {
            q: raw.q.or(raw.question).unwrap_or_default(),
            a: raw.a.or(raw.answer).unwrap_or_default(),
        }
    }
}

/// Cross-link to another catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub link: String,
}

/// Canonical product
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: Category,
    pub short_description: String,
    pub description: String,
    pub video_url: Option<String>,
    pub datasheet_url: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub specifications: IndexMap<String, String>,
    pub features: Vec<Feature>,
    pub packaging: Vec<PackagingItem>,
    pub certifications: Vec<Certification>,
    pub faqs: Vec<Faq>,
    pub related: Vec<RelatedItem>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Every file reference owned through this product: gallery images
    /// followed by certification images.
    pub fn file_references(&self) -> Vec<String> {
        self.images
            .iter()
            .cloned()
            .chain(self.certifications.iter().map(|c| c.src.clone()))
            .collect()
    }

    /// Drop certification entries that lost their image reference
    fn normalized(mut self) -> Self {
        self.certifications.retain(|c| !c.src.trim().is_empty());
        self
    }
}

/// HTTP shape (camelCase)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProduct {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: Category,
    pub short_description: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasheet_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default)]
    pub specifications: IndexMap<String, String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub packaging: Vec<PackagingItem>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub related: Vec<RelatedItem>,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document-store shape (snake_case)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredProduct {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: Category,
    pub short_description: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasheet_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default)]
    pub specifications: IndexMap<String, String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub packaging: Vec<PackagingItem>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub related: Vec<RelatedItem>,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ApiProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            category: p.category,
            short_description: p.short_description,
            description: p.description,
            video_url: p.video_url,
            datasheet_url: p.datasheet_url,
            price: p.price,
            stock: p.stock,
            specifications: p.specifications,
            features: p.features,
            packaging: p.packaging,
            certifications: p.certifications,
            faqs: p.faqs,
            related: p.related,
            images: p.images,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<ApiProduct> for Product {
    fn from(p: ApiProduct) -> Self {
        Product {
            id: p.id,
            title: p.title,
            slug: p.slug,
            category: p.category,
            short_description: p.short_description,
            description: p.description,
            video_url: p.video_url,
            datasheet_url: p.datasheet_url,
            price: p.price,
            stock: p.stock,
            specifications: p.specifications,
            features: p.features,
            packaging: p.packaging,
            certifications: p.certifications,
            faqs: p.faqs,
            related: p.related,
            images: p.images,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
        .normalized()
    }
}

impl From<Product> for StoredProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            category: p.category,
            short_description: p.short_description,
            description: p.description,
            video_url: p.video_url,
            datasheet_url: p.datasheet_url,
            price: p.price,
            stock: p.stock,
            specifications: p.specifications,
            features: p.features,
            packaging: p.packaging,
            certifications: p.certifications,
            faqs: p.faqs,
            related: p.related,
            images: p.images,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<StoredProduct> for Product {
    fn from(p: StoredProduct) -> Self {
        Product {
            id: p.id,
            title: p.title,
            slug: p.slug,
            category: p.category,
            short_description: p.short_description,
            description: p.description,
            video_url: p.video_url,
            datasheet_url: p.datasheet_url,
            price: p.price,
            stock: p.stock,
            specifications: p.specifications,
            features: p.features,
            packaging: p.packaging,
            certifications: p.certifications,
            faqs: p.faqs,
            related: p.related,
            images: p.images,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
        .normalized()
    }
}
