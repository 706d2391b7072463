//! Flat marketing content records (certificates, testimonials, header, ...)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content record. Each kind has its own collection, route and
/// upload folder but shares the `ContentItem` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Certificate,
    Testimonial,
    Header,
    Footer,
    OurProduct,
    PackagingStandard,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        ContentKind::Certificate,
        ContentKind::Testimonial,
        ContentKind::Header,
        ContentKind::Footer,
        ContentKind::OurProduct,
        ContentKind::PackagingStandard,
    ];

    /// Document-store collection name
    pub fn collection(&self) -> &'static str {
        match self {
            ContentKind::Certificate => "certificates",
            ContentKind::Testimonial => "testimonials",
            ContentKind::Header => "headers",
            ContentKind::Footer => "footers",
            ContentKind::OurProduct => "our_products",
            ContentKind::PackagingStandard => "packaging_standards",
        }
    }

    /// Base route of the CRUD surface
    pub fn route(&self) -> &'static str {
        match self {
            ContentKind::Certificate => "/api/certificates",
            ContentKind::Testimonial => "/api/testimonials",
            ContentKind::Header => "/api/header",
            ContentKind::Footer => "/api/footer",
            ContentKind::OurProduct => "/api/our-products",
            ContentKind::PackagingStandard => "/api/packaging",
        }
    }

    /// Folder under the upload root for this kind's images
    pub fn upload_folder(&self) -> &'static str {
        match self {
            ContentKind::Certificate => "certificates",
            ContentKind::Testimonial => "testimonials",
            ContentKind::Header => "header",
            ContentKind::Footer => "footer",
            ContentKind::OurProduct => "our-products",
            ContentKind::PackagingStandard => "packaging",
        }
    }

    /// Human label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Certificate => "Certificate",
            ContentKind::Testimonial => "Testimonial",
            ContentKind::Header => "Header",
            ContentKind::Footer => "Footer",
            ContentKind::OurProduct => "Our product",
            ContentKind::PackagingStandard => "Packaging standard",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,

    pub kind: ContentKind,

    /// Title, or the person's name for testimonials
    pub title: String,

    /// Secondary line such as a role, company or tagline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Stored image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn new(id: String, kind: ContentKind, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            title,
            subtitle: None,
            description: String::new(),
            link: None,
            image: None,
            created_at: now,
            updated_at: now,
        }
    }
}
