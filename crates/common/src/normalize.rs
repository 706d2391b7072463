//! Field Normalizer
//!
//! Rebuilds product and content records from multipart text fields. Nested
//! structures arrive as JSON-encoded strings; each is decoded with a typed
//! step whose failure policy is explicit (`decode_json_field` reports,
//! `decode_or_default` falls back). Field names are accepted in either the
//! camelCase API convention or the snake_case storage convention and are
//! keyed internally by the storage name.

use chrono::Utc;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::category::Category;
use crate::content::{ContentItem, ContentKind};
use crate::error::{DecodeError, Error, Result};
use crate::product::{
    storage_field_name, Certification, Faq, Feature, PackagingItem, Product, RelatedItem,
    MAX_PRODUCT_IMAGES,
};
use crate::sanitize::{escape_html, is_operator_key, sanitize_value};
use crate::slug::slugify;

/// Form names that are not Product fields but map onto one, or onto a
/// control field used by the handlers.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("benefits", "features"),
    ("certificationsData", "certifications"),
    ("certifications_data", "certifications"),
    ("existingImages", "existing_images"),
    ("name", "title"),
    ("text", "description"),
    ("content", "description"),
];

/// Resolve a submitted field name to its canonical (storage) name
pub fn canonical_field_name(name: &str) -> String {
    if let Some(stored) = storage_field_name(name) {
        return stored.to_string();
    }
    if let Some((_, target)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == name) {
        return target.to_string();
    }
    name.to_string()
}

fn is_alias(name: &str) -> bool {
    FIELD_ALIASES.iter().any(|(alias, _)| *alias == name)
}

/// Text fields of one form submission.
///
/// Values are kept raw so JSON-encoded fields survive intact; every accessor
/// applies the sanitization transform before handing data out.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: IndexMap<String, String>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field. Operator-prefixed names are dropped. A value given
    /// under an alias never overrides one given under the canonical name.
    pub fn insert(&mut self, name: &str, value: String) {
        if is_operator_key(name) {
            warn!("Dropping form field with reserved name: {}", name);
            return;
        }

        let key = canonical_field_name(name);
        if is_alias(name) && self.fields.contains_key(&key) {
            return;
        }
        self.fields.insert(key, value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(&canonical_field_name(name))
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.fields.get(&canonical_field_name(name)).map(String::as_str)
    }

    /// Trimmed, escaped text value
    pub fn text(&self, name: &str) -> Option<String> {
        self.raw(name).map(|v| escape_html(v.trim()))
    }

    /// Like `text`, but a blank value reads as absent
    pub fn non_empty_text(&self, name: &str) -> Option<String> {
        self.text(name).filter(|v| !v.is_empty())
    }

    /// Decode a JSON-encoded field, falling back to `T::default()` on
    /// failure. `None` when the field was not submitted at all.
    pub fn json_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Option<T> {
        self.raw(name)
            .map(|raw| decode_or_default(&canonical_field_name(name), Some(raw)))
    }
}

/// Typed decode of a JSON-encoded form value. String leaves are sanitized
/// before the typed conversion.
pub fn decode_json_field<T: DeserializeOwned>(
    field: &str,
    raw: &str,
) -> std::result::Result<T, DecodeError> {
    let to_error = |source| DecodeError {
        field: field.to_string(),
        source,
    };

    let value: Value = serde_json::from_str(raw).map_err(to_error)?;
    serde_json::from_value(sanitize_value(value)).map_err(to_error)
}

/// Best-effort decode: absent or blank input yields the default silently,
/// undecodable input yields the default with a warning.
pub fn decode_or_default<T: DeserializeOwned + Default>(field: &str, raw: Option<&str>) -> T {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return T::default();
    };

    match decode_json_field(field, raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("{}; using default", e);
            T::default()
        }
    }
}

/// Flatten a decoded specifications value into label → text.
///
/// Accepts an object (`{"Form": "Powder"}`) or a list of
/// `{label|key|name, value}` records. Anything else yields an empty map.
pub fn specifications_from_value(value: Value) -> IndexMap<String, String> {
    fn as_text(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    let mut specs = IndexMap::new();
    match value {
        Value::Object(map) => {
            for (label, v) in map {
                let label = label.trim().to_string();
                if label.is_empty() {
                    continue;
                }
                if let Some(text) = as_text(v) {
                    specs.insert(label, text);
                }
            }
        }
        Value::Array(rows) => {
            for row in rows {
                let Value::Object(mut row) = row else { continue };
                let label = ["label", "key", "name"]
                    .iter()
                    .find_map(|k| row.remove(*k))
                    .and_then(as_text)
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty());
                let text = row.remove("value").and_then(as_text);
                if let (Some(label), Some(text)) = (label, text) {
                    specs.insert(label, text);
                }
            }
        }
        other => warn!("Ignoring specifications of unexpected shape: {}", other),
    }
    specs
}

/// Certification entry as submitted in `certificationsData`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawCertificationInput")]
pub struct CertificationInput {
    /// Previously stored reference, absent for entries that come with a file
    pub src: Option<String>,
    pub alt: Option<String>,
}

#[derive(Deserialize)]
struct RawCertificationInput {
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    alt: Option<String>,
}

impl From<RawCertificationInput> for CertificationInput {
    fn from(raw: RawCertificationInput) -> Self {
        Self {
            src: raw
                .src
                .or(raw.url)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            alt: raw.alt,
        }
    }
}

/// Check that every uploaded certification file points at a submitted entry
pub fn check_certification_indices(entry_count: usize, indices: &[usize]) -> Result<()> {
    match indices.iter().find(|i| **i >= entry_count) {
        Some(i) => Err(Error::validation(format!(
            "certification image index {} has no matching entry ({} submitted)",
            i, entry_count
        ))),
        None => Ok(()),
    }
}

/// Check every entry that keeps its own `src` against `may_reference`.
///
/// Entries replaced by an upload are skipped. A rejected `src` points at an
/// image owned by some other record.
pub fn check_certification_sources<F>(
    entries: &[CertificationInput],
    uploaded: &[usize],
    may_reference: F,
) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let foreign = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| !uploaded.contains(i))
        .find_map(|(i, entry)| {
            let src = entry.src.as_deref()?;
            (!may_reference(src)).then_some((i, src))
        });

    match foreign {
        Some((i, src)) => Err(Error::validation(format!(
            "certification {} references an image this product does not own: {}",
            i, src
        ))),
        None => Ok(()),
    }
}

/// Combine submitted certification entries with freshly uploaded files.
///
/// Entry `i` takes the reference uploaded under index `i` when present,
/// otherwise keeps its own `src`. Order is preserved; entries ending up
/// without a reference are dropped.
pub fn merge_certifications(
    entries: Vec<CertificationInput>,
    uploaded: &BTreeMap<usize, String>,
) -> Result<Vec<Certification>> {
    let indices: Vec<usize> = uploaded.keys().copied().collect();
    check_certification_indices(entries.len(), &indices)?;

    let merged = entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let src = uploaded.get(&i).cloned().or(entry.src)?;
            Some(Certification::new(src, entry.alt))
        })
        .collect();

    Ok(merged)
}

/// Outcome of reconciling a product gallery with an update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GalleryPlan {
    /// Current images that stay, in their new order
    pub kept: Vec<String>,
    /// Current images no longer referenced
    pub removed: Vec<String>,
}

/// Decide which gallery images survive an update.
///
/// With an explicit `existing` list the gallery becomes those of the listed
/// images that the product already has (in list order), followed by new
/// uploads. Without it, any upload replaces the whole gallery and no upload
/// leaves it untouched.
pub fn plan_gallery(
    current: &[String],
    existing: Option<&[String]>,
    new_count: usize,
) -> Result<GalleryPlan> {
    let kept: Vec<String> = match existing {
        Some(list) => {
            let mut seen = HashSet::new();
            list.iter()
                .filter(|img| current.contains(img) && seen.insert(img.as_str()))
                .cloned()
                .collect()
        }
        None if new_count > 0 => Vec::new(),
        None => current.to_vec(),
    };

    if kept.len() + new_count > MAX_PRODUCT_IMAGES {
        return Err(Error::validation(format!(
            "a product can have at most {} images ({} kept + {} uploaded)",
            MAX_PRODUCT_IMAGES,
            kept.len(),
            new_count
        )));
    }

    let removed = current
        .iter()
        .filter(|img| !kept.contains(img))
        .cloned()
        .collect();

    Ok(GalleryPlan { kept, removed })
}

fn parse_price(fields: &FormFields) -> Result<Option<Option<f64>>> {
    let Some(raw) = fields.text("price") else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(Some(None));
    }
    match raw.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(Some(Some(price))),
        _ => Err(Error::validation(format!("price must be a non-negative number, got '{}'", raw))),
    }
}

fn parse_stock(fields: &FormFields) -> Result<Option<Option<i64>>> {
    let Some(raw) = fields.text("stock") else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(Some(None));
    }
    match raw.parse::<i64>() {
        Ok(stock) if stock >= 0 => Ok(Some(Some(stock))),
        _ => Err(Error::validation(format!("stock must be a non-negative integer, got '{}'", raw))),
    }
}

fn optional_text(fields: &FormFields, name: &str) -> Option<Option<String>> {
    fields.text(name).map(|v| Some(v).filter(|v| !v.is_empty()))
}

/// Every product field a submission may carry. Outer `None` means "not
/// submitted"; for optional scalars `Some(None)` means "cleared".
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<Option<String>>,
    pub datasheet_url: Option<Option<String>>,
    pub price: Option<Option<f64>>,
    pub stock: Option<Option<i64>>,
    pub specifications: Option<IndexMap<String, String>>,
    pub features: Option<Vec<Feature>>,
    pub packaging: Option<Vec<PackagingItem>>,
    pub certifications: Option<Vec<CertificationInput>>,
    pub faqs: Option<Vec<Faq>>,
    pub related: Option<Vec<RelatedItem>>,
    pub existing_images: Option<Vec<String>>,
    /// Unescaped text the slug is derived from
    slug_source: Option<String>,
}

impl ProductDraft {
    pub fn from_fields(fields: &FormFields) -> Result<Self> {
        Ok(Self {
            title: fields.text("title"),
            slug: fields.text("slug"),
            category: fields.text("category"),
            short_description: fields.text("shortDescription"),
            description: fields.text("description"),
            video_url: optional_text(fields, "videoUrl"),
            datasheet_url: optional_text(fields, "datasheetUrl"),
            price: parse_price(fields)?,
            stock: parse_stock(fields)?,
            specifications: fields
                .json_or_default::<Value>("specifications")
                .map(specifications_from_value),
            features: fields.json_or_default("features"),
            packaging: fields.json_or_default("packaging"),
            certifications: fields.json_or_default("certifications"),
            faqs: fields.json_or_default("faqs"),
            related: fields.json_or_default("related"),
            existing_images: fields.json_or_default("existingImages"),
            slug_source: fields
                .raw("slug")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or_else(|| fields.raw("title").map(str::trim))
                .map(str::to_string),
        })
    }

    /// Required fields present and non-blank, category known
    pub fn validate_new(&self) -> Result<Category> {
        let required = [
            ("title", &self.title),
            ("category", &self.category),
            ("shortDescription", &self.short_description),
            ("description", &self.description),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        self.category.as_deref().unwrap_or_default().parse()
    }

    /// Slug requested by this submission: an explicit slug wins over the title
    pub fn requested_slug(&self) -> Option<String> {
        self.slug_source.as_deref().map(slugify)
    }

    /// Build a new product. Images and certifications are attached by the
    /// caller once their files are stored.
    pub fn into_product(self, id: String) -> Result<Product> {
        let category = self.validate_new()?;
        let slug = self
            .requested_slug()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::validation("title must contain at least one letter or digit"))?;

        let now = Utc::now();
        Ok(Product {
            id,
            title: self.title.unwrap_or_default(),
            slug,
            category,
            short_description: self.short_description.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            video_url: self.video_url.flatten(),
            datasheet_url: self.datasheet_url.flatten(),
            price: self.price.flatten(),
            stock: self.stock.flatten(),
            specifications: self.specifications.unwrap_or_default(),
            features: self.features.unwrap_or_default(),
            packaging: self.packaging.unwrap_or_default(),
            certifications: Vec::new(),
            faqs: self.faqs.unwrap_or_default(),
            related: self.related.unwrap_or_default(),
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update. Only submitted fields change; required fields
    /// may not be blanked. The slug follows a changed title or explicit slug.
    /// Images and certifications are left to the caller.
    pub fn apply_to(&self, product: &mut Product) -> Result<()> {
        let required = [
            ("title", &self.title),
            ("category", &self.category),
            ("shortDescription", &self.short_description),
            ("description", &self.description),
        ];
        for (name, value) in required {
            if matches!(value.as_deref(), Some(v) if v.trim().is_empty()) {
                return Err(Error::validation(format!("{} cannot be empty", name)));
            }
        }

        if let Some(category) = &self.category {
            product.category = category.parse()?;
        }
        if let Some(title) = &self.title {
            product.title = title.clone();
        }
        if self.title.is_some() || self.slug.as_deref().is_some_and(|s| !s.is_empty()) {
            let slug = self.requested_slug().unwrap_or_default();
            if slug.is_empty() {
                return Err(Error::validation(
                    "title must contain at least one letter or digit",
                ));
            }
            product.slug = slug;
        }
        if let Some(v) = &self.short_description {
            product.short_description = v.clone();
        }
        if let Some(v) = &self.description {
            product.description = v.clone();
        }
        if let Some(v) = &self.video_url {
            product.video_url = v.clone();
        }
        if let Some(v) = &self.datasheet_url {
            product.datasheet_url = v.clone();
        }
        if let Some(v) = self.price {
            product.price = v;
        }
        if let Some(v) = self.stock {
            product.stock = v;
        }
        if let Some(v) = &self.specifications {
            product.specifications = v.clone();
        }
        if let Some(v) = &self.features {
            product.features = v.clone();
        }
        if let Some(v) = &self.packaging {
            product.packaging = v.clone();
        }
        if let Some(v) = &self.faqs {
            product.faqs = v.clone();
        }
        if let Some(v) = &self.related {
            product.related = v.clone();
        }

        product.updated_at = Utc::now();
        Ok(())
    }
}

/// Fields of a content record submission
#[derive(Debug, Clone, Default)]
pub struct ContentDraft {
    pub title: Option<String>,
    pub subtitle: Option<Option<String>>,
    pub description: Option<String>,
    pub link: Option<Option<String>>,
}

impl ContentDraft {
    pub fn from_fields(fields: &FormFields) -> Self {
        Self {
            title: fields.text("title"),
            subtitle: optional_text(fields, "subtitle"),
            description: fields.text("description"),
            link: optional_text(fields, "link"),
        }
    }

    pub fn into_item(self, id: String, kind: ContentKind) -> Result<ContentItem> {
        let title = self
            .title
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::validation("missing required fields: title"))?;

        let mut item = ContentItem::new(id, kind, title);
        item.subtitle = self.subtitle.flatten();
        item.description = self.description.unwrap_or_default();
        item.link = self.link.flatten();
        Ok(item)
    }

    pub fn apply_to(&self, item: &mut ContentItem) -> Result<()> {
        if let Some(title) = &self.title {
            if title.is_empty() {
                return Err(Error::validation("title cannot be empty"));
            }
            item.title = title.clone();
        }
        if let Some(v) = &self.subtitle {
            item.subtitle = v.clone();
        }
        if let Some(v) = &self.description {
            item.description = v.clone();
        }
        if let Some(v) = &self.link {
            item.link = v.clone();
        }
        item.updated_at = Utc::now();
        Ok(())
    }
}
