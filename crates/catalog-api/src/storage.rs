//! Document storage for catalog records
//!
//! Data model (Redis):
//! - `{collection}:doc:{id}` → JSON document
//! - `{collection}:all` → set of ids
//! - `{collection}:unique:{field}:{value}` → id owning a unique value (slug index)

use anyhow::{Context, Result};
use async_trait::async_trait;
use catalog_common::{ContentItem, Error, Product, StoredProduct};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const PRODUCTS: &str = "products";

/// Raw JSON document store with a per-collection unique index
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document
    async fn put(&self, collection: &str, id: &str, json: String) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>>;

    /// Returns false when nothing was stored under `id`
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn list(&self, collection: &str) -> Result<Vec<String>>;

    /// Atomically bind `value` to `id`. Succeeds when the value was free or
    /// is already bound to the same id.
    async fn claim_unique(&self, collection: &str, field: &str, value: &str, id: &str)
        -> Result<bool>;

    /// Unbind `value` if it is bound to `id`
    async fn release_unique(&self, collection: &str, field: &str, value: &str, id: &str)
        -> Result<()>;

    async fn lookup_unique(&self, collection: &str, field: &str, value: &str)
        -> Result<Option<String>>;

    async fn health_check(&self) -> Result<()>;
}

/// Redis-backed document store
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Create a new storage instance
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

fn doc_key(collection: &str, id: &str) -> String {
    format!("{}:doc:{}", collection, id)
}

fn index_key(collection: &str) -> String {
    format!("{}:all", collection)
}

fn unique_key(collection: &str, field: &str, value: &str) -> String {
    format!("{}:unique:{}:{}", collection, field, value)
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn put(&self, collection: &str, id: &str, json: String) -> Result<()> {
        let mut conn = self.conn.clone();

        let _: () = conn.set(doc_key(collection, id), json).await?;
        let _: () = conn.sadd(index_key(collection), id).await?;

        debug!("Stored {}/{}", collection, id);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(doc_key(collection, id)).await?;
        Ok(json)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: bool = conn.del(doc_key(collection, id)).await?;
        let _: () = conn.srem(index_key(collection), id).await?;

        Ok(deleted)
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(index_key(collection)).await?;

        let mut docs = Vec::with_capacity(ids.len());
        for id in &ids {
            let json: Option<String> = conn.get(doc_key(collection, id)).await?;
            match json {
                Some(json) => docs.push(json),
                None => warn!("Index entry without document: {}/{}", collection, id),
            }
        }

        Ok(docs)
    }

    async fn claim_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        id: &str,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = unique_key(collection, field, value);

        let claimed: bool = conn.set_nx(&key, id).await?;
        if claimed {
            return Ok(true);
        }

        let owner: Option<String> = conn.get(&key).await?;
        Ok(owner.as_deref() == Some(id))
    }

    async fn release_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        id: &str,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = unique_key(collection, field, value);

        let owner: Option<String> = conn.get(&key).await?;
        if owner.as_deref() == Some(id) {
            let _: () = conn.del(&key).await?;
        }
        Ok(())
    }

    async fn lookup_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let owner: Option<String> = conn.get(unique_key(collection, field, value)).await?;
        Ok(owner)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local document store for tests and throwaway development runs
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, BTreeMap<String, String>>>,
    unique: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: &str, id: &str, json: String) -> Result<()> {
        self.docs
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), json);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>> {
        Ok(self
            .docs
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .docs
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .docs
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn claim_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        id: &str,
    ) -> Result<bool> {
        let mut unique = self.unique.write().await;
        let owner = unique
            .entry(unique_key(collection, field, value))
            .or_insert_with(|| id.to_string());
        Ok(owner.as_str() == id)
    }

    async fn release_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        id: &str,
    ) -> Result<()> {
        let mut unique = self.unique.write().await;
        let key = unique_key(collection, field, value);
        if unique.get(&key).map(String::as_str) == Some(id) {
            unique.remove(&key);
        }
        Ok(())
    }

    async fn lookup_unique(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .unique
            .read()
            .await
            .get(&unique_key(collection, field, value))
            .cloned())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A record that can live in a collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    fn id(&self) -> &str;
}

impl Document for StoredProduct {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for ContentItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Typed view over one collection
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    collection: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            collection: self.collection,
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &'static str) -> Self {
        Self {
            store,
            collection,
            _marker: PhantomData,
        }
    }

    pub async fn save(&self, doc: &T) -> Result<()> {
        let json = serde_json::to_string(doc)
            .with_context(|| format!("Failed to serialize {} document", self.collection))?;
        self.store.put(self.collection, doc.id(), json).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        match self.store.get(self.collection, id).await? {
            Some(json) => {
                let doc = serde_json::from_str(&json).with_context(|| {
                    format!("Failed to deserialize {}/{}", self.collection, id)
                })?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// All readable documents; corrupt ones are skipped with a warning
    pub async fn list(&self) -> Result<Vec<T>> {
        let docs = self.store.list(self.collection).await?;

        Ok(docs
            .iter()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Skipping unreadable {} document: {}", self.collection, e);
                    None
                }
            })
            .collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(self.collection, id).await
    }
}

/// Product persistence: storage-shape conversion plus slug uniqueness
#[derive(Clone)]
pub struct ProductStore {
    store: Arc<dyn DocumentStore>,
    docs: Repository<StoredProduct>,
}

impl ProductStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            docs: Repository::new(store.clone(), PRODUCTS),
            store,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.docs.get(id).await?.map(Product::from))
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        match self.store.lookup_unique(PRODUCTS, "slug", slug).await? {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.docs.list().await?.into_iter().map(Product::from).collect())
    }

    /// Reject a slug held by another product
    pub async fn ensure_slug_available(&self, slug: &str, id: &str) -> catalog_common::Result<()> {
        match self.store.lookup_unique(PRODUCTS, "slug", slug).await? {
            Some(owner) if owner != id => Err(Error::DuplicateSlug(slug.to_string())),
            _ => Ok(()),
        }
    }

    /// Store a new product, claiming its slug first
    pub async fn insert(&self, product: &Product) -> catalog_common::Result<()> {
        if !self
            .store
            .claim_unique(PRODUCTS, "slug", &product.slug, &product.id)
            .await?
        {
            return Err(Error::DuplicateSlug(product.slug.clone()));
        }

        if let Err(e) = self.docs.save(&StoredProduct::from(product.clone())).await {
            self.release_slug(&product.slug, &product.id).await;
            return Err(e.into());
        }

        info!("Created product {} ({})", product.id, product.slug);
        Ok(())
    }

    /// Replace a stored product. When the slug changed, the new slug is
    /// claimed before writing and the old one released afterwards.
    pub async fn update(&self, previous_slug: &str, product: &Product) -> catalog_common::Result<()> {
        let slug_changed = previous_slug != product.slug;

        if slug_changed
            && !self
                .store
                .claim_unique(PRODUCTS, "slug", &product.slug, &product.id)
                .await?
        {
            return Err(Error::DuplicateSlug(product.slug.clone()));
        }

        if let Err(e) = self.docs.save(&StoredProduct::from(product.clone())).await {
            if slug_changed {
                self.release_slug(&product.slug, &product.id).await;
            }
            return Err(e.into());
        }

        if slug_changed {
            self.release_slug(previous_slug, &product.id).await;
        }

        info!("Updated product {} ({})", product.id, product.slug);
        Ok(())
    }

    pub async fn delete(&self, product: &Product) -> Result<bool> {
        let deleted = self.docs.delete(&product.id).await?;
        self.release_slug(&product.slug, &product.id).await;

        if deleted {
            info!("Deleted product {} ({})", product.id, product.slug);
        }
        Ok(deleted)
    }

    async fn release_slug(&self, slug: &str, id: &str) {
        if let Err(e) = self.store.release_unique(PRODUCTS, "slug", slug, id).await {
            warn!("Failed to release slug {} of product {}: {:#}", slug, id, e);
        }
    }
}
