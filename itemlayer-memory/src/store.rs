//! In-memory storage implementation for document stores.
//!
//! Documents are kept as BSON bodies per collection, in insertion order, behind a single
//! async-aware read-write lock. Single-document mutations hold the write lock for their
//! whole read-modify-write, so they are atomic. Multi-document mutations take the lock
//! once per matched document.

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

use itemlayer_core::{
    backend::{
        DEFAULT_BATCH_SIZE, DeleteManyResult, DocumentStream, FieldSummary, FindOptions, InsertManyOutcome,
        StoreBackend, StoreBackendBuilder, UpdateManyResult, UpdateSpec,
    },
    document::{DocumentId, StoredDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Projection},
};

use crate::evaluator::{as_number, matches};

type StoreMap = HashMap<String, Collection>;

/// One collection: bodies keyed by insertion sequence, plus an id lookup.
#[derive(Debug, Default)]
struct Collection {
    next_seq: u64,
    ids: HashMap<String, u64>,
    docs: BTreeMap<u64, StoredDocument>,
    unique: BTreeSet<String>,
}

impl Collection {
    fn get(&self, id: &DocumentId) -> Option<(u64, &StoredDocument)> {
        let seq = *self.ids.get(id.as_str())?;
        self.docs.get(&seq).map(|doc| (seq, doc))
    }

    /// Fails if `body` repeats a value of a unique field held by another document.
    fn check_unique(&self, name: &str, body: &BsonDocument, except: Option<u64>) -> DocumentStoreResult<()> {
        for field in &self.unique {
            let Some(value) = body.get(field) else { continue };

            let taken = self
                .docs
                .iter()
                .filter(|(seq, _)| Some(**seq) != except)
                .any(|(_, doc)| doc.body.get(field) == Some(value));

            if taken {
                return Err(DocumentStoreError::ConstraintViolation(format!(
                    "duplicate value for unique field `{field}` in `{name}`"
                )));
            }
        }

        Ok(())
    }

    fn insert(&mut self, name: &str, body: BsonDocument) -> DocumentStoreResult<StoredDocument> {
        self.check_unique(name, &body, None)?;

        let id = DocumentId::new(Uuid::new_v4().to_string());
        let seq = self.next_seq;
        self.next_seq += 1;

        let stored = StoredDocument::new(id.clone(), body);
        self.ids.insert(id.as_str().to_string(), seq);
        self.docs.insert(seq, stored.clone());

        Ok(stored)
    }

    fn remove(&mut self, seq: u64) -> Option<StoredDocument> {
        let removed = self.docs.remove(&seq)?;
        self.ids.remove(removed.id.as_str());
        Some(removed)
    }

    /// Returns up to `limit` matching documents inserted after `after`.
    fn scan(&self, after: Option<u64>, filter: Option<&Expr>, limit: usize) -> Vec<(u64, StoredDocument)> {
        let start = after.map_or(Bound::Unbounded, Bound::Excluded);

        self.docs
            .range((start, Bound::Unbounded))
            .filter(|(_, doc)| matches(&doc.body, filter))
            .take(limit)
            .map(|(seq, doc)| (*seq, doc.clone()))
            .collect()
    }
}

/// Decrements the open cursor count when a stream is released.
#[derive(Debug)]
struct CursorGuard {
    open: Arc<AtomicUsize>,
}

impl CursorGuard {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open: Arc::clone(open) }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

struct CursorState {
    store: Arc<RwLock<StoreMap>>,
    collection: String,
    filter: Option<Expr>,
    projection: Option<Projection>,
    batch_size: usize,
    after: Option<u64>,
    _guard: CursorGuard,
}

async fn next_chunk(mut state: CursorState) -> Option<(Vec<DocumentStoreResult<StoredDocument>>, CursorState)> {
    let chunk = {
        let store = state.store.read().await;
        let collection = store.get(&state.collection)?;

        collection.scan(state.after, state.filter.as_ref(), state.batch_size)
    };

    state.after = Some(chunk.last()?.0);

    let documents = chunk
        .into_iter()
        .map(|(_, doc)| match &state.projection {
            Some(projection) => Ok(StoredDocument::new(doc.id, projection.apply(&doc.body))),
            None => Ok(doc),
        })
        .collect();

    Some((documents, state))
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so it can be
/// shared across async tasks. Clones share the same underlying data.
///
/// Ids are random UUIDs. Filters scan the whole collection, and unique indexes are
/// enforced by scanning too.
///
/// # Example
///
/// ```ignore
/// use itemlayer_memory::InMemoryStore;
/// use itemlayer_core::store::DocumentStore;
///
/// let store = DocumentStore::open(InMemoryStore::builder().batch_size(50)).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
    open_cursors: Arc<AtomicUsize>,
    batch_size: u32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of streams returned by `find` that have not been exhausted or dropped yet.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Ids of the documents matching `filter`, in insertion order.
    async fn matching(&self, collection: &str, filter: Option<&Expr>) -> Vec<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(collection) => collection
                .docs
                .iter()
                .filter(|(_, doc)| matches(&doc.body, filter))
                .map(|(seq, _)| *seq)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, collection: &str, options: FindOptions) -> DocumentStoreResult<DocumentStream> {
        let batch_size = options.batch_size.unwrap_or(self.batch_size).max(1) as usize;

        let state = CursorState {
            store: Arc::clone(&self.store),
            collection: collection.to_string(),
            filter: options.filter,
            projection: options.projection,
            batch_size,
            after: None,
            _guard: CursorGuard::new(&self.open_cursors),
        };

        tracing::trace!(collection, batch_size, "opened cursor");

        Ok(stream::unfold(state, next_chunk)
            .flat_map(stream::iter)
            .boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &DocumentId) -> DocumentStoreResult<Option<StoredDocument>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .and_then(|collection| collection.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn insert_one(&self, collection: &str, body: BsonDocument) -> DocumentStoreResult<StoredDocument> {
        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(collection, body)
    }

    async fn insert_many(&self, collection: &str, bodies: Vec<BsonDocument>) -> DocumentStoreResult<InsertManyOutcome> {
        let mut store = self.store.write().await;
        let target = store.entry(collection.to_string()).or_default();

        let mut inserted = Vec::with_capacity(bodies.len());

        for (index, body) in bodies.into_iter().enumerate() {
            match target.insert(collection, body) {
                Ok(stored) => inserted.push(stored),
                Err(err) => {
                    return Ok(InsertManyOutcome { inserted, failure: Some((index, err)) });
                }
            }
        }

        Ok(InsertManyOutcome { inserted, failure: None })
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        update: UpdateSpec,
    ) -> DocumentStoreResult<Option<StoredDocument>> {
        let mut store = self.store.write().await;
        let Some(target) = store.get_mut(collection) else { return Ok(None) };
        let Some((seq, current)) = target.get(id) else { return Ok(None) };

        let mut body = current.body.clone();
        update.apply_to(&mut body);
        target.check_unique(collection, &body, Some(seq))?;

        let stored = StoredDocument::new(id.clone(), body);
        target.docs.insert(seq, stored.clone());

        Ok(Some(stored))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: UpdateSpec,
    ) -> DocumentStoreResult<UpdateManyResult> {
        let mut result = UpdateManyResult::default();

        for seq in self.matching(collection, filter.as_ref()).await {
            let mut store = self.store.write().await;
            let Some(target) = store.get_mut(collection) else { break };

            // The document may have changed or vanished since the scan.
            let Some(current) = target.docs.get(&seq) else { continue };
            if !matches(&current.body, filter.as_ref()) {
                continue;
            }

            result.matched_count += 1;

            let mut body = current.body.clone();
            if !update.apply_to(&mut body) {
                continue;
            }

            target.check_unique(collection, &body, Some(seq))?;

            if let Some(doc) = target.docs.get_mut(&seq) {
                doc.body = body;
                result.modified_count += 1;
            }
        }

        Ok(result)
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        body: BsonDocument,
    ) -> DocumentStoreResult<Option<StoredDocument>> {
        let mut store = self.store.write().await;
        let Some(target) = store.get_mut(collection) else { return Ok(None) };
        let Some((seq, _)) = target.get(id) else { return Ok(None) };

        target.check_unique(collection, &body, Some(seq))?;

        let stored = StoredDocument::new(id.clone(), body);
        target.docs.insert(seq, stored.clone());

        Ok(Some(stored))
    }

    async fn delete_by_id(&self, collection: &str, id: &DocumentId) -> DocumentStoreResult<Option<StoredDocument>> {
        let mut store = self.store.write().await;
        let Some(target) = store.get_mut(collection) else { return Ok(None) };
        let Some((seq, _)) = target.get(id) else { return Ok(None) };

        Ok(target.remove(seq))
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<DeleteManyResult> {
        let mut result = DeleteManyResult::default();

        for seq in self.matching(collection, filter.as_ref()).await {
            let mut store = self.store.write().await;
            let Some(target) = store.get_mut(collection) else { break };

            let still_matches = target
                .docs
                .get(&seq)
                .is_some_and(|doc| matches(&doc.body, filter.as_ref()));

            if still_matches && target.remove(seq).is_some() {
                result.deleted_count += 1;
            }
        }

        Ok(result)
    }

    async fn summarize(&self, collection: &str, field: &str) -> DocumentStoreResult<FieldSummary> {
        let store = self.store.read().await;
        let Some(target) = store.get(collection) else { return Ok(FieldSummary::default()) };

        let numbers = target
            .docs
            .values()
            .filter_map(|doc| doc.body.get(field).and_then(as_number))
            .collect::<Vec<_>>();

        let mut summary = FieldSummary {
            count: target.docs.len() as u64,
            ..FieldSummary::default()
        };

        if !numbers.is_empty() {
            summary.average = Some(numbers.iter().sum::<f64>() / numbers.len() as f64);
            summary.min = numbers.iter().copied().reduce(f64::min);
            summary.max = numbers.iter().copied().reduce(f64::max);
        }

        Ok(summary)
    }

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        if !unique {
            // Scans are cheap enough that plain indexes are not materialized.
            return Ok(());
        }

        let mut store = self.store.write().await;
        let target = store.entry(collection.to_string()).or_default();

        let mut seen = Vec::<&Bson>::new();
        for value in target.docs.values().filter_map(|doc| doc.body.get(field)) {
            if seen.contains(&value) {
                return Err(DocumentStoreError::ConstraintViolation(format!(
                    "existing documents in `{collection}` repeat values of `{field}`"
                )));
            }
            seen.push(value);
        }

        target.unique.insert(field.to_string());

        tracing::debug!(collection, field, "unique index created");

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use itemlayer_memory::InMemoryStore;
/// use itemlayer_core::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().batch_size(10).build().await?;
/// ```
#[derive(Debug)]
pub struct InMemoryStoreBuilder {
    batch_size: u32,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl InMemoryStoreBuilder {
    /// Sets how many documents a cursor takes from the store per lock acquisition.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore { batch_size: self.batch_size, ..InMemoryStore::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;
    use itemlayer_core::query::Filter;

    async fn seeded(prices: &[f64]) -> InMemoryStore {
        let store = InMemoryStore::builder().batch_size(2).build().await.unwrap();

        for (i, price) in prices.iter().enumerate() {
            store
                .insert_one("items", doc! { "name": format!("item-{i}"), "price": *price })
                .await
                .unwrap();
        }

        store
    }

    #[tokio::test]
    async fn find_streams_in_insertion_order_across_chunks() {
        let store = seeded(&[1.0, 2.0, 3.0, 4.0, 5.0]).await;

        let names = store
            .find("items", FindOptions::all())
            .await
            .unwrap()
            .map_ok(|doc| doc.body.get_str("name").unwrap().to_string())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(names, ["item-0", "item-1", "item-2", "item-3", "item-4"]);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn dropping_a_stream_releases_its_cursor() {
        let store = seeded(&[1.0, 2.0, 3.0]).await;

        let mut stream = store.find("items", FindOptions::all()).await.unwrap();
        assert!(stream.next().await.is_some());
        assert_eq!(store.open_cursors(), 1);

        drop(stream);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn find_applies_filter_and_projection() {
        let store = seeded(&[10.0, 20.0, 30.0]).await;

        let options = FindOptions::all()
            .with_filter(Some(Filter::gte("price", 20)))
            .with_projection(Some(Projection::new(["name"])));

        let docs = store
            .find("items", options)
            .await
            .unwrap()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].body, doc! { "name": "item-1" });
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_absent() {
        let store = seeded(&[1.0]).await;

        assert!(store.find_by_id("items", &"not-an-id".into()).await.unwrap().is_none());
        assert!(store.delete_by_id("missing", &"x".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unique_index_stops_ordered_inserts() {
        let store = InMemoryStore::new();
        store.ensure_index("items", "name", true).await.unwrap();

        let outcome = store
            .insert_many(
                "items",
                vec![doc! { "name": "a" }, doc! { "name": "b" }, doc! { "name": "a" }, doc! { "name": "c" }],
            )
            .await
            .unwrap();

        assert_eq!(outcome.inserted.len(), 2);
        let (index, error) = outcome.failure.unwrap();
        assert_eq!(index, 2);
        assert!(matches!(error, DocumentStoreError::ConstraintViolation(_)));
        assert_eq!(store.summarize("items", "price").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn unique_index_rejects_existing_duplicates() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "name": "a" }).await.unwrap();
        store.insert_one("items", doc! { "name": "a" }).await.unwrap();

        assert!(matches!(
            store.ensure_index("items", "name", true).await,
            Err(DocumentStoreError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn update_many_counts_matched_and_modified() {
        let store = seeded(&[5.0, 5.0, 7.0]).await;

        let update = UpdateSpec { set: doc! { "price": 7.0 }, unset: vec![] };
        let result = store.update_many("items", None, update).await.unwrap();

        assert_eq!(result, UpdateManyResult { matched_count: 3, modified_count: 2 });
    }

    #[tokio::test]
    async fn summarize_ignores_non_numeric_values() {
        let store = seeded(&[10.0, 20.0, 30.0]).await;
        store.insert_one("items", doc! { "name": "free" }).await.unwrap();

        let summary = store.summarize("items", "price").await.unwrap();

        assert_eq!(summary.count, 4);
        assert_eq!(summary.average, Some(20.0));
        assert_eq!(summary.min, Some(10.0));
        assert_eq!(summary.max, Some(30.0));
    }
}
