//! Process-wide handle on a storage backend.
//!
//! A [`DocumentStore`] is created once at startup, handed to every component by reference
//! (or cheap clone), and shut down explicitly at the end of the process.
//!
//! # Example
//!
//! ```ignore
//! use itemlayer_core::store::DocumentStore;
//!
//! let store = DocumentStore::open(InMemoryStore::builder()).await?;
//! let items = store.repository::<Item>();
//! let stats = store.aggregation::<Item>().summarize("price").await?;
//! store.shutdown().await?;
//! ```
//!
//! The backend type defaults to `dyn StoreBackend`, which is what configuration-driven
//! callers get from [`DocumentStore::into_dyn`].

use std::sync::Arc;

use crate::{
    aggregate::Aggregation,
    backend::{StoreBackend, StoreBackendBuilder},
    document::Document,
    error::DocumentStoreResult,
    repository::Repository,
};

/// A shared handle on a backend.
///
/// Cloning is cheap and every clone talks to the same connection.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend + ?Sized = dyn StoreBackend> {
    backend: Arc<B>,
    batch_size: Option<u32>,
}

impl<B: StoreBackend + ?Sized> Clone for DocumentStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            batch_size: self.batch_size,
        }
    }
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend: Arc::new(backend), batch_size: None }
    }

    /// Builds a backend and checks that it is reachable.
    ///
    /// # Errors
    ///
    /// Returns the builder's error, or the ping error if the store cannot be reached.
    pub async fn open<T>(builder: T) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let backend = builder.build().await?;
        backend.ping().await?;

        tracing::info!(?backend, "document store opened");

        Ok(Self::new(backend))
    }

    /// Erases the backend type.
    pub fn into_dyn(self) -> DocumentStore
    where
        B: 'static,
    {
        let backend: Arc<dyn StoreBackend> = self.backend;

        DocumentStore { backend, batch_size: self.batch_size }
    }
}

impl DocumentStore {
    /// Wraps an already type-erased backend.
    pub fn from_dyn(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend, batch_size: None }
    }
}

impl<B: StoreBackend + ?Sized> DocumentStore<B> {
    /// Sets the cursor chunk size used by repositories created from this store.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets the repository for the specified document type.
    ///
    /// The collection name is determined by the document type's `collection_name()`.
    pub fn repository<D: Document>(&self) -> Repository<'_, B, D> {
        Repository::new(&*self.backend, self.batch_size)
    }

    /// Gets the aggregation service for the specified document type.
    pub fn aggregation<D: Document>(&self) -> Aggregation<'_, B, D> {
        Aggregation::new(&*self.backend)
    }

    /// Creates an index on a field of the collection of `D`.
    pub async fn ensure_index<D: Document>(&self, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.backend
            .ensure_index(D::collection_name(), field, unique)
            .await
    }

    /// Checks that the store is reachable.
    pub async fn ping(&self) -> DocumentStoreResult<()> {
        self.backend.ping().await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the handle. Other clones must not be used afterwards.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        tracing::info!("document store shut down");

        Ok(())
    }
}
