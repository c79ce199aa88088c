//! MongoDB implementation of [`StoreBackend`].
//!
//! Ids are `ObjectId`s assigned by this adapter before the write, exposed to callers as
//! their hex string. A string that does not parse as an `ObjectId` cannot name a stored
//! document, so it is reported as absent without a round trip.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::ErrorKind,
    options::{ClientOptions, IndexOptions, ReturnDocument},
};
use std::{collections::HashMap, time::Duration};

use itemlayer_core::{
    backend::{
        DEFAULT_BATCH_SIZE, DeleteManyResult, DocumentStream, FieldSummary, FindOptions, InsertManyOutcome,
        StoreBackend, StoreBackendBuilder, UpdateManyResult, UpdateSpec,
    },
    document::{DocumentId, StoredDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    query::Expr,
};

use crate::{
    error::{from_code, map_error},
    query::{MongoQueryTranslator, projection_document},
};

/// Splits a raw document into its id and body.
fn restore_document(mut document: Document) -> DocumentStoreResult<StoredDocument> {
    let id = match document.remove("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(id)) => id,
        Some(other) => {
            return Err(DocumentStoreError::Backend(format!("unsupported id type {:?}", other.element_type())));
        }
        None => return Err(DocumentStoreError::Backend("document without _id".to_string())),
    };

    Ok(StoredDocument::new(DocumentId::new(id), document))
}

fn id_filter(id: &DocumentId) -> Option<Document> {
    ObjectId::parse_str(id.as_str())
        .ok()
        .map(|oid| doc! { "_id": oid })
}

fn update_document(update: &UpdateSpec) -> Document {
    let mut document = Document::new();

    if !update.set.is_empty() {
        document.insert("$set", update.set.clone());
    }
    if !update.unset.is_empty() {
        let fields = update
            .unset
            .iter()
            .map(|field| (field.clone(), Bson::String(String::new())))
            .collect::<Document>();
        document.insert("$unset", fields);
    }

    document
}

fn as_f64(value: Option<&Bson>) -> Option<f64> {
    match value? {
        Bson::Double(value) => Some(*value),
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        _ => None,
    }
}

/// Length of the leading run of documents the server acknowledged.
fn confirmed_prefix(len: usize, inserted_ids: &HashMap<usize, Bson>) -> usize {
    (0..len).take_while(|index| inserted_ids.contains_key(index)).count()
}

/// Recovers the persisted prefix of an ordered insert that failed part-way.
fn insert_failure(err: mongodb::error::Error, prepared: Vec<StoredDocument>) -> DocumentStoreResult<InsertManyOutcome> {
    let (rejected, confirmed) = match &*err.kind {
        ErrorKind::InsertMany(failure) => (
            failure
                .write_errors
                .as_ref()
                .and_then(|errors| errors.iter().min_by_key(|write| write.index))
                .map(|write| (write.index, from_code(write.code, write.message.clone()))),
            confirmed_prefix(prepared.len(), &failure.inserted_ids),
        ),
        _ => (None, 0),
    };

    // Ordered inserts stop at the first rejected document.
    if let Some((index, error)) = rejected {
        return Ok(InsertManyOutcome {
            inserted: prepared.into_iter().take(index).collect(),
            failure: Some((index, error)),
        });
    }

    if confirmed == 0 {
        return Err(map_error(err));
    }

    let error = map_error(err);

    if confirmed == prepared.len() {
        tracing::warn!(%error, "batch persisted without full acknowledgement");
        return Ok(InsertManyOutcome { inserted: prepared, failure: None });
    }

    Ok(InsertManyOutcome {
        inserted: prepared.into_iter().take(confirmed).collect(),
        failure: Some((confirmed, error)),
    })
}

/// Persistent backend over one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
    batch_size: u32,
}

impl MongoDbStore {
    /// Wraps an existing client.
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database, batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Creates a builder for the given connection string and database.
    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, collection: &str, options: FindOptions) -> DocumentStoreResult<DocumentStream> {
        let filter = MongoQueryTranslator::translate(options.filter.as_ref())?;
        let batch_size = options.batch_size.unwrap_or(self.batch_size);

        let target = self.get_collection(collection);
        let mut find = target.find(filter).batch_size(batch_size);

        if let Some(projection) = &options.projection {
            find = find.projection(projection_document(projection));
        }

        let cursor = find.await.map_err(map_error)?;

        tracing::trace!(collection, batch_size, "opened cursor");

        Ok(cursor
            .map(|next| next.map_err(map_error).and_then(restore_document))
            .boxed())
    }

    async fn find_by_id(&self, collection: &str, id: &DocumentId) -> DocumentStoreResult<Option<StoredDocument>> {
        let Some(filter) = id_filter(id) else { return Ok(None) };

        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(map_error)?
            .map(restore_document)
            .transpose()
    }

    async fn insert_one(&self, collection: &str, body: Document) -> DocumentStoreResult<StoredDocument> {
        let oid = ObjectId::new();

        let mut document = doc! { "_id": oid };
        document.extend(body.clone());

        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(map_error)?;

        Ok(StoredDocument::new(DocumentId::new(oid.to_hex()), body))
    }

    async fn insert_many(&self, collection: &str, bodies: Vec<Document>) -> DocumentStoreResult<InsertManyOutcome> {
        let mut prepared = Vec::with_capacity(bodies.len());
        let mut documents = Vec::with_capacity(bodies.len());

        for body in bodies {
            let oid = ObjectId::new();
            let mut document = doc! { "_id": oid };
            document.extend(body.clone());

            documents.push(document);
            prepared.push(StoredDocument::new(DocumentId::new(oid.to_hex()), body));
        }

        match self.get_collection(collection).insert_many(documents).await {
            Ok(_) => Ok(InsertManyOutcome { inserted: prepared, failure: None }),
            Err(err) => insert_failure(err, prepared),
        }
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        update: UpdateSpec,
    ) -> DocumentStoreResult<Option<StoredDocument>> {
        if update.is_empty() {
            return self.find_by_id(collection, id).await;
        }
        let Some(filter) = id_filter(id) else { return Ok(None) };

        self.get_collection(collection)
            .find_one_and_update(filter, update_document(&update))
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_error)?
            .map(restore_document)
            .transpose()
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Option<Expr>,
        update: UpdateSpec,
    ) -> DocumentStoreResult<UpdateManyResult> {
        let filter = MongoQueryTranslator::translate(filter.as_ref())?;
        let target = self.get_collection(collection);

        if update.is_empty() {
            let matched_count = target.count_documents(filter).await.map_err(map_error)?;
            return Ok(UpdateManyResult { matched_count, modified_count: 0 });
        }

        let result = target
            .update_many(filter, update_document(&update))
            .await
            .map_err(map_error)?;

        Ok(UpdateManyResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
        body: Document,
    ) -> DocumentStoreResult<Option<StoredDocument>> {
        let Some(filter) = id_filter(id) else { return Ok(None) };

        self.get_collection(collection)
            .find_one_and_replace(filter, body)
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_error)?
            .map(restore_document)
            .transpose()
    }

    async fn delete_by_id(&self, collection: &str, id: &DocumentId) -> DocumentStoreResult<Option<StoredDocument>> {
        let Some(filter) = id_filter(id) else { return Ok(None) };

        self.get_collection(collection)
            .find_one_and_delete(filter)
            .await
            .map_err(map_error)?
            .map(restore_document)
            .transpose()
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> DocumentStoreResult<DeleteManyResult> {
        let filter = MongoQueryTranslator::translate(filter.as_ref())?;

        let result = self
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(map_error)?;

        Ok(DeleteManyResult { deleted_count: result.deleted_count })
    }

    async fn summarize(&self, collection: &str, field: &str) -> DocumentStoreResult<FieldSummary> {
        let path = format!("${field}");
        let numeric = doc! { "$cond": [{ "$isNumber": path.as_str() }, path.as_str(), Bson::Null] };

        let pipeline = [doc! {
            "$group": {
                "_id": Bson::Null,
                "count": { "$sum": 1 },
                "average": { "$avg": numeric.clone() },
                "min": { "$min": numeric.clone() },
                "max": { "$max": numeric },
            }
        }];

        let group = self
            .get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(map_error)?
            .try_next()
            .await
            .map_err(map_error)?;

        let Some(group) = group else { return Ok(FieldSummary::default()) };

        Ok(FieldSummary {
            count: as_f64(group.get("count")).unwrap_or_default() as u64,
            average: as_f64(group.get("average")),
            min: as_f64(group.get("min")),
            max: as_f64(group.get("max")),
        })
    }

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(map_error)?;

        tracing::debug!(collection, field, unique, "index ensured");

        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(map_error)?;

        Ok(())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Builder for [`MongoDbStore`].
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    batch_size: u32,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
}

impl MongoDbStoreBuilder {
    /// Creates a builder for the given connection string and database.
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: None,
            server_selection_timeout: None,
        }
    }

    /// Sets the number of documents fetched per cursor round trip.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the timeout for establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets how long an operation waits for a usable server before failing.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if self.connect_timeout.is_some() {
            options.connect_timeout = self.connect_timeout;
        }
        if self.server_selection_timeout.is_some() {
            options.server_selection_timeout = self.server_selection_timeout;
        }

        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        tracing::debug!(database = %self.database, "mongodb client created");

        Ok(MongoDbStore {
            client,
            database: self.database,
            batch_size: self.batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_ids_are_hex_object_ids() {
        let oid = ObjectId::new();
        let stored = restore_document(doc! { "_id": oid, "name": "A" }).unwrap();

        assert_eq!(stored.id.as_str(), oid.to_hex());
        assert_eq!(stored.body, doc! { "name": "A" });
    }

    #[test]
    fn malformed_ids_cannot_match() {
        assert!(id_filter(&"not-an-object-id".into()).is_none());
        assert!(id_filter(&ObjectId::new().to_hex().into()).is_some());
    }

    #[test]
    fn updates_only_carry_non_empty_operators() {
        let update = UpdateSpec { set: doc! { "price": 3.0 }, unset: vec!["description".into()] };
        assert_eq!(
            update_document(&update),
            doc! { "$set": { "price": 3.0 }, "$unset": { "description": "" } }
        );

        let set_only = UpdateSpec { set: doc! { "name": "B" }, unset: vec![] };
        assert_eq!(update_document(&set_only), doc! { "$set": { "name": "B" } });
    }

    #[test]
    fn acknowledged_prefix_stops_at_the_first_gap() {
        let ids = |indexes: &[usize]| {
            indexes
                .iter()
                .map(|index| (*index, Bson::ObjectId(ObjectId::new())))
                .collect::<HashMap<_, _>>()
        };

        assert_eq!(confirmed_prefix(4, &ids(&[0, 1, 3])), 2);
        assert_eq!(confirmed_prefix(2, &ids(&[0, 1])), 2);
        assert_eq!(confirmed_prefix(3, &ids(&[])), 0);
    }

    #[test]
    fn failures_outside_insert_many_confirm_nothing() {
        let prepared = vec![StoredDocument::new(DocumentId::new(ObjectId::new().to_hex()), doc! { "name": "A" })];
        let err = mongodb::error::Error::from(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));

        assert!(matches!(insert_failure(err, prepared), Err(DocumentStoreError::Unavailable(_))));
    }
}
