//! The `Item` entity and its statistics.

use serde::{Deserialize, Serialize};

use itemlayer_core::{
    aggregate::FieldStats,
    backend::StoreBackend,
    document::Document,
    error::DocumentStoreResult,
    schema::{FieldDef, Schema},
    store::DocumentStore,
};

/// Collection holding every item.
pub const ITEMS: &str = "items";

/// The numeric field statistics are computed over.
pub const PRICE: &str = "price";

/// Accepted fields of an item body.
pub static ITEM_SCHEMA: Schema = Schema::new(&[
    FieldDef::text("name").required().non_empty(),
    FieldDef::text("description"),
    FieldDef::number(PRICE).required(),
]);

/// A catalogue item.
///
/// Negative prices are accepted. Statistics reflect whatever is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Display name, never blank.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit price.
    pub price: f64,
}

impl Item {
    /// Creates an item without a description.
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self { name: name.into(), description: None, price }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Document for Item {
    fn collection_name() -> &'static str {
        ITEMS
    }

    fn schema() -> &'static Schema {
        &ITEM_SCHEMA
    }
}

/// Price statistics over the whole collection, as the transport renders them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStats {
    /// Number of stored items.
    pub total_items: u64,
    /// Mean price, `0` when there are no items.
    pub average_price: f64,
    /// Highest price.
    pub max_price: f64,
    /// Lowest price.
    pub min_price: f64,
}

impl From<FieldStats> for ItemStats {
    fn from(stats: FieldStats) -> Self {
        Self {
            total_items: stats.count,
            average_price: stats.average,
            max_price: stats.max,
            min_price: stats.min,
        }
    }
}

impl ItemStats {
    /// Computes the statistics through the aggregation service of `store`.
    pub async fn compute<B: StoreBackend + ?Sized>(store: &DocumentStore<B>) -> DocumentStoreResult<Self> {
        let stats = store
            .aggregation::<Item>()
            .summarize(PRICE)
            .await?;

        Ok(stats.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_render_in_camel_case() {
        let stats = ItemStats::from(FieldStats { count: 3, average: 20.0, min: 10.0, max: 30.0 });

        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({ "totalItems": 3, "averagePrice": 20.0, "maxPrice": 30.0, "minPrice": 10.0 })
        );
    }

    #[test]
    fn items_without_description_omit_the_field() {
        assert_eq!(
            serde_json::to_value(Item::new("Lamp", 25.0)).unwrap(),
            json!({ "name": "Lamp", "price": 25.0 })
        );
    }

    #[test]
    fn schema_rejects_empty_names_and_unknown_fields() {
        assert!(ITEM_SCHEMA.validate_document(&json!({ "name": "", "price": 1 })).is_err());
        assert!(ITEM_SCHEMA.validate_document(&json!({ "name": "A", "price": 1, "color": "red" })).is_err());
        assert!(ITEM_SCHEMA.validate_document(&json!({ "name": "A", "price": -4 })).is_ok());
    }
}
