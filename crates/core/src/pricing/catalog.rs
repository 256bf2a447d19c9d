use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::domain::catalog_item::{CatalogCategory, CatalogItem, CatalogItemId};

/// Read-only lookup of purchasable items; source of base prices.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    items: Vec<CatalogItem>,
    by_id: HashMap<CatalogItemId, usize>,
}

impl CatalogIndex {
    /// Later duplicates of an id replace earlier ones in lookups but keep the
    /// first item's position in listings.
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut index = Self::default();
        for item in items {
            match index.by_id.get(&item.id) {
                Some(position) => index.items[*position] = item,
                None => {
                    index.by_id.insert(item.id.clone(), index.items.len());
                    index.items.push(item);
                }
            }
        }
        index
    }

    /// Reads the cached catalog array, skipping entries that do not decode.
    pub fn from_value_lenient(value: &Value) -> Self {
        let Some(entries) = value.as_array() else {
            if !value.is_null() {
                warn!(event_name = "catalog.decode.not_an_array", "catalog cache is not an array");
            }
            return Self::default();
        };

        let items = entries
            .iter()
            .filter_map(|entry| match serde_json::from_value::<CatalogItem>(entry.clone()) {
                Ok(item) => Some(item),
                Err(error) => {
                    warn!(
                        event_name = "catalog.decode.item_skipped",
                        error = %error,
                        "skipping malformed catalog item"
                    );
                    None
                }
            })
            .collect();
        Self::new(items)
    }

    pub fn find(&self, id: &CatalogItemId) -> Option<&CatalogItem> {
        self.by_id.get(id).map(|position| &self.items[*position])
    }

    pub fn price_of(&self, id: &CatalogItemId) -> Option<Decimal> {
        self.find(id).map(|item| item.price)
    }

    pub fn by_category(&self, category: CatalogCategory) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter().filter(move |item| item.category == category)
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::domain::catalog_item::{CatalogCategory, CatalogItemId};

    use super::CatalogIndex;

    #[test]
    fn lookup_by_id_and_category() {
        let index = CatalogIndex::from_value_lenient(&json!([
            {"id": "f1", "name": "Фильтр 500", "category": "filtration", "price": 45000},
            {"id": "h1", "name": "Теплообменник", "category": "heating", "price": 50000},
            {"id": "broken", "category": "heating"},
            {"id": "f1", "name": "Фильтр 500", "category": "filtration", "price": 47000}
        ]));

        assert_eq!(index.len(), 2);
        assert_eq!(index.price_of(&CatalogItemId("f1".to_string())), Some(Decimal::new(47_000, 0)));
        assert_eq!(index.by_category(CatalogCategory::Heating).count(), 1);
        assert!(index.find(&CatalogItemId("missing".to_string())).is_none());
    }

    #[test]
    fn non_array_cache_yields_empty_index() {
        assert!(CatalogIndex::from_value_lenient(&json!({"items": []})).is_empty());
    }
}
