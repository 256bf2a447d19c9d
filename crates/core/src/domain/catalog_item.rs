use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogCategory {
    Bowls,
    Filtration,
    Heating,
    Parts,
    Additional,
    Works,
    #[serde(other)]
    Other,
}

impl CatalogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bowls => "bowls",
            Self::Filtration => "filtration",
            Self::Heating => "heating",
            Self::Parts => "parts",
            Self::Additional => "additional",
            Self::Works => "works",
            Self::Other => "other",
        }
    }

    /// Unknown category names from the products collection fold into `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "bowls" | "bowl" => Self::Bowls,
            "filtration" => Self::Filtration,
            "heating" => Self::Heating,
            "parts" => Self::Parts,
            "additional" => Self::Additional,
            "works" => Self::Works,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub name: String,
    pub category: CatalogCategory,
    #[serde(with = "money::number")]
    pub price: Decimal,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_unit() -> String {
    "шт".to_string()
}

fn default_in_stock() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CatalogCategory, CatalogItem};

    #[test]
    fn catalog_item_reads_browser_shape_with_defaults() {
        let item: CatalogItem = serde_json::from_value(json!({
            "id": "h1",
            "name": "Теплообменник 40 кВт",
            "category": "heating",
            "price": 50000
        }))
        .expect("catalog item");

        assert_eq!(item.category, CatalogCategory::Heating);
        assert_eq!(item.unit, "шт");
        assert!(item.in_stock);
    }

    #[test]
    fn unknown_category_folds_into_other() {
        assert_eq!(CatalogCategory::parse("Lighting"), CatalogCategory::Other);
        assert_eq!(CatalogCategory::parse(" Bowl "), CatalogCategory::Bowls);
    }
}
