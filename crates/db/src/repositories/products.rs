use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;
use tracing::{info, warn};

use poolcalc_core::domain::catalog_item::{CatalogCategory, CatalogItem, CatalogItemId};
use poolcalc_core::pricing::CatalogIndex;

use super::{decode, RepositoryError};
use crate::DbPool;

/// Read side of the `products` table that feeds the catalog index.
pub struct SqlProductSource {
    pool: DbPool,
}

impl SqlProductSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Rows that fail to decode are skipped with a warning.
    pub async fn load_catalog(&self) -> Result<CatalogIndex, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, category, price, unit, in_stock FROM products ORDER BY category, name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_item(row) {
                Ok(item) => items.push(item),
                Err(error) => {
                    warn!(event_name = "db.products.row_skipped", error = %error, "skipping product row")
                }
            }
        }
        info!(event_name = "db.products.loaded", count = items.len(), "product catalog loaded");
        Ok(CatalogIndex::new(items))
    }

    pub async fn upsert(&self, item: &CatalogItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (id, name, category, price, unit, in_stock)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 price = excluded.price,
                 unit = excluded.unit,
                 in_stock = excluded.in_stock",
        )
        .bind(&item.id.0)
        .bind(&item.name)
        .bind(item.category.as_str())
        .bind(item.price.to_string())
        .bind(&item.unit)
        .bind(item.in_stock)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogItem, RepositoryError> {
    let category: String = decode(row.try_get("category"))?;
    let price_raw: String = decode(row.try_get("price"))?;
    let price = Decimal::from_str(price_raw.trim())
        .map_err(|error| RepositoryError::Decode(format!("invalid price `{price_raw}`: {error}")))?;

    Ok(CatalogItem {
        id: CatalogItemId(decode(row.try_get("id"))?),
        name: decode(row.try_get("name"))?,
        category: CatalogCategory::parse(&category),
        price,
        unit: decode(row.try_get("unit"))?,
        in_stock: decode(row.try_get("in_stock"))?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use poolcalc_core::domain::catalog_item::{CatalogCategory, CatalogItem, CatalogItemId};

    use super::SqlProductSource;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (sqlx::SqlitePool, SqlProductSource) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (pool.clone(), SqlProductSource::new(pool))
    }

    fn item(id: &str, name: &str, category: CatalogCategory, price: i64) -> CatalogItem {
        CatalogItem {
            id: CatalogItemId(id.to_string()),
            name: name.to_string(),
            category,
            price: Decimal::new(price, 0),
            unit: "шт".to_string(),
            in_stock: true,
        }
    }

    #[tokio::test]
    async fn catalog_loads_upserted_products() {
        let (_pool, source) = setup().await;
        source.upsert(&item("h1", "Теплообменник", CatalogCategory::Heating, 50_000)).await.expect("h1");
        source.upsert(&item("f1", "Фильтр", CatalogCategory::Filtration, 30_000)).await.expect("f1");
        source.upsert(&item("h1", "Теплообменник", CatalogCategory::Heating, 55_000)).await.expect("h1 again");

        let catalog = source.load_catalog().await.expect("load");

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.price_of(&CatalogItemId("h1".to_string())), Some(Decimal::new(55_000, 0)));
    }

    #[tokio::test]
    async fn undecodable_rows_are_skipped() {
        let (pool, source) = setup().await;
        source.upsert(&item("f1", "Фильтр", CatalogCategory::Filtration, 30_000)).await.expect("f1");
        sqlx::query("INSERT INTO products (id, name, category, price) VALUES ('bad', 'Брак', 'parts', 'n/a')")
            .execute(&pool)
            .await
            .expect("insert bad row");

        let catalog = source.load_catalog().await.expect("load");

        assert_eq!(catalog.len(), 1);
        assert!(catalog.find(&CatalogItemId("bad".to_string())).is_none());
    }
}
