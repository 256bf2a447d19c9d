use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use poolcalc_core::domain::catalog_item::{CatalogCategory, CatalogItem, CatalogItemId};
use poolcalc_core::domain::selection::{EquipmentItem, Material, SelectionPatch};
use poolcalc_core::notice::InMemoryNoticeSink;
use poolcalc_core::persistence::KeyValueStore;
use poolcalc_core::pricing::PriceOverrideTable;
use poolcalc_core::session::{EstimatorSession, SessionDeps, SessionSettings, SyncStatus};
use poolcalc_core::sync::RemoteEstimateStore;
use poolcalc_db::{
    connect_with_settings, migrations, DbPool, SqlKeyValueStore, SqlProductSource,
    SqlRemoteEstimateStore,
};

type TestResult = Result<(), String>;

async fn pool() -> Result<DbPool, String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    Ok(pool)
}

async fn open(pool: &DbPool, notices: &InMemoryNoticeSink) -> Result<EstimatorSession, String> {
    let catalog = SqlProductSource::new(pool.clone())
        .load_catalog()
        .await
        .map_err(|error| format!("catalog: {error}"))?;
    let storage: Arc<dyn KeyValueStore> = Arc::new(SqlKeyValueStore::new(pool.clone()));
    let remote: Arc<dyn RemoteEstimateStore> = Arc::new(SqlRemoteEstimateStore::new(pool.clone()));
    let settings =
        SessionSettings { pull_interval: Some(Duration::from_secs(60)), ..SessionSettings::default() };

    Ok(EstimatorSession::open(
        SessionDeps {
            storage,
            remote: Some(remote),
            notices: Arc::new(notices.clone()),
            overrides: PriceOverrideTable::default(),
            catalog: Some(catalog),
        },
        settings,
    )
    .await)
}

fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}

#[tokio::test]
async fn selection_and_estimates_survive_a_restart() -> TestResult {
    let pool = pool().await?;
    let notices = InMemoryNoticeSink::default();

    SqlProductSource::new(pool.clone())
        .upsert(&CatalogItem {
            id: CatalogItemId("f1".to_string()),
            name: "Фильтр песочный".to_string(),
            category: CatalogCategory::Filtration,
            price: Decimal::new(42_000, 0),
            unit: "шт".to_string(),
            in_stock: true,
        })
        .await
        .map_err(|error| format!("seed product: {error}"))?;

    let mut session = open(&pool, &notices).await?;
    session.mutate(SelectionPatch::Material(Some(Material::Composite { name: "Композит".to_string() })));
    session.mutate(SelectionPatch::Filtration(Some(EquipmentItem::priced(
        "f1",
        "Фильтр",
        Decimal::new(1, 0),
    ))));
    ensure(session.total() == Decimal::new(42_000, 0), format!("catalog price, got {}", session.total()))?;

    let receipt = session.save_estimate("Коттедж").await.map_err(|error| error.to_string())?;
    ensure(receipt.sync == SyncStatus::Synced, "estimate should reach the shared table")?;
    ensure(session.flush_now().await, "pending selection should flush")?;
    session.shutdown();

    let reopened = open(&pool, &notices).await?;
    ensure(reopened.total() == Decimal::new(42_000, 0), "selection restored from kv_store")?;
    ensure(reopened.estimates().len() == 1, "estimate list restored")?;
    ensure(reopened.estimates()[0].id == receipt.estimate.id, "same estimate id")?;
    ensure(notices.notices().is_empty(), "no notices on a healthy database")
}

#[tokio::test]
async fn pull_on_open_brings_in_estimates_saved_elsewhere() -> TestResult {
    let pool = pool().await?;
    let notices = InMemoryNoticeSink::default();

    let mut first = open(&pool, &notices).await?;
    first.save_estimate("С первого устройства").await.map_err(|error| error.to_string())?;

    // A second device has its own local storage but the same shared table.
    let other_local = self::pool().await?;
    let storage: Arc<dyn KeyValueStore> = Arc::new(SqlKeyValueStore::new(other_local));
    let remote: Arc<dyn RemoteEstimateStore> = Arc::new(SqlRemoteEstimateStore::new(pool.clone()));
    let second = EstimatorSession::open(
        SessionDeps {
            storage,
            remote: Some(remote),
            notices: Arc::new(notices.clone()),
            overrides: PriceOverrideTable::default(),
            catalog: None,
        },
        SessionSettings::default(),
    )
    .await;

    ensure(second.estimates().len() == 1, "pulled one estimate")?;
    ensure(second.estimates()[0].name == "С первого устройства", "pulled estimate name")
}
