pub mod backup;
pub mod book;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod notice;
pub mod persistence;
pub mod pricing;
pub mod scheduler;
pub mod selection_store;
pub mod session;
pub mod sync;

pub use backup::{BackupDocument, BackupError, BACKUP_VERSION};
pub use book::EstimateBook;
pub use domain::catalog_item::{CatalogCategory, CatalogItem, CatalogItemId};
pub use domain::estimate::{
    Estimate, EstimateId, EstimateItem, EstimatePatch, EstimateStatus, Section, ValidationError,
};
pub use domain::selection::{
    Bowl, ClientInfo, Dimensions, EquipmentItem, HeatingSelection, Material, PartKind,
    PartsSelection, PoolShape, Selection, SelectionPatch, WorkSelection,
};
pub use domain::template::{Template, TemplateId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ledger::{HistoryLedger, LedgerAction, LedgerActionType, LedgerEntry, LedgerFilter};
pub use notice::{InMemoryNoticeSink, Notice, NoticeCategory, NoticeSeverity, NoticeSink, TracingNoticeSink};
pub use persistence::{InMemoryKeyValueStore, KeyValueStore, PersistenceGateway, StorageError};
pub use pricing::{CatalogIndex, DeterministicPricingEngine, PriceOverrideTable, PricingEngine};
pub use scheduler::{Scheduler, TimerTask};
pub use selection_store::SelectionStore;
pub use session::{EstimatorSession, SaveReceipt, SessionDeps, SessionError, SessionSettings, SyncStatus};
pub use sync::{
    InMemoryRemoteStore, RemoteChange, RemoteError, RemoteEstimateRow, RemoteEstimateStore,
    RemoteReconciler,
};
