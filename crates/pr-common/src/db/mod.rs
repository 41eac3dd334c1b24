pub mod migrations;
pub mod pool;
pub mod properties;
pub mod recommendations;
pub mod util;

pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked};
pub use properties::{
    CatalogStorageError, PropertyUpsertResponse, UpsertStatus, fetch_properties, upsert_property,
};
pub use recommendations::{
    RecommendationRecord, RecommendationStorageError, insert_recommendations,
};
