pub mod error;
pub mod loader;
pub mod lock;
pub mod outputs;
pub mod pool;
pub mod schema;
pub mod sql;
pub mod warehouse;

pub use error::{LoadError, Result};
pub use loader::{LoadOutcome, TableLoad};
pub use lock::RunLock;
pub use outputs::{RunSummary, StoredQualityScore};
pub use pool::{ConnectionPool, PooledConnection, open_connection};
pub use schema::{SCHEMA_VERSION, VIEWS, WAREHOUSE_SCHEMA, migrate};
pub use warehouse::{CategoryRow, LoadCounts, PurgeCounts, Warehouse, WarehouseOptions};
