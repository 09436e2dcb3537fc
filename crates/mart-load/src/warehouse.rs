//! The SQLite warehouse: transactional table loads, lookups and cascade
//! deletes.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use mart_model::{CleanRecord, RetryPolicy, TIMESTAMP_FORMAT, TableName, schema};
use rusqlite::types::Value as SqlValue;
use rusqlite::{CachedStatement, Connection, Transaction, TransactionBehavior, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{LoadError, Result, is_constraint};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::sql::{exists_sql, key_params, row_params, upsert_sql};

/// Row outcomes of one committed table batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl LoadCounts {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

/// Rows removed by a cascade delete, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub orders: u64,
    pub items: u64,
    pub reviews: u64,
}

impl PurgeCounts {
    pub fn total(&self) -> u64 {
        self.orders + self.items + self.reviews
    }
}

#[derive(Debug, Clone)]
pub struct WarehouseOptions {
    pub pool_size: usize,
    /// Rows per upsert chunk; each chunk logs progress.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for WarehouseOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            batch_size: 500,
            retry: RetryPolicy::default(),
        }
    }
}

/// A stored category with its hierarchy columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRow {
    pub name: String,
    pub english: Option<String>,
    pub parent: Option<String>,
    pub level: Option<i64>,
    pub path: Option<String>,
}

pub struct Warehouse {
    pool: ConnectionPool,
    options: WarehouseOptions,
}

impl Warehouse {
    /// Opens (creating if needed) the warehouse and applies the schema.
    pub fn open(path: &Path, options: WarehouseOptions) -> Result<Self> {
        let pool = options.retry.run("open warehouse", |_| {
            ConnectionPool::open(path, options.pool_size)
        })?;
        crate::schema::migrate(&pool.get())?;
        info!(path = %path.display(), pool_size = pool.size(), "opened warehouse");
        Ok(Self { pool, options })
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    pub fn options(&self) -> &WarehouseOptions {
        &self.options
    }

    /// Borrows a pooled connection for ad-hoc reads.
    pub fn connection(&self) -> PooledConnection<'_> {
        self.pool.get()
    }

    /// Loads one table batch, retrying transient failures.
    pub fn load_table(&self, table: TableName, records: &[CleanRecord]) -> Result<LoadCounts> {
        self.options
            .retry
            .run(table.as_str(), |_| self.load_batch(table, records))
    }

    /// Loads one table batch in a single `BEGIN IMMEDIATE` transaction.
    ///
    /// Unresolved foreign keys reject the whole batch before any row is
    /// written. Any other failure rolls the batch back.
    pub fn load_batch(&self, table: TableName, records: &[CleanRecord]) -> Result<LoadCounts> {
        let started = Instant::now();
        let mut conn = self.pool.get();
        let tx = begin(&mut conn, table.as_str())?;
        // Self references may point at rows later in the same batch.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON")
            .map_err(LoadError::sqlite(format!("{table}: failed to defer foreign keys")))?;

        let unresolved = unresolved_references(&tx, table, records)?;
        if !unresolved.is_empty() {
            debug!(%table, keys = ?unresolved, "unresolved references");
            return Err(LoadError::UnresolvedReferences {
                table,
                keys: unresolved,
            });
        }

        let counts = upsert_rows(&tx, table, records, self.options.batch_size)?;
        tx.commit().map_err(|source| {
            if is_constraint(&source) {
                LoadError::Constraint {
                    table,
                    keys: Vec::new(),
                    source,
                }
            } else {
                LoadError::sqlite(format!("{table}: commit failed"))(source)
            }
        })?;
        info!(
            %table,
            inserted = counts.inserted,
            updated = counts.updated,
            unchanged = counts.unchanged,
            duration_ms = started.elapsed().as_millis() as u64,
            "loaded table"
        );
        Ok(counts)
    }

    /// Deletes orders with their reviews and items, children first, in one
    /// transaction.
    pub fn delete_orders(&self, order_ids: &[String]) -> Result<PurgeCounts> {
        let mut conn = self.pool.get();
        let tx = begin(&mut conn, "delete orders")?;
        let counts = delete_order_cascade(&tx, order_ids)?;
        tx.commit()
            .map_err(LoadError::sqlite("failed to commit order deletion"))?;
        info!(
            orders = counts.orders,
            items = counts.items,
            reviews = counts.reviews,
            "deleted orders"
        );
        Ok(counts)
    }

    /// Removes orders purchased before `as_of - retention_days`.
    pub fn apply_retention(&self, as_of: DateTime<Utc>, retention_days: u32) -> Result<PurgeCounts> {
        let cutoff = as_of - Duration::days(i64::from(retention_days));
        let cutoff = cutoff.format(TIMESTAMP_FORMAT).to_string();
        let mut conn = self.pool.get();
        let tx = begin(&mut conn, "retention")?;
        let expired: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT order_id FROM orders
                     WHERE order_purchase_timestamp < ?1
                     ORDER BY order_id",
                )
                .map_err(LoadError::sqlite("failed to query expired orders"))?;
            stmt.query_map([&cutoff], |row| row.get(0))
                .and_then(|rows| rows.collect::<rusqlite::Result<_>>())
                .map_err(LoadError::sqlite("failed to query expired orders"))?
        };
        let counts = delete_order_cascade(&tx, &expired)?;
        tx.commit()
            .map_err(LoadError::sqlite("failed to commit retention"))?;
        info!(cutoff = %cutoff, orders = counts.orders, "applied retention");
        Ok(counts)
    }

    /// Natural keys stored in `table`, rendered like record keys.
    pub fn keys(&self, table: TableName) -> Result<Vec<String>> {
        let key = schema(table).key;
        let conn = self.pool.get();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM {table}", key.join(", ")))
            .map_err(LoadError::sqlite(format!("{table}: failed to read keys")))?;
        let rows = stmt
            .query_map([], |row| {
                (0..key.len())
                    .map(|i| row.get::<_, SqlValue>(i).map(render))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(LoadError::sqlite(format!("{table}: failed to read keys")))?;
        Ok(rows.into_iter().map(|parts| parts.join("/")).collect())
    }

    /// Stored categories ordered by hierarchy path.
    pub fn categories(&self) -> Result<Vec<CategoryRow>> {
        let conn = self.pool.get();
        let mut stmt = conn
            .prepare(
                "SELECT product_category_name, product_category_name_english,
                        parent_category_name, category_level, category_path
                 FROM product_categories
                 ORDER BY COALESCE(category_path, product_category_name)",
            )
            .map_err(LoadError::sqlite("failed to read categories"))?;
        stmt.query_map([], |row| {
            Ok(CategoryRow {
                name: row.get(0)?,
                english: row.get(1)?,
                parent: row.get(2)?,
                level: row.get(3)?,
                path: row.get(4)?,
            })
        })
        .and_then(|rows| rows.collect())
        .map_err(LoadError::sqlite("failed to read categories"))
    }

    /// Stored category hierarchy as name to parent.
    pub fn category_parents(&self) -> Result<BTreeMap<String, Option<String>>> {
        Ok(self
            .categories()?
            .into_iter()
            .map(|row| (row.name, row.parent))
            .collect())
    }

    pub fn row_count(&self, table: TableName) -> Result<u64> {
        let conn = self.pool.get();
        count(&conn, table.as_str())
    }

    pub fn row_counts(&self) -> Result<BTreeMap<TableName, u64>> {
        let conn = self.pool.get();
        TableName::ALL
            .into_iter()
            .map(|table| count(&conn, table.as_str()).map(|rows| (table, rows)))
            .collect()
    }
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("pool", &self.pool)
            .field("options", &self.options)
            .finish()
    }
}

pub(crate) fn begin<'c>(conn: &'c mut Connection, what: &str) -> Result<Transaction<'c>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(LoadError::sqlite(format!("{what}: failed to begin transaction")))
}

pub(crate) fn count(conn: &Connection, table: &str) -> Result<u64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|rows| rows.max(0) as u64)
    .map_err(LoadError::sqlite(format!("{table}: failed to count rows")))
}

fn render(value: SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(value) => value.to_string(),
        SqlValue::Real(value) => value.to_string(),
        SqlValue::Text(text) => text,
        SqlValue::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Foreign key values of the batch that resolve neither to a stored row nor,
/// for self references, to another row of the batch. Rendered as
/// `column=value`, sorted.
fn unresolved_references(
    conn: &Connection,
    table: TableName,
    records: &[CleanRecord],
) -> Result<Vec<String>> {
    let schema = schema(table);
    let batch_keys: HashSet<String> = records.iter().filter_map(CleanRecord::key).collect();
    let mut missing = BTreeSet::new();
    for column in schema.columns {
        let Some(target) = column.references else {
            continue;
        };
        let mut lookup = conn
            .prepare_cached(&exists_sql(target))
            .map_err(LoadError::sqlite(format!("{table}: failed to prepare reference check")))?;
        let mut resolved: HashSet<&str> = HashSet::new();
        for record in records {
            let Some(value) = record.get(column.name).as_str() else {
                continue;
            };
            if resolved.contains(value) || (target == table && batch_keys.contains(value)) {
                continue;
            }
            let exists: bool = lookup
                .query_row([value], |row| row.get(0))
                .map_err(LoadError::sqlite(format!("{table}: reference check failed")))?;
            if exists {
                resolved.insert(value);
            } else {
                missing.insert(format!("{}={value}", column.name));
            }
        }
    }
    Ok(missing.into_iter().collect())
}

fn upsert_rows(
    conn: &Connection,
    table: TableName,
    records: &[CleanRecord],
    batch_size: usize,
) -> Result<LoadCounts> {
    let mut upsert = conn
        .prepare_cached(&upsert_sql(table))
        .map_err(LoadError::sqlite(format!("{table}: failed to prepare upsert")))?;
    let mut exists = conn
        .prepare_cached(&exists_sql(table))
        .map_err(LoadError::sqlite(format!("{table}: failed to prepare key lookup")))?;

    let mut counts = LoadCounts::default();
    for (chunk, rows) in records.chunks(batch_size.max(1)).enumerate() {
        for record in rows {
            let present: bool = exists
                .query_row(params_from_iter(key_params(table, &record.values)), |row| {
                    row.get(0)
                })
                .map_err(LoadError::sqlite(format!("{table}: key lookup failed")))?;
            let changed = upsert
                .execute(params_from_iter(row_params(table, &record.values)))
                .map_err(|source| row_error(table, record, source))?;
            match (present, changed) {
                (false, _) => counts.inserted += 1,
                (true, 0) => counts.unchanged += 1,
                (true, _) => counts.updated += 1,
            }
        }
        debug!(%table, chunk, rows = rows.len(), "upserted chunk");
    }
    Ok(counts)
}

fn row_error(table: TableName, record: &CleanRecord, source: rusqlite::Error) -> LoadError {
    if is_constraint(&source) {
        LoadError::Constraint {
            table,
            keys: record.key().into_iter().collect(),
            source,
        }
    } else {
        LoadError::Sqlite {
            context: format!("{table}: upsert failed"),
            source,
        }
    }
}

fn delete_order_cascade(conn: &Connection, order_ids: &[String]) -> Result<PurgeCounts> {
    let prepare = |sql: &str| {
        conn.prepare_cached(sql)
            .map_err(LoadError::sqlite("failed to prepare order deletion"))
    };
    let mut reviews = prepare("DELETE FROM order_reviews WHERE order_id = ?1")?;
    let mut items = prepare("DELETE FROM order_items WHERE order_id = ?1")?;
    let mut orders = prepare("DELETE FROM orders WHERE order_id = ?1")?;

    let mut counts = PurgeCounts::default();
    for id in order_ids {
        let delete = |stmt: &mut CachedStatement<'_>| {
            stmt.execute([id])
                .map(|rows| rows as u64)
                .map_err(LoadError::sqlite(format!("failed to delete order {id}")))
        };
        counts.reviews += delete(&mut reviews)?;
        counts.items += delete(&mut items)?;
        counts.orders += delete(&mut orders)?;
    }
    Ok(counts)
}
