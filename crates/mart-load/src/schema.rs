//! Warehouse DDL: dimension and fact tables, derived views and run outputs.

use rusqlite::Connection;
use tracing::info;

use crate::error::{LoadError, Result};

/// Bumped whenever [`WAREHOUSE_SCHEMA`] changes shape.
pub const SCHEMA_VERSION: i64 = 2;

pub const WAREHOUSE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS product_categories (
    product_category_name TEXT PRIMARY KEY,
    product_category_name_english TEXT,
    parent_category_name TEXT
        REFERENCES product_categories (product_category_name),
    category_level INTEGER CHECK (category_level >= 1),
    category_path TEXT
);

CREATE TABLE IF NOT EXISTS products (
    product_id TEXT PRIMARY KEY,
    product_category_name TEXT
        REFERENCES product_categories (product_category_name),
    product_name_length INTEGER CHECK (product_name_length >= 0),
    product_description_length INTEGER CHECK (product_description_length >= 0),
    product_photos_qty INTEGER CHECK (product_photos_qty >= 0),
    product_weight_g REAL CHECK (product_weight_g >= 0),
    product_length_cm REAL CHECK (product_length_cm >= 0),
    product_height_cm REAL CHECK (product_height_cm >= 0),
    product_width_cm REAL CHECK (product_width_cm >= 0)
);

CREATE TABLE IF NOT EXISTS sellers (
    seller_id TEXT PRIMARY KEY,
    seller_zip_code_prefix TEXT,
    seller_city TEXT,
    seller_state TEXT CHECK (seller_state IS NULL OR length(seller_state) = 2)
);

CREATE TABLE IF NOT EXISTS customers (
    customer_id TEXT PRIMARY KEY,
    customer_unique_id TEXT,
    customer_zip_code_prefix TEXT,
    customer_city TEXT,
    customer_state TEXT CHECK (customer_state IS NULL OR length(customer_state) = 2)
);

CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers (customer_id),
    order_status TEXT NOT NULL CHECK (order_status IN (
        'created', 'approved', 'invoiced', 'processing',
        'shipped', 'delivered', 'canceled', 'unavailable'
    )),
    order_purchase_timestamp TEXT NOT NULL,
    order_approved_at TEXT,
    order_delivered_carrier_date TEXT,
    order_delivered_customer_date TEXT,
    order_estimated_delivery_date TEXT
);

CREATE TABLE IF NOT EXISTS order_items (
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    order_item_id INTEGER NOT NULL CHECK (order_item_id >= 1),
    product_id TEXT NOT NULL REFERENCES products (product_id),
    seller_id TEXT NOT NULL REFERENCES sellers (seller_id),
    shipping_limit_date TEXT,
    price REAL NOT NULL CHECK (price > 0),
    freight_value REAL NOT NULL DEFAULT 0 CHECK (freight_value >= 0),
    total_amount REAL NOT NULL,
    PRIMARY KEY (order_id, order_item_id)
);

CREATE TABLE IF NOT EXISTS order_reviews (
    review_id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL REFERENCES orders (order_id),
    review_score INTEGER NOT NULL CHECK (review_score BETWEEN 1 AND 5),
    review_comment_title TEXT,
    review_comment_message TEXT,
    review_creation_date TEXT,
    review_answer_timestamp TEXT
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products (product_category_name);
CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders (customer_id);
CREATE INDEX IF NOT EXISTS idx_orders_purchase ON orders (order_purchase_timestamp);
CREATE INDEX IF NOT EXISTS idx_order_items_product ON order_items (product_id);
CREATE INDEX IF NOT EXISTS idx_order_items_seller ON order_items (seller_id);
CREATE INDEX IF NOT EXISTS idx_order_reviews_order ON order_reviews (order_id);

CREATE TABLE IF NOT EXISTS quality_scores (
    table_name TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    completeness REAL NOT NULL,
    uniqueness REAL NOT NULL,
    validity REAL NOT NULL,
    score REAL NOT NULL,
    columns_json TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS customer_segments (
    customer_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    recency_days INTEGER,
    frequency INTEGER NOT NULL,
    monetary REAL NOT NULL,
    value_tier TEXT NOT NULL,
    activity_status TEXT NOT NULL,
    r_score INTEGER NOT NULL CHECK (r_score BETWEEN 1 AND 5),
    f_score INTEGER NOT NULL CHECK (f_score BETWEEN 1 AND 5),
    m_score INTEGER NOT NULL CHECK (m_score BETWEEN 1 AND 5),
    rfm_segment TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS etl_runs (
    run_id TEXT PRIMARY KEY,
    as_of TEXT NOT NULL,
    status TEXT NOT NULL,
    total_ms INTEGER NOT NULL,
    report_json TEXT NOT NULL
);

CREATE VIEW IF NOT EXISTS order_summary AS
SELECT
    o.order_id,
    o.customer_id,
    o.order_status,
    o.order_purchase_timestamp,
    COUNT(i.order_item_id) AS item_count,
    COALESCE(SUM(i.price), 0) AS items_value,
    COALESCE(SUM(i.freight_value), 0) AS freight_value,
    COALESCE(SUM(i.total_amount), 0) AS order_value,
    (SELECT AVG(r.review_score) FROM order_reviews r WHERE r.order_id = o.order_id)
        AS review_score
FROM orders o
LEFT JOIN order_items i ON i.order_id = o.order_id
GROUP BY o.order_id;

CREATE VIEW IF NOT EXISTS customer_metrics AS
SELECT
    c.customer_id,
    c.customer_unique_id,
    c.customer_city,
    c.customer_state,
    COUNT(s.order_id) AS order_count,
    COALESCE(SUM(s.order_value), 0) AS total_spent,
    MIN(s.order_purchase_timestamp) AS first_order_at,
    MAX(s.order_purchase_timestamp) AS last_order_at
FROM customers c
LEFT JOIN order_summary s ON s.customer_id = c.customer_id
GROUP BY c.customer_id;

CREATE VIEW IF NOT EXISTS seller_performance AS
SELECT
    s.seller_id,
    s.seller_city,
    s.seller_state,
    COUNT(DISTINCT i.order_id) AS order_count,
    COUNT(i.order_item_id) AS items_sold,
    COALESCE(SUM(i.price), 0) AS revenue,
    COALESCE(SUM(i.freight_value), 0) AS freight,
    (SELECT AVG(r.review_score)
       FROM order_reviews r
      WHERE r.order_id IN (
            SELECT ri.order_id FROM order_items ri WHERE ri.seller_id = s.seller_id
      )) AS avg_review_score
FROM sellers s
LEFT JOIN order_items i ON i.seller_id = s.seller_id
GROUP BY s.seller_id;
";

/// Names of the derived views.
pub const VIEWS: [&str; 3] = ["order_summary", "customer_metrics", "seller_performance"];

/// Creates missing tables and views and stamps the schema version.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(LoadError::sqlite("failed to read schema version"))?;
    if current < SCHEMA_VERSION {
        // Views carry no data; older definitions are recreated below.
        for view in VIEWS {
            conn.execute_batch(&format!("DROP VIEW IF EXISTS {view};"))
                .map_err(LoadError::sqlite("failed to drop outdated view"))?;
        }
    }
    conn.execute_batch(WAREHOUSE_SCHEMA)
        .map_err(LoadError::sqlite("failed to apply warehouse schema"))?;
    if current < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(LoadError::sqlite("failed to stamp schema version"))?;
        info!(from = current, to = SCHEMA_VERSION, "migrated warehouse schema");
    }
    Ok(())
}
