//! Column contracts for every warehouse table.
//!
//! The same definitions drive the source header check, record validation,
//! null imputation and the loader's upsert statements, so a column is
//! declared exactly once.

use crate::table::TableName;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
    Timestamp,
}

/// Domain check applied to a non-null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    None,
    /// Numeric value strictly greater than zero.
    Positive,
    /// Numeric value greater than or equal to zero.
    NonNegative,
    /// Integer value inside an inclusive range.
    Between(i64, i64),
    /// Integer value greater than or equal to the bound.
    AtLeast(i64),
    /// Text value from a closed, lower-case vocabulary.
    OneOf(&'static [&'static str]),
    /// Two upper-case ASCII letters.
    StateCode,
    /// One to five ASCII digits.
    ZipPrefix,
}

/// Default applied by the transformer when a nullable column is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Impute {
    Keep,
    Text(&'static str),
    Integer(i64),
    Decimal(f64),
    /// Copy the value of another column in the same row.
    CopyFrom(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub check: Check,
    /// Table whose key this column references.
    pub references: Option<TableName>,
    pub impute: Impute,
    /// False for columns computed by the transformer.
    pub source: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            check: Check::None,
            references: None,
            impute: Impute::Keep,
            source: true,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn check(mut self, check: Check) -> Self {
        self.check = check;
        self
    }

    const fn references(mut self, table: TableName) -> Self {
        self.references = Some(table);
        self
    }

    const fn impute(mut self, impute: Impute) -> Self {
        self.impute = impute;
        self
    }

    const fn derived(mut self) -> Self {
        self.source = false;
        self
    }
}

const fn text(name: &'static str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnKind::Text)
}

const fn integer(name: &'static str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnKind::Integer)
}

const fn decimal(name: &'static str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnKind::Decimal)
}

const fn timestamp(name: &'static str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnKind::Timestamp)
}

/// Order lifecycle states accepted in `orders.order_status`.
pub const ORDER_STATUSES: &[&str] = &[
    "created",
    "approved",
    "invoiced",
    "processing",
    "shipped",
    "delivered",
    "canceled",
    "unavailable",
];

/// Column layout, key and versioning of one table.
#[derive(Debug)]
pub struct TableSchema {
    pub table: TableName,
    /// Natural key columns, in key order.
    pub key: &'static [&'static str],
    /// Columns compared (first non-null wins) to pick the latest duplicate.
    pub version_columns: &'static [&'static str],
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Columns expected in source files.
    pub fn source_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|column| column.source)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key.contains(&name)
    }

    /// Columns carrying a foreign key, excluding self references.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnSpec, TableName)> {
        self.columns.iter().filter_map(move |column| {
            column
                .references
                .filter(|target| *target != self.table)
                .map(|target| (column, target))
        })
    }
}

static PRODUCT_CATEGORIES: TableSchema = TableSchema {
    table: TableName::ProductCategories,
    key: &["product_category_name"],
    version_columns: &[],
    columns: &[
        text("product_category_name").required(),
        text("product_category_name_english").impute(Impute::CopyFrom("product_category_name")),
        text("parent_category_name").references(TableName::ProductCategories),
        integer("category_level").derived(),
        text("category_path").derived(),
    ],
};

static PRODUCTS: TableSchema = TableSchema {
    table: TableName::Products,
    key: &["product_id"],
    version_columns: &[],
    columns: &[
        text("product_id").required(),
        text("product_category_name").references(TableName::ProductCategories),
        integer("product_name_length")
            .check(Check::NonNegative)
            .impute(Impute::Integer(0)),
        integer("product_description_length")
            .check(Check::NonNegative)
            .impute(Impute::Integer(0)),
        integer("product_photos_qty")
            .check(Check::NonNegative)
            .impute(Impute::Integer(0)),
        decimal("product_weight_g").check(Check::NonNegative),
        decimal("product_length_cm").check(Check::NonNegative),
        decimal("product_height_cm").check(Check::NonNegative),
        decimal("product_width_cm").check(Check::NonNegative),
    ],
};

static SELLERS: TableSchema = TableSchema {
    table: TableName::Sellers,
    key: &["seller_id"],
    version_columns: &[],
    columns: &[
        text("seller_id").required(),
        text("seller_zip_code_prefix").check(Check::ZipPrefix),
        text("seller_city").impute(Impute::Text("unknown")),
        text("seller_state").check(Check::StateCode),
    ],
};

static CUSTOMERS: TableSchema = TableSchema {
    table: TableName::Customers,
    key: &["customer_id"],
    version_columns: &[],
    columns: &[
        text("customer_id").required(),
        text("customer_unique_id").impute(Impute::CopyFrom("customer_id")),
        text("customer_zip_code_prefix").check(Check::ZipPrefix),
        text("customer_city").impute(Impute::Text("unknown")),
        text("customer_state").check(Check::StateCode),
    ],
};

static ORDERS: TableSchema = TableSchema {
    table: TableName::Orders,
    key: &["order_id"],
    version_columns: &["order_purchase_timestamp"],
    columns: &[
        text("order_id").required(),
        text("customer_id")
            .required()
            .references(TableName::Customers),
        text("order_status")
            .required()
            .check(Check::OneOf(ORDER_STATUSES)),
        timestamp("order_purchase_timestamp").required(),
        timestamp("order_approved_at"),
        timestamp("order_delivered_carrier_date"),
        timestamp("order_delivered_customer_date"),
        timestamp("order_estimated_delivery_date"),
    ],
};

static ORDER_ITEMS: TableSchema = TableSchema {
    table: TableName::OrderItems,
    key: &["order_id", "order_item_id"],
    version_columns: &["shipping_limit_date"],
    columns: &[
        text("order_id").required().references(TableName::Orders),
        integer("order_item_id").required().check(Check::AtLeast(1)),
        text("product_id").required().references(TableName::Products),
        text("seller_id").required().references(TableName::Sellers),
        timestamp("shipping_limit_date"),
        decimal("price").required().check(Check::Positive),
        decimal("freight_value")
            .check(Check::NonNegative)
            .impute(Impute::Decimal(0.0)),
        decimal("total_amount").derived(),
    ],
};

static ORDER_REVIEWS: TableSchema = TableSchema {
    table: TableName::OrderReviews,
    key: &["review_id"],
    version_columns: &["review_answer_timestamp", "review_creation_date"],
    columns: &[
        text("review_id").required(),
        text("order_id").required().references(TableName::Orders),
        integer("review_score").required().check(Check::Between(1, 5)),
        text("review_comment_title").impute(Impute::Text("")),
        text("review_comment_message").impute(Impute::Text("")),
        timestamp("review_creation_date"),
        timestamp("review_answer_timestamp"),
    ],
};

/// Schema of a table.
pub fn schema(table: TableName) -> &'static TableSchema {
    match table {
        TableName::ProductCategories => &PRODUCT_CATEGORIES,
        TableName::Products => &PRODUCTS,
        TableName::Sellers => &SELLERS,
        TableName::Customers => &CUSTOMERS,
        TableName::Orders => &ORDERS,
        TableName::OrderItems => &ORDER_ITEMS,
        TableName::OrderReviews => &ORDER_REVIEWS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_version_columns_exist() {
        for table in TableName::ALL {
            let schema = schema(table);
            assert_eq!(schema.table, table);
            for name in schema.key.iter().chain(schema.version_columns) {
                assert!(schema.column(name).is_some(), "{table}.{name} missing");
            }
        }
    }

    #[test]
    fn foreign_keys_follow_dependencies() {
        for table in TableName::ALL {
            for (column, target) in schema(table).foreign_keys() {
                assert!(
                    table.dependencies().contains(&target),
                    "{table}.{} references {target} outside its dependencies",
                    column.name
                );
                assert_eq!(schema(target).key.len(), 1);
            }
        }
    }

    #[test]
    fn derived_columns_are_not_sourced() {
        let items = schema(TableName::OrderItems);
        let sourced: Vec<&str> = items.source_columns().map(|c| c.name).collect();
        assert!(!sourced.contains(&"total_amount"));
        assert_eq!(sourced.len(), 7);
    }
}
