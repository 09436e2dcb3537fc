//! Warehouse table identities and their load dependencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A warehouse table fed by one or more source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    ProductCategories,
    Products,
    Sellers,
    Customers,
    Orders,
    OrderItems,
    OrderReviews,
}

/// Whether a table describes entities or records events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Dimension,
    Fact,
}

impl TableName {
    /// Every table in dependency order.
    pub const ALL: [TableName; 7] = [
        TableName::ProductCategories,
        TableName::Products,
        TableName::Sellers,
        TableName::Customers,
        TableName::Orders,
        TableName::OrderItems,
        TableName::OrderReviews,
    ];

    /// Load tiers. Tables inside a tier never reference each other.
    pub const TIERS: [&'static [TableName]; 6] = [
        &[TableName::ProductCategories],
        &[TableName::Products, TableName::Sellers],
        &[TableName::Customers],
        &[TableName::Orders],
        &[TableName::OrderItems],
        &[TableName::OrderReviews],
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TableName::ProductCategories => "product_categories",
            TableName::Products => "products",
            TableName::Sellers => "sellers",
            TableName::Customers => "customers",
            TableName::Orders => "orders",
            TableName::OrderItems => "order_items",
            TableName::OrderReviews => "order_reviews",
        }
    }

    pub fn kind(self) -> TableKind {
        match self {
            TableName::Orders | TableName::OrderItems | TableName::OrderReviews => TableKind::Fact,
            _ => TableKind::Dimension,
        }
    }

    /// Zero-based load tier.
    pub fn tier(self) -> usize {
        Self::TIERS
            .iter()
            .position(|tier| tier.contains(&self))
            .unwrap_or(Self::TIERS.len())
    }

    /// Other tables this table references. Self references are excluded.
    pub fn dependencies(self) -> &'static [TableName] {
        match self {
            TableName::ProductCategories | TableName::Sellers | TableName::Customers => &[],
            TableName::Products => &[TableName::ProductCategories],
            TableName::Orders => &[TableName::Customers],
            TableName::OrderItems => &[TableName::Orders, TableName::Products, TableName::Sellers],
            TableName::OrderReviews => &[TableName::Orders],
        }
    }

    /// Tables that (transitively) reference this one.
    pub fn dependents(self) -> Vec<TableName> {
        let mut out = Vec::new();
        for candidate in Self::ALL {
            if candidate != self && candidate.depends_on(self) {
                out.push(candidate);
            }
        }
        out
    }

    /// True when `other` is reachable through this table's dependencies.
    pub fn depends_on(self, other: TableName) -> bool {
        self.dependencies()
            .iter()
            .any(|dep| *dep == other || dep.depends_on(other))
    }

    /// Root dimensions are required by every fact table, directly or not.
    pub fn is_root_dimension(self) -> bool {
        matches!(self, TableName::Customers | TableName::Products)
    }

    /// Alternative file stems accepted by source discovery.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TableName::ProductCategories => &[
                "categories",
                "product_category_name_translation",
                "category_tree",
            ],
            TableName::OrderReviews => &["reviews"],
            _ => &[],
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TableName::ALL
            .into_iter()
            .find(|table| table.as_str() == needle || table.aliases().contains(&needle.as_str()))
            .ok_or(ModelError::UnknownTable { name: needle })
    }
}
