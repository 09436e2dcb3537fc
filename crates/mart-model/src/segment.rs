//! Customer value segmentation types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value tier by lifetime monetary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueTier {
    New,
    Regular,
    Premium,
    #[serde(rename = "VIP")]
    Vip,
}

impl ValueTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueTier::New => "New",
            ValueTier::Regular => "Regular",
            ValueTier::Premium => "Premium",
            ValueTier::Vip => "VIP",
        }
    }
}

impl fmt::Display for ValueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity by days since the latest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    Active,
    Recent,
    Inactive,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Active => "Active",
            ActivityStatus::Recent => "Recent",
            ActivityStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named segment derived from the concatenated RFM quintile scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RfmSegment {
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "New Customers")]
    NewCustomers,
    #[serde(rename = "Cannot Lose Them")]
    CannotLoseThem,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Need Attention")]
    NeedAttention,
    Others,
}

impl RfmSegment {
    pub fn as_str(self) -> &'static str {
        match self {
            RfmSegment::Champions => "Champions",
            RfmSegment::LoyalCustomers => "Loyal Customers",
            RfmSegment::PotentialLoyalists => "Potential Loyalists",
            RfmSegment::NewCustomers => "New Customers",
            RfmSegment::CannotLoseThem => "Cannot Lose Them",
            RfmSegment::AtRisk => "At Risk",
            RfmSegment::NeedAttention => "Need Attention",
            RfmSegment::Others => "Others",
        }
    }
}

impl fmt::Display for RfmSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFM metrics and classification of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSegment {
    pub customer_id: String,
    /// Days since the latest order; `None` for customers without orders.
    pub recency_days: Option<i64>,
    pub frequency: u64,
    pub monetary: f64,
    pub value_tier: ValueTier,
    pub activity_status: ActivityStatus,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    pub rfm_segment: RfmSegment,
}

impl CustomerSegment {
    /// Concatenated quintile scores, e.g. `"545"`.
    pub fn rfm_code(&self) -> String {
        format!("{}{}{}", self.r_score, self.f_score, self.m_score)
    }
}
