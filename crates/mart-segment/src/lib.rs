pub mod quality;
pub mod rfm;

pub use quality::{score_table, weighted_score};
pub use rfm::{activity_status, named_segment, segment_customers, value_tier};
