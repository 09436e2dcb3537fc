pub mod config;
pub mod error;
pub mod quality;
pub mod record;
pub mod report;
pub mod retry;
pub mod schema;
pub mod segment;
pub mod table;
pub mod value;

pub use config::{QualityWeights, RunConfig};
pub use error::{ModelError, Result};
pub use quality::{ColumnQuality, QualityScoreRecord, round2, round6};
pub use record::{
    CleanRecord, ErrorClass, QuarantinedRecord, RawRecord, RecordOrigin, Row, RuleCode,
    ValidatedRecord, Violation, record_key,
};
pub use report::{
    FailureEntry, RunReport, RunStatus, SegmentDistribution, SourceStats, Stage, StageTiming,
    TableReport, TableStatus,
};
pub use retry::{RetryPolicy, Transient};
pub use schema::{Check, ColumnKind, ColumnSpec, Impute, ORDER_STATUSES, TableSchema, schema};
pub use segment::{ActivityStatus, CustomerSegment, RfmSegment, ValueTier};
pub use table::{TableKind, TableName};
pub use value::{TIMESTAMP_FORMAT, Value, format_timestamp, parse_timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_status_names() {
        let report = TableReport {
            status: TableStatus::PartiallyLoaded,
            ..TableReport::new(TableName::OrderItems)
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["table"], "order_items");
        assert_eq!(json["status"], "partially_loaded");
    }

    #[test]
    fn segment_names_serialize_for_humans() {
        assert_eq!(serde_json::to_value(ValueTier::Vip).unwrap(), "VIP");
        assert_eq!(
            serde_json::to_value(RfmSegment::CannotLoseThem).unwrap(),
            "Cannot Lose Them"
        );
    }
}
