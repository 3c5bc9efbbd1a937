pub mod cycle;
pub mod feed;
pub mod models;
pub mod projection;

pub use cycle::{fractional_days, BillingPeriod};
pub use feed::{aggregate_lines, LineBuffer, LineOutcome, LineRecordParser, UsageAggregator};
pub use models::{
    ProjectionResult, Quota, RiskTier, ServiceQuota, ServiceUsage, TrackedProject, UsageRecord,
    NO_EXHAUSTION_DAYS, OTHER_CONSUMER,
};
pub use projection::{project, project_all};
