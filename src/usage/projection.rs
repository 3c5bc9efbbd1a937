use std::collections::BTreeMap;

use super::cycle::BillingPeriod;
use super::models::{
    ProjectionResult, RiskTier, ServiceQuota, ServiceUsage, NO_EXHAUSTION_DAYS,
};
use crate::rounding::round_to;

/// key: quota-projection -> linear end-of-cycle extrapolation
///
/// Negative `remaining` (already over quota) flows through unchanged, and so
/// does the resulting negative `days_until_exhaustion`. Nothing is clamped.
pub fn project(
    service: &ServiceQuota,
    usage: Option<&ServiceUsage>,
    days_elapsed: f64,
    total_days: f64,
) -> ProjectionResult {
    let used = usage.map(|usage| usage.total).unwrap_or(0.0);
    let limit = service.quota.limit;
    let daily_rate = used / days_elapsed;
    let projected = round_to(daily_rate * total_days, 1);
    let remaining = round_to(limit - used, 1);
    let days_until_exhaustion = if daily_rate > 0.0 {
        (remaining / daily_rate).round() as i64
    } else {
        NO_EXHAUSTION_DAYS
    };
    let projected_percent = round_to(projected / limit * 100.0, 1);

    ProjectionResult {
        used: round_to(used, 3),
        limit,
        unit: service.quota.unit.clone(),
        daily_rate: round_to(daily_rate, 2),
        projected,
        remaining,
        days_until_exhaustion,
        projected_percent,
        risk_tier: RiskTier::from_projected_percent(projected_percent),
        per_consumer: usage
            .map(|usage| usage.per_consumer.clone())
            .unwrap_or_default(),
    }
}

/// Projects every catalog service; services missing from `usage` count as zero.
pub fn project_all(
    services: &[ServiceQuota],
    usage: &BTreeMap<String, ServiceUsage>,
    period: &BillingPeriod,
) -> BTreeMap<String, ProjectionResult> {
    services
        .iter()
        .map(|service| {
            let projection = project(
                service,
                usage.get(&service.name),
                period.days_elapsed,
                period.total_days,
            );
            (service.name.clone(), projection)
        })
        .collect()
}
