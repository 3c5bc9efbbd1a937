use std::collections::BTreeMap;

use serde::Serialize;

/// Consumer bucket for records without a usable project tag.
pub const OTHER_CONSUMER: &str = "_other";

/// Days-until-exhaustion reported when nothing is being consumed.
pub const NO_EXHAUSTION_DAYS: i64 = 999;

/// key: usage-models -> static fleet entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProject {
    pub name: String,
    pub id: String,
    pub short_name: String,
}

impl TrackedProject {
    pub fn new(name: &str, id: &str, short_name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            short_name: short_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quota {
    pub limit: f64,
    pub unit: String,
}

impl Quota {
    pub fn new(limit: f64, unit: &str) -> Self {
        Self {
            limit,
            unit: unit.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceQuota {
    pub name: String,
    pub quota: Quota,
}

impl ServiceQuota {
    pub fn new(name: &str, quota: Quota) -> Self {
        Self {
            name: name.to_string(),
            quota,
        }
    }
}

/// One accepted line of the billing feed.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub service_name: String,
    pub consumed_quantity: f64,
    pub consumer_tag: String,
}

/// key: usage-models -> per-service totals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceUsage {
    pub total: f64,
    pub per_consumer: BTreeMap<String, f64>,
}

impl ServiceUsage {
    pub fn add(&mut self, consumer: &str, quantity: f64) {
        self.total += quantity;
        *self.per_consumer.entry(consumer.to_string()).or_insert(0.0) += quantity;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Ok,
    Warn,
    Danger,
}

impl RiskTier {
    pub fn from_projected_percent(projected_percent: f64) -> Self {
        if projected_percent > 80.0 {
            RiskTier::Danger
        } else if projected_percent > 50.0 {
            RiskTier::Warn
        } else {
            RiskTier::Ok
        }
    }
}

/// key: usage-models -> end-of-cycle projection per service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub used: f64,
    pub limit: f64,
    pub unit: String,
    pub daily_rate: f64,
    pub projected: f64,
    pub remaining: f64,
    #[serde(rename = "daysUntil")]
    pub days_until_exhaustion: i64,
    #[serde(rename = "projPct")]
    pub projected_percent: f64,
    #[serde(rename = "risk")]
    pub risk_tier: RiskTier,
    #[serde(rename = "perApp")]
    pub per_consumer: BTreeMap<String, f64>,
}
