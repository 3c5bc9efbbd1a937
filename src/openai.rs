use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProviderCredentials;
use crate::rounding::round_to;
use crate::usage::feed::lenient_number;
use crate::usage::fractional_days;

const COSTS_PATH: &str = "/v1/organization/costs";
const COMPLETIONS_USAGE_PATH: &str = "/v1/organization/usage/completions";

/// key: openai-usage -> cost and request summary for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryUsageReport {
    pub total_cost: f64,
    #[serde(rename = "requests")]
    pub request_count: u64,
    #[serde(rename = "costPerPrompt")]
    pub cost_per_request: f64,
    #[serde(rename = "monthlyProjected")]
    pub monthly_projected_cost: f64,
}

impl SecondaryUsageReport {
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// `total_cost` is unrounded on input; derived figures use the exact sum.
    pub fn summarize(
        total_cost: f64,
        request_count: u64,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let cost_per_request = if request_count > 0 {
            round_to(total_cost / request_count as f64, 4)
        } else {
            0.0
        };
        let days_since_start = fractional_days(window_start, now).max(1.0);
        Self {
            total_cost: round_to(total_cost, 2),
            request_count,
            cost_per_request,
            monthly_projected_cost: round_to(total_cost / days_since_start * 30.0, 2),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Option<Vec<Bucket>>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    #[serde(default)]
    results: Option<Vec<Value>>,
}

/// AI provider organization API, scoped to one project.
#[derive(Clone)]
pub struct OpenAiClient {
    base: String,
    admin_key: String,
    project_id: String,
    max_pages: usize,
    client: Client,
}

impl OpenAiClient {
    pub fn new(
        client: Client,
        base: impl Into<String>,
        credentials: &ProviderCredentials,
        max_pages: usize,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            admin_key: credentials.admin_key.clone(),
            project_id: credentials.project_id.clone(),
            max_pages: max_pages.max(1),
            client,
        }
    }

    /// Every result entry of a bucketed series since `start`, following the
    /// page cursor while more pages are announced.
    async fn series(&self, path: &str, start: DateTime<Utc>, limit: u32) -> anyhow::Result<Vec<Value>> {
        let url = format!("{}{}", self.base, path);
        let start_time = start.timestamp().to_string();
        let limit = limit.to_string();
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut query = vec![
                ("start_time", start_time.as_str()),
                ("project_ids", self.project_id.as_str()),
                ("limit", limit.as_str()),
            ];
            if let Some(page) = cursor.as_deref() {
                query.push(("page", page));
            }
            let page: Page = self
                .client
                .get(&url)
                .bearer_auth(&self.admin_key)
                .query(&query)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            for bucket in page.data.unwrap_or_default() {
                results.extend(bucket.results.unwrap_or_default());
            }
            match (page.has_more.unwrap_or(false), page.next_page) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(results)
    }

    /// Sum of `amount.value` over the cost series and of `num_model_requests`
    /// over the completions usage series, fetched concurrently.
    pub async fn totals(&self, start: DateTime<Utc>) -> anyhow::Result<(f64, u64)> {
        let (costs, usage) = tokio::try_join!(
            self.series(COSTS_PATH, start, 30),
            self.series(COMPLETIONS_USAGE_PATH, start, 31),
        )?;
        let total_cost: f64 = costs
            .iter()
            .map(|entry| {
                entry
                    .get("amount")
                    .and_then(|amount| amount.get("value"))
                    .map(lenient_number)
                    .unwrap_or(0.0)
            })
            .sum();
        let request_count = sum_request_counts(&usage)
            .ok_or_else(|| anyhow::anyhow!("request count overflows u64"))?;
        Ok((total_cost, request_count))
    }
}

/// `None` when the counts do not fit in a `u64`.
fn sum_request_counts(entries: &[Value]) -> Option<u64> {
    entries.iter().try_fold(0u64, |total, entry| {
        let count = entry.get("num_model_requests").map(lenient_count).unwrap_or(0);
        total.checked_add(count)
    })
}

/// Integer, float (truncated) or numeric string; anything else is zero.
fn lenient_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n.trunc() as u64))
            .unwrap_or(0),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite() && *n >= 0.0)
                        .map(|n| n.trunc() as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Never fails: missing credentials and any upstream or decode error give a
/// zeroed report.
pub async fn collect_usage(
    client: Option<&OpenAiClient>,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> SecondaryUsageReport {
    let Some(client) = client else {
        debug!("provider credentials absent; skipping cost summary");
        return SecondaryUsageReport::zeroed();
    };
    match client.totals(window_start).await {
        Ok((total_cost, request_count)) => {
            SecondaryUsageReport::summarize(total_cost, request_count, window_start, now)
        }
        Err(err) => {
            warn!(?err, "provider usage unavailable; reporting zeroed costs");
            SecondaryUsageReport::zeroed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use httpmock::prelude::*;
    use serde_json::json;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn summary_derives_per_request_and_monthly_cost() {
        let now = jan_first() + Duration::days(60);
        let report = SecondaryUsageReport::summarize(12.345_67, 1000, jan_first(), now);
        assert_eq!(report.total_cost, 12.35);
        assert_eq!(report.request_count, 1000);
        assert_eq!(report.cost_per_request, 0.0123);
        // 12.34567 / 60 * 30
        assert_eq!(report.monthly_projected_cost, 6.17);
    }

    #[test]
    fn no_requests_means_zero_cost_per_request() {
        let now = jan_first() + Duration::days(10);
        let report = SecondaryUsageReport::summarize(5.0, 0, jan_first(), now);
        assert_eq!(report.cost_per_request, 0.0);
        assert_eq!(report.monthly_projected_cost, 15.0);
    }

    #[test]
    fn window_days_are_floored_at_one() {
        let now = jan_first() + Duration::hours(6);
        let report = SecondaryUsageReport::summarize(2.0, 4, jan_first(), now);
        assert_eq!(report.monthly_projected_cost, 60.0);
        assert_eq!(report.cost_per_request, 0.5);
    }

    #[test]
    fn request_counts_are_read_leniently() {
        assert_eq!(lenient_count(&json!(42)), 42);
        assert_eq!(lenient_count(&json!("17")), 17);
        assert_eq!(lenient_count(&json!(3.9)), 3);
        assert_eq!(lenient_count(&json!("n/a")), 0);
        assert_eq!(lenient_count(&json!(-5)), 0);
        assert_eq!(lenient_count(&Value::Null), 0);
    }

    #[test]
    fn request_count_overflow_is_detected() {
        let entries = vec![
            json!({ "num_model_requests": u64::MAX }),
            json!({ "num_model_requests": 5 }),
        ];
        assert_eq!(sum_request_counts(&entries), None);
        let entries = vec![json!({ "num_model_requests": 5 }), json!({})];
        assert_eq!(sum_request_counts(&entries), Some(5));
    }

    fn client_for(server: &MockServer, max_pages: usize) -> OpenAiClient {
        let credentials = ProviderCredentials {
            admin_key: "sk-admin".into(),
            project_id: "proj_ai".into(),
        };
        OpenAiClient::new(Client::new(), server.base_url(), &credentials, max_pages)
    }

    #[tokio::test]
    async fn overflowing_request_counts_yield_zeroed_report() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path(COSTS_PATH);
            then.status(200).json_body(json!({
                "data": [{ "results": [{ "amount": { "value": 3.0 } }] }]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path(COMPLETIONS_USAGE_PATH);
            then.status(200).json_body(json!({
                "data": [{ "results": [
                    { "num_model_requests": u64::MAX },
                    { "num_model_requests": 5 }
                ] }]
            }));
        });

        let client = client_for(&server, 3);
        let report = collect_usage(Some(&client), jan_first(), Utc::now()).await;
        assert_eq!(report, SecondaryUsageReport::zeroed());
    }

    #[tokio::test]
    async fn page_cursor_stops_at_max_pages() {
        let server = MockServer::start_async().await;
        let costs = server.mock(|when, then| {
            when.method(GET).path(COSTS_PATH);
            then.status(200).json_body(json!({
                "data": [{ "results": [{ "amount": { "value": 1.0 } }] }],
                "has_more": true,
                "next_page": "again"
            }));
        });
        let usage = server.mock(|when, then| {
            when.method(GET).path(COMPLETIONS_USAGE_PATH);
            then.status(200).json_body(json!({
                "data": [{ "results": [{ "num_model_requests": 2 }] }],
                "has_more": true,
                "next_page": "again"
            }));
        });

        let client = client_for(&server, 4);
        let (total_cost, request_count) = client.totals(jan_first()).await.unwrap();
        costs.assert_hits(4);
        usage.assert_hits(4);
        assert_eq!(total_cost, 4.0);
        assert_eq!(request_count, 8);
    }

    #[tokio::test]
    async fn missing_client_yields_zeroed_report() {
        let report = collect_usage(None, jan_first(), Utc::now()).await;
        assert_eq!(report, SecondaryUsageReport::zeroed());
    }
}
