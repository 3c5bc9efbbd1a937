use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::PlatformCredentials;
use crate::usage::{LineBuffer, LineRecordParser, ServiceUsage, UsageAggregator};

/// Hosting platform API: metered billing feed and deployment listings.
#[derive(Clone)]
pub struct VercelClient {
    base: String,
    token: String,
    team_id: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct DeploymentList {
    #[serde(default)]
    deployments: Option<Vec<Deployment>>,
}

/// Most recent deployment of a project, as listed upstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub state: Option<String>,
    /// Creation instant in epoch milliseconds.
    #[serde(default)]
    pub created: Option<i64>,
}

impl VercelClient {
    pub fn new(
        client: Client,
        base: impl Into<String>,
        credentials: &PlatformCredentials,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: credentials.token.clone(),
            team_id: credentials.team_id.clone(),
            client,
        }
    }

    /// Streams the line-delimited charges feed for `[from, to]` through the
    /// aggregator. A non-success status yields no usage at all; transport and
    /// body errors propagate.
    pub async fn billing_usage(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        parser: LineRecordParser,
    ) -> Result<BTreeMap<String, ServiceUsage>, reqwest::Error> {
        let url = format!("{}/v1/billing/charges", self.base);
        let (from, to) = (iso_millis(from), iso_millis(to));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("teamId", self.team_id.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "billing feed request rejected; reporting no usage");
            return Ok(BTreeMap::new());
        }

        let mut aggregator = UsageAggregator::new(parser);
        let mut buffer = LineBuffer::default();
        let mut chunks = resp.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            buffer.extend(&chunk, |line| aggregator.push_line(line));
        }
        buffer.finish(|line| aggregator.push_line(line));

        debug!(accepted = aggregator.accepted(), "billing feed aggregated");
        Ok(aggregator.finish())
    }

    pub async fn latest_deployment(&self, project_id: &str) -> anyhow::Result<Option<Deployment>> {
        let url = format!("{}/v6/deployments", self.base);
        let list: DeploymentList = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("projectId", project_id),
                ("teamId", self.team_id.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.deployments.and_then(|list| list.into_iter().next()))
    }
}

/// RFC 3339 in UTC with millisecond precision and a `Z` suffix.
pub fn iso_millis(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
