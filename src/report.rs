use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Extension, Json};
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::{self, Credentials, UsageCatalog};
use crate::deployments::{collect_statuses, DeploymentStatus};
use crate::error::{AppError, AppResult};
use crate::openai::{collect_usage, OpenAiClient, SecondaryUsageReport};
use crate::rounding::round_to;
use crate::usage::{project_all, BillingPeriod, LineRecordParser, ProjectionResult};
use crate::vercel::{iso_millis, VercelClient};

const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub from: String,
    pub to: String,
    pub reset: String,
    pub days_elapsed: f64,
    pub days_remaining: f64,
}

impl PeriodSummary {
    pub fn from_period(period: &BillingPeriod) -> Self {
        Self {
            from: period.start.format(DATE_FORMAT).to_string(),
            to: period.now.format(DATE_FORMAT).to_string(),
            reset: period.end.format(DATE_FORMAT).to_string(),
            days_elapsed: round_to(period.days_elapsed, 1),
            days_remaining: round_to(period.days_remaining, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSection {
    pub proj: BTreeMap<String, ProjectionResult>,
    pub deploys: BTreeMap<String, DeploymentStatus>,
}

/// key: usage-report -> response body of `GET /api/data`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub period: PeriodSummary,
    pub vercel: PlatformSection,
    pub openai: SecondaryUsageReport,
    pub generated_at: String,
}

pub fn assemble(
    period: &BillingPeriod,
    projections: BTreeMap<String, ProjectionResult>,
    deploys: BTreeMap<String, DeploymentStatus>,
    openai: SecondaryUsageReport,
    generated_at: DateTime<Utc>,
) -> UsageReport {
    UsageReport {
        period: PeriodSummary::from_period(period),
        vercel: PlatformSection {
            proj: projections,
            deploys,
        },
        openai,
        generated_at: iso_millis(generated_at),
    }
}

/// Where and how the report reaches its upstreams.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub vercel_base: String,
    pub openai_base: String,
    pub display_offset: FixedOffset,
    pub provider_window_start: DateTime<Utc>,
    pub provider_max_pages: usize,
    pub timeout: Duration,
}

impl UpstreamSettings {
    pub fn from_env() -> Self {
        Self {
            vercel_base: config::VERCEL_API_BASE.clone(),
            openai_base: config::OPENAI_API_BASE.clone(),
            display_offset: *config::DISPLAY_OFFSET,
            provider_window_start: *config::OPENAI_USAGE_SINCE,
            provider_max_pages: *config::OPENAI_MAX_PAGES,
            timeout: Duration::from_secs(*config::UPSTREAM_TIMEOUT_SECS),
        }
    }
}

/// Shared application state behind the report endpoint.
pub struct UsageMonitor {
    client: Client,
    credentials: Credentials,
    catalog: UsageCatalog,
    settings: UpstreamSettings,
}

impl UsageMonitor {
    pub fn new(
        credentials: Credentials,
        catalog: UsageCatalog,
        settings: UpstreamSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            credentials,
            catalog,
            settings,
        })
    }

    pub fn from_env() -> Result<Self, reqwest::Error> {
        Self::new(
            Credentials::from_env(),
            config::CATALOG.clone(),
            UpstreamSettings::from_env(),
        )
    }

    /// Gathers billing usage, deployment states and provider costs
    /// concurrently, then projects every service against its quota.
    ///
    /// Fails before any request is sent when the platform credentials are
    /// missing. Deployment and provider failures degrade to sentinels; only a
    /// transport failure on the billing feed fails the report.
    pub async fn build_report(&self, now: DateTime<Utc>) -> AppResult<UsageReport> {
        let platform = self
            .credentials
            .platform()
            .ok_or(AppError::MissingCredentials("VERCEL_TOKEN, VERCEL_TEAM_ID"))?;

        let offset = self.settings.display_offset;
        let period = BillingPeriod::containing(now.with_timezone(&offset), self.catalog.anchor_day);
        let vercel = VercelClient::new(self.client.clone(), &self.settings.vercel_base, &platform);
        let openai = self.credentials.provider().map(|provider| {
            OpenAiClient::new(
                self.client.clone(),
                &self.settings.openai_base,
                &provider,
                self.settings.provider_max_pages,
            )
        });
        let parser = LineRecordParser::new(self.catalog.service_names());

        let (billing, deploys, provider_usage) = tokio::join!(
            vercel.billing_usage(period.start.with_timezone(&Utc), now, parser),
            collect_statuses(&vercel, &self.catalog.projects, offset),
            collect_usage(openai.as_ref(), self.settings.provider_window_start, now),
        );
        let usage = billing?;
        let projections = project_all(&self.catalog.services, &usage, &period);

        info!(
            services_with_usage = usage.len(),
            deployments = deploys.len(),
            "usage report assembled"
        );
        Ok(assemble(&period, projections, deploys, provider_usage, now))
    }
}

pub async fn get_usage_report(
    Extension(monitor): Extension<Arc<UsageMonitor>>,
) -> AppResult<Json<UsageReport>> {
    let report = monitor.build_report(Utc::now()).await?;
    Ok(Json(report))
}
