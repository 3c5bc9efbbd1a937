use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;

use crate::usage::models::{Quota, ServiceQuota, TrackedProject};

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// Base URL of the hosting platform API (billing feed and deployments).
pub static VERCEL_API_BASE: Lazy<String> = Lazy::new(|| {
    base_url_from_env("VERCEL_API_BASE").unwrap_or_else(|| "https://api.vercel.com".to_string())
});

/// Base URL of the AI provider organization API.
pub static OPENAI_API_BASE: Lazy<String> = Lazy::new(|| {
    base_url_from_env("OPENAI_API_BASE").unwrap_or_else(|| "https://api.openai.com".to_string())
});

/// Transport timeout applied to every upstream request. Defaults to 30 seconds.
pub static UPSTREAM_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(30)
});

/// Fixed timezone used for billing-cycle boundaries and displayed dates,
/// expressed as minutes east of UTC via `DISPLAY_UTC_OFFSET_MINUTES`.
pub static DISPLAY_OFFSET: Lazy<FixedOffset> = Lazy::new(|| {
    std::env::var("DISPLAY_UTC_OFFSET_MINUTES")
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .and_then(offset_from_minutes)
        .unwrap_or_else(|| Utc.fix())
});

/// key: openai-config -> cost window start
pub static OPENAI_USAGE_SINCE: Lazy<DateTime<Utc>> = Lazy::new(|| {
    std::env::var("OPENAI_USAGE_SINCE")
        .ok()
        .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(default_usage_since)
});

/// key: openai-config -> pagination cap per series
pub static OPENAI_MAX_PAGES: Lazy<usize> = Lazy::new(|| {
    std::env::var("OPENAI_MAX_PAGES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(12)
});

/// Fleet catalog, constructed once for the lifetime of the process.
pub static CATALOG: Lazy<UsageCatalog> = Lazy::new(UsageCatalog::standard);

fn base_url_from_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
}

/// `None` for offsets outside a day in either direction.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

fn default_usage_since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn non_blank(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Upstream credentials, read once at startup. Blank values count as absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub vercel_token: Option<String>,
    pub vercel_team_id: Option<String>,
    pub openai_admin_key: Option<String>,
    pub openai_project_id: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            vercel_token: non_blank("VERCEL_TOKEN"),
            vercel_team_id: non_blank("VERCEL_TEAM_ID"),
            openai_admin_key: non_blank("OPENAI_ADMIN_KEY"),
            openai_project_id: non_blank("OPENAI_PROJECT_ID"),
        }
    }

    /// Token and team id for the hosting platform, both required.
    pub fn platform(&self) -> Option<PlatformCredentials> {
        Some(PlatformCredentials {
            token: self.vercel_token.clone()?,
            team_id: self.vercel_team_id.clone()?,
        })
    }

    /// Admin key and project id for the AI provider. Absence is not fatal.
    pub fn provider(&self) -> Option<ProviderCredentials> {
        Some(ProviderCredentials {
            admin_key: self.openai_admin_key.clone()?,
            project_id: self.openai_project_id.clone()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    pub token: String,
    pub team_id: String,
}

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub admin_key: String,
    pub project_id: String,
}

/// key: usage-catalog -> tracked projects, services, quotas
#[derive(Debug, Clone)]
pub struct UsageCatalog {
    pub projects: Vec<TrackedProject>,
    pub services: Vec<ServiceQuota>,
    pub anchor_day: u32,
}

impl UsageCatalog {
    pub fn standard() -> Self {
        Self {
            projects: vec![
                TrackedProject::new(
                    "rubix-pole-acquisition",
                    "prj_345gNlBNxgvsSCakmtpNTSECGFqR",
                    "pole",
                ),
                TrackedProject::new(
                    "rubix-pitch-generator-dev",
                    "prj_GM0WHDF8ik7PjMeib2Zha1EYXblM",
                    "pitch",
                ),
                TrackedProject::new(
                    "rubix-smart-content",
                    "prj_kAzFteCZudVEikhKBC2dK2GdpMVS",
                    "smart",
                ),
            ],
            services: vec![
                ServiceQuota::new("Build Minutes", Quota::new(6000.0, "min")),
                ServiceQuota::new("Function Invocations", Quota::new(1e6, "invoc.")),
                ServiceQuota::new("Function Duration", Quota::new(1000.0, "GB-h")),
                ServiceQuota::new("Fast Data Transfer", Quota::new(1000.0, "GB")),
            ],
            anchor_day: 20,
        }
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.name.as_str())
    }
}
