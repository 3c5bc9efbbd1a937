use std::collections::BTreeMap;

use chrono::{FixedOffset, TimeZone, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::usage::TrackedProject;
use crate::vercel::{Deployment, VercelClient};

pub const UNAVAILABLE: &str = "N/A";

const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

/// key: deployments -> latest state per tracked project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    pub state: String,
    #[serde(rename = "lastDate")]
    pub last_deployed_at: String,
}

impl DeploymentStatus {
    pub fn unavailable() -> Self {
        Self {
            state: UNAVAILABLE.to_string(),
            last_deployed_at: UNAVAILABLE.to_string(),
        }
    }

    /// Missing fields fall back to `N/A` one by one.
    pub fn from_deployment(deployment: &Deployment, offset: FixedOffset) -> Self {
        let last_deployed_at = deployment
            .created
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(|created| {
                created
                    .with_timezone(&offset)
                    .format(DISPLAY_FORMAT)
                    .to_string()
            })
            .unwrap_or_else(|| UNAVAILABLE.to_string());
        Self {
            state: deployment
                .state
                .clone()
                .unwrap_or_else(|| UNAVAILABLE.to_string()),
            last_deployed_at,
        }
    }
}

/// Looks up every project concurrently, each in its own task. A failed,
/// empty or panicking lookup only affects that project's entry.
pub async fn collect_statuses(
    client: &VercelClient,
    projects: &[TrackedProject],
    offset: FixedOffset,
) -> BTreeMap<String, DeploymentStatus> {
    let lookups = projects.iter().map(|project| {
        let client = client.clone();
        let project = project.clone();
        let handle = tokio::spawn(async move {
            match client.latest_deployment(&project.id).await {
                Ok(Some(deployment)) => DeploymentStatus::from_deployment(&deployment, offset),
                Ok(None) => DeploymentStatus::unavailable(),
                Err(err) => {
                    warn!(
                        ?err,
                        project = %project.name,
                        short_name = %project.short_name,
                        "deployment lookup failed"
                    );
                    DeploymentStatus::unavailable()
                }
            }
        });
        async move { handle.await.unwrap_or_else(|_| DeploymentStatus::unavailable()) }
    });
    let statuses = join_all(lookups).await;

    projects
        .iter()
        .map(|project| project.short_name.clone())
        .zip(statuses)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_creation_time_in_display_offset() {
        let deployment = Deployment {
            state: Some("READY".into()),
            // 2026-10-14T07:05:00Z
            created: Some(1_791_961_500_000),
        };
        let paris_summer = FixedOffset::east_opt(2 * 3600).unwrap();
        let status = DeploymentStatus::from_deployment(&deployment, paris_summer);
        assert_eq!(status.state, "READY");
        assert_eq!(status.last_deployed_at, "14/10/2026 09:05");
    }

    #[test]
    fn missing_fields_fall_back_individually() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let no_state = Deployment {
            state: None,
            created: Some(1_791_961_500_000),
        };
        let status = DeploymentStatus::from_deployment(&no_state, utc);
        assert_eq!(status.state, UNAVAILABLE);
        assert_eq!(status.last_deployed_at, "14/10/2026 07:05");

        let no_date = Deployment {
            state: Some("ERROR".into()),
            created: None,
        };
        let status = DeploymentStatus::from_deployment(&no_date, utc);
        assert_eq!(status.state, "ERROR");
        assert_eq!(status.last_deployed_at, UNAVAILABLE);
    }
}
