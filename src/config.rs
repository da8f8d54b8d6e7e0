use std::time::Duration as StdDuration;

use clap::Args;
use uuid::Uuid;

use crate::service::ServiceConfig;

#[derive(Debug, Clone, Args)]
pub struct DashboardConfig {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// User whose organization and tasks the dashboard is built for
    #[arg(long, env = "DASHBOARD_USER_ID")]
    pub user_id: Option<Uuid>,

    /// Deadline for the dashboard queries, applied to the whole batch
    #[arg(long, env = "DASHBOARD_QUERY_TIMEOUT_SECS", default_value_t = 30)]
    pub query_timeout_secs: u64,

    #[arg(long, default_value_t = 5)]
    pub max_connections: u32,
}

impl DashboardConfig {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            query_timeout: StdDuration::from_secs(self.query_timeout_secs.max(1)),
        }
    }

    pub fn require_user(&self) -> anyhow::Result<Uuid> {
        self.user_id
            .ok_or_else(|| anyhow::anyhow!("DASHBOARD_USER_ID (or --user-id) must be set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: DashboardConfig,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "congregation-dashboard",
            "--database-url",
            "postgres://localhost/church",
            "--user-id",
            "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2",
            "--query-timeout-secs",
            "0",
        ])
        .unwrap();

        assert_eq!(
            cli.config.service_config().query_timeout,
            StdDuration::from_secs(1)
        );
        assert!(cli.config.require_user().is_ok());
    }

    #[test]
    fn cache_ttl_is_not_configurable() {
        let result = TestCli::try_parse_from([
            "congregation-dashboard",
            "--database-url",
            "postgres://localhost/church",
            "--cache-ttl-secs",
            "60",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_malformed_user_id() {
        let result = TestCli::try_parse_from([
            "congregation-dashboard",
            "--database-url",
            "postgres://localhost/church",
            "--user-id",
            "not-a-uuid",
        ]);
        assert!(result.is_err());
    }
}
