use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The six datasets fetched for one dashboard load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Members,
    Events,
    Donations,
    Tasks,
    SmsConversations,
    Families,
}

impl Dataset {
    pub const ALL: [Dataset; 6] = [
        Dataset::Members,
        Dataset::Events,
        Dataset::Donations,
        Dataset::Tasks,
        Dataset::SmsConversations,
        Dataset::Families,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Members => "members",
            Dataset::Events => "events",
            Dataset::Donations => "donations",
            Dataset::Tasks => "tasks",
            Dataset::SmsConversations => "sms_conversations",
            Dataset::Families => "families",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-query of the fan-out failed; the whole batch is discarded.
#[derive(Debug, Error)]
#[error("{dataset} query failed: {source}")]
pub struct FanOutError {
    pub dataset: Dataset,
    #[source]
    pub source: BoxError,
}

impl FanOutError {
    pub fn new(dataset: Dataset, source: anyhow::Error) -> Self {
        Self {
            dataset,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("no organization is associated with the current session")]
    NoOrganization,

    #[error("failed to resolve session: {0}")]
    Session(#[source] BoxError),

    #[error("{dataset} query failed: {source}")]
    Query {
        dataset: Dataset,
        #[source]
        source: BoxError,
    },

    #[error("dashboard queries did not finish within {}s", .after.as_secs())]
    Timeout { after: Duration },
}

impl DashboardError {
    /// Errors the user can fix only by changing the session, as opposed to
    /// retrying with refresh.
    pub fn is_blocking(&self) -> bool {
        matches!(self, DashboardError::NoOrganization)
    }
}

impl From<FanOutError> for DashboardError {
    fn from(err: FanOutError) -> Self {
        DashboardError::Query {
            dataset: err.dataset,
            source: err.source,
        }
    }
}
